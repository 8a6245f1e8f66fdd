//! DNS proxy orchestration.
//!
//! Assembles the pipeline from configuration, binds both transports and
//! runs them until one of them fails.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::ServerError;
use crate::events::EventLog;
use crate::filter;
use crate::pipeline::Pipeline;
use crate::resolver::Resolver;
use crate::stats::Stats;
use crate::transport::{Protocol, TcpTransport, UdpTransport};

/// UDP and TCP listeners sharing one pipeline.
pub struct Server {
    listen: SocketAddr,
    pipeline: Arc<Pipeline>,
}

impl Server {
    pub fn new(listen: SocketAddr, pipeline: Arc<Pipeline>) -> Self {
        Self { listen, pipeline }
    }

    /// Bind both listeners and serve until the first one fails.
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.serve().await
    }

    /// Bind both listeners on the same address.
    ///
    /// With port 0 the TCP listener takes whatever port UDP was given.
    pub async fn bind(self) -> Result<Listeners, ServerError> {
        let udp = UdpTransport::bind(self.listen).await?;
        let tcp_addr = udp.local_addr().unwrap_or(self.listen);
        let tcp = TcpTransport::bind(tcp_addr).await?;

        Ok(Listeners {
            udp,
            tcp,
            pipeline: self.pipeline,
        })
    }
}

/// Bound, not yet serving listeners.
pub struct Listeners {
    udp: UdpTransport,
    tcp: TcpTransport,
    pipeline: Arc<Pipeline>,
}

impl Listeners {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Run both accept loops. Returns the first listener failure; the other
    /// listener is stopped before returning.
    pub async fn serve(self) -> Result<(), ServerError> {
        let protocols = [Protocol::Udp, Protocol::Tcp];
        let handles: Vec<JoinHandle<Result<(), ServerError>>> = vec![
            tokio::spawn(self.udp.serve(self.pipeline.clone())),
            tokio::spawn(self.tcp.serve(self.pipeline)),
        ];

        let (result, index, remaining) = select_all(handles).await;
        for handle in remaining {
            handle.abort();
        }

        match result {
            Ok(Ok(())) => Err(ServerError::ListenerStopped(protocols[index])),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ServerError::ListenerTask(e)),
        }
    }
}

/// Run the DNS proxy with the given configuration.
///
/// Starts UDP and TCP transports on the listen address and runs
/// indefinitely unless a listener fails.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let listen = config.listen_addr()?;
    let upstream = resolve_upstream(&config.server.upstream).await?;

    let blocker = filter::build(&config.blocking);
    let resolver = Resolver::new(upstream, &config.resolver);
    let events = EventLog::new(
        config.events.history,
        config.events.subscriber_capacity,
    );
    let pipeline = Arc::new(Pipeline::new(
        blocker,
        Arc::new(resolver),
        Arc::new(Stats::new()),
        Arc::new(events),
    ));

    let listeners = Server::new(listen, pipeline.clone()).bind().await?;
    info!(%listen, %upstream, "DNS proxy listening");

    let reporter = spawn_stats_reporter(
        pipeline,
        Duration::from_secs(config.logging.stats_interval_secs),
    );
    let result = listeners.serve().await;
    if let Some(reporter) = reporter {
        reporter.abort();
    }
    result
}

async fn resolve_upstream(upstream: &str) -> Result<SocketAddr, ServerError> {
    let unresolved = |reason: String| ServerError::Upstream {
        addr: upstream.to_string(),
        reason,
    };

    tokio::net::lookup_host(upstream)
        .await
        .map_err(|e| unresolved(e.to_string()))?
        .next()
        .ok_or_else(|| unresolved("no addresses found".to_string()))
}

/// Log a stats line every `every`. Disabled for a zero interval.
fn spawn_stats_reporter(pipeline: Arc<Pipeline>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = pipeline.stats().snapshot();
            info!(
                uptime_secs = stats.uptime_secs,
                cache = pipeline.cache_len(),
                total = stats.total,
                blocked = stats.blocked,
                blocked_pct = format!("{:.1}", stats.blocked_percent()),
                cached = stats.cached,
                allowed = stats.allowed,
                failed = stats.failed,
                avg_response_ms = format!("{:.2}", stats.avg_response_ms),
                "Stats"
            );
        }
    }))
}
