//! Upstream resolution.
//!
//! Queries go to the upstream over UDP first with a short timeout. A
//! failed or truncated UDP answer is retried once over TCP and whatever
//! that attempt yields is final.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_proto::op::Message;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::transport::{Exchange, TcpExchange, UdpExchange};

/// Something that can answer a query on the pipeline's behalf.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Resolve `request`. The response ID is the one the upstream sent;
    /// callers rewrite it for their client.
    async fn forward(&self, request: &Message) -> Result<Message, ResolveError>;
}

/// Forwards queries to a single upstream server with UDP → TCP fallback.
pub struct Resolver {
    fast: Box<dyn Exchange>,
    reliable: Box<dyn Exchange>,
    fast_timeout: Duration,
    reliable_timeout: Duration,
}

impl Resolver {
    pub fn new(server: SocketAddr, config: &ResolverConfig) -> Self {
        Self::with_exchanges(
            Box::new(UdpExchange::new(server)),
            Box::new(TcpExchange::new(server)),
            config.udp_timeout(),
            config.tcp_timeout(),
        )
    }

    pub fn with_exchanges(
        fast: Box<dyn Exchange>,
        reliable: Box<dyn Exchange>,
        fast_timeout: Duration,
        reliable_timeout: Duration,
    ) -> Self {
        Self {
            fast,
            reliable,
            fast_timeout,
            reliable_timeout,
        }
    }

    async fn attempt(
        &self,
        exchange: &dyn Exchange,
        query: &[u8],
        id: u16,
        timeout: Duration,
    ) -> Result<Message, ResolveError> {
        let protocol = exchange.protocol();
        let bytes = exchange.exchange(query, timeout).await?;
        let response = Message::from_vec(&bytes)
            .map_err(|source| ResolveError::Malformed { protocol, source })?;
        if response.id() != id {
            return Err(ResolveError::IdMismatch {
                protocol,
                expected: id,
                got: response.id(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Upstream for Resolver {
    async fn forward(&self, request: &Message) -> Result<Message, ResolveError> {
        let query = request.to_vec().map_err(ResolveError::Encode)?;
        let start = Instant::now();

        match self
            .attempt(&*self.fast, &query, request.id(), self.fast_timeout)
            .await
        {
            Ok(response) if !response.truncated() => return Ok(response),
            Ok(_) => debug!(
                protocol = %self.fast.protocol(),
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Truncated upstream response, retrying over {}",
                self.reliable.protocol()
            ),
            Err(e) => debug!(
                protocol = %self.fast.protocol(),
                error = %e,
                elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Upstream attempt failed, retrying over {}",
                self.reliable.protocol()
            ),
        }

        let result = self
            .attempt(
                &*self.reliable,
                &query,
                request.id(),
                self.reliable_timeout,
            )
            .await;
        debug!(
            protocol = %self.reliable.protocol(),
            ok = result.is_ok(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Fallback attempt finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::test_support::{answer, query};
    use crate::transport::{Protocol, read_frame, write_frame};
    use hickory_proto::rr::RecordType;
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};
    use tokio::net::{TcpListener, UdpSocket};

    enum Behavior {
        Answer { ip: Ipv4Addr, truncated: bool },
        WrongId,
        Garbage,
        Fail,
    }

    /// Timeouts passed to each call, in order.
    #[derive(Default)]
    struct Calls(Mutex<Vec<Duration>>);

    impl Calls {
        fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }

        fn timeouts(&self) -> Vec<Duration> {
            self.0.lock().unwrap().clone()
        }
    }

    struct MockExchange {
        protocol: Protocol,
        behavior: Behavior,
        calls: Arc<Calls>,
    }

    impl MockExchange {
        fn new(protocol: Protocol, behavior: Behavior) -> (Box<Self>, Arc<Calls>) {
            let calls = Arc::new(Calls::default());
            let exchange = Box::new(Self {
                protocol,
                behavior,
                calls: calls.clone(),
            });
            (exchange, calls)
        }
    }

    #[async_trait]
    impl Exchange for MockExchange {
        async fn exchange(&self, query: &[u8], timeout: Duration) -> Result<Vec<u8>, ResolveError> {
            self.calls.0.lock().unwrap().push(timeout);
            let request = Message::from_vec(query).unwrap();
            match self.behavior {
                Behavior::Answer { ip, truncated } => {
                    let mut response = answer(&request, ip, 300, 1);
                    response.set_truncated(truncated);
                    Ok(response.to_vec().unwrap())
                }
                Behavior::WrongId => {
                    let mut response = answer(&request, Ipv4Addr::LOCALHOST, 300, 1);
                    response.set_id(request.id().wrapping_add(1));
                    Ok(response.to_vec().unwrap())
                }
                Behavior::Garbage => Ok(vec![0xde, 0xad]),
                Behavior::Fail => Err(ResolveError::Timeout {
                    protocol: self.protocol,
                    server: "192.0.2.1:53".parse().unwrap(),
                    timeout,
                }),
            }
        }

        fn protocol(&self) -> Protocol {
            self.protocol
        }
    }

    fn resolver(fast: Behavior, reliable: Behavior) -> (Resolver, Arc<Calls>, Arc<Calls>) {
        let (fast, fast_calls) = MockExchange::new(Protocol::Udp, fast);
        let (reliable, reliable_calls) = MockExchange::new(Protocol::Tcp, reliable);
        let resolver = Resolver::with_exchanges(
            fast,
            reliable,
            Duration::from_millis(500),
            Duration::from_secs(5),
        );
        (resolver, fast_calls, reliable_calls)
    }

    const UDP_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const TCP_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn answers(ip: Ipv4Addr) -> Behavior {
        Behavior::Answer {
            ip,
            truncated: false,
        }
    }

    fn truncates(ip: Ipv4Addr) -> Behavior {
        Behavior::Answer {
            ip,
            truncated: true,
        }
    }

    fn example(id: u16) -> Message {
        query(id, "example.com.", RecordType::A)
    }

    fn first_ip(response: &Message) -> Ipv4Addr {
        match response.answers()[0].data() {
            Some(hickory_proto::rr::RData::A(a)) => a.0,
            other => panic!("unexpected answer {other:?}"),
        }
    }

    #[tokio::test]
    async fn fast_answer_is_returned_directly() {
        let (resolver, fast, reliable) = resolver(answers(UDP_IP), answers(TCP_IP));

        let response = resolver.forward(&example(1)).await.unwrap();

        assert_eq!(first_ip(&response), UDP_IP);
        assert_eq!(fast.count(), 1);
        assert_eq!(reliable.count(), 0);
    }

    #[tokio::test]
    async fn truncated_answer_falls_back_to_tcp() {
        let (resolver, fast, reliable) = resolver(truncates(UDP_IP), answers(TCP_IP));

        let response = resolver.forward(&example(2)).await.unwrap();

        assert!(!response.truncated());
        assert_eq!(first_ip(&response), TCP_IP);
        assert_eq!(fast.timeouts(), [Duration::from_millis(500)]);
        assert_eq!(reliable.timeouts(), [Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn failed_fast_attempt_falls_back() {
        for fast_behavior in [Behavior::Fail, Behavior::Garbage, Behavior::WrongId] {
            let (resolver, _, reliable) = resolver(fast_behavior, answers(TCP_IP));

            let response = resolver.forward(&example(3)).await.unwrap();

            assert_eq!(first_ip(&response), TCP_IP);
            assert_eq!(reliable.count(), 1);
        }
    }

    #[tokio::test]
    async fn both_attempts_failing_is_an_error() {
        let (resolver, fast, reliable) = resolver(Behavior::Fail, Behavior::Fail);

        let err = resolver.forward(&example(4)).await.unwrap_err();

        assert!(matches!(err, ResolveError::Timeout { protocol: Protocol::Tcp, .. }));
        assert_eq!(fast.count(), 1);
        assert_eq!(reliable.count(), 1);
    }

    #[tokio::test]
    async fn reliable_truncated_answer_is_returned_as_is() {
        let (resolver, _, _) = resolver(Behavior::Fail, truncates(TCP_IP));

        let response = resolver.forward(&example(5)).await.unwrap();

        assert!(response.truncated());
    }

    /// Real sockets: UDP upstream always truncates, TCP upstream answers.
    #[tokio::test]
    async fn resolver_over_sockets_retries_truncation_over_tcp() {
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let udp = UdpSocket::bind(addr).await.unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, src) = udp.recv_from(&mut buf).await.unwrap();
            let request = Message::from_vec(&buf[..len]).unwrap();
            let mut response = crate::dns::reply_to(&request);
            response.set_truncated(true);
            let bytes = response.to_vec().unwrap();
            udp.send_to(&bytes, src).await.unwrap();
        });
        tokio::spawn(async move {
            let (mut stream, _) = tcp.accept().await.unwrap();
            let bytes = read_frame(&mut stream).await.unwrap().unwrap();
            let request = Message::from_vec(&bytes).unwrap();
            let response = answer(&request, TCP_IP, 300, 1);
            let bytes = response.to_vec().unwrap();
            write_frame(&mut stream, &bytes).await.unwrap();
        });

        let resolver = Resolver::new(addr, &ResolverConfig::default());
        let response = resolver.forward(&example(6)).await.unwrap();

        assert_eq!(response.id(), 6);
        assert!(!response.truncated());
        assert_eq!(first_ip(&response), TCP_IP);
    }
}
