//! Benchmarks for the query pipeline.
//!
//! Covers the paths that never leave the process: sinkholed names and
//! cache hits. Run with: cargo bench

use std::hint::black_box;
use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, Throughput};
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use rand::Rng;

use adsink::error::ResolveError;
use adsink::events::EventLog;
use adsink::filter::Matcher;
use adsink::pipeline::Pipeline;
use adsink::resolver::Upstream;
use adsink::stats::Stats;
use adsink::transport::Protocol;

/// Answers instantly so cache misses only fill the cache.
struct InstantUpstream;

#[async_trait]
impl Upstream for InstantUpstream {
    async fn forward(&self, request: &Message) -> Result<Message, ResolveError> {
        let mut response = adsink::dns::reply_to(request);
        let name = request.queries()[0].name().clone();
        response.add_answer(Record::from_rdata(
            name,
            3600,
            RData::A(A(Ipv4Addr::new(192, 0, 2, 1))),
        ));
        Ok(response)
    }
}

fn query_packet(id: u16, domain: &str) -> Vec<u8> {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    message.add_query(Query::query(
        Name::from_ascii(domain).unwrap(),
        RecordType::A,
    ));
    message.to_vec().unwrap()
}

fn pipeline() -> Pipeline {
    let mut matcher = Matcher::new();
    for i in 0..10_000 {
        matcher.add(&format!("ads{i}.tracker.net"));
    }
    Pipeline::new(
        Arc::new(matcher),
        Arc::new(InstantUpstream),
        Arc::new(Stats::new()),
        Arc::new(EventLog::default()),
    )
}

fn bench_pipeline(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let pipeline = pipeline();
    let mut rng = rand::rng();

    let blocked: Vec<Vec<u8>> = (0..1024)
        .map(|i| {
            let name = format!("ads{}.tracker.net.", rng.random_range(0..10_000));
            query_packet(i, &name)
        })
        .collect();
    let cached: Vec<Vec<u8>> = (0..64)
        .map(|i| {
            let name = format!("site{}.example.org.", rng.random_range(0..1_000_000));
            query_packet(i, &name)
        })
        .collect();
    // Warm the cache
    rt.block_on(async {
        for packet in &cached {
            pipeline.handle_packet(packet, Protocol::Udp).await;
        }
    });

    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(1));

    let mut i = 0;
    group.bench_function(BenchmarkId::new("handle_packet", "blocked"), |b| {
        b.to_async(&rt).iter(|| {
            i = (i + 1) % blocked.len();
            let packet = &blocked[i];
            let pipeline = &pipeline;
            async move { black_box(pipeline.handle_packet(packet, Protocol::Udp).await) }
        })
    });

    let mut i = 0;
    group.bench_function(BenchmarkId::new("handle_packet", "cached"), |b| {
        b.to_async(&rt).iter(|| {
            i = (i + 1) % cached.len();
            let packet = &cached[i];
            let pipeline = &pipeline;
            async move { black_box(pipeline.handle_packet(packet, Protocol::Udp).await) }
        })
    });

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_pipeline(&mut criterion);
    criterion.final_summary();
}
