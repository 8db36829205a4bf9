//! Throughput benchmarks for the sync client hot paths
//!
//! Run with: cargo bench --bench sync_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use purge_sync::config::SyncConfig;
use purge_sync::game::state::PlayerPatch;
use purge_sync::net::batcher::UpdateBatcher;
use purge_sync::net::protocol;
use purge_sync::net::session::{SessionCore, SessionKey};
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Full `sync` frame with randomly placed players
fn sync_frame(count: usize) -> String {
    let mut rng = rand::thread_rng();
    let players: Vec<_> = (0..count)
        .map(|i| {
            serde_json::json!({
                "id": format!("player-{i}"),
                "x": rng.gen_range(-2000.0..2000.0),
                "y": rng.gen_range(-2000.0..2000.0),
                "vx": rng.gen_range(-200.0..200.0),
                "vy": rng.gen_range(-200.0..200.0),
                "hp": 100.0,
                "isAlive": true,
            })
        })
        .collect();
    serde_json::json!({"type": "sync", "players": players, "phase": "active"}).to_string()
}

fn bench_decode_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_sync");

    for count in [10, 100, 500] {
        let frame = sync_frame(count);
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &frame, |b, frame| {
            b.iter(|| protocol::decode(black_box(frame)))
        });
    }

    group.finish();
}

fn bench_batcher(c: &mut Criterion) {
    let mut group = c.benchmark_group("batcher");
    group.throughput(Throughput::Elements(10));

    group.bench_function("queue_10_flush_1", |b| {
        let mut batcher = UpdateBatcher::new(100, 50);
        let mut now = Instant::now();
        b.iter(|| {
            for i in 0..10 {
                batcher.queue(
                    PlayerPatch {
                        x: Some(i as f32),
                        ..Default::default()
                    },
                    i,
                );
            }
            now += Duration::from_millis(50);
            black_box(batcher.flush(now, Duration::from_millis(50), true))
        });
    });

    group.finish();
}

fn bench_session_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_on_frame");
    let update = r#"{"type":"player:update","playerId":"other","state":{"x":12.5,"y":-4.0}}"#;
    let sync = sync_frame(100);

    let mut core = SessionCore::new(SessionKey::new("bench", "me"), &SyncConfig::default());
    let now = Instant::now();
    core.begin_connect();
    core.on_open(now);

    group.bench_function("player_update", |b| {
        b.iter(|| core.on_frame(black_box(update), now))
    });
    group.bench_function("sync_100", |b| {
        b.iter(|| core.on_frame(black_box(&sync), now))
    });

    group.finish();
}

criterion_group!(benches, bench_decode_sync, bench_batcher, bench_session_frames);
criterion_main!(benches);
