use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use wirenet::config::ConnectionSettings;
use wirenet::http::HttpRequest;
use wirenet::socket::{ConnectionKey, ConnectionKind, ConnectionPool, PoolManager};
use url::Url;

/// Key routing and pool lookup; pure in-memory work, no sockets.
fn benchmark_pool_operations(c: &mut Criterion) {
    let manager = PoolManager::new(ConnectionSettings::default());
    let request = HttpRequest::get(Url::parse("https://example.com/index.html").unwrap());

    c.bench_function("key_for", |b| b.iter(|| black_box(manager.key_for(black_box(&request)))));

    let key = manager.key_for(&request).unwrap();
    let _ = manager.pool_for(&key);
    c.bench_function("pool_lookup_hit", |b| b.iter(|| black_box(manager.pool_for(&key))));

    let settings = Arc::new(ConnectionSettings::default());
    c.bench_function("pool_new", |b| {
        b.iter(|| {
            ConnectionPool::new(
                ConnectionKey::new(ConnectionKind::Http, "example.com", 80),
                settings.clone(),
            )
        })
    });

    let pool = manager.pool_for(&key);
    c.bench_function("pool_stats", |b| {
        b.iter(|| {
            let _ = black_box(pool.idle_count());
            let _ = black_box(pool.associated_count());
            let _ = black_box(pool.waiter_count());
        })
    });
}

criterion_group!(benches, benchmark_pool_operations);
criterion_main!(benches);
