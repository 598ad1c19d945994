#![allow(missing_docs)]
use balios::{BaliosCache, CacheConfig};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn make_cache(cap: usize) -> BaliosCache<u64, u64> {
    BaliosCache::init(CacheConfig::new(cap), None).expect("valid config")
}

fn bench_get_hit(c: &mut Criterion) {
    let cache = make_cache(10_000);
    for key in 0..10_000u64 {
        cache.set(key, key);
    }
    let mut key = 0u64;
    c.bench_function("get_hit", |b| {
        b.iter(|| {
            key = (key + 1) % 10_000;
            black_box(cache.get(&key))
        })
    });
}

fn bench_get_miss(c: &mut Criterion) {
    let cache = make_cache(10_000);
    let mut key = 1_000_000u64;
    c.bench_function("get_miss", |b| {
        b.iter(|| {
            key += 1;
            black_box(cache.get(&key))
        })
    });
}

fn bench_set_insert(c: &mut Criterion) {
    let cache = make_cache(10_000);
    let mut key = 0u64;
    c.bench_function("set_insert", |b| {
        b.iter(|| {
            key += 1;
            black_box(cache.set(key, key))
        })
    });
}

fn bench_set_update(c: &mut Criterion) {
    let cache = make_cache(10_000);
    for key in 0..64u64 {
        cache.set(key, key);
    }
    let mut key = 0u64;
    c.bench_function("set_update", |b| {
        b.iter(|| {
            key = (key + 1) % 64;
            black_box(cache.set(key, key))
        })
    });
}

fn bench_mixed_skewed(c: &mut Criterion) {
    // 90% reads over a hot set, 10% writes streaming new keys, which is the
    // shape the admission policy is built for.
    let cache = make_cache(10_000);
    for key in 0..10_000u64 {
        cache.set(key, key);
    }
    let mut tick = 0u64;
    c.bench_function("mixed_skewed", |b| {
        b.iter(|| {
            tick += 1;
            if tick % 10 == 0 {
                black_box(cache.set(1_000_000 + tick, tick));
            } else {
                // Concentrate reads on a small hot fraction.
                black_box(cache.get(&(tick % 500)));
            }
        })
    });
}

fn bench_get_or_load_hit(c: &mut Criterion) {
    let cache = make_cache(10_000);
    cache.set(7, 7);
    c.bench_function("get_or_load_hit", |b| {
        b.iter(|| black_box(cache.get_or_load(7, || Ok(0))))
    });
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_get_miss,
    bench_set_insert,
    bench_set_update,
    bench_mixed_skewed,
    bench_get_or_load_hit,
);
criterion_main!(benches);
