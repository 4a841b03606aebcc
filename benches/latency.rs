//! Benchmark harness using Criterion for latency measurement.
//!
//! Measures:
//! - Add order (rests, then cancelled)
//! - Add order (full match)
//! - Cancel order
//! - Mixed workload
//! - Ring transport and slab primitives
//! - Engine round trip through the transports

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flash_exchange::{
    ClientRequest, ClientRequestType, EngineConfig, MatchingEngine, OrderBook, OrderId,
    OutputEvent, RingTransport, Side, SlabAllocator,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Live orders above which the mixed workload only cancels
const MIXED_HIGH_WATER: usize = 50_000;

fn random_side(rng: &mut ChaCha8Rng) -> Side {
    if rng.gen_bool(0.5) {
        Side::Buy
    } else {
        Side::Sell
    }
}

/// Benchmark: Add an order that rests, then cancel it
fn bench_add_no_match(c: &mut Criterion) {
    let mut book = OrderBook::new(0, 100_000, 1024);
    book.warm_up();
    let mut events = Vec::with_capacity(16);

    // Background depth on both sides
    for i in 1..=1000u64 {
        let (side, price) = if i % 2 == 0 { (Side::Buy, 9000 + (i % 50) as i64) } else { (Side::Sell, 11000 + (i % 50) as i64) };
        book.add(&mut events, 1, i, side, price, 100);
    }

    let mut order_id: OrderId = 1_000_000;

    c.bench_function("add_no_match_then_cancel", |b| {
        b.iter(|| {
            order_id += 1;
            events.clear();
            book.add(&mut events, 2, order_id, Side::Buy, 9500, 100);
            book.cancel(&mut events, 2, order_id);
            black_box(events.len())
        })
    });
}

/// Benchmark: Add an order that fully matches
fn bench_add_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_full_match");

    for depth in [1u64, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut book = OrderBook::new(0, 100_000, 1024);
            book.warm_up();
            let mut events = Vec::with_capacity(1024);

            // Resting asks at one price; each aggressor takes the head
            for i in 1..=depth {
                book.add(&mut events, 1, i, Side::Sell, 10000, 100);
            }

            let mut order_id: OrderId = 1_000;

            b.iter(|| {
                order_id += 2;
                events.clear();
                book.add(&mut events, 2, order_id, Side::Buy, 10000, 100);

                // Replenish the matched order
                book.add(&mut events, 1, order_id + 1, Side::Sell, 10000, 100);

                black_box(events.len())
            })
        });
    }

    group.finish();
}

/// Benchmark: Cancel order
fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");

    for book_size in [100u64, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(book_size), book_size, |b, &book_size| {
            let mut book = OrderBook::new(0, 100_000, 1024);
            book.warm_up();
            let mut events = Vec::with_capacity(16);

            let place = |book: &mut OrderBook, events: &mut Vec<OutputEvent>, order_id: OrderId| {
                let (side, price) = if order_id % 2 == 0 {
                    (Side::Buy, 9000 + (order_id % 100) as i64 * 10)
                } else {
                    (Side::Sell, 11000 + (order_id % 100) as i64 * 10)
                };
                book.add(events, 1, order_id, side, price, 100);
            };

            for order_id in 1..=book_size {
                place(&mut book, &mut events, order_id);
            }

            // Cancel the oldest, replenish at the back
            let mut cancel_id: OrderId = 1;
            let mut next_order_id = book_size + 1;

            b.iter(|| {
                events.clear();
                book.cancel(&mut events, 1, cancel_id);
                place(&mut book, &mut events, next_order_id);

                cancel_id += 1;
                next_order_id += 1;

                black_box(events.len())
            })
        });
    }

    group.finish();
}

/// Benchmark: Mixed workload (realistic trading scenario)
fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_workload");

    // 70% add, 30% cancel
    group.bench_function("70_add_30_cancel", |b| {
        let mut book = OrderBook::new(0, 100_000, 1024);
        book.warm_up();
        let mut events = Vec::with_capacity(1024);

        let mut rng = ChaCha8Rng::seed_from_u64(0xDEADBEEF);
        let mut order_id: OrderId = 0;

        // Pre-populate
        for _ in 0..1000 {
            order_id += 1;
            let side = random_side(&mut rng);
            book.add(&mut events, 1, order_id, side, rng.gen_range(9900..10100), rng.gen_range(1..1000));
        }

        b.iter(|| {
            events.clear();
            if rng.gen_bool(0.7) && book.order_count() < MIXED_HIGH_WATER {
                order_id += 1;
                let side = random_side(&mut rng);
                book.add(&mut events, 1, order_id, side, rng.gen_range(9900..10100), rng.gen_range(1..1000));
            } else {
                // Cancel (random id, possibly already gone)
                let cancel_id = rng.gen_range(1..=order_id);
                book.cancel(&mut events, 1, cancel_id);
            }
            black_box(events.len())
        })
    });

    group.finish();
}

/// Benchmark: Transport and pool primitives
fn bench_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("primitives");

    group.bench_function("ring_push_pop", |b| {
        let (mut writer, mut reader) = RingTransport::<ClientRequest>::with_capacity(1024);
        let request = ClientRequest::new(ClientRequestType::New, 1, 0, 1, Side::Buy, 100, 10);
        b.iter(|| {
            writer.push(black_box(request));
            black_box(reader.pop())
        })
    });

    group.bench_function("slab_allocate_deallocate", |b| {
        let mut slab = SlabAllocator::<u64>::new(1024);
        slab.warm_up();
        let mut value = 0u64;
        b.iter(|| {
            value += 1;
            let index = slab.allocate(black_box(value));
            black_box(slab.deallocate(index))
        })
    });

    group.finish();
}

/// Benchmark: Request in, responses and updates out, on one thread
fn bench_engine_round_trip(c: &mut Criterion) {
    let cfg = EngineConfig {
        max_tickers: 1,
        max_orders: 100_000,
        max_price_levels: 1024,
        max_pending_requests: 1024,
        max_client_updates: 1024,
        max_market_updates: 1024,
        core_id: None,
    };
    let (mut engine, mut links) = MatchingEngine::with_transports(&cfg);
    engine.warm_up();

    let mut order_id: OrderId = 0;

    c.bench_function("engine_new_cancel_round_trip", |b| {
        b.iter(|| {
            order_id += 1;
            links.requests.push(ClientRequest::new(
                ClientRequestType::New,
                1,
                0,
                order_id,
                Side::Sell,
                10000,
                10,
            ));
            links.requests.push(ClientRequest::new(
                ClientRequestType::Cancel,
                1,
                0,
                order_id,
                Side::Invalid,
                0,
                0,
            ));
            engine.poll();
            while let Some(response) = links.responses.pop() {
                black_box(response);
            }
            while let Some(update) = links.updates.pop() {
                black_box(update);
            }
        })
    });
}

/// Benchmark: Throughput (orders per second)
fn bench_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("throughput");
    group.throughput(criterion::Throughput::Elements(1000));

    group.bench_function("1000_orders", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(0xCAFEBABE);
        let mut events = Vec::with_capacity(1 << 16);

        b.iter(|| {
            let mut book = OrderBook::new(0, 2048, 512);
            events.clear();
            for order_id in 1..=1000u64 {
                let side = random_side(&mut rng);
                book.add(&mut events, 1, order_id, side, rng.gen_range(9900..10100), rng.gen_range(1..1000));
            }
            black_box(book.order_count())
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_add_no_match,
    bench_add_full_match,
    bench_cancel,
    bench_mixed_workload,
    bench_primitives,
    bench_engine_round_trip,
    bench_throughput,
);

criterion_main!(benches);
