use flash_exchange::{MatchSink, OrderBook, Side};
use flash_exchange::{ClientResponse, MarketUpdate};
use hdrhistogram::Histogram;
use std::time::Instant;

/// Counts output instead of storing it, so the measurement is the book.
#[derive(Default)]
struct CountingSink {
    responses: u64,
    updates: u64,
}

impl MatchSink for CountingSink {
    #[inline]
    fn on_client_response(&mut self, response: &ClientResponse) {
        std::hint::black_box(response);
        self.responses += 1;
    }

    #[inline]
    fn on_market_update(&mut self, update: &MarketUpdate) {
        std::hint::black_box(update);
        self.updates += 1;
    }
}

fn main() -> anyhow::Result<()> {
    println!("Preparing Latency Benchmark...");

    // Setup
    let mut book = OrderBook::new(0, 100_000, 1024);
    book.warm_up();
    let mut sink = CountingSink::default();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3)?;

    const ITERATIONS: u64 = 1_000_000;

    println!("Running {} iterations...", ITERATIONS);

    let mut total_duration = std::time::Duration::new(0, 0);

    for order_id in 1..=ITERATIONS {
        let side = if order_id % 2 == 0 { Side::Buy } else { Side::Sell };
        let price = 10000 + (order_id % 100) as i64;

        // Critical measurement section
        let start = Instant::now();
        book.add(&mut sink, 1, order_id, side, price, 10);
        let elapsed = start.elapsed();

        // Outliers beyond the histogram bound are dropped
        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;

        // Keep the pool from filling up
        if book.order_count() > 50_000 {
            if let Some(oldest) = order_id.checked_sub(50_000) {
                book.cancel(&mut sink, 1, oldest);
            }
        }
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", ITERATIONS);
    println!("Throughput: {:.2} ops/sec", ITERATIONS as f64 / total_duration.as_secs_f64());
    println!("Responses:  {}", sink.responses);
    println!("Updates:    {}", sink.updates);
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("P99.99: {:6} ns", histogram.value_at_quantile(0.9999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        if count > 0 {
            println!("<= {:8} ns: {:10} count", v.value_iterated_to(), count);
        }
    }

    Ok(())
}
