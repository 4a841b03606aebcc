//! Replay a CSV of client requests through a threaded matching engine.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;

use flash_exchange::engine::EngineLinks;
use flash_exchange::{logging, replay, Config, MatchingEngine, RunFlag, Side};

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay client requests through the matching engine")]
struct Args {
    /// CSV file of requests
    #[arg(short, long)]
    input: PathBuf,

    /// TOML configuration; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Price increment used to convert CSV prices to ticks
    #[arg(long, default_value = "0.01")]
    tick_size: String,

    /// Number of book levels to print per side
    #[arg(long, default_value_t = 5)]
    depth: usize,
}

#[derive(Default)]
struct Tally {
    responses: BTreeMap<String, u64>,
    updates: BTreeMap<String, u64>,
}

impl Tally {
    fn drain(&mut self, links: &mut EngineLinks) -> bool {
        let mut any = false;
        while let Some(response) = links.responses.pop() {
            *self.responses.entry(response.kind.to_string()).or_default() += 1;
            any = true;
        }
        while let Some(update) = links.updates.pop() {
            *self.updates.entry(update.kind.to_string()).or_default() += 1;
            any = true;
        }
        any
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    let _log_guard = logging::init(&config.logging).context("initialising logging")?;

    let tick_size = Decimal::from_str(&args.tick_size)
        .with_context(|| format!("invalid tick size '{}'", args.tick_size))?;
    let requests = replay::read_requests_from_path(&args.input, tick_size)
        .with_context(|| format!("reading {}", args.input.display()))?;
    if let Some(bad) = requests
        .iter()
        .find(|r| r.request.ticker_id as usize >= config.engine.max_tickers)
    {
        bail!("request for ticker {} but only {} configured", bad.request.ticker_id, config.engine.max_tickers);
    }
    info!(requests = requests.len(), input = %args.input.display(), "loaded replay");

    let (engine, mut links) = MatchingEngine::with_transports(&config.engine);
    let run = RunFlag::new();
    let handle = engine
        .start(run.clone(), config.engine.core_id)
        .context("starting matching engine thread")?;

    let start = Instant::now();
    let mut tally = Tally::default();
    for entry in &requests {
        while links.requests.is_full() {
            tally.drain(&mut links);
        }
        links.requests.push(entry.request);
        tally.drain(&mut links);
    }

    // A request's output is pushed before its slot is released.
    while !links.requests.is_empty() {
        if !tally.drain(&mut links) {
            std::hint::spin_loop();
        }
    }
    tally.drain(&mut links);
    let elapsed = start.elapsed();

    run.stop();
    let engine = handle
        .join()
        .map_err(|_| anyhow::anyhow!("matching engine thread panicked"))?
        .context("matching engine exited with an error")?;

    println!("=== Replay Summary ===");
    println!("Requests:   {}", requests.len());
    println!("Elapsed:    {:?}", elapsed);
    println!(
        "Throughput: {:.2} req/sec",
        requests.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("\nResponses:");
    for (kind, count) in &tally.responses {
        println!("  {:16} {:10}", kind, count);
    }
    println!("Market updates:");
    for (kind, count) in &tally.updates {
        println!("  {:16} {:10}", kind, count);
    }

    for ticker_id in 0..engine.ticker_count() as u32 {
        let Some(book) = engine.book(ticker_id) else { continue };
        if book.is_empty() {
            continue;
        }
        println!("\nTicker {} ({} resting orders)", ticker_id, book.order_count());
        for side in [Side::Sell, Side::Buy] {
            let levels = book.top_levels::<16>(side);
            for (price, qty, count) in levels.iter().take(args.depth) {
                println!("  {:4} {:>12} {:>10} ({} orders)", side.to_string(), price, qty, count);
            }
        }
    }

    Ok(())
}
