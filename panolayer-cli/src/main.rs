//! PanoLayer CLI - Command-line demo driver
//!
//! Runs a synthetic camera sweep against the tile engine using the
//! deterministic simulation provider, then prints what the scheduler and
//! cache did. Useful for eyeballing budget/eviction behaviour under
//! different tunings without a real viewer attached.

use clap::{Parser, ValueEnum};
use std::process;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::debug;

use panolayer::coord::{tiles_per_axis, TileCoord, MAX_LEVEL};
use panolayer::engine::{CostPolicy, EngineConfig, TileEngine};
use panolayer::job::Priority;
use panolayer::logging::init_logging;
use panolayer::provider::SimProvider;
use panolayer::sched::SchedulerConfig;
use panolayer::time::SystemClock;

#[derive(Debug, Clone, ValueEnum)]
enum CostPolicyArg {
    /// Capacity counts resident tiles
    Entries,
    /// Capacity counts resident payload bytes
    Bytes,
}

#[derive(Parser)]
#[command(name = "panolayer")]
#[command(about = "Simulate a panning camera against the tile engine", long_about = None)]
#[command(version = panolayer::VERSION)]
struct Args {
    /// Number of camera frames to simulate
    #[arg(long, default_value = "120")]
    frames: u32,

    /// Pyramid level the camera looks at
    #[arg(long, default_value = "6")]
    level: u8,

    /// Viewport width in tiles
    #[arg(long, default_value = "4")]
    viewport: u32,

    /// Cache capacity (tiles or bytes, per --cost-policy)
    #[arg(long, default_value = "256")]
    capacity: u64,

    /// How the cache prices resident tiles
    #[arg(long, value_enum, default_value = "entries")]
    cost_policy: CostPolicyArg,

    /// Provider latency in polls per fetch
    #[arg(long, default_value = "3")]
    latency: u32,

    /// Payload size per tile in bytes
    #[arg(long, default_value = "4096")]
    payload: usize,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging() {
        eprintln!("Error: failed to initialize logging: {}", e);
        process::exit(1);
    }

    if args.level > MAX_LEVEL {
        eprintln!("Error: level must be at most {}", MAX_LEVEL);
        process::exit(1);
    }
    if args.viewport == 0 || args.frames == 0 {
        eprintln!("Error: frames and viewport must be at least 1");
        process::exit(1);
    }

    let provider = Rc::new(SimProvider::new(args.latency, args.payload));
    let config = EngineConfig {
        cache_capacity: args.capacity,
        cost_policy: match args.cost_policy {
            CostPolicyArg::Entries => CostPolicy::PerEntry,
            CostPolicyArg::Bytes => CostPolicy::PayloadBytes,
        },
        scheduler: SchedulerConfig::default(),
        ..EngineConfig::default()
    };
    let mut engine = TileEngine::new(config, provider.clone(), SystemClock);

    let extent = tiles_per_axis(args.level);
    let mut ticks = 0u32;
    let mut ready = 0u32;
    let mut failed = 0u32;
    let mut budget_total = Duration::ZERO;

    for frame in 0..args.frames {
        engine.apply_needed(&needed_set(frame, args.level, args.viewport, extent));
        let summary = engine.tick(Instant::now());
        debug!(
            frame,
            steps = summary.steps,
            ready = summary.ready,
            budget_ms = summary.budget.as_millis() as u64,
            "frame"
        );
        ready += summary.ready;
        failed += summary.failed;
        budget_total += summary.budget;
        ticks += 1;
    }

    // Let the backlog drain once the camera stops moving.
    while engine.is_armed() {
        let summary = engine.tick(Instant::now());
        ready += summary.ready;
        failed += summary.failed;
        budget_total += summary.budget;
        ticks += 1;
    }

    let stats = engine.cache_stats();
    println!("Simulated {} frames at level {}", args.frames, args.level);
    println!("  ticks:           {}", ticks);
    println!("  tiles ready:     {}", ready);
    println!("  tiles failed:    {}", failed);
    println!("  fetches begun:   {}", provider.begun());
    println!("  fetches dropped: {}", provider.cancelled());
    println!(
        "  cache:           {} resident / {} cost units, {} evictions, {:.1}% hit ratio",
        stats.entry_count,
        stats.resident_cost,
        stats.evictions,
        stats.hit_ratio() * 100.0
    );
    println!(
        "  frame cost ema:  {:.2} ms (mean budget {:.1} ms)",
        engine.frame_cost_ema_ms(),
        budget_total.as_secs_f64() * 1000.0 / f64::from(ticks.max(1))
    );
}

/// Needed set for one frame of a camera panning one column per frame:
/// the viewport columns on demand, their flanks adjacent, and the next
/// column to be revealed as prefetch.
fn needed_set(frame: u32, level: u8, viewport: u32, extent: u32) -> Vec<(TileCoord, Priority)> {
    let mut needed = Vec::new();
    let base = frame % extent;
    let row = extent / 2;
    for offset in 0..viewport {
        let x = (base + offset) % extent;
        if let Ok(coord) = TileCoord::new(0, x, row, level) {
            needed.push((coord, Priority::ON_DEMAND));
        }
    }
    let flank = (base + viewport) % extent;
    if let Ok(coord) = TileCoord::new(0, flank, row, level) {
        needed.push((coord, Priority::ADJACENT));
    }
    let ahead = (base + viewport + 1) % extent;
    if let Ok(coord) = TileCoord::new(0, ahead, row, level) {
        needed.push((coord, Priority::PREFETCH));
    }
    needed
}
