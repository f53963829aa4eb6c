//! # PDM Control Core
//!
//! Runs the power-control loop against the simulation adapters: a
//! paced cooperative tick, the serial CLI on stdin, and a file-backed
//! configuration store. On the target board the simulation adapters are
//! replaced by the real ADC/GPIO and CAN drivers behind the same
//! traits; the loop body is identical.

use std::io::BufRead;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::reload;

use pdm_core::adapters::{FileStore, SimCanBus, SimHardware};
use pdm_core::cli;
use pdm_core::config::load_or_default;
use pdm_core::cycle::Controller;

#[derive(Parser, Debug)]
#[command(name = "pdm_core", about = "Four-channel PDM power-control loop")]
struct Args {
    /// Path to the persisted configuration blob.
    #[arg(long, default_value = "pdm_config.bin")]
    store: std::path::PathBuf,

    /// Tick interval [ms] (50–200 Hz → 5–20 ms).
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Exit after this many seconds; run forever when absent.
    #[arg(long)]
    run_secs: Option<u64>,
}

fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn main() {
    let args = Args::parse();

    let (filter, filter_handle) = reload::Layer::new(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    info!(store = %args.store.display(), tick_ms = args.tick_ms, "PDM control core starting");

    let mut store = FileStore::new(&args.store);
    let config = load_or_default(&mut store);
    let mut ctrl = Controller::new(config);
    let mut hw = SimHardware::default();
    let mut can = SimCanBus::default();
    ctrl.startup(&mut can);

    // CLI lines arrive on a channel; the tick drains it without blocking.
    let (line_tx, line_rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let boot = Instant::now();
    let tick = Duration::from_millis(args.tick_ms.max(1));
    let mut verbosity = ctrl.log_verbosity();

    loop {
        let tick_start = Instant::now();
        let now_ms = boot.elapsed().as_millis() as u64;

        ctrl.tick(&mut hw, &mut can, now_ms);
        // The simulation bus has no far end; keep its TX log bounded.
        can.take_sent();

        while let Ok(line) = line_rx.try_recv() {
            let response = cli::process_line(&mut ctrl, &mut store, &mut can, now_ms, &line);
            if !response.is_empty() {
                println!("{response}");
            }
            if ctrl.log_verbosity() != verbosity {
                verbosity = ctrl.log_verbosity();
                let _ = filter_handle.modify(|f| *f = level_for(verbosity));
            }
        }

        ctrl.stats.record(tick_start.elapsed().as_micros() as u64);

        if let Some(secs) = args.run_secs {
            if boot.elapsed().as_secs() >= secs {
                break;
            }
        }
        if let Some(remaining) = tick.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    info!(
        ticks = ctrl.stats.tick_count,
        avg_us = ctrl.stats.avg_tick_us(),
        max_us = ctrl.stats.max_tick_us,
        "PDM control core stopping"
    );
}
