// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use bytes::{BufMut, Bytes, BytesMut};
use clap::{Args, Parser, Subcommand, ValueEnum};
use evcache_common_telemetry::{LogFormat, LoggingOptions, init_global_logging, set_panic_hook};
use evcache_queue::{
    Argument, CacheConfig, Event, Stage, metrics, prepare_cache,
    sizing::{
        capacity_in_events, events_for_mb, host_memory_mb, items_per_segment, memory_tier_mb,
    },
};
use snafu::{ResultExt, Snafu, Whatever, ensure_whatever, whatever};
use tracing::{info, warn};

mod build_info;

/// `Whatever`-style error whose source is `Send + Sync`, so it can be
/// returned from a spawned thread.
#[derive(Debug, Snafu)]
#[snafu(whatever, display("{message}"))]
struct SendWhatever {
    #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    message: String,
}

#[derive(Debug, Parser)]
#[clap(
name = "evcache",
about= "evcache-cmd",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Pump(PumpArgs),
    Sizing(SizingArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Push events from a producer thread to a consumer thread through a cache,
checking that they come out in order.
Examples:

evcache pump --cache cache-type=mem --cache mem-cache-size=64 --events 100000

evcache pump --cache cache-type=hybrid --cache mem-cache-size=64 \
    --cache disk-cache-size=512 --cache cache-stage=before-decode

")]
struct PumpArgs {
    /// Cache option as key=value; repeat the flag for several options.
    #[arg(long = "cache", required = true)]
    cache: Vec<String>,

    /// Number of events to push through the cache.
    #[arg(long, default_value_t = 100_000)]
    events: u64,

    /// Size of the filler argument (decoded events) or of each raw payload.
    #[arg(long, default_value_t = 256)]
    payload_size: usize,

    #[arg(long, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,

    /// Also write hourly rotated log files to this directory.
    #[arg(long)]
    log_dir: Option<String>,
}

/// What the consumer saw.
#[derive(Debug, Default)]
struct PumpReport {
    received:  u64,
    peak_size: usize,
}

/// Progress is reported and gauges refreshed every this many events.
const REPORT_INTERVAL: u64 = 1 << 14;

impl PumpArgs {
    fn run(&self) -> Result<(), Whatever> {
        let logging = LoggingOptions::builder()
            .log_format(self.log_format.into())
            .dir(self.log_dir.clone().unwrap_or_default())
            .build();
        let _guards = init_global_logging("evcache", &logging);
        set_panic_hook();

        let Some(cache) =
            prepare_cache(self.cache.as_slice()).whatever_context("invalid cache options")?
        else {
            info!("Caching disabled, nothing to pump");
            return Ok(());
        };
        let cache = Arc::new(cache);
        info!(cache = %cache, capacity = cache.capacity(), events = self.events, "Pumping events");

        {
            let cache = Arc::clone(&cache);
            ctrlc::set_handler(move || {
                warn!("Interrupted, tearing down cache");
                if let Err(e) = cache.teardown() {
                    warn!(error = ?e, "Teardown after interrupt failed");
                }
            })
            .whatever_context("failed to install interrupt handler")?;
        }

        let started = Instant::now();
        let producer = {
            let cache = Arc::clone(&cache);
            let (events, payload_size) = (self.events, self.payload_size);
            thread::Builder::new()
                .name("producer".to_string())
                .spawn(move || produce(&cache, events, payload_size))
                .whatever_context("failed to spawn producer thread")?
        };

        let consumed = consume(&cache, self.events);
        if consumed.is_err() {
            // unblock the producer so it can be joined
            cache.teardown().whatever_context("failed to tear down cache")?;
        }
        let produced = match producer.join() {
            Ok(result) => result,
            Err(_) => whatever!("producer thread panicked"),
        };
        let report = consumed?;
        produced.whatever_context("producer failed")?;

        let elapsed = started.elapsed();
        metrics::observe(&cache);
        cache.teardown().whatever_context("failed to tear down cache")?;

        info!(
            received = report.received,
            peak_size = report.peak_size,
            elapsed = ?elapsed,
            events_per_sec = events_per_sec(report.received, elapsed),
            "Pump finished"
        );
        ensure_whatever!(
            report.received == self.events,
            "cache was torn down after {} of {} events",
            report.received,
            self.events
        );
        Ok(())
    }
}

fn produce(cache: &CacheConfig, events: u64, payload_size: usize) -> Result<(), SendWhatever> {
    match cache.stage() {
        Stage::AfterDecode => {
            let filler = "x".repeat(payload_size);
            for i in 0..events {
                let event = Event {
                    timestamp: i,
                    process_id: std::process::id(),
                    process_name: "evcache".to_string(),
                    event_name: "pump".to_string(),
                    args: vec![Argument::new("payload", filler.as_str())],
                    ..Default::default()
                };
                cache.enqueue(event).whatever_context("enqueue failed")?;
            }
        }
        Stage::BeforeDecode => {
            for i in 0..events {
                let mut raw = BytesMut::with_capacity(payload_size.max(8));
                raw.put_u64_le(i);
                raw.resize(payload_size.max(8), 0xAB);
                cache
                    .enqueue_raw(raw.freeze())
                    .whatever_context("enqueue failed")?;
            }
        }
    }
    Ok(())
}

fn consume(cache: &CacheConfig, events: u64) -> Result<PumpReport, Whatever> {
    let mut report = PumpReport::default();

    for expected in 0..events {
        let marker = match cache.stage() {
            Stage::AfterDecode => cache
                .dequeue()
                .whatever_context("dequeue failed")?
                .map(|event| event.timestamp),
            Stage::BeforeDecode => cache
                .dequeue_raw()
                .whatever_context("dequeue failed")?
                .map(|raw| raw_marker(&raw)),
        };
        let Some(marker) = marker else {
            warn!(
                received = report.received,
                "No item returned (torn down or read failure)"
            );
            break;
        };
        ensure_whatever!(
            marker == expected,
            "events out of order: expected {expected}, got {marker}"
        );

        report.received += 1;
        report.peak_size = report.peak_size.max(cache.size());
        if report.received % REPORT_INTERVAL == 0 {
            metrics::observe(cache);
            info!(received = report.received, size = cache.size(), "Progress");
        }
    }

    Ok(report)
}

fn raw_marker(raw: &Bytes) -> u64 {
    let mut marker = [0u8; 8];
    let len = raw.len().min(8);
    marker[..len].copy_from_slice(&raw[..len]);
    u64::from_le_bytes(marker)
}

#[allow(clippy::cast_precision_loss)]
fn events_per_sec(events: u64, elapsed: Duration) -> f64 {
    events as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Print the queue sizes derived from memory and disk budgets.
Examples:

evcache sizing --mem 512 --disk 8192

")]
struct SizingArgs {
    /// Memory budget in MB; 0 sizes the in-memory queue from the host.
    #[arg(long, default_value_t = 0)]
    mem: usize,

    /// Disk budget in MB for the hybrid queue.
    #[arg(long, default_value_t = 8192)]
    disk: usize,
}

impl SizingArgs {
    #[allow(clippy::unnecessary_wraps)]
    fn run(&self) -> Result<(), Whatever> {
        let host_mb = host_memory_mb();
        println!(
            "host memory:            {}",
            host_mb.map_or_else(|| "unknown".to_string(), |mb| format!("{mb} MB"))
        );
        println!(
            "in-memory capacity:     {} events",
            capacity_in_events(self.mem, 0, host_mb)
        );
        if self.disk < self.mem {
            println!(
                "hybrid:                 unavailable (disk {} MB < memory {} MB)",
                self.disk, self.mem
            );
            return Ok(());
        }
        println!("hybrid capacity:        {} events", events_for_mb(self.disk));
        println!("hybrid memory tier:     {} MB", memory_tier_mb(self.mem));
        println!("items per segment:      {}", items_per_segment(self.mem));
        Ok(())
    }
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    match cli.commands {
        Commands::Pump(pa) => pa.run(),
        Commands::Sizing(sa) => sa.run(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() { Cli::command().debug_assert(); }

    #[test]
    fn test_parse_pump_args() {
        let cli = Cli::try_parse_from([
            "evcache",
            "pump",
            "--cache",
            "cache-type=mem",
            "--cache",
            "mem-cache-size=8",
            "--events",
            "10",
        ])
        .unwrap();
        let Commands::Pump(args) = cli.commands else {
            panic!("expected pump");
        };
        assert_eq!(args.cache, ["cache-type=mem", "mem-cache-size=8"]);
        assert_eq!(args.events, 10);
        assert_eq!(args.payload_size, 256);
    }

    #[test]
    fn test_pump_through_memory_cache() {
        let cache = Arc::new(
            prepare_cache(&["cache-type=mem", "mem-cache-size=1", "cache-stage=before-decode"])
                .unwrap()
                .unwrap(),
        );
        let producer = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || produce(&cache, 5_000, 16))
        };
        let report = consume(&cache, 5_000).unwrap();
        producer.join().unwrap().unwrap();

        assert_eq!(report.received, 5_000);
        assert!(report.peak_size <= cache.capacity());
    }

    #[test]
    fn test_raw_marker() {
        assert_eq!(raw_marker(&Bytes::from(42u64.to_le_bytes().to_vec())), 42);
        assert_eq!(raw_marker(&Bytes::from_static(&[7])), 7);
    }
}
