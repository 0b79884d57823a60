/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use qruff::config::HostConfig;
use qruff::io::rtu::{self, RtuLink, SerialSettings};
use qruff::io::{dns, fs};
use qruff::sink::DEFAULT_SINK_CAPACITY;
use qruff::timer::driver;
use qruff::{CommandGenerator, CommandTable, Endpoint, GeneratorStats, Pipe, TimerQueue};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Periodic Modbus command generator.
///
/// Example:
///   qruff --commands table.json --run-ms 3000 \
///         --serial /dev/ttyUSB0 --baud 9600 --unit 1
#[derive(Debug, Parser)]
#[command(
    name = "qruff",
    about = "qruff – periodic Modbus command generator",
    long_about = None,
)]
struct Cli {
    /// JSON command table (overrides `commands` in the host config).
    #[arg(short = 'c', long = "commands")]
    commands: Option<PathBuf>,

    /// YAML host configuration file.
    #[arg(short = 'f', long = "config")]
    config: Option<PathBuf>,

    /// How long to run, in milliseconds.
    #[arg(short = 't', long = "run-ms")]
    run_ms: Option<u64>,

    /// Serial device for the RTU link; frames are piped to it.
    #[arg(short = 's', long = "serial")]
    serial: Option<String>,

    /// Serial baud rate.
    #[arg(short = 'b', long = "baud")]
    baud: Option<u32>,

    /// Modbus unit (slave) id.
    #[arg(short = 'u', long = "unit")]
    unit: Option<u8>,

    /// Resolve a host name, print its address records and exit.
    #[arg(long = "resolve")]
    resolve: Option<String>,
}

impl Cli {
    /// Fold command-line overrides into the file configuration.
    fn apply_to(&self, config: &mut HostConfig) {
        if let Some(path) = &self.commands {
            config.commands = Some(path.clone());
        }
        if let Some(run_ms) = self.run_ms {
            config.run_ms = run_ms;
        }
        if let Some(path) = &self.serial {
            match config.serial.as_mut() {
                Some(serial) => serial.path = path.clone(),
                None => config.serial = Some(SerialSettings::new(path.clone(), 9600, 1)),
            }
        }
        if let Some(serial) = config.serial.as_mut() {
            if let Some(baud) = self.baud {
                serial.baud_rate = baud;
            }
            if let Some(unit) = self.unit {
                serial.unit_id = unit;
            }
        } else if self.baud.is_some() || self.unit.is_some() {
            warn!("--baud/--unit ignored: no serial port configured");
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match &cli.resolve {
        Some(host) => resolve(host).await,
        None => run(&cli).await,
    };
    if let Err(e) = outcome {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn resolve(host: &str) -> Result<()> {
    let payload = dns::resolve(host)
        .await
        .with_context(|| format!("Cannot resolve {host}"))?;
    for record in dns::decode_records(&payload)? {
        println!("{:?} {}", record.family, record.address);
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => HostConfig::load_from_file(path)?,
        None => HostConfig::default(),
    };
    cli.apply_to(&mut config);

    info!(
        commands = ?config.commands,
        serial   = ?config.serial.as_ref().map(|s| &s.path),
        run_ms   = config.run_ms,
        "Configuration"
    );

    let table_path = config
        .commands
        .clone()
        .context("No command table given (use --commands or `commands:` in the host config)")?;
    let payload = fs::read_to_string(&table_path).await?;
    let table = CommandTable::from_json(&payload)
        .with_context(|| format!("Invalid command table: {}", table_path.display()))?;

    // ── Pipeline ──────────────────────────────────────────────────────────────
    let timer = Rc::new(TimerQueue::with_capacity(config.max_timers));
    let generator = CommandGenerator::from_table(table, timer.clone());

    let endpoint = Endpoint::with_capacity(config.sink_capacity);
    generator.attach_endpoint(&endpoint);

    let link = match &config.serial {
        Some(settings) => {
            let link = RtuLink::open(settings.clone())?;
            let (tx, rx) = mpsc::channel(DEFAULT_SINK_CAPACITY);
            let pipe = Pipe::with_capacity(config.sink_capacity);
            pipe.forward_to(tx)?;
            generator.attach_pipe(pipe)?;
            Some((link, rx))
        }
        None => None,
    };

    // ── Run ───────────────────────────────────────────────────────────────────
    let run_for = Duration::from_millis(config.run_ms);
    let drive = async move {
        generator.run();
        tokio::select! {
            _ = driver::run_for(&timer, run_for) => {}
            _ = tokio::signal::ctrl_c() => warn!("Interrupted, stopping early"),
        }
        generator.stop();
        let stats = generator.stats();
        // closes the RTU channel so the forwarder can finish
        drop(generator);
        stats
    };
    let forward = async move {
        match link {
            Some((mut link, rx)) => Some(rtu::forward_frames(&mut link, rx).await),
            None => None,
        }
    };
    let (stats, forwarded) = tokio::join!(drive, forward);

    // ── Report ────────────────────────────────────────────────────────────────
    print!("{}", endpoint.show());
    report(&stats, &endpoint);
    if let Some(fwd) = forwarded {
        info!(polled = fwd.polled, failed = fwd.failed, "RTU link");
    }
    Ok(())
}

fn report(stats: &GeneratorStats, endpoint: &Endpoint) {
    info!(
        fired = stats.fired,
        delivered = stats.delivered,
        unrouted = stats.unrouted,
        terminated = stats.terminated,
        endpoint_frames = endpoint.len(),
        endpoint_dropped = endpoint.dropped(),
        "Generator stopped"
    );
}
