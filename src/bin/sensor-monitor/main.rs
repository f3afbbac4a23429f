mod args;
mod command;

use std::{process::ExitCode, sync::Arc};

use anyhow::{Context as _, Result};
use args::Args;
use chrono_tz::Tz;
use clap::Parser as _;
use sensor_monitor::{
    aggregator::{Aggregator, AlertState, AlertThresholds, LogMode},
    csv_log::{AppendWorker, CsvLog, export_snapshot},
    error::ThresholdError,
    listener::{Listener, ListenerHandle},
    reading::Reading,
};
use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    sync::mpsc,
    time::{Duration, interval},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::command::{Command, HELP};

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        eprintln!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();
    let thresholds =
        AlertThresholds::new(args.min, args.max).context("invalid alert thresholds")?;

    let (reading_tx, reading_rx) = mpsc::unbounded_channel();
    let listener = start_listener(&args.bind, reading_tx)?;

    let (log_tx, log_rx) = mpsc::unbounded_channel();
    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
    let append_worker = AppendWorker::spawn(CsvLog::new(&args.log_file), log_rx, failure_tx)
        .context("failed to start CSV append worker")?;

    let log_mode = if args.continuous_log {
        LogMode::ContinuousAppend
    } else {
        LogMode::Off
    };
    let aggregator = Arc::new(
        Aggregator::new(thresholds, log_mode, args.timezone).with_log_sink(log_tx),
    );

    let forwarder = tokio::spawn({
        let aggregator = Arc::clone(&aggregator);
        async move { aggregator.forward(reading_rx).await }
    });

    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status = interval(Duration::from_secs(args.status_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for interrupt")?;
                info!("interrupt received, shutting down");
                break;
            }
            _ = status.tick() => print_status(&aggregator, args.timezone),
            Some(failure) = failure_rx.recv() => {
                if aggregator.log_mode() == LogMode::ContinuousAppend {
                    aggregator.set_log_mode(LogMode::Off);
                    println!("continuous logging disabled: {failure}");
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("failed to read command")? else {
                    stdin_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }

                match line.parse::<Command>() {
                    Ok(command) => {
                        if let Flow::Quit = execute(command, &aggregator, args.timezone) {
                            break;
                        }
                    }
                    Err(e) => println!("{e:#}"),
                }
            }
        }
    }

    listener.stop();
    tokio::task::spawn_blocking(move || listener.join())
        .await
        .context("failed to join listener")?;
    forwarder.await.context("failed to join forwarder")?;

    drop(aggregator);
    tokio::task::spawn_blocking(move || append_worker.join())
        .await
        .context("failed to join CSV append worker")?;

    Ok(())
}

fn start_listener(
    bind: &str,
    readings: mpsc::UnboundedSender<Reading>,
) -> Result<ListenerHandle> {
    Listener::new(bind)
        .start(readings)
        .inspect_err(|e| error!(%bind, error = %e, "failed to start listener"))
        .with_context(|| format!("failed to start listener on {bind}"))
}

fn execute(command: Command, aggregator: &Aggregator, timezone: Tz) -> Flow {
    match command {
        Command::Min(min) => {
            let max = aggregator.thresholds().max();
            print_thresholds(aggregator.set_thresholds(min, max));
        }
        Command::Max(max) => {
            let min = aggregator.thresholds().min();
            print_thresholds(aggregator.set_thresholds(min, max));
        }
        Command::Thresholds(min, max) => print_thresholds(aggregator.set_thresholds(min, max)),
        Command::Log(mode) => {
            aggregator.set_log_mode(mode);
            println!("log mode: {mode:?}");
        }
        Command::Save(path) => match export_snapshot(&path, &aggregator.snapshot_chart()) {
            Ok(()) => println!("saved history to {}", path.display()),
            Err(e) => {
                warn!(path = ?path, error = %e, "failed to export history");
                println!("failed to save history: {e}");
            }
        },
        Command::Table => {
            for row in aggregator.snapshot_table() {
                println!("{}  {}", row.time, row.value);
            }
        }
        Command::Chart => {
            let values: Vec<String> = aggregator
                .snapshot_chart()
                .iter()
                .map(|v| format!("{v:.1}"))
                .collect();
            println!("[{}]", values.join(", "));
        }
        Command::Status => print_status(aggregator, timezone),
        Command::Help => println!("{HELP}"),
        Command::Quit => return Flow::Quit,
    }

    Flow::Continue
}

fn print_thresholds(result: Result<AlertThresholds, ThresholdError>) {
    match result {
        Ok(t) => println!("limits: {t}"),
        Err(e) => println!("{e}"),
    }
}

fn print_status(aggregator: &Aggregator, timezone: Tz) {
    let Some(latest) = aggregator.latest() else {
        println!("waiting for data...");
        return;
    };

    let thresholds = aggregator.thresholds();
    let alert = match aggregator.current_alert_state() {
        state @ AlertState::Normal => state.as_str().to_owned(),
        state @ AlertState::OutOfRange => format!("ALERT: {} ({thresholds})", state.as_str()),
    };

    println!(
        "[{}] {} {:.1} {} | {} | log {:?}",
        latest.timestamp.with_timezone(&timezone).format("%H:%M:%S"),
        latest.sensor_id,
        latest.value,
        latest.unit,
        alert,
        aggregator.log_mode(),
    );
}
