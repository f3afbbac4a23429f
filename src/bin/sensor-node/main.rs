mod adc;
mod args;

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use args::Args;
use chrono::Utc;
use clap::Parser as _;
use sensor_monitor::{reading::Reading, wire};
use tokio::{
    net::UdpSocket,
    time::{Duration, interval},
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

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

    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to bind UDP socket")?;
    socket
        .connect(args.target.as_str())
        .await
        .with_context(|| format!("failed to resolve target: {}", args.target))?;

    info!(
        target = %args.target,
        adc_file = ?args.adc_file,
        timestamp_format = args.timestamp_format.as_str(),
        "sampling sensor"
    );

    let mut ticker = interval(Duration::from_secs(args.interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for interrupt")?;
                info!("interrupt received, stopping");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let raw = match adc::read_raw(&args.adc_file) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("failed to sample ADC: {err:#}");
                continue;
            }
        };

        let reading = Reading {
            sensor_id: args.sensor_id.clone(),
            group: args.group.clone(),
            value: adc::thermistor_celsius(raw),
            unit: args.unit.clone(),
            timestamp: Utc::now(),
        };

        let payload =
            wire::encode(&reading, args.timestamp_format).context("failed to encode reading")?;

        if let Err(err) = socket.send(&payload).await {
            warn!("failed to send reading: {err:#}");
            continue;
        }

        debug!(
            raw,
            voltage = adc::voltage(raw),
            value = reading.value,
            "reading sent"
        );
    }
}
