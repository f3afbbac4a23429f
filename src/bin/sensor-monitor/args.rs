use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "SENSOR_BIND", default_value = "0.0.0.0:5005")]
    pub bind: String,

    #[arg(long, default_value_t = 15.0, allow_negative_numbers = true)]
    pub min: f64,

    #[arg(long, default_value_t = 30.0, allow_negative_numbers = true)]
    pub max: f64,

    #[arg(long, default_value = "sensor_log_continuo.csv")]
    pub log_file: PathBuf,

    /// Start with continuous CSV logging enabled
    #[arg(long)]
    pub continuous_log: bool,

    #[arg(long, env = "TZ", default_value = "UTC")]
    pub timezone: Tz,

    #[arg(long, default_value_t = 1)]
    pub status_interval_secs: u64,
}
