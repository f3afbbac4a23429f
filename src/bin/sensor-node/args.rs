use std::path::PathBuf;

use clap::Parser;
use sensor_monitor::wire::TimestampFormat;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, default_value = "/sys/bus/iio/devices/iio:device0/in_voltage13_raw")]
    pub adc_file: PathBuf,

    #[arg(long, env = "SENSOR_TARGET", default_value = "127.0.0.1:5005")]
    pub target: String,

    #[arg(long, env = "SENSOR_ID", default_value = "temp-01")]
    pub sensor_id: String,

    #[arg(long, env = "SENSOR_GROUP")]
    pub group: Option<String>,

    #[arg(long, default_value = "°C")]
    pub unit: String,

    #[arg(long, default_value_t = 1)]
    pub interval_secs: u64,

    /// `iso` sends `ts`, `epoch` sends `timestamp`
    #[arg(long, default_value = "iso")]
    pub timestamp_format: TimestampFormat,
}
