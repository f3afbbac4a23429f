use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use chrono::SecondsFormat;
use csv::WriterBuilder;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, warn};

use crate::error::WriteError;
use crate::reading::Reading;

pub const CONTINUOUS_HEADER: [&str; 5] = ["ts", "group", "sensor_id", "value", "unit"];

pub const SNAPSHOT_HEADER: [&str; 2] = ["leitura_index", "valor_temperatura"];

const MISSING_GROUP: &str = "N/A";

/// Append-only CSV log with one row per reading.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row, writing the header first if the file is new or empty.
    pub fn append_row(&self, reading: &Reading) -> Result<(), WriteError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| WriteError::create(&self.path, e))?;

        let is_empty = file
            .metadata()
            .map_err(|e| WriteError::write(&self.path, e))?
            .len()
            == 0;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        if is_empty {
            writer
                .write_record(CONTINUOUS_HEADER)
                .map_err(|e| WriteError::write(&self.path, e))?;
        }

        let ts = reading.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let value = format_value(reading.value);
        writer
            .write_record([
                ts.as_str(),
                reading.group.as_deref().unwrap_or(MISSING_GROUP),
                reading.sensor_id.as_str(),
                value.as_str(),
                reading.unit.as_str(),
            ])
            .map_err(|e| WriteError::write(&self.path, e))?;

        writer
            .flush()
            .map_err(|e| WriteError::write(&self.path, e))
    }
}

/// Writes `values` as an indexed CSV to `path`, replacing any existing file.
///
/// The rows go to a sibling temporary file that is renamed over `path` once
/// complete.
pub fn export_snapshot(path: impl AsRef<Path>, values: &[f64]) -> Result<(), WriteError> {
    let path = path.as_ref();

    if values.is_empty() {
        return Err(WriteError::EmptyInput);
    }

    let tmp = temporary_path(path);
    let result = write_snapshot(&tmp, path, values)
        .and_then(|()| fs::rename(&tmp, path).map_err(|e| WriteError::create(path, e)));

    if result.is_err()
        && let Err(e) = fs::remove_file(&tmp)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = ?tmp, error = %e, "failed to remove temporary export file");
    }

    result
}

fn write_snapshot(tmp: &Path, path: &Path, values: &[f64]) -> Result<(), WriteError> {
    let file = File::create(tmp).map_err(|e| WriteError::create(path, e))?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    writer
        .write_record(SNAPSHOT_HEADER)
        .map_err(|e| WriteError::write(path, e))?;

    for (index, value) in values.iter().enumerate() {
        writer
            .write_record([index.to_string(), format_value(*value)])
            .map_err(|e| WriteError::write(path, e))?;
    }

    writer.flush().map_err(|e| WriteError::write(path, e))
}

/// Integral values keep a trailing `.0` so the column always reads as decimal.
fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Background thread that performs continuous-append writes off the ingestion
/// path. Failures are reported on the `failures` channel and the worker keeps
/// draining.
#[derive(Debug)]
pub struct AppendWorker {
    handle: JoinHandle<()>,
}

impl AppendWorker {
    pub fn spawn(
        log: CsvLog,
        mut readings: UnboundedReceiver<Reading>,
        failures: UnboundedSender<WriteError>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("csv-append".to_owned())
            .spawn(move || {
                while let Some(reading) = readings.blocking_recv() {
                    if let Err(e) = log.append_row(&reading) {
                        warn!(path = ?log.path(), error = %e, "failed to append reading");
                        if failures.send(e).is_err() {
                            debug!("write failure channel closed");
                        }
                    }
                }
                debug!("csv append worker finished");
            })?;

        Ok(Self { handle })
    }

    /// Waits for the worker to drain. Returns once every reading sender is
    /// dropped.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("csv append worker panicked");
        }
    }
}
