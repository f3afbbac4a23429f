mod alert;
mod history;

pub use alert::*;
pub use history::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono_tz::Tz;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::error::ThresholdError;
use crate::reading::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    #[default]
    Off,
    ContinuousAppend,
}

#[derive(Debug)]
struct State {
    chart: ChartBuffer,
    table: TableBuffer,
    thresholds: AlertThresholds,
    log_mode: LogMode,
    latest: Option<Reading>,
}

/// Display state shared between the ingestion path and the presentation side.
///
/// Every method holds the internal lock only for in-memory updates. Readings
/// destined for the continuous log are handed to `log_sink` after the lock is
/// released.
#[derive(Debug)]
pub struct Aggregator {
    state: Mutex<State>,
    timezone: Tz,
    log_sink: Option<UnboundedSender<Reading>>,
}

impl Aggregator {
    pub fn new(thresholds: AlertThresholds, log_mode: LogMode, timezone: Tz) -> Self {
        Self {
            state: Mutex::new(State {
                chart: ChartBuffer::new(),
                table: TableBuffer::new(),
                thresholds,
                log_mode,
                latest: None,
            }),
            timezone,
            log_sink: None,
        }
    }

    pub fn with_log_sink(mut self, sink: UnboundedSender<Reading>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn ingest(&self, reading: Reading) -> AlertState {
        let row = TableRow {
            time: reading
                .timestamp
                .with_timezone(&self.timezone)
                .format("%H:%M:%S")
                .to_string(),
            value: format!("{:.2} {}", reading.value, reading.unit),
        };

        let (previous, current, to_log) = {
            let mut state = self.lock();

            let previous = state
                .latest
                .as_ref()
                .map(|r| state.thresholds.evaluate(r.value));
            let current = state.thresholds.evaluate(reading.value);

            state.chart.push(reading.value);
            state.table.push(row);

            let to_log = (state.log_mode == LogMode::ContinuousAppend).then(|| reading.clone());
            state.latest = Some(reading);

            (previous, current, to_log)
        };

        if previous != Some(current) && current == AlertState::OutOfRange {
            warn!("reading out of range");
        }

        if let Some(reading) = to_log {
            self.hand_off(reading);
        }

        current
    }

    /// Drains the listener channel into [`Aggregator::ingest`] until every
    /// sender is gone.
    pub async fn forward(&self, mut readings: UnboundedReceiver<Reading>) {
        while let Some(reading) = readings.recv().await {
            self.ingest(reading);
        }
        debug!("reading channel closed");
    }

    /// Returns the effective thresholds after correction. Rejected bounds
    /// leave the current thresholds in place.
    pub fn set_thresholds(&self, min: f64, max: f64) -> Result<AlertThresholds, ThresholdError> {
        let thresholds = AlertThresholds::new(min, max).inspect_err(|e| {
            warn!(error = %e, "rejected alert thresholds");
        })?;
        self.lock().thresholds = thresholds;
        info!(min = thresholds.min(), max = thresholds.max(), "alert thresholds updated");
        Ok(thresholds)
    }

    pub fn thresholds(&self) -> AlertThresholds {
        self.lock().thresholds
    }

    pub fn set_log_mode(&self, log_mode: LogMode) {
        let previous = std::mem::replace(&mut self.lock().log_mode, log_mode);
        if previous != log_mode {
            info!(?log_mode, "log mode changed");
        }
    }

    pub fn log_mode(&self) -> LogMode {
        self.lock().log_mode
    }

    /// Alert state of the latest reading against the current thresholds.
    pub fn current_alert_state(&self) -> AlertState {
        let state = self.lock();
        state
            .latest
            .as_ref()
            .map_or(AlertState::Normal, |r| state.thresholds.evaluate(r.value))
    }

    pub fn snapshot_chart(&self) -> Vec<f64> {
        self.lock().chart.to_vec()
    }

    pub fn snapshot_table(&self) -> Vec<TableRow> {
        self.lock().table.to_vec()
    }

    pub fn latest(&self) -> Option<Reading> {
        self.lock().latest.clone()
    }

    fn hand_off(&self, reading: Reading) {
        let Some(sink) = &self.log_sink else {
            debug!("continuous append enabled without a log sink");
            return;
        };

        if sink.send(reading).is_err() {
            warn!("log sink closed, dropping reading");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
