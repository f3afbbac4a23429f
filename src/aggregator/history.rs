use std::collections::VecDeque;

/// Number of chart samples kept, one per expected sampling second.
pub const CHART_CAPACITY: usize = 60;

/// Number of rows kept for the recent-readings table.
pub const TABLE_CAPACITY: usize = 10;

/// Oldest-first ring of values. Appends at the tail, evicts at the head.
#[derive(Debug, Clone)]
pub struct ChartBuffer {
    values: VecDeque<f64>,
}

impl ChartBuffer {
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(CHART_CAPACITY),
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == CHART_CAPACITY {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }
}

impl Default for ChartBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub time: String,

    pub value: String,
}

/// Newest-first ring of formatted rows. Prepends at the head, evicts at the tail.
#[derive(Debug, Clone)]
pub struct TableBuffer {
    rows: VecDeque<TableRow>,
}

impl TableBuffer {
    pub fn new() -> Self {
        Self {
            rows: VecDeque::with_capacity(TABLE_CAPACITY),
        }
    }

    pub fn push(&mut self, row: TableRow) {
        if self.rows.len() == TABLE_CAPACITY {
            self.rows.pop_back();
        }
        self.rows.push_front(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_vec(&self) -> Vec<TableRow> {
        self.rows.iter().cloned().collect()
    }
}

impl Default for TableBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(i: usize) -> TableRow {
        TableRow {
            time: format!("00:00:{i:02}"),
            value: format!("{i}.00 C"),
        }
    }

    #[test]
    fn chart_evicts_oldest_at_capacity() {
        let mut chart = ChartBuffer::new();
        for i in 1..=CHART_CAPACITY + 1 {
            chart.push(i as f64);
        }

        let values = chart.to_vec();
        assert_eq!(values.len(), CHART_CAPACITY);
        let expected: Vec<f64> = (2..=CHART_CAPACITY + 1).map(|i| i as f64).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn table_keeps_newest_first() {
        let mut table = TableBuffer::new();
        for i in 1..=TABLE_CAPACITY + 1 {
            table.push(row(i));
        }

        let rows = table.to_vec();
        assert_eq!(rows.len(), TABLE_CAPACITY);
        assert_eq!(rows[0], row(TABLE_CAPACITY + 1));
        assert_eq!(rows[TABLE_CAPACITY - 1], row(2));
    }

    #[test]
    fn snapshots_are_independent() {
        let mut chart = ChartBuffer::new();
        chart.push(1.0);
        let snapshot = chart.to_vec();
        chart.push(2.0);

        assert_eq!(snapshot, vec![1.0]);
        assert_eq!(chart.len(), 2);
    }
}
