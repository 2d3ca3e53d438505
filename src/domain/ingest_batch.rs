// Combined output of one ingest cycle
use super::time_series::TimeSeries;
use chrono::{DateTime, Utc};

/// One observation tagged with the series it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub series: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Series gathered from every plugin, in plugin registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestBatch {
    series: Vec<TimeSeries>,
}

impl IngestBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, series: TimeSeries) {
        self.series.push(series);
    }

    pub fn series(&self) -> &[TimeSeries] {
        &self.series
    }

    pub fn point_count(&self) -> usize {
        self.series.iter().map(TimeSeries::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }

    /// Flatten into one list of records, preserving series then point order.
    pub fn records(&self) -> Vec<PointRecord> {
        self.series
            .iter()
            .flat_map(|s| {
                s.points().iter().map(move |p| PointRecord {
                    series: s.name().to_string(),
                    timestamp: p.timestamp,
                    value: p.value,
                })
            })
            .collect()
    }
}

impl Extend<TimeSeries> for IngestBatch {
    fn extend<I: IntoIterator<Item = TimeSeries>>(&mut self, iter: I) {
        self.series.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_records_preserve_order() {
        let t1 = Utc.with_ymd_and_hms(2023, 4, 1, 0, 0, 0).unwrap();
        let mut a = TimeSeries::new("a").unwrap();
        a.add_points(&[(1.0, t1), (2.0, t1)]).unwrap();
        let mut b = TimeSeries::new("b").unwrap();
        b.add_point(3.0, t1).unwrap();

        let mut batch = IngestBatch::new();
        batch.extend([a, b, TimeSeries::new("empty").unwrap()]);

        let records: Vec<(String, f64)> = batch
            .records()
            .into_iter()
            .map(|r| (r.series, r.value))
            .collect();
        assert_eq!(
            records,
            vec![("a".into(), 1.0), ("a".into(), 2.0), ("b".into(), 3.0)]
        );
        assert_eq!(batch.point_count(), 3);
        assert!(!batch.is_empty());
    }
}
