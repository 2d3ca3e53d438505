// Time series domain model
use chrono::{DateTime, Duration, Utc};
use std::fmt;

use super::error::ValidationError;

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A named, ordered sequence of observations.
///
/// Points keep insertion order. Chronological order is a convention of the
/// producers, it is not checked here.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    name: String,
    points: Vec<DataPoint>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(Self {
            name,
            points: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn add_point(&mut self, value: f64, timestamp: DateTime<Utc>) -> Result<(), ValidationError> {
        validate_value(self.points.len(), value)?;
        self.points.push(DataPoint::new(timestamp, value));
        Ok(())
    }

    /// Append a batch of `(value, timestamp)` pairs in input order.
    ///
    /// The whole batch is checked before anything is appended, so a rejected
    /// batch leaves the series untouched.
    pub fn add_points(&mut self, batch: &[(f64, DateTime<Utc>)]) -> Result<(), ValidationError> {
        for (offset, (value, _)) in batch.iter().enumerate() {
            validate_value(self.points.len() + offset, *value)?;
        }
        self.points.reserve(batch.len());
        self.points
            .extend(batch.iter().map(|(value, timestamp)| DataPoint::new(*timestamp, *value)));
        Ok(())
    }

    /// Predict the next value by least-squares trend extrapolation.
    ///
    /// The fitted line is evaluated one mean sampling interval past the latest
    /// timestamp. Returns `None` with fewer than two points. When every point
    /// shares the same timestamp the mean value is returned.
    pub fn forecast(&self) -> Option<f64> {
        let trend = self.trend()?;
        Some(trend.value_at(trend.latest_offset + trend.step))
    }

    /// Project `steps` future points spaced by the mean sampling interval.
    pub fn forecast_horizon(&self, steps: usize) -> Vec<DataPoint> {
        let Some(trend) = self.trend() else {
            return Vec::new();
        };

        (1..=steps)
            .map(|k| {
                let offset = trend.latest_offset + trend.step * k as f64;
                let timestamp = trend.origin + Duration::milliseconds((offset * 1000.0).round() as i64);
                DataPoint::new(timestamp, trend.value_at(offset))
            })
            .collect()
    }

    fn trend(&self) -> Option<Trend> {
        if self.points.len() < 2 {
            return None;
        }

        let origin = self.points.iter().map(|p| p.timestamp).min()?;
        let xs: Vec<f64> = self
            .points
            .iter()
            .map(|p| (p.timestamp - origin).num_milliseconds() as f64 / 1000.0)
            .collect();
        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = self.points.iter().map(|p| p.value).sum::<f64>() / n;

        let (sxy, sxx) = xs
            .iter()
            .zip(self.points.iter())
            .fold((0.0, 0.0), |(sxy, sxx), (x, p)| {
                let dx = x - mean_x;
                (sxy + dx * (p.value - mean_y), sxx + dx * dx)
            });

        let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
        let latest_offset = xs.iter().cloned().fold(0.0, f64::max);

        Some(Trend {
            origin,
            slope,
            intercept: mean_y - slope * mean_x,
            latest_offset,
            step: latest_offset / (n - 1.0),
        })
    }
}

struct Trend {
    origin: DateTime<Utc>,
    slope: f64,
    intercept: f64,
    latest_offset: f64,
    step: f64,
}

impl Trend {
    fn value_at(&self, offset: f64) -> f64 {
        self.intercept + self.slope * offset
    }
}

fn validate_value(index: usize, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFiniteValue { index, value })
    }
}

impl fmt::Display for TimeSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [", self.name)?;
        for (i, point) in self.points.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "({}, {})",
                point.timestamp.format(DISPLAY_TIME_FORMAT),
                point.value
            )?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, day, hour, 0, 0).unwrap()
    }

    fn series() -> TimeSeries {
        TimeSeries::new("Test Series").unwrap()
    }

    #[test]
    fn test_initial_state() {
        let model = series();
        assert_eq!(model.name(), "Test Series");
        assert_eq!(model.len(), 0);
        assert!(model.is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert_eq!(TimeSeries::new("  ").unwrap_err(), ValidationError::EmptyName);
    }

    #[test]
    fn test_add_point() {
        let mut model = series();
        model.add_point(10.5, at(1, 12)).unwrap();

        assert_eq!(model.len(), 1);
        assert_eq!(model.points()[0], DataPoint::new(at(1, 12), 10.5));
    }

    #[test]
    fn test_add_point_rejects_nan() {
        let mut model = series();
        assert!(model.add_point(f64::NAN, at(1, 12)).is_err());
        assert!(model.is_empty());
    }

    #[test]
    fn test_rejected_point_reports_series_position() {
        let mut model = series();
        model.add_points(&[(1.0, at(1, 0)), (2.0, at(2, 0))]).unwrap();

        let err = model.add_point(f64::NEG_INFINITY, at(3, 0)).unwrap_err();

        assert_eq!(err.to_string(), "point 2 has a non-finite value: -inf");
        assert_eq!(model.len(), 2);
    }

    #[test]
    fn test_add_multiple_points_keeps_order() {
        let mut model = series();
        model
            .add_points(&[(15.0, at(1, 12)), (16.5, at(2, 12)), (14.5, at(3, 12))])
            .unwrap();

        let values: Vec<f64> = model.points().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![15.0, 16.5, 14.5]);
    }

    #[test]
    fn test_add_points_is_atomic() {
        let mut model = series();
        model.add_point(1.0, at(1, 0)).unwrap();

        let err = model
            .add_points(&[(2.0, at(2, 0)), (f64::INFINITY, at(3, 0)), (4.0, at(4, 0))])
            .unwrap_err();

        assert_eq!(
            err,
            ValidationError::NonFiniteValue {
                index: 2,
                value: f64::INFINITY
            }
        );
        assert_eq!(model.points(), &[DataPoint::new(at(1, 0), 1.0)]);
    }

    #[test]
    fn test_to_string() {
        let mut model = series();
        let timestamp = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        model.add_point(10.5, timestamp).unwrap();

        assert_eq!(model.to_string(), "Test Series: [(2023-01-01 12:00:00, 10.5)]");
    }

    #[test]
    fn test_to_string_empty() {
        assert_eq!(series().to_string(), "Test Series: []");
    }

    #[test]
    fn test_forecast_unavailable_below_two_points() {
        let mut model = series();
        assert_eq!(model.forecast(), None);

        model.add_point(3.0, at(1, 0)).unwrap();
        assert_eq!(model.forecast(), None);
        assert!(model.forecast_horizon(3).is_empty());
    }

    #[test]
    fn test_forecast_returns_value() {
        let mut model = series();
        model
            .add_points(&[(15.0, at(1, 12)), (16.5, at(2, 12)), (14.5, at(3, 12))])
            .unwrap();

        let first = model.forecast();
        assert!(first.is_some());
        assert_eq!(first, model.forecast());
    }

    #[test]
    fn test_forecast_follows_linear_trend() {
        let mut model = series();
        model
            .add_points(&[(1.0, at(1, 0)), (3.0, at(2, 0)), (5.0, at(3, 0))])
            .unwrap();

        let next = model.forecast().unwrap();
        assert!((next - 7.0).abs() < 1e-9);

        let horizon = model.forecast_horizon(2);
        assert_eq!(horizon.len(), 2);
        assert_eq!(horizon[0].timestamp, at(4, 0));
        assert!((horizon[1].value - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_same_timestamp_uses_mean() {
        let mut model = series();
        model.add_points(&[(2.0, at(1, 0)), (4.0, at(1, 0))]).unwrap();

        assert_eq!(model.forecast(), Some(3.0));
    }
}
