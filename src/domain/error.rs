// Domain validation errors
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("series name must not be empty")]
    EmptyName,

    /// `index` is the position the point would have taken in the series.
    #[error("point {index} has a non-finite value: {value}")]
    NonFiniteValue { index: usize, value: f64 },
}
