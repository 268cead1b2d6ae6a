use crate::types::{AccessError, Result, Row};

/// Running `(sum, count)` fold over numeric values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one value.
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Values added so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of the values added so far.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Current mean, or `None` before the first value.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Final mean. An accumulator that saw no values is an
    /// [`AccessError::EmptyStream`].
    pub fn finish(&self) -> Result<f64> {
        self.mean().ok_or(AccessError::EmptyStream)
    }
}

impl Extend<f64> for RunningMean {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

/// Averages `extract(item)` over a fallible stream in a single pass.
///
/// Memory use does not depend on the stream length. The first stream or
/// extraction error is returned and stops consumption.
pub fn streaming_average<I, T, F>(items: I, mut extract: F) -> Result<f64>
where
    I: IntoIterator<Item = Result<T>>,
    F: FnMut(&T) -> Result<f64>,
{
    let mut mean = RunningMean::new();
    for item in items {
        mean.push(extract(&item?)?);
    }
    mean.finish()
}

/// Extractor reading `column` as a number.
///
/// Integers, reals and text that parses as a number are accepted. A missing
/// column, `NULL` or any other value is a [`AccessError::Fatal`] naming the
/// column.
pub fn numeric_field(column: impl Into<String>) -> impl Fn(&Row) -> Result<f64> {
    let column = column.into();
    move |row: &Row| match row.get(&column) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| AccessError::fatal(format!("column `{column}` is not numeric: {value}"))),
        None => Err(AccessError::fatal(format!("column `{column}` not in result"))),
    }
}
