//! Running statistics counter.

use std::fmt;
use std::ops::AddAssign;

use crate::ve::ValueWithError;

/// Accumulates count, sum, sum of squares and extrema of a scalar.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatEntity {
    n: u64,
    sum: f64,
    sum2: f64,
    min: f64,
    max: f64,
}

impl Default for StatEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl StatEntity {
    pub fn new() -> Self {
        Self { n: 0, sum: 0.0, sum2: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY }
    }

    pub fn add(&mut self, x: f64) {
        self.n += 1;
        self.sum += x;
        self.sum2 += x * x;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Population RMS around the mean.
    pub fn rms(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let m = self.sum / self.n as f64;
        (self.sum2 / self.n as f64 - m * m).max(0.0).sqrt()
    }

    /// Mean with its statistical uncertainty `rms / sqrt(n)`.
    pub fn mean(&self) -> ValueWithError {
        if self.n == 0 {
            return ValueWithError::ZERO;
        }
        let rms = self.rms();
        ValueWithError::new(self.sum / self.n as f64, rms * rms / self.n as f64)
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.max
        }
    }

    pub fn minmax(&self) -> (f64, f64) {
        (self.min(), self.max())
    }
}

impl AddAssign<f64> for StatEntity {
    fn add_assign(&mut self, x: f64) {
        self.add(x);
    }
}

impl FromIterator<f64> for StatEntity {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut s = StatEntity::new();
        iter.into_iter().for_each(|x| s.add(x));
        s
    }
}

impl fmt::Display for StatEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#={} sum={:.4} mean={:.4} rms={:.4} min/max={:.4}/{:.4}",
            self.n,
            self.sum,
            self.mean(),
            self.rms(),
            self.min(),
            self.max()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_counter() {
        let s = StatEntity::new();
        assert!(s.is_empty());
        assert_eq!(s.mean(), ValueWithError::ZERO);
        assert_eq!(s.minmax(), (0.0, 0.0));
        assert_eq!(s.rms(), 0.0);
    }

    #[test]
    fn test_moments() {
        let s: StatEntity = [0.75, 1.5, 0.75].into_iter().collect();
        assert_eq!(s.n(), 3);
        assert_relative_eq!(s.mean().value(), 1.0);
        assert_relative_eq!(s.rms(), (0.125f64).sqrt(), epsilon = 1e-12);
        assert_eq!(s.minmax(), (0.75, 1.5));
    }

    #[test]
    fn test_constant_has_zero_rms() {
        let mut s = StatEntity::new();
        for _ in 0..10 {
            s += 2.5;
        }
        assert_relative_eq!(s.rms(), 0.0);
        assert_relative_eq!(s.mean().error(), 0.0);
    }
}
