//! Value with error: a measurement carried as value and variance.
//!
//! Arithmetic propagates the variance to first order assuming uncorrelated
//! operands, which is how bin contents and correction factors are combined
//! everywhere in this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub};

/// Absolute tolerance used by [`is_zero`].
pub const ZERO_TOLERANCE: f64 = 1.0e-12;

/// `true` when `x` is zero within [`ZERO_TOLERANCE`].
pub fn is_zero(x: f64) -> bool {
    x.abs() <= ZERO_TOLERANCE
}

/// A value together with its variance (`cov2`).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueWithError {
    value: f64,
    cov2: f64,
}

impl ValueWithError {
    pub const ONE: ValueWithError = ValueWithError { value: 1.0, cov2: 0.0 };
    pub const ZERO: ValueWithError = ValueWithError { value: 0.0, cov2: 0.0 };

    /// Build from value and variance. Negative variances are clamped to zero.
    pub fn new(value: f64, cov2: f64) -> Self {
        Self { value, cov2: cov2.max(0.0) }
    }

    /// Exact value, no uncertainty.
    pub fn exact(value: f64) -> Self {
        Self { value, cov2: 0.0 }
    }

    /// Build from value and error (standard deviation).
    pub fn with_error(value: f64, error: f64) -> Self {
        Self::new(value, error * error)
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn cov2(&self) -> f64 {
        self.cov2
    }

    pub fn error(&self) -> f64 {
        self.cov2.sqrt()
    }

    /// Same value with the uncertainty stripped.
    pub fn without_error(&self) -> Self {
        Self::exact(self.value)
    }

    /// `1 / self`; an exact zero maps to zero.
    pub fn reciprocal(&self) -> Self {
        if self.value == 0.0 {
            return Self::ZERO;
        }
        let v = 1.0 / self.value;
        Self::new(v, self.cov2 * v.powi(4))
    }

    /// `self ^ p` with first-order error propagation.
    pub fn pow(&self, p: f64) -> Self {
        let v = self.value.powf(p);
        if self.cov2 == 0.0 {
            return Self::exact(v);
        }
        let d = p * self.value.powf(p - 1.0);
        Self::new(v, d * d * self.cov2)
    }

    /// Division that yields zero for a zero denominator, like `TH1::Divide`.
    pub fn safe_div(self, other: Self) -> Self {
        if other.value == 0.0 {
            Self::ZERO
        } else {
            self / other
        }
    }

    /// Linear blend `(1 - t) * self + t * other`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        let a = 1.0 - t;
        Self::new(a * self.value + t * other.value, a * a * self.cov2 + t * t * other.cov2)
    }
}

impl From<f64> for ValueWithError {
    fn from(value: f64) -> Self {
        Self::exact(value)
    }
}

impl fmt::Display for ValueWithError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match f.precision() {
            Some(p) => write!(f, "( {:.*} +- {:.*} )", p, self.value, p, self.error()),
            None => write!(f, "( {} +- {} )", self.value, self.error()),
        }
    }
}

impl Neg for ValueWithError {
    type Output = Self;
    fn neg(self) -> Self {
        Self { value: -self.value, cov2: self.cov2 }
    }
}

impl Add for ValueWithError {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.value + rhs.value, self.cov2 + rhs.cov2)
    }
}

impl Sub for ValueWithError {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.value - rhs.value, self.cov2 + rhs.cov2)
    }
}

impl Mul for ValueWithError {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.value * rhs.value,
            self.cov2 * rhs.value * rhs.value + rhs.cov2 * self.value * self.value,
        )
    }
}

impl Div for ValueWithError {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let v = self.value / rhs.value;
        let r2 = rhs.value * rhs.value;
        Self::new(v, self.cov2 / r2 + rhs.cov2 * v * v / r2)
    }
}

impl Mul<f64> for ValueWithError {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.value * rhs, self.cov2 * rhs * rhs)
    }
}

impl Div<f64> for ValueWithError {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        Self::new(self.value / rhs, self.cov2 / (rhs * rhs))
    }
}

impl AddAssign for ValueWithError {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl MulAssign for ValueWithError {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl MulAssign<f64> for ValueWithError {
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}

impl DivAssign<f64> for ValueWithError {
    fn div_assign(&mut self, rhs: f64) {
        *self = *self / rhs;
    }
}
