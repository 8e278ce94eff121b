//! Stored correction factors and the points they are evaluated at.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::histo::{Histo1D, Histo2D, Interpolation};
use crate::ve::ValueWithError;

/// Coordinates extracted from one event for one reweighting dimension.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Point {
    X(f64),
    XY(f64, f64),
}

impl Point {
    pub fn dim(&self) -> usize {
        match self {
            Point::X(_) => 1,
            Point::XY(..) => 2,
        }
    }
}

impl From<f64> for Point {
    fn from(x: f64) -> Self {
        Point::X(x)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::XY(x, y)
    }
}

/// One element of a correction chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    /// Same factor everywhere, accepts any point.
    Constant(ValueWithError),
    H1(Histo1D),
    H2(Histo2D),
}

impl Correction {
    /// Number of coordinates expected; 0 means any.
    pub fn arity(&self) -> usize {
        match self {
            Correction::Constant(_) => 0,
            Correction::H1(_) => 1,
            Correction::H2(_) => 2,
        }
    }

    /// Evaluate at `point`. `address` only labels the arity error.
    pub fn eval(&self, point: Point, interpolation: Interpolation, address: &str) -> Result<ValueWithError> {
        match (self, point) {
            (Correction::Constant(c), _) => Ok(*c),
            (Correction::H1(h), Point::X(x)) => Ok(h.value_at(x, interpolation)),
            (Correction::H2(h), Point::XY(x, y)) => Ok(h.value_at(x, y)),
            _ => Err(Error::Arity {
                address: address.to_string(),
                expected: self.arity(),
                found: point.dim(),
            }),
        }
    }

    pub fn zero_errors(&mut self) {
        match self {
            Correction::Constant(c) => *c = c.without_error(),
            Correction::H1(h) => h.zero_errors(),
            Correction::H2(h) => h.zero_errors(),
        }
    }

    /// Product of two corrections as a single correction.
    pub fn merged(&self, other: &Correction) -> Result<Correction> {
        use Correction::*;
        Ok(match (self, other) {
            (Constant(a), Constant(b)) => Constant(*a * *b),
            (H1(h), H1(g)) => H1(h * g),
            (H2(h), H2(g)) => H2(h * g),
            (H1(h), Constant(c)) | (Constant(c), H1(h)) => H1(scale_1d(h, *c)),
            (H2(h), Constant(c)) | (Constant(c), H2(h)) => H2(scale_2d(h, *c)),
            _ => {
                return Err(Error::Config(format!(
                    "cannot merge corrections of arity {} and {}",
                    self.arity(),
                    other.arity()
                )))
            }
        })
    }
}

fn scale_1d(h: &Histo1D, c: ValueWithError) -> Histo1D {
    let mut out = h.clone();
    for i in 0..out.len() {
        out.set_bin(i, h.bin(i) * c);
    }
    out
}

fn scale_2d(h: &Histo2D, c: ValueWithError) -> Histo2D {
    let mut out = h.clone();
    for ix in 0..out.nx() {
        for iy in 0..out.ny() {
            out.set_bin(ix, iy, h.bin(ix, iy) * c);
        }
    }
    out
}

impl From<Histo1D> for Correction {
    fn from(h: Histo1D) -> Self {
        Correction::H1(h)
    }
}

impl From<Histo2D> for Correction {
    fn from(h: Histo2D) -> Self {
        Correction::H2(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> Histo1D {
        let mut h = Histo1D::uniform(2, 0.0, 2.0).unwrap();
        h.set_bin(0, ValueWithError::new(1.0, 0.1));
        h.set_bin(1, ValueWithError::new(2.0, 0.1));
        h
    }

    #[test]
    fn test_constant_accepts_any_point() {
        let c = Correction::Constant(ValueWithError::exact(1.5));
        assert_eq!(c.eval(Point::X(3.0), Interpolation::Linear, "a").unwrap().value(), 1.5);
        assert_eq!(c.eval(Point::XY(3.0, 1.0), Interpolation::Linear, "a").unwrap().value(), 1.5);
    }

    #[test]
    fn test_arity_mismatch() {
        let c = Correction::H1(ramp());
        let err = c.eval(Point::XY(0.5, 0.5), Interpolation::None, "pt").unwrap_err();
        match err {
            Error::Arity { address, expected, found } => {
                assert_eq!(address, "pt");
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_merge_histogram_with_constant() {
        let c = Correction::Constant(ValueWithError::exact(2.0));
        let m = Correction::H1(ramp()).merged(&c).unwrap();
        let v = m.eval(Point::X(1.5), Interpolation::None, "a").unwrap();
        assert_relative_eq!(v.value(), 4.0);
    }

    #[test]
    fn test_merge_mixed_dimensions_fails() {
        let h2 = Histo2D::uniform(1, (0.0, 1.0), 1, (0.0, 1.0)).unwrap();
        assert!(Correction::H1(ramp()).merged(&Correction::H2(h2)).is_err());
    }

    #[test]
    fn test_serde_tagging() {
        let c = Correction::Constant(ValueWithError::exact(1.0));
        let s = serde_json::to_string(&c).unwrap();
        assert!(s.contains("\"kind\":\"constant\""));
        let back: Correction = serde_json::from_str(&s).unwrap();
        assert_eq!(back, c);
    }
}
