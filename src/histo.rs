//! Histograms with per-bin errors.
//!
//! Bin contents are [`ValueWithError`]s whose variance is the sum of squared
//! fill weights, so arithmetic between histograms propagates statistical
//! errors bin by bin. Histograms double as functions: a 1-D histogram can be
//! evaluated anywhere on its axis, which is how correction factors are
//! applied to events and how operands with different binnings are combined.

use serde::{Deserialize, Serialize};
use std::ops::{Div, Mul};

use crate::error::{Error, Result};
use crate::stat::StatEntity;
use crate::ve::ValueWithError;

/// Lookup mode of [`Histo1D::value_at`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Content of the bin containing `x`.
    None,
    /// Linear between neighbouring bin centres.
    #[default]
    Linear,
}

fn check_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Binning(format!("need at least two edges, got {}", edges.len())));
    }
    if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::Binning("edges must be finite and strictly ascending".into()));
    }
    Ok(())
}

fn uniform_edges(n_bins: usize, low: f64, high: f64) -> Result<Vec<f64>> {
    if n_bins == 0 {
        return Err(Error::Binning("number of bins must be positive".into()));
    }
    let step = (high - low) / n_bins as f64;
    let mut edges: Vec<f64> = (0..n_bins).map(|i| low + step * i as f64).collect();
    edges.push(high);
    check_edges(&edges)?;
    Ok(edges)
}

/// Index of the bin containing `x`; `None` outside `[edges[0], edges[n])`.
fn find_bin(edges: &[f64], x: f64) -> Option<usize> {
    let n = edges.len() - 1;
    if !(x >= edges[0] && x < edges[n]) {
        return None;
    }
    Some(edges.partition_point(|&e| e <= x) - 1)
}

/// A one-dimensional histogram.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histo1D {
    edges: Vec<f64>,
    bins: Vec<ValueWithError>,
    entries: u64,
}

impl Histo1D {
    /// `n_bins` equal-width bins on `[low, high)`.
    pub fn uniform(n_bins: usize, low: f64, high: f64) -> Result<Self> {
        Ok(Self::from_checked_edges(uniform_edges(n_bins, low, high)?))
    }

    /// Variable-width bins given by ascending `edges`.
    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        check_edges(&edges)?;
        Ok(Self::from_checked_edges(edges))
    }

    /// Histogram with prescribed bin contents (errors taken as given).
    pub fn from_contents(edges: Vec<f64>, contents: Vec<ValueWithError>) -> Result<Self> {
        check_edges(&edges)?;
        if contents.len() + 1 != edges.len() {
            return Err(Error::Binning(format!(
                "{} contents for {} bins",
                contents.len(),
                edges.len() - 1
            )));
        }
        Ok(Self { edges, bins: contents, entries: 0 })
    }

    fn from_checked_edges(edges: Vec<f64>) -> Self {
        let n = edges.len() - 1;
        Self { edges, bins: vec![ValueWithError::ZERO; n], entries: 0 }
    }

    /// Empty histogram with the same binning.
    pub fn empty_like(&self) -> Self {
        Self::from_checked_edges(self.edges.clone())
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn bins(&self) -> &[ValueWithError] {
        &self.bins
    }

    pub fn bin(&self, i: usize) -> ValueWithError {
        self.bins[i]
    }

    pub fn set_bin(&mut self, i: usize, v: ValueWithError) {
        self.bins[i] = v;
    }

    /// Number of fills that landed inside the axis range.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn range(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.len()])
    }

    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    pub fn center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    pub fn same_binning(&self, other: &Histo1D) -> bool {
        self.edges == other.edges
    }

    pub fn find_bin(&self, x: f64) -> Option<usize> {
        find_bin(&self.edges, x)
    }

    /// Add weight `w` at `x`. Returns `false` when `x` is outside the axis.
    pub fn fill(&mut self, x: f64, w: f64) -> bool {
        match self.find_bin(x) {
            Some(i) => {
                self.bins[i] += ValueWithError::new(w, w * w);
                self.entries += 1;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = ValueWithError::ZERO);
        self.entries = 0;
    }

    /// Sum of bin contents.
    pub fn integral(&self) -> ValueWithError {
        self.bins.iter().fold(ValueWithError::ZERO, |acc, b| acc + *b)
    }

    /// Shape normalised to unit area: content / (integral * bin width).
    pub fn density(&self) -> Self {
        let total = self.integral().value();
        let mut out = self.clone();
        for (i, b) in out.bins.iter_mut().enumerate() {
            *b = if total == 0.0 {
                ValueWithError::ZERO
            } else {
                *b / (total * (self.edges[i + 1] - self.edges[i]))
            };
        }
        out
    }

    /// Statistics of the bin values.
    pub fn stat(&self) -> StatEntity {
        self.bins.iter().map(|b| b.value()).collect()
    }

    pub fn scale(&mut self, factor: f64) {
        self.bins.iter_mut().for_each(|b| *b *= factor);
    }

    pub fn scaled(&self, factor: f64) -> Self {
        let mut out = self.clone();
        out.scale(factor);
        out
    }

    /// Bin-wise `1 / h`; empty bins stay empty.
    pub fn reciprocal(&self) -> Self {
        self.map_bins(|b| b.reciprocal())
    }

    /// Bin-wise power.
    pub fn pow(&self, p: f64) -> Self {
        self.map_bins(|b| b.pow(p))
    }

    /// Drop all bin errors, keeping the values.
    pub fn zero_errors(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = b.without_error());
    }

    fn map_bins(&self, f: impl Fn(ValueWithError) -> ValueWithError) -> Self {
        let mut out = self.clone();
        out.bins.iter_mut().for_each(|b| *b = f(*b));
        out
    }

    /// Evaluate the histogram as a function of `x`. Zero outside the axis.
    pub fn value_at(&self, x: f64, interpolation: Interpolation) -> ValueWithError {
        let Some(i) = self.find_bin(x) else {
            return ValueWithError::ZERO;
        };
        if interpolation == Interpolation::None || self.len() == 1 {
            return self.bins[i];
        }
        let c = self.center(i);
        let (lo, hi) = if x < c {
            if i == 0 {
                return self.bins[i];
            }
            (i - 1, i)
        } else {
            if i + 1 == self.len() {
                return self.bins[i];
            }
            (i, i + 1)
        };
        let (c0, c1) = (self.center(lo), self.center(hi));
        self.bins[lo].lerp(self.bins[hi], (x - c0) / (c1 - c0))
    }

    fn combine(
        &self,
        other: &Histo1D,
        op: impl Fn(ValueWithError, ValueWithError) -> ValueWithError,
    ) -> Self {
        let mut out = self.clone();
        if self.same_binning(other) {
            for (b, o) in out.bins.iter_mut().zip(&other.bins) {
                *b = op(*b, *o);
            }
        } else {
            for i in 0..out.len() {
                let o = other.value_at(self.center(i), Interpolation::Linear);
                out.bins[i] = op(out.bins[i], o);
            }
        }
        out
    }
}

impl Mul for &Histo1D {
    type Output = Histo1D;
    fn mul(self, rhs: &Histo1D) -> Histo1D {
        self.combine(rhs, |a, b| a * b)
    }
}

impl Div for &Histo1D {
    type Output = Histo1D;
    fn div(self, rhs: &Histo1D) -> Histo1D {
        self.combine(rhs, |a, b| a.safe_div(b))
    }
}

/// A two-dimensional histogram, bins stored x-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histo2D {
    x_edges: Vec<f64>,
    y_edges: Vec<f64>,
    bins: Vec<ValueWithError>,
}

impl Histo2D {
    pub fn from_edges(x_edges: Vec<f64>, y_edges: Vec<f64>) -> Result<Self> {
        check_edges(&x_edges)?;
        check_edges(&y_edges)?;
        let n = (x_edges.len() - 1) * (y_edges.len() - 1);
        Ok(Self { x_edges, y_edges, bins: vec![ValueWithError::ZERO; n] })
    }

    pub fn uniform(nx: usize, x_range: (f64, f64), ny: usize, y_range: (f64, f64)) -> Result<Self> {
        Self::from_edges(
            uniform_edges(nx, x_range.0, x_range.1)?,
            uniform_edges(ny, y_range.0, y_range.1)?,
        )
    }

    pub fn nx(&self) -> usize {
        self.x_edges.len() - 1
    }

    pub fn ny(&self) -> usize {
        self.y_edges.len() - 1
    }

    fn index(&self, ix: usize, iy: usize) -> usize {
        ix * self.ny() + iy
    }

    pub fn bin(&self, ix: usize, iy: usize) -> ValueWithError {
        self.bins[self.index(ix, iy)]
    }

    pub fn set_bin(&mut self, ix: usize, iy: usize, v: ValueWithError) {
        let k = self.index(ix, iy);
        self.bins[k] = v;
    }

    pub fn fill(&mut self, x: f64, y: f64, w: f64) -> bool {
        match (find_bin(&self.x_edges, x), find_bin(&self.y_edges, y)) {
            (Some(ix), Some(iy)) => {
                let k = self.index(ix, iy);
                self.bins[k] += ValueWithError::new(w, w * w);
                true
            }
            _ => false,
        }
    }

    /// Content of the bin containing `(x, y)`; zero outside.
    pub fn value_at(&self, x: f64, y: f64) -> ValueWithError {
        match (find_bin(&self.x_edges, x), find_bin(&self.y_edges, y)) {
            (Some(ix), Some(iy)) => self.bin(ix, iy),
            _ => ValueWithError::ZERO,
        }
    }

    pub fn scale(&mut self, factor: f64) {
        self.bins.iter_mut().for_each(|b| *b *= factor);
    }

    pub fn zero_errors(&mut self) {
        self.bins.iter_mut().for_each(|b| *b = b.without_error());
    }

    pub fn stat(&self) -> StatEntity {
        self.bins.iter().map(|b| b.value()).collect()
    }

    fn center(edges: &[f64], i: usize) -> f64 {
        0.5 * (edges[i] + edges[i + 1])
    }
}

impl Mul for &Histo2D {
    type Output = Histo2D;
    fn mul(self, rhs: &Histo2D) -> Histo2D {
        let mut out = self.clone();
        if self.x_edges == rhs.x_edges && self.y_edges == rhs.y_edges {
            for (b, o) in out.bins.iter_mut().zip(&rhs.bins) {
                *b *= *o;
            }
        } else {
            for ix in 0..self.nx() {
                for iy in 0..self.ny() {
                    let x = Histo2D::center(&self.x_edges, ix);
                    let y = Histo2D::center(&self.y_edges, iy);
                    let k = out.index(ix, iy);
                    out.bins[k] *= rhs.value_at(x, y);
                }
            }
        }
        out
    }
}
