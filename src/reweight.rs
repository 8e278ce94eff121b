//! One iteration of the data/MC reweighting procedure.
//!
//! For each [`WeightingPlot`] the MC sample is projected with its current
//! weights, compared to the reference histogram, and the shape ratio is
//! appended to the correction chain at the plot's address unless the ratio
//! is already flat within tolerance.

use polars::prelude::Expr;
use std::path::Path;

use crate::correction::Correction;
use crate::dataset::EventSource;
use crate::error::{Error, Result};
use crate::histo::Histo1D;
use crate::store::{audit_key, WeightStore};

/// One reweighting dimension as seen by [`make_weights`].
#[derive(Clone, Debug)]
pub struct WeightingPlot {
    what: Expr,
    how: Option<Expr>,
    address: String,
    data: Histo1D,
    mc_histo: Histo1D,
    w: f64,
}

impl WeightingPlot {
    /// The MC template defaults to the binning of `data`, importance to 1.
    pub fn new(what: Expr, how: Option<Expr>, address: impl Into<String>, data: Histo1D) -> Result<Self> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(Error::Config("weighting plot needs a non-empty address".into()));
        }
        let mc_histo = data.empty_like();
        Ok(Self { what, how, address, data, mc_histo, w: 1.0 })
    }

    /// Use a different MC binning. The template must cover the same axis
    /// range as the reference histogram.
    pub fn with_mc_histo(mut self, mc_histo: Histo1D) -> Result<Self> {
        let (lo, hi) = self.data.range();
        let (mlo, mhi) = mc_histo.range();
        let tolerance = 1e-9 * (hi - lo);
        if (mlo - lo).abs() > tolerance || (mhi - hi).abs() > tolerance {
            return Err(Error::Binning(format!(
                "MC template for `{}` spans [{mlo}, {mhi}], data spans [{lo}, {hi}]",
                self.address
            )));
        }
        self.mc_histo = mc_histo;
        Ok(self)
    }

    /// Relative importance, applied as an extra exponent when several
    /// dimensions are corrected together.
    pub fn with_importance(mut self, w: f64) -> Self {
        self.w = w;
        self
    }

    pub fn what(&self) -> &Expr {
        &self.what
    }

    pub fn how(&self) -> Option<&Expr> {
        self.how.as_ref()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn data(&self) -> &Histo1D {
        &self.data
    }

    pub fn mc_histo(&self) -> &Histo1D {
        &self.mc_histo
    }

    pub fn w(&self) -> f64 {
        self.w
    }
}

/// Comparison hook called with `(data, mc, address)` after each projection.
pub type CompareFn<'a> = &'a dyn Fn(&Histo1D, &Histo1D, &str);

/// Options of [`make_weights`].
#[derive(Clone, Copy)]
pub struct MakeWeights<'a> {
    /// Threshold on the relative RMS of the correction.
    pub delta: f64,
    /// Threshold on `max - min` of the correction.
    pub minmax: f64,
    /// Number of simultaneous dimensions; `< 1` means the number of plots.
    pub power: f64,
    /// Also store the histograms behind every correction.
    pub debug: bool,
    pub compare: Option<CompareFn<'a>>,
}

impl Default for MakeWeights<'_> {
    fn default() -> Self {
        Self { delta: 0.001, minmax: 0.05, power: 0.0, debug: true, compare: None }
    }
}

struct Pending {
    address: String,
    w: f64,
    audit: [Histo1D; 4],
    correction: Histo1D,
}

/// Shape ratio data/MC, rescaled to unit mean.
///
/// The reciprocal is taken of the finer histogram: inverting the coarser
/// operand inflates its relative errors more.
pub fn correction_factor(data_density: &Histo1D, mc_density: &Histo1D) -> Histo1D {
    let mut w = if mc_density.len() >= data_density.len() {
        &mc_density.reciprocal() * data_density
    } else {
        data_density / mc_density
    };
    let mean = w.stat().mean().value();
    if mean != 0.0 {
        w.scale(1.0 / mean);
    }
    w
}

/// Run one reweighting iteration and return the number of dimensions that
/// still needed a correction.
///
/// A dimension whose MC projection is empty stores nothing but still counts
/// as active.
pub fn make_weights<S: EventSource + ?Sized>(
    source: &S,
    plots: &mut [WeightingPlot],
    database: impl AsRef<Path>,
    options: &MakeWeights<'_>,
) -> Result<usize> {
    let MakeWeights { mut delta, mut minmax, power, debug, compare } = *options;
    if !(delta > 0.0) {
        return Err(Error::Config(format!("invalid value for delta: {delta}")));
    }
    if !(minmax > 0.0) {
        return Err(Error::Config(format!("invalid value for minmax: {minmax}")));
    }

    let nplots = plots.len();
    let mut power = if power >= 1.0 { power } else { nplots as f64 };
    if nplots > 1 {
        let fudge = (1.0 / f64::max(2.0, nplots as f64 - 1.0)).sqrt();
        delta *= fudge;
        minmax *= fudge;
    }

    let mut pending = Vec::new();
    let mut degenerate = 0;
    for plot in plots.iter_mut() {
        let address = plot.address.clone();
        let hdata = plot.data.density();

        source.project(&mut plot.mc_histo, &plot.what, plot.how.as_ref())?;
        let st = plot.mc_histo.stat();
        if st.min() <= 0.0 {
            tracing::warn!(address, stat = %st, "statistic goes to zero");
        }
        let hmc = plot.mc_histo.density();

        let w = correction_factor(&hdata, &hmc);
        let cnt = w.stat();
        let mean = cnt.mean();
        if mean.value() == 0.0 {
            // Nothing to store, but the dimension is not matched either.
            tracing::warn!(address, "degenerate correction, MC projection is empty");
            degenerate += 1;
            if let Some(compare) = compare {
                compare(&plot.data, &plot.mc_histo, &address);
            }
            continue;
        }
        let wvar = cnt.rms() / mean.value();
        let (mnw, mxw) = cnt.minmax();
        tracing::info!(
            address,
            mean = %mean,
            min = mnw,
            max = mxw,
            rms_percent = wvar * 100.0,
            "correction"
        );

        if wvar <= delta && (mxw - mnw).abs() <= minmax {
            tracing::info!(
                address,
                rms_percent = wvar * 100.0,
                low_percent = (mnw - 1.0) * 100.0,
                high_percent = (mxw - 1.0) * 100.0,
                "no more reweighting needed"
            );
        } else {
            pending.push(Pending {
                address: address.clone(),
                w: plot.w,
                audit: [plot.data.clone(), plot.mc_histo.clone(), hdata, hmc],
                correction: w,
            });
        }

        if let Some(compare) = compare {
            compare(&plot.data, &plot.mc_histo, &address);
        }
    }

    if nplots == 1 {
        power = 1.0;
    }
    if power != nplots as f64 {
        tracing::info!(power, nplots, "power differs from number of plots");
    }

    let active = pending.len() + degenerate;
    if active != nplots {
        tracing::info!(active, nplots, "number of active reweightings");
        if active > 0 {
            power += (nplots - active) as f64;
            tracing::info!(power, "power changed");
        }
    }

    let database = database.as_ref();
    for entry in pending {
        let mut eff_exp = 1.0 / power;
        if nplots != 1 && entry.w != 1.0 {
            eff_exp *= entry.w;
            tracing::info!(address = %entry.address, eff_exp, "effective exponent");
        }
        let weight = if eff_exp != 1.0 && eff_exp > 0.0 {
            entry.correction.pow(eff_exp)
        } else {
            entry.correction.clone()
        };

        let mut store = WeightStore::open(database)?;
        let factor = [Correction::H1(weight)];
        if debug {
            let [d0, m0, d, m] = entry.audit;
            let audit: Vec<Correction> =
                [d0, m0, d, m, entry.correction].into_iter().map(Correction::H1).collect();
            let key = audit_key(&entry.address);
            store.append_many(&[(entry.address.as_str(), &factor[..]), (key.as_str(), &audit[..])])?;
        } else {
            store.append(&entry.address, &factor)?;
        }
    }

    Ok(active)
}

/// Log how well the MC shape follows the data shape.
pub fn h_compare(data: &Histo1D, mc: &Histo1D, address: &str) {
    let hd = data.density();
    let hm = mc.density();
    let mut chi2 = 0.0;
    let mut ndf = 0usize;
    for i in 0..hd.len() {
        let d = hd.bin(i);
        let m = hm.value_at(hd.center(i), crate::histo::Interpolation::None);
        tracing::debug!(address, bin = i, data = %d, mc = %m, "compare");
        let var = d.cov2() + m.cov2();
        if var > 0.0 {
            chi2 += (d.value() - m.value()).powi(2) / var;
            ndf += 1;
        }
    }
    tracing::info!(address, chi2, ndf, chi2_ndf = if ndf > 0 { chi2 / ndf as f64 } else { 0.0 }, "data/mc");
}
