//! Configuration-driven reweighting campaign.
//!
//! Each iteration weights the MC sample with the chains already in the
//! database, histograms it next to the data, and lets [`make_weights`]
//! extend the chains.

use polars::prelude::*;
use std::path::Path;

use crate::config::{CampaignConfig, VariableConfig};
use crate::correction::Point;
use crate::dataset::{parse_expr, Dataset, EventSource};
use crate::error::{Error, Result};
use crate::histo::Histo1D;
use crate::reweight::{h_compare, make_weights, MakeWeights, WeightingPlot};
use crate::store::WeightStore;
use crate::weighting::{Weight, WeightingVar};

pub struct Campaign {
    config: CampaignConfig,
    data: Dataset,
    mc: Dataset,
    plots: Vec<WeightingPlot>,
    columns: Vec<String>,
    vars: Vec<WeightingVar<[f64]>>,
}

fn column_index(columns: &mut Vec<String>, name: &str) -> usize {
    match columns.iter().position(|c| c == name) {
        Some(i) => i,
        None => {
            columns.push(name.to_string());
            columns.len() - 1
        }
    }
}

fn weighting_var(v: &VariableConfig, columns: &mut Vec<String>) -> Result<WeightingVar<[f64]>> {
    let idx: Vec<usize> = v.accessor_columns().iter().map(|c| column_index(columns, c)).collect();
    let var = match idx[..] {
        [i] => WeightingVar::new(move |row: &[f64]| Point::X(row[i]), &v.address)?,
        [i, j] => WeightingVar::new(move |row: &[f64]| Point::XY(row[i], row[j]), &v.address)?,
        _ => {
            return Err(Error::Config(format!(
                "`{}` needs one or two accessor columns",
                v.address
            )))
        }
    };
    Ok(var.with_merge(v.merge).with_skip(v.skip).with_interpolation(v.interpolation))
}

impl Campaign {
    /// Load both samples and fill the reference histograms.
    pub fn new(config: CampaignConfig) -> Result<Self> {
        let data = Dataset::from_csv(&config.data.path)?;
        let mc = Dataset::from_csv(&config.mc.path)?;
        tracing::info!(data = data.len(), mc = mc.len(), "samples loaded");
        Self::from_datasets(config, data, mc)
    }

    pub fn from_datasets(config: CampaignConfig, data: Dataset, mc: Dataset) -> Result<Self> {
        config.validate()?;
        let data_weight = config.data.weight.as_deref().map(parse_expr).transpose()?;
        let mc_weight = config.mc.weight.as_deref().map(parse_expr).transpose()?;
        let how = match mc_weight {
            Some(w) => col(&config.weight_column) * w,
            None => col(&config.weight_column),
        };

        let mut plots = Vec::with_capacity(config.variables.len());
        let mut columns = Vec::new();
        let mut vars = Vec::with_capacity(config.variables.len());
        for v in &config.variables {
            let what = parse_expr(&v.expression)?;
            let mut hdata = Histo1D::uniform(v.bins, v.range.0, v.range.1)?;
            let n = data.project(&mut hdata, &what, data_weight.as_ref())?;
            tracing::debug!(address = %v.address, entries = n, "reference histogram filled");
            let mut plot = WeightingPlot::new(what, Some(how.clone()), &v.address, hdata)?
                .with_importance(v.importance);
            if let Some(mc_bins) = v.mc_bins {
                plot = plot.with_mc_histo(Histo1D::uniform(mc_bins, v.range.0, v.range.1)?)?;
            }
            plots.push(plot);
            vars.push(weighting_var(v, &mut columns)?);
        }
        Ok(Self { config, data, mc, plots, columns, vars })
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn plots(&self) -> &[WeightingPlot] {
        &self.plots
    }

    /// Weights of `sample` from the chains currently stored.
    pub fn weights(&self, sample: &Dataset) -> Result<Vec<f64>> {
        if !self.config.database.exists() {
            return Ok(vec![1.0; sample.len()]);
        }
        let mut weight = Weight::new(&self.config.database, &self.vars)?;
        let rows = sample.rows(&self.columns)?;
        let weights = weight.evaluate_many(&rows)?;
        tracing::info!(stat = %weight.stat(), zeroes = weight.zeroes(), "event weights");
        Ok(weights)
    }

    /// One reweighting iteration; returns the number of active dimensions.
    pub fn iterate(&mut self) -> Result<usize> {
        WeightStore::open(&self.config.database)?;
        let weights = self.weights(&self.mc)?;
        let weighted = self.mc.with_weights(&self.config.weight_column, weights)?;
        let options = MakeWeights {
            delta: self.config.delta,
            minmax: self.config.minmax,
            power: self.config.power,
            debug: self.config.debug,
            compare: Some(&h_compare),
        };
        make_weights(&weighted, &mut self.plots, &self.config.database, &options)
    }

    /// Write `input` with the current weights added as the weight column.
    pub fn apply(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<usize> {
        let sample = Dataset::from_csv(input)?;
        let weights = self.weights(&sample)?;
        let n = weights.len();
        sample.with_weights(&self.config.weight_column, weights)?.write_csv(output)?;
        Ok(n)
    }
}
