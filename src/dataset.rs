//! Event sources: anything that can project an expression into a histogram.

use polars::prelude::*;
use std::path::Path;

use crate::error::{Error, Result};
use crate::histo::Histo1D;

const X_ALIAS: &str = "__reweight_x";
const W_ALIAS: &str = "__reweight_w";

/// A sample of events that can be histogrammed.
pub trait EventSource {
    /// Reset `histo` and fill it with `what`, weighted by `how` (unit weight
    /// when absent). Returns the number of entries that landed in range.
    fn project(&self, histo: &mut Histo1D, what: &Expr, how: Option<&Expr>) -> Result<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse a SQL-style expression such as `pt * 2` or `CASE WHEN eta > 0 THEN weight ELSE 0 END`.
pub fn parse_expr(text: &str) -> Result<Expr> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Config("empty expression".into()));
    }
    Ok(polars::sql::sql_expr(text)?)
}

/// Column-oriented events backed by a polars `DataFrame`.
#[derive(Clone, Debug)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    pub fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let frame = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;
        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Evaluate `exprs` and return each result as an `f64` column (nulls as NaN).
    pub fn evaluate(&self, exprs: &[Expr]) -> Result<Vec<Vec<f64>>> {
        let aliased: Vec<Expr> = exprs
            .iter()
            .enumerate()
            .map(|(i, e)| e.clone().cast(DataType::Float64).alias(&format!("__reweight_{i}")))
            .collect();
        let out = self.frame.clone().lazy().select(aliased).collect()?;
        out.get_columns().iter().map(|s| column_values(s)).collect()
    }

    /// Row-major values of `columns`, one `Vec` per event.
    pub fn rows(&self, columns: &[String]) -> Result<Vec<Vec<f64>>> {
        let exprs: Vec<Expr> = columns.iter().map(|c| col(c)).collect();
        let values = self.evaluate(&exprs)?;
        Ok((0..self.len()).map(|i| values.iter().map(|c| c[i]).collect()).collect())
    }

    /// Copy of the dataset with `weights` as column `name` (replacing any existing one).
    pub fn with_weights(&self, name: &str, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != self.len() {
            return Err(Error::Config(format!(
                "{} weights for {} events",
                weights.len(),
                self.len()
            )));
        }
        let mut frame = self.frame.clone();
        frame.with_column(Series::new(name, weights))?;
        Ok(Self { frame })
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut frame = self.frame.clone();
        CsvWriter::new(file).include_header(true).finish(&mut frame)?;
        Ok(())
    }
}

fn column_values(series: &Series) -> Result<Vec<f64>> {
    let series = series.cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

impl EventSource for Dataset {
    fn project(&self, histo: &mut Histo1D, what: &Expr, how: Option<&Expr>) -> Result<usize> {
        histo.reset();
        let weight = how.cloned().unwrap_or_else(|| lit(1.0));
        let out = self
            .frame
            .clone()
            .lazy()
            .select([
                what.clone().cast(DataType::Float64).alias(X_ALIAS),
                weight.cast(DataType::Float64).alias(W_ALIAS),
            ])
            .collect()?;
        let xs = out.column(X_ALIAS)?.f64()?;
        let ws = out.column(W_ALIAS)?.f64()?;
        let mut filled = 0;
        if ws.len() == 1 && xs.len() != 1 {
            // literal weight broadcast
            let w = ws.get(0).unwrap_or(1.0);
            for x in xs.into_iter().flatten() {
                filled += usize::from(histo.fill(x, w));
            }
        } else {
            for (x, w) in xs.into_iter().zip(ws) {
                if let (Some(x), Some(w)) = (x, w) {
                    filled += usize::from(histo.fill(x, w));
                }
            }
        }
        Ok(filled)
    }

    fn len(&self) -> usize {
        self.frame.height()
    }
}
