//! Campaign configuration (TOML).
//!
//! ```toml
//! database = "weights.db"
//! max_iterations = 10
//!
//! [data]
//! path = "data.csv"
//!
//! [mc]
//! path = "mc.csv"
//! weight = "CASE WHEN pt < 8 THEN 1 ELSE 0 END"
//!
//! [[variables]]
//! address = "pt-data"
//! expression = "pt"
//! bins = 20
//! range = [0.0, 10.0]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::histo::Interpolation;

fn default_database() -> PathBuf {
    PathBuf::from("weights.db")
}
fn default_delta() -> f64 {
    0.001
}
fn default_minmax() -> f64 {
    0.05
}
fn default_true() -> bool {
    true
}
fn default_max_iterations() -> usize {
    10
}
fn default_weight_column() -> String {
    "weight".to_string()
}
fn default_importance() -> f64 {
    1.0
}

fn is_column_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Location of one event sample and an optional sample-wide weight/cut.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub weight: Option<String>,
}

/// One reweighting dimension.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub address: String,
    /// Expression histogrammed on both samples.
    pub expression: String,
    /// Columns handed to the weight lookup; defaults to `[expression]`.
    #[serde(default)]
    pub columns: Vec<String>,
    pub bins: usize,
    pub range: (f64, f64),
    /// MC histogram binning, when it should differ from the data binning.
    #[serde(default)]
    pub mc_bins: Option<usize>,
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default = "default_true")]
    pub merge: bool,
    #[serde(default)]
    pub skip: i64,
    #[serde(default)]
    pub interpolation: Interpolation,
}

impl VariableConfig {
    pub fn accessor_columns(&self) -> Vec<String> {
        if self.columns.is_empty() {
            vec![self.expression.clone()]
        } else {
            self.columns.clone()
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    pub data: SampleConfig,
    pub mc: SampleConfig,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_delta")]
    pub delta: f64,
    #[serde(default = "default_minmax")]
    pub minmax: f64,
    #[serde(default)]
    pub power: f64,
    #[serde(default = "default_true")]
    pub debug: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_weight_column")]
    pub weight_column: String,
    pub variables: Vec<VariableConfig>,
}

impl CampaignConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: CampaignConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`; relative sample and database paths are resolved against
    /// the directory of the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self::from_toml(&std::fs::read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            config.data.path = base.join(&config.data.path);
            config.mc.path = base.join(&config.mc.path);
            config.database = base.join(&config.database);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(Error::Config("at least one variable is required".into()));
        }
        if !(self.delta > 0.0) || !(self.minmax > 0.0) {
            return Err(Error::Config("delta and minmax must be positive".into()));
        }
        for v in &self.variables {
            if v.address.trim().is_empty() {
                return Err(Error::Config("variable with empty address".into()));
            }
            if v.bins == 0 || !(v.range.0 < v.range.1) {
                return Err(Error::Config(format!("invalid binning for `{}`", v.address)));
            }
            if v.columns.is_empty() && !is_column_name(&v.expression) {
                return Err(Error::Config(format!(
                    "`{}`: expression `{}` is not a column, set `columns` explicitly",
                    v.address, v.expression
                )));
            }
            let n = v.accessor_columns().len();
            if n != 1 && n != 2 {
                return Err(Error::Config(format!("`{}` needs one or two accessor columns, got {n}", v.address)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [data]
        path = "data.csv"

        [mc]
        path = "mc.csv"

        [[variables]]
        address = "pt"
        expression = "pt"
        bins = 10
        range = [0.0, 10.0]
    "#;

    #[test]
    fn test_defaults() {
        let c = CampaignConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(c.database, PathBuf::from("weights.db"));
        assert_eq!(c.delta, 0.001);
        assert_eq!(c.minmax, 0.05);
        assert_eq!(c.power, 0.0);
        assert!(c.debug);
        assert_eq!(c.weight_column, "weight");
        let v = &c.variables[0];
        assert!(v.merge);
        assert_eq!(v.skip, 0);
        assert_eq!(v.importance, 1.0);
        assert_eq!(v.interpolation, Interpolation::Linear);
        assert_eq!(v.accessor_columns(), vec!["pt".to_string()]);
    }

    #[test]
    fn test_full_variable() {
        let text = MINIMAL.replace(
            "range = [0.0, 10.0]",
            "range = [0.0, 10.0]\ncolumns = [\"pt\"]\nmc_bins = 40\nimportance = 0.5\nmerge = false\nskip = -2\ninterpolation = \"none\"",
        );
        let c = CampaignConfig::from_toml(&text).unwrap();
        let v = &c.variables[0];
        assert_eq!(v.mc_bins, Some(40));
        assert_eq!(v.importance, 0.5);
        assert!(!v.merge);
        assert_eq!(v.skip, -2);
        assert_eq!(v.interpolation, Interpolation::None);
    }

    #[test]
    fn test_derived_expression_needs_columns() {
        let derived = MINIMAL.replace("expression = \"pt\"", "expression = \"pt * 2\"");
        assert!(matches!(CampaignConfig::from_toml(&derived), Err(Error::Config(_))));
        let with_columns = derived.replace("bins = 10", "bins = 10\ncolumns = [\"pt\"]");
        let c = CampaignConfig::from_toml(&with_columns).unwrap();
        assert_eq!(c.variables[0].accessor_columns(), vec!["pt".to_string()]);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(CampaignConfig::from_toml(&MINIMAL.replace("bins = 10", "bins = 0")).is_err());
        assert!(CampaignConfig::from_toml(&format!("delta = -1.0\n{MINIMAL}")).is_err());
        assert!(CampaignConfig::from_toml(&MINIMAL.replace("address = \"pt\"", "address = \"\"")).is_err());
        assert!(CampaignConfig::from_toml(&format!("unknown = 1\n{MINIMAL}")).is_err());
    }
}
