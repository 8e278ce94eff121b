//! Iterative reweighting of simulated samples to match reference data.
//!
//! Corrections are stored per *address* as chains of histograms in a
//! [`WeightStore`]; [`Weight`] turns them into per-event weights and
//! [`make_weights`] compares weighted MC against data and extends the chains.

pub mod campaign;
pub mod config;
pub mod correction;
pub mod dataset;
pub mod error;
pub mod histo;
pub mod plot;
pub mod reweight;
pub mod stat;
pub mod store;
pub mod toy;
pub mod ve;
pub mod weighting;

pub use campaign::Campaign;
pub use config::CampaignConfig;
pub use correction::{Correction, Point};
pub use dataset::{Dataset, EventSource};
pub use error::{Error, Result};
pub use histo::{Histo1D, Histo2D, Interpolation};
pub use reweight::{make_weights, MakeWeights, WeightingPlot};
pub use stat::StatEntity;
pub use store::WeightStore;
pub use ve::ValueWithError;
pub use weighting::{Weight, WeightingVar};
