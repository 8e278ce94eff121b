use approx::assert_relative_eq;
use polars::prelude::col;
use std::path::Path;

use reweight::store::audit_key;
use reweight::toy::{generate_dataset, SampleType};
use reweight::{Campaign, CampaignConfig, Dataset, EventSource, Histo1D, WeightStore};

const CONFIG: &str = r#"
database = "weights.db"

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

fn setup(dir: &Path, mc_sample: SampleType) -> CampaignConfig {
    generate_dataset(5000, SampleType::Data, 1).unwrap().write_csv(dir.join("data.csv")).unwrap();
    generate_dataset(5000, mc_sample, 2).unwrap().write_csv(dir.join("mc.csv")).unwrap();
    let path = dir.join("reweight.toml");
    std::fs::write(&path, CONFIG).unwrap();
    CampaignConfig::load(&path).unwrap()
}

/// Squared distance between the data and weighted MC densities of `pt`.
fn distance(campaign: &Campaign, mc: &Dataset) -> f64 {
    let weighted = mc.with_weights("weight", campaign.weights(mc).unwrap()).unwrap();
    let mut hmc = Histo1D::uniform(10, 0.0, 10.0).unwrap();
    weighted.project(&mut hmc, &col("pt"), Some(&col("weight"))).unwrap();
    let mut hdata = Histo1D::uniform(10, 0.0, 10.0).unwrap();
    campaign.data().project(&mut hdata, &col("pt"), None).unwrap();
    let (d, m) = (hdata.density(), hmc.density());
    (0..d.len()).map(|i| (d.bin(i).value() - m.bin(i).value()).powi(2)).sum()
}

#[test]
fn test_iterations_extend_chain_and_improve_agreement() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), SampleType::Simulation);
    let db = config.database.clone();
    let mc = Dataset::from_csv(&config.mc.path).unwrap();
    let mut campaign = Campaign::new(config).unwrap();

    let before = distance(&campaign, &mc);
    assert_eq!(campaign.iterate().unwrap(), 1);
    let after = distance(&campaign, &mc);
    assert!(after < 0.5 * before, "before {before}, after {after}");

    {
        let store = WeightStore::open_read_only(&db).unwrap();
        assert_eq!(store.get("pt").unwrap().len(), 1);
        assert_eq!(store.get(&audit_key("pt")).unwrap().len(), 5);
    }

    assert_eq!(campaign.iterate().unwrap(), 1);
    let store = WeightStore::open_read_only(&db).unwrap();
    assert_eq!(store.get("pt").unwrap().len(), 2);
    assert_eq!(store.get(&audit_key("pt")).unwrap().len(), 10);
}

#[test]
fn test_identical_samples_need_no_correction() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), SampleType::Data);
    std::fs::copy(&config.data.path, &config.mc.path).unwrap();
    let db = config.database.clone();
    let mut campaign = Campaign::new(config).unwrap();

    assert_eq!(campaign.iterate().unwrap(), 0);
    assert!(WeightStore::open_read_only(&db).unwrap().keys().unwrap().is_empty());
}

#[test]
fn test_apply_adds_weight_column() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), SampleType::Simulation);
    let input = config.mc.path.clone();
    let output = dir.path().join("mc_weighted.csv");
    let mut campaign = Campaign::new(config).unwrap();

    // Without a database every event keeps unit weight.
    let unit = campaign.weights(&Dataset::from_csv(&input).unwrap()).unwrap();
    assert!(unit.iter().all(|w| *w == 1.0));

    campaign.iterate().unwrap();
    assert_eq!(campaign.apply(&input, &output).unwrap(), 5000);

    let weighted = Dataset::from_csv(&output).unwrap();
    assert_eq!(weighted.len(), 5000);
    let weights = &weighted.evaluate(&[col("weight")]).unwrap()[0];
    assert!(weights.iter().all(|w| *w >= 0.0));
    assert!(weights.iter().any(|w| (w - 1.0).abs() > 1e-3));
}

#[test]
fn test_weighted_mc_keeps_data_normalisation_shape() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path(), SampleType::Simulation);
    let db = config.database.clone();
    let mut campaign = Campaign::new(config).unwrap();
    campaign.iterate().unwrap();

    let store = WeightStore::open_read_only(&db).unwrap();
    let chain = store.get("pt").unwrap();
    let reweight::Correction::H1(h) = &chain[0] else {
        panic!("expected a 1D correction");
    };
    assert_relative_eq!(h.stat().mean().value(), 1.0, epsilon = 1e-9);
    // Data falls faster than simulation, so the correction must too.
    assert!(h.bin(0).value() > h.bin(h.len() - 1).value());
}
