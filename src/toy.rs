//! Toy "data" and "simulation" samples with deliberately different shapes,
//! for trying the reweighting procedure end to end.

use polars::prelude::*;
use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

use crate::dataset::Dataset;
use crate::error::Result;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SampleType {
    Data,
    Simulation,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Event {
    pub pt: f64,
    pub eta: f64,
}

impl Event {
    pub const PT_BOUNDS: (f64, f64) = (0.0, 10.0);
    pub const ETA_BOUNDS: (f64, f64) = (-3.0, 3.0);
    const TAU_DATA: f64 = 2.0;
    const TAU_SIM: f64 = 2.6;
    const SIGMA_DATA: f64 = 1.0;
    const SIGMA_SIM: f64 = 1.3;
    const MU_DATA: f64 = 0.0;
    const MU_SIM: f64 = 0.2;

    pub fn generate<R: Rng>(rng: &mut R, sample: SampleType) -> Self {
        Event { pt: Event::gen_pt(rng, sample), eta: Event::gen_eta(rng, sample) }
    }

    fn gen_pt<R: Rng>(rng: &mut R, sample: SampleType) -> f64 {
        let tau = match sample {
            SampleType::Data => Event::TAU_DATA,
            SampleType::Simulation => Event::TAU_SIM,
        };
        let u_pt = Uniform::new(Event::PT_BOUNDS.0, Event::PT_BOUNDS.1);
        let u_p = Uniform::new(0.0, 1.0 / tau);
        loop {
            let pt_star = rng.sample(u_pt);
            if Event::p_pt(pt_star, tau) >= rng.sample(u_p) {
                return pt_star;
            }
        }
    }

    fn gen_eta<R: Rng>(rng: &mut R, sample: SampleType) -> f64 {
        let (mu, sigma) = match sample {
            SampleType::Data => (Event::MU_DATA, Event::SIGMA_DATA),
            SampleType::Simulation => (Event::MU_SIM, Event::SIGMA_SIM),
        };
        let u_eta = Uniform::new(Event::ETA_BOUNDS.0, Event::ETA_BOUNDS.1);
        let u_p = Uniform::new(0.0, Event::p_eta(mu, mu, sigma));
        loop {
            let eta_star = rng.sample(u_eta);
            if Event::p_eta(eta_star, mu, sigma) >= rng.sample(u_p) {
                return eta_star;
            }
        }
    }

    fn p_pt(pt: f64, tau: f64) -> f64 {
        f64::exp(-pt / tau) / tau
    }

    fn p_eta(eta: f64, mu: f64, sigma: f64) -> f64 {
        f64::exp(-0.5 * ((eta - mu) / sigma).powi(2)) / (f64::sqrt(2.0 * PI) * sigma)
    }
}

/// `n` events of `sample`, reproducible through `seed`.
pub fn generate(n: usize, sample: SampleType, seed: u64) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| Event::generate(&mut rng, sample)).collect()
}

/// Same as [`generate`], as a [`Dataset`] with columns `pt` and `eta`.
pub fn generate_dataset(n: usize, sample: SampleType, seed: u64) -> Result<Dataset> {
    let events = generate(n, sample, seed);
    let pt: Vec<f64> = events.iter().map(|e| e.pt).collect();
    let eta: Vec<f64> = events.iter().map(|e| e.eta).collect();
    let frame = DataFrame::new(vec![Series::new("pt", pt), Series::new("eta", eta)])?;
    Ok(Dataset::from_frame(frame))
}
