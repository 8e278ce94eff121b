//! Event weights from stored correction chains.
//!
//! Data flow for one event:
//! event → accessor → point → every correction at `address` → dimension weight,
//! and the event weight is the product over all dimensions.

use rayon::prelude::*;
use std::borrow::Borrow;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::correction::{Correction, Point};
use crate::error::{Error, Result};
use crate::histo::Interpolation;
use crate::stat::StatEntity;
use crate::store::WeightStore;
use crate::ve::{is_zero, ValueWithError};

/// Extracts the reweighting coordinates from one event.
pub type Accessor<E> = Arc<dyn Fn(&E) -> Point + Send + Sync>;

/// Describes one reweighting dimension.
pub struct WeightingVar<E: ?Sized> {
    accessor: Accessor<E>,
    address: String,
    merge: bool,
    skip: i64,
    interpolation: Interpolation,
}

impl<E: ?Sized> Clone for WeightingVar<E> {
    fn clone(&self) -> Self {
        Self {
            accessor: Arc::clone(&self.accessor),
            address: self.address.clone(),
            merge: self.merge,
            skip: self.skip,
            interpolation: self.interpolation,
        }
    }
}

impl<E: ?Sized> fmt::Debug for WeightingVar<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightingVar")
            .field("address", &self.address)
            .field("merge", &self.merge)
            .field("skip", &self.skip)
            .field("interpolation", &self.interpolation)
            .finish_non_exhaustive()
    }
}

impl<E: ?Sized> WeightingVar<E> {
    /// Merging enabled, nothing skipped, linear lookup.
    pub fn new<F>(accessor: F, address: impl Into<String>) -> Result<Self>
    where
        F: Fn(&E) -> Point + Send + Sync + 'static,
    {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(Error::Config("weighting variable needs a non-empty address".into()));
        }
        Ok(Self {
            accessor: Arc::new(accessor),
            address,
            merge: true,
            skip: 0,
            interpolation: Interpolation::default(),
        })
    }

    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    /// `> 0`: keep the first `skip` corrections; `< 0`: drop the last `|skip|`.
    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn accessor(&self) -> &Accessor<E> {
        &self.accessor
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn merge(&self) -> bool {
        self.merge
    }

    pub fn skip(&self) -> i64 {
        self.skip
    }
}

fn trim_chain(mut chain: Vec<Correction>, skip: i64, address: &str) -> Vec<Correction> {
    let len = chain.len();
    let n = skip.unsigned_abs() as usize;
    if skip > 0 && n < len {
        tracing::info!(address, kept = n, "using only the first corrections");
        chain.truncate(n);
    } else if skip < 0 && n < len {
        tracing::info!(address, dropped = n, "skipping the last corrections");
        chain.truncate(len - n);
    } else if skip != 0 {
        tracing::error!(address, skip, len, "invalid skip parameter, using the whole chain");
    }
    chain
}

fn merge_chain(chain: Vec<Correction>) -> Result<Vec<Correction>> {
    let mut iter = chain.into_iter();
    let Some(mut merged) = iter.next() else {
        return Ok(Vec::new());
    };
    for next in iter {
        merged.zero_errors();
        merged = merged.merged(&next)?;
    }
    Ok(vec![merged])
}

struct Dimension<E: ?Sized> {
    address: String,
    accessor: Accessor<E>,
    corrections: Vec<Correction>,
    interpolation: Interpolation,
    stat: StatEntity,
}

impl<E: ?Sized> Dimension<E> {
    fn weigh(&self, event: &E) -> Result<ValueWithError> {
        let point = (self.accessor)(event);
        let mut w = ValueWithError::ONE;
        for c in &self.corrections {
            w *= c.eval(point, self.interpolation, &self.address)?;
        }
        Ok(w)
    }
}

/// Summary of one configured dimension.
#[derive(Clone, Debug)]
pub struct DimensionInfo {
    pub address: String,
    pub corrections: usize,
    pub stat: StatEntity,
}

/// Computes event weights from the corrections persisted in a [`WeightStore`].
///
/// The chains are read once at construction; later changes to the store are
/// not seen by an existing evaluator.
pub struct Weight<E: ?Sized> {
    dims: Vec<Dimension<E>>,
    counter: StatEntity,
    zeroes: u64,
}

impl<E: ?Sized> Weight<E> {
    /// Load the chains for `factors` from the database at `path`.
    ///
    /// The database is not touched when `factors` is empty.
    pub fn new(path: impl AsRef<Path>, factors: &[WeightingVar<E>]) -> Result<Self> {
        if factors.is_empty() {
            return Ok(Self::neutral());
        }
        let path = path.as_ref();
        let store = WeightStore::open_read_only(path)?;
        for (key, len) in store.chain_lengths()? {
            tracing::debug!(database = %path.display(), key, len, "stored entry");
        }
        Self::from_store(&store, factors)
    }

    /// Same as [`Weight::new`] on an already opened store.
    pub fn from_store(store: &WeightStore, factors: &[WeightingVar<E>]) -> Result<Self> {
        let mut dims = Vec::with_capacity(factors.len());
        for var in factors {
            let chain = store.get(var.address())?;
            if chain.is_empty() {
                tracing::warn!(address = var.address(), "no reweighting is available, skip it");
                continue;
            }
            let chain = trim_chain(chain, var.skip(), var.address());
            let corrections = if var.merge() && chain.len() > 1 { merge_chain(chain)? } else { chain };
            dims.push(Dimension {
                address: var.address().to_string(),
                accessor: Arc::clone(var.accessor()),
                corrections,
                interpolation: var.interpolation,
                stat: StatEntity::new(),
            });
        }
        Ok(Self { dims, counter: StatEntity::new(), zeroes: 0 })
    }

    /// Evaluator without any dimension: every event gets weight 1.
    pub fn neutral() -> Self {
        Self { dims: Vec::new(), counter: StatEntity::new(), zeroes: 0 }
    }

    /// Per-dimension and total weight of `event`, without touching statistics.
    fn weigh(&self, event: &E) -> Result<(Vec<f64>, f64)> {
        let mut total = ValueWithError::ONE;
        let mut parts = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            let w = dim.weigh(event)?;
            parts.push(w.value());
            total *= w;
        }
        Ok((parts, total.value()))
    }

    fn record(&mut self, parts: &[f64], total: f64) {
        for (dim, w) in self.dims.iter_mut().zip(parts) {
            dim.stat += *w;
        }
        self.counter += total;
        if is_zero(total) {
            self.zeroes += 1;
        }
    }

    /// Weight of one event; updates the statistics.
    pub fn evaluate(&mut self, event: &E) -> Result<f64> {
        let (parts, total) = self.weigh(event)?;
        self.record(&parts, total);
        Ok(total)
    }

    /// Weights of a batch, computed in parallel and recorded in order.
    pub fn evaluate_many<T>(&mut self, events: &[T]) -> Result<Vec<f64>>
    where
        T: Borrow<E> + Sync,
        E: Sync,
    {
        let this = &*self;
        let weighed = events
            .par_iter()
            .map(|e| this.weigh(<T as Borrow<E>>::borrow(e)))
            .collect::<Result<Vec<_>>>()?;
        Ok(weighed
            .into_iter()
            .map(|(parts, total)| {
                self.record(&parts, total);
                total
            })
            .collect())
    }

    /// Statistics of all weights returned so far.
    pub fn stat(&self) -> &StatEntity {
        &self.counter
    }

    /// Number of events that got a zero weight.
    pub fn zeroes(&self) -> u64 {
        self.zeroes
    }

    pub fn variables(&self) -> Vec<DimensionInfo> {
        self.dims
            .iter()
            .map(|d| DimensionInfo { address: d.address.clone(), corrections: d.corrections.len(), stat: d.stat })
            .collect()
    }
}

impl<E: ?Sized> fmt::Display for Weight<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "weights: {} zeroes={}", self.counter, self.zeroes)?;
        for d in &self.dims {
            writeln!(f, "  {:>20} [{}]: {}", d.address, d.corrections.len(), d.stat)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histo::Histo1D;
    use approx::assert_relative_eq;

    #[derive(Clone, Copy)]
    struct Ev {
        x: f64,
        y: f64,
    }

    fn constant(v: f64) -> Correction {
        Correction::Constant(ValueWithError::exact(v))
    }

    fn steps(values: &[f64]) -> Correction {
        let mut h = Histo1D::uniform(values.len(), 0.0, values.len() as f64).unwrap();
        for (i, v) in values.iter().enumerate() {
            h.set_bin(i, ValueWithError::with_error(*v, 0.1 * v));
        }
        Correction::H1(h)
    }

    fn xvar(address: &str) -> WeightingVar<Ev> {
        WeightingVar::new(|e: &Ev| Point::X(e.x), address).unwrap()
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(WeightingVar::<Ev>::new(|e: &Ev| Point::X(e.x), " ").is_err());
    }

    #[test]
    fn test_no_factors_gives_unit_weight() {
        let mut w: Weight<Ev> = Weight::new("/nonexistent/weights.db", &[]).unwrap();
        for x in [0.0, 1.0, -5.0] {
            assert_eq!(w.evaluate(&Ev { x, y: 0.0 }).unwrap(), 1.0);
        }
        assert_eq!(w.stat().n(), 3);
        assert!(w.variables().is_empty());
        assert_eq!(w.zeroes(), 0);
    }

    #[test]
    fn test_missing_chain_is_neutral() {
        let store = WeightStore::open_in_memory().unwrap();
        let mut w = Weight::from_store(&store, &[xvar("pt")]).unwrap();
        assert_eq!(w.evaluate(&Ev { x: 1.0, y: 0.0 }).unwrap(), 1.0);
        assert!(w.variables().is_empty());
    }

    #[test]
    fn test_single_constant() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("pt", &[constant(1.7)]).unwrap();
        let mut w = Weight::from_store(&store, &[xvar("pt")]).unwrap();
        for x in [-100.0, 0.0, 0.5, 42.0] {
            assert_relative_eq!(w.evaluate(&Ev { x, y: 0.0 }).unwrap(), 1.7);
        }
    }

    #[test]
    fn test_product_over_chain_and_dimensions() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("x", &[steps(&[1.0, 2.0]), constant(3.0)]).unwrap();
        store.append("y", &[constant(0.5)]).unwrap();
        let vars = [
            xvar("x").with_interpolation(Interpolation::None),
            WeightingVar::new(|e: &Ev| Point::X(e.y), "y").unwrap(),
        ];
        let mut w = Weight::from_store(&store, &vars).unwrap();
        assert_relative_eq!(w.evaluate(&Ev { x: 1.5, y: 0.0 }).unwrap(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(w.evaluate(&Ev { x: 0.5, y: 0.0 }).unwrap(), 1.5, epsilon = 1e-12);
        let info = w.variables();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].corrections, 1);
        assert_eq!(info[0].stat.n(), 2);
    }

    #[test]
    fn test_unmerged_chain_keeps_entries() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("x", &[constant(2.0), constant(3.0)]).unwrap();
        let w = Weight::from_store(&store, &[xvar("x").with_merge(false)]).unwrap();
        assert_eq!(w.variables()[0].corrections, 2);
    }

    #[test]
    fn test_merge_keeps_only_newest_errors() {
        let merged = merge_chain(vec![steps(&[2.0, 4.0]), steps(&[3.0, 1.0]), steps(&[0.5, 2.0])]).unwrap();
        assert_eq!(merged.len(), 1);
        let Correction::H1(h) = &merged[0] else {
            panic!("expected a 1D correction");
        };
        // every factor carries a 10% error; only the last one survives
        assert_relative_eq!(h.bin(0).value(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(h.bin(1).value(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(h.bin(0).cov2(), 0.01 * 9.0, epsilon = 1e-12);
        assert_relative_eq!(h.bin(1).cov2(), 0.01 * 64.0, epsilon = 1e-12);
    }

    #[test]
    fn test_skip_positive_and_negative() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("x", &[constant(2.0), constant(3.0), constant(5.0)]).unwrap();
        let ev = Ev { x: 0.0, y: 0.0 };

        let mut first = Weight::from_store(&store, &[xvar("x").with_skip(1)]).unwrap();
        assert_relative_eq!(first.evaluate(&ev).unwrap(), 2.0);

        let mut drop_last = Weight::from_store(&store, &[xvar("x").with_skip(-1)]).unwrap();
        assert_relative_eq!(drop_last.evaluate(&ev).unwrap(), 6.0);

        let mut invalid = Weight::from_store(&store, &[xvar("x").with_skip(7)]).unwrap();
        assert_relative_eq!(invalid.evaluate(&ev).unwrap(), 30.0);
    }

    #[test]
    fn test_zero_weights_counted() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("x", &[steps(&[1.0, 2.0])]).unwrap();
        let mut w = Weight::from_store(&store, &[xvar("x")]).unwrap();
        // outside the histogram axis
        assert_eq!(w.evaluate(&Ev { x: 5.0, y: 0.0 }).unwrap(), 0.0);
        assert_eq!(w.zeroes(), 1);
    }

    #[test]
    fn test_arity_mismatch_propagates() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("x", &[steps(&[1.0, 2.0])]).unwrap();
        let var = WeightingVar::new(|e: &Ev| Point::XY(e.x, e.y), "x").unwrap();
        let mut w = Weight::from_store(&store, &[var]).unwrap();
        assert!(matches!(w.evaluate(&Ev { x: 0.5, y: 0.5 }), Err(Error::Arity { .. })));
    }

    #[test]
    fn test_batch_matches_single() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("x", &[steps(&[1.0, 2.0, 4.0])]).unwrap();
        let events: Vec<Ev> = (0..30).map(|i| Ev { x: i as f64 * 0.1, y: 0.0 }).collect();
        let mut single = Weight::from_store(&store, &[xvar("x")]).unwrap();
        let mut batch = Weight::from_store(&store, &[xvar("x")]).unwrap();
        let one: Vec<f64> = events.iter().map(|e| single.evaluate(e).unwrap()).collect();
        let many = batch.evaluate_many(&events).unwrap();
        assert_eq!(one, many);
        assert_eq!(single.stat(), batch.stat());
    }

    #[test]
    fn test_slice_events() {
        let mut store = WeightStore::open_in_memory().unwrap();
        store.append("x", &[constant(2.0)]).unwrap();
        let var: WeightingVar<[f64]> = WeightingVar::new(|row: &[f64]| Point::X(row[0]), "x").unwrap();
        let mut w = Weight::from_store(&store, &[var]).unwrap();
        let rows = vec![vec![0.1], vec![0.2]];
        assert_eq!(w.evaluate_many(&rows).unwrap(), vec![2.0, 2.0]);
    }
}
