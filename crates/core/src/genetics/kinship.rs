use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::types::AnimalId;

use super::pedigree::Pedigree;

/// Unordered pair of pedigree indices, smaller index first.
type PairKey = (usize, usize);

fn canonical(p: usize, q: usize) -> PairKey {
    if p <= q {
        (p, q)
    } else {
        (q, p)
    }
}

/// Counters for cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Coancestry values computed from their dependencies.
    pub evaluations: u64,
    /// Queries answered straight from a cache.
    pub cache_hits: u64,
    /// Dependencies substituted by 0 because they were still pending,
    /// which only happens on cyclic pedigrees.
    pub cycle_breaks: u64,
}

/// Coancestry and inbreeding calculator over a shared, immutable pedigree.
///
/// Values follow Wright's recursion on coancestry (kinship) coefficients:
///
///   f(a, a) = 0.5 * (1 + F(a))
///   f(a, b) = 0.5 * (f(a, sire_b) + f(a, dam_b))    b not an ancestor of a
///   F(i)    = f(sire_i, dam_i)                       0 if a parent is unknown
///
/// An unknown parent contributes 0. The animal expanded in the second rule is
/// the one later in the parents-first ordering of the pedigree, so it can
/// never be an ancestor of the other.
///
/// Both caches belong to this engine and are tied to its pedigree; they are
/// dropped together by [`KinshipEngine::reload`]. Engines are cheap to create,
/// so concurrent sessions should each own one over the same `Arc<Pedigree>`.
#[derive(Debug, Clone)]
pub struct KinshipEngine {
    pedigree: Arc<Pedigree>,
    /// Inbreeding coefficient by pedigree index.
    inbreeding_cache: HashMap<usize, f64>,
    /// Coancestry coefficient by canonical index pair.
    coancestry_cache: HashMap<PairKey, f64>,
    stats: EngineStats,
}

impl KinshipEngine {
    pub fn new(pedigree: Arc<Pedigree>) -> Self {
        Self {
            pedigree,
            inbreeding_cache: HashMap::new(),
            coancestry_cache: HashMap::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn pedigree(&self) -> &Pedigree {
        &self.pedigree
    }

    /// A handle to the pedigree, for building sibling engines.
    pub fn shared_pedigree(&self) -> Arc<Pedigree> {
        Arc::clone(&self.pedigree)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Replace the pedigree, discarding both caches.
    pub fn reload(&mut self, pedigree: Arc<Pedigree>) {
        self.pedigree = pedigree;
        self.clear_caches();
    }

    pub fn clear_caches(&mut self) {
        self.inbreeding_cache.clear();
        self.coancestry_cache.clear();
    }

    /// Inbreeding coefficient of `id`, in [0, 1].
    ///
    /// Animals without a record, or with either parent unknown, have 0.
    pub fn inbreeding(&mut self, id: AnimalId) -> f64 {
        match self.pedigree.index_of(id) {
            Some(idx) => self.inbreeding_at(idx),
            None => 0.0,
        }
    }

    /// Coancestry (kinship) coefficient of `a` and `b`, in [0, 1].
    ///
    /// Symmetric in its arguments. An animal without a record is treated as
    /// an unrelated, non-inbred founder: it has coancestry 0 with every other
    /// animal, but `coancestry(x, x)` is 0.5 even when `x` is unknown or the
    /// pedigree is empty, so that `f(x, x) = 0.5 * (1 + F(x))` always holds.
    pub fn coancestry(&mut self, a: AnimalId, b: AnimalId) -> f64 {
        match (self.pedigree.index_of(a), self.pedigree.index_of(b)) {
            (Some(i), Some(j)) => self.coancestry_at(i, j),
            _ if a == b => 0.5,
            _ => 0.0,
        }
    }

    /// Additive genetic relationship, twice the coancestry.
    pub fn relationship(&mut self, a: AnimalId, b: AnimalId) -> f64 {
        2.0 * self.coancestry(a, b)
    }

    /// Inbreeding of every animal, in input order.
    pub fn inbreeding_all(&mut self) -> Vec<(AnimalId, f64)> {
        let pedigree = Arc::clone(&self.pedigree);
        pedigree
            .entries()
            .map(|e| (e.animal_id, self.inbreeding(e.animal_id)))
            .collect()
    }

    pub(crate) fn inbreeding_at(&mut self, idx: usize) -> f64 {
        if let Some(&f) = self.inbreeding_cache.get(&idx) {
            self.stats.cache_hits += 1;
            return f;
        }
        let f = match (self.pedigree.sire(idx), self.pedigree.dam(idx)) {
            (Some(s), Some(d)) => self.coancestry_at(s, d),
            _ => 0.0,
        };
        // Evaluating the parents' pair may already have recorded a value.
        *self.inbreeding_cache.entry(idx).or_insert(f)
    }

    /// Coancestry by pedigree index, evaluated on an explicit work stack.
    ///
    /// A key is pushed once and stays "pending" until its value is cached.
    /// Dependencies that are pending when their dependant is evaluated can
    /// only arise from a parent cycle; they contribute 0.
    pub(crate) fn coancestry_at(&mut self, i: usize, j: usize) -> f64 {
        let key = canonical(i, j);
        if let Some(&v) = self.coancestry_cache.get(&key) {
            self.stats.cache_hits += 1;
            return v;
        }

        let mut stack: Vec<PairKey> = vec![key];
        let mut pending: HashSet<PairKey> = HashSet::from([key]);

        while let Some(&top) = stack.last() {
            let next = self
                .dependencies(top)
                .into_iter()
                .flatten()
                .find(|dep| !self.coancestry_cache.contains_key(dep) && !pending.contains(dep));

            if let Some(dep) = next {
                pending.insert(dep);
                stack.push(dep);
                continue;
            }

            let value = self.evaluate(top);
            self.coancestry_cache.insert(top, value);
            self.stats.evaluations += 1;
            stack.pop();
            pending.remove(&top);
        }

        self.coancestry_cache.get(&key).copied().unwrap_or(0.0)
    }

    /// Keys that must be known before `key` can be evaluated.
    fn dependencies(&self, (a, b): PairKey) -> [Option<PairKey>; 2] {
        let ped = &self.pedigree;
        if a == b {
            let parents = match (ped.sire(a), ped.dam(a)) {
                (Some(s), Some(d)) => Some(canonical(s, d)),
                _ => None,
            };
            [parents, None]
        } else {
            [
                ped.sire(b).map(|s| canonical(a, s)),
                ped.dam(b).map(|d| canonical(a, d)),
            ]
        }
    }

    /// Combine the (cached) dependencies of `key` into its value.
    fn evaluate(&mut self, (a, b): PairKey) -> f64 {
        let [first, second] = self.dependencies((a, b));
        let first = first.map(|dep| self.lookup(dep));
        let second = second.map(|dep| self.lookup(dep));

        if a == b {
            let f = first.unwrap_or(0.0);
            self.inbreeding_cache.entry(a).or_insert(f);
            0.5 * (1.0 + f)
        } else {
            0.5 * (first.unwrap_or(0.0) + second.unwrap_or(0.0))
        }
    }

    fn lookup(&mut self, dep: PairKey) -> f64 {
        match self.coancestry_cache.get(&dep) {
            Some(&v) => v,
            None => {
                self.stats.cycle_breaks += 1;
                log::warn!(
                    "Parent cycle reached between animals {} and {}; path contributes 0",
                    self.pedigree.id_at(dep.0),
                    self.pedigree.id_at(dep.1)
                );
                0.0
            }
        }
    }
}

impl From<Pedigree> for KinshipEngine {
    fn from(pedigree: Pedigree) -> Self {
        Self::new(Arc::new(pedigree))
    }
}
