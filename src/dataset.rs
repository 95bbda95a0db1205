//! Interaction data consumed by the model and its training loop.
//!
//! - `InteractionSet`: deduplicated, zero-based `(user, item)` pairs with
//!   per-user positive lookups. Immutable once built.
//! - `IdMapping`: raw identifier ↔ contiguous index maps produced by
//!   `InteractionSet::from_raw_ids`.
//! - `InteractionBatch`: index columns keyed by field name, the shape the
//!   loss and scoring entry points accept.
//! - `NegativeSampler`: seeded uniform sampling of unobserved items.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use log::{debug, info, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{QgcnError, QgcnResult};
use crate::params::QgcnParams;

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionSet {
    user_count: usize,
    item_count: usize,
    // sorted by (user, item), no duplicates
    pairs: Vec<(usize, usize)>,
    positives: Vec<BTreeSet<usize>>,
}

impl InteractionSet {
    /// Build from index pairs. Duplicates are dropped, order is normalised.
    pub fn new(
        user_count: usize,
        item_count: usize,
        pairs: impl IntoIterator<Item = (usize, usize)>,
    ) -> QgcnResult<Self> {
        if user_count == 0 || item_count == 0 {
            return Err(QgcnError::EmptyGraph { users: user_count, items: item_count });
        }

        let mut positives = vec![BTreeSet::new(); user_count];
        let mut raw = 0usize;
        for (u, i) in pairs {
            raw += 1;
            if u >= user_count {
                return Err(QgcnError::UserIndexOutOfBounds { index: u, count: user_count });
            }
            if i >= item_count {
                return Err(QgcnError::ItemIndexOutOfBounds { index: i, count: item_count });
            }
            positives[u].insert(i);
        }

        let pairs: Vec<(usize, usize)> = positives
            .iter()
            .enumerate()
            .flat_map(|(u, items)| items.iter().map(move |&i| (u, i)))
            .collect();

        info!(
            "Interaction set: {} users, {} items, {} interactions",
            user_count,
            item_count,
            pairs.len()
        );
        if raw > pairs.len() {
            debug!("Dropped {} duplicate interactions", raw - pairs.len());
        }

        Ok(Self { user_count, item_count, pairs, positives })
    }

    /// Index arbitrary raw identifiers in first-seen order.
    pub fn from_raw_ids<U, I>(
        records: impl IntoIterator<Item = (U, I)>,
    ) -> QgcnResult<(Self, IdMapping<U, I>)>
    where
        U: Hash + Eq + Clone,
        I: Hash + Eq + Clone,
    {
        let mut mapping = IdMapping::default();
        let mut pairs = Vec::new();
        for (u, i) in records {
            let ui = mapping.intern_user(u);
            let ii = mapping.intern_item(i);
            pairs.push((ui, ii));
        }
        let set = Self::new(mapping.user_count(), mapping.item_count(), pairs)?;
        Ok((set, mapping))
    }

    pub fn user_count(&self) -> usize {
        self.user_count
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    /// Number of distinct interactions.
    pub fn nnz(&self) -> usize {
        self.pairs.len()
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pairs.iter().copied()
    }

    /// Items the user has interacted with, ascending.
    pub fn positives(&self, user: usize) -> QgcnResult<&BTreeSet<usize>> {
        self.positives
            .get(user)
            .ok_or(QgcnError::UserIndexOutOfBounds { index: user, count: self.user_count })
    }

    pub fn contains(&self, user: usize, item: usize) -> bool {
        self.positives
            .get(user)
            .map(|items| items.contains(&item))
            .unwrap_or(false)
    }

    /// Fraction of the user × item grid that is observed.
    pub fn density(&self) -> f64 {
        self.pairs.len() as f64 / (self.user_count as f64 * self.item_count as f64)
    }
}

/// Raw identifier ↔ index maps for users and items.
#[derive(Debug, Clone)]
pub struct IdMapping<U, I> {
    user_index: HashMap<U, usize>,
    item_index: HashMap<I, usize>,
    users: Vec<U>,
    items: Vec<I>,
}

impl<U, I> Default for IdMapping<U, I> {
    fn default() -> Self {
        Self {
            user_index: HashMap::new(),
            item_index: HashMap::new(),
            users: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl<U: Hash + Eq + Clone, I: Hash + Eq + Clone> IdMapping<U, I> {
    fn intern_user(&mut self, raw: U) -> usize {
        if let Some(&idx) = self.user_index.get(&raw) {
            return idx;
        }
        let idx = self.users.len();
        self.users.push(raw.clone());
        self.user_index.insert(raw, idx);
        idx
    }

    fn intern_item(&mut self, raw: I) -> usize {
        if let Some(&idx) = self.item_index.get(&raw) {
            return idx;
        }
        let idx = self.items.len();
        self.items.push(raw.clone());
        self.item_index.insert(raw, idx);
        idx
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn user_idx(&self, raw: &U) -> Option<usize> {
        self.user_index.get(raw).copied()
    }

    pub fn item_idx(&self, raw: &I) -> Option<usize> {
        self.item_index.get(raw).copied()
    }

    pub fn user_id(&self, idx: usize) -> Option<&U> {
        self.users.get(idx)
    }

    pub fn item_id(&self, idx: usize) -> Option<&I> {
        self.items.get(idx)
    }
}

/// Index columns keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionBatch {
    columns: HashMap<String, Vec<usize>>,
}

impl InteractionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, column: Vec<usize>) -> &mut Self {
        self.columns.insert(field.into(), column);
        self
    }

    pub fn with(mut self, field: impl Into<String>, column: Vec<usize>) -> Self {
        self.insert(field, column);
        self
    }

    /// (user, positive, negative) triples under the configured field names.
    pub fn triples(
        params: &QgcnParams,
        users: Vec<usize>,
        pos_items: Vec<usize>,
        neg_items: Vec<usize>,
    ) -> Self {
        Self::new()
            .with(params.user_idx_name.clone(), users)
            .with(params.item_idx_name.clone(), pos_items)
            .with(params.neg_item_idx_name.clone(), neg_items)
    }

    pub fn get(&self, field: &str) -> QgcnResult<&[usize]> {
        self.columns
            .get(field)
            .map(|c| c.as_slice())
            .ok_or_else(|| QgcnError::MissingBatchField(field.to_string()))
    }

    /// Length of the named column, or 0 if absent.
    pub fn len_of(&self, field: &str) -> usize {
        self.columns.get(field).map(|c| c.len()).unwrap_or(0)
    }

    /// Fetch several columns that must share one non-zero length.
    pub(crate) fn aligned<const N: usize>(
        &self,
        fields: [&str; N],
    ) -> QgcnResult<[&[usize]; N]> {
        let mut out: [&[usize]; N] = [&[]; N];
        for (slot, field) in out.iter_mut().zip(fields.iter()) {
            *slot = self.get(field)?;
        }
        let expected = out[0].len();
        if expected == 0 {
            return Err(QgcnError::EmptyBatch);
        }
        for (column, field) in out.iter().zip(fields.iter()) {
            if column.len() != expected {
                return Err(QgcnError::BatchLengthMismatch {
                    field: field.to_string(),
                    expected,
                    actual: column.len(),
                });
            }
        }
        Ok(out)
    }
}

/// Uniform sampler over items a user has not interacted with.
pub struct NegativeSampler {
    rng: ChaCha8Rng,
}

impl NegativeSampler {
    pub fn new(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    /// One unobserved item for `user`, or `None` if the user has seen every item.
    pub fn sample(&mut self, interactions: &InteractionSet, user: usize) -> Option<usize> {
        let seen = interactions.positives.get(user)?;
        let n_items = interactions.item_count;
        if seen.len() >= n_items {
            return None;
        }
        // rejection sampling is cheap while the user is sparse
        if seen.len() * 2 <= n_items {
            loop {
                let candidate = self.rng.random_range(0..n_items);
                if !seen.contains(&candidate) {
                    return Some(candidate);
                }
            }
        }
        let unseen: Vec<usize> = (0..n_items).filter(|i| !seen.contains(i)).collect();
        let pick = unseen[self.rng.random_range(0..unseen.len())];
        trace!("Dense user {}: sampled {} from {} unseen items", user, pick, unseen.len());
        Some(pick)
    }

    /// Pair each observed interaction with a sampled negative. Users with no
    /// unobserved items are skipped.
    pub fn sample_triples(
        &mut self,
        interactions: &InteractionSet,
        pairs: &[(usize, usize)],
    ) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        let mut users = Vec::with_capacity(pairs.len());
        let mut pos = Vec::with_capacity(pairs.len());
        let mut neg = Vec::with_capacity(pairs.len());
        for &(u, i) in pairs {
            if let Some(j) = self.sample(interactions, u) {
                users.push(u);
                pos.push(i);
                neg.push(j);
            }
        }
        if users.len() < pairs.len() {
            debug!(
                "Skipped {} interactions whose users have no unobserved items",
                pairs.len() - users.len()
            );
        }
        (users, pos, neg)
    }

    pub(crate) fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}
