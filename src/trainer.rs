//! Epoch loop around `Qgcn::train_step`.
//!
//! Each epoch shuffles the observed interactions, draws one negative per
//! interaction, and walks the result in batches of `train_batch_size`.
//! Training stops after `epochs` epochs, or earlier once the mean epoch loss
//! has gone `early_stop_num` epochs without improving.

use std::fmt;

use log::{debug, info};
use rand::seq::SliceRandom;

use crate::dataset::{InteractionBatch, InteractionSet, NegativeSampler};
use crate::error::{QgcnError, QgcnResult};
use crate::model::Qgcn;

#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub loss: f64,
    pub ranking_loss: f64,
    pub reg_loss: f64,
    pub batches: usize,
    pub samples: usize,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch {:>4}: loss {:.6} (ranking {:.6}, reg {:.6}) over {} samples",
            self.epoch, self.loss, self.ranking_loss, self.reg_loss, self.samples
        )
    }
}

#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochReport>,
    pub best_epoch: usize,
    pub best_loss: f64,
    pub stopped_early: bool,
}

/// Tracks the best loss seen and how long it has stood.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    best_epoch: usize,
    stale: usize,
}

impl EarlyStopping {
    /// `patience == 0` disables stopping.
    pub fn new(patience: usize) -> Self {
        Self { patience, best_loss: f64::INFINITY, best_epoch: 0, stale: 0 }
    }

    /// Record an epoch's loss; true when training should stop.
    pub fn update(&mut self, epoch: usize, loss: f64) -> bool {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.best_epoch = epoch;
            self.stale = 0;
        } else {
            self.stale += 1;
            debug!("No improvement for {} epochs", self.stale);
        }
        self.patience > 0 && self.stale >= self.patience
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

pub struct Trainer {
    sampler: NegativeSampler,
}

impl Trainer {
    pub fn new(seed: u64) -> Self {
        Self { sampler: NegativeSampler::new(seed) }
    }

    /// Seeded from the model's configured seed.
    pub fn for_model(model: &Qgcn) -> Self {
        Self::new(model.params().seed)
    }

    /// One pass over `interactions`.
    pub fn train_epoch(
        &mut self,
        model: &mut Qgcn,
        interactions: &InteractionSet,
        epoch: usize,
    ) -> QgcnResult<EpochReport> {
        if interactions.user_count() != model.n_users() || interactions.item_count() != model.n_items() {
            return Err(QgcnError::invalid(
                "interactions",
                format!("{}x{}", interactions.user_count(), interactions.item_count()),
                &format!("must match the model's {}x{} graph", model.n_users(), model.n_items()),
            ));
        }

        let mut pairs = interactions.pairs().to_vec();
        pairs.shuffle(self.sampler.rng_mut());
        let (users, pos, neg) = self.sampler.sample_triples(interactions, &pairs);
        if users.is_empty() {
            return Err(QgcnError::EmptyBatch);
        }

        let batch_size = model.params().train_batch_size;
        let mut weighted = (0.0f64, 0.0f64, 0.0f64);
        let mut batches = 0usize;
        for start in (0..users.len()).step_by(batch_size) {
            let end = (start + batch_size).min(users.len());
            let batch = InteractionBatch::triples(
                model.params(),
                users[start..end].to_vec(),
                pos[start..end].to_vec(),
                neg[start..end].to_vec(),
            );
            let loss = model.train_step(&batch)?;
            let w = (end - start) as f64;
            weighted.0 += loss.total * w;
            weighted.1 += loss.ranking * w;
            weighted.2 += loss.reg * w;
            batches += 1;
        }

        let n = users.len() as f64;
        let report = EpochReport {
            epoch,
            loss: weighted.0 / n,
            ranking_loss: weighted.1 / n,
            reg_loss: weighted.2 / n,
            batches,
            samples: users.len(),
        };
        info!("{}", report);
        Ok(report)
    }

    /// Run up to `epochs` epochs with early stopping on the training loss.
    pub fn fit(&mut self, model: &mut Qgcn, interactions: &InteractionSet) -> QgcnResult<TrainingSummary> {
        let epochs = model.params().epochs;
        let patience = model.params().early_stop_num;
        info!("Training for up to {} epochs (patience {})", epochs, patience);

        let mut reports = Vec::with_capacity(epochs);
        let mut stopping = EarlyStopping::new(patience);
        let mut stopped_early = false;

        for epoch in 0..epochs {
            let report = self.train_epoch(model, interactions, epoch)?;
            let stop = stopping.update(epoch, report.loss);
            reports.push(report);
            if stop {
                info!("Early stop at epoch {}, best epoch {}", epoch, stopping.best_epoch());
                stopped_early = true;
                break;
            }
        }

        Ok(TrainingSummary {
            epochs: reports,
            best_epoch: stopping.best_epoch(),
            best_loss: stopping.best_loss(),
            stopped_early,
        })
    }
}
