//! Per-frame sequencing: evidence → update → schedule → extract.
//!
//! Frame acquisition and rendering belong to the caller. [`FrameSlot`] is the
//! hand-off point between the two: a frame that arrives while the previous
//! one is still waiting replaces it instead of queueing behind it.

use serde::Serialize;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::{FieldError, Result};
use crate::evidence::EvidenceGenerator;
use crate::field::{EdgeMap, FieldEstimator, Gains, UpdateStats};
use crate::lattice::Lattice;
use crate::scheduler::{GainScheduler, ScheduleReport};

#[derive(Clone, Debug, Serialize)]
pub struct FrameOutput {
    pub t: u64,
    pub edges: EdgeMap,
    pub update: UpdateStats,
    pub schedule: ScheduleReport,
}

/// One independent estimator instance (one camera, one stream).
pub struct EdgePipeline {
    config: PipelineConfig,
    generator: EvidenceGenerator,
    estimator: FieldEstimator,
    scheduler: GainScheduler,
    next_t: u64,
}

impl EdgePipeline {
    pub fn new(size: usize, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let ladder = config.ladder.build()?;
        let signature = config.evidence.signature();
        let generator = EvidenceGenerator::new(
            config.evidence.strategy,
            &ladder,
            signature,
            config.evidence.orientation,
            config.evidence.sigma0,
        )?;
        let e = &config.estimator;
        let estimator = FieldEstimator::new(size, ladder, e.scale_weight_exponent)?;
        let scheduler = GainScheduler::new(
            config.scheduler.clone(),
            Gains::new(e.spatial_coupling, e.scale_coupling, e.data_fidelity),
            signature,
        );
        debug!(
            size,
            scales = estimator.ladder().len(),
            strategy = ?generator.strategy(),
            "pipeline ready"
        );
        Ok(Self {
            config,
            generator,
            estimator,
            scheduler,
            next_t: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn estimator(&self) -> &FieldEstimator {
        &self.estimator
    }

    pub fn scheduler(&self) -> &GainScheduler {
        &self.scheduler
    }

    pub fn frames_processed(&self) -> u64 {
        self.next_t
    }

    /// Run one frame. On error nothing advances and φ is untouched.
    pub fn process(&mut self, lattice: &Lattice) -> Result<FrameOutput> {
        if lattice.size() != self.estimator.size() {
            return Err(FieldError::SizeMismatch {
                expected: self.estimator.size(),
                actual: lattice.size(),
            });
        }
        let t = self.next_t;
        let evidence = self.generator.generate(lattice);
        let update = self.estimator.update(
            t,
            &evidence,
            &self.scheduler.gains(),
            self.config.estimator.learning_rate,
        )?;
        let schedule = self.scheduler.schedule(&self.estimator, &evidence);
        let edges = self
            .estimator
            .extract_edges(t, self.config.estimator.extract_threshold)?;
        self.next_t += 1;
        Ok(FrameOutput {
            t,
            edges,
            update,
            schedule,
        })
    }

    /// Forget the field and the gain history; frame numbering restarts at 0.
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.scheduler.reset();
        self.next_t = 0;
    }
}

/// Single-slot, latest-wins frame mailbox.
#[derive(Debug)]
pub struct FrameSlot<T> {
    pending: Option<T>,
    dropped: u64,
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self {
            pending: None,
            dropped: 0,
        }
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, returning the stale frame it displaced.
    pub fn offer(&mut self, frame: T) -> Option<T> {
        let stale = self.pending.replace(frame);
        if stale.is_some() {
            self.dropped += 1;
        }
        stale
    }

    pub fn take(&mut self) -> Option<T> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Frames replaced before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
