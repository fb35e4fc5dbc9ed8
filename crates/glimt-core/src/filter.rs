//! Post-processing filters.
//!
//! A filter is a full-target shader pass reading one render texture and
//! writing another. Like shaders, filters expose a capability interface so
//! the texturizer can skip passes that currently have no effect.
//!
//! Filter configuration is validated synchronously at assignment time: a
//! misconfigured filter must surface before any frame is drawn, not fail at
//! render time.

use std::rc::Rc;

use anyhow::{Result, bail};

use crate::shader::ProgramId;

/// Capability interface for post-processing passes.
pub trait Filter: std::fmt::Debug {
    /// Program the backend should run for this pass.
    fn program(&self) -> ProgramId;

    /// True when the filter currently has no effect and its pass may be
    /// skipped entirely (the source is used as the result).
    fn use_default(&self) -> bool {
        false
    }

    /// Uniform values forwarded to the backend program.
    fn params(&self) -> [f32; 4] {
        [0.0; 4]
    }
}

/// Desaturation filter; `amount` 0 is a no-op, 1 is full grayscale.
#[derive(Debug)]
pub struct GrayscaleFilter {
    amount: f32,
}

impl GrayscaleFilter {
    pub const PROGRAM: ProgramId = ProgramId(1);

    pub fn new(amount: f32) -> Self {
        Self {
            amount: amount.clamp(0.0, 1.0),
        }
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount.clamp(0.0, 1.0);
    }
}

impl Filter for GrayscaleFilter {
    fn program(&self) -> ProgramId {
        Self::PROGRAM
    }

    fn use_default(&self) -> bool {
        self.amount == 0.0
    }

    fn params(&self) -> [f32; 4] {
        [self.amount, 0.0, 0.0, 0.0]
    }
}

/// Color inversion filter; `amount` 0 is a no-op, 1 is full inversion.
#[derive(Debug)]
pub struct InverseFilter {
    amount: f32,
}

impl InverseFilter {
    pub const PROGRAM: ProgramId = ProgramId(2);

    pub fn new(amount: f32) -> Self {
        Self {
            amount: amount.clamp(0.0, 1.0),
        }
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }
}

impl Filter for InverseFilter {
    fn program(&self) -> ProgramId {
        Self::PROGRAM
    }

    fn use_default(&self) -> bool {
        self.amount == 0.0
    }

    fn params(&self) -> [f32; 4] {
        [self.amount, 0.0, 0.0, 0.0]
    }
}

/// Built-in filter kinds constructible from configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FilterKind {
    Grayscale,
    Inverse,
}

/// Declarative filter description, e.g. deserialized from app settings.
///
/// `kind` is optional on purpose: settings objects commonly arrive with the
/// type missing, and that mistake must be reported here rather than when
/// the filter pass first runs.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    pub kind: Option<FilterKind>,
    pub amount: f32,
}

impl FilterConfig {
    /// Builds a filter instance, failing on incomplete configuration.
    pub fn build(&self) -> Result<Rc<dyn Filter>> {
        let Some(kind) = self.kind else {
            bail!("filter type must be specified");
        };

        Ok(match kind {
            FilterKind::Grayscale => Rc::new(GrayscaleFilter::new(self.amount)),
            FilterKind::Inverse => Rc::new(InverseFilter::new(self.amount)),
        })
    }
}
