//! Log-once notices.
//!
//! Some batch conditions (edge features handed to an operator that cannot use
//! them, an `edge_v` field) repeat on every call. Each category is reported
//! the first time it is seen and never again for the same backbone.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::capability::ConvKind;

/// Category of one-time notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    /// `edge_attr` was supplied to an operator that accepts no edge information.
    EdgeFeaturesIgnored,
    /// `edge_attr` could not be turned into edge weights; binary adjacency used.
    WeightDerivationFailed,
    /// `edge_v` was supplied; no operator in this family reads it.
    EdgeVectorIgnored,
}

impl Notice {
    const COUNT: usize = 3;

    const fn slot(self) -> usize {
        match self {
            Notice::EdgeFeaturesIgnored => 0,
            Notice::WeightDerivationFailed => 1,
            Notice::EdgeVectorIgnored => 2,
        }
    }
}

/// Per-instance set of "already emitted" flags.
#[derive(Debug, Default)]
pub struct Notices {
    emitted: [AtomicBool; Notice::COUNT],
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to emit `notice`. True only for the first caller.
    pub fn claim(&self, notice: Notice) -> bool {
        !self.emitted[notice.slot()].swap(true, Ordering::AcqRel)
    }

    /// Whether `notice` has been emitted.
    pub fn emitted(&self, notice: Notice) -> bool {
        self.emitted[notice.slot()].load(Ordering::Acquire)
    }

    /// Emit `notice` through `tracing` if it has not been emitted yet.
    pub fn emit(&self, notice: Notice, kind: ConvKind, detail: &str) {
        if !self.claim(notice) {
            return;
        }
        match notice {
            Notice::EdgeFeaturesIgnored => {
                warn!(conv = %kind, "edge_attr provided but ignored by this operator");
            }
            Notice::WeightDerivationFailed => {
                warn!(
                    conv = %kind,
                    reason = detail,
                    "edge_attr -> edge_weight conversion failed, falling back to binary adjacency"
                );
            }
            Notice::EdgeVectorIgnored => {
                info!(conv = %kind, "edge_v detected but ignored by non-GVP backbones");
            }
        }
    }
}
