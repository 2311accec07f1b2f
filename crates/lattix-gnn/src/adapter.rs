//! Per-operator adaptation of a raw [`GraphBatch`].
//!
//! | Capability | `edge_weight` | `edge_attr` |
//! |------------|---------------|-------------|
//! | scalar weight | used as given, else derived from `edge_attr` | never forwarded |
//! | edge features | dropped | passed through, `[E]` → `[E, 1]`; required |
//! | ignored | dropped | dropped with a one-time notice |
//!
//! `edge_v` is never forwarded; its first appearance is reported once.

use candle_core::{DType, Tensor};

use crate::batch::GraphBatch;
use crate::capability::{ConvKind, EdgeCapability};
use crate::config::{BackboneConfig, MissingEdgePolicy};
use crate::edge::edge_weight_from_attr;
use crate::error::{Error, Result};
use crate::notice::{Notice, Notices};

/// Exactly what the layer stack consumes for one batch.
#[derive(Debug, Clone)]
pub struct AdaptedInputs {
    pub x: Tensor,
    pub edge_index: Tensor,
    /// Set only for scalar-weight operators.
    pub edge_weight: Option<Tensor>,
    /// Set only for edge-feature operators, in the node feature dtype;
    /// `None` there means "use zeros".
    pub edge_attr: Option<Tensor>,
    /// Graph index per node, u32.
    pub batch: Tensor,
}

/// Apply the capability policy of `config.conv_type` to `data`.
///
/// # Errors
///
/// [`Error::Input`] when an edge-feature operator gets no `edge_attr` under
/// [`MissingEdgePolicy::Error`]. Edge weight derivation failures are not
/// errors: the weight is dropped and [`Notice::WeightDerivationFailed`] is
/// emitted.
pub fn prepare_inputs(
    data: &GraphBatch,
    config: &BackboneConfig,
    notices: &Notices,
) -> Result<AdaptedInputs> {
    let kind = config.conv_type;
    let x = data.x.clone();
    let device = x.device();

    if data.edge_v.is_some() {
        notices.emit(Notice::EdgeVectorIgnored, kind, "");
    }

    let mut edge_weight = None;
    let mut edge_attr = None;

    match kind.capability() {
        EdgeCapability::ScalarWeight => {
            edge_weight = match (&data.edge_weight, &data.edge_attr) {
                (Some(w), _) => Some(w.to_device(device)?.to_dtype(x.dtype())?),
                (None, Some(attr)) => derive_weight(attr, config, &x, notices)?,
                (None, None) => None,
            };
        }
        EdgeCapability::Ignored => {
            if data.edge_attr.is_some() {
                notices.emit(Notice::EdgeFeaturesIgnored, kind, "");
            }
        }
        EdgeCapability::EdgeFeatures => match &data.edge_attr {
            Some(attr) => {
                let attr = attr.to_device(device)?.to_dtype(x.dtype())?;
                edge_attr = Some(if attr.rank() == 1 {
                    attr.unsqueeze(1)?
                } else {
                    attr
                });
            }
            None => check_missing_policy(kind, config.missing_edge_policy)?,
        },
    }

    let batch = match &data.batch {
        Some(b) => b.to_device(device)?.to_dtype(DType::U32)?,
        None => Tensor::zeros(x.dim(0)?, DType::U32, device)?,
    };

    Ok(AdaptedInputs {
        edge_index: data.edge_index.to_device(device)?,
        x,
        edge_weight,
        edge_attr,
        batch,
    })
}

/// Normalizer with explicit fallback: a failed derivation means "no weight".
fn derive_weight(
    attr: &Tensor,
    config: &BackboneConfig,
    x: &Tensor,
    notices: &Notices,
) -> Result<Option<Tensor>> {
    match edge_weight_from_attr(attr, config.edge_weight_mode) {
        Ok(w) => Ok(Some(w.to_device(x.device())?.to_dtype(x.dtype())?)),
        Err(e) => {
            notices.emit(Notice::WeightDerivationFailed, config.conv_type, &e.to_string());
            Ok(None)
        }
    }
}

fn check_missing_policy(kind: ConvKind, policy: MissingEdgePolicy) -> Result<()> {
    match policy {
        MissingEdgePolicy::Zeros => Ok(()),
        MissingEdgePolicy::Error => Err(Error::Input(format!(
            "{kind} requires edge_attr; or set missing_edge_policy = \"zeros\""
        ))),
    }
}
