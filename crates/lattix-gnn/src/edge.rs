//! Edge feature → edge weight normalization.
//!
//! Weight-aware operators (GCN) take one non-negative scalar per edge, while
//! batches often carry wider edge feature vectors (distances, bond
//! descriptors, ...). [`edge_weight_from_attr`] collapses `[E, D]` features
//! into `[E]` weights without assuming what the columns mean.
//!
//! # Modes
//!
//! | Mode | Weight |
//! |------|--------|
//! | `auto` | `1 - minmax(mean(row))`, or `1` everywhere if all means are equal |
//! | `mean_inv` | `1 / (mean(row) + ε)` |
//! | `first_inv` | `1 / (row[0] + ε)` |
//!
//! `auto` treats smaller raw values as "closer" and therefore stronger. The
//! min-max range is taken over every edge in the call, so in a multi-graph
//! batch the weights depend on which graphs were batched together.

use std::fmt;
use std::str::FromStr;

use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Numerical floor used by every mode.
pub const EPS: f64 = 1e-8;

/// How vector edge features are reduced to a scalar weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeWeightMode {
    /// Min-max normalized row mean, inverted.
    #[default]
    Auto,
    /// Inverse of the row mean.
    MeanInv,
    /// Inverse of the first column.
    FirstInv,
}

impl EdgeWeightMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            EdgeWeightMode::Auto => "auto",
            EdgeWeightMode::MeanInv => "mean_inv",
            EdgeWeightMode::FirstInv => "first_inv",
        }
    }
}

impl fmt::Display for EdgeWeightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeWeightMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(EdgeWeightMode::Auto),
            "mean_inv" => Ok(EdgeWeightMode::MeanInv),
            "first_inv" => Ok(EdgeWeightMode::FirstInv),
            other => Err(Error::InvalidConfig(format!(
                "unsupported edge weight mode: {other}"
            ))),
        }
    }
}

/// Convert edge features (`[E]` or `[E, D]`) to edge weights (`[E]`).
///
/// One-dimensional input and `[E, 1]` input are used as-is regardless of
/// `mode`. The result is clamped at zero. Float input keeps its dtype;
/// integer input is computed in f32.
///
/// # Errors
///
/// [`Error::EdgeWeight`] for tensors that are not rank 1 or 2 or that have
/// zero columns. Callers are expected to recover by dropping the weight.
pub fn edge_weight_from_attr(edge_attr: &Tensor, mode: EdgeWeightMode) -> Result<Tensor> {
    let attr = if edge_attr.dtype().is_float() {
        edge_attr.clone()
    } else {
        edge_attr.to_dtype(DType::F32)?
    };

    let weight = match attr.rank() {
        1 => attr,
        2 => {
            let (num_edges, width) = attr.dims2()?;
            if width == 0 {
                return Err(Error::EdgeWeight("edge_attr has zero columns".into()));
            }
            if width == 1 {
                attr.squeeze(1)?
            } else if num_edges == 0 {
                Tensor::zeros(0, attr.dtype(), attr.device())?
            } else {
                reduce_rows(&attr, mode)?
            }
        }
        rank => {
            return Err(Error::EdgeWeight(format!(
                "expected edge_attr of rank 1 or 2, got rank {rank}"
            )))
        }
    };

    Ok(weight.relu()?)
}

fn reduce_rows(attr: &Tensor, mode: EdgeWeightMode) -> Result<Tensor> {
    let weight = match mode {
        EdgeWeightMode::FirstInv => {
            let col0 = attr.narrow(1, 0, 1)?.squeeze(1)?;
            (col0 + EPS)?.recip()?
        }
        EdgeWeightMode::MeanInv => (attr.mean(1)? + EPS)?.recip()?,
        EdgeWeightMode::Auto => {
            let mean = attr.mean(1)?;
            let lo = mean.min(0)?.to_dtype(DType::F64)?.to_scalar::<f64>()?;
            let hi = mean.max(0)?.to_dtype(DType::F64)?.to_scalar::<f64>()?;
            if hi - lo > EPS {
                // 1 - (m - lo) / (hi - lo + eps)
                let scale = 1.0 / (hi - lo + EPS);
                mean.affine(1.0, -lo)?.affine(-scale, 1.0)?
            } else {
                mean.ones_like()?
            }
        }
    };
    Ok(weight)
}
