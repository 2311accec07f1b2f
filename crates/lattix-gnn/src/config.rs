//! Backbone configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use lattix_gnn::{BackboneConfig, ConvKind, OutputLevel};
//!
//! let config = BackboneConfig::new(ConvKind::Gcn, vec![64, 64])
//!     .with_out_dim(2)
//!     .with_dropout(0.1)
//!     .with_output(OutputLevel::Node);
//! ```
//!
//! From JSON (the deprecated `dims` key is still accepted):
//!
//! ```text
//! {"conv_type": "gine", "hidden_dims": [32, 32], "out_dim": 1,
//!  "missing_edge_policy": "zeros"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capability::ConvKind;
use crate::edge::EdgeWeightMode;
use crate::error::{Error, Result};

/// Output granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLevel {
    /// One vector per node, `[N, out_dim]`.
    Node,
    /// One vector per graph (mean over its nodes), `[B, out_dim]`.
    #[default]
    Graph,
}

/// What to do when an edge-feature operator gets a batch without `edge_attr`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingEdgePolicy {
    /// Reject the batch.
    #[default]
    Error,
    /// Substitute zero features of the inferred width (1 if never observed).
    Zeros,
}

impl fmt::Display for MissingEdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingEdgePolicy::Error => "error",
            MissingEdgePolicy::Zeros => "zeros",
        })
    }
}

impl FromStr for MissingEdgePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(MissingEdgePolicy::Error),
            "zeros" => Ok(MissingEdgePolicy::Zeros),
            other => Err(Error::InvalidConfig(format!(
                "unsupported missing edge policy: {other}"
            ))),
        }
    }
}

/// Backbone configuration. Immutable once handed to a backbone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct BackboneConfig {
    /// Operator used by every layer.
    pub conv_type: ConvKind,
    /// Hidden width per layer; one layer per entry.
    pub hidden_dims: Vec<usize>,
    /// Readout width (default: 1).
    pub out_dim: usize,
    /// Dropout after each layer, in `[0, 1)` (default: 0.3).
    pub dropout: f32,
    /// Node- or graph-level output (default: graph).
    pub output: OutputLevel,
    /// Edge feature → weight reduction for weight-aware operators (default: auto).
    pub edge_weight_mode: EdgeWeightMode,
    /// Behaviour of edge-feature operators on batches without `edge_attr`
    /// (default: error).
    pub missing_edge_policy: MissingEdgePolicy,
}

impl BackboneConfig {
    pub fn new(conv_type: ConvKind, hidden_dims: Vec<usize>) -> Self {
        Self {
            conv_type,
            hidden_dims,
            out_dim: 1,
            dropout: 0.3,
            output: OutputLevel::default(),
            edge_weight_mode: EdgeWeightMode::default(),
            missing_edge_policy: MissingEdgePolicy::default(),
        }
    }

    pub fn with_out_dim(mut self, out_dim: usize) -> Self {
        self.out_dim = out_dim;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_output(mut self, output: OutputLevel) -> Self {
        self.output = output;
        self
    }

    pub fn with_edge_weight_mode(mut self, mode: EdgeWeightMode) -> Self {
        self.edge_weight_mode = mode;
        self
    }

    pub fn with_missing_edge_policy(mut self, policy: MissingEdgePolicy) -> Self {
        self.missing_edge_policy = policy;
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Width of the concatenated layer outputs fed to the readout.
    pub fn concat_dim(&self) -> usize {
        self.hidden_dims.iter().sum()
    }

    /// Check the invariants the backbone relies on.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_dims.is_empty() {
            return Err(Error::InvalidConfig(
                "`hidden_dims` must not be empty (e.g. [64, 64])".into(),
            ));
        }
        if let Some(i) = self.hidden_dims.iter().position(|&d| d == 0) {
            return Err(Error::InvalidConfig(format!("hidden_dims[{i}] is zero")));
        }
        if self.out_dim == 0 {
            return Err(Error::InvalidConfig("`out_dim` must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "`dropout` must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}

/// Wire form of [`BackboneConfig`], before the legacy `dims` key is resolved.
#[derive(Deserialize)]
struct RawConfig {
    conv_type: String,
    hidden_dims: Option<Vec<usize>>,
    dims: Option<Vec<usize>>,
    #[serde(default = "default_out_dim")]
    out_dim: usize,
    #[serde(default = "default_dropout")]
    dropout: f32,
    #[serde(default)]
    output: OutputLevel,
    #[serde(default)]
    edge_weight_mode: EdgeWeightMode,
    #[serde(default)]
    missing_edge_policy: MissingEdgePolicy,
}

fn default_out_dim() -> usize {
    1
}

fn default_dropout() -> f32 {
    0.3
}

impl TryFrom<RawConfig> for BackboneConfig {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let hidden_dims = match (raw.hidden_dims, raw.dims) {
            (Some(hidden), _) => hidden,
            (None, Some(dims)) => {
                warn!("`dims` is deprecated, use `hidden_dims`; using the `dims` value");
                dims
            }
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "`hidden_dims` is required (e.g. [64, 64])".into(),
                ))
            }
        };

        Ok(Self {
            conv_type: raw.conv_type.parse()?,
            hidden_dims,
            out_dim: raw.out_dim,
            dropout: raw.dropout,
            output: raw.output,
            edge_weight_mode: raw.edge_weight_mode,
            missing_edge_policy: raw.missing_edge_policy,
        })
    }
}
