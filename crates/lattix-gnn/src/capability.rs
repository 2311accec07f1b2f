//! Operator kinds and the per-edge information each one accepts.
//!
//! | Kind | Edge information |
//! |------|------------------|
//! | `gcn` | optional scalar weight per edge |
//! | `gat`, `gatv2`, `sage`, `gin` | none |
//! | `gine` | required edge feature vector (width fixed at build time) |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Convolution operator used for every layer of a backbone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvKind {
    /// Graph Convolutional Network (Kipf & Welling, 2017).
    Gcn,
    /// Graph Attention Network (Velickovic et al., 2018).
    Gat,
    /// GATv2, dynamic attention (Brody et al., 2022).
    #[serde(rename = "gatv2")]
    GatV2,
    /// GraphSAGE with mean aggregation (Hamilton et al., 2017).
    Sage,
    /// Graph Isomorphism Network (Xu et al., 2019).
    Gin,
    /// GIN with edge features (Hu et al., 2020).
    Gine,
}

/// Form of per-edge information an operator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeCapability {
    /// Optional non-negative scalar per edge; derivable from edge features.
    ScalarWeight,
    /// Per-edge feature vector, required, width fixed when layers are built.
    EdgeFeatures,
    /// No per-edge information.
    Ignored,
}

impl ConvKind {
    /// All supported kinds.
    pub const ALL: [ConvKind; 6] = [
        ConvKind::Gcn,
        ConvKind::Gat,
        ConvKind::GatV2,
        ConvKind::Sage,
        ConvKind::Gin,
        ConvKind::Gine,
    ];

    /// Edge information this operator accepts.
    pub const fn capability(self) -> EdgeCapability {
        match self {
            ConvKind::Gcn => EdgeCapability::ScalarWeight,
            ConvKind::Gat | ConvKind::GatV2 | ConvKind::Sage | ConvKind::Gin => {
                EdgeCapability::Ignored
            }
            ConvKind::Gine => EdgeCapability::EdgeFeatures,
        }
    }

    /// Lowercase name, as accepted by [`FromStr`].
    pub const fn as_str(self) -> &'static str {
        match self {
            ConvKind::Gcn => "gcn",
            ConvKind::Gat => "gat",
            ConvKind::GatV2 => "gatv2",
            ConvKind::Sage => "sage",
            ConvKind::Gin => "gin",
            ConvKind::Gine => "gine",
        }
    }
}

impl fmt::Display for ConvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConvKind {
    type Err = Error;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ConvKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| Error::InvalidConfig(format!("unsupported conv_type: {s}")))
    }
}
