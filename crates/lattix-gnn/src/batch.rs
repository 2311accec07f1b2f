//! Graph batch consumed by the backbone.

use candle_core::{Result, Tensor};

/// One or more graphs packed together.
///
/// Fields follow the usual edge-list layout:
///
/// ```text
/// x           [N, F]      node features
/// edge_index  [2, E]      row 0 = source, row 1 = target (u32 or i64)
/// edge_attr   [E] | [E,D] optional edge features
/// edge_weight [E]         optional precomputed scalar weight
/// edge_v      [E, ...]    optional vector field, never consumed here
/// batch       [N]         optional graph index per node (default: all 0)
/// ```
#[derive(Debug, Clone)]
pub struct GraphBatch {
    pub x: Tensor,
    pub edge_index: Tensor,
    pub edge_attr: Option<Tensor>,
    pub edge_weight: Option<Tensor>,
    pub edge_v: Option<Tensor>,
    pub batch: Option<Tensor>,
}

impl GraphBatch {
    /// Batch with node features and connectivity only.
    pub fn new(x: Tensor, edge_index: Tensor) -> Self {
        Self {
            x,
            edge_index,
            edge_attr: None,
            edge_weight: None,
            edge_v: None,
            batch: None,
        }
    }

    pub fn with_edge_attr(mut self, edge_attr: Tensor) -> Self {
        self.edge_attr = Some(edge_attr);
        self
    }

    pub fn with_edge_weight(mut self, edge_weight: Tensor) -> Self {
        self.edge_weight = Some(edge_weight);
        self
    }

    pub fn with_edge_v(mut self, edge_v: Tensor) -> Self {
        self.edge_v = Some(edge_v);
        self
    }

    pub fn with_batch(mut self, batch: Tensor) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Number of nodes (N).
    pub fn num_nodes(&self) -> Result<usize> {
        self.x.dim(0)
    }

    /// Number of edges (E).
    pub fn num_edges(&self) -> Result<usize> {
        self.edge_index.dim(1)
    }
}
