//! Lazily built GNN backbone.
//!
//! ```text
//! GraphBatch ──ensure_built──▶ LayerStack (first call only)
//!     │
//!     └──prepare_inputs──▶ conv_0 → ReLU → dropout ─┐
//!                          conv_1 → ReLU → dropout ─┤ concat [N, Σ hidden]
//!                          ...                      ─┘
//!                                    │
//!                 node level: readout │ graph level: mean pool → readout
//! ```
//!
//! Input and edge widths are not part of the configuration; they are read
//! off the first batch. The build happens once per backbone, under a write
//! lock, and every later call reuses the same layers.

use std::sync::Arc;

use candle_core::{Module, Tensor};
use candle_nn::{linear, Dropout, Linear, VarBuilder, VarMap};
use parking_lot::RwLock;
use tracing::debug;

use crate::adapter::{prepare_inputs, AdaptedInputs};
use crate::batch::GraphBatch;
use crate::capability::EdgeCapability;
use crate::config::{BackboneConfig, MissingEdgePolicy, OutputLevel};
use crate::conv::{ConvLayer, EdgeInput};
use crate::error::{Error, Result};
use crate::notice::Notices;
use crate::pool::global_mean_pool;

/// Layers and readout, fixed after the first batch.
pub struct LayerStack {
    convs: Vec<ConvLayer>,
    dropout: Dropout,
    readout: Linear,
    input_dim: usize,
    edge_dim: Option<usize>,
    output: OutputLevel,
}

impl LayerStack {
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Edge feature width; `Some` only for edge-feature operators.
    pub fn edge_dim(&self) -> Option<usize> {
        self.edge_dim
    }

    pub fn layers(&self) -> &[ConvLayer] {
        &self.convs
    }

    /// Run the stack on adapted inputs.
    pub fn forward(&self, inputs: &AdaptedInputs, train: bool) -> Result<Tensor> {
        let x = &inputs.x;

        // Edge-feature operator without edge_attr (zeros policy): zero placeholder
        let edge_attr = match (&inputs.edge_attr, self.edge_dim) {
            (Some(attr), _) => Some(attr.clone()),
            (None, Some(edge_dim)) => {
                let num_edges = inputs.edge_index.dim(1)?;
                Some(Tensor::zeros((num_edges, edge_dim), x.dtype(), x.device())?)
            }
            (None, None) => None,
        };

        let mut outs = Vec::with_capacity(self.convs.len());
        let mut h = x.clone();
        for conv in &self.convs {
            let edge = match conv.capability() {
                EdgeCapability::ScalarWeight => EdgeInput::Weight(inputs.edge_weight.as_ref()),
                EdgeCapability::EdgeFeatures => match &edge_attr {
                    Some(attr) => EdgeInput::Features(attr),
                    None => {
                        return Err(Error::Input(format!(
                            "{} layer has no edge features to consume",
                            conv.kind()
                        )))
                    }
                },
                EdgeCapability::Ignored => EdgeInput::None,
            };
            h = conv.forward(&h, &inputs.edge_index, edge)?.relu()?;
            h = self.dropout.forward(&h, train)?;
            outs.push(h.clone());
        }

        // Node dimension unchanged: [N, Σ hidden]
        let h_cat = Tensor::cat(&outs, 1)?;

        let out = match self.output {
            OutputLevel::Node => self.readout.forward(&h_cat)?,
            OutputLevel::Graph => {
                let pooled = global_mean_pool(&h_cat, &inputs.batch)?;
                self.readout.forward(&pooled)?
            }
        };
        Ok(out)
    }
}

enum BuildState {
    Unbuilt,
    Built(Arc<LayerStack>),
}

/// Configurable GNN backbone (GCN / GAT / GATv2 / SAGE / GIN / GINE).
///
/// # Example
///
/// ```rust,ignore
/// use lattix_gnn::{BackboneConfig, ConvKind, GnnBackbone, GraphBatch, OutputLevel};
///
/// let backbone = GnnBackbone::new(
///     BackboneConfig::new(ConvKind::Gcn, vec![64, 64])
///         .with_out_dim(2)
///         .with_output(OutputLevel::Node),
/// )?;
/// let batch = GraphBatch::new(x, edge_index).with_edge_attr(edge_attr);
/// let logits = backbone.forward(&batch)?; // (N, 2)
/// ```
///
/// The backbone is `Send + Sync`; share it behind an `Arc` to serve
/// concurrent requests.
pub struct GnnBackbone {
    config: BackboneConfig,
    varmap: VarMap,
    state: RwLock<BuildState>,
    notices: Notices,
}

impl GnnBackbone {
    /// Validate `config` and create an unbuilt backbone with fresh parameters.
    pub fn new(config: BackboneConfig) -> Result<Self> {
        Self::with_varmap(config, VarMap::new())
    }

    /// Like [`GnnBackbone::new`], storing parameters in `varmap`.
    ///
    /// Variables already present under the same names (`convs.{i}.*`,
    /// `readout.*`) are reused when the layers are built.
    pub fn with_varmap(config: BackboneConfig, varmap: VarMap) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            varmap,
            state: RwLock::new(BuildState::Unbuilt),
            notices: Notices::new(),
        })
    }

    pub fn config(&self) -> &BackboneConfig {
        &self.config
    }

    /// Trainable parameters (empty until the first forward call).
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn is_built(&self) -> bool {
        matches!(*self.state.read(), BuildState::Built(_))
    }

    /// The built stack, if any.
    pub fn stack(&self) -> Option<Arc<LayerStack>> {
        match &*self.state.read() {
            BuildState::Built(stack) => Some(Arc::clone(stack)),
            BuildState::Unbuilt => None,
        }
    }

    /// Node feature width inferred from the first batch.
    pub fn input_dim(&self) -> Option<usize> {
        self.stack().map(|s| s.input_dim())
    }

    /// Edge feature width inferred from the first batch (GINE only).
    pub fn edge_dim(&self) -> Option<usize> {
        self.stack().and_then(|s| s.edge_dim())
    }

    /// `(in, out)` widths per layer, once built.
    pub fn layer_dims(&self) -> Option<Vec<(usize, usize)>> {
        self.stack()
            .map(|s| s.layers().iter().map(|l| (l.in_dim(), l.out_dim())).collect())
    }

    /// Build the layer stack from `data` unless it already exists.
    ///
    /// Concurrent callers on an unbuilt backbone serialize on the write lock;
    /// exactly one of them builds and the rest observe the finished stack.
    /// A failed build leaves the backbone unbuilt.
    pub fn ensure_built(&self, data: &GraphBatch) -> Result<Arc<LayerStack>> {
        if let BuildState::Built(stack) = &*self.state.read() {
            return Ok(Arc::clone(stack));
        }

        let mut state = self.state.write();
        if let BuildState::Built(stack) = &*state {
            return Ok(Arc::clone(stack));
        }
        let stack = Arc::new(self.build(data)?);
        *state = BuildState::Built(Arc::clone(&stack));
        Ok(stack)
    }

    fn build(&self, data: &GraphBatch) -> Result<LayerStack> {
        let kind = self.config.conv_type;
        let (_, input_dim) = data.x.dims2()?;

        let policy = self.config.missing_edge_policy;
        let edge_dim = match kind.capability() {
            EdgeCapability::EdgeFeatures => Some(match (&data.edge_attr, policy) {
                (Some(attr), _) if attr.rank() == 2 => attr.dim(1)?,
                (Some(_), _) => 1,
                // Placeholder width for zero-filled edge features
                (None, MissingEdgePolicy::Zeros) => 1,
                (None, MissingEdgePolicy::Error) => {
                    return Err(Error::Build(format!(
                        "cannot infer edge_dim for {kind}: batch has no edge_attr"
                    )))
                }
            }),
            EdgeCapability::ScalarWeight | EdgeCapability::Ignored => None,
        };

        let vb = VarBuilder::from_varmap(&self.varmap, data.x.dtype(), data.x.device());

        let mut convs = Vec::with_capacity(self.config.hidden_dims.len());
        let mut prev = input_dim;
        for (i, &d) in self.config.hidden_dims.iter().enumerate() {
            convs.push(ConvLayer::new(kind, prev, d, edge_dim, vb.pp(format!("convs.{i}")))?);
            prev = d;
        }

        // Readout: concat of every layer output -> out_dim
        let readout = linear(self.config.concat_dim(), self.config.out_dim, vb.pp("readout"))?;

        debug!(
            conv = %kind,
            input_dim,
            edge_dim = ?edge_dim,
            hidden_dims = ?self.config.hidden_dims,
            out_dim = self.config.out_dim,
            "built GNN backbone"
        );

        Ok(LayerStack {
            convs,
            dropout: Dropout::new(self.config.dropout),
            readout,
            input_dim,
            edge_dim,
            output: self.config.output,
        })
    }

    /// Apply this backbone's edge policy to `data` without running layers.
    pub fn prepare_inputs(&self, data: &GraphBatch) -> Result<AdaptedInputs> {
        prepare_inputs(data, &self.config, &self.notices)
    }

    /// Inference forward pass (dropout disabled).
    pub fn forward(&self, data: &GraphBatch) -> Result<Tensor> {
        self.forward_t(data, false)
    }

    /// Forward pass; `train` enables dropout.
    ///
    /// Returns (N x out_dim) for node-level output, (B x out_dim) for
    /// graph-level output.
    pub fn forward_t(&self, data: &GraphBatch, train: bool) -> Result<Tensor> {
        let stack = self.ensure_built(data)?;
        let inputs = self.prepare_inputs(data)?;
        stack.forward(&inputs, train)
    }
}
