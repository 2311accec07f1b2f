//! Configurable GNN backbone on `candle` tensors.
//!
//! A backbone stacks one kind of message-passing layer, concatenates every
//! layer's output (jumping-knowledge style) and projects through a linear
//! readout, either per node or per graph:
//!
//! ```text
//! x ─▶ conv_0 ─▶ conv_1 ─▶ ... ─▶ conv_{L-1}
//!        │         │                  │
//!        └─────────┴──── concat ──────┘ ─▶ [mean pool per graph] ─▶ readout
//! ```
//!
//! ## What the backbone decides for you
//!
//! - **Shapes.** Input width (and edge feature width for GINE) are read off
//!   the first batch. Layers are built once and never rebuilt.
//! - **Edge information.** Operators differ in what they can use per edge:
//!
//!   | Operator | Uses |
//!   |----------|------|
//!   | GCN | scalar weight, derived from `edge_attr` when no `edge_weight` is given |
//!   | GAT, GATv2, GraphSAGE, GIN | nothing; `edge_attr` is dropped with a one-time warning |
//!   | GINE | `edge_attr` vectors, required (or zero-filled, by policy) |
//!
//! - **Readout.** Node level gives `[N, out_dim]`; graph level averages nodes
//!   per `batch` index and gives `[B, out_dim]`.
//!
//! ## Modules
//!
//! - [`conv`]: Edge-list message-passing layers (GCN, GAT, GATv2, SAGE, GIN, GINE)
//! - [`capability`]: Operator kinds and the edge information each accepts
//! - [`edge`]: Edge feature → edge weight normalization
//! - [`adapter`]: Per-operator preparation of a [`GraphBatch`]
//! - [`backbone`]: Lazy layer construction and the forward pass
//! - [`pool`]: Graph-level mean pooling
//! - [`config`]: [`BackboneConfig`] and its JSON form
//!
//! ## Example
//!
//! ```rust,ignore
//! use lattix_gnn::{BackboneConfig, ConvKind, GnnBackbone, GraphBatch, OutputLevel};
//! use candle_core::{Device, Tensor};
//!
//! let config = BackboneConfig::new(ConvKind::Gcn, vec![8, 8])
//!     .with_out_dim(2)
//!     .with_output(OutputLevel::Node);
//! let backbone = GnnBackbone::new(config)?;
//!
//! let x = Tensor::randn(0f32, 1., (5, 16), &Device::Cpu)?;
//! let edge_index = Tensor::new(&[[0u32, 1, 2, 3, 4, 0], [1u32, 2, 3, 4, 0, 2]], &Device::Cpu)?;
//! let edge_attr = Tensor::rand(0f32, 1., (6, 3), &Device::Cpu)?;
//!
//! let out = backbone.forward(&GraphBatch::new(x, edge_index).with_edge_attr(edge_attr))?;
//! assert_eq!(out.dims(), &[5, 2]);
//! ```

pub mod adapter;
pub mod backbone;
pub mod batch;
pub mod capability;
pub mod config;
pub mod conv;
pub mod edge;
pub mod error;
pub mod notice;
pub mod pool;

pub use adapter::AdaptedInputs;
pub use backbone::{GnnBackbone, LayerStack};
pub use batch::GraphBatch;
pub use capability::{ConvKind, EdgeCapability};
pub use config::{BackboneConfig, MissingEdgePolicy, OutputLevel};
pub use edge::{edge_weight_from_attr, EdgeWeightMode};
pub use error::{Error, Result};
pub use notice::{Notice, Notices};
