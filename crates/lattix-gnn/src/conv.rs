//! Message-passing convolutional layers over edge lists.
//!
//! Implements the operators a backbone can stack:
//! - [`GCNConv`]: Graph Convolutional Network (Kipf & Welling, 2017)
//! - [`GATConv`]: Graph Attention Network (Velickovic et al., 2018)
//! - [`GATv2Conv`]: dynamic attention (Brody et al., 2022)
//! - [`SAGEConv`]: GraphSAGE, mean aggregator (Hamilton et al., 2017)
//! - [`GINConv`]: Graph Isomorphism Network (Xu et al., 2019)
//! - [`GINEConv`]: GIN with edge features (Hu et al., 2020)
//!
//! # Message Passing Framework
//!
//! All layers follow the message-passing paradigm:
//!
//! 1. **Message**: Compute messages from neighbors
//! 2. **Aggregate**: Combine messages (sum, mean, attention)
//! 3. **Update**: Transform aggregated messages
//!
//! ```text
//! h_i^{(l+1)} = UPDATE(h_i^{(l)}, AGGREGATE({MESSAGE(h_j^{(l)}, e_ji) : j in N(i)}))
//! ```
//!
//! Graphs are given as `edge_index` (2 x E), row 0 = source `j`, row 1 =
//! target `i`. Messages flow source → target. Index dtype may be u32 or i64.
//!
//! [`ConvLayer`] wraps the operators behind one constructor and one forward
//! signature, tagged with the [`EdgeCapability`] of its kind.

use candle_core::{DType, Module, Result, Tensor};
use candle_nn::{linear, linear_no_bias, Init, Linear, VarBuilder};

use crate::capability::{ConvKind, EdgeCapability};

/// LeakyReLU slope used by both attention layers.
const ATTENTION_SLOPE: f64 = 0.2;

// -----------------------------------------------------------------------------
// Scatter helpers
// -----------------------------------------------------------------------------

/// Source and target rows of `edge_index`, as u32 index vectors.
fn endpoints(edge_index: &Tensor) -> Result<(Tensor, Tensor)> {
    let edge_index = edge_index.to_dtype(DType::U32)?;
    let src = edge_index.get(0)?.contiguous()?;
    let dst = edge_index.get(1)?.contiguous()?;
    Ok((src, dst))
}

/// Append one self-loop per node to `(src, dst)`.
fn add_self_loops(src: &Tensor, dst: &Tensor, num_nodes: usize) -> Result<(Tensor, Tensor)> {
    let loops = Tensor::arange(0u32, num_nodes as u32, src.device())?;
    Ok((
        Tensor::cat(&[src, &loops], 0)?,
        Tensor::cat(&[dst, &loops], 0)?,
    ))
}

/// Sum rows of `src` into `dim_size` buckets selected by `index`.
///
/// `src` is (E, ...) and `index` is (E,); result is (dim_size, ...).
pub(crate) fn scatter_sum(src: &Tensor, index: &Tensor, dim_size: usize) -> Result<Tensor> {
    let mut shape = src.dims().to_vec();
    shape[0] = dim_size;
    Tensor::zeros(shape, src.dtype(), src.device())?.index_add(index, &src.contiguous()?, 0)
}

/// Per-edge copy of the maximum score among edges sharing its target.
///
/// Reduced on the host; candle has no scatter-max.
fn segment_max(scores: &Tensor, index: &Tensor, dim_size: usize) -> Result<Tensor> {
    let values = scores.to_dtype(DType::F64)?.to_vec1::<f64>()?;
    let ids = index.to_vec1::<u32>()?;

    let mut max = vec![f64::NEG_INFINITY; dim_size];
    for (&i, &v) in ids.iter().zip(&values) {
        match max.get_mut(i as usize) {
            Some(m) => *m = m.max(v),
            None => candle_core::bail!("edge target {i} out of range for {dim_size} nodes"),
        }
    }
    Tensor::from_vec(max, dim_size, scores.device())?
        .to_dtype(scores.dtype())?
        .index_select(index, 0)
}

/// Softmax of per-edge scores over the edges sharing a target.
///
/// Each score is shifted by its own target's maximum, so every target with
/// at least one edge has a denominator of at least 1.
fn segment_softmax(scores: &Tensor, index: &Tensor, dim_size: usize) -> Result<Tensor> {
    if scores.dim(0)? == 0 {
        return Ok(scores.clone());
    }
    let exp = scores.sub(&segment_max(scores, index, dim_size)?)?.exp()?;
    let denom = scatter_sum(&exp, index, dim_size)?.index_select(index, 0)?;
    exp.div(&denom)
}

fn leaky_relu(x: &Tensor, negative_slope: f64) -> Result<Tensor> {
    x.maximum(&(x * negative_slope)?)
}

// -----------------------------------------------------------------------------
// Operators
// -----------------------------------------------------------------------------

/// Graph Convolutional Network layer.
///
/// Implements: H' = D^{-1/2} (A + I) D^{-1/2} H W + b
///
/// Where:
/// - A is the (optionally weighted) adjacency, self-loops get weight 1
/// - D is the weighted in-degree matrix of A + I
/// - W is the learnable weight matrix, b the bias added after propagation
///
/// Edge weights must be non-negative, which keeps every degree >= 1.
///
/// # Reference
///
/// Kipf & Welling, "Semi-Supervised Classification with Graph Convolutional
/// Networks", ICLR 2017.
pub struct GCNConv {
    linear: Linear,
    bias: Tensor,
}

impl GCNConv {
    /// Create a new GCN layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension
    /// - `vb`: Variable builder for parameter initialization
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let linear = linear_no_bias(in_features, out_features, vb.pp("lin"))?;
        let bias = vb.get_with_hints(out_features, "bias", Init::Const(0.))?;
        Ok(Self { linear, bias })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `edge_index`: Edge list (2 x E)
    /// - `edge_weight`: Optional per-edge weight (E); `None` means all ones
    ///
    /// # Returns
    /// - Node embeddings (N x out_features)
    pub fn forward(
        &self,
        x: &Tensor,
        edge_index: &Tensor,
        edge_weight: Option<&Tensor>,
    ) -> Result<Tensor> {
        let n = x.dim(0)?;
        let (dtype, device) = (x.dtype(), x.device());
        let (src, dst) = endpoints(edge_index)?;

        let weight = match edge_weight {
            Some(w) => w.flatten_all()?.to_dtype(dtype)?,
            None => Tensor::ones(src.dim(0)?, dtype, device)?,
        };
        let (src, dst) = add_self_loops(&src, &dst, n)?;
        let weight = Tensor::cat(&[&weight, &Tensor::ones(n, dtype, device)?], 0)?;

        // Symmetric normalization: w_ji / sqrt(deg_j * deg_i)
        let deg_inv_sqrt = scatter_sum(&weight, &dst, n)?.sqrt()?.recip()?;
        let norm = deg_inv_sqrt
            .index_select(&src, 0)?
            .mul(&weight)?
            .mul(&deg_inv_sqrt.index_select(&dst, 0)?)?;

        // Linear transform: X * W
        let h = self.linear.forward(x)?;
        // Neighborhood aggregation: A_hat * H
        let messages = h.index_select(&src, 0)?.broadcast_mul(&norm.unsqueeze(1)?)?;
        scatter_sum(&messages, &dst, n)?.broadcast_add(&self.bias)
    }
}

/// Graph Attention Network layer (single head).
///
/// Implements attention-weighted aggregation:
/// h_i' = sum_{j in N(i) ∪ {i}} alpha_{ij} W h_j + b
///
/// Where alpha_{ij} = softmax_j(LeakyReLU(a_src^T W h_j + a_dst^T W h_i))
///
/// # Reference
///
/// Velickovic et al., "Graph Attention Networks", ICLR 2018.
pub struct GATConv {
    linear: Linear,
    att_src: Tensor, // Attention vector for source nodes
    att_dst: Tensor, // Attention vector for destination nodes
    bias: Tensor,
    negative_slope: f64,
}

impl GATConv {
    /// Create a new GAT layer.
    ///
    /// # Arguments
    /// - `in_features`: Input feature dimension
    /// - `out_features`: Output feature dimension
    /// - `negative_slope`: LeakyReLU negative slope (typically 0.2)
    /// - `vb`: Variable builder
    pub fn new(
        in_features: usize,
        out_features: usize,
        negative_slope: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let linear = linear_no_bias(in_features, out_features, vb.pp("lin"))?;
        let att_src = vb.get(out_features, "att_src")?;
        let att_dst = vb.get(out_features, "att_dst")?;
        let bias = vb.get_with_hints(out_features, "bias", Init::Const(0.))?;

        Ok(Self {
            linear,
            att_src,
            att_dst,
            bias,
            negative_slope,
        })
    }

    /// Forward pass with attention.
    ///
    /// # Arguments
    /// - `x`: Node features (N x in_features)
    /// - `edge_index`: Edge list (2 x E)
    ///
    /// # Returns
    /// - Node embeddings (N x out_features)
    pub fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;
        let (src, dst) = endpoints(edge_index)?;
        let (src, dst) = add_self_loops(&src, &dst, n)?;

        let h = self.linear.forward(x)?;

        // alpha_src = (h * att_src).sum(-1) -> (N,)
        let alpha_src = h.broadcast_mul(&self.att_src)?.sum(1)?;
        let alpha_dst = h.broadcast_mul(&self.att_dst)?.sum(1)?;

        // For each edge (j -> i): e_ij = LeakyReLU(alpha_src[j] + alpha_dst[i])
        let scores = alpha_src
            .index_select(&src, 0)?
            .add(&alpha_dst.index_select(&dst, 0)?)?;
        let scores = leaky_relu(&scores, self.negative_slope)?;
        let alpha = segment_softmax(&scores, &dst, n)?;

        let messages = h.index_select(&src, 0)?.broadcast_mul(&alpha.unsqueeze(1)?)?;
        scatter_sum(&messages, &dst, n)?.broadcast_add(&self.bias)
    }
}

/// GATv2 layer (single head).
///
/// GAT ranks neighbors the same way for every query node ("static"
/// attention) because the nonlinearity is applied after the dot product.
/// GATv2 moves it inside:
///
/// ```text
/// e_ij = a^T LeakyReLU(W_l h_j + W_r h_i)
/// h_i' = sum_j softmax_j(e_ij) W_l h_j + b
/// ```
///
/// # Reference
///
/// Brody et al., "How Attentive are Graph Attention Networks?", ICLR 2022.
pub struct GATv2Conv {
    lin_l: Linear,
    lin_r: Linear,
    att: Tensor,
    bias: Tensor,
    negative_slope: f64,
}

impl GATv2Conv {
    /// Create a new GATv2 layer.
    pub fn new(
        in_features: usize,
        out_features: usize,
        negative_slope: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let lin_l = linear_no_bias(in_features, out_features, vb.pp("lin_l"))?;
        let lin_r = linear_no_bias(in_features, out_features, vb.pp("lin_r"))?;
        let att = vb.get(out_features, "att")?;
        let bias = vb.get_with_hints(out_features, "bias", Init::Const(0.))?;

        Ok(Self {
            lin_l,
            lin_r,
            att,
            bias,
            negative_slope,
        })
    }

    /// Forward pass. `x` is (N x in_features), `edge_index` is (2 x E).
    pub fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;
        let (src, dst) = endpoints(edge_index)?;
        let (src, dst) = add_self_loops(&src, &dst, n)?;

        let x_l = self.lin_l.forward(x)?;
        let x_r = self.lin_r.forward(x)?;

        let x_j = x_l.index_select(&src, 0)?;
        let z = x_j.add(&x_r.index_select(&dst, 0)?)?;
        let scores = leaky_relu(&z, self.negative_slope)?
            .broadcast_mul(&self.att)?
            .sum(1)?;
        let alpha = segment_softmax(&scores, &dst, n)?;

        let messages = x_j.broadcast_mul(&alpha.unsqueeze(1)?)?;
        scatter_sum(&messages, &dst, n)?.broadcast_add(&self.bias)
    }
}

/// GraphSAGE convolutional layer, mean aggregator.
///
/// h_i' = W_l * mean({h_j : j in N(i)}) + W_r * h_i
///
/// Nodes without incoming edges aggregate to zero and keep only the root
/// term.
///
/// # Reference
///
/// Hamilton et al., "Inductive Representation Learning on Large Graphs",
/// NeurIPS 2017.
pub struct SAGEConv {
    lin_neighbor: Linear,
    lin_self: Linear,
}

impl SAGEConv {
    /// Create a new GraphSAGE layer.
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let lin_neighbor = linear(in_features, out_features, vb.pp("lin_l"))?;
        let lin_self = linear_no_bias(in_features, out_features, vb.pp("lin_r"))?;

        Ok(Self {
            lin_neighbor,
            lin_self,
        })
    }

    /// Forward pass. `x` is (N x in_features), `edge_index` is (2 x E).
    pub fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;
        let (src, dst) = endpoints(edge_index)?;

        let summed = scatter_sum(&x.index_select(&src, 0)?, &dst, n)?;
        let counts = scatter_sum(&Tensor::ones(src.dim(0)?, x.dtype(), x.device())?, &dst, n)?
            .maximum(1.0)?;
        let mean = summed.broadcast_div(&counts.unsqueeze(1)?)?;

        let h_neighbor = self.lin_neighbor.forward(&mean)?;
        let h_self = self.lin_self.forward(x)?;
        h_neighbor.add(&h_self)
    }
}

/// Graph Isomorphism Network layer.
///
/// ```text
/// h_i' = MLP((1 + ε) · h_i + Σ_{j∈N(i)} h_j)
/// ```
///
/// Sum aggregation is injective over multisets, which is what gives GIN its
/// 1-WL expressiveness; mean or max would collapse neighborhoods such as
/// {1, 1, 2} and {1, 2, 2}. ε is fixed at 0 here. The MLP is
/// Linear(in, out) → ReLU → Linear(out, out).
///
/// # Reference
///
/// Xu et al., "How Powerful are Graph Neural Networks?", ICLR 2019.
pub struct GINConv {
    mlp: [Linear; 2],
    eps: f64,
}

impl GINConv {
    /// Create a new GIN layer.
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let mlp = [
            linear(in_features, out_features, vb.pp("mlp_0"))?,
            linear(out_features, out_features, vb.pp("mlp_1"))?,
        ];
        Ok(Self { mlp, eps: 0.0 })
    }

    /// Forward pass. `x` is (N x in_features), `edge_index` is (2 x E).
    pub fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;
        let (src, dst) = endpoints(edge_index)?;

        // Sum aggregation: Σ_{u∈N(v)} h_u
        let neighbor_sum = scatter_sum(&x.index_select(&src, 0)?, &dst, n)?;
        let combined = (x * (1.0 + self.eps))?.add(&neighbor_sum)?;

        mlp_forward(&self.mlp, &combined)
    }
}

/// GIN layer with edge features (GINE).
///
/// ```text
/// h_i' = MLP((1 + ε) · h_i + Σ_{j∈N(i)} ReLU(h_j + W_e e_ji))
/// ```
///
/// `W_e` projects edge features to the node width so they can be added to
/// the neighbor state. ε is learnable and starts at 0.
///
/// # Reference
///
/// Hu et al., "Strategies for Pre-training Graph Neural Networks", ICLR 2020.
pub struct GINEConv {
    mlp: [Linear; 2],
    lin_edge: Linear,
    eps: Tensor,
    edge_dim: usize,
}

impl GINEConv {
    /// Create a new GINE layer.
    ///
    /// # Arguments
    ///
    /// - `in_features`: Input node feature dimension
    /// - `out_features`: Output feature dimension
    /// - `edge_dim`: Edge feature dimension (D in `edge_attr` of shape E x D)
    /// - `vb`: Variable builder
    pub fn new(
        in_features: usize,
        out_features: usize,
        edge_dim: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mlp = [
            linear(in_features, out_features, vb.pp("mlp_0"))?,
            linear(out_features, out_features, vb.pp("mlp_1"))?,
        ];
        let lin_edge = linear(edge_dim, in_features, vb.pp("lin_edge"))?;
        let eps = vb.get_with_hints(1, "eps", Init::Const(0.))?;

        Ok(Self {
            mlp,
            lin_edge,
            eps,
            edge_dim,
        })
    }

    /// Edge feature width this layer was built for.
    pub fn edge_dim(&self) -> usize {
        self.edge_dim
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `x`: Node features (N x in_features)
    /// - `edge_index`: Edge list (2 x E)
    /// - `edge_attr`: Edge features (E x edge_dim)
    pub fn forward(&self, x: &Tensor, edge_index: &Tensor, edge_attr: &Tensor) -> Result<Tensor> {
        let n = x.dim(0)?;
        let (src, dst) = endpoints(edge_index)?;

        let edge_emb = self.lin_edge.forward(&edge_attr.to_dtype(x.dtype())?)?;
        let messages = x.index_select(&src, 0)?.add(&edge_emb)?.relu()?;
        let aggregated = scatter_sum(&messages, &dst, n)?;

        let scale = (&self.eps + 1.0)?;
        let combined = x.broadcast_mul(&scale)?.add(&aggregated)?;

        mlp_forward(&self.mlp, &combined)
    }
}

/// Linear → ReLU → Linear.
fn mlp_forward(mlp: &[Linear; 2], x: &Tensor) -> Result<Tensor> {
    let h = mlp[0].forward(x)?.relu()?;
    mlp[1].forward(&h)
}

// -----------------------------------------------------------------------------
// Uniform layer interface
// -----------------------------------------------------------------------------

/// Edge information handed to a layer.
#[derive(Debug, Clone, Copy)]
pub enum EdgeInput<'a> {
    /// Optional scalar weight per edge (E).
    Weight(Option<&'a Tensor>),
    /// Edge feature vectors (E x D).
    Features(&'a Tensor),
    /// No edge information.
    None,
}

impl EdgeInput<'_> {
    fn describe(&self) -> &'static str {
        match self {
            EdgeInput::Weight(_) => "edge weights",
            EdgeInput::Features(_) => "edge features",
            EdgeInput::None => "no edge information",
        }
    }
}

enum Operator {
    Gcn(GCNConv),
    Gat(GATConv),
    GatV2(GATv2Conv),
    Sage(SAGEConv),
    Gin(GINConv),
    Gine(GINEConv),
}

/// One convolution layer of any supported kind.
///
/// The capability tag is fixed at construction and tells the caller which
/// [`EdgeInput`] variant [`ConvLayer::forward`] expects.
pub struct ConvLayer {
    kind: ConvKind,
    capability: EdgeCapability,
    in_dim: usize,
    out_dim: usize,
    op: Operator,
}

impl ConvLayer {
    /// Build a layer of `kind` mapping `in_dim` → `out_dim` features.
    ///
    /// `edge_dim` is read only for [`ConvKind::Gine`], where it is required.
    pub fn new(
        kind: ConvKind,
        in_dim: usize,
        out_dim: usize,
        edge_dim: Option<usize>,
        vb: VarBuilder,
    ) -> crate::Result<Self> {
        let op = match kind {
            ConvKind::Gcn => Operator::Gcn(GCNConv::new(in_dim, out_dim, vb)?),
            ConvKind::Gat => Operator::Gat(GATConv::new(in_dim, out_dim, ATTENTION_SLOPE, vb)?),
            ConvKind::GatV2 => {
                Operator::GatV2(GATv2Conv::new(in_dim, out_dim, ATTENTION_SLOPE, vb)?)
            }
            ConvKind::Sage => Operator::Sage(SAGEConv::new(in_dim, out_dim, vb)?),
            ConvKind::Gin => Operator::Gin(GINConv::new(in_dim, out_dim, vb)?),
            ConvKind::Gine => {
                let edge_dim = edge_dim.ok_or_else(|| {
                    crate::Error::Build("GINE requires `edge_dim` at layer build time".into())
                })?;
                Operator::Gine(GINEConv::new(in_dim, out_dim, edge_dim, vb)?)
            }
        };

        Ok(Self {
            kind,
            capability: kind.capability(),
            in_dim,
            out_dim,
            op,
        })
    }

    pub fn kind(&self) -> ConvKind {
        self.kind
    }

    pub fn capability(&self) -> EdgeCapability {
        self.capability
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// Run the layer.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Input`] if `edge` does not match the layer's
    /// capability; tensor errors propagate unchanged.
    pub fn forward(
        &self,
        x: &Tensor,
        edge_index: &Tensor,
        edge: EdgeInput<'_>,
    ) -> crate::Result<Tensor> {
        let out = match (&self.op, edge) {
            (Operator::Gcn(conv), EdgeInput::Weight(w)) => conv.forward(x, edge_index, w)?,
            (Operator::Gine(conv), EdgeInput::Features(e)) => conv.forward(x, edge_index, e)?,
            (Operator::Gat(conv), EdgeInput::None) => conv.forward(x, edge_index)?,
            (Operator::GatV2(conv), EdgeInput::None) => conv.forward(x, edge_index)?,
            (Operator::Sage(conv), EdgeInput::None) => conv.forward(x, edge_index)?,
            (Operator::Gin(conv), EdgeInput::None) => conv.forward(x, edge_index)?,
            (_, edge) => {
                return Err(crate::Error::Input(format!(
                    "{} layer cannot take {}",
                    self.kind,
                    edge.describe()
                )))
            }
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use candle_core::Device;
    use candle_nn::VarMap;

    /// Variable builder over fixed 1 x 1 parameters.
    fn fixed(params: &[(&str, f32)]) -> VarBuilder<'static> {
        let device = Device::Cpu;
        let tensors: HashMap<String, Tensor> = params
            .iter()
            .map(|&(name, v)| {
                let shape: &[usize] = if name.ends_with("weight") { &[1, 1] } else { &[1] };
                let t = Tensor::new(&[v], &device).unwrap().reshape(shape.to_vec()).unwrap();
                (name.to_string(), t)
            })
            .collect();
        VarBuilder::from_tensors(tensors, DType::F32, &device)
    }

    fn assert_close(out: &Tensor, expected: &[f32], tol: f32) {
        let got = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(got.len(), expected.len());
        for (i, (g, e)) in got.iter().zip(expected).enumerate() {
            assert!((g - e).abs() <= tol, "row {i}: got {g}, expected {e}");
        }
    }

    fn ring(n: u32) -> Tensor {
        let src: Vec<u32> = (0..n).collect();
        let dst: Vec<u32> = (0..n).map(|i| (i + 1) % n).collect();
        let data = [src, dst].concat();
        Tensor::from_vec(data, (2, n as usize), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_scatter_sum() {
        let device = Device::Cpu;
        let src = Tensor::new(&[[1f32, 1.], [2., 2.], [3., 3.]], &device).unwrap();
        let index = Tensor::new(&[0u32, 2, 0], &device).unwrap();

        let out = scatter_sum(&src, &index, 3).unwrap();
        assert_eq!(
            out.to_vec2::<f32>().unwrap(),
            vec![vec![4., 4.], vec![0., 0.], vec![2., 2.]]
        );
    }

    #[test]
    fn test_segment_softmax_sums_to_one_per_target() {
        let device = Device::Cpu;
        let scores = Tensor::new(&[0.5f32, -1.0, 2.0, 0.0, 3.0], &device).unwrap();
        let index = Tensor::new(&[0u32, 0, 1, 1, 1], &device).unwrap();

        let alpha = segment_softmax(&scores, &index, 2).unwrap();
        let per_target = scatter_sum(&alpha, &index, 2).unwrap().to_vec1::<f32>().unwrap();
        for s in per_target {
            assert!((s - 1.0).abs() < 1e-5, "softmax mass {s}");
        }
    }

    #[test]
    fn test_segment_softmax_with_wide_score_spread() {
        let device = Device::Cpu;
        // Target 1's scores sit far below target 0's
        let scores = Tensor::new(&[2000f32, 3.0, 4.0], &device).unwrap();
        let index = Tensor::new(&[0u32, 1, 1], &device).unwrap();

        let alpha = segment_softmax(&scores, &index, 2).unwrap();
        let e = std::f32::consts::E;
        assert_close(&alpha, &[1.0, 1.0 / (1.0 + e), e / (1.0 + e)], 1e-5);
    }

    #[test]
    fn test_segment_max_rejects_out_of_range_target() {
        let device = Device::Cpu;
        let scores = Tensor::new(&[1f32, 2.0], &device).unwrap();
        let index = Tensor::new(&[0u32, 5], &device).unwrap();
        assert!(segment_max(&scores, &index, 2).is_err());
    }

    #[test]
    fn test_gcn_symmetric_normalization() {
        // Path 0 -> 1 -> 2; with self-loops the in-degrees are 1, 2, 2
        let gcn = GCNConv::new(1, 1, fixed(&[("lin.weight", 1.0), ("bias", 0.0)])).unwrap();
        let x = Tensor::new(&[[1f32], [2.], [4.]], &Device::Cpu).unwrap();
        let edge_index = Tensor::new(&[[0u32, 1], [1u32, 2]], &Device::Cpu).unwrap();

        let out = gcn.forward(&x, &edge_index, None).unwrap();
        // out_1 = x_0 / sqrt(1 * 2) + x_1 / 2, out_2 = x_1 / sqrt(2 * 2) + x_2 / 2
        assert_close(&out, &[1.0, 1.0 / 2f32.sqrt() + 1.0, 3.0], 1e-5);
    }

    #[test]
    fn test_gcn_weighted_normalization() {
        let gcn = GCNConv::new(1, 1, fixed(&[("lin.weight", 1.0), ("bias", 0.0)])).unwrap();
        let x = Tensor::new(&[[1f32], [2.], [4.]], &Device::Cpu).unwrap();
        let edge_index = Tensor::new(&[[0u32, 1], [1u32, 2]], &Device::Cpu).unwrap();
        let weight = Tensor::new(&[2f32, 0.5], &Device::Cpu).unwrap();

        // Weighted in-degrees: 1, 3, 1.5
        let out = gcn.forward(&x, &edge_index, Some(&weight)).unwrap();
        let out_1 = 2.0 / 3f32.sqrt() + 2.0 / 3.0;
        let out_2 = 0.5 * 2.0 / (3.0f32 * 1.5).sqrt() + 4.0 / 1.5;
        assert_close(&out, &[1.0, out_1, out_2], 1e-5);
    }

    #[test]
    fn test_gcn_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gcn = GCNConv::new(16, 8, vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (5, 16), &device).unwrap();
        let out = gcn.forward(&x, &ring(5), None).unwrap();
        assert_eq!(out.dims(), &[5, 8]);
    }

    #[test]
    fn test_gcn_unit_weights_match_unweighted() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gcn = GCNConv::new(4, 3, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (5, 4), &device).unwrap();
        let ones = Tensor::ones(5, DType::F32, &device).unwrap();

        let a = gcn.forward(&x, &ring(5), None).unwrap();
        let b = gcn.forward(&x, &ring(5), Some(&ones)).unwrap();
        let diff = (a - b).unwrap().abs().unwrap().max_keepdim(0).unwrap().max(1).unwrap();
        assert!(diff.to_vec1::<f32>().unwrap()[0] < 1e-6);
    }

    #[test]
    fn test_gcn_accepts_i64_edge_index() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gcn = GCNConv::new(4, 2, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let edge_index = Tensor::from_vec(vec![0i64, 1, 1, 2], (2, 2), &device).unwrap();

        let out = gcn.forward(&x, &edge_index, None).unwrap();
        assert_eq!(out.dims(), &[3, 2]);
    }

    #[test]
    fn test_gat_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gat = GATConv::new(16, 8, 0.2, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (6, 16), &device).unwrap();

        let out = gat.forward(&x, &ring(6)).unwrap();
        assert_eq!(out.dims(), &[6, 8]);
    }

    #[test]
    fn test_gat_attention_is_per_target() {
        let gat = GATConv::new(
            1,
            1,
            0.2,
            fixed(&[("lin.weight", 1.0), ("att_src", 1.0), ("att_dst", 1.0), ("bias", 0.0)]),
        )
        .unwrap();
        // Node 0 is isolated with a huge feature; 1 -> 2 is the only edge
        let x = Tensor::new(&[[1000f32], [1.], [2.]], &Device::Cpu).unwrap();
        let edge_index = Tensor::new(&[[1u32], [2u32]], &Device::Cpu).unwrap();

        // Node 2 scores: 3 from node 1, 4 from its self-loop
        let e = std::f32::consts::E;
        let out_2 = (1.0 + 2.0 * e) / (1.0 + e);
        let out = gat.forward(&x, &edge_index).unwrap();
        assert_close(&out, &[1000.0, 1.0, out_2], 1e-3);
    }

    #[test]
    fn test_gatv2_attention_is_per_target() {
        let gat = GATv2Conv::new(
            1,
            1,
            0.2,
            fixed(&[
                ("lin_l.weight", 1.0),
                ("lin_r.weight", 1.0),
                ("att", 1.0),
                ("bias", 0.0),
            ]),
        )
        .unwrap();
        let x = Tensor::new(&[[1000f32], [1.], [2.]], &Device::Cpu).unwrap();
        let edge_index = Tensor::new(&[[1u32], [2u32]], &Device::Cpu).unwrap();

        // Same scores as GAT here: x_j + x_i
        let e = std::f32::consts::E;
        let out_2 = (1.0 + 2.0 * e) / (1.0 + e);
        let out = gat.forward(&x, &edge_index).unwrap();
        assert_close(&out, &[1000.0, 1.0, out_2], 1e-3);
    }

    #[test]
    fn test_gatv2_constant_features_are_preserved() {
        let gat = GATv2Conv::new(
            1,
            1,
            0.2,
            fixed(&[
                ("lin_l.weight", 1.0),
                ("lin_r.weight", 1.0),
                ("att", 0.7),
                ("bias", 0.0),
            ]),
        )
        .unwrap();
        let x = Tensor::new(&[[3f32], [3.], [3.], [3.]], &Device::Cpu).unwrap();

        // Attention sums to 1 per target, so a constant signal passes through
        let out = gat.forward(&x, &ring(4)).unwrap();
        assert_close(&out, &[3.0, 3.0, 3.0, 3.0], 1e-5);
    }

    #[test]
    fn test_gatv2_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gat = GATv2Conv::new(16, 8, 0.2, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (6, 16), &device).unwrap();

        let out = gat.forward(&x, &ring(6)).unwrap();
        assert_eq!(out.dims(), &[6, 8]);
    }

    #[test]
    fn test_sage_isolated_node_keeps_root_term() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let sage = SAGEConv::new(4, 4, vb).unwrap();
        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        // 0 -> 1 only; node 2 has no neighbors
        let edge_index = Tensor::new(&[[0u32], [1u32]], &device).unwrap();

        let out = sage.forward(&x, &edge_index).unwrap();
        assert_eq!(out.dims(), &[3, 4]);
        let no_edges = Tensor::zeros((2, 0), DType::U32, &device).unwrap();
        let isolated = sage.forward(&x, &no_edges).unwrap();
        let row2 = out.get(2).unwrap().to_vec1::<f32>().unwrap();
        let row2_isolated = isolated.get(2).unwrap().to_vec1::<f32>().unwrap();
        for (a, b) in row2.iter().zip(&row2_isolated) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_gin_sum_aggregation() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gin = GINConv::new(4, 4, vb).unwrap();

        // Node 0 receives from 1 and 2
        let x = Tensor::ones((3, 4), DType::F32, &device).unwrap();
        let edge_index = Tensor::new(&[[1u32, 2, 0, 0], [0u32, 0, 1, 2]], &device).unwrap();

        let out = gin.forward(&x, &edge_index).unwrap();
        assert_eq!(out.dims(), &[3, 4]);
    }

    #[test]
    fn test_gine_forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let gine = GINEConv::new(8, 16, 3, vb).unwrap();
        assert_eq!(gine.edge_dim(), 3);

        let x = Tensor::randn(0f32, 1f32, (5, 8), &device).unwrap();
        let edge_attr = Tensor::randn(0f32, 1f32, (5, 3), &device).unwrap();

        let out = gine.forward(&x, &ring(5), &edge_attr).unwrap();
        assert_eq!(out.dims(), &[5, 16]);
    }

    #[test]
    fn test_conv_layer_all_kinds() {
        let device = Device::Cpu;
        let x = Tensor::randn(0f32, 1f32, (4, 6), &device).unwrap();
        let edge_attr = Tensor::randn(0f32, 1f32, (4, 2), &device).unwrap();

        for kind in ConvKind::ALL {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            let layer = ConvLayer::new(kind, 6, 5, Some(2), vb).unwrap();
            assert_eq!(layer.capability(), kind.capability());

            let edge = match layer.capability() {
                EdgeCapability::ScalarWeight => EdgeInput::Weight(None),
                EdgeCapability::EdgeFeatures => EdgeInput::Features(&edge_attr),
                EdgeCapability::Ignored => EdgeInput::None,
            };
            let out = layer.forward(&x, &ring(4), edge).unwrap();
            assert_eq!(out.dims(), &[4, 5], "{kind}");
        }
    }

    #[test]
    fn test_conv_layer_rejects_mismatched_edge_input() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = ConvLayer::new(ConvKind::Gat, 4, 4, None, vb).unwrap();

        let x = Tensor::randn(0f32, 1f32, (3, 4), &device).unwrap();
        let err = layer.forward(&x, &ring(3), EdgeInput::Weight(None)).unwrap_err();
        assert!(matches!(err, crate::Error::Input(_)));
    }

    #[test]
    fn test_gine_layer_requires_edge_dim() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let err = ConvLayer::new(ConvKind::Gine, 4, 4, None, vb).err().unwrap();
        assert!(matches!(err, crate::Error::Build(_)));
    }
}
