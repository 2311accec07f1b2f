//! Graph-level readout pooling.

use std::collections::BTreeMap;

use candle_core::{DType, Result, Tensor};

use crate::conv::scatter_sum;

/// Average node rows per graph.
///
/// `x` is (N x F), `batch` is (N,) with a graph index per node. Returns
/// (B x F) where B is the number of distinct indices; row `k` belongs to the
/// `k`-th smallest index. For the usual contiguous `0..B` indices that is
/// simply row `b` for graph `b`.
pub fn global_mean_pool(x: &Tensor, batch: &Tensor) -> Result<Tensor> {
    let ids = batch.to_dtype(DType::U32)?.to_vec1::<u32>()?;

    let mut slots = BTreeMap::new();
    for &id in &ids {
        slots.entry(id).or_insert(0u32);
    }
    for (rank, slot) in slots.values_mut().enumerate() {
        *slot = rank as u32;
    }
    let num_graphs = slots.len();
    let dense: Vec<u32> = ids.iter().map(|id| slots[id]).collect();
    let index = Tensor::from_vec(dense, ids.len(), x.device())?;

    let sums = scatter_sum(x, &index, num_graphs)?;
    let counts = scatter_sum(&Tensor::ones(ids.len(), x.dtype(), x.device())?, &index, num_graphs)?;
    sums.broadcast_div(&counts.unsqueeze(1)?)
}
