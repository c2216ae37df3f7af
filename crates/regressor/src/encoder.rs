use candle_core::Tensor;

use crate::Result;

/// A frozen sequence encoder reduced to one vector per input: the hidden state at the first
/// position (`<cls>` / `<s>`).
pub trait PooledEncoder: Send + Sync {
    fn hidden_size(&self) -> usize;

    /// `ids` and `mask` are `(batch, seq)` u32 tensors; returns `(batch, hidden_size)`.
    fn pooled(&self, ids: &Tensor, mask: &Tensor) -> Result<Tensor>;
}
