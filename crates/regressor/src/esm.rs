//! ESM-2 protein encoder on candle primitives.
//!
//! Pre-LayerNorm transformer with rotary self-attention, matching the Hugging Face `EsmModel`
//! weight layout (`embeddings.*`, `encoder.layer.N.*`, `encoder.emb_layer_norm_after.*`),
//! optionally under an `esm.` prefix.

use candle_core::{DType, Device, IndexOp, Module, Result, Tensor, D};
use candle_nn::rotary_emb::rope;
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;

use crate::encoder::PooledEncoder;

/// Fraction of tokens masked during ESM pretraining (15% selected, 80% of those masked).
const MASK_RATIO_TRAIN: f64 = 0.15 * 0.8;

fn default_eps() -> f64 {
    1e-5
}

#[derive(Clone, Debug, Deserialize)]
pub struct EsmConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f64,
    #[serde(default)]
    pub token_dropout: bool,
    pub max_position_embeddings: usize,
}

impl EsmConfig {
    /// `facebook/esm2_t6_8M_UR50D`
    pub fn esm2_t6_8m() -> Self {
        Self {
            vocab_size: 33,
            hidden_size: 320,
            num_hidden_layers: 6,
            num_attention_heads: 20,
            intermediate_size: 1280,
            layer_norm_eps: 1e-5,
            token_dropout: true,
            max_position_embeddings: 1026,
        }
    }
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn load(vb: VarBuilder, cfg: &EsmConfig) -> Result<Self> {
        let h = cfg.hidden_size;
        Ok(Self {
            query: linear(h, h, vb.pp("query"))?,
            key: linear(h, h, vb.pp("key"))?,
            value: linear(h, h, vb.pp("value"))?,
            num_heads: cfg.num_attention_heads,
            head_dim: h / cfg.num_attention_heads,
        })
    }

    fn split_heads(&self, xs: Tensor, b: usize, t: usize) -> Result<Tensor> {
        xs.reshape((b, t, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()
    }

    fn forward(&self, xs: &Tensor, bias: &Tensor, cos: &Tensor, sin: &Tensor) -> Result<Tensor> {
        let (b, t, _) = xs.dims3()?;

        let q = self.split_heads(self.query.forward(xs)?, b, t)?;
        let q = (q * (self.head_dim as f64).powf(-0.5))?;
        let k = self.split_heads(self.key.forward(xs)?, b, t)?;
        let v = self.split_heads(self.value.forward(xs)?, b, t)?;

        let q = rope(&q, cos, sin)?;
        let k = rope(&k, cos, sin)?;

        let scores = q.matmul(&k.t()?)?.broadcast_add(bias)?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let ctx = probs.matmul(&v)?;

        ctx.transpose(1, 2)?.reshape((b, t, self.num_heads * self.head_dim))
    }
}

struct Layer {
    attn_norm: LayerNorm,
    attn: SelfAttention,
    attn_out: Linear,
    ffn_norm: LayerNorm,
    intermediate: Linear,
    output: Linear,
}

impl Layer {
    fn load(vb: VarBuilder, cfg: &EsmConfig) -> Result<Self> {
        let h = cfg.hidden_size;
        Ok(Self {
            attn_norm: layer_norm(h, cfg.layer_norm_eps, vb.pp("attention.LayerNorm"))?,
            attn: SelfAttention::load(vb.pp("attention.self"), cfg)?,
            attn_out: linear(h, h, vb.pp("attention.output.dense"))?,
            ffn_norm: layer_norm(h, cfg.layer_norm_eps, vb.pp("LayerNorm"))?,
            intermediate: linear(h, cfg.intermediate_size, vb.pp("intermediate.dense"))?,
            output: linear(cfg.intermediate_size, h, vb.pp("output.dense"))?,
        })
    }

    fn forward(&self, xs: &Tensor, bias: &Tensor, cos: &Tensor, sin: &Tensor) -> Result<Tensor> {
        let h = self.attn_norm.forward(xs)?;
        let h = self.attn.forward(&h, bias, cos, sin)?;
        let xs = (self.attn_out.forward(&h)? + xs)?;

        let h = self.ffn_norm.forward(&xs)?;
        let h = self.intermediate.forward(&h)?.gelu_erf()?;
        self.output.forward(&h)? + xs
    }
}

pub struct EsmEncoder {
    word_embeddings: Embedding,
    layers: Vec<Layer>,
    final_norm: LayerNorm,
    inv_freq: Vec<f32>,
    config: EsmConfig,
    device: Device,
}

impl EsmEncoder {
    pub fn load(vb: VarBuilder, config: &EsmConfig) -> Result<Self> {
        let vb = if vb.contains_tensor("esm.embeddings.word_embeddings.weight") {
            vb.pp("esm")
        } else {
            vb
        };

        let word_embeddings = embedding(
            config.vocab_size,
            config.hidden_size,
            vb.pp("embeddings.word_embeddings"),
        )?;
        let layers = (0..config.num_hidden_layers)
            .map(|i| Layer::load(vb.pp(format!("encoder.layer.{i}")), config))
            .collect::<Result<Vec<_>>>()?;
        let final_norm = layer_norm(
            config.hidden_size,
            config.layer_norm_eps,
            vb.pp("encoder.emb_layer_norm_after"),
        )?;

        let head_dim = config.hidden_size / config.num_attention_heads;
        let inv_freq = (0..head_dim)
            .step_by(2)
            .map(|i| 1.0 / 10000f32.powf(i as f32 / head_dim as f32))
            .collect();

        Ok(Self {
            word_embeddings,
            layers,
            final_norm,
            inv_freq,
            config: config.clone(),
            device: vb.device().clone(),
        })
    }

    fn rotary(&self, t: usize) -> Result<(Tensor, Tensor)> {
        let inv = Tensor::new(self.inv_freq.as_slice(), &self.device)?;
        let pos = Tensor::arange(0u32, t as u32, &self.device)?.to_dtype(DType::F32)?;
        let freqs = pos.unsqueeze(1)?.matmul(&inv.unsqueeze(0)?)?;
        Ok((freqs.cos()?, freqs.sin()?))
    }

    /// Last hidden state, `(batch, seq, hidden)`.
    pub fn forward(&self, ids: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (_b, t) = ids.dims2()?;
        let mask = mask.to_dtype(DType::F32)?;

        let mut xs = self.word_embeddings.forward(ids)?;
        if self.config.token_dropout {
            // no <mask> tokens at inference, so the observed mask ratio is 0
            xs = (xs * (1.0 - MASK_RATIO_TRAIN))?;
        }
        xs = xs.broadcast_mul(&mask.unsqueeze(D::Minus1)?)?;

        // 0 where attended, -1e9 on padding
        let bias = mask.affine(1e9, -1e9)?.unsqueeze(1)?.unsqueeze(1)?;
        let (cos, sin) = self.rotary(t)?;

        for layer in &self.layers {
            xs = layer.forward(&xs, &bias, &cos, &sin)?;
        }
        self.final_norm.forward(&xs)
    }
}

impl PooledEncoder for EsmEncoder {
    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn pooled(&self, ids: &Tensor, mask: &Tensor) -> crate::Result<Tensor> {
        Ok(self.forward(ids, mask)?.i((.., 0))?.contiguous()?)
    }
}
