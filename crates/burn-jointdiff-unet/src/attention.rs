//! Spatial self-attention and image-to-parameter cross-modal attention
//!
//! Both blocks work on `[batch * heads, head_dim, tokens]` views of the
//! feature map and add their projected output back onto the input.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    Linear, LinearConfig,
};
use burn::prelude::*;

use burn_jointdiff_core::attention::{apply_attention, attention_weights};
use burn_jointdiff_core::groupnorm::{GroupNorm, NORM_GROUPS};
use burn_jointdiff_core::layernorm::LayerNorm;

use crate::error::ConfigError;

fn check_heads(channels: usize, num_heads: usize) -> Result<(), ConfigError> {
    if num_heads == 0 || channels % num_heads != 0 {
        return Err(ConfigError::HeadsNotDivisible {
            channels,
            num_heads,
        });
    }
    Ok(())
}

/// Multi-head self-attention over the spatial positions of a feature map
#[derive(Module, Debug)]
pub struct AttentionBlock<B: Backend> {
    /// Input normalization
    pub norm: GroupNorm<B>,
    /// Joint query/key/value projection (1x1, no bias)
    pub qkv: Conv2d<B>,
    /// Output projection
    pub proj: Conv2d<B>,
    /// Number of attention heads
    pub num_heads: usize,
}

impl<B: Backend> AttentionBlock<B> {
    /// Creates a self-attention block
    ///
    /// Fails if `channels` is not divisible by `num_heads`.
    pub fn new(channels: usize, num_heads: usize, device: &B::Device) -> Result<Self, ConfigError> {
        check_heads(channels, num_heads)?;

        Ok(Self {
            norm: GroupNorm::new(NORM_GROUPS, channels, device),
            qkv: Conv2dConfig::new([channels, channels * 3], [1, 1])
                .with_bias(false)
                .init(device),
            proj: Conv2dConfig::new([channels, channels], [1, 1]).init(device),
            num_heads,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `x` - Feature map of shape `[batch, channels, height, width]`
    ///
    /// # Returns
    ///
    /// Tensor with the same shape as the input
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = x.dims();
        let head_dim = c / self.num_heads;

        let qkv = self.qkv.forward(self.norm.forward(x.clone()));
        // Each head owns a contiguous 3 * head_dim slice, split into q, k, v
        let qkv = qkv.reshape([b * self.num_heads, 3 * head_dim, h * w]);
        let q = qkv.clone().narrow(1, 0, head_dim);
        let k = qkv.clone().narrow(1, head_dim, head_dim);
        let v = qkv.narrow(1, 2 * head_dim, head_dim);

        // [b * heads, tokens, tokens], normalized over keys
        let weights = attention_weights(q, k, 2);
        let out = apply_attention(weights, v).reshape([b, c, h, w]);

        self.proj.forward(out) + x
    }
}

/// Cross-modal attention from image positions to the parameter-feature vector
///
/// Queries come from every spatial position of the image; keys and values come
/// from the parameter features as a single token per sample. With one key the
/// softmax is taken over space instead, so each head distributes a unit of
/// attention across the image deciding where the parameter value is mixed in.
#[derive(Module, Debug)]
pub struct CrossModalAttentionBlock<B: Backend> {
    /// Image normalization
    pub img_norm: GroupNorm<B>,
    /// Query projection from the image (1x1, no bias)
    pub img_to_q: Conv2d<B>,
    /// Parameter-feature normalization
    pub param_norm: LayerNorm<B>,
    /// Joint key/value projection from the parameter features
    pub param_to_kv: Linear<B>,
    /// Output projection
    pub proj: Conv2d<B>,
    /// Number of attention heads
    pub num_heads: usize,
}

impl<B: Backend> CrossModalAttentionBlock<B> {
    /// Creates a cross-modal attention block
    ///
    /// # Arguments
    ///
    /// * `img_channels` - Channels of the image feature map
    /// * `param_dim` - Width of the parameter-feature vector
    /// * `num_heads` - Number of attention heads (must divide `img_channels`)
    /// * `device` - Device to create tensors on
    pub fn new(
        img_channels: usize,
        param_dim: usize,
        num_heads: usize,
        device: &B::Device,
    ) -> Result<Self, ConfigError> {
        check_heads(img_channels, num_heads)?;

        Ok(Self {
            img_norm: GroupNorm::new(NORM_GROUPS, img_channels, device),
            img_to_q: Conv2dConfig::new([img_channels, img_channels], [1, 1])
                .with_bias(false)
                .init(device),
            param_norm: LayerNorm::new(param_dim, device),
            param_to_kv: LinearConfig::new(param_dim, img_channels * 2).init(device),
            proj: Conv2dConfig::new([img_channels, img_channels], [1, 1]).init(device),
            num_heads,
        })
    }

    /// Queries `[b*heads, head_dim, h*w]`, keys and values `[b*heads, head_dim, 1]`
    fn project(
        &self,
        img: Tensor<B, 4>,
        params: Tensor<B, 2>,
    ) -> (Tensor<B, 3>, Tensor<B, 3>, Tensor<B, 3>) {
        let [b, c, h, w] = img.dims();
        let head_dim = c / self.num_heads;

        let q = self.img_to_q.forward(self.img_norm.forward(img));
        let q = q.reshape([b * self.num_heads, head_dim, h * w]);

        let kv = self.param_to_kv.forward(self.param_norm.forward(params));
        let k = kv.clone().narrow(1, 0, c).reshape([b * self.num_heads, head_dim, 1]);
        let v = kv.narrow(1, c, c).reshape([b * self.num_heads, head_dim, 1]);

        (q, k, v)
    }

    /// Attention weights of shape `[batch * heads, height * width, 1]`
    ///
    /// For every sample and head the weights sum to one across space.
    pub fn attention_weights(&self, img: Tensor<B, 4>, params: Tensor<B, 2>) -> Tensor<B, 3> {
        let (q, k, _) = self.project(img, params);
        attention_weights(q, k, 1)
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `img` - Feature map of shape `[batch, channels, height, width]`
    /// * `params` - Parameter features of shape `[batch, param_dim]`
    ///
    /// # Returns
    ///
    /// Tensor with the same shape as `img`
    pub fn forward(&self, img: Tensor<B, 4>, params: Tensor<B, 2>) -> Tensor<B, 4> {
        let [b, c, h, w] = img.dims();

        let (q, k, v) = self.project(img.clone(), params);
        let weights = attention_weights(q, k, 1);
        let out = apply_attention(weights, v).reshape([b, c, h, w]);

        self.proj.forward(out) + img
    }
}
