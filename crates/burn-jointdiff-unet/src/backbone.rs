//! Shared conditioning, encoder and bottleneck
//!
//! Both the joint UNet and the energy model run the same time embedding,
//! parameter encoder, encoder stages and bottleneck. They differ only in
//! what consumes the bottleneck output and the skip stack.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use burn_jointdiff_core::silu::silu;

use crate::blocks::{timestep_embedding_with_freqs, timestep_freqs, DEFAULT_MAX_PERIOD};
use crate::config::JointUNetConfig;
use crate::error::ConfigError;
use crate::layout::UNetLayout;
use crate::param_encoder::ParameterEncoder;
use crate::sequential::{BlockSettings, ConditionedSequential};

/// Conditioning signals computed once per forward call
#[derive(Debug, Clone)]
pub struct Conditioning<B: Backend> {
    /// Projected time embedding `[batch, 4 * model_channels]`
    pub time_emb: Tensor<B, 2>,
    /// Parameter features `[batch, param_hidden_dim]`
    pub param_features: Tensor<B, 2>,
}

/// Output of the encoder and bottleneck
#[derive(Debug, Clone)]
pub struct BackboneOutput<B: Backend> {
    /// Bottleneck feature map
    pub hidden: Tensor<B, 4>,
    /// Encoder outputs in push order; the decoder pops from the end
    pub skips: Vec<Tensor<B, 4>>,
    /// Conditioning used by every stage
    pub conditioning: Conditioning<B>,
}

/// Time embedding, parameter encoder, encoder stages and bottleneck
#[derive(Module, Debug)]
pub struct UNetBackbone<B: Backend> {
    /// Time embedding first linear layer
    pub time_embed_0: Linear<B>,
    /// Time embedding second linear layer
    pub time_embed_2: Linear<B>,
    /// Precomputed timestep embedding frequencies
    pub time_freqs: Tensor<B, 1>,
    /// Parameter encoder
    pub param_encoder: ParameterEncoder<B>,
    /// Encoder stages (input projection, residual stages, downsamples)
    pub input_blocks: Vec<ConditionedSequential<B>>,
    /// Bottleneck
    pub middle_block: ConditionedSequential<B>,
    /// Base model channels (width of the sinusoidal embedding)
    pub model_channels: usize,
}

impl<B: Backend> UNetBackbone<B> {
    /// Builds the backbone for an already planned layout
    pub fn new(
        config: &JointUNetConfig,
        layout: &UNetLayout,
        device: &B::Device,
    ) -> Result<Self, ConfigError> {
        let mc = config.model_channels;
        let time_embed_dim = config.time_embed_dim();
        let settings = block_settings(config);

        let input_blocks = layout
            .encoder
            .iter()
            .map(|stage| ConditionedSequential::from_plans(&stage.blocks, &settings, device))
            .collect::<Result<Vec<_>, _>>()?;
        let middle_block = ConditionedSequential::from_plans(&layout.middle.blocks, &settings, device)?;

        Ok(Self {
            time_embed_0: LinearConfig::new(mc, time_embed_dim).init(device),
            time_embed_2: LinearConfig::new(time_embed_dim, time_embed_dim).init(device),
            time_freqs: timestep_freqs(mc, DEFAULT_MAX_PERIOD, device),
            param_encoder: ParameterEncoder::new(
                config.param_dim,
                config.param_hidden_dim,
                config.param_hidden_dim,
                time_embed_dim,
                device,
            ),
            input_blocks,
            middle_block,
            model_channels: mc,
        })
    }

    /// Projected time embedding for a batch of (possibly fractional) timesteps
    pub fn time_embedding(&self, timesteps: Tensor<B, 1>) -> Tensor<B, 2> {
        let emb = timestep_embedding_with_freqs(timesteps, self.time_freqs.clone(), self.model_channels);
        let emb = silu(self.time_embed_0.forward(emb));
        self.time_embed_2.forward(emb)
    }

    /// Time embedding and parameter features for one forward call
    pub fn conditioning(&self, params: Tensor<B, 2>, timesteps: Tensor<B, 1>) -> Conditioning<B> {
        let time_emb = self.time_embedding(timesteps);
        let param_features = self.param_encoder.forward(params, time_emb.clone());
        Conditioning {
            time_emb,
            param_features,
        }
    }

    /// Runs the encoder and bottleneck, collecting one skip tensor per encoder stage
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        params: Tensor<B, 2>,
        timesteps: Tensor<B, 1>,
    ) -> BackboneOutput<B> {
        let conditioning = self.conditioning(params, timesteps);
        let time_emb = &conditioning.time_emb;
        let features = Some(&conditioning.param_features);

        let mut skips = Vec::with_capacity(self.input_blocks.len());
        let mut h = x;
        for stage in &self.input_blocks {
            h = stage.forward(h, time_emb, features);
            skips.push(h.clone());
        }

        let hidden = self.middle_block.forward(h, time_emb, features);

        BackboneOutput {
            hidden,
            skips,
            conditioning,
        }
    }
}

pub(crate) fn block_settings(config: &JointUNetConfig) -> BlockSettings {
    BlockSettings {
        time_embed_dim: config.time_embed_dim(),
        param_hidden_dim: config.param_hidden_dim,
        dropout: config.dropout,
        num_heads: config.num_heads,
        conv_resample: config.conv_resample,
    }
}
