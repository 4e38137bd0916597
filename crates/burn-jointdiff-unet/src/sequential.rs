//! Conditioned sequential composer
//!
//! A stage of the UNet is an ordered list of heterogeneous blocks driven by
//! one call signature. Each block is tagged with the conditioning signals it
//! consumes and the composer routes the time embedding and parameter
//! features by that tag.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    PaddingConfig2d,
};
use burn::prelude::*;

use crate::attention::{AttentionBlock, CrossModalAttentionBlock};
use crate::blocks::{Downsample, ResBlock, Upsample};
use crate::error::ConfigError;
use crate::layout::BlockPlan;

/// Conditioning signals a block consumes besides the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Image only
    Plain,
    /// Image and time embedding
    TimestepConditioned,
    /// Image and parameter features
    CrossModalConditioned,
}

/// Blocks that only see the image tensor
#[derive(Module, Debug)]
pub enum PlainBlock<B: Backend> {
    Conv(Conv2d<B>),
    Attention(AttentionBlock<B>),
    Downsample(Downsample<B>),
    Upsample(Upsample<B>),
}

impl<B: Backend> PlainBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            PlainBlock::Conv(conv) => conv.forward(x),
            PlainBlock::Attention(attn) => attn.forward(x),
            PlainBlock::Downsample(down) => down.forward(x),
            PlainBlock::Upsample(up) => up.forward(x),
        }
    }
}

/// A block tagged by the conditioning it accepts
#[derive(Module, Debug)]
pub enum Block<B: Backend> {
    Plain(PlainBlock<B>),
    Timestep(ResBlock<B>),
    CrossModal(CrossModalAttentionBlock<B>),
}

/// Shared hyperparameters needed to instantiate planned blocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockSettings {
    /// Width of the projected time embedding
    pub time_embed_dim: usize,
    /// Width of the parameter-feature vector
    pub param_hidden_dim: usize,
    /// Residual block dropout
    pub dropout: f64,
    /// Attention heads
    pub num_heads: usize,
    /// Learned resampling
    pub conv_resample: bool,
}

impl<B: Backend> Block<B> {
    /// Instantiates a planned block
    pub fn from_plan(
        plan: &BlockPlan,
        settings: &BlockSettings,
        device: &B::Device,
    ) -> Result<Self, ConfigError> {
        let block = match *plan {
            BlockPlan::InputConv {
                in_channels,
                out_channels,
            } => Block::Plain(PlainBlock::Conv(
                Conv2dConfig::new([in_channels, out_channels], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            )),
            BlockPlan::Residual {
                in_channels,
                out_channels,
            } => Block::Timestep(ResBlock::new(
                in_channels,
                out_channels,
                settings.time_embed_dim,
                settings.dropout,
                device,
            )),
            BlockPlan::SelfAttention { channels } => Block::Plain(PlainBlock::Attention(
                AttentionBlock::new(channels, settings.num_heads, device)?,
            )),
            BlockPlan::CrossAttention { channels } => {
                Block::CrossModal(CrossModalAttentionBlock::new(
                    channels,
                    settings.param_hidden_dim,
                    settings.num_heads,
                    device,
                )?)
            }
            BlockPlan::Downsample { channels } => Block::Plain(PlainBlock::Downsample(
                Downsample::new(channels, settings.conv_resample, device),
            )),
            BlockPlan::Upsample { channels } => Block::Plain(PlainBlock::Upsample(Upsample::new(
                channels,
                settings.conv_resample,
                device,
            ))),
        };
        Ok(block)
    }

    /// Conditioning tag of this block
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Plain(_) => BlockKind::Plain,
            Block::Timestep(_) => BlockKind::TimestepConditioned,
            Block::CrossModal(_) => BlockKind::CrossModalConditioned,
        }
    }
}

/// Ordered blocks driven by `(image, time embedding, parameter features)`
#[derive(Module, Debug)]
pub struct ConditionedSequential<B: Backend> {
    pub blocks: Vec<Block<B>>,
}

impl<B: Backend> ConditionedSequential<B> {
    /// Builds every block of a planned stage, in order
    pub fn from_plans(
        plans: &[BlockPlan],
        settings: &BlockSettings,
        device: &B::Device,
    ) -> Result<Self, ConfigError> {
        let blocks = plans
            .iter()
            .map(|plan| Block::from_plan(plan, settings, device))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { blocks })
    }

    /// Dispatch tags of the blocks, in execution order
    pub fn kinds(&self) -> Vec<BlockKind> {
        self.blocks.iter().map(Block::kind).collect()
    }

    /// Runs every block in order
    ///
    /// Residual blocks receive the time embedding and cross-modal blocks the
    /// parameter features. Without parameter features the cross-modal blocks
    /// are skipped, which leaves their residual stream untouched.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        time_emb: &Tensor<B, 2>,
        param_features: Option<&Tensor<B, 2>>,
    ) -> Tensor<B, 4> {
        if param_features.is_none() && self.kinds().contains(&BlockKind::CrossModalConditioned) {
            tracing::warn!("no parameter features supplied; skipping cross-modal attention");
        }

        self.blocks.iter().fold(x, |h, block| match block {
            Block::Plain(plain) => plain.forward(h),
            Block::Timestep(res) => res.forward(h, time_emb.clone()),
            Block::CrossModal(cross) => match param_features {
                Some(features) => cross.forward(h, features.clone()),
                None => h,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn settings() -> BlockSettings {
        BlockSettings {
            time_embed_dim: 64,
            param_hidden_dim: 16,
            dropout: 0.0,
            num_heads: 2,
            conv_resample: true,
        }
    }

    #[test]
    fn test_kinds_follow_plan() {
        let device = Default::default();
        let plans = [
            BlockPlan::Residual {
                in_channels: 32,
                out_channels: 64,
            },
            BlockPlan::SelfAttention { channels: 64 },
            BlockPlan::CrossAttention { channels: 64 },
            BlockPlan::Downsample { channels: 64 },
        ];
        let seq = ConditionedSequential::<TestBackend>::from_plans(&plans, &settings(), &device).unwrap();

        let expected: Vec<BlockKind> = plans.iter().map(BlockPlan::kind).collect();
        assert_eq!(seq.kinds(), expected);
        assert_eq!(
            seq.kinds(),
            vec![
                BlockKind::TimestepConditioned,
                BlockKind::Plain,
                BlockKind::CrossModalConditioned,
                BlockKind::Plain,
            ]
        );
    }

    #[test]
    fn test_forward_dispatch() {
        let device = Default::default();
        let plans = [
            BlockPlan::Residual {
                in_channels: 32,
                out_channels: 64,
            },
            BlockPlan::SelfAttention { channels: 64 },
            BlockPlan::CrossAttention { channels: 64 },
            BlockPlan::Upsample { channels: 64 },
        ];
        let seq = ConditionedSequential::<TestBackend>::from_plans(&plans, &settings(), &device).unwrap();

        let x = Tensor::random([2, 32, 4, 4], Distribution::Default, &device);
        let emb = Tensor::random([2, 64], Distribution::Default, &device);
        let features = Tensor::random([2, 16], Distribution::Default, &device);

        let out = seq.forward(x, &emb, Some(&features));
        assert_eq!(out.dims(), [2, 64, 8, 8]);
    }

    #[test]
    fn test_cross_modal_skipped_without_features() {
        let device = Default::default();
        let plans = [BlockPlan::CrossAttention { channels: 32 }];
        let seq = ConditionedSequential::<TestBackend>::from_plans(&plans, &settings(), &device).unwrap();

        let x = Tensor::<TestBackend, 4>::random([1, 32, 2, 2], Distribution::Default, &device);
        let emb = Tensor::zeros([1, 64], &device);

        let out: Vec<f32> = seq.forward(x.clone(), &emb, None).into_data().to_vec().unwrap();
        let input: Vec<f32> = x.into_data().to_vec().unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_invalid_heads_fail_construction() {
        let device = Default::default();
        let plans = [BlockPlan::SelfAttention { channels: 32 }];
        let bad = BlockSettings {
            num_heads: 3,
            ..settings()
        };
        assert!(ConditionedSequential::<TestBackend>::from_plans(&plans, &bad, &device).is_err());
    }
}
