//! Joint image + parameter UNet
//!
//! Denoises an image and its parameter vector together. The image path is a
//! multi-resolution encoder/decoder with skip connections; the parameter
//! path is an MLP whose features are fused into the image path by
//! cross-modal attention and projected back to a parameter residual.

use burn::module::Ignored;
use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;

use burn_jointdiff_core::groupnorm::{GroupNorm, NORM_GROUPS};
use burn_jointdiff_core::silu::silu;

use crate::backbone::{block_settings, Conditioning, UNetBackbone};
use crate::config::JointUNetConfig;
use crate::error::{ConfigError, ForwardError};
use crate::layout::UNetLayout;
use crate::sequential::ConditionedSequential;

/// Output of the joint model
#[derive(Debug, Clone)]
pub struct JointUNetOutput<B: Backend> {
    /// Predicted image residual `[batch, out_channels, height, width]`
    pub image: Tensor<B, 4>,
    /// Predicted parameter residual `[batch, param_dim]`
    pub params: Tensor<B, 2>,
}

/// Joint image + parameter denoising UNet
#[derive(Module, Debug)]
pub struct JointUNet<B: Backend> {
    /// Conditioning, encoder and bottleneck
    pub backbone: UNetBackbone<B>,
    /// Decoder stages, each preceded by a skip concatenation
    pub output_blocks: Vec<ConditionedSequential<B>>,
    /// Image head normalization
    pub norm_out: GroupNorm<B>,
    /// Image head convolution
    pub conv_out: Conv2d<B>,
    /// Parameter head
    pub param_out: Linear<B>,
    /// Planned architecture
    pub layout: Ignored<UNetLayout>,
}

impl JointUNetConfig {
    /// Plans and initializes the joint model
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<JointUNet<B>, ConfigError> {
        JointUNet::new(self, device)
    }
}

impl<B: Backend> JointUNet<B> {
    /// Creates a new joint UNet
    ///
    /// # Arguments
    ///
    /// * `config` - Architecture configuration
    /// * `device` - Device to create tensors on
    pub fn new(config: &JointUNetConfig, device: &B::Device) -> Result<Self, ConfigError> {
        let layout = UNetLayout::plan(config)?;
        tracing::debug!(
            encoder_stages = layout.encoder.len(),
            decoder_stages = layout.decoder.len(),
            bottleneck_channels = layout.bottleneck_channels(),
            num_downsamples = layout.num_downsamples,
            cross_attention_blocks = layout.num_cross_attention_blocks(),
            "planned joint UNet layout"
        );

        let backbone = UNetBackbone::new(config, &layout, device)?;

        let settings = block_settings(config);
        let output_blocks = layout
            .decoder
            .iter()
            .map(|stage| ConditionedSequential::from_plans(&stage.blocks, &settings, device))
            .collect::<Result<Vec<_>, _>>()?;

        // The image head reads the last decoder stage, whatever its width
        let ch = layout.output_channels();
        let norm_out = GroupNorm::new(NORM_GROUPS, ch, device);
        let conv_out = Conv2dConfig::new([ch, config.out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let param_out = LinearConfig::new(config.param_hidden_dim, config.param_dim).init(device);

        let model = Self {
            backbone,
            output_blocks,
            norm_out,
            conv_out,
            param_out,
            layout: Ignored(layout),
        };
        tracing::info!(num_params = model.num_params(), "initialized joint UNet");

        Ok(model)
    }

    /// Planned architecture this model was built from
    pub fn layout(&self) -> &UNetLayout {
        &self.layout.0
    }

    /// Projected time embedding for a batch of timesteps
    pub fn time_embedding(&self, timesteps: Tensor<B, 1>) -> Tensor<B, 2> {
        self.backbone.time_embedding(timesteps)
    }

    /// Parameter features shared by the cross-modal blocks
    pub fn param_features(&self, params: Tensor<B, 2>, timesteps: Tensor<B, 1>) -> Tensor<B, 2> {
        self.backbone.conditioning(params, timesteps).param_features
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Noisy image `[batch, in_channels, h, w]`, with `h` and `w`
    ///   multiples of [`UNetLayout::spatial_divisor`]
    /// * `params` - Noisy parameters `[batch, param_dim]`
    /// * `timesteps` - Diffusion step per sample `[batch]`
    ///
    /// # Returns
    /// Image residual `[batch, out_channels, h, w]` and parameter residual
    /// `[batch, param_dim]`
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        params: Tensor<B, 2>,
        timesteps: Tensor<B, 1>,
    ) -> JointUNetOutput<B> {
        let encoded = self.backbone.forward(x, params, timesteps);
        let Conditioning {
            time_emb,
            param_features,
        } = encoded.conditioning;
        let mut skips = encoded.skips;

        let mut h = encoded.hidden;
        for stage in &self.output_blocks {
            // The layout guarantees one pushed skip per decoder stage
            if let Some(skip) = skips.pop() {
                h = Tensor::cat(vec![h, skip], 1);
            }
            h = stage.forward(h, &time_emb, Some(&param_features));
        }
        debug_assert!(skips.is_empty(), "{} skip tensors left undrained", skips.len());

        let h = silu(self.norm_out.forward(h));
        let image = self.conv_out.forward(h);
        let params = self.param_out.forward(param_features);

        JointUNetOutput { image, params }
    }

    /// Forward pass that validates input shapes first
    pub fn try_forward(
        &self,
        x: Tensor<B, 4>,
        params: Tensor<B, 2>,
        timesteps: Tensor<B, 1>,
    ) -> Result<JointUNetOutput<B>, ForwardError> {
        check_inputs(&self.layout.0, x.dims(), params.dims(), timesteps.dims())?;
        Ok(self.forward(x, params, timesteps))
    }
}

/// Validates input shapes against a planned layout
pub fn check_inputs(
    layout: &UNetLayout,
    image: [usize; 4],
    params: [usize; 2],
    timesteps: [usize; 1],
) -> Result<(), ForwardError> {
    let [batch, channels, height, width] = image;

    if batch != params[0] || batch != timesteps[0] {
        return Err(ForwardError::BatchMismatch {
            image: batch,
            params: params[0],
            timesteps: timesteps[0],
        });
    }
    if channels != layout.in_channels {
        return Err(ForwardError::ChannelMismatch {
            expected: layout.in_channels,
            actual: channels,
        });
    }
    if params[1] != layout.param_dim {
        return Err(ForwardError::ParamDimMismatch {
            expected: layout.param_dim,
            actual: params[1],
        });
    }

    let divisor = layout.spatial_divisor();
    if height == 0 || width == 0 || height % divisor != 0 || width % divisor != 0 {
        return Err(ForwardError::IndivisibleSpatial {
            height,
            width,
            divisor,
        });
    }

    Ok(())
}
