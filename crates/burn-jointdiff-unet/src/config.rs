//! Architecture configuration
//!
//! Both model variants are built from an immutable configuration record.
//! Missing fields deserialize to the reference configuration, so a partial
//! JSON/YAML document only needs to name what it overrides.

use serde::{Deserialize, Serialize};

use burn_jointdiff_core::groupnorm::NORM_GROUPS;

use crate::error::ConfigError;

/// Configuration of the joint image + parameter UNet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointUNetConfig {
    /// Input image channels
    pub in_channels: usize,
    /// Output image channels
    pub out_channels: usize,
    /// Base channel width; the sinusoidal timestep embedding has this width
    pub model_channels: usize,
    /// Width of the raw parameter vector
    pub param_dim: usize,
    /// Width of the parameter-feature vector shared by cross-modal blocks
    pub param_hidden_dim: usize,
    /// Residual blocks per encoder level (the decoder uses one more)
    pub num_res_blocks: usize,
    /// Downsampling factors at which attention blocks are inserted
    pub attention_resolutions: Vec<usize>,
    /// Dropout inside residual blocks
    pub dropout: f64,
    /// Channel multiplier per resolution level
    pub channel_mult: Vec<usize>,
    /// Learned (conv) resampling instead of average pool / plain nearest upsample
    pub conv_resample: bool,
    /// Attention heads for self- and cross-modal attention
    pub num_heads: usize,
    /// Insert cross-modal attention next to every self-attention block
    pub use_cross_attention: bool,
}

impl Default for JointUNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            out_channels: 1,
            model_channels: 128,
            param_dim: 8,
            param_hidden_dim: 128,
            num_res_blocks: 2,
            attention_resolutions: vec![8, 16],
            dropout: 0.1,
            channel_mult: vec![1, 2, 2, 2],
            conv_resample: true,
            num_heads: 4,
            use_cross_attention: true,
        }
    }
}

impl JointUNetConfig {
    /// Small two-level model for tests and quick experiments
    pub fn tiny() -> Self {
        Self {
            in_channels: 1,
            out_channels: 1,
            model_channels: 32,
            param_dim: 4,
            param_hidden_dim: 16,
            num_res_blocks: 1,
            attention_resolutions: vec![2],
            dropout: 0.0,
            channel_mult: vec![1, 2],
            conv_resample: true,
            num_heads: 2,
            use_cross_attention: true,
        }
    }

    /// Width of the projected time embedding
    pub fn time_embed_dim(&self) -> usize {
        self.model_channels * 4
    }

    /// Whether attention blocks are inserted at downsampling factor `ds`
    pub fn has_attention_at(&self, ds: usize) -> bool {
        self.attention_resolutions.contains(&ds)
    }

    /// Checks the scalar constraints of the configuration
    ///
    /// Attention head divisibility depends on the planned block widths and is
    /// checked by [`crate::layout::UNetLayout::plan`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_mult.is_empty() {
            return Err(ConfigError::EmptyChannelMult);
        }

        let non_zero = [
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("model_channels", self.model_channels),
            ("param_dim", self.param_dim),
            ("param_hidden_dim", self.param_hidden_dim),
            ("num_heads", self.num_heads),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.channel_mult.contains(&0) {
            return Err(ConfigError::Zero {
                field: "channel_mult",
            });
        }

        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::InvalidDropout(self.dropout));
        }

        // Every stage width (and so every skip concatenation) must split into norm groups
        let widths = std::iter::once(1)
            .chain(self.channel_mult.iter().copied())
            .map(|mult| self.model_channels * mult);
        for channels in widths {
            if channels % NORM_GROUPS != 0 {
                return Err(ConfigError::GroupsNotDivisible {
                    channels,
                    groups: NORM_GROUPS,
                });
            }
        }

        Ok(())
    }
}

/// Configuration of the energy (property predictor) variant
///
/// Shares the joint model's encoder and bottleneck settings; the decoder is
/// replaced by a pooled MLP head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyUNetConfig {
    /// Encoder and bottleneck settings
    #[serde(flatten)]
    pub unet: JointUNetConfig,
    /// Width of the predicted property vector
    pub prop_dim: usize,
    /// Hidden width of the property head
    pub prop_hidden_dim: usize,
}

impl Default for EnergyUNetConfig {
    fn default() -> Self {
        Self {
            unet: JointUNetConfig::default(),
            prop_dim: 1,
            prop_hidden_dim: 128,
        }
    }
}

impl EnergyUNetConfig {
    /// Tiny energy model matching [`JointUNetConfig::tiny`]
    pub fn tiny() -> Self {
        Self {
            unet: JointUNetConfig::tiny(),
            prop_dim: 1,
            prop_hidden_dim: 16,
        }
    }

    /// Checks the shared backbone settings and the property head widths
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.unet.validate()?;
        if self.prop_dim == 0 {
            return Err(ConfigError::Zero { field: "prop_dim" });
        }
        if self.prop_hidden_dim == 0 {
            return Err(ConfigError::Zero {
                field: "prop_hidden_dim",
            });
        }
        Ok(())
    }
}
