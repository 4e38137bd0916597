//! Joint Image + Parameter Diffusion UNet
//!
//! This crate provides a UNet that denoises an image together with a
//! low-dimensional parameter vector, and an energy variant that predicts a
//! property from the same encoder.
//!
//! # Models
//!
//! - [`JointUNet`] - Image residual + parameter residual
//! - [`EnergyUNet`] - Property prediction from pooled bottleneck features
//!
//! # Building Blocks
//!
//! - [`ResBlock`] - Time-conditioned residual convolution block
//! - [`AttentionBlock`] - Spatial multi-head self-attention
//! - [`CrossModalAttentionBlock`] - Image queries attending to parameter features
//! - [`ParameterEncoder`] - Time-conditioned MLP for the parameter vector
//! - [`ConditionedSequential`] - Stage composer dispatching by block kind
//! - [`Downsample`], [`Upsample`] - Resolution scaling
//!
//! # Example
//!
//! ```ignore
//! use burn_jointdiff_unet::JointUNetConfig;
//!
//! let config = JointUNetConfig::default();
//! let unet = config.init::<Backend>(&device)?;
//!
//! let out = unet.forward(images, params, timesteps);
//! let (image_residual, param_residual) = (out.image, out.params);
//! ```

pub mod attention;
pub mod backbone;
pub mod blocks;
pub mod config;
pub mod energy;
pub mod error;
pub mod layout;
pub mod param_encoder;
pub mod sequential;
pub mod unet;

pub use attention::{AttentionBlock, CrossModalAttentionBlock};
pub use backbone::{BackboneOutput, Conditioning, UNetBackbone};
pub use blocks::{timestep_embedding, Downsample, ResBlock, Upsample};
pub use config::{EnergyUNetConfig, JointUNetConfig};
pub use energy::EnergyUNet;
pub use error::{ConfigError, ForwardError};
pub use layout::{BlockPlan, StagePlan, UNetLayout};
pub use param_encoder::ParameterEncoder;
pub use sequential::{Block, BlockKind, ConditionedSequential};
pub use unet::{JointUNet, JointUNetOutput};
