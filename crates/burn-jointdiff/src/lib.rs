//! burn-jointdiff: Joint Image + Parameter Diffusion in Pure Rust
//!
//! A UNet that denoises an image and a small parameter vector together,
//! fusing the two through cross-modal attention, plus an energy model that
//! predicts a property from the same encoder. Built on the Burn deep
//! learning framework.
//!
//! # Backend Selection
//!
//! Choose a backend via feature flags:
//! - `ndarray`: CPU backend (default)
//! - `tch`: PyTorch backend via libtorch (CUDA, MPS support)
//! - `wgpu`: WebGPU backend (cross-platform GPU)
//! - `cuda`: Native CUDA backend (NVIDIA only)
//!
//! # Example
//!
//! ```toml
//! [dependencies]
//! burn-jointdiff = { version = "0.1", features = ["wgpu"] }
//! ```
//!
//! ```ignore
//! use burn_jointdiff::{backends::Wgpu, JointUNetConfig, EnergyUNetConfig};
//!
//! let device = burn_jointdiff::backends::default_device();
//! let unet = JointUNetConfig::default().init::<Wgpu>(&device)?;
//! let out = unet.forward(images, params, timesteps);
//!
//! let energy = EnergyUNetConfig::default().init::<Wgpu>(&device)?;
//! let property = energy.predict(images, params, timesteps);
//! ```

pub use burn_jointdiff_core as core;
pub use burn_jointdiff_unet as unet;

pub use burn_jointdiff_unet::{
    ConfigError, EnergyUNet, EnergyUNetConfig, ForwardError, JointUNet, JointUNetConfig,
    JointUNetOutput, UNetLayout,
};

pub mod backends;
