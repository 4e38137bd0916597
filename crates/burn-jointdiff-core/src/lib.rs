//! Core building blocks for the joint image + parameter diffusion models
//!
//! Shared primitives used by the UNet crate.
//!
//! # Modules
//!
//! - [`attention`] - Channel-major attention kernels (logits, softmax, value mixing)
//! - [`groupnorm`] - Group normalization (used by every convolutional block)
//! - [`layernorm`] - Layer normalization (parameter-feature side of cross-attention)
//! - [`silu`] - SiLU/Swish activation

pub mod attention;
pub mod groupnorm;
pub mod layernorm;
pub mod silu;
