//! Error types for model construction and checked forward passes

use thiserror::Error;

/// Invalid architecture configuration, reported at construction time
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("channel_mult must contain at least one stage")]
    EmptyChannelMult,

    #[error("{field} must be non-zero")]
    Zero { field: &'static str },

    #[error("dropout must be in [0, 1), got {0}")]
    InvalidDropout(f64),

    #[error("{channels} channels are not divisible by {num_heads} attention heads")]
    HeadsNotDivisible { channels: usize, num_heads: usize },

    #[error("{channels} channels are not divisible by {groups} normalization groups")]
    GroupsNotDivisible { channels: usize, groups: usize },

    #[error("skip stack mismatch: encoder pushes {pushed}, decoder pops {popped}")]
    SkipStackMismatch { pushed: usize, popped: usize },
}

/// Input rejected by a checked forward pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("expected {expected} image channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("expected {expected} parameter columns, got {actual}")]
    ParamDimMismatch { expected: usize, actual: usize },

    #[error("batch size mismatch: image {image}, params {params}, timesteps {timesteps}")]
    BatchMismatch {
        image: usize,
        params: usize,
        timesteps: usize,
    },

    #[error("spatial size {height}x{width} is not a non-zero multiple of {divisor}")]
    IndivisibleSpatial {
        height: usize,
        width: usize,
        divisor: usize,
    },
}
