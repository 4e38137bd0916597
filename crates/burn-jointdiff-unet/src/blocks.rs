//! UNet building blocks: timestep embedding, residual block, down/up sampling

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AvgPool2d, AvgPool2dConfig},
    Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;

use burn_jointdiff_core::groupnorm::{GroupNorm, NORM_GROUPS};
use burn_jointdiff_core::silu::silu;

/// Default `max_period` of the sinusoidal timestep embedding
pub const DEFAULT_MAX_PERIOD: f64 = 10000.0;

/// Precompute frequency tensor for timestep embedding
///
/// `freq_i = exp(-ln(max_period) * i / half)` for `i in 0..dim / 2`.
/// Call this once during initialization and pass to [`timestep_embedding_with_freqs`].
pub fn timestep_freqs<B: Backend>(dim: usize, max_period: f64, device: &B::Device) -> Tensor<B, 1> {
    let half_dim = dim / 2;

    let freqs: Vec<f32> = (0..half_dim)
        .map(|i| (-max_period.ln() * i as f64 / half_dim as f64).exp() as f32)
        .collect();

    Tensor::<B, 1>::from_data(TensorData::new(freqs, [half_dim]), device)
}

/// Timestep embedding using precomputed frequencies
///
/// Produces `[cos(t * freq), sin(t * freq)]` and pads a zero column when `dim` is odd.
pub fn timestep_embedding_with_freqs<B: Backend>(
    timesteps: Tensor<B, 1>,
    freqs: Tensor<B, 1>,
    dim: usize,
) -> Tensor<B, 2> {
    let [batch] = timesteps.dims();
    let [half_dim] = freqs.dims();
    let device = timesteps.device();

    if half_dim == 0 {
        return Tensor::zeros([batch, dim], &device);
    }

    let args = timesteps.reshape([batch, 1]) * freqs.reshape([1, half_dim]);

    let cos = args.clone().cos();
    let sin = args.sin();
    let embedding = Tensor::cat(vec![cos, sin], 1);

    if dim % 2 == 1 {
        Tensor::cat(vec![embedding, Tensor::zeros([batch, 1], &device)], 1)
    } else {
        embedding
    }
}

/// Sinusoidal timestep embedding of width `dim`
///
/// Timesteps may be fractional. For hot paths, prefer
/// [`timestep_embedding_with_freqs`] with precomputed freqs.
pub fn timestep_embedding<B: Backend>(
    timesteps: Tensor<B, 1>,
    dim: usize,
    max_period: f64,
) -> Tensor<B, 2> {
    let freqs = timestep_freqs(dim, max_period, &timesteps.device());
    timestep_embedding_with_freqs(timesteps, freqs, dim)
}

/// Residual block conditioned on the time embedding
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    /// First group normalization
    pub norm1: GroupNorm<B>,
    /// First convolution
    pub conv1: Conv2d<B>,
    /// Time embedding projection
    pub time_emb_proj: Linear<B>,
    /// Second group normalization
    pub norm2: GroupNorm<B>,
    /// Dropout before the second convolution
    pub dropout: Dropout,
    /// Second convolution
    pub conv2: Conv2d<B>,
    /// Skip connection convolution (when in_channels != out_channels)
    pub skip_conv: Option<Conv2d<B>>,
}

impl<B: Backend> ResBlock<B> {
    /// Creates a new residual block
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Number of input channels
    /// * `out_channels` - Number of output channels
    /// * `time_emb_dim` - Dimension of the timestep embedding
    /// * `dropout` - Dropout probability applied before the second convolution
    /// * `device` - Device to create tensors on
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        time_emb_dim: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let norm1 = GroupNorm::new(NORM_GROUPS, in_channels, device);
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let time_emb_proj = LinearConfig::new(time_emb_dim, out_channels).init(device);

        let norm2 = GroupNorm::new(NORM_GROUPS, out_channels, device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);

        let skip_conv = if in_channels != out_channels {
            Some(Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device))
        } else {
            None
        };

        Self {
            norm1,
            conv1,
            time_emb_proj,
            norm2,
            dropout: DropoutConfig::new(dropout).init(),
            conv2,
            skip_conv,
        }
    }

    /// Forward pass through the residual block
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape `[batch, in_channels, height, width]`
    /// * `time_emb` - Timestep embedding of shape `[batch, time_emb_dim]`
    ///
    /// # Returns
    ///
    /// Output tensor of shape `[batch, out_channels, height, width]`
    pub fn forward(&self, x: Tensor<B, 4>, time_emb: Tensor<B, 2>) -> Tensor<B, 4> {
        let [b, _, _h, _w] = x.dims();

        let residual = match &self.skip_conv {
            Some(conv) => conv.forward(x.clone()),
            None => x.clone(),
        };

        let hidden = self.norm1.forward(x);
        let hidden = silu(hidden);
        let hidden = self.conv1.forward(hidden);

        // Broadcast the projected time embedding over space
        let time_emb = self.time_emb_proj.forward(silu(time_emb));
        let emb_dim = time_emb.dims()[1];
        let hidden = hidden + time_emb.reshape([b, emb_dim, 1, 1]);

        let hidden = self.norm2.forward(hidden);
        let hidden = silu(hidden);
        let hidden = self.dropout.forward(hidden);
        let hidden = self.conv2.forward(hidden);

        hidden + residual
    }
}

/// Downsample block: strided conv, or average pooling when `conv_resample` is off
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    /// Strided 3x3 convolution
    pub conv: Option<Conv2d<B>>,
    /// 2x2 average pool, used when there is no convolution
    pub pool: Option<AvgPool2d>,
}

impl<B: Backend> Downsample<B> {
    /// Creates a new downsample block (2x spatial reduction, channel-preserving)
    pub fn new(channels: usize, use_conv: bool, device: &B::Device) -> Self {
        if use_conv {
            let conv = Conv2dConfig::new([channels, channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device);
            Self {
                conv: Some(conv),
                pool: None,
            }
        } else {
            Self {
                conv: None,
                pool: Some(AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init()),
            }
        }
    }

    /// `[batch, channels, height, width]` -> `[batch, channels, height/2, width/2]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match (&self.conv, &self.pool) {
            (Some(conv), _) => conv.forward(x),
            (None, Some(pool)) => pool.forward(x),
            (None, None) => x,
        }
    }
}

/// Upsample block: nearest neighbor interpolation, optionally followed by a convolution
#[derive(Module, Debug)]
pub struct Upsample<B: Backend> {
    /// Convolution after nearest-neighbor upsample
    pub conv: Option<Conv2d<B>>,
}

impl<B: Backend> Upsample<B> {
    /// Creates a new upsample block (2x spatial increase, channel-preserving)
    pub fn new(channels: usize, use_conv: bool, device: &B::Device) -> Self {
        let conv = use_conv.then(|| {
            Conv2dConfig::new([channels, channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        });
        Self { conv }
    }

    /// `[batch, channels, height, width]` -> `[batch, channels, height*2, width*2]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [b, c, h, w] = x.dims();

        // Nearest neighbor 2x upsample
        let x = x.reshape([b, c, h, 1, w, 1]);
        let x = x.repeat_dim(3, 2).repeat_dim(5, 2);
        let x = x.reshape([b, c, h * 2, w * 2]);

        match &self.conv {
            Some(conv) => conv.forward(x),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_timestep_embedding_closed_form() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 1>::from_floats([0.0, 5.0, 2.5], &device);
        let emb = timestep_embedding(t, 8, DEFAULT_MAX_PERIOD);
        assert_eq!(emb.dims(), [3, 8]);

        let values: Vec<f32> = emb.into_data().to_vec().unwrap();
        let timesteps = [0.0f64, 5.0, 2.5];
        for (row, &t) in timesteps.iter().enumerate() {
            for i in 0..4 {
                let freq = (-DEFAULT_MAX_PERIOD.ln() * i as f64 / 4.0).exp();
                let cos = values[row * 8 + i] as f64;
                let sin = values[row * 8 + 4 + i] as f64;
                assert!((cos - (t * freq).cos()).abs() < 1e-5);
                assert!((sin - (t * freq).sin()).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_timestep_embedding_odd_dim_pads_zero() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 1>::from_floats([3.0, 7.0], &device);
        let emb = timestep_embedding(t, 7, DEFAULT_MAX_PERIOD);
        assert_eq!(emb.dims(), [2, 7]);

        let values: Vec<f32> = emb.into_data().to_vec().unwrap();
        assert_eq!(values[6], 0.0);
        assert_eq!(values[13], 0.0);
    }

    #[test]
    fn test_timestep_embedding_is_deterministic() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 1>::from_floats([1.5, 999.0], &device);

        let a: Vec<f32> = timestep_embedding(t.clone(), 64, DEFAULT_MAX_PERIOD).into_data().to_vec().unwrap();
        let b: Vec<f32> = timestep_embedding(t, 64, DEFAULT_MAX_PERIOD).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_timestep_embedding_tiny_dim() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 1>::from_floats([4.0, 2.0], &device);
        let emb = timestep_embedding(t, 1, DEFAULT_MAX_PERIOD);
        assert_eq!(emb.dims(), [2, 1]);
    }

    #[test]
    fn test_resblock_changes_channels_only() {
        let device = Default::default();
        let block = ResBlock::<TestBackend>::new(32, 64, 128, 0.0, &device);
        assert!(block.skip_conv.is_some());

        let x = Tensor::random([2, 32, 8, 8], Distribution::Default, &device);
        let emb = Tensor::random([2, 128], Distribution::Default, &device);
        assert_eq!(block.forward(x, emb).dims(), [2, 64, 8, 8]);
    }

    #[test]
    fn test_resblock_identity_shortcut() {
        let device = Default::default();
        let block = ResBlock::<TestBackend>::new(32, 32, 16, 0.1, &device);
        assert!(block.skip_conv.is_none());

        let x = Tensor::random([1, 32, 4, 4], Distribution::Default, &device);
        let emb = Tensor::random([1, 16], Distribution::Default, &device);
        assert_eq!(block.forward(x, emb).dims(), [1, 32, 4, 4]);
    }

    #[test]
    fn test_downsample_conv_and_pool() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([2, 8, 16, 16], Distribution::Default, &device);

        let conv = Downsample::<TestBackend>::new(8, true, &device);
        assert_eq!(conv.forward(x.clone()).dims(), [2, 8, 8, 8]);

        let pool = Downsample::<TestBackend>::new(8, false, &device);
        assert_eq!(pool.forward(x).dims(), [2, 8, 8, 8]);
    }

    #[test]
    fn test_avg_pool_downsample_values() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 3.0], [5.0, 7.0]]]], &device);

        let pool = Downsample::<TestBackend>::new(1, false, &device);
        let out: Vec<f32> = pool.forward(x).into_data().to_vec().unwrap();
        assert_eq!(out, vec![4.0]);
    }

    #[test]
    fn test_upsample_nearest() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 2.0], [3.0, 4.0]]]], &device);

        let up = Upsample::<TestBackend>::new(1, false, &device);
        let out = up.forward(x);
        assert_eq!(out.dims(), [1, 1, 4, 4]);

        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert_eq!(
            values,
            vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 3.0, 3.0, 4.0, 4.0]
        );
    }

    #[test]
    fn test_upsample_with_conv() {
        let device = Default::default();
        let up = Upsample::<TestBackend>::new(16, true, &device);
        let x = Tensor::random([1, 16, 4, 4], Distribution::Default, &device);
        assert_eq!(up.forward(x).dims(), [1, 16, 8, 8]);
    }
}
