//! Group normalization
//!
//! Channel-grouped normalization shared by every convolutional block of the
//! joint UNet. Channels are split into `num_groups` groups and each group is
//! normalized over its channels and all spatial positions.

use burn::module::Param;
use burn::prelude::*;

/// Number of groups used by every normalization layer in the UNet
pub const NORM_GROUPS: usize = 32;

/// Group normalization module
///
/// # Formula
///
/// For input with C channels divided into G groups:
/// ```text
/// y = (x - mean(x_group)) / sqrt(var(x_group) + eps) * weight + bias
/// ```
#[derive(Module, Debug)]
pub struct GroupNorm<B: Backend> {
    /// Number of groups to divide channels into
    pub num_groups: usize,
    /// Scale parameter (gamma), shape [num_channels]
    pub weight: Param<Tensor<B, 1>>,
    /// Bias parameter (beta), shape [num_channels]
    pub bias: Param<Tensor<B, 1>>,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl<B: Backend> GroupNorm<B> {
    /// Creates a new group normalization module
    ///
    /// `num_channels` must be divisible by `num_groups`; callers validate this
    /// at configuration time.
    pub fn new(num_groups: usize, num_channels: usize, device: &B::Device) -> Self {
        Self {
            num_groups,
            weight: Param::from_tensor(Tensor::ones([num_channels], device)),
            bias: Param::from_tensor(Tensor::zeros([num_channels], device)),
            eps: 1e-5,
        }
    }

    /// Number of channels this layer normalizes
    pub fn num_channels(&self) -> usize {
        self.weight.val().dims()[0]
    }

    /// Applies group normalization to a `[batch, channels, height, width]` tensor
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let group_size = channels / self.num_groups;

        // [batch, groups, group_size * h * w]
        let x = x.reshape([batch, self.num_groups, group_size * height * width]);

        let mean = x.clone().mean_dim(2);
        let centered = x - mean;
        // Biased variance, as in the usual GroupNorm definition
        let var = (centered.clone() * centered.clone()).mean_dim(2);

        let x = centered / (var + self.eps).sqrt();
        let x = x.reshape([batch, channels, height, width]);

        let weight = self.weight.val().reshape([1, channels, 1, 1]);
        let bias = self.bias.val().reshape([1, channels, 1, 1]);

        x * weight + bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_groupnorm_shape() {
        let device = Default::default();
        let norm = GroupNorm::<TestBackend>::new(NORM_GROUPS, 64, &device);
        let x = Tensor::<TestBackend, 4>::random([2, 64, 4, 4], Distribution::Default, &device);

        assert_eq!(norm.forward(x).dims(), [2, 64, 4, 4]);
        assert_eq!(norm.num_channels(), 64);
    }

    #[test]
    fn test_groupnorm_zero_mean_per_group() {
        let device = Default::default();
        let norm = GroupNorm::<TestBackend>::new(2, 4, &device);
        let x = Tensor::<TestBackend, 4>::random([1, 4, 3, 3], Distribution::Normal(3.0, 2.0), &device);

        let out = norm.forward(x).reshape([1, 2, 18]);
        let means: Vec<f32> = out.clone().mean_dim(2).into_data().to_vec().unwrap();
        for m in means {
            assert!(m.abs() < 1e-4, "group mean {m} not centered");
        }

        let vars: Vec<f32> = out.var_bias(2).into_data().to_vec().unwrap();
        for v in vars {
            assert!((v - 1.0).abs() < 1e-2, "group variance {v} not unit");
        }
    }
}
