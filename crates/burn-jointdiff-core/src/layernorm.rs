//! Layer normalization
//!
//! Normalizes across the last dimension. Used on the parameter-feature side
//! of cross-modal attention, where inputs are flat feature vectors.

use burn::module::Param;
use burn::prelude::*;

/// Layer normalization module
///
/// ```text
/// y = (x - mean(x)) / sqrt(var(x) + eps) * weight + bias
/// ```
#[derive(Module, Debug)]
pub struct LayerNorm<B: Backend> {
    /// Scale parameter
    pub weight: Param<Tensor<B, 1>>,
    /// Shift parameter
    pub bias: Param<Tensor<B, 1>>,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl<B: Backend> LayerNorm<B> {
    /// Creates a new layer normalization over a last dimension of `size`
    pub fn new(size: usize, device: &B::Device) -> Self {
        Self {
            weight: Param::from_tensor(Tensor::ones([size], device)),
            bias: Param::from_tensor(Tensor::zeros([size], device)),
            eps: 1e-5,
        }
    }

    /// Applies layer normalization over the last dimension
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let last_dim = D - 1;
        let mean = x.clone().mean_dim(last_dim);
        let var = x.clone().var_bias(last_dim);

        let x_norm = (x - mean) / (var + self.eps).sqrt();

        x_norm * self.weight.val().unsqueeze() + self.bias.val().unsqueeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_layernorm_normalizes_rows() {
        let device = Default::default();
        let norm = LayerNorm::<TestBackend>::new(4, &device);
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0, 4.0], [10.0, 10.0, 10.0, 14.0]], &device);

        let out = norm.forward(x);
        assert_eq!(out.dims(), [2, 4]);

        let means: Vec<f32> = out.mean_dim(1).into_data().to_vec().unwrap();
        for m in means {
            assert!(m.abs() < 1e-5);
        }
    }
}
