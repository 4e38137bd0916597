//! Parameter encoder
//!
//! Embeds the raw parameter vector into the feature vector read by every
//! cross-modal attention block.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use burn_jointdiff_core::silu::silu;

/// Residual MLP layers applied after the input projection
pub const PARAM_ENCODER_DEPTH: usize = 2;

/// `x + fc2(silu(fc1(x)))`
#[derive(Module, Debug)]
pub struct ResidualMlp<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> ResidualMlp<B> {
    pub fn new(dim: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(dim, dim).init(device),
            fc2: LinearConfig::new(dim, dim).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.fc2.forward(silu(self.fc1.forward(x.clone()))) + x
    }
}

/// Time-conditioned MLP encoder for the parameter vector
#[derive(Module, Debug)]
pub struct ParameterEncoder<B: Backend> {
    /// Time embedding first linear layer
    pub time_embed_0: Linear<B>,
    /// Time embedding second linear layer
    pub time_embed_2: Linear<B>,
    /// Parameter input projection
    pub input_proj: Linear<B>,
    /// Residual MLP layers
    pub layers: Vec<ResidualMlp<B>>,
    /// Output projection
    pub out_proj: Linear<B>,
}

impl<B: Backend> ParameterEncoder<B> {
    /// Creates a parameter encoder
    ///
    /// # Arguments
    ///
    /// * `param_dim` - Width of the raw parameter vector
    /// * `hidden_dim` - Hidden width
    /// * `out_dim` - Width of the produced parameter features
    /// * `time_dim` - Width of the time embedding
    /// * `device` - Device to create tensors on
    pub fn new(
        param_dim: usize,
        hidden_dim: usize,
        out_dim: usize,
        time_dim: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            time_embed_0: LinearConfig::new(time_dim, hidden_dim).init(device),
            time_embed_2: LinearConfig::new(hidden_dim, hidden_dim).init(device),
            input_proj: LinearConfig::new(param_dim, hidden_dim).init(device),
            layers: (0..PARAM_ENCODER_DEPTH)
                .map(|_| ResidualMlp::new(hidden_dim, device))
                .collect(),
            out_proj: LinearConfig::new(hidden_dim, out_dim).init(device),
        }
    }

    /// `[batch, param_dim]` + `[batch, time_dim]` -> `[batch, out_dim]`
    pub fn forward(&self, params: Tensor<B, 2>, time_emb: Tensor<B, 2>) -> Tensor<B, 2> {
        let t = self.time_embed_0.forward(time_emb);
        let t = self.time_embed_2.forward(silu(t));

        let mut h = self.input_proj.forward(params) + t;
        for layer in &self.layers {
            h = layer.forward(h);
        }

        self.out_proj.forward(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_param_encoder_shape() {
        let device = Default::default();
        let encoder = ParameterEncoder::<TestBackend>::new(8, 32, 24, 128, &device);
        assert_eq!(encoder.layers.len(), PARAM_ENCODER_DEPTH);

        let params = Tensor::random([5, 8], Distribution::Default, &device);
        let time_emb = Tensor::random([5, 128], Distribution::Default, &device);
        assert_eq!(encoder.forward(params, time_emb).dims(), [5, 24]);
    }

    #[test]
    fn test_time_embedding_changes_features() {
        let device = Default::default();
        let encoder = ParameterEncoder::<TestBackend>::new(4, 16, 16, 32, &device);

        let params = Tensor::<TestBackend, 2>::random([1, 4], Distribution::Default, &device);
        let t0 = Tensor::<TestBackend, 2>::zeros([1, 32], &device);
        let t1 = Tensor::<TestBackend, 2>::ones([1, 32], &device);

        let a: Vec<f32> = encoder.forward(params.clone(), t0).into_data().to_vec().unwrap();
        let b: Vec<f32> = encoder.forward(params, t1).into_data().to_vec().unwrap();
        assert_ne!(a, b);
    }
}
