//! Channel-major attention kernels
//!
//! The UNet attention blocks keep feature maps in `[batch * heads, head_dim, tokens]`
//! layout (channels before tokens). These helpers compute attention directly
//! in that layout.

use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Attention logits `[b, t, s] = sum_c q[b, c, t] * k[b, c, s]`
///
/// The `head_dim^-1/2` scale is split evenly across `q` and `k`.
pub fn attention_logits<B: Backend>(q: Tensor<B, 3>, k: Tensor<B, 3>) -> Tensor<B, 3> {
    let [_, head_dim, _] = q.dims();
    let scale = (head_dim as f64).powf(-0.25);

    let q = q * scale;
    let k = k * scale;

    q.swap_dims(1, 2).matmul(k)
}

/// Attention weights normalized along `softmax_dim` of the `[b, t, s]` logits
///
/// `softmax_dim = 2` normalizes over keys (self-attention); `softmax_dim = 1`
/// normalizes over queries, which cross-modal attention uses when there is a
/// single key per sample.
pub fn attention_weights<B: Backend>(
    q: Tensor<B, 3>,
    k: Tensor<B, 3>,
    softmax_dim: usize,
) -> Tensor<B, 3> {
    softmax(attention_logits(q, k), softmax_dim)
}

/// Applies `[b, t, s]` weights to values `[b, c, s]`, producing `[b, c, t]`
pub fn apply_attention<B: Backend>(weights: Tensor<B, 3>, v: Tensor<B, 3>) -> Tensor<B, 3> {
    v.matmul(weights.swap_dims(1, 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_attention_shapes() {
        let device = Default::default();
        let q = Tensor::<TestBackend, 3>::random([4, 8, 16], Distribution::Default, &device);
        let k = Tensor::<TestBackend, 3>::random([4, 8, 16], Distribution::Default, &device);
        let v = Tensor::<TestBackend, 3>::random([4, 8, 16], Distribution::Default, &device);

        let weights = attention_weights(q, k, 2);
        assert_eq!(weights.dims(), [4, 16, 16]);

        let out = apply_attention(weights, v);
        assert_eq!(out.dims(), [4, 8, 16]);
    }

    #[test]
    fn test_logit_scale() {
        let device = Default::default();
        // head_dim = 4 → effective scale 1/2
        let q = Tensor::<TestBackend, 3>::ones([1, 4, 1], &device);
        let k = Tensor::<TestBackend, 3>::ones([1, 4, 1], &device);

        let logits: Vec<f32> = attention_logits(q, k).into_data().to_vec().unwrap();
        assert!((logits[0] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_uniform_values_pass_through() {
        let device = Default::default();
        let q = Tensor::<TestBackend, 3>::random([2, 4, 6], Distribution::Default, &device);
        let k = Tensor::<TestBackend, 3>::random([2, 4, 6], Distribution::Default, &device);
        let v = Tensor::<TestBackend, 3>::ones([2, 4, 6], &device);

        // Rows of the weights sum to one, so constant values are preserved
        let out: Vec<f32> = apply_attention(attention_weights(q, k, 2), v)
            .into_data()
            .to_vec()
            .unwrap();
        for x in out {
            assert!((x - 1.0).abs() < 1e-5);
        }
    }
}
