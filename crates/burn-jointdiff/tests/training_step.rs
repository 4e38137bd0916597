//! Gradient flow through both models on the autodiff CPU backend.

#![cfg(feature = "ndarray")]

use burn::prelude::*;
use burn::tensor::Distribution;
use burn_jointdiff::backends::{default_device, Autodiff, DefaultBackend};
use burn_jointdiff::{EnergyUNetConfig, JointUNetConfig};

type TrainBackend = Autodiff<DefaultBackend>;

#[test]
fn test_joint_loss_reaches_both_heads() {
    let device = default_device();
    let model = JointUNetConfig::tiny().init::<TrainBackend>(&device).unwrap();

    let x = Tensor::random([2, 1, 8, 8], Distribution::Normal(0.0, 1.0), &device);
    let params = Tensor::random([2, 4], Distribution::Normal(0.0, 1.0), &device);
    let t = Tensor::from_floats([0.0, 5.0], &device);

    let out = model.forward(x, params, t);
    let loss = out.image.powf_scalar(2.0).mean() + out.params.powf_scalar(2.0).mean();
    let grads = loss.backward();

    assert!(model.conv_out.weight.val().grad(&grads).is_some());
    assert!(model.param_out.weight.val().grad(&grads).is_some());
    assert!(model
        .backbone
        .param_encoder
        .input_proj
        .weight
        .val()
        .grad(&grads)
        .is_some());
}

#[test]
fn test_energy_loss_reaches_encoder() {
    let device = default_device();
    let model = EnergyUNetConfig::tiny().init::<TrainBackend>(&device).unwrap();

    let x = Tensor::random([2, 1, 8, 8], Distribution::Normal(0.0, 1.0), &device);
    let params = Tensor::random([2, 4], Distribution::Normal(0.0, 1.0), &device);
    let target = Tensor::<TrainBackend, 2>::ones([2, 1], &device);
    let t = Tensor::from_floats([3.0, 9.0], &device);

    let pred = model.forward(x, params, target.clone(), t);
    let loss = (pred - target).powf_scalar(2.0).mean();
    let grads = loss.backward();

    assert!(model.prop_fc2.weight.val().grad(&grads).is_some());
    assert!(model.backbone.time_embed_0.weight.val().grad(&grads).is_some());
}
