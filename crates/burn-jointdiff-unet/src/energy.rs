//! Energy model: property predictor on the UNet encoder
//!
//! Runs the same conditioning, encoder and bottleneck as [`crate::JointUNet`]
//! and predicts a property vector from the pooled bottleneck features. Used
//! as the energy function for guided sampling.

use burn::module::Ignored;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use burn_jointdiff_core::silu::silu;

use crate::backbone::UNetBackbone;
use crate::config::EnergyUNetConfig;
use crate::error::{ConfigError, ForwardError};
use crate::layout::UNetLayout;
use crate::unet::check_inputs;

/// Half-UNet property predictor
#[derive(Module, Debug)]
pub struct EnergyUNet<B: Backend> {
    /// Conditioning, encoder and bottleneck
    pub backbone: UNetBackbone<B>,
    /// Property head hidden layer
    pub prop_fc1: Linear<B>,
    /// Property head output layer
    pub prop_fc2: Linear<B>,
    /// Planned architecture
    pub layout: Ignored<UNetLayout>,
}

impl EnergyUNetConfig {
    /// Plans and initializes the energy model
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<EnergyUNet<B>, ConfigError> {
        EnergyUNet::new(self, device)
    }
}

impl<B: Backend> EnergyUNet<B> {
    /// Creates a new energy model
    pub fn new(config: &EnergyUNetConfig, device: &B::Device) -> Result<Self, ConfigError> {
        config.validate()?;
        let layout = UNetLayout::plan(&config.unet)?;
        tracing::debug!(
            encoder_stages = layout.encoder.len(),
            bottleneck_channels = layout.bottleneck_channels(),
            num_downsamples = layout.num_downsamples,
            "planned energy UNet layout"
        );

        let backbone = UNetBackbone::new(&config.unet, &layout, device)?;
        let ch = layout.bottleneck_channels();

        let model = Self {
            backbone,
            prop_fc1: LinearConfig::new(ch, config.prop_hidden_dim).init(device),
            prop_fc2: LinearConfig::new(config.prop_hidden_dim, config.prop_dim).init(device),
            layout: Ignored(layout),
        };
        tracing::info!(num_params = model.num_params(), "initialized energy UNet");

        Ok(model)
    }

    /// Planned architecture this model was built from
    pub fn layout(&self) -> &UNetLayout {
        &self.layout.0
    }

    /// Forward pass
    ///
    /// `_prop` mirrors the joint trainer's batch layout and is not consumed;
    /// the head only needs the bottleneck features.
    ///
    /// # Returns
    /// Predicted property `[batch, prop_dim]`
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        params: Tensor<B, 2>,
        _prop: Tensor<B, 2>,
        timesteps: Tensor<B, 1>,
    ) -> Tensor<B, 2> {
        self.predict(x, params, timesteps)
    }

    /// Predicts the property without the unused `prop` argument
    pub fn predict(&self, x: Tensor<B, 4>, params: Tensor<B, 2>, timesteps: Tensor<B, 1>) -> Tensor<B, 2> {
        // Skips are only needed by a decoder
        let hidden = self.backbone.forward(x, params, timesteps).hidden;
        let [b, c, _, _] = hidden.dims();

        // Global average pool, then flatten
        let pooled = hidden.mean_dim(3).mean_dim(2).reshape([b, c]);

        let h = silu(self.prop_fc1.forward(pooled));
        self.prop_fc2.forward(h)
    }

    /// [`Self::predict`] with input shape validation
    pub fn try_predict(
        &self,
        x: Tensor<B, 4>,
        params: Tensor<B, 2>,
        timesteps: Tensor<B, 1>,
    ) -> Result<Tensor<B, 2>, ForwardError> {
        check_inputs(&self.layout.0, x.dims(), params.dims(), timesteps.dims())?;
        Ok(self.predict(x, params, timesteps))
    }
}
