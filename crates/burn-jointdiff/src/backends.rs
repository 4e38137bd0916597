//! Backend selection
//!
//! Enable a backend via feature flags:
//!
//! - `ndarray`: CPU backend using ndarray (default)
//! - `tch`: PyTorch backend via libtorch (CUDA, MPS)
//! - `wgpu`: WebGPU backend (cross-platform GPU)
//! - `cuda`: Native CUDA backend (NVIDIA only)
//!
//! Training needs gradients; wrap any backend in [`Autodiff`].
//!
//! ```ignore
//! use burn_jointdiff::backends::{Autodiff, DefaultBackend, default_device};
//! use burn_jointdiff::JointUNetConfig;
//!
//! let device = default_device();
//! let unet = JointUNetConfig::default().init::<Autodiff<DefaultBackend>>(&device)?;
//! ```

pub use burn_autodiff::Autodiff;

#[cfg(feature = "ndarray")]
pub use burn_ndarray::{NdArray, NdArrayDevice};

#[cfg(feature = "tch")]
pub use burn_tch::{LibTorch, LibTorchDevice};

#[cfg(feature = "wgpu")]
pub use burn_wgpu::{Wgpu, WgpuDevice};

#[cfg(feature = "cuda")]
pub use burn_cuda::{Cuda, CudaDevice};

/// Default backend when the ndarray feature is enabled
#[cfg(feature = "ndarray")]
pub type DefaultBackend = NdArray<f32>;

/// Default backend when the tch feature is enabled
#[cfg(all(feature = "tch", not(feature = "ndarray")))]
pub type DefaultBackend = LibTorch<f32>;

/// Default backend when the wgpu feature is enabled
#[cfg(all(feature = "wgpu", not(any(feature = "ndarray", feature = "tch"))))]
pub type DefaultBackend = Wgpu;

/// Default backend when the cuda feature is enabled
#[cfg(all(
    feature = "cuda",
    not(any(feature = "ndarray", feature = "tch", feature = "wgpu"))
))]
pub type DefaultBackend = Cuda;

/// Default device for the enabled backend
#[cfg(feature = "ndarray")]
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

/// Default device for the enabled backend, preferring CUDA when libtorch sees one
#[cfg(all(feature = "tch", not(feature = "ndarray")))]
pub fn default_device() -> LibTorchDevice {
    if burn_tch::is_cuda_available() {
        LibTorchDevice::Cuda(0)
    } else {
        LibTorchDevice::Cpu
    }
}

/// Default device for the enabled backend
#[cfg(all(feature = "wgpu", not(any(feature = "ndarray", feature = "tch"))))]
pub fn default_device() -> WgpuDevice {
    WgpuDevice::default()
}

/// Default device for the enabled backend
#[cfg(all(
    feature = "cuda",
    not(any(feature = "ndarray", feature = "tch", feature = "wgpu"))
))]
pub fn default_device() -> CudaDevice {
    CudaDevice::default()
}

#[cfg(all(test, feature = "ndarray"))]
mod tests {
    use super::*;
    use burn_jointdiff_unet::JointUNetConfig;

    #[test]
    fn test_default_backend_builds_tiny_model() {
        let device = default_device();
        let model = JointUNetConfig::tiny().init::<DefaultBackend>(&device).unwrap();
        assert_eq!(model.layout().spatial_divisor(), 2);
    }
}
