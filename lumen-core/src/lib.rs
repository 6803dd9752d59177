#[cfg(feature = "accelerate")]
extern crate accelerate_src;
#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

pub mod device_map;
pub mod error;
pub mod loader;
mod loader_factory;
pub mod logging;
pub mod mock;
pub mod service;
pub mod store;
mod util;

mod stable_diffusion;

pub use device_map::*;
pub use error::{FailureKind, GenerateError};
use image::DynamicImage;
pub use loader::*;
pub use loader_factory::*;
use serde::{Deserialize, Serialize};
pub use service::ImageService;
pub use stable_diffusion::{StableDiffusionLoader, StableDiffusionModel, StableDiffusionVersion};
pub use store::{ImageStore, SavedImage};
pub(crate) use util::*;

/// Local diffusers-layout model directory used when nothing else is configured.
pub const DEFAULT_MODEL_DIR: &str = "./stable-diffusion-v1-4";
/// Directory generated images are written to, relative to the serving root.
pub const DEFAULT_OUTPUT_DIR: &str = "./uploads/theme_images";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub steps: usize,
}

/// A loaded pipeline: text prompt in, image out.
pub trait ModelLike: Send {
    fn run(&mut self, request: GenerationRequest) -> anyhow::Result<DynamicImage>;
}
