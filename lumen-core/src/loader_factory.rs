use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::{DeviceMap, Loader, ModelLike, StableDiffusionLoader, StableDiffusionVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    StableDiffusion(StableDiffusionVersion),
}

impl ModelVariant {
    /// Detect model variant from the model directory name
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        if name_upper.contains("XL") || name_upper.contains("TURBO") {
            None
        } else if name_upper.contains("2-1") || name_upper.contains("2.1") {
            Some(ModelVariant::StableDiffusion(StableDiffusionVersion::V2_1))
        } else {
            // v1.4 and v1.5 share an architecture
            Some(ModelVariant::StableDiffusion(StableDiffusionVersion::V1_5))
        }
    }
}

/// Load the model stored in `model_dir`, picking the loader from its name.
pub async fn load_model(model_dir: &Path, device_map: DeviceMap) -> Result<Box<dyn ModelLike>> {
    if !model_dir.is_dir() {
        return Err(anyhow!(
            "model directory {} does not exist",
            model_dir.display()
        ));
    }
    let canonical = model_dir
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", model_dir.display()))?;
    let model_name = canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let model_variant = ModelVariant::from_name(&model_name)
        .ok_or_else(|| anyhow!("Unsupported model variant: {}", model_name))?;

    info!(
        "Loading model: {} (detected variant: {:?}) from {}",
        model_name,
        model_variant,
        model_dir.display()
    );

    match model_variant {
        ModelVariant::StableDiffusion(_) => {
            let model = StableDiffusionLoader::load(model_variant, model_dir, device_map).await?;
            Ok(Box::new(model))
        }
    }
}
