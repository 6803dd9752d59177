use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use hf_hub::api::tokio::Api;
use tracing::info;

use super::StableDiffusionVersion;

/// Weight and tokenizer files of a diffusers-layout model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub tokenizer: PathBuf,
    pub clip_weights: PathBuf,
    pub unet_weights: PathBuf,
    pub vae_weights: PathBuf,
}

impl ModelFiles {
    /// Weights always come from `model_dir`. The tokenizer is taken from
    /// `tokenizer/tokenizer.json` when present and fetched from the Hub otherwise.
    pub async fn resolve(
        model_dir: &Path,
        version: StableDiffusionVersion,
        use_f16: bool,
    ) -> Result<Self> {
        let clip_weights = weight_file(model_dir, "text_encoder", "model", use_f16)?;
        let unet_weights = weight_file(model_dir, "unet", "diffusion_pytorch_model", use_f16)?;
        let vae_weights = weight_file(model_dir, "vae", "diffusion_pytorch_model", use_f16)?;

        let tokenizer = match local_tokenizer(model_dir) {
            Some(path) => path,
            None => hub_tokenizer(version).await?,
        };

        Ok(Self {
            tokenizer,
            clip_weights,
            unet_weights,
            vae_weights,
        })
    }
}

fn weight_file(model_dir: &Path, component: &str, stem: &str, use_f16: bool) -> Result<PathBuf> {
    let dir = model_dir.join(component);
    if use_f16 {
        let half = dir.join(format!("{stem}.fp16.safetensors"));
        if half.is_file() {
            return Ok(half);
        }
    }
    let full = dir.join(format!("{stem}.safetensors"));
    if !full.is_file() {
        bail!("missing model file {}", full.display());
    }
    Ok(full)
}

fn local_tokenizer(model_dir: &Path) -> Option<PathBuf> {
    let path = model_dir.join("tokenizer").join("tokenizer.json");
    path.is_file().then_some(path)
}

async fn hub_tokenizer(version: StableDiffusionVersion) -> Result<PathBuf> {
    let repo = version.tokenizer_repo();
    info!("No local tokenizer.json, fetching it from {repo}");
    let api = Api::new().context("failed to create hf hub API")?;
    api.model(repo.to_string())
        .get("tokenizer.json")
        .await
        .with_context(|| format!("failed to get tokenizer from {repo}"))
}
