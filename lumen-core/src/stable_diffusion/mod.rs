use std::path::Path;

use anyhow::{anyhow, Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use image::DynamicImage;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

mod files;

use files::ModelFiles;

use crate::{
    select_best_device, select_dtype, tensor_to_image, DeviceMap, GenerationRequest, Loader,
    ModelLike, ModelVariant,
};

const GUIDANCE_SCALE: f64 = 7.5;
const VAE_SCALE: f64 = 0.18215;
const LATENT_CHANNELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StableDiffusionVersion {
    V1_5,
    V2_1,
}

impl StableDiffusionVersion {
    pub fn config(&self) -> StableDiffusionConfig {
        match self {
            Self::V1_5 => StableDiffusionConfig::v1_5(None, None, None),
            Self::V2_1 => StableDiffusionConfig::v2_1(None, None, None),
        }
    }

    /// Repository the tokenizer is fetched from when the model directory lacks one.
    pub fn tokenizer_repo(&self) -> &'static str {
        match self {
            Self::V1_5 => "openai/clip-vit-base-patch32",
            Self::V2_1 => "laion/CLIP-ViT-H-14-laion2B-s32B-b79K",
        }
    }
}

pub struct StableDiffusionModel {
    device: Device,
    dtype: DType,
    config: StableDiffusionConfig,
    tokenizer: Tokenizer,
    pad_id: u32,
    clip_model: ClipTextTransformer,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
}

impl StableDiffusionModel {
    fn encode_prompt(&self, prompt: &str) -> Result<Tensor> {
        let max_len = self.config.clip.max_position_embeddings;
        let tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        if tokens.len() > max_len {
            warn!(
                "prompt has {} tokens, truncating to {max_len}",
                tokens.len()
            );
        }
        let tokens = fit_tokens(tokens, max_len, self.pad_id);
        let tokens = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        Ok(self.clip_model.forward(&tokens)?)
    }

    /// Unconditional and prompt embeddings stacked for classifier-free guidance.
    fn text_embeddings(&self, prompt: &str) -> Result<Tensor> {
        let cond = self.encode_prompt(prompt)?;
        let uncond = self.encode_prompt("")?;
        Ok(Tensor::cat(&[uncond, cond], 0)?.to_dtype(self.dtype)?)
    }
}

impl ModelLike for StableDiffusionModel {
    fn run(&mut self, request: GenerationRequest) -> Result<DynamicImage> {
        let text_embeddings = self
            .text_embeddings(&request.prompt)
            .context("failed to encode prompt")?;

        let mut scheduler = self.config.build_scheduler(request.steps)?;
        let timesteps = scheduler.timesteps().to_vec();

        let (height, width) = (self.config.height, self.config.width);
        let latents = Tensor::randn(
            0f32,
            1f32,
            (1, LATENT_CHANNELS, height / 8, width / 8),
            &self.device,
        )?;
        let mut latents = (latents * scheduler.init_noise_sigma())?.to_dtype(self.dtype)?;

        for (index, &timestep) in timesteps.iter().enumerate() {
            let latent_model_input = Tensor::cat(&[&latents, &latents], 0)?;
            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep)?;
            let noise_pred =
                self.unet
                    .forward(&latent_model_input, timestep as f64, &text_embeddings)?;

            let noise_pred = noise_pred.chunk(2, 0)?;
            let (noise_pred_uncond, noise_pred_text) = (&noise_pred[0], &noise_pred[1]);
            let noise_pred = (noise_pred_uncond
                + ((noise_pred_text - noise_pred_uncond)? * GUIDANCE_SCALE)?)?;

            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            debug!("step {}/{} done", index + 1, timesteps.len());
        }

        let decoded = self.vae.decode(&(&latents / VAE_SCALE)?)?;
        debug!("Decoded image");

        // [-1, 1] -> [0, 255]
        let img = ((decoded / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let img = (img.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?.i(0)?;

        tensor_to_image(&img)
    }
}

/// Pads to `max_len` with `pad_id`, or cuts down to `max_len` keeping the final
/// end-of-text token.
fn fit_tokens(mut tokens: Vec<u32>, max_len: usize, pad_id: u32) -> Vec<u32> {
    if tokens.len() > max_len {
        let last = tokens[tokens.len() - 1];
        tokens.truncate(max_len - 1);
        tokens.push(last);
    } else {
        tokens.resize(max_len, pad_id);
    }
    tokens
}

pub struct StableDiffusionLoader;

impl Loader for StableDiffusionLoader {
    type Model = StableDiffusionModel;

    async fn load(
        variant: ModelVariant,
        model_dir: &Path,
        device_map: DeviceMap,
    ) -> Result<Self::Model> {
        let ModelVariant::StableDiffusion(version) = variant;

        // Configure device.
        let device = select_best_device(device_map).context("failed to set up device")?;
        let dtype = select_dtype(&device);

        let files = ModelFiles::resolve(model_dir, version, dtype == DType::F16).await?;
        let config = version.config();

        // --- Tokenizer ---
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(Error::msg)
            .context("failed to load tokenizer")?;
        let pad_token = config.clip.pad_with.as_deref().unwrap_or("<|endoftext|>");
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(pad_token)
            .ok_or_else(|| anyhow!("tokenizer has no {pad_token} token"))?;

        // --- CLIP text encoder, kept in full precision ---
        let clip_model = stable_diffusion::build_clip_transformer(
            &config.clip,
            &files.clip_weights,
            &device,
            DType::F32,
        )
        .context("failed to load CLIP text encoder")?;

        // --- UNet ---
        let unet = config
            .build_unet(
                &files.unet_weights,
                &device,
                LATENT_CHANNELS,
                cfg!(feature = "flash-attn"),
                dtype,
            )
            .context("failed to load UNet")?;

        // --- Autoencoder ---
        let vae = config
            .build_vae(&files.vae_weights, &device, dtype)
            .context("failed to load VAE")?;

        if device.is_cpu() {
            info!("Model loaded successfully on CPU ({dtype:?}).");
        } else {
            info!("Model loaded successfully on GPU ({dtype:?}).");
        }

        Ok(StableDiffusionModel {
            device,
            dtype,
            config,
            tokenizer,
            pad_id,
            clip_model,
            unet,
            vae,
        })
    }
}
