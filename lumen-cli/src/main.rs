use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser};
use lumen_core::{load_model, DeviceMap, GenerateError, ImageService, ImageStore};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "lumen-generate")]
#[command(author, version, about = "Generate one image from a prompt and print its path")]
struct Args {
    /// Text prompt to render
    #[arg(value_name = "PROMPT", allow_hyphen_values = true)]
    prompt: Option<String>,

    /// Use CPU instead of GPU
    #[arg(long, env = "LUMEN_CPU")]
    cpu: bool,

    /// Local model directory in diffusers layout
    #[arg(long, env = "LUMEN_MODEL_DIR", default_value = lumen_core::DEFAULT_MODEL_DIR)]
    model_dir: PathBuf,

    /// Directory the image is written to
    #[arg(long, env = "LUMEN_OUTPUT_DIR", default_value = lumen_core::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Number of inference steps
    #[arg(long, env = "LUMEN_STEPS", default_value_t = 50)]
    steps: usize,
}

/// Usage errors exit with 1 like every other failure; help and version exit with 0.
fn parse_args() -> Result<Args, ExitCode> {
    Args::try_parse().map_err(|e| {
        let _ = e.print();
        match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    })
}

fn require_prompt(prompt: Option<String>) -> Result<String, GenerateError> {
    match prompt {
        Some(prompt) if !prompt.is_empty() => Ok(prompt),
        _ => Err(GenerateError::EmptyPrompt),
    }
}

/// Loads the model, renders `prompt` and returns the public path of the PNG.
async fn generate(args: &Args, prompt: &str) -> Result<String> {
    let model = load_model(&args.model_dir, DeviceMap::from_cpu_flag(args.cpu))
        .await
        .context("Error loading model")?;
    let service = ImageService::new(model, ImageStore::new(&args.output_dir), args.steps);
    let saved = service
        .generate(prompt)
        .context("Error generating image")?;
    Ok(saved.public_path)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    lumen_core::logging::init("lumen_core=info,lumen_generate=info");

    let mut args = match parse_args() {
        Ok(args) => args,
        Err(code) => return code,
    };

    let prompt = match require_prompt(args.prompt.take()) {
        Ok(prompt) => prompt,
        Err(_) => {
            error!("Error: No prompt provided.");
            return ExitCode::FAILURE;
        }
    };

    match generate(&args, &prompt).await {
        Ok(path) => {
            // stdout carries only the path, for the calling process to read
            println!("{path}");
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
