use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use lumen_core::{load_model, DeviceMap, ImageService, ImageStore};
use tokio::net::TcpListener;
use tracing::{error, info};

mod routes;

use routes::{create_app, AppState};

// Define command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Lumen image generation server")]
struct Args {
    /// Use CPU instead of GPU
    #[arg(long, env = "LUMEN_CPU")]
    cpu: bool,

    /// Local model directory in diffusers layout
    #[arg(long, env = "LUMEN_MODEL_DIR", default_value = lumen_core::DEFAULT_MODEL_DIR)]
    model_dir: PathBuf,

    /// Directory generated images are written to and served from
    #[arg(long, env = "LUMEN_OUTPUT_DIR", default_value = lumen_core::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Inference steps used for every request
    #[arg(long, env = "LUMEN_STEPS", default_value_t = 25)]
    steps: usize,

    /// Host address to bind the server to
    #[arg(long, env = "LUMEN_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the server to
    #[arg(long, env = "LUMEN_PORT", default_value_t = 5002)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    lumen_core::logging::init("lumen_core=info,lumen_server=info,tower_http=info");

    let args = Args::parse();

    let store = ImageStore::new(&args.output_dir);
    if let Err(e) = routes::check_public_dir(&store.public_dir()) {
        error!("Invalid output directory: {e:#}");
        std::process::exit(1);
    }

    // --- Load the model once at startup ---
    let model = match load_model(&args.model_dir, DeviceMap::from_cpu_flag(args.cpu)).await {
        Ok(model) => model,
        Err(e) => {
            error!("Error loading model: {e:#}");
            std::process::exit(1);
        }
    };

    let service = ImageService::new(model, store, args.steps);
    info!(
        "Serving {} with {} inference steps per request",
        service.store().public_dir(),
        service.steps()
    );
    let app = create_app(AppState(Arc::new(service)))?;

    // --- Start the server ---
    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("Started server on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
