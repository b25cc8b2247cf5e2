use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use qraft_client::output::{self, DEFAULT_FILE_NAME};
use qraft_client::{Generator, HeifConvert, HttpQrService, QraftConfig, QrService};
use qraft_core::{GenerationRequest, GenerationResult, ImageSource, OutputKind, UploadedImage};
use tracing_subscriber::{EnvFilter, fmt};

mod local;

use local::RuntimeQrService;

#[derive(Parser)]
#[command(name = "qraft", about = "qraft: generate artistic QR codes", version)]
struct Cli {
    /// Config file (default: ~/.config/qraft/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the QR generation service (overrides QRAFT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a QR code with the remote service
    Generate(GenerateArgs),
    /// Generate a QR code with the local Python runtime
    Local(GenerateArgs),
    /// Check whether the local Python runtime can be used
    Check {
        /// Also bootstrap the runtime (creates the environment, installs packages)
        #[arg(long)]
        load: bool,
    },
    /// Check that the remote service is up
    Health,
}

#[derive(Args)]
struct GenerateArgs {
    /// Text or URL to encode
    content: String,

    /// Background image file
    #[arg(long)]
    image: Option<PathBuf>,

    /// Background image URL (takes precedence over --image)
    #[arg(long)]
    background_url: Option<String>,

    /// Module scale in pixels
    #[arg(long)]
    scale: Option<u32>,

    /// Output format: png, jpg or gif
    #[arg(long)]
    kind: Option<String>,

    /// Save the image to this path
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_FILE_NAME)]
    out: Option<PathBuf>,

    /// Copy the image to the clipboard
    #[arg(long)]
    copy: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the result, logs go to stderr
    fmt()
        .with_env_filter(EnvFilter::from_env("QRAFT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = QraftConfig::load(cli.config.as_deref())?;
    config.apply_env();
    config.apply_api_url(cli.api_url);

    match cli.command {
        Command::Generate(args) => {
            let service = Arc::new(HttpQrService::new(config.service.base_url.clone()));
            let request = build_request(&args, config.service.scale, OutputKind::Png).await?;
            run_generate(service, request, &args).await
        }
        Command::Local(args) => {
            let service = Arc::new(RuntimeQrService::from_config(&config.runtime));
            let request = build_request(&args, config.runtime.scale, config.runtime.kind).await?;
            run_generate(service, request, &args).await
        }
        Command::Check { load } => check(&config, load).await,
        Command::Health => {
            let service = HttpQrService::new(config.service.base_url.clone());
            if service.health().await? {
                println!("ok: {}", service.base_url());
                Ok(())
            } else {
                anyhow::bail!("service at {} is not healthy", service.base_url())
            }
        }
    }
}

async fn build_request(
    args: &GenerateArgs,
    default_scale: u32,
    default_kind: OutputKind,
) -> Result<GenerationRequest> {
    let upload = match &args.image {
        Some(path) => Some(read_upload(path).await?),
        None => None,
    };
    let image = ImageSource::resolve(upload, args.background_url.as_deref());
    let kind = args
        .kind
        .as_deref()
        .map(OutputKind::parse)
        .unwrap_or(default_kind);

    Ok(GenerationRequest::new(args.content.clone())
        .with_scale(args.scale.unwrap_or(default_scale))
        .with_kind(kind)
        .with_image(image))
}

async fn read_upload(path: &Path) -> Result<UploadedImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    Ok(UploadedImage::new(file_name, None, bytes))
}

async fn run_generate(
    service: Arc<dyn QrService>,
    request: GenerationRequest,
    args: &GenerateArgs,
) -> Result<()> {
    let generator = Generator::new(service, Arc::new(HeifConvert::new()));
    let progress = std::io::stderr()
        .is_terminal()
        .then(|| tokio::spawn(render_progress(generator.progress())));

    let outcome = generator.generate(request).await;
    if let Some(task) = progress {
        task.abort();
        eprint!("\r\x1b[2K");
    }

    let result = outcome.map_err(|e| anyhow::anyhow!("Error generating image: {e}"))?;
    deliver(&result, args).await;
    Ok(())
}

async fn render_progress(mut progress: tokio::sync::watch::Receiver<f32>) {
    while progress.changed().await.is_ok() {
        let value = *progress.borrow_and_update();
        eprint!("\rGenerating... {value:>5.1}%");
    }
}

/// Save and/or copy the result. Either failing falls back to printing the URL.
async fn deliver(result: &GenerationResult, args: &GenerateArgs) {
    let http = reqwest::Client::new();
    let mut print_url = args.out.is_none() && !args.copy;

    if let Some(path) = &args.out {
        match output::download(&http, &result.url, path).await {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                tracing::warn!("Download failed: {e}");
                eprintln!("Download failed, open the image URL instead");
                print_url = true;
            }
        }
    }

    if args.copy {
        let copied = match output::fetch_image(&http, &result.url).await {
            Ok(bytes) => output::copy_to_clipboard(&bytes),
            Err(e) => Err(e),
        };
        match copied {
            Ok(()) => eprintln!("Copied to clipboard"),
            Err(e) => {
                tracing::warn!("Copy failed: {e}");
                eprintln!("Copy failed, open the image URL instead");
                print_url = true;
            }
        }
    }

    if print_url {
        println!("{}", result.url);
    }
    if let Some(description) = &result.description {
        tracing::info!(%description, "Result");
    }
}

async fn check(config: &QraftConfig, load: bool) -> Result<()> {
    let service = RuntimeQrService::from_config(&config.runtime);
    let state = service.state();

    if !state.is_supported() {
        anyhow::bail!(
            "Python interpreter '{}' not found; local generation is unavailable",
            config.runtime.python
        );
    }
    println!("supported: {}", config.runtime.python);

    if load {
        state.load().await?;
        println!("ready");
    }
    Ok(())
}
