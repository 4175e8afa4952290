use crate::{
    format_bytes, format_duration, parse_region, validate_url, CaptureError, CaptureMode,
    CaptureOrchestrator, CaptureOutput, CaptureRequest, ChromeSession, Config, Region,
    ScrollPositionProvider, ViewportSizer,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(name = "page-capture")]
#[command(about = "Full-page screenshots by scrolling and stitching")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a single page
    Capture {
        #[arg(short, long, help = "URL to capture")]
        url: String,

        #[arg(short, long, help = "Output PNG path")]
        output: PathBuf,

        #[arg(long, help = "Viewport width")]
        width: Option<u32>,

        #[arg(long, help = "Viewport height")]
        height: Option<u32>,

        #[arg(long, help = "Capture the whole scrollable page")]
        full_page: bool,

        #[arg(long, value_parser = parse_region, help = "Capture a page region given as x,y,width,height")]
        selector_region: Option<Region>,

        #[arg(
            long,
            num_args = 0..=1,
            default_missing_value = "true",
            help = "Hide scrollbars while capturing (true/false), overriding the configuration"
        )]
        hide_scrollbars: Option<bool>,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub url: String,
    pub output: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub full_page: bool,
    pub region: Option<Region>,
    pub hide_scrollbars: Option<bool>,
}

impl CaptureOptions {
    pub fn request(&self, config: &Config) -> CaptureRequest {
        let mode = match (self.region, self.full_page) {
            (Some(region), _) => CaptureMode::Region(region),
            (None, true) => CaptureMode::FullPage,
            (None, false) => CaptureMode::Viewport,
        };
        CaptureRequest {
            mode,
            hide_scrollbars: self
                .hide_scrollbars
                .unwrap_or(config.capture.hide_scrollbars),
        }
    }
}

pub struct CliRunner {
    pub config: Config,
    pub cancel: CancellationToken,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn run(&self, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
        match command {
            Commands::Capture {
                url,
                output,
                width,
                height,
                full_page,
                selector_region,
                hide_scrollbars,
            } => {
                self.run_capture(CaptureOptions {
                    url,
                    output,
                    width,
                    height,
                    full_page,
                    region: selector_region,
                    hide_scrollbars,
                })
                .await
            }
            Commands::Validate { config } => self.validate_config(config).await,
        }
    }

    pub async fn run_capture(&self, options: CaptureOptions) -> Result<(), Box<dyn std::error::Error>> {
        let started = Instant::now();
        let url = validate_url(&options.url)?;
        let config = self.effective_config(&options);
        config.validate()?;
        info!("Capturing {}", url);

        let session = ChromeSession::launch(&config).await?;
        let result = self.capture_page(&session, &config, &url, &options).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close browser: {}", e);
        }
        let output = result?;

        let bytes = output.image.to_bytes()?;
        if let Some(parent) = options.output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&options.output, &bytes).await?;
        info!("Capture saved to: {}", options.output.display());

        let size = output.image.size()?;
        println!("Page captured successfully:");
        println!("  URL: {url}");
        println!("  Output: {}", options.output.display());
        println!("  Image: {size} ({})", format_bytes(bytes.len()));
        println!("  Page: {}", output.page_size);
        println!("  Tiles: {}", output.tiles);
        if !output.scroll_mismatches.is_empty() {
            println!("  Scroll mismatches: {}", output.scroll_mismatches.len());
        }
        println!("  Duration: {}", format_duration(started.elapsed()));

        Ok(())
    }

    async fn capture_page(
        &self,
        session: &ChromeSession,
        config: &Config,
        url: &Url,
        options: &CaptureOptions,
    ) -> Result<CaptureOutput, CaptureError> {
        let driver = session.open(url).await?;

        match ViewportSizer::new(&driver, config.sizer.clone())
            .set_viewport_size(config.viewport.size())
            .await
        {
            Ok(report) => info!(
                "Viewport set to {} after {} resize request(s)",
                config.viewport.size(),
                report.resize_requests
            ),
            Err(e) if e.is_recoverable() => warn!("Continuing with current viewport: {}", e),
            Err(e) => return Err(e),
        }

        let position = ScrollPositionProvider::new(&driver);
        CaptureOrchestrator::new(&driver, &position)
            .with_settings(config.capture.clone())
            .with_image_options(config.image)
            .with_cut_provider(&config.cut)
            .with_scale_method(config.scale)
            .with_cancellation(self.cancel.clone())
            .capture(&options.request(config))
            .await
    }

    fn effective_config(&self, options: &CaptureOptions) -> Config {
        let mut config = self.config.clone();
        if let Some(width) = options.width {
            config.viewport.width = width;
        }
        if let Some(height) = options.height {
            config.viewport.height = height;
        }
        config
    }

    pub async fn validate_config(
        &self,
        config_path: PathBuf,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("Validating configuration: {}", config_path.display());

        let config_content = fs::read_to_string(&config_path).await?;
        let config: Config = serde_json::from_str(&config_content)?;
        config.validate()?;

        println!("Configuration is valid:");
        println!("  Viewport: {}", config.viewport.size());
        println!("  Scale: {:?}", config.scale);
        println!("  Hide scrollbars: {}", config.capture.hide_scrollbars);
        println!("  Settle delay: {:?}", config.sizer.settle_delay);
        println!("  Decoding enabled: {}", config.image.decoding_enabled);

        Ok(())
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    Ok(())
}
