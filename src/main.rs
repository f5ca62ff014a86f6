//! # Mediakit - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento e validazione della configurazione
//! - Gestione di Ctrl-C tramite il canale di cancellazione del `Processor`
//!
//! ## Comandi:
//! - `analyze`: stampa un report JSON per ogni file
//! - `convert`: converte un file (o stdin con `-`) in immagine, audio, video o estrae un frame
//! - `capture`: screenshot PNG di un URL
//! - `tools`: report di disponibilità dei binari esterni
//! - `init-config`: scrive la configurazione di default su file
//!
//! ## Esempio di utilizzo:
//! ```bash
//! mediakit convert clip.mov clip.mp4 --mode video --max-width 1280 --verbose
//! mediakit convert clip.mov thumb.jpg --mode extract --position 0.25
//! mediakit analyze *.mp3 --workers 8
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use mediakit::analyze::analyze_file;
use mediakit::progress::{format_size, ProgressManager};
use mediakit::{
    cancellation_channel, keep_size, max_height, max_size, max_width, Config, MediaReport, Preset,
    Processor, ScreenshotOptions, Size, Sizer, ToolPathResolver, ToolPaths, Transcoder, Vips, VipsPreset,
    WarningsSink,
};

#[derive(Parser)]
#[command(name = "mediakit")]
#[command(about = "Analyze, convert and capture media with ffmpeg, vips and Chromium")]
struct Args {
    /// JSON configuration file (defaults are used when missing)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Preferred directory for ffmpeg, ffprobe, vips and chromium
    #[arg(long, global = true)]
    tools_dir: Option<PathBuf>,

    /// Directory for temporary files
    #[arg(long, global = true)]
    temp_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a JSON report for each file
    Analyze {
        files: Vec<PathBuf>,

        /// Number of files analyzed concurrently
        #[arg(short, long, default_value = "4")]
        workers: usize,
    },

    /// Convert a file; use `-` for stdin/stdout
    Convert {
        input: PathBuf,
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "video")]
        mode: Mode,

        /// Output preset (overrides the configuration)
        #[arg(short, long)]
        preset: Option<String>,

        #[arg(long)]
        max_width: Option<f64>,

        #[arg(long)]
        max_height: Option<f64>,

        /// Relative position of the extracted frame (0 = start, 1 = end)
        #[arg(long, default_value = "0")]
        position: f64,
    },

    /// Capture a PNG screenshot of a web page
    Capture {
        url: String,
        output: PathBuf,

        #[arg(long, default_value = "1280")]
        width: u32,

        #[arg(long, default_value = "800")]
        height: u32,

        /// Device scale factor
        #[arg(long, default_value = "1")]
        scale: f64,

        /// Capture the whole page
        #[arg(long)]
        full: bool,

        /// Milliseconds to wait for the page to settle
        #[arg(long, default_value = "0")]
        wait_ms: u64,

        /// Fail when the page logs console errors
        #[arg(long)]
        pedantic: bool,

        /// Run Chromium without its sandbox
        #[arg(long)]
        no_sandbox: bool,
    },

    /// Report which external tools are available
    Tools,

    /// Write the default configuration to a file
    InitConfig { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Image,
    Audio,
    Video,
    Extract,
}

#[derive(Serialize)]
struct AnalyzeEntry {
    path: PathBuf,
    #[serde(flatten)]
    report: Option<MediaReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    if let Some(dir) = args.tools_dir.clone() {
        config.tools_dir = Some(dir);
    }
    if let Some(dir) = args.temp_dir.clone() {
        config.directory = dir;
    }
    config.validate()?;
    let config = config.with_warnings(WarningsSink::new(|line| warn!("{}", line)));

    match args.command {
        Command::Analyze { files, workers } => analyze(config, &files, workers).await,
        Command::Convert {
            input,
            output,
            mode,
            preset,
            max_width,
            max_height,
            position,
        } => {
            let config = apply_preset(config, mode, preset.as_deref())?;
            let sizer = sizer(max_width, max_height);
            convert(config, &input, &output, mode, &*sizer, position).await
        }
        Command::Capture {
            url,
            output,
            width,
            height,
            scale,
            full,
            wait_ms,
            pedantic,
            no_sandbox,
        } => {
            let mut config = config;
            config.no_sandbox |= no_sandbox;
            let opts = ScreenshotOptions {
                width,
                height,
                scale,
                full,
                wait: Duration::from_millis(wait_ms),
                pedantic,
            };
            capture(config, &url, &output, &opts).await
        }
        Command::Tools => {
            println!("{}", ToolPathResolver::new(config.tools_dir.clone()).get_tools_report());
            Ok(())
        }
        Command::InitConfig { path } => {
            Config::default().save_to_file(&path).await?;
            info!("📝 Default configuration written to {}", path.display());
            Ok(())
        }
    }
}

async fn analyze(config: Config, files: &[PathBuf], workers: usize) -> Result<()> {
    let paths = ToolPaths::resolve(config.tools_dir.clone());
    let transcoder = Transcoder::from_paths(&paths).with_warnings(config.warnings.clone());
    let vips = Vips::from_paths(&paths);

    let entries: Vec<AnalyzeEntry> = futures::stream::iter(files)
        .map(|path| {
            let (transcoder, vips) = (&transcoder, &vips);
            async move {
                match analyze_file(transcoder, vips, path, None).await {
                    Ok(report) => AnalyzeEntry {
                        path: path.clone(),
                        report: Some(report),
                        error: None,
                    },
                    Err(e) => {
                        error!("❌ {}: {}", path.display(), e);
                        AnalyzeEntry {
                            path: path.clone(),
                            report: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        })
        .buffered(workers.max(1))
        .collect()
        .await;

    println!("{}", serde_json::to_string_pretty(&entries)?);

    let failed = entries.iter().filter(|entry| entry.error.is_some()).count();
    if failed > 0 {
        return Err(anyhow::anyhow!("{} of {} file(s) could not be analyzed", failed, entries.len()));
    }
    Ok(())
}

fn apply_preset(mut config: Config, mode: Mode, preset: Option<&str>) -> Result<Config> {
    let Some(name) = preset else {
        return Ok(config);
    };
    match mode {
        Mode::Image | Mode::Extract => config.image_preset = name.parse::<VipsPreset>()?,
        Mode::Audio => config.audio_preset = name.parse::<Preset>()?,
        Mode::Video => config.video_preset = name.parse::<Preset>()?,
    }
    Ok(config)
}

fn sizer(max_w: Option<f64>, max_h: Option<f64>) -> Box<dyn Sizer> {
    match (max_w, max_h) {
        (Some(w), Some(h)) => Box::new(max_size(Size::new(w, h))),
        (Some(w), None) => Box::new(max_width(w)),
        (None, Some(h)) => Box::new(max_height(h)),
        (None, None) => Box::new(keep_size()),
    }
}

fn is_std(path: &Path) -> bool {
    path.as_os_str() == "-"
}

async fn open_source(path: &Path) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if is_std(path) {
        return Ok(Box::new(tokio::io::stdin()));
    }
    if !path.exists() {
        return Err(anyhow::anyhow!("Input file does not exist: {}", path.display()));
    }
    Ok(Box::new(tokio::fs::File::open(path).await?))
}

async fn open_sink(path: &Path) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    if is_std(path) {
        return Ok(Box::new(tokio::io::stdout()));
    }
    Ok(Box::new(tokio::fs::File::create(path).await?))
}

/// A processor that stops its current operation on Ctrl-C
fn interruptible(config: Config) -> Processor {
    let (stop_sender, stop_receiver) = cancellation_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, stopping the running tool...");
            let _ = stop_sender.send(());
        }
    });
    Processor::new_with_cancellation(config, stop_receiver)
}

async fn convert(
    config: Config,
    input: &Path,
    output: &Path,
    mode: Mode,
    sizer: &dyn Sizer,
    position: f64,
) -> Result<()> {
    let mut processor = interruptible(config);
    let mut source = open_source(input).await?;
    let mut sink = open_sink(output).await?;
    let label = input.display().to_string();

    let result = match mode {
        Mode::Audio | Mode::Video => {
            let progress = ProgressManager::new(&label);
            let handler = progress.handler(Duration::from_millis(500));
            let result = match mode {
                Mode::Audio => processor.convert_audio(&mut source, &mut sink, Some(&handler)).await,
                _ => processor.convert_video(&mut source, &mut sink, sizer, Some(&handler)).await,
            };
            match &result {
                Ok(()) => progress.finish(&format!("✅ {}", label)),
                Err(e) => progress.abandon(&format!("❌ {}: {}", label, e)),
            }
            result
        }
        Mode::Image | Mode::Extract => {
            let spinner = ProgressManager::spinner(&format!("Processing {}", label));
            let result = match mode {
                Mode::Image => processor.convert_image(&mut source, &mut sink, sizer).await,
                _ => processor.extract_image(&mut source, &mut sink, position, sizer).await,
            };
            spinner.finish_and_clear();
            result
        }
    };

    sink.shutdown().await?;
    drop(sink);

    if let Err(e) = result {
        if !is_std(output) {
            let _ = tokio::fs::remove_file(output).await;
        }
        return Err(e.into());
    }

    if !is_std(output) {
        let size = tokio::fs::metadata(output).await?.len();
        info!("✅ {} -> {} ({})", input.display(), output.display(), format_size(size));
    }
    Ok(())
}

async fn capture(config: Config, url: &str, output: &Path, opts: &ScreenshotOptions) -> Result<()> {
    let mut processor = interruptible(config);
    let spinner = ProgressManager::spinner(&format!("Capturing {}", url));
    let result = processor.capture_screenshot(url, opts).await;
    spinner.finish_and_clear();
    let png = result?;

    let mut sink = open_sink(output).await?;
    sink.write_all(&png).await?;
    sink.shutdown().await?;
    info!("📸 {} -> {} ({})", url, output.display(), format_size(png.len() as u64));
    Ok(())
}
