//! # Conversion Pipeline
//!
//! Questo modulo esegue ffmpeg e ffprobe per conto del `Processor`.
//!
//! ## Responsabilità:
//! - Costruisce la riga di comando dal preset (`preset`)
//! - Collega input/output come path o come pipe su stdin/stdout
//! - Esegue il pre-pass della palette (GIF) e la passa al figlio su fd 3
//! - Legge il canale di progress su un task separato (fd 3, o fd 4 con palette)
//! - Classifica gli errori dallo stderr e inoltra i warning al sink configurato
//!
//! ## Esempio:
//! ```rust,ignore
//! let transcoder = Transcoder::new("ffmpeg".into(), "ffprobe".into());
//! let opts = ConvertOptions::new(Preset::AudioMp3VbrStandard).with_sample_rate(44100);
//! transcoder.convert(Input::File(&src), Output::File(&dst), &opts, None).await?;
//! ```

pub mod preset;
pub mod probe;
pub mod progress;

pub use preset::{build_args, palette_args, ConvertOptions, Layout, Preset, PresetSpec, PRESETS};
pub use probe::{parse_scan_output, Format, Report, SideData, Stream, StreamType};
pub use progress::{parse_timestamp, read_progress, Progress, ProgressCallback};

use crate::config::WarningsSink;
use crate::endpoint::{Input, Output};
use crate::error::{MediaError, Result};
use crate::process::{fds, ChildInput, ChildOutput, StopReceiver, ToolRun};
use crate::tool_resolver::ToolPaths;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runs ffmpeg/ffprobe
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    warnings: Option<WarningsSink>,
}

impl Transcoder {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            warnings: None,
        }
    }

    pub fn from_paths(paths: &ToolPaths) -> Self {
        Self::new(paths.ffmpeg.clone(), paths.ffprobe.clone())
    }

    /// Forward non-fatal diagnostics of successful runs to `sink`
    pub fn with_warnings(mut self, sink: Option<WarningsSink>) -> Self {
        self.warnings = sink;
        self
    }

    /// Convert `input` into `output` using `opts`.
    ///
    /// Returns only after the child has exited and the progress reader has
    /// been joined; no callback fires after this returns.
    pub async fn convert(
        &self,
        input: Input<'_>,
        output: Output<'_>,
        opts: &ConvertOptions,
        mut stop: Option<&mut StopReceiver>,
    ) -> Result<()> {
        let preset = opts.preset;
        let layout = Layout {
            input: input.path().map(path_arg),
            output: output.path().map(path_arg),
            palette: preset.needs_palette(),
        };
        let args = build_args(opts, &layout)?;

        // the palette pre-pass needs to read the source a second time
        let palette = match (layout.palette, input.path()) {
            (false, _) => None,
            (true, Some(path)) => Some(self.generate_palette(path, stop.as_deref_mut()).await?),
            (true, None) => return Err(MediaError::RequiresFileInput(preset.name())),
        };

        info!("Converting with preset {}", preset);
        let mut run = ToolRun::new("ffmpeg", &self.ffmpeg, args);

        let palette_task = match palette {
            Some(palette) => {
                let (read, mut write) = fds::pipe().map_err(|e| MediaError::process("ffmpeg", e))?;
                run = run.extra_fd(fds::ExtraFd::new(read, fds::PALETTE_FD));
                Some(tokio::task::spawn_blocking(move || write.write_all(&palette)))
            }
            None => None,
        };

        let progress_task = match opts.active_progress() {
            Some(callback) => {
                let (read, write) = fds::pipe().map_err(|e| MediaError::process("ffmpeg", e))?;
                run = run.extra_fd(fds::ExtraFd::new(write, fds::progress_fd(layout.palette)));
                let callback = callback.clone();
                Some(tokio::task::spawn_blocking(move || {
                    read_progress(BufReader::new(read), &callback)
                }))
            }
            None => None,
        };

        let stdin = match input {
            Input::File(_) => ChildInput::Null,
            Input::Stream(reader) => ChildInput::Stream(reader),
        };
        let stdout = match output {
            Output::File(_) => ChildOutput::Null,
            Output::Stream(writer) => ChildOutput::Stream(writer),
        };

        // the child's exit closes the pipes, which ends both side tasks
        let result = run.stdin(stdin).stdout(stdout).run(stop).await;

        if let Some(task) = palette_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Palette was not fully consumed: {}", e),
                Err(e) => warn!("Palette writer failed: {}", e),
            }
        }
        if let Some(task) = progress_task {
            match task.await {
                Ok(count) => debug!("Delivered {} progress update(s)", count),
                Err(e) => warn!("Progress reader failed: {}", e),
            }
        }

        let stderr = result?;
        self.forward_warnings(&stderr);
        Ok(())
    }

    /// Run `palettegen` over `path` and return the PNG palette
    async fn generate_palette(&self, path: &Path, stop: Option<&mut StopReceiver>) -> Result<Vec<u8>> {
        let mut palette = Vec::new();
        let stderr = ToolRun::new("ffmpeg", &self.ffmpeg, palette_args(&path_arg(path)))
            .stdout(ChildOutput::Stream(&mut palette))
            .run(stop)
            .await?;
        self.forward_warnings(&stderr);
        debug!("Generated palette of {} bytes", palette.len());
        Ok(palette)
    }

    fn forward_warnings(&self, stderr: &str) {
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            debug!("ffmpeg: {}", line);
        }
        if let Some(sink) = &self.warnings {
            sink.emit_lines(stderr);
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
