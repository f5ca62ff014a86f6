//! # Media Processor
//!
//! Questo modulo espone le operazioni di alto livello della libreria.
//!
//! ## Responsabilità:
//! - Converte immagini (vips), audio e video (ffmpeg) da stream o da file
//! - Estrae un'immagine da un video a una posizione relativa
//! - Cattura screenshot di pagine web (Chromium)
//! - Valida il report di ffprobe contro le allow-list della configurazione
//! - Normalizza il progress in una frazione [0, 1] della durata totale
//!
//! ## Flusso di ogni operazione:
//! 1. Analisi della sorgente (ffprobe o vipsheader)
//! 2. Validazione: stream richiesto, formato, tipi di stream, codec
//! 3. Calcolo delle opzioni: dimensioni (sizer), frame rate, sample rate
//! 4. Conversione
//!
//! Le varianti senza `_file` accettano stream arbitrari e li bufferizzano
//! su file temporanei (vedi `buffer`), eliminati al termine.
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut processor = Processor::new(Config::default());
//! processor
//!     .convert_video_file(&input, &output, &max_width(1280.0), None)
//!     .await?;
//! ```

use crate::analyze::{analyze_file, MediaReport};
use crate::buffer::with_buffered_files;
use crate::chromium::{Chromium, ScreenshotOptions};
use crate::config::{allows, Config};
use crate::endpoint::{Input, Output};
use crate::error::{MediaError, Result};
use crate::ffmpeg::{ConvertOptions, Preset, ProgressCallback, Report, StreamType, Transcoder};
use crate::process::StopReceiver;
use crate::sizer::{Size, Sizer};
use crate::tool_resolver::ToolPaths;
use crate::vips::{Vips, VipsOptions};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

/// Receives the conversion progress as a fraction in [0, 1]
#[derive(Clone)]
pub struct ProgressHandler {
    pub rate: Duration,
    pub func: Arc<dyn Fn(f64) + Send + Sync>,
}

impl ProgressHandler {
    pub fn new(rate: Duration, func: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            rate,
            func: Arc::new(func),
        }
    }

    /// Pipeline callback reporting progress relative to `total` seconds
    fn callback(&self, total: f64) -> ProgressCallback {
        let func = self.func.clone();
        ProgressCallback::new(self.rate, move |progress| func(progress_fraction(progress.duration, total)))
    }
}

impl fmt::Debug for ProgressHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHandler").field("rate", &self.rate).finish_non_exhaustive()
    }
}

/// `elapsed / total` clamped to [0, 1]; 0 when the total is unknown
pub fn progress_fraction(elapsed: f64, total: f64) -> f64 {
    if total > 0.0 && total.is_finite() && elapsed.is_finite() {
        (elapsed / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Frame rates above `max` snap to `target`, 0 stays unset
pub fn target_frame_rate(probed: f64, max: f64, target: f64) -> f64 {
    if probed > max {
        target
    } else {
        probed
    }
}

/// Sample rates above `max` are clamped to it
pub fn target_sample_rate(probed: u32, max: u32) -> u32 {
    probed.min(max)
}

/// High-level media operations
pub struct Processor {
    config: Config,
    transcoder: Transcoder,
    vips: Vips,
    chromium: Chromium,
    stop_receiver: Option<StopReceiver>,
}

impl Processor {
    /// Create a processor, resolving the tools from `config.tools_dir` or `PATH`
    pub fn new(config: Config) -> Self {
        let paths = ToolPaths::resolve(config.tools_dir.clone());
        Self::with_tools(config, &paths)
    }

    /// Create a processor using explicit tool paths
    pub fn with_tools(config: Config, paths: &ToolPaths) -> Self {
        let transcoder = Transcoder::from_paths(paths).with_warnings(config.warnings.clone());
        let vips = Vips::from_paths(paths);
        let chromium = Chromium::new(paths.chromium.clone(), config.no_sandbox);
        Self {
            config,
            transcoder,
            vips,
            chromium,
            stop_receiver: None,
        }
    }

    /// Create a processor whose operations stop when a signal arrives on
    /// `stop_receiver`.
    ///
    /// ```rust,ignore
    /// let (stop_sender, stop_receiver) = cancellation_channel();
    /// let mut processor = Processor::new_with_cancellation(config, stop_receiver);
    /// // later, from another task:
    /// let _ = stop_sender.send(());
    /// ```
    pub fn new_with_cancellation(config: Config, stop_receiver: StopReceiver) -> Self {
        Self::new(config).with_stop_receiver(stop_receiver)
    }

    pub fn with_stop_receiver(mut self, stop_receiver: StopReceiver) -> Self {
        self.stop_receiver = Some(stop_receiver);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert an image stream, sized by `sizer`
    pub async fn convert_image(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        sizer: &dyn Sizer,
    ) -> Result<()> {
        let dir = self.config.directory.clone();
        with_buffered_files(&dir, source, sink, false, |files| async move {
            self.convert_image_file(&files.source, &files.sink, sizer).await
        })
        .await
    }

    pub async fn convert_image_file(&mut self, source: &Path, sink: &Path, sizer: &dyn Sizer) -> Result<()> {
        let report = self.vips.analyze(Input::File(source), self.stop_receiver.as_mut()).await?;
        if !allows(&self.config.image_formats, &report.format) {
            return Err(MediaError::UnsupportedFormat(report.format));
        }

        let (width, height) = sizer
            .apply(Size::new(report.width as f64, report.height as f64))
            .rounded();
        let opts = VipsOptions::new(self.config.image_preset, width.max(1)).with_height(height.max(1));

        info!(
            "Converting image {}x{} -> {}x{} ({})",
            report.width, report.height, opts.width, opts.height, opts.preset
        );
        self.vips
            .convert(Input::File(source), Output::File(sink), &opts, self.stop_receiver.as_mut())
            .await
    }

    /// Convert an audio stream
    pub async fn convert_audio(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        progress: Option<&ProgressHandler>,
    ) -> Result<()> {
        let dir = self.config.directory.clone();
        with_buffered_files(&dir, source, sink, false, |files| async move {
            self.convert_audio_file(&files.source, &files.sink, progress).await
        })
        .await
    }

    pub async fn convert_audio_file(
        &mut self,
        source: &Path,
        sink: &Path,
        progress: Option<&ProgressHandler>,
    ) -> Result<()> {
        let report = self.transcoder.analyze(Input::File(source), self.stop_receiver.as_mut()).await?;
        self.validate(&report, StreamType::Audio)?;

        let mut opts = ConvertOptions::new(self.config.audio_preset)
            .with_sample_rate(target_sample_rate(report.sample_rate(), self.config.max_sample_rate));
        if let Some(handler) = progress {
            opts = opts.with_progress(handler.callback(report.duration));
        }

        info!("Converting audio ({}, {:.2}s) with {}", report.format.name, report.duration, opts.preset);
        self.transcoder
            .convert(Input::File(source), Output::File(sink), &opts, self.stop_receiver.as_mut())
            .await
    }

    /// Convert a video stream, sized by `sizer`
    pub async fn convert_video(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        sizer: &dyn Sizer,
        progress: Option<&ProgressHandler>,
    ) -> Result<()> {
        let dir = self.config.directory.clone();
        with_buffered_files(&dir, source, sink, false, |files| async move {
            self.convert_video_file(&files.source, &files.sink, sizer, progress).await
        })
        .await
    }

    pub async fn convert_video_file(
        &mut self,
        source: &Path,
        sink: &Path,
        sizer: &dyn Sizer,
        progress: Option<&ProgressHandler>,
    ) -> Result<()> {
        let report = self.transcoder.analyze(Input::File(source), self.stop_receiver.as_mut()).await?;
        self.validate(&report, StreamType::Video)?;

        let (width, height) = report.size();
        let (width, height) = sizer.apply(Size::new(width as f64, height as f64)).rounded();
        let frame_rate = target_frame_rate(
            report.frame_rate(),
            self.config.max_frame_rate,
            self.config.target_frame_rate,
        );

        let mut opts = ConvertOptions::new(self.config.video_preset)
            .with_size(width, height)
            .with_frame_rate(frame_rate)
            .with_sample_rate(target_sample_rate(report.sample_rate(), self.config.max_sample_rate));
        if let Some(handler) = progress {
            opts = opts.with_progress(handler.callback(report.duration));
        }

        info!(
            "Converting video ({}, {}x{} @ {}fps) with {}",
            report.format.name, width, height, frame_rate, opts.preset
        );
        self.transcoder
            .convert(Input::File(source), Output::File(sink), &opts, self.stop_receiver.as_mut())
            .await
    }

    /// Extract an image from a video stream at `position` (0 = start, 1 = end)
    pub async fn extract_image(
        &mut self,
        source: &mut (dyn AsyncRead + Unpin + Send),
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        position: f64,
        sizer: &dyn Sizer,
    ) -> Result<()> {
        let dir = self.config.directory.clone();
        with_buffered_files(&dir, source, sink, true, |files| async move {
            let temp = files
                .temp
                .ok_or_else(|| MediaError::InvalidOptions("missing intermediate file".to_string()))?;
            self.extract_image_file(&files.source, &temp, &files.sink, position, sizer).await
        })
        .await
    }

    /// Extract a lossless frame into `temp`, then convert it into `sink`
    pub async fn extract_image_file(
        &mut self,
        source: &Path,
        temp: &Path,
        sink: &Path,
        position: f64,
        sizer: &dyn Sizer,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&position) {
            return Err(MediaError::InvalidOptions(format!("position must be within [0, 1], got {}", position)));
        }

        let report = self.transcoder.analyze(Input::File(source), self.stop_receiver.as_mut()).await?;
        self.validate(&report, StreamType::Video)?;

        let start = report.duration * position;
        debug!("Extracting frame at {:.3}s of {:.3}s", start, report.duration);
        let opts = ConvertOptions::new(Preset::ImagePng).with_start(start);
        self.transcoder
            .convert(Input::File(source), Output::File(temp), &opts, self.stop_receiver.as_mut())
            .await?;

        self.convert_image_file(temp, sink, sizer).await
    }

    /// Capture a PNG screenshot of `url`
    pub async fn capture_screenshot(&mut self, url: &str, opts: &ScreenshotOptions) -> Result<Vec<u8>> {
        self.chromium.screenshot(url, opts, self.stop_receiver.as_mut()).await
    }

    /// Analyze a file, see `analyze::analyze_file`
    pub async fn analyze(&mut self, path: &Path) -> Result<MediaReport> {
        analyze_file(&self.transcoder, &self.vips, path, self.stop_receiver.as_mut()).await
    }

    /// Check a probe report against the required stream and the allow-lists.
    ///
    /// Audio operations accept audio streams, video operations video and
    /// audio streams. Data streams are ignored. Foreign streams are only
    /// rejected when a codec allow-list is configured.
    fn validate(&self, report: &Report, required: StreamType) -> Result<()> {
        let config = &self.config;
        let (formats, accepted, restricted): (_, &[StreamType], _) = match required {
            StreamType::Audio => (&config.audio_formats, &[StreamType::Audio], config.audio_codecs.is_some()),
            _ => (
                &config.video_formats,
                &[StreamType::Video, StreamType::Audio],
                config.video_codecs.is_some() || config.audio_codecs.is_some(),
            ),
        };

        if !report.has(required) {
            return Err(MediaError::MissingStream(required.as_str()));
        }
        if !allows(formats, &report.format.name) {
            return Err(MediaError::UnsupportedFormat(report.format.name.clone()));
        }

        for stream in report.streams.iter().filter(|stream| stream.kind != StreamType::Data) {
            if !accepted.contains(&stream.kind) {
                if restricted {
                    return Err(MediaError::UnsupportedStream(stream.kind.to_string()));
                }
                continue;
            }
            let codecs = match stream.kind {
                StreamType::Video => &config.video_codecs,
                _ => &config.audio_codecs,
            };
            if !allows(codecs, &stream.codec) {
                return Err(MediaError::UnsupportedCodec(stream.codec.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn processor(config: Config) -> Processor {
        let missing = PathBuf::from("/nonexistent/tool");
        let paths = ToolPaths {
            ffmpeg: missing.clone(),
            ffprobe: missing.clone(),
            vips: missing.clone(),
            vipsheader: missing.clone(),
            chromium: missing,
        };
        Processor::with_tools(config, &paths)
    }

    fn report(json: &str) -> Report {
        Report::from_json(json.as_bytes()).unwrap()
    }

    const AV_JSON: &str = r#"{"format":{"format_name":"mov,mp4,m4a,3gp,3g2,mj2","duration":"2.0"},"streams":[
        {"codec_type":"video","codec_name":"h264","width":800,"height":450,"r_frame_rate":"50/1"},
        {"codec_type":"audio","codec_name":"aac","sample_rate":"96000","channels":2},
        {"codec_type":"data","codec_name":"bin_data"}
    ]}"#;

    const AUDIO_JSON: &str = r#"{"format":{"format_name":"mp3","duration":"2.0"},"streams":[
        {"codec_type":"audio","codec_name":"mp3","sample_rate":"44100","channels":2},
        {"codec_type":"video","codec_name":"mjpeg","width":300,"height":300}
    ]}"#;

    #[test]
    fn test_frame_rate_snaps_to_target() {
        assert_eq!(target_frame_rate(50.0, 30.0, 25.0), 25.0);
        assert_eq!(target_frame_rate(30.0, 30.0, 25.0), 30.0);
        assert_eq!(target_frame_rate(24.0, 30.0, 25.0), 24.0);
        assert_eq!(target_frame_rate(0.0, 30.0, 25.0), 0.0);
    }

    #[test]
    fn test_sample_rate_clamps_to_max() {
        assert_eq!(target_sample_rate(96000, 48000), 48000);
        assert_eq!(target_sample_rate(44100, 48000), 44100);
        assert_eq!(target_sample_rate(0, 48000), 0);
    }

    #[test]
    fn test_progress_fraction_is_clamped() {
        assert_eq!(progress_fraction(1.0, 2.0), 0.5);
        assert_eq!(progress_fraction(3.0, 2.0), 1.0);
        assert_eq!(progress_fraction(-1.0, 2.0), 0.0);
        assert_eq!(progress_fraction(1.0, 0.0), 0.0);
        assert_eq!(progress_fraction(f64::NAN, 2.0), 0.0);
    }

    #[test]
    fn test_handler_callback_reports_fractions() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handler = {
            let seen = seen.clone();
            ProgressHandler::new(Duration::from_millis(250), move |f| seen.lock().unwrap().push(f))
        };
        let callback = handler.callback(4.0);
        assert_eq!(callback.rate, Duration::from_millis(250));
        (callback.func)(crate::ffmpeg::Progress { duration: 1.0, size: 10 });
        (callback.func)(crate::ffmpeg::Progress { duration: 9.0, size: 20 });
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 1.0]);
    }

    #[test]
    fn test_validation_without_allow_lists() {
        let processor = processor(Config::default());
        assert!(processor.validate(&report(AV_JSON), StreamType::Video).is_ok());
        // cover art is tolerated when no codec list is configured
        assert!(processor.validate(&report(AUDIO_JSON), StreamType::Audio).is_ok());
    }

    #[test]
    fn test_missing_stream() {
        let processor = processor(Config::default());
        let only_audio = r#"{"format":{"format_name":"mp3"},"streams":[{"codec_type":"audio","codec_name":"mp3"}]}"#;
        let err = processor.validate(&report(only_audio), StreamType::Video).unwrap_err();
        assert!(matches!(err, MediaError::MissingStream("video")));
    }

    #[test]
    fn test_unsupported_format() {
        let processor = processor(Config {
            video_formats: Some(vec!["matroska,webm".to_string()]),
            ..Default::default()
        });
        let err = processor.validate(&report(AV_JSON), StreamType::Video).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedFormat(ref f) if f == "mov,mp4,m4a,3gp,3g2,mj2"));
    }

    #[test]
    fn test_unsupported_codec() {
        let processor = processor(Config {
            video_codecs: Some(vec!["h264".to_string()]),
            audio_codecs: Some(vec!["mp3".to_string()]),
            ..Default::default()
        });
        let err = processor.validate(&report(AV_JSON), StreamType::Video).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedCodec(ref c) if c == "aac"));
        assert!(err.is_business());
    }

    #[test]
    fn test_unsupported_stream_with_codec_list() {
        let processor = processor(Config {
            audio_codecs: Some(vec!["mp3".to_string()]),
            ..Default::default()
        });
        let err = processor.validate(&report(AUDIO_JSON), StreamType::Audio).unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedStream(ref s) if s == "video"));
    }

    #[tokio::test]
    async fn test_extract_rejects_bad_position() {
        let mut processor = processor(Config::default());
        let path = Path::new("/nonexistent/in.mp4");
        let err = processor
            .extract_image_file(path, path, path, 1.5, &crate::sizer::keep_size())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidOptions(_)));
    }
}

#[cfg(all(test, unix))]
mod pipeline_tests {
    use super::*;
    use crate::process::cancellation_channel;
    use crate::sizer::{keep_size, max_width};
    use crate::testing::{fake_tool, spy_calls, spy_tool};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const VIDEO_JSON: &str = r#"{"format":{"format_name":"mov,mp4,m4a,3gp,3g2,mj2","duration":"2.0"},"streams":[
        {"codec_type":"video","codec_name":"h264","width":800,"height":450,"r_frame_rate":"50/1","duration":"2.0"},
        {"codec_type":"audio","codec_name":"aac","sample_rate":"44100","channels":2,"duration":"2.0"}
    ]}"#;

    const PROGRESS: &str =
        "printf 'out_time=00:00:01.000000\\nprogress=continue\\nout_time=00:00:04.000000\\nprogress=end\\n' >&3\n";

    struct Fixture {
        _dir: TempDir,
        work: PathBuf,
        order: PathBuf,
        ffmpeg_calls: PathBuf,
        ffprobe_calls: PathBuf,
        paths: ToolPaths,
    }

    /// Fake toolchain; ffmpeg runs `ffmpeg_body` then writes `content` to its last argument
    fn fixture(ffmpeg_body: &str, content: &str) -> Fixture {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        let work = dir.path().join("work");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(&work).unwrap();
        let order = dir.path().join("order.log");

        let (ffprobe, ffprobe_calls) = spy_tool(&bin, "ffprobe", &format!("cat <<'EOF'\n{}\nEOF", VIDEO_JSON));
        let (ffmpeg, ffmpeg_calls) = spy_tool(
            &bin,
            "ffmpeg",
            &format!(
                "echo ffmpeg >> '{}'\n{}for last; do :; done\nprintf '{}' > \"$last\"",
                order.display(),
                ffmpeg_body,
                content
            ),
        );
        let vips = fake_tool(&bin, "vips", &format!("echo vips >> '{}'\ncat", order.display()));
        let vipsheader = fake_tool(
            &bin,
            "vipsheader",
            "cat > /dev/null; echo 'stdin: 800x450 uchar, 3 bands, srgb, pngload_source'",
        );

        let paths = ToolPaths {
            ffmpeg,
            ffprobe,
            vips,
            vipsheader,
            chromium: bin.join("chromium"),
        };
        Fixture {
            _dir: dir,
            work,
            order,
            ffmpeg_calls,
            ffprobe_calls,
            paths,
        }
    }

    impl Fixture {
        fn config(&self) -> Config {
            Config {
                directory: self.work.clone(),
                ..Default::default()
            }
        }

        fn processor(&self) -> Processor {
            Processor::with_tools(self.config(), &self.paths)
        }

        fn work_is_empty(&self) -> bool {
            std::fs::read_dir(&self.work).unwrap().next().is_none()
        }
    }

    #[tokio::test]
    async fn test_convert_video_stream() {
        let fx = fixture(PROGRESS, "converted");
        let mut processor = fx.processor();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let seen = seen.clone();
            ProgressHandler::new(Duration::from_millis(100), move |f| seen.lock().unwrap().push(f))
        };

        let mut source: &[u8] = b"video bytes";
        let mut sink = Vec::new();
        processor
            .convert_video(&mut source, &mut sink, &max_width(300.0), Some(&handler))
            .await
            .unwrap();

        assert_eq!(sink, b"converted");
        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);
        assert!(fx.work_is_empty());

        let args = std::fs::read_to_string(&fx.ffmpeg_calls).unwrap();
        assert!(args.contains("-filter:v scale=300:169, pad="), "{}", args);
        assert!(args.contains("-r 25 "), "{}", args);
        assert!(args.contains("-progress pipe:3"), "{}", args);
        assert!(args.contains("-ar 44100"), "{}", args);
    }

    #[tokio::test]
    async fn test_convert_audio_rejects_foreign_stream_before_converting() {
        let fx = fixture("", "mp3");
        let config = Config {
            audio_codecs: Some(vec!["mp3".to_string()]),
            ..fx.config()
        };
        let mut processor = Processor::with_tools(config, &fx.paths);

        let mut source: &[u8] = b"video bytes";
        let mut sink = Vec::new();
        let err = processor.convert_audio(&mut source, &mut sink, None).await.unwrap_err();

        assert!(matches!(err, MediaError::UnsupportedStream(ref s) if s == "video"));
        assert_eq!(spy_calls(&fx.ffprobe_calls), 1);
        assert_eq!(spy_calls(&fx.ffmpeg_calls), 0);
        assert!(sink.is_empty());
        assert!(fx.work_is_empty());
    }

    #[tokio::test]
    async fn test_extract_image_runs_frame_then_image_step() {
        let fx = fixture("", "frame");
        let mut processor = fx.processor();

        let mut source: &[u8] = b"video bytes";
        let mut sink = Vec::new();
        processor
            .extract_image(&mut source, &mut sink, 0.25, &keep_size())
            .await
            .unwrap();

        assert_eq!(sink, b"frame");
        assert_eq!(std::fs::read_to_string(&fx.order).unwrap(), "ffmpeg\nvips\n");

        let args = std::fs::read_to_string(&fx.ffmpeg_calls).unwrap();
        assert!(args.contains("-ss 0.5 -i "), "{}", args);
        assert!(args.contains("-codec:v png"), "{}", args);
        assert!(fx.work_is_empty());
    }

    #[tokio::test]
    async fn test_failure_still_cleans_up() {
        let fx = fixture("echo 'Conversion Failed!' >&2; exit 1\n", "");
        let mut processor = fx.processor();

        let mut source: &[u8] = b"video bytes";
        let mut sink = Vec::new();
        let err = processor
            .convert_video(&mut source, &mut sink, &keep_size(), None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "conversion failed!");
        assert!(sink.is_empty());
        assert!(fx.work_is_empty());
    }

    #[tokio::test]
    async fn test_stop_signal_cancels() {
        let fx = fixture("", "converted");
        let (sender, receiver) = cancellation_channel();
        let mut processor = fx.processor().with_stop_receiver(receiver);
        sender.send(()).unwrap();

        let mut source: &[u8] = b"video bytes";
        let mut sink = Vec::new();
        let err = processor
            .convert_video(&mut source, &mut sink, &keep_size(), None)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(spy_calls(&fx.ffmpeg_calls), 0);
        assert!(fx.work_is_empty());
    }
}
