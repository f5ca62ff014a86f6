//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione del `Processor`.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con preset, limiti e allow-list
//! - Fornisce validazione dei parametri
//! - Supporta caricamento/salvataggio da/verso file JSON
//! - Trasporta il sink opzionale per i warning non fatali dei tool
//!
//! ## Parametri di configurazione:
//! - `directory`: Directory per i file temporanei (default: temp del sistema)
//! - `tools_dir`: Directory preferita per i binari esterni (default: None = PATH)
//! - `image_preset` / `audio_preset` / `video_preset`: Preset di output
//! - `max_frame_rate`: Frame rate massimo (default: 30)
//! - `target_frame_rate`: Frame rate usato quando il massimo è superato (default: 25)
//! - `max_sample_rate`: Sample rate massimo (default: 48000)
//! - `*_formats` / `*_codecs`: Allow-list opzionali (None = accetta tutto)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     max_frame_rate: 60.0,
//!     target_frame_rate: 30.0,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::ffmpeg::Preset;
use crate::vips::VipsPreset;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Receives non-fatal diagnostic lines from successful tool runs
#[derive(Clone)]
pub struct WarningsSink(Arc<dyn Fn(&str) + Send + Sync>);

impl WarningsSink {
    pub fn new(f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Forward every non-empty line of `text`
    pub fn emit_lines(&self, text: &str) {
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            (self.0)(line);
        }
    }
}

impl fmt::Debug for WarningsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WarningsSink(..)")
    }
}

/// Configuration for the media processor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for temporary files
    pub directory: PathBuf,
    /// Preferred directory for external binaries
    pub tools_dir: Option<PathBuf>,
    /// Image output preset
    pub image_preset: VipsPreset,
    /// Audio output preset
    pub audio_preset: Preset,
    /// Video output preset
    pub video_preset: Preset,
    /// Frame rates above this are replaced by `target_frame_rate`
    pub max_frame_rate: f64,
    pub target_frame_rate: f64,
    /// Sample rates above this are clamped to it
    pub max_sample_rate: u32,
    pub image_formats: Option<Vec<String>>,
    pub audio_formats: Option<Vec<String>>,
    pub video_formats: Option<Vec<String>>,
    pub audio_codecs: Option<Vec<String>>,
    pub video_codecs: Option<Vec<String>>,
    /// Run the headless browser without its sandbox
    pub no_sandbox: bool,
    #[serde(skip)]
    pub warnings: Option<WarningsSink>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir(),
            tools_dir: None,
            image_preset: VipsPreset::JpgWeb,
            audio_preset: Preset::AudioMp3VbrStandard,
            video_preset: Preset::VideoMp4H264AacFast,
            max_frame_rate: 30.0,
            target_frame_rate: 25.0,
            max_sample_rate: 48000,
            image_formats: None,
            audio_formats: None,
            video_formats: None,
            audio_codecs: None,
            video_codecs: None,
            no_sandbox: std::env::var("MEDIAKIT_NOSBX").map(|v| v == "1").unwrap_or(false),
            warnings: None,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.max_frame_rate > 0.0) || !self.max_frame_rate.is_finite() {
            return Err(anyhow::anyhow!("Max frame rate must be a positive number"));
        }

        if !(self.target_frame_rate > 0.0) || self.target_frame_rate > self.max_frame_rate {
            return Err(anyhow::anyhow!(
                "Target frame rate must be positive and not above the max frame rate ({})",
                self.max_frame_rate
            ));
        }

        if self.max_sample_rate == 0 {
            return Err(anyhow::anyhow!("Max sample rate must be greater than 0"));
        }

        if !self.directory.exists() {
            return Err(anyhow::anyhow!("Temp directory does not exist: {}", self.directory.display()));
        }
        if !self.directory.is_dir() {
            return Err(anyhow::anyhow!("Temp path is not a directory: {}", self.directory.display()));
        }

        Ok(())
    }

    /// Attach a sink for non-fatal tool diagnostics
    pub fn with_warnings(mut self, sink: WarningsSink) -> Self {
        self.warnings = Some(sink);
        self
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// `true` when `list` is unset or contains `value`
pub(crate) fn allows(list: &Option<Vec<String>>, value: &str) -> bool {
    list.as_ref().map_or(true, |items| items.iter().any(|item| item == value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.max_frame_rate = 0.0;
        assert!(config.validate().is_err());

        config.max_frame_rate = 30.0;
        config.target_frame_rate = 31.0;
        assert!(config.validate().is_err());

        config.target_frame_rate = 25.0;
        config.max_sample_rate = 0;
        assert!(config.validate().is_err());

        config.max_sample_rate = 44100;
        config.directory = PathBuf::from("/definitely/not/here");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.image_preset, VipsPreset::JpgWeb);
        assert_eq!(config.audio_preset, Preset::AudioMp3VbrStandard);
        assert_eq!(config.video_preset, Preset::VideoMp4H264AacFast);
        assert_eq!(config.max_frame_rate, 30.0);
        assert_eq!(config.target_frame_rate, 25.0);
        assert_eq!(config.max_sample_rate, 48000);
        assert!(config.video_codecs.is_none());
        assert!(config.warnings.is_none());
    }

    #[test]
    fn test_allow_lists() {
        assert!(allows(&None, "anything"));
        let list = Some(vec!["mp3".to_string(), "flac".to_string()]);
        assert!(allows(&list, "flac"));
        assert!(!allows(&list, "ogg"));
    }

    #[test]
    fn test_warnings_sink_skips_blank_lines() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            WarningsSink::new(move |line| seen.lock().unwrap().push(line.to_string()))
        };

        sink.emit_lines("first\n\n  \nsecond\n");
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            directory: temp_dir.path().to_path_buf(),
            image_preset: VipsPreset::WebP,
            video_preset: Preset::AnimWebp,
            max_frame_rate: 60.0,
            target_frame_rate: 30.0,
            audio_codecs: Some(vec!["aac".to_string()]),
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.directory, temp_dir.path());
        assert_eq!(loaded_config.image_preset, VipsPreset::WebP);
        assert_eq!(loaded_config.video_preset, Preset::AnimWebp);
        assert_eq!(loaded_config.max_frame_rate, 60.0);
        assert_eq!(loaded_config.target_frame_rate, 30.0);
        assert_eq!(loaded_config.audio_codecs, Some(vec!["aac".to_string()]));
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("nope.json")).await.unwrap();
        assert_eq!(config.max_sample_rate, 48000);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "max_sample_rate": 44100, "audio_preset": "audio-mp3-vbr-standard" }"#)
            .await
            .unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert_eq!(config.max_sample_rate, 44100);
        assert_eq!(config.max_frame_rate, 30.0);
    }
}
