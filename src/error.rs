//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore della libreria.
//!
//! ## Responsabilità:
//! - Definisce `MediaError` per categorizzare tutti gli errori possibili
//! - Separa gli errori di configurazione (preset, opzioni) da quelli dei tool esterni
//! - Distingue la cancellazione da un fallimento ordinario
//! - Integra con `thiserror` per la conversione automatica degli errori standard
//!
//! ## Categorie di errori:
//! - `InvalidPreset` / `InvalidOptions`: rilevati prima di avviare qualsiasi processo
//! - `Failed`: il tool è terminato con errore, messaggio estratto dallo stderr
//! - `Process` / `MissingDependency`: errori di spawn, pipe o wait
//! - `Cancelled` / `Timeout`: lavoro interrotto
//! - `MissingStream`, `UnsupportedFormat`, `UnsupportedStream`, `UnsupportedCodec`:
//!   validazione di business sul report di ffprobe
//!
//! ## Esempio:
//! ```rust,ignore
//! if !report.has(StreamType::Audio) {
//!     return Err(MediaError::MissingStream("audio"));
//! }
//! ```

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, MediaError>;

/// Errors produced while analyzing or converting media
#[derive(thiserror::Error, Debug)]
pub enum MediaError {
    #[error("invalid preset: {0}")]
    InvalidPreset(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("{0} requires file input")]
    RequiresFileInput(&'static str),

    /// The tool exited unsuccessfully. `message` is already classified.
    #[error("{message}")]
    Failed { tool: &'static str, message: String },

    #[error("{tool}: {source}")]
    Process {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("cancelled")]
    Cancelled,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("missing stream: {0}")]
    MissingStream(&'static str),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported stream: {0}")]
    UnsupportedStream(String),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image signature error: {0}")]
    Image(#[from] image::ImageError),
}

impl MediaError {
    /// Build a tool failure from already classified text.
    pub fn failed(tool: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            tool,
            message: message.into(),
        }
    }

    /// Wrap an OS level error for `tool`, mapping `NotFound` to a missing dependency.
    pub fn process(tool: &'static str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::MissingDependency(tool.to_string())
        } else {
            Self::Process { tool, source }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the error came from validating a probe report.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Self::MissingStream(_)
                | Self::UnsupportedFormat(_)
                | Self::UnsupportedStream(_)
                | Self::UnsupportedCodec(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_displays_message_only() {
        let err = MediaError::failed("ffmpeg", "pipe:: invalid data found when processing input");
        assert_eq!(err.to_string(), "pipe:: invalid data found when processing input");
    }

    #[test]
    fn test_process_not_found_is_missing_dependency() {
        let err = MediaError::process("ffprobe", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, MediaError::MissingDependency(ref t) if t == "ffprobe"));

        let err = MediaError::process("ffmpeg", std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(err.to_string().starts_with("ffmpeg: "));
    }

    #[test]
    fn test_classification_helpers() {
        assert!(MediaError::Cancelled.is_cancelled());
        assert!(!MediaError::failed("vips", "boom").is_cancelled());
        assert!(MediaError::MissingStream("video").is_business());
        assert!(MediaError::UnsupportedCodec("hevc".into()).is_business());
        assert!(!MediaError::InvalidPreset("0".into()).is_business());
    }
}
