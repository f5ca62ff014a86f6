//! # Probe Report Parser
//!
//! Questo modulo analizza una sorgente con ffprobe e produce un `Report` tipizzato.
//!
//! ## Responsabilità:
//! - Esegue `ffprobe` in formato JSON (path diretto o stdin)
//! - Converte i campi testuali di ffprobe (`"2.000"`, `"25/1"`, `"N/A"`)
//! - Ricava la durata complessiva come massimo tra formato e stream
//! - Applica la rotazione (±90°) scambiando larghezza e altezza
//! - Se la durata manca e la sorgente è un file, decodifica tutto con ffmpeg
//!   e legge l'ultimo `time=` (flag `did_scan`)

use super::Transcoder;
use crate::args;
use crate::endpoint::Input;
use crate::error::{MediaError, Result};
use crate::ffmpeg::progress::parse_timestamp;
use crate::process::{ChildInput, ChildOutput, StopReceiver, ToolRun};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::process::ExitStatus;
use tracing::{debug, info};

/// Codecs of single-stream sources that are still images
const IMAGE_CODECS: [&str; 5] = ["png", "mjpeg", "jpeg2000", "tiff", "webp"];

/// Kind of a probed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Video,
    Audio,
    Data,
    Subtitle,
    Attachment,
    #[default]
    #[serde(other)]
    Unknown,
}

impl StreamType {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::Video => "video",
            StreamType::Audio => "audio",
            StreamType::Data => "data",
            StreamType::Subtitle => "subtitle",
            StreamType::Attachment => "attachment",
            StreamType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Format {
    #[serde(rename = "format_name", default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideData {
    #[serde(default)]
    pub rotation: i32,
}

/// A single probed stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "codec_type", default)]
    pub kind: StreamType,
    #[serde(rename = "codec_name", default)]
    pub codec: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: f64,

    // audio
    #[serde(default)]
    pub channels: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub sample_rate: u32,

    // video
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(rename = "r_frame_rate", default, deserialize_with = "ratio_f64")]
    pub frame_rate: f64,
    #[serde(rename = "pix_fmt", default)]
    pub pixel_format: String,
    #[serde(default)]
    pub color_space: String,

    #[serde(rename = "side_data_list", default, skip_serializing_if = "Vec::is_empty")]
    pub side_data: Vec<SideData>,
}

/// Parsed ffprobe output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub format: Format,
    #[serde(default)]
    pub streams: Vec<Stream>,
    /// Longest of the container and stream durations, or the scanned duration
    #[serde(default)]
    pub duration: f64,
    /// Set when the duration came from a full decode pass
    #[serde(default)]
    pub did_scan: bool,
}

impl Report {
    /// Parse ffprobe's JSON and derive the aggregate fields.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut report: Report = serde_json::from_slice(bytes)?;

        report.duration = report
            .streams
            .iter()
            .map(|stream| stream.duration)
            .fold(report.format.duration, f64::max);

        for stream in &mut report.streams {
            if stream.side_data.iter().any(|sd| sd.rotation.abs() == 90) {
                std::mem::swap(&mut stream.width, &mut stream.height);
            }
            stream.side_data.clear();
        }

        Ok(report)
    }

    /// Single stream with a still-image codec
    pub fn is_image(&self) -> bool {
        match self.streams.as_slice() {
            [stream] => IMAGE_CODECS.contains(&stream.codec.as_str()),
            _ => false,
        }
    }

    /// Whether the duration must come from a decode pass
    pub fn needs_scan(&self) -> bool {
        !self.is_image() && self.duration == 0.0
    }

    pub fn has(&self, kind: StreamType) -> bool {
        self.streams.iter().any(|stream| stream.kind == kind)
    }

    /// Largest width and height among streams that have both
    pub fn size(&self) -> (u32, u32) {
        self.streams
            .iter()
            .filter(|stream| stream.width > 0 && stream.height > 0)
            .fold((0, 0), |(w, h), stream| (w.max(stream.width), h.max(stream.height)))
    }

    pub fn frame_rate(&self) -> f64 {
        self.streams.iter().map(|stream| stream.frame_rate).fold(0.0, f64::max)
    }

    pub fn sample_rate(&self) -> u32 {
        self.streams.iter().map(|stream| stream.sample_rate).max().unwrap_or(0)
    }
}

/// Probe arguments for `input`, a path or `pipe:`
pub fn probe_args(input: &str) -> Vec<String> {
    args!["-print_format", "json", "-show_format", "-show_streams", "-show_error", input]
}

/// Error of a failed probe: the JSON error string if present.
pub fn probe_failure(stdout: &[u8], status: ExitStatus) -> MediaError {
    #[derive(Deserialize)]
    struct ErrorReport {
        error: ErrorString,
    }
    #[derive(Deserialize)]
    struct ErrorString {
        #[serde(default)]
        string: String,
    }

    match serde_json::from_slice::<ErrorReport>(stdout) {
        Ok(report) if !report.error.string.trim().is_empty() => {
            MediaError::failed("ffprobe", report.error.string.trim().to_lowercase())
        }
        _ => MediaError::failed("ffprobe", format!("ffprobe: {}", status)),
    }
}

/// Last `time=` value in ffmpeg's statistics output.
///
/// Statistics updates are separated by `\r`, final lines by `\n`.
pub fn parse_scan_output(text: &str) -> Result<f64> {
    let token = text
        .split(['\n', '\r'])
        .rev()
        .flat_map(|line| line.split_whitespace().rev())
        .find_map(|part| part.strip_prefix("time="))
        .ok_or_else(|| MediaError::Parse("no time found in scan output".to_string()))?;

    parse_timestamp(token)
}

impl Transcoder {
    /// Probe `input`. File inputs without a known duration are decoded once
    /// to measure it.
    pub async fn analyze(&self, input: Input<'_>, mut stop: Option<&mut StopReceiver>) -> Result<Report> {
        let path = input.path().map(Path::to_path_buf);
        let args = probe_args(&input.ffmpeg_arg());
        let stdin = match input {
            Input::File(_) => ChildInput::Null,
            Input::Stream(reader) => ChildInput::Stream(reader),
        };

        let mut stdout = Vec::new();
        let finished = ToolRun::new("ffprobe", &self.ffprobe, args)
            .stdin(stdin)
            .stdout(ChildOutput::Stream(&mut stdout))
            .run_raw(stop.as_deref_mut())
            .await?;
        if !finished.status.success() {
            return Err(probe_failure(&stdout, finished.status));
        }

        let mut report = Report::from_json(&stdout)?;
        debug!(
            "Probed {} stream(s), format {:?}, duration {}",
            report.streams.len(),
            report.format.name,
            report.duration
        );

        if let Some(path) = path {
            if report.needs_scan() {
                info!("No duration in metadata, scanning {}", path.display());
                report.duration = self.scan(&path, stop).await?;
                report.did_scan = true;
            }
        }

        Ok(report)
    }

    async fn scan(&self, path: &Path, stop: Option<&mut StopReceiver>) -> Result<f64> {
        let args = args!["-nostats", "-hide_banner", "-i", path.to_string_lossy(), "-f", "null", "-"];
        let finished = ToolRun::new("ffmpeg", &self.ffmpeg, args).run_raw(stop).await?;
        if !finished.status.success() {
            return Err(finished.failure("ffmpeg"));
        }
        parse_scan_output(&finished.stderr_text())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
}

fn lenient<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<f64>, D::Error> {
    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Number(value)) => Some(value),
        Some(Lenient::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

/// Number or numeric string, anything else is 0
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(lenient(deserializer)?.filter(|value| value.is_finite()).unwrap_or(0.0))
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    Ok(lenient(deserializer)?
        .filter(|value| *value >= 0.0 && *value <= u32::MAX as f64)
        .map_or(0, |value| value as u32))
}

/// `"num/den"` or a plain number; undefined ratios are 0
fn ratio_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    let rate = match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Number(value)) => value,
        Some(Lenient::Text(text)) => match text.split_once('/') {
            Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
                (Ok(num), Ok(den)) => num / den,
                _ => 0.0,
            },
            None => text.trim().parse().unwrap_or(0.0),
        },
        None => 0.0,
    };
    Ok(if rate.is_finite() { rate } else { 0.0 })
}
