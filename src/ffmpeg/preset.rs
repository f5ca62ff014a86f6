//! # Conversion presets and command builder
//!
//! Each `Preset` maps to one row of `PRESETS`: output arguments, filter
//! chain, scale flags and whether a palette pre-pass is needed. `build_args`
//! turns a preset plus `ConvertOptions` into the ffmpeg command line.

use crate::args;
use crate::error::{MediaError, Result};
use crate::ffmpeg::progress::ProgressCallback;
use crate::process::fds;
use crate::utils::{format_float, to_string_vec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output presets for the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preset {
    /// Standard MP3 variable bit rate encoding
    #[serde(rename = "audio-mp3-vbr-standard")]
    AudioMp3VbrStandard,
    /// Fast MP4 H.264/AAC encoding with bt709 normalization
    #[serde(rename = "video-mp4-h264-aac-fast")]
    VideoMp4H264AacFast,
    #[serde(rename = "image-jpeg")]
    ImageJpeg,
    #[serde(rename = "image-png")]
    ImagePng,
    #[serde(rename = "image-webp")]
    ImageWebp,
    /// Palette quantized GIF, needs a palette pre-pass
    #[serde(rename = "anim-gif")]
    AnimGif,
    #[serde(rename = "anim-webp")]
    AnimWebp,
}

/// Static description of a preset
#[derive(Debug)]
pub struct PresetSpec {
    pub preset: Preset,
    pub name: &'static str,
    /// Output arguments
    pub args: &'static [&'static str],
    /// Extra output arguments when writing to a stream
    pub stream_args: &'static [&'static str],
    pub filters: &'static [&'static str],
    pub scale_flags: &'static str,
    pub palette: bool,
    /// Codec name ffprobe reports for the produced stream
    pub codec: &'static str,
}

const IMAGE2: [&str; 6] = ["-f", "image2", "-update", "1", "-frames:v", "1"];

/// One row per `Preset`, in declaration order
pub static PRESETS: [PresetSpec; 7] = [
    PresetSpec {
        preset: Preset::AudioMp3VbrStandard,
        name: "audio-mp3-vbr-standard",
        args: &[
            "-f", "mp3",
            "-codec:a", "libmp3lame",
            "-q:a", "2", // 170-210 kbit/s
            "-ac", "2",
        ],
        stream_args: &[],
        filters: &[],
        scale_flags: "",
        palette: false,
        codec: "mp3",
    },
    PresetSpec {
        preset: Preset::VideoMp4H264AacFast,
        name: "video-mp4-h264-aac-fast",
        args: &[
            "-f", "mp4",
            "-codec:v", "libx264",
            "-preset:v", "fast",
            "-colorspace:v", "bt709",
            "-color_primaries:v", "bt709",
            "-color_trc:v", "bt709",
            "-color_range:v", "tv",
            "-movflags", "+faststart",
            "-codec:a", "aac",
            "-q:a", "4", // 64-72 kbit/s/ch
            "-ac", "2",
        ],
        // mp4 can't seek back on a pipe
        stream_args: &["-movflags", "frag_keyframe"],
        filters: &[
            // h264 requires even dimensions
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "format=yuv420p",
            "scale=in_color_matrix=auto:in_range=auto:out_color_matrix=bt709:out_range=tv",
        ],
        scale_flags: "",
        palette: false,
        codec: "h264",
    },
    PresetSpec {
        preset: Preset::ImageJpeg,
        name: "image-jpeg",
        args: &[
            IMAGE2[0], IMAGE2[1], IMAGE2[2], IMAGE2[3], IMAGE2[4], IMAGE2[5],
            "-codec:v", "mjpeg",
            "-q:v", "3",
        ],
        stream_args: &[],
        filters: &["format=yuvj444p"],
        scale_flags: "",
        palette: false,
        codec: "mjpeg",
    },
    PresetSpec {
        preset: Preset::ImagePng,
        name: "image-png",
        args: &[
            IMAGE2[0], IMAGE2[1], IMAGE2[2], IMAGE2[3], IMAGE2[4], IMAGE2[5],
            "-codec:v", "png",
        ],
        stream_args: &[],
        filters: &["format=rgb24"],
        scale_flags: "",
        palette: false,
        codec: "png",
    },
    PresetSpec {
        preset: Preset::ImageWebp,
        name: "image-webp",
        args: &[
            IMAGE2[0], IMAGE2[1], IMAGE2[2], IMAGE2[3], IMAGE2[4], IMAGE2[5],
            "-codec:v", "libwebp",
            "-q:v", "90",
        ],
        stream_args: &[],
        filters: &[],
        scale_flags: "",
        palette: false,
        codec: "webp",
    },
    PresetSpec {
        preset: Preset::AnimGif,
        name: "anim-gif",
        args: &[
            "-f", "gif",
            "-codec:v", "gif",
            "-q:v", "3",
            "-loop", "0",
        ],
        stream_args: &[],
        filters: &[],
        scale_flags: ":flags=lanczos",
        palette: true,
        codec: "gif",
    },
    PresetSpec {
        preset: Preset::AnimWebp,
        name: "anim-webp",
        args: &[
            "-f", "webp",
            "-codec:v", "libwebp",
            "-preset:v", "default",
            "-q:v", "90",
            "-compression_level", "6",
            "-loop", "0",
        ],
        stream_args: &[],
        filters: &[],
        scale_flags: "",
        palette: false,
        codec: "webp",
    },
];

impl Preset {
    pub const ALL: [Preset; 7] = [
        Preset::AudioMp3VbrStandard,
        Preset::VideoMp4H264AacFast,
        Preset::ImageJpeg,
        Preset::ImagePng,
        Preset::ImageWebp,
        Preset::AnimGif,
        Preset::AnimWebp,
    ];

    pub fn spec(self) -> &'static PresetSpec {
        &PRESETS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Output arguments, with the stream extras when not writing to a file
    pub fn args(self, output_is_file: bool) -> Vec<&'static str> {
        let spec = self.spec();
        let mut args = spec.args.to_vec();
        if !output_is_file {
            args.extend_from_slice(spec.stream_args);
        }
        args
    }

    pub fn filters(self) -> &'static [&'static str] {
        self.spec().filters
    }

    pub fn scale_flags(self) -> &'static str {
        self.spec().scale_flags
    }

    pub fn needs_palette(self) -> bool {
        self.spec().palette
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| MediaError::InvalidPreset(s.to_string()))
    }
}

/// Presets are also addressable by their 1-based number; 0 is never valid.
impl TryFrom<u8> for Preset {
    type Error = MediaError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1..=7 => Ok(Preset::ALL[value as usize - 1]),
            other => Err(MediaError::InvalidPreset(other.to_string())),
        }
    }
}

/// Conversion options for a single pipeline run
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub preset: Preset,
    /// Start of the output in seconds, 0 = from the beginning
    pub start: f64,
    /// Output duration limit in seconds, 0 = unlimited
    pub duration: f64,
    /// Scale target, 0 = untouched axis, -1 = keep aspect ratio
    pub width: i32,
    pub height: i32,
    /// Forced frame rate, 0 = keep
    pub frame_rate: f64,
    /// Forced sample rate, 0 = keep
    pub sample_rate: u32,
    pub progress: Option<ProgressCallback>,
}

impl ConvertOptions {
    pub fn new(preset: Preset) -> Self {
        Self {
            preset,
            start: 0.0,
            duration: 0.0,
            width: 0,
            height: 0,
            frame_rate: 0.0,
            sample_rate: 0,
            progress: None,
        }
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_size(mut self, width: i32, height: i32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Progress callback, if one is set with a positive rate
    pub fn active_progress(&self) -> Option<&ProgressCallback> {
        self.progress.as_ref().filter(|progress| progress.is_enabled())
    }

    /// Reject values the transcoder would misinterpret
    pub fn validate(&self) -> Result<()> {
        let non_negative = |name: &str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(MediaError::InvalidOptions(format!("{} must be a non-negative number, got {}", name, value)))
            }
        };
        non_negative("start", self.start)?;
        non_negative("duration", self.duration)?;
        non_negative("frame rate", self.frame_rate)?;

        if self.width < -1 || self.height < -1 {
            return Err(MediaError::InvalidOptions(format!(
                "invalid scale {}x{}",
                self.width, self.height
            )));
        }
        if self.width == -1 && self.height == -1 {
            return Err(MediaError::InvalidOptions("only one scale axis may be -1".to_string()));
        }

        Ok(())
    }
}

/// How the pipeline is wired for one run
#[derive(Debug, Clone, Default)]
pub struct Layout {
    /// Input path, `None` reads from stdin
    pub input: Option<String>,
    /// Output path, `None` writes to stdout
    pub output: Option<String>,
    pub palette: bool,
}

/// Build the ordered ffmpeg argument list.
///
/// Order: trim start, inputs, progress channel, filters, preset output
/// arguments, duration/rate options, output reference.
pub fn build_args(opts: &ConvertOptions, layout: &Layout) -> Result<Vec<String>> {
    opts.validate()?;
    let preset = opts.preset;

    let mut args = args!["-nostats", "-hide_banner", "-loglevel", "repeat+warning", "-y"];

    if opts.start != 0.0 {
        args.extend(args!["-ss", format_float(opts.start)]);
    }

    args.push("-i".to_string());
    args.push(layout.input.clone().unwrap_or_else(|| "pipe:".to_string()));
    if layout.palette {
        args.extend(args!["-i", format!("pipe:{}", fds::PALETTE_FD)]);
    }

    if let Some(progress) = opts.active_progress() {
        args.extend(args![
            "-progress",
            format!("pipe:{}", fds::progress_fd(layout.palette)),
            "-stats_period",
            format_float(progress.rate.as_secs_f64()),
        ]);
    }

    let mut filters = Vec::new();
    if opts.width != 0 || opts.height != 0 {
        filters.push(format!("scale={}:{}{}", opts.width, opts.height, preset.scale_flags()));
    }
    filters.extend(to_string_vec(preset.filters()));

    match (filters.is_empty(), layout.palette) {
        (false, false) => args.extend(args!["-filter:v", filters.join(", ")]),
        (false, true) => args.extend(args![
            "-filter_complex",
            format!("[0:v]{}[x];[x][1:v]paletteuse", filters.join(","))
        ]),
        (true, true) => args.extend(args!["-filter_complex", "[0:v][1:v]paletteuse"]),
        (true, false) => {}
    }

    args.extend(to_string_vec(preset.args(layout.output.is_some())));

    if opts.duration != 0.0 {
        args.extend(args!["-t", format_float(opts.duration)]);
    }
    if opts.frame_rate != 0.0 {
        args.extend(args!["-r", format_float(opts.frame_rate)]);
    }
    if opts.sample_rate != 0 {
        args.extend(args!["-ar", opts.sample_rate]);
    }

    args.push(layout.output.clone().unwrap_or_else(|| "pipe:".to_string()));
    Ok(args)
}

/// Arguments of the palette pre-pass: a PNG palette written to stdout
pub fn palette_args(input: &str) -> Vec<String> {
    args![
        "-nostats", "-hide_banner", "-loglevel", "repeat+warning", "-y", "-i", input,
        "-vf", "palettegen", "-f", "image2pipe", "-vcodec", "png", "pipe:",
    ]
}
