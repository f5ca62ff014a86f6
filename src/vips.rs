//! # Image Tool (libvips)
//!
//! Questo modulo gestisce la conversione e l'analisi delle immagini con i
//! comandi `vips` e `vipsheader`.
//!
//! ## Responsabilità:
//! - Ridimensiona e converte con `vips thumbnail_source` (stdin -> stdout)
//! - Legge dimensioni, bande, spazio colore, formato, pagine e delay con `vipsheader -a`
//! - Concatena più operazioni `vips <op> stdin ...` (stdout -> stdin del successivo)
//! - Classifica gli errori come per ffmpeg (prima riga dello stderr)
//!
//! ## Preset disponibili:
//! - `jpg-web`: JPEG Q=90, metadati rimossi, codifica ottimizzata
//! - `png-web`: PNG Q=90, metadati rimossi
//! - `webp`: WebP Q=90, metadati rimossi, smart subsampling

use crate::args;
use crate::endpoint::{Input, Output};
use crate::error::{MediaError, Result};
use crate::process::{fds, wait_for_stop, ChildInput, ChildOutput, Finished, StopReceiver, ToolRun};
use crate::tool_resolver::ToolPaths;
use crate::utils::first_non_empty_line;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Output presets of the image tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VipsPreset {
    JpgWeb,
    PngWeb,
    WebP,
}

impl VipsPreset {
    pub const ALL: [VipsPreset; 3] = [VipsPreset::JpgWeb, VipsPreset::PngWeb, VipsPreset::WebP];

    /// Output format argument: extension plus save options
    pub fn arg(self) -> &'static str {
        match self {
            VipsPreset::JpgWeb => ".jpg[Q=90,strip,optimize_coding]",
            VipsPreset::PngWeb => ".png[Q=90,strip]",
            VipsPreset::WebP => ".webp[Q=90,strip,smart_subsample]",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VipsPreset::JpgWeb => "jpg-web",
            VipsPreset::PngWeb => "png-web",
            VipsPreset::WebP => "webp",
        }
    }
}

impl fmt::Display for VipsPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VipsPreset {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        VipsPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| MediaError::InvalidPreset(s.to_string()))
    }
}

impl TryFrom<u8> for VipsPreset {
    type Error = MediaError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1..=3 => Ok(VipsPreset::ALL[value as usize - 1]),
            other => Err(MediaError::InvalidPreset(other.to_string())),
        }
    }
}

/// Options of a single image conversion
#[derive(Debug, Clone)]
pub struct VipsOptions {
    pub preset: VipsPreset,
    /// Target width, required by `thumbnail_source`
    pub width: i32,
    /// Optional target height, 0 = derived from the width
    pub height: i32,
    /// Fill the box and crop the overflow
    pub crop: bool,
    /// Keep the embedded profile instead of exporting sRGB
    pub keep_profile: bool,
    /// Ignore the orientation metadata
    pub no_rotate: bool,
}

impl VipsOptions {
    pub fn new(preset: VipsPreset, width: i32) -> Self {
        Self {
            preset,
            width,
            height: 0,
            crop: false,
            keep_profile: false,
            no_rotate: false,
        }
    }

    pub fn with_height(mut self, height: i32) -> Self {
        self.height = height;
        self
    }

    pub fn with_crop(mut self, crop: bool) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_keep_profile(mut self, keep_profile: bool) -> Self {
        self.keep_profile = keep_profile;
        self
    }

    pub fn with_no_rotate(mut self, no_rotate: bool) -> Self {
        self.no_rotate = no_rotate;
        self
    }

    pub fn build_args(&self) -> Result<Vec<String>> {
        if self.width <= 0 || self.height < 0 {
            return Err(MediaError::InvalidOptions(format!(
                "invalid thumbnail size {}x{}",
                self.width, self.height
            )));
        }

        let mut args = args!["thumbnail_source", "[descriptor=0]", self.preset.arg(), self.width];
        if self.height != 0 {
            args.extend(args!["--height", self.height]);
        }
        if self.crop {
            args.extend(args!["--crop", "centre"]);
        }
        if !self.keep_profile {
            args.extend(args!["--export-profile", "srgb"]);
        }
        if self.no_rotate {
            args.push("--no-rotate".to_string());
        }
        Ok(args)
    }
}

/// Header information reported by `vipsheader`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VipsReport {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub color: String,
    /// Loader name without the `load_source` suffix (`jpeg`, `png`, `gif`, ...)
    pub format: String,
    pub pages: u32,
    /// Per-frame delays of animations, in milliseconds
    pub delay: Vec<u32>,
}

/// Parse `vipsheader -a` output.
///
/// The first line reads `stdin: 800x450 uchar, 3 bands, srgb, jpegload_source`;
/// the remaining lines are `field: value` pairs.
pub fn parse_header(text: &str) -> Result<VipsReport> {
    let invalid = || MediaError::Parse(format!("unexpected vipsheader output: {:?}", text.lines().next().unwrap_or("")));

    let first = text.lines().next().ok_or_else(invalid)?;
    let summary = first.split_once(':').map_or(first, |(_, rest)| rest).trim();
    let parts: Vec<&str> = summary.split(", ").collect();
    if parts.len() < 4 {
        return Err(invalid());
    }

    let dimensions = parts[0].split_whitespace().next().ok_or_else(invalid)?;
    let (width, height) = dimensions.split_once('x').ok_or_else(invalid)?;
    let width = width.parse().map_err(|_| invalid())?;
    let height = height.parse().map_err(|_| invalid())?;

    let bands = parts[1]
        .split_whitespace()
        .next()
        .and_then(|bands| bands.parse().ok())
        .ok_or_else(invalid)?;

    let mut report = VipsReport {
        width,
        height,
        bands,
        color: parts[2].to_string(),
        format: parts[3].trim_end_matches("load_source").to_string(),
        pages: 1,
        delay: Vec::new(),
    };

    for line in text.lines().skip(1) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "n-pages" => {
                if let Ok(pages) = value.trim().parse() {
                    report.pages = pages;
                }
            }
            "delay" => {
                report.delay = value.split_whitespace().filter_map(|d| d.parse().ok()).collect();
            }
            _ => {}
        }
    }

    Ok(report)
}

/// Runs `vips` and `vipsheader`
#[derive(Debug, Clone)]
pub struct Vips {
    vips: PathBuf,
    vipsheader: PathBuf,
}

impl Vips {
    pub fn new(vips: PathBuf, vipsheader: PathBuf) -> Self {
        Self { vips, vipsheader }
    }

    pub fn from_paths(paths: &ToolPaths) -> Self {
        Self::new(paths.vips.clone(), paths.vipsheader.clone())
    }

    /// Convert `input` to `output`. Both always travel through stdin/stdout.
    pub async fn convert(
        &self,
        input: Input<'_>,
        output: Output<'_>,
        opts: &VipsOptions,
        stop: Option<&mut StopReceiver>,
    ) -> Result<()> {
        let args = opts.build_args()?;
        let stdin = open_input(input)?;
        let stdout = open_output(output)?;

        let stderr = ToolRun::new("vips", &self.vips, args)
            .stdin(stdin)
            .stdout(stdout)
            .run(stop)
            .await?;
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            debug!("vips: {}", line);
        }
        Ok(())
    }

    /// Run several operations, each one's stdout feeding the next one's stdin.
    ///
    /// An operation is a standard vips command line without the `vips`
    /// program and without the `stdin` input, e.g. `["sharpen", ".v"]`.
    ///
    /// ```rust,ignore
    /// let ops = vec![args!["rot90", ".v"], args!["invert", ".png"]];
    /// vips.pipeline(&ops, Input::File(&photo), Output::Stream(&mut png), None).await?;
    /// ```
    pub async fn pipeline(
        &self,
        ops: &[Vec<String>],
        input: Input<'_>,
        output: Output<'_>,
        stop: Option<&mut StopReceiver>,
    ) -> Result<()> {
        let Some((last, rest)) = ops.split_last() else {
            return Err(MediaError::InvalidOptions("no vips operations".to_string()));
        };
        if ops.iter().any(|op| op.is_empty()) {
            return Err(MediaError::InvalidOptions("empty vips operation".to_string()));
        }

        let mut stdin = open_input(input)?;
        let stdout = open_output(output)?;

        let mut runs = Vec::with_capacity(ops.len());
        for op in rest {
            let (read, write) = fds::pipe().map_err(|e| MediaError::process("vips", e))?;
            runs.push(self.operation(op, stdin, ChildOutput::File(write)));
            stdin = ChildInput::File(read);
        }
        runs.push(self.operation(last, stdin, stdout));

        debug!("vips pipeline of {} operation(s)", ops.len());
        let results = tokio::select! {
            biased;
            // dropping the runs kills every child
            _ = wait_for_stop(stop) => return Err(MediaError::Cancelled),
            results = futures::future::join_all(runs.into_iter().map(|run| run.run_raw(None))) => results,
        };

        let mut failure = None;
        for (op, result) in ops.iter().zip(results) {
            let finished = result?;
            if failure.is_none() && !finished.status.success() {
                failure = Some(pipeline_failure(&op[0], &finished));
            }
        }
        failure.map_or(Ok(()), Err)
    }

    fn operation<'a>(&'a self, op: &[String], stdin: ChildInput<'a>, stdout: ChildOutput<'a>) -> ToolRun<'a> {
        let mut args = vec![op[0].clone(), "stdin".to_string()];
        args.extend_from_slice(&op[1..]);
        ToolRun::new("vips", &self.vips, args).stdin(stdin).stdout(stdout)
    }

    pub async fn analyze(&self, input: Input<'_>, stop: Option<&mut StopReceiver>) -> Result<VipsReport> {
        let stdin = open_input(input)?;
        let mut stdout = Vec::new();
        ToolRun::new("vipsheader", &self.vipsheader, args!["-a", "stdin"])
            .stdin(stdin)
            .stdout(ChildOutput::Stream(&mut stdout))
            .run(stop)
            .await?;

        let report = parse_header(&String::from_utf8_lossy(&stdout))?;
        debug!("vipsheader: {}x{} {}", report.width, report.height, report.format);
        Ok(report)
    }
}

/// `vips: <op>: <diagnostic>` for a failed pipeline stage
fn pipeline_failure(op: &str, finished: &Finished) -> MediaError {
    let stderr = finished.stderr_text();
    let detail = match first_non_empty_line(&stderr) {
        Some(line) => line.to_lowercase(),
        None => finished.status.to_string(),
    };
    MediaError::failed("vips", format!("vips: {}: {}", op, detail))
}

fn open_output<'a: 'b, 'b>(output: Output<'a>) -> Result<ChildOutput<'b>> {
    Ok(match output {
        Output::File(path) => ChildOutput::File(std::fs::File::create(path)?),
        Output::Stream(writer) => ChildOutput::Stream(writer),
    })
}

fn open_input<'a: 'b, 'b>(input: Input<'a>) -> Result<ChildInput<'b>> {
    Ok(match input {
        Input::File(path) => ChildInput::File(std::fs::File::open(path)?),
        Input::Stream(reader) => ChildInput::Stream(reader),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(VipsPreset::JpgWeb.arg(), ".jpg[Q=90,strip,optimize_coding]");
        assert_eq!("png-web".parse::<VipsPreset>().unwrap(), VipsPreset::PngWeb);
        assert_eq!(VipsPreset::try_from(3).unwrap(), VipsPreset::WebP);
        assert!(VipsPreset::try_from(0).is_err());
        assert!("gif".parse::<VipsPreset>().is_err());
        assert_eq!(serde_json::to_string(&VipsPreset::JpgWeb).unwrap(), "\"jpg-web\"");
        assert_eq!(serde_json::from_str::<VipsPreset>("\"webp\"").unwrap(), VipsPreset::WebP);
    }

    #[test]
    fn test_build_args() {
        let args = VipsOptions::new(VipsPreset::JpgWeb, 300).build_args().unwrap();
        assert_eq!(
            args,
            args!["thumbnail_source", "[descriptor=0]", ".jpg[Q=90,strip,optimize_coding]", "300", "--export-profile", "srgb"]
        );

        let args = VipsOptions::new(VipsPreset::PngWeb, 64)
            .with_height(64)
            .with_crop(true)
            .with_keep_profile(true)
            .with_no_rotate(true)
            .build_args()
            .unwrap();
        assert_eq!(
            args,
            args!["thumbnail_source", "[descriptor=0]", ".png[Q=90,strip]", "64", "--height", "64", "--crop", "centre", "--no-rotate"]
        );

        assert!(matches!(
            VipsOptions::new(VipsPreset::WebP, 0).build_args(),
            Err(MediaError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_parse_header() {
        let text = "stdin: 800x450 uchar, 3 bands, srgb, jpegload_source\n\
                    width: 800\n\
                    height: 450\n\
                    bands: 3\n";
        let report = parse_header(text).unwrap();
        assert_eq!(
            report,
            VipsReport {
                width: 800,
                height: 450,
                bands: 3,
                color: "srgb".to_string(),
                format: "jpeg".to_string(),
                pages: 1,
                delay: vec![],
            }
        );
    }

    #[test]
    fn test_parse_animated_header() {
        let text = "stdin: 100x100 uchar, 4 bands, srgb, gifload_source\n\
                    n-pages: 3\n\
                    delay: 40 40 80\n";
        let report = parse_header(text).unwrap();
        assert_eq!(report.format, "gif");
        assert_eq!(report.bands, 4);
        assert_eq!(report.pages, 3);
        assert_eq!(report.delay, vec![40, 40, 80]);
    }

    #[test]
    fn test_parse_header_rejects_garbage() {
        assert!(matches!(parse_header(""), Err(MediaError::Parse(_))));
        assert!(matches!(parse_header("stdin: nonsense"), Err(MediaError::Parse(_))));
        assert!(matches!(parse_header("stdin: AxB uchar, 3 bands, srgb, pngload_source"), Err(MediaError::Parse(_))));
    }
}
