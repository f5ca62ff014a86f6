//! # Screenshot capture (headless Chromium)
//!
//! Questo modulo cattura uno screenshot PNG di un URL con Chromium headless.
//!
//! ## Responsabilità:
//! - Costruisce la riga di comando (`--headless --screenshot=...`)
//! - Limita l'intera cattura a `wait + 30s` (errore `Timeout`)
//! - Pagina intera: viewport esteso, poi rimozione delle righe vuote in fondo
//! - Modalità pedantic: fallisce se la pagina registra errori in console

use crate::args;
use crate::error::{MediaError, Result};
use crate::process::{StopReceiver, ToolRun};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Time allowed on top of the requested wait
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

/// Viewport height used to render full-page captures
pub const FULL_PAGE_HEIGHT: u32 = 16384;

#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    pub width: u32,
    pub height: u32,
    /// Device scale factor
    pub scale: f64,
    /// Capture the whole page instead of the viewport
    pub full: bool,
    /// Extra time for the page to settle before capturing
    pub wait: Duration,
    /// Fail when the page logs console errors
    pub pedantic: bool,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            scale: 1.0,
            full: false,
            wait: Duration::ZERO,
            pedantic: false,
        }
    }
}

/// Runs a headless Chromium
#[derive(Debug, Clone)]
pub struct Chromium {
    program: PathBuf,
    no_sandbox: bool,
    grace: Duration,
}

impl Chromium {
    pub fn new(program: PathBuf, no_sandbox: bool) -> Self {
        Self {
            program,
            no_sandbox,
            grace: DEFAULT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Capture `url` as PNG bytes
    pub async fn screenshot(
        &self,
        url: &str,
        opts: &ScreenshotOptions,
        stop: Option<&mut StopReceiver>,
    ) -> Result<Vec<u8>> {
        let profile = tempfile::Builder::new().prefix("mediakit-chromium-").tempdir()?;
        let shot = profile.path().join("shot.png");
        let args = build_args(url, opts, &shot, profile.path(), self.no_sandbox)?;

        info!("Capturing {}", url);
        let limit = opts.wait + self.grace;
        let run = ToolRun::new("chromium", &self.program, args).run(stop);
        // dropping the run kills the browser
        let stderr = tokio::time::timeout(limit, run)
            .await
            .map_err(|_| MediaError::Timeout(format!("screenshot of {} after {:?}", url, limit)))??;

        if opts.pedantic {
            let errors = console_errors(&stderr);
            if !errors.is_empty() {
                return Err(MediaError::failed("chromium", format!("log errors: {}", errors.join("; "))));
            }
        }

        let png = match tokio::fs::read(&shot).await {
            Ok(png) => png,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MediaError::failed("chromium", "no screenshot was written"));
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Screenshot of {} bytes", png.len());

        if opts.full {
            let min_height = (opts.height as f64 * opts.scale).round() as u32;
            return trim_bottom(&png, min_height);
        }
        Ok(png)
    }
}

pub fn build_args(
    url: &str,
    opts: &ScreenshotOptions,
    shot: &Path,
    profile: &Path,
    no_sandbox: bool,
) -> Result<Vec<String>> {
    if url.trim().is_empty() {
        return Err(MediaError::InvalidOptions("missing url".to_string()));
    }
    if opts.width == 0 || opts.height == 0 || !(opts.scale > 0.0) || !opts.scale.is_finite() {
        return Err(MediaError::InvalidOptions(format!(
            "invalid viewport {}x{}@{}",
            opts.width, opts.height, opts.scale
        )));
    }

    let height = if opts.full {
        opts.height.max(FULL_PAGE_HEIGHT)
    } else {
        opts.height
    };

    let mut args = args![
        "--headless",
        "--disable-gpu",
        "--hide-scrollbars",
        "--no-first-run",
        "--enable-logging=stderr",
        format!("--user-data-dir={}", profile.display()),
        format!("--window-size={},{}", opts.width, height),
        format!("--force-device-scale-factor={}", opts.scale),
        format!("--screenshot={}", shot.display()),
    ];
    if !opts.wait.is_zero() {
        args.push(format!("--virtual-time-budget={}", opts.wait.as_millis()));
    }
    if no_sandbox {
        args.push("--no-sandbox".to_string());
    }
    args.push(url.to_string());
    Ok(args)
}

/// Console messages of level error found in Chromium's log output.
///
/// Chromium logs console messages with the page's level as severity, e.g.
/// `[1019/101010.123:ERROR:CONSOLE(3)] "Uncaught ...", source: ... (3)`.
pub fn console_errors(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .filter(|line| line.contains(":ERROR:CONSOLE"))
        .map(|line| match line.find("] ") {
            Some(index) => line[index + 2..].trim().to_string(),
            None => line.trim().to_string(),
        })
        .collect()
}

/// Drop trailing rows that only repeat the bottom background color, keeping
/// at least `min_height` rows.
pub fn trim_bottom(png: &[u8], min_height: u32) -> Result<Vec<u8>> {
    let image = image::load_from_memory_with_format(png, ImageFormat::Png)?.to_rgba8();
    let (width, height) = image.dimensions();
    if height == 0 {
        return Ok(png.to_vec());
    }

    let background = *image.get_pixel(0, height - 1);
    let mut last = height;
    while last > min_height.max(1) && (0..width).all(|x| *image.get_pixel(x, last - 1) == background) {
        last -= 1;
    }
    if last == height {
        return Ok(png.to_vec());
    }

    debug!("Trimming full-page capture from {} to {} rows", height, last);
    let cropped = image::imageops::crop_imm(&image, 0, 0, width, last).to_image();
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(cropped).write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png(image: RgbaImage) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_build_args() {
        let opts = ScreenshotOptions {
            width: 800,
            height: 600,
            scale: 2.0,
            wait: Duration::from_millis(1500),
            ..Default::default()
        };
        let args = build_args("https://example.com", &opts, Path::new("/tmp/s/shot.png"), Path::new("/tmp/s"), true)
            .unwrap();

        assert_eq!(args[0], "--headless");
        assert!(args.contains(&"--window-size=800,600".to_string()));
        assert!(args.contains(&"--force-device-scale-factor=2".to_string()));
        assert!(args.contains(&"--screenshot=/tmp/s/shot.png".to_string()));
        assert!(args.contains(&"--virtual-time-budget=1500".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert_eq!(args.last().unwrap(), "https://example.com");
    }

    #[test]
    fn test_full_page_extends_viewport() {
        let opts = ScreenshotOptions {
            full: true,
            ..Default::default()
        };
        let args = build_args("https://example.com", &opts, Path::new("shot.png"), Path::new("."), false).unwrap();
        assert!(args.contains(&format!("--window-size=1280,{}", FULL_PAGE_HEIGHT)));
        assert!(!args.contains(&"--no-sandbox".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--virtual-time-budget")));
    }

    #[test]
    fn test_invalid_options() {
        let opts = ScreenshotOptions::default();
        assert!(build_args(" ", &opts, Path::new("s.png"), Path::new("."), false).is_err());
        let opts = ScreenshotOptions {
            scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            build_args("https://example.com", &opts, Path::new("s.png"), Path::new("."), false),
            Err(MediaError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_console_errors() {
        let stderr = "[1019/101010.123:ERROR:CONSOLE(3)] \"Uncaught ReferenceError: foo is not defined\", source: https://example.com/ (3)\n\
                      [1019/101010.124:INFO:CONSOLE(4)] \"hello\", source: https://example.com/ (4)\n\
                      [1019/101010.125:WARNING:gpu_init.cc(1)] unrelated\n";
        let errors = console_errors(stderr);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("\"Uncaught ReferenceError"), "{}", errors[0]);
    }

    #[test]
    fn test_console_errors_use_the_level() {
        let stderr = "[1019/101010.123:INFO:CONSOLE(7)] \"no errors\", source: https://example.com/ (7)\n\
                      [1019/101010.124:WARNING:CONSOLE(8)] \"Error handler installed\", source: https://example.com/ (8)\n\
                      [1019/101010.125:ERROR:gpu_init.cc(1)] Passthrough is not supported\n";
        assert!(console_errors(stderr).is_empty());
    }

    #[test]
    fn test_trim_bottom() {
        let mut image = RgbaImage::from_pixel(4, 100, Rgba([255, 255, 255, 255]));
        for x in 0..4 {
            image.put_pixel(x, 29, Rgba([0, 0, 0, 255]));
        }
        let trimmed = trim_bottom(&png(image), 10).unwrap();
        let decoded = image::load_from_memory(&trimmed).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 30));
    }

    #[test]
    fn test_trim_bottom_keeps_min_height() {
        let image = RgbaImage::from_pixel(4, 100, Rgba([255, 255, 255, 255]));
        let trimmed = trim_bottom(&png(image), 40).unwrap();
        let decoded = image::load_from_memory(&trimmed).unwrap();
        assert_eq!(decoded.height(), 40);
    }

    #[test]
    fn test_trim_bottom_rejects_non_png() {
        assert!(matches!(trim_bottom(b"not a png", 1), Err(MediaError::Image(_))));
    }
}
