//! # Progress Reporting Module
//!
//! Questo modulo collega il progress del `Processor` alla console.
//!
//! ## Responsabilità:
//! - Progress bar visuale con `indicatif` per le conversioni audio/video
//! - Spinner per le operazioni senza durata nota (analisi, immagini, screenshot)
//! - Formattazione delle dimensioni dei file nei messaggi finali
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [██████████████████████>-----------------] 55% clip.mp4
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let progress = ProgressManager::new("clip.mp4");
//! processor
//!     .convert_video_file(&input, &output, &keep_size(), Some(&progress.handler(Duration::from_millis(500))))
//!     .await?;
//! progress.finish("✅ clip.mp4 converted");
//! ```

use crate::processor::ProgressHandler;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Positions per full bar; fractions are mapped onto this range
const RESOLUTION: u64 = 1000;

/// Console progress for a single conversion
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress bar labelled with `message`
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(RESOLUTION);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A handler that moves the bar, receiving updates every `rate`
    pub fn handler(&self, rate: Duration) -> ProgressHandler {
        let bar = self.bar.clone();
        ProgressHandler::new(rate, move |fraction| bar.set_position(position(fraction)))
    }

    /// Set a custom message
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Fill the bar and finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.set_position(RESOLUTION);
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop where the bar is, leaving it on screen
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

fn position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * RESOLUTION as f64).round() as u64
}

/// Human readable size (`1536` -> `"1.50 KB"`)
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
