//! # Platform-specific utilities
//!
//! Questo modulo elenca i binari esterni usati dalla libreria e il nome
//! dell'eseguibile su ciascuna piattaforma.

use std::fmt;

/// External binaries driven by the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    Vips,
    VipsHeader,
    Chromium,
}

impl Tool {
    pub const ALL: [Tool; 5] = [
        Tool::Ffmpeg,
        Tool::Ffprobe,
        Tool::Vips,
        Tool::VipsHeader,
        Tool::Chromium,
    ];

    /// Base command name, also used as the tool label in errors
    pub fn base_name(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::Vips => "vips",
            Tool::VipsHeader => "vipsheader",
            Tool::Chromium => "chromium",
        }
    }

    /// Executable names to look for, in order of preference
    pub fn executable_names(self) -> Vec<String> {
        let names: &[&str] = match self {
            Tool::Chromium if cfg!(target_os = "macos") => &["chromium", "Google Chrome", "google-chrome"],
            Tool::Chromium => &["chromium", "chromium-browser", "google-chrome", "chrome"],
            other => return vec![executable(other.base_name())],
        };
        names.iter().map(|name| executable(name)).collect()
    }

    /// Package hint printed when the tool cannot be found
    pub fn install_hint(self) -> &'static str {
        if cfg!(target_os = "macos") {
            match self {
                Tool::Ffmpeg | Tool::Ffprobe => "brew install ffmpeg",
                Tool::Vips | Tool::VipsHeader => "brew install vips",
                Tool::Chromium => "brew install --cask chromium",
            }
        } else {
            match self {
                Tool::Ffmpeg | Tool::Ffprobe => "sudo apt-get install ffmpeg",
                Tool::Vips | Tool::VipsHeader => "sudo apt-get install libvips-tools",
                Tool::Chromium => "sudo apt-get install chromium",
            }
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_name())
    }
}

fn executable(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Get system information for debugging
pub fn system_info() -> SystemInfo {
    SystemInfo {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        family: std::env::consts::FAMILY,
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names() {
        assert_eq!(Tool::Ffmpeg.base_name(), "ffmpeg");
        assert_eq!(Tool::VipsHeader.to_string(), "vipsheader");

        for tool in Tool::ALL {
            let names = tool.executable_names();
            assert!(!names.is_empty());
            assert!(!tool.install_hint().is_empty());
        }
        assert!(Tool::Chromium.executable_names().len() > 1);
    }

    #[test]
    fn test_system_info() {
        let info = system_info();
        assert!(!info.os.is_empty());
        assert!(!info.arch.is_empty());
        assert!(!info.family.is_empty());
    }
}
