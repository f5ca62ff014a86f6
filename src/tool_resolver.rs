//! # Tool Path Resolver
//!
//! This module handles finding the external binaries:
//! - A configured tools directory (`Config::tools_dir`)
//! - The `MEDIAKIT_TOOLS_DIR` environment variable
//! - The system `PATH`
//!
//! A tool that cannot be found resolves to its bare executable name so that
//! spawning it reports a `MissingDependency` error at the call site.

use crate::platform::Tool;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the tools directory
pub const TOOLS_DIR_ENV: &str = "MEDIAKIT_TOOLS_DIR";

/// Tool path resolver for different deployment environments
#[derive(Debug, Clone, Default)]
pub struct ToolPathResolver {
    /// Directory searched before `PATH`
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver. `tools_dir` wins over the environment variable.
    pub fn new(tools_dir: Option<PathBuf>) -> Self {
        let tools_dir = tools_dir.or_else(|| env::var_os(TOOLS_DIR_ENV).map(PathBuf::from));
        Self { tools_dir }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool: Tool) -> Option<PathBuf> {
        for name in tool.executable_names() {
            if let Some(ref tools_dir) = self.tools_dir {
                // tools/{name} or tools/{os}/{name}
                let candidates = [tools_dir.join(&name), tools_dir.join(env::consts::OS).join(&name)];
                if let Some(found) = candidates.into_iter().find(|path| path.is_file()) {
                    debug!("Using bundled tool: {} -> {:?}", tool, found);
                    return Some(found);
                }
            }

            if let Some(system_path) = find_in_system_path(&name) {
                debug!("Using system tool: {} -> {:?}", tool, system_path);
                return Some(system_path);
            }
        }

        debug!("Tool not found: {}", tool);
        None
    }

    /// Resolved path, or the bare executable name when nothing was found
    pub fn program(&self, tool: Tool) -> PathBuf {
        self.resolve_tool(tool).unwrap_or_else(|| {
            let names = tool.executable_names();
            PathBuf::from(names.into_iter().next().unwrap_or_else(|| tool.base_name().to_string()))
        })
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool: Tool) -> bool {
        self.resolve_tool(tool).is_some()
    }

    /// Resolve every tool at once
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            ffmpeg: self.program(Tool::Ffmpeg),
            ffprobe: self.program(Tool::Ffprobe),
            vips: self.program(Tool::Vips),
            vipsheader: self.program(Tool::VipsHeader),
            chromium: self.program(Tool::Chromium),
        }
    }

    /// Get a report of tool availability
    pub fn get_tools_report(&self) -> String {
        let mut report = String::new();
        report.push_str("Tool Path Resolver Report\n");
        report.push_str(&format!("Platform: {}\n", crate::platform::system_info()));
        report.push_str(&format!("Tools dir: {:?}\n", self.tools_dir));
        report.push_str("\nTool Availability:\n");

        for tool in Tool::ALL {
            match self.resolve_tool(tool) {
                Some(path) => report.push_str(&format!("  ✅ {} -> {:?}\n", tool, path)),
                None => report.push_str(&format!("  ❌ {} (install with: {})\n", tool, tool.install_hint())),
            }
        }

        report
    }
}

/// Find tool in system PATH
fn find_in_system_path(executable: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(executable))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Paths of every external binary used by the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub vips: PathBuf,
    pub vipsheader: PathBuf,
    pub chromium: PathBuf,
}

impl ToolPaths {
    /// Resolve using an optional tools directory
    pub fn resolve(tools_dir: Option<PathBuf>) -> Self {
        ToolPathResolver::new(tools_dir).tool_paths()
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::resolve(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tools_dir_takes_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let fake = temp_dir.path().join(Tool::Ffprobe.executable_names()[0].clone());
        std::fs::write(&fake, "#!/bin/sh\n").unwrap();

        let resolver = ToolPathResolver::new(Some(temp_dir.path().to_path_buf()));
        assert_eq!(resolver.resolve_tool(Tool::Ffprobe), Some(fake.clone()));
        assert_eq!(resolver.tool_paths().ffprobe, fake);
    }

    #[test]
    fn test_os_subdirectory_is_searched() {
        let temp_dir = TempDir::new().unwrap();
        let os_dir = temp_dir.path().join(env::consts::OS);
        std::fs::create_dir_all(&os_dir).unwrap();
        let fake = os_dir.join(Tool::Vips.executable_names()[0].clone());
        std::fs::write(&fake, "").unwrap();

        let resolver = ToolPathResolver::new(Some(temp_dir.path().to_path_buf()));
        assert_eq!(resolver.resolve_tool(Tool::Vips), Some(fake));
    }

    #[test]
    fn test_program_falls_back_to_bare_name() {
        let resolver = ToolPathResolver {
            tools_dir: Some(PathBuf::from("/definitely/not/here")),
        };
        let program = resolver.program(Tool::VipsHeader);
        if !resolver.is_tool_available(Tool::VipsHeader) {
            assert_eq!(program, PathBuf::from(Tool::VipsHeader.executable_names()[0].clone()));
        }
    }

    #[test]
    fn test_tools_report_lists_every_tool() {
        let report = ToolPathResolver::default().get_tools_report();
        for tool in Tool::ALL {
            assert!(report.contains(tool.base_name()));
        }
    }
}
