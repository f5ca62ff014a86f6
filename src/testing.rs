//! Test helpers: stand-in shell scripts for the external tools.

use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script named `name` into `dir`.
///
/// The file is written by a separate `sh` process so no writable descriptor
/// of it ever exists in the test process (exec would fail with ETXTBSY if a
/// concurrently forked child still held one).
pub(crate) fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!("#!/bin/sh\n{}\n", body);
    let status = std::process::Command::new("/bin/sh")
        .args(["-c", "printf '%s' \"$1\" > \"$2\" && chmod 755 \"$2\"", "sh"])
        .arg(&script)
        .arg(&path)
        .status()
        .expect("failed to write fake tool");
    assert!(status.success(), "failed to write fake tool {}", name);
    path
}

/// A fake tool that records every invocation into `<dir>/<name>.calls`
pub(crate) fn spy_tool(dir: &Path, name: &str, body: &str) -> (PathBuf, PathBuf) {
    let calls = dir.join(format!("{}.calls", name));
    let body = format!("echo \"$@\" >> '{}'\n{}", calls.display(), body);
    (fake_tool(dir, name, &body), calls)
}

/// Number of recorded invocations of a spy tool
pub(crate) fn spy_calls(calls: &Path) -> usize {
    std::fs::read_to_string(calls)
        .map(|text| text.lines().count())
        .unwrap_or(0)
}
