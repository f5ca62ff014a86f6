//! Input and output endpoints of a tool run.
//!
//! An endpoint is either file-backed (the tool gets the path and may seek) or
//! stream-only (wired through the child's stdin/stdout). Callers choose the
//! variant up front; nothing is inferred at runtime.

use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

/// Where a tool reads its media from
pub enum Input<'a> {
    /// A named on-disk file, seekable and resettable
    File(&'a Path),
    /// A one-shot byte stream
    Stream(&'a mut (dyn AsyncRead + Unpin + Send)),
}

/// Where a tool writes its result to
pub enum Output<'a> {
    File(&'a Path),
    Stream(&'a mut (dyn AsyncWrite + Unpin + Send)),
}

impl<'a> Input<'a> {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Input::File(path) => Some(path),
            Input::Stream(_) => None,
        }
    }

    /// Tool argument naming this input: the path, or `pipe:` for stdin
    pub fn ffmpeg_arg(&self) -> String {
        match self {
            Input::File(path) => path.to_string_lossy().into_owned(),
            Input::Stream(_) => "pipe:".to_string(),
        }
    }
}

impl<'a> Output<'a> {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Output::File(path) => Some(path),
            Output::Stream(_) => None,
        }
    }
}

impl std::fmt::Debug for Input<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Input::File(path) => f.debug_tuple("File").field(path).finish(),
            Input::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl std::fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::File(path) => f.debug_tuple("File").field(path).finish(),
            Output::Stream(_) => f.write_str("Stream"),
        }
    }
}
