//! # Child Process Runner
//!
//! Questo modulo esegue un tool esterno collegando i suoi stream.
//!
//! ## Responsabilità:
//! - Collega stdin/stdout a file su disco o a stream in memoria
//! - Passa pipe aggiuntive al figlio (fd 3 e 4) per palette e progress
//! - Cattura lo stderr in un buffer, letto solo dopo la fine del processo
//! - Gestisce la cancellazione tramite canale `broadcast` (kill del processo)
//! - Classifica gli errori: prima riga non vuota dello stderr, in minuscolo
//!
//! ## Flusso:
//! 1. Spawn del processo (le pipe extra vengono chiuse nel padre subito dopo)
//! 2. Copia concorrente di input, output e stderr
//! 3. Attesa dell'uscita oppure del segnale di stop
//! 4. Classificazione dell'esito

use crate::error::{MediaError, Result};
use crate::utils::first_non_empty_line;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::broadcast;
use tracing::debug;

/// Receiving end of a stop channel
pub type StopReceiver = broadcast::Receiver<()>;

/// Creates a broadcast channel for cancellation signals.
///
/// Send `()` on the sender to stop every operation holding a receiver.
/// Receivers must be subscribed before the signal is sent.
pub fn cancellation_channel() -> (broadcast::Sender<()>, StopReceiver) {
    broadcast::channel(1)
}

/// Resolves once a stop signal arrives. A closed channel never stops.
pub(crate) async fn wait_for_stop(stop: Option<&mut StopReceiver>) {
    if let Some(receiver) = stop {
        match receiver.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => {}
        }
    }
    std::future::pending::<()>().await
}

/// Where the child's stdin comes from
pub(crate) enum ChildInput<'a> {
    Null,
    File(std::fs::File),
    Stream(&'a mut (dyn AsyncRead + Unpin + Send)),
}

/// Where the child's stdout goes to
pub(crate) enum ChildOutput<'a> {
    Null,
    File(std::fs::File),
    Stream(&'a mut (dyn AsyncWrite + Unpin + Send)),
}

/// Exit status and captured stderr of a finished child
pub(crate) struct Finished {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
}

impl Finished {
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Error for an unsuccessful run, classified from stderr
    pub fn failure(&self, tool: &'static str) -> MediaError {
        classify(tool, self.status, &self.stderr_text())
    }
}

/// Lower-cased first non-empty diagnostic line, or a generic status message
pub(crate) fn classify(tool: &'static str, status: ExitStatus, stderr: &str) -> MediaError {
    match first_non_empty_line(stderr) {
        Some(line) => MediaError::failed(tool, line.to_lowercase()),
        None => MediaError::failed(tool, format!("{}: {}", tool, status)),
    }
}

/// A single invocation of an external tool
pub(crate) struct ToolRun<'a> {
    pub tool: &'static str,
    pub program: &'a Path,
    pub args: Vec<String>,
    pub stdin: ChildInput<'a>,
    pub stdout: ChildOutput<'a>,
    pub extra_fds: Vec<fds::ExtraFd>,
}

impl<'a> ToolRun<'a> {
    pub fn new(tool: &'static str, program: &'a Path, args: Vec<String>) -> Self {
        Self {
            tool,
            program,
            args,
            stdin: ChildInput::Null,
            stdout: ChildOutput::Null,
            extra_fds: Vec::new(),
        }
    }

    pub fn stdin(mut self, stdin: ChildInput<'a>) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn stdout(mut self, stdout: ChildOutput<'a>) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn extra_fd(mut self, fd: fds::ExtraFd) -> Self {
        self.extra_fds.push(fd);
        self
    }

    /// Run to completion and classify a non-zero exit as an error.
    ///
    /// Returns the captured stderr of a successful run.
    pub async fn run(self, stop: Option<&mut StopReceiver>) -> Result<String> {
        let tool = self.tool;
        let finished = self.run_raw(stop).await?;
        if !finished.status.success() {
            return Err(finished.failure(tool));
        }
        Ok(finished.stderr_text())
    }

    /// Run to completion without judging the exit status.
    pub async fn run_raw(self, stop: Option<&mut StopReceiver>) -> Result<Finished> {
        let ToolRun {
            tool,
            program,
            args,
            stdin,
            stdout,
            extra_fds,
        } = self;

        let mut command = Command::new(program);
        command.args(&args).stderr(Stdio::piped()).kill_on_drop(true);

        let input = match stdin {
            ChildInput::Null => {
                command.stdin(Stdio::null());
                None
            }
            ChildInput::File(file) => {
                command.stdin(Stdio::from(file));
                None
            }
            ChildInput::Stream(reader) => {
                command.stdin(Stdio::piped());
                Some(reader)
            }
        };

        let output = match stdout {
            ChildOutput::Null => {
                command.stdout(Stdio::null());
                None
            }
            ChildOutput::File(file) => {
                command.stdout(Stdio::from(file));
                None
            }
            ChildOutput::Stream(writer) => {
                command.stdout(Stdio::piped());
                Some(writer)
            }
        };

        fds::attach(&mut command, &extra_fds)?;

        debug!("Running {} {:?}", tool, args);
        let start_time = Instant::now();
        let spawned = command.spawn();

        // the child holds its own copies now
        drop(extra_fds);
        drop(command);

        let mut child = spawned.map_err(|e| MediaError::process(tool, e))?;
        let child_stdin = child.stdin.take();
        let child_stdout = child.stdout.take();
        let child_stderr = child.stderr.take();

        let outcome = tokio::select! {
            biased;
            _ = wait_for_stop(stop) => None,
            result = drive(
                tool,
                &mut child,
                input.zip(child_stdin),
                output.zip(child_stdout),
                child_stderr,
            ) => Some(result),
        };

        match outcome {
            Some(result) => {
                let finished = result?;
                debug!("{} finished with {} in {:?}", tool, finished.status, start_time.elapsed());
                Ok(finished)
            }
            None => {
                debug!("Stop signal received, killing {}", tool);
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill {}: {}", tool, e);
                }
                Err(MediaError::Cancelled)
            }
        }
    }
}

/// Copies input, output and stderr concurrently, then waits for the child.
async fn drive(
    tool: &'static str,
    child: &mut Child,
    input: Option<(&mut (dyn AsyncRead + Unpin + Send), ChildStdin)>,
    output: Option<(&mut (dyn AsyncWrite + Unpin + Send), ChildStdout)>,
    stderr: Option<ChildStderr>,
) -> Result<Finished> {
    let feed = async {
        if let Some((reader, mut stdin)) = input {
            match tokio::io::copy(reader, &mut stdin).await {
                Ok(_) => {}
                // the tool may stop reading early (single frame, trimmed output)
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("{} closed its input early", tool);
                }
                Err(e) => return Err(MediaError::process(tool, e)),
            }
        }
        Ok(())
    };

    let drain = async {
        if let Some((writer, mut stdout)) = output {
            tokio::io::copy(&mut stdout, writer)
                .await
                .map_err(|e| MediaError::process(tool, e))?;
            writer.flush().await.map_err(|e| MediaError::process(tool, e))?;
        }
        Ok::<(), MediaError>(())
    };

    let capture = async {
        let mut buffer = Vec::new();
        if let Some(mut stderr) = stderr {
            stderr
                .read_to_end(&mut buffer)
                .await
                .map_err(|e| MediaError::process(tool, e))?;
        }
        Ok::<_, MediaError>(buffer)
    };

    let (fed, drained, captured) = tokio::join!(feed, drain, capture);
    let status = child.wait().await.map_err(|e| MediaError::process(tool, e))?;

    fed?;
    drained?;
    Ok(Finished {
        status,
        stderr: captured?,
    })
}

/// Extra file descriptors handed to the child.
#[cfg(unix)]
pub(crate) mod fds {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
    use tokio::process::Command;

    /// Child descriptor carrying the palette input
    pub const PALETTE_FD: RawFd = 3;

    const MAX_EXTRA_FDS: usize = 2;

    /// Temporary descriptors are parked at or above this number
    const PARK_FLOOR: RawFd = 10;

    /// One end of a pipe and the descriptor number it gets in the child
    pub struct ExtraFd {
        file: File,
        target: RawFd,
    }

    impl ExtraFd {
        pub fn new(file: File, target: RawFd) -> Self {
            Self { file, target }
        }
    }

    /// Progress goes after the palette when both are present
    pub fn progress_fd(with_palette: bool) -> RawFd {
        if with_palette {
            PALETTE_FD + 1
        } else {
            PALETTE_FD
        }
    }

    /// Anonymous pipe with close-on-exec set on both ends
    pub fn pipe() -> io::Result<(File, File)> {
        let mut raw: [libc::c_int; 2] = [0; 2];

        #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
        let rc = unsafe { libc::pipe2(raw.as_mut_ptr(), libc::O_CLOEXEC) };
        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        let rc = unsafe { libc::pipe(raw.as_mut_ptr()) };

        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: both descriptors were just returned by pipe and are owned here
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(raw[0]), OwnedFd::from_raw_fd(raw[1])) };

        #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
        for fd in [&read, &write] {
            if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
                return Err(io::Error::last_os_error());
            }
        }

        Ok((File::from(read), File::from(write)))
    }

    /// Arrange for `fds` to appear at their target numbers in the child.
    pub fn attach(command: &mut Command, fds: &[ExtraFd]) -> io::Result<()> {
        if fds.is_empty() {
            return Ok(());
        }
        if fds.len() > MAX_EXTRA_FDS {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "too many extra descriptors"));
        }

        let count = fds.len();
        let mut plan: [(RawFd, RawFd); MAX_EXTRA_FDS] = [(-1, -1); MAX_EXTRA_FDS];
        for (slot, fd) in plan.iter_mut().zip(fds) {
            *slot = (fd.file.as_raw_fd(), fd.target);
        }

        // SAFETY: the closure only calls async-signal-safe functions and
        // touches no memory besides its own copied arrays.
        unsafe {
            command.pre_exec(move || {
                // park first so a source can never be clobbered by another target
                let mut parked: [RawFd; MAX_EXTRA_FDS] = [-1; MAX_EXTRA_FDS];
                for i in 0..count {
                    let fd = libc::fcntl(plan[i].0, libc::F_DUPFD_CLOEXEC, PARK_FLOOR);
                    if fd < 0 {
                        return Err(io::Error::last_os_error());
                    }
                    parked[i] = fd;
                }
                for i in 0..count {
                    // dup2 clears close-on-exec on the target
                    if libc::dup2(parked[i], plan[i].1) < 0 {
                        return Err(io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }

        Ok(())
    }
}

#[cfg(not(unix))]
pub(crate) mod fds {
    use std::fs::File;
    use std::io;
    use tokio::process::Command;

    pub const PALETTE_FD: i32 = 3;

    pub struct ExtraFd {
        _file: File,
    }

    impl ExtraFd {
        pub fn new(file: File, _target: i32) -> Self {
            Self { _file: file }
        }
    }

    pub fn progress_fd(with_palette: bool) -> i32 {
        if with_palette {
            PALETTE_FD + 1
        } else {
            PALETTE_FD
        }
    }

    pub fn pipe() -> io::Result<(File, File)> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "extra child pipes are only supported on unix",
        ))
    }

    pub fn attach(_command: &mut Command, fds: &[ExtraFd]) -> io::Result<()> {
        if fds.is_empty() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Unsupported, "extra child pipes are only supported on unix"))
        }
    }
}
