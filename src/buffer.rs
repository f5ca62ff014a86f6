//! # Buffering Adapter
//!
//! Materializza uno stream non seekable in file temporari, così che i tool
//! esterni possano fare seek sulla sorgente.
//!
//! ## Responsabilità:
//! - Copia la sorgente in `<uuid>-source` (sempre, anche se è già un file)
//! - Crea `<uuid>-temp` solo se richiesto (estrazione di un frame)
//! - Crea `<uuid>-sink`, esegue la closure e copia il risultato nel sink reale
//! - Elimina tutti i file creati su ogni percorso di uscita (`TempPath` on drop)

use crate::error::Result;
use std::future::Future;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Paths handed to the closure of `with_buffered_files`
#[derive(Debug, Clone)]
pub struct BufferedFiles {
    /// Full copy of the caller's source
    pub source: PathBuf,
    /// Empty scratch file, present when requested
    pub temp: Option<PathBuf>,
    /// Empty file whose final content is copied to the caller's sink
    pub sink: PathBuf,
}

/// Buffer `source` to disk, run `f` on the files, then copy the sink file to
/// `sink`. All files live in `dir` and are removed when this returns.
pub async fn with_buffered_files<F, Fut, T>(
    dir: &Path,
    source: &mut (dyn AsyncRead + Unpin + Send),
    sink: &mut (dyn AsyncWrite + Unpin + Send),
    needs_temp: bool,
    f: F,
) -> Result<T>
where
    F: FnOnce(BufferedFiles) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let id = Uuid::new_v4();

    let (file, source_path) = create(dir, &id, "source")?;
    let mut file = tokio::fs::File::from_std(file);
    let copied = tokio::io::copy(source, &mut file).await?;
    file.sync_all().await?;
    drop(file);
    debug!("Buffered {} bytes to {}", copied, source_path.display());

    let temp_path = if needs_temp {
        Some(create(dir, &id, "temp")?.1)
    } else {
        None
    };
    let (_, sink_path) = create(dir, &id, "sink")?;

    let value = f(BufferedFiles {
        source: source_path.to_path_buf(),
        temp: temp_path.as_ref().map(|path| path.to_path_buf()),
        sink: sink_path.to_path_buf(),
    })
    .await?;

    let mut result = tokio::fs::File::open(&sink_path).await?;
    tokio::io::copy(&mut result, sink).await?;
    sink.flush().await?;

    Ok(value)
}

/// Create `<dir>/<id>-<suffix>`, deleted when the returned path drops
fn create(dir: &Path, id: &Uuid, suffix: &str) -> Result<(std::fs::File, TempPath)> {
    let file = tempfile::Builder::new()
        .prefix(&format!("{}-", id))
        .suffix(suffix)
        .rand_bytes(0)
        .tempfile_in(dir)?;
    Ok(file.into_parts())
}
