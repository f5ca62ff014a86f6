//! # Mediakit Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione, allow-list e validazione parametri
//! - `error`: Tipi di errore custom (`MediaError`)
//! - `process`: Esecuzione dei tool esterni, pipe extra e cancellazione
//! - `ffmpeg`: Preset, costruzione argomenti, progress e probe (ffmpeg/ffprobe)
//! - `vips`: Conversione e analisi immagini (vips/vipsheader)
//! - `chromium`: Screenshot di pagine web con Chromium headless
//! - `buffer`: Bufferizzazione di stream su file temporanei
//! - `detect`: Riconoscimento del tipo di contenuto
//! - `sizer`: Politiche di ridimensionamento
//! - `analyze`: Analisi di un file instradata per tipo
//! - `processor`: Operazioni di alto livello
//! - `progress`: Progress bar per la CLI
//! - `tool_resolver`: Risoluzione dei percorsi dei binari esterni
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use mediakit::{max_width, Config, Processor};
//!
//! let mut processor = Processor::new(Config::default());
//! let mut source = tokio::fs::File::open("clip.mov").await?;
//! let mut sink = tokio::fs::File::create("clip.mp4").await?;
//! processor
//!     .convert_video(&mut source, &mut sink, &max_width(1280.0), None)
//!     .await?;
//! ```

pub mod analyze;
pub mod buffer;
pub mod chromium;
pub mod config;
pub mod detect;
pub mod endpoint;
pub mod error;
pub mod ffmpeg;
pub mod platform;
pub mod process;
pub mod processor;
pub mod progress;
pub mod sizer;
pub mod tool_resolver;
pub mod utils;
pub mod vips;

#[cfg(test)]
mod testing;

pub use analyze::MediaReport;
pub use chromium::ScreenshotOptions;
pub use config::{Config, WarningsSink};
pub use endpoint::{Input, Output};
pub use error::{MediaError, Result};
pub use ffmpeg::{ConvertOptions, Preset, Report, Transcoder};
pub use process::{cancellation_channel, StopReceiver};
pub use processor::{ProgressHandler, Processor};
pub use sizer::{keep_size, max_area, max_height, max_size, max_width, Size, Sizer};
pub use tool_resolver::{ToolPathResolver, ToolPaths};
pub use vips::{Vips, VipsPreset};
