//! Content-type sniffing.
//!
//! Signatures are matched by `infer`, with `image::guess_format` as a
//! fallback for images it does not know. Results are MIME types without
//! parameters, using the names of the type lists below.

use crate::error::Result;
use image::ImageFormat;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum number of bytes inspected by `detect`
pub const DETECT_BYTES: usize = 3072;

pub const UNKNOWN_TYPE: &str = "application/octet-stream";

/// Image types handled by the image tool
pub const IMAGE_TYPES: &[&str] = &[
    "image/gif",
    "image/heic",
    "image/heif",
    "image/jpeg",
    "image/jp2",
    "application/pdf",
    "image/png",
    "image/tiff",
    "image/webp",
];

pub const AUDIO_TYPES: &[&str] = &[
    "audio/aac",
    "audio/aiff",
    "audio/flac",
    "audio/x-m4a",
    "audio/mpeg",
    "audio/ogg",
    "audio/wav",
];

/// Video types; GIF is listed as it may be animated
pub const VIDEO_TYPES: &[&str] = &[
    "video/x-msvideo",
    "video/x-flv",
    "image/gif",
    "video/x-matroska",
    "video/quicktime",
    "video/mpeg",
    "video/mp4",
    "video/ogg",
    "video/webm",
];

/// Containers that may hold audio, video or both
pub const CONTAINER_TYPES: &[&str] = &["video/x-ms-asf"];

/// `infer` names that differ from the ones used in the type lists
const ALIASES: &[(&str, &str)] = &[
    ("audio/x-flac", "audio/flac"),
    ("audio/x-wav", "audio/wav"),
    ("audio/x-aiff", "audio/aiff"),
    ("audio/m4a", "audio/x-m4a"),
    ("video/x-ms-wmv", "video/x-ms-asf"),
    ("image/vnd.microsoft.icon", "image/x-icon"),
];

/// Detect the media type of `buf`, `application/octet-stream` when unknown.
pub fn detect(buf: &[u8]) -> &'static str {
    let buf = &buf[..buf.len().min(DETECT_BYTES)];
    if buf.is_empty() {
        return UNKNOWN_TYPE;
    }

    if let Some(kind) = infer::get(buf) {
        return refine(canonical(kind.mime_type()), buf);
    }
    if let Some(typ) = image::guess_format(buf).ok().and_then(image_type) {
        return typ;
    }
    if is_text(buf) {
        return "text/plain";
    }
    UNKNOWN_TYPE
}

/// Read up to `DETECT_BYTES` from `reader` and detect their type.
///
/// The consumed head is returned so the caller can replay it, e.g. with
/// `head.as_slice().chain(reader)`.
pub async fn detect_stream<R>(reader: &mut R) -> Result<(&'static str, Vec<u8>)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut head = Vec::with_capacity(DETECT_BYTES);
    (&mut *reader).take(DETECT_BYTES as u64).read_to_end(&mut head).await?;
    Ok((detect(&head), head))
}

pub fn is_image(typ: &str) -> bool {
    IMAGE_TYPES.contains(&typ)
}

pub fn is_audio(typ: &str) -> bool {
    AUDIO_TYPES.contains(&typ)
}

pub fn is_video(typ: &str) -> bool {
    VIDEO_TYPES.contains(&typ)
}

pub fn is_container(typ: &str) -> bool {
    CONTAINER_TYPES.contains(&typ)
}

fn canonical(mime: &'static str) -> &'static str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == mime)
        .map_or(mime, |&(_, name)| name)
}

/// Split families `infer` reports under a single type
fn refine(typ: &'static str, buf: &[u8]) -> &'static str {
    match typ {
        // EBML: the doc type tells WebM from plain Matroska
        "video/webm" | "video/x-matroska" => {
            if buf.windows(4).take(64).any(|w| w == b"webm") {
                "video/webm"
            } else {
                "video/x-matroska"
            }
        }
        // Ogg: the first packet names the codec
        "audio/ogg" if buf.get(28..).is_some_and(|packet| packet.starts_with(b"\x80theora")) => "video/ogg",
        other => other,
    }
}

fn image_type(format: ImageFormat) -> Option<&'static str> {
    Some(match format {
        ImageFormat::Png => "image/png",
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Ico => "image/x-icon",
        ImageFormat::Avif => "image/avif",
        _ => return None,
    })
}

/// UTF-8 without control characters besides whitespace.
///
/// A character cut off by the end of the head does not count against it.
fn is_text(buf: &[u8]) -> bool {
    let text = match std::str::from_utf8(buf) {
        Ok(text) => text,
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => {
            std::str::from_utf8(&buf[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return false,
    };
    !text.is_empty() && text.chars().all(|c| !c.is_control() || c.is_whitespace())
}
