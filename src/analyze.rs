//! File analysis routed by detected content type.
//!
//! Audio, video and container files are probed with ffprobe, images with
//! vipsheader. Anything else only gets its media type.

use crate::detect::{detect_stream, is_audio, is_container, is_image, is_video};
use crate::endpoint::Input;
use crate::error::Result;
use crate::ffmpeg::{StreamType, Transcoder};
use crate::process::StopReceiver;
use crate::vips::Vips;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Summary of an analyzed file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaReport {
    pub media_type: String,
    pub file_format: String,

    // image/video
    pub width: u32,
    pub height: u32,

    // audio/video
    pub streams: Vec<String>,
    pub codecs: Vec<String>,
    pub duration: f64,

    // audio
    pub channels: u32,
    pub sample_rate: u32,

    // video
    pub frame_rate: f64,
}

/// Analyze the file at `path`
pub async fn analyze_file(
    transcoder: &Transcoder,
    vips: &Vips,
    path: &Path,
    stop: Option<&mut StopReceiver>,
) -> Result<MediaReport> {
    let mut file = tokio::fs::File::open(path).await?;
    let (media_type, _) = detect_stream(&mut file).await?;
    drop(file);
    debug!("Detected {} for {}", media_type, path.display());

    if is_audio(media_type) || is_video(media_type) || is_container(media_type) {
        let report = transcoder.analyze(Input::File(path), stop).await?;
        let (width, height) = report.size();

        let mut result = MediaReport {
            media_type: media_type.to_string(),
            file_format: report.format.name.clone(),
            width,
            height,
            duration: report.duration,
            sample_rate: report.sample_rate(),
            frame_rate: report.frame_rate(),
            ..Default::default()
        };
        for stream in report.streams.iter().filter(|stream| stream.kind != StreamType::Data) {
            result.streams.push(stream.kind.to_string());
            result.codecs.push(stream.codec.clone());
            result.channels = result.channels.max(stream.channels);
        }
        return Ok(result);
    }

    if is_image(media_type) {
        let report = vips.analyze(Input::File(path), stop).await?;
        return Ok(MediaReport {
            media_type: media_type.to_string(),
            file_format: report.format,
            width: report.width,
            height: report.height,
            ..Default::default()
        });
    }

    Ok(MediaReport {
        media_type: media_type.to_string(),
        ..Default::default()
    })
}


#[cfg(all(test, unix))]
mod tool_tests {
    use super::*;
    use crate::testing::{fake_tool, spy_calls, spy_tool};
    use tempfile::TempDir;

    const VIDEO_JSON: &str = r#"{"streams":[
        {"codec_type":"video","codec_name":"h264","width":800,"height":450,"r_frame_rate":"25/1","duration":"2.0"},
        {"codec_type":"audio","codec_name":"aac","channels":2,"sample_rate":"44100","duration":"2.0"},
        {"codec_type":"data","codec_name":"bin_data"}
    ],"format":{"format_name":"mov,mp4,m4a,3gp,3g2,mj2","duration":"2.0"}}"#;

    #[tokio::test]
    async fn test_video_goes_to_ffprobe() {
        let temp_dir = TempDir::new().unwrap();
        let ffprobe = fake_tool(temp_dir.path(), "ffprobe", &format!("cat <<'EOF'\n{}\nEOF", VIDEO_JSON));
        let (vipsheader, vips_calls) = spy_tool(temp_dir.path(), "vipsheader", "exit 1");
        let transcoder = Transcoder::new(temp_dir.path().join("ffmpeg"), ffprobe);
        let vips = Vips::new(temp_dir.path().join("vips"), vipsheader);

        let path = temp_dir.path().join("clip.mp4");
        std::fs::write(&path, b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2").unwrap();

        let report = analyze_file(&transcoder, &vips, &path, None).await.unwrap();
        assert_eq!(report.media_type, "video/mp4");
        assert_eq!(report.file_format, "mov,mp4,m4a,3gp,3g2,mj2");
        assert_eq!((report.width, report.height), (800, 450));
        assert_eq!(report.streams, vec!["video", "audio"]);
        assert_eq!(report.codecs, vec!["h264", "aac"]);
        assert_eq!(report.channels, 2);
        assert_eq!(report.sample_rate, 44100);
        assert_eq!(report.frame_rate, 25.0);
        assert_eq!(report.duration, 2.0);
        assert_eq!(spy_calls(&vips_calls), 0);
    }

    #[tokio::test]
    async fn test_image_goes_to_vips() {
        let temp_dir = TempDir::new().unwrap();
        let (ffprobe, probe_calls) = spy_tool(temp_dir.path(), "ffprobe", "exit 1");
        let vipsheader = fake_tool(
            temp_dir.path(),
            "vipsheader",
            "cat > /dev/null; echo 'stdin: 32x16 uchar, 3 bands, srgb, pngload_source'",
        );
        let transcoder = Transcoder::new(temp_dir.path().join("ffmpeg"), ffprobe);
        let vips = Vips::new(temp_dir.path().join("vips"), vipsheader);

        let path = temp_dir.path().join("pic.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR").unwrap();

        let report = analyze_file(&transcoder, &vips, &path, None).await.unwrap();
        assert_eq!(report.media_type, "image/png");
        assert_eq!(report.file_format, "png");
        assert_eq!((report.width, report.height), (32, 16));
        assert!(report.streams.is_empty());
        assert_eq!(spy_calls(&probe_calls), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_only_reports_media_type() {
        let temp_dir = TempDir::new().unwrap();
        let transcoder = Transcoder::new(temp_dir.path().join("ffmpeg"), temp_dir.path().join("ffprobe"));
        let vips = Vips::new(temp_dir.path().join("vips"), temp_dir.path().join("vipsheader"));

        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, b"just some text\n").unwrap();

        let report = analyze_file(&transcoder, &vips, &path, None).await.unwrap();
        assert_eq!(
            report,
            MediaReport {
                media_type: "text/plain".to_string(),
                ..Default::default()
            }
        );
    }
}
