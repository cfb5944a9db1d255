//! Audio and video presenter.
//!
//! The first [`MEDIA_READ_LIMIT`](crate::config::MEDIA_READ_LIMIT) bytes of the
//! body are handed to `ffprobe` for a stream summary, then to `ffmpeg` to
//! extract the middle frame of the last video stream, which is drawn like any
//! other image.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::graphics::{write_image, GraphicsProtocol};
use super::image::DecodedImage;
use crate::config::{MEDIA_PROBE_TOOL, MEDIA_TRANSCODE_TOOL};
use crate::error_handling::RenderError;
use crate::trace::TraceLog;
use crate::utils::{find_executable, title_case};

/// Installed media tools.
#[derive(Debug, Clone)]
pub struct MediaTools {
    probe: Option<PathBuf>,
    transcode: PathBuf,
}

impl MediaTools {
    /// Looks the tools up on `PATH`, `None` when `ffmpeg` is missing.
    pub fn detect() -> Option<Self> {
        Some(Self {
            transcode: find_executable(MEDIA_TRANSCODE_TOOL)?,
            probe: find_executable(MEDIA_PROBE_TOOL),
        })
    }
}

/// `ffprobe -show_format` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProbeFormat {
    /// Short container name
    pub format_name: String,
    /// Descriptive container name
    pub format_long_name: String,
}

/// `ffprobe -show_programs` entry.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProbeProgram {
    /// Program metadata
    pub tags: BTreeMap<String, String>,
}

/// `ffprobe -show_streams` entry.
#[allow(missing_docs)]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProbeStream {
    pub index: u32,
    pub codec_type: String,
    pub codec_name: String,
    pub codec_long_name: String,
    pub codec_tag_string: String,
    pub codec_tag: String,
    pub profile: String,
    pub sample_rate: String,
    pub channels: u32,
    pub channel_layout: String,
    pub bit_rate: String,
    pub width: u32,
    pub height: u32,
    pub display_aspect_ratio: String,
    pub pix_fmt: String,
    pub avg_frame_rate: String,
    pub nb_read_frames: String,
    pub disposition: BTreeMap<String, i64>,
}

/// Output of `ffprobe -print_format json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProbeReport {
    /// Container
    pub format: Option<ProbeFormat>,
    /// Programs, for transport streams
    pub programs: Vec<ProbeProgram>,
    /// Elementary streams
    pub streams: Vec<ProbeStream>,
}

impl ProbeStream {
    fn codec(&self) -> Option<String> {
        if self.codec_name.is_empty() {
            return None;
        }
        let mut codec = self.codec_name.clone();
        if !self.codec_long_name.is_empty() {
            codec.push_str(&format!(" ({})", self.codec_long_name));
        }
        if !self.codec_tag_string.is_empty() {
            codec.push_str(&format!(" Tag: {}", self.codec_tag_string));
        } else if !self.codec_tag.is_empty() {
            codec.push_str(&format!(" Tag: {}", self.codec_tag));
        }
        if !self.profile.is_empty() {
            codec.push_str(&format!(" Profile: {}", self.profile));
        }
        Some(codec)
    }
}

/// Prints the probe summary on the trace log.
pub fn describe(report: &ProbeReport, log: &TraceLog) {
    if let Some(format) = report.format.as_ref().filter(|f| !f.format_name.is_empty()) {
        let mut name = format.format_name.clone();
        if !format.format_long_name.is_empty() {
            name.push_str(&format!(" ({})", format.format_long_name));
        }
        log.info_valueln("Format", name);
    }

    for (i, program) in report.programs.iter().enumerate() {
        if program.tags.is_empty() {
            continue;
        }
        log.info_valueln("Program", format!("#{i}"));
        log.infoln("\tTags:");
        for (key, value) in &program.tags {
            log.info("\t\t");
            log.info_valueln(key, value);
        }
        log.infoln("");
    }

    for stream in &report.streams {
        log.info("Stream #");
        log.value(format!("{} ({})", stream.index, stream.codec_type));
        log.infoln(":");
        if let Some(codec) = stream.codec() {
            log.info("\tCodec: ");
            log.valueln(codec);
        }
        match stream.codec_type.as_str() {
            "audio" => describe_audio(stream, log),
            "video" => describe_video(stream, log),
            _ => {}
        }
        let dispositions: Vec<String> = stream
            .disposition
            .iter()
            .filter(|(_, v)| **v != 0)
            .map(|(k, _)| title_case(k))
            .collect();
        if !dispositions.is_empty() {
            log.infoln("\tDispositions:");
            for disposition in dispositions {
                log.info("\t\t-");
                log.valueln(disposition);
            }
        }
        log.infoln("");
    }
    log.flush();
}

#[allow(clippy::cast_precision_loss)]
fn describe_audio(stream: &ProbeStream, log: &TraceLog) {
    if let Ok(rate) = stream.sample_rate.parse::<u64>() {
        log.info_valueln("\tSample rate", format!("{:.2} kHz", rate as f64 / 1000.0));
    }
    if stream.channels != 0 {
        log.info_valueln("\tChannels", stream.channels);
    }
    if !stream.channel_layout.is_empty() {
        log.info_valueln("\tChannel layout", &stream.channel_layout);
    }
    if let Ok(bit_rate) = stream.bit_rate.parse::<u64>() {
        log.info_valueln("\tBit rate", format!("{:.2} kbps", bit_rate as f64 / 1024.0));
    }
}

/// Parses an `a/b` rational frame rate.
#[allow(clippy::cast_precision_loss)]
fn frame_rate(rational: &str) -> Option<f64> {
    let (num, den) = rational.split_once('/')?;
    let num: i64 = num.parse().ok()?;
    let den: i64 = den.parse().ok()?;
    Some(num as f64 / den as f64)
}

#[allow(clippy::cast_precision_loss)]
fn describe_video(stream: &ProbeStream, log: &TraceLog) {
    if stream.width != 0 && stream.height != 0 {
        log.info_valueln("\tResolution", format!("{}x{}", stream.width, stream.height));
    }
    if !stream.display_aspect_ratio.is_empty() {
        log.info_valueln("\tAspect ratio", &stream.display_aspect_ratio);
    }
    if !stream.pix_fmt.is_empty() {
        log.info_valueln("\tPixel format", &stream.pix_fmt);
    }
    if !stream.avg_frame_rate.is_empty() {
        match frame_rate(&stream.avg_frame_rate) {
            Some(fps) => log.info_valueln("\tFrame rate", format!("{fps:.2} fps")),
            None => log.info_valueln("\tAverage framerate", &stream.avg_frame_rate),
        }
    }
    if let Ok(bit_rate) = stream.bit_rate.parse::<u64>() {
        log.info_valueln(
            "\tBit rate",
            format!("{:.2} mbps", bit_rate as f64 / (1024.0 * 1024.0)),
        );
    }
}

/// Picks the frame to extract: the middle frame of the last video stream with
/// a frame count, or the first frame of the default stream.
pub fn select_frame(report: Option<&ProbeReport>) -> (Option<u32>, u64) {
    report
        .into_iter()
        .flat_map(|r| r.streams.iter())
        .filter(|s| s.codec_type == "video")
        .filter_map(|s| {
            let frames: u64 = s.nb_read_frames.parse().ok()?;
            Some((Some(s.index), frames.div_ceil(2)))
        })
        .last()
        .unwrap_or((None, 0))
}

/// Arguments of the frame extraction command.
pub fn frame_args(stream: Option<u32>, frame: u64) -> Vec<String> {
    let mut args = vec!["-i".to_string(), "-".to_string()];
    if let Some(stream) = stream {
        args.push("-map".to_string());
        args.push(format!("0:{stream}"));
    }
    args.extend(
        [
            "-vf".to_string(),
            format!("select=eq(n\\,{frame})"),
            "-q:v".to_string(),
            "3".to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-c:v".to_string(),
            "png".to_string(),
            "-f".to_string(),
            "image2".to_string(),
            "-".to_string(),
        ],
    );
    args
}

/// Runs `program` with `input` on stdin, returning stdout.
async fn run_tool(program: &Path, args: &[String], input: &[u8], log: &TraceLog) -> Result<Vec<u8>, RenderError> {
    let name = program
        .file_name()
        .map_or_else(|| program.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RenderError::Media(format!("failed to run {name}: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| RenderError::Media(format!("{name} has no stdin")))?;
    let input = input.to_vec();
    let writer = tokio::spawn(async move {
        // The tool may stop reading early, a broken pipe is expected then
        if let Err(e) = stdin.write_all(&input).await {
            log::debug!("Media tool closed its input: {e}");
        }
    });

    let output = child.wait_with_output().await?;
    if let Err(e) = writer.await {
        log::debug!("Media input writer failed: {e}");
    }
    if !output.status.success() {
        log.infoln(&format!("{name} output :"));
        log.valueln(String::from_utf8_lossy(&output.stderr));
        return Err(RenderError::Media(format!("failed to run {name} on media start")));
    }
    Ok(output.stdout)
}

async fn probe(tool: &Path, data: &[u8], log: &TraceLog) -> Result<ProbeReport, RenderError> {
    let args: Vec<String> = [
        "-print_format",
        "json",
        "-count_frames",
        "-show_format",
        "-show_streams",
        "-show_programs",
        "-",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();
    let stdout = run_tool(tool, &args, data, log).await?;
    Ok(serde_json::from_slice(&stdout)?)
}

/// Summarizes a media body and draws one of its frames.
///
/// # Arguments
///
/// * `data` - Start of the body, at most [`MEDIA_READ_LIMIT`](crate::config::MEDIA_READ_LIMIT) bytes
/// * `tools` - Installed media tools
/// * `log` - Trace printer receiving the summary
/// * `protocol` - Terminal graphics protocol
/// * `out` - Output sink
///
/// # Errors
///
/// Returns `RenderError::Media` if a tool fails, or any error of the image
/// writers.
pub async fn render_media(
    data: &[u8],
    tools: &MediaTools,
    log: &TraceLog,
    protocol: Option<GraphicsProtocol>,
    out: &mut dyn Write,
) -> Result<(), RenderError> {
    let report = match &tools.probe {
        Some(tool) => {
            let report = probe(tool, data, log).await.map_err(|e| {
                log::debug!("ffprobe failed: {e}");
                RenderError::Media("media is not supported".to_string())
            })?;
            describe(&report, log);
            Some(report)
        }
        None => None,
    };

    let (stream, frame) = select_frame(report.as_ref());
    let png = run_tool(&tools.transcode, &frame_args(stream, frame), data, log).await?;
    let decoded = DecodedImage::decode(&png)?;
    write_image(&decoded.image, decoded.paletted, protocol, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemorySink;

    const PROBE: &str = r#"{
        "programs": [{"tags": {"service_name": "demo"}}],
        "streams": [
            {
                "index": 0, "codec_type": "video", "codec_name": "h264",
                "codec_long_name": "H.264", "codec_tag_string": "avc1", "profile": "High",
                "width": 640, "height": 360, "display_aspect_ratio": "16:9",
                "pix_fmt": "yuv420p", "avg_frame_rate": "25/1", "bit_rate": "2097152",
                "nb_read_frames": "5", "disposition": {"default": 1, "visual_impaired": 0}
            },
            {
                "index": 1, "codec_type": "audio", "codec_name": "aac",
                "sample_rate": "44100", "channels": 2, "channel_layout": "stereo",
                "bit_rate": "131072", "disposition": {"default": 1}
            }
        ],
        "format": {"format_name": "mov,mp4", "format_long_name": "QuickTime / MOV", "nb_streams": 2}
    }"#;

    #[test]
    fn test_describe_summary() {
        colored::control::set_override(false);
        let report: ProbeReport = serde_json::from_str(PROBE).unwrap();
        let sink = MemorySink::new();
        let log = TraceLog::new(true, Box::new(sink.clone()));
        describe(&report, &log);
        let text = sink.text();
        assert!(text.starts_with("Format: mov,mp4 (QuickTime / MOV)\nProgram: #0\n\tTags:\n\t\tservice_name: demo\n\n"));
        assert!(text.contains("Stream #0 (video):\n\tCodec: h264 (H.264) Tag: avc1 Profile: High\n"));
        assert!(text.contains("\tResolution: 640x360\n\tAspect ratio: 16:9\n\tPixel format: yuv420p\n"));
        assert!(text.contains("\tFrame rate: 25.00 fps\n\tBit rate: 2.00 mbps\n"));
        assert!(text.contains("\tDispositions:\n\t\t-Default\n"));
        assert!(!text.contains("Visual Impaired"));
        assert!(text.contains("\tSample rate: 44.10 kHz\n\tChannels: 2\n\tChannel layout: stereo\n\tBit rate: 128.00 kbps\n"));
    }

    #[test]
    fn test_unparsable_frame_rate_is_shown_as_is() {
        colored::control::set_override(false);
        let report = ProbeReport {
            streams: vec![ProbeStream {
                codec_type: "video".into(),
                avg_frame_rate: "variable".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let sink = MemorySink::new();
        describe(&report, &TraceLog::new(true, Box::new(sink.clone())));
        assert!(sink.text().contains("\tAverage framerate: variable\n"));
    }

    #[test]
    fn test_select_middle_frame_of_last_video_stream() {
        let report: ProbeReport = serde_json::from_str(PROBE).unwrap();
        assert_eq!(select_frame(Some(&report)), (Some(0), 3));
        assert_eq!(select_frame(None), (None, 0));
    }

    #[test]
    fn test_frame_args() {
        let args = frame_args(Some(2), 7);
        assert_eq!(&args[..4], ["-i", "-", "-map", "0:2"]);
        assert!(args.contains(&"select=eq(n\\,7)".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert!(!frame_args(None, 0).contains(&"-map".to_string()));
    }
}
