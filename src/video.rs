use crate::frame::{DecodedFrame, PixelFormat};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("failed to run {program}: {source}")]
    Process {
        program: String,
        source: std::io::Error,
    },

    #[error("ffprobe failed: {0}")]
    Probe(String),

    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),
}

impl VideoError {
    /// True when the file itself could not be read as a video, as opposed to
    /// the decoder tooling failing to run.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, VideoError::Probe(_) | VideoError::NoVideoStream(_))
    }
}

/// A seekable video decoder.
pub trait VideoDecoder {
    /// Total number of frames in the video, 0 when unknown.
    fn frame_count(&self) -> usize;

    /// Frames per second, 0 when the stream does not declare a usable rate.
    fn fps(&self) -> f64;

    /// Seeks to `index` and decodes a single frame.
    ///
    /// Returns `None` when the frame cannot be decoded.
    fn decode_frame(&mut self, index: usize) -> Option<DecodedFrame>;
}

/// Opens video files for decoding.
pub trait VideoBackend {
    type Decoder: VideoDecoder;

    fn open(&self, path: &Path) -> Result<Self::Decoder, VideoError>;
}

/// Decodes videos by shelling out to the ffmpeg command line tools.
#[derive(Clone, Debug)]
pub struct FfmpegBackend {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl VideoBackend for FfmpegBackend {
    type Decoder = FfmpegVideo;

    fn open(&self, path: &Path) -> Result<FfmpegVideo, VideoError> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-count_packets",
                "-show_entries",
                "stream=width,height,r_frame_rate,nb_frames,nb_read_packets",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|source| VideoError::Process {
                program: self.ffprobe_path.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Probe(stderr.trim().to_string()));
        }

        let info = parse_probe_output(&output.stdout)?
            .ok_or_else(|| VideoError::NoVideoStream(path.to_path_buf()))?;

        log::debug!(
            "Probed {}: {}x{}, {} frames at {:.3} fps",
            path.display(),
            info.width,
            info.height,
            info.frame_count,
            info.fps
        );

        Ok(FfmpegVideo {
            ffmpeg_path: self.ffmpeg_path.clone(),
            path: path.to_path_buf(),
            info,
        })
    }
}

/// Stream properties reported by ffprobe.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: usize,
    pub height: usize,
    pub fps: f64,
    pub frame_count: usize,
}

pub struct FfmpegVideo {
    ffmpeg_path: PathBuf,
    path: PathBuf,
    info: VideoInfo,
}

impl FfmpegVideo {
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// ffmpeg arguments writing frame `index` to stdout as raw pixels.
    ///
    /// With a known frame rate the input is seeked to the frame's
    /// presentation time (`-ss` before `-i`), so only the frames after the
    /// closest keyframe are decoded. Without one, frames are counted from the
    /// start of the stream.
    fn decode_args(&self, index: usize, format: PixelFormat) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-v".into(), "error".into()];

        if self.info.fps > 0.0 {
            // floored to the microsecond so the seek never lands past the frame
            let seconds = (index as f64 / self.info.fps * 1e6).floor() / 1e6;
            args.extend(["-ss".into(), format!("{seconds:.6}").into()]);
            args.extend(["-i".into(), self.path.clone().into_os_string()]);
        } else {
            args.extend(["-i".into(), self.path.clone().into_os_string()]);
            args.extend([
                "-vf".into(),
                format!("select=eq(n\\,{index})").into(),
                "-fps_mode".into(),
                "passthrough".into(),
            ]);
        }

        args.extend(
            [
                "-frames:v",
                "1",
                "-f",
                "rawvideo",
                "-pix_fmt",
                format.as_str(),
                "-",
            ]
            .map(OsString::from),
        );
        args
    }
}

impl VideoDecoder for FfmpegVideo {
    fn frame_count(&self) -> usize {
        self.info.frame_count
    }

    fn fps(&self) -> f64 {
        self.info.fps
    }

    fn decode_frame(&mut self, index: usize) -> Option<DecodedFrame> {
        let format = PixelFormat::Bgr24;

        let output = Command::new(&self.ffmpeg_path)
            .args(self.decode_args(index, format))
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Failed to run ffmpeg for frame {}: {}", index, e);
                return None;
            }
        };

        let expected = self.info.width * self.info.height * format.channels();
        if !output.status.success() || expected == 0 || output.stdout.len() != expected {
            log::debug!(
                "Could not decode frame {} ({} of {} bytes)",
                index,
                output.stdout.len(),
                expected
            );
            return None;
        }

        Some(DecodedFrame {
            width: self.info.width,
            height: self.info.height,
            format,
            data: output.stdout,
        })
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<usize>,
    height: Option<usize>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

fn parse_probe_output(stdout: &[u8]) -> Result<Option<VideoInfo>, VideoError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)?;

    Ok(probe.streams.into_iter().next().map(|stream| {
        // container frame counts are missing for some formats, fall back to
        // the demuxed packet count
        let frame_count = [stream.nb_frames, stream.nb_read_packets]
            .into_iter()
            .flatten()
            .find_map(|n| n.parse::<usize>().ok().filter(|&n| n > 0))
            .unwrap_or(0);

        VideoInfo {
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            fps: stream.r_frame_rate.as_deref().map(parse_rate).unwrap_or(0.0),
            frame_count,
        }
    }))
}

/// Parses rates like "30/1" or "30000/1001". Returns 0 for anything unusable.
fn parse_rate(rate: &str) -> f64 {
    let value = match rate.split_once('/') {
        Some((num, den)) => match (num.parse::<f64>(), den.parse::<f64>()) {
            (Ok(num), Ok(den)) if den > 0.0 => num / den,
            _ => 0.0,
        },
        None => rate.parse().unwrap_or(0.0),
    };

    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "programs": [],
            "streams": [
                {
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30000/1001",
                    "nb_frames": "240",
                    "nb_read_packets": "240"
                }
            ]
        }"#;

        let info = parse_probe_output(json).unwrap().unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.frame_count, 240);
        assert!((info.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_frame_count_falls_back_to_packets() {
        let json = br#"{"streams": [{"width": 64, "height": 48, "r_frame_rate": "25/1", "nb_read_packets": "75"}]}"#;
        let info = parse_probe_output(json).unwrap().unwrap();
        assert_eq!(info.frame_count, 75);
        assert_eq!(info.fps, 25.0);
    }

    #[test]
    fn test_no_video_stream() {
        assert!(parse_probe_output(br#"{"streams": []}"#).unwrap().is_none());
        assert!(parse_probe_output(b"{}").unwrap().is_none());
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), 30.0);
        assert_eq!(parse_rate("0/0"), 0.0);
        assert_eq!(parse_rate("25"), 25.0);
        assert_eq!(parse_rate("garbage"), 0.0);
    }

    fn video(fps: f64) -> FfmpegVideo {
        FfmpegVideo {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            path: PathBuf::from("/tmp/clip.mp4"),
            info: VideoInfo {
                width: 64,
                height: 48,
                fps,
                frame_count: 100,
            },
        }
    }

    fn args(video: &FfmpegVideo, index: usize) -> Vec<String> {
        video
            .decode_args(index, PixelFormat::Bgr24)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_decode_seeks_before_input() {
        let args = args(&video(30.0), 45);
        assert_eq!(&args[2..6], ["-ss", "1.500000", "-i", "/tmp/clip.mp4"]);
        assert!(!args.iter().any(|a| a.starts_with("select")));
        assert_eq!(args.last().map(String::as_str), Some("-"));

        // 1 / 29.97 is floored, never rounded up past the frame
        let args = self::args(&video(30000.0 / 1001.0), 1);
        assert_eq!(args[3], "0.033366");
    }

    #[test]
    fn test_decode_counts_frames_without_rate() {
        let args = args(&video(0.0), 7);
        assert_eq!(&args[2..4], ["-i", "/tmp/clip.mp4"]);
        assert!(args.contains(&"select=eq(n\\,7)".to_string()));
        assert!(args.windows(2).any(|w| w == ["-fps_mode", "passthrough"]));
        assert!(!args.contains(&"-ss".to_string()));
    }

    fn ffmpeg_available() -> bool {
        ["ffmpeg", "ffprobe"].iter().all(|tool| {
            Command::new(tool)
                .arg("-version")
                .output()
                .is_ok_and(|o| o.status.success())
        })
    }

    // 20 frames of the lavfi test pattern, 64x48 at 10 fps
    fn make_clip(dir: &Path) -> PathBuf {
        let path = dir.join("clip.mp4");
        let status = Command::new("ffmpeg")
            .args(["-v", "error", "-f", "lavfi", "-i", "testsrc=size=64x48:rate=10"])
            .args(["-frames:v", "20", "-c:v", "mpeg4", "-pix_fmt", "yuv420p", "-y"])
            .arg(&path)
            .status()
            .unwrap();
        assert!(status.success());
        path
    }

    #[test]
    fn test_ffmpeg_decodes_sampled_frames() {
        if !ffmpeg_available() {
            eprintln!("ffmpeg not found on PATH, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = make_clip(dir.path());

        let mut video = FfmpegBackend::default().open(&path).unwrap();
        assert_eq!((video.info().width, video.info().height), (64, 48));
        assert_eq!(video.frame_count(), 20);
        assert_eq!(video.fps(), 10.0);

        let frame = video.decode_frame(13).unwrap();
        assert_eq!(frame.format, PixelFormat::Bgr24);
        assert_eq!(frame.data.len(), 64 * 48 * 3);

        // the seek lands on the same frame the counting fallback picks
        let mut counted = FfmpegVideo {
            info: VideoInfo {
                fps: 0.0,
                ..video.info().clone()
            },
            ffmpeg_path: PathBuf::from("ffmpeg"),
            path: path.clone(),
        };
        assert_eq!(counted.decode_frame(13).unwrap().data, frame.data);
        assert_ne!(video.decode_frame(0).unwrap().data, frame.data);

        assert!(video.decode_frame(500).is_none());
    }

    #[test]
    fn test_ffprobe_rejects_non_video() {
        if !ffmpeg_available() {
            eprintln!("ffmpeg not found on PATH, skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.mp4");
        std::fs::write(&path, b"this is not a video").unwrap();

        let err = FfmpegBackend::default().open(&path).err().unwrap();
        assert!(matches!(err, VideoError::Probe(_)), "{err}");
    }
}
