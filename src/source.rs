//! Frame sources.
//!
//! A [`MediaSource`] names where frames come from; [`open`] turns it into a
//! [`FrameSource`] that yields decoded frames one by one. Supported without
//! extra features:
//! - `stub://WxH[/N]`: synthetic black frames, endless or `N` of them
//! - a directory of JPEG/PNG images, read in file name order
//! - `http(s)://` MJPEG streams (e.g. phone IP-webcam apps)
//!
//! Video files and `rtsp://` streams need the `opencv` feature.

use image::RgbImage;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Error;
use crate::frame::Frame;
use crate::mjpeg::find_jpeg_bounds;

const MAX_MJPEG_BUFFER: usize = 8 * 1024 * 1024;
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    File(PathBuf),
    Stream(String),
    Synthetic {
        width: u32,
        height: u32,
        frames: Option<u64>,
    },
}

impl MediaSource {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::Config("empty media source".into()));
        }

        if let Some(rest) = raw.strip_prefix("stub://") {
            return parse_synthetic(rest)
                .ok_or_else(|| Error::Config(format!("invalid synthetic source {}", raw)));
        }

        let lower = raw.to_ascii_lowercase();
        if ["http://", "https://", "rtsp://"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
        {
            return Ok(MediaSource::Stream(raw.to_string()));
        }

        Ok(MediaSource::File(PathBuf::from(raw)))
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self, MediaSource::Stream(_))
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaSource::File(path) => write!(f, "{}", path.display()),
            MediaSource::Stream(url) => f.write_str(url),
            MediaSource::Synthetic {
                width,
                height,
                frames: Some(n),
            } => write!(f, "stub://{}x{}/{}", width, height, n),
            MediaSource::Synthetic { width, height, .. } => {
                write!(f, "stub://{}x{}", width, height)
            }
        }
    }
}

fn parse_synthetic(rest: &str) -> Option<MediaSource> {
    let (dims, frames) = match rest.split_once('/') {
        Some((dims, frames)) => (dims, Some(frames.parse().ok()?)),
        None => (rest, None),
    };
    let (w, h) = dims.split_once('x')?;
    let (width, height) = (w.parse().ok()?, h.parse().ok()?);
    if width == 0 || height == 0 {
        return None;
    }

    Some(MediaSource::Synthetic {
        width,
        height,
        frames,
    })
}

/// Sequential frame reader. `Ok(None)` marks the end of the source.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error>;
}

/// Opens `source`. Failing here is fatal for the stream that asked for it.
pub fn open(source: &MediaSource, fps: f64) -> Result<Box<dyn FrameSource>, Error> {
    let opened: Box<dyn FrameSource> = match source {
        MediaSource::Synthetic {
            width,
            height,
            frames,
        } => Box::new(SyntheticSource::new(*width, *height, *frames, fps)),
        MediaSource::File(path) if path.is_dir() => Box::new(ImageSequenceSource::open(path, fps)?),
        MediaSource::File(path) => open_video_file(path, fps)?,
        MediaSource::Stream(url) if url.to_ascii_lowercase().starts_with("http") => {
            Box::new(MjpegHttpSource::connect(url)?)
        }
        MediaSource::Stream(url) => open_video_stream(url)?,
    };

    log::info!("opened source {}", source);
    Ok(opened)
}

#[cfg(feature = "opencv")]
fn open_video_file(path: &Path, fps: f64) -> Result<Box<dyn FrameSource>, Error> {
    Ok(Box::new(opencv_source::VideoCaptureSource::open(
        &path.to_string_lossy(),
        Some(fps),
    )?))
}

#[cfg(not(feature = "opencv"))]
fn open_video_file(path: &Path, _fps: f64) -> Result<Box<dyn FrameSource>, Error> {
    Err(Error::SourceOpen {
        source_ref: path.display().to_string(),
        reason: "video files require the opencv feature (or pass a directory of frames)".into(),
    })
}

#[cfg(feature = "opencv")]
fn open_video_stream(url: &str) -> Result<Box<dyn FrameSource>, Error> {
    Ok(Box::new(opencv_source::VideoCaptureSource::open(url, None)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video_stream(url: &str) -> Result<Box<dyn FrameSource>, Error> {
    Err(Error::SourceOpen {
        source_ref: url.to_string(),
        reason: "rtsp streams require the opencv feature".into(),
    })
}

/// Black frames at a fixed rate, used for dry runs and tests.
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    remaining: Option<u64>,
    fps: f64,
    index: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, frames: Option<u64>, fps: f64) -> Self {
        Self {
            width,
            height,
            remaining: frames,
            fps,
            index: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }

        self.index += 1;
        Ok(Some(Frame {
            index: self.index,
            timestamp: (self.index - 1) as f64 / self.fps,
            image: RgbImage::new(self.width, self.height),
        }))
    }
}

/// Numbered still images in a directory, played back at `fps`.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: std::vec::IntoIter<PathBuf>,
    fps: f64,
    index: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self, Error> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::SourceOpen {
            source_ref: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(Error::SourceOpen {
                source_ref: dir.display().to_string(),
                reason: "no jpeg or png frames in directory".into(),
            });
        }

        log::debug!("{} frames in {}", paths.len(), dir.display());

        Ok(Self {
            paths: paths.into_iter(),
            fps,
            index: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let Some(path) = self.paths.next() else {
            return Ok(None);
        };

        self.index += 1;
        let image = image::open(&path)
            .map_err(|e| Error::FrameDecode {
                index: self.index,
                reason: format!("{}: {}", path.display(), e),
            })?
            .into_rgb8();

        Ok(Some(Frame {
            index: self.index,
            timestamp: (self.index - 1) as f64 / self.fps,
            image,
        }))
    }
}

/// Live MJPEG over HTTP. Timestamps are wall-clock seconds since connecting.
pub struct MjpegHttpSource {
    reader: Box<dyn Read + Send + Sync>,
    buffer: Vec<u8>,
    started: Instant,
    index: u64,
}

impl MjpegHttpSource {
    pub fn connect(url: &str) -> Result<Self, Error> {
        let response = ureq::get(url).call().map_err(|e| Error::SourceOpen {
            source_ref: url.to_string(),
            reason: e.to_string(),
        })?;

        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if !content_type.contains("multipart") {
            log::warn!("{} is not a multipart stream ({})", url, content_type);
        }

        Ok(Self::from_reader(response.into_reader()))
    }

    pub fn from_reader(reader: Box<dyn Read + Send + Sync>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
            started: Instant::now(),
            index: 0,
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let jpeg = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(jpeg));
            }

            let read = self.reader.read(&mut chunk)?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_MJPEG_BUFFER {
                return Err(Error::SourceRead("mjpeg frame exceeds buffer limit".into()));
            }
        }
    }
}

impl FrameSource for MjpegHttpSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
        let Some(jpeg) = self.read_next_jpeg()? else {
            return Ok(None);
        };

        self.index += 1;
        let image = image::load_from_memory(&jpeg)
            .map_err(|e| Error::FrameDecode {
                index: self.index,
                reason: e.to_string(),
            })?
            .into_rgb8();

        Ok(Some(Frame {
            index: self.index,
            timestamp: self.started.elapsed().as_secs_f64(),
            image,
        }))
    }
}

#[cfg(feature = "opencv")]
mod opencv_source {
    use image::RgbImage;
    use opencv::{core, imgproc, prelude::*, videoio};
    use std::time::Instant;

    use super::FrameSource;
    use crate::error::Error;
    use crate::frame::Frame;

    /// Video file or network stream decoded by OpenCV.
    pub struct VideoCaptureSource {
        cam: videoio::VideoCapture,
        fps: Option<f64>,
        started: Instant,
        index: u64,
    }

    impl VideoCaptureSource {
        /// `fps` set: timestamps from the frame index (files). `None`: wall clock (live).
        pub fn open(uri: &str, fps: Option<f64>) -> Result<Self, Error> {
            let cam = videoio::VideoCapture::from_file(uri, videoio::CAP_ANY)?;
            if !videoio::VideoCapture::is_opened(&cam)? {
                return Err(Error::SourceOpen {
                    source_ref: uri.to_string(),
                    reason: "capture could not be opened".into(),
                });
            }

            let fps = match fps {
                Some(fallback) => {
                    let native = cam.get(videoio::CAP_PROP_FPS)?;
                    Some(if native > 0.0 { native } else { fallback })
                }
                None => None,
            };

            Ok(Self {
                cam,
                fps,
                started: Instant::now(),
                index: 0,
            })
        }
    }

    impl FrameSource for VideoCaptureSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, Error> {
            let mut bgr = core::Mat::default();
            if !self.cam.read(&mut bgr)? || bgr.cols() == 0 || bgr.rows() == 0 {
                return Ok(None);
            }

            let mut rgb = core::Mat::default();
            imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

            let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
            let data = rgb.data_bytes()?.to_vec();
            let image = RgbImage::from_raw(width, height, data)
                .ok_or_else(|| Error::SourceRead("unexpected frame layout".into()))?;

            self.index += 1;
            let timestamp = match self.fps {
                Some(fps) => (self.index - 1) as f64 / fps,
                None => self.started.elapsed().as_secs_f64(),
            };

            Ok(Some(Frame {
                index: self.index,
                timestamp,
                image,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_kinds() {
        assert_eq!(
            MediaSource::parse("uploads/clip.mp4").unwrap(),
            MediaSource::File(PathBuf::from("uploads/clip.mp4"))
        );
        assert_eq!(
            MediaSource::parse("http://192.168.29.177:8080/video").unwrap(),
            MediaSource::Stream("http://192.168.29.177:8080/video".into())
        );
        assert!(MediaSource::parse("RTSP://cam/1").unwrap().is_live());
        assert_eq!(
            MediaSource::parse("stub://64x48/10").unwrap(),
            MediaSource::Synthetic {
                width: 64,
                height: 48,
                frames: Some(10)
            }
        );
        assert!(MediaSource::parse("stub://64").is_err());
        assert!(MediaSource::parse("  ").is_err());
    }

    #[test]
    fn synthetic_source_counts_frames() {
        let mut source = open(&MediaSource::parse("stub://8x8/3").unwrap(), 10.0).unwrap();
        let mut seen = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            seen.push((frame.index, frame.timestamp));
        }
        assert_eq!(seen, vec![(1, 0.0), (2, 0.1), (3, 0.2)]);
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let err = ImageSequenceSource::open(Path::new("/definitely/not/here"), 25.0).unwrap_err();
        assert!(matches!(err, Error::SourceOpen { .. }));
    }

    #[test]
    fn image_directory_plays_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("002.png", 20u8), ("001.png", 10), ("notes.txt", 0)] {
            let path = dir.path().join(name);
            if name.ends_with(".png") {
                RgbImage::from_pixel(4, 4, image::Rgb([shade, 0, 0]))
                    .save(&path)
                    .unwrap();
            } else {
                std::fs::write(&path, "x").unwrap();
            }
        }

        let mut source = ImageSequenceSource::open(dir.path(), 25.0).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();

        assert_eq!(first.image.get_pixel(0, 0)[0], 10);
        assert_eq!(second.image.get_pixel(0, 0)[0], 20);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn mjpeg_reader_splits_parts() {
        let jpeg = crate::mjpeg::encode_jpeg(&RgbImage::new(8, 8), 80).unwrap();
        let mut stream = Vec::new();
        for _ in 0..2 {
            stream.extend_from_slice(&crate::mjpeg::multipart_part(&jpeg));
        }

        let mut source = MjpegHttpSource::from_reader(Box::new(std::io::Cursor::new(stream)));
        assert_eq!(source.next_frame().unwrap().unwrap().index, 1);
        assert_eq!(source.next_frame().unwrap().unwrap().index, 2);
        assert!(source.next_frame().unwrap().is_none());
    }
    #[test]
    fn corrupt_mjpeg_part_is_a_decode_error() {
        let jpeg = crate::mjpeg::encode_jpeg(&RgbImage::new(8, 8), 80).unwrap();
        let mut stream = crate::mjpeg::multipart_part(&jpeg);
        stream.extend_from_slice(&crate::mjpeg::multipart_part(&[0xFF, 0xD8, 0, 1, 0xFF, 0xD9]));
        stream.extend_from_slice(&crate::mjpeg::multipart_part(&jpeg));

        let mut source = MjpegHttpSource::from_reader(Box::new(std::io::Cursor::new(stream)));
        assert_eq!(source.next_frame().unwrap().unwrap().index, 1);
        assert!(matches!(
            source.next_frame(),
            Err(Error::FrameDecode { index: 2, .. })
        ));
        assert_eq!(source.next_frame().unwrap().unwrap().index, 3);
        assert!(source.next_frame().unwrap().is_none());
    }
}
