//! Frame sources

use crate::{CameraError, VideoFrame};
use tracing::{debug, info};

/// Outcome of a single read
#[derive(Debug, Clone)]
pub enum FrameRead {
    Frame(VideoFrame),
    /// Finite source exhausted; not an error
    EndOfStream,
}

/// Anything the detection loop can pull frames from.
///
/// A source is acquired when monitoring starts and released when it stops,
/// including on early exit, so `release` must be idempotent.
pub trait FrameSource: Send {
    /// Read the next frame; may block until one is available
    fn read_frame(&mut self) -> Result<FrameRead, CameraError>;

    /// Seek back to the first frame
    fn rewind(&mut self) -> Result<(), CameraError> {
        Err(CameraError::RewindUnsupported)
    }

    /// Release the underlying device or file handle
    fn release(&mut self) {}
}

/// In-memory clip played back frame by frame
pub struct ClipSource {
    frames: Vec<VideoFrame>,
    position: usize,
    released: bool,
}

impl ClipSource {
    /// Create a clip from decoded frames
    pub fn new(frames: Vec<VideoFrame>) -> Result<Self, CameraError> {
        if frames.is_empty() {
            return Err(CameraError::Open("clip contains no frames".into()));
        }
        info!("Opened clip with {} frames", frames.len());
        Ok(Self {
            frames,
            position: 0,
            released: false,
        })
    }

    /// Clip of blank frames whose sequence numbers index a recorded landmark trace
    pub fn blank(count: usize, width: u32, height: u32) -> Result<Self, CameraError> {
        let frames = (0..count)
            .map(|i| VideoFrame::blank(width, height, i as u32))
            .collect();
        Self::new(frames)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ClipSource {
    fn read_frame(&mut self) -> Result<FrameRead, CameraError> {
        if self.released {
            return Err(CameraError::Stream("clip already released".into()));
        }
        match self.frames.get(self.position) {
            Some(frame) => {
                self.position += 1;
                Ok(FrameRead::Frame(frame.clone()))
            }
            None => Ok(FrameRead::EndOfStream),
        }
    }

    fn rewind(&mut self) -> Result<(), CameraError> {
        debug!("Rewinding clip to first frame");
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            debug!("Releasing clip source");
            self.released = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_reads_then_ends() {
        let mut clip = ClipSource::blank(2, 4, 4).unwrap();

        assert!(matches!(clip.read_frame().unwrap(), FrameRead::Frame(f) if f.sequence == 0));
        assert!(matches!(clip.read_frame().unwrap(), FrameRead::Frame(f) if f.sequence == 1));
        assert!(matches!(clip.read_frame().unwrap(), FrameRead::EndOfStream));
    }

    #[test]
    fn test_clip_rewind() {
        let mut clip = ClipSource::blank(1, 4, 4).unwrap();
        clip.read_frame().unwrap();
        assert!(matches!(clip.read_frame().unwrap(), FrameRead::EndOfStream));

        clip.rewind().unwrap();
        assert!(matches!(clip.read_frame().unwrap(), FrameRead::Frame(_)));
    }

    #[test]
    fn test_empty_clip_fails_to_open() {
        assert!(matches!(ClipSource::new(Vec::new()), Err(CameraError::Open(_))));
    }

    #[test]
    fn test_released_clip_errors() {
        let mut clip = ClipSource::blank(3, 4, 4).unwrap();
        clip.release();
        clip.release();
        assert!(clip.read_frame().is_err());
    }
}
