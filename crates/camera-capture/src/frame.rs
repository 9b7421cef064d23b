//! Video frame types and processing

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// All-black frame, used when replaying recorded landmarks without pixels
    pub fn blank(width: u32, height: u32, sequence: u32) -> Self {
        Self::new(vec![0; (width * height * 3) as usize], width, height, 0, sequence)
    }

    /// Resize to the working resolution (no-op when already there)
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<VideoFrame, CameraError> {
        if self.width == new_width && self.height == new_height {
            return Ok(self.clone());
        }

        let img = image::ImageBuffer::<image::Rgb<u8>, _>::from_raw(
            self.width,
            self.height,
            self.data.as_slice(),
        )
        .ok_or_else(|| {
            CameraError::Format(format!(
                "buffer of {} bytes does not hold a {}x{} RGB frame",
                self.data.len(),
                self.width,
                self.height
            ))
        })?;

        let resized = image::imageops::resize(
            &img,
            new_width,
            new_height,
            image::imageops::FilterType::Triangle,
        );

        Ok(VideoFrame {
            data: resized.into_raw(),
            width: new_width,
            height: new_height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }
}
