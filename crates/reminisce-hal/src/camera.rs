//! Generic `Camera` trait and supporting types for image-capture hardware.

use reminisce_types::ReminisceError;

/// How the bytes in [`CameraFrame::data`] are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Gray8,
    /// A complete JPEG file, as produced by most webcam drivers.
    Jpeg,
}

impl PixelFormat {
    /// MIME type when the frame is forwarded to a multimodal model.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            PixelFormat::Jpeg => Some("image/jpeg"),
            _ => None,
        }
    }
}

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl CameraFrame {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A camera or image-capture device.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`ReminisceError::Sensor`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraFrame, ReminisceError>;
}
