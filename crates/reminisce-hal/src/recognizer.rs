//! The Recognizer Adapter boundary.
//!
//! Per polling tick the session core only needs a categorical verdict:
//! nobody in frame, a known person, or a face that matches nobody. How that
//! verdict is reached (detector, landmark model, descriptor network) lives
//! behind [`FaceEncoder`]; [`FaceMatcher`] turns encoder output into a
//! [`Verdict`] by nearest-descriptor search over the enrolled gallery.

use std::sync::Arc;

use async_trait::async_trait;
use reminisce_types::ReminisceError;
use tracing::debug;

use crate::camera::CameraFrame;

/// Faces narrower than this are treated as background and ignored.
pub const DEFAULT_MIN_FACE_WIDTH: f32 = 60.0;
/// Largest descriptor distance still accepted as the same person.
pub const DEFAULT_MAX_DISTANCE: f32 = 0.5;

/// Outcome of one recognition pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    NoFace,
    Match {
        identity: String,
        /// Opaque to the session core beyond the match decision.
        distance: f32,
        frame: CameraFrame,
    },
    Unmatched { frame: CameraFrame },
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Classify the face in `frame`, if any.
    async fn detect(&self, frame: CameraFrame) -> Result<Verdict, ReminisceError>;

    /// Compute the descriptor used to enroll whoever is in `frame`.
    /// `Ok(None)` means no usable face was found.
    async fn describe(&self, frame: &CameraFrame) -> Result<Option<Vec<f32>>, ReminisceError>;
}

/// A single detected face as reported by the external model.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceDetection {
    /// Bounding-box width in pixels.
    pub box_width: f32,
    pub descriptor: Vec<f32>,
}

/// The external face detection / embedding model.
#[async_trait]
pub trait FaceEncoder: Send + Sync {
    /// Detect the most prominent face in `frame` and return its descriptor.
    async fn encode(&self, frame: &CameraFrame) -> Result<Option<FaceDetection>, ReminisceError>;
}

/// Read access to enrolled descriptors, keyed by identity name.
pub trait DescriptorGallery: Send + Sync {
    fn descriptors(&self) -> Result<Vec<(String, Vec<f32>)>, ReminisceError>;
}

/// Euclidean distance between two equal-length descriptors.
///
/// Returns `f32::INFINITY` when the lengths differ or either is empty, so a
/// mismatched descriptor can never be the nearest one.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Nearest-descriptor [`Recognizer`] over an external [`FaceEncoder`].
pub struct FaceMatcher<E> {
    encoder: E,
    gallery: Arc<dyn DescriptorGallery>,
    max_distance: f32,
    min_face_width: f32,
}

impl<E: FaceEncoder> FaceMatcher<E> {
    pub fn new(encoder: E, gallery: Arc<dyn DescriptorGallery>) -> Self {
        Self {
            encoder,
            gallery,
            max_distance: DEFAULT_MAX_DISTANCE,
            min_face_width: DEFAULT_MIN_FACE_WIDTH,
        }
    }

    pub fn with_max_distance(mut self, max_distance: f32) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_min_face_width(mut self, min_face_width: f32) -> Self {
        self.min_face_width = min_face_width;
        self
    }

    /// Closest enrolled identity to `descriptor` and its distance.
    fn nearest(&self, descriptor: &[f32]) -> Result<Option<(String, f32)>, ReminisceError> {
        let best = self
            .gallery
            .descriptors()?
            .into_iter()
            .map(|(name, known)| {
                let d = euclidean_distance(&known, descriptor);
                (name, d)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        Ok(best)
    }
}

#[async_trait]
impl<E: FaceEncoder> Recognizer for FaceMatcher<E> {
    async fn detect(&self, frame: CameraFrame) -> Result<Verdict, ReminisceError> {
        let Some(face) = self.encoder.encode(&frame).await? else {
            return Ok(Verdict::NoFace);
        };
        if face.box_width < self.min_face_width {
            debug!(width = face.box_width, "face too small, ignoring");
            return Ok(Verdict::NoFace);
        }
        match self.nearest(&face.descriptor)? {
            Some((identity, distance)) if distance <= self.max_distance => {
                debug!(%identity, distance, "face matched");
                Ok(Verdict::Match {
                    identity,
                    distance,
                    frame,
                })
            }
            _ => Ok(Verdict::Unmatched { frame }),
        }
    }

    async fn describe(&self, frame: &CameraFrame) -> Result<Option<Vec<f32>>, ReminisceError> {
        let face = self.encoder.encode(frame).await?;
        Ok(face
            .filter(|f| f.box_width >= self.min_face_width)
            .map(|f| f.descriptor))
    }
}
