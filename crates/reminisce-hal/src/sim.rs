//! In-process simulation drivers for running without a webcam or face model.
//!
//! A [`SimScene`] holds the label of whoever is "standing in front of the
//! camera". [`SimCamera`] renders that label into a synthetic frame and
//! [`SimFaceEncoder`] derives a stable descriptor from it, so enrolling a
//! label and showing it again produces a real descriptor match through
//! [`FaceMatcher`][crate::recognizer::FaceMatcher].
//!
//! Labels prefixed with `far:` yield a face too small to be considered.
//!
//! # Example
//!
//! ```rust
//! use reminisce_hal::camera::Camera;
//! use reminisce_hal::sim::{SimCamera, SimScene};
//!
//! let scene = SimScene::new();
//! let mut camera = SimCamera::new("front", scene.clone());
//! assert!(camera.capture().unwrap().is_empty());
//!
//! scene.show("ana");
//! assert!(!camera.capture().unwrap().is_empty());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reminisce_types::ReminisceError;

use crate::camera::{Camera, CameraFrame, PixelFormat};
use crate::recognizer::{FaceDetection, FaceEncoder};

/// Descriptor length produced by [`SimFaceEncoder`].
pub const SIM_DESCRIPTOR_LEN: usize = 128;

const NEAR_FACE_WIDTH: f32 = 120.0;
const FAR_FACE_WIDTH: f32 = 30.0;

#[derive(Debug, Default)]
struct SceneState {
    subject: Option<String>,
    offline: bool,
}

/// Shared, mutable description of what the simulated camera sees.
#[derive(Debug, Clone, Default)]
pub struct SimScene {
    inner: Arc<Mutex<SceneState>>,
}

impl SimScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `label` in front of the camera.
    pub fn show(&self, label: impl Into<String>) {
        if let Ok(mut s) = self.inner.lock() {
            s.subject = Some(label.into());
        }
    }

    /// Leave the frame empty.
    pub fn clear(&self) {
        if let Ok(mut s) = self.inner.lock() {
            s.subject = None;
        }
    }

    /// Make subsequent captures fail as if the device were unplugged.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut s) = self.inner.lock() {
            s.offline = offline;
        }
    }

    pub fn subject(&self) -> Option<String> {
        self.inner.lock().ok().and_then(|s| s.subject.clone())
    }

    fn is_offline(&self) -> bool {
        self.inner.lock().map(|s| s.offline).unwrap_or(true)
    }
}

/// A simulated camera that encodes the scene's subject label as frame bytes.
pub struct SimCamera {
    id: String,
    scene: SimScene,
}

impl SimCamera {
    pub fn new(id: impl Into<String>, scene: SimScene) -> Self {
        Self {
            id: id.into(),
            scene,
        }
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, ReminisceError> {
        if self.scene.is_offline() {
            return Err(ReminisceError::Sensor {
                component: self.id.clone(),
                details: "simulated camera offline".to_string(),
            });
        }
        let data = self.scene.subject().map(String::into_bytes).unwrap_or_default();
        Ok(CameraFrame {
            width: data.len() as u32,
            height: 1,
            format: PixelFormat::Gray8,
            data,
        })
    }
}

/// Deterministic stand-in for a face embedding network.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimFaceEncoder;

impl SimFaceEncoder {
    /// Unit-length descriptor derived from `label`. Equal labels (ignoring
    /// case) give identical descriptors; distinct labels land far apart.
    pub fn descriptor_for(label: &str) -> Vec<f32> {
        let key = label.to_lowercase();
        let raw: Vec<f32> = (0..SIM_DESCRIPTOR_LEN)
            .map(|i| {
                let mut h = DefaultHasher::new();
                key.hash(&mut h);
                i.hash(&mut h);
                (h.finish() % 2001) as f32 / 1000.0 - 1.0
            })
            .collect();
        let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            raw
        } else {
            raw.into_iter().map(|x| x / norm).collect()
        }
    }
}

#[async_trait]
impl FaceEncoder for SimFaceEncoder {
    async fn encode(&self, frame: &CameraFrame) -> Result<Option<FaceDetection>, ReminisceError> {
        if frame.is_empty() {
            return Ok(None);
        }
        let label = String::from_utf8_lossy(&frame.data);
        let (label, box_width) = match label.strip_prefix("far:") {
            Some(rest) => (rest.to_string(), FAR_FACE_WIDTH),
            None => (label.to_string(), NEAR_FACE_WIDTH),
        };
        Ok(Some(FaceDetection {
            box_width,
            descriptor: Self::descriptor_for(&label),
        }))
    }
}
