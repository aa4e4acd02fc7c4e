//! `reminisce-hal` – sensor boundary.
//!
//! # Modules
//!
//! - [`camera`] – the [`Camera`][camera::Camera] driver trait and raw
//!   [`CameraFrame`][camera::CameraFrame].
//! - [`recognizer`] – the per-tick [`Recognizer`][recognizer::Recognizer]
//!   contract (`NoFace` / `Match` / `Unmatched`) plus
//!   [`FaceMatcher`][recognizer::FaceMatcher], a nearest-descriptor adapter
//!   over an external [`FaceEncoder`][recognizer::FaceEncoder].
//! - [`sim`] – simulated camera and encoder so the whole stack runs headless.

pub mod camera;
pub mod recognizer;
pub mod sim;

pub use camera::{Camera, CameraFrame, PixelFormat};
pub use recognizer::{
    DescriptorGallery, FaceDetection, FaceEncoder, FaceMatcher, Recognizer, Verdict,
    euclidean_distance,
};
