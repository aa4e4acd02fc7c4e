//! Enrolling a person from a camera frame.
//!
//! Shared by the consent prompt (bio [`NEW_PERSON_BIO`], no contact) and by
//! caregiver enrollment from the operator console, which supplies a real
//! bio and optional contact.

use reminisce_hal::{CameraFrame, Recognizer};
use reminisce_memory::IdentityStore;
use reminisce_types::{Identity, ReminisceError};
use tracing::info;

/// Bio given to people enrolled through the consent prompt.
pub const NEW_PERSON_BIO: &str = "New Person";

/// Describe the face in `frame` and store it under `name`.
///
/// Fails with [`ReminisceError::Enrollment`] when the frame holds no usable
/// face, and with [`ReminisceError::Storage`] for store rejections such as a
/// duplicate or blank name.
pub async fn enroll_from_frame(
    recognizer: &dyn Recognizer,
    store: &IdentityStore,
    frame: &CameraFrame,
    name: &str,
    bio: &str,
    contact: Option<&str>,
) -> Result<Identity, ReminisceError> {
    let name = name.trim();
    let descriptor = recognizer
        .describe(frame)
        .await?
        .ok_or_else(|| ReminisceError::Enrollment {
            name: name.to_string(),
            reason: "no face in the captured frame".into(),
        })?;
    let identity = store.enroll(name, bio.trim(), contact, descriptor)?;
    info!(identity = %identity.name, with_contact = identity.contact.is_some(), "face enrolled");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reminisce_hal::sim::{SimCamera, SimFaceEncoder, SimScene};
    use reminisce_hal::{Camera, FaceMatcher, Verdict};
    use std::sync::Arc;

    fn setup() -> (Arc<IdentityStore>, FaceMatcher<SimFaceEncoder>, SimScene, SimCamera) {
        let store = Arc::new(IdentityStore::open_in_memory().unwrap());
        let matcher = FaceMatcher::new(SimFaceEncoder, store.clone());
        let scene = SimScene::new();
        let camera = SimCamera::new("front", scene.clone());
        (store, matcher, scene, camera)
    }

    #[tokio::test]
    async fn enrolled_face_is_recognized_afterwards() {
        let (store, matcher, scene, mut camera) = setup();
        scene.show("grandson tom");
        let frame = camera.capture().unwrap();

        let tom = enroll_from_frame(&matcher, &store, &frame, "Tom", "Grandson, plays football", Some("555-0199"))
            .await
            .unwrap();
        assert_eq!(tom.history[0].summary, "Initial Bio: Grandson, plays football");
        assert_eq!(store.get("Tom").unwrap().contact.as_deref(), Some("555-0199"));

        let verdict = matcher.detect(camera.capture().unwrap()).await.unwrap();
        assert!(matches!(verdict, Verdict::Match { identity, .. } if identity == "Tom"));
    }

    #[tokio::test]
    async fn empty_or_distant_frame_is_rejected() {
        let (store, matcher, scene, mut camera) = setup();
        let empty = camera.capture().unwrap();
        let err = enroll_from_frame(&matcher, &store, &empty, "Tom", "Grandson", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReminisceError::Enrollment { .. }));

        scene.show("far:tom");
        let far = camera.capture().unwrap();
        assert!(enroll_from_frame(&matcher, &store, &far, "Tom", "Grandson", None).await.is_err());
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_storage_error() {
        let (store, matcher, scene, mut camera) = setup();
        scene.show("ana");
        let frame = camera.capture().unwrap();
        enroll_from_frame(&matcher, &store, &frame, "Ana", NEW_PERSON_BIO, None).await.unwrap();

        let err = enroll_from_frame(&matcher, &store, &frame, " Ana ", "Daughter", None)
            .await
            .unwrap_err();
        assert!(matches!(&err, ReminisceError::Storage(msg) if msg.contains("already exists")));
        assert_eq!(store.get("Ana").unwrap().bio, NEW_PERSON_BIO);
    }
}
