//! [`PresenceLoop`] – the camera polling loop.
//!
//! Every tick captures a frame, runs it through the [`Recognizer`] and feeds
//! the verdict to a [`PresenceDebouncer`]. Whatever the debouncer emits is
//! forwarded to the orchestrator as [`SessionEvent::Presence`].
//!
//! Recognition is single-flight: a tick that fires while the previous
//! recognition is still running is skipped, not queued. A tick period edit
//! restarts the interval at once.
//!
//! While the camera view is inactive the loop keeps ticking but neither
//! captures nor recognizes, and the unknown streak is reset.

use std::sync::Arc;
use std::time::Duration;

use reminisce_hal::{Camera, Recognizer, Verdict};
use reminisce_perception::PresenceDebouncer;
use reminisce_types::Settings;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use crate::events::{SessionEvent, SessionHandle};

/// Counters reported when the loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks that started a recognition.
    pub ticks: u64,
    /// Ticks skipped because a recognition was still in flight.
    pub skipped: u64,
}

pub struct PresenceLoop {
    camera: Arc<Mutex<Box<dyn Camera>>>,
    recognizer: Arc<dyn Recognizer>,
    debouncer: PresenceDebouncer,
    settings: watch::Receiver<Settings>,
    camera_state: watch::Receiver<bool>,
    session: SessionHandle,
}

impl PresenceLoop {
    pub fn new(
        camera: Box<dyn Camera>,
        recognizer: Arc<dyn Recognizer>,
        settings: watch::Receiver<Settings>,
        camera_state: watch::Receiver<bool>,
        session: SessionHandle,
    ) -> Self {
        Self {
            camera: Arc::new(Mutex::new(camera)),
            recognizer,
            debouncer: PresenceDebouncer::new(),
            settings,
            camera_state,
            session,
        }
    }

    fn camera_active(&self) -> bool {
        *self.camera_state.borrow()
    }

    /// Poll until the orchestrator goes away.
    pub async fn run(mut self) -> LoopStats {
        let mut stats = LoopStats::default();
        let mut period = self.settings.borrow().session.tick_period();
        let mut ticker = interval_for(period);
        let (verdict_tx, mut verdicts) = mpsc::channel::<Verdict>(1);
        let mut in_flight = false;
        info!(period_ms = period.as_millis() as u64, "presence loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.camera_active() {
                        self.debouncer.reset();
                        continue;
                    }
                    if in_flight {
                        trace!("recognition still running, tick skipped");
                        stats.skipped += 1;
                        continue;
                    }
                    in_flight = true;
                    stats.ticks += 1;
                    let camera = self.camera.clone();
                    let recognizer = self.recognizer.clone();
                    let tx = verdict_tx.clone();
                    let span = debug_span!("recognition", tick = stats.ticks);
                    tokio::spawn(
                        async move {
                            let verdict = recognize(&camera, recognizer.as_ref()).await;
                            let _ = tx.send(verdict).await;
                        }
                        .instrument(span),
                    );
                }
                Some(verdict) = verdicts.recv() => {
                    in_flight = false;
                    if !self.camera_active() {
                        continue;
                    }
                    let threshold = self.settings.borrow().session.unknown_streak_threshold;
                    if let Some(event) = self.debouncer.observe(verdict, threshold) {
                        trace!(?event, "presence event");
                        if self.session.send(SessionEvent::Presence(event)).is_err() {
                            break;
                        }
                    }
                }
                Ok(()) = self.settings.changed() => {
                    let current = self.settings.borrow_and_update().session.tick_period();
                    if current != period {
                        debug!(period_ms = current.as_millis() as u64, "tick period changed");
                        period = current;
                        ticker = interval_for(period);
                    }
                }
                changed = self.camera_state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !self.camera_active() {
                        self.debouncer.reset();
                    }
                }
            }
            if self.session.is_closed() {
                break;
            }
        }

        info!(ticks = stats.ticks, skipped = stats.skipped, "presence loop stopped");
        stats
    }
}

fn interval_for(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Capture and classify one frame. Failures count as an empty frame.
async fn recognize(camera: &Mutex<Box<dyn Camera>>, recognizer: &dyn Recognizer) -> Verdict {
    let captured = camera.lock().await.capture();
    let frame = match captured {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "frame capture failed");
            return Verdict::NoFace;
        }
    };
    match recognizer.detect(frame).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(error = %e, "face recognition failed");
            Verdict::NoFace
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reminisce_hal::CameraFrame;
    use reminisce_hal::sim::{SimCamera, SimScene};
    use reminisce_perception::PresenceEvent;
    use reminisce_types::ReminisceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports whatever label the sim camera encoded, after `delay`.
    /// Labels starting with `?` are unmatched.
    struct LabelRecognizer {
        delay: Duration,
        calls: AtomicUsize,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl LabelRecognizer {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                calls: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Recognizer for LabelRecognizer {
        async fn detect(&self, frame: CameraFrame) -> Result<Verdict, ReminisceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            if frame.is_empty() {
                return Ok(Verdict::NoFace);
            }
            let label = String::from_utf8_lossy(&frame.data).to_string();
            Ok(match label.strip_prefix('?') {
                Some(_) => Verdict::Unmatched { frame },
                None => Verdict::Match {
                    identity: label,
                    distance: 0.1,
                    frame,
                },
            })
        }

        async fn describe(&self, _: &CameraFrame) -> Result<Option<Vec<f32>>, ReminisceError> {
            Ok(None)
        }
    }

    struct Rig {
        scene: SimScene,
        camera_tx: watch::Sender<bool>,
        settings_tx: watch::Sender<Settings>,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        task: tokio::task::JoinHandle<LoopStats>,
    }

    fn rig(recognizer: Arc<LabelRecognizer>, tick_ms: u64, active: bool) -> Rig {
        let scene = SimScene::new();
        let mut settings = Settings::default();
        settings.session.tick_period_ms = tick_ms;
        settings.session.unknown_streak_threshold = 2;
        let (settings_tx, settings_rx) = watch::channel(settings);
        let (camera_tx, camera_rx) = watch::channel(active);
        let (tx, events) = mpsc::unbounded_channel();
        let presence = PresenceLoop::new(
            Box::new(SimCamera::new("cam0", scene.clone())),
            recognizer,
            settings_rx,
            camera_rx,
            SessionHandle::new(tx),
        );
        Rig {
            scene,
            camera_tx,
            settings_tx,
            events,
            task: tokio::spawn(presence.run()),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<PresenceEvent> {
        let mut out = Vec::new();
        while let Ok(SessionEvent::Presence(e)) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn slow_recognition_skips_ticks() {
        let recognizer = LabelRecognizer::new(Duration::from_millis(1_000));
        let rig = rig(recognizer.clone(), 100, true);

        tokio::time::sleep(Duration::from_millis(1_550)).await;
        drop(rig.camera_tx);
        let stats = rig.task.await.unwrap();

        assert_eq!(recognizer.max_running.load(Ordering::SeqCst), 1);
        assert_eq!(stats.ticks, 2);
        assert!(stats.skipped >= 10, "{stats:?}");
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn verdicts_become_presence_events() {
        let recognizer = LabelRecognizer::new(Duration::from_millis(10));
        let mut rig = rig(recognizer, 100, true);

        rig.scene.show("Ana");
        tokio::time::sleep(Duration::from_millis(150)).await;
        rig.scene.clear();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let events = drain(&mut rig.events);
        assert!(matches!(&events[0], PresenceEvent::PersonArrived { identity, .. } if identity == "Ana"));
        assert_eq!(events.last(), Some(&PresenceEvent::PersonAbsentTick));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_face_confirmed_after_streak() {
        let recognizer = LabelRecognizer::new(Duration::from_millis(10));
        let mut rig = rig(recognizer, 100, true);

        rig.scene.show("?stranger");
        tokio::time::sleep(Duration::from_millis(1_050)).await;

        let events = drain(&mut rig.events);
        assert_eq!(events.len(), 1, "{events:?}");
        assert!(matches!(events[0], PresenceEvent::PersonUnknownConfirmed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_camera_is_not_polled() {
        let recognizer = LabelRecognizer::new(Duration::from_millis(10));
        let mut rig = rig(recognizer.clone(), 100, false);
        rig.scene.show("Ana");

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
        assert!(drain(&mut rig.events).is_empty());

        rig.camera_tx.send_replace(true);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(recognizer.calls.load(Ordering::SeqCst) >= 1);
        assert!(!drain(&mut rig.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_period_follows_settings() {
        let recognizer = LabelRecognizer::new(Duration::from_millis(1));
        let rig = rig(recognizer.clone(), 500, true);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let before = recognizer.calls.load(Ordering::SeqCst);
        assert_eq!(before, 3);

        rig.settings_tx.send_modify(|s| s.session.tick_period_ms = 100);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let after = recognizer.calls.load(Ordering::SeqCst) - before;
        assert!(after >= 8, "only {after} recognitions after speeding up");
    }

    #[tokio::test(start_paused = true)]
    async fn capture_failure_counts_as_no_face() {
        let recognizer = LabelRecognizer::new(Duration::from_millis(1));
        let mut rig = rig(recognizer.clone(), 100, true);
        rig.scene.set_offline(true);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
        let events = drain(&mut rig.events);
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| *e == PresenceEvent::PersonAbsentTick));
    }
}
