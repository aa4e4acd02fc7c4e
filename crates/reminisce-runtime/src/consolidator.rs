//! Memory consolidation.
//!
//! [`MemoryConsolidator`] turns a raw transcript into a [`Consolidation`]
//! and nothing else; merging the result into the identity store is the
//! orchestrator's job.
//!
//! [`ConsolidationQueue`] runs one worker per identity. Jobs for the same
//! identity complete in submission order so history is appended
//! chronologically, while different identities consolidate in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use reminisce_types::{Consolidation, ReminisceError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::events::SessionEvent;
use crate::providers::LanguageModel;

pub struct MemoryConsolidator {
    model: Arc<dyn LanguageModel>,
}

impl MemoryConsolidator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Summarise `transcript` for `identity`.
    ///
    /// Whitespace around the summary and tags is trimmed and blank tags are
    /// dropped. An empty summary is a provider error.
    pub async fn consolidate(
        &self,
        identity: &str,
        transcript: &str,
    ) -> Result<Consolidation, ReminisceError> {
        let mut c = self.model.summarize(identity, transcript).await?;
        c.summary = c.summary.trim().to_string();
        if c.summary.is_empty() {
            return Err(ReminisceError::provider("language model", "empty summary"));
        }
        c.tags = c
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        Ok(c)
    }
}

struct Job {
    transcript: String,
}

struct Worker {
    jobs: mpsc::UnboundedSender<Job>,
    handle: JoinHandle<()>,
}

pub struct ConsolidationQueue {
    consolidator: Arc<MemoryConsolidator>,
    results: mpsc::UnboundedSender<SessionEvent>,
    workers: HashMap<String, Worker>,
}

impl ConsolidationQueue {
    pub fn new(consolidator: MemoryConsolidator, results: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            consolidator: Arc::new(consolidator),
            results,
            workers: HashMap::new(),
        }
    }

    /// Queue `transcript` for `identity`. Returns immediately.
    pub fn submit(&mut self, identity: &str, transcript: String) {
        self.workers.retain(|_, w| !w.handle.is_finished());
        let worker = self
            .workers
            .entry(identity.to_string())
            .or_insert_with(|| spawn_worker(identity.to_string(), self.consolidator.clone(), self.results.clone()));
        if worker.jobs.send(Job { transcript }).is_err() {
            warn!(identity, "consolidation worker gone, transcript dropped");
            return;
        }
        debug!(identity, "consolidation queued");
    }

    /// Number of identities with a live worker.
    pub fn active_workers(&self) -> usize {
        self.workers.values().filter(|w| !w.handle.is_finished()).count()
    }

    /// Stop accepting work and wait for every queued job to finish.
    pub async fn drain(&mut self) {
        let workers: Vec<_> = self.workers.drain().collect();
        for (identity, worker) in workers {
            drop(worker.jobs);
            if let Err(e) = worker.handle.await {
                warn!(%identity, error = %e, "consolidation worker failed");
            }
        }
    }
}

fn spawn_worker(
    identity: String,
    consolidator: Arc<MemoryConsolidator>,
    results: mpsc::UnboundedSender<SessionEvent>,
) -> Worker {
    let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
    let handle = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let span = info_span!("consolidation", identity = %identity);
            match consolidator.consolidate(&identity, &job.transcript).instrument(span).await {
                Ok(consolidation) => {
                    info!(%identity, emotion = %consolidation.emotion, "conversation consolidated");
                    let ready = SessionEvent::ConsolidationReady {
                        identity: identity.clone(),
                        consolidation,
                        transcript: job.transcript,
                    };
                    if results.send(ready).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(%identity, error = %e, "consolidation failed, update dropped"),
            }
        }
    });
    Worker { jobs, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::GreetingRequest;
    use async_trait::async_trait;
    use reminisce_types::Emotion;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Summarises by echoing the transcript; "slow" transcripts take longer
    /// and "fail" transcripts error.
    struct EchoModel {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn greet(&self, _: GreetingRequest) -> Result<String, ReminisceError> {
            Ok(String::new())
        }

        async fn summarize(&self, identity: &str, transcript: &str) -> Result<Consolidation, ReminisceError> {
            self.calls.lock().unwrap().push(format!("{identity}:{transcript}"));
            if transcript.contains("slow") {
                tokio::time::sleep(Duration::from_secs(3)).await;
            }
            if transcript.contains("fail") {
                return Err(ReminisceError::provider("language model", "HTTP 503"));
            }
            Ok(Consolidation {
                summary: format!("  {transcript}  "),
                emotion: Emotion::Happy,
                tags: vec![" garden ".into(), "".into()],
                transcript: None,
            })
        }
    }

    fn queue() -> (ConsolidationQueue, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let model = Arc::new(EchoModel { calls: Mutex::default() });
        (ConsolidationQueue::new(MemoryConsolidator::new(model), tx), rx)
    }

    fn summary_of(event: SessionEvent) -> (String, String) {
        match event {
            SessionEvent::ConsolidationReady { identity, consolidation, .. } => {
                (identity, consolidation.summary)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn consolidate_normalises_output() {
        let model = Arc::new(EchoModel { calls: Mutex::default() });
        let c = MemoryConsolidator::new(model).consolidate("Ana", "we talked").await.unwrap();
        assert_eq!(c.summary, "we talked");
        assert_eq!(c.tags, vec!["garden".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn same_identity_completes_in_submission_order() {
        let (mut q, mut rx) = queue();
        q.submit("Ana", "first slow".into());
        q.submit("Ana", "second".into());
        q.drain().await;
        assert_eq!(summary_of(rx.recv().await.unwrap()).1, "first slow");
        assert_eq!(summary_of(rx.recv().await.unwrap()).1, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn different_identities_run_in_parallel() {
        let (mut q, mut rx) = queue();
        q.submit("Ana", "slow chat".into());
        q.submit("Bob", "quick chat".into());
        assert_eq!(q.active_workers(), 2);
        let (first, _) = summary_of(rx.recv().await.unwrap());
        assert_eq!(first, "Bob");
        q.drain().await;
        assert_eq!(summary_of(rx.recv().await.unwrap()).0, "Ana");
    }

    #[tokio::test]
    async fn failures_are_dropped() {
        let (mut q, mut rx) = queue();
        q.submit("Ana", "this will fail".into());
        q.submit("Ana", "this is fine".into());
        q.drain().await;
        assert_eq!(summary_of(rx.recv().await.unwrap()).1, "this is fine");
        assert!(rx.try_recv().is_err());
    }
}
