//! Interactive translation queue.
//!
//! Single-name requests are coalesced into batches of at most `batch_size`
//! provider calls. A batch is a barrier: every call in it settles before the
//! next batch is pulled. Rate-limited items go back to the head of the queue
//! and the whole queue pauses for `rate_limit_delay_ms`. A request for a
//! name that is already queued or in flight waits on that call instead of
//! issuing another one.

use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::time::sleep;

use crate::ai::{ProviderOutcome, TranslationProvider};
use crate::cache::{CachedTranslation, TranslationCache};
use crate::config::BatchConfig;
use crate::detector::{display_name, needs_translation, normalized_base_name};

/// What a caller receives for one file name. `translated` is `None` when the
/// name needs no translation or the attempt failed; `error` tells the two
/// apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranslationOutcome {
    pub translated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslationOutcome {
    pub fn translated(text: impl Into<String>) -> Self {
        Self {
            translated: Some(text.into()),
            error: None,
        }
    }

    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            translated: None,
            error: Some(message.into()),
        }
    }

    /// The name to show: the translation when there is one, else the original.
    pub fn display_or<'a>(&'a self, original: &'a str) -> &'a str {
        self.translated.as_deref().unwrap_or(original)
    }
}

#[derive(Debug, Clone)]
enum Completion {
    Translated(String),
    NotApplicable,
    Failed(String),
}

impl From<CachedTranslation> for Completion {
    fn from(cached: CachedTranslation) -> Self {
        match cached {
            CachedTranslation::Translated(text) => Completion::Translated(text),
            CachedTranslation::NotTranslatable => Completion::NotApplicable,
        }
    }
}

impl Completion {
    fn into_outcome(self, file_name: &str) -> TranslationOutcome {
        match self {
            Completion::Translated(text) => {
                TranslationOutcome::translated(display_name(file_name, &text))
            }
            Completion::NotApplicable => TranslationOutcome::skipped(),
            Completion::Failed(message) => TranslationOutcome::failed(message),
        }
    }
}

/// One pending base name and everyone waiting for it.
struct QueueItem {
    base_name: String,
    waiters: Vec<oneshot::Sender<Completion>>,
}

impl QueueItem {
    fn complete(self, completion: Completion) {
        for waiter in self.waiters {
            // A dropped receiver just means the caller stopped waiting.
            let _ = waiter.send(completion.clone());
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueItem>,
    /// Extra waiters for base names whose provider call is running.
    in_flight: HashMap<String, Vec<oneshot::Sender<Completion>>>,
    draining: bool,
}

struct SchedulerInner {
    provider: Arc<dyn TranslationProvider>,
    cache: TranslationCache,
    config: BatchConfig,
    target: String,
    state: Mutex<QueueState>,
}

impl SchedulerInner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

impl BatchScheduler {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        config: BatchConfig,
        target: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                provider,
                cache: TranslationCache::new(),
                config: config.normalized(),
                target: target.into(),
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    pub fn config(&self) -> BatchConfig {
        self.inner.config
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.inner.cache
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state().pending.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.state().draining
    }

    /// Translates one file name, waiting for its batch to settle.
    pub async fn translate(&self, file_name: &str) -> TranslationOutcome {
        self.submit(file_name).await
    }

    /// Queues `file_name` immediately and returns a future for its outcome.
    ///
    /// Names without Japanese text and cache hits resolve without touching
    /// the queue. Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        file_name: &str,
    ) -> impl Future<Output = TranslationOutcome> + Send + 'static {
        let file_name = file_name.to_string();
        let base = normalized_base_name(&file_name);

        let ready = if !needs_translation(&base) {
            Some(TranslationOutcome::skipped())
        } else {
            self.inner
                .cache
                .get(&base)
                .map(|hit| Completion::from(hit).into_outcome(&file_name))
        };

        let receiver = match ready {
            Some(_) => None,
            None => Some(self.enqueue(base)),
        };

        async move {
            if let Some(outcome) = ready {
                return outcome;
            }
            match receiver {
                Some(receiver) => match receiver.await {
                    Ok(completion) => completion.into_outcome(&file_name),
                    Err(_) => TranslationOutcome::failed("translation request was dropped"),
                },
                None => TranslationOutcome::skipped(),
            }
        }
    }

    fn enqueue(&self, base_name: String) -> oneshot::Receiver<Completion> {
        let (sender, receiver) = oneshot::channel();
        let start_drain = {
            let mut guard = self.inner.state();
            let state = &mut *guard;

            // Settled between the caller's cache check and this lock.
            if let Some(hit) = self.inner.cache.get(&base_name) {
                let _ = sender.send(hit.into());
                return receiver;
            }

            if let Some(waiters) = state.in_flight.get_mut(&base_name) {
                waiters.push(sender);
            } else if let Some(existing) = state
                .pending
                .iter_mut()
                .find(|item| item.base_name == base_name)
            {
                existing.waiters.push(sender);
            } else {
                state.pending.push_back(QueueItem {
                    base_name,
                    waiters: vec![sender],
                });
            }

            if state.draining {
                false
            } else {
                state.draining = true;
                true
            }
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
        receiver
    }
}

/// Completes `item` together with everyone who attached while it was in flight.
fn finish(inner: &SchedulerInner, mut item: QueueItem, completion: Completion) {
    if let Some(extra) = inner.state().in_flight.remove(&item.base_name) {
        item.waiters.extend(extra);
    }
    item.complete(completion);
}

async fn drain(inner: Arc<SchedulerInner>) {
    let mut round: u64 = 0;
    loop {
        let batch: Vec<QueueItem> = {
            let mut state = inner.state();
            if state.pending.is_empty() {
                // Cleared under the same lock enqueue uses, so a concurrent
                // enqueue either lands in this drain or starts a new one.
                state.draining = false;
                debug!("translation queue drained after {round} batch(es)");
                return;
            }
            let take = inner.config.batch_size.min(state.pending.len());
            let batch: Vec<QueueItem> = state.pending.drain(..take).collect();
            for item in &batch {
                state.in_flight.insert(item.base_name.clone(), Vec::new());
            }
            batch
        };
        round += 1;

        let (cached, batch): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|item| inner.cache.contains(&item.base_name));
        for item in cached {
            let completion = match inner.cache.get(&item.base_name) {
                Some(hit) => hit.into(),
                None => Completion::Failed("cache entry vanished".into()),
            };
            finish(&inner, item, completion);
        }

        debug!("dispatching batch {round} with {} request(s)", batch.len());
        let outcomes = join_all(
            batch
                .iter()
                .map(|item| inner.provider.translate_outcome(&item.base_name, &inner.target)),
        )
        .await;

        let mut limited = Vec::new();
        for (item, outcome) in batch.into_iter().zip(outcomes) {
            match outcome {
                ProviderOutcome::Translated(text) => {
                    let stored = inner
                        .cache
                        .insert_if_absent(&item.base_name, CachedTranslation::Translated(text));
                    finish(&inner, item, stored.into());
                }
                ProviderOutcome::NotApplicable => {
                    let stored = inner
                        .cache
                        .insert_if_absent(&item.base_name, CachedTranslation::NotTranslatable);
                    finish(&inner, item, stored.into());
                }
                ProviderOutcome::Failed(message) => {
                    warn!("translation failed for {}: {message}", item.base_name);
                    finish(&inner, item, Completion::Failed(message));
                }
                ProviderOutcome::RateLimited => limited.push(item),
            }
        }

        let rate_limited = limited.len();
        let more_pending = {
            let mut state = inner.state();
            for mut item in limited.into_iter().rev() {
                if let Some(extra) = state.in_flight.remove(&item.base_name) {
                    item.waiters.extend(extra);
                }
                state.pending.push_front(item);
            }
            !state.pending.is_empty()
        };

        if rate_limited > 0 {
            warn!(
                "{rate_limited} request(s) rate limited, retrying in {} ms",
                inner.config.rate_limit_delay_ms
            );
            sleep(inner.config.rate_limit_delay()).await;
        } else if more_pending {
            sleep(inner.config.batch_delay()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ProviderError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Answers `"{text}-{target}"`; can be told to rate limit or fail
    /// specific inputs a number of times.
    #[derive(Default)]
    struct ScriptedProvider {
        calls: Mutex<Vec<(String, Instant)>>,
        rate_limits: Mutex<HashMap<String, usize>>,
        failures: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
    }

    impl ScriptedProvider {
        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn rate_limit(self, text: &str, times: usize) -> Self {
            self.rate_limits.lock().unwrap().insert(text.into(), times);
            self
        }

        fn fail(self, text: &str, times: usize) -> Self {
            self.failures.lock().unwrap().insert(text.into(), times);
            self
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        fn call_count(&self, text: &str) -> usize {
            self.calls().iter().filter(|(t, _)| t == text).count()
        }

        fn rounds(&self) -> usize {
            let mut times: Vec<Instant> = self.calls().into_iter().map(|(_, at)| at).collect();
            times.dedup();
            times.len()
        }

        fn take(map: &Mutex<HashMap<String, usize>>, text: &str) -> bool {
            let mut map = map.lock().unwrap();
            match map.get_mut(text) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        }
    }

    #[async_trait]
    impl TranslationProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn translate(&self, text: &str, target: &str) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push((text.to_string(), Instant::now()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if Self::take(&self.rate_limits, text) {
                return Err(ProviderError::RateLimited);
            }
            if Self::take(&self.failures, text) {
                return Err(ProviderError::Http {
                    status: 500,
                    body: "backend down".into(),
                });
            }
            if text == "ー" {
                return Ok(String::new());
            }
            Ok(format!("{text}-{target}"))
        }
    }

    fn config(batch_size: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            batch_delay_ms: 1000,
            rate_limit_delay_ms: 5000,
        }
    }

    fn scheduler(provider: &Arc<ScriptedProvider>, batch_size: usize) -> BatchScheduler {
        BatchScheduler::new(provider.clone(), config(batch_size), "en")
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_hits_cache() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler(&provider, 10);

        let first = scheduler.translate("写真.jpg").await;
        let second = scheduler.translate("写真.png").await;

        assert_eq!(first, TranslationOutcome::translated("写真-en.jpg"));
        assert_eq!(second, TranslationOutcome::translated("写真-en.png"));
        assert_eq!(provider.call_count("写真"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn latin_names_skip_the_provider() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler(&provider, 10);

        let outcome = scheduler.translate("holiday.jpg").await;
        assert_eq!(outcome, TranslationOutcome::skipped());
        assert_eq!(outcome.display_or("holiday.jpg"), "holiday.jpg");
        assert!(provider.calls().is_empty());
        assert!(!scheduler.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_bounded_by_batch_size() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler(&provider, 4);

        let pending: Vec<_> = (0..10)
            .map(|i| scheduler.submit(&format!("ファイル{i}.txt")))
            .collect();
        let outcomes = join_all(pending).await;

        assert!(outcomes.iter().all(|o| o.translated.is_some()));
        assert_eq!(provider.calls().len(), 10);
        assert_eq!(provider.rounds(), 3);
        assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_spaced_by_batch_delay() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler(&provider, 2);

        let pending: Vec<_> = ["あ", "い", "う"].iter().map(|n| scheduler.submit(n)).collect();
        join_all(pending).await;

        let calls = provider.calls();
        let first = calls[0].1;
        let last = calls[2].1;
        let gap = last - first;
        assert!(gap >= Duration::from_millis(1000) && gap < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_items_retry_first_after_rate_limit_delay() {
        let provider = Arc::new(ScriptedProvider::default().rate_limit("あ", 1));
        let scheduler = scheduler(&provider, 2);

        let pending: Vec<_> = ["あ", "い", "う"].iter().map(|n| scheduler.submit(n)).collect();
        let outcomes = join_all(pending).await;

        assert_eq!(outcomes[0], TranslationOutcome::translated("あ-en"));
        let calls = provider.calls();
        let names: Vec<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["あ", "い", "あ", "う"]);
        let gap = calls[2].1 - calls[0].1;
        assert!(gap >= Duration::from_millis(5000) && gap < Duration::from_millis(5100));
        assert_eq!(calls[3].1, calls[2].1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_resolve_with_error_and_are_not_cached() {
        let provider = Arc::new(ScriptedProvider::default().fail("資料", 1));
        let scheduler = scheduler(&provider, 5);

        let outcome = scheduler.translate("資料.pdf").await;
        assert_eq!(outcome.translated, None);
        assert!(outcome.error.as_deref().unwrap().contains("500"));
        assert_eq!(outcome.display_or("資料.pdf"), "資料.pdf");

        let retry = scheduler.translate("資料.pdf").await;
        assert_eq!(retry, TranslationOutcome::translated("資料-en.pdf"));
        assert_eq!(provider.call_count("資料"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_translation_is_cached_as_not_translatable() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler(&provider, 5);

        assert_eq!(scheduler.translate("ー.txt").await, TranslationOutcome::skipped());
        assert_eq!(scheduler.translate("ー.md").await, TranslationOutcome::skipped());
        assert_eq!(provider.call_count("ー"), 1);
        assert_eq!(scheduler.cache().get("ー"), Some(CachedTranslation::NotTranslatable));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_queued_names_share_one_call() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler(&provider, 5);

        let a = scheduler.submit("猫.jpg");
        let b = scheduler.submit("猫.png");
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a, TranslationOutcome::translated("猫-en.jpg"));
        assert_eq!(b, TranslationOutcome::translated("猫-en.png"));
        assert_eq!(provider.call_count("猫"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn request_for_a_name_in_flight_waits_for_that_call() {
        let provider =
            Arc::new(ScriptedProvider::default().with_latency(Duration::from_millis(200)));
        let scheduler = scheduler(&provider, 5);

        let first = tokio::spawn(scheduler.submit("鳥.jpg"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.call_count("鳥"), 1);
        assert!(!scheduler.cache().contains("鳥"));
        assert_eq!(scheduler.pending_len(), 0);

        let second = scheduler.submit("鳥.png").await;
        assert_eq!(second, TranslationOutcome::translated("鳥-en.png"));
        assert_eq!(first.await.unwrap(), TranslationOutcome::translated("鳥-en.jpg"));
        assert_eq!(provider.call_count("鳥"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_name_keeps_waiters_that_joined_in_flight() {
        let provider = Arc::new(
            ScriptedProvider::default()
                .rate_limit("雲", 1)
                .with_latency(Duration::from_millis(100)),
        );
        let scheduler = scheduler(&provider, 5);

        let first = tokio::spawn(scheduler.submit("雲.jpg"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = scheduler.submit("雲.png").await;

        assert_eq!(second, TranslationOutcome::translated("雲-en.png"));
        assert_eq!(first.await.unwrap(), TranslationOutcome::translated("雲-en.jpg"));
        assert_eq!(provider.call_count("雲"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_batch_size_falls_back_to_default() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = BatchScheduler::new(
            provider.clone(),
            BatchConfig {
                batch_size: 0,
                batch_delay_ms: 1000,
                rate_limit_delay_ms: 5000,
            },
            "en",
        );
        assert_eq!(
            scheduler.config().batch_size,
            crate::config::DEFAULT_BATCH_SIZE
        );

        let outcome =
            tokio::time::timeout(Duration::from_secs(3600), scheduler.translate("写真.jpg"))
                .await
                .expect("queue should settle");
        assert_eq!(outcome, TranslationOutcome::translated("写真-en.jpg"));
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_restarts_after_draining() {
        let provider = Arc::new(ScriptedProvider::default());
        let scheduler = scheduler(&provider, 5);

        scheduler.translate("一.txt").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!scheduler.is_draining());

        let outcome = scheduler.translate("二.txt").await;
        assert_eq!(outcome, TranslationOutcome::translated("二-en.txt"));
        assert_eq!(provider.calls().len(), 2);
    }

    #[test]
    fn outcome_serializes_without_empty_error() {
        let json = serde_json::to_value(TranslationOutcome::translated("Photo.jpg")).unwrap();
        assert_eq!(json, serde_json::json!({"translated": "Photo.jpg"}));
        let json = serde_json::to_value(TranslationOutcome::failed("x")).unwrap();
        assert_eq!(json, serde_json::json!({"translated": null, "error": "x"}));
    }
}
