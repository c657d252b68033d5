// src/engine/mod.rs

pub mod mixer;
pub mod track;

pub use mixer::{Composite, TrackVectorStore};
pub use track::{Track, TrackId, VolumeTempo};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::decoder::{SampleDecoder, SymphoniaDecoder};
use crate::waveform::{SourceKey, WaveformCache};

/// Asynchronous front door to the waveform pipeline.
///
/// `update_track` decodes (or reuses) the track's source outline and folds
/// it into the composite; `remove_track` takes the track out again. Both
/// return immediately and hand the new [`Composite`] to a completion
/// callback on a worker thread. Marshaling back to a UI thread is the
/// caller's job.
///
/// Store mutations are serialized behind one async mutex. Every call takes
/// a ticket for its track when it is made, and a call only touches the
/// store if no newer ticket has already written or removed that track. A
/// slow decode therefore never resurrects a removed track or overwrites a
/// newer update, while an update that fails to decode changes nothing and
/// cannot block an earlier removal.
pub struct TrackLineGenerator {
    handle: Handle,
    runtime: Option<Runtime>,
    inner: Arc<Inner>,
}

struct Inner {
    decoder: Arc<dyn SampleDecoder>,
    cache: WaveformCache,
    store: tokio::sync::Mutex<TrackVectorStore>,
    tickets: Mutex<Tickets>,
}

#[derive(Default)]
struct TicketState {
    /// Newest ticket that wrote or removed the store entry
    applied: u64,
    in_flight: usize,
}

/// Per-track ordering of update/remove calls.
///
/// Only tracks with outstanding calls are kept; tickets only grow, so a
/// track with nothing in flight needs no record.
#[derive(Default)]
struct Tickets {
    next: u64,
    tracks: HashMap<TrackId, TicketState>,
}

impl Tickets {
    fn issue(&mut self, id: TrackId) -> u64 {
        self.next += 1;
        self.tracks.entry(id).or_default().in_flight += 1;
        self.next
    }

    /// Lets `ticket` write the track unless a newer call already did.
    fn claim(&mut self, id: TrackId, ticket: u64) -> bool {
        let state = self.tracks.entry(id).or_default();
        if ticket > state.applied {
            state.applied = ticket;
            true
        } else {
            false
        }
    }

    fn finish(&mut self, id: TrackId) {
        if let Some(state) = self.tracks.get_mut(&id) {
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight == 0 {
                self.tracks.remove(&id);
            }
        }
    }
}

/// What an update needs from a [`Track`], detached from the caller's copy.
struct UpdateRequest {
    id: TrackId,
    source: SourceKey,
    volume: Option<f32>,
    tempo: Option<f32>,
}

impl UpdateRequest {
    fn from_track(track: &Track) -> Option<Self> {
        Some(Self {
            id: track.id,
            source: track.source.clone()?,
            volume: track.volume(),
            tempo: track.tempo(),
        })
    }
}

/// Configures a [`TrackLineGenerator`].
pub struct TrackLineGeneratorBuilder {
    config: PipelineConfig,
    decoder: Option<Arc<dyn SampleDecoder>>,
    handle: Option<Handle>,
}

impl TrackLineGeneratorBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the symphonia file decoder.
    pub fn decoder(mut self, decoder: Arc<dyn SampleDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Runs on an existing runtime instead of starting one.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn build(self) -> Result<TrackLineGenerator> {
        let config = self.config;
        config.validate()?;

        let (handle, runtime) = match self.handle {
            Some(handle) => (handle, None),
            None => {
                let mut builder = Builder::new_multi_thread();
                builder.thread_name("trackline-worker").enable_all();
                if let Some(threads) = config.worker_threads {
                    builder.worker_threads(threads);
                }
                let runtime = builder.build()?;
                (runtime.handle().clone(), Some(runtime))
            }
        };

        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(SymphoniaDecoder));

        log::info!(
            "🌊 [TrackLine] pipeline ready: {} points, cache capacity {:?}",
            config.resolution,
            config.cache_capacity
        );

        Ok(TrackLineGenerator {
            handle,
            runtime,
            inner: Arc::new(Inner {
                decoder,
                cache: WaveformCache::with_capacity(config.resolution, config.cache_capacity),
                store: tokio::sync::Mutex::new(TrackVectorStore::with_min_width_scale(
                    config.resolution,
                    config.min_width_scale,
                )),
                tickets: Mutex::new(Tickets::default()),
            }),
        })
    }
}

impl TrackLineGenerator {
    /// Starts a pipeline on its own multi-thread runtime.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> TrackLineGeneratorBuilder {
        TrackLineGeneratorBuilder {
            config: PipelineConfig::default(),
            decoder: None,
            handle: None,
        }
    }

    pub fn cache(&self) -> &WaveformCache {
        &self.inner.cache
    }

    /// Queues an update for `track`.
    ///
    /// Returns `None` without doing anything when the track has no source.
    /// `completion` runs once with the recomputed composite, unless the
    /// source fails to decode or a newer call for the same track overtakes
    /// this one.
    pub fn update_track<F>(&self, track: &Track, completion: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Composite) + Send + 'static,
    {
        track.source.as_ref()?;
        let pending = self.update(track);

        Some(self.handle.spawn(async move {
            if let Some(composite) = pending.await {
                completion(composite);
            }
        }))
    }

    /// Queues removal of `track`; `completion` always runs.
    pub fn remove_track<F>(&self, track: &Track, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Composite) + Send + 'static,
    {
        let pending = self.remove(track);

        self.handle.spawn(async move {
            completion(pending.await);
        })
    }

    /// Awaitable form of [`update_track`](Self::update_track).
    ///
    /// The ticket is taken here, not on first poll, so calls are ordered as
    /// they are made. A future dropped before completion keeps its track's
    /// ticket record alive.
    pub fn update(&self, track: &Track) -> impl Future<Output = Option<Composite>> + Send + use<> {
        let inner = self.inner.clone();
        let pending = UpdateRequest::from_track(track).map(|request| {
            let ticket = inner.issue(request.id);
            (request, ticket)
        });

        async move {
            let (request, ticket) = pending?;
            inner.apply_update(request, ticket).await
        }
    }

    /// Awaitable form of [`remove_track`](Self::remove_track); the ticket is
    /// taken at call time.
    pub fn remove(&self, track: &Track) -> impl Future<Output = Composite> + Send + use<> {
        let inner = self.inner.clone();
        let id = track.id;
        let ticket = inner.issue(id);

        async move { inner.apply_remove(id, ticket).await }
    }

    /// Current composite, without changing anything.
    pub async fn snapshot(&self) -> Composite {
        self.inner.store.lock().await.composite()
    }

    pub async fn track_count(&self) -> usize {
        self.inner.store.lock().await.len()
    }
}

impl Drop for TrackLineGenerator {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Inner {
    fn tickets(&self) -> MutexGuard<'_, Tickets> {
        self.tickets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self, id: TrackId) -> u64 {
        self.tickets().issue(id)
    }

    async fn apply_update(&self, request: UpdateRequest, ticket: u64) -> Option<Composite> {
        let decoded = self
            .cache
            .get_or_compute(&request.source, self.decoder.clone())
            .await;

        let mut store = self.store.lock().await;
        let mut tickets = self.tickets();

        let result = match decoded {
            Err(e) => {
                log::warn!("⚠️ [TrackLine] track {} stays silent: {}", request.id, e);
                None
            }
            Ok(entry) if tickets.claim(request.id, ticket) => Some(store.update(
                request.id,
                entry.resampled_values.clone(),
                request.tempo,
                request.volume,
                entry.original_sample_count,
            )),
            Ok(_) => {
                log::debug!("[TrackLine] update for track {} superseded", request.id);
                None
            }
        };

        tickets.finish(request.id);
        result
    }

    async fn apply_remove(&self, id: TrackId, ticket: u64) -> Composite {
        let mut store = self.store.lock().await;
        let mut tickets = self.tickets();

        let composite = if tickets.claim(id, ticket) {
            store.remove(id)
        } else {
            // A newer update already wrote this track.
            store.composite()
        };

        tickets.finish(id);
        composite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Serves canned samples by file name; `slow*` sources take a while.
    struct FakeDecoder {
        calls: AtomicUsize,
    }

    impl FakeDecoder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl SampleDecoder for FakeDecoder {
        fn decode(&self, source: &SourceKey) -> Result<Vec<f32>, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = source.to_string();
            if name.starts_with("slow") {
                std::thread::sleep(Duration::from_millis(150));
            }
            if name.contains("missing") {
                return Err(DecodeError::NoTrack(name));
            }
            Ok(vec![0.0, 1.0, 0.0, -1.0])
        }
    }

    fn generator(decoder: Arc<FakeDecoder>) -> TrackLineGenerator {
        TrackLineGenerator::builder()
            .decoder(decoder)
            .handle(Handle::current())
            .build()
            .unwrap()
    }

    fn track(source: &str) -> Track {
        Track::new("test", Some(SourceKey::new(source)))
    }

    #[tokio::test]
    async fn test_update_without_source_is_noop() {
        let decoder = FakeDecoder::new();
        let generator = generator(decoder.clone());
        let silent = Track::new("unresolved", None);

        assert!(generator.update_track(&silent, |_| panic!("no callback")).is_none());
        assert!(generator.update(&silent).await.is_none());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_receives_composite() {
        let generator = generator(FakeDecoder::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = generator
            .update_track(&track("a.wav"), move |c| {
                let _ = tx.send(c);
            })
            .unwrap();
        handle.await.unwrap();

        let composite = rx.recv().await.unwrap();
        assert_eq!(composite.len(), 50);
        assert!(composite.peak > 0.0);
    }

    #[tokio::test]
    async fn test_failed_decode_skips_callback() {
        let generator = generator(FakeDecoder::new());
        let (tx, mut rx) = mpsc::unbounded_channel::<Composite>();

        generator
            .update_track(&track("missing.wav"), move |c| {
                let _ = tx.send(c);
            })
            .unwrap()
            .await
            .unwrap();

        // Sender dropped without sending.
        assert!(rx.recv().await.is_none());
        assert_eq!(generator.track_count().await, 0);
        assert!(generator.cache().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remove_beats_slow_update() {
        let generator = generator(FakeDecoder::new());
        let t = track("slow.wav");
        let (tx, mut rx) = mpsc::unbounded_channel::<&'static str>();

        let update_tx = tx.clone();
        let pending = generator
            .update_track(&t, move |_| {
                let _ = update_tx.send("update");
            })
            .unwrap();
        let removed = generator.remove_track(&t, move |_| {
            let _ = tx.send("remove");
        });

        removed.await.unwrap();
        pending.await.unwrap();

        assert_eq!(rx.recv().await, Some("remove"));
        assert_eq!(rx.recv().await, None);
        assert_eq!(generator.track_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_survives_failed_update() {
        let generator = generator(FakeDecoder::new());
        let t = track("a.wav");
        generator.update(&t).await.unwrap();

        let broken = Track {
            source: Some(SourceKey::new("missing.wav")),
            ..t.clone()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();

        let removed = generator.remove_track(&t, move |c| {
            let _ = tx.send(c);
        });
        let failed = generator
            .update_track(&broken, |_| panic!("failed decode ran callback"))
            .unwrap();
        failed.await.unwrap();
        removed.await.unwrap();

        assert_eq!(rx.recv().await, Some(Composite::silent(50)));
        assert_eq!(generator.track_count().await, 0);
        assert_eq!(generator.snapshot().await, Composite::silent(50));
    }

    #[tokio::test]
    async fn test_ticket_records_dropped_when_settled() {
        let generator = generator(FakeDecoder::new());
        let a = track("a.wav");
        let b = track("missing.wav");

        generator.update(&a).await.unwrap();
        assert!(generator.update(&b).await.is_none());
        generator.remove(&a).await;
        generator.remove(&b).await;

        assert!(generator.inner.tickets().tracks.is_empty());
    }

    #[tokio::test]
    async fn test_ticket_taken_at_call_time() {
        let generator = generator(FakeDecoder::new());
        let t = track("a.wav");

        // Created first, polled last: still the older call.
        let update = generator.update(&t);
        let remove = generator.remove(&t);

        assert_eq!(remove.await, Composite::silent(50));
        assert!(update.await.is_none());
        assert_eq!(generator.track_count().await, 0);
    }

    #[test]
    fn test_tickets_newest_writer_wins() {
        let id = TrackId::new();
        let mut tickets = Tickets::default();
        let first = tickets.issue(id);
        let second = tickets.issue(id);

        assert!(tickets.claim(id, second));
        assert!(!tickets.claim(id, first));
        tickets.finish(id);
        assert_eq!(tickets.tracks[&id].in_flight, 1);
        tickets.finish(id);
        assert!(tickets.tracks.is_empty());

        let third = tickets.issue(id);
        assert!(tickets.claim(id, third));
    }

    #[test]
    fn test_build_rejects_zero_workers() {
        let config = PipelineConfig {
            worker_threads: Some(0),
            ..Default::default()
        };
        assert!(TrackLineGenerator::new(config).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_newer_update_wins_over_slow_one() {
        let generator = generator(FakeDecoder::new());
        let first = track("slow.wav");
        let second = first.update(None, None, Some(VolumeTempo { volume: 0.5, tempo: 1.0 }));
        let second = Track {
            source: Some(SourceKey::new("fast.wav")),
            ..second
        };

        let slow = generator.update_track(&first, |_| panic!("superseded update ran")).unwrap();
        let fast = generator.update(&second).await.unwrap();
        slow.await.unwrap();

        assert_eq!(generator.snapshot().await, fast);
        assert_eq!(generator.track_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_after_remove_restores_track() {
        let generator = generator(FakeDecoder::new());
        let t = track("a.wav");

        generator.update(&t).await.unwrap();
        let empty = generator.remove(&t).await;
        assert_eq!(empty, Composite::silent(50));

        let back = generator.update(&t).await.unwrap();
        assert!(back.peak > 0.0);
        assert_eq!(generator.track_count().await, 1);
    }

    #[tokio::test]
    async fn test_shared_source_decodes_once() {
        let decoder = FakeDecoder::new();
        let generator = generator(decoder.clone());

        generator.update(&track("loop.wav")).await.unwrap();
        generator.update(&track("loop.wav")).await.unwrap();

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.track_count().await, 2);
    }

    #[test]
    fn test_owned_runtime_delivers_callback() {
        let generator = TrackLineGenerator::builder()
            .decoder(FakeDecoder::new())
            .build()
            .unwrap();
        let (tx, rx) = std::sync::mpsc::channel();

        generator.update_track(&track("a.wav"), move |c| {
            let _ = tx.send(c);
        });

        let composite = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(composite.len(), 50);
    }
}
