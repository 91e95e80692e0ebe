use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::http::{
    HeaderName, HeaderValue, StatusCode,
    header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LAST_MODIFIED},
};
use bytes::Bytes;
use pipecache::cache::{
    Cache, CacheConfig, CacheKey, CachedResponse, CompositeValidity, ManualClock, MemoryCache,
    SourceMarker, Validity,
};
use pipecache::pipeline::{
    BufferedTransport, ByteSink, CachingPipeline, Event, EventProducer, EventSink,
    OVERRIDE_CACHE_EXPIRES, OVERRIDE_PURGE_CACHE, Outcome, Pipeline, PipelineError, PipelineSettings, Producer,
    RequestContext, Transport, XmlSerializer, http_date,
};
use time::{Duration, OffsetDateTime};

#[derive(Default)]
struct Shared {
    runs: AtomicUsize,
    version: AtomicU64,
    fail_validities: AtomicBool,
    edit_during_produce: AtomicBool,
}

impl Shared {
    fn sample(&self) -> Result<Vec<Validity>, PipelineError> {
        if self.fail_validities.load(Ordering::SeqCst) {
            return Err(PipelineError::generation("source unavailable"));
        }
        Ok(vec![Validity::source(
            "page",
            SourceMarker::Tag(self.version.load(Ordering::SeqCst).to_string()),
        )])
    }
}

struct Page {
    chunks: Vec<&'static str>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Producer for Page {
    async fn produce(&mut self, out: &mut dyn ByteSink) -> Result<(), PipelineError> {
        self.shared.runs.fetch_add(1, Ordering::SeqCst);
        for chunk in &self.chunks {
            out.write(chunk.as_bytes())?;
        }
        Ok(())
    }

    fn content_type(&self) -> Option<String> {
        Some("text/plain".to_string())
    }

    async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        self.shared.sample()
    }
}

/// Reports its source version, then edits the source while still running
/// when `edit_during_produce` is set.
struct Revision {
    shared: Arc<Shared>,
}

#[async_trait]
impl Producer for Revision {
    async fn produce(&mut self, out: &mut dyn ByteSink) -> Result<(), PipelineError> {
        self.shared.runs.fetch_add(1, Ordering::SeqCst);
        let version = self.shared.version.load(Ordering::SeqCst);
        out.write(format!("content-v{version}").as_bytes())?;
        if self.shared.edit_during_produce.swap(false, Ordering::SeqCst) {
            self.shared.version.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        self.shared.sample()
    }
}

struct Listing {
    shared: Arc<Shared>,
}

#[async_trait]
impl EventProducer for Listing {
    async fn produce(&mut self, out: &mut dyn EventSink) -> Result<(), PipelineError> {
        self.shared.runs.fetch_add(1, Ordering::SeqCst);
        out.event(&Event::StartDocument)?;
        out.event(&Event::start("items"))?;
        out.event(&Event::start_with(
            "item",
            vec![("id".to_string(), "1".to_string())],
        ))?;
        out.event(&Event::text("first"))?;
        out.event(&Event::end("item"))?;
        out.event(&Event::end("items"))?;
        out.event(&Event::EndDocument)
    }

    async fn validities(&self) -> Result<Vec<Validity>, PipelineError> {
        self.shared.sample()
    }
}

/// Transport that commits on the first chunk and fails on the next one.
#[derive(Default)]
struct FlakyConnection {
    written: usize,
}

impl ByteSink for FlakyConnection {
    fn write(&mut self, _chunk: &[u8]) -> io::Result<()> {
        self.written += 1;
        if self.written > 1 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer reset"));
        }
        Ok(())
    }
}

impl Transport for FlakyConnection {
    fn set_status(&mut self, _status: StatusCode) {}

    fn set_header(&mut self, _name: HeaderName, _value: HeaderValue) {}

    fn committed(&self) -> bool {
        self.written > 0
    }
}

struct Harness {
    cache: Arc<MemoryCache>,
    clock: Arc<ManualClock>,
    controller: CachingPipeline,
    shared: Arc<Shared>,
}

impl Harness {
    fn new(default_expires_seconds: i64) -> Self {
        let cache = Arc::new(MemoryCache::new(&CacheConfig::default()));
        let clock = Arc::new(ManualClock::new(start()));
        let controller = CachingPipeline::new(
            cache.clone(),
            clock.clone(),
            PipelineSettings {
                enabled: true,
                default_expires_seconds,
                key_template: None,
            },
        );
        Self {
            cache,
            clock,
            controller,
            shared: Arc::new(Shared::default()),
        }
    }

    fn page(&self) -> Pipeline {
        Pipeline::serialized(Page {
            chunks: vec!["hello ", "world"],
            shared: Arc::clone(&self.shared),
        })
    }

    fn revision(&self) -> Pipeline {
        Pipeline::serialized(Revision {
            shared: Arc::clone(&self.shared),
        })
    }

    fn listing(&self, serializer: XmlSerializer) -> Pipeline {
        Pipeline::events(
            Listing {
                shared: Arc::clone(&self.shared),
            },
            serializer,
        )
    }

    async fn get(&self, request: &RequestContext, pipeline: Pipeline) -> (Outcome, BufferedTransport) {
        let mut transport = BufferedTransport::new();
        let outcome = self
            .controller
            .process(request, pipeline, &mut transport)
            .await
            .expect("request should succeed");
        (outcome, transport)
    }

    fn runs(&self) -> usize {
        self.shared.runs.load(Ordering::SeqCst)
    }
}

fn start() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid timestamp")
}

fn header<'a>(transport: &'a BufferedTransport, name: HeaderName) -> Option<&'a str> {
    transport
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn expired_entries_are_regenerated() {
    let harness = Harness::new(180);
    let request = RequestContext::new("/news.txt");

    let (outcome, first) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Generated { stored: true });
    assert_eq!(first.body(), b"hello world");
    assert_eq!(
        header(&first, EXPIRES),
        http_date::format(start() + Duration::seconds(180)).as_deref()
    );

    harness.clock.advance(Duration::seconds(100));
    let (outcome, second) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Replayed);
    assert_eq!(second.body(), b"hello world");
    assert_eq!(header(&second, CACHE_CONTROL), Some("max-age=80"));
    assert_eq!(harness.runs(), 1);

    harness.clock.advance(Duration::seconds(81));
    let (outcome, _) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Generated { stored: true });
    assert_eq!(harness.runs(), 2);
}

#[tokio::test]
async fn conditional_requests_get_not_modified() {
    let harness = Harness::new(180);
    harness
        .get(&RequestContext::new("/a.txt"), harness.page())
        .await;

    let current = RequestContext::new("/a.txt").with_if_modified_since(start());
    let (outcome, transport) = harness.get(&current, harness.page()).await;
    assert_eq!(outcome, Outcome::NotModified);
    assert_eq!(transport.status(), StatusCode::NOT_MODIFIED);
    assert!(transport.body().is_empty());
    assert_eq!(
        header(&transport, LAST_MODIFIED),
        http_date::format(start()).as_deref()
    );

    let older =
        RequestContext::new("/a.txt").with_if_modified_since(start() - Duration::seconds(1));
    let (outcome, transport) = harness.get(&older, harness.page()).await;
    assert_eq!(outcome, Outcome::Replayed);
    assert_eq!(transport.body(), b"hello world");
}

#[tokio::test]
async fn purge_forces_one_regeneration() {
    let harness = Harness::new(180);
    let request = RequestContext::new("/a.txt");
    harness.get(&request, harness.page()).await;

    let purge = RequestContext::new("/a.txt").with_override(OVERRIDE_PURGE_CACHE, "true");
    let (outcome, _) = harness.get(&purge, harness.page()).await;
    assert_eq!(outcome, Outcome::Generated { stored: true });
    assert_eq!(harness.runs(), 2);

    let (outcome, _) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Replayed);
    assert_eq!(harness.runs(), 2);
}

#[tokio::test]
async fn purge_applies_even_when_request_is_uncacheable() {
    let harness = Harness::new(180);
    let request = RequestContext::new("/a.txt");
    harness.get(&request, harness.page()).await;
    assert_eq!(harness.cache.len(), 1);

    let purge = RequestContext::new("/a.txt")
        .with_override(OVERRIDE_PURGE_CACHE, "true")
        .with_override(OVERRIDE_CACHE_EXPIRES, "0");
    let (outcome, transport) = harness.get(&purge, harness.page()).await;
    assert_eq!(outcome, Outcome::Generated { stored: false });
    assert_eq!(transport.body(), b"hello world");
    assert!(harness.cache.is_empty());

    let (outcome, _) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Generated { stored: true });
    assert_eq!(harness.runs(), 3);
}

#[tokio::test]
async fn source_edited_during_generation_is_not_cached() {
    let harness = Harness::new(-1);
    let request = RequestContext::new("/live.txt");
    harness
        .shared
        .edit_during_produce
        .store(true, Ordering::SeqCst);

    let (outcome, first) = harness.get(&request, harness.revision()).await;
    assert_eq!(outcome, Outcome::Generated { stored: false });
    assert_eq!(first.body(), b"content-v0");
    assert!(harness.cache.is_empty());

    let (outcome, second) = harness.get(&request, harness.revision()).await;
    assert_eq!(outcome, Outcome::Generated { stored: true });
    assert_eq!(second.body(), b"content-v1");

    let (outcome, third) = harness.get(&request, harness.revision()).await;
    assert_eq!(outcome, Outcome::Replayed);
    assert_eq!(third.body(), b"content-v1");
    assert_eq!(harness.runs(), 2);
}

#[tokio::test]
async fn changed_dependency_invalidates_entry() {
    let harness = Harness::new(180);
    let request = RequestContext::new("/a.txt");
    harness.get(&request, harness.page()).await;

    harness.shared.version.store(1, Ordering::SeqCst);
    let (outcome, _) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Generated { stored: true });
    assert_eq!(harness.runs(), 2);
}

#[tokio::test]
async fn unavailable_dependencies_count_as_stale() {
    let harness = Harness::new(180);
    let request = RequestContext::new("/a.txt");
    harness.get(&request, harness.page()).await;
    assert_eq!(harness.cache.len(), 1);

    harness.shared.fail_validities.store(true, Ordering::SeqCst);
    let (outcome, transport) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Generated { stored: false });
    assert_eq!(transport.body(), b"hello world");
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn indefinite_entries_survive_the_clock() {
    let harness = Harness::new(-1);
    let request = RequestContext::new("/archive.txt");

    let (_, first) = harness.get(&request, harness.page()).await;
    assert!(header(&first, CACHE_CONTROL).is_none());
    assert!(header(&first, EXPIRES).is_none());
    assert!(header(&first, LAST_MODIFIED).is_some());

    harness.clock.advance(Duration::days(365));
    let (outcome, _) = harness.get(&request, harness.page()).await;
    assert_eq!(outcome, Outcome::Replayed);
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn event_records_are_rendered_by_the_current_serializer() {
    let harness = Harness::new(180);
    let request = RequestContext::new("/items");

    let (_, first) = harness
        .get(&request, harness.listing(XmlSerializer::new()))
        .await;
    assert_eq!(
        std::str::from_utf8(first.body()).expect("utf-8"),
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><items><item id=\"1\">first</item></items>"
    );

    let serializer = XmlSerializer::new()
        .without_declaration()
        .with_content_type("application/xml");
    let (outcome, second) = harness.get(&request, harness.listing(serializer)).await;
    assert_eq!(outcome, Outcome::Replayed);
    assert_eq!(second.body(), b"<items><item id=\"1\">first</item></items>");
    assert_eq!(header(&second, CONTENT_TYPE), Some("application/xml"));
    assert_eq!(harness.runs(), 1);
}

#[tokio::test]
async fn corrupt_event_record_falls_back_to_generation() {
    let harness = Harness::new(180);
    let key = CacheKey::new("/items", false);
    harness
        .cache
        .store(
            key.clone(),
            CachedResponse::new(
                Bytes::from_static(b"not an event stream"),
                CompositeValidity::new(vec![Validity::Always]),
                None,
                start(),
            ),
        )
        .expect("seed corrupt entry");

    let (outcome, transport) = harness
        .get(
            &RequestContext::new("/items"),
            harness.listing(XmlSerializer::new().without_declaration()),
        )
        .await;
    assert_eq!(outcome, Outcome::Generated { stored: true });
    assert_eq!(transport.body(), b"<items><item id=\"1\">first</item></items>");
    assert_eq!(harness.runs(), 1);

    let replaced = harness.cache.get(&key).expect("entry replaced");
    assert_ne!(replaced.payload().as_ref(), b"not an event stream");
}

#[tokio::test]
async fn granularity_and_query_separate_entries() {
    let harness = Harness::new(180);

    harness
        .get(&RequestContext::new("/list").with_query("page=1"), harness.page())
        .await;
    harness
        .get(&RequestContext::new("/list").with_query("page=2"), harness.page())
        .await;
    harness
        .get(
            &RequestContext::new("/list").with_query("page=1"),
            harness.listing(XmlSerializer::new()),
        )
        .await;

    let mut keys = harness.cache.keys();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            CacheKey::new("/list?page=1", false),
            CacheKey::new("/list?page=1", true),
            CacheKey::new("/list?page=2", true),
        ]
    );
}

#[tokio::test]
async fn client_disconnect_after_commit_abandons_request() {
    let harness = Harness::new(180);
    let mut connection = FlakyConnection::default();

    let outcome = harness
        .controller
        .process(&RequestContext::new("/a.txt"), harness.page(), &mut connection)
        .await
        .expect("abandoned requests are not errors");

    assert_eq!(outcome, Outcome::Abandoned);
    assert!(harness.cache.is_empty());
}

#[tokio::test]
async fn concurrent_generations_leave_one_entry() {
    let harness = Harness::new(180);
    let request = RequestContext::new("/race.txt");

    let ((first, _), (second, _)) = tokio::join!(
        harness.get(&request, harness.page()),
        harness.get(&request, harness.page())
    );

    assert!(matches!(first, Outcome::Generated { stored: true } | Outcome::Replayed));
    assert!(matches!(second, Outcome::Generated { stored: true } | Outcome::Replayed));
    assert_eq!(harness.cache.len(), 1);
    let entry = harness
        .cache
        .get(&CacheKey::new("/race.txt", true))
        .expect("one entry");
    assert_eq!(entry.payload().as_ref(), b"hello world");
}
