//! Expiry-driven caching around a pipeline execution.
//!
//! One call to [`CachingPipeline::process`] runs the whole decision tree:
//! derive key and expiry, look the key up, then either replay the stored
//! output or run the pipeline with a capturing tee and store the result.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{
    HeaderValue, StatusCode,
    header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, EXPIRES, LAST_MODIFIED},
};
use bytes::{Bytes, BytesMut};
use metrics::{counter, histogram};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::cache::{
    Cache, CacheConfig, CacheKey, CachedResponse, Clock, CompositeValidity, Freshness,
    default_key, render_template, truncate_to_second,
};

use super::codec::{self, EventCompiler};
use super::error::PipelineError;
use super::event::EventSink;
use super::expiry::ExpiryPolicy;
use super::producer::Pipeline;
use super::sink::{ByteTee, EventTee, SerializingSink};
use super::transport::{
    OVERRIDE_CACHE_EXPIRES, OVERRIDE_CACHE_KEY, RequestContext, Transport, http_date,
};

pub(crate) const METRIC_CACHE_HIT: &str = "pipecache_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "pipecache_cache_miss_total";
pub(crate) const METRIC_CACHE_PURGE: &str = "pipecache_cache_purge_total";
pub(crate) const METRIC_CACHE_STORE_FAILURE: &str = "pipecache_cache_store_failure_total";
pub(crate) const METRIC_GENERATE_MS: &str = "pipecache_generate_ms";

/// Settings read once when the controller is built.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub enabled: bool,
    pub default_expires_seconds: i64,
    pub key_template: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for PipelineSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enabled,
            default_expires_seconds: config.default_expires_seconds,
            key_template: config.key_template.clone(),
        }
    }
}

/// How a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stored output was sent without running the pipeline.
    Replayed,
    /// The client's copy is current; no body was sent.
    NotModified,
    /// The pipeline ran; `stored` tells whether its output was cached.
    Generated { stored: bool },
    /// The client went away after output had been committed.
    Abandoned,
}

/// Per-request state, derived before any pipeline stage runs.
#[derive(Debug)]
struct Execution {
    key: CacheKey,
    expiry: ExpiryPolicy,
    purge: bool,
}

pub struct CachingPipeline {
    cache: Arc<dyn Cache>,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl CachingPipeline {
    pub fn new(cache: Arc<dyn Cache>, clock: Arc<dyn Clock>, settings: PipelineSettings) -> Self {
        Self {
            cache,
            clock,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Serve one request through `pipeline`, writing the response to `transport`.
    #[instrument(skip_all, fields(path = %request.path, granularity = pipeline.granularity()))]
    pub async fn process(
        &self,
        request: &RequestContext,
        mut pipeline: Pipeline,
        transport: &mut dyn Transport,
    ) -> Result<Outcome, PipelineError> {
        let execution = self.prepare(request, &pipeline);

        if execution.purge {
            self.purge(&execution.key);
        }

        if execution.expiry.is_never() {
            debug!(key = %execution.key, "caching disabled for this request");
            return self
                .generate(&execution, &mut pipeline, transport, false)
                .await;
        }

        if let Some(cached) = self.lookup(&execution, &pipeline).await {
            match self.replay(request, &cached, &mut pipeline, transport) {
                Ok(outcome) => {
                    counter!(METRIC_CACHE_HIT, "granularity" => pipeline.granularity())
                        .increment(1);
                    debug!(key = %execution.key, outcome = "hit", "served cached response");
                    return Ok(outcome);
                }
                Err(PipelineError::Codec(err)) => {
                    warn!(
                        key = %execution.key,
                        error = %err,
                        "cached event stream is corrupt, regenerating"
                    );
                    self.remove_quietly(&execution.key, "corrupt");
                }
                Err(PipelineError::Transport(err)) => {
                    return Self::transport_failure(err, transport);
                }
                Err(err) => return Err(err),
            }
        }

        counter!(METRIC_CACHE_MISS, "granularity" => pipeline.granularity()).increment(1);
        debug!(key = %execution.key, outcome = "miss", "generating response");
        self.generate(&execution, &mut pipeline, transport, true)
            .await
    }

    fn prepare(&self, request: &RequestContext, pipeline: &Pipeline) -> Execution {
        let key = match request
            .override_value(OVERRIDE_CACHE_KEY)
            .filter(|key| !key.trim().is_empty())
        {
            Some(key) => key.to_string(),
            None => match self.settings.key_template.as_deref() {
                Some(template) => {
                    render_template(template, &request.path, request.query.as_deref())
                }
                None => default_key(&request.path, request.query.as_deref()),
            },
        };

        let seconds = match request.override_value(OVERRIDE_CACHE_EXPIRES) {
            Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                warn!(value = raw, "ignoring non-numeric cache-expires override");
                self.settings.default_expires_seconds
            }),
            None => self.settings.default_expires_seconds,
        };
        let expiry = if self.settings.enabled {
            ExpiryPolicy::from_seconds(seconds)
        } else {
            ExpiryPolicy::Never
        };

        Execution {
            key: CacheKey::new(key, pipeline.is_complete()),
            expiry,
            purge: request.purge_requested(),
        }
    }

    /// Return a fresh entry, removing it if it turns out stale.
    async fn lookup(&self, execution: &Execution, pipeline: &Pipeline) -> Option<CachedResponse> {
        if execution.purge {
            return None;
        }

        let cached = self.cache.get(&execution.key)?;
        let now = self.clock.now();

        let freshness = match cached.validity().check(now) {
            Freshness::Unknown => match pipeline.validities().await {
                Ok(current) => cached.validity().resolve(now, &current),
                Err(err) => {
                    debug!(key = %execution.key, error = %err, "could not sample dependencies");
                    Freshness::Stale
                }
            },
            decided => decided,
        };

        if freshness.is_fresh() {
            Some(cached)
        } else {
            debug!(
                key = %execution.key,
                dependencies = ?cached.validity().dependencies(),
                "cached response is stale"
            );
            self.remove_quietly(&execution.key, "stale");
            None
        }
    }

    fn replay(
        &self,
        request: &RequestContext,
        cached: &CachedResponse,
        pipeline: &mut Pipeline,
        transport: &mut dyn Transport,
    ) -> Result<Outcome, PipelineError> {
        let last_modified = cached.last_modified();

        if request
            .if_modified_since
            .is_some_and(|since| since >= last_modified)
        {
            transport.set_status(StatusCode::NOT_MODIFIED);
            set_date(transport, LAST_MODIFIED, last_modified);
            return Ok(Outcome::NotModified);
        }

        let content_type = cached
            .content_type()
            .map(str::to_string)
            .or_else(|| pipeline.default_content_type());

        let body: Bytes = match pipeline {
            Pipeline::Serialized(_) => cached.payload().clone(),
            Pipeline::Events { serializer, .. } => {
                // Decode everything before touching the transport so a
                // damaged entry never produces partial output.
                let events = codec::decode(cached.payload())?;
                let mut rendered = BytesMut::new();
                let mut sink = SerializingSink::new(serializer.as_mut(), &mut rendered);
                for event in &events {
                    sink.event(event)?;
                }
                rendered.freeze()
            }
        };

        set_content_type(transport, content_type.as_deref());
        set_date(transport, LAST_MODIFIED, last_modified);
        set_freshness(transport, cached.expires(), self.clock.now());
        transport.set_header(CONTENT_LENGTH, HeaderValue::from(body.len()));
        transport.set_status(StatusCode::OK);
        transport.write(&body)?;

        Ok(Outcome::Replayed)
    }

    async fn generate(
        &self,
        execution: &Execution,
        pipeline: &mut Pipeline,
        transport: &mut dyn Transport,
        capture: bool,
    ) -> Result<Outcome, PipelineError> {
        let created = truncate_to_second(self.clock.now());
        let content_type = pipeline.default_content_type();
        let granularity = pipeline.granularity();

        set_content_type(transport, content_type.as_deref());
        match execution.expiry {
            ExpiryPolicy::Never => {
                transport.set_header(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            }
            policy => {
                set_date(transport, LAST_MODIFIED, created);
                set_freshness(transport, policy.expires_at(created), created);
            }
        }
        transport.set_status(StatusCode::OK);

        // Sampled before production so a source changing mid-run is caught.
        let sampled_before = if capture {
            Some(pipeline.validities().await)
        } else {
            None
        };

        let started_at = Instant::now();
        let mut captured = BytesMut::new();
        let result = match pipeline {
            Pipeline::Serialized(producer) => {
                if capture {
                    let mut tee = ByteTee::new(transport, &mut captured);
                    producer.produce(&mut tee).await
                } else {
                    producer.produce(transport).await
                }
            }
            Pipeline::Events {
                producer,
                serializer,
            } => {
                let mut out = SerializingSink::new(serializer.as_mut(), transport);
                if capture {
                    let mut compiler = EventCompiler::new();
                    let result = {
                        let mut tee = EventTee::new(&mut out, &mut compiler);
                        producer.produce(&mut tee).await
                    };
                    captured = BytesMut::from(compiler.finish().as_ref());
                    result
                } else {
                    producer.produce(&mut out).await
                }
            }
        };
        histogram!(METRIC_GENERATE_MS, "granularity" => granularity)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(()) => {}
            Err(PipelineError::Transport(err)) => return Self::transport_failure(err, transport),
            Err(err) => {
                debug!(key = %execution.key, error = %err, "generation failed, nothing cached");
                return Err(err);
            }
        }

        let Some(sampled_before) = sampled_before else {
            return Ok(Outcome::Generated { stored: false });
        };

        let Some(expiry_token) = execution.expiry.validity(created) else {
            return Ok(Outcome::Generated { stored: false });
        };

        let sampled = match (sampled_before, pipeline.validities().await) {
            (Ok(before), Ok(after)) if before == after => before,
            (Ok(_), Ok(_)) => {
                debug!(
                    key = %execution.key,
                    "dependencies changed during generation, response not cached"
                );
                return Ok(Outcome::Generated { stored: false });
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!(
                    key = %execution.key,
                    error = %err,
                    "could not sample dependencies, response not cached"
                );
                return Ok(Outcome::Generated { stored: false });
            }
        };
        let mut validities = vec![expiry_token];
        validities.extend(sampled);

        // Event records carry no content type: the serializer chosen at
        // replay time decides it.
        let recorded_type = if pipeline.is_complete() {
            content_type
        } else {
            None
        };
        let mut response = CachedResponse::new(
            captured.freeze(),
            CompositeValidity::new(validities),
            recorded_type,
            created,
        );
        response.set_expires(execution.expiry.expires_at(created));

        match self.cache.store(execution.key.clone(), response) {
            Ok(()) => {
                debug!(key = %execution.key, expiry = ?execution.expiry, "stored response");
                Ok(Outcome::Generated { stored: true })
            }
            Err(err) => {
                counter!(METRIC_CACHE_STORE_FAILURE).increment(1);
                warn!(key = %execution.key, error = %err, "failed to store response");
                Ok(Outcome::Generated { stored: false })
            }
        }
    }

    fn purge(&self, key: &CacheKey) {
        if self.cache.contains_key(key) {
            counter!(METRIC_CACHE_PURGE).increment(1);
            debug!(key = %key, "purging cached response on request");
        }
        self.remove_quietly(key, "purge");
    }

    fn remove_quietly(&self, key: &CacheKey, reason: &'static str) {
        if let Err(err) = self.cache.remove(key) {
            warn!(key = %key, reason, error = %err, "failed to remove cached response");
        }
    }

    fn transport_failure(
        err: io::Error,
        transport: &dyn Transport,
    ) -> Result<Outcome, PipelineError> {
        if transport.committed() {
            debug!(error = %err, "client disconnected mid-response, nothing cached");
            Ok(Outcome::Abandoned)
        } else {
            Err(PipelineError::Transport(err))
        }
    }
}

fn set_content_type(transport: &mut dyn Transport, content_type: Option<&str>) {
    let Some(content_type) = content_type else {
        return;
    };
    match HeaderValue::from_str(content_type) {
        Ok(value) => transport.set_header(CONTENT_TYPE, value),
        Err(_) => debug!(content_type, "skipping invalid content type"),
    }
}

fn set_date(
    transport: &mut dyn Transport,
    name: axum::http::HeaderName,
    instant: OffsetDateTime,
) {
    if let Some(value) = http_date::format(instant).and_then(|v| HeaderValue::from_str(&v).ok()) {
        transport.set_header(name, value);
    }
}

fn set_freshness(
    transport: &mut dyn Transport,
    expires: Option<OffsetDateTime>,
    now: OffsetDateTime,
) {
    let Some(expires) = expires else {
        return;
    };
    let remaining = (expires - now).whole_seconds().max(0);
    transport.set_header(
        CACHE_CONTROL,
        HeaderValue::from_str(&format!("max-age={remaining}"))
            .unwrap_or_else(|_| HeaderValue::from_static("no-cache")),
    );
    set_date(transport, EXPIRES, expires);
}
