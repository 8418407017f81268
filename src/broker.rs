//! Report retrieval: local cache first, producer second.
//!
//! The cache only exists to skip a round trip right after creation. Entries
//! are re-validated on every read and evicted when they do not describe the
//! requested report; reads never write the cache.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, SnapshotCache};
use crate::error::ReportError;
use crate::producer::ReportSource;
use crate::request::ReportSpec;
use crate::snapshot::ReportSnapshot;

/// Why a cached entry was discarded. Logged, never returned to callers.
#[derive(Debug, Error)]
pub enum CacheCorruption {
    #[error("entry is not valid json: {0}")]
    Json(serde_json::Error),
    #[error("entry is not an object")]
    NotObject,
    #[error("entry id {found:?} does not match requested id")]
    IdMismatch { found: Option<String> },
    #[error("entry has no overview")]
    MissingOverview,
    #[error("entry does not decode as a snapshot: {0}")]
    Shape(serde_json::Error),
}

/// Decode a cached value, checking it really is the report `id`.
pub fn decode_cached(id: &str, raw: &str) -> Result<ReportSnapshot, CacheCorruption> {
    let value: Value = serde_json::from_str(raw).map_err(CacheCorruption::Json)?;
    let obj = value.as_object().ok_or(CacheCorruption::NotObject)?;

    match obj.get("id").and_then(Value::as_str) {
        Some(found) if found == id => {}
        found => {
            return Err(CacheCorruption::IdMismatch {
                found: found.map(str::to_string),
            })
        }
    }
    if obj.get("overview").map_or(true, Value::is_null) {
        return Err(CacheCorruption::MissingOverview);
    }

    serde_json::from_value(value).map_err(CacheCorruption::Shape)
}

pub struct Broker<C, S> {
    cache: C,
    source: S,
}

impl<C: SnapshotCache, S: ReportSource> Broker<C, S> {
    pub fn new(cache: C, source: S) -> Self {
        Self { cache, source }
    }

    /// Resolve a report by id. The id is used verbatim; only a blank id is
    /// rejected.
    pub async fn resolve(&mut self, id: &str) -> Result<ReportSnapshot, ReportError> {
        if id.trim().is_empty() {
            return Err(ReportError::MissingId);
        }

        if let Some(snapshot) = self.read_cached(id) {
            debug!(id, "report served from cache");
            return Ok(snapshot);
        }

        let snapshot = self.source.fetch(id).await?;
        info!(id, "report fetched from producer");
        Ok(snapshot)
    }

    /// Submit a specification and cache the resulting snapshot.
    ///
    /// This is the only place that writes the cache.
    pub async fn create(&mut self, spec: &ReportSpec) -> Result<ReportSnapshot, ReportError> {
        let snapshot = self.source.create(spec).await?;
        if snapshot.id.trim().is_empty() {
            return Err(ReportError::Producer("生成报告失败".to_string()));
        }
        if !snapshot.overview.is_consistent() {
            warn!(id = %snapshot.id, "producer overview has more errors than requests");
        }

        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(err) = self.cache.put(&cache_key(&snapshot.id), &json) {
                    warn!(id = %snapshot.id, error = %err, "failed to cache created report");
                }
            }
            Err(err) => warn!(id = %snapshot.id, error = %err, "failed to serialize created report"),
        }

        info!(id = %snapshot.id, name = %snapshot.name, "report created");
        Ok(snapshot)
    }

    fn read_cached(&mut self, id: &str) -> Option<ReportSnapshot> {
        let key = cache_key(id);
        let raw = match self.cache.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed, falling back to producer");
                return None;
            }
        };

        match decode_cached(id, &raw) {
            Ok(snapshot) => Some(snapshot),
            Err(reason) => {
                warn!(key = %key, %reason, "discarding invalid cache entry");
                if let Err(err) = self.cache.remove(&key) {
                    warn!(key = %key, error = %err, "failed to evict cache entry");
                }
                None
            }
        }
    }
}

#[cfg(test)]
impl<C, S> Broker<C, S> {
    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::snapshot::ReportCatalogEntry;

    /// In-process producer that counts remote calls.
    #[derive(Default)]
    pub struct FakeSource {
        pub reports: Mutex<HashMap<String, ReportSnapshot>>,
        pub next: Mutex<Option<ReportSnapshot>>,
        pub catalog: Mutex<Option<Result<Vec<ReportCatalogEntry>, ReportError>>>,
        pub fetches: AtomicUsize,
    }

    impl FakeSource {
        pub fn with_report(snapshot: ReportSnapshot) -> Self {
            let source = Self::default();
            source
                .reports
                .lock()
                .unwrap()
                .insert(snapshot.id.clone(), snapshot);
            source
        }

        pub fn creating(snapshot: ReportSnapshot) -> Self {
            let source = Self::with_report(snapshot.clone());
            *source.next.lock().unwrap() = Some(snapshot);
            source
        }

        pub fn listing(result: Result<Vec<ReportCatalogEntry>, ReportError>) -> Self {
            let source = Self::default();
            *source.catalog.lock().unwrap() = Some(result);
            source
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReportSource for FakeSource {
        async fn create(&self, _spec: &ReportSpec) -> Result<ReportSnapshot, ReportError> {
            self.next
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ReportError::Producer("生成报告失败".to_string()))
        }

        async fn fetch(&self, id: &str) -> Result<ReportSnapshot, ReportError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.reports
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| ReportError::NotFound("报告未找到".to_string()))
        }

        async fn list(&self) -> Result<Vec<ReportCatalogEntry>, ReportError> {
            self.catalog
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
