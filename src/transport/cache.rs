//! Response cache in front of a transport

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use super::{Dispatch, Headers, Method, NoopHandle, Operation, OperationKind, Response, Transport};

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Wrap the queue in a `CachedTransport`
    pub enabled: bool,

    /// How long a cached response stays valid, in milliseconds
    #[serde(rename = "expire-ms")]
    pub expire_ms: u64,

    /// Methods that always go to the network
    #[serde(rename = "exclude-methods")]
    pub exclude_methods: Vec<Method>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            expire_ms: 10 * 60 * 1000,
            exclude_methods: vec![Method::Post, Method::Put, Method::Delete, Method::Trace, Method::Connect],
        }
    }
}

impl CacheConfig {
    pub fn expire(&self) -> Duration {
        Duration::from_millis(self.expire_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: OperationKind,
    method: Method,
    url: String,
    header: Headers,
    body: String,
    local_path: Option<PathBuf>,
}

struct CacheEntry {
    response: Response,
    expires_at: Instant,
}

/// Serves repeated operations from memory
///
/// Only successful (2xx) results are stored, keyed on everything that
/// shapes the request including headers. Uploads and excluded methods pass
/// straight through. A hit never reaches the inner transport.
pub struct CachedTransport<T> {
    inner: T,
    config: CacheConfig,
    entries: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
}

impl<T: Transport> CachedTransport<T> {
    pub fn new(inner: T, config: CacheConfig) -> Self {
        debug!(?config, "CachedTransport::new: called");
        Self {
            inner,
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Number of stored entries, expired ones included until the next insert
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        debug!("CachedTransport::clear: called");
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_for(&self, operation: &Operation) -> Option<CacheKey> {
        if operation.kind == OperationKind::Upload || self.config.exclude_methods.contains(&operation.method) {
            return None;
        }
        Some(CacheKey {
            kind: operation.kind,
            method: operation.method,
            url: operation.url.clone(),
            header: operation.header.clone(),
            body: operation.data.as_ref().map(|d| d.to_string()).unwrap_or_default(),
            local_path: operation.local_path.clone(),
        })
    }

    fn lookup(&self, key: &CacheKey) -> Option<Response> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.response.clone()),
            Some(_) => {
                debug!(url = %key.url, "CachedTransport::lookup: expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

impl<T: Transport> Transport for CachedTransport<T> {
    fn dispatch(&self, operation: Operation) -> Dispatch {
        let Some(key) = self.key_for(&operation) else {
            debug!(url = %operation.url, method = %operation.method, "CachedTransport::dispatch: not cacheable");
            return self.inner.dispatch(operation);
        };

        if let Some(mut response) = self.lookup(&key) {
            debug!(url = %operation.url, "CachedTransport::dispatch: hit");
            response.time = None;
            return Dispatch {
                handle: Arc::new(NoopHandle),
                completion: futures::future::ready(Ok(response)).boxed(),
            };
        }

        debug!(url = %operation.url, "CachedTransport::dispatch: miss");
        let Dispatch { handle, completion } = self.inner.dispatch(operation);
        let entries = Arc::clone(&self.entries);
        let expire = self.config.expire();

        let completion = async move {
            let result = completion.await;
            if let Ok(response) = &result
                && response.is_ok()
            {
                let now = Instant::now();
                let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
                entries.retain(|_, entry| entry.expires_at > now);
                entries.insert(
                    key,
                    CacheEntry {
                        response: response.clone(),
                        expires_at: now + expire,
                    },
                );
            }
            result
        }
        .boxed();

        Dispatch { handle, completion }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockReply, MockTransport};
    use serde_json::json;

    fn cached(mock: MockTransport) -> CachedTransport<MockTransport> {
        CachedTransport::new(mock, CacheConfig::default())
    }

    fn get(url: &str) -> Operation {
        Operation::new(OperationKind::Request, url)
    }

    #[tokio::test]
    async fn test_hit_skips_inner_transport() {
        let cache = cached(MockTransport::ok());

        let first = cache.dispatch(get("/users")).completion.await.unwrap();
        let second = cache.dispatch(get("/users")).completion.await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.inner().call_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_excluded_methods_and_uploads_pass_through() {
        let cache = cached(MockTransport::ok());

        for _ in 0..2 {
            cache.dispatch(get("/users").with_method(Method::Post)).completion.await.unwrap();
            cache
                .dispatch(Operation::new(OperationKind::Upload, "/files"))
                .completion
                .await
                .unwrap();
        }

        assert_eq!(cache.inner().call_count(), 4);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_failures_and_non_2xx_not_stored() {
        let cache = cached(
            MockTransport::failing("down").with_reply("/missing", MockReply::Ok(Response::new(404, json!(null)))),
        );

        assert!(cache.dispatch(get("/down")).completion.await.is_err());
        assert_eq!(cache.dispatch(get("/missing")).completion.await.unwrap().status_code, 404);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_body_is_part_of_key() {
        let cache = cached(MockTransport::ok());

        let mut a = get("/search");
        a.data = Some(json!({"q": "a"}));
        let mut b = get("/search");
        b.data = Some(json!({"q": "b"}));

        cache.dispatch(a.clone()).completion.await.unwrap();
        cache.dispatch(b).completion.await.unwrap();
        cache.dispatch(a).completion.await.unwrap();

        assert_eq!(cache.inner().call_count(), 2);
    }

    #[tokio::test]
    async fn test_headers_are_part_of_key() {
        let cache = cached(MockTransport::ok());

        let alice = get("/me").with_header("Authorization", "Bearer alice");
        let bob = get("/me").with_header("Authorization", "Bearer bob");

        cache.dispatch(alice.clone()).completion.await.unwrap();
        cache.dispatch(bob).completion.await.unwrap();
        cache.dispatch(alice).completion.await.unwrap();

        assert_eq!(cache.inner().call_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_prunes_expired_entries() {
        let config = CacheConfig {
            enabled: true,
            expire_ms: 1000,
            ..Default::default()
        };
        let cache = CachedTransport::new(MockTransport::ok(), config);

        for url in ["/a", "/b", "/c"] {
            cache.dispatch(get(url)).completion.await.unwrap();
        }
        assert_eq!(cache.len(), 3);

        tokio::time::advance(Duration::from_millis(1500)).await;
        cache.dispatch(get("/d")).completion.await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let config = CacheConfig {
            enabled: true,
            expire_ms: 1000,
            ..Default::default()
        };
        let cache = CachedTransport::new(MockTransport::ok(), config);

        cache.dispatch(get("/feed")).completion.await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        cache.dispatch(get("/feed")).completion.await.unwrap();
        assert_eq!(cache.inner().call_count(), 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        cache.dispatch(get("/feed")).completion.await.unwrap();
        assert_eq!(cache.inner().call_count(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
