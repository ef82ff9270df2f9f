//! HTTP response caching on top of `http-cache-reqwest`.
//!
//! The session stores nothing by default. Requests opt in with a
//! [`CacheExpiry`], carried to the middleware as request extensions:
//! archive data never changes once published and is kept forever, while
//! forecasts go stale within the hour.

use async_trait::async_trait;
use http::Extensions;
use http_cache_reqwest::{CACacheManager, Cache, CacheMode, HttpCache, HttpCacheOptions};
use reqwest::header::{HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, RequestBuilder};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheExpiry {
    /// Do not read or write the cache.
    Bypass,
    /// Entries never expire.
    Never,
    /// Entries older than this are refetched.
    After(Duration),
}

/// Freshness lifetime forced onto a response before it is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MaxAge(Duration);

impl CacheExpiry {
    pub fn mode(self) -> CacheMode {
        match self {
            CacheExpiry::Bypass => CacheMode::NoStore,
            CacheExpiry::Never => CacheMode::IgnoreRules,
            CacheExpiry::After(_) => CacheMode::Default,
        }
    }

    /// Tag `request` so the cache layers treat it according to `self`.
    pub fn apply(self, request: RequestBuilder) -> RequestBuilder {
        let request = request.with_extension(self.mode());
        match self {
            CacheExpiry::After(ttl) => request.with_extension(MaxAge(ttl)),
            CacheExpiry::Bypass | CacheExpiry::Never => request,
        }
    }
}

/// Disk-backed cache middleware under `dir`. Untagged requests are not stored.
pub fn disk_cache(dir: &Path) -> Cache<CACacheManager> {
    Cache(HttpCache {
        mode: CacheMode::NoStore,
        manager: CACacheManager::new(dir.join("http"), false),
        options: HttpCacheOptions::default(),
    })
}

/// Replaces the freshness headers of responses to requests tagged with a
/// [`MaxAge`]. Registered after [`disk_cache`] so the cache stores the
/// rewritten headers.
pub struct MaxAgeOverride;

#[async_trait]
impl Middleware for MaxAgeOverride {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let max_age = extensions.get::<MaxAge>().copied();
        let mut response = next.run(req, extensions).await?;
        if let Some(MaxAge(ttl)) = max_age {
            if response.status().is_success() {
                let headers = response.headers_mut();
                headers.remove(EXPIRES);
                headers.remove(PRAGMA);
                if let Some(value) = max_age_header(ttl) {
                    headers.insert(CACHE_CONTROL, value);
                }
            }
        }
        Ok(response)
    }
}

fn max_age_header(ttl: Duration) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("max-age={}", ttl.as_secs())).ok()
}
