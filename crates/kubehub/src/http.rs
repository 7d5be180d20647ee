use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use tracing::debug;
use url::Url;

use crate::HttpFetch;

/// `reqwest`-backed fetcher. Relative URLs are joined onto the base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("parsing base url {}", base))?;
        let client = reqwest::Client::builder().timeout(timeout).build().context("building http client")?;
        Ok(Self { client, base })
    }

    pub fn resolve(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(u) => Ok(u),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.base.join(url).with_context(|| format!("joining {} onto {}", url, self.base))
            }
            Err(e) => Err(e).with_context(|| format!("parsing url {}", url)),
        }
    }
}

#[async_trait]
impl HttpFetch for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let t0 = Instant::now();
        let target = self.resolve(url)?;
        counter!("http_fetch_total", 1u64);
        let resp = self.client.get(target.clone()).send().await.with_context(|| format!("GET {}", target))?;
        let status = resp.status();
        let body = resp.text().await.with_context(|| format!("reading body of {}", target))?;
        histogram!("http_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(url = %target, status = %status, bytes = body.len(), took_ms = %t0.elapsed().as_millis(), "http: fetched");
        if !status.is_success() {
            counter!("http_fetch_failed_total", 1u64);
            bail!("GET {} returned {}: {}", target, status, body.trim());
        }
        Ok(body)
    }
}
