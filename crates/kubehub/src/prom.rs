//! Prometheus HTTP API client (`/api/v1/query`, `/api/v1/alerts`).

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lookout_core::{Alert, MetricResult, MetricSample};
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::debug;
use url::Url;

use crate::MetricsQuery;

#[derive(Debug, Clone)]
pub struct PrometheusClient {
    client: reqwest::Client,
    base: Url,
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Value,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl PrometheusClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base).with_context(|| format!("parsing prometheus url {}", base))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder().timeout(timeout).build().context("building http client")?;
        Ok(Self { client, base })
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = self.base.join(path).with_context(|| format!("joining {} onto {}", path, self.base))?;
        let resp = self.client.get(url.clone()).query(params).send().await.with_context(|| format!("GET {}", url))?;
        let status = resp.status();
        let env: Envelope = resp.json().await.with_context(|| format!("decoding response of {} ({})", url, status))?;
        if env.status != "success" {
            counter!("prom_request_failed_total", 1u64);
            bail!(
                "prometheus {}: {}",
                env.error_type.as_deref().unwrap_or("error"),
                env.error.as_deref().unwrap_or("request failed")
            );
        }
        Ok(env.data)
    }
}

#[async_trait]
impl MetricsQuery for PrometheusClient {
    async fn query(&self, query: &str) -> Result<MetricResult> {
        let t0 = Instant::now();
        counter!("prom_query_total", 1u64);
        let data = self.get("api/v1/query", &[("query", query)]).await?;
        let result = parse_query_result(&data)?;
        debug!(query = %query, samples = result.samples.len(), took_ms = %t0.elapsed().as_millis(), "prom: query ok");
        Ok(result)
    }

    async fn alerts(&self) -> Result<Vec<Alert>> {
        let data = self.get("api/v1/alerts", &[]).await?;
        let alerts = parse_alerts(&data)?;
        debug!(firing = alerts.len(), "prom: alerts ok");
        Ok(alerts)
    }
}

fn sample_value(pair: &Value) -> Result<(f64, f64)> {
    let arr = pair.as_array().filter(|a| a.len() == 2).ok_or_else(|| anyhow!("sample is not a [ts, value] pair"))?;
    let ts = arr[0].as_f64().ok_or_else(|| anyhow!("sample timestamp is not a number"))?;
    let raw = arr[1].as_str().ok_or_else(|| anyhow!("sample value is not a string"))?;
    let value = raw.parse::<f64>().with_context(|| format!("parsing sample value {}", raw))?;
    Ok((ts, value))
}

/// Decode the `data` object of an instant query. Vector and scalar results are supported.
pub fn parse_query_result(data: &Value) -> Result<MetricResult> {
    let kind = data.get("resultType").and_then(|v| v.as_str()).unwrap_or("");
    let result = data.get("result").ok_or_else(|| anyhow!("query response has no result"))?;
    match kind {
        "vector" => {
            let items = result.as_array().ok_or_else(|| anyhow!("vector result is not an array"))?;
            let mut samples = Vec::with_capacity(items.len());
            for item in items {
                let mut labels: SmallVec<[(String, String); 4]> = SmallVec::new();
                if let Some(metric) = item.get("metric").and_then(|m| m.as_object()) {
                    for (k, v) in metric {
                        if let Some(s) = v.as_str() {
                            labels.push((k.clone(), s.to_string()));
                        }
                    }
                }
                let (timestamp, value) = sample_value(item.get("value").unwrap_or(&Value::Null))?;
                samples.push(MetricSample { labels, timestamp, value });
            }
            Ok(MetricResult { samples })
        }
        "scalar" => {
            let (timestamp, value) = sample_value(result)?;
            Ok(MetricResult { samples: vec![MetricSample { labels: SmallVec::new(), timestamp, value }] })
        }
        other => bail!("unsupported result type: {}", other),
    }
}

/// Decode `data` of the alerts endpoint, keeping firing alerts only.
pub fn parse_alerts(data: &Value) -> Result<Vec<Alert>> {
    let items = data.get("alerts").and_then(|a| a.as_array()).ok_or_else(|| anyhow!("alerts response has no alerts array"))?;
    let text = |v: &Value, obj: &str, key: &str| v.get(obj).and_then(|o| o.get(key)).and_then(|s| s.as_str()).map(|s| s.to_string());
    let alerts = items
        .iter()
        .filter(|a| a.get("state").and_then(|s| s.as_str()) == Some("firing"))
        .map(|a| Alert {
            name: text(a, "labels", "alertname").unwrap_or_default(),
            severity: text(a, "labels", "severity"),
            message: text(a, "annotations", "message")
                .or_else(|| text(a, "annotations", "description"))
                .or_else(|| text(a, "annotations", "summary")),
            state: "firing".to_string(),
            active_at: a.get("activeAt").and_then(|s| s.as_str()).map(|s| s.to_string()),
        })
        .collect();
    Ok(alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vector_and_scalar_results_decode() {
        let data = json!({
            "resultType": "vector",
            "result": [{"metric": {"__name__": "ceph_health_status", "namespace": "openshift-storage"}, "value": [1700000000.5, "1"]}]
        });
        let r = parse_query_result(&data).unwrap();
        assert_eq!(r.first_value(), Some(1.0));
        assert_eq!(r.samples[0].label("namespace"), Some("openshift-storage"));

        let scalar = json!({"resultType": "scalar", "result": [1700000000, "0.25"]});
        assert_eq!(parse_query_result(&scalar).unwrap().first_value(), Some(0.25));

        let matrix = json!({"resultType": "matrix", "result": []});
        assert!(parse_query_result(&matrix).is_err());
    }

    #[test]
    fn only_firing_alerts_are_kept() {
        let data = json!({"alerts": [
            {"labels": {"alertname": "KubeNodeNotReady", "severity": "warning"}, "annotations": {"message": "node down"}, "state": "firing", "activeAt": "2024-01-01T00:00:00Z"},
            {"labels": {"alertname": "Watchdog"}, "annotations": {}, "state": "pending"}
        ]});
        let alerts = parse_alerts(&data).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "KubeNodeNotReady");
        assert_eq!(alerts[0].message.as_deref(), Some("node down"));
    }
}
