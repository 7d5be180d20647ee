use std::time::{Duration, Instant};

use lookout_kubehub::Collaborators;
use metrics::{counter, histogram};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::{WatchEvent, WatchKey, WatchPayload, WatchSource};

/// Tags outcomes with the subscription's key and generation.
pub(crate) struct Emitter {
    key: WatchKey,
    generation: u64,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl Emitter {
    pub(crate) fn new(key: WatchKey, generation: u64, tx: mpsc::UnboundedSender<WatchEvent>) -> Self {
        Self { key, generation, tx }
    }

    /// Returns false once the owner is gone.
    fn emit(&self, outcome: Result<WatchPayload, String>) -> bool {
        if let Err(e) = &outcome {
            warn!(key = %self.key, error = %e, "watch: poll failed");
            counter!("watch_poll_failed_total", 1u64);
        }
        self.tx.send(WatchEvent { key: self.key.clone(), generation: self.generation, outcome }).is_ok()
    }
}

async fn poll_once(source: &WatchSource, collab: &Collaborators) -> anyhow::Result<WatchPayload> {
    match source {
        WatchSource::Url(url) => Ok(WatchPayload::Text(collab.http.fetch_text(url).await?)),
        WatchSource::PrometheusQuery(q) => Ok(WatchPayload::Metric(collab.metrics.query(q).await?)),
        WatchSource::Alerts => Ok(WatchPayload::Alerts(collab.metrics.alerts().await?)),
        WatchSource::K8sResource(sel) => anyhow::bail!("resource {} is streamed, not polled", sel.label()),
    }
}

pub(crate) async fn run(
    emitter: Emitter,
    source: WatchSource,
    collab: Collaborators,
    interval: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    if let WatchSource::K8sResource(sel) = &source {
        stream_resource(&emitter, sel, &collab, interval, &mut stop_rx).await;
        debug!(key = %emitter.key, "watch: resource task ended");
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let t0 = Instant::now();
                let res = tokio::select! {
                    _ = &mut stop_rx => break,
                    r = poll_once(&source, &collab) => r,
                };
                histogram!("watch_poll_ms", t0.elapsed().as_secs_f64() * 1000.0);
                counter!("watch_polls_total", 1u64);
                if !emitter.emit(res.map_err(|e| format!("{:#}", e))) {
                    break;
                }
            }
        }
    }
    debug!(key = %emitter.key, "watch: poll task ended");
}

/// Forward every list pushed by the resource watch; re-open the watch one
/// interval after it ends or fails.
async fn stream_resource(
    emitter: &Emitter,
    sel: &lookout_core::ResourceSelector,
    collab: &Collaborators,
    interval: Duration,
    stop_rx: &mut oneshot::Receiver<()>,
) {
    loop {
        let (res_tx, mut res_rx) = mpsc::channel::<Vec<serde_json::Value>>(16);
        let watch = collab.resources.watch(sel, res_tx);
        tokio::pin!(watch);
        let result = loop {
            tokio::select! {
                _ = &mut *stop_rx => return,
                r = &mut watch => break r,
                Some(list) = res_rx.recv() => {
                    counter!("watch_resource_updates_total", 1u64);
                    if !emitter.emit(Ok(WatchPayload::Resource(list))) {
                        return;
                    }
                }
            }
        };
        while let Ok(list) = res_rx.try_recv() {
            if !emitter.emit(Ok(WatchPayload::Resource(list))) {
                return;
            }
        }
        if let Err(e) = result {
            if !emitter.emit(Err(format!("{:#}", e))) {
                return;
            }
        }
        tokio::select! {
            _ = &mut *stop_rx => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
