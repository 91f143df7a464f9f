//! Task execution — the per-request workflow shared by every classifier:
//! parse the body, classify each entry (through the cache when enabled),
//! alert on threshold, and route the response (§4.5).

use std::sync::Arc;
use std::time::Instant;

use darwin_core::config::OutputMode;
use darwin_core::wire::{Packet, ResponseKind, DARWIN_ERROR_RETURN};

use crate::alert::AlertManager;
use crate::cache::{fingerprint, ResultCache};
use crate::forwarder::Forwarder;

/// Implemented by each classifier (hostlookup, useragent, yara, buffer...).
/// One instance is shared across every task of a filter; it must not hold
/// per-request state.
pub trait Classifier: Send + Sync {
    /// Identifies this filter on the wire (§3 `filter_code`).
    fn filter_code(&self) -> u64;

    /// Validate and extract opaque lookup material from one body entry.
    /// Returning `None` marks just this entry as malformed, per `ParseLine`
    /// — no certitude is computed for it and `DARWIN_ERROR_RETURN` is
    /// appended in its place, with the remaining entries still processed.
    fn parse_entry(&self, entry: &serde_json::Value) -> Option<Vec<u8>>;

    /// Produce a certitude in 0..=100 for one already-parsed entry. This is
    /// the potentially expensive operation (DB/file lookup, pattern match)
    /// that the result cache exists to avoid repeating.
    fn classify(&self, entry: &[u8]) -> u32;

    /// Cheap, human-readable rendering of an entry for alert lines. Called
    /// regardless of whether `classify` ran or the cache answered, since a
    /// cache hit still needs text to alert on.
    fn describe(&self, entry: &[u8]) -> String;
}

/// Everything a task needs beyond the packet itself: identity, the shared
/// cache, and the optional alert/forward sinks. One instance lives for the
/// life of a filter and is shared (by reference) across every task.
pub struct TaskContext {
    pub filter_name: String,
    pub rule_name: String,
    pub threshold: u32,
    pub output: OutputMode,
    pub cache: Arc<ResultCache>,
    pub alerts: Option<Arc<AlertManager>>,
    pub next_filter: Option<Arc<Forwarder>>,
}

/// Executes one request end to end and returns the packet to route back to
/// the session, with its certitudes (and any parse-error log) filled in.
/// Mirrors `ATask::run()` followed by the classifier's `Workflow()`.
pub async fn run_task(classifier: &dyn Classifier, ctx: &TaskContext, mut packet: Packet) -> Packet {
    let started = Instant::now();
    let evt_id = packet.event_id_string();

    let original_body = packet.body.clone();

    match parse_body(&packet.body) {
        Some(lines) => {
            for line in &lines {
                let entry_started = Instant::now();
                let entry = match classifier.parse_entry(line) {
                    Some(entry) => entry,
                    None => {
                        tracing::warn!(filter = %ctx.filter_name, evt_id = %evt_id, "malformed request entry");
                        packet.add_certitude(DARWIN_ERROR_RETURN);
                        continue;
                    }
                };
                let certitude = resolve_certitude(classifier, ctx, &entry);
                if certitude >= ctx.threshold {
                    let text = classifier.describe(&entry);
                    alert_entry(ctx, &text, certitude, &evt_id);
                    if ctx.output == OutputMode::Log {
                        append_log_line(&mut packet, &evt_id, &text, certitude, entry_started);
                    }
                }
                packet.add_certitude(certitude);
            }
        }
        None => {
            tracing::warn!(filter = %ctx.filter_name, evt_id = %evt_id, "malformed request body");
            packet.add_certitude(DARWIN_ERROR_RETURN);
        }
    }

    compose_response_body(ctx, &mut packet, original_body);

    tracing::trace!(
        filter = %ctx.filter_name,
        evt_id = %evt_id,
        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
        "task complete"
    );

    route(ctx, packet).await
}

fn append_log_line(packet: &mut Packet, evt_id: &str, entry: &str, certitude: u32, started: Instant) {
    packet.logs.push_str(&format!(
        "{{\"evt_id\": \"{evt_id}\", \"duration_ms\": {:.3}, \"entry\": \"{entry}\", \"certitude\": {certitude}}}\n",
        started.elapsed().as_secs_f64() * 1000.0,
    ));
}

/// Fills the response body per the configured output mode (§4.6). `RAW`
/// restores the untouched request body since entry parsing may have left
/// `packet.body` aliased to it; `PARSED` is not produced by any classifier
/// here and is left empty.
fn compose_response_body(ctx: &TaskContext, packet: &mut Packet, original_body: Vec<u8>) {
    packet.body = match ctx.output {
        OutputMode::None => Vec::new(),
        OutputMode::Log => std::mem::take(&mut packet.logs).into_bytes(),
        OutputMode::Raw => original_body,
        OutputMode::Parsed => Vec::new(),
    };
}

/// Runs a single entry through the cache, falling back to `classify` on a
/// miss and storing the result. Matches `HostLookupTask`'s per-entry
/// sequence: hash, cache lookup, DB lookup on miss, save to cache.
fn resolve_certitude(classifier: &dyn Classifier, ctx: &TaskContext, entry: &[u8]) -> u32 {
    if !ctx.cache.enabled() {
        return classifier.classify(entry);
    }
    let fp = fingerprint(entry);
    if let Some(hit) = ctx.cache.lookup(fp) {
        return hit;
    }
    let certitude = classifier.classify(entry);
    ctx.cache.store(fp, certitude);
    certitude
}

fn alert_entry(ctx: &TaskContext, entry: &str, certitude: u32, evt_id: &str) {
    if let Some(mgr) = &ctx.alerts {
        mgr.alert(entry, certitude, evt_id, "{}", "");
    }
}

/// Checks that the body is a JSON array of entries, matching `ParseBody`'s
/// default implementation — a failure here is a whole-body error, distinct
/// from a single entry failing the classifier's own `parse_entry`.
fn parse_body(body: &[u8]) -> Option<Vec<serde_json::Value>> {
    if body.is_empty() {
        return Some(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    Some(value.as_array()?.clone())
}

/// Dispatches the finished packet according to `response_kind` (§4.5):
/// BOTH forwards downstream then answers back, BACK only answers, DARWIN
/// only forwards, NONE does nothing.
async fn route(ctx: &TaskContext, packet: Packet) -> Packet {
    let response_kind = ResponseKind::try_from(packet.response_kind).unwrap_or(ResponseKind::None);

    match response_kind {
        ResponseKind::Both => {
            forward(ctx, &packet).await;
        }
        ResponseKind::Darwin => {
            forward(ctx, &packet).await;
        }
        ResponseKind::Back | ResponseKind::None => {}
    }

    packet
}

async fn forward(ctx: &TaskContext, packet: &Packet) {
    if let Some(forwarder) = &ctx.next_filter {
        forwarder.send(&packet.encode()).await;
    } else {
        tracing::warn!(filter = %ctx.filter_name, "response_kind requests forwarding but no next filter is configured");
    }
}
