use std::time::Duration;

use tracing::{debug, warn};

use crate::dom::NodeId;
use crate::reconciler::{ScanKind, ScanReport};

pub fn emit_scan(feature: &str, kind: ScanKind, report: &ScanReport, duration: Duration) {
    debug!(
        target: "gtm_lens::reconciler",
        feature,
        kind = kind.as_str(),
        matched = report.matched,
        enhanced = report.enhanced,
        refreshed = report.refreshed,
        released = report.released,
        failures = report.failures,
        elapsed_us = duration.as_micros() as u64,
        "reconciler.scan.completed"
    );
}

pub fn emit_enhance_failed(feature: &str, node: NodeId, reason: &str) {
    warn!(
        target: "gtm_lens::reconciler",
        feature,
        %node,
        reason,
        "reconciler.enhance.failed"
    );
}

pub fn emit_started(feature: &str, tracked: usize) {
    debug!(target: "gtm_lens::reconciler", feature, tracked, "reconciler.started");
}

pub fn emit_stopped(feature: &str, cleaned: usize) {
    debug!(target: "gtm_lens::reconciler", feature, cleaned, "reconciler.stopped");
}
