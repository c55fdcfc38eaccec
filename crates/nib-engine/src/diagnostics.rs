//! Diagnostics store
//!
//! Recoverable faults are queued per module: the module an environment is
//! bound to owns the queue its operations report into. One library never
//! observes another library's reports.
//!
//! Queues are ordered by detection. "Latest" is the most recently appended
//! report; draining returns oldest first.

use std::collections::VecDeque;

use nib_sdk::{DiagnosticReport, Handle};
use rustc_hash::FxHashMap;
use serde_json::{json, Value as JsonValue};

/// Where a bridge operation was issued from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallSite {
    pub(crate) module: Handle,
    pub(crate) function: Handle,
}

/// Per-module report queues with a fixed capacity.
#[derive(Debug)]
pub(crate) struct DiagnosticsStore {
    queues: FxHashMap<Handle, VecDeque<DiagnosticReport>>,
    capacity: usize,
    log: bool,
}

impl DiagnosticsStore {
    pub(crate) fn new(capacity: usize, log: bool) -> Self {
        Self {
            queues: FxHashMap::default(),
            capacity: capacity.max(1),
            log,
        }
    }

    /// Append `report` to `owner`'s queue, dropping the oldest on overflow.
    pub(crate) fn push(&mut self, owner: Handle, report: DiagnosticReport) {
        if self.log {
            tracing::warn!(
                target: "nib",
                module = ?report.module(),
                function = ?report.function(),
                severity = report.severity(),
                native = report.caused_by_native(),
                "{}",
                report
            );
        }
        let queue = self.queues.entry(owner).or_default();
        if queue.len() == self.capacity {
            if let Some(dropped) = queue.pop_front() {
                tracing::warn!(
                    target: "nib",
                    owner = ?owner,
                    dropped = %dropped,
                    "diagnostics queue full, dropping oldest report"
                );
            }
        }
        queue.push_back(report);
    }

    pub(crate) fn peek_latest(&self, owner: Handle) -> Option<DiagnosticReport> {
        self.queues.get(&owner).and_then(|q| q.back().cloned())
    }

    pub(crate) fn pop_latest(&mut self, owner: Handle) -> Option<DiagnosticReport> {
        self.queues.get_mut(&owner).and_then(VecDeque::pop_back)
    }

    /// Remove and return every report, oldest first
    pub(crate) fn drain(&mut self, owner: Handle) -> Vec<DiagnosticReport> {
        self.queues
            .get_mut(&owner)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self, owner: Handle) -> usize {
        self.queues.get(&owner).map_or(0, VecDeque::len)
    }

    /// Non-destructive JSON dump of `owner`'s queue, oldest first
    pub(crate) fn to_json(&self, owner: Handle) -> JsonValue {
        let reports: Vec<JsonValue> = self
            .queues
            .get(&owner)
            .map(|q| q.iter().map(report_to_json).collect())
            .unwrap_or_default();
        JsonValue::Array(reports)
    }
}

fn report_to_json(report: &DiagnosticReport) -> JsonValue {
    json!({
        "module": report.module().to_bits(),
        "function": report.function().to_bits(),
        "caused_by_native": report.caused_by_native(),
        "severity": report.severity(),
        "cause": report.cause().map(|c| c.to_string()),
        "message": report.message(),
    })
}
