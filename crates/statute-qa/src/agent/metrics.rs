//! Execution statistics for the stage coordinator.
//!
//! Counters live for the lifetime of the coordinator and are read through
//! [`StageMetrics::snapshot`], which returns a copy.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Pipeline,
    Retrieval,
    Qa,
    Memory,
    Summary,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Pipeline => "pipeline",
            StageKind::Retrieval => "retrieval",
            StageKind::Qa => "qa",
            StageKind::Memory => "memory",
            StageKind::Summary => "summary",
        }
    }
}

/// Running counters for one stage kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub avg_latency_ms: f64,
}

impl StageStats {
    fn record(&mut self, success: bool, latency_ms: u64) {
        self.total += 1;
        if success {
            self.success += 1;
        } else {
            self.failure += 1;
        }
        let n = self.total as f64;
        self.avg_latency_ms = (self.avg_latency_ms * (n - 1.0) + latency_ms as f64) / n;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

/// Snapshot of all stage counters. `pipeline` doubles as the overall totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub pipeline: StageStats,
    pub retrieval: StageStats,
    pub qa: StageStats,
    pub memory: StageStats,
    pub summary: StageStats,
}

impl ExecutionStats {
    pub fn stage(&self, kind: StageKind) -> &StageStats {
        match kind {
            StageKind::Pipeline => &self.pipeline,
            StageKind::Retrieval => &self.retrieval,
            StageKind::Qa => &self.qa,
            StageKind::Memory => &self.memory,
            StageKind::Summary => &self.summary,
        }
    }

    fn stage_mut(&mut self, kind: StageKind) -> &mut StageStats {
        match kind {
            StageKind::Pipeline => &mut self.pipeline,
            StageKind::Retrieval => &mut self.retrieval,
            StageKind::Qa => &mut self.qa,
            StageKind::Memory => &mut self.memory,
            StageKind::Summary => &mut self.summary,
        }
    }
}

// ============================================================================
// Collector
// ============================================================================

#[derive(Debug, Default)]
pub struct StageMetrics {
    stats: RwLock<ExecutionStats>,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: StageKind, success: bool, latency_ms: u64) {
        self.stats.write().stage_mut(kind).record(success, latency_ms);
        tracing::trace!(stage = kind.as_str(), success, latency_ms, "Stage recorded");
    }

    pub fn snapshot(&self) -> ExecutionStats {
        self.stats.read().clone()
    }
}
