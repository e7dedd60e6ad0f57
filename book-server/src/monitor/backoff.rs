//! Per-order refresh backoff and operator alerts

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raised when an order's URL refresh keeps failing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorAlert {
    pub order_id: String,
    pub consecutive_failures: u32,
    pub last_error: String,
    /// Unix millis
    pub raised_at: i64,
}

#[derive(Debug, Clone)]
struct FailureState {
    failures: u32,
    retry_after: i64,
}

/// Exponential backoff per order: `base * 2^(failures - 1)`, capped at `max`
#[derive(Debug)]
pub(crate) struct RefreshBackoff {
    base_ms: i64,
    max_ms: i64,
    max_failures: u32,
    failures: DashMap<String, FailureState>,
    alerts: DashMap<String, MonitorAlert>,
}

impl RefreshBackoff {
    pub(crate) fn new(base: Duration, max: Duration, max_failures: u32) -> Self {
        let base_ms = i64::try_from(base.as_millis()).unwrap_or(i64::MAX);
        let max_ms = i64::try_from(max.as_millis()).unwrap_or(i64::MAX);
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            max_failures: max_failures.max(1),
            failures: DashMap::new(),
            alerts: DashMap::new(),
        }
    }

    /// Delay after the given number of consecutive failures
    pub(crate) fn delay_ms(&self, failures: u32) -> i64 {
        let exp = failures.saturating_sub(1).min(30);
        self.base_ms.saturating_mul(1i64 << exp).min(self.max_ms)
    }

    /// Whether the order may be refreshed at `now`
    pub(crate) fn is_ready(&self, order_id: &str, now: i64) -> bool {
        self.failures
            .get(order_id)
            .is_none_or(|state| now >= state.retry_after)
    }

    /// Record a failure; returns the alert when this failure crosses the threshold
    pub(crate) fn record_failure(&self, order_id: &str, error: &str, now: i64) -> Option<MonitorAlert> {
        let failures = {
            let mut state = self
                .failures
                .entry(order_id.to_string())
                .or_insert(FailureState {
                    failures: 0,
                    retry_after: now,
                });
            state.failures += 1;
            state.retry_after = now + self.delay_ms(state.failures);
            state.failures
        };

        if failures < self.max_failures {
            return None;
        }

        let alert = MonitorAlert {
            order_id: order_id.to_string(),
            consecutive_failures: failures,
            last_error: error.to_string(),
            raised_at: now,
        };
        let first = !self.alerts.contains_key(order_id);
        self.alerts.insert(order_id.to_string(), alert.clone());
        first.then_some(alert)
    }

    /// Clear failure state and any alert for the order
    pub(crate) fn record_success(&self, order_id: &str) {
        self.failures.remove(order_id);
        if self.alerts.remove(order_id).is_some() {
            tracing::info!(order_id = %order_id, "URL refresh recovered, alert cleared");
        }
    }

    pub(crate) fn alerts(&self) -> Vec<MonitorAlert> {
        let mut alerts: Vec<MonitorAlert> = self.alerts.iter().map(|a| a.value().clone()).collect();
        alerts.sort_by(|a, b| a.raised_at.cmp(&b.raised_at).then_with(|| a.order_id.cmp(&b.order_id)));
        alerts
    }
}
