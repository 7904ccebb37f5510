use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::types::{CheckDescriptor, CheckState, LogEntry, ProbeOutcome};
use crate::alert::AlertDispatcher;
use crate::logs::LogWriter;
use crate::store::{CHECKS, RecordStore};

/// `up` iff the probe got a response whose code is an accepted one
pub fn derive_state(outcome: &ProbeOutcome, success_codes: &[u16]) -> CheckState {
    match (outcome.is_error(), outcome.response_code) {
        (false, Some(code)) if success_codes.contains(&code) => CheckState::Up,
        _ => CheckState::Down,
    }
}

/// A never-checked check has no baseline and therefore never alerts
pub fn alert_warranted(previous: &CheckDescriptor, new_state: CheckState) -> bool {
    previous.last_checked.is_some() && previous.state != new_state
}

pub fn alert_message(check: &CheckDescriptor) -> String {
    format!(
        "Alert: Your check for {} {}://{} is currently {}",
        check.method.as_str().to_uppercase(),
        check.protocol,
        check.url,
        check.state
    )
}

/// What happened while processing one outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub state: CheckState,
    pub alert: bool,
    pub logged: bool,
    pub persisted: bool,
    pub notified: bool,
}

/// Turns probe outcomes into state changes, log lines and alerts
pub struct OutcomeProcessor {
    store: Arc<dyn RecordStore>,
    logs: Arc<LogWriter>,
    dispatcher: Arc<dyn AlertDispatcher>,
}

impl OutcomeProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        logs: Arc<LogWriter>,
        dispatcher: Arc<dyn AlertDispatcher>,
    ) -> Self {
        Self { store, logs, dispatcher }
    }

    /// Log the execution, persist the new state and alert on a transition.
    ///
    /// Failures are logged and reflected in the report, never returned. No
    /// alert is sent when the new state could not be persisted: the next
    /// cycle sees the old state again and alerts then.
    pub async fn process(&self, check: CheckDescriptor, outcome: ProbeOutcome) -> ProcessReport {
        let state = derive_state(&outcome, &check.success_codes);
        let alert = alert_warranted(&check, state);
        let executed_at = chrono::Utc::now().timestamp_millis();

        let mut updated = check.clone();
        updated.state = state;
        updated.last_checked = Some(executed_at);

        let entry = LogEntry { check, outcome, state, alert, time: executed_at };
        let logged = self.write_log(&entry).await;

        let mut report = ProcessReport { state, alert, logged, persisted: false, notified: false };

        report.persisted = self.persist(&updated).await;
        if !report.persisted {
            return report;
        }

        if alert {
            report.notified = self.notify(&updated).await;
        } else {
            debug!(check_id = %updated.id, %state, "check state unchanged, no alert needed");
        }

        report
    }

    async fn write_log(&self, entry: &LogEntry) -> bool {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                error!(check_id = %entry.check.id, "failed to serialize log entry: {}", e);
                return false;
            }
        };

        match self.logs.append(&entry.check.id, &line).await {
            Ok(()) => true,
            Err(e) => {
                warn!(check_id = %entry.check.id, "failed to append check log: {}", e);
                false
            }
        }
    }

    async fn persist(&self, updated: &CheckDescriptor) -> bool {
        let record = match serde_json::to_value(updated) {
            Ok(record) => record,
            Err(e) => {
                error!(check_id = %updated.id, "failed to serialize check: {}", e);
                return false;
            }
        };

        match self.store.update(CHECKS, &updated.id, &record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(check_id = %updated.id, "failed to save check state: {}", e);
                false
            }
        }
    }

    async fn notify(&self, updated: &CheckDescriptor) -> bool {
        let message = alert_message(updated);

        match self.dispatcher.notify(&updated.owner_id, &message).await {
            Ok(()) => {
                info!(check_id = %updated.id, state = %updated.state, "owner alerted to status change");
                true
            }
            Err(e) => {
                warn!(check_id = %updated.id, "could not alert owner to status change: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::{HttpMethod, Protocol};
    use std::time::Duration;

    fn check(state: CheckState, last_checked: Option<i64>) -> CheckDescriptor {
        CheckDescriptor {
            id: "abcdefghij0123456789".to_string(),
            owner_id: "5551234567".to_string(),
            protocol: Protocol::Https,
            url: "example.com/health".to_string(),
            method: HttpMethod::Get,
            success_codes: vec![200, 204],
            timeout_seconds: 2,
            state,
            last_checked,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_derive_state() {
        let codes = [200, 204];
        assert_eq!(derive_state(&ProbeOutcome::response(200), &codes), CheckState::Up);
        assert_eq!(derive_state(&ProbeOutcome::response(204), &codes), CheckState::Up);
        assert_eq!(derive_state(&ProbeOutcome::response(500), &codes), CheckState::Down);
        assert_eq!(derive_state(&ProbeOutcome::transport("refused"), &codes), CheckState::Down);
        assert_eq!(derive_state(&ProbeOutcome::timeout(Duration::from_secs(2)), &codes), CheckState::Down);
        assert_eq!(derive_state(&ProbeOutcome::default(), &codes), CheckState::Down);
    }

    #[test]
    fn test_error_wins_over_response_code() {
        let outcome = ProbeOutcome { response_code: Some(200), ..ProbeOutcome::transport("reset") };
        assert_eq!(derive_state(&outcome, &[200]), CheckState::Down);
    }

    #[test]
    fn test_first_observation_never_alerts() {
        for previous in [CheckState::Up, CheckState::Down] {
            for new_state in [CheckState::Up, CheckState::Down] {
                assert!(!alert_warranted(&check(previous, None), new_state));
            }
        }
    }

    #[test]
    fn test_alert_only_on_transition() {
        let seen = Some(1_700_000_000_000);
        assert!(alert_warranted(&check(CheckState::Down, seen), CheckState::Up));
        assert!(alert_warranted(&check(CheckState::Up, seen), CheckState::Down));
        assert!(!alert_warranted(&check(CheckState::Up, seen), CheckState::Up));
        assert!(!alert_warranted(&check(CheckState::Down, seen), CheckState::Down));
    }

    #[test]
    fn test_alert_message() {
        let message = alert_message(&check(CheckState::Up, None));
        assert_eq!(message, "Alert: Your check for GET https://example.com/health is currently up");
    }
}
