use std::sync::{Arc, Mutex, PoisonError};

use reqwest::redirect::Policy;
use tokio::sync::oneshot;

use super::types::{CheckDescriptor, ProbeOutcome};

/// Checker trait for probing a check's endpoint
///
/// Implementations never fail: transport problems and timeouts are reported
/// inside the returned [`ProbeOutcome`].
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform exactly one probe for `check`
    async fn check(&self, check: &CheckDescriptor) -> ProbeOutcome;
}

/// Write-once slot that racing event sources try to fill.
///
/// Only the first [`OutcomeSlot::resolve`] delivers its outcome; the sender is
/// consumed on that call so later events have nothing to send through.
pub struct OutcomeSlot {
    sender: Mutex<Option<oneshot::Sender<ProbeOutcome>>>,
}

impl OutcomeSlot {
    pub fn open() -> (Arc<Self>, oneshot::Receiver<ProbeOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Arc::new(Self { sender: Mutex::new(Some(tx)) }), rx)
    }

    /// Returns `true` if this call won the race.
    pub fn resolve(&self, outcome: ProbeOutcome) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();

        match sender {
            Some(tx) => {
                // A dropped receiver means nobody waits any more; the slot is still spent.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self, reqwest::Error> {
        // Redirects are reported as-is so 3xx codes can be listed as success codes.
        let client = reqwest::Client::builder()
            .user_agent(concat!("uppe-worker/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, check: &CheckDescriptor) -> ProbeOutcome {
        let target = match check.target_url() {
            Ok(target) => target,
            Err(e) => return ProbeOutcome::transport(format!("invalid url: {e}")),
        };

        let (slot, outcome_rx) = OutcomeSlot::open();
        let request = self.client.request(check.method.into(), target);

        let response_slot = Arc::clone(&slot);
        let request_task = tokio::spawn(async move {
            let outcome = match request.send().await {
                Ok(response) => ProbeOutcome::response(response.status().as_u16()),
                Err(e) => ProbeOutcome::transport(error_chain(&e)),
            };
            response_slot.resolve(outcome);
        });

        let timeout = check.timeout();
        let timer_slot = Arc::clone(&slot);
        let timer_task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timer_slot.resolve(ProbeOutcome::timeout(timeout));
        });

        let outcome = outcome_rx
            .await
            .unwrap_or_else(|_| ProbeOutcome::transport("probe ended without an outcome"));

        // Whichever source lost the race has nothing left to report.
        request_task.abort();
        timer_task.abort();

        tracing::debug!(
            check_id = %check.id,
            response_code = ?outcome.response_code,
            error = ?outcome.error_kind(),
            "probe resolved"
        );

        outcome
    }
}

fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
