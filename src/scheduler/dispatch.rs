//! Sequential, paced invocation of the three summary functions.

use std::time::Duration;

use tracing::{info, warn};

use super::history::{EndpointResult, ExecutionResult, TriggerSource};
use crate::backend::{SummaryBackend, SummaryKind, TriggerRequest};

/// Call every summary function once, in [`SummaryKind::DISPATCH_ORDER`],
/// sleeping `pacing` between consecutive calls.
///
/// A failing endpoint becomes a failed entry; the remaining endpoints are
/// still called.
pub async fn dispatch(
    backend: &dyn SummaryBackend,
    trigger: TriggerSource,
    pacing: Duration,
) -> ExecutionResult {
    let request = match trigger {
        TriggerSource::Scheduled => TriggerRequest::scheduled(),
        TriggerSource::Manual => TriggerRequest::manual(),
    };

    let mut results = Vec::with_capacity(SummaryKind::DISPATCH_ORDER.len());
    for (i, kind) in SummaryKind::DISPATCH_ORDER.into_iter().enumerate() {
        if i > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
        results.push(call_one(backend, kind, request).await);
    }

    ExecutionResult::new(trigger, results)
}

async fn call_one(
    backend: &dyn SummaryBackend,
    kind: SummaryKind,
    request: TriggerRequest,
) -> EndpointResult {
    match backend.trigger(kind, request).await {
        Ok(resp) if resp.success => {
            let emails_sent = resp.emails_sent.unwrap_or(0);
            info!(endpoint = %kind, emails_sent, "summary sent");
            let message = resp
                .message
                .unwrap_or_else(|| format!("{} sent", kind.label()));
            EndpointResult::succeeded(kind, message, emails_sent)
        }
        Ok(resp) => {
            let message = resp
                .message
                .unwrap_or_else(|| format!("{} reported failure", kind.label()));
            warn!(endpoint = %kind, %message, "summary function reported failure");
            EndpointResult::failed(kind, message)
        }
        Err(e) => {
            warn!(endpoint = %kind, error = %e, "summary function call failed");
            EndpointResult::failed(kind, e.to_string())
        }
    }
}
