//! Report finalizer adapters.

pub mod null;
pub mod webhook;

use std::sync::Arc;

use crate::domain::models::ReportConfig;
use crate::domain::ports::ReportFinalizer;

pub use null::NullReportFinalizer;
pub use webhook::WebhookReportFinalizer;

/// Build the configured finalizer; an empty webhook URL logs instead.
pub fn from_config(config: &ReportConfig) -> Arc<dyn ReportFinalizer> {
    if config.webhook_url.trim().is_empty() {
        return Arc::new(NullReportFinalizer);
    }
    match WebhookReportFinalizer::new(config.webhook_url.clone()) {
        Ok(finalizer) => Arc::new(finalizer),
        Err(err) => {
            tracing::warn!(error = %err, "falling back to log-only report finalizer");
            Arc::new(NullReportFinalizer)
        }
    }
}
