//! Log-only report finalizer, used when no webhook is configured.

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{ReportError, ReportFinalizer, ReportReceipt, ReportRequest};

#[derive(Default)]
pub struct NullReportFinalizer;

#[async_trait]
impl ReportFinalizer for NullReportFinalizer {
    async fn finalize(&self, request: ReportRequest) -> Result<ReportReceipt, ReportError> {
        info!(
            research_id = %request.research_id,
            title = %request.title,
            "report finalization requested (no delivery target configured)"
        );
        Ok(ReportReceipt::default())
    }
}
