//! Webhook report finalizer: POSTs the finalized report payload to a
//! configured URL and records the delivery status.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::domain::ports::{ReportError, ReportFinalizer, ReportReceipt, ReportRequest};

pub struct WebhookReportFinalizer {
    url: String,
    client: Client,
}

impl WebhookReportFinalizer {
    pub fn new(url: impl Into<String>) -> Result<Self, ReportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ReportError::DeliveryFailed(e.to_string()))?;
        Ok(Self { url: url.into(), client })
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    research_id: String,
    title: &'a str,
    created_at: String,
    owner_email: &'a str,
    primary_result: &'a Option<crate::domain::models::ProviderResult>,
    secondary_result: &'a Option<crate::domain::models::ProviderResult>,
}

#[async_trait]
impl ReportFinalizer for WebhookReportFinalizer {
    async fn finalize(&self, request: ReportRequest) -> Result<ReportReceipt, ReportError> {
        let payload = WebhookPayload {
            research_id: request.research_id.to_string(),
            title: &request.title,
            created_at: request.created_at.to_rfc3339(),
            owner_email: &request.owner_email,
            primary_result: &request.primary_result,
            secondary_result: &request.secondary_result,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ReportError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReportError::DeliveryFailed(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(ReportReceipt {
            storage_path: None,
            email_status: Some("delivered".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_posts_report_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/reports")
            .match_header("content-type", "application/json")
            .with_status(200)
            .create_async()
            .await;

        let finalizer = WebhookReportFinalizer::new(format!("{}/reports", server.url())).unwrap();
        let receipt = finalizer
            .finalize(ReportRequest {
                research_id: Uuid::new_v4(),
                title: "Topic".into(),
                created_at: Utc::now(),
                owner_email: "owner@example.com".into(),
                primary_result: None,
                secondary_result: None,
            })
            .await
            .unwrap();

        assert_eq!(receipt.email_status.as_deref(), Some("delivered"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_is_delivery_failure() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/reports").with_status(500).create_async().await;

        let finalizer = WebhookReportFinalizer::new(format!("{}/reports", server.url())).unwrap();
        let err = finalizer
            .finalize(ReportRequest {
                research_id: Uuid::new_v4(),
                title: "Topic".into(),
                created_at: Utc::now(),
                owner_email: "owner@example.com".into(),
                primary_result: None,
                secondary_result: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::DeliveryFailed(_)));
    }
}
