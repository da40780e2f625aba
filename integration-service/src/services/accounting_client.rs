//! Client for the central accounting service.
//!
//! Both calls are bulk shaped; this provider always sends single-item bulks.

use crate::config::AccountingServiceConfig;
use crate::models::{ProductCategoryId, WalletOwner};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRequest<T> {
    pub items: Vec<T>,
}

impl<T> BulkRequest<T> {
    pub fn single(item: T) -> Self {
        Self { items: vec![item] }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResponse<T> {
    pub responses: Vec<T>,
}

/// Free-form context attached to a charge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReportItem {
    /// `false` means `usage` replaces the running total instead of adding to it.
    pub is_delta_charge: bool,
    pub owner: WalletOwner,
    pub category_id: ProductCategoryId,
    pub usage: i64,
    pub description: ChargeDescription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckProviderUsableItem {
    pub owner: WalletOwner,
    pub category: ProductCategoryId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsable {
    pub max_usable: i64,
}

/// Remote accounting operations this provider depends on.
#[async_trait]
pub trait AccountingBackend: Send + Sync {
    async fn check_provider_usable(
        &self,
        request: BulkRequest<CheckProviderUsableItem>,
    ) -> Result<BulkResponse<ProviderUsable>, AppError>;

    async fn report_usage(
        &self,
        request: BulkRequest<UsageReportItem>,
    ) -> Result<BulkResponse<bool>, AppError>;
}

/// JSON-over-HTTP implementation of [`AccountingBackend`].
#[derive(Clone)]
pub struct HttpAccountingClient {
    client: Client,
    base_url: String,
}

impl HttpAccountingClient {
    pub fn new(config: &AccountingServiceConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn call<Req, Resp>(&self, endpoint: &str, request: &Req) -> Result<Resp, AppError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/api/accounting/v2/{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("{} request failed: {}", endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::BadGateway(format!("{} response unreadable: {}", endpoint, e)))?;

        tracing::debug!(endpoint, status = %status, "Accounting service response");

        if !status.is_success() {
            tracing::error!(endpoint, status = %status, body = %body, "Accounting call failed");
            return Err(AppError::BadGateway(format!(
                "{} returned {}: {}",
                endpoint, status, body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::BadGateway(format!("{} returned invalid JSON: {}", endpoint, e)))
    }
}

#[async_trait]
impl AccountingBackend for HttpAccountingClient {
    async fn check_provider_usable(
        &self,
        request: BulkRequest<CheckProviderUsableItem>,
    ) -> Result<BulkResponse<ProviderUsable>, AppError> {
        self.call("checkProviderUsable", &request).await
    }

    async fn report_usage(
        &self,
        request: BulkRequest<UsageReportItem>,
    ) -> Result<BulkResponse<bool>, AppError> {
        self.call("reportUsage", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_report_wire_format() {
        let item = UsageReportItem {
            is_delta_charge: false,
            owner: WalletOwner::user("alice"),
            category_id: ProductCategoryId {
                name: "storage".to_string(),
                provider: "hippo".to_string(),
            },
            usage: 12,
            description: ChargeDescription::default(),
        };

        let json = serde_json::to_value(BulkRequest::single(item)).unwrap();
        assert_eq!(json["items"][0]["isDeltaCharge"], false);
        assert_eq!(json["items"][0]["categoryId"]["name"], "storage");
        assert_eq!(json["items"][0]["usage"], 12);
        assert!(json["items"][0]["description"].get("scope").is_none());
    }

    #[test]
    fn trailing_slash_is_dropped_from_base_url() {
        let client = HttpAccountingClient::new(&AccountingServiceConfig {
            url: "http://accounting:8080/".to_string(),
            request_timeout: std::time::Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(client.base_url, "http://accounting:8080");
    }
}
