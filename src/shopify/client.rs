use crate::config::ShopifyConfig;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("store credentials are not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("graphql: {0}")]
    Graphql(String),
    #[error("response missing {0}")]
    MissingField(&'static str),
}

/// Admin-API client. REST is used only for product creation; everything
/// else (metafields, publications, files) goes through GraphQL.
#[derive(Clone)]
pub struct ShopifyClient {
    http: Client,
    config: ShopifyConfig,
}

impl ShopifyClient {
    pub fn new(config: ShopifyConfig, http: Client) -> Self {
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn config(&self) -> &ShopifyConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) async fn rest_post(&self, path: &str, body: &Value) -> Result<Value, ShopifyError> {
        if !self.is_configured() {
            return Err(ShopifyError::NotConfigured);
        }
        let url = format!("{}{path}", self.config.rest_base());
        let response = self
            .http
            .post(url)
            .header("X-Shopify-Access-Token", &self.config.admin_token)
            .json(body)
            .send()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;
        if !status.is_success() {
            return Err(ShopifyError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        serde_json::from_str(&text).map_err(|err| ShopifyError::Request(err.to_string()))
    }

    /// Runs a GraphQL document. Transport-level `errors` fail the call;
    /// mutation `userErrors` are left in the payload for the caller.
    pub(crate) async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ShopifyError> {
        if !self.is_configured() {
            return Err(ShopifyError::NotConfigured);
        }
        let response = self
            .http
            .post(self.config.graphql_url())
            .header("X-Shopify-Access-Token", &self.config.admin_token)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;
        if let Some(errors) = payload.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            debug!(target: "rickhouse.shopify", errors = %serde_json::Value::Array(errors.clone()), "graphql errors");
            let message = errors[0]
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ShopifyError::Graphql(message));
        }
        Ok(payload)
    }
}

pub fn product_gid(product_id: u64) -> String {
    format!("gid://shopify/Product/{product_id}")
}

/// Trailing numeric segment of a gid, e.g. `gid://shopify/Product/42` -> 42.
pub fn gid_numeric_id(gid: &str) -> Option<u64> {
    gid.rsplit('/').next()?.parse().ok()
}
