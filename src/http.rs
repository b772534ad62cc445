use eyre::WrapErr;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("rickhouse-api/", env!("CARGO_PKG_VERSION"));

pub fn build_client() -> Client {
    let timeout = std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(15);
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Download a resource fully into memory. Used for bottle photos and edited
/// packshots, which are a few MB at most.
pub async fn fetch_bytes(client: &Client, url: &str) -> eyre::Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .wrap_err_with(|| format!("GET {url}"))?;
    let status = response.status();
    if !status.is_success() {
        eyre::bail!("GET {url} returned {status}");
    }
    let bytes = response.bytes().await.wrap_err("reading response body")?;
    Ok(bytes.to_vec())
}
