use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::CatalogError;

const USER_AGENT: &str = concat!("game-metadata-engine/", env!("CARGO_PKG_VERSION"));

/// HTTP client for one provider, with that provider's request timeout.
pub fn build_client(provider: &str, timeout: Duration) -> Result<Client, CatalogError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CatalogError::transport(provider, format!("Failed to create HTTP client: {}", e)))
}

/// Map a non-success status to a [`CatalogError`]; 403 becomes `Throttled`.
pub fn check_status(provider: &str, response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(CatalogError::from_status(provider, status.as_u16()))
    }
}

/// Send `request` and decode the JSON body.
pub async fn get_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, CatalogError> {
    let response = request
        .send()
        .await
        .map_err(|e| CatalogError::from_reqwest(provider, e))?;

    let response = check_status(provider, response)?;

    response
        .json::<T>()
        .await
        .map_err(|e| CatalogError::parse(provider, e))
}

/// HEAD-check a CDN asset. Anything but a success within `timeout` counts
/// as absent.
pub async fn asset_exists(client: &Client, url: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, client.head(url).send()).await {
        Ok(Ok(response)) => response.status().is_success(),
        Ok(Err(e)) => {
            tracing::debug!("Asset check failed for {}: {}", url, e);
            false
        }
        Err(_) => {
            tracing::debug!("Asset check timed out after {:?}: {}", timeout, url);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        assert!(build_client("steam", Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_asset_is_absent() {
        let client = build_client("steam", Duration::from_secs(1)).unwrap();
        // Port 9 (discard) on localhost: refused or timed out, never a 2xx
        let exists = asset_exists(&client, "http://127.0.0.1:9/box.jpg", Duration::from_millis(500)).await;
        assert!(!exists);
    }
}
