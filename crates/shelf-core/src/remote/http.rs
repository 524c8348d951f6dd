//! HTTP implementation of the item service gateway.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::config::GatewayConfig;
use crate::models::Article;

use super::{GatewayError, GatewayResult, RemoteGateway};

/// `reqwest`-backed gateway speaking the item service wire contract.
#[derive(Clone)]
pub struct HttpItemGateway {
    base_url: String,
    client: Client,
}

impl HttpItemGateway {
    /// Build a gateway from a validated configuration.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| GatewayError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            base_url: config.base_url,
            client,
        })
    }

    fn items_url(&self) -> String {
        format!("{}/items", self.base_url)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}/items/{}", self.base_url, urlencoding::encode(id))
    }

    async fn read_error(response: Response) -> GatewayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        map_status(status, &body)
    }

    async fn decode_articles(response: Response) -> GatewayResult<Vec<Article>> {
        response
            .json::<Vec<Article>>()
            .await
            .map_err(|error| GatewayError::InvalidPayload(error.to_string()))
    }
}

#[async_trait]
impl RemoteGateway for HttpItemGateway {
    async fn fetch_all(&self, owner_id: &str, token: &str) -> GatewayResult<Vec<Article>> {
        tracing::debug!(owner = owner_id, "fetching full article set");
        let response = self
            .client
            .get(self.items_url())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Self::decode_articles(response).await
    }

    async fn fetch_since(
        &self,
        owner_id: &str,
        token: &str,
        since: i64,
    ) -> GatewayResult<Vec<Article>> {
        tracing::debug!(owner = owner_id, since, "fetching article delta");
        let response = self
            .client
            .get(self.items_url())
            .query(&[("since", since)])
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        Self::decode_articles(response).await
    }

    async fn fetch_one(&self, id: &str, token: &str) -> GatewayResult<Option<Article>> {
        let response = self
            .client
            .get(self.item_url(id))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        response
            .json::<Article>()
            .await
            .map(Some)
            .map_err(|error| GatewayError::InvalidPayload(error.to_string()))
    }

    async fn put(&self, article: &Article, token: &str) -> GatewayResult<Article> {
        let response = self
            .client
            .post(self.items_url())
            .bearer_auth(token)
            .json(article)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        response
            .json::<Article>()
            .await
            .map_err(|error| GatewayError::InvalidPayload(error.to_string()))
    }

    async fn delete(&self, id: &str, token: &str) -> GatewayResult<()> {
        let response = self
            .client
            .delete(self.item_url(id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;

        // Deletes are idempotent; a record that is already gone is fine
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(Self::read_error(response).await)
    }
}

fn transport_error(error: reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(error.to_string())
}

/// Map an unsuccessful response status into the gateway taxonomy.
fn map_status(status: StatusCode, body: &str) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED => GatewayError::Unauthorized,
        StatusCode::FORBIDDEN => GatewayError::Forbidden(parse_api_error(status, body)),
        StatusCode::CONFLICT => GatewayError::Conflict,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            GatewayError::Unavailable(parse_api_error(status, body))
        }
        status if status.is_server_error() => {
            GatewayError::Unavailable(parse_api_error(status, body))
        }
        _ => GatewayError::InvalidPayload(parse_api_error(status, body)),
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_status_follows_the_error_taxonomy() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, ""),
            GatewayError::Unauthorized
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, ""),
            GatewayError::Forbidden(_)
        ));
        assert!(matches!(
            map_status(StatusCode::CONFLICT, ""),
            GatewayError::Conflict
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, ""),
            GatewayError::InvalidPayload(_)
        ));
        assert!(matches!(
            map_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            GatewayError::Unavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            GatewayError::Unavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, ""),
            GatewayError::Unavailable(_)
        ));
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(map_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(!map_status(StatusCode::UNAUTHORIZED, "").is_retryable());
        assert!(!map_status(StatusCode::CONFLICT, "").is_retryable());
        assert!(!map_status(StatusCode::BAD_REQUEST, "").is_retryable());
    }

    #[test]
    fn parse_api_error_prefers_structured_messages() {
        let body = r#"{"message": "owner mismatch", "error": "forbidden"}"#;
        assert_eq!(
            parse_api_error(StatusCode::FORBIDDEN, body),
            "owner mismatch (403)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_raw_body() {
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, " boom "),
            "boom (500)"
        );
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP 500"
        );
    }

    #[test]
    fn item_url_encodes_ids() {
        let gateway = HttpItemGateway::new(
            crate::config::GatewayConfig::new("https://api.example.com").unwrap(),
        )
        .unwrap();
        assert_eq!(
            gateway.item_url("a/b c"),
            "https://api.example.com/items/a%2Fb%20c"
        );
    }
}
