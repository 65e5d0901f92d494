//! Salesforce REST query client.

use super::records::QueryResponse;
use crate::error::{GatewayError, Result};
use crate::session::Session;
use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Error codes Salesforce returns (with 400) for an id it cannot resolve
const NOT_FOUND_ERROR_CODES: &[&str] = &[
    "MALFORMED_ID",
    "INVALID_ID_FIELD",
    "INVALID_QUERY_FILTER_OPERATOR",
];

/// One entry of a Salesforce REST error array
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiError {
    message: String,
    error_code: String,
}

/// Runs SOQL over a caller-provided [`Session`]
pub struct CrmClient {
    http_client: reqwest::Client,
    api_version: String,
}

impl CrmClient {
    pub fn new(api_version: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Salesforce API HTTP client")?;

        Ok(Self {
            http_client,
            api_version: api_version.to_string(),
        })
    }

    /// Execute `soql` and deserialize the records as `T`.
    ///
    /// # Errors
    /// * `RemoteAuthExpired` - 401 (access token expired or revoked mid-call)
    /// * `NotFound` - 400 with an invalid-id error code
    /// * `RemoteQueryFailed` - any other 4xx
    /// * `RemoteUnavailable` - 5xx, network failure, timeout or unparsable body
    pub async fn query<T: DeserializeOwned>(
        &self,
        session: &Session,
        soql: &str,
    ) -> Result<QueryResponse<T>> {
        let url = format!(
            "{}/services/data/{}/query",
            session.instance_url(),
            self.api_version
        );

        debug!(instance_url = %session.instance_url(), soql = %soql, "Running SOQL query");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(session.access_token())
            .header("Accept", "application/json")
            .query(&[("q", soql)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::RemoteUnavailable("Salesforce API request timed out".to_string())
                } else {
                    GatewayError::RemoteUnavailable(format!("Salesforce API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        response.json().await.map_err(|e| {
            GatewayError::RemoteUnavailable(format!("unparsable Salesforce API response: {}", e))
        })
    }
}

fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let errors: Vec<ApiError> = serde_json::from_str(body).unwrap_or_default();
    let detail = match errors.first() {
        Some(err) => format!("{}: {}", err.error_code, err.message),
        None => format!("status {}", status),
    };

    match status {
        StatusCode::UNAUTHORIZED => GatewayError::RemoteAuthExpired(detail),
        StatusCode::BAD_REQUEST
            if errors
                .iter()
                .any(|e| NOT_FOUND_ERROR_CODES.contains(&e.error_code.as_str())) =>
        {
            GatewayError::NotFound("Record".to_string())
        }
        s if s.is_client_error() => GatewayError::RemoteQueryFailed(detail),
        _ => GatewayError::RemoteUnavailable(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::records::RemoteUserId;
    use mockito::{Matcher, Server};

    fn client() -> CrmClient {
        CrmClient::new("v59.0", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_query_sends_bearer_and_soql() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/services/data/v59.0/query")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                "SELECT Id FROM User WHERE Id = '005xx000001Sv6A'".into(),
            ))
            .match_header("authorization", "Bearer 00D!token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"totalSize": 1, "done": true, "records": [{"Id": "005xx000001Sv6A"}]}"#)
            .create_async()
            .await;

        let session = Session::new("00D!token", &server.url());
        let result: QueryResponse<RemoteUserId> = client()
            .query(&session, "SELECT Id FROM User WHERE Id = '005xx000001Sv6A'")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.total_size, 1);
        assert_eq!(result.records[0].id, "005xx000001Sv6A");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/services/data/v59.0/query")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"[{"message": "Session expired or invalid", "errorCode": "INVALID_SESSION_ID"}]"#)
            .create_async()
            .await;

        let err = client()
            .query::<RemoteUserId>(&Session::new("stale", &server.url()), "SELECT Id FROM User")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RemoteAuthExpired(_)));
        assert!(err.to_string().contains("INVALID_SESSION_ID"));
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/services/data/v59.0/query")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"[{"message": "invalid ID field: 006000000000000", "errorCode": "INVALID_QUERY_FILTER_OPERATOR"}]"#)
            .create_async()
            .await;

        let err = client()
            .query::<RemoteUserId>(&Session::new("t", &server.url()), "SELECT Id FROM Opportunity")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bad_query_is_query_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/services/data/v59.0/query")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"[{"message": "No such column 'Foo'", "errorCode": "INVALID_FIELD"}]"#)
            .create_async()
            .await;

        let err = client()
            .query::<RemoteUserId>(&Session::new("t", &server.url()), "SELECT Foo FROM Opportunity")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RemoteQueryFailed(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/services/data/v59.0/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client()
            .query::<RemoteUserId>(&Session::new("t", &server.url()), "SELECT Id FROM User")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RemoteUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_instance_is_unavailable() {
        let err = client()
            .query::<RemoteUserId>(&Session::new("t", "http://127.0.0.1:1"), "SELECT Id FROM User")
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        // Accepts the connection, never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = CrmClient::new("v59.0", Duration::from_millis(200)).unwrap();
        let err = client
            .query::<RemoteUserId>(
                &Session::new("t", &format!("http://{}", addr)),
                "SELECT Id FROM User",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RemoteUnavailable(_)));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }
}
