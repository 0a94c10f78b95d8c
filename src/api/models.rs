use crate::core::catalog::CatalogError;
use crate::core::json_path::JsonPath;
use crate::core::providers::ProviderConnection;
use crate::utils::auth::add_auth_headers;
use crate::utils::url::resolve_endpoint;

/// List a provider's models: GET its catalog endpoint and pull the model
/// names out with the provider's catalog path.
pub async fn fetch_models(
    client: &reqwest::Client,
    connection: &ProviderConnection,
) -> Result<Vec<String>, CatalogError> {
    let provider = connection.provider_id.as_str();
    let path = JsonPath::parse(&connection.catalog.path).map_err(|source| CatalogError::Path {
        provider: provider.to_string(),
        source,
    })?;

    let models_url = resolve_endpoint(&connection.base_url, &connection.catalog.url);
    let request = client
        .get(models_url)
        .header("Content-Type", "application/json");
    let response = add_auth_headers(request, connection)
        .send()
        .await
        .map_err(|source| CatalogError::Transport {
            provider: provider.to_string(),
            source,
        })?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(CatalogError::Http {
            provider: provider.to_string(),
            status,
            body,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| CatalogError::Transport {
            provider: provider.to_string(),
            source,
        })?;
    let document: serde_json::Value =
        serde_json::from_str(&body).map_err(|source| CatalogError::Decode {
            provider: provider.to_string(),
            source,
        })?;

    path.extract(&document).map_err(|source| CatalogError::Path {
        provider: provider.to_string(),
        source,
    })
}

/// Alphabetical, without duplicates.
pub fn sort_models(models: &mut Vec<String>) {
    models.sort_unstable();
    models.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builtin_providers::CatalogSpec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(
        status: &str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });
        (format!("http://{addr}/v1"), handle)
    }

    fn connection(base_url: String, path: &str, api_key: Option<&str>) -> ProviderConnection {
        ProviderConnection {
            provider_id: "local".to_string(),
            display_name: "Local".to_string(),
            base_url,
            credential_env: api_key.map(|_| "LOCAL_KEY".to_string()),
            api_key: api_key.map(str::to_string),
            anthropic_mode: false,
            catalog: CatalogSpec {
                url: "models".to_string(),
                path: path.to_string(),
            },
        }
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn fetches_and_extracts_openai_shape() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"object":"list","data":[{"id":"gpt-4o"},{"id":"o3-mini"},{"object":"model"}]}"#,
        )
        .await;

        let models = fetch_models(&client(), &connection(base_url, "data.id", Some("sk-test")))
            .await
            .unwrap();
        assert_eq!(models, vec!["gpt-4o", "o3-mini"]);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /v1/models "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer sk-test"));
    }

    #[tokio::test]
    async fn http_failure_keeps_status_and_body() {
        let (base_url, _server) = serve_once("403 Forbidden", r#"{"error":"nope"}"#).await;

        let err = fetch_models(&client(), &connection(base_url, "data.id", None))
            .await
            .unwrap_err();
        match err {
            CatalogError::Http { status, body, .. } => {
                assert_eq!(status, 403);
                assert_eq!(body, r#"{"error":"nope"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn extraction_errors_surface_for_single_provider() {
        let (base_url, _server) = serve_once("200 OK", r#"{"data":"not-a-list"}"#).await;

        let err = fetch_models(&client(), &connection(base_url, "data.id", None))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Path { .. }));
    }

    #[test]
    fn sort_models_dedups() {
        let mut models = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        sort_models(&mut models);
        assert_eq!(models, vec!["a", "b"]);
    }
}
