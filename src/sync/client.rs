//! Fetching merge-queue documents from the status endpoint.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use super::error::{Result, SyncError, SyncPhase};

pub const USER_AGENT: &str = concat!("ci-watchtower/", env!("CARGO_PKG_VERSION"));

const POOLS_PATH: &str = "/";
const HISTORY_PATH: &str = "/history";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the syncer reads the merge queue from.
pub trait StatusSource: Send + Sync {
    /// The live pools document.
    fn fetch_pools(&self) -> impl Future<Output = Result<Value>> + Send;

    /// The merge history document, keyed by `owner/repo:branch`.
    fn fetch_history(&self) -> impl Future<Output = Result<Value>> + Send;
}

/// [`StatusSource`] backed by the merge queue's HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStatusSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| SyncError::Fetch {
                url: base_url.clone(),
                source,
            })?;
        Ok(HttpStatusSource { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches one document. A body that is not JSON is a
    /// [`SyncError::Parse`] of `phase`, not a fetch failure.
    async fn get(&self, path: &str, phase: SyncPhase) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let fetch_err = |source| SyncError::Fetch {
            url: url.clone(),
            source,
        };

        let response = self.client.get(&url).send().await.map_err(fetch_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(fetch_err)?;
        serde_json::from_slice(&body).map_err(|e| SyncError::Parse {
            phase,
            reason: format!("body is not JSON: {e}"),
        })
    }
}

impl StatusSource for HttpStatusSource {
    async fn fetch_pools(&self) -> Result<Value> {
        self.get(POOLS_PATH, SyncPhase::Pools).await
    }

    async fn fetch_history(&self) -> Result<Value> {
        self.get(HISTORY_PATH, SyncPhase::History).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    /// Serves `app` on an ephemeral loopback port and returns its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    #[test]
    fn trailing_slash_is_dropped_from_base() {
        let source = HttpStatusSource::new("http://keeper.example:8888/").unwrap();
        assert_eq!(source.base_url(), "http://keeper.example:8888");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_fetch_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpStatusSource::new(format!("http://{addr}")).unwrap();
        let err = source.fetch_pools().await.unwrap_err();
        assert!(matches!(err, SyncError::Fetch { .. }), "got {err}");
    }

    #[tokio::test]
    async fn documents_are_fetched_from_both_paths() {
        let base = serve(
            Router::new()
                .route("/", get(|| async { r#"[{"Org":"acme"}]"# }))
                .route("/history", get(|| async { "{}" })),
        )
        .await;
        let source = HttpStatusSource::new(base).unwrap();

        assert_eq!(source.fetch_pools().await.unwrap()[0]["Org"], "acme");
        assert!(source.fetch_history().await.unwrap().is_object());
    }

    #[tokio::test]
    async fn non_json_body_is_a_parse_error() {
        let app = Router::new().route("/history", get(|| async { "<html>not json</html>" }));
        let base = serve(app).await;
        let source = HttpStatusSource::new(base).unwrap();

        let err = source.fetch_history().await.unwrap_err();
        assert!(
            matches!(err, SyncError::Parse { phase: SyncPhase::History, .. }),
            "got {err}"
        );
    }

    #[tokio::test]
    async fn error_status_is_reported_with_its_code() {
        let base = serve(Router::new().route(
            "/",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "draining") }),
        ))
        .await;
        let source = HttpStatusSource::new(base).unwrap();

        let err = source.fetch_pools().await.unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 503, .. }), "got {err}");
    }
}
