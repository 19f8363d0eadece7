//! Remote configuration authority - where pipeline config is fetched from and
//! partial updates are submitted to.
//!
//! Two implementations:
//! - [`HttpConfigAuthority`]: `GET`/`POST {base}/api/config` over HTTP
//! - [`FileConfigAuthority`]: a TOML document on local disk

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::pipeline::{PipelineConfig, PipelineConfigPatch};

/// Authority errors. All of them are transport-level: the store absorbs them.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("I/O error ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed config document: {0}")]
    Parse(String),
}

/// Response to a submitted patch: `{ "success": bool, "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateAck {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }
}

/// Request/response collaborator behind the reactive store.
#[async_trait]
pub trait ConfigAuthority: Send + Sync {
    /// Fetch the current configuration.
    async fn fetch(&self) -> Result<PipelineConfig, AuthorityError>;

    /// Submit a partial update. `Ok` with `success == false` is an explicit rejection.
    async fn submit(&self, patch: &PipelineConfigPatch) -> Result<UpdateAck, AuthorityError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// HTTP Authority
// ============================================================================

/// HTTP config authority.
#[derive(Clone)]
pub struct HttpConfigAuthority {
    http: reqwest::Client,
    base_url: String,
}

impl HttpConfigAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AuthorityError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/config", self.base_url)
    }
}

#[async_trait]
impl ConfigAuthority for HttpConfigAuthority {
    async fn fetch(&self) -> Result<PipelineConfig, AuthorityError> {
        let resp = self.http.get(self.endpoint()).send().await?;
        match resp.status() {
            reqwest::StatusCode::OK => Ok(resp.json::<PipelineConfig>().await?),
            status => Err(AuthorityError::ServerError(status)),
        }
    }

    async fn submit(&self, patch: &PipelineConfigPatch) -> Result<UpdateAck, AuthorityError> {
        let resp = self.http.post(self.endpoint()).json(patch).send().await?;
        let status = resp.status();
        if status.is_success() || status.is_client_error() {
            // Rejections come back as 4xx with an ack body; anything else is transport
            match resp.json::<UpdateAck>().await {
                Ok(ack) => Ok(ack),
                Err(_) if status.is_client_error() => Ok(UpdateAck::rejected(status.to_string())),
                Err(e) => Err(AuthorityError::Http(e)),
            }
        } else {
            Err(AuthorityError::ServerError(status))
        }
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

// ============================================================================
// File Authority
// ============================================================================

/// TOML document on disk acting as the config authority.
///
/// A missing file yields `seed`, the configuration the service started with.
pub struct FileConfigAuthority {
    path: PathBuf,
    seed: PipelineConfig,
    write_lock: Mutex<()>,
}

impl FileConfigAuthority {
    pub fn new(path: impl Into<PathBuf>, seed: PipelineConfig) -> Self {
        Self {
            path: path.into(),
            seed,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<PipelineConfig, AuthorityError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => toml::from_str(&text).map_err(|e| AuthorityError::Parse(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Config document absent, serving seed");
                Ok(self.seed.clone())
            }
            Err(e) => Err(AuthorityError::Io {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    async fn write(&self, config: &PipelineConfig) -> Result<(), AuthorityError> {
        let text = toml::to_string_pretty(config).map_err(|e| AuthorityError::Parse(e.to_string()))?;
        let io_err = |source| AuthorityError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        // Write-then-rename so readers never see a half-written document
        let tmp = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp, text).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl ConfigAuthority for FileConfigAuthority {
    async fn fetch(&self) -> Result<PipelineConfig, AuthorityError> {
        self.read().await
    }

    async fn submit(&self, patch: &PipelineConfigPatch) -> Result<UpdateAck, AuthorityError> {
        let _guard = self.write_lock.lock().await;
        let current = self.read().await?;
        let next = current.merged(patch);
        if let Err(errors) = next.validate() {
            return Ok(UpdateAck::rejected(errors.join("; ")));
        }
        self.write(&next).await?;
        info!(path = %self.path.display(), "Pipeline config document updated");
        Ok(UpdateAck::accepted())
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_serves_seed() {
        let dir = tempdir().unwrap();
        let seed = PipelineConfig {
            channel_id: "seed".to_string(),
            ..Default::default()
        };
        let auth = FileConfigAuthority::new(dir.path().join("cfg.toml"), seed.clone());
        assert_eq!(auth.fetch().await.unwrap(), seed);
    }

    #[tokio::test]
    async fn test_submit_persists_merge() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cfg.toml");
        let auth = FileConfigAuthority::new(&path, PipelineConfig::default());

        let ack = auth.submit(&PipelineConfigPatch::poll_interval(5_000)).await.unwrap();
        assert!(ack.success);
        assert!(path.exists());
        assert_eq!(auth.fetch().await.unwrap().poll_interval_ms, 5_000);
    }

    #[tokio::test]
    async fn test_submit_invalid_patch_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        let auth = FileConfigAuthority::new(&path, PipelineConfig::default());

        let ack = auth.submit(&PipelineConfigPatch::poll_interval(10)).await.unwrap();
        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("poll_interval_ms"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_garbage_document_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        std::fs::write(&path, "poll_interval_ms = \"soon\"").unwrap();
        let auth = FileConfigAuthority::new(&path, PipelineConfig::default());
        assert!(matches!(auth.fetch().await, Err(AuthorityError::Parse(_))));
    }

    #[test]
    fn test_ack_json_shape() {
        let ack: UpdateAck = serde_json::from_str(r#"{"success":false,"error":"nope"}"#).unwrap();
        assert_eq!(ack, UpdateAck::rejected("nope"));
        let ok: UpdateAck = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert_eq!(ok, UpdateAck::accepted());
    }

    // ------------------------------------------------------------------------
    // HTTP authority against a local server
    // ------------------------------------------------------------------------

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}/")
    }

    fn remote_config() -> PipelineConfig {
        PipelineConfig {
            channel_id: "2998710".to_string(),
            poll_interval_ms: 15_000,
            ..Default::default()
        }
    }

    async fn remote_authority() -> HttpConfigAuthority {
        let router = Router::new().route(
            "/api/config",
            get(|| async { Json(remote_config()) }).post(|Json(patch): Json<PipelineConfigPatch>| async move {
                match patch.poll_interval_ms {
                    Some(ms) if ms < 1_000 => (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(UpdateAck::rejected("poll interval too short")),
                    ),
                    _ => (StatusCode::OK, Json(UpdateAck::accepted())),
                }
            }),
        );
        HttpConfigAuthority::new(&serve(router).await, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_http_fetch_and_accepted_submit() {
        let auth = remote_authority().await;
        assert!(!auth.name().ends_with('/'));
        assert_eq!(auth.fetch().await.unwrap(), remote_config());
        let ack = auth.submit(&PipelineConfigPatch::poll_interval(30_000)).await.unwrap();
        assert_eq!(ack, UpdateAck::accepted());
    }

    #[tokio::test]
    async fn test_http_rejection_carries_the_reason() {
        let auth = remote_authority().await;
        let ack = auth.submit(&PipelineConfigPatch::poll_interval(5)).await.unwrap();
        assert_eq!(ack, UpdateAck::rejected("poll interval too short"));
    }

    #[tokio::test]
    async fn test_http_bare_client_error_is_a_rejection() {
        let router = Router::new().route(
            "/api/config",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }).post(|| async { StatusCode::FORBIDDEN }),
        );
        let auth = HttpConfigAuthority::new(&serve(router).await, Duration::from_secs(5)).unwrap();

        match auth.fetch().await {
            Err(AuthorityError::ServerError(status)) => assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR),
            other => panic!("expected server error, got {other:?}"),
        }
        let ack = auth.submit(&PipelineConfigPatch::poll_interval(30_000)).await.unwrap();
        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("403"));
    }

    #[tokio::test]
    async fn test_http_unreachable_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let auth = HttpConfigAuthority::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        assert!(matches!(auth.fetch().await, Err(AuthorityError::Http(_))));
    }
}
