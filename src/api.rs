//! Control-plane API access.
//!
//! Used only as a fallback when a volume has no local state file on this
//! node (it is attached here but neither its master nor a replica is). One
//! cluster-wide listing is enough to identify every such volume, so the
//! result is returned as an index keyed by volume ID.

use ahash::AHashMap as HashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::volumes::state::{PVC_NAMESPACE_LABEL, PVC_NAME_LABEL};

/// Key of the mounted secret holding the API username.
pub const SECRET_USERNAME_KEY: &str = "username";
/// Key of the mounted secret holding the API password.
pub const SECRET_PASSWORD_KEY: &str = "password";

pub const DEFAULT_ENDPOINT: &str = "storageos";
pub const DEFAULT_PORT: u16 = 5705;
pub const DEFAULT_SCHEME: &str = "http";

/// Time limit for regular API requests.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Time limit for the login request.
pub const AUTHENTICATION_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unable to read secret {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid API endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("no token found in auth response")]
    NoAuthToken,
}

/// A control-plane namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A control-plane volume record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVolume {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Bearer token returned by a successful login.
#[derive(Clone)]
pub struct Session {
    pub token: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}

/// The subset of the control-plane API the exporter consumes.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, ApiError>;
    async fn list_namespaces(&self, session: &Session) -> Result<Vec<Namespace>, ApiError>;
    async fn list_volumes(
        &self,
        session: &Session,
        namespace_id: &str,
    ) -> Result<Vec<ApiVolume>, ApiError>;
}

/// HTTP client for the StorageOS v2 API.
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
}

impl HttpControlPlane {
    /// Creates a client for `endpoint`, adding the default scheme and port when absent.
    pub fn new(endpoint: &str) -> Result<Self, ApiError> {
        let base_url = normalize_endpoint(endpoint)?;
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&session.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let url = format!("{}/v2/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(AUTHENTICATION_TIMEOUT)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .map(|token| Session { token })
            .ok_or(ApiError::NoAuthToken)
    }

    async fn list_namespaces(&self, session: &Session) -> Result<Vec<Namespace>, ApiError> {
        self.get_json(session, "/v2/namespaces").await
    }

    async fn list_volumes(
        &self,
        session: &Session,
        namespace_id: &str,
    ) -> Result<Vec<ApiVolume>, ApiError> {
        self.get_json(session, &format!("/v2/namespaces/{namespace_id}/volumes"))
            .await
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
fn bearer_token(value: &str) -> Option<String> {
    value
        .split_whitespace()
        .nth(1)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Turns `host`, `host:port` or `scheme://host[:port]` into a base URL.
pub fn normalize_endpoint(endpoint: &str) -> Result<String, ApiError> {
    let endpoint = endpoint.trim();

    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("{DEFAULT_SCHEME}://{endpoint}")
    };

    let (scheme, rest) = with_scheme
        .split_once("://")
        .ok_or_else(|| ApiError::InvalidEndpoint(endpoint.to_string()))?;
    let rest = rest.trim_end_matches('/');
    let (host, path) = match rest.split_once('/') {
        Some((host, path)) => (host, format!("/{path}")),
        None => (rest, String::new()),
    };
    if host.is_empty() {
        return Err(ApiError::InvalidEndpoint(endpoint.to_string()));
    }

    let host = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    };

    let url = format!("{scheme}://{host}{path}");
    reqwest::Url::parse(&url).map_err(|_| ApiError::InvalidEndpoint(endpoint.to_string()))?;
    Ok(url)
}

/// API credentials read from the mounted Kubernetes secret.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Reads `username` and `password` from the secret mount at `path`.
    ///
    /// Read on every use so rotated secrets are picked up.
    pub fn from_mounted_secret(path: &Path) -> Result<Self, ApiError> {
        Ok(Self {
            username: read_secret(&path.join(SECRET_USERNAME_KEY))?,
            password: read_secret(&path.join(SECRET_PASSWORD_KEY))?,
        })
    }
}

fn read_secret(path: &Path) -> Result<String, ApiError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| ApiError::Credentials {
            path: path.to_path_buf(),
            source: e,
        })
}

/// PVC identity of a volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claim {
    pub name: String,
    pub namespace: String,
}

/// Volume ID to claim, built from one cluster-wide listing.
pub type ClaimIndex = HashMap<String, Claim>;

/// Builds claim indexes from the control plane.
pub struct ClaimLookup {
    api: Arc<dyn ControlPlane>,
    secrets_path: PathBuf,
}

impl ClaimLookup {
    pub fn new(api: Arc<dyn ControlPlane>, secrets_path: impl Into<PathBuf>) -> Self {
        Self {
            api,
            secrets_path: secrets_path.into(),
        }
    }

    /// Authenticates, lists every namespace and the volumes in each.
    ///
    /// A namespace whose volumes cannot be listed is skipped; failing to log
    /// in or to list namespaces fails the whole lookup.
    #[instrument(skip(self))]
    pub async fn fetch_index(&self) -> Result<ClaimIndex, ApiError> {
        let creds = Credentials::from_mounted_secret(&self.secrets_path)?;
        let session = self.api.authenticate(&creds.username, &creds.password).await?;
        let namespaces = self.api.list_namespaces(&session).await?;

        let mut index = ClaimIndex::new();
        for ns in &namespaces {
            let volumes = match self.api.list_volumes(&session, &ns.id).await {
                Ok(volumes) => volumes,
                Err(e) => {
                    warn!("Failed to list volumes in namespace {}: {}", ns.name, e);
                    continue;
                }
            };

            for vol in volumes {
                let name = vol.labels.get(PVC_NAME_LABEL).cloned().unwrap_or_default();
                let namespace = vol
                    .labels
                    .get(PVC_NAMESPACE_LABEL)
                    .cloned()
                    .unwrap_or_else(|| ns.name.clone());
                index.insert(vol.id, Claim { name, namespace });
            }
        }

        if index.is_empty() {
            warn!("Control plane returned no volumes");
        } else {
            debug!(
                "Indexed {} volume(s) across {} namespace(s)",
                index.len(),
                namespaces.len()
            );
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("storageos").unwrap(),
            "http://storageos:5705"
        );
        assert_eq!(
            normalize_endpoint("storageos:8080").unwrap(),
            "http://storageos:8080"
        );
        assert_eq!(
            normalize_endpoint("https://api.example.com/").unwrap(),
            "https://api.example.com:5705"
        );
        assert_eq!(
            normalize_endpoint("https://10.0.0.1:443/prefix").unwrap(),
            "https://10.0.0.1:443/prefix"
        );
        assert!(normalize_endpoint("").is_err());
        assert!(normalize_endpoint("http://").is_err());
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def".to_string()));
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[test]
    fn test_volume_record_labels() {
        let vol: ApiVolume = serde_json::from_str(
            r#"{"id":"c3561d79","name":"pvc-1","labels":{"csi.storage.k8s.io/pvc/name":"data"},"size":5}"#,
        )
        .unwrap();
        let labels: &HashMap<String, String> = &vol.labels;
        assert_eq!(labels.get(PVC_NAME_LABEL).map(String::as_str), Some("data"));

        let bare: ApiVolume = serde_json::from_str(r#"{"id":"c3561d79"}"#).unwrap();
        assert!(bare.labels.is_empty());
    }

    #[test]
    fn test_credentials_are_trimmed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("username"), "storageos\n").unwrap();
        fs::write(dir.path().join("password"), "  secret \n").unwrap();

        let creds = Credentials::from_mounted_secret(dir.path()).unwrap();
        assert_eq!(creds.username, "storageos");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_missing_password() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("username"), "storageos").unwrap();

        let result = Credentials::from_mounted_secret(dir.path());
        assert!(matches!(result, Err(ApiError::Credentials { .. })));
    }

    /// Two namespaces, the second of which fails to list.
    struct FlakyControlPlane {
        volume_calls: AtomicUsize,
    }

    #[async_trait]
    impl ControlPlane for FlakyControlPlane {
        async fn authenticate(&self, _: &str, _: &str) -> Result<Session, ApiError> {
            Ok(Session {
                token: "t".into(),
            })
        }

        async fn list_namespaces(&self, _: &Session) -> Result<Vec<Namespace>, ApiError> {
            Ok(vec![
                Namespace {
                    id: "ns-1".into(),
                    name: "default".into(),
                },
                Namespace {
                    id: "ns-2".into(),
                    name: "broken".into(),
                },
            ])
        }

        async fn list_volumes(
            &self,
            _: &Session,
            namespace_id: &str,
        ) -> Result<Vec<ApiVolume>, ApiError> {
            self.volume_calls.fetch_add(1, Ordering::SeqCst);
            if namespace_id == "ns-2" {
                return Err(ApiError::Status {
                    url: "/v2/namespaces/ns-2/volumes".into(),
                    status: 500,
                });
            }
            let mut labels = HashMap::new();
            labels.insert(PVC_NAME_LABEL.to_string(), "data".to_string());
            Ok(vec![
                ApiVolume {
                    id: "vol-1".into(),
                    name: "pvc-1".into(),
                    labels,
                },
                ApiVolume {
                    id: "vol-2".into(),
                    name: "unlabelled".into(),
                    labels: Default::default(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn test_fetch_index_skips_failing_namespace() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("username"), "u").unwrap();
        fs::write(dir.path().join("password"), "p").unwrap();

        let api = Arc::new(FlakyControlPlane {
            volume_calls: AtomicUsize::new(0),
        });
        let lookup = ClaimLookup::new(api.clone(), dir.path());
        let index = lookup.fetch_index().await.unwrap();

        assert_eq!(api.volume_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            index.get("vol-1"),
            Some(&Claim {
                name: "data".into(),
                namespace: "default".into(),
            })
        );
        assert_eq!(index.get("vol-2").map(|c| c.name.as_str()), Some(""));
    }

    #[tokio::test]
    async fn test_fetch_index_without_credentials() {
        let dir = tempdir().unwrap();
        let api = Arc::new(FlakyControlPlane {
            volume_calls: AtomicUsize::new(0),
        });
        let lookup = ClaimLookup::new(api.clone(), dir.path());

        assert!(lookup.fetch_index().await.is_err());
        assert_eq!(api.volume_calls.load(Ordering::SeqCst), 0);
    }
}
