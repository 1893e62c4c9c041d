//! Remote object store client and retrying uploader.
//!
//! The store is an external collaborator reached over authenticated HTTPS.
//! Failures are classified up front: transient/network-class errors are
//! retried with backoff, definitive rejections (bad credentials, malformed
//! request) are surfaced after a single attempt. Blind retries of
//! authorization errors only waste attempts and delay the user-visible
//! failure.

use crate::models::upload::RemoteObjectRef;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RemoteStoreError {
    /// Network-class failure (connect, timeout, 5xx, throttling). Safe to
    /// retry: each attempt overwrites the same destination key.
    #[error("transient remote store failure: {0}")]
    Transient(String),

    /// The store definitively rejected the request; retrying cannot help.
    #[error("remote store rejected the request: {0}")]
    Definitive(String),
}

impl RemoteStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteStoreError::Transient(_))
    }
}

/// Contract the pipeline requires of the remote object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Push a local artifact to `destination_key`, overwriting any previous
    /// partial attempt at the same key.
    async fn upload(
        &self,
        local_path: &Path,
        destination_key: &str,
    ) -> Result<RemoteObjectRef, RemoteStoreError>;

    /// Delete the remote object. Absent objects are not an error.
    async fn destroy(&self, object_id: &str) -> Result<(), RemoteStoreError>;
}

/// Retry schedule for remote uploads.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Upload with retry on transient failures.
///
/// Sleeps `base_delay * attempt_number` between attempts. A definitive error
/// aborts after exactly one attempt. On exhaustion the last underlying error
/// is returned, not a generic retry-exhausted wrapper, so callers can tell
/// causes apart.
pub async fn upload_with_retry(
    store: &dyn ObjectStore,
    local_path: &Path,
    destination_key: &str,
    policy: &RetryPolicy,
) -> Result<RemoteObjectRef, RemoteStoreError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        match store.upload(local_path, destination_key).await {
            Ok(remote_ref) => return Ok(remote_ref),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                warn!(
                    destination_key,
                    attempt, max_attempts, "remote upload attempt failed: {}", err
                );
                last_err = Some(err);
                if attempt < max_attempts {
                    tokio::time::sleep(policy.base_delay * attempt).await;
                }
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| RemoteStoreError::Transient("no upload attempt was made".into())))
}

/// Production `ObjectStore` over the store's HTTPS API.
///
/// `PUT {base_url}/objects/{key}` streams the artifact and answers
/// `{objectId, secureUrl}`; `DELETE {base_url}/objects/{id}` removes it.
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        local_path: &Path,
        destination_key: &str,
    ) -> Result<RemoteObjectRef, RemoteStoreError> {
        let file = File::open(local_path)
            .await
            .map_err(|err| RemoteStoreError::Definitive(format!("cannot open artifact: {err}")))?;
        let len = file
            .metadata()
            .await
            .map_err(|err| RemoteStoreError::Definitive(format!("cannot stat artifact: {err}")))?
            .len();

        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .client
            .put(format!("{}/objects/{}", self.base_url, destination_key))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &detail));
        }

        response
            .json::<RemoteObjectRef>()
            .await
            .map_err(|err| RemoteStoreError::Definitive(format!("malformed store response: {err}")))
    }

    async fn destroy(&self, object_id: &str) -> Result<(), RemoteStoreError> {
        let response = self
            .client
            .delete(format!("{}/objects/{}", self.base_url, object_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let detail = response.text().await.unwrap_or_default();
            Err(classify_status(status, &detail))
        }
    }
}

fn classify_request_error(err: reqwest::Error) -> RemoteStoreError {
    if err.is_timeout() || err.is_connect() {
        RemoteStoreError::Transient(err.to_string())
    } else {
        RemoteStoreError::Definitive(err.to_string())
    }
}

fn classify_status(status: StatusCode, detail: &str) -> RemoteStoreError {
    let message = format!("store answered {status}: {detail}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        RemoteStoreError::Transient(message)
    } else {
        RemoteStoreError::Definitive(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted store: pops one outcome per upload call.
    struct ScriptedStore {
        outcomes: Mutex<Vec<Result<RemoteObjectRef, RemoteStoreError>>>,
        attempts: AtomicU32,
    }

    impl ScriptedStore {
        fn new(mut outcomes: Vec<Result<RemoteObjectRef, RemoteStoreError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                attempts: AtomicU32::new(0),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn upload(
            &self,
            _local_path: &Path,
            _destination_key: &str,
        ) -> Result<RemoteObjectRef, RemoteStoreError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(RemoteStoreError::Transient("script exhausted".into())))
        }

        async fn destroy(&self, _object_id: &str) -> Result<(), RemoteStoreError> {
            Ok(())
        }
    }

    fn ok_ref() -> RemoteObjectRef {
        RemoteObjectRef {
            object_id: "obj-1".into(),
            secure_url: "https://store.example/obj-1".into(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn transient_failures_succeed_by_third_attempt() {
        let store = ScriptedStore::new(vec![
            Err(RemoteStoreError::Transient("connection reset".into())),
            Err(RemoteStoreError::Transient("gateway timeout".into())),
            Ok(ok_ref()),
        ]);

        let result =
            upload_with_retry(&store, &PathBuf::from("/tmp/x"), "k", &fast_policy()).await;
        assert_eq!(result.unwrap().object_id, "obj-1");
        assert_eq!(store.attempts(), 3);
    }

    #[tokio::test]
    async fn definitive_failure_makes_exactly_one_attempt() {
        let store = ScriptedStore::new(vec![
            Err(RemoteStoreError::Definitive("invalid credentials".into())),
            Ok(ok_ref()),
        ]);

        let err = upload_with_retry(&store, &PathBuf::from("/tmp/x"), "k", &fast_policy())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("invalid credentials"));
        assert_eq!(store.attempts(), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_last_underlying_error() {
        let store = ScriptedStore::new(vec![
            Err(RemoteStoreError::Transient("first".into())),
            Err(RemoteStoreError::Transient("second".into())),
            Err(RemoteStoreError::Transient("third and final".into())),
            Ok(ok_ref()),
        ]);

        let err = upload_with_retry(&store, &PathBuf::from("/tmp/x"), "k", &fast_policy())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("third and final"));
        assert_eq!(store.attempts(), 3);
    }

    #[test]
    fn status_classification_separates_transient_from_definitive() {
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_retryable());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_retryable());
    }
}
