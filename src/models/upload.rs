//! Ephemeral upload-session types and wire DTOs for the chunk pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Logical grouping of chunks belonging to one original file.
///
/// Sessions are never persisted: one exists exactly as long as its staging
/// directory holds chunks. The key is deterministic in `(owner_id, filename)`
/// so retries and out-of-order chunks land in the same place, and hashing
/// keeps untrusted filenames out of filesystem paths.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UploadSession {
    pub owner_id: Uuid,
    pub filename: String,
}

impl UploadSession {
    /// Stable staging-directory name for this session.
    pub fn key(&self) -> String {
        let digest = md5::compute(format!("{}/{}", self.owner_id, self.filename));
        format!("{:x}", digest)
    }
}

/// Acknowledgment returned for each received chunk.
///
/// Carries enough for the caller to track completion client-side; the server
/// keeps no session state beyond the staged files themselves.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    pub filename: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

/// Body of `POST /api/upload/complete`.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub filename: String,
    pub total_chunks: u32,
}

/// Stable reference to the durable remote copy of an artifact.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObjectRef {
    pub object_id: String,
    pub secure_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_is_stable_and_path_safe() {
        let session = UploadSession {
            owner_id: Uuid::nil(),
            filename: "../../etc/passwd".into(),
        };
        let key = session.key();
        assert_eq!(key, session.key());
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_key_distinguishes_owners() {
        let a = UploadSession {
            owner_id: Uuid::new_v4(),
            filename: "scan.dcm".into(),
        };
        let b = UploadSession {
            owner_id: Uuid::new_v4(),
            filename: "scan.dcm".into(),
        };
        assert_ne!(a.key(), b.key());
    }
}
