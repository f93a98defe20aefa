use serde::{Deserialize, Serialize};

/// Per-file upload plan handed to the client-side transfer executor.
///
/// Minted by the intake service in client-direct mode; the presigned URLs it
/// carries expire after the policy's presign window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Target key in the originals namespace.
    pub source_key: String,
    /// Content type the URLs were signed for; the executor must send it.
    pub content_type: String,
    pub mode: TransferMode,
}

/// Single PUT for small files, a chunked multipart session for large ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransferMode {
    SinglePut {
        url: String,
    },
    Multipart {
        upload_id: String,
        part_size: u64,
        /// Ordered list of per-part presigned PUT URLs.
        parts: Vec<PartUpload>,
        /// Endpoint the sorted `(part_number, etag)` list is posted to.
        complete_url: String,
    },
}

/// One part of a multipart session, before upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartUpload {
    pub part_number: i32,
    pub url: String,
}

/// One uploaded part. Completion requests list these sorted ascending by
/// part number; storage services reject out-of-order or incomplete lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}
