//! Bulk upload executor.
//!
//! A fixed-size worker pool drains a shared atomic cursor over the job list,
//! so no two workers ever claim the same file. Each PUT gets up to
//! `max_attempts` tries with linear backoff; exhausting them aborts the
//! whole batch. The abort error carries the keys that already landed so a
//! caller can resume with only the remainder; uploads are idempotent
//! overwrites, so there is no compensating deletion.
//!
//! Multipart jobs apply the same pool pattern at the part level; the
//! completion request lists `(part_number, etag)` sorted ascending, because
//! storage services reject out-of-order part lists.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::sleep;

use fotoflow_core::models::{CompletedPart, PartUpload, TransferMode, TransferPlan};

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("PUT exhausted {attempts} attempts for {key}: {last_error}")]
    Exhausted {
        key: String,
        attempts: u32,
        last_error: String,
    },

    #[error("No ETag in response for part {part_number} of {key}")]
    MissingEtag { key: String, part_number: i32 },

    #[error("Multipart completion rejected for {key}: {status}")]
    CompletionRejected { key: String, status: u16 },

    #[error("Batch aborted after {} completed uploads: {cause}", completed.len())]
    Aborted {
        /// Keys that were fully written before the abort; a resume can skip
        /// these.
        completed: Vec<String>,
        #[source]
        cause: Box<TransferError>,
    },

    #[error("Transfer worker panicked: {0}")]
    Worker(String),
}

#[derive(Clone, Debug)]
pub struct TransferConfig {
    /// Pool size for small-file batches.
    pub file_concurrency: usize,
    /// Pool size for the parts of one multipart file.
    pub part_concurrency: usize,
    /// Attempts per PUT before the batch aborts.
    pub max_attempts: u32,
    /// Linear backoff step: failure n sleeps `n × backoff_step`.
    pub backoff_step: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            file_concurrency: 6,
            part_concurrency: 4,
            max_attempts: 5,
            backoff_step: Duration::from_millis(500),
        }
    }
}

/// One local file paired with its transfer plan.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub local_path: PathBuf,
    pub plan: TransferPlan,
}

#[derive(Serialize)]
struct CompleteRequest {
    upload_id: String,
    parts: Vec<CompletedPart>,
}

#[derive(Clone)]
pub struct TransferExecutor {
    http: reqwest::Client,
    config: TransferConfig,
}

impl TransferExecutor {
    pub fn new(config: TransferConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Upload every job; resolves only when the cursor drains without a
    /// failure. Returns the set of written keys: completeness matters,
    /// completion order does not.
    pub async fn upload_batch(
        &self,
        jobs: Vec<TransferJob>,
    ) -> Result<Vec<String>, TransferError> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let jobs = Arc::new(jobs);
        let cursor = Arc::new(AtomicUsize::new(0));
        let abort = Arc::new(AtomicBool::new(false));
        let completed = Arc::new(Mutex::new(Vec::new()));

        let worker_count = self.config.file_concurrency.min(jobs.len());
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let executor = self.clone();
            let jobs = jobs.clone();
            let cursor = cursor.clone();
            let abort = abort.clone();
            let completed = completed.clone();
            handles.push(tokio::spawn(async move {
                executor.file_worker(&jobs, &cursor, &abort, &completed).await
            }));
        }

        let mut first_error: Option<TransferError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(TransferError::Worker(join_err.to_string()));
                    }
                }
            }
        }

        let written = match Arc::try_unwrap(completed) {
            Ok(mutex) => mutex.into_inner().unwrap_or_default(),
            Err(arc) => arc.lock().map(|g| g.clone()).unwrap_or_default(),
        };

        match first_error {
            None => Ok(written),
            Some(cause) => Err(TransferError::Aborted {
                completed: written,
                cause: Box::new(cause),
            }),
        }
    }

    /// Re-run a batch, skipping keys that already landed (for example from a
    /// previous abort's `completed` set).
    pub async fn resume_batch(
        &self,
        jobs: Vec<TransferJob>,
        already_written: &HashSet<String>,
    ) -> Result<Vec<String>, TransferError> {
        let remaining: Vec<TransferJob> = jobs
            .into_iter()
            .filter(|j| !already_written.contains(&j.plan.source_key))
            .collect();
        self.upload_batch(remaining).await
    }

    async fn file_worker(
        &self,
        jobs: &[TransferJob],
        cursor: &AtomicUsize,
        abort: &AtomicBool,
        completed: &Mutex<Vec<String>>,
    ) -> Result<(), TransferError> {
        loop {
            if abort.load(Ordering::SeqCst) {
                return Ok(());
            }
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            if index >= jobs.len() {
                return Ok(());
            }

            match self.transfer_one(&jobs[index]).await {
                Ok(key) => {
                    if let Ok(mut guard) = completed.lock() {
                        guard.push(key);
                    }
                }
                Err(e) => {
                    abort.store(true, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }
    }

    async fn transfer_one(&self, job: &TransferJob) -> Result<String, TransferError> {
        let key = job.plan.source_key.clone();
        match &job.plan.mode {
            TransferMode::SinglePut { url } => {
                let body = Bytes::from(tokio::fs::read(&job.local_path).await?);
                self.put_with_retry(url, &job.plan.content_type, body, &key)
                    .await?;
                tracing::debug!(key = %key, "Single PUT upload complete");
                Ok(key)
            }
            TransferMode::Multipart {
                upload_id,
                part_size,
                parts,
                complete_url,
            } => {
                self.multipart_upload(job, upload_id, *part_size, parts, complete_url)
                    .await?;
                tracing::debug!(key = %key, part_count = parts.len(), "Multipart upload complete");
                Ok(key)
            }
        }
    }

    /// Blocking PUT with `Content-Type` set, up to `max_attempts` tries and
    /// linear backoff between them. Returns the response ETag, if any.
    async fn put_with_retry(
        &self,
        url: &str,
        content_type: &str,
        body: Bytes,
        key: &str,
    ) -> Result<Option<String>, TransferError> {
        let mut attempt: u32 = 1;
        loop {
            let result = self
                .http
                .put(url)
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body.clone())
                .send()
                .await;

            let last_error = match result {
                Ok(resp) if resp.status().is_success() => {
                    let etag = resp
                        .headers()
                        .get(reqwest::header::ETAG)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.trim_matches('"').to_string());
                    return Ok(etag);
                }
                Ok(resp) => format!("status {}", resp.status()),
                Err(e) => e.to_string(),
            };

            if attempt >= self.config.max_attempts {
                return Err(TransferError::Exhausted {
                    key: key.to_string(),
                    attempts: attempt,
                    last_error,
                });
            }

            tracing::warn!(
                key = %key,
                attempt,
                error = %last_error,
                "PUT failed, retrying"
            );
            sleep(self.config.backoff_step * attempt).await;
            attempt += 1;
        }
    }

    /// Upload one large file part by part with a bounded part pool, then
    /// submit the completion request with parts sorted ascending.
    async fn multipart_upload(
        &self,
        job: &TransferJob,
        upload_id: &str,
        part_size: u64,
        parts: &[PartUpload],
        complete_url: &str,
    ) -> Result<(), TransferError> {
        let file_len = tokio::fs::metadata(&job.local_path).await?.len();
        let key = job.plan.source_key.clone();

        let parts = Arc::new(parts.to_vec());
        let cursor = Arc::new(AtomicUsize::new(0));
        let uploaded = Arc::new(Mutex::new(Vec::with_capacity(parts.len())));

        let worker_count = self.config.part_concurrency.min(parts.len());
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let executor = self.clone();
            let parts = parts.clone();
            let cursor = cursor.clone();
            let uploaded = uploaded.clone();
            let path = job.local_path.clone();
            let content_type = job.plan.content_type.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(part) = parts.get(index) else {
                        return Ok::<(), TransferError>(());
                    };

                    let offset = (part.part_number as u64 - 1) * part_size;
                    let len = part_size.min(file_len.saturating_sub(offset));
                    let body = read_chunk(&path, offset, len).await?;

                    let etag = executor
                        .put_with_retry(&part.url, &content_type, body, &key)
                        .await?
                        .ok_or(TransferError::MissingEtag {
                            key: key.clone(),
                            part_number: part.part_number,
                        })?;

                    if let Ok(mut guard) = uploaded.lock() {
                        guard.push(CompletedPart {
                            part_number: part.part_number,
                            etag,
                        });
                    }
                }
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(join_err) => return Err(TransferError::Worker(join_err.to_string())),
            }
        }

        let mut completed_parts = match Arc::try_unwrap(uploaded) {
            Ok(mutex) => mutex.into_inner().unwrap_or_default(),
            Err(arc) => arc.lock().map(|g| g.clone()).unwrap_or_default(),
        };
        completed_parts.sort_by_key(|p| p.part_number);

        let response = self
            .http
            .post(complete_url)
            .json(&CompleteRequest {
                upload_id: upload_id.to_string(),
                parts: completed_parts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransferError::CompletionRejected {
                key,
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

async fn read_chunk(path: &PathBuf, offset: u64, len: u64) -> Result<Bytes, TransferError> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}
