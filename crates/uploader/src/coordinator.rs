//! Upload coordinator: digest, transmit every block, gate, merge.
//!
//! The coordinator is a plain service object. It keeps no state between
//! calls; each [`upload`](UploadCoordinator::upload) owns its own session.

use std::path::Path;
use std::sync::Arc;

use chunkup_protocol::{Endpoint, ExistQuery, ExistResponse, MergeRequest, endpoint_url};
use chunkup_transfer::{
    BlockOutcome, ChunkPlan, ChunkReader, ContentDigest, SpeedCalculator, UploadSession,
    digest_file_with_plan,
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::block::BlockUploader;
use crate::config::{RetryPolicy, UploadConfig};
use crate::error::{RequestFailure, UploadError};
use crate::transport::{Request, Response, Transport, TransportError, send_with_timeout};
use crate::types::{UploadEvent, UploadState};

/// Drives files through the block upload / merge protocol.
pub struct UploadCoordinator {
    transport: Arc<dyn Transport>,
    config: UploadConfig,
    events_tx: Option<mpsc::Sender<UploadEvent>>,
}

impl UploadCoordinator {
    pub fn new(transport: Arc<dyn Transport>, config: UploadConfig) -> Self {
        Self {
            transport,
            config,
            events_tx: None,
        }
    }

    /// Publishes progress on `tx`. Sends never block; a full channel drops
    /// events rather than slowing the upload.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Uploads `file` and returns the merge response body verbatim.
    ///
    /// `None` fails with [`UploadError::NoFile`] before any I/O.
    pub async fn upload(
        &self,
        file: Option<&Path>,
        suffix: &str,
        base_address: &str,
    ) -> Result<serde_json::Value, UploadError> {
        self.upload_with_cancel(file, suffix, base_address, CancellationToken::new())
            .await
    }

    /// Like [`upload`](Self::upload), aborting with [`UploadError::Cancelled`]
    /// at the next digest or transmission suspension point once `cancel`
    /// fires. Outstanding block uploads are aborted.
    pub async fn upload_with_cancel(
        &self,
        file: Option<&Path>,
        suffix: &str,
        base_address: &str,
        cancel: CancellationToken,
    ) -> Result<serde_json::Value, UploadError> {
        let Some(path) = file else {
            warn!("upload requested without a file");
            self.set_state(UploadState::Failed);
            return Err(UploadError::NoFile);
        };

        let result = self.run(path, suffix, base_address, &cancel).await;
        match &result {
            Ok(_) => {
                self.set_state(UploadState::Done);
                info!(path = %path.display(), suffix, "upload completed");
            }
            Err(e) => {
                self.set_state(UploadState::Failed);
                error!(path = %path.display(), error = %e, "upload failed");
            }
        }
        result
    }

    /// Digests `file` and asks the server whether the merged object exists.
    pub async fn exists(
        &self,
        file: Option<&Path>,
        suffix: &str,
        base_address: &str,
    ) -> Result<bool, UploadError> {
        let path = file.ok_or(UploadError::NoFile)?;
        let (digest, _) = self.digest(path, &CancellationToken::new()).await?;
        self.exists_digest(digest, suffix, base_address).await
    }

    /// Asks the server whether `{digest}.{suffix}` has already been merged.
    pub async fn exists_digest(
        &self,
        digest: ContentDigest,
        suffix: &str,
        base_address: &str,
    ) -> Result<bool, UploadError> {
        let query = ExistQuery {
            md5: digest.to_hex(),
            suffix: suffix.to_string(),
        };
        let request = Request::get(endpoint_url(base_address, Endpoint::Exist)).query(query.to_pairs());
        let resp = self.control(request).await.map_err(UploadError::Exist)?;

        let parsed: ExistResponse = serde_json::from_slice(&resp.body)?;
        debug!(%digest, suffix, exists = parsed.exists, "exist check");
        Ok(parsed.exists)
    }

    async fn run(
        &self,
        path: &Path,
        suffix: &str,
        base_address: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, UploadError> {
        self.set_state(UploadState::Digesting);
        let (digest, plan) = self.digest(path, cancel).await?;
        info!(%digest, size = plan.size(), blocks = plan.count(), "digest complete");
        self.emit(UploadEvent::Digested {
            digest,
            size: plan.size(),
            blocks: plan.count(),
        });

        self.set_state(UploadState::Transmitting);
        let session = self
            .transmit(path, digest, plan, suffix, base_address, cancel)
            .await?;

        if !session.is_complete() {
            let failures = session.failures();
            warn!(
                %digest,
                failed = failures.len(),
                total = session.block_count(),
                "not merging: some blocks failed"
            );
            return Err(UploadError::Transmission {
                failures,
                total: session.block_count(),
            });
        }

        self.set_state(UploadState::Merging);
        self.merge(digest, suffix, base_address).await
    }

    /// First pass: sequential reads into one MD5 state. Dropping the digest
    /// future on cancellation stops it at its next read.
    async fn digest(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(ContentDigest, ChunkPlan), UploadError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled),
            result = digest_file_with_plan(path, self.config.chunk_size) => Ok(result?),
        }
    }

    /// Second pass: a fresh reader, one task per block, bounded by a
    /// semaphore. Returns once every block has settled.
    async fn transmit(
        &self,
        path: &Path,
        digest: ContentDigest,
        plan: ChunkPlan,
        suffix: &str,
        base_address: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadSession, UploadError> {
        let mut reader = ChunkReader::open(path, self.config.chunk_size).await?;
        if *reader.plan() != plan {
            return Err(UploadError::FileChanged);
        }

        let uploader = BlockUploader::new(
            Arc::clone(&self.transport),
            base_address,
            self.config.request_timeout(),
        );
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency()));
        let mut session = UploadSession::new(digest, suffix, plan);
        let mut speed = SpeedCalculator::default();
        // Dropping the set on an early return aborts every block still running.
        let mut tasks: JoinSet<(usize, BlockOutcome)> = JoinSet::new();

        while reader.has_more() {
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        self.settle(&mut session, &mut speed, joined)?;
                    }
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        break permit.map_err(|_| UploadError::Cancelled)?;
                    }
                }
            };

            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                result = reader.next_chunk() => result?,
            };

            session.mark_in_flight(chunk.index)?;
            debug!(%digest, block = chunk.index, bytes = chunk.data.len(), "block issued");

            let uploader = uploader.clone();
            let retry = self.config.retry.clone();
            let events_tx = self.events_tx.clone();
            tasks.spawn(async move {
                let outcome = upload_with_retry(
                    &uploader,
                    &retry,
                    digest,
                    chunk.index,
                    &chunk.data,
                    events_tx.as_ref(),
                    permit,
                )
                .await;
                (chunk.index, outcome)
            });
        }

        // Barrier: every issued block must settle before the merge gate.
        while !tasks.is_empty() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                Some(joined) = tasks.join_next() => {
                    self.settle(&mut session, &mut speed, joined)?;
                }
            }
        }

        Ok(session)
    }

    fn settle(
        &self,
        session: &mut UploadSession,
        speed: &mut SpeedCalculator,
        joined: Result<(usize, BlockOutcome), JoinError>,
    ) -> Result<(), UploadError> {
        let (index, outcome) = joined.map_err(|e| UploadError::Task(e.to_string()))?;
        let acknowledged = outcome.is_acknowledged();

        match &outcome {
            BlockOutcome::Acknowledged => {
                let bytes = session.plan().range(index).map(|r| r.len()).unwrap_or(0);
                speed.add_sample(bytes);
            }
            BlockOutcome::Failed(failure) => {
                warn!(digest = %session.digest(), block = index, error = %failure, "block failed");
            }
        }
        session.record(index, outcome)?;

        let remaining = session.plan().size() - session.acknowledged_bytes();
        self.emit(UploadEvent::BlockSettled {
            index,
            acknowledged,
            settled: session.settled_count(),
            total: session.block_count(),
            bytes_per_second: speed.bytes_per_second(),
            eta: speed.eta(remaining),
        });
        Ok(())
    }

    async fn merge(
        &self,
        digest: ContentDigest,
        suffix: &str,
        base_address: &str,
    ) -> Result<serde_json::Value, UploadError> {
        let form = MergeRequest {
            md5: digest.to_hex(),
            suffix: suffix.to_string(),
        };
        let request = Request::post(endpoint_url(base_address, Endpoint::Merge)).form(form.to_pairs());
        let resp = self.control(request).await.map_err(UploadError::Merge)?;

        info!(%digest, suffix, "merge accepted");
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&resp.body)?)
    }

    /// Sends a merge / exist request and classifies the outcome.
    async fn control(&self, request: Request) -> Result<Response, RequestFailure> {
        match send_with_timeout(self.transport.as_ref(), request, self.config.request_timeout())
            .await
        {
            Ok(resp) if resp.is_success() => Ok(resp),
            Ok(resp) => Err(RequestFailure::Rejected {
                status: resp.status,
                body: resp.text(),
            }),
            Err(TransportError::Timeout(_)) => Err(RequestFailure::Timeout),
            Err(e) => Err(RequestFailure::Transport(e.to_string())),
        }
    }

    fn set_state(&self, state: UploadState) {
        debug!(%state, "upload state");
        self.emit(UploadEvent::StateChanged(state));
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Sends one block, retrying per `policy`. Holds `permit` for the whole
/// sequence so retries count against the concurrency bound.
async fn upload_with_retry(
    uploader: &BlockUploader,
    policy: &RetryPolicy,
    digest: ContentDigest,
    index: usize,
    data: &[u8],
    events_tx: Option<&mpsc::Sender<UploadEvent>>,
    _permit: OwnedSemaphorePermit,
) -> BlockOutcome {
    let mut attempt = 1;
    loop {
        let outcome = uploader.upload_block(digest, index, data).await;
        let BlockOutcome::Failed(failure) = &outcome else {
            return outcome;
        };
        if !policy.should_retry(attempt, failure) {
            return outcome;
        }

        let delay = policy.backoff(attempt);
        warn!(block = index, attempt, ?delay, error = %failure, "retrying block");
        if let Some(tx) = events_tx {
            let _ = tx.try_send(UploadEvent::Retrying {
                index,
                attempt,
                delay,
            });
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
