//! Single-attempt upload of one block.

use std::sync::Arc;
use std::time::Duration;

use chunkup_protocol::constants::{BLOB_FILE_NAME, FIELD_FILE};
use chunkup_protocol::{BlockFields, Endpoint, endpoint_url};
use chunkup_transfer::{BlockFailure, BlockOutcome, ContentDigest};
use tracing::debug;

use crate::transport::{Part, Request, Transport, TransportError, send_with_timeout};

/// Packages a block with its session metadata and classifies the outcome.
#[derive(Clone)]
pub struct BlockUploader {
    transport: Arc<dyn Transport>,
    url: String,
    timeout: Duration,
}

impl BlockUploader {
    /// Uploads to `{base_address}/file/upload` with `timeout` per attempt.
    pub fn new(transport: Arc<dyn Transport>, base_address: &str, timeout: Duration) -> Self {
        Self {
            transport,
            url: endpoint_url(base_address, Endpoint::Upload),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Builds the multipart request `{md5, block, file}`.
    pub fn request(&self, digest: ContentDigest, index: usize, data: &[u8]) -> Request {
        let fields = BlockFields {
            md5: digest.to_hex(),
            block: index,
        };
        let mut parts: Vec<Part> = fields
            .to_pairs()
            .into_iter()
            .map(|(name, value)| Part::Text { name, value })
            .collect();
        parts.push(Part::Bytes {
            name: FIELD_FILE.to_string(),
            file_name: BLOB_FILE_NAME.to_string(),
            data: data.to_vec(),
        });
        Request::post(self.url.clone()).multipart(parts)
    }

    /// Sends one block once.
    pub async fn upload_block(
        &self,
        digest: ContentDigest,
        index: usize,
        data: &[u8],
    ) -> BlockOutcome {
        let request = self.request(digest, index, data);
        let result = send_with_timeout(self.transport.as_ref(), request, self.timeout).await;

        let outcome = match result {
            Ok(resp) if resp.is_success() => BlockOutcome::Acknowledged,
            Ok(resp) => BlockOutcome::Failed(BlockFailure::ServerRejected {
                index,
                status: resp.status,
                body: resp.text(),
            }),
            Err(TransportError::Timeout(_)) => BlockOutcome::Failed(BlockFailure::Timeout { index }),
            Err(e) => BlockOutcome::Failed(BlockFailure::Transport {
                index,
                message: e.to_string(),
            }),
        };

        debug!(block = index, bytes = data.len(), ?outcome, "block attempt settled");
        outcome
    }
}
