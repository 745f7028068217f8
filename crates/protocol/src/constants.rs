use std::time::Duration;

/// Default block size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default deadline for a single request (block upload, merge, exist).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Multipart / form field carrying the hex content digest.
pub const FIELD_DIGEST: &str = "md5";

/// Multipart field carrying the zero-based block index.
pub const FIELD_BLOCK: &str = "block";

/// Multipart field carrying the raw block bytes.
pub const FIELD_FILE: &str = "file";

/// Form field carrying the extension hint for the assembled object.
pub const FIELD_SUFFIX: &str = "suffix";

/// File name attached to the `file` part.
///
/// Servers written against browser uploads see `blob` for sliced files,
/// so we send the same.
pub const BLOB_FILE_NAME: &str = "blob";

/// Server routes used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `POST` one block as multipart.
    Upload,
    /// `POST` the url-encoded merge request.
    Merge,
    /// `GET` whether an object already exists.
    Exist,
}

impl Endpoint {
    /// Path relative to the service base address.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Upload => "/file/upload",
            Endpoint::Merge => "/file/merge",
            Endpoint::Exist => "/file/exist",
        }
    }
}

/// Joins `base` and the endpoint path, tolerating a trailing slash on `base`.
pub fn endpoint_url(base: &str, endpoint: Endpoint) -> String {
    format!("{}{}", base.trim_end_matches('/'), endpoint.path())
}
