//! Library level constants

/// Header naming the remote-write protocol version.
pub const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";
/// The remote-write protocol version spoken.
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";
/// Body compression of a remote-write request.
pub const CONTENT_ENCODING: &str = "snappy";
/// Body type of a remote-write request.
pub const CONTENT_TYPE: &str = "application/x-protobuf";

/// Longest piece of a failed push's response body that is logged.
pub const RESPONSE_LOG_LIMIT: usize = 500;
