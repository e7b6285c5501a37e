//! The tail of the pipeline: batching and delivery.

use crate::protocols::remote_write::WireError;
use std::error;
use std::fmt;

mod backlog;
mod remote_write;

pub use self::backlog::{Backlog, BACKLOG_EVICTED_SAMPLES};
pub use self::remote_write::{
    CycleReport, RemoteWrite, RemoteWriteConfig, SINK_DELIVERED_SAMPLES, SINK_PUSH_FAILURE,
    SINK_PUSH_SUCCESS,
};

/// Why a batch could not be delivered.
#[derive(Debug)]
pub enum PushError {
    /// The batch could not be encoded.
    Wire(WireError),
    /// The request never got an answer: connection refused, timeout, DNS.
    Transport(String),
    /// The endpoint answered outside 2xx. `body` is the start of its
    /// response.
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, truncated.
        body: String,
    },
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PushError::Wire(ref e) => write!(f, "encoding failed: {}", e),
            PushError::Transport(ref e) => write!(f, "transport error: {}", e),
            PushError::Status { code, ref body } => write!(f, "HTTP {}: {}", code, body),
        }
    }
}

impl error::Error for PushError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            PushError::Wire(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<WireError> for PushError {
    fn from(e: WireError) -> PushError {
        PushError::Wire(e)
    }
}

/// Delivery of one encoded remote-write body.
pub trait Transport {
    /// Deliver `body`. Only a 2xx answer is success.
    fn post(&mut self, body: &[u8]) -> Result<(), PushError>;
}
