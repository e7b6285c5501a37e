//! Tiny, unassuming HTTP client for remote-write delivery.

use crate::constants;
use crate::sink::{PushError, Transport};
use crate::util::truncate;
use std::time::Duration;

/// Blocking HTTP client posting remote-write bodies to one endpoint.
///
/// Every request carries the remote-write headers and is bounded by a fixed
/// timeout. Redirects are not followed; anything outside 2xx is a failure.
pub struct Client {
    agent: ureq::Agent,
    url: String,
}

impl Client {
    /// Create a client for `url` with a per-request `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Client {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(0)
            .user_agent(concat!("powerpush/", env!("CARGO_PKG_VERSION")))
            .build();
        Client {
            agent,
            url: url.to_string(),
        }
    }

    /// The endpoint posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for Client {
    fn post(&mut self, body: &[u8]) -> Result<(), PushError> {
        let res = self
            .agent
            .post(&self.url)
            .set("Content-Encoding", constants::CONTENT_ENCODING)
            .set("Content-Type", constants::CONTENT_TYPE)
            .set(
                constants::REMOTE_WRITE_VERSION_HEADER,
                constants::REMOTE_WRITE_VERSION,
            )
            .send_bytes(body);
        match res {
            Ok(resp) => {
                let code = resp.status();
                if (200..300).contains(&code) {
                    trace!("{} answered {}", self.url, code);
                    Ok(())
                } else {
                    Err(status_error(code, resp))
                }
            }
            Err(ureq::Error::Status(code, resp)) => Err(status_error(code, resp)),
            Err(ureq::Error::Transport(t)) => Err(PushError::Transport(t.to_string())),
        }
    }
}

fn status_error(code: u16, resp: ureq::Response) -> PushError {
    let body = resp.into_string().unwrap_or_default();
    PushError::Status {
        code,
        body: truncate(&body, constants::RESPONSE_LOG_LIMIT).to_string(),
    }
}
