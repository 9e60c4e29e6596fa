//! HTTP transport to the machine firmware

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use reqwest::blocking::{Client, RequestBuilder};
use std::time::Duration;

use super::{LinkError, MachineLink};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Link to a machine reachable over HTTP.
pub struct HttpLink {
    address: String,

    client: Client,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HttpLink {
    /// Create a new link to the machine at `address` (host or `host:port`, without a scheme).
    ///
    /// No request is made until the first command is sent.
    pub fn new(address: &str) -> Result<Self, LinkError> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| LinkError::Client(e.to_string()))?;

        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("http://{}{}", self.address, endpoint)
    }

    fn execute(
        &self,
        url: &str,
        mut request: RequestBuilder,
        timeout: Option<Duration>,
    ) -> Result<String, LinkError> {
        if let Some(t) = timeout {
            request = request.timeout(t);
        }

        let response = request.send().map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().map_err(|e| {
            if e.is_timeout() {
                LinkError::Timeout(url.to_string())
            } else {
                LinkError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

impl MachineLink for HttpLink {
    fn send_gcode(&mut self, code: &str, timeout: Option<Duration>) -> Result<String, LinkError> {
        let url = self.url("/machine/code");
        trace!("POST {} {:?}", url, code);

        let request = self.client.post(&url).body(code.to_string());
        self.execute(&url, request, timeout)
    }

    fn download_file(&mut self, path: &str, timeout: Option<Duration>) -> Result<String, LinkError> {
        let url = self.url(&format!("/machine/file{}", path));
        trace!("GET {}", url);

        let request = self.client.get(&url);
        self.execute(&url, request, timeout)
    }

    fn address(&self) -> &str {
        &self.address
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn map_reqwest_error(url: &str, e: reqwest::Error) -> LinkError {
    if e.is_timeout() {
        LinkError::Timeout(url.to_string())
    } else {
        LinkError::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}
