//! HTTP(S) waiter — a GET against the target URL must answer 2xx.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use crate::error::{WaitError, WaitResult};
use crate::target::ResolvedTarget;
use crate::waiter::Waiter;

const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str = concat!("waitfor/", env!("CARGO_PKG_VERSION"));

/// Waits for an HTTP endpoint to answer a successful status.
pub struct HttpWaiter {
    url: Url,
    timeout: Duration,
    insecure: bool,
    response: Option<reqwest::Response>,
}

impl HttpWaiter {
    pub fn new(target: &ResolvedTarget) -> Self {
        Self {
            url: target.url.clone(),
            timeout: target.timeout,
            insecure: target.insecure,
            response: None,
        }
    }
}

#[async_trait]
impl Waiter for HttpWaiter {
    async fn connect(&mut self) -> WaitResult<()> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(self.insecure)
            .build()
            .map_err(|e| WaitError::Protocol(e.to_string()))?;

        // Credentials ride in the URL userinfo; strip them from the
        // request URL and send them as basic auth instead.
        let mut url = self.url.clone();
        let username = url.username().to_string();
        let password = url.password().map(str::to_string);
        if !username.is_empty() {
            let _ = url.set_username("");
            let _ = url.set_password(None);
        }

        let mut request = client.get(url).header(ACCEPT, "*/*");
        if !username.is_empty() {
            request = request.basic_auth(username, password);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                WaitError::Timeout
            } else {
                WaitError::Protocol(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WaitError::Protocol(format!("unexpected status: {status}")));
        }

        debug!(url = %self.url, %status, "http endpoint answered");
        self.response = Some(response);
        Ok(())
    }

    async fn run_test(&mut self) -> WaitResult<()> {
        // No existence semantics for HTTP; a successful response is the test.
        Ok(())
    }

    async fn cancel(&mut self) -> WaitResult<()> {
        // Dropping the response releases the connection.
        self.response.take();
        Ok(())
    }
}
