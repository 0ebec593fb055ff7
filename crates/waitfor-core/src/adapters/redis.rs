//! Redis waiter — RESP over a plain TCP stream.
//!
//! Only four commands are ever issued (`AUTH`, `PING`, `SELECT`,
//! `EXISTS`) and every one of them answers in a single RESP line, so the
//! waiter speaks the protocol directly instead of pulling in a client
//! crate.
//!
//! ```text
//! Client → Server:  *1\r\n$4\r\nPING\r\n
//! Server → Client:  +PONG\r\n
//! ```

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{WaitError, WaitResult};
use crate::target::ResolvedTarget;
use crate::waiter::Waiter;

const DEFAULT_PORT: u16 = 6379;

/// Database index embedded in the URL path, e.g. `redis://host/7`.
static DB_INDEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/(\d{1,2})$").unwrap());

/// A single-line RESP reply.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Simple(String),
    Integer(i64),
}

/// Waits for a redis server to answer PING, optionally checking a key.
pub struct RedisWaiter {
    host: String,
    port: u16,
    timeout: Duration,
    /// The userinfo slot of a redis URL carries the AUTH password.
    password: Option<String>,
    db_index: Option<String>,
    exists: Option<String>,
    stream: Option<BufReader<TcpStream>>,
}

impl RedisWaiter {
    pub fn new(target: &ResolvedTarget) -> Self {
        let username = target.url.username();
        Self {
            host: target.host.clone(),
            port: if target.port == 0 { DEFAULT_PORT } else { target.port },
            timeout: target.timeout,
            password: (!username.is_empty()).then(|| username.to_string()),
            db_index: DB_INDEX
                .captures(target.url.path())
                .map(|caps| caps[1].to_string()),
            exists: target.exists.clone(),
            stream: None,
        }
    }

    /// Send one command and read its single-line reply.
    async fn command(&mut self, args: &[&str]) -> WaitResult<Reply> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| WaitError::Protocol("not connected".to_string()))?;

        stream
            .get_mut()
            .write_all(&encode_command(args))
            .await
            .map_err(|e| WaitError::Protocol(e.to_string()))?;

        let mut line = String::new();
        let n = stream
            .read_line(&mut line)
            .await
            .map_err(|e| WaitError::Protocol(e.to_string()))?;
        if n == 0 {
            return Err(WaitError::Protocol("server closed the connection".to_string()));
        }
        parse_reply(line.trim_end_matches(['\r', '\n']))
    }
}

#[async_trait]
impl Waiter for RedisWaiter {
    async fn connect(&mut self) -> WaitResult<()> {
        let stream = tokio::time::timeout(
            self.timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| WaitError::Timeout)?
        .map_err(|e| WaitError::Protocol(format!("connect {}:{}: {e}", self.host, self.port)))?;
        self.stream = Some(BufReader::new(stream));

        if let Some(password) = self.password.clone() {
            match self.command(&["AUTH", &password]).await? {
                Reply::Simple(ok) if ok == "OK" => {}
                other => {
                    return Err(WaitError::Protocol(format!(
                        "unexpected AUTH reply: {other:?}"
                    )));
                }
            }
        }

        match self.command(&["PING"]).await? {
            Reply::Simple(pong) if pong == "PONG" => {
                debug!(host = %self.host, port = self.port, "redis answered PING");
                Ok(())
            }
            other => Err(WaitError::Protocol(format!(
                "unexpected PING reply: {other:?}"
            ))),
        }
    }

    async fn run_test(&mut self) -> WaitResult<()> {
        let Some(key) = self.exists.clone() else {
            return Ok(());
        };

        let mut db = "0".to_string();
        if let Some(index) = self.db_index.clone() {
            match self.command(&["SELECT", &index]).await? {
                Reply::Simple(ok) if ok == "OK" => db = index,
                other => {
                    return Err(WaitError::Protocol(format!(
                        "unexpected SELECT reply: {other:?}"
                    )));
                }
            }
        }

        match self.command(&["EXISTS", &key]).await? {
            Reply::Integer(count) if count > 0 => Ok(()),
            Reply::Integer(_) => Err(WaitError::Protocol(format!(
                "redis key {key:?} does not exist in db {db}"
            ))),
            other => Err(WaitError::Protocol(format!(
                "unexpected EXISTS reply: {other:?}"
            ))),
        }
    }

    async fn cancel(&mut self) -> WaitResult<()> {
        if let Some(mut stream) = self.stream.take() {
            // Best-effort: the endpoint may already be gone.
            let _ = stream.get_mut().shutdown().await;
        }
        Ok(())
    }
}

/// Encode a command as a RESP array of bulk strings.
fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Parse a single-line RESP reply. Error replies become protocol errors;
/// bulk and array replies never occur for the commands this waiter sends.
fn parse_reply(line: &str) -> WaitResult<Reply> {
    if let Some(rest) = line.strip_prefix('+') {
        Ok(Reply::Simple(rest.to_string()))
    } else if let Some(rest) = line.strip_prefix('-') {
        Err(WaitError::Protocol(rest.to_string()))
    } else if let Some(rest) = line.strip_prefix(':') {
        rest.parse()
            .map(Reply::Integer)
            .map_err(|_| WaitError::Protocol(format!("bad integer reply: {line:?}")))
    } else {
        Err(WaitError::Protocol(format!("unexpected reply: {line:?}")))
    }
}
