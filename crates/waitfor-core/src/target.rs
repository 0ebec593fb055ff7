//! Target orchestration — the bounded-time, bounded-retry attempt loop.
//!
//! A [`Target`] owns one wait operation: it resolves the configured
//! address once, then repeatedly drives a fresh waiter through the
//! connect/test/cancel lifecycle, racing each attempt against the
//! per-attempt timeout and pausing between attempts.

use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};
use url::{Position, Url};

use crate::error::{WaitError, WaitResult};
use crate::hostport::split_host_port;
use crate::registry::Registry;
use crate::waiter::Waiter;

/// Immutable wait configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint URI to wait on.
    pub address: String,
    /// Maximum time per attempt. Must be non-zero.
    pub timeout: Duration,
    /// Retries after the first failure; -1 retries forever.
    pub retries: i64,
    /// Lower bound between the starts of consecutive attempts.
    pub retry_delay: Duration,
    /// Optional existence check: a key for redis, a table for databases.
    pub exists: Option<String>,
    /// Skip TLS certificate validation.
    pub insecure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: String::new(),
            timeout: Duration::from_secs(5),
            retries: 5,
            retry_delay: Duration::from_secs(1),
            exists: None,
            insecure: false,
        }
    }
}

/// The parsed, dispatch-ready form of a [`Config`], produced once per
/// wait operation and immutable thereafter.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// The parsed endpoint address.
    pub url: Url,
    /// Host extracted from the authority.
    pub host: String,
    /// Port extracted from the authority; 0 when absent.
    pub port: u16,
    /// Per-attempt deadline, for waiters that manage their own I/O timeouts.
    pub timeout: Duration,
    /// Optional existence check item.
    pub exists: Option<String>,
    /// Skip TLS certificate validation.
    pub insecure: bool,
}

/// A waitable endpoint.
pub struct Target {
    config: Config,
    registry: Registry,
    elapsed: Option<Duration>,
}

impl Target {
    /// Create a target using the built-in scheme registry.
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, Registry::with_defaults())
    }

    /// Create a target with a caller-supplied registry.
    pub fn with_registry(config: Config, registry: Registry) -> Self {
        Self {
            config,
            registry,
            elapsed: None,
        }
    }

    /// Wall-clock time from the start of [`Target::wait`] to its terminal
    /// outcome. Observability only; never consulted for control decisions.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Block until the endpoint is reachable and the optional existence
    /// check passes, the retry budget is exhausted, or cleanup fails.
    pub async fn wait(&mut self) -> WaitResult<()> {
        let started = Instant::now();
        let result = self.run().await;
        self.elapsed = Some(started.elapsed());
        result
    }

    /// Validate the configuration and derive the resolved target. Any
    /// error here aborts the wait before network activity and is never
    /// retried.
    fn resolve(&self) -> WaitResult<ResolvedTarget> {
        if self.config.address.is_empty() {
            return Err(WaitError::MalformedAddress("empty address".to_string()));
        }
        if self.config.timeout.is_zero() {
            return Err(WaitError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.config.retries < -1 {
            return Err(WaitError::InvalidConfig(format!(
                "retries must be >= -1, got {}",
                self.config.retries
            )));
        }

        let url = Url::parse(&self.config.address).map_err(|e| {
            WaitError::MalformedAddress(format!("{}: {e}", self.config.address))
        })?;
        let (host, port) = split_host_port(&url[Position::BeforeHost..Position::AfterPort])?;

        Ok(ResolvedTarget {
            url,
            host,
            port,
            timeout: self.config.timeout,
            exists: self.config.exists.clone(),
            insecure: self.config.insecure,
        })
    }

    async fn run(&self) -> WaitResult<()> {
        let target = self.resolve()?;

        // Unknown schemes fail here, before the first attempt.
        if !self.registry.supports(target.url.scheme()) {
            return Err(WaitError::InvalidScheme(target.url.scheme().to_string()));
        }

        let mut remaining = normalize_retries(self.config.retries);
        let mut attempt: u64 = 1;

        loop {
            let attempt_start = Instant::now();

            // Fresh waiter per attempt: a lingering future from a prior
            // attempt must never share a connection handle with this one.
            let mut waiter = self.registry.create(&target)?;

            let last = match timeout(self.config.timeout, drive(waiter.as_mut())).await {
                Ok(Ok(())) => {
                    debug!(address = %self.config.address, attempt, "endpoint ready");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    warn!(address = %self.config.address, attempt, %err, "attempt failed");
                    cancel(waiter.as_mut()).await?;
                    err
                }
                Err(_) => {
                    // The attempt future has been dropped, which stops its
                    // in-flight I/O; cancel releases what connect acquired.
                    warn!(
                        address = %self.config.address,
                        attempt,
                        timeout = ?self.config.timeout,
                        "attempt timed out"
                    );
                    cancel(waiter.as_mut()).await?;
                    WaitError::Timeout
                }
            };

            if remaining == 0 {
                warn!(address = %self.config.address, last = %last, "retries exhausted");
                return Err(WaitError::RetriesExhausted(Box::new(last)));
            }
            remaining -= 1;
            attempt += 1;

            // The retry delay bounds the spacing between attempt starts;
            // time already spent in the failed attempt counts toward it.
            let pause = self.config.retry_delay.saturating_sub(attempt_start.elapsed());
            if !pause.is_zero() {
                sleep(pause).await;
            }
        }
    }
}

/// One attempt: connect, then the optional existence check.
async fn drive(waiter: &mut dyn Waiter) -> WaitResult<()> {
    waiter.connect().await?;
    waiter.run_test().await
}

/// Release the attempt's resources. Failure is terminal for the whole
/// wait; the caller decides what to do with the process.
async fn cancel(waiter: &mut dyn Waiter) -> WaitResult<()> {
    waiter
        .cancel()
        .await
        .map_err(|e| WaitError::CancelFailed(e.to_string()))
}

/// Normalize the -1 "retry forever" sentinel into a finite counter so one
/// decrement-and-check loop serves both cases. u64::MAX attempts is
/// unlimited as a configuration matter, not a mathematical guarantee.
fn normalize_retries(retries: i64) -> u64 {
    if retries < 0 { u64::MAX } else { retries as u64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    #[derive(Clone, Copy)]
    enum Behavior {
        /// Connect succeeds immediately.
        Succeed,
        /// Connect fails immediately with a protocol error.
        Fail,
        /// Connect fails for the first `n` attempts, then succeeds.
        FailUntil(usize),
        /// Connect blocks far past any test timeout.
        Block,
    }

    /// Scripted waiter that counts connects and cancels.
    struct MockWaiter {
        behavior: Behavior,
        cancel_fails: bool,
        connects: Arc<AtomicUsize>,
        cancels: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Waiter for MockWaiter {
        async fn connect(&mut self) -> WaitResult<()> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            match self.behavior {
                Behavior::Succeed => Ok(()),
                Behavior::Fail => Err(WaitError::Protocol("connection refused".to_string())),
                Behavior::FailUntil(limit) if n <= limit => {
                    Err(WaitError::Protocol("connection refused".to_string()))
                }
                Behavior::FailUntil(_) => Ok(()),
                Behavior::Block => {
                    sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }

        async fn run_test(&mut self) -> WaitResult<()> {
            Ok(())
        }

        async fn cancel(&mut self) -> WaitResult<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            if self.cancel_fails {
                Err(WaitError::Protocol("close failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct Counters {
        connects: Arc<AtomicUsize>,
        cancels: Arc<AtomicUsize>,
    }

    fn mock_target(config: Config, behavior: Behavior, cancel_fails: bool) -> (Target, Counters) {
        let connects = Arc::new(AtomicUsize::new(0));
        let cancels = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::empty();
        let (connects_in, cancels_in) = (connects.clone(), cancels.clone());
        registry.register("mock", move |_| {
            Box::new(MockWaiter {
                behavior,
                cancel_fails,
                connects: connects_in.clone(),
                cancels: cancels_in.clone(),
            })
        });
        (
            Target::with_registry(config, registry),
            Counters { connects, cancels },
        )
    }

    fn mock_config() -> Config {
        Config {
            address: "mock://localhost".to_string(),
            timeout: Duration::from_millis(200),
            retries: 2,
            retry_delay: Duration::from_millis(50),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn empty_address_fails_before_any_attempt() {
        let config = Config {
            address: String::new(),
            ..mock_config()
        };
        let (mut target, counters) = mock_target(config, Behavior::Succeed, false);
        let err = target.wait().await.unwrap_err();
        assert!(matches!(err, WaitError::MalformedAddress(_)));
        assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_scheme_fails_before_any_attempt() {
        let config = Config {
            address: "htp://w.com".to_string(),
            ..mock_config()
        };
        let (mut target, counters) = mock_target(config, Behavior::Succeed, false);
        let err = target.wait().await.unwrap_err();
        assert!(matches!(err, WaitError::InvalidScheme(scheme) if scheme == "htp"));
        assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_timeout_is_rejected() {
        let config = Config {
            timeout: Duration::ZERO,
            ..mock_config()
        };
        let (mut target, _) = mock_target(config, Behavior::Succeed, false);
        let err = target.wait().await.unwrap_err();
        assert!(matches!(err, WaitError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn retries_below_minus_one_are_rejected() {
        let config = Config {
            retries: -5,
            ..mock_config()
        };
        let (mut target, _) = mock_target(config, Behavior::Succeed, false);
        let err = target.wait().await.unwrap_err();
        assert!(matches!(err, WaitError::InvalidConfig(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_success_takes_one_attempt() {
        let (mut target, counters) = mock_target(mock_config(), Behavior::Succeed, false);
        target.wait().await.unwrap();
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 0);
        assert!(target.elapsed().unwrap() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn n_retries_mean_n_plus_one_attempts() {
        let config = Config {
            retries: 3,
            ..mock_config()
        };
        let (mut target, counters) = mock_target(config, Behavior::Fail, false);
        let err = target.wait().await.unwrap_err();
        assert_eq!(counters.connects.load(Ordering::SeqCst), 4);
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 4);
        match err {
            WaitError::RetriesExhausted(inner) => {
                assert!(matches!(*inner, WaitError::Protocol(_)))
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_connect_times_out_and_cancels() {
        let config = Config {
            retries: 0,
            ..mock_config()
        };
        let (mut target, counters) = mock_target(config, Behavior::Block, false);
        let err = target.wait().await.unwrap_err();
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
        match err {
            WaitError::RetriesExhausted(inner) => assert!(matches!(*inner, WaitError::Timeout)),
            other => panic!("expected RetriesExhausted(Timeout), got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unlimited_retries_never_exhaust() {
        let config = Config {
            retries: -1,
            ..mock_config()
        };
        let (mut target, counters) = mock_target(config, Behavior::FailUntil(7), false);
        target.wait().await.unwrap();
        assert_eq!(counters.connects.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_delay_spaces_attempt_starts() {
        // Two failures cost two inter-attempt pauses of 50ms each; the
        // failing connects themselves take no time under the paused clock.
        let config = Config {
            retries: 2,
            ..mock_config()
        };
        let (mut target, _) = mock_target(config, Behavior::Fail, false);
        let started = Instant::now();
        let _ = target.wait().await;
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempt_absorbs_the_retry_delay() {
        // Each attempt burns the full 200ms timeout, well past the 50ms
        // delay, so no extra sleep happens between attempts.
        let config = Config {
            retries: 1,
            ..mock_config()
        };
        let (mut target, _) = mock_target(config, Behavior::Block, false);
        let started = Instant::now();
        let _ = target.wait().await;
        let total = started.elapsed();
        assert!(total >= Duration::from_millis(400));
        assert!(total < Duration::from_millis(450));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_failure_is_terminal() {
        let (mut target, counters) = mock_target(mock_config(), Behavior::Fail, true);
        let err = target.wait().await.unwrap_err();
        assert!(matches!(err, WaitError::CancelFailed(_)));
        // No retry happens after a failed cancel.
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_sentinel_normalizes_to_a_large_finite_counter() {
        assert_eq!(normalize_retries(-1), u64::MAX);
        assert_eq!(normalize_retries(0), 0);
        assert_eq!(normalize_retries(5), 5);
    }

    #[test]
    fn resolve_extracts_host_and_port() {
        let config = Config {
            address: "mock://foo.com:8080/path".to_string(),
            ..mock_config()
        };
        let (target, _) = mock_target(config, Behavior::Succeed, false);
        let resolved = target.resolve().unwrap();
        assert_eq!(resolved.host, "foo.com");
        assert_eq!(resolved.port, 8080);
        assert_eq!(resolved.url.scheme(), "mock");
    }

    #[test]
    fn resolve_rejects_ipv6_literals() {
        let config = Config {
            address: "mock://[2a02:1788:4fd:cd::c742:cde2]/".to_string(),
            ..mock_config()
        };
        let (target, _) = mock_target(config, Behavior::Succeed, false);
        let err = target.resolve().unwrap_err();
        assert!(matches!(err, WaitError::MalformedAddress(_)));
    }
}
