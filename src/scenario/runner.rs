//! Executes a single disconnect scenario against a server.

use std::time::{Duration, Instant};

use reqwest::{RequestBuilder, Url, header};
use serde_json::Value;
use tokio::{sync::oneshot, task::JoinError};
use tracing::{debug, info, warn};

use super::{
    DisconnectSignal,
    ScenarioDescriptor,
    ScenarioError,
    ScenarioOutcome,
    ScenarioTermination,
    Strategy,
};
use crate::{metrics, panic::format_panic};

/// `Accept` header that makes the server answer with an event stream.
pub const STREAMING_ACCEPT: &str = "application/json, text/event-stream";

/// Client timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Overall deadline of the immediate strategy.
    pub immediate_deadline: Duration,
    /// Request timeout of every other strategy.
    pub request_timeout: Duration,
    /// How long the cancel-during-read task may read the body before it is
    /// aborted. Counted from the arrival of the response head.
    pub cancel_after: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            immediate_deadline: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            cancel_after: Duration::from_millis(1),
        }
    }
}

/// Runs [`ScenarioDescriptor`]s against one endpoint.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    client: reqwest::Client,
    endpoint: Url,
    config: RunnerConfig,
}

type Step = (Option<u16>, ScenarioTermination);

impl ScenarioRunner {
    /// Runner with default timings.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Transport`] if the HTTP client cannot be built.
    pub fn new(endpoint: Url) -> Result<Self, ScenarioError> {
        Self::with_config(endpoint, RunnerConfig::default())
    }

    /// Runner with custom timings.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Transport`] if the HTTP client cannot be built.
    pub fn with_config(endpoint: Url, config: RunnerConfig) -> Result<Self, ScenarioError> {
        // Abandoned responses must not leave half-read connections in the pool.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url { &self.endpoint }

    #[must_use]
    pub fn config(&self) -> RunnerConfig { self.config }

    /// Run `descriptor` once.
    ///
    /// Never fails: transport problems are folded into the outcome as
    /// anomalies.
    pub async fn run(&self, descriptor: &ScenarioDescriptor) -> ScenarioOutcome {
        let started = Instant::now();
        let payload = &descriptor.request_payload;
        let (status, termination) = match descriptor.strategy {
            Strategy::Immediate => self.immediate(payload).await,
            Strategy::DelayedMs(ms) => self.delayed(payload, Duration::from_millis(ms)).await,
            Strategy::CancelDuringRead => self.cancel_during_read(payload).await,
            Strategy::AbortDuringHandshake => self.abort_during_handshake(payload).await,
        };
        let outcome = ScenarioOutcome {
            name: descriptor.name.clone(),
            strategy: descriptor.strategy,
            status,
            termination,
            elapsed: started.elapsed(),
        };
        record(&outcome);
        outcome
    }

    fn request(&self, payload: &Value, timeout: Duration) -> RequestBuilder {
        self.client
            .post(self.endpoint.clone())
            .header(header::ACCEPT, STREAMING_ACCEPT)
            .json(payload)
            .timeout(timeout)
    }

    async fn immediate(&self, payload: &Value) -> Step {
        let deadline = self.config.immediate_deadline;
        match tokio::time::timeout(deadline, self.request(payload, deadline).send()).await {
            Err(_) => (None, ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Timeout)),
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                drop(response);
                (
                    Some(status),
                    ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Closed),
                )
            }
            Ok(Err(err)) => (None, request_failed(err)),
        }
    }

    async fn delayed(&self, payload: &Value, delay: Duration) -> Step {
        match self.request(payload, self.config.request_timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                tokio::time::sleep(delay).await;
                drop(response);
                (
                    Some(status),
                    ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Closed),
                )
            }
            Err(err) => (None, request_failed(err)),
        }
    }

    async fn cancel_during_read(&self, payload: &Value) -> Step {
        let request = self.request(payload, self.config.request_timeout);
        let (head_tx, head_rx) = oneshot::channel();
        let mut task = tokio::spawn(async move {
            let mut response = request.send().await?;
            let _ = head_tx.send(response.status().as_u16());
            while response.chunk().await?.is_some() {}
            Ok::<_, reqwest::Error>(())
        });

        // The cancel window opens once the head has arrived.
        let status = head_rx.await.ok();
        let joined = if status.is_none() {
            task.await
        } else {
            match tokio::time::timeout(self.config.cancel_after, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    debug!("aborting reader task");
                    task.abort();
                    task.await
                }
            }
        };
        let termination = match joined {
            Ok(Ok(())) => ScenarioTermination::Completed,
            Ok(Err(err)) => request_failed(err),
            Err(err) => join_failed(err),
        };
        (status, termination)
    }

    async fn abort_during_handshake(&self, payload: &Value) -> Step {
        match self.request(payload, self.config.request_timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                drop(response);
                (
                    Some(status),
                    ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Closed),
                )
            }
            Err(err) => (None, request_failed(err)),
        }
    }
}

/// Client timeouts are one of the expected ways to disconnect.
fn request_failed(err: reqwest::Error) -> ScenarioTermination {
    if err.is_timeout() {
        ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Timeout)
    } else {
        ScenarioTermination::Anomaly(err.into())
    }
}

fn join_failed(err: JoinError) -> ScenarioTermination {
    if err.is_cancelled() {
        return ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Cancelled);
    }
    match err.try_into_panic() {
        Ok(payload) => ScenarioTermination::Anomaly(ScenarioError::Panicked(
            format_panic(payload.as_ref()).to_string(),
        )),
        Err(err) => ScenarioTermination::Anomaly(ScenarioError::Panicked(err.to_string())),
    }
}

fn record(outcome: &ScenarioOutcome) {
    metrics::inc_scenarios(outcome.termination.label());
    match &outcome.termination {
        ScenarioTermination::Anomaly(err) => warn!(
            scenario = %outcome.name,
            strategy = %outcome.strategy,
            status = ?outcome.status,
            elapsed = ?outcome.elapsed,
            error = %err,
            "scenario ended unexpectedly"
        ),
        termination => info!(
            scenario = %outcome.name,
            strategy = %outcome.strategy,
            status = ?outcome.status,
            elapsed = ?outcome.elapsed,
            termination = termination.label(),
            signal = ?outcome.signal(),
            "scenario finished"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr, TcpListener};

    use tracing_test::traced_test;

    use super::*;
    use crate::scenario::payload::initialize_request;

    /// An address nothing listens on.
    fn closed_endpoint() -> Url {
        let listener =
            TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);
        Url::parse(&format!("http://{addr}/mcp")).expect("url")
    }

    #[test]
    fn default_timings() {
        let config = RunnerConfig::default();
        assert_eq!(config.immediate_deadline, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.cancel_after, Duration::from_millis(1));
    }

    #[traced_test]
    #[tokio::test]
    async fn refused_connection_is_an_anomaly() {
        let runner = ScenarioRunner::new(closed_endpoint()).expect("runner");
        let outcome = runner
            .run(&ScenarioDescriptor::new(
                "refused",
                Strategy::AbortDuringHandshake,
                initialize_request(),
            ))
            .await;
        assert!(outcome.is_anomalous(), "{outcome:?}");
        assert_eq!(outcome.status, None);
        assert!(logs_contain("scenario ended unexpectedly"));
    }

    #[tokio::test]
    async fn aborted_reader_is_reported_as_cancelled() {
        let task = tokio::spawn(std::future::pending::<()>());
        task.abort();
        let err = task.await.expect_err("aborted");
        assert_eq!(
            join_failed(err),
            ScenarioTermination::ExpectedDisconnect(DisconnectSignal::Cancelled)
        );
    }

    #[tokio::test]
    async fn panicking_reader_is_an_anomaly() {
        let task = tokio::spawn(async { panic!("reader exploded") });
        let err = task.await.expect_err("panicked");
        assert_eq!(
            join_failed(err),
            ScenarioTermination::Anomaly(ScenarioError::Panicked("reader exploded".into()))
        );
    }
}
