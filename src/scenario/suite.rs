//! Ordered scenario steps with settle delays and concurrent bursts.

use std::{
    collections::BTreeMap,
    fs,
    io,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{
    ScenarioDescriptor,
    ScenarioError,
    ScenarioOutcome,
    ScenarioRunner,
    ScenarioTermination,
    Strategy,
    payload,
};
use crate::{app::tools::SLOW_TOOL, panic::format_panic};

/// Pause between steps unless configured otherwise.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Instances in the stock burst step.
pub const DEFAULT_BURST: usize = 10;

/// Errors raised while loading a suite definition.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read suite file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid suite definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("suite `{0}` has no steps")]
    Empty(String),
    #[error("burst `{0}` must run at least one instance")]
    EmptyBurst(String),
}

/// One step of a suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStep {
    /// Run one scenario and wait for it.
    Single(ScenarioDescriptor),
    /// Run `count` instances of a scenario concurrently and wait for all.
    Burst {
        descriptor: ScenarioDescriptor,
        count: usize,
    },
}

impl SuiteStep {
    #[must_use]
    pub fn descriptor(&self) -> &ScenarioDescriptor {
        match self {
            Self::Single(descriptor) | Self::Burst { descriptor, .. } => descriptor,
        }
    }

    /// Number of result entries this step produces.
    #[must_use]
    pub fn instances(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Burst { count, .. } => *count,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

fn default_settle_delay() -> Duration { DEFAULT_SETTLE_DELAY }

/// A named, ordered list of steps.
///
/// Suites load from JSON:
///
/// ```
/// use ssetrace::scenario::{ScenarioSuite, Strategy};
///
/// let suite = ScenarioSuite::from_json(
///     r#"{
///         "name": "custom",
///         "settle_ms": 250,
///         "steps": [
///             {"single": {"name": "late", "strategy": {"delayed_ms": 200}}},
///             {"burst": {"descriptor": {"name": "swarm", "strategy": "cancel_during_read"}, "count": 3}}
///         ]
///     }"#,
/// )
/// .expect("valid suite");
/// assert_eq!(suite.steps[0].descriptor().strategy, Strategy::DelayedMs(200));
/// assert_eq!(suite.expected_entries(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSuite {
    pub name: String,
    pub steps: Vec<SuiteStep>,
    #[serde(
        rename = "settle_ms",
        with = "millis",
        default = "default_settle_delay"
    )]
    pub settle_delay: Duration,
}

impl ScenarioSuite {
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<SuiteStep>) -> Self {
        Self {
            name: name.into(),
            steps,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Immediate close followed by closes after 50, 100 and 200 ms, each
    /// sending `initialize`.
    #[must_use]
    pub fn reproduction() -> Self {
        let mut steps = vec![SuiteStep::Single(ScenarioDescriptor::new(
            "quick_disconnect",
            Strategy::Immediate,
            payload::initialize_request(),
        ))];
        steps.extend([50, 100, 200].map(|ms| {
            SuiteStep::Single(ScenarioDescriptor::new(
                format!("delayed_disconnect_{ms}ms"),
                Strategy::DelayedMs(ms),
                payload::initialize_request(),
            ))
        }));
        Self::new("reproduction", steps)
    }

    /// Cancellation while reading `tools/list`, a dropped response to the
    /// slow tool and a burst of concurrent cancellations.
    #[must_use]
    pub fn fast_disconnect() -> Self {
        let cancel = ScenarioDescriptor::new(
            "ultra_fast_disconnect",
            Strategy::CancelDuringRead,
            payload::tools_list_request(),
        );
        Self::new(
            "fast_disconnect",
            vec![
                SuiteStep::Single(cancel.clone()),
                SuiteStep::Single(ScenarioDescriptor::new(
                    "handshake_abort",
                    Strategy::AbortDuringHandshake,
                    payload::tool_call_request(SLOW_TOOL, json!({})),
                )),
                SuiteStep::Burst {
                    descriptor: ScenarioDescriptor {
                        name: "rapid_burst".into(),
                        ..cancel
                    },
                    count: DEFAULT_BURST,
                },
            ],
        )
    }

    /// Every stock step, reproduction first.
    #[must_use]
    pub fn all() -> Self {
        let mut steps = Self::reproduction().steps;
        steps.extend(Self::fast_disconnect().steps);
        Self::new("all", steps)
    }

    /// Parse and validate a suite definition.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError`] if the JSON is malformed, the suite is empty or
    /// a burst has no instances.
    pub fn from_json(json: &str) -> Result<Self, SuiteError> {
        let suite: Self = serde_json::from_str(json)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Read a suite definition from `path`.
    ///
    /// # Errors
    ///
    /// See [`from_json`](Self::from_json); also fails if the file cannot be
    /// read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SuiteError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SuiteError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), SuiteError> {
        if self.steps.is_empty() {
            return Err(SuiteError::Empty(self.name.clone()));
        }
        if let Some(step) = self.steps.iter().find(|step| step.instances() == 0) {
            return Err(SuiteError::EmptyBurst(step.descriptor().name.clone()));
        }
        Ok(())
    }

    /// Number of entries a full run records.
    #[must_use]
    pub fn expected_entries(&self) -> usize { self.steps.iter().map(SuiteStep::instances).sum() }

    /// Run every step in order with `runner`.
    ///
    /// Steps are separated by the settle delay. A burst's instances run
    /// concurrently, and a panicking instance is recorded as an anomaly
    /// instead of aborting the burst.
    pub async fn run(&self, runner: &ScenarioRunner) -> SuiteReport {
        let results = Arc::new(DashMap::new());
        info!(suite = %self.name, steps = self.steps.len(), "suite started");
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settle_delay).await;
            }
            let number = index + 1;
            let descriptor = step.descriptor();
            info!(
                suite = %self.name,
                step = number,
                scenario = %descriptor.name,
                strategy = %descriptor.strategy,
                instances = step.instances(),
                "running step"
            );
            match step {
                SuiteStep::Single(descriptor) => {
                    let outcome = runner.run(descriptor).await;
                    results.insert(format!("{number:02}-{}", descriptor.name), outcome);
                }
                SuiteStep::Burst { descriptor, count } => {
                    run_burst(runner, descriptor, *count, number, &results).await;
                }
            }
        }
        let outcomes = Arc::try_unwrap(results).unwrap_or_else(|shared| (*shared).clone());
        let report = SuiteReport {
            name: self.name.clone(),
            outcomes,
        };
        info!(
            suite = %self.name,
            entries = report.len(),
            expected = report.expected_count(),
            anomalies = report.anomalies().len(),
            "suite finished"
        );
        report
    }
}

async fn run_burst(
    runner: &ScenarioRunner,
    descriptor: &ScenarioDescriptor,
    count: usize,
    step: usize,
    results: &Arc<DashMap<String, ScenarioOutcome>>,
) {
    let mut tasks = JoinSet::new();
    for instance in 1..=count {
        let runner = runner.clone();
        let descriptor = descriptor.clone();
        let results = Arc::clone(results);
        let key = format!("{step:02}-{}#{instance}", descriptor.name);
        tasks.spawn(async move {
            let started = Instant::now();
            let outcome = match AssertUnwindSafe(runner.run(&descriptor)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => ScenarioOutcome {
                    name: descriptor.name.clone(),
                    strategy: descriptor.strategy,
                    status: None,
                    termination: ScenarioTermination::Anomaly(ScenarioError::Panicked(
                        format_panic(panic.as_ref()).to_string(),
                    )),
                    elapsed: started.elapsed(),
                },
            };
            results.insert(key, outcome);
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "burst instance did not record an outcome");
        }
    }
}

/// Outcomes of one suite run, keyed by step and instance.
#[derive(Debug, Clone)]
pub struct SuiteReport {
    name: String,
    outcomes: DashMap<String, ScenarioOutcome>,
}

impl SuiteReport {
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    #[must_use]
    pub fn len(&self) -> usize { self.outcomes.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.outcomes.is_empty() }

    /// Outcome recorded under `key`, e.g. `"03-rapid_burst#7"`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ScenarioOutcome> {
        self.outcomes.get(key).map(|entry| entry.value().clone())
    }

    /// Every outcome, ordered by key.
    #[must_use]
    pub fn outcomes(&self) -> BTreeMap<String, ScenarioOutcome> {
        self.outcomes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Outcomes that ended in an anomaly, ordered by key.
    #[must_use]
    pub fn anomalies(&self) -> Vec<(String, ScenarioOutcome)> {
        self.outcomes()
            .into_iter()
            .filter(|(_, outcome)| outcome.is_anomalous())
            .collect()
    }

    /// Number of runs that ended through an expected disconnect signal.
    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|entry| entry.value().expected_signal_observed())
            .count()
    }
}
