//! Briefing job - orchestrates the fetch-config, generate, deliver flow.
//!
//! One job is strictly sequential. Batches run jobs for many users with
//! bounded parallelism; one user's failure never affects another's job.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::ConfigError;
use crate::generator::{BriefingGenerator, GenerationError};
use crate::notifier::{DeliveryError, Notifier};
use crate::store::{ConfigStore, StoreError};

/// Default number of jobs run at once by batch operations.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Pipeline stage a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStage {
    FetchConfig,
    Validate,
    Generate,
    Deliver,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FetchConfig => "fetch-config",
            Self::Validate => "validate",
            Self::Generate => "generate",
            Self::Deliver => "deliver",
        };
        f.write_str(s)
    }
}

/// Why a job did not deliver a briefing.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no briefing config saved for user '{user_id}'")]
    ConfigNotFound { user_id: String },

    #[error("config for user '{user_id}' is incomplete: {source}")]
    Validation {
        user_id: String,
        #[source]
        source: ConfigError,
    },

    #[error("briefing generation failed for user '{user_id}': {source}")]
    Generation {
        user_id: String,
        #[source]
        source: GenerationError,
    },

    #[error("briefing delivery failed for user '{user_id}': {source}")]
    Delivery {
        user_id: String,
        #[source]
        source: DeliveryError,
    },

    #[error("config store failed for user '{user_id}': {source}")]
    Store {
        user_id: String,
        #[source]
        source: StoreError,
    },
}

impl JobError {
    /// The stage the job stopped at.
    #[must_use]
    pub fn stage(&self) -> JobStage {
        match self {
            Self::ConfigNotFound { .. } | Self::Store { .. } => JobStage::FetchConfig,
            Self::Validation { .. } => JobStage::Validate,
            Self::Generation { .. } => JobStage::Generate,
            Self::Delivery { .. } => JobStage::Deliver,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> JobOutcome {
        match self {
            Self::ConfigNotFound { .. } => JobOutcome::ConfigNotFound,
            Self::Validation { .. } => JobOutcome::ValidationFailure,
            Self::Generation { .. } => JobOutcome::GenerationFailure,
            Self::Delivery { .. } => JobOutcome::DeliveryFailure,
            Self::Store { .. } => JobOutcome::StoreFailure,
        }
    }
}

/// Terminal state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobOutcome {
    Success,
    ConfigNotFound,
    ValidationFailure,
    GenerationFailure,
    DeliveryFailure,
    StoreFailure,
}

/// Details of a successful run.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub user_id: String,
    /// Size of the delivered HTML body.
    pub briefing_bytes: usize,
    pub elapsed: Duration,
}

/// Per-user entry in a batch result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub outcome: JobOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<JobReport, JobError>> for JobSummary {
    fn from(result: &Result<JobReport, JobError>) -> Self {
        match result {
            Ok(_) => Self {
                outcome: JobOutcome::Success,
                error: None,
            },
            Err(e) => Self {
                outcome: e.outcome(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Outcomes of a batch, keyed by user id.
pub type BatchResults = BTreeMap<String, JobSummary>;

/// Runs briefing jobs against a store, a generator, and a notifier.
#[derive(Clone)]
pub struct BriefingJob {
    store: Arc<dyn ConfigStore>,
    generator: Arc<dyn BriefingGenerator>,
    notifier: Arc<dyn Notifier>,
    max_concurrency: usize,
}

impl BriefingJob {
    #[must_use]
    pub fn new(
        store: Arc<dyn ConfigStore>,
        generator: Arc<dyn BriefingGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            generator,
            notifier,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit how many jobs a batch runs at once (minimum 1).
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Run the pipeline for one user.
    ///
    /// Validation happens before any external call, and delivery is only
    /// attempted with a successfully generated briefing.
    pub async fn run(&self, user_id: &str) -> Result<JobReport, JobError> {
        let started = Instant::now();
        tracing::info!(user_id, "Starting briefing job");

        let result = self.run_stages(user_id, started).await;

        match &result {
            Ok(report) => tracing::info!(
                user_id,
                bytes = report.briefing_bytes,
                elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                "Briefing job complete"
            ),
            Err(e) => tracing::warn!(
                user_id,
                stage = %e.stage(),
                error = %e,
                "Briefing job failed"
            ),
        }

        result
    }

    async fn run_stages(&self, user_id: &str, started: Instant) -> Result<JobReport, JobError> {
        let config = self
            .store
            .get(user_id)
            .await
            .map_err(|source| JobError::Store {
                user_id: user_id.to_string(),
                source,
            })?
            .ok_or_else(|| JobError::ConfigNotFound {
                user_id: user_id.to_string(),
            })?;

        config.validate().map_err(|source| JobError::Validation {
            user_id: user_id.to_string(),
            source,
        })?;

        let html = self
            .generator
            .generate(&config)
            .await
            .map_err(|source| JobError::Generation {
                user_id: user_id.to_string(),
                source,
            })?;
        tracing::debug!(user_id, bytes = html.len(), "Briefing generated");

        self.notifier
            .send(&config, &html)
            .await
            .map_err(|source| JobError::Delivery {
                user_id: user_id.to_string(),
                source,
            })?;

        Ok(JobReport {
            user_id: user_id.to_string(),
            briefing_bytes: html.len(),
            elapsed: started.elapsed(),
        })
    }

    /// Run jobs for the given users independently. Never short-circuits.
    pub async fn run_many(&self, user_ids: Vec<String>) -> BatchResults {
        let this = self;
        let results: BatchResults = stream::iter(user_ids)
            .map(move |user_id| async move {
                let result = this.run(&user_id).await;
                (user_id, JobSummary::from(&result))
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let succeeded = results
            .values()
            .filter(|s| s.outcome == JobOutcome::Success)
            .count();
        tracing::info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "Batch complete"
        );

        results
    }

    /// Run jobs for every user with a saved config.
    pub async fn run_all(&self) -> Result<BatchResults, StoreError> {
        let users = self.store.list_users().await?;
        Ok(self.run_many(users).await)
    }

    /// Users whose schedule matches `now` in the reference timezone, plus
    /// users whose config could not be read and so could not be checked.
    pub async fn due_users(&self, now: DateTime<Utc>) -> Result<DueUsers, StoreError> {
        let mut scan = DueUsers::default();
        for user_id in self.store.list_users().await? {
            match self.store.get(&user_id).await {
                Ok(Some(config)) if config.is_due(now) => scan.due.push(user_id),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Unreadable config during schedule scan");
                    scan.unreadable.push((user_id, e));
                }
            }
        }
        Ok(scan)
    }

    /// Run jobs for every user due at `now`. Users whose config could not be
    /// read are reported as `StoreFailure`.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<BatchResults, StoreError> {
        let DueUsers { due, unreadable } = self.due_users(now).await?;
        tracing::info!(due = due.len(), unreadable = unreadable.len(), "Running scheduled briefings");

        let mut results = self.run_many(due).await;
        for (user_id, source) in unreadable {
            let failed: Result<JobReport, JobError> = Err(JobError::Store {
                user_id: user_id.clone(),
                source,
            });
            results.insert(user_id, JobSummary::from(&failed));
        }
        Ok(results)
    }
}

/// Result of scanning the store for users due at an instant.
#[derive(Debug, Default)]
pub struct DueUsers {
    pub due: Vec<String>,
    /// Users whose config failed to load, with the reason.
    pub unreadable: Vec<(String, StoreError)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BriefingConfig, ConfigPatch};
    use crate::generator::MockBriefingGenerator;
    use crate::notifier::MockNotifier;
    use crate::store::{FileConfigStore, MemoryConfigStore, SecretCipher};

    fn valid_config() -> BriefingConfig {
        BriefingConfig {
            api_key: "key".into(),
            sender_email: "sender@gmail.com".to_string(),
            sender_app_password: "pw".into(),
            receiver_email: "reader@example.com".to_string(),
            keywords: vec!["K1".to_string(), "K2".to_string()],
            sources: vec!["S1".to_string()],
            ..Default::default()
        }
    }

    fn store_with(entries: Vec<(&str, BriefingConfig)>) -> Arc<MemoryConfigStore> {
        Arc::new(MemoryConfigStore::with_configs(
            entries.into_iter().map(|(id, c)| (id.to_string(), c)),
        ))
    }

    fn job(
        store: Arc<MemoryConfigStore>,
        generator: MockBriefingGenerator,
        notifier: MockNotifier,
    ) -> BriefingJob {
        BriefingJob::new(store, Arc::new(generator), Arc::new(notifier))
    }

    #[tokio::test]
    async fn test_success_delivers_generated_html_unmodified() {
        let mut generator = MockBriefingGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Ok("<h1>Top 3</h1>\n<p>raw & unsanitized</p>".to_string()));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|config, html| {
                config.receiver_email == "reader@example.com"
                    && html.to_string() == "<h1>Top 3</h1>\n<p>raw & unsanitized</p>"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let job = job(store_with(vec![("a", valid_config())]), generator, notifier);
        let report = job.run("a").await.unwrap();

        assert_eq!(report.user_id, "a");
        assert_eq!(report.briefing_bytes, "<h1>Top 3</h1>\n<p>raw & unsanitized</p>".len());
    }

    #[tokio::test]
    async fn test_missing_config_calls_nothing() {
        let mut generator = MockBriefingGenerator::new();
        generator.expect_generate().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(0);

        let job = job(store_with(vec![]), generator, notifier);
        let err = job.run("ghost").await.unwrap_err();

        assert_eq!(err.outcome(), JobOutcome::ConfigNotFound);
        assert_eq!(err.stage(), JobStage::FetchConfig);
    }

    #[tokio::test]
    async fn test_incomplete_config_fails_before_any_call() {
        let incomplete = [
            BriefingConfig { api_key: "".into(), ..valid_config() },
            BriefingConfig { sender_email: String::new(), ..valid_config() },
            BriefingConfig { sender_app_password: " ".into(), ..valid_config() },
            BriefingConfig { receiver_email: String::new(), ..valid_config() },
        ];

        for config in incomplete {
            let mut generator = MockBriefingGenerator::new();
            generator.expect_generate().times(0);
            let mut notifier = MockNotifier::new();
            notifier.expect_send().times(0);

            let job = job(store_with(vec![("u", config)]), generator, notifier);
            let err = job.run("u").await.unwrap_err();
            assert_eq!(err.outcome(), JobOutcome::ValidationFailure);
        }
    }

    #[tokio::test]
    async fn test_generation_failure_skips_delivery() {
        let mut generator = MockBriefingGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Err(GenerationError::EmptyResponse));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(0);

        let job = job(store_with(vec![("u", valid_config())]), generator, notifier);
        let err = job.run("u").await.unwrap_err();

        assert_eq!(err.outcome(), JobOutcome::GenerationFailure);
        assert!(matches!(
            err,
            JobError::Generation { ref source, .. } if source.is_content_failure()
        ));
    }

    #[tokio::test]
    async fn test_delivery_failure() {
        let mut generator = MockBriefingGenerator::new();
        generator
            .expect_generate()
            .returning(|_| Ok("<p>ok</p>".to_string()));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(1).returning(|_, _| {
            Err(DeliveryError::InvalidAddress {
                field: "receiver",
                reason: "rejected".to_string(),
            })
        });

        let job = job(store_with(vec![("u", valid_config())]), generator, notifier);
        let err = job.run("u").await.unwrap_err();

        assert_eq!(err.outcome(), JobOutcome::DeliveryFailure);
        assert_eq!(err.stage(), JobStage::Deliver);
    }

    #[tokio::test]
    async fn test_run_many_isolates_failures() {
        let store = store_with(vec![
            ("a", valid_config()),
            ("c", BriefingConfig { keywords: vec!["boom".to_string()], ..valid_config() }),
        ]);
        let mut generator = MockBriefingGenerator::new();
        generator.expect_generate().times(2).returning(|config| {
            if config.keywords.iter().any(|k| k == "boom") {
                Err(GenerationError::Upstream {
                    status: 500,
                    message: "internal".to_string(),
                })
            } else {
                Ok("<p>briefing</p>".to_string())
            }
        });
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(1).returning(|_, _| Ok(()));

        let job = job(store, generator, notifier).with_max_concurrency(2);
        let results = job
            .run_many(vec!["a".to_string(), "b".to_string(), "c".to_string()])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results["a"].outcome, JobOutcome::Success);
        assert_eq!(results["b"].outcome, JobOutcome::ConfigNotFound);
        assert_eq!(results["c"].outcome, JobOutcome::GenerationFailure);
        assert!(results["a"].error.is_none());
        assert!(results["c"].error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_run_all_reports_every_stored_user() {
        let store = store_with(vec![
            ("a", valid_config()),
            ("c", BriefingConfig { keywords: vec!["boom".to_string()], ..valid_config() }),
            ("d", BriefingConfig { sender_app_password: "".into(), ..valid_config() }),
        ]);
        let mut generator = MockBriefingGenerator::new();
        generator.expect_generate().times(2).returning(|config| {
            if config.keywords.iter().any(|k| k == "boom") {
                Err(GenerationError::EmptyResponse)
            } else {
                Ok("<p>briefing for a</p>".to_string())
            }
        });
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|_, html| html.to_string() == "<p>briefing for a</p>")
            .times(1)
            .returning(|_, _| Ok(()));

        let results = job(store, generator, notifier).run_all().await.unwrap();

        let outcomes: Vec<(&str, JobOutcome)> = results
            .iter()
            .map(|(id, s)| (id.as_str(), s.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("a", JobOutcome::Success),
                ("c", JobOutcome::GenerationFailure),
                ("d", JobOutcome::ValidationFailure),
            ]
        );
        assert!(results["a"].error.is_none());
        assert!(results["d"].error.as_deref().unwrap().contains("senderAppPassword"));
    }

    #[tokio::test]
    async fn test_run_due_only_runs_matching_users() {
        let store = Arc::new(MemoryConfigStore::new());
        store
            .set("early", ConfigPatch {
                schedule_time: Some("07:00".parse().unwrap()),
                ..ConfigPatch::from(valid_config())
            })
            .await
            .unwrap();
        store
            .set("late", ConfigPatch {
                schedule_time: Some("21:00".parse().unwrap()),
                ..ConfigPatch::from(valid_config())
            })
            .await
            .unwrap();

        let mut generator = MockBriefingGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Ok("<p/>".to_string()));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(1).returning(|_, _| Ok(()));

        // 07:00 KST on 2026-10-15 is 22:00 UTC the previous day.
        let now = "2026-10-14T22:00:30Z".parse::<DateTime<Utc>>().unwrap();
        let job = job(store, generator, notifier);

        let scan = job.due_users(now).await.unwrap();
        assert_eq!(scan.due, vec!["early"]);
        assert!(scan.unreadable.is_empty());
        let results = job.run_due(now).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results["early"].outcome, JobOutcome::Success);
    }

    #[tokio::test]
    async fn test_run_due_reports_unreadable_configs() {
        const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs.json");
        let store = FileConfigStore::new(&path, SecretCipher::from_hex_key(KEY).unwrap());
        for user in ["good", "broken"] {
            store
                .set(user, ConfigPatch {
                    schedule_time: Some("07:00".parse().unwrap()),
                    ..ConfigPatch::from(valid_config())
                })
                .await
                .unwrap();
        }

        let mut doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc["users"]["broken"]["apiKeyEncrypted"] = serde_json::json!("00ff");
        std::fs::write(&path, doc.to_string()).unwrap();

        let mut generator = MockBriefingGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_| Ok("<p/>".to_string()));
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(1).returning(|_, _| Ok(()));
        let job = BriefingJob::new(Arc::new(store), Arc::new(generator), Arc::new(notifier));

        let now = "2026-10-14T22:00:30Z".parse::<DateTime<Utc>>().unwrap();
        let scan = job.due_users(now).await.unwrap();
        assert_eq!(scan.due, vec!["good"]);
        assert_eq!(scan.unreadable.len(), 1);
        assert_eq!(scan.unreadable[0].0, "broken");

        let results = job.run_due(now).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results["good"].outcome, JobOutcome::Success);
        assert_eq!(results["broken"].outcome, JobOutcome::StoreFailure);
        assert!(results["broken"].error.as_deref().unwrap().contains("broken"));
    }
}
