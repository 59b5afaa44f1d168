//! Personal news briefing service.
//!
//! This crate provides:
//! - Per-user briefing configuration with credentials encrypted at rest
//! - Search-grounded briefing generation via the Gemini API
//! - HTML email delivery over SMTP
//! - A job runner for one user, every user, or the users due this minute
//! - An HTTP trigger server

pub mod config;
pub mod generator;
pub mod job;
pub mod notifier;
pub mod server;
pub mod settings;
pub mod store;

// Re-export main types
pub use config::{BriefingConfig, ConfigPatch, ScheduleFrequency, ScheduleTime};
pub use generator::{BriefingGenerator, GeminiGenerator, GenerationError};
pub use job::{BatchResults, BriefingJob, DueUsers, JobError, JobOutcome, JobSummary};
pub use notifier::{DeliveryError, Notifier, SmtpNotifier};
pub use settings::ServiceSettings;
pub use store::{ConfigStore, FileConfigStore, MemoryConfigStore};
