//! Agent configuration

use anyhow::{Context, Result};
use hive_lib::{NoModelPolicy, ScoringConfig, SystemSettings, TrainerConfig, WorkerSchedule};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const SNAPSHOT_FILE: &str = "hive-store.json";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Instance name attached to structured log events
    pub instance_name: String,

    /// API server port for health, metrics and the review/admin routes
    pub api_port: u16,

    /// Directory holding the store snapshot
    pub data_dir: PathBuf,

    /// Directory holding trained model files
    pub model_dir: PathBuf,

    /// Previous model versions kept on disk
    pub versions_to_keep: usize,

    pub scoring_startup_ms: u64,
    pub scoring_busy_ms: u64,
    pub scoring_idle_ms: u64,
    pub scoring_error_ms: u64,

    pub retrain_startup_ms: u64,
    pub retrain_busy_ms: u64,
    pub retrain_idle_ms: u64,
    pub retrain_error_ms: u64,

    /// Scoring behaviour before the first model exists
    pub no_model_policy: NoModelPolicy,

    /// Minimum gold images on disk before training
    pub min_training_samples: usize,

    /// Processing samples older than this are reported as stuck
    pub stuck_after_secs: i64,

    // Seed values for the settings singleton, used only when it is created
    pub retrain_gold_threshold: u32,
    pub auto_threshold_high: f32,
    pub auto_threshold_low: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let scoring = WorkerSchedule::scoring();
        let retrain = WorkerSchedule::retrain();
        let settings = SystemSettings::default();

        Self {
            instance_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "hive-agent".to_string()),
            api_port: 8080,
            data_dir: PathBuf::from("data"),
            model_dir: PathBuf::from("MLModels"),
            versions_to_keep: 5,
            scoring_startup_ms: millis(scoring.startup),
            scoring_busy_ms: millis(scoring.busy),
            scoring_idle_ms: millis(scoring.idle),
            scoring_error_ms: millis(scoring.error),
            retrain_startup_ms: millis(retrain.startup),
            retrain_busy_ms: millis(retrain.busy),
            retrain_idle_ms: millis(retrain.idle),
            retrain_error_ms: millis(retrain.error),
            no_model_policy: NoModelPolicy::default(),
            min_training_samples: TrainerConfig::default().min_samples,
            stuck_after_secs: ScoringConfig::default().stuck_after_secs,
            retrain_gold_threshold: settings.retrain_gold_threshold,
            auto_threshold_high: settings.auto_threshold_high,
            auto_threshold_low: settings.auto_threshold_low,
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl AgentConfig {
    /// Load configuration from `HIVE_*` environment variables and the optional
    /// file named by `HIVE_CONFIG`
    pub fn load() -> Result<Self> {
        let file = std::env::var("HIVE_CONFIG").ok().map(PathBuf::from);
        Self::from_sources(config::Environment::with_prefix("HIVE"), file)
    }

    /// Build from explicit sources; environment values override the file
    pub fn from_sources(env: config::Environment, file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config: Self = builder
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.default_settings().validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Settings written when the store has none yet
    pub fn default_settings(&self) -> SystemSettings {
        SystemSettings {
            retrain_gold_threshold: self.retrain_gold_threshold,
            auto_threshold_high: self.auto_threshold_high,
            auto_threshold_low: self.auto_threshold_low,
            ..Default::default()
        }
    }

    pub fn scoring_schedule(&self) -> WorkerSchedule {
        WorkerSchedule {
            startup: Duration::from_millis(self.scoring_startup_ms),
            busy: Duration::from_millis(self.scoring_busy_ms),
            idle: Duration::from_millis(self.scoring_idle_ms),
            error: Duration::from_millis(self.scoring_error_ms),
        }
    }

    pub fn retrain_schedule(&self) -> WorkerSchedule {
        WorkerSchedule {
            startup: Duration::from_millis(self.retrain_startup_ms),
            busy: Duration::from_millis(self.retrain_busy_ms),
            idle: Duration::from_millis(self.retrain_idle_ms),
            error: Duration::from_millis(self.retrain_error_ms),
        }
    }

    pub fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig {
            no_model_policy: self.no_model_policy,
            stuck_after_secs: self.stuck_after_secs,
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            min_samples: self.min_training_samples,
            ..Default::default()
        }
    }
}
