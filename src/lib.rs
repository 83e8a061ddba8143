//! # log-anomaly-rs
//!
//! Unsupervised anomaly detection for structured logs.
//!
//! Heterogeneous, partially-missing log fields are turned into a fixed numeric
//! feature layout, an ensemble of outlier detectors (isolation forest and
//! one-class SVM) learns "normal" behaviour from it, and new records are scored
//! into explainable verdicts.

pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod explain;
pub mod features;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod record;
pub mod service;

pub use config::{AppConfig, ConfigLoader, EngineConfig};
pub use decision::{Decision, DecisionCombiner, Severity};
pub use engine::{AnomalyEngine, EnsembleState, Verdict};
pub use error::{Error, Result};
pub use explain::{ExplanationGenerator, ThreatCategory};
pub use models::{ModelOutput, OutlierDetector, TrainingSummary, Vote};
pub use record::{FieldValue, LogRecord};
pub use service::{DetectionReport, DetectionService};
