//! Explanation Generator
//!
//! 元のレコードと判定から、人が読める短い根拠と脅威カテゴリを導出する。

use crate::config::{ExplanationConfig, FeatureConfig};
use crate::decision::Decision;
use crate::features::{contains_error_keyword, is_error_status, parse_timestamp};
use crate::record::{fields, LogRecord};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// 正常時の固定メッセージ
pub const NORMAL_EXPLANATION: &str = "Activity appears normal and expected";

const UNKNOWN_USERS: &[&str] = &["unknown", "unknown_user"];
const FAILED_STATUSES: &[&str] = &["failed", "failure", "denied"];
const EXTERNAL_IP_PREFIXES: &[&str] = &["203.", "198.", "185."];

/// 脅威カテゴリ
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    Normal,
    FailedAuthentication,
    OffHoursActivity,
    PrivilegeEscalation,
    ExternalIpAccess,
    UnusualAccessPattern,
}

impl ThreatCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ThreatCategory::Normal => "Normal",
            ThreatCategory::FailedAuthentication => "Failed Authentication",
            ThreatCategory::OffHoursActivity => "Off-Hours Activity",
            ThreatCategory::PrivilegeEscalation => "Privilege Escalation",
            ThreatCategory::ExternalIpAccess => "External IP Access",
            ThreatCategory::UnusualAccessPattern => "Unusual Access Pattern",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 説明文生成器
#[derive(Debug, Clone)]
pub struct ExplanationGenerator {
    config: ExplanationConfig,
    text_fields: Vec<String>,
    error_keywords: Vec<String>,
}

impl ExplanationGenerator {
    pub fn new(config: ExplanationConfig, features: &FeatureConfig) -> Self {
        Self {
            config,
            text_fields: features.text_fields.clone(),
            error_keywords: features.error_keywords.clone(),
        }
    }

    /// 判定の根拠を生成
    pub fn explain(&self, record: &LogRecord, decision: &Decision) -> String {
        if !decision.is_anomaly {
            return NORMAL_EXPLANATION.to_string();
        }

        let mut reasons: Vec<String> = Vec::new();
        let text = record.text_content(&self.text_fields);
        let user = record.user().map(|u| u.to_lowercase());

        if let Some(parts) = record.timestamp().and_then(parse_timestamp) {
            if parts.hour < self.config.active_hours_start
                || parts.hour > self.config.active_hours_end
            {
                reasons.push(format!("Unusual time of activity ({:02}:00)", parts.hour));
            }
        }

        if let Some(text) = text.as_deref() {
            if contains_error_keyword(text, &self.error_keywords) {
                reasons.push("Contains error/failure indicators".to_string());
            }
            if text.chars().count() > self.config.long_message_threshold {
                reasons.push("Unusually long log message".to_string());
            }
        }

        if let Some(user) = user.as_deref() {
            if UNKNOWN_USERS.contains(&user) {
                reasons.push("Unknown user account".to_string());
            }
        }

        if let Some(status) = record.status() {
            if FAILED_STATUSES.contains(&status.to_lowercase().as_str()) {
                reasons.push("Failed operation".to_string());
            }
        }
        if let Some(code) = record.status_code() {
            if is_error_status(&code) {
                reasons.push(format!("Error status code ({})", code.trim()));
            }
        }

        if let Some(user) = user.as_deref() {
            if user.contains("admin") || user == "root" {
                reasons.push("Administrative account activity".to_string());
            }
        }

        if self.config.confidence_label {
            reasons.push(format!("{} confidence anomaly", decision.severity));
        }

        if reasons.is_empty() {
            format!(
                "Anomalous pattern detected, score={:.3}",
                decision.confidence_score
            )
        } else {
            format!("Suspicious because: {}", reasons.join("; "))
        }
    }

    /// 脅威カテゴリを判定
    pub fn categorize(&self, record: &LogRecord, decision: &Decision) -> ThreatCategory {
        if !decision.is_anomaly {
            return ThreatCategory::Normal;
        }

        let text = self.category_text(record).to_lowercase();
        let hour = record
            .timestamp()
            .and_then(parse_timestamp)
            .map(|parts| parts.hour);

        if text.contains("failed") && (text.contains("password") || text.contains("auth")) {
            ThreatCategory::FailedAuthentication
        } else if matches!(hour, Some(1..=5)) {
            ThreatCategory::OffHoursActivity
        } else if text.contains("admin") || text.contains("root") {
            ThreatCategory::PrivilegeEscalation
        } else if record
            .ip_address()
            .map(|ip| EXTERNAL_IP_PREFIXES.iter().any(|p| ip.starts_with(p)))
            .unwrap_or(false)
        {
            ThreatCategory::ExternalIpAccess
        } else {
            ThreatCategory::UnusualAccessPattern
        }
    }

    /// カテゴリ判定用テキスト（自由テキストが無ければ user action status）
    fn category_text<'a>(&self, record: &'a LogRecord) -> Cow<'a, str> {
        if let Some(text) = record.text_content(&self.text_fields) {
            return text;
        }
        let parts: Vec<Cow<'_, str>> = [fields::USER, fields::ACTION, fields::STATUS]
            .iter()
            .filter_map(|field| record.text(field))
            .collect();
        Cow::Owned(parts.join(" "))
    }
}
