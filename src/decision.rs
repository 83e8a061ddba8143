//! Decision Combiner
//!
//! モデルごとの投票とスコアを1つの判定にまとめる。

use crate::config::DecisionConfig;
use crate::models::ModelOutput;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 重大度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

/// 統合判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// 過半数のモデルが外れ値と判定したか
    pub is_anomaly: bool,
    /// 生スコアの平均（負ほど異常）
    pub confidence_score: f64,
    /// 重大度
    pub severity: Severity,
    /// 外れ値票の数
    pub outlier_votes: usize,
    /// 全票数
    pub total_votes: usize,
}

/// 判定の統合器
#[derive(Debug, Clone, Default)]
pub struct DecisionCombiner {
    config: DecisionConfig,
}

impl DecisionCombiner {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// 厳密な過半数で異常と判定（同数は正常）
    pub fn combine(&self, outputs: &[ModelOutput]) -> Decision {
        let total_votes = outputs.len();
        let outlier_votes = outputs.iter().filter(|o| o.vote.is_outlier()).count();
        let confidence_score = if outputs.is_empty() {
            0.0
        } else {
            outputs.iter().map(|o| o.score).sum::<f64>() / total_votes as f64
        };

        Decision {
            is_anomaly: outlier_votes * 2 > total_votes,
            confidence_score,
            severity: self.severity(confidence_score),
            outlier_votes,
            total_votes,
        }
    }

    pub fn severity(&self, confidence_score: f64) -> Severity {
        if confidence_score < self.config.high_severity_below {
            Severity::High
        } else if confidence_score < self.config.medium_severity_below {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vote;

    fn output(model: &str, vote: Vote, score: f64) -> ModelOutput {
        ModelOutput {
            model: model.to_string(),
            vote,
            score,
        }
    }

    #[test]
    fn test_tie_is_not_anomalous() {
        let combiner = DecisionCombiner::default();
        let decision = combiner.combine(&[
            output("isolation_forest", Vote::Outlier, -0.3),
            output("one_class_svm", Vote::Inlier, 0.1),
        ]);
        assert!(!decision.is_anomaly);
        assert_eq!(decision.outlier_votes, 1);
        assert!((decision.confidence_score - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_unanimous_outlier() {
        let combiner = DecisionCombiner::default();
        let decision = combiner.combine(&[
            output("isolation_forest", Vote::Outlier, -0.6),
            output("one_class_svm", Vote::Outlier, -0.8),
        ]);
        assert!(decision.is_anomaly);
        assert_eq!(decision.severity, Severity::High);
    }

    #[test]
    fn test_no_outputs() {
        let decision = DecisionCombiner::default().combine(&[]);
        assert!(!decision.is_anomaly);
        assert_eq!(decision.confidence_score, 0.0);
        assert_eq!(decision.severity, Severity::Low);
    }

    #[test]
    fn test_severity_ladder() {
        let combiner = DecisionCombiner::default();
        assert_eq!(combiner.severity(-0.51), Severity::High);
        assert_eq!(combiner.severity(-0.5), Severity::Medium);
        assert_eq!(combiner.severity(-0.2), Severity::Low);

        let custom = DecisionCombiner::new(DecisionConfig {
            high_severity_below: -0.1,
            medium_severity_below: 0.0,
        });
        assert_eq!(custom.severity(-0.05), Severity::Medium);
    }
}
