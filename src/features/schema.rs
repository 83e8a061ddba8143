//! Feature Schema
//!
//! 学習時に確定する特徴量名の並び。次元数と順序は学習後に変化しない。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// どのブロックも宣言されない場合のフォールバック次元数
pub const FALLBACK_DIMENSION: usize = 5;

/// 特徴量スキーマ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// `fallback_0..fallback_4` のゼロベクトル用スキーマ
    pub fn fallback() -> Self {
        Self::new(
            (0..FALLBACK_DIMENSION)
                .map(|i| format!("fallback_{}", i))
                .collect(),
        )
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dimensionality(&self) -> usize {
        self.names.len()
    }

    pub fn is_fallback(&self) -> bool {
        self.names.len() == FALLBACK_DIMENSION
            && self
                .names
                .iter()
                .enumerate()
                .all(|(i, name)| *name == format!("fallback_{}", i))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// 特徴量名の並びから計算した SHA-256 フィンガープリント
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    /// ベクトル長がスキーマと一致することを確認
    pub fn check_dimension(&self, stage: &str, actual: usize) -> Result<()> {
        if actual != self.dimensionality() {
            return Err(Error::DimensionMismatch {
                stage: stage.to_string(),
                expected: self.dimensionality(),
                actual,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_schema() {
        let schema = FeatureSchema::fallback();
        assert_eq!(schema.dimensionality(), 5);
        assert_eq!(schema.names()[4], "fallback_4");
        assert!(schema.is_fallback());
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = FeatureSchema::new(vec!["hour_of_day".into(), "user_encoded".into()]);
        let b = FeatureSchema::new(vec!["user_encoded".into(), "hour_of_day".into()]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_check_dimension() {
        let schema = FeatureSchema::fallback();
        assert!(schema.check_dimension("score", 5).is_ok());
        match schema.check_dimension("score", 3) {
            Err(Error::DimensionMismatch {
                stage,
                expected,
                actual,
            }) => {
                assert_eq!(stage, "score");
                assert_eq!(expected, 5);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
