//! Categorical Encoder
//!
//! 学習時の初出順で文字列値に整数コードを割り当てる。

use crate::record::fields;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 学習時に存在しなかった値のコード
pub const UNSEEN_CODE: f64 = -1.0;

/// フィールド欠損時のプレースホルダ
pub fn placeholder(field: &str) -> &'static str {
    if field == fields::IP_ADDRESS {
        "0.0.0.0"
    } else {
        "unknown"
    }
}

/// カテゴリエンコーダ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    /// 対象フィールド名
    field: String,
    /// コード順のクラス
    classes: Vec<String>,
    /// 値 → コード
    codes: BTreeMap<String, usize>,
}

impl CategoricalEncoder {
    /// 値の列からエンコーダを学習
    pub fn fit<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes = Vec::new();
        let mut codes = BTreeMap::new();
        for value in values {
            let value = value.as_ref();
            if !codes.contains_key(value) {
                codes.insert(value.to_string(), classes.len());
                classes.push(value.to_string());
            }
        }

        Self {
            field: field.into(),
            classes,
            codes,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// 特徴量名 (`<field>_encoded`)
    pub fn feature_name(&self) -> String {
        format!("{}_encoded", self.field)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// 値をコード化（未知の値は -1）
    pub fn encode(&self, value: &str) -> f64 {
        self.codes
            .get(value)
            .map(|&code| code as f64)
            .unwrap_or(UNSEEN_CODE)
    }
}
