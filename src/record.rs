//! Log Record
//!
//! 取り込み時に一度だけ検証される、スキーマ寛容なログレコード。
//!
//! フィールド名 → 値（文字列・数値・真偽値）のマッピング。値が無いフィールドは
//! マップに存在しない（JSON の `null` は取り込み時に欠損として扱う）。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// 既知のフィールド名
pub mod fields {
    pub const TIMESTAMP: &str = "timestamp";
    pub const USER: &str = "user";
    pub const ACTION: &str = "action";
    pub const IP_ADDRESS: &str = "ip_address";
    pub const STATUS: &str = "status";
    pub const STATUS_CODE: &str = "status_code";
    pub const MESSAGE: &str = "message";
    pub const RAW_LOG: &str = "raw_log";
    pub const REQUEST: &str = "request";
}

/// フィールド値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// 真偽値
    Bool(bool),
    /// 数値
    Number(f64),
    /// 文字列
    Text(String),
}

impl FieldValue {
    /// 文字列表現を取得（数値は整数なら小数点なしで表示）
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Cow::Owned(format!("{}", *n as i64))
                } else {
                    Cow::Owned(n.to_string())
                }
            }
            FieldValue::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        }
    }

    /// 数値として取得
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Bool(_) => None,
        }
    }

    fn from_json(index: usize, field: &str, value: Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(FieldValue::Bool(b))),
            Value::Number(n) => n
                .as_f64()
                .map(|v| Some(FieldValue::Number(v)))
                .ok_or_else(|| Error::extraction(index, field, "number is not representable as f64")),
            Value::String(s) => Ok(Some(FieldValue::Text(s))),
            Value::Array(_) => Err(Error::extraction(
                index,
                field,
                "arrays are not valid field values",
            )),
            Value::Object(_) => Err(Error::extraction(
                index,
                field,
                "nested objects are not valid field values",
            )),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// ログレコード
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl LogRecord {
    /// 空のレコードを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON 値から検証付きでレコードを作成
    ///
    /// `index` はバッチ内の位置で、エラーメッセージに含まれる。
    pub fn from_value(index: usize, value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(Error::extraction(
                    index,
                    "<record>",
                    format!("expected a JSON object, got {}", json_kind(&other)),
                ))
            }
        };

        let mut record = Self::new();
        for (key, value) in map {
            if let Some(field) = FieldValue::from_json(index, &key, value)? {
                record.fields.insert(key, field);
            }
        }
        Ok(record)
    }

    /// キーと値のペアからレコードを作成
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// フィールドを追加（ビルダー形式）
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// フィールドを追加
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// フィールドを削除
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// フィールドの文字列表現
    pub fn text(&self, key: &str) -> Option<Cow<'_, str>> {
        self.fields.get(key).map(FieldValue::as_text)
    }

    pub fn timestamp(&self) -> Option<&FieldValue> {
        self.get(fields::TIMESTAMP)
    }

    pub fn user(&self) -> Option<Cow<'_, str>> {
        self.text(fields::USER)
    }

    pub fn status(&self) -> Option<Cow<'_, str>> {
        self.text(fields::STATUS)
    }

    pub fn ip_address(&self) -> Option<Cow<'_, str>> {
        self.text(fields::IP_ADDRESS)
    }

    pub fn status_code(&self) -> Option<Cow<'_, str>> {
        self.text(fields::STATUS_CODE)
    }

    /// 最初に存在するテキストフィールドの内容
    pub fn text_content<S: AsRef<str>>(&self, text_fields: &[S]) -> Option<Cow<'_, str>> {
        text_fields
            .iter()
            .find_map(|field| self.text(field.as_ref()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON 値に変換
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// JSON 値の列を検証付きでレコードに変換
pub fn records_from_values(values: Vec<Value>) -> Result<Vec<LogRecord>> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| LogRecord::from_value(index, value))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_skips_null_fields() {
        let record = LogRecord::from_value(
            0,
            json!({"timestamp": "2024-01-15T10:00:00", "user": null, "status_code": 404}),
        )
        .unwrap();

        assert!(!record.contains("user"));
        assert_eq!(record.status_code().as_deref(), Some("404"));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        let err = LogRecord::from_value(3, json!(["not", "a", "record"])).unwrap_err();
        match err {
            Error::Extraction { index, field, .. } => {
                assert_eq!(index, 3);
                assert_eq!(field, "<record>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_from_value_rejects_nested_field() {
        let err = LogRecord::from_value(0, json!({"timestamp": {"hour": 3}})).unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn test_text_content_first_present_wins() {
        let record = LogRecord::new()
            .with("raw_log", "raw line")
            .with("request", "GET / HTTP/1.1");
        let content = record.text_content(&["message", "raw_log", "request"]);
        assert_eq!(content.as_deref(), Some("raw line"));
    }

    #[test]
    fn test_serde_transparent_round_trip() {
        let record = LogRecord::new().with("user", "alice").with("is_admin", false);
        let value = record.to_value();
        assert_eq!(value, json!({"user": "alice", "is_admin": false}));

        let parsed: LogRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }
}
