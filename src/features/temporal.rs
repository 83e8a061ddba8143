//! Temporal features
//!
//! タイムスタンプから時刻（0-23）と曜日（0 = 月曜）を取り出す。

use crate::record::FieldValue;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};

/// 解析できない場合の既定値（月曜正午）
pub const DEFAULT_HOUR: u32 = 12;
pub const DEFAULT_DAY_OF_WEEK: u32 = 0;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// 時刻・曜日
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalParts {
    pub hour: u32,
    pub day_of_week: u32,
}

impl Default for TemporalParts {
    fn default() -> Self {
        Self {
            hour: DEFAULT_HOUR,
            day_of_week: DEFAULT_DAY_OF_WEEK,
        }
    }
}

impl TemporalParts {
    /// 土日かどうか
    pub fn is_weekend(&self) -> bool {
        self.day_of_week >= 5
    }
}

/// タイムスタンプ値を解析
///
/// RFC 3339、ナイーブ ISO-8601（`T` または空白区切り）、Unix エポック秒を受け付ける。
/// オフセット付きの場合はそのオフセットでの壁時計時刻を使う。
pub fn parse_timestamp(value: &FieldValue) -> Option<TemporalParts> {
    match value {
        FieldValue::Number(seconds) => from_epoch(*seconds),
        FieldValue::Text(text) => parse_text(text.trim()),
        FieldValue::Bool(_) => None,
    }
}

fn parse_text(text: &str) -> Option<TemporalParts> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(TemporalParts {
            hour: dt.hour(),
            day_of_week: dt.weekday().num_days_from_monday(),
        });
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(TemporalParts {
                hour: dt.hour(),
                day_of_week: dt.weekday().num_days_from_monday(),
            });
        }
    }

    text.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(seconds: f64) -> Option<TemporalParts> {
    if !seconds.is_finite() {
        return None;
    }
    let dt = DateTime::from_timestamp(seconds.floor() as i64, 0)?;
    Some(TemporalParts {
        hour: dt.hour(),
        day_of_week: dt.weekday().num_days_from_monday(),
    })
}
