//! Log Ingestion
//!
//! JSON 配列・JSON Lines・生ログ行（Apache / syslog / 汎用）を
//! 検証済みの [`LogRecord`] に変換する。

use crate::error::{Error, Result};
use crate::record::{fields, records_from_values, LogRecord};
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

fn apache_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"^(\S+) \S+ (\S+) \[([\w:/]+\s[+\-]\d{4})\] "([^"]*)" (\d{3}) (\S+)(?: "([^"]*)" "([^"]*)")?"#,
        )
        .expect("static apache pattern is valid")
    })
}

fn syslog_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z][a-z]{2})\s+(\d{1,2}) (\d{2}:\d{2}:\d{2}) (\S+) ([^:\[\s]+)(?:\[(\d+)\])?: (.*)$")
            .expect("static syslog pattern is valid")
    })
}

/// 入力形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// 拡張子と内容から判定
    Auto,
    /// JSON 配列または JSON Lines
    Json,
    /// JSON Lines
    JsonLines,
    /// 生ログ行
    Lines,
}

/// 生ログ行パーサ
#[derive(Debug, Clone)]
pub struct LineParser {
    /// syslog 行に補う年
    year: i32,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    /// 現在の年を補うパーサ
    pub fn new() -> Self {
        Self {
            year: Utc::now().year(),
        }
    }

    pub fn with_year(year: i32) -> Self {
        Self { year }
    }

    /// 1行をレコードに変換（空行は None）
    pub fn parse(&self, line: &str) -> Option<LogRecord> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return None;
        }

        Some(
            parse_apache(line)
                .or_else(|| self.parse_syslog(line))
                .unwrap_or_else(|| {
                    LogRecord::new()
                        .with(fields::MESSAGE, line)
                        .with(fields::RAW_LOG, line)
                }),
        )
    }

    /// 複数行をレコードに変換
    pub fn parse_lines(&self, text: &str) -> Vec<LogRecord> {
        text.lines().filter_map(|line| self.parse(line)).collect()
    }

    fn parse_syslog(&self, line: &str) -> Option<LogRecord> {
        let caps = syslog_pattern().captures(line)?;
        let stamp = format!("{} {} {} {}", &caps[1], &caps[2], &caps[3], self.year);

        let mut record = LogRecord::new()
            .with("host", &caps[4])
            .with("process", &caps[5])
            .with(fields::MESSAGE, &caps[7])
            .with(fields::RAW_LOG, line);
        if let Ok(dt) = NaiveDateTime::parse_from_str(&stamp, "%b %d %H:%M:%S %Y") {
            record.insert(fields::TIMESTAMP, dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
        if let Some(pid) = caps.get(6) {
            record.insert("pid", pid.as_str());
        }
        Some(record)
    }
}

/// Apache common / combined 形式
fn parse_apache(line: &str) -> Option<LogRecord> {
    let caps = apache_pattern().captures(line)?;

    let mut record = LogRecord::new()
        .with(fields::IP_ADDRESS, &caps[1])
        .with(fields::REQUEST, &caps[4])
        .with(fields::RAW_LOG, line);

    let stamp = &caps[3];
    match DateTime::parse_from_str(stamp, "%d/%b/%Y:%H:%M:%S %z") {
        Ok(dt) => record.insert(fields::TIMESTAMP, dt.to_rfc3339()),
        Err(_) => record.insert(fields::TIMESTAMP, stamp),
    }

    if &caps[2] != "-" {
        record.insert(fields::USER, &caps[2]);
    }
    if let Ok(code) = caps[5].parse::<i64>() {
        record.insert(fields::STATUS_CODE, code);
    }
    if let Ok(size) = caps[6].parse::<i64>() {
        record.insert("response_size", size);
    }
    if let Some(method) = caps[4].split_whitespace().next() {
        record.insert(fields::ACTION, method);
    }
    if let Some(referer) = caps.get(7) {
        record.insert("referer", referer.as_str());
    }
    if let Some(agent) = caps.get(8) {
        record.insert("user_agent", agent.as_str());
    }
    Some(record)
}

/// JSON 配列または JSON Lines を読み込む
pub fn parse_json_records(text: &str) -> Result<Vec<LogRecord>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(trimmed)?;
        return records_from_values(values);
    }
    parse_json_lines(text)
}

/// JSON Lines を読み込む（空行は無視）
pub fn parse_json_lines(text: &str) -> Result<Vec<LogRecord>> {
    let mut values = Vec::new();
    for (line_number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            Error::extraction(
                values.len(),
                "<record>",
                format!("line {}: invalid JSON: {}", line_number + 1, e),
            )
        })?;
        values.push(value);
    }
    records_from_values(values)
}

/// ファイルからレコードを読み込む
pub fn read_records(path: impl AsRef<Path>, format: InputFormat) -> Result<Vec<LogRecord>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;

    let format = match format {
        InputFormat::Auto => detect_format(path, &text),
        other => other,
    };

    let records = match format {
        InputFormat::Json | InputFormat::Auto => parse_json_records(&text)?,
        InputFormat::JsonLines => parse_json_lines(&text)?,
        InputFormat::Lines => LineParser::new().parse_lines(&text),
    };

    debug!(
        "Read {} records from {} as {:?}",
        records.len(),
        path.display(),
        format
    );
    Ok(records)
}

fn detect_format(path: &Path, text: &str) -> InputFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => InputFormat::Json,
        Some("jsonl") | Some("ndjson") => InputFormat::JsonLines,
        _ => {
            let first = text.trim_start();
            if first.starts_with('[') || first.starts_with('{') {
                InputFormat::Json
            } else {
                InputFormat::Lines
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use std::io::Write;

    #[test]
    fn test_apache_combined_line() {
        let line = r#"203.0.113.7 - frank [10/Oct/2023:13:55:36 -0700] "GET /admin/config.php HTTP/1.1" 404 2326 "-" "curl/8.0""#;
        let record = LineParser::with_year(2023).parse(line).unwrap();

        assert_eq!(record.ip_address().as_deref(), Some("203.0.113.7"));
        assert_eq!(record.user().as_deref(), Some("frank"));
        assert_eq!(record.status_code().as_deref(), Some("404"));
        assert_eq!(record.text("action").as_deref(), Some("GET"));
        assert_eq!(record.get("response_size"), Some(&FieldValue::Number(2326.0)));
        assert_eq!(
            record.text("timestamp").as_deref(),
            Some("2023-10-10T13:55:36-07:00")
        );
        assert_eq!(record.text("user_agent").as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_syslog_line() {
        let line = "Jan  5 03:14:07 web01 sshd[4242]: Failed password for root from 185.220.101.1";
        let record = LineParser::with_year(2024).parse(line).unwrap();

        assert_eq!(record.text("timestamp").as_deref(), Some("2024-01-05T03:14:07"));
        assert_eq!(record.text("process").as_deref(), Some("sshd"));
        assert_eq!(record.text("pid").as_deref(), Some("4242"));
        assert_eq!(
            record.text("message").as_deref(),
            Some("Failed password for root from 185.220.101.1")
        );
    }

    #[test]
    fn test_generic_line_and_blank() {
        let parser = LineParser::with_year(2024);
        let record = parser.parse("disk quota exceeded on /var").unwrap();
        assert_eq!(record.text("message"), record.text("raw_log"));
        assert!(parser.parse("   ").is_none());
    }

    #[test]
    fn test_json_array_and_lines() {
        let array = r#"[{"user": "alice", "status_code": 200}, {"user": "bob"}]"#;
        assert_eq!(parse_json_records(array).unwrap().len(), 2);

        let lines = "{\"user\": \"alice\"}\n\n{\"user\": \"bob\", \"ip_address\": null}\n";
        let records = parse_json_records(lines).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[1].contains("ip_address"));
    }

    #[test]
    fn test_json_lines_reports_bad_line() {
        let err = parse_json_lines("{\"user\": \"alice\"}\n{broken\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_read_records_detects_format() {
        let mut file = tempfile::Builder::new().suffix(".log").tempfile().unwrap();
        writeln!(file, "first message").unwrap();
        writeln!(file, "second message").unwrap();

        let records = read_records(file.path(), InputFormat::Auto).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("message").as_deref(), Some("first message"));
    }
}
