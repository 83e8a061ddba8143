//! Test Data
//!
//! テスト用の共通データとヘルパー関数

use log_anomaly_rs::LogRecord;

/// 学習データに登場するユーザーと対応する内部 IP
pub const KNOWN_USERS: [(&str, &str); 4] = [
    ("john_doe", "192.168.1.10"),
    ("jane_smith", "192.168.1.11"),
    ("web_user", "192.168.1.20"),
    ("backup_service", "10.0.0.5"),
];

/// 学習データに登場する操作
pub const KNOWN_ACTIONS: [&str; 3] = ["login", "file_read", "logout"];

fn record(day: u32, hour: u32, minute: u32, user: usize, action: usize) -> LogRecord {
    let (name, ip) = KNOWN_USERS[user];
    LogRecord::new()
        .with("timestamp", format!("2024-01-{:02}T{:02}:{:02}:00", day, hour, minute))
        .with("user", name)
        .with("action", KNOWN_ACTIONS[action])
        .with("ip_address", ip)
        .with("status", "success")
}

/// 平日 9-17 時の業務ログ（決定的に生成）
///
/// 2024-01-15 (月) 〜 2024-01-19 (金)。ユーザーと IP は常に対応している。
pub fn business_hours_records(n: usize) -> Vec<LogRecord> {
    (0..n)
        .map(|i| {
            record(
                15 + (i % 5) as u32,
                9 + ((i * 7) % 9) as u32,
                ((i * 13) % 60) as u32,
                i % 4,
                (i / 4) % 3,
            )
        })
        .collect()
}

/// 学習分布の中心付近にある正常ログ
pub fn normal_records() -> Vec<LogRecord> {
    vec![
        record(16, 12, 5, 1, 1),
        record(16, 13, 40, 2, 1),
        record(17, 13, 15, 1, 1),
        record(17, 12, 50, 2, 1),
        record(17, 14, 0, 1, 1),
        record(18, 13, 30, 2, 1),
        record(18, 12, 20, 1, 1),
        record(18, 14, 10, 2, 1),
    ]
}

/// 深夜・週末・未知の値を組み合わせた不審ログ
pub fn suspicious_records() -> Vec<LogRecord> {
    vec![
        // 日曜深夜、未知ユーザーの外部 IP からのログイン失敗
        LogRecord::new()
            .with("timestamp", "2024-01-21T03:00:00")
            .with("user", "unknown_user")
            .with("action", "login_attempt")
            .with("ip_address", "203.0.113.1")
            .with("status", "failed"),
        // 土曜深夜、管理者による機密ファイルへのアクセス
        LogRecord::new()
            .with("timestamp", "2024-01-20T02:30:00")
            .with("user", "admin")
            .with("action", "file_access")
            .with("ip_address", "10.0.0.99")
            .with("status", "success")
            .with("resource", "/etc/passwd"),
        // 土曜深夜の大量エクスポート
        LogRecord::new()
            .with("timestamp", "2024-01-20T02:00:00")
            .with("user", "backup_service")
            .with("action", "bulk_export")
            .with("ip_address", "10.0.0.5")
            .with("status", "success"),
    ]
}

/// テキストを含む学習ログ（TF-IDF ブロックの確認用）
pub fn message_records(n: usize) -> Vec<LogRecord> {
    const MESSAGES: [&str; 4] = [
        "user session opened successfully",
        "report generated for quarterly review",
        "cache refreshed for dashboard widgets",
        "user session closed normally",
    ];
    business_hours_records(n)
        .into_iter()
        .enumerate()
        .map(|(i, record)| record.with("message", MESSAGES[i % MESSAGES.len()]))
        .collect()
}

/// Apache / syslog / 汎用の生ログ行
pub fn raw_log_lines() -> &'static str {
    concat!(
        "192.168.1.10 - john_doe [15/Jan/2024:10:15:32 +0000] \"GET /reports/q4 HTTP/1.1\" 200 5120\n",
        "192.168.1.11 - jane_smith [15/Jan/2024:11:02:11 +0000] \"GET /dashboard HTTP/1.1\" 200 2048\n",
        "Jan 15 12:30:00 web01 sshd[2201]: Accepted publickey for deploy from 192.168.1.20\n",
        "\n",
        "nightly backup finished without warnings\n",
    )
}
