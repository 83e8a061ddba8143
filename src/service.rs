//! Detection Service
//!
//! エンジンを所有する非同期オーケストレーション層。
//!
//! - 学習は非同期 Mutex で直列化し、ブロッキングスレッドで新しい状態を計算する
//! - 状態の差し替えは書き込みロック下の1回の代入（予測は旧状態か新状態のどちらかを見る）
//! - 予測は `Arc` スナップショットを取ってブロッキングスレッドで実行する

use crate::engine::{AnomalyEngine, Verdict};
use crate::error::{Error, Result};
use crate::explain::ThreatCategory;
use crate::models::TrainingSummary;
use crate::record::LogRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// 判定結果の保存先
#[async_trait]
pub trait VerdictStore: Send + Sync + std::fmt::Debug {
    async fn store(&self, session_id: &str, verdicts: &[Verdict]) -> Result<()>;
    async fn load(&self, session_id: &str) -> Result<Option<Vec<Verdict>>>;
}

/// メモリ上の保存先
#[derive(Debug, Default)]
pub struct InMemoryVerdictStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Verdict>>>>,
}

impl InMemoryVerdictStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl VerdictStore for InMemoryVerdictStore {
    async fn store(&self, session_id: &str, verdicts: &[Verdict]) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.to_string(), verdicts.to_vec());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Vec<Verdict>>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }
}

/// 通知イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DetectionEvent {
    TrainingCompleted {
        summary: TrainingSummary,
    },
    DetectionCompleted {
        session_id: String,
        total_analyzed: usize,
        anomalies_detected: usize,
    },
}

/// 学習・検知完了の通知先（ベストエフォート）
#[async_trait]
pub trait DetectionNotifier: Send + Sync {
    async fn notify(&self, event: &DetectionEvent);
}

/// ログに出力する通知先
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl DetectionNotifier for TracingNotifier {
    async fn notify(&self, event: &DetectionEvent) {
        match event {
            DetectionEvent::TrainingCompleted { summary } => info!(
                samples = summary.samples_trained,
                features = summary.feature_dimensionality,
                models = ?summary.models_trained,
                "training completed"
            ),
            DetectionEvent::DetectionCompleted {
                session_id,
                total_analyzed,
                anomalies_detected,
            } => info!(
                session_id = %session_id,
                total = total_analyzed,
                anomalies = anomalies_detected,
                "detection completed"
            ),
        }
    }
}

/// broadcast チャネルに配信する通知先
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<DetectionEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl DetectionNotifier for BroadcastNotifier {
    async fn notify(&self, event: &DetectionEvent) {
        // 受信者がいない場合は破棄
        let _ = self.sender.send(event.clone());
    }
}

/// 検知結果の集計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_analyzed: usize,
    pub anomalies_detected: usize,
    pub normal_behavior: usize,
    /// 異常率（パーセント）
    pub anomaly_rate: f64,
}

impl ReportSummary {
    fn from_verdicts(verdicts: &[Verdict]) -> Self {
        let total_analyzed = verdicts.len();
        let anomalies_detected = verdicts.iter().filter(|v| v.is_anomaly).count();
        let anomaly_rate = if total_analyzed == 0 {
            0.0
        } else {
            anomalies_detected as f64 / total_analyzed as f64 * 100.0
        };
        Self {
            total_analyzed,
            anomalies_detected,
            normal_behavior: total_analyzed - anomalies_detected,
            anomaly_rate,
        }
    }
}

/// 検知レポート
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub session_id: String,
    pub verdicts: Vec<Verdict>,
    pub summary: ReportSummary,
    /// 異常判定の脅威カテゴリ別件数
    pub category_counts: BTreeMap<ThreatCategory, usize>,
    /// 使用した学習済み状態の概要
    pub training: TrainingSummary,
    /// 保存先への書き込みに成功したか
    pub stored: bool,
}

/// 検知サービス
pub struct DetectionService {
    engine: RwLock<AnomalyEngine>,
    train_gate: Mutex<()>,
    store: Option<Arc<dyn VerdictStore>>,
    notifiers: Vec<Arc<dyn DetectionNotifier>>,
}

impl DetectionService {
    pub fn new(engine: AnomalyEngine) -> Self {
        Self {
            engine: RwLock::new(engine),
            train_gate: Mutex::new(()),
            store: None,
            notifiers: Vec::new(),
        }
    }

    /// 保存先を設定
    pub fn with_store(mut self, store: Arc<dyn VerdictStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 通知先を追加
    pub fn with_notifier(mut self, notifier: Arc<dyn DetectionNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub async fn is_trained(&self) -> bool {
        self.engine.read().await.is_trained()
    }

    /// 現在の学習概要
    pub async fn training_summary(&self) -> Option<TrainingSummary> {
        self.engine
            .read()
            .await
            .state()
            .map(|state| state.summary().clone())
    }

    /// 学習して状態を差し替え
    pub async fn train(&self, records: Vec<LogRecord>) -> Result<TrainingSummary> {
        let _gate = self.train_gate.lock().await;

        let engine = self.engine.read().await.clone();
        let state = tokio::task::spawn_blocking(move || engine.train(&records))
            .await
            .map_err(worker_error)??;

        let summary = state.summary().clone();
        self.engine.write().await.install(state);

        self.broadcast(&DetectionEvent::TrainingCompleted {
            summary: summary.clone(),
        })
        .await;
        Ok(summary)
    }

    /// 現在の状態で検知してレポートを返す
    pub async fn detect(&self, records: Vec<LogRecord>) -> Result<DetectionReport> {
        let engine = self.engine.read().await.clone();
        let training = engine
            .state()
            .map(|state| state.summary().clone())
            .ok_or_else(|| {
                Error::NotTrained("detect called before a successful training run".to_string())
            })?;

        let verdicts = tokio::task::spawn_blocking(move || engine.predict(&records))
            .await
            .map_err(worker_error)??;

        let session_id = Uuid::new_v4().to_string();
        let stored = self.persist(&session_id, &verdicts).await;

        let summary = ReportSummary::from_verdicts(&verdicts);
        let mut category_counts = BTreeMap::new();
        for verdict in verdicts.iter().filter(|v| v.is_anomaly) {
            *category_counts.entry(verdict.threat_category).or_insert(0) += 1;
        }

        info!(
            "Detection session {}: {} of {} records anomalous ({:.1}%)",
            session_id, summary.anomalies_detected, summary.total_analyzed, summary.anomaly_rate
        );

        self.broadcast(&DetectionEvent::DetectionCompleted {
            session_id: session_id.clone(),
            total_analyzed: summary.total_analyzed,
            anomalies_detected: summary.anomalies_detected,
        })
        .await;

        Ok(DetectionReport {
            session_id,
            verdicts,
            summary,
            category_counts,
            training,
            stored,
        })
    }

    /// 学習済み状態を JSON ブロブとして取り出す
    pub async fn export_model(&self) -> Result<String> {
        self.engine.read().await.to_blob()
    }

    /// JSON ブロブを検証して状態を差し替え
    pub async fn import_model(&self, blob: String) -> Result<TrainingSummary> {
        let _gate = self.train_gate.lock().await;
        let engine = self.engine.read().await.clone();
        let state = tokio::task::spawn_blocking(move || engine.load_blob(&blob))
            .await
            .map_err(worker_error)??;

        let summary = state.summary().clone();
        self.engine.write().await.install(state);
        Ok(summary)
    }

    async fn persist(&self, session_id: &str, verdicts: &[Verdict]) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.store(session_id, verdicts).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to store verdicts for session {}: {}", session_id, e);
                false
            }
        }
    }

    async fn broadcast(&self, event: &DetectionEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event).await;
        }
    }
}

fn worker_error(e: tokio::task::JoinError) -> Error {
    Error::model("engine", format!("blocking worker failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[derive(Debug)]
    struct FailingStore;

    #[async_trait]
    impl VerdictStore for FailingStore {
        async fn store(&self, _session_id: &str, _verdicts: &[Verdict]) -> Result<()> {
            Err(Error::Storage("disk full".to_string()))
        }

        async fn load(&self, _session_id: &str) -> Result<Option<Vec<Verdict>>> {
            Ok(None)
        }
    }

    fn records(n: usize) -> Vec<LogRecord> {
        (0..n)
            .map(|i| {
                LogRecord::new()
                    .with("timestamp", format!("2024-01-17T{:02}:30:00", 9 + i % 8))
                    .with("user", ["alice", "bob"][i % 2])
                    .with("action", "read")
                    .with("status", "success")
            })
            .collect()
    }

    fn service() -> DetectionService {
        DetectionService::new(AnomalyEngine::new(EngineConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_detect_before_train() {
        let err = service().detect(records(2)).await.unwrap_err();
        assert!(matches!(err, Error::NotTrained(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_verdicts() {
        let service = service().with_store(Arc::new(FailingStore));
        service.train(records(24)).await.unwrap();

        let report = service.detect(records(4)).await.unwrap();
        assert!(!report.stored);
        assert_eq!(report.verdicts.len(), 4);
        assert_eq!(report.summary.total_analyzed, 4);
    }

    #[tokio::test]
    async fn test_broadcast_notifier_receives_events() {
        let notifier = Arc::new(BroadcastNotifier::new(8));
        let mut events = notifier.subscribe();
        let service = service().with_notifier(notifier.clone());

        service.train(records(24)).await.unwrap();
        match events.recv().await.unwrap() {
            DetectionEvent::TrainingCompleted { summary } => {
                assert_eq!(summary.samples_trained, 24)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_report_summary_rate() {
        let summary = ReportSummary::from_verdicts(&[]);
        assert_eq!(summary.anomaly_rate, 0.0);
        assert_eq!(summary.normal_behavior, 0);
    }
}
