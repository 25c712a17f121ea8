use crate::core::cost_model::CostTable;
use crate::core::disambiguation::Localization;
use crate::domain::model::{DrivabilityVerdict, FraudVerdict, SessionInput, TriageVerdict, VehicleRecord};
use crate::domain::ports::StageReporter;
use crate::domain::repair_plan::RepairPlan;
use crate::domain::stage::{Decoded, StageKind, StageReport};
use crate::utils::error::{AssessmentError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Repair plan accepted by the repair-plan stage.
#[derive(Debug, Clone)]
pub struct GeneratedPlan {
    /// Cleaned JSON text that later prompts quote.
    pub context: String,
    pub plan: RepairPlan,
    pub attempts: u8,
}

#[derive(Debug, Clone)]
pub struct CostEstimate {
    pub narrative: String,
    pub amount: Decoded<f64>,
}

impl CostEstimate {
    /// Two-decimal amount when it decoded, the extraction answer otherwise.
    pub fn prompt_text(&self) -> String {
        match self.amount.value {
            Some(amount) => format!("{:.2}", amount),
            None => self.amount.raw.trim().to_string(),
        }
    }
}

/// Everything one session has produced so far. Each stage takes the state
/// by value and hands back an extended copy.
#[derive(Debug, Clone)]
pub struct AssessmentState {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub input: SessionInput,
    pub vehicle: Option<VehicleRecord>,
    pub cost_table: Option<CostTable>,
    pub localization: Option<Localization>,
    pub fraud: Option<Decoded<FraudVerdict>>,
    pub repair_plan: Option<GeneratedPlan>,
    pub cost_estimate: Option<CostEstimate>,
    pub drivability: Option<Decoded<DrivabilityVerdict>>,
    pub triage: Option<Decoded<TriageVerdict>>,
}

impl AssessmentState {
    pub fn new(input: SessionInput) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            input,
            vehicle: None,
            cost_table: None,
            localization: None,
            fraud: None,
            repair_plan: None,
            cost_estimate: None,
            drivability: None,
            triage: None,
        }
    }

    pub fn vehicle(&self, stage: StageKind) -> Result<&VehicleRecord> {
        self.vehicle.as_ref().ok_or_else(|| missing(stage, "vehicle record"))
    }

    pub fn cost_table(&self, stage: StageKind) -> Result<&CostTable> {
        self.cost_table.as_ref().ok_or_else(|| missing(stage, "cost table"))
    }

    pub fn localization(&self, stage: StageKind) -> Result<&Localization> {
        self.localization
            .as_ref()
            .ok_or_else(|| missing(stage, "damage location"))
    }

    pub fn repair_plan(&self, stage: StageKind) -> Result<&GeneratedPlan> {
        self.repair_plan.as_ref().ok_or_else(|| missing(stage, "repair plan"))
    }

    pub fn cost_estimate(&self, stage: StageKind) -> Result<&CostEstimate> {
        self.cost_estimate
            .as_ref()
            .ok_or_else(|| missing(stage, "cost estimate"))
    }
}

fn missing(stage: StageKind, what: &str) -> AssessmentError {
    AssessmentError::StageError {
        stage: stage.name().to_string(),
        details: format!("{} has not been produced yet", what),
    }
}

pub struct StageOutcome {
    pub state: AssessmentState,
    pub report: StageReport,
}

#[async_trait::async_trait]
pub trait AssessmentStage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Shown while the stage is in flight.
    fn status_label(&self) -> &str;

    async fn run(&self, state: AssessmentState) -> Result<StageOutcome>;
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: StageKind,
    pub report: StageReport,
    pub duration: Duration,
}

pub struct SequenceOutput {
    pub state: AssessmentState,
    pub results: Vec<StageResult>,
}

/// Runs stages strictly in order. The first error aborts the session.
pub struct StageSequence {
    stages: Vec<Box<dyn AssessmentStage>>,
    reporter: Arc<dyn StageReporter>,
}

impl StageSequence {
    pub fn new(reporter: Arc<dyn StageReporter>) -> Self {
        Self {
            stages: Vec::new(),
            reporter,
        }
    }

    pub fn add_stage(&mut self, stage: Box<dyn AssessmentStage>) {
        self.stages.push(stage);
    }

    pub async fn execute_all(&self, mut state: AssessmentState) -> Result<SequenceOutput> {
        let mut results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let kind = stage.kind();
            let start_time = Instant::now();
            self.reporter.stage_started(kind, stage.status_label());
            tracing::info!("▶️ {} ({})", kind, stage.status_label());

            match stage.run(state).await {
                Ok(outcome) => {
                    let duration = start_time.elapsed();
                    for notice in outcome.report.notices() {
                        tracing::warn!("⚠️ {}: {}", kind, notice);
                    }
                    tracing::info!("✅ Stage completed: {} (duration: {:?})", kind, duration);

                    self.reporter.stage_completed(kind, &outcome.report);
                    results.push(StageResult {
                        stage: kind,
                        report: outcome.report,
                        duration,
                    });
                    state = outcome.state;
                }
                Err(e) => {
                    tracing::error!(
                        "❌ Stage failed: {} after {:?}: {} (Category: {:?})",
                        kind,
                        start_time.elapsed(),
                        e,
                        e.category()
                    );
                    self.reporter.stage_failed(kind, &e.user_friendly_message());
                    return Err(e);
                }
            }
        }

        Ok(SequenceOutput { state, results })
    }

    pub fn execution_summary(results: &[StageResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let notices: usize = results.iter().map(|r| r.report.notices().len()).sum();
        let executed: Vec<serde_json::Value> = results
            .iter()
            .map(|r| serde_json::Value::String(r.stage.name().to_string()))
            .collect();

        summary.insert("total_stages".to_string(), serde_json::Value::from(results.len()));
        summary.insert("decode_notices".to_string(), serde_json::Value::from(notices));
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::from(total_duration.as_millis() as u64),
        );
        summary.insert("executed_stages".to_string(), serde_json::Value::Array(executed));
        summary
    }
}
