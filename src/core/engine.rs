use crate::core::assessment::{AssessmentState, StageResult, StageSequence};
use crate::core::cost_model::CostTable;
use crate::core::disambiguation::Localization;
use crate::core::stages::{standard_sequence, Services};
use crate::domain::model::{DrivabilityVerdict, FraudVerdict, SessionInput, TriageVerdict, VehicleRecord};
use crate::domain::ports::{StageReporter, Storage};
use crate::domain::repair_plan::RepairPlan;
use crate::domain::stage::{Decoded, StageKind};
use crate::utils::error::{AssessmentError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub stage: StageKind,
    pub duration_ms: u64,
}

/// Final outcome of one assessment session.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub prompt_version: String,
    pub vehicle: VehicleRecord,
    pub cost_table: CostTable,
    pub damage_location: Localization,
    pub fraud: Decoded<FraudVerdict>,
    pub repair_plan: RepairPlan,
    pub repair_plan_attempts: u8,
    pub job_card: String,
    pub cost_narrative: String,
    pub repair_cost: Decoded<f64>,
    pub drivability: Decoded<DrivabilityVerdict>,
    pub triage: Decoded<TriageVerdict>,
    pub notices: Vec<String>,
    pub stages: Vec<StageTiming>,
}

impl AssessmentReport {
    pub fn from_state(state: AssessmentState, results: &[StageResult], prompt_version: &str) -> Result<Self> {
        let incomplete = |what: &str| AssessmentError::StageError {
            stage: "report".to_string(),
            details: format!("session finished without a {}", what),
        };

        let generated = state.repair_plan.ok_or_else(|| incomplete("repair plan"))?;
        let estimate = state.cost_estimate.ok_or_else(|| incomplete("cost estimate"))?;

        Ok(Self {
            session_id: state.session_id,
            started_at: state.started_at,
            completed_at: Utc::now(),
            prompt_version: prompt_version.to_string(),
            vehicle: state.vehicle.ok_or_else(|| incomplete("vehicle record"))?,
            cost_table: state.cost_table.ok_or_else(|| incomplete("cost table"))?,
            damage_location: state.localization.ok_or_else(|| incomplete("damage location"))?,
            fraud: state.fraud.ok_or_else(|| incomplete("fraud verdict"))?,
            job_card: generated.plan.job_card(),
            repair_plan: generated.plan,
            repair_plan_attempts: generated.attempts,
            cost_narrative: estimate.narrative,
            repair_cost: estimate.amount,
            drivability: state.drivability.ok_or_else(|| incomplete("drivability verdict"))?,
            triage: state.triage.ok_or_else(|| incomplete("triage verdict"))?,
            notices: results
                .iter()
                .flat_map(|r| {
                    r.report
                        .notices()
                        .into_iter()
                        .map(move |notice| format!("{}: {}", r.stage, notice))
                })
                .collect(),
            stages: results
                .iter()
                .map(|r| StageTiming {
                    stage: r.stage,
                    duration_ms: r.duration.as_millis() as u64,
                })
                .collect(),
        })
    }

    /// Writes `<session>/report.json` and optionally `<session>/job_card.txt`,
    /// returning the relative paths written.
    pub async fn persist<S: Storage>(&self, storage: &S, write_job_card: bool) -> Result<Vec<String>> {
        let mut written = Vec::new();

        let report_path = format!("{}/report.json", self.session_id);
        let report_json = serde_json::to_vec_pretty(self)?;
        storage.write_file(&report_path, &report_json).await?;
        written.push(report_path);

        if write_job_card {
            let card_path = format!("{}/job_card.txt", self.session_id);
            storage.write_file(&card_path, self.job_card.as_bytes()).await?;
            written.push(card_path);
        }

        tracing::debug!("💾 Report files written: {:?}", written);
        Ok(written)
    }
}

pub struct AssessmentEngine {
    sequence: StageSequence,
    prompt_version: String,
}

impl AssessmentEngine {
    pub fn new(services: Arc<Services>, reporter: Arc<dyn StageReporter>) -> Self {
        let prompt_version = services.prompts.version().to_string();
        Self {
            sequence: standard_sequence(services, reporter),
            prompt_version,
        }
    }

    pub async fn run(&self, input: SessionInput) -> Result<AssessmentReport> {
        input.validate()?;

        let state = AssessmentState::new(input);
        tracing::info!(
            "Starting assessment {} for {} ({} image(s), prompts {})",
            state.session_id,
            state.input.registration,
            state.input.images.len(),
            self.prompt_version
        );

        let output = self.sequence.execute_all(state).await?;
        let summary = StageSequence::execution_summary(&output.results);
        tracing::info!("📊 Assessment summary: {:?}", summary);

        AssessmentReport::from_state(output.state, &output.results, &self.prompt_version)
    }
}
