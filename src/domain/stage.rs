use crate::domain::model::{DrivabilityVerdict, FraudVerdict, TriageVerdict};
use crate::utils::error::AssessmentError;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    VehicleLookup,
    DamageLocalization,
    FraudCheck,
    RepairPlan,
    CostEstimation,
    DrivabilityAndTriage,
}

impl StageKind {
    pub const ORDER: [StageKind; 6] = [
        StageKind::VehicleLookup,
        StageKind::DamageLocalization,
        StageKind::FraudCheck,
        StageKind::RepairPlan,
        StageKind::CostEstimation,
        StageKind::DrivabilityAndTriage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::VehicleLookup => "vehicle lookup",
            StageKind::DamageLocalization => "damage localization",
            StageKind::FraudCheck => "fraud check",
            StageKind::RepairPlan => "repair plan",
            StageKind::CostEstimation => "cost estimation",
            StageKind::DrivabilityAndTriage => "drivability and triage",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Model text together with whatever structure could be read out of it.
/// The raw text is always kept so later prompts can still use it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decoded<T> {
    pub raw: String,
    pub value: Option<T>,
    pub notice: Option<String>,
}

impl<T> Decoded<T> {
    pub fn ok(raw: impl Into<String>, value: T) -> Self {
        Self {
            raw: raw.into(),
            value: Some(value),
            notice: None,
        }
    }

    pub fn failed(raw: impl Into<String>, error: &AssessmentError) -> Self {
        Self {
            raw: raw.into(),
            value: None,
            notice: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageReport {
    VehicleLookup {
        make_model: String,
        market_value: f64,
        cost_scale_factor: f64,
    },
    DamageLocalization {
        label: String,
        corrected: bool,
        notice: Option<String>,
    },
    FraudCheck(Decoded<FraudVerdict>),
    RepairPlan {
        job_card: String,
        attempts: u8,
    },
    CostEstimation(Decoded<f64>),
    DrivabilityAndTriage {
        drivability: Decoded<DrivabilityVerdict>,
        triage: Decoded<TriageVerdict>,
    },
}

impl StageReport {
    pub fn kind(&self) -> StageKind {
        match self {
            StageReport::VehicleLookup { .. } => StageKind::VehicleLookup,
            StageReport::DamageLocalization { .. } => StageKind::DamageLocalization,
            StageReport::FraudCheck(_) => StageKind::FraudCheck,
            StageReport::RepairPlan { .. } => StageKind::RepairPlan,
            StageReport::CostEstimation(_) => StageKind::CostEstimation,
            StageReport::DrivabilityAndTriage { .. } => StageKind::DrivabilityAndTriage,
        }
    }

    /// Decode failures that the caller must be told about.
    pub fn notices(&self) -> Vec<String> {
        let notices = match self {
            StageReport::DamageLocalization { notice, .. } => vec![notice.clone()],
            StageReport::FraudCheck(fraud) => vec![fraud.notice.clone()],
            StageReport::CostEstimation(cost) => vec![cost.notice.clone()],
            StageReport::DrivabilityAndTriage {
                drivability,
                triage,
            } => vec![drivability.notice.clone(), triage.notice.clone()],
            StageReport::VehicleLookup { .. } | StageReport::RepairPlan { .. } => Vec::new(),
        };
        notices.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notices_collect_decode_failures_only() {
        let err = AssessmentError::parse("drivability", "expected value at line 1");
        let report = StageReport::DrivabilityAndTriage {
            drivability: Decoded::failed("not json", &err),
            triage: Decoded::ok(
                "Spoke Site",
                TriageVerdict {
                    decision: crate::domain::model::TriageDecision::SpokeSite,
                    rationale: "minor".to_string(),
                    summary: "minor".to_string(),
                    override_note: None,
                },
            ),
        };

        let notices = report.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("drivability"));
        assert_eq!(report.kind(), StageKind::DrivabilityAndTriage);
    }
}
