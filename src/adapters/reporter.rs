use crate::domain::ports::StageReporter;
use crate::domain::stage::{StageKind, StageReport};

/// Human-readable lines describing a finished stage.
pub fn describe(report: &StageReport) -> Vec<String> {
    let mut lines = Vec::new();
    match report {
        StageReport::VehicleLookup {
            make_model,
            market_value,
            cost_scale_factor,
        } => {
            lines.push(format!("Vehicle Identified from Database: {}", make_model));
            lines.push(format!("Pre-Accident Value: £{:.2}", market_value));
            lines.push(format!("Cost scale factor: {:.4}", cost_scale_factor));
        }
        StageReport::DamageLocalization { label, corrected, .. } => {
            let suffix = if *corrected { " (sides corrected)" } else { "" };
            lines.push(format!("Damage Location in Images: {}{}", label, suffix));
        }
        StageReport::FraudCheck(fraud) => match &fraud.value {
            Some(verdict) if verdict.fraudulent => {
                lines.push(format!("⚠️ Fraud detected: {}", verdict.description))
            }
            Some(_) => lines.push("✅ No fraud detected".to_string()),
            None => lines.push(format!("Fraud check returned: {}", fraud.raw.trim())),
        },
        StageReport::RepairPlan { job_card, attempts } => {
            if *attempts > 1 {
                lines.push(format!("Repair plan needed {} attempts", attempts));
            }
            lines.push(job_card.clone());
        }
        StageReport::CostEstimation(cost) => match cost.value {
            Some(amount) => lines.push(format!("The cost of the repair is: £{:.2}", amount)),
            None => lines.push(format!("The cost of the repair is: {}", cost.raw.trim())),
        },
        StageReport::DrivabilityAndTriage { drivability, triage } => {
            match &drivability.value {
                Some(verdict) if verdict.drivable => {
                    lines.push("✅ The vehicle is safe to drive.".to_string())
                }
                Some(verdict) => {
                    lines.push("❌ The vehicle is not safe to drive.".to_string());
                    lines.push(verdict.reason.clone());
                }
                None => lines.push(format!("Drivability: {}", drivability.raw.trim())),
            }
            match &triage.value {
                Some(verdict) => {
                    lines.push(format!("Triage decision: {}", verdict.decision));
                    if let Some(note) = &verdict.override_note {
                        lines.push(format!("⚠️ {}", note));
                    }
                    lines.push(verdict.summary.clone());
                }
                None => lines.push(format!("Triage: {}", triage.raw.trim())),
            }
        }
    }

    for notice in report.notices() {
        lines.push(format!("Failed to decode: {}", notice));
    }
    lines
}

/// Prints progress and results to stdout for the CLI.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl StageReporter for ConsoleReporter {
    fn stage_started(&self, _stage: StageKind, status_label: &str) {
        println!("⏳ {}", status_label);
    }

    fn stage_completed(&self, _stage: StageKind, report: &StageReport) {
        for line in describe(report) {
            println!("{}", line);
        }
        println!();
    }

    fn stage_failed(&self, stage: StageKind, message: &str) {
        eprintln!("❌ {} failed: {}", stage, message);
    }
}

/// Sends stage results to the log only.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl StageReporter for TracingReporter {
    fn stage_started(&self, stage: StageKind, status_label: &str) {
        tracing::debug!("{}: {}", stage, status_label);
    }

    fn stage_completed(&self, stage: StageKind, report: &StageReport) {
        for line in describe(report) {
            tracing::info!(stage = stage.name(), "{}", line);
        }
    }

    fn stage_failed(&self, stage: StageKind, message: &str) {
        tracing::error!(stage = stage.name(), "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FraudVerdict;
    use crate::domain::stage::Decoded;
    use crate::utils::error::AssessmentError;

    #[test]
    fn test_fraud_lines() {
        let flagged = StageReport::FraudCheck(Decoded::ok(
            "{}",
            FraudVerdict {
                fraudulent: true,
                description: "Watermark visible".to_string(),
            },
        ));
        assert_eq!(describe(&flagged), vec!["⚠️ Fraud detected: Watermark visible"]);
    }

    #[test]
    fn test_decode_failure_is_labelled() {
        let err = AssessmentError::parse("cost estimation", "'lots' is not a repair cost");
        let lines = describe(&StageReport::CostEstimation(Decoded::failed("lots", &err)));
        assert_eq!(lines[0], "The cost of the repair is: lots");
        assert!(lines[1].starts_with("Failed to decode:"));
    }
}
