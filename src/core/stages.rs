//! The six assessment stages and the services they share.

use crate::config::prompts::PromptSet;
use crate::config::toml_config::AppConfig;
use crate::core::assessment::{
    AssessmentStage, AssessmentState, CostEstimate, GeneratedPlan, StageOutcome, StageSequence,
};
use crate::core::cost_model::CostModel;
use crate::core::disambiguation::DamageLocalizer;
use crate::core::normalizer;
use crate::domain::model::{
    DamageImage, DataPackage, DrivabilityVerdict, FraudVerdict, PackageRecord, TriageDecision,
    TriageVerdict, VehicleRecord,
};
use crate::domain::ports::{InferenceClient, StageReporter, VehicleDataProvider, VisionRequest};
use crate::domain::repair_plan::{RawRepairPlan, RepairPlan};
use crate::domain::stage::{Decoded, StageKind, StageReport};
use crate::utils::error::{AssessmentError, Result};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Repair-plan generation gets one retry, never more.
pub const REPAIR_PLAN_ATTEMPTS: u8 = 2;

/// Costs carry two decimals; a comparison within half a penny of the
/// threshold counts as reaching it.
const THRESHOLD_TOLERANCE: f64 = 0.005;

#[derive(Debug, Clone)]
pub struct AssessmentSettings {
    pub reasoning_model: String,
    pub utility_model: String,
    pub total_loss_ratio: f64,
    pub repair_invalid_json: bool,
}

impl AssessmentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            reasoning_model: config.inference.reasoning_model.clone(),
            utility_model: config.inference.utility_model.clone(),
            total_loss_ratio: config.triage.total_loss_ratio,
            repair_invalid_json: config.inference.repair_invalid_json,
        }
    }
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            reasoning_model: "gpt-4-turbo-preview".to_string(),
            utility_model: "gpt-3.5-turbo-0125".to_string(),
            total_loss_ratio: 0.6,
            repair_invalid_json: true,
        }
    }
}

/// Collaborators shared by every stage of a session.
pub struct Services {
    pub inference: Arc<dyn InferenceClient>,
    pub vehicles: Arc<dyn VehicleDataProvider>,
    pub prompts: PromptSet,
    pub cost_model: CostModel,
    pub reference_images: Vec<DamageImage>,
    pub settings: AssessmentSettings,
}

impl Services {
    async fn vision(
        &self,
        state: &AssessmentState,
        reference_images: &[DamageImage],
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String> {
        self.inference
            .vision_completion(VisionRequest {
                subject_images: &state.input.images,
                reference_images,
                system_prompt,
                user_prompt,
            })
            .await
    }

    async fn utility_text(&self, system_template: &str, user_template: &str, vars: &[(&str, &str)]) -> Result<String> {
        let system_prompt = self.prompts.render(system_template, &[])?;
        let user_prompt = self.prompts.render(user_template, vars)?;
        self.inference
            .text_completion(&self.settings.utility_model, &system_prompt, &user_prompt)
            .await
    }

    /// Normalizes a verdict. When that fails and repair is enabled, the
    /// utility model is asked once to restate the text as bare JSON.
    async fn decode_verdict<T: DeserializeOwned>(&self, stage: StageKind, raw: String) -> Result<Decoded<T>> {
        let first_error = match normalizer::normalize::<T>(stage.name(), &raw) {
            Ok(value) => return Ok(Decoded::ok(raw, value)),
            Err(e) => e,
        };

        if !self.settings.repair_invalid_json {
            return Ok(Decoded::failed(raw, &first_error));
        }

        tracing::debug!("🔧 Asking for a JSON rewrite of the {} verdict: {}", stage, first_error);
        let repaired = self
            .utility_text("json_repair_system", "json_repair_user", &[("raw", &raw)])
            .await?;
        match normalizer::normalize::<T>(stage.name(), &repaired) {
            Ok(value) => Ok(Decoded::ok(raw, value)),
            Err(e) => Ok(Decoded::failed(raw, &e)),
        }
    }
}

pub fn standard_sequence(services: Arc<Services>, reporter: Arc<dyn StageReporter>) -> StageSequence {
    let mut sequence = StageSequence::new(reporter);
    sequence.add_stage(Box::new(VehicleLookupStage::new(services.clone())));
    sequence.add_stage(Box::new(DamageLocalizationStage::new(services.clone())));
    sequence.add_stage(Box::new(FraudCheckStage::new(services.clone())));
    sequence.add_stage(Box::new(RepairPlanStage::new(services.clone())));
    sequence.add_stage(Box::new(CostEstimationStage::new(services.clone())));
    sequence.add_stage(Box::new(DrivabilityTriageStage::new(services)));
    sequence
}

macro_rules! stage_struct {
    ($name:ident) => {
        pub struct $name {
            services: Arc<Services>,
        }

        impl $name {
            pub fn new(services: Arc<Services>) -> Self {
                Self { services }
            }
        }
    };
}

stage_struct!(VehicleLookupStage);
stage_struct!(DamageLocalizationStage);
stage_struct!(FraudCheckStage);
stage_struct!(RepairPlanStage);
stage_struct!(CostEstimationStage);
stage_struct!(DrivabilityTriageStage);

#[async_trait::async_trait]
impl AssessmentStage for VehicleLookupStage {
    fn kind(&self) -> StageKind {
        StageKind::VehicleLookup
    }

    fn status_label(&self) -> &str {
        "Fetching Vehicle Valuation and Data..."
    }

    async fn run(&self, mut state: AssessmentState) -> Result<StageOutcome> {
        let registration = state.input.registration.clone();
        let vehicles = &self.services.vehicles;

        let valuation = match vehicles.fetch(&registration, DataPackage::Valuation).await? {
            PackageRecord::Valuation(valuation) => valuation,
            PackageRecord::Specification(_) => return Err(wrong_package(DataPackage::Valuation)),
        };
        let specification = match vehicles.fetch(&registration, DataPackage::Specification).await? {
            PackageRecord::Specification(specification) => specification,
            PackageRecord::Valuation(_) => return Err(wrong_package(DataPackage::Specification)),
        };

        let vehicle = VehicleRecord::from_packages(&registration, valuation, specification);
        let cost_table = self.services.cost_model.scale(vehicle.market_value)?;
        tracing::info!(
            "🚗 Vehicle identified: {} valued at £{:.2}",
            vehicle.make_model(),
            vehicle.market_value
        );

        let report = StageReport::VehicleLookup {
            make_model: vehicle.make_model(),
            market_value: vehicle.market_value,
            cost_scale_factor: cost_table.scale_factor(),
        };
        state.vehicle = Some(vehicle);
        state.cost_table = Some(cost_table);
        Ok(StageOutcome { state, report })
    }
}

fn wrong_package(requested: DataPackage) -> AssessmentError {
    AssessmentError::FetchError {
        status: 200,
        reason: format!("lookup returned a different package than {}", requested.as_str()),
    }
}

#[async_trait::async_trait]
impl AssessmentStage for DamageLocalizationStage {
    fn kind(&self) -> StageKind {
        StageKind::DamageLocalization
    }

    fn status_label(&self) -> &str {
        "Determining Damage Location in Images..."
    }

    async fn run(&self, mut state: AssessmentState) -> Result<StageOutcome> {
        let make_model = state.vehicle(self.kind())?.make_model();
        let localizer = DamageLocalizer::new(
            self.services.inference.as_ref(),
            &self.services.prompts,
            &self.services.settings.utility_model,
        );
        let localization = localizer.localize(&state.input.images, &make_model).await?;

        let report = StageReport::DamageLocalization {
            label: localization.label.clone(),
            corrected: localization.corrected,
            notice: localization.notice.clone(),
        };
        state.localization = Some(localization);
        Ok(StageOutcome { state, report })
    }
}

#[async_trait::async_trait]
impl AssessmentStage for FraudCheckStage {
    fn kind(&self) -> StageKind {
        StageKind::FraudCheck
    }

    fn status_label(&self) -> &str {
        "Checking for Fraudulent Activity..."
    }

    async fn run(&self, mut state: AssessmentState) -> Result<StageOutcome> {
        let prompts = &self.services.prompts;
        let make_model = state.vehicle(self.kind())?.make_model();
        let damage_location = state.localization(self.kind())?.label.clone();

        let system_prompt = prompts.render("fraud_system", &[("make_model", &make_model)])?;
        let user_prompt = prompts.render(
            "fraud_user",
            &[
                ("fnol", &state.input.fnol_description),
                ("damage_location", &damage_location),
            ],
        )?;

        let raw = self.services.vision(&state, &[], &system_prompt, &user_prompt).await?;
        let fraud: Decoded<FraudVerdict> = self.services.decode_verdict(self.kind(), raw).await?;
        if let Some(verdict) = &fraud.value {
            if verdict.fraudulent {
                tracing::warn!("⚠️ Possible fraud, escalate to a senior: {}", verdict.description);
            }
        }

        state.fraud = Some(fraud.clone());
        Ok(StageOutcome {
            state,
            report: StageReport::FraudCheck(fraud),
        })
    }
}

impl RepairPlanStage {
    /// Describes where the example plan came from, matching the reference
    /// images actually attached to the call.
    fn example_source(&self) -> Result<String> {
        let prompts = &self.services.prompts;
        match self.services.reference_images.len() {
            0 => {
                tracing::warn!("⚠️ No reference images configured, sending the example plan as text only");
                prompts.render("repair_plan_text_only_source", &[])
            }
            count => prompts.render(
                "repair_plan_reference_source",
                &[("reference_count", &count.to_string())],
            ),
        }
    }

    fn decode_plan(raw: &str) -> Result<RepairPlan> {
        let parsed: RawRepairPlan = normalizer::normalize(StageKind::RepairPlan.name(), raw)?;
        RepairPlan::try_from(parsed)
    }
}

#[async_trait::async_trait]
impl AssessmentStage for RepairPlanStage {
    fn kind(&self) -> StageKind {
        StageKind::RepairPlan
    }

    fn status_label(&self) -> &str {
        "Creating Repair Plan..."
    }

    async fn run(&self, mut state: AssessmentState) -> Result<StageOutcome> {
        let prompts = &self.services.prompts;
        let make_model = state.vehicle(self.kind())?.make_model();
        let example = prompts.render("repair_plan_example", &[])?;
        let example_source = self.example_source()?;
        let system_prompt = prompts.render("repair_plan_system", &[])?;
        let user_prompt = prompts.render(
            "repair_plan_user",
            &[
                ("example_source", &example_source),
                ("example", &example),
                ("make_model", &make_model),
                ("fnol", &state.input.fnol_description),
            ],
        )?;

        let mut attempt = 0;
        let (raw, mut plan) = loop {
            attempt += 1;
            let raw = self
                .services
                .vision(&state, &self.services.reference_images, &system_prompt, &user_prompt)
                .await?;

            match Self::decode_plan(&raw) {
                Ok(plan) => break (raw, plan),
                Err(e @ (AssessmentError::ParseError { .. } | AssessmentError::InvariantError { .. }))
                    if attempt < REPAIR_PLAN_ATTEMPTS =>
                {
                    tracing::warn!("🔁 Repair plan attempt {} rejected, retrying: {}", attempt, e);
                }
                Err(e) => return Err(e),
            }
        };

        if plan.registration.trim().is_empty() {
            plan.registration = state.input.registration.clone();
        }
        tracing::info!(
            "🛠️ Repair plan accepted after {} attempt(s) with {} part operation(s)",
            attempt,
            plan.parts.len()
        );

        let report = StageReport::RepairPlan {
            job_card: plan.job_card(),
            attempts: attempt,
        };
        state.repair_plan = Some(GeneratedPlan {
            context: normalizer::clean(&raw),
            plan,
            attempts: attempt,
        });
        Ok(StageOutcome { state, report })
    }
}

/// Reads the bare amount the extraction call was asked for.
pub fn parse_amount(text: &str) -> Result<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('£')
        .trim_end_matches('.')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    match cleaned.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        _ => Err(AssessmentError::parse(
            StageKind::CostEstimation.name(),
            format!("'{}' is not a repair cost", text.trim()),
        )),
    }
}

#[async_trait::async_trait]
impl AssessmentStage for CostEstimationStage {
    fn kind(&self) -> StageKind {
        StageKind::CostEstimation
    }

    fn status_label(&self) -> &str {
        "Calculating Repair Costs..."
    }

    async fn run(&self, mut state: AssessmentState) -> Result<StageOutcome> {
        let services = &self.services;
        let plan_context = state.repair_plan(self.kind())?.context.clone();
        let cost_table = state.cost_table(self.kind())?.to_prompt_json();

        let system_prompt = services.prompts.render("cost_estimate_system", &[])?;
        let user_prompt = services.prompts.render(
            "cost_estimate_user",
            &[("repair_plan", &plan_context), ("cost_table", &cost_table)],
        )?;
        let narrative = services
            .inference
            .text_completion(&services.settings.reasoning_model, &system_prompt, &user_prompt)
            .await?;

        let extracted = services
            .utility_text(
                "cost_extract_system",
                "cost_extract_user",
                &[("cost_narrative", &narrative)],
            )
            .await?;
        let amount = match parse_amount(&extracted) {
            Ok(amount) => {
                tracing::info!("💷 Estimated repair cost: £{:.2}", amount);
                Decoded::ok(extracted, amount)
            }
            Err(e) => Decoded::failed(extracted, &e),
        };

        state.cost_estimate = Some(CostEstimate {
            narrative,
            amount: amount.clone(),
        });
        Ok(StageOutcome {
            state,
            report: StageReport::CostEstimation(amount),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriageResolution {
    pub decision: Option<TriageDecision>,
    pub overridden: bool,
}

/// Applies the total-loss threshold to the model's routing decision.
///
/// With a numeric cost and value, reaching `ratio` of the value is always
/// a total loss, and a total loss below it falls back to a hub site. With
/// either missing the model's decision stands.
pub fn resolve_triage(
    model_decision: Option<TriageDecision>,
    repair_cost: Option<f64>,
    market_value: f64,
    ratio: f64,
) -> TriageResolution {
    let Some(cost) = repair_cost.filter(|_| market_value.is_finite() && market_value > 0.0) else {
        return TriageResolution {
            decision: model_decision,
            overridden: false,
        };
    };

    let decision = if cost >= ratio * market_value - THRESHOLD_TOLERANCE {
        TriageDecision::TotalLoss
    } else {
        match model_decision {
            Some(TriageDecision::TotalLoss) => TriageDecision::HubSite,
            Some(other) => other,
            None => {
                return TriageResolution {
                    decision: None,
                    overridden: false,
                }
            }
        }
    };

    TriageResolution {
        decision: Some(decision),
        overridden: model_decision != Some(decision),
    }
}

/// Explains a threshold override; only called when a cost was decoded.
fn describe_override(
    model_answer: &str,
    decision: TriageDecision,
    repair_cost: f64,
    market_value: f64,
    total_loss_percent: &str,
) -> String {
    let comparison = if decision == TriageDecision::TotalLoss {
        "reaches"
    } else {
        "is below"
    };
    format!(
        "Triage answer '{}' overridden to {}: the repair cost £{:.2} {} {}% of the £{:.2} vehicle value",
        model_answer, decision, repair_cost, comparison, total_loss_percent, market_value
    )
}

/// `0.6` → `60`, `0.625` → `62.5`.
fn percent_text(ratio: f64) -> String {
    let text = format!("{:.2}", ratio * 100.0);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[async_trait::async_trait]
impl AssessmentStage for DrivabilityTriageStage {
    fn kind(&self) -> StageKind {
        StageKind::DrivabilityAndTriage
    }

    fn status_label(&self) -> &str {
        "Assessing Drivability, Triaging and Allocating..."
    }

    async fn run(&self, mut state: AssessmentState) -> Result<StageOutcome> {
        let services = &self.services;
        let prompts = &services.prompts;
        let vehicle = state.vehicle(self.kind())?;
        let make_model = vehicle.make_model();
        let market_value = vehicle.market_value;
        let plan_context = state.repair_plan(self.kind())?.context.clone();
        let estimate = state.cost_estimate(self.kind())?.clone();
        let fnol = state.input.fnol_description.clone();
        let narrative_vars = [
            ("make_model", make_model.as_str()),
            ("repair_plan", plan_context.as_str()),
            ("fnol", fnol.as_str()),
        ];

        let drivability_raw = services
            .vision(
                &state,
                &[],
                &prompts.render("drivability_system", &[])?,
                &prompts.render("drivability_user", &narrative_vars)?,
            )
            .await?;
        let drivability: Decoded<DrivabilityVerdict> =
            services.decode_verdict(self.kind(), drivability_raw).await?;

        let total_loss_percent = percent_text(services.settings.total_loss_ratio);
        let market_value_text = format!("{:.2}", market_value);
        let repair_cost_text = estimate.prompt_text();
        let triage_system = prompts.render(
            "triage_system",
            &[
                ("total_loss_percent", &total_loss_percent),
                ("market_value", &market_value_text),
                ("repair_cost", &repair_cost_text),
            ],
        )?;
        let triage_narrative = services
            .vision(&state, &[], &triage_system, &prompts.render("triage_user", &narrative_vars)?)
            .await?;

        let narrative_var = [("triage_narrative", triage_narrative.as_str())];
        let decision_raw = services
            .utility_text("triage_decision_system", "triage_decision_user", &narrative_var)
            .await?;
        let summary = services
            .utility_text("triage_summary_system", "triage_summary_user", &narrative_var)
            .await?;

        let parsed_decision = decision_raw.parse::<TriageDecision>();
        let resolution = resolve_triage(
            parsed_decision.as_ref().ok().copied(),
            estimate.amount.value,
            market_value,
            services.settings.total_loss_ratio,
        );
        let override_note = match (resolution.overridden, resolution.decision) {
            (true, Some(decision)) => Some(describe_override(
                decision_raw.trim(),
                decision,
                estimate.amount.value.unwrap_or_default(),
                market_value,
                &total_loss_percent,
            )),
            _ => None,
        };
        if let Some(note) = &override_note {
            tracing::warn!("⚠️ {}", note);
        }

        let triage = match (resolution.decision, parsed_decision) {
            (Some(decision), _) => Decoded::ok(
                triage_narrative.clone(),
                TriageVerdict {
                    decision,
                    rationale: triage_narrative,
                    summary: summary.trim().to_string(),
                    override_note,
                },
            ),
            (None, Err(e)) => Decoded::failed(triage_narrative, &e),
            (None, Ok(_)) => Decoded::failed(
                triage_narrative,
                &AssessmentError::parse(self.kind().name(), "no triage decision could be made"),
            ),
        };
        if let Some(verdict) = &triage.value {
            tracing::info!("🏁 Triage decision: {}", verdict.decision);
        }

        state.drivability = Some(drivability.clone());
        state.triage = Some(triage.clone());
        Ok(StageOutcome {
            state,
            report: StageReport::DrivabilityAndTriage { drivability, triage },
        })
    }
}
