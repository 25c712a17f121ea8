//! Damage localization with left/right correction.
//!
//! Vision models are reliable about front versus rear but often mirror
//! left and right on front-only photo sets. The corrector asks for a coarse
//! location, a fine location and, for front damage, whether the set also
//! covers the rear. When it does not, sides in the fine answer are swapped.

use crate::config::prompts::PromptSet;
use crate::domain::model::{parse_yes_no, CoarseLocation, DamageImage, DamageLocation};
use crate::domain::ports::{InferenceClient, VisionRequest};
use crate::utils::error::{AssessmentError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Localization {
    pub coarse: Option<CoarseLocation>,
    pub fine: Option<DamageLocation>,
    pub both_front_and_rear: Option<bool>,
    /// Label handed to later stages.
    pub label: String,
    pub corrected: bool,
    pub notice: Option<String>,
}

/// Sides are mirrored only for a front-only photo set whose fine answer
/// names a side.
pub fn needs_correction(coarse: Option<CoarseLocation>, both_front_and_rear: Option<bool>) -> bool {
    coarse == Some(CoarseLocation::Front) && both_front_and_rear == Some(false)
}

pub fn expected_label(
    coarse: Option<CoarseLocation>,
    fine: DamageLocation,
    both_front_and_rear: Option<bool>,
) -> DamageLocation {
    if needs_correction(coarse, both_front_and_rear) && fine.names_side() {
        fine.mirrored()
    } else {
        fine
    }
}

pub struct DamageLocalizer<'a> {
    inference: &'a dyn InferenceClient,
    prompts: &'a PromptSet,
    utility_model: &'a str,
}

impl<'a> DamageLocalizer<'a> {
    pub fn new(inference: &'a dyn InferenceClient, prompts: &'a PromptSet, utility_model: &'a str) -> Self {
        Self {
            inference,
            prompts,
            utility_model,
        }
    }

    pub async fn localize(&self, images: &[DamageImage], make_model: &str) -> Result<Localization> {
        let mut notices = Vec::new();

        let coarse_raw = self.ask(images, "localization_coarse_system", make_model).await?;
        let coarse = match coarse_raw.parse::<CoarseLocation>() {
            Ok(coarse) => Some(coarse),
            Err(e) => {
                notices.push(e.to_string());
                None
            }
        };

        let fine_raw = self.ask(images, "localization_fine_system", make_model).await?;
        let fine = match fine_raw.parse::<DamageLocation>() {
            Ok(fine) => Some(fine),
            Err(e) => {
                notices.push(e.to_string());
                None
            }
        };

        let mut both_front_and_rear = None;
        if coarse == Some(CoarseLocation::Front) {
            let coverage_raw = self
                .ask(images, "localization_coverage_system", make_model)
                .await?;
            both_front_and_rear = parse_yes_no(&coverage_raw);
            if both_front_and_rear.is_none() {
                notices.push(
                    AssessmentError::parse(
                        "damage localization",
                        format!("expected Yes or No, got '{}'", coverage_raw.trim()),
                    )
                    .to_string(),
                );
            }
        }

        let mut label = fine
            .map(|location| location.label().to_string())
            .unwrap_or_else(|| fine_raw.trim().to_string());
        let mut corrected = false;

        if needs_correction(coarse, both_front_and_rear) {
            let answer = self.correct(fine_raw.trim()).await?;
            match fine {
                Some(fine) => {
                    let expected = expected_label(coarse, fine, both_front_and_rear);
                    match answer.parse::<DamageLocation>() {
                        Ok(corrected_location) if corrected_location == expected => {}
                        _ => tracing::warn!(
                            "⚠️ Correction call answered '{}', using '{}' for '{}'",
                            answer.trim(),
                            expected,
                            fine
                        ),
                    }
                    corrected = expected != fine;
                    label = expected.label().to_string();
                }
                None => {
                    corrected = true;
                    label = answer.trim().to_string();
                }
            }
        }

        tracing::info!(
            "📍 Damage located: {} (coarse {:?}, fine {:?}, front and rear {:?}, corrected {})",
            label,
            coarse,
            fine,
            both_front_and_rear,
            corrected
        );

        Ok(Localization {
            coarse,
            fine,
            both_front_and_rear,
            label,
            corrected,
            notice: if notices.is_empty() {
                None
            } else {
                Some(notices.join("; "))
            },
        })
    }

    async fn ask(&self, images: &[DamageImage], system_template: &str, make_model: &str) -> Result<String> {
        let system_prompt = self
            .prompts
            .render(system_template, &[("make_model", make_model)])?;
        let user_prompt = self.prompts.render("localization_user", &[])?;
        let answer = self
            .inference
            .vision_completion(VisionRequest {
                subject_images: images,
                reference_images: &[],
                system_prompt: &system_prompt,
                user_prompt: &user_prompt,
            })
            .await?;
        tracing::debug!("{} answered '{}'", system_template, answer.trim());
        Ok(answer)
    }

    async fn correct(&self, fine_location: &str) -> Result<String> {
        let system_prompt = self.prompts.render("localization_correction_system", &[])?;
        let user_prompt = self.prompts.render(
            "localization_correction_user",
            &[("front_rear", "Front"), ("fine_location", fine_location)],
        )?;
        self.inference
            .text_completion(self.utility_model, &system_prompt, &user_prompt)
            .await
    }
}
