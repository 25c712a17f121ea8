use crate::utils::error::{AssessmentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartPosition {
    None,
    #[serde(rename = "LH")]
    Lh,
    #[serde(rename = "RH")]
    Rh,
    #[serde(rename = "FRONT")]
    Front,
    #[serde(rename = "REAR")]
    Rear,
    #[serde(rename = "LF")]
    Lf,
    #[serde(rename = "RF")]
    Rf,
    #[serde(rename = "LR")]
    Lr,
    #[serde(rename = "RR")]
    Rr,
}

impl PartPosition {
    pub fn code(&self) -> Option<&'static str> {
        match self {
            PartPosition::None => None,
            PartPosition::Lh => Some("LH"),
            PartPosition::Rh => Some("RH"),
            PartPosition::Front => Some("FRONT"),
            PartPosition::Rear => Some("REAR"),
            PartPosition::Lf => Some("LF"),
            PartPosition::Rf => Some("RF"),
            PartPosition::Lr => Some("LR"),
            PartPosition::Rr => Some("RR"),
        }
    }
}

impl FromStr for PartPosition {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "N/A" | "NONE" => Ok(PartPosition::None),
            "LH" => Ok(PartPosition::Lh),
            "RH" => Ok(PartPosition::Rh),
            "FRONT" => Ok(PartPosition::Front),
            "REAR" => Ok(PartPosition::Rear),
            "LF" => Ok(PartPosition::Lf),
            "RF" => Ok(PartPosition::Rf),
            "LR" => Ok(PartPosition::Lr),
            "RR" => Ok(PartPosition::Rr),
            other => Err(AssessmentError::parse(
                "repair plan",
                format!("unknown part position '{}'", other),
            )),
        }
    }
}

impl fmt::Display for PartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().unwrap_or("N/A"))
    }
}

/// One part-level decision. `repair` and `replace` are never both set:
/// the only constructor is [`PartOperation::new`], which rejects that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartOperation {
    part: String,
    position: PartPosition,
    strip_and_refit: bool,
    repair: bool,
    replace: bool,
    paint: bool,
}

impl PartOperation {
    pub fn new(
        part: impl Into<String>,
        position: PartPosition,
        strip_and_refit: bool,
        repair: bool,
        replace: bool,
        paint: bool,
    ) -> Result<Self> {
        let part = part.into();
        if repair && replace {
            return Err(AssessmentError::InvariantError {
                part,
                message: "repair and replace are mutually exclusive".to_string(),
            });
        }
        Ok(Self {
            part,
            position,
            strip_and_refit,
            repair,
            replace,
            paint,
        })
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    pub fn position(&self) -> PartPosition {
        self.position
    }

    pub fn strip_and_refit(&self) -> bool {
        self.strip_and_refit
    }

    pub fn repair(&self) -> bool {
        self.repair
    }

    pub fn replace(&self) -> bool {
        self.replace
    }

    pub fn paint(&self) -> bool {
        self.paint
    }

    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions = Vec::new();
        if self.strip_and_refit {
            actions.push("Strip & Refit");
        }
        if self.repair {
            actions.push("Repair");
        }
        if self.replace {
            actions.push("Replace");
        }
        if self.paint {
            actions.push("Paint");
        }
        actions
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistWork {
    #[serde(default)]
    pub first_dtc: bool,
    #[serde(default)]
    pub wheel_alignment: bool,
    #[serde(default)]
    pub road_test: bool,
    #[serde(default)]
    pub final_dtc: bool,
    #[serde(default)]
    pub new_part_coding: bool,
    #[serde(default)]
    pub air_con: bool,
    #[serde(default)]
    pub glass_removal: bool,
    #[serde(default)]
    pub adas_calibration: bool,
}

impl SpecialistWork {
    pub fn required(&self) -> Vec<&'static str> {
        [
            (self.first_dtc, "First DTC"),
            (self.wheel_alignment, "Wheel Alignment"),
            (self.road_test, "Road Test"),
            (self.final_dtc, "Final DTC"),
            (self.new_part_coding, "New Part Coding"),
            (self.air_con, "Air Con"),
            (self.glass_removal, "Glass Removal"),
            (self.adas_calibration, "ADAS Calibration"),
        ]
        .into_iter()
        .filter_map(|(flag, name)| flag.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelRemoval {
    #[serde(rename = "LF", default)]
    pub left_front: bool,
    #[serde(rename = "RF", default)]
    pub right_front: bool,
    #[serde(rename = "LR", default)]
    pub left_rear: bool,
    #[serde(rename = "RR", default)]
    pub right_rear: bool,
}

/// Repair plan exactly as the model writes it, before invariants are checked.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRepairPlan {
    #[serde(default)]
    pub reg_no: String,
    pub damage_description: String,
    pub parts_list: Vec<RawPartOperation>,
    pub new_parts_info: String,
    pub specialist_work_required: SpecialistWork,
    pub wheels_removed_for_repair: WheelRemoval,
    pub smart_repairs_required: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPartOperation {
    pub part: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub s_r: bool,
    #[serde(default)]
    pub repair: bool,
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub paint: bool,
}

impl TryFrom<RawPartOperation> for PartOperation {
    type Error = AssessmentError;

    fn try_from(raw: RawPartOperation) -> Result<Self> {
        let position = match raw.position.as_deref() {
            Some(code) => code.parse()?,
            None => PartPosition::None,
        };
        PartOperation::new(raw.part, position, raw.s_r, raw.repair, raw.replace, raw.paint)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairPlan {
    pub registration: String,
    pub damage_description: String,
    pub parts: Vec<PartOperation>,
    pub new_parts_info: String,
    pub specialist_work: SpecialistWork,
    pub wheels_removed: WheelRemoval,
    pub smart_repairs: String,
}

impl TryFrom<RawRepairPlan> for RepairPlan {
    type Error = AssessmentError;

    /// Fails on the first operation that breaks the repair/replace rule;
    /// the plan is never partially accepted.
    fn try_from(raw: RawRepairPlan) -> Result<Self> {
        let parts = raw
            .parts_list
            .into_iter()
            .map(PartOperation::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            registration: raw.reg_no,
            damage_description: raw.damage_description,
            parts,
            new_parts_info: raw.new_parts_info,
            specialist_work: raw.specialist_work_required,
            wheels_removed: raw.wheels_removed_for_repair,
            smart_repairs: raw.smart_repairs_required,
        })
    }
}

impl RepairPlan {
    pub fn job_card(&self) -> String {
        let mut card = String::new();
        let _ = writeln!(card, "Digital Job Card for Vehicle: {}\n", self.registration);
        let _ = writeln!(card, "Damage Description: {}\n", self.damage_description);

        card.push_str("Parts List:\n");
        for op in &self.parts {
            let _ = writeln!(
                card,
                "  - {} (Position: {}): {}",
                op.part(),
                op.position(),
                op.actions().join(", ")
            );
        }

        let _ = writeln!(card, "\nNew Parts Info:\n  {}", self.new_parts_info);

        card.push_str("\nSpecialist Work Required:\n");
        for item in self.specialist_work.required() {
            let _ = writeln!(card, "  - {}", item);
        }

        card.push_str("\nWheels Removed for Repair:\n");
        for (wheel, removed) in [
            ("LF", self.wheels_removed.left_front),
            ("RF", self.wheels_removed.right_front),
            ("LR", self.wheels_removed.left_rear),
            ("RR", self.wheels_removed.right_rear),
        ] {
            let status = if removed { "Removed" } else { "Not Removed" };
            let _ = writeln!(card, "  - {}: {}", wheel, status);
        }

        let _ = write!(card, "\nSmart Repairs Required:\n  {}", self.smart_repairs);
        card
    }
}
