use crate::utils::error::{AssessmentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remote data packages offered by the vehicle lookup service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataPackage {
    Valuation,
    Specification,
}

impl DataPackage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataPackage::Valuation => "ValuationData",
            DataPackage::Specification => "VehicleData",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRecord {
    pub trade_retail: f64,
    pub mileage: Option<u64>,
    pub plate_year: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationRecord {
    pub make: String,
    pub model: String,
    pub year: u16,
    pub body_style: String,
    pub fuel_type: String,
    pub transmission: String,
    pub door_count: u8,
    pub kerb_weight: u32,
    pub is_electric: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PackageRecord {
    Valuation(ValuationRecord),
    Specification(SpecificationRecord),
}

/// Everything known about the claimant's vehicle. Built once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub registration: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub body_style: String,
    pub fuel_type: String,
    pub transmission: String,
    pub door_count: u8,
    pub kerb_weight: u32,
    pub market_value: f64,
    pub is_electric: bool,
    pub mileage: Option<u64>,
    pub plate_year: Option<String>,
    pub description: Option<String>,
}

impl VehicleRecord {
    pub fn from_packages(
        registration: &str,
        valuation: ValuationRecord,
        specification: SpecificationRecord,
    ) -> Self {
        Self {
            registration: registration.to_string(),
            make: specification.make,
            model: specification.model,
            year: specification.year,
            body_style: specification.body_style,
            fuel_type: specification.fuel_type,
            transmission: specification.transmission,
            door_count: specification.door_count,
            kerb_weight: specification.kerb_weight,
            market_value: valuation.trade_retail,
            is_electric: specification.is_electric,
            mileage: valuation.mileage,
            plate_year: valuation.plate_year,
            description: valuation.description,
        }
    }

    pub fn make_model(&self) -> String {
        format!("{} {}", self.make, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageImage {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DamageImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = mime_for_name(&name).to_string();
        Self {
            name,
            mime_type,
            bytes,
        }
    }
}

fn mime_for_name(name: &str) -> &'static str {
    let lowered = name.to_ascii_lowercase();
    if lowered.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Caller-supplied inputs for one assessment.
#[derive(Debug, Clone)]
pub struct SessionInput {
    pub registration: String,
    pub fnol_description: String,
    pub images: Vec<DamageImage>,
}

impl SessionInput {
    pub fn new(
        registration: impl Into<String>,
        fnol_description: impl Into<String>,
        images: Vec<DamageImage>,
    ) -> Self {
        Self {
            registration: registration.into().trim().to_string(),
            fnol_description: fnol_description.into(),
            images,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.images.is_empty() {
            return Err(AssessmentError::input("images", "no damage images supplied"));
        }
        if let Some(empty) = self.images.iter().find(|image| image.bytes.is_empty()) {
            return Err(AssessmentError::input(
                "images",
                format!("image '{}' is empty", empty.name),
            ));
        }
        if self.registration.trim().is_empty() {
            return Err(AssessmentError::input("registration", "registration is blank"));
        }
        if self.fnol_description.trim().is_empty() {
            return Err(AssessmentError::input(
                "fnol_description",
                "first notice of loss description is blank",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoarseLocation {
    Front,
    Rear,
}

impl FromStr for CoarseLocation {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self> {
        match label_key(s).as_str() {
            "front" => Ok(CoarseLocation::Front),
            "rear" => Ok(CoarseLocation::Rear),
            _ => Err(AssessmentError::parse(
                "damage localization",
                format!("expected Front or Rear, got '{}'", s.trim()),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageLocation {
    RightFront,
    LeftFront,
    RightRear,
    LeftRear,
    Front,
    Rear,
    Right,
    Left,
}

impl DamageLocation {
    pub const ALL: [DamageLocation; 8] = [
        DamageLocation::RightFront,
        DamageLocation::LeftFront,
        DamageLocation::RightRear,
        DamageLocation::LeftRear,
        DamageLocation::Front,
        DamageLocation::Rear,
        DamageLocation::Right,
        DamageLocation::Left,
    ];

    pub fn names_side(&self) -> bool {
        !matches!(self, DamageLocation::Front | DamageLocation::Rear)
    }

    /// Left and right exchanged; front/rear untouched.
    pub fn mirrored(&self) -> Self {
        match self {
            DamageLocation::RightFront => DamageLocation::LeftFront,
            DamageLocation::LeftFront => DamageLocation::RightFront,
            DamageLocation::RightRear => DamageLocation::LeftRear,
            DamageLocation::LeftRear => DamageLocation::RightRear,
            DamageLocation::Right => DamageLocation::Left,
            DamageLocation::Left => DamageLocation::Right,
            other => *other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DamageLocation::RightFront => "Right Front",
            DamageLocation::LeftFront => "Left Front",
            DamageLocation::RightRear => "Right Rear",
            DamageLocation::LeftRear => "Left Rear",
            DamageLocation::Front => "Front",
            DamageLocation::Rear => "Rear",
            DamageLocation::Right => "Right",
            DamageLocation::Left => "Left",
        }
    }
}

impl fmt::Display for DamageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DamageLocation {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self> {
        let key = label_key(s);
        DamageLocation::ALL
            .iter()
            .find(|location| location.label().to_ascii_lowercase() == key)
            .copied()
            .ok_or_else(|| {
                AssessmentError::parse(
                    "damage localization",
                    format!("'{}' is not a known damage location", s.trim()),
                )
            })
    }
}

/// Lowercased label with quotes and trailing punctuation removed, so that
/// `"Left Front".` and `left front` compare equal.
fn label_key(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '*')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// "Yes"/"No" answers from the inference service.
pub fn parse_yes_no(raw: &str) -> Option<bool> {
    match label_key(raw).as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudVerdict {
    pub fraudulent: bool,
    #[serde(alias = "Description")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrivabilityVerdict {
    pub drivable: bool,
    #[serde(alias = "Reason")]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriageDecision {
    SpokeSite,
    HubSite,
    TotalLoss,
}

impl TriageDecision {
    pub fn label(&self) -> &'static str {
        match self {
            TriageDecision::SpokeSite => "Spoke Site",
            TriageDecision::HubSite => "Hub Site",
            TriageDecision::TotalLoss => "Total Loss",
        }
    }
}

impl fmt::Display for TriageDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TriageDecision {
    type Err = AssessmentError;

    fn from_str(s: &str) -> Result<Self> {
        match label_key(s).as_str() {
            "spoke site" | "spoke" => Ok(TriageDecision::SpokeSite),
            "hub site" | "hub" => Ok(TriageDecision::HubSite),
            "total loss" => Ok(TriageDecision::TotalLoss),
            _ => Err(AssessmentError::parse(
                "triage",
                format!("'{}' is not one of Total Loss, Hub Site, Spoke Site", s.trim()),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageVerdict {
    pub decision: TriageDecision,
    pub rationale: String,
    pub summary: String,
    /// Set when the total-loss threshold replaced the model's answer. The
    /// rationale and summary are still the model's own words.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> DamageImage {
        DamageImage::new(name, vec![0xFF, 0xD8, 0xFF])
    }

    #[test]
    fn test_session_input_requires_every_field() {
        let ok = SessionInput::new("GJ14WKH", "Hit a bollard", vec![image("front.jpg")]);
        assert!(ok.validate().is_ok());

        let no_images = SessionInput::new("GJ14WKH", "Hit a bollard", vec![]);
        assert!(matches!(
            no_images.validate(),
            Err(AssessmentError::InputError { ref field, .. }) if field == "images"
        ));

        let blank_reg = SessionInput::new("   ", "Hit a bollard", vec![image("front.jpg")]);
        assert!(matches!(
            blank_reg.validate(),
            Err(AssessmentError::InputError { ref field, .. }) if field == "registration"
        ));

        let blank_fnol = SessionInput::new("GJ14WKH", "\n", vec![image("front.jpg")]);
        assert!(blank_fnol.validate().is_err());

        let empty_image = SessionInput::new(
            "GJ14WKH",
            "Hit a bollard",
            vec![DamageImage::new("empty.jpg", Vec::new())],
        );
        assert!(empty_image.validate().is_err());
    }

    #[test]
    fn test_mime_type_from_name() {
        assert_eq!(image("a.PNG").mime_type, "image/png");
        assert_eq!(image("a.jpeg").mime_type, "image/jpeg");
    }

    #[test]
    fn test_damage_location_parsing_is_lenient_about_format() {
        assert_eq!(
            "Left Front".parse::<DamageLocation>().unwrap(),
            DamageLocation::LeftFront
        );
        assert_eq!(
            "  \"right rear\".\n".parse::<DamageLocation>().unwrap(),
            DamageLocation::RightRear
        );
        assert!("Roof".parse::<DamageLocation>().is_err());
    }

    #[test]
    fn test_mirrored_only_swaps_sides() {
        assert_eq!(DamageLocation::LeftFront.mirrored(), DamageLocation::RightFront);
        assert_eq!(DamageLocation::Right.mirrored(), DamageLocation::Left);
        assert_eq!(DamageLocation::Front.mirrored(), DamageLocation::Front);
        assert!(!DamageLocation::Rear.names_side());
    }

    #[test]
    fn test_triage_decision_labels() {
        assert_eq!(
            "Hub Site".parse::<TriageDecision>().unwrap(),
            TriageDecision::HubSite
        );
        assert_eq!(
            "**Total Loss**".parse::<TriageDecision>().unwrap(),
            TriageDecision::TotalLoss
        );
        assert!("Scrap it".parse::<TriageDecision>().is_err());
        assert_eq!(TriageDecision::SpokeSite.to_string(), "Spoke Site");
    }

    #[test]
    fn test_fraud_verdict_accepts_capitalised_description() {
        let verdict: FraudVerdict =
            serde_json::from_str(r#"{"fraudulent": false, "Description": "Matches claim"}"#)
                .unwrap();
        assert!(!verdict.fraudulent);
        assert_eq!(verdict.description, "Matches claim");
    }

    #[test]
    fn test_yes_no() {
        assert_eq!(parse_yes_no("Yes."), Some(true));
        assert_eq!(parse_yes_no("no"), Some(false));
        assert_eq!(parse_yes_no("maybe"), None);
    }
}
