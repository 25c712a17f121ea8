use crate::config::prompts::PromptSet;
use crate::core::cost_model::{CostModel, DEFAULT_BASE_THRESHOLD, DEFAULT_SCALE_CONSTANT};
use crate::domain::model::DamageImage;
use crate::utils::error::{AssessmentError, Result};
use crate::utils::validation::{self, Validate, IMAGE_EXTENSIONS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub inference: InferenceConfig,
    pub vehicle_data: VehicleDataConfig,
    #[serde(default)]
    pub cost_model: CostModelConfig,
    #[serde(default)]
    pub repair_plan: RepairPlanConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_inference_base")]
    pub api_base: String,
    pub api_key: String,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,
    #[serde(default = "default_utility_model")]
    pub utility_model: String,
    #[serde(default = "default_vision_max_tokens")]
    pub vision_max_tokens: u32,
    #[serde(default = "default_text_max_tokens")]
    pub text_max_tokens: u32,
    #[serde(default = "default_inference_timeout")]
    pub timeout_seconds: u64,
    /// Ask the utility model to rewrite verdicts that fail to decode.
    #[serde(default = "default_true")]
    pub repair_invalid_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleDataConfig {
    #[serde(default = "default_vehicle_data_base")]
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_package_version")]
    pub package_version: u32,
    #[serde(default = "default_lookup_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModelConfig {
    #[serde(default = "default_base_threshold")]
    pub base_threshold: f64,
    #[serde(default = "default_scale_constant")]
    pub scale_constant: f64,
    pub base_costs_file: Option<String>,
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            base_threshold: DEFAULT_BASE_THRESHOLD,
            scale_constant: DEFAULT_SCALE_CONSTANT,
            base_costs_file: None,
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairPlanConfig {
    /// One-shot example photos sent after the claimant's images.
    #[serde(default)]
    pub reference_images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default = "default_total_loss_ratio")]
    pub total_loss_ratio: f64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            total_loss_ratio: default_total_loss_ratio(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_directory")]
    pub directory: String,
    #[serde(default = "default_true")]
    pub write_job_card: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
            write_job_card: true,
        }
    }
}

fn default_inference_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vision_model() -> String {
    "gpt-4-vision-preview".to_string()
}

fn default_reasoning_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

fn default_utility_model() -> String {
    "gpt-3.5-turbo-0125".to_string()
}

fn default_vision_max_tokens() -> u32 {
    4000
}

fn default_text_max_tokens() -> u32 {
    1000
}

fn default_inference_timeout() -> u64 {
    120
}

fn default_vehicle_data_base() -> String {
    "https://uk1.ukvehicledata.co.uk".to_string()
}

fn default_package_version() -> u32 {
    2
}

fn default_lookup_timeout() -> u64 {
    30
}

fn default_base_threshold() -> f64 {
    DEFAULT_BASE_THRESHOLD
}

fn default_scale_constant() -> f64 {
    DEFAULT_SCALE_CONSTANT
}

fn default_total_loss_ratio() -> f64 {
    0.6
}

fn default_output_directory() -> String {
    "./output".to_string()
}

fn default_true() -> bool {
    true
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl VehicleDataConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AssessmentError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content)
            .map_err(|e| AssessmentError::config(format!("TOML parsing error: {}", e)))
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are
    /// left in place and caught by validation.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AssessmentError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("service.name", &self.service.name)?;

        validation::validate_url("inference.api_base", &self.inference.api_base)?;
        validate_secret("inference.api_key", &self.inference.api_key)?;
        validation::validate_non_empty_string("inference.vision_model", &self.inference.vision_model)?;
        validation::validate_non_empty_string(
            "inference.reasoning_model",
            &self.inference.reasoning_model,
        )?;
        validation::validate_non_empty_string(
            "inference.utility_model",
            &self.inference.utility_model,
        )?;
        validation::validate_positive_number(
            "inference.vision_max_tokens",
            self.inference.vision_max_tokens.into(),
            1,
        )?;
        validation::validate_positive_number(
            "inference.text_max_tokens",
            self.inference.text_max_tokens.into(),
            1,
        )?;
        validation::validate_range("inference.timeout_seconds", self.inference.timeout_seconds, 1, 900)?;

        validation::validate_url("vehicle_data.base_url", &self.vehicle_data.base_url)?;
        validate_secret("vehicle_data.api_key", &self.vehicle_data.api_key)?;
        validation::validate_range(
            "vehicle_data.timeout_seconds",
            self.vehicle_data.timeout_seconds,
            1,
            300,
        )?;

        if self.cost_model.base_threshold.is_nan() || self.cost_model.base_threshold < 0.0 {
            return Err(AssessmentError::InvalidConfigValueError {
                field: "cost_model.base_threshold".to_string(),
                value: self.cost_model.base_threshold.to_string(),
                reason: "Threshold must be a non-negative number".to_string(),
            });
        }
        validation::validate_range("cost_model.scale_constant", self.cost_model.scale_constant, 0.0, 1.0)?;
        if let Some(path) = &self.cost_model.base_costs_file {
            validation::validate_path("cost_model.base_costs_file", path)?;
        }

        validation::validate_file_extensions(
            "repair_plan.reference_images",
            &self.repair_plan.reference_images,
            IMAGE_EXTENSIONS,
        )?;

        validation::validate_range("triage.total_loss_ratio", self.triage.total_loss_ratio, 0.01, 1.0)?;

        if let Some(path) = &self.prompts.file {
            validation::validate_path("prompts.file", path)?;
        }
        validation::validate_path("output.directory", &self.output.directory)?;

        Ok(())
    }

    pub fn build_cost_model(&self) -> Result<CostModel> {
        let bundled = CostModel::bundled()?;
        let base_costs = match &self.cost_model.base_costs_file {
            Some(path) => CostModel::base_costs_from_file(path)?,
            None => bundled.base_costs().clone(),
        };
        Ok(CostModel::new(
            base_costs,
            self.cost_model.base_threshold,
            self.cost_model.scale_constant,
        )
        .with_overrides(&self.cost_model.overrides))
    }

    pub fn load_prompts(&self) -> Result<PromptSet> {
        let prompts = match &self.prompts.file {
            Some(path) => PromptSet::bundled_with_overrides(path)?,
            None => PromptSet::bundled()?,
        };
        prompts.ensure_complete()?;
        Ok(prompts)
    }

    pub fn load_reference_images(&self) -> Result<Vec<DamageImage>> {
        self.repair_plan
            .reference_images
            .iter()
            .map(|path| -> Result<DamageImage> {
                let bytes = std::fs::read(path)?;
                let name = Path::new(path)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(path);
                Ok(DamageImage::new(name, bytes))
            })
            .collect()
    }
}

fn validate_secret(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() || value.contains("${") {
        return Err(AssessmentError::MissingConfigError {
            field: field.to_string(),
        });
    }
    Ok(())
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
