use crate::utils::error::{AssessmentError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

const BUNDLED_PROMPTS: &str = include_str!("../../prompts/default.toml");

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-z_]+)\s*\}\}").expect("placeholder pattern is valid"));

/// Every template a full assessment renders.
pub const REQUIRED_PROMPTS: &[&str] = &[
    "localization_coarse_system",
    "localization_fine_system",
    "localization_coverage_system",
    "localization_user",
    "localization_correction_system",
    "localization_correction_user",
    "fraud_system",
    "fraud_user",
    "repair_plan_system",
    "repair_plan_user",
    "repair_plan_example",
    "repair_plan_reference_source",
    "repair_plan_text_only_source",
    "cost_estimate_system",
    "cost_estimate_user",
    "cost_extract_system",
    "cost_extract_user",
    "drivability_system",
    "drivability_user",
    "triage_system",
    "triage_user",
    "triage_decision_system",
    "triage_decision_user",
    "triage_summary_system",
    "triage_summary_user",
    "json_repair_system",
    "json_repair_user",
];

/// Versioned prompt templates, keyed by name.
#[derive(Debug, Clone)]
pub struct PromptSet {
    version: Option<String>,
    templates: HashMap<String, String>,
}

impl PromptSet {
    pub fn bundled() -> Result<Self> {
        Self::from_toml_str(BUNDLED_PROMPTS)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| AssessmentError::config(format!("prompt file is not valid TOML: {}", e)))?;

        let mut version = None;
        let mut templates = HashMap::new();
        for (key, value) in table {
            let Some(text) = value.as_str() else {
                return Err(AssessmentError::InvalidConfigValueError {
                    field: format!("prompts.{}", key),
                    value: value.to_string(),
                    reason: "prompt templates must be strings".to_string(),
                });
            };
            if key == "version" {
                version = Some(text.to_string());
            } else {
                templates.insert(key, text.trim().to_string());
            }
        }

        Ok(Self { version, templates })
    }

    /// Bundled templates with any keys from `path` layered on top.
    pub fn bundled_with_overrides<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let overrides = Self::from_toml_str(&content)?;
        let mut prompts = Self::bundled()?;
        if overrides.version.is_some() {
            prompts.version = overrides.version;
        }
        prompts.templates.extend(overrides.templates);
        tracing::info!(
            "Loaded prompt overrides from {} (version {})",
            path.as_ref().display(),
            prompts.version()
        );
        Ok(prompts)
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("unversioned")
    }

    pub fn ensure_complete(&self) -> Result<()> {
        let missing: Vec<&str> = REQUIRED_PROMPTS
            .iter()
            .copied()
            .filter(|name| !self.templates.contains_key(*name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AssessmentError::MissingConfigError {
                field: format!("prompts.{}", missing.join(", prompts.")),
            })
        }
    }

    pub fn template(&self, name: &str) -> Result<&str> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AssessmentError::MissingConfigError {
                field: format!("prompts.{}", name),
            })
    }

    /// Fills `{{key}}` placeholders in one pass; substituted values are not
    /// scanned again. Any placeholder without a value is an error.
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String> {
        let template = self.template(name)?;
        let mut unresolved = Vec::new();
        let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            match vars.iter().find(|(candidate, _)| *candidate == key) {
                Some((_, value)) => value.to_string(),
                None => {
                    unresolved.push(key.to_string());
                    caps[0].to_string()
                }
            }
        });

        if !unresolved.is_empty() {
            return Err(AssessmentError::config(format!(
                "prompt '{}' has no value for: {}",
                name,
                unresolved.join(", ")
            )));
        }
        Ok(rendered.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_bundled_prompts_are_complete() {
        let prompts = PromptSet::bundled().unwrap();
        prompts.ensure_complete().unwrap();
        assert_ne!(prompts.version(), "unversioned");
    }

    #[test]
    fn test_render_fills_placeholders() {
        let prompts = PromptSet::bundled().unwrap();
        let rendered = prompts
            .render("localization_coarse_system", &[("make_model", "VOLKSWAGEN GOLF")])
            .unwrap();
        assert!(rendered.contains("images of a VOLKSWAGEN GOLF"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_render_reports_missing_values() {
        let prompts = PromptSet::bundled().unwrap();
        let err = prompts.render("fraud_user", &[("fnol", "rear ended")]).unwrap_err();
        assert!(err.to_string().contains("damage_location"));
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let prompts = PromptSet::from_toml_str("greeting = \"Hi {{name}}\"").unwrap();
        let rendered = prompts.render("greeting", &[("name", "{{name}}")]).unwrap();
        assert_eq!(rendered, "Hi {{name}}");
    }

    #[test]
    fn test_reference_source_names_the_image_count() {
        let prompts = PromptSet::bundled().unwrap();
        let source = prompts
            .render("repair_plan_reference_source", &[("reference_count", "2")])
            .unwrap();
        assert!(source.contains("last 2 of the images"));

        let text_only = prompts.render("repair_plan_text_only_source", &[]).unwrap();
        assert!(!text_only.contains("images"));
        assert!(!prompts.template("repair_plan_system").unwrap().contains("three images"));
    }

    #[test]
    fn test_example_json_braces_survive_rendering() {
        let prompts = PromptSet::bundled().unwrap();
        let example = prompts.render("repair_plan_example", &[]).unwrap();
        assert!(example.contains("\"parts_list\": ["));
    }

    #[test]
    fn test_overrides_replace_single_templates() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"version = \"test-1\"\njson_repair_system = \"Return JSON only.\"\n")
            .unwrap();

        let prompts = PromptSet::bundled_with_overrides(file.path()).unwrap();
        assert_eq!(prompts.version(), "test-1");
        assert_eq!(prompts.template("json_repair_system").unwrap(), "Return JSON only.");
        assert!(prompts.template("fraud_system").unwrap().contains("fraud checks"));
    }

    #[test]
    fn test_non_string_template_is_rejected() {
        assert!(PromptSet::from_toml_str("fraud_system = 3").is_err());
    }
}
