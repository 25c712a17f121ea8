use crate::domain::model::{DamageImage, SessionInput};
use crate::utils::error::{AssessmentError, Result};
use crate::utils::validation::{self, Validate, IMAGE_EXTENSIONS};
use clap::Parser;
use std::path::Path;

#[derive(Debug, Clone, Parser)]
#[command(name = "collision-triage")]
#[command(about = "Assess collision damage photos into a repair plan, cost and triage decision")]
pub struct CliConfig {
    #[arg(long, default_value = "collision-triage.toml")]
    pub config: String,

    #[arg(long, help = "Vehicle registration mark")]
    pub registration: String,

    #[arg(long, conflicts_with = "fnol_file", help = "First notice of loss description")]
    pub fnol: Option<String>,

    #[arg(long, help = "Read the first notice of loss description from a file")]
    pub fnol_file: Option<String>,

    #[arg(long = "image", help = "Damage photo (repeat for several)")]
    pub images: Vec<String>,

    #[arg(long, help = "Override the configured output directory")]
    pub output: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log as JSON lines")]
    pub log_json: bool,

    #[arg(long, help = "Validate configuration and inputs without calling any service")]
    pub dry_run: bool,
}

impl CliConfig {
    pub fn fnol_description(&self) -> Result<String> {
        match (&self.fnol, &self.fnol_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
            (None, None) => Err(AssessmentError::input(
                "fnol_description",
                "pass --fnol or --fnol-file",
            )),
        }
    }

    /// Reads every image and the loss description into a session.
    pub fn load_session(&self) -> Result<SessionInput> {
        let images = self
            .images
            .iter()
            .map(|path| -> Result<DamageImage> {
                let bytes = std::fs::read(path)?;
                let name = Path::new(path)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or(path);
                Ok(DamageImage::new(name, bytes))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SessionInput::new(
            self.registration.clone(),
            self.fnol_description()?,
            images,
        ))
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("config", &self.config)?;
        validation::validate_non_empty_string("registration", &self.registration)?;
        if let Some(path) = &self.fnol_file {
            validation::validate_path("fnol_file", path)?;
        }
        if self.images.is_empty() {
            return Err(AssessmentError::input("images", "pass at least one --image"));
        }
        validation::validate_file_extensions("image", &self.images, IMAGE_EXTENSIONS)?;
        if let Some(output) = &self.output {
            validation::validate_path("output", output)?;
        }
        Ok(())
    }
}
