pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{ConsoleReporter, LocalStorage, OpenAiGateway, TracingReporter, VehicleDataGateway};
pub use config::{AppConfig, PromptSet};
pub use core::engine::{AssessmentEngine, AssessmentReport};
pub use core::stages::{AssessmentSettings, Services};
pub use domain::model::{DamageImage, SessionInput};
pub use utils::error::{AssessmentError, Result};
