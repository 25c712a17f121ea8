#[cfg(feature = "cli")]
pub mod cli;
pub mod prompts;
pub mod toml_config;

pub use prompts::PromptSet;
pub use toml_config::AppConfig;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
