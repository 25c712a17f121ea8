pub mod assessment;
pub mod cost_model;
pub mod disambiguation;
pub mod engine;
pub mod normalizer;
pub mod stages;

pub use crate::domain::ports::{InferenceClient, StageReporter, Storage, VehicleDataProvider};
pub use crate::utils::error::Result;
