// Adapters layer: concrete implementations of the domain ports.

pub mod inference;
pub mod reporter;
pub mod storage;
pub mod vehicle_data;

pub use inference::OpenAiGateway;
pub use reporter::{ConsoleReporter, TracingReporter};
pub use storage::LocalStorage;
pub use vehicle_data::VehicleDataGateway;
