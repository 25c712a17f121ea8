// Domain layer: assessment models, stage reports and ports (interfaces).

pub mod model;
pub mod ports;
pub mod repair_plan;
pub mod stage;
