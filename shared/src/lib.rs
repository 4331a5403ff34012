pub mod telemetry;
pub mod text;
pub mod types;
