pub mod config;
pub mod hysteresis;
pub mod scheduler;
pub mod topics;

pub use config::{
    default_config, parse_snapshot, ConfigError, ConfigSnapshot, ControlPointConfig, RejectedEntry,
};
pub use hysteresis::Hysteresis;
pub use scheduler::Scheduler;
pub use topics::*;
