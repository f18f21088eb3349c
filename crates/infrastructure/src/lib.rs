pub mod agent;
pub mod database;
pub mod observability;
pub mod resource_monitor;

pub use agent::*;
pub use database::*;
pub use observability::*;
pub use resource_monitor::MeminfoGauge;
