pub mod agent;
pub mod memory;
pub mod repository;
pub mod trigger;

pub use agent::*;
pub use memory::*;
pub use repository::*;
pub use trigger::*;
