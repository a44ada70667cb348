pub mod canon;
pub mod config;
pub mod entities;
pub mod error;
pub mod priority;
pub mod robots;
pub mod scope;

pub use config::{AppConfig, DatabaseConfig, FrontierConfig, NEVER_DISCLAIMED_SENTINEL};
pub use entities::*;
pub use error::{FrontierError, Result};
pub use robots::{AllowAll, RobotsChecker};
