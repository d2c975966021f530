pub mod app_config;
pub mod migrator;
pub mod sources;
pub mod validation;

pub use app_config::*;
pub use migrator::*;
pub use sources::*;
pub use validation::*;
