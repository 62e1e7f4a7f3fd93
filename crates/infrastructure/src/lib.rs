pub mod database;
pub mod directory;
pub mod principal;
pub mod timeout_handler;

pub use database::*;
pub use directory::*;
pub use principal::StaticPrincipalDirectory;
pub use timeout_handler::{TimeoutConfig, TimeoutHandler};
