pub mod directory;
pub mod principal;
pub mod repository;

pub use directory::*;
pub use principal::*;
pub use repository::*;
