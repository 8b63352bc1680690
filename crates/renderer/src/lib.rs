pub mod config;
pub mod cycle;

pub use config::*;
pub use cycle::*;
