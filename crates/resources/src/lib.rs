pub mod cache;
pub mod fetch;
pub mod notify;
pub mod queue;
pub mod request;
pub mod state;
pub mod stats;

pub use cache::*;
pub use fetch::*;
pub use notify::*;
pub use queue::*;
pub use request::*;
pub use state::*;
pub use stats::*;
