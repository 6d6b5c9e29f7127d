pub mod breaker;
pub mod config;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod operation;
pub mod registry;
pub mod status;

pub use self::breaker::*;
pub use self::config::*;
pub use self::error::*;
pub use self::fallback::*;
pub use self::metrics::*;
pub use self::operation::*;
pub use self::registry::*;
pub use self::status::*;
