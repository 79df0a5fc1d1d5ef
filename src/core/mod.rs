pub mod config;
pub mod errors;
pub mod kernel;
pub mod reconciler;
pub mod runtime;
pub mod traits;
pub mod types;
