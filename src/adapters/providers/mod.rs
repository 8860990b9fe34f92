//! Research provider adapters.

pub mod http;
pub mod mock;
pub mod registry;

pub use http::{HttpProviderConfig, HttpResearchProvider};
pub use mock::{MockProvider, MockRunScript};
pub use registry::ProviderRegistry;
