pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse_parser;
pub mod types;

pub use provider::TextGenerator;
pub use registry::ProviderRegistry;
