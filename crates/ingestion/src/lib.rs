pub mod adapters;
pub mod credentials;
pub mod demo;
pub mod processor;
pub mod schema;
pub mod service;
pub mod store;
pub mod transformer;
pub mod validator;

pub use adapters::SourceAdapter;
pub use processor::EventProcessor;
pub use schema::SchemaRegistry;
pub use service::IntegrationService;
pub use transformer::Transformer;
