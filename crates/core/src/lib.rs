pub mod config;
pub mod error;
pub mod types;

pub use error::{PulseError, PulseResult};
pub use types::{
    ConnectionStatus, DataEvent, DataSourceConfig, DataSourceStatus, Envelope, RawEvent,
    SourceType, SyncOutcome,
};
