pub mod analyzer;
pub mod engagement;
pub mod funnel;
pub mod identity;
pub mod segments;

pub use analyzer::{analyze_user_data, UserDataAnalysis};
pub use engagement::EngagementMetrics;
pub use funnel::{ConversionFunnel, ConversionRates};
pub use identity::UserIdentity;
pub use segments::SegmentCounts;
