pub mod http;
pub mod traits;

pub use http::HttpAnalyticsClient;
pub use traits::AnalyticsService;
