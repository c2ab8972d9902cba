//! HTTP API handlers for tirta-hi

pub mod forecast;
pub mod health;
pub mod retrain;
pub mod sse;
pub mod uploads;

pub use forecast::forecast_routes;
pub use health::health_routes;
pub use retrain::retrain_routes;
pub use sse::event_stream;
pub use uploads::upload_routes;
