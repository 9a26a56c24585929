//! Neo4j driver, typed graph values, and a scripted mock

pub mod client;
pub mod mock;
pub mod models;
pub mod traits;

pub use client::Neo4jClient;
pub use mock::{MockGraphDriver, MockResponse};
pub use models::*;
pub use traits::{DriverError, GraphDriver};
