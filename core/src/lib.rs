// Weft Core Library
// In-process request/response pub/sub runtime

pub mod bus;
pub mod config;
pub mod deliver;
pub mod manager;
pub mod message;
pub mod telemetry;

// Export core types
pub use bus::{Bus, BusStats, PublishPolicy};
pub use config::ManagerConfig;
pub use deliver::{deliver, deliver_async, deliver_timeout};
pub use manager::{Handler, Manager};
pub use message::{Reply, RequestEvent, Responder};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeftError {
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Delivery canceled")]
    Cancelled,

    #[error("Manager already listening: {0}")]
    AlreadyListening(String),
}

pub type Result<T> = std::result::Result<T, WeftError>;
