pub mod manager;
pub mod orchestrator;

pub use manager::{BookingManager, BookingPolicy};
pub use orchestrator::PaymentOrchestrator;
