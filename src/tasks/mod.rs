//! Background tasks of the counter service.

mod heartbeat;

pub use heartbeat::HeartbeatTask;
