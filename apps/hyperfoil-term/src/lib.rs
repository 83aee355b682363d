pub mod client;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod terminal;
pub mod transport;
pub mod upload;
