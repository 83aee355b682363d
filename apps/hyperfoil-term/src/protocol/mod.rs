pub mod frame;
pub mod sentinel;

pub use frame::{Frame, Outbound};
