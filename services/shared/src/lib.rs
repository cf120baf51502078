// Shared types and wire protocol for the lottery services

pub mod bet;
pub mod protocol;

pub use bet::{Batch, Bet};
pub use protocol::{Answer, ProtocolError};
