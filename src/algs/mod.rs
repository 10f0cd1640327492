//! Communication building blocks: transports, wire records, collectives, and
//! the per-peer message schedule.

pub mod collective;
pub mod communicator;
pub mod distributor;
pub mod wire;

pub use communicator::{CommTag, Communicator, ExchangeTags, NoComm, RayonComm, Wait};
pub use distributor::Distributor;
