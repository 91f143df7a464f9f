//! darwin-core — wire format and configuration shared by every filter.
//! All other Darwin crates depend on this one.

pub mod config;
pub mod wire;

pub use wire::{Packet, PacketHeader, PacketType, ResponseKind, WireError};
