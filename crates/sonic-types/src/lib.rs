//! Common SONiC types for the link-aggregation control plane.
//!
//! This crate provides type-safe representations of the primitives shared
//! by the LACP engine and its configuration boundary:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`AdminState`] / [`OperState`]: port administrative and link state
//! - [`LacpMode`], [`LacpRate`], [`FallbackMode`]: LAG configuration knobs
//! - [`SystemId`] / [`PortId`]: LACP identifiers in their STATE_DB form

mod lacp;
mod mac;
mod port;

pub use lacp::{FallbackMode, LacpMode, LacpRate, PortId, SystemId};
pub use mac::MacAddress;
pub use port::{AdminState, OperState};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid admin state: {0}")]
    InvalidAdminState(String),

    #[error("invalid oper state: {0}")]
    InvalidOperState(String),

    #[error("invalid LACP mode: {0} (expected off, active or passive)")]
    InvalidLacpMode(String),

    #[error("invalid LACP rate: {0} (expected slow or fast)")]
    InvalidLacpRate(String),

    #[error("invalid fallback mode: {0} (expected priority or all_active)")]
    InvalidFallbackMode(String),

    #[error("invalid system id: {0} (expected <priority>,<mac>)")]
    InvalidSystemId(String),

    #[error("invalid port id: {0} (expected <priority>,<port>)")]
    InvalidPortId(String),
}
