//! lacpd - LACP (IEEE 802.3ad) engine for SONiC
//!
//! Runs the per-interface actor/partner state machines, selects LAG members
//! by aggregation key and priority, gates collecting/distributing through the
//! mux machine and aggregates `bond_status` for interfaces and LAGs.
//! Configuration arrives as CONFIG_DB-shaped table entries; state leaves as
//! STATE_DB-shaped records through [`LacpCallbacks`].

pub mod bond_status;
pub mod churn;
pub mod config;
pub mod error;
pub mod fallback;
pub mod interface;
pub mod lacp_mgr;
pub mod lag;
pub mod mux;
pub mod pdu;
pub mod periodic;
pub mod rx;
pub mod selection;
pub mod state;
pub mod system;
pub mod tables;
pub mod timer;
pub mod types;

pub use config::{LacpdConfig, DEFAULT_CONFIG_PATH};
pub use error::{LacpError, LacpResult};
pub use lacp_mgr::{LacpCallbacks, LacpEvent, LacpMgr};
pub use pdu::{DecodeError, LacpState, Lacpdu, MarkerPdu, Pdu, PortInfo};
pub use state::{InterfaceStateRecord, LacpCounters, LagInterfaces, LagStateDump};
pub use system::SystemContext;
pub use tables::*;
pub use types::*;
