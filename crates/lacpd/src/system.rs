//! System identity shared by every LAG.

use serde::Serialize;
use sonic_orch_common::FieldValue;
use sonic_types::{MacAddress, SystemId};
use tracing::debug;

use crate::error::{LacpError, LacpResult};
use crate::lag::{parse_mac, parse_u16, LagConfig};
use crate::tables::fields;
use crate::types::DEFAULT_SYSTEM_PRIORITY;

/// Global system MAC and priority. LAGs may override either; the
/// effective identity is resolved per lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemContext {
    pub mac: MacAddress,
    pub priority: u16,
}

impl Default for SystemContext {
    fn default() -> Self {
        Self {
            mac: MacAddress::ZERO,
            priority: DEFAULT_SYSTEM_PRIORITY,
        }
    }
}

impl SystemContext {
    pub fn new(mac: MacAddress, priority: u16) -> Self {
        Self { mac, priority }
    }

    /// Effective system identifier of a LAG.
    pub fn resolve(&self, lag: &LagConfig) -> SystemId {
        SystemId::new(
            lag.system_priority.unwrap_or(self.priority),
            lag.system_mac.unwrap_or(self.mac),
        )
    }

    /// Returns the context with the `LACP_SYSTEM|global` fields applied.
    /// Nothing is changed when a field is rejected.
    pub fn with_fields(&self, fvs: &[FieldValue]) -> LacpResult<SystemContext> {
        let mut next = *self;
        for (field, value) in fvs {
            match field.as_str() {
                fields::SYSTEM_MAC => next.mac = parse_mac(field, value)?,
                fields::SYSTEM_PRIORITY => next.priority = parse_u16(field, value)?,
                _ => debug!(field = %field, "Ignoring unknown LACP_SYSTEM field"),
            }
        }
        Ok(next)
    }
}

/// Rejects system MACs that cannot identify an LACP system.
pub(crate) fn validate_system_mac(field: &str, mac: MacAddress) -> LacpResult<MacAddress> {
    if mac.is_multicast() {
        return Err(LacpError::invalid_config(
            field,
            format!("{} is a multicast address", mac),
        ));
    }
    Ok(mac)
}
