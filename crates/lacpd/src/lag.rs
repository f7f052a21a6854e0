//! LAG configuration and per-LAG state.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use sonic_orch_common::FieldValue;
use sonic_types::{FallbackMode, LacpMode, LacpRate, MacAddress};
use tracing::debug;

use crate::error::{LacpError, LacpResult};
use crate::fallback::FallbackState;
use crate::system::validate_system_mac;
use crate::tables::fields;
use crate::types::{BondStatus, IfIndex, MAX_FALLBACK_TIMEOUT_SECS};

/// Largest LAG number accepted in a LAG name.
pub const MAX_LAG_NUMBER: u16 = 9999;

/// Configuration of one LAG, as held in the PORTCHANNEL table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagConfig {
    pub mode: LacpMode,
    pub rate: LacpRate,
    pub fallback: bool,
    pub fallback_mode: FallbackMode,
    pub fallback_timeout_secs: u16,
    pub system_mac: Option<MacAddress>,
    pub system_priority: Option<u16>,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            mode: LacpMode::Active,
            rate: LacpRate::Slow,
            fallback: false,
            fallback_mode: FallbackMode::Priority,
            fallback_timeout_secs: 0,
            system_mac: None,
            system_priority: None,
        }
    }
}

impl LagConfig {
    /// Parses one PORTCHANNEL field. Unknown fields (mtu, min_links, ...)
    /// belong to other daemons and are ignored.
    pub fn parse_field(&mut self, field: &str, value: &str) -> LacpResult<()> {
        match field {
            fields::LACP_MODE => self.mode = parse_enum(field, value)?,
            fields::LACP_RATE => self.rate = parse_enum(field, value)?,
            fields::FAST_RATE => {
                self.rate = if parse_bool(field, value)? {
                    LacpRate::Fast
                } else {
                    LacpRate::Slow
                }
            }
            fields::FALLBACK => self.fallback = parse_bool(field, value)?,
            fields::FALLBACK_MODE => self.fallback_mode = parse_enum(field, value)?,
            fields::FALLBACK_TIMEOUT => {
                let secs = parse_u16(field, value)?;
                if secs > MAX_FALLBACK_TIMEOUT_SECS {
                    return Err(LacpError::invalid_config(
                        field,
                        format!("{} out of range 0-{}", secs, MAX_FALLBACK_TIMEOUT_SECS),
                    ));
                }
                self.fallback_timeout_secs = secs;
            }
            fields::LACP_SYSTEM_ID => {
                self.system_mac = Some(parse_mac(field, value)?);
            }
            fields::LACP_SYSTEM_PRIORITY => {
                self.system_priority = Some(parse_u16(field, value)?);
            }
            _ => debug!(field = %field, "Ignoring PORTCHANNEL field"),
        }
        Ok(())
    }

    /// Returns a copy with `fvs` applied; `self` is untouched on error.
    pub fn with_fields(&self, fvs: &[FieldValue]) -> LacpResult<LagConfig> {
        let mut next = self.clone();
        for (field, value) in fvs {
            next.parse_field(field, value)?;
        }
        Ok(next)
    }

    /// Fallback timeout in milliseconds.
    pub fn fallback_timeout_ms(&self) -> u64 {
        u64::from(self.fallback_timeout_secs) * 1000
    }
}

/// A configured LAG.
#[derive(Debug)]
pub struct Lag {
    pub name: String,
    /// Aggregation key, the number in the LAG name.
    pub key: u16,
    pub config: LagConfig,
    pub members: BTreeSet<IfIndex>,
    pub fallback: FallbackState,
    /// Last bond status written out.
    pub published: Option<BondStatus>,
}

impl Lag {
    pub fn new(name: impl Into<String>, key: u16, config: LagConfig) -> Self {
        Self {
            name: name.into(),
            key,
            config,
            members: BTreeSet::new(),
            fallback: FallbackState::default(),
            published: None,
        }
    }
}

/// Extracts the aggregation key from a LAG name (`PortChannel<N>` or
/// `lag<N>`, N in 1..=9999).
pub fn parse_lag_key(name: &str) -> LacpResult<u16> {
    let digits = name
        .strip_prefix("PortChannel")
        .or_else(|| name.strip_prefix("lag"))
        .ok_or_else(|| {
            LacpError::invalid_config("lag", format!("{}: expected PortChannel<N> or lag<N>", name))
        })?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LacpError::invalid_config(
            "lag",
            format!("{}: missing LAG number", name),
        ));
    }
    match digits.parse::<u16>() {
        Ok(n) if (1..=MAX_LAG_NUMBER).contains(&n) => Ok(n),
        _ => Err(LacpError::invalid_config(
            "lag",
            format!("{}: LAG number out of range 1-{}", name, MAX_LAG_NUMBER),
        )),
    }
}

pub(crate) fn parse_bool(field: &str, value: &str) -> LacpResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(LacpError::invalid_config(
            field,
            format!("invalid boolean '{}'", value),
        )),
    }
}

pub(crate) fn parse_u16(field: &str, value: &str) -> LacpResult<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| LacpError::invalid_config(field, format!("'{}' is not in 0-65535", value)))
}

/// Parses a u16 that must not be zero.
pub(crate) fn parse_nonzero_u16(field: &str, value: &str) -> LacpResult<u16> {
    match parse_u16(field, value)? {
        0 => Err(LacpError::invalid_config(field, "must be in 1-65535")),
        n => Ok(n),
    }
}

pub(crate) fn parse_mac(field: &str, value: &str) -> LacpResult<MacAddress> {
    let mac = value
        .parse()
        .map_err(|e| LacpError::invalid_config(field, format!("{}", e)))?;
    validate_system_mac(field, mac)
}

pub(crate) fn parse_enum<T: FromStr>(field: &str, value: &str) -> LacpResult<T>
where
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| LacpError::invalid_config(field, format!("{}", e)))
}
