//! LACP configuration knobs and identifiers.
//!
//! The string forms match what the configuration store and the STATE_DB
//! records use (`active`, `fast`, `all_active`, `65534,70:72:cf:52:a1:10`).

use crate::{MacAddress, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// LAG operating mode.
///
/// `Off` is a static LAG: no LACPDUs are exchanged and membership is decided
/// by link state alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LacpMode {
    #[default]
    Off,
    Active,
    Passive,
}

impl LacpMode {
    /// Returns true for `active` and `passive`.
    pub const fn is_dynamic(&self) -> bool {
        !matches!(self, LacpMode::Off)
    }

    /// Returns the string used in CONFIG_DB.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LacpMode::Off => "off",
            LacpMode::Active => "active",
            LacpMode::Passive => "passive",
        }
    }
}

impl fmt::Display for LacpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LacpMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(LacpMode::Off),
            "active" => Ok(LacpMode::Active),
            "passive" => Ok(LacpMode::Passive),
            _ => Err(ParseError::InvalidLacpMode(s.to_string())),
        }
    }
}

/// LACPDU transmission rate requested from the partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LacpRate {
    #[default]
    Slow,
    Fast,
}

impl LacpRate {
    pub const fn is_fast(&self) -> bool {
        matches!(self, LacpRate::Fast)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LacpRate::Slow => "slow",
            LacpRate::Fast => "fast",
        }
    }
}

impl fmt::Display for LacpRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LacpRate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "slow" => Ok(LacpRate::Slow),
            "fast" => Ok(LacpRate::Fast),
            _ => Err(ParseError::InvalidLacpRate(s.to_string())),
        }
    }
}

/// How many defaulted members fallback lets forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Exactly one member, chosen by port priority then port id.
    #[default]
    Priority,
    /// Every defaulted member.
    AllActive,
}

impl FallbackMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FallbackMode::Priority => "priority",
            FallbackMode::AllActive => "all_active",
        }
    }
}

impl fmt::Display for FallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "priority" => Ok(FallbackMode::Priority),
            "all_active" | "all-active" => Ok(FallbackMode::AllActive),
            _ => Err(ParseError::InvalidFallbackMode(s.to_string())),
        }
    }
}

/// LACP system identifier: system priority plus system MAC.
///
/// Field order gives the 802.3ad comparison: a numerically lower priority
/// wins, equal priorities fall back to the MAC.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SystemId {
    pub priority: u16,
    pub mac: MacAddress,
}

impl SystemId {
    pub const fn new(priority: u16, mac: MacAddress) -> Self {
        Self { priority, mac }
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.priority, self.mac)
    }
}

impl FromStr for SystemId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidSystemId(s.to_string());
        let (priority, mac) = s.split_once(',').ok_or_else(invalid)?;
        Ok(SystemId {
            priority: priority.trim().parse().map_err(|_| invalid())?,
            mac: mac.trim().parse().map_err(|_| invalid())?,
        })
    }
}

/// LACP port identifier: port priority plus port number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PortId {
    pub priority: u16,
    pub number: u16,
}

impl PortId {
    pub const fn new(priority: u16, number: u16) -> Self {
        Self { priority, number }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.priority, self.number)
    }
}

impl FromStr for PortId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidPortId(s.to_string());
        let (priority, number) = s.split_once(',').ok_or_else(invalid)?;
        Ok(PortId {
            priority: priority.trim().parse().map_err(|_| invalid())?,
            number: number.trim().parse().map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lacp_mode_parse() {
        assert_eq!("active".parse::<LacpMode>().unwrap(), LacpMode::Active);
        assert_eq!("Passive".parse::<LacpMode>().unwrap(), LacpMode::Passive);
        assert_eq!("off".parse::<LacpMode>().unwrap(), LacpMode::Off);
        assert!("on".parse::<LacpMode>().is_err());
        assert!(LacpMode::Active.is_dynamic());
        assert!(!LacpMode::Off.is_dynamic());
    }

    #[test]
    fn test_rate_and_fallback_mode() {
        assert!("fast".parse::<LacpRate>().unwrap().is_fast());
        assert!(!LacpRate::default().is_fast());
        assert_eq!(
            "all_active".parse::<FallbackMode>().unwrap(),
            FallbackMode::AllActive
        );
        assert_eq!(FallbackMode::AllActive.to_string(), "all_active");
        assert!("some".parse::<FallbackMode>().is_err());
    }

    #[test]
    fn test_system_id_format() {
        let id: SystemId = "65534,70:72:cf:52:a1:10".parse().unwrap();
        assert_eq!(id.priority, 65534);
        assert_eq!(id.to_string(), "65534,70:72:cf:52:a1:10");
        assert!("65534".parse::<SystemId>().is_err());
        assert!("x,70:72:cf:52:a1:10".parse::<SystemId>().is_err());
    }

    #[test]
    fn test_system_id_ordering() {
        let mac_low: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        let mac_high: MacAddress = "00:00:00:00:00:02".parse().unwrap();

        // Priority dominates the MAC.
        assert!(SystemId::new(100, mac_high) < SystemId::new(200, mac_low));
        assert!(SystemId::new(100, mac_low) < SystemId::new(100, mac_high));
    }

    #[test]
    fn test_port_id_format() {
        let id: PortId = "1,17".parse().unwrap();
        assert_eq!(id, PortId::new(1, 17));
        assert_eq!(id.to_string(), "1,17");
        assert!(PortId::new(1, 2) < PortId::new(2, 1));
    }
}
