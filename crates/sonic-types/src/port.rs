//! Administrative and operational state of a switch port.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Administrative state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminState {
    /// Administratively down (default for new ports).
    #[default]
    Down,
    /// Administratively up.
    Up,
}

impl AdminState {
    /// Returns true if the port is administratively up.
    pub const fn is_up(&self) -> bool {
        matches!(self, AdminState::Up)
    }
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminState::Up => write!(f, "up"),
            AdminState::Down => write!(f, "down"),
        }
    }
}

impl FromStr for AdminState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(AdminState::Up),
            "down" => Ok(AdminState::Down),
            _ => Err(ParseError::InvalidAdminState(s.to_string())),
        }
    }
}

/// Operational (link) state of a port, as reported by the link detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    /// Link is down (default until the detector reports otherwise).
    #[default]
    Down,
    /// Link is up.
    Up,
}

impl OperState {
    /// Returns true if the link is up.
    pub const fn is_up(&self) -> bool {
        matches!(self, OperState::Up)
    }
}

impl From<bool> for OperState {
    fn from(up: bool) -> Self {
        if up {
            OperState::Up
        } else {
            OperState::Down
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperState::Up => write!(f, "up"),
            OperState::Down => write!(f, "down"),
        }
    }
}

impl FromStr for OperState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(OperState::Up),
            "down" => Ok(OperState::Down),
            _ => Err(ParseError::InvalidOperState(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_admin_state() {
        assert!(AdminState::Up.is_up());
        assert!(!AdminState::default().is_up());
        assert_eq!("UP".parse::<AdminState>().unwrap(), AdminState::Up);
        assert!("sideways".parse::<AdminState>().is_err());
    }

    #[test]
    fn test_oper_state() {
        assert!(OperState::from(true).is_up());
        assert!(!OperState::from(false).is_up());
        assert_eq!("down".parse::<OperState>().unwrap(), OperState::Down);
        assert!("testing".parse::<OperState>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(AdminState::Up.to_string(), "up");
        assert_eq!(OperState::Down.to_string(), "down");
    }
}
