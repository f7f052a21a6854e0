//! Shared types and protocol constants for lacpd.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Fast periodic transmission interval.
pub const FAST_PERIODIC_MS: u64 = 1_000;

/// Slow periodic transmission interval.
pub const SLOW_PERIODIC_MS: u64 = 30_000;

/// Receive timeout when the actor asked for fast LACPDUs (3 x fast period).
pub const SHORT_TIMEOUT_MS: u64 = 3 * FAST_PERIODIC_MS;

/// Receive timeout when the actor asked for slow LACPDUs (3 x slow period).
pub const LONG_TIMEOUT_MS: u64 = 3 * SLOW_PERIODIC_MS;

/// Time a newly selected member waits before it may attach.
pub const AGGREGATE_WAIT_MS: u64 = 2_000;

/// How long a selected member may stay out of sync before churn is declared.
pub const CHURN_DETECTION_MS: u64 = 60_000;

/// Transmit limit: at most this many LACPDUs per fast periodic interval.
pub const TX_LIMIT_PER_INTERVAL: u8 = 3;

/// Default system priority.
pub const DEFAULT_SYSTEM_PRIORITY: u16 = 65534;

/// Default port priority.
pub const DEFAULT_PORT_PRIORITY: u16 = 1;

/// Upper bound of the fallback timeout, in seconds.
pub const MAX_FALLBACK_TIMEOUT_SECS: u16 = 900;

/// Default maximum number of simultaneously selected members per LAG.
pub const DEFAULT_MAX_LAG_MEMBERS: usize = 8;

/// Arena index of an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IfIndex(pub usize);

/// Arena index of a LAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LagIndex(pub usize);

/// Forwarding status of a member or of a LAG as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BondStatus {
    Up,
    Down,
    Blocked,
}

impl BondStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BondStatus::Up => "up",
            BondStatus::Down => "down",
            BondStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for BondStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BondStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(BondStatus::Up),
            "down" => Ok(BondStatus::Down),
            "blocked" => Ok(BondStatus::Blocked),
            _ => Err(format!("unknown bond status: {}", s)),
        }
    }
}

/// Why the selection logic left a member out of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnselectedReason {
    /// Not configured under any LAG.
    NotMember,
    /// Admin down or link down.
    Disabled,
    /// Its aggregation key differs from the winning key.
    KeyMismatch,
    /// Its partner differs from the winning partner.
    PartnerMismatch,
    /// No partner heard while other members have one.
    NoPartner,
    /// Its speed differs from the reference speed.
    SpeedMismatch,
}

/// Per-member outcome of the selection logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Selected,
    /// Compatible but beyond the member limit.
    Standby,
    Unselected(UnselectedReason),
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Unselected(UnselectedReason::NotMember)
    }
}

impl Selection {
    pub fn is_selected(&self) -> bool {
        matches!(self, Selection::Selected)
    }

    /// Selected or standby: the member may wait to attach.
    pub fn is_eligible(&self) -> bool {
        matches!(self, Selection::Selected | Selection::Standby)
    }

    /// Left out because it conflicts with the winning aggregate (key,
    /// partner or speed). Such members stop transmitting and report
    /// `blocked` while their link is up.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Selection::Unselected(
                UnselectedReason::KeyMismatch
                    | UnselectedReason::PartnerMismatch
                    | UnselectedReason::SpeedMismatch
            )
        )
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Selected => f.write_str("selected"),
            Selection::Standby => f.write_str("standby"),
            Selection::Unselected(reason) => write!(f, "unselected({:?})", reason),
        }
    }
}
