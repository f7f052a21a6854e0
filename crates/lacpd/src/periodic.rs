//! Periodic Transmission machine.

use serde::Serialize;

use crate::types::{FAST_PERIODIC_MS, SLOW_PERIODIC_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PeriodicState {
    #[default]
    NoPeriodic,
    FastPeriodic,
    SlowPeriodic,
}

impl PeriodicState {
    /// Transmission interval, `None` when nothing is sent periodically.
    pub fn interval_ms(&self) -> Option<u64> {
        match self {
            PeriodicState::NoPeriodic => None,
            PeriodicState::FastPeriodic => Some(FAST_PERIODIC_MS),
            PeriodicState::SlowPeriodic => Some(SLOW_PERIODIC_MS),
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(self, PeriodicState::NoPeriodic)
    }
}

/// Snapshot of everything the periodic machine looks at.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodicInput {
    /// Admin up and link up.
    pub port_enabled: bool,
    /// Member of a LAG running LACP (mode active or passive).
    pub lacp_enabled: bool,
    /// Left out of the aggregate by a key, partner or speed conflict.
    pub excluded: bool,
    pub actor_active: bool,
    pub partner_active: bool,
    /// Our Timeout flag (rate fast).
    pub actor_short_timeout: bool,
    /// Partner's Timeout flag.
    pub partner_short_timeout: bool,
}

/// Computes the periodic state for a member.
pub fn periodic_state(input: &PeriodicInput) -> PeriodicState {
    if !input.port_enabled || !input.lacp_enabled || input.excluded {
        return PeriodicState::NoPeriodic;
    }
    if !input.actor_active && !input.partner_active {
        return PeriodicState::NoPeriodic;
    }
    if input.actor_short_timeout || input.partner_short_timeout {
        PeriodicState::FastPeriodic
    } else {
        PeriodicState::SlowPeriodic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> PeriodicInput {
        PeriodicInput {
            port_enabled: true,
            lacp_enabled: true,
            actor_active: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_slow_and_fast() {
        assert_eq!(periodic_state(&running()), PeriodicState::SlowPeriodic);

        let input = PeriodicInput {
            actor_short_timeout: true,
            ..running()
        };
        assert_eq!(periodic_state(&input), PeriodicState::FastPeriodic);

        let input = PeriodicInput {
            partner_short_timeout: true,
            ..running()
        };
        assert_eq!(periodic_state(&input), PeriodicState::FastPeriodic);
        assert_eq!(PeriodicState::FastPeriodic.interval_ms(), Some(1_000));
        assert_eq!(PeriodicState::SlowPeriodic.interval_ms(), Some(30_000));
    }

    #[test]
    fn test_no_periodic_conditions() {
        for input in [
            PeriodicInput {
                port_enabled: false,
                ..running()
            },
            PeriodicInput {
                lacp_enabled: false,
                ..running()
            },
            PeriodicInput {
                excluded: true,
                ..running()
            },
            PeriodicInput {
                actor_active: false,
                ..running()
            },
        ] {
            assert_eq!(periodic_state(&input), PeriodicState::NoPeriodic);
        }
        assert_eq!(PeriodicState::NoPeriodic.interval_ms(), None);
    }

    #[test]
    fn test_passive_actor_follows_active_partner() {
        let input = PeriodicInput {
            actor_active: false,
            partner_active: true,
            partner_short_timeout: true,
            ..running()
        };
        assert_eq!(periodic_state(&input), PeriodicState::FastPeriodic);
    }
}
