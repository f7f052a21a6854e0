//! Fallback: lets a dynamic LAG forward through defaulted members when the
//! far end does not run LACP at all.
//!
//! Once every enabled member is defaulted the controller waits
//! `fallback_timeout` and then grants members. A granted member's default
//! partner record reports Sync, Collecting and Distributing, which carries
//! it through the mux into CollectingDistributing. A real LACPDU on any
//! member ends fallback.

use serde::Serialize;
use sonic_types::{FallbackMode, PortId};
use tracing::info;

use crate::timer::{TimerKey, TimerService};
use crate::types::{IfIndex, LagIndex};

/// Fallback bookkeeping of one LAG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FallbackState {
    /// When all enabled members became defaulted.
    pub defaulted_since: Option<u64>,
    /// Grants are in force.
    pub active: bool,
}

/// Fallback-relevant settings of a LAG.
#[derive(Debug, Clone, Copy)]
pub struct FallbackSettings {
    /// Dynamic LAG with fallback enabled.
    pub enabled: bool,
    pub mode: FallbackMode,
    pub timeout_ms: u64,
}

/// A member as the fallback controller sees it.
#[derive(Debug, Clone, Copy)]
pub struct FallbackMember {
    pub ifx: IfIndex,
    pub port: PortId,
    pub enabled: bool,
    pub defaulted: bool,
}

/// At least one member is enabled and every enabled member is defaulted.
pub fn all_defaulted(members: &[FallbackMember]) -> bool {
    let mut enabled = members.iter().filter(|m| m.enabled).peekable();
    enabled.peek().is_some() && enabled.all(|m| m.defaulted)
}

/// Members to grant: the best by port priority and port number, or every
/// enabled defaulted member in `all_active` mode.
pub fn grants(mode: FallbackMode, members: &[FallbackMember]) -> Vec<IfIndex> {
    let mut eligible: Vec<&FallbackMember> = members
        .iter()
        .filter(|m| m.enabled && m.defaulted)
        .collect();
    eligible.sort_by_key(|m| (m.port, m.ifx));

    match mode {
        FallbackMode::Priority => eligible.first().map(|m| vec![m.ifx]).unwrap_or_default(),
        FallbackMode::AllActive => eligible.iter().map(|m| m.ifx).collect(),
    }
}

/// Advances the fallback controller of `lag` and returns the members that
/// should hold a grant now.
pub fn evaluate(
    lag: LagIndex,
    lag_name: &str,
    state: &mut FallbackState,
    settings: &FallbackSettings,
    members: &[FallbackMember],
    timers: &mut TimerService,
    now: u64,
) -> Vec<IfIndex> {
    if !settings.enabled || !all_defaulted(members) {
        if state.active {
            info!(lag = %lag_name, "Leaving fallback");
        }
        *state = FallbackState::default();
        timers.cancel(TimerKey::Fallback(lag));
        return Vec::new();
    }

    if state.defaulted_since.is_none() {
        state.defaulted_since = Some(now);
        if settings.timeout_ms == 0 {
            activate(lag_name, state);
        } else {
            timers.arm(TimerKey::Fallback(lag), now + settings.timeout_ms);
        }
    }

    if state.active {
        grants(settings.mode, members)
    } else {
        Vec::new()
    }
}

/// The fallback timer fired or the timeout is zero.
pub fn activate(lag_name: &str, state: &mut FallbackState) {
    if !state.active {
        info!(lag = %lag_name, "Entering fallback");
        state.active = true;
    }
}
