//! Mux machine: attaches selected members to the aggregate and gates
//! collecting and distributing.

use serde::Serialize;
use tracing::info;

use crate::interface::Interface;
use crate::pdu::LacpState;
use crate::timer::{TimerKey, TimerService};
use crate::types::{IfIndex, Selection, AGGREGATE_WAIT_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum MuxState {
    #[default]
    Detached,
    Waiting,
    Attached,
    CollectingDistributing,
}

impl MuxState {
    pub fn is_collecting_distributing(&self) -> bool {
        matches!(self, MuxState::CollectingDistributing)
    }
}

/// Inputs of one mux evaluation.
#[derive(Debug, Clone, Copy)]
pub struct MuxInput {
    pub selection: Selection,
    /// Static LAG: no LACP handshake.
    pub static_mode: bool,
    /// Wait-while elapsed.
    pub ready: bool,
    pub partner_sync: bool,
}

/// One transition, or `state` itself when nothing applies.
pub fn next_state(state: MuxState, input: &MuxInput) -> MuxState {
    if input.static_mode {
        return if input.selection.is_selected() {
            MuxState::CollectingDistributing
        } else {
            MuxState::Detached
        };
    }

    match state {
        MuxState::Detached if input.selection.is_eligible() => MuxState::Waiting,
        MuxState::Waiting if !input.selection.is_eligible() => MuxState::Detached,
        MuxState::Waiting if input.selection.is_selected() && input.ready => MuxState::Attached,
        MuxState::Attached if !input.selection.is_selected() => MuxState::Detached,
        MuxState::Attached if input.partner_sync => MuxState::CollectingDistributing,
        MuxState::CollectingDistributing if !input.selection.is_selected() => MuxState::Detached,
        MuxState::CollectingDistributing if !input.partner_sync => MuxState::Attached,
        other => other,
    }
}

/// Runs the mux of one member until it settles, applying the timer and
/// actor-flag effects of each state entered. Returns true on any change.
pub fn run(
    ifx: IfIndex,
    iface: &mut Interface,
    static_mode: bool,
    timers: &mut TimerService,
    now: u64,
) -> bool {
    let start = iface.mux_state;

    // Four states: a settled machine is reached within four steps.
    for _ in 0..4 {
        let input = MuxInput {
            selection: iface.selection,
            static_mode,
            ready: iface.ready,
            partner_sync: iface.partner.state.sync(),
        };
        let next = next_state(iface.mux_state, &input);
        if next == iface.mux_state {
            break;
        }

        match next {
            MuxState::Detached => {
                timers.cancel(TimerKey::WaitWhile(ifx));
                iface.ready = false;
            }
            MuxState::Waiting => {
                iface.ready = false;
                timers.arm(TimerKey::WaitWhile(ifx), now + AGGREGATE_WAIT_MS);
            }
            MuxState::Attached | MuxState::CollectingDistributing => {}
        }
        iface.mux_state = next;
    }

    if !static_mode {
        apply_actor_flags(iface);
    }

    if iface.mux_state != start {
        info!(
            interface = %iface.name,
            from = ?start,
            to = ?iface.mux_state,
            "Mux state changed"
        );
    }
    iface.mux_state != start
}

/// Actor Sync, Collecting and Distributing follow the mux state. In
/// Attached, Sync additionally requires the partner to agree on who we are.
fn apply_actor_flags(iface: &mut Interface) {
    let (sync, forwarding) = match iface.mux_state {
        MuxState::Detached | MuxState::Waiting => (false, false),
        MuxState::Attached => {
            let partner_agrees = !iface.partner_known || iface.partner_view_matches;
            (iface.selection.is_selected() && partner_agrees, false)
        }
        MuxState::CollectingDistributing => (true, true),
    };
    iface.actor.set(LacpState::SYNCHRONIZATION, sync);
    iface.actor.set(LacpState::COLLECTING, forwarding);
    iface.actor.set(LacpState::DISTRIBUTING, forwarding);
}
