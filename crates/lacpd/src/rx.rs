//! Receive machine.
//!
//! Records what the partner tells us, ages it out through Expired and
//! Defaulted, and derives the partner's Synchronization flag from whether
//! the partner's view of us is accurate.

use serde::Serialize;
use sonic_types::{LacpMode, LacpRate};
use tracing::{debug, info};

use crate::interface::Interface;
use crate::pdu::{LacpState, Lacpdu, PortInfo};
use crate::periodic::PeriodicState;
use crate::timer::{TimerKey, TimerService};
use crate::types::{IfIndex, LONG_TIMEOUT_MS, SHORT_TIMEOUT_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RxState {
    Initialize,
    PortDisabled,
    Expired,
    Defaulted,
    Current,
    /// Member of a static LAG.
    LacpDisabled,
}

/// Follow-up work for the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxOutcome {
    /// The partner identity changed; the LAG must be re-selected.
    pub reselect: bool,
    /// The partner holds a stale view of us.
    pub ntt: bool,
}

/// Flags compared when deciding whether the partner's view of us is stale.
const REFLECTED_FLAGS: u8 = LacpState::ACTIVITY
    | LacpState::TIMEOUT
    | LacpState::AGGREGATION
    | LacpState::SYNCHRONIZATION;

/// The partner record used when no partner is known. A member granted by
/// fallback gets a partner that looks in sync and forwarding.
pub fn default_partner(fallback_granted: bool) -> PortInfo {
    let mut partner = PortInfo::default();
    if fallback_granted {
        partner.state.set(LacpState::SYNCHRONIZATION, true);
        partner.state.set(LacpState::COLLECTING, true);
        partner.state.set(LacpState::DISTRIBUTING, true);
    }
    partner
}

/// Sets the configuration-derived actor flags.
pub fn apply_admin_flags(actor: &mut LacpState, mode: LacpMode, rate: LacpRate) {
    actor.set(LacpState::ACTIVITY, mode == LacpMode::Active);
    actor.set(LacpState::TIMEOUT, rate.is_fast());
    actor.set(LacpState::AGGREGATION, true);
}

/// Admin or link went down. Whatever was learned about the partner is
/// forgotten.
pub fn port_disabled(ifx: IfIndex, iface: &mut Interface, timers: &mut TimerService) {
    timers.cancel_interface(ifx);

    let expired = iface.actor.expired();
    iface.actor = LacpState::default();
    iface.actor.set(LacpState::EXPIRED, expired);
    iface.partner = default_partner(false);
    iface.partner_known = false;
    iface.partner_view_matches = false;

    iface.rx_state = RxState::PortDisabled;
    iface.periodic = PeriodicState::NoPeriodic;
    iface.ready = false;
    iface.ntt = false;
    debug!(interface = %iface.name, "Receive machine disabled");
}

/// Port enabled as a member of a dynamic LAG: start in Expired so the
/// partner is asked for fast LACPDUs.
pub fn enable(
    ifx: IfIndex,
    iface: &mut Interface,
    mode: LacpMode,
    rate: LacpRate,
    timers: &mut TimerService,
    now: u64,
) {
    apply_admin_flags(&mut iface.actor, mode, rate);
    enter_expired(ifx, iface, timers, now);
}

fn enter_expired(ifx: IfIndex, iface: &mut Interface, timers: &mut TimerService, now: u64) {
    iface.rx_state = RxState::Expired;
    iface.actor.set(LacpState::EXPIRED, true);
    iface.actor.set(LacpState::DEFAULTED, false);
    iface.partner.state.set(LacpState::SYNCHRONIZATION, false);
    iface.partner.state.set(LacpState::TIMEOUT, true);
    timers.arm(TimerKey::CurrentWhile(ifx), now + SHORT_TIMEOUT_MS);
}

fn enter_defaulted(iface: &mut Interface) {
    iface.rx_state = RxState::Defaulted;
    iface.actor.set(LacpState::EXPIRED, false);
    iface.actor.set(LacpState::DEFAULTED, true);
    iface.partner = default_partner(iface.fallback_granted);
    iface.partner_known = false;
    iface.partner_view_matches = false;
}

/// Member of a static LAG: no LACP state at all.
pub fn lacp_disabled(ifx: IfIndex, iface: &mut Interface, timers: &mut TimerService) {
    timers.cancel_interface(ifx);
    iface.rx_state = RxState::LacpDisabled;
    iface.actor = LacpState::default();
    iface.partner = default_partner(false);
    iface.partner_known = false;
    iface.partner_view_matches = false;
    iface.periodic = PeriodicState::NoPeriodic;
    iface.ntt = false;
}

/// The current-while timer fired.
pub fn current_while_expired(
    ifx: IfIndex,
    iface: &mut Interface,
    timers: &mut TimerService,
    now: u64,
) -> RxOutcome {
    match iface.rx_state {
        RxState::Current => {
            info!(interface = %iface.name, "Partner information expired");
            enter_expired(ifx, iface, timers, now);
            RxOutcome::default()
        }
        RxState::Expired => {
            info!(interface = %iface.name, "No LACPDU received, using partner defaults");
            enter_defaulted(iface);
            RxOutcome {
                reselect: true,
                ntt: false,
            }
        }
        _ => RxOutcome::default(),
    }
}

/// Records a received LACPDU. `actor` is our current view of this port.
pub fn record_pdu(
    ifx: IfIndex,
    iface: &mut Interface,
    actor: &PortInfo,
    pdu: &Lacpdu,
    timers: &mut TimerService,
    now: u64,
) -> RxOutcome {
    let view_matches = pdu.partner.same_endpoint(actor);
    let mut partner = pdu.actor;
    partner.state.set(
        LacpState::SYNCHRONIZATION,
        pdu.actor.state.sync() && view_matches,
    );

    let reselect = !iface.partner_known || !iface.partner.same_endpoint(&partner);
    if reselect {
        info!(
            interface = %iface.name,
            partner_system = %partner.system,
            partner_key = partner.key,
            partner_port = %partner.port,
            "New partner"
        );
    }
    let stale_flags = (pdu.partner.state.bits() ^ actor.state.bits()) & REFLECTED_FLAGS != 0;

    iface.partner = partner;
    iface.partner_known = true;
    iface.partner_view_matches = view_matches;
    iface.rx_state = RxState::Current;
    iface.actor.set(LacpState::EXPIRED, false);
    iface.actor.set(LacpState::DEFAULTED, false);

    let timeout = if iface.actor.timeout() {
        SHORT_TIMEOUT_MS
    } else {
        LONG_TIMEOUT_MS
    };
    timers.arm(TimerKey::CurrentWhile(ifx), now + timeout);

    RxOutcome {
        reselect,
        ntt: !view_matches || stale_flags,
    }
}

/// Re-arms a running current-while timer after a rate change.
pub fn rate_changed(ifx: IfIndex, iface: &Interface, timers: &mut TimerService, now: u64) {
    let timeout = match iface.rx_state {
        RxState::Current if iface.actor.timeout() => SHORT_TIMEOUT_MS,
        RxState::Current => LONG_TIMEOUT_MS,
        RxState::Expired => SHORT_TIMEOUT_MS,
        _ => return,
    };
    timers.arm(TimerKey::CurrentWhile(ifx), now + timeout);
}
