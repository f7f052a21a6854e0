//! Actor and partner churn detection.
//!
//! A selected member that fails to reach synchronization within the churn
//! detection time is flagged. The flag is diagnostic only; it clears as soon
//! as the side in question reports Sync.

use serde::Serialize;
use tracing::{info, warn};

use crate::interface::Interface;
use crate::rx::RxState;
use crate::timer::{TimerKey, TimerService};
use crate::types::{IfIndex, CHURN_DETECTION_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChurnSide {
    Actor,
    Partner,
}

impl ChurnSide {
    fn timer(&self, ifx: IfIndex) -> TimerKey {
        match self {
            ChurnSide::Actor => TimerKey::ActorChurn(ifx),
            ChurnSide::Partner => TimerKey::PartnerChurn(ifx),
        }
    }
}

fn monitored(iface: &Interface) -> bool {
    iface.is_enabled()
        && iface.selection.is_selected()
        && !matches!(
            iface.rx_state,
            RxState::Initialize | RxState::PortDisabled | RxState::LacpDisabled
        )
}

/// Arms or clears churn detection for one member after a state change.
pub fn update(ifx: IfIndex, iface: &mut Interface, timers: &mut TimerService, now: u64) {
    if !monitored(iface) {
        timers.cancel(TimerKey::ActorChurn(ifx));
        timers.cancel(TimerKey::PartnerChurn(ifx));
        iface.actor_churn = false;
        iface.partner_churn = false;
        return;
    }

    for side in [ChurnSide::Actor, ChurnSide::Partner] {
        let (in_sync, flag) = match side {
            ChurnSide::Actor => (iface.actor.sync(), &mut iface.actor_churn),
            ChurnSide::Partner => (iface.partner.state.sync(), &mut iface.partner_churn),
        };
        if in_sync {
            timers.cancel(side.timer(ifx));
            if *flag {
                *flag = false;
                info!(interface = %iface.name, side = ?side, "Churn cleared");
            }
        } else if !*flag {
            timers.arm_if_idle(side.timer(ifx), now + CHURN_DETECTION_MS);
        }
    }
}

/// The churn timer of `side` fired: the member never synchronized.
pub fn expired(side: ChurnSide, iface: &mut Interface) {
    match side {
        ChurnSide::Actor => {
            iface.actor_churn = true;
            iface.counters.actor_churn += 1;
        }
        ChurnSide::Partner => {
            iface.partner_churn = true;
            iface.counters.partner_churn += 1;
        }
    }
    warn!(
        interface = %iface.name,
        side = ?side,
        "Churn detected: no synchronization within {} s",
        CHURN_DETECTION_MS / 1000
    );
}
