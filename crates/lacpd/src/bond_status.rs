//! Bond-status aggregation for members and LAGs.

use crate::mux::MuxState;
use crate::types::{BondStatus, Selection};

/// Bond status of one interface. `None` when it is not a LAG member.
pub fn interface_bond_status(
    is_member: bool,
    admin_up: bool,
    link_up: bool,
    selection: Selection,
    mux: MuxState,
) -> Option<BondStatus> {
    if !is_member {
        return None;
    }
    let status = if !admin_up || !link_up {
        BondStatus::Down
    } else if selection.is_conflict() || selection == Selection::Standby {
        BondStatus::Blocked
    } else if mux.is_collecting_distributing() {
        BondStatus::Up
    } else {
        BondStatus::Down
    };
    Some(status)
}

/// Bond status of a LAG from its members: up if any member is up, down if
/// there are none or all are down, blocked otherwise.
pub fn lag_bond_status(members: impl IntoIterator<Item = BondStatus>) -> BondStatus {
    let mut any_blocked = false;
    for status in members {
        match status {
            BondStatus::Up => return BondStatus::Up,
            BondStatus::Blocked => any_blocked = true,
            BondStatus::Down => {}
        }
    }
    if any_blocked {
        BondStatus::Blocked
    } else {
        BondStatus::Down
    }
}
