//! Outbound state records, counters and diagnostic snapshots.

use std::ops::AddAssign;

use serde::Serialize;
use sonic_orch_common::FieldValue;
use sonic_types::{FallbackMode, LacpMode, LacpRate, SystemId};

use crate::fallback::FallbackState;
use crate::mux::MuxState;
use crate::pdu::PortInfo;
use crate::periodic::PeriodicState;
use crate::rx::RxState;
use crate::tables::fields;
use crate::types::{BondStatus, Selection};

/// Per-interface LAG_MEMBER_TABLE record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceStateRecord {
    pub actor_state: String,
    pub partner_state: String,
    pub actor_system_id: String,
    pub partner_system_id: String,
    pub actor_port_id: String,
    pub partner_port_id: String,
    pub actor_key: u16,
    pub partner_key: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bond_status: Option<BondStatus>,
}

impl InterfaceStateRecord {
    pub fn new(actor: &PortInfo, partner: &PortInfo, bond_status: Option<BondStatus>) -> Self {
        Self {
            actor_state: actor.state.to_string(),
            partner_state: partner.state.to_string(),
            actor_system_id: actor.system.to_string(),
            partner_system_id: partner.system.to_string(),
            actor_port_id: actor.port.to_string(),
            partner_port_id: partner.port.to_string(),
            actor_key: actor.key,
            partner_key: partner.key,
            bond_status,
        }
    }

    /// Field-value form for a STATE_DB writer.
    pub fn to_field_values(&self) -> Vec<FieldValue> {
        let mut fvs = vec![
            (fields::ACTOR_STATE.to_string(), self.actor_state.clone()),
            (fields::PARTNER_STATE.to_string(), self.partner_state.clone()),
            (fields::ACTOR_SYSTEM_ID.to_string(), self.actor_system_id.clone()),
            (fields::PARTNER_SYSTEM_ID.to_string(), self.partner_system_id.clone()),
            (fields::ACTOR_PORT_ID.to_string(), self.actor_port_id.clone()),
            (fields::PARTNER_PORT_ID.to_string(), self.partner_port_id.clone()),
            (fields::ACTOR_KEY.to_string(), self.actor_key.to_string()),
            (fields::PARTNER_KEY.to_string(), self.partner_key.to_string()),
        ];
        if let Some(status) = self.bond_status {
            fvs.push((fields::BOND_STATUS.to_string(), status.to_string()));
        }
        fvs
    }
}

/// LACP protocol counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LacpCounters {
    pub lacpdus_sent: u64,
    pub lacpdus_received: u64,
    pub markers_received: u64,
    pub marker_responses_sent: u64,
    /// Malformed frames.
    pub rx_errors: u64,
    /// Frames received while LACP was not running on the interface.
    pub rx_dropped: u64,
    pub actor_churn: u64,
    pub partner_churn: u64,
}

impl AddAssign for LacpCounters {
    fn add_assign(&mut self, other: Self) {
        self.lacpdus_sent += other.lacpdus_sent;
        self.lacpdus_received += other.lacpdus_received;
        self.markers_received += other.markers_received;
        self.marker_responses_sent += other.marker_responses_sent;
        self.rx_errors += other.rx_errors;
        self.rx_dropped += other.rx_dropped;
        self.actor_churn += other.actor_churn;
        self.partner_churn += other.partner_churn;
    }
}

/// Member lists of a LAG.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LagInterfaces {
    /// Every configured member.
    pub configured: Vec<String>,
    /// Members the selection logic accepted (selected or standby).
    pub eligible: Vec<String>,
    /// Members collecting and distributing.
    pub participant: Vec<String>,
}

/// Snapshot of one member.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceDump {
    pub name: String,
    pub rx_state: RxState,
    pub mux_state: MuxState,
    pub periodic: PeriodicState,
    pub selection: Selection,
    pub actor: PortInfo,
    pub partner: PortInfo,
    pub actor_churn: bool,
    pub partner_churn: bool,
    pub fallback_granted: bool,
    pub bond_status: Option<BondStatus>,
    pub counters: LacpCounters,
}

/// Snapshot of a LAG and its members.
#[derive(Debug, Clone, Serialize)]
pub struct LagStateDump {
    pub name: String,
    pub key: u16,
    pub mode: LacpMode,
    pub rate: LacpRate,
    pub system_id: SystemId,
    pub fallback_enabled: bool,
    pub fallback_mode: FallbackMode,
    pub fallback_timeout_secs: u16,
    pub fallback: FallbackState,
    pub bond_status: BondStatus,
    pub counters: LacpCounters,
    pub members: Vec<InterfaceDump>,
}

impl LagStateDump {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::LacpState;
    use pretty_assertions::assert_eq;
    use sonic_types::PortId;

    fn actor() -> PortInfo {
        PortInfo {
            system: SystemId::new(65534, "70:72:cf:52:a1:10".parse().unwrap()),
            key: 1,
            port: PortId::new(1, 1),
            state: LacpState::from_bits(0x3d),
        }
    }

    #[test]
    fn test_record_fields() {
        let record = InterfaceStateRecord::new(&actor(), &PortInfo::default(), Some(BondStatus::Up));

        assert_eq!(record.actor_state, "Activ:1,TmOut:0,Aggr:1,Sync:1,Col:1,Dist:1,Def:0,Exp:0");
        assert_eq!(record.partner_system_id, "0,00:00:00:00:00:00");
        assert_eq!(record.actor_port_id, "1,1");

        let fvs = record.to_field_values();
        assert_eq!(fvs.len(), 9);
        assert_eq!(fvs[6], ("actor_key".to_string(), "1".to_string()));
        assert_eq!(fvs[8], ("bond_status".to_string(), "up".to_string()));
    }

    #[test]
    fn test_record_without_bond_status() {
        let record = InterfaceStateRecord::new(&actor(), &actor(), None);
        assert_eq!(record.to_field_values().len(), 8);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("bond_status").is_none());
        assert_eq!(json["actor_system_id"], "65534,70:72:cf:52:a1:10");
    }

    #[test]
    fn test_counters_add() {
        let mut total = LacpCounters::default();
        total += LacpCounters {
            lacpdus_sent: 2,
            rx_errors: 1,
            ..Default::default()
        };
        total += LacpCounters {
            lacpdus_sent: 3,
            actor_churn: 1,
            ..Default::default()
        };
        assert_eq!(total.lacpdus_sent, 5);
        assert_eq!(total.rx_errors, 1);
        assert_eq!(total.actor_churn, 1);
    }
}
