//! Per-interface configuration and LACP state.

use sonic_orch_common::FieldValue;
use sonic_types::{AdminState, OperState, PortId};
use tracing::debug;

use crate::error::{LacpError, LacpResult};
use crate::lag::{parse_enum, parse_nonzero_u16, parse_u16};
use crate::mux::MuxState;
use crate::pdu::{LacpState, PortInfo};
use crate::periodic::PeriodicState;
use crate::rx::{self, RxState};
use crate::state::{InterfaceStateRecord, LacpCounters};
use crate::tables::fields;
use crate::types::{BondStatus, LagIndex, Selection, DEFAULT_PORT_PRIORITY};

/// Member settings from the PORTCHANNEL_MEMBER table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberConfig {
    /// Overrides the key derived from the LAG name.
    pub aggregation_key: Option<u16>,
    /// Overrides the port number derived from the interface name.
    pub port_id: Option<u16>,
    pub port_priority: u16,
}

impl Default for MemberConfig {
    fn default() -> Self {
        Self {
            aggregation_key: None,
            port_id: None,
            port_priority: DEFAULT_PORT_PRIORITY,
        }
    }
}

impl MemberConfig {
    pub fn parse_field(&mut self, field: &str, value: &str) -> LacpResult<()> {
        match field {
            fields::LACP_AGGREGATION_KEY => {
                self.aggregation_key = Some(parse_nonzero_u16(field, value)?)
            }
            fields::LACP_PORT_ID => self.port_id = Some(parse_nonzero_u16(field, value)?),
            fields::LACP_PORT_PRIORITY => self.port_priority = parse_u16(field, value)?,
            _ => debug!(field = %field, "Ignoring PORTCHANNEL_MEMBER field"),
        }
        Ok(())
    }

    pub fn with_fields(&self, fvs: &[FieldValue]) -> LacpResult<MemberConfig> {
        let mut next = self.clone();
        for (field, value) in fvs {
            next.parse_field(field, value)?;
        }
        Ok(next)
    }
}

/// PORT table state relevant to LACP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortState {
    pub admin: AdminState,
    pub link: OperState,
    /// Mbps, `None` when unknown.
    pub speed: Option<u32>,
}

impl PortState {
    pub fn with_fields(&self, fvs: &[FieldValue]) -> LacpResult<PortState> {
        let mut next = *self;
        for (field, value) in fvs {
            match field.as_str() {
                fields::ADMIN_STATUS => next.admin = parse_enum(field, value)?,
                fields::OPER_STATUS => next.link = parse_enum(field, value)?,
                fields::SPEED => {
                    let speed = value.trim().parse::<u32>().map_err(|_| {
                        LacpError::invalid_config(field.as_str(), format!("invalid speed '{}'", value))
                    })?;
                    next.speed = (speed > 0).then_some(speed);
                }
                _ => {}
            }
        }
        Ok(next)
    }
}

/// An interface known to the engine, member of at most one LAG.
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub port: PortState,
    pub lag: Option<LagIndex>,
    pub member: MemberConfig,
    /// Port number used when none is configured.
    pub default_port_number: u16,

    pub actor: LacpState,
    pub partner: PortInfo,
    /// A partner has been heard since the port was last defaulted.
    pub partner_known: bool,
    /// The partner's last view of us matched our actor information.
    pub partner_view_matches: bool,

    pub rx_state: RxState,
    pub mux_state: MuxState,
    pub periodic: PeriodicState,
    pub selection: Selection,
    /// Wait-while elapsed since entering Waiting.
    pub ready: bool,

    /// Need to transmit.
    pub ntt: bool,
    pub tx_window_start: u64,
    pub tx_in_window: u8,

    pub actor_churn: bool,
    pub partner_churn: bool,
    pub fallback_granted: bool,

    pub bond_status: Option<BondStatus>,
    /// Last record written out.
    pub published: Option<InterfaceStateRecord>,
    pub counters: LacpCounters,
}

impl Interface {
    /// Creates an interface in arena slot `slot`.
    pub fn new(name: impl Into<String>, slot: usize) -> Self {
        let name = name.into();
        let default_port_number = derive_port_number(&name, slot);
        Self {
            name,
            port: PortState::default(),
            lag: None,
            member: MemberConfig::default(),
            default_port_number,
            actor: LacpState::default(),
            partner: rx::default_partner(false),
            partner_known: false,
            partner_view_matches: false,
            rx_state: RxState::Initialize,
            mux_state: MuxState::Detached,
            periodic: PeriodicState::NoPeriodic,
            selection: Selection::default(),
            ready: false,
            ntt: false,
            tx_window_start: 0,
            tx_in_window: 0,
            actor_churn: false,
            partner_churn: false,
            fallback_granted: false,
            bond_status: None,
            published: None,
            counters: LacpCounters::default(),
        }
    }

    /// Admin up and link up.
    pub fn is_enabled(&self) -> bool {
        self.port.admin.is_up() && self.port.link.is_up()
    }

    pub fn port_id(&self) -> PortId {
        PortId::new(
            self.member.port_priority,
            self.member.port_id.unwrap_or(self.default_port_number),
        )
    }

    /// Aggregation key: configured, else the LAG's.
    pub fn key(&self, lag_key: u16) -> u16 {
        self.member.aggregation_key.unwrap_or(lag_key)
    }

    /// Returns the LACP state to what a freshly created interface has.
    pub fn reset_protocol(&mut self) {
        self.actor = LacpState::default();
        self.partner = rx::default_partner(false);
        self.partner_known = false;
        self.partner_view_matches = false;
        self.rx_state = RxState::Initialize;
        self.mux_state = MuxState::Detached;
        self.periodic = PeriodicState::NoPeriodic;
        self.selection = Selection::default();
        self.ready = false;
        self.ntt = false;
        self.actor_churn = false;
        self.partner_churn = false;
        self.fallback_granted = false;
        self.bond_status = None;
    }

    /// Checks the 3-per-interval transmit limit and consumes a slot.
    pub fn take_tx_slot(&mut self, now: u64, interval_ms: u64, limit: u8) -> bool {
        if now >= self.tx_window_start + interval_ms {
            self.tx_window_start = now;
            self.tx_in_window = 0;
        }
        if self.tx_in_window >= limit {
            return false;
        }
        self.tx_in_window += 1;
        true
    }
}

/// Port number from the trailing number of the interface name plus one
/// (`Ethernet0` is port 1), falling back to the arena slot plus one.
pub fn derive_port_number(name: &str, slot: usize) -> u16 {
    let prefix = name.trim_end_matches(|c: char| c.is_ascii_digit());
    name[prefix.len()..]
        .parse::<u32>()
        .ok()
        .and_then(|n| n.checked_add(1))
        .and_then(|n| u16::try_from(n).ok())
        .unwrap_or_else(|| u16::try_from(slot + 1).unwrap_or(u16::MAX))
}
