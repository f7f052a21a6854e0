//! LacpMgr - LACP engine orchestrator
//!
//! Owns every interface and LAG, the system identity and the timer service.
//! Input arrives through per-table consumers (configuration) and a FIFO
//! event consumer (received frames, link changes). Each change ends with a
//! full evaluation of the affected LAG:
//!
//! 1. fallback controller
//! 2. selection over a snapshot of all members
//! 3. per member: mux, periodic transmission, churn detection
//! 4. pending transmissions (rate limited)
//! 5. bond status, then publication of every record that changed
//!
//! Outbound effects go through [`LacpCallbacks`].

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use sonic_orch_common::{
    Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation, Orch, QueueDiscipline,
    QueueEntry, TaskError,
};
use sonic_types::OperState;
use tracing::{debug, error, info, instrument, warn};

use crate::bond_status::{interface_bond_status, lag_bond_status};
use crate::churn::{self, ChurnSide};
use crate::error::{LacpError, LacpResult};
use crate::fallback::{self, FallbackMember, FallbackSettings};
use crate::interface::{Interface, MemberConfig, PortState};
use crate::lag::{parse_lag_key, Lag, LagConfig};
use crate::mux;
use crate::pdu::{self, Lacpdu, MarkerKind, Pdu, PortInfo};
use crate::periodic::{periodic_state, PeriodicInput};
use crate::rx::{self, RxState};
use crate::selection::{select, Candidate, PartnerId, SelectionInput};
use crate::state::{InterfaceDump, InterfaceStateRecord, LacpCounters, LagInterfaces, LagStateDump};
use crate::system::SystemContext;
use crate::tables::{
    CFG_LACP_SYSTEM_TABLE_NAME, CFG_LAG_MEMBER_TABLE_NAME, CFG_LAG_TABLE_NAME,
    CFG_PORT_TABLE_NAME, KEY_SEPARATOR, LACP_EVENT_STREAM_NAME, LACP_SYSTEM_GLOBAL_KEY,
};
use crate::timer::{TimerKey, TimerService};
use crate::types::{
    BondStatus, IfIndex, LagIndex, DEFAULT_MAX_LAG_MEMBERS, FAST_PERIODIC_MS,
    TX_LIMIT_PER_INTERVAL,
};

/// Outbound side of the engine: frame transmission and STATE_DB records.
pub trait LacpCallbacks: Send + Sync {
    fn transmit(&self, interface: &str, frame: &[u8]);
    fn write_interface_state(&self, interface: &str, record: &InterfaceStateRecord);
    fn remove_interface_state(&self, interface: &str);
    fn write_lag_state(&self, lag: &str, status: BondStatus);
    fn remove_lag_state(&self, lag: &str);
}

/// Runtime event for one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LacpEvent {
    /// A slow-protocols frame received on the interface.
    Frame { interface: String, frame: Vec<u8> },
    /// Link detector report.
    Link { interface: String, up: bool },
}

impl QueueEntry for LacpEvent {
    fn key(&self) -> &str {
        match self {
            LacpEvent::Frame { interface, .. } | LacpEvent::Link { interface, .. } => interface,
        }
    }
}

/// Configuration tables the manager consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigTable {
    System,
    Lag,
    Member,
    Port,
}

impl ConfigTable {
    fn from_name(table: &str) -> Option<Self> {
        match table {
            CFG_LACP_SYSTEM_TABLE_NAME => Some(ConfigTable::System),
            CFG_LAG_TABLE_NAME => Some(ConfigTable::Lag),
            CFG_LAG_MEMBER_TABLE_NAME => Some(ConfigTable::Member),
            CFG_PORT_TABLE_NAME => Some(ConfigTable::Port),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ConfigTable::System => CFG_LACP_SYSTEM_TABLE_NAME,
            ConfigTable::Lag => CFG_LAG_TABLE_NAME,
            ConfigTable::Member => CFG_LAG_MEMBER_TABLE_NAME,
            ConfigTable::Port => CFG_PORT_TABLE_NAME,
        }
    }
}

fn slot<T>(arena: &[Option<T>], index: usize) -> Option<&T> {
    arena.get(index).and_then(Option::as_ref)
}

fn slot_mut<T>(arena: &mut [Option<T>], index: usize) -> Option<&mut T> {
    arena.get_mut(index).and_then(Option::as_mut)
}

/// Stores `value` in the first free slot of an arena and returns its index.
fn insert_slot<T>(arena: &mut Vec<Option<T>>, value: impl FnOnce(usize) -> T) -> usize {
    match arena.iter().position(Option::is_none) {
        Some(index) => {
            arena[index] = Some(value(index));
            index
        }
        None => {
            let index = arena.len();
            arena.push(Some(value(index)));
            index
        }
    }
}

/// Splits `PortChannel1|Ethernet0` into LAG and interface names.
fn parse_member_key(key: &str) -> LacpResult<(&str, &str)> {
    match key.split_once(KEY_SEPARATOR) {
        Some((lag, interface)) if !lag.is_empty() && !interface.is_empty() => Ok((lag, interface)),
        _ => Err(LacpError::invalid_config(
            "key",
            format!("{}: expected <lag>{}<interface>", key, KEY_SEPARATOR),
        )),
    }
}

/// Maps a failed entry onto its task outcome. `later` holds the entries of
/// the same batch still to be applied: an interface moving between LAGs
/// waits when its removal from the old LAG is among them.
fn classify_error(err: &LacpError, later: &[KeyOpFieldsValues]) -> TaskError {
    if let LacpError::InterfaceInOtherLag { interface, lag } = err {
        let leaving = later.iter().any(|entry| {
            entry.op.is_del()
                && parse_member_key(&entry.key)
                    .is_ok_and(|(name, member)| name == lag && member == interface)
        });
        if leaving {
            return TaskError::need_retry(err.to_string());
        }
    }
    err.to_task_error()
}

/// LACP engine for every LAG of the system.
pub struct LacpMgr {
    system: SystemContext,
    max_lag_members: usize,

    interfaces: Vec<Option<Interface>>,
    interface_index: HashMap<String, IfIndex>,
    lags: Vec<Option<Lag>>,
    lag_index: HashMap<String, LagIndex>,

    timers: TimerService,
    /// Milliseconds since start, advanced by `on_timer`.
    now_ms: u64,

    callbacks: Option<Arc<dyn LacpCallbacks>>,

    system_consumer: Consumer,
    lag_consumer: Consumer,
    member_consumer: Consumer,
    port_consumer: Consumer,
    event_consumer: Consumer<LacpEvent>,
}

impl LacpMgr {
    pub fn new(system: SystemContext, max_lag_members: usize) -> Self {
        Self {
            system,
            max_lag_members,
            interfaces: Vec::new(),
            interface_index: HashMap::new(),
            lags: Vec::new(),
            lag_index: HashMap::new(),
            timers: TimerService::new(),
            now_ms: 0,
            callbacks: None,
            system_consumer: Consumer::new(ConsumerConfig::new(CFG_LACP_SYSTEM_TABLE_NAME)),
            lag_consumer: Consumer::new(ConsumerConfig::new(CFG_LAG_TABLE_NAME)),
            member_consumer: Consumer::new(ConsumerConfig::new(CFG_LAG_MEMBER_TABLE_NAME)),
            port_consumer: Consumer::new(ConsumerConfig::new(CFG_PORT_TABLE_NAME)),
            event_consumer: Consumer::new(
                ConsumerConfig::new(LACP_EVENT_STREAM_NAME).with_discipline(QueueDiscipline::Fifo),
            ),
        }
    }

    /// Sets the callbacks for transmitting frames and writing state.
    pub fn set_callbacks(&mut self, callbacks: Arc<dyn LacpCallbacks>) {
        self.callbacks = Some(callbacks);
    }

    pub fn system(&self) -> SystemContext {
        self.system
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    // ========== Input Queues ==========

    /// Queues configuration entries of `table` for the next `do_task`.
    pub fn add_config_entries(
        &mut self,
        table: &str,
        entries: impl IntoIterator<Item = KeyOpFieldsValues>,
    ) -> LacpResult<()> {
        let table = ConfigTable::from_name(table).ok_or_else(|| LacpError::UnknownTable {
            table: table.to_string(),
        })?;
        self.consumer_mut(table).add_to_sync(entries);
        Ok(())
    }

    /// Queues a received frame.
    pub fn enqueue_frame(&mut self, interface: impl Into<String>, frame: Vec<u8>) {
        self.event_consumer.push(LacpEvent::Frame {
            interface: interface.into(),
            frame,
        });
    }

    /// Queues a link state report.
    pub fn enqueue_link_event(&mut self, interface: impl Into<String>, up: bool) {
        self.event_consumer.push(LacpEvent::Link {
            interface: interface.into(),
            up,
        });
    }

    fn consumer_mut(&mut self, table: ConfigTable) -> &mut Consumer {
        match table {
            ConfigTable::System => &mut self.system_consumer,
            ConfigTable::Lag => &mut self.lag_consumer,
            ConfigTable::Member => &mut self.member_consumer,
            ConfigTable::Port => &mut self.port_consumer,
        }
    }

    fn apply_config_entry(&mut self, table: ConfigTable, entry: &KeyOpFieldsValues) -> LacpResult<()> {
        match (table, entry.op) {
            (ConfigTable::System, Operation::Set) => self.process_system_set(&entry.key, &entry.fvs),
            (ConfigTable::System, Operation::Del) => self.process_system_del(&entry.key),
            (ConfigTable::Lag, Operation::Set) => self.process_lag_set(&entry.key, &entry.fvs),
            (ConfigTable::Lag, Operation::Del) => self.process_lag_del(&entry.key),
            (ConfigTable::Member, Operation::Set) => self.process_member_set(&entry.key, &entry.fvs),
            (ConfigTable::Member, Operation::Del) => self.process_member_del(&entry.key),
            (ConfigTable::Port, Operation::Set) => self.process_port_set(&entry.key, &entry.fvs),
            (ConfigTable::Port, Operation::Del) => self.process_port_del(&entry.key),
        }
    }

    fn process_table(&mut self, table: ConfigTable) {
        let entries = self.consumer_mut(table).drain();
        let mut retry: Vec<KeyOpFieldsValues> = Vec::new();

        for (pos, entry) in entries.iter().enumerate() {
            // Keep per-key order behind an entry that is waiting.
            if retry.iter().any(|r| r.key == entry.key) {
                retry.push(entry.clone());
                continue;
            }
            let Err(e) = self.apply_config_entry(table, entry) else {
                continue;
            };
            let task_error = classify_error(&e, &entries[pos + 1..]);
            if task_error.to_status().is_retryable() {
                debug!(table = table.name(), key = %entry.key, reason = %e, "Retrying entry");
                retry.push(entry.clone());
            } else {
                error!(table = table.name(), key = %entry.key, "Failed to apply entry: {}", task_error);
            }
        }

        let consumer = self.consumer_mut(table);
        for entry in retry.into_iter().rev() {
            consumer.retry(entry);
        }
    }

    fn process_events(&mut self) {
        for event in self.event_consumer.drain() {
            let result = match &event {
                LacpEvent::Frame { interface, frame } => self.handle_frame(interface, frame),
                LacpEvent::Link { interface, up } => {
                    self.set_link_state(interface, *up);
                    Ok(())
                }
            };
            if let Err(e) = result {
                debug!(interface = %event.key(), "Dropping event: {}", e);
            }
        }
    }

    // ========== Configuration ==========

    /// Applies `LACP_SYSTEM|global`.
    #[instrument(skip(self, fvs))]
    pub fn process_system_set(&mut self, key: &str, fvs: &[FieldValue]) -> LacpResult<()> {
        if key != LACP_SYSTEM_GLOBAL_KEY {
            return Err(LacpError::invalid_config(
                "key",
                format!("{}: only '{}' is supported", key, LACP_SYSTEM_GLOBAL_KEY),
            ));
        }
        let next = self.system.with_fields(fvs)?;
        if next != self.system {
            info!(mac = %next.mac, priority = next.priority, "System identity changed");
            self.set_system(next);
        }
        Ok(())
    }

    /// Removing `LACP_SYSTEM|global` falls back to the default identity.
    #[instrument(skip(self))]
    pub fn process_system_del(&mut self, key: &str) -> LacpResult<()> {
        if key != LACP_SYSTEM_GLOBAL_KEY {
            return Err(LacpError::invalid_config("key", format!("{}: unknown key", key)));
        }
        let next = SystemContext::default();
        if next != self.system {
            self.set_system(next);
        }
        Ok(())
    }

    fn set_system(&mut self, system: SystemContext) {
        self.system = system;
        for iface in self.interfaces.iter_mut().flatten() {
            if iface.lag.is_some() {
                iface.ntt = true;
            }
        }
        self.evaluate_all();
    }

    /// Creates or updates a LAG from its PORTCHANNEL entry.
    #[instrument(skip(self, fvs))]
    pub fn process_lag_set(&mut self, name: &str, fvs: &[FieldValue]) -> LacpResult<()> {
        let key = parse_lag_key(name)?;

        let existing = self.lag_index.get(name).copied();
        let Some(lagx) = existing else {
            let config = LagConfig::default().with_fields(fvs)?;
            info!(
                lag = %name,
                key,
                mode = %config.mode,
                rate = %config.rate,
                "Created LAG"
            );
            let lagx = LagIndex(insert_slot(&mut self.lags, |_| Lag::new(name, key, config)));
            self.lag_index.insert(name.to_string(), lagx);
            self.evaluate_lag(lagx);
            return Ok(());
        };

        let Some(lag) = slot_mut(&mut self.lags, lagx.0) else {
            return Err(LacpError::lag_not_found(name));
        };
        let old = lag.config.clone();
        let next = old.with_fields(fvs)?;
        if next == old {
            return Ok(());
        }
        lag.config = next.clone();
        let members: Vec<IfIndex> = lag.members.iter().copied().collect();

        if old.mode.is_dynamic() != next.mode.is_dynamic() {
            info!(lag = %name, from = %old.mode, to = %next.mode, "LACP mode switched");
            for &ifx in &members {
                self.timers.cancel_interface(ifx);
                if let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) {
                    iface.reset_protocol();
                }
                self.sync_rx(ifx);
            }
        } else if next.mode.is_dynamic() {
            let identity_changed =
                old.system_mac != next.system_mac || old.system_priority != next.system_priority;
            let flags_changed = old.mode != next.mode || old.rate != next.rate;
            if identity_changed || flags_changed {
                debug!(lag = %name, "Actor information changed");
            }
            for &ifx in &members {
                let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
                    continue;
                };
                if !matches!(
                    iface.rx_state,
                    RxState::Expired | RxState::Defaulted | RxState::Current
                ) {
                    continue;
                }
                if flags_changed {
                    rx::apply_admin_flags(&mut iface.actor, next.mode, next.rate);
                    rx::rate_changed(ifx, iface, &mut self.timers, self.now_ms);
                }
                if identity_changed || flags_changed {
                    iface.ntt = true;
                }
            }
        }

        self.evaluate_lag(lagx);
        Ok(())
    }

    /// Deletes a LAG. Remaining members are detached first.
    #[instrument(skip(self))]
    pub fn process_lag_del(&mut self, name: &str) -> LacpResult<()> {
        let Some(&lagx) = self.lag_index.get(name) else {
            debug!(lag = %name, "LAG not present, nothing to delete");
            return Ok(());
        };
        let members: Vec<IfIndex> = slot(&self.lags, lagx.0)
            .map(|lag| lag.members.iter().copied().collect())
            .unwrap_or_default();
        for ifx in members {
            self.detach_member(lagx, ifx);
        }

        self.timers.cancel(TimerKey::Fallback(lagx));
        self.lag_index.remove(name);
        if let Some(entry) = self.lags.get_mut(lagx.0) {
            *entry = None;
        }
        if let Some(callbacks) = &self.callbacks {
            callbacks.remove_lag_state(name);
        }
        info!(lag = %name, "Deleted LAG");
        Ok(())
    }

    /// Adds an interface to a LAG or updates its member settings.
    #[instrument(skip(self, fvs))]
    pub fn process_member_set(&mut self, key: &str, fvs: &[FieldValue]) -> LacpResult<()> {
        let (lag_name, if_name) = parse_member_key(key)?;
        let lagx = *self
            .lag_index
            .get(lag_name)
            .ok_or_else(|| LacpError::lag_not_found(lag_name))?;

        let ifx = self.ensure_interface(if_name);
        let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
            return Err(LacpError::interface_not_found(if_name));
        };

        match iface.lag {
            Some(current) if current != lagx => {
                let other = slot(&self.lags, current.0)
                    .map(|lag| lag.name.clone())
                    .unwrap_or_default();
                return Err(LacpError::InterfaceInOtherLag {
                    interface: if_name.to_string(),
                    lag: other,
                });
            }
            Some(_) => {
                let member = iface.member.with_fields(fvs)?;
                if member == iface.member {
                    return Ok(());
                }
                debug!(interface = %if_name, "Member settings changed");
                iface.member = member;
                iface.ntt = true;
            }
            None => {
                let member = MemberConfig::default().with_fields(fvs)?;
                iface.member = member;
                iface.lag = Some(lagx);
                iface.reset_protocol();
                if let Some(lag) = slot_mut(&mut self.lags, lagx.0) {
                    lag.members.insert(ifx);
                }
                info!(interface = %if_name, lag = %lag_name, "Added LAG member");
                self.sync_rx(ifx);
            }
        }

        self.evaluate_lag(lagx);
        Ok(())
    }

    /// Removes an interface from its LAG.
    #[instrument(skip(self))]
    pub fn process_member_del(&mut self, key: &str) -> LacpResult<()> {
        let (lag_name, if_name) = parse_member_key(key)?;
        let (Some(&lagx), Some(&ifx)) = (self.lag_index.get(lag_name), self.interface_index.get(if_name))
        else {
            debug!(key = %key, "Member not present, nothing to remove");
            return Ok(());
        };
        if slot(&self.interfaces, ifx.0).map(|iface| iface.lag) != Some(Some(lagx)) {
            debug!(interface = %if_name, lag = %lag_name, "Not a member, nothing to remove");
            return Ok(());
        }

        self.detach_member(lagx, ifx);
        self.evaluate_lag(lagx);
        Ok(())
    }

    /// Takes an interface out of its LAG: stops its machines and withdraws
    /// its published state.
    fn detach_member(&mut self, lagx: LagIndex, ifx: IfIndex) {
        self.timers.cancel_interface(ifx);
        if let Some(lag) = slot_mut(&mut self.lags, lagx.0) {
            lag.members.remove(&ifx);
        }
        let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
            return;
        };
        iface.reset_protocol();
        iface.lag = None;
        iface.member = MemberConfig::default();
        if iface.published.take().is_some() {
            if let Some(callbacks) = &self.callbacks {
                callbacks.remove_interface_state(&iface.name);
            }
        }
        let lag_name = slot(&self.lags, lagx.0).map(|lag| lag.name.as_str()).unwrap_or_default();
        info!(interface = %iface.name, lag = %lag_name, "Removed LAG member");
    }

    /// Applies PORT table state (admin status, link, speed).
    #[instrument(skip(self, fvs))]
    pub fn process_port_set(&mut self, name: &str, fvs: &[FieldValue]) -> LacpResult<()> {
        let current = self
            .interface_index
            .get(name)
            .and_then(|ifx| slot(&self.interfaces, ifx.0))
            .map(|iface| iface.port)
            .unwrap_or_default();
        let next = current.with_fields(fvs)?;
        let ifx = self.ensure_interface(name);
        self.update_port(ifx, next);
        Ok(())
    }

    /// The port is gone. A member stays configured but disabled.
    #[instrument(skip(self))]
    pub fn process_port_del(&mut self, name: &str) -> LacpResult<()> {
        let Some(&ifx) = self.interface_index.get(name) else {
            return Ok(());
        };
        let is_member = slot(&self.interfaces, ifx.0).is_some_and(|iface| iface.lag.is_some());
        if is_member {
            self.update_port(ifx, PortState::default());
        } else {
            self.timers.cancel_interface(ifx);
            self.interface_index.remove(name);
            if let Some(entry) = self.interfaces.get_mut(ifx.0) {
                *entry = None;
            }
            debug!(interface = %name, "Forgot interface");
        }
        Ok(())
    }

    // ========== Runtime Events ==========

    /// Link detector report.
    pub fn set_link_state(&mut self, interface: &str, up: bool) {
        let ifx = self.ensure_interface(interface);
        let Some(iface) = slot(&self.interfaces, ifx.0) else {
            return;
        };
        let next = PortState {
            link: if up { OperState::Up } else { OperState::Down },
            ..iface.port
        };
        self.update_port(ifx, next);
    }

    /// Processes a received slow-protocols frame.
    pub fn handle_frame(&mut self, interface: &str, frame: &[u8]) -> LacpResult<()> {
        let ifx = *self
            .interface_index
            .get(interface)
            .ok_or_else(|| LacpError::interface_not_found(interface))?;
        let now = self.now_ms;
        let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
            return Err(LacpError::interface_not_found(interface));
        };

        let pdu = match pdu::decode(frame) {
            Ok(pdu) => pdu,
            Err(e) => {
                iface.counters.rx_errors += 1;
                warn!(interface = %interface, "Dropping malformed frame: {}", e);
                return Ok(());
            }
        };

        let Some(lagx) = iface.lag else {
            iface.counters.rx_dropped += 1;
            debug!(interface = %interface, "Frame on an interface outside any LAG");
            return Ok(());
        };

        match pdu {
            Pdu::Lacp(lacpdu) => {
                let running = iface.is_enabled()
                    && matches!(
                        iface.rx_state,
                        RxState::Expired | RxState::Defaulted | RxState::Current
                    );
                if !running {
                    iface.counters.rx_dropped += 1;
                    debug!(interface = %interface, rx = ?iface.rx_state, "LACPDU dropped");
                    return Ok(());
                }
                iface.counters.lacpdus_received += 1;

                let Some(actor) = self.actor_info(ifx) else {
                    return Ok(());
                };
                let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
                    return Ok(());
                };
                let outcome = rx::record_pdu(ifx, iface, &actor, &lacpdu, &mut self.timers, now);
                if outcome.ntt {
                    iface.ntt = true;
                }
                self.evaluate_lag(lagx);
            }
            Pdu::Marker(marker) => {
                iface.counters.markers_received += 1;
                if marker.kind == MarkerKind::Information && iface.is_enabled() {
                    let src = slot(&self.lags, lagx.0)
                        .map(|lag| self.system.resolve(&lag.config).mac)
                        .unwrap_or(self.system.mac);
                    let frame = pdu::encode_marker(&marker.response(), src);
                    if let Some(callbacks) = &self.callbacks {
                        callbacks.transmit(interface, &frame);
                        iface.counters.marker_responses_sent += 1;
                    }
                }
            }
        }
        Ok(())
    }

    // ========== Timers ==========

    fn handle_timer(&mut self, key: TimerKey, dirty: &mut BTreeSet<LagIndex>) {
        let now = self.now_ms;

        if let TimerKey::Fallback(lagx) = key {
            if let Some(lag) = slot_mut(&mut self.lags, lagx.0) {
                fallback::activate(&lag.name, &mut lag.fallback);
                dirty.insert(lagx);
            }
            return;
        }

        let Some(ifx) = key.interface() else {
            return;
        };
        let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
            return;
        };
        let Some(lagx) = iface.lag else {
            return;
        };

        match key {
            TimerKey::Periodic(_) => {
                if let Some(interval) = iface.periodic.interval_ms() {
                    iface.ntt = true;
                    self.timers.arm(TimerKey::Periodic(ifx), now + interval);
                }
            }
            TimerKey::CurrentWhile(_) => {
                let outcome = rx::current_while_expired(ifx, iface, &mut self.timers, now);
                if outcome.ntt {
                    iface.ntt = true;
                }
            }
            TimerKey::WaitWhile(_) => iface.ready = true,
            TimerKey::ActorChurn(_) => churn::expired(ChurnSide::Actor, iface),
            TimerKey::PartnerChurn(_) => churn::expired(ChurnSide::Partner, iface),
            TimerKey::Fallback(_) => {}
        }
        dirty.insert(lagx);
    }

    // ========== Evaluation ==========

    fn ensure_interface(&mut self, name: &str) -> IfIndex {
        if let Some(&ifx) = self.interface_index.get(name) {
            return ifx;
        }
        let ifx = IfIndex(insert_slot(&mut self.interfaces, |index| Interface::new(name, index)));
        self.interface_index.insert(name.to_string(), ifx);
        ifx
    }

    fn update_port(&mut self, ifx: IfIndex, next: PortState) {
        let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
            return;
        };
        if iface.port == next {
            return;
        }
        if iface.is_enabled() != (next.admin.is_up() && next.link.is_up()) {
            info!(
                interface = %iface.name,
                admin = ?next.admin,
                link = ?next.link,
                "Port state changed"
            );
        }
        iface.port = next;
        if let Some(lagx) = iface.lag {
            self.sync_rx(ifx);
            self.evaluate_lag(lagx);
        }
    }

    /// Brings the receive machine of a member in line with its port state
    /// and the LAG's mode.
    fn sync_rx(&mut self, ifx: IfIndex) {
        let now = self.now_ms;
        let Some(lagx) = slot(&self.interfaces, ifx.0).and_then(|iface| iface.lag) else {
            return;
        };
        let Some((mode, rate)) = slot(&self.lags, lagx.0).map(|lag| (lag.config.mode, lag.config.rate))
        else {
            return;
        };
        let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
            return;
        };

        let running = matches!(
            iface.rx_state,
            RxState::Expired | RxState::Defaulted | RxState::Current
        );
        if !iface.is_enabled() {
            if iface.rx_state != RxState::PortDisabled {
                rx::port_disabled(ifx, iface, &mut self.timers);
            }
        } else if !mode.is_dynamic() {
            if iface.rx_state != RxState::LacpDisabled {
                rx::lacp_disabled(ifx, iface, &mut self.timers);
            }
        } else if !running {
            rx::enable(ifx, iface, mode, rate, &mut self.timers, now);
        }
    }

    /// Our side of the link as carried in the Actor TLV.
    fn actor_info(&self, ifx: IfIndex) -> Option<PortInfo> {
        let iface = slot(&self.interfaces, ifx.0)?;
        let lag = slot(&self.lags, iface.lag?.0)?;
        Some(PortInfo {
            system: self.system.resolve(&lag.config),
            key: iface.key(lag.key),
            port: iface.port_id(),
            state: iface.actor,
        })
    }

    fn evaluate_all(&mut self) {
        let lags: Vec<LagIndex> = self.lag_index.values().copied().collect();
        for lagx in lags {
            self.evaluate_lag(lagx);
        }
    }

    /// Runs one complete evaluation step of a LAG and publishes the result.
    fn evaluate_lag(&mut self, lagx: LagIndex) {
        let now = self.now_ms;
        let Some(lag) = slot(&self.lags, lagx.0) else {
            return;
        };
        let name = lag.name.clone();
        let lag_key = lag.key;
        let config = lag.config.clone();
        let members: Vec<IfIndex> = lag.members.iter().copied().collect();
        let mut fallback_state = lag.fallback;
        let dynamic = config.mode.is_dynamic();
        let system_id = self.system.resolve(&config);

        // Fallback grants.
        let fallback_members: Vec<FallbackMember> = members
            .iter()
            .filter_map(|&ifx| slot(&self.interfaces, ifx.0).map(|iface| (ifx, iface)))
            .map(|(ifx, iface)| FallbackMember {
                ifx,
                port: iface.port_id(),
                enabled: iface.is_enabled(),
                defaulted: iface.rx_state == RxState::Defaulted,
            })
            .collect();
        let settings = FallbackSettings {
            enabled: dynamic && config.fallback,
            mode: config.fallback_mode,
            timeout_ms: config.fallback_timeout_ms(),
        };
        let granted = fallback::evaluate(
            lagx,
            &name,
            &mut fallback_state,
            &settings,
            &fallback_members,
            &mut self.timers,
            now,
        );
        for &ifx in &members {
            let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
                continue;
            };
            let grant = granted.contains(&ifx);
            if iface.fallback_granted != grant {
                iface.fallback_granted = grant;
                if iface.rx_state == RxState::Defaulted {
                    iface.partner = rx::default_partner(grant);
                }
                info!(interface = %iface.name, granted = grant, "Fallback grant changed");
            }
        }

        // Selection over a consistent snapshot of every member.
        let candidates: Vec<Candidate> = members
            .iter()
            .filter_map(|&ifx| slot(&self.interfaces, ifx.0).map(|iface| (ifx, iface)))
            .map(|(ifx, iface)| Candidate {
                ifx,
                enabled: iface.is_enabled(),
                key: iface.key(lag_key),
                port: iface.port_id(),
                partner: iface.partner_known.then_some(PartnerId {
                    system: iface.partner.system,
                    key: iface.partner.key,
                }),
                partner_port: iface.partner.port,
                speed: iface.port.speed,
            })
            .collect();
        let output = select(&SelectionInput {
            lag_key,
            dynamic,
            max_members: self.max_lag_members,
            candidates: &candidates,
        });

        // Per-member machines.
        let mut statuses = Vec::with_capacity(members.len());
        for &ifx in &members {
            let Some(iface) = slot_mut(&mut self.interfaces, ifx.0) else {
                continue;
            };
            let before = iface.actor;
            let selection = output.decision(ifx);
            if iface.selection != selection {
                debug!(interface = %iface.name, from = %iface.selection, to = %selection, "Selection changed");
                iface.selection = selection;
            }

            mux::run(ifx, iface, !dynamic, &mut self.timers, now);

            let lacp_running = dynamic
                && matches!(
                    iface.rx_state,
                    RxState::Expired | RxState::Defaulted | RxState::Current
                );
            let periodic = periodic_state(&PeriodicInput {
                port_enabled: iface.is_enabled(),
                lacp_enabled: lacp_running,
                excluded: iface.selection.is_conflict(),
                actor_active: iface.actor.activity(),
                partner_active: iface.partner.state.activity(),
                actor_short_timeout: iface.actor.timeout(),
                partner_short_timeout: iface.partner.state.timeout(),
            });
            if periodic != iface.periodic {
                debug!(interface = %iface.name, from = ?iface.periodic, to = ?periodic, "Periodic state changed");
                match periodic.interval_ms() {
                    Some(interval) => {
                        if !iface.periodic.is_running() {
                            iface.ntt = true;
                        }
                        self.timers.arm(TimerKey::Periodic(ifx), now + interval);
                    }
                    None => self.timers.cancel(TimerKey::Periodic(ifx)),
                }
                iface.periodic = periodic;
            }

            if dynamic {
                churn::update(ifx, iface, &mut self.timers, now);
            }
            if iface.actor != before && lacp_running {
                iface.ntt = true;
            }

            if iface.ntt {
                if iface.periodic.is_running() {
                    let actor = PortInfo {
                        system: system_id,
                        key: iface.key(lag_key),
                        port: iface.port_id(),
                        state: iface.actor,
                    };
                    transmit(
                        ifx,
                        iface,
                        &actor,
                        self.callbacks.as_deref(),
                        &mut self.timers,
                        now,
                    );
                } else {
                    iface.ntt = false;
                }
            }

            let status = interface_bond_status(
                true,
                iface.port.admin.is_up(),
                iface.port.link.is_up(),
                iface.selection,
                iface.mux_state,
            );
            iface.bond_status = status;
            statuses.extend(status);

            let actor = PortInfo {
                system: system_id,
                key: iface.key(lag_key),
                port: iface.port_id(),
                state: iface.actor,
            };
            let record = InterfaceStateRecord::new(&actor, &iface.partner, status);
            if iface.published.as_ref() != Some(&record) {
                if let Some(callbacks) = &self.callbacks {
                    callbacks.write_interface_state(&iface.name, &record);
                }
                iface.published = Some(record);
            }
        }

        let status = lag_bond_status(statuses);
        let Some(lag) = slot_mut(&mut self.lags, lagx.0) else {
            return;
        };
        lag.fallback = fallback_state;
        if lag.published != Some(status) {
            if lag.published.is_some() {
                info!(lag = %name, status = %status, "LAG bond status changed");
            }
            if let Some(callbacks) = &self.callbacks {
                callbacks.write_lag_state(&name, status);
            }
            lag.published = Some(status);
        }
    }

    // ========== Queries ==========

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        let ifx = self.interface_index.get(name)?;
        slot(&self.interfaces, ifx.0)
    }

    /// Last record published for an interface.
    pub fn interface_record(&self, name: &str) -> Option<&InterfaceStateRecord> {
        self.interface(name)?.published.as_ref()
    }

    fn lag(&self, name: &str) -> LacpResult<&Lag> {
        self.lag_index
            .get(name)
            .and_then(|lagx| slot(&self.lags, lagx.0))
            .ok_or_else(|| LacpError::lag_not_found(name))
    }

    fn lag_members<'a>(&'a self, lag: &'a Lag) -> impl Iterator<Item = (IfIndex, &'a Interface)> + 'a {
        lag.members
            .iter()
            .filter_map(|&ifx| slot(&self.interfaces, ifx.0).map(|iface| (ifx, iface)))
    }

    pub fn lag_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lag_index.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn lag_bond_status(&self, name: &str) -> Option<BondStatus> {
        let lag = self.lag(name).ok()?;
        Some(lag_bond_status(
            self.lag_members(lag).filter_map(|(_, iface)| iface.bond_status),
        ))
    }

    /// LACP counters summed over the members of a LAG.
    pub fn lag_counters(&self, name: &str) -> LacpResult<LacpCounters> {
        let lag = self.lag(name)?;
        let mut total = LacpCounters::default();
        for (_, iface) in self.lag_members(lag) {
            total += iface.counters;
        }
        Ok(total)
    }

    /// Configured, eligible and participating members of a LAG.
    pub fn lag_interfaces(&self, name: &str) -> LacpResult<LagInterfaces> {
        let lag = self.lag(name)?;
        let mut result = LagInterfaces::default();
        for (_, iface) in self.lag_members(lag) {
            result.configured.push(iface.name.clone());
            if iface.selection.is_eligible() {
                result.eligible.push(iface.name.clone());
            }
            if iface.mux_state.is_collecting_distributing() {
                result.participant.push(iface.name.clone());
            }
        }
        Ok(result)
    }

    /// Diagnostic snapshot of a LAG and its members.
    pub fn state_dump(&self, name: &str) -> LacpResult<LagStateDump> {
        let lag = self.lag(name)?;
        let system_id = self.system.resolve(&lag.config);
        let mut counters = LacpCounters::default();
        let mut members = Vec::new();
        for (ifx, iface) in self.lag_members(lag) {
            counters += iface.counters;
            let actor = self.actor_info(ifx).unwrap_or_default();
            members.push(InterfaceDump {
                name: iface.name.clone(),
                rx_state: iface.rx_state,
                mux_state: iface.mux_state,
                periodic: iface.periodic,
                selection: iface.selection,
                actor,
                partner: iface.partner,
                actor_churn: iface.actor_churn,
                partner_churn: iface.partner_churn,
                fallback_granted: iface.fallback_granted,
                bond_status: iface.bond_status,
                counters: iface.counters,
            });
        }
        Ok(LagStateDump {
            name: lag.name.clone(),
            key: lag.key,
            mode: lag.config.mode,
            rate: lag.config.rate,
            system_id,
            fallback_enabled: lag.config.fallback,
            fallback_mode: lag.config.fallback_mode,
            fallback_timeout_secs: lag.config.fallback_timeout_secs,
            fallback: lag.fallback,
            bond_status: lag_bond_status(members.iter().filter_map(|m| m.bond_status)),
            counters,
            members,
        })
    }
}

impl Default for LacpMgr {
    fn default() -> Self {
        Self::new(SystemContext::default(), DEFAULT_MAX_LAG_MEMBERS)
    }
}

/// Sends an LACPDU for a member if the transmit limit allows it. When it
/// does not, the periodic timer is pulled in to the start of the next window.
fn transmit(
    ifx: IfIndex,
    iface: &mut Interface,
    actor: &PortInfo,
    callbacks: Option<&dyn LacpCallbacks>,
    timers: &mut TimerService,
    now: u64,
) {
    if !iface.take_tx_slot(now, FAST_PERIODIC_MS, TX_LIMIT_PER_INTERVAL) {
        let retry_at = iface.tx_window_start + FAST_PERIODIC_MS;
        let key = TimerKey::Periodic(ifx);
        if timers.deadline(key).map_or(true, |deadline| deadline > retry_at) {
            timers.arm(key, retry_at);
        }
        debug!(interface = %iface.name, "Transmit limit reached, deferring LACPDU");
        return;
    }

    let partner = if iface.partner_known {
        iface.partner
    } else {
        rx::default_partner(false)
    };
    let pdu = Lacpdu {
        actor: *actor,
        partner,
        collector_max_delay: 0,
    };
    let frame = pdu::encode(&pdu, actor.system.mac);
    if let Some(callbacks) = callbacks {
        callbacks.transmit(&iface.name, &frame);
        iface.counters.lacpdus_sent += 1;
    }
    iface.ntt = false;
}

#[async_trait]
impl Orch for LacpMgr {
    fn name(&self) -> &str {
        "lacpmgr"
    }

    async fn do_task(&mut self) {
        for table in [
            ConfigTable::System,
            ConfigTable::Lag,
            ConfigTable::Member,
            ConfigTable::Port,
        ] {
            self.process_table(table);
        }
        self.process_events();
    }

    fn on_timer(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
        let mut dirty = BTreeSet::new();
        for key in self.timers.expired(self.now_ms) {
            self.handle_timer(key, &mut dirty);
        }
        for lagx in dirty {
            self.evaluate_lag(lagx);
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.system_consumer.has_pending()
            || self.lag_consumer.has_pending()
            || self.member_consumer.has_pending()
            || self.port_consumer.has_pending()
            || self.event_consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        let mut dump = self.system_consumer.dump();
        dump.extend(self.lag_consumer.dump());
        dump.extend(self.member_consumer.dump());
        dump.extend(self.port_consumer.dump());
        dump.extend(self.event_consumer.dump());
        dump
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{LacpState, MarkerPdu};
    use pretty_assertions::assert_eq;
    use sonic_types::{MacAddress, PortId, SystemId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(String, Vec<u8>)>>,
        interfaces: Mutex<HashMap<String, InterfaceStateRecord>>,
        lags: Mutex<HashMap<String, BondStatus>>,
    }

    impl LacpCallbacks for Recorder {
        fn transmit(&self, interface: &str, frame: &[u8]) {
            self.frames
                .lock()
                .unwrap()
                .push((interface.to_string(), frame.to_vec()));
        }

        fn write_interface_state(&self, interface: &str, record: &InterfaceStateRecord) {
            self.interfaces
                .lock()
                .unwrap()
                .insert(interface.to_string(), record.clone());
        }

        fn remove_interface_state(&self, interface: &str) {
            self.interfaces.lock().unwrap().remove(interface);
        }

        fn write_lag_state(&self, lag: &str, status: BondStatus) {
            self.lags.lock().unwrap().insert(lag.to_string(), status);
        }

        fn remove_lag_state(&self, lag: &str) {
            self.lags.lock().unwrap().remove(lag);
        }
    }

    impl Recorder {
        fn last_frame(&self, interface: &str) -> Option<Pdu> {
            let frames = self.frames.lock().unwrap();
            frames
                .iter()
                .rev()
                .find(|(name, _)| name == interface)
                .and_then(|(_, frame)| pdu::decode(frame).ok())
        }

        fn frame_count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }

        fn lag_status(&self, lag: &str) -> Option<BondStatus> {
            self.lags.lock().unwrap().get(lag).copied()
        }
    }

    fn fv(field: &str, value: &str) -> FieldValue {
        (field.to_string(), value.to_string())
    }

    fn setup() -> (LacpMgr, Arc<Recorder>) {
        let system = SystemContext::new("52:54:00:00:00:01".parse().unwrap(), 65534);
        let mut mgr = LacpMgr::new(system, 8);
        let recorder = Arc::new(Recorder::default());
        mgr.set_callbacks(recorder.clone());
        (mgr, recorder)
    }

    fn port_up(mgr: &mut LacpMgr, name: &str) {
        mgr.process_port_set(name, &[fv("admin_status", "up"), fv("oper_status", "up")])
            .unwrap();
    }

    fn add_member(mgr: &mut LacpMgr, lag: &str, interface: &str) {
        mgr.process_member_set(&format!("{}|{}", lag, interface), &[])
            .unwrap();
    }

    fn actor_state(mgr: &LacpMgr, interface: &str) -> String {
        mgr.interface(interface).unwrap().actor.to_string()
    }

    fn partner_frame(actor_port: u16, state: u8) -> Vec<u8> {
        let mac: MacAddress = "52:54:00:00:00:99".parse().unwrap();
        let lacpdu = Lacpdu {
            actor: PortInfo {
                system: SystemId::new(100, mac),
                key: 7,
                port: PortId::new(1, actor_port),
                state: LacpState::from_bits(state),
            },
            partner: PortInfo::default(),
            collector_max_delay: 0,
        };
        pdu::encode(&lacpdu, mac)
    }

    #[test]
    fn test_static_lag_comes_up() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[fv("lacp_mode", "off")])
            .unwrap();
        assert_eq!(recorder.lag_status("PortChannel1"), Some(BondStatus::Down));

        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");

        let iface = mgr.interface("Ethernet0").unwrap();
        assert_eq!(iface.rx_state, RxState::LacpDisabled);
        assert_eq!(iface.mux_state, mux::MuxState::CollectingDistributing);
        assert_eq!(iface.bond_status, Some(BondStatus::Up));
        assert_eq!(iface.actor, LacpState::default());
        assert_eq!(recorder.lag_status("PortChannel1"), Some(BondStatus::Up));
        assert_eq!(mgr.lag_bond_status("PortChannel1"), Some(BondStatus::Up));
        assert_eq!(recorder.frame_count(), 0);

        let interfaces = mgr.lag_interfaces("PortChannel1").unwrap();
        assert_eq!(interfaces.configured, vec!["Ethernet0".to_string()]);
        assert_eq!(interfaces.participant, vec!["Ethernet0".to_string()]);
    }

    #[test]
    fn test_dynamic_member_starts_expired_and_transmits() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");

        let iface = mgr.interface("Ethernet0").unwrap();
        assert_eq!(iface.rx_state, RxState::Expired);
        assert_eq!(iface.mux_state, mux::MuxState::Waiting);
        assert!(iface.periodic.is_running());

        let Some(Pdu::Lacp(sent)) = recorder.last_frame("Ethernet0") else {
            panic!("no LACPDU transmitted");
        };
        assert_eq!(sent.actor.key, 1);
        assert_eq!(sent.actor.port, PortId::new(1, 1));
        assert_eq!(sent.actor.system.to_string(), "65534,52:54:00:00:00:01");
        assert!(sent.actor.state.activity() && sent.actor.state.expired());
        assert_eq!(mgr.lag_counters("PortChannel1").unwrap().lacpdus_sent, 1);

        let record = mgr.interface_record("Ethernet0").unwrap();
        assert_eq!(record.bond_status, Some(BondStatus::Down));
    }

    #[test]
    fn test_defaulted_without_partner() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");

        mgr.on_timer(2_000);
        assert_eq!(mgr.interface("Ethernet0").unwrap().mux_state, mux::MuxState::Attached);

        mgr.on_timer(3_000);
        assert_eq!(mgr.interface("Ethernet0").unwrap().rx_state, RxState::Defaulted);
        assert_eq!(
            actor_state(&mgr, "Ethernet0"),
            "Activ:1,TmOut:0,Aggr:1,Sync:1,Col:0,Dist:0,Def:1,Exp:0"
        );
        assert_eq!(recorder.lag_status("PortChannel1"), Some(BondStatus::Down));
    }

    #[test]
    fn test_defaulted_forgets_partner_system() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");

        mgr.handle_frame("Ethernet0", &partner_frame(1, 0x3d)).unwrap();
        assert!(mgr.interface("Ethernet0").unwrap().partner_known);
        assert_eq!(
            recorder.interfaces.lock().unwrap()["Ethernet0"].partner_system_id,
            "100,52:54:00:00:00:99"
        );

        let mut now = 0;
        while mgr.interface("Ethernet0").unwrap().rx_state != RxState::Defaulted && now < 200_000 {
            now += 1_000;
            mgr.on_timer(now);
        }
        let iface = mgr.interface("Ethernet0").unwrap();
        assert_eq!(iface.rx_state, RxState::Defaulted);
        assert_eq!(iface.partner, rx::default_partner(false));
        assert_eq!(
            recorder.interfaces.lock().unwrap()["Ethernet0"].partner_system_id,
            "0,00:00:00:00:00:00"
        );
    }

    #[test]
    fn test_fallback_grants_one_member_until_partner_heard() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set(
            "PortChannel1",
            &[fv("fallback", "true"), fv("fallback_timeout", "0")],
        )
        .unwrap();
        for name in ["Ethernet0", "Ethernet4"] {
            add_member(&mut mgr, "PortChannel1", name);
            port_up(&mut mgr, name);
        }

        mgr.on_timer(2_000);
        mgr.on_timer(3_000);

        assert_eq!(
            actor_state(&mgr, "Ethernet0"),
            "Activ:1,TmOut:0,Aggr:1,Sync:1,Col:1,Dist:1,Def:1,Exp:0"
        );
        assert_eq!(
            actor_state(&mgr, "Ethernet4"),
            "Activ:1,TmOut:0,Aggr:1,Sync:1,Col:0,Dist:0,Def:1,Exp:0"
        );
        assert_eq!(recorder.lag_status("PortChannel1"), Some(BondStatus::Up));
        assert!(mgr.state_dump("PortChannel1").unwrap().fallback.active);

        // A real partner shows up on the other member.
        let frame = partner_frame(1, LacpState::ACTIVITY | LacpState::AGGREGATION);
        mgr.handle_frame("Ethernet4", &frame).unwrap();

        let granted = mgr.interface("Ethernet0").unwrap();
        assert!(!granted.fallback_granted);
        assert!(!granted.actor.collecting());
        assert!(!mgr.state_dump("PortChannel1").unwrap().fallback.active);
        assert_eq!(mgr.interface("Ethernet4").unwrap().rx_state, RxState::Current);
    }

    #[test]
    fn test_malformed_and_dropped_frames() {
        let (mut mgr, _recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");

        // Port still down: a valid LACPDU is dropped.
        let frame = partner_frame(1, LacpState::ACTIVITY);
        mgr.handle_frame("Ethernet0", &frame).unwrap();
        assert_eq!(mgr.interface("Ethernet0").unwrap().rx_state, RxState::PortDisabled);

        mgr.handle_frame("Ethernet0", &[0u8; 10]).unwrap();

        let counters = mgr.lag_counters("PortChannel1").unwrap();
        assert_eq!(counters.rx_dropped, 1);
        assert_eq!(counters.rx_errors, 1);
        assert_eq!(counters.lacpdus_received, 0);

        assert!(mgr.handle_frame("Ethernet8", &frame).is_err());
    }

    #[test]
    fn test_marker_information_is_answered() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");

        let marker = MarkerPdu {
            kind: MarkerKind::Information,
            requester_port: 3,
            requester_system: "52:54:00:00:00:99".parse().unwrap(),
            transaction_id: 0xdead_beef,
        };
        let frame = pdu::encode_marker(&marker, marker.requester_system);
        mgr.handle_frame("Ethernet0", &frame).unwrap();

        assert_eq!(recorder.last_frame("Ethernet0"), Some(Pdu::Marker(marker.response())));
        let counters = mgr.lag_counters("PortChannel1").unwrap();
        assert_eq!(counters.markers_received, 1);
        assert_eq!(counters.marker_responses_sent, 1);
    }

    #[test]
    fn test_configuration_errors() {
        let (mut mgr, _recorder) = setup();
        assert!(mgr.process_lag_set("Bond1", &[]).is_err());
        assert!(mgr
            .process_lag_set("PortChannel1", &[fv("fallback_timeout", "901")])
            .is_err());
        assert!(mgr.lag_names().is_empty());

        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        mgr.process_lag_set("PortChannel2", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");

        let err = mgr
            .process_member_set("PortChannel2|Ethernet0", &[])
            .unwrap_err();
        assert!(matches!(err, LacpError::InterfaceInOtherLag { .. }));

        assert!(mgr.process_member_set("PortChannel1", &[]).is_err());
        assert!(mgr.process_system_set("local", &[]).is_err());

        let err = mgr
            .add_config_entries("VLAN", vec![KeyOpFieldsValues::del("Vlan10")])
            .unwrap_err();
        assert!(matches!(err, LacpError::UnknownTable { .. }));
    }

    #[test]
    fn test_rejected_update_keeps_lag_config() {
        let (mut mgr, _recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[fv("lacp_rate", "fast")])
            .unwrap();
        assert!(mgr
            .process_lag_set("PortChannel1", &[fv("lacp_mode", "passive"), fv("fallback", "maybe")])
            .is_err());

        let dump = mgr.state_dump("PortChannel1").unwrap();
        assert_eq!(dump.mode, sonic_types::LacpMode::Active);
        assert_eq!(dump.rate, sonic_types::LacpRate::Fast);
    }

    #[test]
    fn test_mode_switch_to_static() {
        let (mut mgr, _recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");
        assert_eq!(mgr.interface("Ethernet0").unwrap().rx_state, RxState::Expired);

        mgr.process_lag_set("PortChannel1", &[fv("lacp_mode", "off")])
            .unwrap();
        let iface = mgr.interface("Ethernet0").unwrap();
        assert_eq!(iface.rx_state, RxState::LacpDisabled);
        assert_eq!(iface.mux_state, mux::MuxState::CollectingDistributing);
        assert_eq!(iface.actor, LacpState::default());
        assert!(!iface.periodic.is_running());
    }

    #[test]
    fn test_member_removal_clears_state() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[fv("lacp_mode", "off")])
            .unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");
        assert!(recorder.interfaces.lock().unwrap().contains_key("Ethernet0"));

        mgr.process_member_del("PortChannel1|Ethernet0").unwrap();
        assert!(!recorder.interfaces.lock().unwrap().contains_key("Ethernet0"));
        assert_eq!(recorder.lag_status("PortChannel1"), Some(BondStatus::Down));
        assert_eq!(mgr.interface("Ethernet0").unwrap().lag, None);

        mgr.process_lag_del("PortChannel1").unwrap();
        assert_eq!(recorder.lag_status("PortChannel1"), None);
        assert!(mgr.lag_counters("PortChannel1").is_err());
    }

    #[tokio::test]
    async fn test_member_waits_for_lag() {
        let (mut mgr, _recorder) = setup();
        mgr.add_config_entries(
            CFG_LAG_MEMBER_TABLE_NAME,
            vec![KeyOpFieldsValues::set("PortChannel1|Ethernet0", vec![])],
        )
        .unwrap();
        mgr.do_task().await;
        assert!(mgr.has_pending_tasks());
        assert_eq!(mgr.dump_pending_tasks().len(), 1);

        mgr.add_config_entries(
            CFG_LAG_TABLE_NAME,
            vec![KeyOpFieldsValues::set("PortChannel1", vec![fv("lacp_mode", "off")])],
        )
        .unwrap();
        mgr.do_task().await;
        assert!(!mgr.has_pending_tasks());
        assert!(mgr.interface("Ethernet0").unwrap().lag.is_some());
    }

    #[tokio::test]
    async fn test_lag_delete_detaches_members() {
        let (mut mgr, recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        add_member(&mut mgr, "PortChannel1", "Ethernet4");
        port_up(&mut mgr, "Ethernet0");
        port_up(&mut mgr, "Ethernet4");
        assert!(recorder.interfaces.lock().unwrap().contains_key("Ethernet0"));

        mgr.add_config_entries(CFG_LAG_TABLE_NAME, vec![KeyOpFieldsValues::del("PortChannel1")])
            .unwrap();
        mgr.do_task().await;

        assert!(mgr.lag_names().is_empty());
        assert!(!mgr.has_pending_tasks());
        assert_eq!(recorder.lag_status("PortChannel1"), None);
        assert!(recorder.interfaces.lock().unwrap().is_empty());
        for name in ["Ethernet0", "Ethernet4"] {
            let iface = mgr.interface(name).unwrap();
            assert_eq!(iface.lag, None);
            assert_eq!(iface.rx_state, RxState::Initialize);
        }
        assert_eq!(mgr.timers.pending_count(), 0);

        // Member removals arriving afterwards find nothing to do.
        mgr.add_config_entries(
            CFG_LAG_MEMBER_TABLE_NAME,
            vec![KeyOpFieldsValues::del("PortChannel1|Ethernet0")],
        )
        .unwrap();
        mgr.do_task().await;
        assert!(!mgr.has_pending_tasks());
    }

    #[tokio::test]
    async fn test_member_moves_between_lags_in_one_batch() {
        let (mut mgr, _recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        mgr.process_lag_set("PortChannel2", &[]).unwrap();
        add_member(&mut mgr, "PortChannel2", "Ethernet0");

        mgr.add_config_entries(
            CFG_LAG_MEMBER_TABLE_NAME,
            vec![
                KeyOpFieldsValues::del("PortChannel2|Ethernet0"),
                KeyOpFieldsValues::set("PortChannel1|Ethernet0", vec![]),
            ],
        )
        .unwrap();
        mgr.do_task().await;
        mgr.do_task().await;

        assert!(!mgr.has_pending_tasks());
        let lag1 = mgr.lag_index["PortChannel1"];
        assert_eq!(mgr.interface("Ethernet0").unwrap().lag, Some(lag1));
        assert_eq!(
            mgr.lag_interfaces("PortChannel1").unwrap().configured,
            vec!["Ethernet0".to_string()]
        );
        assert!(mgr.lag_interfaces("PortChannel2").unwrap().configured.is_empty());
    }

    #[test]
    fn test_deleted_slots_are_reused() {
        let (mut mgr, _recorder) = setup();
        for _ in 0..3 {
            mgr.process_lag_set("PortChannel1", &[]).unwrap();
            mgr.process_lag_del("PortChannel1").unwrap();
            port_up(&mut mgr, "Ethernet0");
            mgr.process_port_del("Ethernet0").unwrap();
        }
        assert_eq!(mgr.lags.len(), 1);
        assert_eq!(mgr.interfaces.len(), 1);

        mgr.process_lag_set("PortChannel1", &[]).unwrap();
        mgr.process_lag_set("PortChannel2", &[]).unwrap();
        assert_eq!(mgr.lags.len(), 2);
        mgr.process_lag_del("PortChannel1").unwrap();
        mgr.process_lag_set("PortChannel3", &[]).unwrap();
        assert_eq!(mgr.lags.len(), 2);
        assert_eq!(mgr.lag_index["PortChannel3"], LagIndex(0));
    }

    #[tokio::test]
    async fn test_link_events_in_order() {
        let (mut mgr, _recorder) = setup();
        mgr.process_lag_set("PortChannel1", &[fv("lacp_mode", "off")])
            .unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        mgr.process_port_set("Ethernet0", &[fv("admin_status", "up")])
            .unwrap();

        mgr.enqueue_link_event("Ethernet0", true);
        mgr.enqueue_link_event("Ethernet0", false);
        mgr.enqueue_link_event("Ethernet0", true);
        mgr.do_task().await;

        let iface = mgr.interface("Ethernet0").unwrap();
        assert!(iface.port.link.is_up());
        assert_eq!(iface.bond_status, Some(BondStatus::Up));
    }

    #[test]
    fn test_port_delete() {
        let (mut mgr, _recorder) = setup();
        port_up(&mut mgr, "Ethernet8");
        mgr.process_port_del("Ethernet8").unwrap();
        assert!(mgr.interface("Ethernet8").is_none());

        mgr.process_lag_set("PortChannel1", &[fv("lacp_mode", "off")])
            .unwrap();
        add_member(&mut mgr, "PortChannel1", "Ethernet0");
        port_up(&mut mgr, "Ethernet0");
        mgr.process_port_del("Ethernet0").unwrap();

        let iface = mgr.interface("Ethernet0").unwrap();
        assert_eq!(iface.bond_status, Some(BondStatus::Down));
        assert_eq!(mgr.lag_bond_status("PortChannel1"), Some(BondStatus::Down));
    }
}
