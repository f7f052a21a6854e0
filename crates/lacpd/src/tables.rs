//! Table name and field constants for lacpd.

/// CONFIG_DB LAG table name
pub const CFG_LAG_TABLE_NAME: &str = "PORTCHANNEL";

/// CONFIG_DB LAG member table name
pub const CFG_LAG_MEMBER_TABLE_NAME: &str = "PORTCHANNEL_MEMBER";

/// CONFIG_DB PORT table name
pub const CFG_PORT_TABLE_NAME: &str = "PORT";

/// CONFIG_DB system-wide LACP settings table name
pub const CFG_LACP_SYSTEM_TABLE_NAME: &str = "LACP_SYSTEM";

/// Key of the single entry in the LACP_SYSTEM table
pub const LACP_SYSTEM_GLOBAL_KEY: &str = "global";

/// STATE_DB LAG table name
pub const STATE_LAG_TABLE_NAME: &str = "LAG_TABLE";

/// STATE_DB LAG member table name
pub const STATE_LAG_MEMBER_TABLE_NAME: &str = "LAG_MEMBER_TABLE";

/// Name of the runtime event stream (frames and link changes)
pub const LACP_EVENT_STREAM_NAME: &str = "LACP_EVENTS";

/// Separator between LAG and interface in member keys
pub const KEY_SEPARATOR: char = '|';

/// Field names
pub mod fields {
    /// LAG mode (off/active/passive)
    pub const LACP_MODE: &str = "lacp_mode";

    /// LACP rate (slow/fast)
    pub const LACP_RATE: &str = "lacp_rate";

    /// Legacy boolean form of the LACP rate
    pub const FAST_RATE: &str = "fast_rate";

    /// Fallback enable flag
    pub const FALLBACK: &str = "fallback";

    /// Fallback mode (priority/all_active)
    pub const FALLBACK_MODE: &str = "fallback_mode";

    /// Fallback timeout in seconds
    pub const FALLBACK_TIMEOUT: &str = "fallback_timeout";

    /// Per-LAG system MAC override
    pub const LACP_SYSTEM_ID: &str = "lacp_system_id";

    /// Per-LAG system priority override
    pub const LACP_SYSTEM_PRIORITY: &str = "lacp_system_priority";

    /// Member aggregation key
    pub const LACP_AGGREGATION_KEY: &str = "lacp_aggregation_key";

    /// Member port id
    pub const LACP_PORT_ID: &str = "lacp_port_id";

    /// Member port priority
    pub const LACP_PORT_PRIORITY: &str = "lacp_port_priority";

    /// Port admin status
    pub const ADMIN_STATUS: &str = "admin_status";

    /// Port link status
    pub const OPER_STATUS: &str = "oper_status";

    /// Port speed in Mbps
    pub const SPEED: &str = "speed";

    /// System-wide MAC
    pub const SYSTEM_MAC: &str = "system_mac";

    /// System-wide LACP priority
    pub const SYSTEM_PRIORITY: &str = "system_priority";

    /// STATE_DB: actor state flags
    pub const ACTOR_STATE: &str = "actor_state";

    /// STATE_DB: partner state flags
    pub const PARTNER_STATE: &str = "partner_state";

    /// STATE_DB: actor system id
    pub const ACTOR_SYSTEM_ID: &str = "actor_system_id";

    /// STATE_DB: partner system id
    pub const PARTNER_SYSTEM_ID: &str = "partner_system_id";

    /// STATE_DB: actor port id
    pub const ACTOR_PORT_ID: &str = "actor_port_id";

    /// STATE_DB: partner port id
    pub const PARTNER_PORT_ID: &str = "partner_port_id";

    /// STATE_DB: actor key
    pub const ACTOR_KEY: &str = "actor_key";

    /// STATE_DB: partner key
    pub const PARTNER_KEY: &str = "partner_key";

    /// STATE_DB: bond status
    pub const BOND_STATUS: &str = "bond_status";
}
