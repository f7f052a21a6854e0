//! LACPDU and Marker PDU codec (IEEE 802.3ad clause 43).
//!
//! Frames are handled whole, Ethernet header included:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 6    | destination (01:80:c2:00:00:02) |
//! | 6      | 6    | source |
//! | 12     | 2    | EtherType 0x8809 |
//! | 14     | 1    | subtype (1 LACP, 2 Marker) |
//! | 15     | 1    | version |
//! | 16     | 108  | TLVs and reserved padding |
//!
//! Both PDU kinds encode to exactly [`FRAME_LEN`] bytes. Decoding accepts
//! trailing bytes (padding, FCS) and rejects anything shorter.

use std::fmt;
use std::io::{Cursor, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use serde::{Serialize, Serializer};
use sonic_types::{MacAddress, PortId, SystemId};
use thiserror::Error;

/// Slow Protocols EtherType.
pub const SLOW_PROTOCOLS_ETHERTYPE: u16 = 0x8809;

/// Slow Protocols subtype of LACP.
pub const SUBTYPE_LACP: u8 = 1;

/// Slow Protocols subtype of the Marker protocol.
pub const SUBTYPE_MARKER: u8 = 2;

/// Protocol version this codec emits.
pub const LACP_VERSION: u8 = 1;

/// Encoded frame length of both LACPDUs and Marker PDUs.
pub const FRAME_LEN: usize = 124;

const HEADER_LEN: usize = 14;

const TLV_ACTOR: u8 = 1;
const TLV_PARTNER: u8 = 2;
const TLV_COLLECTOR: u8 = 3;
const TLV_TERMINATOR: u8 = 0;
const TLV_MARKER_INFO: u8 = 1;
const TLV_MARKER_RESPONSE: u8 = 2;

const PORT_INFO_TLV_LEN: u8 = 20;
const COLLECTOR_TLV_LEN: u8 = 16;
const MARKER_TLV_LEN: u8 = 16;

/// Errors from [`decode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame truncated ({len} bytes)")]
    Truncated { len: usize },

    #[error("unexpected destination {0}")]
    BadDestination(MacAddress),

    #[error("unexpected EtherType {0:#06x}")]
    BadEtherType(u16),

    #[error("unknown slow protocols subtype {0}")]
    UnknownSubtype(u8),

    #[error("bad TLV: expected type {expected_type}, found type {found_type} length {len}")]
    BadTlv {
        expected_type: u8,
        found_type: u8,
        len: u8,
    },
}

/// The eight LACP state flags of one side of a link.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LacpState(u8);

impl LacpState {
    pub const ACTIVITY: u8 = 0x01;
    pub const TIMEOUT: u8 = 0x02;
    pub const AGGREGATION: u8 = 0x04;
    pub const SYNCHRONIZATION: u8 = 0x08;
    pub const COLLECTING: u8 = 0x10;
    pub const DISTRIBUTING: u8 = 0x20;
    pub const DEFAULTED: u8 = 0x40;
    pub const EXPIRED: u8 = 0x80;

    pub const fn from_bits(bits: u8) -> Self {
        LacpState(bits)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub const fn activity(&self) -> bool {
        self.contains(Self::ACTIVITY)
    }

    /// Short timeout requested (fast rate).
    pub const fn timeout(&self) -> bool {
        self.contains(Self::TIMEOUT)
    }

    pub const fn aggregation(&self) -> bool {
        self.contains(Self::AGGREGATION)
    }

    pub const fn sync(&self) -> bool {
        self.contains(Self::SYNCHRONIZATION)
    }

    pub const fn collecting(&self) -> bool {
        self.contains(Self::COLLECTING)
    }

    pub const fn distributing(&self) -> bool {
        self.contains(Self::DISTRIBUTING)
    }

    pub const fn defaulted(&self) -> bool {
        self.contains(Self::DEFAULTED)
    }

    pub const fn expired(&self) -> bool {
        self.contains(Self::EXPIRED)
    }
}

impl fmt::Display for LacpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |flag| u8::from(self.contains(flag));
        write!(
            f,
            "Activ:{},TmOut:{},Aggr:{},Sync:{},Col:{},Dist:{},Def:{},Exp:{}",
            bit(Self::ACTIVITY),
            bit(Self::TIMEOUT),
            bit(Self::AGGREGATION),
            bit(Self::SYNCHRONIZATION),
            bit(Self::COLLECTING),
            bit(Self::DISTRIBUTING),
            bit(Self::DEFAULTED),
            bit(Self::EXPIRED)
        )
    }
}

impl fmt::Debug for LacpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LacpState({:#04x}: {})", self.0, self)
    }
}

impl Serialize for LacpState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One side's view of a link: the content of an Actor or Partner TLV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PortInfo {
    pub system: SystemId,
    pub key: u16,
    pub port: PortId,
    pub state: LacpState,
}

impl PortInfo {
    /// True when both describe the same aggregation endpoint: system, key,
    /// port and the Aggregation flag all agree.
    pub fn same_endpoint(&self, other: &PortInfo) -> bool {
        self.system == other.system
            && self.key == other.key
            && self.port == other.port
            && self.state.aggregation() == other.state.aggregation()
    }
}

/// A decoded LACPDU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lacpdu {
    pub actor: PortInfo,
    pub partner: PortInfo,
    /// Collector max delay in tens of microseconds.
    pub collector_max_delay: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Information,
    Response,
}

/// A decoded Marker PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPdu {
    pub kind: MarkerKind,
    pub requester_port: u16,
    pub requester_system: MacAddress,
    pub transaction_id: u32,
}

impl MarkerPdu {
    /// Builds the response to a Marker Information PDU.
    pub fn response(&self) -> MarkerPdu {
        MarkerPdu {
            kind: MarkerKind::Response,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pdu {
    Lacp(Lacpdu),
    Marker(MarkerPdu),
}

/// Fixed-size frame buffer. Every write stays inside `FRAME_LEN`; reserved
/// regions are skipped and stay zero.
struct FrameWriter {
    buf: [u8; FRAME_LEN],
    pos: usize,
}

impl FrameWriter {
    fn new(src: MacAddress, subtype: u8) -> Self {
        let mut writer = FrameWriter {
            buf: [0; FRAME_LEN],
            pos: 0,
        };
        writer.mac(MacAddress::SLOW_PROTOCOLS);
        writer.mac(src);
        writer.u16(SLOW_PROTOCOLS_ETHERTYPE);
        writer.u8(subtype);
        writer.u8(LACP_VERSION);
        writer
    }

    fn u8(&mut self, value: u8) {
        self.buf[self.pos] = value;
        self.pos += 1;
    }

    fn u16(&mut self, value: u16) {
        BigEndian::write_u16(&mut self.buf[self.pos..self.pos + 2], value);
        self.pos += 2;
    }

    fn u32(&mut self, value: u32) {
        BigEndian::write_u32(&mut self.buf[self.pos..self.pos + 4], value);
        self.pos += 4;
    }

    fn mac(&mut self, mac: MacAddress) {
        self.buf[self.pos..self.pos + 6].copy_from_slice(mac.as_bytes());
        self.pos += 6;
    }

    fn skip(&mut self, len: usize) {
        self.pos += len;
    }

    fn tlv_header(&mut self, tlv_type: u8, len: u8) {
        self.u8(tlv_type);
        self.u8(len);
    }

    fn port_info(&mut self, tlv_type: u8, info: &PortInfo) {
        self.tlv_header(tlv_type, PORT_INFO_TLV_LEN);
        self.u16(info.system.priority);
        self.mac(info.system.mac);
        self.u16(info.key);
        self.u16(info.port.priority);
        self.u16(info.port.number);
        self.u8(info.state.bits());
        self.skip(3);
    }

    fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// Encodes a LACPDU into a full Ethernet frame sent from `src`.
pub fn encode(pdu: &Lacpdu, src: MacAddress) -> Vec<u8> {
    let mut w = FrameWriter::new(src, SUBTYPE_LACP);
    w.port_info(TLV_ACTOR, &pdu.actor);
    w.port_info(TLV_PARTNER, &pdu.partner);
    w.tlv_header(TLV_COLLECTOR, COLLECTOR_TLV_LEN);
    w.u16(pdu.collector_max_delay);
    w.skip(12);
    w.tlv_header(TLV_TERMINATOR, 0);
    w.finish()
}

/// Encodes a Marker PDU into a full Ethernet frame sent from `src`.
pub fn encode_marker(pdu: &MarkerPdu, src: MacAddress) -> Vec<u8> {
    let mut w = FrameWriter::new(src, SUBTYPE_MARKER);
    let tlv_type = match pdu.kind {
        MarkerKind::Information => TLV_MARKER_INFO,
        MarkerKind::Response => TLV_MARKER_RESPONSE,
    };
    w.tlv_header(tlv_type, MARKER_TLV_LEN);
    w.u16(pdu.requester_port);
    w.mac(pdu.requester_system);
    w.u32(pdu.transaction_id);
    w.skip(2);
    w.tlv_header(TLV_TERMINATOR, 0);
    w.finish()
}

struct FrameReader<'a> {
    cursor: Cursor<&'a [u8]>,
    len: usize,
}

impl<'a> FrameReader<'a> {
    fn new(frame: &'a [u8]) -> Self {
        FrameReader {
            cursor: Cursor::new(frame),
            len: frame.len(),
        }
    }

    fn truncated(&self) -> DecodeError {
        DecodeError::Truncated { len: self.len }
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        self.cursor.read_u8().map_err(|_| self.truncated())
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| self.truncated())
    }

    fn mac(&mut self) -> Result<MacAddress, DecodeError> {
        let mut octets = [0u8; 6];
        self.cursor
            .read_exact(&mut octets)
            .map_err(|_| self.truncated())?;
        Ok(MacAddress::new(octets))
    }

    fn skip(&mut self, len: u64) {
        self.cursor.set_position(self.cursor.position() + len);
    }

    /// Reads a TLV header and checks it against the expected type and length.
    fn expect_tlv(&mut self, expected_type: u8, expected_len: u8) -> Result<(), DecodeError> {
        let found_type = self.u8()?;
        let len = self.u8()?;
        if found_type != expected_type || len != expected_len {
            return Err(DecodeError::BadTlv {
                expected_type,
                found_type,
                len,
            });
        }
        Ok(())
    }

    fn port_info(&mut self, tlv_type: u8) -> Result<PortInfo, DecodeError> {
        self.expect_tlv(tlv_type, PORT_INFO_TLV_LEN)?;
        let priority = self.u16()?;
        let mac = self.mac()?;
        let key = self.u16()?;
        let port_priority = self.u16()?;
        let port_number = self.u16()?;
        let state = LacpState::from_bits(self.u8()?);
        self.skip(3);
        Ok(PortInfo {
            system: SystemId::new(priority, mac),
            key,
            port: PortId::new(port_priority, port_number),
            state,
        })
    }
}

/// Decodes a slow-protocols frame into a LACPDU or Marker PDU.
pub fn decode(frame: &[u8]) -> Result<Pdu, DecodeError> {
    if frame.len() < HEADER_LEN + 2 {
        return Err(DecodeError::Truncated { len: frame.len() });
    }

    let mut r = FrameReader::new(frame);
    let dst = r.mac()?;
    if dst != MacAddress::SLOW_PROTOCOLS {
        return Err(DecodeError::BadDestination(dst));
    }
    let _src = r.mac()?;
    let ethertype = r.u16()?;
    if ethertype != SLOW_PROTOCOLS_ETHERTYPE {
        return Err(DecodeError::BadEtherType(ethertype));
    }

    let subtype = r.u8()?;
    // Later versions are read as version 1.
    let _version = r.u8()?;

    match subtype {
        SUBTYPE_LACP => {
            if frame.len() < FRAME_LEN {
                return Err(r.truncated());
            }
            let actor = r.port_info(TLV_ACTOR)?;
            let partner = r.port_info(TLV_PARTNER)?;
            r.expect_tlv(TLV_COLLECTOR, COLLECTOR_TLV_LEN)?;
            let collector_max_delay = r.u16()?;
            r.skip(12);
            r.expect_tlv(TLV_TERMINATOR, 0)?;
            Ok(Pdu::Lacp(Lacpdu {
                actor,
                partner,
                collector_max_delay,
            }))
        }
        SUBTYPE_MARKER => {
            if frame.len() < FRAME_LEN {
                return Err(r.truncated());
            }
            let tlv_type = r.u8()?;
            let len = r.u8()?;
            let kind = match (tlv_type, len) {
                (TLV_MARKER_INFO, MARKER_TLV_LEN) => MarkerKind::Information,
                (TLV_MARKER_RESPONSE, MARKER_TLV_LEN) => MarkerKind::Response,
                _ => {
                    return Err(DecodeError::BadTlv {
                        expected_type: TLV_MARKER_INFO,
                        found_type: tlv_type,
                        len,
                    })
                }
            };
            let requester_port = r.u16()?;
            let requester_system = r.mac()?;
            let transaction_id = r.u32()?;
            r.skip(2);
            r.expect_tlv(TLV_TERMINATOR, 0)?;
            Ok(Pdu::Marker(MarkerPdu {
                kind,
                requester_port,
                requester_system,
                transaction_id,
            }))
        }
        other => Err(DecodeError::UnknownSubtype(other)),
    }
}
