//! Darwin wire format — the on-wire packet exchanged between a client (or an
//! upstream filter) and a filter daemon, and between a filter and the next
//! filter downstream.
//!
//! The header is #[repr(C, packed)] with zerocopy derives for an
//! allocation-free read of the fixed portion; certitudes and body are
//! read/written separately since their lengths are data-dependent.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Reserved certitude value appended whenever a per-entry parse or classify
/// error occurs. Outside the valid 0-100 range by construction.
pub const DARWIN_ERROR_RETURN: u32 = 101;

/// Minimum number of certitude slots a wire packet must reserve room for,
/// matching `DarwinPacket::getMinimalSize()` in the original implementation.
pub const DEFAULT_CERTITUDE_LIST_SIZE: u64 = 1;

/// Fixed portion of the wire packet. 48 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PacketHeader {
    pub packet_type: u32,
    pub response_kind: u32,
    pub filter_code: u64,
    pub body_size: u64,
    pub event_id: [u8; 16],
    pub certitude_count: u64,
}

assert_eq_size!(PacketHeader, [u8; 48]);

impl PacketHeader {
    pub const SIZE: usize = std::mem::size_of::<PacketHeader>();

    /// The minimum number of bytes that must be read to know the full
    /// length of a packet: the header plus one certitude slot.
    pub const fn minimal_size() -> usize {
        Self::SIZE + DEFAULT_CERTITUDE_LIST_SIZE as usize * 4
    }
}

/// Routing discriminant for a packet's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PacketType {
    Other = 0,
    Filter = 1,
    Alert = 2,
}

impl TryFrom<u32> for PacketType {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PacketType::Other),
            1 => Ok(PacketType::Filter),
            2 => Ok(PacketType::Alert),
            other => Err(WireError::UnknownType(other)),
        }
    }
}

impl From<PacketType> for u32 {
    fn from(t: PacketType) -> u32 {
        t as u32
    }
}

/// Where a packet's response should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResponseKind {
    /// Discard; no network output.
    None = 0,
    /// Write a response packet on the originating socket.
    Back = 1,
    /// Forward the packet to the downstream filter.
    Darwin = 2,
    /// Both of the above, downstream first.
    Both = 3,
}

impl TryFrom<u32> for ResponseKind {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseKind::None),
            1 => Ok(ResponseKind::Back),
            2 => Ok(ResponseKind::Darwin),
            3 => Ok(ResponseKind::Both),
            other => Err(WireError::UnknownResponseKind(other)),
        }
    }
}

impl From<ResponseKind> for u32 {
    fn from(r: ResponseKind) -> u32 {
        r as u32
    }
}

/// Configured upper bounds a decoder enforces on declared sizes, to avoid
/// allocating arbitrarily large buffers for a hostile or corrupt header.
#[derive(Debug, Clone, Copy)]
pub struct DecodeLimits {
    pub max_body_size: u64,
    pub max_certitude_count: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_body_size: 64 * 1024 * 1024,
            max_certitude_count: 1 << 20,
        }
    }
}

/// A fully decoded Darwin packet. Move-only: there is no `Clone` impl,
/// matching the original's deleted copy constructor — duplicating a packet
/// requires an explicit field-by-field copy at the call site.
#[derive(Debug, Default)]
pub struct Packet {
    pub packet_type: u32,
    pub response_kind: u32,
    pub filter_code: u64,
    pub event_id: [u8; 16],
    pub body: Vec<u8>,
    pub certitudes: Vec<u32>,
    pub logs: String,
}

impl Packet {
    pub fn new(packet_type: PacketType, response_kind: ResponseKind, filter_code: u64, event_id: [u8; 16]) -> Self {
        Self {
            packet_type: packet_type.into(),
            response_kind: response_kind.into(),
            filter_code,
            event_id,
            body: Vec::new(),
            certitudes: Vec::new(),
            logs: String::new(),
        }
    }

    pub fn add_certitude(&mut self, certitude: u32) {
        self.certitudes.push(certitude);
    }

    /// Resets every field to its zero/default value, mirroring
    /// `DarwinPacket::clear()`.
    pub fn clear(&mut self) {
        self.packet_type = PacketType::Other.into();
        self.response_kind = ResponseKind::None.into();
        self.filter_code = 0;
        self.event_id = [0u8; 16];
        self.body.clear();
        self.certitudes.clear();
        self.logs.clear();
    }

    /// Encode this packet into a contiguous byte buffer. Declared sizes in
    /// the emitted header are taken from the actual array lengths, never
    /// from any previously-declared value.
    pub fn encode(&self) -> Vec<u8> {
        let header = PacketHeader {
            packet_type: self.packet_type,
            response_kind: self.response_kind,
            filter_code: self.filter_code,
            body_size: self.body.len() as u64,
            event_id: self.event_id,
            certitude_count: self.certitudes.len() as u64,
        };

        let mut out = Vec::with_capacity(PacketHeader::SIZE + self.certitudes.len() * 4 + self.body.len());
        out.extend_from_slice(header.as_bytes());
        for c in &self.certitudes {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out.extend_from_slice(&self.body);
        out
    }

    /// Decode a packet from a byte slice that contains at least one full
    /// packet at its start. Returns the packet and the number of bytes
    /// consumed, so callers reading from a stream can retain any trailing
    /// bytes for the next packet.
    pub fn decode(buf: &[u8], limits: &DecodeLimits) -> Result<(Packet, usize), WireError> {
        if buf.len() < PacketHeader::SIZE {
            return Err(WireError::Malformed("buffer shorter than header"));
        }
        let header = PacketHeader::read_from_prefix(buf).ok_or(WireError::Malformed("header read failed"))?;

        let packet_type = header.packet_type;
        let response_kind = header.response_kind;
        let body_size = header.body_size;
        let certitude_count = header.certitude_count;
        let event_id = header.event_id;

        PacketType::try_from(packet_type)?;
        ResponseKind::try_from(response_kind)?;

        if body_size > limits.max_body_size {
            return Err(WireError::TooLarge("body_size exceeds configured limit"));
        }
        if certitude_count > limits.max_certitude_count {
            return Err(WireError::TooLarge("certitude_count exceeds configured limit"));
        }

        let certitudes_start = PacketHeader::SIZE;
        let certitudes_len = certitude_count as usize * 4;
        let body_start = certitudes_start + certitudes_len;
        let total = body_start + body_size as usize;

        if buf.len() < total {
            return Err(WireError::Malformed("buffer shorter than declared packet size"));
        }

        let mut certitudes = Vec::with_capacity(certitude_count as usize);
        for i in 0..certitude_count as usize {
            let off = certitudes_start + i * 4;
            certitudes.push(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        }

        let body = buf[body_start..total].to_vec();

        Ok((
            Packet {
                packet_type,
                response_kind,
                filter_code: header.filter_code,
                event_id,
                body,
                certitudes,
                logs: String::new(),
            },
            total,
        ))
    }

    /// Render the event id as a canonical 8-4-4-4-12 lowercase hex UUID
    /// string, matching `Evt_idToString()`.
    pub fn event_id_string(&self) -> String {
        event_id_to_string(&self.event_id)
    }
}

/// Render 16 raw bytes as a canonical UUID string: lowercase hex with
/// hyphens inserted before the bytes at index 4, 6, 8, and 10.
pub fn event_id_to_string(id: &[u8; 16]) -> String {
    let mut s = String::with_capacity(36);
    for (i, byte) in id.iter().enumerate() {
        if i == 4 || i == 6 || i == 8 || i == 10 {
            s.push('-');
        }
        s.push_str(&format!("{byte:02x}"));
    }
    s
}

/// Errors that can arise when decoding wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("declared size too large: {0}")]
    TooLarge(&'static str),

    #[error("unknown packet type: {0}")]
    UnknownType(u32),

    #[error("unknown response kind: {0}")]
    UnknownResponseKind(u32),
}
