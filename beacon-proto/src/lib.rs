//! BTHome v2 wire format - counter objects and service data framing
//!
//! The beacon broadcasts its counters as BTHome v2 service data. Layout of
//! the minimal payload:
//!
//! ```text
//! d2 fc | 44 | 3e | b0 b1 b2 b3
//! uuid  | dev| obj| boots (LE)
//! ```
//!
//! The parser side understands the handful of objects a receiver of this
//! beacon (or the stock BTHome sample firmware) will see.

pub mod adv;

pub use adv::{AdStructures, AdvertisementData, EncodeError};

/// BTHome service UUID (16-bit, Bluetooth SIG assigned)
pub const SERVICE_UUID: u16 = 0xfcd2;

// Device information byte
pub const DEVICE_INFO_ENCRYPTED: u8 = 0x01;
pub const DEVICE_INFO_TRIGGER_BASED: u8 = 0x04;
pub const DEVICE_INFO_VERSION_MASK: u8 = 0xe0;
pub const DEVICE_INFO_VERSION_2: u8 = 0x40;

/// No encryption, irregular (wake-triggered) updates, BTHome v2
pub const DEVICE_INFO: u8 = DEVICE_INFO_VERSION_2 | DEVICE_INFO_TRIGGER_BASED;

// Object ids
pub const OBJ_PACKET_ID: u8 = 0x00;
pub const OBJ_TEMPERATURE: u8 = 0x02;
pub const OBJ_HUMIDITY: u8 = 0x03;
pub const OBJ_COUNT_U8: u8 = 0x09;
pub const OBJ_COUNT_U16: u8 = 0x3d;
pub const OBJ_COUNT_U32: u8 = 0x3e;

/// Largest service data we ever emit: uuid + device info + two u32 counts
pub const MAX_SERVICE_DATA: usize = 2 + 1 + 2 * 5;

/// Offset of the boots counter inside the encoded service data
pub const BOOTS_OFFSET: usize = 4;

/// Point-in-time view of the retained counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub boots: u32,
    pub off_count: u32,
    /// Accumulated active time in milliseconds
    pub uptime_ms: u64,
}

/// Which counters go on the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Boot count only
    #[default]
    Minimal,
    /// Boot count followed by off count
    Extended,
}

/// Encoded BTHome service data, including the leading service UUID
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ServiceData {
    buf: [u8; MAX_SERVICE_DATA],
    len: usize,
}

impl ServiceData {
    pub fn encode(snapshot: &CounterSnapshot, layout: Layout) -> Self {
        let mut data = Self {
            buf: [0u8; MAX_SERVICE_DATA],
            len: 0,
        };

        data.put(&SERVICE_UUID.to_le_bytes());
        data.put(&[DEVICE_INFO]);

        data.put(&[OBJ_COUNT_U32]);
        data.put(&snapshot.boots.to_le_bytes());

        if layout == Layout::Extended {
            data.put(&[OBJ_COUNT_U32]);
            data.put(&snapshot.off_count.to_le_bytes());
        }

        data
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Full service data, UUID first
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Service data without the UUID, the form most BLE stacks take it in
    pub fn object_data(&self) -> &[u8] {
        &self.buf[2..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for ServiceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ServiceData(")?;
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

/// Encode a counter snapshot. Pure: equal snapshots give equal bytes.
pub fn encode(snapshot: &CounterSnapshot, layout: Layout) -> ServiceData {
    ServiceData::encode(snapshot, layout)
}

/// A decoded BTHome object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Object {
    PacketId(u8),
    /// Hundredths of a degree Celsius
    Temperature(i16),
    /// Hundredths of a percent
    Humidity(u16),
    Count(u32),
}

/// Decoded service data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub device_info: u8,
    pub objects: Vec<Object>,
}

impl Decoded {
    /// Count objects in broadcast order
    pub fn counts(&self) -> impl Iterator<Item = u32> + '_ {
        self.objects.iter().filter_map(|o| match o {
            Object::Count(c) => Some(*c),
            _ => None,
        })
    }

    /// First count object: the boot counter
    pub fn boots(&self) -> Option<u32> {
        self.counts().next()
    }

    /// Second count object: the off counter (extended layout only)
    pub fn off_count(&self) -> Option<u32> {
        self.counts().nth(1)
    }

    pub fn is_trigger_based(&self) -> bool {
        self.device_info & DEVICE_INFO_TRIGGER_BASED != 0
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("service data too short ({0} bytes)")]
    TooShort(usize),
    #[error("not BTHome service data (uuid 0x{0:04x})")]
    WrongUuid(u16),
    #[error("encrypted BTHome payloads are not supported")]
    Encrypted,
    #[error("unsupported BTHome version in device info 0x{0:02x}")]
    UnsupportedVersion(u8),
    #[error("unknown object id 0x{0:02x}")]
    UnknownObject(u8),
    #[error("object 0x{0:02x} truncated")]
    Truncated(u8),
}

/// Parse service data that still carries the 16-bit UUID
pub fn parse_service_data(data: &[u8]) -> Result<Decoded, DecodeError> {
    if data.len() < 3 {
        return Err(DecodeError::TooShort(data.len()));
    }
    let uuid = u16::from_le_bytes([data[0], data[1]]);
    if uuid != SERVICE_UUID {
        return Err(DecodeError::WrongUuid(uuid));
    }
    parse_object_data(&data[2..])
}

/// Parse service data with the UUID already stripped
pub fn parse_object_data(data: &[u8]) -> Result<Decoded, DecodeError> {
    let (&device_info, mut rest) = data
        .split_first()
        .ok_or(DecodeError::TooShort(data.len()))?;

    if device_info & DEVICE_INFO_ENCRYPTED != 0 {
        return Err(DecodeError::Encrypted);
    }
    if device_info & DEVICE_INFO_VERSION_MASK != DEVICE_INFO_VERSION_2 {
        return Err(DecodeError::UnsupportedVersion(device_info));
    }

    let mut objects = Vec::new();
    while let Some((&id, tail)) = rest.split_first() {
        let size = object_size(id).ok_or(DecodeError::UnknownObject(id))?;
        if tail.len() < size {
            return Err(DecodeError::Truncated(id));
        }
        let (value, next) = tail.split_at(size);
        objects.push(decode_object(id, value));
        rest = next;
    }

    Ok(Decoded {
        device_info,
        objects,
    })
}

fn object_size(id: u8) -> Option<usize> {
    match id {
        OBJ_PACKET_ID | OBJ_COUNT_U8 => Some(1),
        OBJ_TEMPERATURE | OBJ_HUMIDITY | OBJ_COUNT_U16 => Some(2),
        OBJ_COUNT_U32 => Some(4),
        _ => None,
    }
}

// `value` is exactly `object_size(id)` bytes long.
fn decode_object(id: u8, value: &[u8]) -> Object {
    match id {
        OBJ_PACKET_ID => Object::PacketId(value[0]),
        OBJ_TEMPERATURE => Object::Temperature(i16::from_le_bytes([value[0], value[1]])),
        OBJ_HUMIDITY => Object::Humidity(u16::from_le_bytes([value[0], value[1]])),
        OBJ_COUNT_U8 => Object::Count(value[0] as u32),
        OBJ_COUNT_U16 => Object::Count(u16::from_le_bytes([value[0], value[1]]) as u32),
        _ => Object::Count(u32::from_le_bytes([value[0], value[1], value[2], value[3]])),
    }
}
