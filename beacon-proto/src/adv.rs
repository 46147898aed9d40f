//! Legacy advertising envelope
//!
//! Wraps the BTHome service data in the AD structures a scanner expects:
//! flags, complete local name and 16-bit service data. Legacy advertising
//! PDUs carry at most 31 bytes of AD payload.

use crate::ServiceData;

// AD types (Bluetooth Core Supplement, part A)
pub const AD_FLAGS: u8 = 0x01;
pub const AD_NAME_SHORT: u8 = 0x08;
pub const AD_NAME_COMPLETE: u8 = 0x09;
pub const AD_SERVICE_DATA_16: u8 = 0x16;

/// LE General Discoverable, BR/EDR not supported
pub const FLAGS_GENERAL_NO_BREDR: u8 = 0x06;

pub const MAX_ADV_LEN: usize = 31;

/// Fewest name bytes worth advertising when the complete name is cut down
pub const MIN_SHORT_NAME: usize = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("advertising payload needs {needed} bytes, only {max} fit")]
    PayloadTooLong { needed: usize, max: usize },
    #[error("device name must not be empty")]
    EmptyName,
}

/// A complete advertising payload, ready to hand to the radio
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AdvertisementData {
    buf: [u8; MAX_ADV_LEN],
    len: usize,
    name: (usize, usize),
    name_type: u8,
    service_data: (usize, usize),
}

impl AdvertisementData {
    /// Builds the envelope with the complete local name, or with a
    /// shortened local name (AD type 0x08) cut at a character boundary
    /// when the complete one does not fit.
    pub fn new(name: &str, service_data: &ServiceData) -> Result<Self, EncodeError> {
        if name.is_empty() {
            return Err(EncodeError::EmptyName);
        }

        let fixed = 3 + 2 + (2 + service_data.len());
        let room = MAX_ADV_LEN.saturating_sub(fixed);
        let (name_type, name) = if name.len() <= room {
            (AD_NAME_COMPLETE, name)
        } else {
            let cut = (0..=room)
                .rev()
                .find(|&i| name.is_char_boundary(i))
                .unwrap_or(0);
            if cut < MIN_SHORT_NAME {
                return Err(EncodeError::PayloadTooLong {
                    needed: fixed + MIN_SHORT_NAME,
                    max: MAX_ADV_LEN,
                });
            }
            (AD_NAME_SHORT, &name[..cut])
        };

        let mut adv = Self {
            buf: [0u8; MAX_ADV_LEN],
            len: 0,
            name: (0, 0),
            name_type,
            service_data: (0, 0),
        };
        adv.push_structure(AD_FLAGS, &[FLAGS_GENERAL_NO_BREDR]);
        adv.name = adv.push_structure(name_type, name.as_bytes());
        adv.service_data = adv.push_structure(AD_SERVICE_DATA_16, service_data.as_bytes());
        Ok(adv)
    }

    /// Appends `len | type | data`, returns the range of `data`
    fn push_structure(&mut self, ad_type: u8, data: &[u8]) -> (usize, usize) {
        self.buf[self.len] = (data.len() + 1) as u8;
        self.buf[self.len + 1] = ad_type;
        let start = self.len + 2;
        self.buf[start..start + data.len()].copy_from_slice(data);
        self.len = start + data.len();
        (start, self.len)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.buf[self.name.0..self.name.1]).unwrap_or("")
    }

    /// The complete name did not fit and was cut down
    pub fn is_name_shortened(&self) -> bool {
        self.name_type == AD_NAME_SHORT
    }

    /// The BTHome service data, UUID included
    pub fn service_data(&self) -> &[u8] {
        &self.buf[self.service_data.0..self.service_data.1]
    }

    /// The BTHome service data without its UUID
    pub fn object_data(&self) -> &[u8] {
        &self.buf[self.service_data.0 + 2..self.service_data.1]
    }
}

impl std::fmt::Debug for AdvertisementData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvertisementData")
            .field("name", &self.name())
            .field("shortened", &self.is_name_shortened())
            .field("len", &self.len)
            .field("service_data", &self.service_data())
            .finish()
    }
}

/// Iterator over `(ad_type, data)` pairs of a raw advertising payload.
/// Stops at the first zero-length or truncated structure.
pub struct AdStructures<'a> {
    rest: &'a [u8],
}

impl<'a> AdStructures<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, tail) = self.rest.split_first()?;
        let len = len as usize;
        if len == 0 || tail.len() < len {
            self.rest = &[];
            return None;
        }
        let (structure, next) = tail.split_at(len);
        self.rest = next;
        Some((structure[0], &structure[1..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CounterSnapshot, Layout};

    fn service_data(boots: u32, layout: Layout) -> ServiceData {
        let snapshot = CounterSnapshot {
            boots,
            ..Default::default()
        };
        ServiceData::encode(&snapshot, layout)
    }

    #[test]
    fn envelope_layout() {
        let adv = AdvertisementData::new("Beacon", &service_data(2, Layout::Minimal)).unwrap();
        assert_eq!(
            adv.as_bytes(),
            &[
                0x02, 0x01, 0x06, // flags
                0x07, 0x09, b'B', b'e', b'a', b'c', b'o', b'n', // name
                0x09, 0x16, 0xd2, 0xfc, 0x44, 0x3e, 0x02, 0x00, 0x00, 0x00, // service data
            ]
        );
        assert_eq!(adv.name(), "Beacon");
        assert_eq!(adv.object_data(), &[0x44, 0x3e, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn structures_round_trip_through_iterator() {
        let data = service_data(9, Layout::Minimal);
        let adv = AdvertisementData::new("BTHome Beacon", &data).unwrap();

        let structures: Vec<(u8, &[u8])> = AdStructures::new(adv.as_bytes()).collect();
        assert_eq!(structures.len(), 3);
        assert_eq!(structures[0], (AD_FLAGS, &[FLAGS_GENERAL_NO_BREDR][..]));
        assert_eq!(structures[1], (AD_NAME_COMPLETE, &b"BTHome Beacon"[..]));
        assert_eq!(structures[2], (AD_SERVICE_DATA_16, data.as_bytes()));
    }

    #[test]
    fn long_name_is_shortened() {
        let data = service_data(1, Layout::Extended);
        // 3 + (2 + 11) + (2 + 13) = 31
        let adv = AdvertisementData::new("eleven-char", &data).unwrap();
        assert!(!adv.is_name_shortened());

        let adv = AdvertisementData::new("BTHome Beacon", &data).unwrap();
        assert!(adv.is_name_shortened());
        assert_eq!(adv.name(), "BTHome Beac");
        assert_eq!(adv.as_bytes().len(), MAX_ADV_LEN);

        let structures: Vec<(u8, &[u8])> = AdStructures::new(adv.as_bytes()).collect();
        assert_eq!(structures[1], (AD_NAME_SHORT, &b"BTHome Beac"[..]));
        assert_eq!(structures[2], (AD_SERVICE_DATA_16, data.as_bytes()));
    }

    #[test]
    fn shortened_name_keeps_whole_characters() {
        let data = service_data(1, Layout::Extended);
        // 11 bytes of room; the 'é' would straddle the cut
        let adv = AdvertisementData::new("Beacon-abcé!", &data).unwrap();
        assert_eq!(adv.name(), "Beacon-abc");
        assert!(adv.is_name_shortened());
    }

    #[test]
    fn empty_name_is_rejected() {
        let data = service_data(1, Layout::Minimal);
        assert_eq!(
            AdvertisementData::new("", &data).unwrap_err(),
            EncodeError::EmptyName
        );
    }

    #[test]
    fn truncated_structure_ends_iteration() {
        let raw = [0x02, 0x01, 0x06, 0x05, 0x09, b'a'];
        let structures: Vec<_> = AdStructures::new(&raw).collect();
        assert_eq!(structures, vec![(AD_FLAGS, &[0x06u8][..])]);
    }
}
