//! The retained block - the only state that outlives a power cycle
//!
//! One fixed-layout record, guarded by a magic and a CRC-32 over everything
//! before it. Memory in the retention domain is not cleared by the loader, so
//! on the very first power application the record holds whatever the SRAM
//! came up with. `validate()` is how a boot tells a complete, consistent
//! record from garbage or a write torn by a power cut.
//!
//! Image layout (little-endian, 24 bytes):
//!
//! ```text
//! 0..4   boots
//! 4..8   off_count
//! 8..16  uptime_ms
//! 16..20 magic
//! 20..24 crc32(bytes 0..20)
//! ```

use std::sync::atomic::{compiler_fence, Ordering};

/// "BTH1"
pub const RETAINED_MAGIC: u32 = 0x4254_4831;

pub const BLOCK_LEN: usize = 24;

const TAGGED_LEN: usize = 20;

/// Counters kept in retention memory.
///
/// `#[repr(C)]` with only integer fields: any bit pattern the hardware
/// leaves behind is a valid value, just not a valid tag.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetainedBlock {
    pub(crate) boots: u32,
    pub(crate) off_count: u32,
    pub(crate) uptime_ms: u64,
    magic: u32,
    crc: u32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RetentionError {
    #[error(
        "retained block magic 0x{found:08x}, expected 0x{expected:08x}",
        expected = RETAINED_MAGIC
    )]
    BadMagic { found: u32 },
    #[error("retained block crc 0x{stored:08x} does not match computed 0x{computed:08x}")]
    CrcMismatch { stored: u32, computed: u32 },
}

impl RetainedBlock {
    /// Initializer for the static. The firmware places it in a no-init
    /// section, so this value never reaches the hardware.
    pub const ZEROED: Self = Self {
        boots: 0,
        off_count: 0,
        uptime_ms: 0,
        magic: 0,
        crc: 0,
    };

    /// A block holding defaults with a valid tag
    pub fn new() -> Self {
        let mut block = Self::ZEROED;
        block.reset_to_defaults();
        block
    }

    pub fn from_bytes(bytes: &[u8; BLOCK_LEN]) -> Self {
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let mut uptime = [0u8; 8];
        uptime.copy_from_slice(&bytes[8..16]);

        Self {
            boots: u32_at(0),
            off_count: u32_at(4),
            uptime_ms: u64::from_le_bytes(uptime),
            magic: u32_at(16),
            crc: u32_at(20),
        }
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_LEN] {
        let mut bytes = [0u8; BLOCK_LEN];
        bytes[0..4].copy_from_slice(&self.boots.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.off_count.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.uptime_ms.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.magic.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.crc.to_le_bytes());
        bytes
    }

    fn compute_crc(&self) -> u32 {
        crc32fast::hash(&self.to_bytes()[..TAGGED_LEN])
    }

    /// Like `validate()`, but says what was wrong
    pub fn check(&self) -> Result<(), RetentionError> {
        if self.magic != RETAINED_MAGIC {
            return Err(RetentionError::BadMagic { found: self.magic });
        }
        let computed = self.compute_crc();
        if computed != self.crc {
            return Err(RetentionError::CrcMismatch {
                stored: self.crc,
                computed,
            });
        }
        Ok(())
    }

    /// True when the tag matches the current field values. Read-only.
    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    /// Zero all counters and write a fresh tag
    pub fn reset_to_defaults(&mut self) {
        self.boots = 0;
        self.off_count = 0;
        self.uptime_ms = 0;
        self.commit();
    }

    /// Write barrier: re-tag the current field values.
    ///
    /// Must run after every counter mutation and before anything that can
    /// lose power (sleeping, radio calls, the power-off primitive).
    pub fn commit(&mut self) {
        // Field stores must land before the tag that vouches for them.
        compiler_fence(Ordering::SeqCst);
        self.magic = RETAINED_MAGIC;
        self.crc = self.compute_crc();
        compiler_fence(Ordering::SeqCst);
    }
}

impl Default for RetainedBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed(boots: u32, off_count: u32, uptime_ms: u64) -> RetainedBlock {
        let mut block = RetainedBlock::new();
        block.boots = boots;
        block.off_count = off_count;
        block.uptime_ms = uptime_ms;
        block.commit();
        block
    }

    #[test]
    fn commit_then_validate() {
        let block = committed(3, 2, 12_345);
        assert!(block.validate());
        assert_eq!(block.check(), Ok(()));
    }

    #[test]
    fn zeroed_memory_is_not_trusted() {
        assert_eq!(
            RetainedBlock::ZEROED.check(),
            Err(RetentionError::BadMagic { found: 0 })
        );
        let ones = RetainedBlock::from_bytes(&[0xff; BLOCK_LEN]);
        assert!(!ones.validate());
    }

    #[test]
    fn every_single_byte_corruption_is_detected() {
        let block = committed(0x0102_0304, 0x0102_0303, 0xdead_beef_0042);
        let image = block.to_bytes();

        for index in 0..BLOCK_LEN {
            for flip in [0x01u8, 0x80, 0xff, 0x5a] {
                let mut bad = image;
                bad[index] ^= flip;
                let corrupted = RetainedBlock::from_bytes(&bad);
                assert!(!corrupted.validate(), "byte {index} ^ {flip:#04x} went unnoticed");
            }
        }
    }

    #[test]
    fn reset_restores_tagged_defaults() {
        let mut bad = committed(9, 9, 9).to_bytes();
        bad[1] ^= 0x10;
        let mut block = RetainedBlock::from_bytes(&bad);
        assert!(matches!(block.check(), Err(RetentionError::CrcMismatch { .. })));

        block.reset_to_defaults();
        assert!(block.validate());
        assert_eq!((block.boots, block.off_count, block.uptime_ms), (0, 0, 0));
        assert_eq!(block, RetainedBlock::new());
    }

    #[test]
    fn image_round_trip_keeps_tag() {
        let block = committed(7, 6, 1_000);
        let image = block.to_bytes();
        assert_eq!(&image[16..20], &RETAINED_MAGIC.to_le_bytes());
        assert_eq!(RetainedBlock::from_bytes(&image), block);
        assert_eq!(std::mem::size_of::<RetainedBlock>(), BLOCK_LEN);
    }
}
