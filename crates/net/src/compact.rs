//! Fixed-point float compaction and boolean packing for high-frequency
//! packet fields.

use std::fmt;

use bitflags::bitflags;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A float stored as a signed integer of `BYTES` bytes, scaled by
/// `10^DECIMALS` and truncated toward zero.
///
/// Values outside the representable range saturate. On the wire the integer
/// is written as exactly `BYTES` little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactFloat<const BYTES: usize, const DECIMALS: u32> {
    raw: i64,
}

impl<const BYTES: usize, const DECIMALS: u32> CompactFloat<BYTES, DECIMALS> {
    const VALID_WIDTH: () = assert!(BYTES >= 1 && BYTES <= 8, "CompactFloat width must be 1..=8 bytes");

    fn scale() -> f64 {
        10f64.powi(DECIMALS as i32)
    }

    fn max_raw() -> i64 {
        let () = Self::VALID_WIDTH;
        if BYTES == 8 {
            i64::MAX
        } else {
            (1i64 << (BYTES * 8 - 1)) - 1
        }
    }

    fn min_raw() -> i64 {
        -Self::max_raw() - 1
    }

    pub fn new(value: f32) -> Self {
        let scaled = (value as f64 * Self::scale()).trunc();
        let raw = if scaled.is_nan() {
            0
        } else if scaled >= Self::max_raw() as f64 {
            Self::max_raw()
        } else if scaled <= Self::min_raw() as f64 {
            Self::min_raw()
        } else {
            scaled as i64
        };
        Self { raw }
    }

    pub fn get(self) -> f32 {
        (self.raw as f64 / Self::scale()) as f32
    }

    /// Largest value this encoding can hold.
    pub fn max_value() -> f32 {
        (Self::max_raw() as f64 / Self::scale()) as f32
    }

    fn to_bytes(self) -> [u8; 8] {
        self.raw.to_le_bytes()
    }

    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut full = [0u8; 8];
        full[..bytes.len()].copy_from_slice(bytes);
        let negative = bytes.last().is_some_and(|b| b & 0x80 != 0);
        if negative {
            for b in full.iter_mut().skip(bytes.len()) {
                *b = 0xff;
            }
        }
        Self {
            raw: i64::from_le_bytes(full),
        }
    }
}

impl<const BYTES: usize, const DECIMALS: u32> From<f32> for CompactFloat<BYTES, DECIMALS> {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

impl<const BYTES: usize, const DECIMALS: u32> Serialize for CompactFloat<BYTES, DECIMALS> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = self.to_bytes();
        let mut tuple = serializer.serialize_tuple(BYTES)?;
        for byte in &bytes[..BYTES] {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

struct CompactFloatVisitor<const BYTES: usize, const DECIMALS: u32>;

impl<'de, const BYTES: usize, const DECIMALS: u32> Visitor<'de> for CompactFloatVisitor<BYTES, DECIMALS> {
    type Value = CompactFloat<BYTES, DECIMALS>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes of fixed-point float", BYTES)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut bytes = [0u8; 8];
        for (i, slot) in bytes.iter_mut().enumerate().take(BYTES) {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(CompactFloat::from_le_slice(&bytes[..BYTES]))
    }
}

impl<'de, const BYTES: usize, const DECIMALS: u32> Deserialize<'de> for CompactFloat<BYTES, DECIMALS> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_tuple(BYTES, CompactFloatVisitor::<BYTES, DECIMALS>)
    }
}

/// World position in pixels, 1/100 px precision.
pub type CompactPosition = CompactFloat<4, 2>;
/// Velocity in pixels per second, 1/10 precision.
pub type CompactVelocity = CompactFloat<2, 1>;
/// Short timers (animation phase, cooldowns), 1/100 s precision.
pub type CompactTimer = CompactFloat<2, 2>;

/// A 2D vector of compact floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompactVec2<const BYTES: usize, const DECIMALS: u32> {
    pub x: CompactFloat<BYTES, DECIMALS>,
    pub y: CompactFloat<BYTES, DECIMALS>,
}

impl<const BYTES: usize, const DECIMALS: u32> CompactVec2<BYTES, DECIMALS> {
    pub fn new(value: (f32, f32)) -> Self {
        Self {
            x: CompactFloat::new(value.0),
            y: CompactFloat::new(value.1),
        }
    }

    pub fn get(self) -> (f32, f32) {
        (self.x.get(), self.y.get())
    }
}

bitflags! {
    /// Character state booleans packed into one byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CharacterFlags: u8 {
        const MOVING = 1 << 0;
        const FACING_LEFT = 1 << 1;
        const IN_ROCKET = 1 << 2;
        const DEAD = 1 << 3;
        const USING_TOOL = 1 << 4;
    }
}

impl Serialize for CharacterFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for CharacterFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Unknown bits from newer peers are ignored.
        u8::deserialize(deserializer).map(CharacterFlags::from_bits_truncate)
    }
}
