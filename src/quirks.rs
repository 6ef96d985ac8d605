use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Compatibility toggles reproducing behaviour of historical interpreters.
///
/// Every "legacy" bit refers to the original COSMAC VIP CHIP-8 behaviour of
/// one instruction group. The presets pick the combination used by each
/// interpreter family.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Quirks(u8);

impl Quirks {
    pub const NONE: Self = Self(0);
    /// `8XY6`/`8XYE` copy VY into VX before shifting.
    pub const SHIFT: Self = Self(1 << 0);
    /// `FX55`/`FX65` leave I advanced past the last register.
    pub const STORE_LOAD: Self = Self(1 << 1);
    /// `BNNN` jumps relative to V0 instead of VX.
    pub const JUMP_OFFSET: Self = Self(1 << 2);
    /// `8XY1`/`8XY2`/`8XY3` reset VF.
    pub const LOGICAL: Self = Self(1 << 3);
    /// Drawing is synchronised with the display refresh. Accepted but has no
    /// effect on the engine.
    pub const DISPLAY_SYNC: Self = Self(1 << 4);
    /// Sprites are clipped at the screen edges instead of wrapping.
    pub const DRAW_CLIP: Self = Self(1 << 5);

    pub const ALL: Self = Self(0x3F);

    pub const CHIP8: Self = Self::ALL;
    pub const SCHIP: Self = Self::DRAW_CLIP;
    pub const XOCHIP: Self = Self(Self::STORE_LOAD.0 | Self::JUMP_OFFSET.0 | Self::SHIFT.0);

    const NAMES: [(Self, &'static str); 6] = [
        (Self::SHIFT, "SHIFT"),
        (Self::STORE_LOAD, "STORE_LOAD"),
        (Self::JUMP_OFFSET, "JUMP_OFFSET"),
        (Self::LOGICAL, "LOGICAL"),
        (Self::DISPLAY_SYNC, "DISPLAY_SYNC"),
        (Self::DRAW_CLIP, "DRAW_CLIP"),
    ];

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds a set from raw bits, dropping any unknown ones.
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for Quirks {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Quirks {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Debug for Quirks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (quirk, name) in Self::NAMES {
            if self.contains(quirk) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}
