use crate::{font, Error, Result};
use rand::rngs::StdRng;
use std::fmt;
use std::ops::{Deref, DerefMut};

pub const MEMORY_SIZE: usize = 0x1000;
pub const PROGRAM_START: usize = 0x200;
pub const STACK_CAPACITY: usize = 0x400;
pub const REGISTER_COUNT: usize = 16;
pub const KEY_COUNT: usize = 16;
pub const WIDTH: usize = 64;
pub const HEIGHT: usize = 32;
/// VF, the implicit carry/borrow/collision output.
pub const FLAG: usize = 0xF;

macro_rules! wrapper {
    ($($name:ident => [$ty:ty; $size:expr]),*) => {
        $(
            #[derive(Debug)]
            pub struct $name([$ty; $size]);

            impl Default for $name {
                fn default() -> Self {
                    Self([0; $size])
                }
            }

            impl Deref for $name {
                type Target = [$ty; $size];

                fn deref(&self) -> &Self::Target {
                    &self.0
                }
            }

            impl DerefMut for $name {
                fn deref_mut(&mut self) -> &mut Self::Target {
                    &mut self.0
                }
            }
        )*
    };
}

wrapper! {
    Memory => [u8; MEMORY_SIZE],
    RegisterArray => [u8; REGISTER_COUNT],
    Frames => [u16; STACK_CAPACITY],
    Framebuffer => [u8; WIDTH * HEIGHT]
}

impl Memory {
    /// Fresh memory with the font glyphs in place.
    pub fn with_font() -> Self {
        let mut memory = Self::default();
        memory[font::MEMORY_RANGE].copy_from_slice(font::FONT);
        memory
    }

    pub fn slice(&self, address: u16, len: usize) -> Result<&[u8]> {
        let start = address as usize;
        self.0
            .get(start..start + len)
            .ok_or(Error::MemoryOutOfBounds { address, len })
    }

    pub fn slice_mut(&mut self, address: u16, len: usize) -> Result<&mut [u8]> {
        let start = address as usize;
        self.0
            .get_mut(start..start + len)
            .ok_or(Error::MemoryOutOfBounds { address, len })
    }

    pub fn program(&self) -> &[u8] {
        &self.0[PROGRAM_START..]
    }

    pub fn program_mut(&mut self) -> &mut [u8] {
        &mut self.0[PROGRAM_START..]
    }
}

#[derive(Debug)]
pub struct Registers {
    pub v: RegisterArray, // V0..=VF
    pub i: u16,           // Index register
    pub pc: u16,          // Program counter
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            v: RegisterArray::default(),
            i: 0,
            pc: PROGRAM_START as u16,
        }
    }
}

/// Return addresses, kept outside of addressable memory.
#[derive(Debug, Default)]
pub struct Stack {
    frames: Frames,
    sp: u16,
}

impl Stack {
    pub fn push(&mut self, address: u16) -> Result<()> {
        let slot = self
            .frames
            .get_mut(self.sp as usize)
            .ok_or(Error::StackOverflow {
                capacity: STACK_CAPACITY,
            })?;
        *slot = address;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16> {
        self.sp = self.sp.checked_sub(1).ok_or(Error::StackUnderflow)?;
        Ok(self.frames[self.sp as usize])
    }

    pub fn depth(&self) -> u16 {
        self.sp
    }
}

impl Framebuffer {
    pub fn clear(&mut self) {
        self.0 = [0; WIDTH * HEIGHT];
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.0[y * WIDTH + x]
    }

    /// XORs `on` into the cell, returning whether a lit cell went dark.
    pub fn toggle(&mut self, x: usize, y: usize, on: bool) -> bool {
        let cell = &mut self.0[y * WIDTH + x];
        let previous = *cell;
        *cell ^= on as u8;
        previous == 1 && *cell == 0
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.0.chunks_exact(WIDTH)
    }

    pub fn lit(&self) -> usize {
        self.0.iter().filter(|&&cell| cell != 0).count()
    }
}

impl fmt::Display for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.rows() {
            for &cell in row {
                write!(f, "{}", if cell == 0 { ' ' } else { '█' })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timers {
    pub delay: u8,
    pub sound: u8,
}

impl Timers {
    pub fn decay(&mut self) {
        self.delay = self.delay.saturating_sub(1);
        self.sound = self.sound.saturating_sub(1);
    }
}

/// The two most recent key vectors supplied by the host.
#[derive(Debug, Default)]
pub struct Keypad {
    current: [bool; KEY_COUNT],
    previous: [bool; KEY_COUNT],
}

impl Keypad {
    pub fn latch(&mut self, keys: [bool; KEY_COUNT]) {
        self.previous = self.current;
        self.current = keys;
    }

    pub fn is_pressed(&self, key: u8) -> bool {
        self.current[(key & 0xF) as usize]
    }

    /// Lowest key whose state changed between the two snapshots, and whether
    /// it is now pressed.
    pub fn first_transition(&self) -> Option<(u8, bool)> {
        self.current
            .iter()
            .zip(self.previous.iter())
            .position(|(now, before)| now != before)
            .map(|key| (key as u8, self.current[key]))
    }
}

/// All mutable interpreter state, handed to every operation.
#[derive(Debug)]
pub struct Machine {
    pub memory: Memory,
    pub stack: Stack,
    pub registers: Registers,
    pub display: Framebuffer,
    pub timers: Timers,
    pub keypad: Keypad,
    pub rng: StdRng,
}

impl Machine {
    pub fn new(rng: StdRng) -> Self {
        Self {
            memory: Memory::with_font(),
            stack: Stack::default(),
            registers: Registers::default(),
            display: Framebuffer::default(),
            timers: Timers::default(),
            keypad: Keypad::default(),
            rng,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_has_font_and_empty_program() {
        let memory = Memory::with_font();
        assert_eq!(&memory[..5], &[0xF0, 0x90, 0x90, 0x90, 0xF0]);
        assert!(memory.program().iter().all(|&b| b == 0));
        assert_eq!(memory.program().len(), MEMORY_SIZE - PROGRAM_START);
    }

    #[test]
    fn memory_bounds() {
        let mut memory = Memory::default();
        assert!(memory.slice(0xFFE, 2).is_ok());
        assert_eq!(
            memory.slice(0xFFF, 2),
            Err(Error::MemoryOutOfBounds {
                address: 0xFFF,
                len: 2
            })
        );
        assert!(memory.slice_mut(0x1000, 1).is_err());
    }

    #[test]
    fn stack_push_pop() {
        let mut stack = Stack::default();
        assert_eq!(stack.pop(), Err(Error::StackUnderflow));
        stack.push(0x202).unwrap();
        stack.push(0x304).unwrap();
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop(), Ok(0x304));
        assert_eq!(stack.pop(), Ok(0x202));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn stack_overflow() {
        let mut stack = Stack::default();
        for _ in 0..STACK_CAPACITY {
            stack.push(0x200).unwrap();
        }
        assert_eq!(
            stack.push(0x200),
            Err(Error::StackOverflow {
                capacity: STACK_CAPACITY
            })
        );
        assert_eq!(stack.depth() as usize, STACK_CAPACITY);
    }

    #[test]
    fn framebuffer_toggle_reports_collisions() {
        let mut display = Framebuffer::default();
        assert!(!display.toggle(3, 4, true));
        assert_eq!(display.pixel(3, 4), 1);
        assert!(!display.toggle(3, 4, false));
        assert!(display.toggle(3, 4, true));
        assert_eq!(display.pixel(3, 4), 0);
    }

    #[test]
    fn framebuffer_renders_text() {
        let mut display = Framebuffer::default();
        display.toggle(0, 0, true);
        let text = display.to_string();
        assert_eq!(text.lines().count(), HEIGHT);
        assert!(text.starts_with('█'));
    }

    #[test]
    fn timers_saturate() {
        let mut timers = Timers { delay: 1, sound: 0 };
        timers.decay();
        timers.decay();
        assert_eq!(timers, Timers::default());
    }

    #[test]
    fn keypad_transitions() {
        let mut keypad = Keypad::default();
        let mut keys = [false; KEY_COUNT];
        keypad.latch(keys);
        assert_eq!(keypad.first_transition(), None);

        keys[7] = true;
        keys[3] = true;
        keypad.latch(keys);
        assert_eq!(keypad.first_transition(), Some((3, true)));
        assert!(keypad.is_pressed(0x17));

        keys[3] = false;
        keypad.latch(keys);
        assert_eq!(keypad.first_transition(), Some((3, false)));
    }
}
