use log::{debug, error, info, trace};
use rand::{rngs::StdRng, SeedableRng};
use std::fmt;
use std::time::{Duration, Instant};

pub mod cli;
mod dispatch;
mod error;
mod font;
pub mod input;
mod machine;
mod quirks;

use dispatch::{DispatchTable, Entry, TABLE};
use machine::Machine;

pub use error::{Error, Result};
pub use machine::{
    Framebuffer, Memory, RegisterArray, Registers, Timers, FLAG, HEIGHT, KEY_COUNT, MEMORY_SIZE,
    PROGRAM_START, STACK_CAPACITY, WIDTH,
};
pub use quirks::Quirks;

/// One 60 Hz timer period.
pub const TICK_PERIOD: Duration = Duration::from_nanos(16_666_667);

#[derive(Debug)]
pub struct Interpreter {
    machine: Machine,              // Memory, stack, registers, display, timers, keys
    quirks: Quirks,                // Compatibility flags
    table: &'static DispatchTable, // Opcode dispatch
    state: Instruction,            // Current decode state
    previous: Instruction,         // Decode state of the step before
    current: Option<Entry>,        // Operation selected by the last decode
    waiting: bool,                 // Suspended on FX0A
    last_tick: Instant,            // Last timer decrement
}

impl Interpreter {
    pub fn new(quirks: Quirks) -> Self {
        Self::with_rng(quirks, StdRng::from_entropy())
    }

    /// An interpreter whose random source is seeded, for reproducible runs.
    pub fn with_seed(quirks: Quirks, seed: u64) -> Self {
        Self::with_rng(quirks, StdRng::seed_from_u64(seed))
    }

    fn with_rng(quirks: Quirks, rng: StdRng) -> Self {
        debug!("Created interpreter [quirks: {:?}]", quirks);
        Self {
            machine: Machine::new(rng),
            quirks,
            table: &TABLE,
            state: Instruction::default(),
            previous: Instruction::default(),
            current: None,
            waiting: false,
            last_tick: Instant::now(),
        }
    }

    /// Copies `program` to the start of the program region.
    pub fn load_program(&mut self, program: &[u8]) -> Result<()> {
        let region = self.machine.memory.program_mut();
        if program.len() > region.len() {
            return Err(Error::ProgramTooLarge {
                size: program.len(),
                max_size: region.len(),
            });
        }
        region[..program.len()].copy_from_slice(program);
        info!("Loaded program [size: {}]", program.len());
        Ok(())
    }

    /// The program region, for hosts that write ROM bytes themselves.
    pub fn program_mut(&mut self) -> &mut [u8] {
        self.machine.memory.program_mut()
    }

    /// Runs one fetch-decode-execute step with the given key state.
    pub fn step(&mut self, keys: [bool; KEY_COUNT]) -> Result<()> {
        self.step_at(keys, Instant::now())
    }

    /// Like [`step`](Self::step), with the timers judged against `now`.
    pub fn step_at(&mut self, keys: [bool; KEY_COUNT], now: Instant) -> Result<()> {
        self.machine.keypad.latch(keys);
        if !self.waiting {
            self.fetch()?;
            self.decode()?;
        }
        self.execute()?;
        self.update_timers(now);
        Ok(())
    }

    /// Restarts the timer period from `now`.
    pub fn reset_clock(&mut self, now: Instant) {
        self.last_tick = now;
    }

    fn fetch(&mut self) -> Result<()> {
        let pc = self.machine.registers.pc;
        let bytes = self.machine.memory.slice(pc, 2)?;
        let opcode = u16::from_be_bytes([bytes[0], bytes[1]]);
        self.previous = self.state;
        self.state = Instruction::from(opcode);
        self.machine.registers.pc = pc + 2;
        Ok(())
    }

    fn decode(&mut self) -> Result<()> {
        match self.table.lookup(&self.state) {
            Ok(entry) => {
                self.current = Some(entry);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Unimplemented instruction [{:?}] at {:#06X}",
                    self.state,
                    self.machine.registers.pc.wrapping_sub(2)
                );
                self.current = None;
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<()> {
        let entry = self.current.ok_or(Error::Unimplemented {
            opcode: self.state.opcode,
        })?;
        debug!("Processing instruction [{:?}] {}", self.state, entry.mnemonic);

        let outcome = (entry.op)(&mut self.machine, &self.state, self.quirks)?;
        if let Some(flag) = outcome.flag {
            self.machine.registers.v[FLAG] = flag;
        }
        if outcome.awaiting_key != self.waiting {
            debug!(
                "{} key wait [V{:X}: {}]",
                if outcome.awaiting_key { "Entered" } else { "Left" },
                self.state.x,
                self.machine.registers.v[self.state.x]
            );
        }
        self.waiting = outcome.awaiting_key;

        trace!(
            "pc: {:#06X} i: {:#06X} sp: {} v: {:02X?}",
            self.machine.registers.pc,
            self.machine.registers.i,
            self.machine.stack.depth(),
            &self.machine.registers.v[..]
        );
        Ok(())
    }

    fn update_timers(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_tick) >= TICK_PERIOD {
            self.machine.timers.decay();
            self.last_tick = now;
        }
    }

    pub fn display(&self) -> &Framebuffer {
        &self.machine.display
    }

    pub fn timers(&self) -> Timers {
        self.machine.timers
    }

    pub fn registers(&self) -> &Registers {
        &self.machine.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.machine.memory
    }

    pub fn stack_depth(&self) -> u16 {
        self.machine.stack.depth()
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    /// Whether fetching is suspended until a key is released.
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn instruction(&self) -> Instruction {
        self.state
    }

    pub fn previous_instruction(&self) -> Instruction {
        self.previous
    }
}

/// A fetched opcode and the fields every operation reads from it.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u16,
    pub x: usize,
    pub y: usize,
    pub n: u8,
    pub nn: u8,
    pub nnn: u16,
}

impl Instruction {
    pub const fn family(&self) -> u8 {
        bits::nibble(self.opcode, 3)
    }

    /// Mnemonic of the operation this opcode dispatches to, if any.
    pub fn mnemonic(&self) -> Option<&'static str> {
        TABLE.lookup(self).ok().map(|entry| entry.mnemonic)
    }
}

impl From<u16> for Instruction {
    fn from(opcode: u16) -> Self {
        Self {
            opcode,
            x: bits::nibble(opcode, 2) as usize,
            y: bits::nibble(opcode, 1) as usize,
            n: bits::nibble(opcode, 0),
            nn: (opcode & 0xFF) as u8,
            nnn: opcode & 0xFFF,
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.opcode)
    }
}

mod bits {
    pub const fn set(n: u8, bits: u8) -> bool {
        (bits & (1 << n)) != 0
    }

    /// The `n`th nibble of `value`, counting from the least significant.
    pub const fn nibble(value: u16, n: u8) -> u8 {
        ((value >> (n * 4)) & 0xF) as u8
    }
}
