//! Opcode dispatch: a two-level table from opcode to operation.
//!
//! The first level is keyed by the opcode's top nibble (its family). Each
//! family masks the opcode to find the concrete operation, since families
//! tell their instructions apart using different subsets of the low 12 bits.

use crate::machine::{Machine, HEIGHT, WIDTH};
use crate::{bits, font, Error, Instruction, Quirks, Result};
use lazy_static::lazy_static;
use log::trace;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;

pub type Operation = fn(&mut Machine, &Instruction, Quirks) -> Result<Outcome>;

/// Side effects an operation hands back to the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// Value for VF, written after the operation's own register writes.
    pub flag: Option<u8>,
    /// Whether the engine should suspend fetching until a key is released.
    pub awaiting_key: bool,
}

impl Outcome {
    const DONE: Self = Self {
        flag: None,
        awaiting_key: false,
    };

    fn flag(set: bool) -> Self {
        Self {
            flag: Some(set as u8),
            ..Self::DONE
        }
    }
}

#[derive(Clone, Copy)]
pub struct Entry {
    pub mnemonic: &'static str,
    pub op: Operation,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)
    }
}

#[derive(Debug)]
struct Family {
    mask: u16,
    entries: HashMap<u16, Entry>,
}

#[derive(Debug, Default)]
pub struct DispatchTable {
    families: [Option<Family>; 16],
}

lazy_static! {
    /// Shared by every interpreter; immutable once built.
    pub static ref TABLE: DispatchTable = DispatchTable::build();
}

impl DispatchTable {
    fn build() -> Self {
        let mut table = Self::default();

        table.add(0x0, 0x00E0, 0x00FF, "CLS", clear);
        table.add(0x0, 0x00EE, 0x00FF, "RET", ret);
        table.add(0x1, 0x1000, 0x0000, "JP addr", jump);
        table.add(0x2, 0x2000, 0x0000, "CALL addr", call);
        table.add(0x3, 0x3000, 0x0000, "SE Vx, byte", skip_eq_imm);
        table.add(0x4, 0x4000, 0x0000, "SNE Vx, byte", skip_ne_imm);
        table.add(0x5, 0x5000, 0x0000, "SE Vx, Vy", skip_eq_reg);
        table.add(0x6, 0x6000, 0x0000, "LD Vx, byte", load_imm);
        table.add(0x7, 0x7000, 0x0000, "ADD Vx, byte", add_imm);

        table.add(0x8, 0x0, 0x000F, "LD Vx, Vy", mov);
        table.add(0x8, 0x1, 0x000F, "OR Vx, Vy", or);
        table.add(0x8, 0x2, 0x000F, "AND Vx, Vy", and);
        table.add(0x8, 0x3, 0x000F, "XOR Vx, Vy", xor);
        table.add(0x8, 0x4, 0x000F, "ADD Vx, Vy", add_reg);
        table.add(0x8, 0x5, 0x000F, "SUB Vx, Vy", sub);
        table.add(0x8, 0x6, 0x000F, "SHR Vx {, Vy}", shr);
        table.add(0x8, 0x7, 0x000F, "SUBN Vx, Vy", subn);
        table.add(0x8, 0xE, 0x000F, "SHL Vx {, Vy}", shl);

        table.add(0x9, 0x0, 0x000F, "SNE Vx, Vy", skip_ne_reg);
        table.add(0xA, 0xA000, 0x0000, "LD I, addr", set_index);
        table.add(0xB, 0xB000, 0x0000, "JP V0, addr", jump_offset);
        table.add(0xC, 0xC000, 0x0000, "RND Vx, byte", random);
        table.add(0xD, 0xD000, 0x0000, "DRW Vx, Vy, nibble", draw);

        table.add(0xE, 0x9E, 0x00FF, "SKP Vx", skip_pressed);
        table.add(0xE, 0xA1, 0x00FF, "SKNP Vx", skip_not_pressed);

        table.add(0xF, 0x07, 0x00FF, "LD Vx, DT", read_delay);
        table.add(0xF, 0x0A, 0x00FF, "LD Vx, K", wait_key);
        table.add(0xF, 0x15, 0x00FF, "LD DT, Vx", set_delay);
        table.add(0xF, 0x18, 0x00FF, "LD ST, Vx", set_sound);
        table.add(0xF, 0x1E, 0x00FF, "ADD I, Vx", add_index);
        table.add(0xF, 0x29, 0x00FF, "LD F, Vx", font_char);
        table.add(0xF, 0x33, 0x00FF, "LD B, Vx", bcd);
        table.add(0xF, 0x55, 0x00FF, "LD [I], Vx", store);
        table.add(0xF, 0x65, 0x00FF, "LD Vx, [I]", load);

        table
    }

    /// Registers `op` under `key` within `family`. The key is compared against
    /// the opcode masked by the family's mask, so keys of unmasked families
    /// only have to agree on the masked bits.
    fn add(&mut self, family: u8, key: u16, mask: u16, mnemonic: &'static str, op: Operation) {
        let slot = self.families[family as usize].get_or_insert_with(|| Family {
            mask,
            entries: HashMap::new(),
        });
        assert_eq!(
            slot.mask, mask,
            "family {family:X} registered with two different masks"
        );
        let previous = slot.entries.insert(key & mask, Entry { mnemonic, op });
        assert!(
            previous.is_none(),
            "family {family:X} has two operations under {:#06X}",
            key & mask
        );
    }

    pub fn lookup(&self, inst: &Instruction) -> Result<Entry> {
        let unimplemented = || Error::Unimplemented {
            opcode: inst.opcode,
        };
        let family = self.families[inst.family() as usize]
            .as_ref()
            .ok_or_else(unimplemented)?;
        family
            .entries
            .get(&(inst.opcode & family.mask))
            .copied()
            .ok_or_else(unimplemented)
    }
}

fn skip_if(m: &mut Machine, condition: bool) -> Result<Outcome> {
    if condition {
        m.registers.pc = m.registers.pc.wrapping_add(2);
    }
    Ok(Outcome::DONE)
}

fn clear(m: &mut Machine, _: &Instruction, _: Quirks) -> Result<Outcome> {
    m.display.clear();
    Ok(Outcome::DONE)
}

fn ret(m: &mut Machine, _: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.pc = m.stack.pop()?;
    Ok(Outcome::DONE)
}

fn jump(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.pc = inst.nnn;
    Ok(Outcome::DONE)
}

fn call(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.stack.push(m.registers.pc)?;
    m.registers.pc = inst.nnn;
    Ok(Outcome::DONE)
}

fn skip_eq_imm(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let equal = m.registers.v[inst.x] == inst.nn;
    skip_if(m, equal)
}

fn skip_ne_imm(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let differ = m.registers.v[inst.x] != inst.nn;
    skip_if(m, differ)
}

fn skip_eq_reg(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let equal = m.registers.v[inst.x] == m.registers.v[inst.y];
    skip_if(m, equal)
}

fn skip_ne_reg(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let differ = m.registers.v[inst.x] != m.registers.v[inst.y];
    skip_if(m, differ)
}

fn load_imm(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.v[inst.x] = inst.nn;
    Ok(Outcome::DONE)
}

fn add_imm(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.v[inst.x] = m.registers.v[inst.x].wrapping_add(inst.nn);
    Ok(Outcome::DONE)
}

fn mov(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.v[inst.x] = m.registers.v[inst.y];
    Ok(Outcome::DONE)
}

fn logical(
    m: &mut Machine,
    inst: &Instruction,
    quirks: Quirks,
    f: fn(u8, u8) -> u8,
) -> Result<Outcome> {
    m.registers.v[inst.x] = f(m.registers.v[inst.x], m.registers.v[inst.y]);
    Ok(Outcome {
        flag: quirks.contains(Quirks::LOGICAL).then_some(0),
        ..Outcome::DONE
    })
}

fn or(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    logical(m, inst, quirks, |x, y| x | y)
}

fn and(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    logical(m, inst, quirks, |x, y| x & y)
}

fn xor(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    logical(m, inst, quirks, |x, y| x ^ y)
}

fn add_reg(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let sum = m.registers.v[inst.x] as u16 + m.registers.v[inst.y] as u16;
    m.registers.v[inst.x] = sum as u8;
    Ok(Outcome::flag(sum > 0xFF))
}

// VF is set only for a strictly positive difference; equal operands clear it.
fn subtract(
    m: &mut Machine,
    inst: &Instruction,
    minuend: u8,
    subtrahend: u8,
) -> Result<Outcome> {
    let difference = minuend as i16 - subtrahend as i16;
    m.registers.v[inst.x] = difference as u8;
    Ok(Outcome::flag(difference > 0))
}

fn sub(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let (x, y) = (m.registers.v[inst.x], m.registers.v[inst.y]);
    subtract(m, inst, x, y)
}

fn subn(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let (x, y) = (m.registers.v[inst.x], m.registers.v[inst.y]);
    subtract(m, inst, y, x)
}

fn shift_source(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> u8 {
    if quirks.contains(Quirks::SHIFT) {
        m.registers.v[inst.x] = m.registers.v[inst.y];
    }
    m.registers.v[inst.x]
}

fn shr(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    let value = shift_source(m, inst, quirks);
    m.registers.v[inst.x] = value >> 1;
    Ok(Outcome::flag(bits::set(0, value)))
}

fn shl(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    let value = shift_source(m, inst, quirks);
    m.registers.v[inst.x] = value << 1;
    Ok(Outcome::flag(bits::set(7, value)))
}

fn set_index(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.i = inst.nnn;
    Ok(Outcome::DONE)
}

fn jump_offset(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    let base = if quirks.contains(Quirks::JUMP_OFFSET) {
        0
    } else {
        inst.x
    };
    m.registers.pc = inst.nnn + m.registers.v[base] as u16;
    Ok(Outcome::DONE)
}

fn random(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.v[inst.x] = m.rng.gen::<u8>() & inst.nn;
    Ok(Outcome::DONE)
}

fn draw(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    let clip = quirks.contains(Quirks::DRAW_CLIP);
    let origin_x = m.registers.v[inst.x] as usize % WIDTH;
    let origin_y = m.registers.v[inst.y] as usize % HEIGHT;
    let sprite = m.memory.slice(m.registers.i, inst.n as usize)?;
    trace!("Drawing sprite [rows: {}] at ({origin_x}, {origin_y})", inst.n);

    let mut collision = false;
    for (row, &pattern) in sprite.iter().enumerate() {
        let y = origin_y + row;
        if clip && y >= HEIGHT {
            continue;
        }
        for col in 0..8 {
            let x = origin_x + col;
            if clip && x >= WIDTH {
                continue;
            }
            let lit = bits::set(7 - col as u8, pattern);
            collision |= m.display.toggle(x % WIDTH, y % HEIGHT, lit);
        }
    }
    Ok(Outcome::flag(collision))
}

fn skip_pressed(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let pressed = m.keypad.is_pressed(m.registers.v[inst.x]);
    skip_if(m, pressed)
}

fn skip_not_pressed(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let pressed = m.keypad.is_pressed(m.registers.v[inst.x]);
    skip_if(m, !pressed)
}

fn read_delay(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.registers.v[inst.x] = m.timers.delay;
    Ok(Outcome::DONE)
}

/// Records the first key that changed state; only a release ends the wait.
fn wait_key(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let mut released = false;
    if let Some((key, pressed)) = m.keypad.first_transition() {
        m.registers.v[inst.x] = key;
        released = !pressed;
    }
    Ok(Outcome {
        awaiting_key: !released,
        ..Outcome::DONE
    })
}

fn set_delay(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.timers.delay = m.registers.v[inst.x];
    Ok(Outcome::DONE)
}

fn set_sound(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    m.timers.sound = m.registers.v[inst.x];
    Ok(Outcome::DONE)
}

fn add_index(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let value = m.registers.v[inst.x] as u16;
    let overflow = m.registers.i as u32 + value as u32 > 0xFFF;
    m.registers.i = m.registers.i.wrapping_add(value);
    Ok(Outcome::flag(overflow))
}

// Accumulates onto I rather than assigning it; ROMs relying on either exist.
fn font_char(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let glyph = font::glyph_address(m.registers.v[inst.x]);
    m.registers.i = m.registers.i.wrapping_add(glyph);
    Ok(Outcome::DONE)
}

fn bcd(m: &mut Machine, inst: &Instruction, _: Quirks) -> Result<Outcome> {
    let value = m.registers.v[inst.x] as u16;
    let digits = m.memory.slice_mut(m.registers.i, 3)?;
    digits[0] = ((value % 1000) / 100) as u8;
    digits[1] = ((value % 100) / 10) as u8;
    digits[2] = (value % 10) as u8;
    Ok(Outcome::DONE)
}

fn advance_index(m: &mut Machine, inst: &Instruction, quirks: Quirks) {
    if quirks.contains(Quirks::STORE_LOAD) {
        m.registers.i = m.registers.i.wrapping_add(inst.x as u16 + 1);
    }
}

fn store(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    let count = inst.x + 1;
    m.memory
        .slice_mut(m.registers.i, count)?
        .copy_from_slice(&m.registers.v[..count]);
    advance_index(m, inst, quirks);
    Ok(Outcome::DONE)
}

fn load(m: &mut Machine, inst: &Instruction, quirks: Quirks) -> Result<Outcome> {
    let count = inst.x + 1;
    let source = m.memory.slice(m.registers.i, count)?;
    m.registers.v[..count].copy_from_slice(source);
    advance_index(m, inst, quirks);
    Ok(Outcome::DONE)
}
