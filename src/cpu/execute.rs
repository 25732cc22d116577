//! One handler per mnemonic family.
//!
//! Handlers fetch their own operands (advancing IP as a side effect of
//! `Cpu::fetch_byte`/`fetch_word`/`fetch_modrm`) and commit results directly;
//! the dispatcher never touches IP itself.

use super::decode::Prefixes;
use super::flags::{self, FlagsDelta};
use super::modrm::{
    self, get_reg16, get_reg8, get_rm16, get_rm8, get_segment, set_reg16, set_reg8, set_rm16,
    set_rm8, set_segment,
};
use super::Cpu;
use crate::bus::{linear, Bus};
use crate::error::StepStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Cmp,
}

fn alu8(op: ArithOp, a: u8, b: u8) -> (u8, FlagsDelta) {
    match op {
        ArithOp::Add => flags::add8(a, b),
        ArithOp::Sub | ArithOp::Cmp => flags::sub8(a, b),
    }
}

fn alu16(op: ArithOp, a: u16, b: u16) -> (u16, FlagsDelta) {
    match op {
        ArithOp::Add => flags::add16(a, b),
        ArithOp::Sub | ArithOp::Cmp => flags::sub16(a, b),
    }
}

fn segment_or_default(cpu: &Cpu, prefixes: Prefixes, default: u16) -> u16 {
    match prefixes.segment {
        Some(seg) => modrm::segment_value(&cpu.regs, seg),
        None => default,
    }
}

// ---- MOV ------------------------------------------------------------

pub fn mov(cpu: &mut Cpu, bus: &mut Bus, opcode: u8, prefixes: Prefixes) -> StepStatus {
    match opcode {
        0x88 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let v = get_reg8(&cpu.regs, m.reg);
            set_rm8(&mut cpu.regs, bus, &m, v);
            StepStatus::Success
        }
        0x89 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let v = get_reg16(&cpu.regs, m.reg);
            set_rm16(&mut cpu.regs, bus, &m, v);
            StepStatus::Success
        }
        0x8A => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let v = get_rm8(&cpu.regs, bus, &m);
            set_reg8(&mut cpu.regs, m.reg, v);
            StepStatus::Success
        }
        0x8B => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let v = get_rm16(&cpu.regs, bus, &m);
            set_reg16(&mut cpu.regs, m.reg, v);
            StepStatus::Success
        }
        0x8C => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            match get_segment(&cpu.regs, m.reg) {
                Ok(v) => {
                    set_rm16(&mut cpu.regs, bus, &m, v);
                    StepStatus::Success
                }
                Err(e) => e,
            }
        }
        0x8E => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            if m.reg == 1 {
                return StepStatus::InvalidOperation; // MOV to CS is rejected
            }
            let v = get_rm16(&cpu.regs, bus, &m);
            match set_segment(&mut cpu.regs, m.reg, v) {
                Ok(()) => StepStatus::Success,
                Err(e) => e,
            }
        }
        0xA0 => {
            let off = cpu.fetch_word(bus);
            let seg = segment_or_default(cpu, prefixes, cpu.regs.ds);
            let v = bus.read_byte(linear(seg, off));
            cpu.regs.set_al(v);
            StepStatus::Success
        }
        0xA1 => {
            let off = cpu.fetch_word(bus);
            let seg = segment_or_default(cpu, prefixes, cpu.regs.ds);
            cpu.regs.ax = bus.read_word(linear(seg, off));
            StepStatus::Success
        }
        0xA2 => {
            let off = cpu.fetch_word(bus);
            let seg = segment_or_default(cpu, prefixes, cpu.regs.ds);
            bus.write_byte(linear(seg, off), cpu.regs.al());
            StepStatus::Success
        }
        0xA3 => {
            let off = cpu.fetch_word(bus);
            let seg = segment_or_default(cpu, prefixes, cpu.regs.ds);
            bus.write_word(linear(seg, off), cpu.regs.ax);
            StepStatus::Success
        }
        0xB0..=0xB7 => {
            let imm = cpu.fetch_byte(bus);
            set_reg8(&mut cpu.regs, opcode - 0xB0, imm);
            StepStatus::Success
        }
        0xB8..=0xBF => {
            let imm = cpu.fetch_word(bus);
            set_reg16(&mut cpu.regs, opcode - 0xB8, imm);
            StepStatus::Success
        }
        0xC6 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            if m.reg != 0 {
                return StepStatus::InvalidOperation;
            }
            let imm = cpu.fetch_byte(bus);
            set_rm8(&mut cpu.regs, bus, &m, imm);
            StepStatus::Success
        }
        0xC7 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            if m.reg != 0 {
                return StepStatus::InvalidOperation;
            }
            let imm = cpu.fetch_word(bus);
            set_rm16(&mut cpu.regs, bus, &m, imm);
            StepStatus::Success
        }
        _ => StepStatus::UnknownError,
    }
}

// ---- XCHG -------------------------------------------------------------

pub fn xchg(cpu: &mut Cpu, bus: &mut Bus, opcode: u8, prefixes: Prefixes) -> StepStatus {
    match opcode {
        0x86 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let a = get_reg8(&cpu.regs, m.reg);
            let b = get_rm8(&cpu.regs, bus, &m);
            set_reg8(&mut cpu.regs, m.reg, b);
            set_rm8(&mut cpu.regs, bus, &m, a);
            StepStatus::Success
        }
        0x87 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let a = get_reg16(&cpu.regs, m.reg);
            let b = get_rm16(&cpu.regs, bus, &m);
            set_reg16(&mut cpu.regs, m.reg, b);
            set_rm16(&mut cpu.regs, bus, &m, a);
            StepStatus::Success
        }
        0x90..=0x97 => {
            let idx = opcode - 0x90;
            let a = cpu.regs.ax;
            let b = get_reg16(&cpu.regs, idx);
            cpu.regs.ax = b;
            set_reg16(&mut cpu.regs, idx, a);
            StepStatus::Success
        }
        _ => StepStatus::UnknownError,
    }
}

// ---- ADD / SUB / CMP ---------------------------------------------------

/// Shared body for the six-opcode direct-operand families ADD/SUB/CMP each
/// repeat: r/m8,r8 ; r/m16,r16 ; r8,r/m8 ; r16,r/m16 ; AL,imm8 ; AX,imm16.
pub fn direct_arith(
    cpu: &mut Cpu,
    bus: &mut Bus,
    opcode: u8,
    prefixes: Prefixes,
    base: u8,
    op: ArithOp,
) -> StepStatus {
    let is_cmp = op == ArithOp::Cmp;
    match opcode - base {
        0 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let a = get_rm8(&cpu.regs, bus, &m);
            let b = get_reg8(&cpu.regs, m.reg);
            let (result, delta) = alu8(op, a, b);
            delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
            if !is_cmp {
                set_rm8(&mut cpu.regs, bus, &m, result);
            }
        }
        1 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let a = get_rm16(&cpu.regs, bus, &m);
            let b = get_reg16(&cpu.regs, m.reg);
            let (result, delta) = alu16(op, a, b);
            delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
            if !is_cmp {
                set_rm16(&mut cpu.regs, bus, &m, result);
            }
        }
        2 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let a = get_reg8(&cpu.regs, m.reg);
            let b = get_rm8(&cpu.regs, bus, &m);
            let (result, delta) = alu8(op, a, b);
            delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
            if !is_cmp {
                set_reg8(&mut cpu.regs, m.reg, result);
            }
        }
        3 => {
            let m = cpu.fetch_modrm(bus, prefixes.segment);
            let a = get_reg16(&cpu.regs, m.reg);
            let b = get_rm16(&cpu.regs, bus, &m);
            let (result, delta) = alu16(op, a, b);
            delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
            if !is_cmp {
                set_reg16(&mut cpu.regs, m.reg, result);
            }
        }
        4 => {
            let imm = cpu.fetch_byte(bus);
            let (result, delta) = alu8(op, cpu.regs.al(), imm);
            delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
            if !is_cmp {
                cpu.regs.set_al(result);
            }
        }
        5 => {
            let imm = cpu.fetch_word(bus);
            let (result, delta) = alu16(op, cpu.regs.ax, imm);
            delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
            if !is_cmp {
                cpu.regs.ax = result;
            }
        }
        _ => return StepStatus::UnknownError,
    }
    StepStatus::Success
}

/// The immediate group, 0x80-0x83, reached via the decoder's reg-field
/// peek. Sub-opcodes not named here (OR/SBB/AND/XOR) never reach this
/// function; the decoder returns unimplemented for them directly.
pub fn group_arith(
    cpu: &mut Cpu,
    bus: &mut Bus,
    opcode: u8,
    prefixes: Prefixes,
    op: ArithOp,
) -> StepStatus {
    let is_cmp = op == ArithOp::Cmp;
    let m = cpu.fetch_modrm(bus, prefixes.segment);
    let operates_on_word = opcode == 0x81 || opcode == 0x83;
    if operates_on_word {
        let imm: u16 = if opcode == 0x83 {
            cpu.fetch_byte(bus) as i8 as i16 as u16
        } else {
            cpu.fetch_word(bus)
        };
        let a = get_rm16(&cpu.regs, bus, &m);
        let (result, delta) = alu16(op, a, imm);
        delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
        if !is_cmp {
            set_rm16(&mut cpu.regs, bus, &m, result);
        }
    } else {
        let imm = cpu.fetch_byte(bus);
        let a = get_rm8(&cpu.regs, bus, &m);
        let (result, delta) = alu8(op, a, imm);
        delta.merge(&mut cpu.regs.flags, flags::ARITH_MASK);
        if !is_cmp {
            set_rm8(&mut cpu.regs, bus, &m, result);
        }
    }
    StepStatus::Success
}

// ---- INC / DEC ----------------------------------------------------------

pub fn inc_dec_reg16(cpu: &mut Cpu, opcode: u8) -> StepStatus {
    let is_dec = opcode >= 0x48;
    let idx = if is_dec { opcode - 0x48 } else { opcode - 0x40 };
    let a = get_reg16(&cpu.regs, idx);
    let (result, delta) = if is_dec { flags::dec16(a) } else { flags::inc16(a) };
    delta.merge(&mut cpu.regs.flags, flags::INC_DEC_MASK);
    set_reg16(&mut cpu.regs, idx, result);
    StepStatus::Success
}

pub fn inc_dec_rm8(cpu: &mut Cpu, bus: &mut Bus, prefixes: Prefixes, is_dec: bool) -> StepStatus {
    let m = cpu.fetch_modrm(bus, prefixes.segment);
    let a = get_rm8(&cpu.regs, bus, &m);
    let (result, delta) = if is_dec { flags::dec8(a) } else { flags::inc8(a) };
    delta.merge(&mut cpu.regs.flags, flags::INC_DEC_MASK);
    set_rm8(&mut cpu.regs, bus, &m, result);
    StepStatus::Success
}

pub fn inc_dec_rm16(cpu: &mut Cpu, bus: &mut Bus, prefixes: Prefixes, is_dec: bool) -> StepStatus {
    let m = cpu.fetch_modrm(bus, prefixes.segment);
    let a = get_rm16(&cpu.regs, bus, &m);
    let (result, delta) = if is_dec { flags::dec16(a) } else { flags::inc16(a) };
    delta.merge(&mut cpu.regs.flags, flags::INC_DEC_MASK);
    set_rm16(&mut cpu.regs, bus, &m, result);
    StepStatus::Success
}

// ---- CALL / RET / JMP ---------------------------------------------------

pub fn call(cpu: &mut Cpu, bus: &mut Bus, opcode: u8) -> StepStatus {
    match opcode {
        0x9A => {
            let new_ip = cpu.fetch_word(bus);
            let new_cs = cpu.fetch_word(bus);
            let return_ip = cpu.regs.ip;
            let return_cs = cpu.regs.cs;
            cpu.push_word(bus, return_cs);
            cpu.push_word(bus, return_ip);
            cpu.regs.cs = new_cs;
            cpu.regs.ip = new_ip;
            StepStatus::Success
        }
        0xE8 => {
            let disp = cpu.fetch_word(bus) as i16;
            let return_ip = cpu.regs.ip;
            cpu.push_word(bus, return_ip);
            cpu.regs.ip = return_ip.wrapping_add(disp as u16);
            StepStatus::Success
        }
        _ => StepStatus::UnknownError,
    }
}

pub fn ret(cpu: &mut Cpu, bus: &mut Bus, opcode: u8) -> StepStatus {
    let is_far = opcode == 0xCA || opcode == 0xCB;
    let has_pop_count = opcode & 1 == 0;
    let pop_count = if has_pop_count { cpu.fetch_word(bus) } else { 0 };
    let new_ip = cpu.pop_word(bus);
    cpu.regs.ip = new_ip;
    if is_far {
        let new_cs = cpu.pop_word(bus);
        cpu.regs.cs = new_cs;
    }
    if has_pop_count {
        cpu.regs.sp = cpu.regs.sp.wrapping_add(pop_count);
    }
    StepStatus::Success
}

pub fn jmp(cpu: &mut Cpu, bus: &mut Bus, opcode: u8) -> StepStatus {
    match opcode {
        0xEB => {
            let d = cpu.fetch_byte(bus) as i8 as i16;
            cpu.regs.ip = cpu.regs.ip.wrapping_add(d as u16);
            StepStatus::Success
        }
        0xE9 => {
            let d = cpu.fetch_word(bus) as i16;
            cpu.regs.ip = cpu.regs.ip.wrapping_add(d as u16);
            StepStatus::Success
        }
        0xEA => {
            let new_ip = cpu.fetch_word(bus);
            let new_cs = cpu.fetch_word(bus);
            cpu.regs.ip = new_ip;
            cpu.regs.cs = new_cs;
            StepStatus::Success
        }
        _ => StepStatus::UnknownError,
    }
}

// ---- Jcc ------------------------------------------------------------------

pub fn jcc(cpu: &mut Cpu, bus: &mut Bus, opcode: u8) -> StepStatus {
    let d = cpu.fetch_byte(bus) as i8 as i16;
    let cc = opcode & 0x0F;
    let base_condition = match cc >> 1 {
        0b000 => cpu.regs.flag_of(),
        0b001 => cpu.regs.flag_cf(),
        0b010 => cpu.regs.flag_zf(),
        0b011 => cpu.regs.flag_cf() || cpu.regs.flag_zf(),
        0b100 => cpu.regs.flag_sf(),
        0b101 => cpu.regs.flag_pf(),
        0b110 => cpu.regs.flag_sf() != cpu.regs.flag_of(),
        0b111 => cpu.regs.flag_zf() || (cpu.regs.flag_sf() != cpu.regs.flag_of()),
        _ => unreachable!("cc >> 1 is a 3-bit field"),
    };
    let taken = if cc & 1 != 0 { !base_condition } else { base_condition };
    if taken {
        cpu.regs.ip = cpu.regs.ip.wrapping_add(d as u16);
    }
    StepStatus::Success
}

// ---- flag / control singletons --------------------------------------------

pub fn clc(cpu: &mut Cpu) -> StepStatus {
    cpu.regs.set_flag_cf(false);
    StepStatus::Success
}

pub fn stc(cpu: &mut Cpu) -> StepStatus {
    cpu.regs.set_flag_cf(true);
    StepStatus::Success
}

pub fn cmc(cpu: &mut Cpu) -> StepStatus {
    let v = cpu.regs.flag_cf();
    cpu.regs.set_flag_cf(!v);
    StepStatus::Success
}

pub fn cld(cpu: &mut Cpu) -> StepStatus {
    cpu.regs.set_flag_df(false);
    StepStatus::Success
}

pub fn std_(cpu: &mut Cpu) -> StepStatus {
    cpu.regs.set_flag_df(true);
    StepStatus::Success
}

pub fn cli(cpu: &mut Cpu) -> StepStatus {
    cpu.regs.set_flag_if(false);
    StepStatus::Success
}

pub fn sti(cpu: &mut Cpu) -> StepStatus {
    cpu.regs.set_flag_if(true);
    StepStatus::Success
}

pub fn hlt(cpu: &mut Cpu) -> StepStatus {
    cpu.halted = true;
    StepStatus::Success
}
