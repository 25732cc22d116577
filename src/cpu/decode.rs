//! Prefix accumulation and opcode dispatch.
//!
//! One opcode byte at CS:IP per call; prefix bytes update the bundle below
//! and loop back for the next byte. The two group families (0x80-0x83,
//! 0xFE/0xFF) peek the ModR/M reg field to pick a secondary handler.

use super::execute::{self, ArithOp};
use super::modrm::{peek_reg_field, Segment};
use super::Cpu;
use crate::bus::Bus;
use crate::error::StepStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Repne,
    Rep,
}

/// Prefix bytes accumulated before the opcode that ends the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prefixes {
    pub segment: Option<Segment>,
    pub lock: bool,
    pub repeat: Option<Repeat>,
}

pub fn step(cpu: &mut Cpu, bus: &mut Bus) -> StepStatus {
    let mut prefixes = Prefixes::default();
    loop {
        let byte = cpu.fetch_byte(bus);
        log::trace!("fetched opcode byte {:#04x} at CS:IP-1", byte);
        match byte {
            0x26 => prefixes.segment = Some(Segment::Es),
            0x2E => prefixes.segment = Some(Segment::Cs),
            0x36 => prefixes.segment = Some(Segment::Ss),
            0x3E => prefixes.segment = Some(Segment::Ds),
            0xF0 => prefixes.lock = true,
            0xF2 => prefixes.repeat = Some(Repeat::Repne),
            0xF3 => prefixes.repeat = Some(Repeat::Rep),
            _ => {
                let status = dispatch(cpu, bus, byte, prefixes);
                if !status.is_success() {
                    log::debug!("step returned {:?} for opcode {:#04x}", status, byte);
                }
                return status;
            }
        }
    }
}

fn dispatch(cpu: &mut Cpu, bus: &mut Bus, opcode: u8, prefixes: Prefixes) -> StepStatus {
    match opcode {
        0x26 | 0x2E | 0x36 | 0x3E | 0xF0 | 0xF2 | 0xF3 => {
            unreachable!("prefix bytes are consumed by the fetch loop in step()")
        }
        0x00..=0x05 => execute::direct_arith(cpu, bus, opcode, prefixes, 0x00, ArithOp::Add),
        0x06 | 0x07 | 0x0E | 0x16 | 0x17 | 0x1E | 0x1F => StepStatus::UnimplementedOpcode, // PUSH/POP seg
        0x08..=0x0D => StepStatus::UnimplementedOpcode, // OR
        0x0F => StepStatus::UndefinedOpcode,
        0x10..=0x15 => StepStatus::UnimplementedOpcode, // ADC
        0x18..=0x1D => StepStatus::UnimplementedOpcode, // SBB
        0x20..=0x25 => StepStatus::UnimplementedOpcode, // AND
        0x27 | 0x2F | 0x37 | 0x3F => StepStatus::UnimplementedOpcode, // DAA/DAS/AAA/AAS
        0x28..=0x2D => execute::direct_arith(cpu, bus, opcode, prefixes, 0x28, ArithOp::Sub),
        0x30..=0x35 => StepStatus::UnimplementedOpcode, // XOR
        0x38..=0x3D => execute::direct_arith(cpu, bus, opcode, prefixes, 0x38, ArithOp::Cmp),
        0x40..=0x4F => execute::inc_dec_reg16(cpu, opcode),
        0x50..=0x5F => StepStatus::UnimplementedOpcode, // PUSH/POP reg16
        0x60..=0x6F => StepStatus::UndefinedOpcode, // 80186+ only
        0x70..=0x7F => execute::jcc(cpu, bus, opcode),
        0x80 | 0x81 | 0x82 | 0x83 => {
            let reg = peek_reg_field(cpu, bus);
            match reg {
                0b000 => execute::group_arith(cpu, bus, opcode, prefixes, ArithOp::Add),
                0b101 => execute::group_arith(cpu, bus, opcode, prefixes, ArithOp::Sub),
                0b111 => execute::group_arith(cpu, bus, opcode, prefixes, ArithOp::Cmp),
                0b001 | 0b010 | 0b011 | 0b100 | 0b110 => StepStatus::UnimplementedOpcode, // OR/ADC/SBB/AND/XOR
                _ => unreachable!("reg is a 3-bit field"),
            }
        }
        0x84 | 0x85 => StepStatus::UnimplementedOpcode, // TEST r/m, r
        0x86 | 0x87 => execute::xchg(cpu, bus, opcode, prefixes),
        0x88..=0x8B | 0x8C | 0x8E | 0xA0..=0xA3 | 0xB0..=0xBF | 0xC6 | 0xC7 => {
            execute::mov(cpu, bus, opcode, prefixes)
        }
        0x8D => StepStatus::UnimplementedOpcode, // LEA
        0x8F => StepStatus::UnimplementedOpcode, // POP r/m16
        0x90..=0x97 => execute::xchg(cpu, bus, opcode, prefixes),
        0x98 | 0x99 => StepStatus::UnimplementedOpcode, // CBW/CWD
        0x9A | 0xE8 => execute::call(cpu, bus, opcode),
        0x9B..=0x9F => StepStatus::UnimplementedOpcode, // WAIT/PUSHF/POPF/SAHF/LAHF
        0xA4..=0xA9 | 0xAA..=0xAF => StepStatus::UnimplementedOpcode, // string ops, TEST imm
        0xC0 | 0xC1 => StepStatus::UndefinedOpcode, // 80186+ only
        0xC2 | 0xC3 | 0xCA | 0xCB => execute::ret(cpu, bus, opcode),
        0xC4 | 0xC5 => StepStatus::UnimplementedOpcode, // LES/LDS
        0xC8 | 0xC9 => StepStatus::UndefinedOpcode, // 80186+ only
        0xCC..=0xCF => StepStatus::UnimplementedOpcode, // INT3/INT/INTO/IRET
        0xD0..=0xD3 => StepStatus::UnimplementedOpcode, // shift/rotate group 2
        0xD4 | 0xD5 => StepStatus::UnimplementedOpcode, // AAM/AAD
        0xD6 => StepStatus::UndefinedOpcode,
        0xD7 => StepStatus::UnimplementedOpcode, // XLAT
        0xD8..=0xDF => StepStatus::UnimplementedOpcode, // x87 escapes
        0xE0..=0xE3 => StepStatus::UnimplementedOpcode, // LOOP/LOOPZ/LOOPNZ/JCXZ
        0xE4..=0xE7 | 0xEC..=0xEF => StepStatus::UnimplementedOpcode, // IN/OUT
        0xE9 | 0xEA | 0xEB => execute::jmp(cpu, bus, opcode),
        0xF1 => StepStatus::UndefinedOpcode,
        0xF4 => execute::hlt(cpu),
        0xF5 => execute::cmc(cpu),
        0xF6 | 0xF7 => StepStatus::UnimplementedOpcode, // TEST/NOT/NEG/MUL/IMUL/DIV/IDIV group
        0xF8 => execute::clc(cpu),
        0xF9 => execute::stc(cpu),
        0xFA => execute::cli(cpu),
        0xFB => execute::sti(cpu),
        0xFC => execute::cld(cpu),
        0xFD => execute::std_(cpu),
        0xFE => {
            let reg = peek_reg_field(cpu, bus);
            match reg {
                0b000 => execute::inc_dec_rm8(cpu, bus, prefixes, false),
                0b001 => execute::inc_dec_rm8(cpu, bus, prefixes, true),
                _ => StepStatus::UnimplementedOpcode,
            }
        }
        0xFF => {
            let reg = peek_reg_field(cpu, bus);
            match reg {
                0b000 => execute::inc_dec_rm16(cpu, bus, prefixes, false),
                0b001 => execute::inc_dec_rm16(cpu, bus, prefixes, true),
                0b010 | 0b011 | 0b100 | 0b101 | 0b110 => StepStatus::UnimplementedOpcode, // CALL/JMP indirect, PUSH
                0b111 => StepStatus::UndefinedOpcode,
                _ => unreachable!("reg is a 3-bit field"),
            }
        }
    }
}
