//! ModR/M byte parsing and the register/memory operand surface.
//!
//! The resolver only computes *where* an operand lives; it never issues the
//! memory access for the operand itself (displacement bytes are instruction
//! stream, not operand data, so `Cpu::fetch_modrm` does consume those).

use super::{Cpu, Registers};
use crate::bus::{linear, Bus};
use crate::error::StepStatus;

/// A segment register, used both for override prefixes and ModR/M defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Es,
    Cs,
    Ss,
    Ds,
}

pub fn segment_value(regs: &Registers, seg: Segment) -> u16 {
    match seg {
        Segment::Es => regs.es,
        Segment::Cs => regs.cs,
        Segment::Ss => regs.ss,
        Segment::Ds => regs.ds,
    }
}

/// A decoded ModR/M byte, plus whatever trailing displacement it carried.
#[derive(Debug, Clone, Copy)]
pub struct ModRm {
    pub md: u8,
    pub reg: u8,
    pub rm: u8,
    pub disp: i16,
    /// Effective offset within `segment`; meaningless when `md == 0b11`.
    pub address: u16,
    /// Displacement bytes consumed beyond the ModR/M byte itself.
    pub size: u8,
    pub segment: Segment,
}

impl ModRm {
    pub fn is_register(&self) -> bool {
        self.md == 0b11
    }
}

/// BX+SI / BX+DI / BP+SI / BP+DI / SI / DI / BP-or-direct / BX, with the
/// BP-based forms defaulting to SS rather than DS.
fn base_expression(regs: &Registers, rm: u8, md: u8) -> (u16, Segment) {
    match rm {
        0b000 => (regs.bx.wrapping_add(regs.si), Segment::Ds),
        0b001 => (regs.bx.wrapping_add(regs.di), Segment::Ds),
        0b010 => (regs.bp.wrapping_add(regs.si), Segment::Ss),
        0b011 => (regs.bp.wrapping_add(regs.di), Segment::Ss),
        0b100 => (regs.si, Segment::Ds),
        0b101 => (regs.di, Segment::Ds),
        0b110 => {
            if md == 0b00 {
                (0, Segment::Ds)
            } else {
                (regs.bp, Segment::Ss)
            }
        }
        0b111 => (regs.bx, Segment::Ds),
        _ => unreachable!("rm is a 3-bit field"),
    }
}

impl Cpu {
    /// Fetch a ModR/M byte (and any trailing displacement) at CS:IP,
    /// advancing IP past all of it.
    pub fn fetch_modrm(&mut self, bus: &Bus, override_seg: Option<Segment>) -> ModRm {
        let byte = self.fetch_byte(bus);
        let md = byte >> 6;
        let reg = (byte >> 3) & 0b111;
        let rm = byte & 0b111;

        if md == 0b11 {
            return ModRm { md, reg, rm, disp: 0, address: 0, size: 0, segment: Segment::Ds };
        }

        let (base, default_seg) = base_expression(&self.regs, rm, md);

        let (disp, size, address) = if md == 0b00 && rm == 0b110 {
            let d = self.fetch_word(bus);
            (d as i16, 2u8, d)
        } else {
            match md {
                0b00 => (0i16, 0u8, base),
                0b01 => {
                    let d = self.fetch_byte(bus) as i8 as i16;
                    (d, 1u8, base.wrapping_add(d as u16))
                }
                0b10 => {
                    let d = self.fetch_word(bus) as i16;
                    (d, 2u8, base.wrapping_add(d as u16))
                }
                _ => unreachable!("md == 0b11 handled above"),
            }
        };

        let segment = override_seg.unwrap_or(default_seg);
        ModRm { md, reg, rm, disp, address, size, segment }
    }
}

/// Peek the ModR/M reg field at CS:IP without consuming any bytes, used by
/// the decoder for group secondary-dispatch.
pub fn peek_reg_field(cpu: &Cpu, bus: &Bus) -> u8 {
    let addr = linear(cpu.regs.cs, cpu.regs.ip);
    (bus.read_byte(addr) >> 3) & 0b111
}

pub fn get_reg8(regs: &Registers, idx: u8) -> u8 {
    match idx & 0b111 {
        0 => regs.al(),
        1 => regs.cl(),
        2 => regs.dl(),
        3 => regs.bl(),
        4 => regs.ah(),
        5 => regs.ch(),
        6 => regs.dh(),
        7 => regs.bh(),
        _ => unreachable!(),
    }
}

pub fn set_reg8(regs: &mut Registers, idx: u8, val: u8) {
    match idx & 0b111 {
        0 => regs.set_al(val),
        1 => regs.set_cl(val),
        2 => regs.set_dl(val),
        3 => regs.set_bl(val),
        4 => regs.set_ah(val),
        5 => regs.set_ch(val),
        6 => regs.set_dh(val),
        7 => regs.set_bh(val),
        _ => unreachable!(),
    }
}

pub fn get_reg16(regs: &Registers, idx: u8) -> u16 {
    match idx & 0b111 {
        0 => regs.ax,
        1 => regs.cx,
        2 => regs.dx,
        3 => regs.bx,
        4 => regs.sp,
        5 => regs.bp,
        6 => regs.si,
        7 => regs.di,
        _ => unreachable!(),
    }
}

pub fn set_reg16(regs: &mut Registers, idx: u8, val: u16) {
    match idx & 0b111 {
        0 => regs.ax = val,
        1 => regs.cx = val,
        2 => regs.dx = val,
        3 => regs.bx = val,
        4 => regs.sp = val,
        5 => regs.bp = val,
        6 => regs.si = val,
        7 => regs.di = val,
        _ => unreachable!(),
    }
}

/// ES/CS/SS/DS selected by the low two bits of a reg field. Encodings 4-7
/// are not legal segment-register selectors.
pub fn get_segment(regs: &Registers, idx: u8) -> Result<u16, StepStatus> {
    match idx {
        0 => Ok(regs.es),
        1 => Ok(regs.cs),
        2 => Ok(regs.ss),
        3 => Ok(regs.ds),
        _ => Err(StepStatus::InvalidOperation),
    }
}

pub fn set_segment(regs: &mut Registers, idx: u8, val: u16) -> Result<(), StepStatus> {
    match idx {
        0 => {
            regs.es = val;
            Ok(())
        }
        1 => {
            regs.cs = val;
            Ok(())
        }
        2 => {
            regs.ss = val;
            Ok(())
        }
        3 => {
            regs.ds = val;
            Ok(())
        }
        _ => Err(StepStatus::InvalidOperation),
    }
}

pub fn get_rm8(regs: &Registers, bus: &Bus, m: &ModRm) -> u8 {
    if m.is_register() {
        get_reg8(regs, m.rm)
    } else {
        bus.read_byte(linear(segment_value(regs, m.segment), m.address))
    }
}

pub fn set_rm8(regs: &mut Registers, bus: &mut Bus, m: &ModRm, val: u8) {
    if m.is_register() {
        set_reg8(regs, m.rm, val)
    } else {
        let addr = linear(segment_value(regs, m.segment), m.address);
        bus.write_byte(addr, val)
    }
}

pub fn get_rm16(regs: &Registers, bus: &Bus, m: &ModRm) -> u16 {
    if m.is_register() {
        get_reg16(regs, m.rm)
    } else {
        bus.read_word(linear(segment_value(regs, m.segment), m.address))
    }
}

pub fn set_rm16(regs: &mut Registers, bus: &mut Bus, m: &ModRm, val: u16) {
    if m.is_register() {
        set_reg16(regs, m.rm, val)
    } else {
        let addr = linear(segment_value(regs, m.segment), m.address);
        bus.write_word(addr, val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpu;

    fn cpu_with(cs: u16, ip: u16) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.regs.cs = cs;
        cpu.regs.ip = ip;
        cpu
    }

    #[test]
    fn test_register_direct_mode_consumes_no_displacement() {
        let mut cpu = cpu_with(0, 0);
        let mut bus = Bus::new();
        bus.write_byte(0, 0b11_000_001); // mod=11, reg=0, rm=1
        let m = cpu.fetch_modrm(&bus, None);
        assert!(m.is_register());
        assert_eq!(m.size, 0);
        assert_eq!(cpu.regs.ip, 1);
    }

    #[test]
    fn test_bx_si_base_defaults_to_ds() {
        let mut cpu = cpu_with(0, 0);
        cpu.regs.bx = 0x10;
        cpu.regs.si = 0x20;
        let mut bus = Bus::new();
        bus.write_byte(0, 0b00_000_000); // mod=00, rm=000 -> [BX+SI]
        let m = cpu.fetch_modrm(&bus, None);
        assert_eq!(m.address, 0x30);
        assert_eq!(m.segment, Segment::Ds);
    }

    #[test]
    fn test_bp_based_modes_default_to_ss() {
        let mut cpu = cpu_with(0, 0);
        cpu.regs.bp = 0x40;
        cpu.regs.si = 0x02;
        let mut bus = Bus::new();
        bus.write_byte(0, 0b00_000_010); // mod=00, rm=010 -> [BP+SI]
        let m = cpu.fetch_modrm(&bus, None);
        assert_eq!(m.address, 0x42);
        assert_eq!(m.segment, Segment::Ss);
    }

    #[test]
    fn test_bp_alone_with_mod_00_is_direct_address_not_ss() {
        let mut cpu = cpu_with(0, 0);
        let mut bus = Bus::new();
        bus.write_byte(0, 0b00_000_110); // mod=00, rm=110 -> direct address
        bus.write_word(1, 0x1234);
        let m = cpu.fetch_modrm(&bus, None);
        assert_eq!(m.address, 0x1234);
        assert_eq!(m.size, 2);
        assert_eq!(m.segment, Segment::Ds);
        assert_eq!(cpu.regs.ip, 3);
    }

    #[test]
    fn test_bp_mod_01_uses_ss_and_byte_displacement() {
        let mut cpu = cpu_with(0, 0);
        cpu.regs.bp = 0x40;
        let mut bus = Bus::new();
        bus.write_byte(0, 0b01_000_110); // mod=01, rm=110 -> [BP+disp8]
        bus.write_byte(1, 0xFE); // -2
        let m = cpu.fetch_modrm(&bus, None);
        assert_eq!(m.segment, Segment::Ss);
        assert_eq!(m.size, 1);
        assert_eq!(m.address, 0x3E);
    }

    #[test]
    fn test_segment_override_wins_over_default() {
        let mut cpu = cpu_with(0, 0);
        cpu.regs.bp = 0x40;
        let mut bus = Bus::new();
        bus.write_byte(0, 0b00_000_010); // [BP+SI], defaults to SS
        let m = cpu.fetch_modrm(&bus, Some(Segment::Es));
        assert_eq!(m.segment, Segment::Es);
    }

    #[test]
    fn test_mod_10_word_displacement() {
        let mut cpu = cpu_with(0, 0);
        cpu.regs.bx = 0x100;
        let mut bus = Bus::new();
        bus.write_byte(0, 0b10_000_111); // mod=10, rm=111 -> [BX+disp16]
        bus.write_word(1, 0x0010);
        let m = cpu.fetch_modrm(&bus, None);
        assert_eq!(m.address, 0x110);
        assert_eq!(m.size, 2);
    }

    #[test]
    fn test_invalid_segment_selector_rejected() {
        let mut regs = Registers::new();
        assert!(get_segment(&regs, 4).is_err());
        assert!(set_segment(&mut regs, 7, 0).is_err());
    }
}
