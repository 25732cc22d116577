//! End-to-end scenarios driven through the public `Machine` API.

use i8086_core::bus::linear;
use i8086_core::machine::Machine;
use i8086_core::StepStatus;

fn load_at(machine: &mut Machine, addr: u32, code: &[u8]) {
    for (i, b) in code.iter().enumerate() {
        machine.bus.write_byte(addr + i as u32, *b);
    }
}

fn setup_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).try_init();
}

#[test]
fn logging_reports_debug_on_non_success_status() {
    setup_logging();
    let mut machine = Machine::new();
    load_at(&mut machine, 0, &[0x0F]); // undefined on a plain 8086
    let status = machine.step();
    assert_eq!(status, StepStatus::UndefinedOpcode);
}

#[test]
fn scenario_immediate_load() {
    let mut machine = Machine::new();
    load_at(&mut machine, 0, &[0xB8, 0x34, 0x12]); // MOV AX, 0x1234
    let flags_before = machine.cpu.regs.flags;
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.ax, 0x1234);
    assert_eq!(machine.cpu.regs.ip, 3);
    assert_eq!(machine.cpu.regs.flags, flags_before);
}

#[test]
fn scenario_add_with_overflow() {
    let mut machine = Machine::new();
    machine.cpu.regs.ax = 0x7FFF;
    load_at(&mut machine, 0, &[0x05, 0x01, 0x00]); // ADD AX, 1
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.ax, 0x8000);
    assert!(!machine.cpu.regs.flag_cf());
    assert!(machine.cpu.regs.flag_af());
    assert!(!machine.cpu.regs.flag_zf());
    assert!(machine.cpu.regs.flag_sf());
    assert!(machine.cpu.regs.flag_of());
    assert!(machine.cpu.regs.flag_pf());
}

#[test]
fn scenario_sub_producing_zero() {
    let mut machine = Machine::new();
    machine.cpu.regs.bx = 0x1234;
    load_at(&mut machine, 0, &[0x81, 0xEB, 0x34, 0x12]); // SUB BX, 0x1234
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.bx, 0);
    assert!(!machine.cpu.regs.flag_cf());
    assert!(machine.cpu.regs.flag_zf());
    assert!(!machine.cpu.regs.flag_sf());
    assert!(!machine.cpu.regs.flag_of());
    assert!(machine.cpu.regs.flag_pf());
}

#[test]
fn scenario_short_conditional_jump_taken() {
    let mut machine = Machine::new();
    machine.cpu.regs.set_flag_zf(true);
    load_at(&mut machine, 0, &[0x74, 0x05]); // JE +5
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.ip, 7);
}

#[test]
fn scenario_near_call_ret_pair() {
    let mut machine = Machine::new();
    machine.cpu.regs.ss = 0;
    machine.cpu.regs.sp = 0x100;
    load_at(&mut machine, 0, &[0xE8, 0x03, 0x00]); // CALL +3
    load_at(&mut machine, 6, &[0xC3]); // RET

    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.sp, 0x00FE);
    assert_eq!(machine.bus.read_word(linear(0, 0x00FE)), 0x0003);
    assert_eq!(machine.cpu.regs.ip, 0x0006);

    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.sp, 0x0100);
    assert_eq!(machine.cpu.regs.ip, 0x0003);
}

#[test]
fn scenario_segment_override_load() {
    let mut machine = Machine::new();
    machine.cpu.regs.es = 0x1000;
    machine.cpu.regs.ds = 0x2000;
    machine.cpu.regs.si = 0x0010;
    machine.bus.write_byte(0x10010, 0xAB);
    machine.bus.write_byte(0x20010, 0xCD);

    load_at(&mut machine, 0, &[0x26, 0x8A, 0x04]); // ES: MOV AL, [SI]
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.al(), 0xAB);

    machine.cpu.regs.ip = 0;
    load_at(&mut machine, 0, &[0x8A, 0x04]); // MOV AL, [SI], no override
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.al(), 0xCD);
}

#[test]
fn invariant_word_round_trip_across_segment_wrap() {
    let mut machine = Machine::new();
    let addr = linear(0x1000, 0xFFFF);
    machine.bus.write_word(addr, 0xBEEF);
    assert_eq!(machine.bus.read_word(addr), 0xBEEF);
}

#[test]
fn invariant_address_wraps_mod_2_20() {
    let mut machine = Machine::new();
    let high = linear(0xF000, 0xFFFF);
    machine.bus.write_byte(high, 0x5A);
    let wrapped = linear(0x0000, 0x000F);
    assert_eq!(machine.bus.read_byte(wrapped), 0x5A);
}

#[test]
fn invariant_mov_to_half_register_preserves_other_half() {
    let mut machine = Machine::new();
    machine.cpu.regs.ax = 0xAA55;
    load_at(&mut machine, 0, &[0xB0, 0x11]); // MOV AL, 0x11
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.ax, 0xAA11);
}

#[test]
fn invariant_inc_dec_preserve_carry_flag() {
    let mut machine = Machine::new();
    machine.cpu.regs.set_flag_cf(true);
    machine.cpu.regs.cx = 5;
    load_at(&mut machine, 0, &[0x49]); // DEC CX
    let status = machine.step();
    assert_eq!(status, StepStatus::Success);
    assert_eq!(machine.cpu.regs.cx, 4);
    assert!(machine.cpu.regs.flag_cf());
}

#[test]
fn invariant_jcc_pairs_partition_the_condition_space() {
    // For each adjacent pair (n, n+1), exactly one of the taken-predicates
    // holds for any given FLAGS value.
    for base in (0x70u8..0x80).step_by(2) {
        for flags in [0u16, 0xFFFF, 0b0100_0100_0101_0101] {
            let mut a = Machine::new();
            a.cpu.regs.flags = flags;
            load_at(&mut a, 0, &[base, 0x05]);
            a.step();
            let a_taken = a.cpu.regs.ip == 7;

            let mut b = Machine::new();
            b.cpu.regs.flags = flags;
            load_at(&mut b, 0, &[base + 1, 0x05]);
            b.step();
            let b_taken = b.cpu.regs.ip == 7;

            assert_ne!(a_taken, b_taken, "condition pair {:#04x}/{:#04x} did not partition flags {:#06x}", base, base + 1, flags);
        }
    }
}
