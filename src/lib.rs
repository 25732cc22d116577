//! Intel 8086 real-mode CPU interpreter core
//!
//! This crate provides a platform-agnostic emulator core with a stable C ABI.
//! No OS APIs are used - all I/O is done through byte buffers.
//!
//! # Architecture
//!
//! The emulator is organized into several modules:
//! - `bus`: the 20-bit address space and I/O port space
//! - `cpu`: registers, flags, ModR/M resolution, decode/dispatch, instruction handlers
//! - `machine`: wires a `Cpu` to a `Bus` into the unit callers drive one step at a time
//! - `error`: the `StepStatus` result type every `step()` call returns
//!
//! # Memory Map (20-bit 8086 address space)
//!
//! | Address Range     | Region                         |
//! |--------------------|--------------------------------|
//! | 0x00000 - 0xFFFFF  | Flat RAM, `MEMORY_SIZE` bytes   |
//!
//! Port I/O lives in a separate 64K space (`PORT_SPACE_SIZE`), not memory-mapped.

pub mod bus;
pub mod cpu;
pub mod error;
pub mod machine;

use std::ptr;
use std::slice;

pub use bus::Bus;
pub use cpu::Cpu;
pub use error::StepStatus;
pub use machine::Machine;

fn status_code(status: StepStatus) -> i32 {
    match status {
        StepStatus::Success => 0,
        StepStatus::UnknownError => -1,
        StepStatus::UndefinedOpcode => -2,
        StepStatus::UnimplementedOpcode => -3,
        StepStatus::InvalidOperation => -4,
    }
}

/// Create a new machine instance.
/// Returns null on allocation failure.
#[no_mangle]
pub extern "C" fn i8086_create() -> *mut Machine {
    let machine = Box::new(Machine::new());
    Box::into_raw(machine)
}

/// Destroy a machine instance.
/// Safe to call with null pointer.
#[no_mangle]
pub extern "C" fn i8086_destroy(machine: *mut Machine) {
    if !machine.is_null() {
        unsafe {
            drop(Box::from_raw(machine));
        }
    }
}

/// Reset the machine's CPU state. Memory contents are left untouched.
#[no_mangle]
pub extern "C" fn i8086_reset(machine: *mut Machine) {
    if machine.is_null() {
        return;
    }
    let machine = unsafe { &mut *machine };
    machine.reset();
}

/// Execute a single instruction.
/// Returns 0 on success, a negative error code otherwise (see `status_code`).
#[no_mangle]
pub extern "C" fn i8086_step(machine: *mut Machine) -> i32 {
    if machine.is_null() {
        return status_code(StepStatus::InvalidOperation);
    }
    let machine = unsafe { &mut *machine };
    status_code(machine.step())
}

/// Load an image into memory starting at absolute address 0.
/// Returns 0 on success, negative error code on a null pointer.
#[no_mangle]
pub extern "C" fn i8086_load_image(machine: *mut Machine, data: *const u8, len: usize) -> i32 {
    if machine.is_null() || data.is_null() {
        return status_code(StepStatus::InvalidOperation);
    }
    let machine = unsafe { &mut *machine };
    let image = unsafe { slice::from_raw_parts(data, len) };
    machine.load_image(image);
    0
}

/// Get a pointer to the machine's flat memory and its size in bytes.
/// Returns null if the machine pointer is null.
#[no_mangle]
pub extern "C" fn i8086_memory(machine: *mut Machine, len: *mut usize) -> *mut u8 {
    if machine.is_null() {
        return ptr::null_mut();
    }
    let machine = unsafe { &mut *machine };
    if !len.is_null() {
        unsafe { *len = machine.bus.memory.len() };
    }
    machine.bus.memory.as_mut_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_destroy() {
        let machine = i8086_create();
        assert!(!machine.is_null());
        i8086_destroy(machine);
    }

    #[test]
    fn test_load_image_and_step() {
        let machine = i8086_create();
        let code = [0xB0u8, 0x42]; // MOV AL, 0x42
        let rc = i8086_load_image(machine, code.as_ptr(), code.len());
        assert_eq!(rc, 0);
        let rc = i8086_step(machine);
        assert_eq!(rc, 0);
        i8086_destroy(machine);
    }

    #[test]
    fn test_step_on_null_is_invalid_operation() {
        let rc = i8086_step(ptr::null_mut());
        assert_eq!(rc, status_code(StepStatus::InvalidOperation));
    }

    #[test]
    fn test_memory_pointer_reflects_loaded_image() {
        let machine = i8086_create();
        let code = [0xAAu8, 0xBB];
        i8086_load_image(machine, code.as_ptr(), code.len());
        let mut len: usize = 0;
        let ptr = i8086_memory(machine, &mut len);
        assert!(!ptr.is_null());
        assert_eq!(len, bus::MEMORY_SIZE);
        let first_two = unsafe { slice::from_raw_parts(ptr, 2) };
        assert_eq!(first_two, &[0xAA, 0xBB]);
        i8086_destroy(machine);
    }
}
