//! 64-bit integer instructions.
//!
//! Same conventions as the 32-bit set: operands are consumed oldest-first
//! and arithmetic wraps modulo 2^64.

use crate::stack::{EntryType, StackEntry};
use crate::vm::{StepError, VmState, WIDTH_I64};

/// 0x42 const.i64: reads eight octets little endian and pushes the word.
pub fn const_i64(vm: &mut VmState) -> Result<(), StepError> {
    const WIDTH: u64 = 1 + WIDTH_I64 as u64;
    if vm.pc + WIDTH > vm.memory.len() as u64 {
        return Err(vm.raise_trap("CONST_I64: Out of bounds"));
    }
    let start = (vm.pc + 1) as usize;
    let mut raw = [0u8; WIDTH_I64];
    raw.copy_from_slice(&vm.memory[start..start + WIDTH_I64]);
    vm.value_stack.push_i64(u64::from_le_bytes(raw));
    vm.pc += WIDTH;
    Ok(())
}

/// Pop two I64 operands for `name`, oldest first.
///
/// Traps with `<name>: Stack Underflow` and leaves the stack and PC
/// untouched when the top two entries are not both I64.
fn pop_i64_pair(vm: &mut VmState, name: &str) -> Result<(u64, u64), StepError> {
    let operands = match vm.value_stack.peek_top_if_all_of_type(2, EntryType::I64) {
        Some(&[StackEntry::I64(a), StackEntry::I64(b)]) => Some((a, b)),
        _ => None,
    };
    let Some((a, b)) = operands else {
        return Err(vm.raise_trap(format!("{name}: Stack Underflow")));
    };
    if !vm.value_stack.drop_entries(2, true) {
        return Err(vm.raise_trap(format!("{name}: Stack Cleanup Error")));
    }
    Ok((a, b))
}

/// 0x7C add.i64: wrapping sum of the top two I64 words.
pub fn add_i64(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i64_pair(vm, "ADD_I64")?;
    vm.value_stack.push_i64(a.wrapping_add(b));
    vm.pc += 1;
    Ok(())
}

/// 0x7D sub.i64: wrapping difference (older minus newer).
pub fn sub_i64(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i64_pair(vm, "SUB_I64")?;
    vm.value_stack.push_i64(a.wrapping_sub(b));
    vm.pc += 1;
    Ok(())
}

/// 0x7E mul.i64: low 64 bits of the product.
pub fn mul_i64(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i64_pair(vm, "MUL_I64")?;
    vm.value_stack.push_i64(a.wrapping_mul(b));
    vm.pc += 1;
    Ok(())
}

/// 0x80 div_u.i64: unsigned quotient of the top two I64 words.
pub fn divu_i64(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i64_pair(vm, "DIVU_I64")?;
    if b == 0 {
        return Err(vm.raise_trap("DIVU_I64: Divide by Zero"));
    }
    vm.value_stack.push_i64(a / b);
    vm.pc += 1;
    Ok(())
}
