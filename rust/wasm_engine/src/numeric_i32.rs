//! 32-bit integer instructions.
//!
//! Binary operations consume their operands oldest-first: with `a` pushed
//! before `b`, subtraction computes `a - b`.  All arithmetic wraps modulo
//! 2^32; the signed/unsigned distinction exists only inside the division
//! handlers, the stack itself is sign-agnostic.

use crate::stack::{EntryType, StackEntry};
use crate::vm::{StepError, VmState, WIDTH_I32};

/// 0x41 const.i32: reads four octets little endian and pushes the word.
pub fn const_i32(vm: &mut VmState) -> Result<(), StepError> {
    const WIDTH: u64 = 1 + WIDTH_I32 as u64;
    if vm.pc + WIDTH > vm.memory.len() as u64 {
        return Err(vm.raise_trap("CONST_I32: Out of bounds"));
    }
    let start = (vm.pc + 1) as usize;
    let value = u32::from_le_bytes([
        vm.memory[start],
        vm.memory[start + 1],
        vm.memory[start + 2],
        vm.memory[start + 3],
    ]);
    vm.value_stack.push_i32(value);
    vm.pc += WIDTH;
    Ok(())
}

/// Pop two I32 operands for `name`, oldest first.
///
/// Traps with `<name>: Stack Underflow` and leaves the stack and PC
/// untouched when the top two entries are not both I32.
fn pop_i32_pair(vm: &mut VmState, name: &str) -> Result<(u32, u32), StepError> {
    let operands = match vm.value_stack.peek_top_if_all_of_type(2, EntryType::I32) {
        Some(&[StackEntry::I32(a), StackEntry::I32(b)]) => Some((a, b)),
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

/// 0x6A add.i32: wrapping sum of the top two I32 words.
pub fn add_i32(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i32_pair(vm, "ADD_I32")?;
    vm.value_stack.push_i32(a.wrapping_add(b));
    vm.pc += 1;
    Ok(())
}

/// 0x6B sub.i32: wrapping difference (older minus newer).
pub fn sub_i32(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i32_pair(vm, "SUB_I32")?;
    vm.value_stack.push_i32(a.wrapping_sub(b));
    vm.pc += 1;
    Ok(())
}

/// 0x6C mul.i32: low 32 bits of the product.
pub fn mul_i32(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i32_pair(vm, "MUL_I32")?;
    vm.value_stack.push_i32(a.wrapping_mul(b));
    vm.pc += 1;
    Ok(())
}

/// 0x6D div_s.i32: signed quotient of the top two I32 words.
///
/// The operands are consumed before the divisor checks, so the
/// divide-by-zero and overflow traps leave an emptied operand pair behind
/// and the PC at the opcode.
pub fn divs_i32(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i32_pair(vm, "DIVS_I32")?;
    let dividend = a as i32;
    let divisor = b as i32;
    if divisor == 0 {
        return Err(vm.raise_trap("DIVS_I32: Divide by Zero"));
    }
    // i32::MIN / -1 does not fit back into an i32.
    if dividend == i32::MIN && divisor == -1 {
        return Err(vm.raise_trap("DIVS_I32: Signed Division Overflow"));
    }
    vm.value_stack.push_i32((dividend / divisor) as u32);
    vm.pc += 1;
    Ok(())
}

/// 0x6E div_u.i32: unsigned quotient of the top two I32 words.
pub fn divu_i32(vm: &mut VmState) -> Result<(), StepError> {
    let (a, b) = pop_i32_pair(vm, "DIVU_I32")?;
    if b == 0 {
        return Err(vm.raise_trap("DIVU_I32: Divide by Zero"));
    }
    vm.value_stack.push_i32(a / b);
    vm.pc += 1;
    Ok(())
}
