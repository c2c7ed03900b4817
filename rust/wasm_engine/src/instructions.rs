//! Opcode dispatch table and control instructions.
//!
//! Every handler follows the same contract: decode any immediates relative
//! to the program counter, mutate the operand stack, and advance the
//! counter; on failure record a trap on the engine and return the reason as
//! the error.

use std::fmt;

use crate::vm::{StepError, VmState};

/// Handler invoked when the dispatcher encounters the matching opcode.
pub type Instruction = fn(&mut VmState) -> Result<(), StepError>;

/// Trap reason recorded by [`end`]; the run loop treats this one as normal
/// program termination.
pub const END_CALL_STACK_EMPTY: &str = "END: Call Stack Empty";

// Opcode numbers follow the WebAssembly opcode space.
pub const OP_NOP: u8 = 0x01;
pub const OP_END: u8 = 0x0B;
pub const OP_CONST_I32: u8 = 0x41;
pub const OP_CONST_I64: u8 = 0x42;
pub const OP_ADD_I32: u8 = 0x6A;
pub const OP_SUB_I32: u8 = 0x6B;
pub const OP_MUL_I32: u8 = 0x6C;
pub const OP_DIVS_I32: u8 = 0x6D;
pub const OP_DIVU_I32: u8 = 0x6E;
pub const OP_ADD_I64: u8 = 0x7C;
pub const OP_SUB_I64: u8 = 0x7D;
pub const OP_MUL_I64: u8 = 0x7E;
pub const OP_DIVU_I64: u8 = 0x80;

/// Flat handler table indexed by opcode byte.
#[derive(Clone)]
pub struct InstructionTable {
    handlers: [Option<Instruction>; 256],
}

impl InstructionTable {
    /// Table with every instruction this engine implements.
    pub fn standard() -> Self {
        let mut table = Self {
            handlers: [None; 256],
        };
        table.install(OP_NOP, nop);
        table.install(OP_END, end);
        table.install(OP_CONST_I32, crate::numeric_i32::const_i32);
        table.install(OP_ADD_I32, crate::numeric_i32::add_i32);
        table.install(OP_SUB_I32, crate::numeric_i32::sub_i32);
        table.install(OP_MUL_I32, crate::numeric_i32::mul_i32);
        table.install(OP_DIVS_I32, crate::numeric_i32::divs_i32);
        table.install(OP_DIVU_I32, crate::numeric_i32::divu_i32);
        table.install(OP_CONST_I64, crate::numeric_i64::const_i64);
        table.install(OP_ADD_I64, crate::numeric_i64::add_i64);
        table.install(OP_SUB_I64, crate::numeric_i64::sub_i64);
        table.install(OP_MUL_I64, crate::numeric_i64::mul_i64);
        table.install(OP_DIVU_I64, crate::numeric_i64::divu_i64);
        table
    }

    /// Register or replace the handler for `opcode`.
    pub fn install(&mut self, opcode: u8, handler: Instruction) {
        self.handlers[opcode as usize] = Some(handler);
    }

    pub fn get(&self, opcode: u8) -> Option<Instruction> {
        self.handlers[opcode as usize]
    }
}

impl Default for InstructionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for InstructionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed: Vec<u8> = (0..=255u8)
            .filter(|&opcode| self.handlers[opcode as usize].is_some())
            .collect();
        f.debug_struct("InstructionTable")
            .field("installed", &installed)
            .finish()
    }
}

/// 0x01 nop: advances past the opcode and does nothing else.
pub fn nop(vm: &mut VmState) -> Result<(), StepError> {
    vm.pc += 1;
    Ok(())
}

/// 0x0B end: terminator for the outermost frame.
///
/// There are no call frames yet, so `end` always traps.  Once frames exist
/// it must pop a frame and return to the caller instead, trapping only when
/// the call stack is empty; the reason string is the stable contract.
pub fn end(vm: &mut VmState) -> Result<(), StepError> {
    vm.pc += 1;
    Err(vm.raise_trap(END_CALL_STACK_EMPTY))
}
