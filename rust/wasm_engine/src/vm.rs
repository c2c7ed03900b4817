//! Engine state, the build pipeline, and the step loop.
//!
//! A [`VmState`] exclusively owns its linear memory, operand stack, dispatch
//! table, and a deep-cloned snapshot of its configuration; the caller's
//! configuration is never mutated by a build.  Execution is synchronous and
//! single-owner: `step` runs exactly one instruction, `run` steps until a
//! trap is recorded.  Traps are sticky for the lifetime of the engine.

use std::fmt;
use std::io::Write;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{RingConfig, VmConfig, VmErrorKind, VmErrorMeta, VmInitError};
use crate::image::{populate_image, FsReader};
use crate::instructions::{InstructionTable, END_CALL_STACK_EMPTY};
use crate::stack::ValueStack;

/// Immediate widths in octets.
pub const WIDTH_I32: usize = 4;
pub const WIDTH_I64: usize = 8;
pub const WIDTH_F32: usize = 4;
pub const WIDTH_F64: usize = 8;

/// Error surfaced by [`VmState::step`]; the message always equals the trap
/// reason recorded on the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// The engine had already trapped before this step.
    #[error("execution trapped: {0}")]
    AlreadyTrapped(String),
    /// This step raised the trap carried in the payload.
    #[error("{0}")]
    Trap(String),
}

/// A running engine instance.
pub struct VmState {
    /// Linear memory; length is fixed for the engine's lifetime.
    pub memory: Vec<u8>,
    /// Program counter, an octet offset into `memory`.
    pub pc: u64,
    /// Sticky trap flag; once set the engine refuses further steps.
    pub trapped: bool,
    /// Reason recorded when the trap flag was set.
    pub trap_reason: String,
    /// Warnings accumulated while the engine was built.
    pub image_init_warnings: Vec<String>,
    /// Engine-owned clone of the build configuration.
    pub config: VmConfig,
    /// Operand stack shared by all instruction handlers.
    pub value_stack: ValueStack,
    instruction_table: InstructionTable,
}

impl fmt::Debug for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmState")
            .field("memory", &self.memory.len())
            .field("pc", &self.pc)
            .field("trapped", &self.trapped)
            .field("trap_reason", &self.trap_reason)
            .field("stack", &self.value_stack.size())
            .finish()
    }
}

impl VmState {
    /// Construct an engine from `config`.
    ///
    /// The configuration is deep-cloned so the caller's copy can be reused
    /// freely afterwards; I/O handles, host functions, and the file reader
    /// are shared onto the clone by reference.
    pub fn new(config: Option<&VmConfig>) -> Result<Self, VmInitError> {
        let config = config
            .ok_or_else(|| VmInitError::new(VmErrorKind::ConfigRequired, "config is required"))?;

        let mut owned = config.quick_clone().map_err(|cause| {
            VmInitError::with_cause(
                VmErrorKind::ConfigInternalError,
                format!("an internal error occurred: {cause}"),
                Box::new(cause),
            )
        })?;

        if owned.size == 0 && owned.flat_memory.is_none() {
            return Err(VmInitError::new(
                VmErrorKind::MissingSizeOrFlatMemory,
                "either size or flat_memory must be specified",
            ));
        }

        // The clone dropped the non-serializable fields; share them from the
        // caller's configuration by reference.
        owned.stdin = config.stdin.clone();
        owned.stdout = config.stdout.clone();
        owned.stderr = config.stderr.clone();
        owned.exposed_funcs = config.exposed_funcs.clone();
        owned.file_reader = config.file_reader.clone();

        let mut memory = match owned.flat_memory.take() {
            Some(buffer) => buffer,
            None => vec![0u8; owned.size as usize],
        };

        let mut warnings = Vec::new();
        if let Some(image) = owned.image.clone() {
            let result = match &owned.file_reader {
                Some(reader) => populate_image(&mut memory, &image, owned.strict, reader.as_ref()),
                None => populate_image(&mut memory, &image, owned.strict, &FsReader),
            };
            match result {
                Ok(image_warnings) => warnings = image_warnings,
                Err(cause) => {
                    if owned.strict {
                        return Err(VmInitError::with_cause_and_meta(
                            VmErrorKind::ImageError,
                            format!("an error occurred during Image initialization: {cause}"),
                            Box::new(cause),
                            VmErrorMeta::Image(image),
                        ));
                    }
                    warn!(error = %cause, "image initialization demoted to warning");
                    warnings.push(cause.to_string());
                }
            }
        }

        let mut rings = owned.rings.take().unwrap_or_default();
        if let Some(ring_zero) = rings.get(&0) {
            if owned.strict {
                return Err(VmInitError::new(
                    VmErrorKind::StrictModeAttemptRing0Reconfigure,
                    "ring 0 cannot be reconfigured (strict mode)",
                ));
            }
            if ring_zero.enabled {
                warnings.push("Ring 0 redefinition ignored".to_string());
            }
        }
        // Ring 0 is always full access.
        rings.insert(0, RingConfig { enabled: true });
        owned.rings = Some(rings);

        let mut state = VmState {
            memory,
            pc: 0,
            trapped: false,
            trap_reason: String::new(),
            image_init_warnings: warnings,
            config: owned,
            value_stack: ValueStack::new(),
            instruction_table: InstructionTable::standard(),
        };

        if let Some(start) = state.config.start_override {
            if start != 0 {
                state.pc = start;
            }
        }

        debug!(
            memory = state.memory.len(),
            strict = state.config.strict,
            warnings = state.image_init_warnings.len(),
            "engine built"
        );
        Ok(state)
    }

    /// Record a trap and return the matching step error.
    pub(crate) fn raise_trap(&mut self, reason: impl Into<String>) -> StepError {
        let reason = reason.into();
        self.trapped = true;
        self.trap_reason = reason.clone();
        StepError::Trap(reason)
    }

    /// Execute the instruction at the program counter.
    pub fn step(&mut self) -> Result<(), StepError> {
        if self.trapped {
            return Err(StepError::AlreadyTrapped(self.trap_reason.clone()));
        }
        if self.pc >= self.memory.len() as u64 {
            return Err(self.raise_trap("Program counter out of bounds"));
        }
        let opcode = self.memory[self.pc as usize];
        let Some(handler) = self.instruction_table.get(opcode) else {
            return Err(self.raise_trap(format!("Unknown instruction: 0x{opcode:02X}")));
        };
        handler(self)
    }

    /// Step until a trap is recorded.
    ///
    /// Step failures are echoed to the configured stderr handle as
    /// `Execution error: <error>` lines, except the `END` terminator, which
    /// is how a program normally finishes and is deliberately kept quiet.
    pub fn run(&mut self) {
        while !self.trapped {
            if let Err(error) = self.step() {
                if self.trap_reason == END_CALL_STACK_EMPTY {
                    continue;
                }
                if let Some(stderr) = &self.config.stderr {
                    if let Ok(mut sink) = stderr.lock() {
                        let _ = writeln!(sink, "Execution error: {error}");
                    }
                }
            }
        }
    }
}
