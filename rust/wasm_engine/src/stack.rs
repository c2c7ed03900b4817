//! Typed operand stack for the engine.
//!
//! Instructions communicate exclusively through this stack: constants push
//! tagged words, arithmetic pops its operands and pushes the result.  Every
//! entry carries its numeric tag so handlers can reject mistyped operands
//! before mutating anything.  Integer payloads are raw unsigned words; sign
//! interpretation is left to the individual instruction.

use std::fmt;

/// Discriminant for [`StackEntry`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    I32,
    F32,
    I64,
    F64,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryType::I32 => "i32",
            EntryType::F32 => "f32",
            EntryType::I64 => "i64",
            EntryType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A tagged numeric value held by the operand stack.
///
/// The float variants are reserved for the upcoming floating-point
/// instructions; nothing in the current instruction set produces them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StackEntry {
    I32(u32),
    F32(f32),
    I64(u64),
    F64(f64),
}

impl StackEntry {
    /// Tag describing which payload the entry carries.
    pub fn entry_type(&self) -> EntryType {
        match self {
            StackEntry::I32(_) => EntryType::I32,
            StackEntry::F32(_) => EntryType::F32,
            StackEntry::I64(_) => EntryType::I64,
            StackEntry::F64(_) => EntryType::F64,
        }
    }

    pub fn as_i32(&self) -> Option<u32> {
        match self {
            StackEntry::I32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<u64> {
        match self {
            StackEntry::I64(value) => Some(*value),
            _ => None,
        }
    }
}

/// LIFO sequence of tagged operands; the top is the most recently pushed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStack {
    entries: Vec<StackEntry>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the top of the stack.
    pub fn push(&mut self, entry: StackEntry) {
        self.entries.push(entry);
    }

    /// Push a raw 32-bit word tagged as I32.
    pub fn push_i32(&mut self, value: u32) {
        self.push(StackEntry::I32(value));
    }

    /// Push a raw 64-bit word tagged as I64.
    pub fn push_i64(&mut self, value: u64) {
        self.push(StackEntry::I64(value));
    }

    /// Remove and return the top entry, or `None` when the stack is empty.
    pub fn pop(&mut self) -> Option<StackEntry> {
        self.entries.pop()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_at_least(&self, count: usize) -> bool {
        self.entries.len() >= count
    }

    /// Inspect the top `count` entries without mutating the stack.
    ///
    /// Returns the entries in bottom-to-top order iff every one of them
    /// carries `entry_type`; instructions therefore consume operands in the
    /// order they were pushed.
    pub fn peek_top_if_all_of_type(
        &self,
        count: usize,
        entry_type: EntryType,
    ) -> Option<&[StackEntry]> {
        if !self.has_at_least(count) {
            return None;
        }
        let top = &self.entries[self.entries.len() - count..];
        if top.iter().all(|entry| entry.entry_type() == entry_type) {
            Some(top)
        } else {
            None
        }
    }

    /// Remove the top `count` entries.
    ///
    /// With `all_or_nothing` set, nothing is removed unless `count` entries
    /// are present.  Without it the stack is truncated by whatever is
    /// available; the call still reports failure when the stack was empty to
    /// begin with.
    pub fn drop_entries(&mut self, count: usize, all_or_nothing: bool) -> bool {
        if (all_or_nothing && !self.has_at_least(count)) || self.is_empty() {
            return false;
        }
        let keep = self.entries.len().saturating_sub(count);
        self.entries.truncate(keep);
        true
    }
}
