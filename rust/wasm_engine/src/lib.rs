//! Forge WASM engine: a stack-machine bytecode interpreter with a
//! configurable linear-memory image loader.

pub mod config;
pub mod image;
pub mod instructions;
pub mod numeric_i32;
pub mod numeric_i64;
pub mod stack;
pub mod vm;
