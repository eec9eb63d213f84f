//! Bytecode generation for Machine Dialect
//!
//! Lowers SSA MIR to register-based bytecode chunks: a function-wide
//! register allocator, a deduplicating constant pool, and an emitter with
//! relocatable jumps. The serialized module format and the opcode numbers
//! are ABI for the virtual machine and must stay stable.

pub mod allocator;
pub mod constpool;
pub mod emitter;
pub mod error;
pub mod isa;
pub mod objects;

pub use allocator::{RegisterAllocation, RegisterAllocator};
pub use constpool::{BytecodeConstant, ConstantPool};
pub use emitter::BytecodeGenerator;
pub use error::{CodegenError, CodegenResult};
pub use isa::Opcode;
pub use objects::{BytecodeModule, Chunk, ChunkType};
