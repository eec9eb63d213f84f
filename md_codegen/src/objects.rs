//! Bytecode container objects and their wire format
//!
//! A `Chunk` is one compiled function: raw bytecode, its constant pool,
//! and frame metadata. A `BytecodeModule` aggregates chunks and serializes
//! to the `MDBC` stream consumed by the virtual machine. All multi-byte
//! fields are little-endian.

use crate::constpool::{BytecodeConstant, ConstantPool};
use crate::error::{CodegenError, CodegenResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic bytes opening a serialized module
pub const MAGIC: &[u8; 4] = b"MDBC";
/// Current wire format version
pub const FORMAT_VERSION: u32 = 1;

/// Whether a chunk is the program entry or an ordinary function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkType {
    Main,
    Function,
}

impl ChunkType {
    pub fn as_byte(self) -> u8 {
        match self {
            ChunkType::Main => 0,
            ChunkType::Function => 1,
        }
    }

    pub fn from_byte(byte: u8) -> CodegenResult<Self> {
        match byte {
            0 => Ok(ChunkType::Main),
            1 => Ok(ChunkType::Function),
            other => Err(CodegenError::InvalidChunkType(other)),
        }
    }
}

/// One compiled function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub name: String,
    pub chunk_type: ChunkType,
    pub bytecode: Vec<u8>,
    pub constants: ConstantPool,
    pub num_locals: u16,
    pub num_params: u8,
}

impl Chunk {
    pub fn new(name: impl Into<String>, chunk_type: ChunkType) -> Self {
        Self {
            name: name.into(),
            chunk_type,
            bytecode: Vec::new(),
            constants: ConstantPool::new(),
            num_locals: 0,
            num_params: 0,
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chunk {} ({:?}, {} bytes, {} constants, {} locals, {} params)",
            self.name,
            self.chunk_type,
            self.bytecode.len(),
            self.constants.len(),
            self.num_locals,
            self.num_params
        )
    }
}

/// A full compiled module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BytecodeModule {
    pub chunks: Vec<Chunk>,
}

impl BytecodeModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.chunks.push(chunk);
    }

    pub fn main_chunk(&self) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.chunk_type == ChunkType::Main)
    }

    pub fn get_chunk(&self, name: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.name == name)
    }

    /// Serialize to the on-wire byte stream
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());

        for chunk in &self.chunks {
            let name = chunk.name.as_bytes();
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(name);
            out.push(chunk.chunk_type.as_byte());
            out.push(chunk.num_params);
            out.extend_from_slice(&chunk.num_locals.to_le_bytes());

            out.extend_from_slice(&(chunk.constants.len() as u16).to_le_bytes());
            for constant in chunk.constants.constants() {
                out.push(constant.type_tag());
                match constant {
                    BytecodeConstant::Int(n) => out.extend_from_slice(&n.to_le_bytes()),
                    BytecodeConstant::Float(f) => out.extend_from_slice(&f.to_le_bytes()),
                    BytecodeConstant::Str(s) => {
                        out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                        out.extend_from_slice(s.as_bytes());
                    }
                    BytecodeConstant::Bool(b) => out.push(u8::from(*b)),
                    BytecodeConstant::Empty => {}
                }
            }

            out.extend_from_slice(&(chunk.bytecode.len() as u32).to_le_bytes());
            out.extend_from_slice(&chunk.bytecode);
        }

        out
    }

    /// Parse a serialized module back into memory
    pub fn deserialize(bytes: &[u8]) -> CodegenResult<Self> {
        let mut reader = Reader::new(bytes);

        if reader.take(4)? != MAGIC {
            return Err(CodegenError::BadMagic);
        }
        let version = reader.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(CodegenError::UnsupportedVersion(version));
        }

        let chunk_count = reader.read_u32()?;
        let mut module = BytecodeModule::new();
        for _ in 0..chunk_count {
            let name_len = reader.read_u16()? as usize;
            let name = std::str::from_utf8(reader.take(name_len)?)
                .map_err(|_| CodegenError::InvalidUtf8)?
                .to_string();
            let chunk_type = ChunkType::from_byte(reader.read_u8()?)?;
            let num_params = reader.read_u8()?;
            let num_locals = reader.read_u16()?;

            let const_count = reader.read_u16()? as usize;
            let mut constants = Vec::with_capacity(const_count);
            for _ in 0..const_count {
                let tag = reader.read_u8()?;
                let constant = match tag {
                    1 => BytecodeConstant::Int(i64::from_le_bytes(
                        reader.take(8)?.try_into().expect("8 bytes"),
                    )),
                    2 => BytecodeConstant::Float(f64::from_le_bytes(
                        reader.take(8)?.try_into().expect("8 bytes"),
                    )),
                    3 => {
                        let len = reader.read_u32()? as usize;
                        let s = std::str::from_utf8(reader.take(len)?)
                            .map_err(|_| CodegenError::InvalidUtf8)?;
                        BytecodeConstant::Str(s.to_string())
                    }
                    4 => BytecodeConstant::Bool(reader.read_u8()? != 0),
                    5 => BytecodeConstant::Empty,
                    other => return Err(CodegenError::InvalidConstantTag(other)),
                };
                constants.push(constant);
            }

            let bytecode_len = reader.read_u32()? as usize;
            let bytecode = reader.take(bytecode_len)?.to_vec();

            module.add_chunk(Chunk {
                name,
                chunk_type,
                bytecode,
                constants: ConstantPool::from_constants(constants),
                num_locals,
                num_params,
            });
        }

        Ok(module)
    }
}

/// Cursor over a serialized module
struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn take(&mut self, count: usize) -> CodegenResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodegenError::UnexpectedEof)?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CodegenResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> CodegenResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().expect("2 bytes")))
    }

    fn read_u32(&mut self) -> CodegenResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }
}
