//! Bytecode emitter
//!
//! Walks SSA MIR block by block in reverse post-order, emitting one
//! bytecode instruction per MIR instruction. Jumps emit a 32-bit zero
//! placeholder and are patched once every block offset is known; an
//! unresolved label at patch time means an earlier stage produced a
//! malformed function and is a hard error.

use crate::allocator::{RegisterAllocation, RegisterAllocator};
use crate::constpool::{BytecodeConstant, ConstantPool};
use crate::error::{CodegenError, CodegenResult};
use crate::isa::Opcode;
use crate::objects::{BytecodeModule, Chunk, ChunkType};
use log::{debug, trace};
use md_mir::instruction::{BinaryOperator, InstKind, MIRInstruction, UnaryOperator};
use md_mir::value::{Constant, ConstantValue, VarScope};
use md_mir::{MIRFunction, MIRModule, MIRValue};
use std::collections::HashMap;

/// Generates register bytecode from MIR
pub struct BytecodeGenerator {
    allocator: RegisterAllocator,
    bytecode: Vec<u8>,
    constants: ConstantPool,
    allocation: RegisterAllocation,
    block_offsets: HashMap<String, usize>,
    block_indices: HashMap<String, u16>,
    pending_jumps: Vec<(usize, String)>,
}

impl BytecodeGenerator {
    pub fn new() -> Self {
        Self {
            allocator: RegisterAllocator::new(),
            bytecode: Vec::new(),
            constants: ConstantPool::new(),
            allocation: RegisterAllocation::default(),
            block_offsets: HashMap::new(),
            block_indices: HashMap::new(),
            pending_jumps: Vec::new(),
        }
    }

    /// Compile a whole module; the main function becomes the MAIN chunk
    /// and is emitted first
    pub fn generate(&mut self, module: &MIRModule) -> CodegenResult<BytecodeModule> {
        let main_name = module
            .main_function
            .clone()
            .or_else(|| module.functions.contains_key("main").then(|| "main".to_string()));

        let mut bytecode_module = BytecodeModule::new();

        if let Some(main_name) = &main_name {
            if let Some(main) = module.get_function(main_name) {
                bytecode_module.add_chunk(self.generate_function(main, ChunkType::Main)?);
            }
        }
        for (name, function) in &module.functions {
            if Some(name) == main_name.as_ref() {
                continue;
            }
            bytecode_module.add_chunk(self.generate_function(function, ChunkType::Function)?);
        }

        Ok(bytecode_module)
    }

    /// Compile one function into a chunk
    pub fn generate_function(
        &mut self,
        function: &MIRFunction,
        chunk_type: ChunkType,
    ) -> CodegenResult<Chunk> {
        // Per-function state resets completely.
        self.bytecode = Vec::new();
        self.constants = ConstantPool::new();
        self.block_offsets = HashMap::new();
        self.block_indices = HashMap::new();
        self.pending_jumps = Vec::new();
        self.allocation = self.allocator.allocate_function(function)?;

        if function.cfg.entry_label().is_none() {
            return Err(CodegenError::MissingEntryBlock(function.name.clone()));
        }

        // Emission order is reverse post-order: entry first, stable, and
        // unreachable blocks simply never emit.
        let order = function.cfg.reverse_post_order();
        for (index, label) in order.iter().enumerate() {
            self.block_indices.insert(label.clone(), index as u16);
        }

        for label in &order {
            let Some(block) = function.cfg.get_block(label) else {
                continue;
            };
            self.block_offsets.insert(label.clone(), self.bytecode.len());
            trace!(
                "emit: block '{}' of '{}' at offset {}",
                label,
                function.name,
                self.bytecode.len()
            );
            for phi in &block.phi_nodes {
                self.emit_instruction(phi)?;
            }
            for inst in &block.instructions {
                self.emit_instruction(inst)?;
            }
        }

        self.resolve_jumps()?;

        let chunk = Chunk {
            name: function.name.clone(),
            chunk_type,
            bytecode: std::mem::take(&mut self.bytecode),
            constants: std::mem::take(&mut self.constants),
            num_locals: self.allocation.registers_used() as u16,
            num_params: function.params.len() as u8,
        };
        debug!(
            "emit: function '{}' -> {} bytes, {} constants, {} registers",
            function.name,
            chunk.bytecode.len(),
            chunk.constants.len(),
            chunk.num_locals
        );
        Ok(chunk)
    }

    fn emit_instruction(&mut self, inst: &MIRInstruction) -> CodegenResult<()> {
        match &inst.kind {
            InstKind::LoadConst { dest, constant } => {
                let dst = self.register(dest)?;
                let idx = self.intern(constant)?;
                self.emit_op(Opcode::LoadConstR);
                self.emit_u8(dst);
                self.emit_u16(idx);
            }
            InstKind::Copy { dest, source } => {
                let dst = self.register(dest)?;
                if let Some(constant) = source.as_constant() {
                    let idx = self.intern(constant)?;
                    self.emit_op(Opcode::LoadConstR);
                    self.emit_u8(dst);
                    self.emit_u16(idx);
                } else {
                    let src = self.register(source)?;
                    self.emit_op(Opcode::MoveR);
                    self.emit_u8(dst);
                    self.emit_u8(src);
                }
            }
            InstKind::LoadVar { dest, var } => {
                let dst = self.register(dest)?;
                if var.scope == VarScope::Global {
                    let name_idx = self.constants.add_string(var.name.clone())?;
                    self.emit_op(Opcode::LoadGlobalR);
                    self.emit_u8(dst);
                    self.emit_u16(name_idx);
                } else {
                    let src = self.register(&MIRValue::Variable(var.clone()))?;
                    self.emit_op(Opcode::MoveR);
                    self.emit_u8(dst);
                    self.emit_u8(src);
                }
            }
            InstKind::StoreVar { var, source } => {
                if var.scope == VarScope::Global {
                    let src = self.register_or_materialize(source)?;
                    let name_idx = self.constants.add_string(var.name.clone())?;
                    self.emit_op(Opcode::StoreGlobalR);
                    self.emit_u8(src);
                    self.emit_u16(name_idx);
                } else {
                    let dst = self.register(&MIRValue::Variable(var.clone()))?;
                    if let Some(constant) = source.as_constant() {
                        let idx = self.intern(constant)?;
                        self.emit_op(Opcode::LoadConstR);
                        self.emit_u8(dst);
                        self.emit_u16(idx);
                    } else {
                        let src = self.register(source)?;
                        self.emit_op(Opcode::MoveR);
                        self.emit_u8(dst);
                        self.emit_u8(src);
                    }
                }
            }
            InstKind::BinaryOp {
                dest,
                op,
                left,
                right,
            } => {
                let l = self.register_or_materialize(left)?;
                let r = self.register_or_materialize(right)?;
                let dst = self.register(dest)?;
                self.emit_op(binary_opcode(*op));
                self.emit_u8(dst);
                self.emit_u8(l);
                self.emit_u8(r);
            }
            InstKind::UnaryOp { dest, op, operand } => {
                let src = self.register_or_materialize(operand)?;
                let dst = self.register(dest)?;
                self.emit_op(match op {
                    UnaryOperator::Neg => Opcode::NegR,
                    UnaryOperator::Not => Opcode::NotR,
                    UnaryOperator::BitNot => Opcode::BitNotR,
                });
                self.emit_u8(dst);
                self.emit_u8(src);
            }
            InstKind::Select {
                dest,
                condition,
                if_true,
                if_false,
            } => {
                let cond = self.register_or_materialize(condition)?;
                let t = self.register_or_materialize(if_true)?;
                let f = self.register_or_materialize(if_false)?;
                let dst = self.register(dest)?;
                self.emit_op(Opcode::SelectR);
                self.emit_u8(dst);
                self.emit_u8(cond);
                self.emit_u8(t);
                self.emit_u8(f);
            }
            InstKind::Jump { target } => {
                self.emit_op(Opcode::JumpR);
                self.pending_jumps.push((self.bytecode.len(), target.clone()));
                self.emit_i32(0);
            }
            InstKind::CondJump {
                condition,
                true_target,
                false_target,
            } => {
                let cond = self.register_or_materialize(condition)?;
                self.emit_op(Opcode::JumpIfR);
                self.emit_u8(cond);
                self.pending_jumps
                    .push((self.bytecode.len(), true_target.clone()));
                self.emit_i32(0);

                // The canonical branch shape: conditional to the true
                // target, unconditional to the false target.
                if let Some(false_target) = false_target {
                    self.emit_op(Opcode::JumpR);
                    self.pending_jumps
                        .push((self.bytecode.len(), false_target.clone()));
                    self.emit_i32(0);
                }
            }
            InstKind::Phi { dest, incoming } => {
                let sources: Vec<(u8, u16)> = {
                    let mut sources = Vec::new();
                    for (value, pred) in incoming {
                        // entries from blocks that never emit cannot be taken
                        let Some(block_id) = self.block_indices.get(pred).copied() else {
                            continue;
                        };
                        let src = self.register_or_materialize(value)?;
                        sources.push((src, block_id));
                    }
                    sources
                };
                let dst = self.register(dest)?;
                self.emit_op(Opcode::PhiR);
                self.emit_u8(dst);
                self.emit_u8(sources.len() as u8);
                for (src, block_id) in sources {
                    self.emit_u8(src);
                    self.emit_u16(block_id);
                }
            }
            InstKind::Call { dest, func, args } => {
                let func_reg = self.register(&MIRValue::FunctionRef(func.clone()))?;
                let mut arg_regs = Vec::with_capacity(args.len());
                for arg in args {
                    arg_regs.push(self.register_or_materialize(arg)?);
                }
                let dst = match dest {
                    Some(dest) => self.register(dest)?,
                    None => 0,
                };
                self.emit_op(Opcode::CallR);
                self.emit_u8(func_reg);
                self.emit_u8(dst);
                self.emit_u8(arg_regs.len() as u8);
                for reg in arg_regs {
                    self.emit_u8(reg);
                }
            }
            InstKind::Return { value } => match value {
                Some(value) => {
                    let src = self.register_or_materialize(value)?;
                    self.emit_op(Opcode::ReturnR);
                    self.emit_u8(1);
                    self.emit_u8(src);
                }
                None => {
                    self.emit_op(Opcode::ReturnR);
                    self.emit_u8(0);
                }
            },
            InstKind::Print { value } => {
                let src = self.register_or_materialize(value)?;
                self.emit_op(Opcode::DebugPrint);
                self.emit_u8(src);
            }
            InstKind::Assert { condition, message } => {
                let reg = self.register_or_materialize(condition)?;
                let msg = message.as_deref().unwrap_or("Assertion failed");
                let msg_idx = self.constants.add_string(msg)?;
                self.emit_op(Opcode::AssertR);
                self.emit_u8(reg);
                self.emit_u8(0); // truthiness assertion
                self.emit_u16(msg_idx);
            }
            InstKind::ScopeBegin { scope_id } => {
                self.emit_op(Opcode::ScopeEnterR);
                self.emit_u16(*scope_id);
            }
            InstKind::ScopeEnd { scope_id } => {
                self.emit_op(Opcode::ScopeExitR);
                self.emit_u16(*scope_id);
            }
            InstKind::ArrayCreate { dest, size } => {
                let len = self.register_or_materialize(size)?;
                let dst = self.register(dest)?;
                self.emit_op(Opcode::NewListR);
                self.emit_u8(dst);
                self.emit_u8(len);
            }
            InstKind::ArrayGet { dest, array, index } => {
                let arr = self.register_or_materialize(array)?;
                let idx = self.register_or_materialize(index)?;
                let dst = self.register(dest)?;
                self.emit_op(Opcode::ListGetR);
                self.emit_u8(dst);
                self.emit_u8(arr);
                self.emit_u8(idx);
            }
            InstKind::ArraySet {
                array,
                index,
                value,
            } => {
                let arr = self.register_or_materialize(array)?;
                let idx = self.register_or_materialize(index)?;
                let src = self.register_or_materialize(value)?;
                self.emit_op(Opcode::ListSetR);
                self.emit_u8(arr);
                self.emit_u8(idx);
                self.emit_u8(src);
            }
            InstKind::ArrayAppend { array, value } => {
                let arr = self.register_or_materialize(array)?;
                let src = self.register_or_materialize(value)?;
                self.emit_op(Opcode::ListAppendR);
                self.emit_u8(arr);
                self.emit_u8(src);
            }
            InstKind::ArrayLength { dest, array } => {
                let arr = self.register_or_materialize(array)?;
                let dst = self.register(dest)?;
                self.emit_op(Opcode::ListLenR);
                self.emit_u8(dst);
                self.emit_u8(arr);
            }
            InstKind::GetAttr { dest, object, attr } => {
                let obj = self.register_or_materialize(object)?;
                let dst = self.register(dest)?;
                let name_idx = self.constants.add_string(attr.clone())?;
                self.emit_op(Opcode::GetAttrR);
                self.emit_u8(dst);
                self.emit_u8(obj);
                self.emit_u16(name_idx);
            }
            InstKind::SetAttr {
                object,
                attr,
                value,
            } => {
                let obj = self.register_or_materialize(object)?;
                let src = self.register_or_materialize(value)?;
                let name_idx = self.constants.add_string(attr.clone())?;
                self.emit_op(Opcode::SetAttrR);
                self.emit_u8(obj);
                self.emit_u16(name_idx);
                self.emit_u8(src);
            }
            // No-ops and discards cost nothing in a register machine.
            InstKind::Nop | InstKind::Pop { .. } => {}
        }
        Ok(())
    }

    /// Register of an allocated value; constants are rejected here
    fn register(&mut self, value: &MIRValue) -> CodegenResult<u8> {
        self.allocation
            .register_of(value)
            .ok_or_else(|| CodegenError::UnallocatedValue(value.to_string()))
    }

    /// Register of a value, materializing constants into scratch registers
    fn register_or_materialize(&mut self, value: &MIRValue) -> CodegenResult<u8> {
        if let Some(constant) = value.as_constant() {
            let reg = self.allocation.claim_scratch()?;
            let idx = self.intern(constant)?;
            self.emit_op(Opcode::LoadConstR);
            self.emit_u8(reg);
            self.emit_u16(idx);
            return Ok(reg);
        }
        self.register(value)
    }

    fn intern(&mut self, constant: &Constant) -> CodegenResult<u16> {
        let bc = match &constant.value {
            ConstantValue::Int(n) => BytecodeConstant::Int(*n),
            ConstantValue::Float(f) => BytecodeConstant::Float(*f),
            ConstantValue::Str(s) => BytecodeConstant::Str(s.clone()),
            ConstantValue::Bool(b) => BytecodeConstant::Bool(*b),
            ConstantValue::Empty => BytecodeConstant::Empty,
        };
        self.constants.add(bc)
    }

    /// Patch every recorded placeholder with its relative offset
    fn resolve_jumps(&mut self) -> CodegenResult<()> {
        for (position, label) in &self.pending_jumps {
            let target = self
                .block_offsets
                .get(label)
                .ok_or_else(|| CodegenError::UnresolvedLabel(label.clone()))?;
            // Offsets are relative to the byte after the 4-byte field.
            let offset = *target as i64 - (*position as i64 + 4);
            let bytes = (offset as i32).to_le_bytes();
            self.bytecode[*position..position + 4].copy_from_slice(&bytes);
        }
        Ok(())
    }

    fn emit_op(&mut self, opcode: Opcode) {
        self.bytecode.push(opcode.as_byte());
    }

    fn emit_u8(&mut self, value: u8) {
        self.bytecode.push(value);
    }

    fn emit_u16(&mut self, value: u16) {
        self.bytecode.extend_from_slice(&value.to_le_bytes());
    }

    fn emit_i32(&mut self, value: i32) {
        self.bytecode.extend_from_slice(&value.to_le_bytes());
    }
}

impl Default for BytecodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_opcode(op: BinaryOperator) -> Opcode {
    match op {
        BinaryOperator::Add => Opcode::AddR,
        BinaryOperator::Sub => Opcode::SubR,
        BinaryOperator::Mul => Opcode::MulR,
        BinaryOperator::Div => Opcode::DivR,
        BinaryOperator::Mod => Opcode::ModR,
        BinaryOperator::Pow => Opcode::PowR,
        BinaryOperator::And => Opcode::AndR,
        BinaryOperator::Or => Opcode::OrR,
        BinaryOperator::Eq => Opcode::EqR,
        BinaryOperator::Neq => Opcode::NeqR,
        BinaryOperator::StrictEq => Opcode::StrictEqR,
        BinaryOperator::StrictNeq => Opcode::StrictNeqR,
        BinaryOperator::Lt => Opcode::LtR,
        BinaryOperator::Gt => Opcode::GtR,
        BinaryOperator::Lte => Opcode::LteR,
        BinaryOperator::Gte => Opcode::GteR,
        BinaryOperator::BitAnd => Opcode::BitAndR,
        BinaryOperator::BitOr => Opcode::BitOrR,
        BinaryOperator::BitXor => Opcode::BitXorR,
        BinaryOperator::Shl => Opcode::ShlR,
        BinaryOperator::Shr => Opcode::ShrR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_mir::value::Temp;
    use md_mir::{BasicBlock, MIRType};
    use pretty_assertions::assert_eq;

    fn temp(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Int))
    }

    fn emit(function: &MIRFunction) -> Chunk {
        BytecodeGenerator::new()
            .generate_function(function, ChunkType::Function)
            .unwrap()
    }

    #[test]
    fn test_bare_return_chunk() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Empty);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        function.cfg.add_block(entry);

        let chunk = emit(&function);
        assert_eq!(chunk.bytecode, vec![Opcode::ReturnR.as_byte(), 0]);
        assert!(chunk.constants.is_empty());
    }

    #[test]
    fn test_load_const_then_return() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::LoadConst {
            dest: temp(0),
            constant: Constant::int(5),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(0)),
        }));
        function.cfg.add_block(entry);

        let chunk = emit(&function);
        // LoadConstR r0, #0; ReturnR 1, r0
        assert_eq!(
            chunk.bytecode,
            vec![
                Opcode::LoadConstR.as_byte(),
                0,
                0,
                0,
                Opcode::ReturnR.as_byte(),
                1,
                0,
            ]
        );
        assert_eq!(chunk.constants.get(0), Some(&BytecodeConstant::Int(5)));
    }

    #[test]
    fn test_jump_to_self_is_minus_five() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Empty);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::Jump {
            target: "entry".to_string(),
        }));
        function.cfg.add_block(entry);
        function.cfg.connect("entry", "entry");

        let chunk = emit(&function);
        assert_eq!(chunk.bytecode[0], Opcode::JumpR.as_byte());
        let offset = i32::from_le_bytes(chunk.bytecode[1..5].try_into().unwrap());
        assert_eq!(offset, -5);
    }

    #[test]
    fn test_jump_to_next_instruction_is_zero() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Empty);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::Jump {
            target: "next".to_string(),
        }));
        let mut next = BasicBlock::new("next");
        next.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        function.cfg.add_block(entry);
        function.cfg.add_block(next);
        function.cfg.connect("entry", "next");

        let chunk = emit(&function);
        let offset = i32::from_le_bytes(chunk.bytecode[1..5].try_into().unwrap());
        assert_eq!(offset, 0);
    }

    #[test]
    fn test_conditional_emits_branch_then_jump() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Empty);
        for label in ["entry", "then", "else"] {
            function.cfg.add_block(BasicBlock::new(label));
        }
        function.cfg.connect("entry", "then");
        function.cfg.connect("entry", "else");
        function
            .cfg
            .get_block_mut("entry")
            .unwrap()
            .add_instruction(MIRInstruction::new(InstKind::CondJump {
                condition: temp(0),
                true_target: "then".to_string(),
                false_target: Some("else".to_string()),
            }));
        for label in ["then", "else"] {
            function
                .cfg
                .get_block_mut(label)
                .unwrap()
                .add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        }
        // t0 must exist somewhere; treat it as an incoming register value
        function
            .cfg
            .get_block_mut("entry")
            .unwrap()
            .instructions
            .insert(
                0,
                MIRInstruction::new(InstKind::LoadConst {
                    dest: temp(0),
                    constant: Constant::bool(true),
                }),
            );

        let chunk = emit(&function);
        // LoadConstR(4) + JumpIfR(6) + JumpR(5) + ReturnR(2) + ReturnR(2)
        assert_eq!(chunk.bytecode.len(), 19);
        assert_eq!(chunk.bytecode[4], Opcode::JumpIfR.as_byte());
        assert_eq!(chunk.bytecode[10], Opcode::JumpR.as_byte());

        // JumpIfR offset: placeholder at 6, targets "then" at 15
        let true_offset = i32::from_le_bytes(chunk.bytecode[6..10].try_into().unwrap());
        assert_eq!(true_offset, 5);
        // JumpR offset: placeholder at 11, targets "else" at 17
        let false_offset = i32::from_le_bytes(chunk.bytecode[11..15].try_into().unwrap());
        assert_eq!(false_offset, 2);
    }

    #[test]
    fn test_constant_operands_materialize_into_scratch() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(0),
            op: BinaryOperator::Add,
            left: MIRValue::Constant(Constant::int(2)),
            right: MIRValue::Constant(Constant::int(3)),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(0)),
        }));
        function.cfg.add_block(entry);

        let chunk = emit(&function);
        // two LoadConstR for the operands, the AddR, then the return
        assert_eq!(chunk.bytecode[0], Opcode::LoadConstR.as_byte());
        assert_eq!(chunk.bytecode[4], Opcode::LoadConstR.as_byte());
        assert_eq!(chunk.bytecode[8], Opcode::AddR.as_byte());
        assert_eq!(chunk.constants.len(), 2);
        // dest register plus two scratch registers
        assert_eq!(chunk.num_locals, 3);
    }

    #[test]
    fn test_phi_block_ids_are_emission_indices() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        for label in ["entry", "a", "b", "join"] {
            function.cfg.add_block(BasicBlock::new(label));
        }
        function.cfg.connect("entry", "a");
        function.cfg.connect("entry", "b");
        function.cfg.connect("a", "join");
        function.cfg.connect("b", "join");

        function
            .cfg
            .get_block_mut("entry")
            .unwrap()
            .add_instruction(MIRInstruction::new(InstKind::CondJump {
                condition: MIRValue::Constant(Constant::bool(true)),
                true_target: "a".to_string(),
                false_target: Some("b".to_string()),
            }));
        for (label, id) in [("a", 0u32), ("b", 1u32)] {
            let block = function.cfg.get_block_mut(label).unwrap();
            block.add_instruction(MIRInstruction::new(InstKind::LoadConst {
                dest: temp(id),
                constant: Constant::int(i64::from(id)),
            }));
            block.add_instruction(MIRInstruction::new(InstKind::Jump {
                target: "join".to_string(),
            }));
        }
        let join = function.cfg.get_block_mut("join").unwrap();
        join.add_instruction(MIRInstruction::new(InstKind::Phi {
            dest: temp(2),
            incoming: vec![(temp(0), "a".to_string()), (temp(1), "b".to_string())],
        }));
        join.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(2)),
        }));

        let chunk = emit(&function);
        let phi_at = chunk
            .bytecode
            .iter()
            .position(|b| *b == Opcode::PhiR.as_byte())
            .expect("phi emitted");
        let n = chunk.bytecode[phi_at + 2];
        assert_eq!(n, 2);

        // entries carry the dense emission indices of 'a' and 'b'
        let first_block_id =
            u16::from_le_bytes(chunk.bytecode[phi_at + 4..phi_at + 6].try_into().unwrap());
        let second_block_id =
            u16::from_le_bytes(chunk.bytecode[phi_at + 7..phi_at + 9].try_into().unwrap());
        let ids = [first_block_id, second_block_id];
        assert!(ids.contains(&1) && ids.contains(&2));
    }

    #[test]
    fn test_unresolved_label_is_hard_error() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Empty);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::Jump {
            target: "nowhere".to_string(),
        }));
        function.cfg.add_block(entry);

        let result = BytecodeGenerator::new().generate_function(&function, ChunkType::Function);
        assert_eq!(
            result,
            Err(CodegenError::UnresolvedLabel("nowhere".to_string()))
        );
    }

    #[test]
    fn test_module_puts_main_chunk_first() {
        let mut module = MIRModule::new("m");
        let mut helper = MIRFunction::new("helper", vec![], MIRType::Empty);
        let mut block = BasicBlock::new("entry");
        block.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        helper.cfg.add_block(block);
        module.add_function(helper);

        let mut main = MIRFunction::new("main", vec![], MIRType::Empty);
        let mut block = BasicBlock::new("entry");
        block.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        main.cfg.add_block(block);
        module.add_function(main);
        module.set_main_function("main");

        let bytecode_module = BytecodeGenerator::new().generate(&module).unwrap();
        assert_eq!(bytecode_module.chunks[0].name, "main");
        assert_eq!(bytecode_module.chunks[0].chunk_type, ChunkType::Main);
        assert_eq!(bytecode_module.chunks[1].chunk_type, ChunkType::Function);
    }
}
