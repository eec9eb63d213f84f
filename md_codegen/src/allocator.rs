//! Register allocation
//!
//! Function-wide first-touch allocation: parameters claim the lowest
//! registers, then definitions and uses are visited in reverse post-order
//! and each distinct value gets the next free register. Constants are not
//! allocated here; the emitter materializes them into scratch registers on
//! demand. Running out of the 256-register frame is a hard error.

use crate::error::{CodegenError, CodegenResult};
use md_mir::{MIRFunction, MIRValue};
use std::collections::HashMap;

/// Registers available per activation frame
pub const MAX_REGISTERS: usize = 256;

/// Result of allocating one function
#[derive(Debug, Clone, Default)]
pub struct RegisterAllocation {
    value_to_register: HashMap<MIRValue, u8>,
    next_register: usize,
}

impl RegisterAllocation {
    pub fn register_of(&self, value: &MIRValue) -> Option<u8> {
        self.value_to_register.get(value).copied()
    }

    /// Claim the next free register
    pub fn allocate(&mut self, value: MIRValue) -> CodegenResult<u8> {
        if let Some(register) = self.value_to_register.get(&value) {
            return Ok(*register);
        }
        let register = self.claim_scratch()?;
        self.value_to_register.insert(value, register);
        Ok(register)
    }

    /// Claim a register with no value attached (constant materialization)
    pub fn claim_scratch(&mut self) -> CodegenResult<u8> {
        if self.next_register >= MAX_REGISTERS {
            return Err(CodegenError::OutOfRegisters { max: MAX_REGISTERS });
        }
        let register = self.next_register as u8;
        self.next_register += 1;
        Ok(register)
    }

    /// Registers in use, scratch included
    pub fn registers_used(&self) -> usize {
        self.next_register
    }
}

/// Walks a function and assigns registers
#[derive(Debug, Default)]
pub struct RegisterAllocator;

impl RegisterAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn allocate_function(&self, function: &MIRFunction) -> CodegenResult<RegisterAllocation> {
        let mut allocation = RegisterAllocation::default();

        // Parameters first: the calling convention places argument k in
        // register k.
        for param in &function.params {
            allocation.allocate(MIRValue::Variable(param.with_version(1)))?;
        }

        for label in function.cfg.reverse_post_order() {
            let Some(block) = function.cfg.get_block(&label) else {
                continue;
            };
            for inst in block.all_instructions() {
                for def in inst.defs() {
                    allocation.allocate(def)?;
                }
                for used in inst.uses() {
                    if !used.is_constant() {
                        allocation.allocate(used)?;
                    }
                }
            }
        }

        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use md_mir::instruction::{BinaryOperator, InstKind, MIRInstruction};
    use md_mir::value::{Constant, Temp, Variable};
    use md_mir::{BasicBlock, MIRType};

    fn temp(id: u32) -> MIRValue {
        MIRValue::Temp(Temp::new(id, MIRType::Int))
    }

    #[test]
    fn test_params_take_low_registers() {
        let a = Variable::parameter("a", MIRType::Int);
        let b = Variable::parameter("b", MIRType::Int);
        let mut function = MIRFunction::new("f", vec![a.clone(), b.clone()], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::Return { value: None }));
        function.cfg.add_block(entry);

        let allocation = RegisterAllocator::new().allocate_function(&function).unwrap();
        assert_eq!(
            allocation.register_of(&MIRValue::Variable(a.with_version(1))),
            Some(0)
        );
        assert_eq!(
            allocation.register_of(&MIRValue::Variable(b.with_version(1))),
            Some(1)
        );
    }

    #[test]
    fn test_each_value_gets_one_register() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::LoadConst {
            dest: temp(0),
            constant: Constant::int(2),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(1),
            op: BinaryOperator::Add,
            left: temp(0),
            right: temp(0),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(1)),
        }));
        function.cfg.add_block(entry);

        let allocation = RegisterAllocator::new().allocate_function(&function).unwrap();
        let r0 = allocation.register_of(&temp(0)).unwrap();
        let r1 = allocation.register_of(&temp(1)).unwrap();
        assert_ne!(r0, r1);
        assert_eq!(allocation.registers_used(), 2);
    }

    #[test]
    fn test_constants_are_not_allocated() {
        let mut function = MIRFunction::new("f", vec![], MIRType::Int);
        let mut entry = BasicBlock::new("entry");
        entry.add_instruction(MIRInstruction::new(InstKind::BinaryOp {
            dest: temp(0),
            op: BinaryOperator::Add,
            left: MIRValue::Constant(Constant::int(1)),
            right: MIRValue::Constant(Constant::int(2)),
        }));
        entry.add_instruction(MIRInstruction::new(InstKind::Return {
            value: Some(temp(0)),
        }));
        function.cfg.add_block(entry);

        let allocation = RegisterAllocator::new().allocate_function(&function).unwrap();
        assert_eq!(allocation.registers_used(), 1);
        assert_eq!(
            allocation.register_of(&MIRValue::Constant(Constant::int(1))),
            None
        );
    }

    #[test]
    fn test_register_exhaustion_is_hard_error() {
        let mut allocation = RegisterAllocation::default();
        for _ in 0..MAX_REGISTERS {
            allocation.claim_scratch().unwrap();
        }
        assert!(matches!(
            allocation.claim_scratch(),
            Err(CodegenError::OutOfRegisters { .. })
        ));
    }
}
