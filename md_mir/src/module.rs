//! MIR module representation

use crate::function::MIRFunction;
use crate::value::{Constant, Variable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A compilation unit: functions, globals, and a shared constant pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MIRModule {
    pub name: String,
    pub functions: IndexMap<String, MIRFunction>,
    pub globals: IndexMap<String, Variable>,
    pub constants: Vec<Constant>,
    pub main_function: Option<String>,
}

impl MIRModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: IndexMap::new(),
            globals: IndexMap::new(),
            constants: Vec::new(),
            main_function: None,
        }
    }

    pub fn add_function(&mut self, function: MIRFunction) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn get_function(&self, name: &str) -> Option<&MIRFunction> {
        self.functions.get(name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut MIRFunction> {
        self.functions.get_mut(name)
    }

    pub fn set_main_function(&mut self, name: impl Into<String>) {
        self.main_function = Some(name.into());
    }

    pub fn add_global(&mut self, var: Variable) {
        self.globals.insert(var.name.clone(), var);
    }

    /// Intern a constant, returning the index of an equal existing entry
    /// when there is one
    pub fn intern_constant(&mut self, constant: Constant) -> usize {
        if let Some(index) = self.constants.iter().position(|c| c == &constant) {
            return index;
        }
        self.constants.push(constant);
        self.constants.len() - 1
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

impl fmt::Display for MIRModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        if let Some(main) = &self.main_function {
            writeln!(f, "; main: {}", main)?;
        }
        for global in self.globals.values() {
            writeln!(f, "global {}: {}", global.name, global.ty)?;
        }
        for function in self.functions.values() {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MIRType;
    use proptest::prelude::*;

    #[test]
    fn test_module_functions() {
        let mut module = MIRModule::new("test");
        module.add_function(MIRFunction::new("main", vec![], MIRType::Empty));
        module.add_function(MIRFunction::new("helper", vec![], MIRType::Int));
        module.set_main_function("main");

        assert!(module.get_function("main").is_some());
        assert!(module.get_function("absent").is_none());
        assert_eq!(module.function_names(), vec!["main", "helper"]);
        assert_eq!(module.main_function.as_deref(), Some("main"));
    }

    #[test]
    fn test_constant_interning_dedups() {
        let mut module = MIRModule::new("test");
        let a = module.intern_constant(Constant::int(42));
        let b = module.intern_constant(Constant::string("x"));
        let c = module.intern_constant(Constant::int(42));

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(module.constants.len(), 2);
    }

    #[test]
    fn test_globals() {
        let mut module = MIRModule::new("test");
        module.add_global(Variable::global("config", MIRType::String));
        assert!(module.globals.contains_key("config"));
    }

    #[test]
    fn test_module_serde_round_trip() {
        let mut module = MIRModule::new("test");
        module.add_function(MIRFunction::new("main", vec![], MIRType::Empty));
        module.intern_constant(Constant::string("hello"));
        module.set_main_function("main");

        let json = serde_json::to_string(&module).unwrap();
        let parsed: MIRModule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, module);
    }

    proptest! {
        /// Interning is idempotent: the same constant always resolves to
        /// the same index and only novel constants grow the pool.
        #[test]
        fn prop_intern_dedup(values in proptest::collection::vec(-100i64..100, 1..40)) {
            let mut module = MIRModule::new("p");
            for value in values {
                let first = module.intern_constant(Constant::int(value));
                let len_after_first = module.constants.len();
                let second = module.intern_constant(Constant::int(value));
                prop_assert_eq!(first, second);
                prop_assert_eq!(module.constants.len(), len_after_first);
            }
        }
    }
}
