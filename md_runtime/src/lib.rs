//! Runtime semantics for Machine Dialect
//!
//! This crate defines the value model and operator semantics that every
//! execution path must agree on: the bytecode VM, a tree-walking
//! interpreter, and the compiler's own constant folder. The folder in
//! particular calls straight into [`ops`] so that folding a computation at
//! compile time can never produce a different answer than running it.

pub mod error;
pub mod ops;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use value::Value;
