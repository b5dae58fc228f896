//! Expression bytecode VM for pushed-down filters.
//!
//! Scan and search requests may carry a filter as a byte-coded
//! reverse-Polish program. This crate decodes such programs into a typed
//! operator vector and evaluates them against per-row tuples on a small
//! stack machine.
//!
//! The wire format is a stream of single-byte opcodes, some followed by
//! inline operands (see [`opcodes`]). Decoding is strictly forward-only:
//! an unknown opcode or operand-type tag fails the whole program with a
//! hex dump of the offending bytes. Evaluation never performs I/O.

pub mod eval;
pub mod opcodes;
pub mod program;
pub mod types;

pub use eval::Evaluator;
pub use program::{OperatorVector, ProgramBuilder};
pub use types::{Operand, OperandType};
