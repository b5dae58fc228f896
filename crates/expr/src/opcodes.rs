//! Opcode table — the wire contract.
//!
//! Families take their operand type in the low nibble (`0x00 | type` null
//! constants, `0x10 | type` typed constants, `0x20 | type` negated
//! constants, `0x30 | type` variable references). Unary, binary and test
//! operators are a fixed byte followed by a one-byte operand-type tag;
//! the logical operators on untyped booleans carry no tag. `CAST` packs
//! source and destination types into one byte, high nibble first.

// Family prefixes.
pub const NULL_PREFIX: u8 = 0x00;
pub const CONST_PREFIX: u8 = 0x10;
pub const CONST_N_PREFIX: u8 = 0x20;
pub const VAR_I_PREFIX: u8 = 0x30;

// `CONST_BOOL` carries no payload and always decodes `true`; `false` is
// spelled `CONST_N_BOOL`.
pub const CONST_BOOL: u8 = 0x11;
pub const CONST_N_BOOL: u8 = 0x21;

// Arithmetic, followed by an operand-type byte.
pub const POS: u8 = 0x81;
pub const NEG: u8 = 0x82;
pub const ADD: u8 = 0x83;
pub const SUB: u8 = 0x84;
pub const MUL: u8 = 0x85;
pub const DIV: u8 = 0x86;
pub const MOD: u8 = 0x87;

// Comparisons, followed by an operand-type byte.
pub const EQ: u8 = 0x91;
pub const GE: u8 = 0x92;
pub const GT: u8 = 0x93;
pub const LE: u8 = 0x94;
pub const LT: u8 = 0x95;
pub const NE: u8 = 0x96;

// Null / boolean tests, followed by an operand-type byte.
pub const IS_NULL: u8 = 0xA1;
pub const IS_TRUE: u8 = 0xA2;
pub const IS_FALSE: u8 = 0xA3;

// Logical operators on untyped booleans; no type byte.
pub const NOT: u8 = 0x51;
pub const AND: u8 = 0x52;
pub const OR: u8 = 0x53;

// High nibble: source type, low nibble: destination type.
pub const CAST: u8 = 0xF0;
