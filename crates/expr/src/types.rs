//! Typed operands.
//!
//! The VM works over a closed set of seven primitive types, each carried
//! in a nullable slot. Decimal values are transported as decimal strings;
//! the engine stores and compares them but defines no arithmetic on them.

/// Operand-type tags as they appear on the wire (low nibble of the
/// constant/variable opcode families, trailing byte of typed operators).
///
/// `CONST_N_BOOL` is pinned to `0x21` by the wire contract, which fixes
/// BOOL at 0x01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperandType {
    Bool = 0x01,
    Int32 = 0x02,
    Int64 = 0x03,
    Float = 0x04,
    Double = 0x05,
    Decimal = 0x06,
    String = 0x07,
}

impl OperandType {
    pub fn from_byte(b: u8) -> Option<OperandType> {
        match b {
            0x01 => Some(OperandType::Bool),
            0x02 => Some(OperandType::Int32),
            0x03 => Some(OperandType::Int64),
            0x04 => Some(OperandType::Float),
            0x05 => Some(OperandType::Double),
            0x06 => Some(OperandType::Decimal),
            0x07 => Some(OperandType::String),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            OperandType::Int32 | OperandType::Int64 | OperandType::Float | OperandType::Double
        )
    }
}

impl std::fmt::Display for OperandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperandType::Bool => "BOOL",
            OperandType::Int32 => "INT32",
            OperandType::Int64 => "INT64",
            OperandType::Float => "FLOAT",
            OperandType::Double => "DOUBLE",
            OperandType::Decimal => "DECIMAL",
            OperandType::String => "STRING",
        };
        f.write_str(s)
    }
}

/// A typed, nullable value slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Bool(Option<bool>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    Float(Option<f32>),
    Double(Option<f64>),
    Decimal(Option<String>),
    String(Option<String>),
}

impl Operand {
    pub fn type_of(&self) -> OperandType {
        match self {
            Operand::Bool(_) => OperandType::Bool,
            Operand::Int32(_) => OperandType::Int32,
            Operand::Int64(_) => OperandType::Int64,
            Operand::Float(_) => OperandType::Float,
            Operand::Double(_) => OperandType::Double,
            Operand::Decimal(_) => OperandType::Decimal,
            Operand::String(_) => OperandType::String,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Operand::Bool(v) => v.is_none(),
            Operand::Int32(v) => v.is_none(),
            Operand::Int64(v) => v.is_none(),
            Operand::Float(v) => v.is_none(),
            Operand::Double(v) => v.is_none(),
            Operand::Decimal(v) => v.is_none(),
            Operand::String(v) => v.is_none(),
        }
    }

    /// A NULL slot of the given type.
    pub fn null_of(t: OperandType) -> Operand {
        match t {
            OperandType::Bool => Operand::Bool(None),
            OperandType::Int32 => Operand::Int32(None),
            OperandType::Int64 => Operand::Int64(None),
            OperandType::Float => Operand::Float(None),
            OperandType::Double => Operand::Double(None),
            OperandType::Decimal => Operand::Decimal(None),
            OperandType::String => Operand::String(None),
        }
    }

    /// The truth value of a filter result: non-null `true` passes,
    /// NULL and `false` do not.
    pub fn is_true(&self) -> bool {
        matches!(self, Operand::Bool(Some(true)))
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::Bool(Some(v))
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Int32(Some(v))
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Int64(Some(v))
    }
}

impl From<f32> for Operand {
    fn from(v: f32) -> Self {
        Operand::Float(Some(v))
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Double(Some(v))
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::String(Some(v.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_byte_roundtrip() {
        for b in 0x01..=0x07u8 {
            let t = OperandType::from_byte(b).unwrap();
            assert_eq!(t.as_byte(), b);
        }
        assert!(OperandType::from_byte(0x00).is_none());
        assert!(OperandType::from_byte(0x08).is_none());
    }

    #[test]
    fn test_bool_is_pinned_to_one() {
        // CONST_N_BOOL == 0x21 on the wire fixes this.
        assert_eq!(OperandType::Bool.as_byte(), 0x01);
    }

    #[test]
    fn test_null_of() {
        for t in [
            OperandType::Bool,
            OperandType::Int32,
            OperandType::Int64,
            OperandType::Float,
            OperandType::Double,
            OperandType::Decimal,
            OperandType::String,
        ] {
            let op = Operand::null_of(t);
            assert!(op.is_null());
            assert_eq!(op.type_of(), t);
        }
    }

    #[test]
    fn test_filter_truth() {
        assert!(Operand::from(true).is_true());
        assert!(!Operand::from(false).is_true());
        assert!(!Operand::Bool(None).is_true());
        assert!(!Operand::from(1i32).is_true());
    }
}
