//! Value types and function signatures
//!
//! Tern values are the Wasm numeric types plus the 128-bit vector families.
//! A vector value always encodes as the `v128` type code in the module; the
//! lane family is tracked here so arithmetic can pick the right SIMD opcode.

use serde::Serialize;

/// A value type as seen by the code generator.
///
/// Arrays, layout pointers, and function references all lower to `I32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    /// Generic 128-bit vector with no lane interpretation.
    V128,
    F32x4,
    F64x2,
    I32x4,
    I64x2,
}

impl ValType {
    /// The Wasm binary type code (signed-LEB encoded, so these appear as
    /// the given bytes): i32=0x7F, i64=0x7E, f32=0x7D, f64=0x7C, v128=0x7B.
    pub fn code(self) -> u8 {
        match self {
            ValType::I32 => 0x7F,
            ValType::I64 => 0x7E,
            ValType::F32 => 0x7D,
            ValType::F64 => 0x7C,
            ValType::V128 | ValType::F32x4 | ValType::F64x2 | ValType::I32x4 | ValType::I64x2 => {
                0x7B
            }
        }
    }

    /// Size in bytes when stored in linear memory.
    pub fn size(self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 => 4,
            ValType::I64 | ValType::F64 => 8,
            _ => 16,
        }
    }

    /// log2 of the natural alignment, used as the load/store align hint.
    pub fn align_log2(self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 => 2,
            ValType::I64 | ValType::F64 => 3,
            _ => 4,
        }
    }

    pub fn is_vector(self) -> bool {
        matches!(
            self,
            ValType::V128 | ValType::F32x4 | ValType::F64x2 | ValType::I32x4 | ValType::I64x2
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValType::F32 | ValType::F64)
    }

    pub fn is_int(self) -> bool {
        matches!(self, ValType::I32 | ValType::I64)
    }

    /// Scalar lane type of a vector family; scalars return themselves.
    pub fn lane(self) -> ValType {
        match self {
            ValType::F32x4 => ValType::F32,
            ValType::F64x2 => ValType::F64,
            ValType::I32x4 => ValType::I32,
            ValType::I64x2 => ValType::I64,
            other => other,
        }
    }

    /// Number of lanes in a vector family (1 for scalars and bare v128).
    pub fn lane_count(self) -> usize {
        match self {
            ValType::F32x4 | ValType::I32x4 => 4,
            ValType::F64x2 | ValType::I64x2 => 2,
            _ => 1,
        }
    }

    /// Parse a primitive type name. Covers the scalar names and the vector
    /// families the language exposes.
    pub fn from_name(name: &str) -> Option<ValType> {
        match name {
            "i32" => Some(ValType::I32),
            "i64" => Some(ValType::I64),
            "f32" => Some(ValType::F32),
            "f64" => Some(ValType::F64),
            "v128" => Some(ValType::V128),
            "f32x4" => Some(ValType::F32x4),
            "f64x2" => Some(ValType::F64x2),
            "i32x4" => Some(ValType::I32x4),
            "i64x2" => Some(ValType::I64x2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::V128 => "v128",
            ValType::F32x4 => "f32x4",
            ValType::F64x2 => "f64x2",
            ValType::I32x4 => "i32x4",
            ValType::I64x2 => "i64x2",
        }
    }
}

impl std::fmt::Display for ValType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A function signature: ordered parameter types and an optional result.
///
/// Identical signatures share a type-section slot; the canonical string key
/// from [`FuncSig::key`] is what deduplication hashes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuncSig {
    pub params: Vec<ValType>,
    pub ret: Option<ValType>,
}

impl FuncSig {
    pub fn new(params: Vec<ValType>, ret: Option<ValType>) -> Self {
        FuncSig { params, ret }
    }

    /// Canonical key: `type,type,...:retType` (empty return keeps the colon).
    pub fn key(&self) -> String {
        let params: Vec<&str> = self.params.iter().map(|t| t.name()).collect();
        let ret = self.ret.map(|t| t.name()).unwrap_or("");
        format!("{}:{}", params.join(","), ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_codes() {
        assert_eq!(ValType::I32.code(), 0x7F);
        assert_eq!(ValType::I64.code(), 0x7E);
        assert_eq!(ValType::F32.code(), 0x7D);
        assert_eq!(ValType::F64.code(), 0x7C);
        assert_eq!(ValType::F64x2.code(), 0x7B);
        assert_eq!(ValType::V128.code(), 0x7B);
    }

    #[test]
    fn test_lane_types() {
        assert_eq!(ValType::F64x2.lane(), ValType::F64);
        assert_eq!(ValType::I32x4.lane(), ValType::I32);
        assert_eq!(ValType::F64x2.lane_count(), 2);
        assert_eq!(ValType::F32x4.lane_count(), 4);
        assert_eq!(ValType::F64.lane(), ValType::F64);
    }

    #[test]
    fn test_sig_key() {
        let sig = FuncSig::new(vec![ValType::I32, ValType::F64], Some(ValType::F64));
        assert_eq!(sig.key(), "i32,f64:f64");

        let void = FuncSig::new(vec![], None);
        assert_eq!(void.key(), ":");
    }

    #[test]
    fn test_identical_sigs_share_key() {
        let a = FuncSig::new(vec![ValType::F64], Some(ValType::F64));
        let b = FuncSig::new(vec![ValType::F64], Some(ValType::F64));
        assert_eq!(a.key(), b.key());
    }
}
