//! Wasm opcode tables
//!
//! Named constants for the core opcodes the generator emits directly, plus
//! the lookup tables that map operator/builtin names to opcodes per value
//! type. SIMD opcodes live under the 0xFD prefix and are LEB128-encoded;
//! bulk-memory and saturating truncation live under 0xFC.

use crate::ast::BinOp;
use crate::types::ValType;

// Control
pub const UNREACHABLE: u8 = 0x00;
pub const BLOCK: u8 = 0x02;
pub const LOOP: u8 = 0x03;
pub const IF: u8 = 0x04;
pub const ELSE: u8 = 0x05;
pub const END: u8 = 0x0B;
pub const BR: u8 = 0x0C;
pub const BR_IF: u8 = 0x0D;
pub const RETURN: u8 = 0x0F;
pub const CALL: u8 = 0x10;
pub const CALL_INDIRECT: u8 = 0x11;
// Tail-call proposal
pub const RETURN_CALL: u8 = 0x12;
pub const RETURN_CALL_INDIRECT: u8 = 0x13;
pub const DROP: u8 = 0x1A;
pub const SELECT: u8 = 0x1B;

// Variables
pub const LOCAL_GET: u8 = 0x20;
pub const LOCAL_SET: u8 = 0x21;
pub const GLOBAL_GET: u8 = 0x23;
pub const GLOBAL_SET: u8 = 0x24;

// Memory management
pub const MEMORY_SIZE: u8 = 0x3F;
pub const MEMORY_GROW: u8 = 0x40;

// Constants
pub const I32_CONST: u8 = 0x41;
pub const I64_CONST: u8 = 0x42;
pub const F32_CONST: u8 = 0x43;
pub const F64_CONST: u8 = 0x44;

pub const I32_EQZ: u8 = 0x45;
pub const I32_AND: u8 = 0x71;
pub const I32_OR: u8 = 0x72;
pub const I32_XOR: u8 = 0x73;
pub const I32_ADD: u8 = 0x6A;
pub const I32_MUL: u8 = 0x6C;

pub const F32_DEMOTE_F64: u8 = 0xB6;
pub const F64_PROMOTE_F32: u8 = 0xBB;

/// Void block type for `block`/`loop`/`if` with no result.
pub const VOID_BLOCK: u8 = 0x40;
/// `funcref` element type in the table section.
pub const FUNCREF: u8 = 0x70;

pub const FC_PREFIX: u8 = 0xFC;
pub const SIMD_PREFIX: u8 = 0xFD;

// 0xFD-prefixed opcodes used outside the name table
pub const V128_LOAD: u32 = 0;
pub const V128_STORE: u32 = 11;
pub const V128_CONST: u32 = 12;

// 0xFC-prefixed opcodes
pub const MEMORY_COPY: u32 = 10;
pub const MEMORY_FILL: u32 = 11;

/// Math builtins resolved as `math.<name>` imports when called without a
/// local definition. All parameters and results are f64.
pub const MATH_IMPORTS: &[(&str, usize)] = &[
    ("sin", 1),
    ("cos", 1),
    ("ln", 1),
    ("exp", 1),
    ("pow", 2),
    ("atan2", 2),
];

pub fn math_import_arity(name: &str) -> Option<usize> {
    MATH_IMPORTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, arity)| *arity)
}

/// Scalar load opcode; vectors use `0xFD v128.load`.
pub fn load_op(ty: ValType) -> Option<u8> {
    match ty {
        ValType::I32 => Some(0x28),
        ValType::I64 => Some(0x29),
        ValType::F32 => Some(0x2A),
        ValType::F64 => Some(0x2B),
        _ => None,
    }
}

/// Scalar store opcode; vectors use `0xFD v128.store`.
pub fn store_op(ty: ValType) -> Option<u8> {
    match ty {
        ValType::I32 => Some(0x36),
        ValType::I64 => Some(0x37),
        ValType::F32 => Some(0x38),
        ValType::F64 => Some(0x39),
        _ => None,
    }
}

/// Arithmetic, bitwise, and shift opcodes for scalar operands.
/// Integer division and `mod` are the signed variants.
pub fn arith_op(op: BinOp, ty: ValType) -> Option<u8> {
    use BinOp::*;
    let code = match (ty, op) {
        (ValType::I32, Add) => 0x6A,
        (ValType::I32, Sub) => 0x6B,
        (ValType::I32, Mul) => 0x6C,
        (ValType::I32, Div) => 0x6D,
        (ValType::I32, Mod) => 0x6F,
        (ValType::I32, BitAnd) => 0x71,
        (ValType::I32, BitOr) => 0x72,
        (ValType::I32, BitXor) => 0x73,
        (ValType::I32, Shl) => 0x74,
        (ValType::I32, Shr) => 0x75,
        (ValType::I64, Add) => 0x7C,
        (ValType::I64, Sub) => 0x7D,
        (ValType::I64, Mul) => 0x7E,
        (ValType::I64, Div) => 0x7F,
        (ValType::I64, Mod) => 0x81,
        (ValType::I64, BitAnd) => 0x83,
        (ValType::I64, BitOr) => 0x84,
        (ValType::I64, BitXor) => 0x85,
        (ValType::I64, Shl) => 0x86,
        (ValType::I64, Shr) => 0x87,
        (ValType::F32, Add) => 0x92,
        (ValType::F32, Sub) => 0x93,
        (ValType::F32, Mul) => 0x94,
        (ValType::F32, Div) => 0x95,
        (ValType::F64, Add) => 0xA0,
        (ValType::F64, Sub) => 0xA1,
        (ValType::F64, Mul) => 0xA2,
        (ValType::F64, Div) => 0xA3,
        _ => return None,
    };
    Some(code)
}

/// Comparison opcodes for scalar operands (signed integer variants).
pub fn cmp_op(op: BinOp, ty: ValType) -> Option<u8> {
    use BinOp::*;
    let code = match (ty, op) {
        (ValType::I32, Eq) => 0x46,
        (ValType::I32, Ne) => 0x47,
        (ValType::I32, Lt) => 0x48,
        (ValType::I32, Gt) => 0x4A,
        (ValType::I32, Le) => 0x4C,
        (ValType::I32, Ge) => 0x4E,
        (ValType::I64, Eq) => 0x51,
        (ValType::I64, Ne) => 0x52,
        (ValType::I64, Lt) => 0x53,
        (ValType::I64, Gt) => 0x55,
        (ValType::I64, Le) => 0x57,
        (ValType::I64, Ge) => 0x59,
        (ValType::F32, Eq) => 0x5B,
        (ValType::F32, Ne) => 0x5C,
        (ValType::F32, Lt) => 0x5D,
        (ValType::F32, Gt) => 0x5E,
        (ValType::F32, Le) => 0x5F,
        (ValType::F32, Ge) => 0x60,
        (ValType::F64, Eq) => 0x61,
        (ValType::F64, Ne) => 0x62,
        (ValType::F64, Lt) => 0x63,
        (ValType::F64, Gt) => 0x64,
        (ValType::F64, Le) => 0x65,
        (ValType::F64, Ge) => 0x66,
        _ => return None,
    };
    Some(code)
}

/// Signed scalar conversion opcode. Same-type pairs need no opcode and
/// vector types have none.
pub fn convert_op(from: ValType, to: ValType) -> Option<u8> {
    let code = match (from, to) {
        (ValType::I32, ValType::I64) => 0xAC, // i64.extend_i32_s
        (ValType::I32, ValType::F32) => 0xB2, // f32.convert_i32_s
        (ValType::I32, ValType::F64) => 0xB7, // f64.convert_i32_s
        (ValType::I64, ValType::I32) => 0xA7, // i32.wrap_i64
        (ValType::I64, ValType::F32) => 0xB4, // f32.convert_i64_s
        (ValType::I64, ValType::F64) => 0xB9, // f64.convert_i64_s
        (ValType::F32, ValType::I32) => 0xA8, // i32.trunc_f32_s
        (ValType::F32, ValType::I64) => 0xAE, // i64.trunc_f32_s
        (ValType::F32, ValType::F64) => 0xBB, // f64.promote_f32
        (ValType::F64, ValType::I32) => 0xAA, // i32.trunc_f64_s
        (ValType::F64, ValType::I64) => 0xB0, // i64.trunc_f64_s
        (ValType::F64, ValType::F32) => 0xB6, // f32.demote_f64
        _ => return None,
    };
    Some(code)
}

/// Single-opcode unary builtins (float-only rounding family, int-only
/// bit-counting family).
pub fn builtin_unary_op(name: &str, ty: ValType) -> Option<u8> {
    let code = match (name, ty) {
        ("abs", ValType::F32) => 0x8B,
        ("abs", ValType::F64) => 0x99,
        ("ceil", ValType::F32) => 0x8D,
        ("ceil", ValType::F64) => 0x9B,
        ("floor", ValType::F32) => 0x8E,
        ("floor", ValType::F64) => 0x9C,
        ("trunc", ValType::F32) => 0x8F,
        ("trunc", ValType::F64) => 0x9D,
        ("nearest", ValType::F32) => 0x90,
        ("nearest", ValType::F64) => 0x9E,
        ("sqrt", ValType::F32) => 0x91,
        ("sqrt", ValType::F64) => 0x9F,
        ("clz", ValType::I32) => 0x67,
        ("clz", ValType::I64) => 0x79,
        ("ctz", ValType::I32) => 0x68,
        ("ctz", ValType::I64) => 0x7A,
        ("popcnt", ValType::I32) => 0x69,
        ("popcnt", ValType::I64) => 0x7B,
        _ => return None,
    };
    Some(code)
}

/// Single-opcode binary builtins. Integer min/max have no opcode and are
/// synthesised at the call site.
pub fn builtin_binary_op(name: &str, ty: ValType) -> Option<u8> {
    let code = match (name, ty) {
        ("min", ValType::F32) => 0x96,
        ("min", ValType::F64) => 0xA4,
        ("max", ValType::F32) => 0x97,
        ("max", ValType::F64) => 0xA5,
        ("copysign", ValType::F32) => 0x98,
        ("copysign", ValType::F64) => 0xA6,
        ("rotl", ValType::I32) => 0x77,
        ("rotl", ValType::I64) => 0x89,
        ("rotr", ValType::I32) => 0x78,
        ("rotr", ValType::I64) => 0x8A,
        _ => return None,
    };
    Some(code)
}

/// Float negate, used for unary minus on float operands.
pub fn neg_op(ty: ValType) -> Option<u8> {
    match ty {
        ValType::F32 => Some(0x8C),
        ValType::F64 => Some(0x9A),
        _ => None,
    }
}

/// The `wasm.*` escape hatch: unsigned variants, bit reinterpretation,
/// sign extension, widening. The operand type is inferred from the first
/// argument. Saturating truncation is handled separately (0xFC prefix).
pub fn wasm_escape_op(op: &str, from: ValType) -> Option<u8> {
    let code = match (op, from) {
        ("div_u", ValType::I32) => 0x6E,
        ("div_u", ValType::I64) => 0x80,
        ("rem_u", ValType::I32) => 0x70,
        ("rem_u", ValType::I64) => 0x82,
        ("shr_u", ValType::I32) => 0x76,
        ("shr_u", ValType::I64) => 0x88,
        ("lt_u", ValType::I32) => 0x49,
        ("lt_u", ValType::I64) => 0x54,
        ("gt_u", ValType::I32) => 0x4B,
        ("gt_u", ValType::I64) => 0x56,
        ("le_u", ValType::I32) => 0x4D,
        ("le_u", ValType::I64) => 0x58,
        ("ge_u", ValType::I32) => 0x4F,
        ("ge_u", ValType::I64) => 0x5A,
        ("extend8_s", ValType::I32) => 0xC0,
        ("extend8_s", ValType::I64) => 0xC2,
        ("extend16_s", ValType::I32) => 0xC1,
        ("extend16_s", ValType::I64) => 0xC3,
        ("extend32_s", ValType::I64) => 0xC4,
        ("extend_u", ValType::I32) => 0xAD, // i64.extend_i32_u
        ("reinterpret", ValType::F32) => 0xBC, // i32.reinterpret_f32
        ("reinterpret", ValType::F64) => 0xBD, // i64.reinterpret_f64
        ("reinterpret", ValType::I32) => 0xBE, // f32.reinterpret_i32
        ("reinterpret", ValType::I64) => 0xBF, // f64.reinterpret_i64
        _ => return None,
    };
    Some(code)
}

/// Result type of a `wasm.*` form, given the operand ("from") type.
pub fn wasm_escape_result(op: &str, from: ValType) -> Option<ValType> {
    match op {
        "div_u" | "rem_u" | "shr_u" | "extend8_s" | "extend16_s" | "extend32_s" => Some(from),
        "lt_u" | "gt_u" | "le_u" | "ge_u" => Some(ValType::I32),
        "extend_u" => Some(ValType::I64),
        "reinterpret" => match from {
            ValType::F32 => Some(ValType::I32),
            ValType::F64 => Some(ValType::I64),
            ValType::I32 => Some(ValType::F32),
            ValType::I64 => Some(ValType::F64),
            _ => None,
        },
        _ => None,
    }
}

/// 0xFC-prefixed saturating truncation: `(from float, to int, unsigned)`.
pub fn trunc_sat_op(from: ValType, to: ValType, unsigned: bool) -> Option<u32> {
    let base = match (to, from) {
        (ValType::I32, ValType::F32) => 0,
        (ValType::I32, ValType::F64) => 2,
        (ValType::I64, ValType::F32) => 4,
        (ValType::I64, ValType::F64) => 6,
        _ => return None,
    };
    Some(base + unsigned as u32)
}

/// Operand/immediate shape of a SIMD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdShape {
    /// scalar -> vector
    Splat,
    /// vector, lane immediate -> scalar lane
    ExtractLane,
    /// vector, scalar, lane immediate -> vector
    ReplaceLane,
    /// vector -> vector
    Unary,
    /// vector, vector -> vector (comparisons produce a mask)
    Binary,
    /// vector, i32 -> vector
    Shift,
    /// vector -> i32
    Test,
    /// vector, vector, vector -> vector
    Bitselect,
}

/// SIMD opcode for a namespaced operation like `f64x2.add` or `v128.xor`.
/// Returns the 0xFD-prefixed opcode and its operand shape.
pub fn simd_op(ns: &str, op: &str) -> Option<(u32, SimdShape)> {
    use SimdShape::*;
    let entry = match (ns, op) {
        ("v128", "not") => (77, Unary),
        ("v128", "and") => (78, Binary),
        ("v128", "andnot") => (79, Binary),
        ("v128", "or") => (80, Binary),
        ("v128", "xor") => (81, Binary),
        ("v128", "bitselect") => (82, Bitselect),
        ("v128", "any_true") => (83, Test),

        ("i32x4", "splat") => (17, Splat),
        ("i32x4", "extract_lane") => (27, ExtractLane),
        ("i32x4", "replace_lane") => (28, ReplaceLane),
        ("i32x4", "eq") => (55, Binary),
        ("i32x4", "ne") => (56, Binary),
        ("i32x4", "lt_s") => (57, Binary),
        ("i32x4", "lt_u") => (58, Binary),
        ("i32x4", "gt_s") => (59, Binary),
        ("i32x4", "gt_u") => (60, Binary),
        ("i32x4", "le_s") => (61, Binary),
        ("i32x4", "le_u") => (62, Binary),
        ("i32x4", "ge_s") => (63, Binary),
        ("i32x4", "ge_u") => (64, Binary),
        ("i32x4", "abs") => (160, Unary),
        ("i32x4", "neg") => (161, Unary),
        ("i32x4", "all_true") => (163, Test),
        ("i32x4", "bitmask") => (164, Test),
        ("i32x4", "shl") => (171, Shift),
        ("i32x4", "shr_s") => (172, Shift),
        ("i32x4", "shr_u") => (173, Shift),
        ("i32x4", "add") => (174, Binary),
        ("i32x4", "sub") => (177, Binary),
        ("i32x4", "mul") => (181, Binary),
        ("i32x4", "min_s") => (182, Binary),
        ("i32x4", "min_u") => (183, Binary),
        ("i32x4", "max_s") => (184, Binary),
        ("i32x4", "max_u") => (185, Binary),
        ("i32x4", "trunc_sat_f32x4_s") => (248, Unary),
        ("i32x4", "trunc_sat_f32x4_u") => (249, Unary),

        ("i64x2", "splat") => (18, Splat),
        ("i64x2", "extract_lane") => (29, ExtractLane),
        ("i64x2", "replace_lane") => (30, ReplaceLane),
        ("i64x2", "abs") => (192, Unary),
        ("i64x2", "neg") => (193, Unary),
        ("i64x2", "all_true") => (195, Test),
        ("i64x2", "bitmask") => (196, Test),
        ("i64x2", "shl") => (203, Shift),
        ("i64x2", "shr_s") => (204, Shift),
        ("i64x2", "shr_u") => (205, Shift),
        ("i64x2", "add") => (206, Binary),
        ("i64x2", "sub") => (209, Binary),
        ("i64x2", "mul") => (213, Binary),
        ("i64x2", "eq") => (214, Binary),
        ("i64x2", "ne") => (215, Binary),
        ("i64x2", "lt_s") => (216, Binary),
        ("i64x2", "gt_s") => (217, Binary),
        ("i64x2", "le_s") => (218, Binary),
        ("i64x2", "ge_s") => (219, Binary),

        ("f32x4", "splat") => (19, Splat),
        ("f32x4", "extract_lane") => (31, ExtractLane),
        ("f32x4", "replace_lane") => (32, ReplaceLane),
        ("f32x4", "eq") => (65, Binary),
        ("f32x4", "ne") => (66, Binary),
        ("f32x4", "lt") => (67, Binary),
        ("f32x4", "gt") => (68, Binary),
        ("f32x4", "le") => (69, Binary),
        ("f32x4", "ge") => (70, Binary),
        ("f32x4", "ceil") => (103, Unary),
        ("f32x4", "floor") => (104, Unary),
        ("f32x4", "trunc") => (105, Unary),
        ("f32x4", "nearest") => (106, Unary),
        ("f32x4", "abs") => (224, Unary),
        ("f32x4", "neg") => (225, Unary),
        ("f32x4", "sqrt") => (227, Unary),
        ("f32x4", "add") => (228, Binary),
        ("f32x4", "sub") => (229, Binary),
        ("f32x4", "mul") => (230, Binary),
        ("f32x4", "div") => (231, Binary),
        ("f32x4", "min") => (232, Binary),
        ("f32x4", "max") => (233, Binary),
        ("f32x4", "pmin") => (234, Binary),
        ("f32x4", "pmax") => (235, Binary),
        ("f32x4", "convert_i32x4_s") => (250, Unary),
        ("f32x4", "convert_i32x4_u") => (251, Unary),

        ("f64x2", "splat") => (20, Splat),
        ("f64x2", "extract_lane") => (33, ExtractLane),
        ("f64x2", "replace_lane") => (34, ReplaceLane),
        ("f64x2", "eq") => (71, Binary),
        ("f64x2", "ne") => (72, Binary),
        ("f64x2", "lt") => (73, Binary),
        ("f64x2", "gt") => (74, Binary),
        ("f64x2", "le") => (75, Binary),
        ("f64x2", "ge") => (76, Binary),
        ("f64x2", "ceil") => (116, Unary),
        ("f64x2", "floor") => (117, Unary),
        ("f64x2", "trunc") => (122, Unary),
        ("f64x2", "nearest") => (148, Unary),
        ("f64x2", "abs") => (236, Unary),
        ("f64x2", "neg") => (237, Unary),
        ("f64x2", "sqrt") => (239, Unary),
        ("f64x2", "add") => (240, Binary),
        ("f64x2", "sub") => (241, Binary),
        ("f64x2", "mul") => (242, Binary),
        ("f64x2", "div") => (243, Binary),
        ("f64x2", "min") => (244, Binary),
        ("f64x2", "max") => (245, Binary),
        ("f64x2", "pmin") => (246, Binary),
        ("f64x2", "pmax") => (247, Binary),
        ("f64x2", "convert_low_i32x4_s") => (254, Unary),
        ("f64x2", "convert_low_i32x4_u") => (255, Unary),

        _ => return None,
    };
    Some(entry)
}

/// SIMD splat opcode for a lane family.
pub fn splat_op(ty: ValType) -> Option<u32> {
    match ty {
        ValType::I32x4 => Some(17),
        ValType::I64x2 => Some(18),
        ValType::F32x4 => Some(19),
        ValType::F64x2 => Some(20),
        _ => None,
    }
}

/// SIMD replace_lane opcode for a lane family.
pub fn replace_lane_op(ty: ValType) -> Option<u32> {
    match ty {
        ValType::I32x4 => Some(28),
        ValType::I64x2 => Some(30),
        ValType::F32x4 => Some(32),
        ValType::F64x2 => Some(34),
        _ => None,
    }
}

/// SIMD arithmetic for lane-typed vector operands.
pub fn simd_arith_op(op: BinOp, ty: ValType) -> Option<u32> {
    let name = match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::BitAnd => "and",
        BinOp::BitOr => "or",
        BinOp::BitXor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr_s",
        _ => return None,
    };
    match op {
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => simd_op("v128", name).map(|(c, _)| c),
        _ => simd_op(ty.name(), name).map(|(c, _)| c),
    }
}

/// SIMD comparison for lane-typed vector operands (signed for integers).
pub fn simd_cmp_op(op: BinOp, ty: ValType) -> Option<u32> {
    let signed = ty.lane().is_int();
    let name = match (op, signed) {
        (BinOp::Eq, _) => "eq",
        (BinOp::Ne, _) => "ne",
        (BinOp::Lt, true) => "lt_s",
        (BinOp::Gt, true) => "gt_s",
        (BinOp::Le, true) => "le_s",
        (BinOp::Ge, true) => "ge_s",
        (BinOp::Lt, false) => "lt",
        (BinOp::Gt, false) => "gt",
        (BinOp::Le, false) => "le",
        (BinOp::Ge, false) => "ge",
        _ => return None,
    };
    simd_op(ty.name(), name).map(|(c, _)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arith_table() {
        assert_eq!(arith_op(BinOp::Add, ValType::I32), Some(0x6A));
        assert_eq!(arith_op(BinOp::Mod, ValType::I64), Some(0x81));
        assert_eq!(arith_op(BinOp::Div, ValType::F64), Some(0xA3));
        // No float mod, no int-typed pow here.
        assert_eq!(arith_op(BinOp::Mod, ValType::F64), None);
        assert_eq!(arith_op(BinOp::Pow, ValType::F64), None);
    }

    #[test]
    fn test_cmp_table_signed() {
        assert_eq!(cmp_op(BinOp::Lt, ValType::I32), Some(0x48));
        assert_eq!(cmp_op(BinOp::Le, ValType::F64), Some(0x65));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(convert_op(ValType::I32, ValType::F64), Some(0xB7));
        assert_eq!(convert_op(ValType::F64, ValType::F32), Some(0xB6));
        assert_eq!(convert_op(ValType::I32, ValType::I32), None);
        assert_eq!(convert_op(ValType::F32, ValType::F64x2), None);
    }

    #[test]
    fn test_builtin_type_gaps() {
        // copysign has no integer opcode; sqrt has no integer opcode.
        assert_eq!(builtin_binary_op("copysign", ValType::I32), None);
        assert_eq!(builtin_unary_op("sqrt", ValType::I32), None);
        assert_eq!(builtin_unary_op("clz", ValType::F64), None);
    }

    #[test]
    fn test_simd_lookup() {
        assert_eq!(simd_op("f64x2", "add"), Some((240, SimdShape::Binary)));
        assert_eq!(
            simd_op("f64x2", "extract_lane"),
            Some((33, SimdShape::ExtractLane))
        );
        assert_eq!(simd_op("v128", "xor"), Some((81, SimdShape::Binary)));
        assert_eq!(simd_op("i32x4", "bogus"), None);
    }

    #[test]
    fn test_simd_arith_routes_bitwise_to_v128() {
        assert_eq!(simd_arith_op(BinOp::BitXor, ValType::I32x4), Some(81));
        assert_eq!(simd_arith_op(BinOp::Add, ValType::F32x4), Some(228));
    }

    #[test]
    fn test_trunc_sat_indices() {
        assert_eq!(trunc_sat_op(ValType::F32, ValType::I32, false), Some(0));
        assert_eq!(trunc_sat_op(ValType::F64, ValType::I64, true), Some(7));
    }
}
