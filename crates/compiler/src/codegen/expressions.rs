//! Expression emission and type inference
//!
//! Expressions are emitted against an expected type supplied by context
//! (assignment target, parameter type, condition). Where the context demands
//! nothing, inference falls back to: bare integers are i32, float syntax is
//! f64, comparisons and logical operators are i32.

use super::{CodeGen, FuncCtx};
use crate::CompileError;
use crate::ast::{BinOp, Expr, UnOp};
use crate::opcodes as op;
use crate::types::ValType;
use crate::writer::ByteWriter;

/// Storage a name resolved to.
#[derive(Debug, Clone, Copy)]
pub(super) enum Place {
    Local(u32),
    Global(u32),
}

/// A dotted layout access: base slot, accumulated byte offset, terminal
/// field type. `nested` is set when the path stops at an embedded layout,
/// in which case the value is the address itself.
pub(super) struct PathRef {
    pub base: Place,
    pub offset: u32,
    pub ty: ValType,
    pub nested: bool,
}

impl<'a> CodeGen<'a> {
    pub(super) fn emit_expr(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        e: &Expr,
        want: ValType,
    ) -> Result<(), CompileError> {
        match e {
            Expr::Num { .. } => self.emit_number(w, e, want),
            Expr::Ident { name, .. } => {
                let ty = self.emit_name_read(w, ctx, name)?;
                self.coerce(w, ty, want)
            }
            Expr::Unary { op: un, operand } => self.emit_unary(w, ctx, *un, operand, want),
            Expr::Bin { op: bin, lhs, rhs } => self.emit_bin(w, ctx, *bin, lhs, rhs, want),
            Expr::Call { name, args, .. } => {
                let result = self.dispatch_call(w, ctx, name, args, Some(want))?;
                let ty = result.ok_or_else(|| {
                    CompileError::Semantic(format!("'{}' has no value to use in an expression", name))
                })?;
                self.coerce(w, ty, want)
            }
            Expr::FuncRef(name) => {
                let slot = self
                    .table_slots
                    .get(name)
                    .copied()
                    .ok_or_else(|| {
                        CompileError::Semantic(format!("'@{}' does not name a function", name))
                    })?;
                w.byte(op::I32_CONST);
                w.s32(slot as i32);
                self.coerce(w, ValType::I32, want)
            }
            Expr::Index { name, indices } => {
                let elem = self.emit_array_addr(w, ctx, name, indices)?;
                self.emit_load(w, elem);
                self.coerce(w, elem, want)
            }
            Expr::IfExpr {
                cond,
                then_val,
                else_val,
            } => {
                self.emit_expr(w, ctx, cond, ValType::I32)?;
                w.byte(op::IF);
                w.byte(want.code());
                ctx.depth += 1;
                self.emit_expr(w, ctx, then_val, want)?;
                w.byte(op::ELSE);
                self.emit_expr(w, ctx, else_val, want)?;
                w.byte(op::END);
                ctx.depth -= 1;
                Ok(())
            }
        }
    }

    fn emit_number(&self, w: &mut ByteWriter, e: &Expr, want: ValType) -> Result<(), CompileError> {
        if want.is_vector() {
            // A scalar literal in vector position becomes a constant with
            // every lane set to it.
            let lane = want.lane();
            if want == ValType::V128 {
                return Err(CompileError::Semantic(
                    "cannot use a scalar literal where a v128 value is expected".to_string(),
                ));
            }
            let mut bytes = [0u8; 16];
            write_lanes(&mut bytes, e, lane)?;
            w.byte(op::SIMD_PREFIX);
            w.u32(op::V128_CONST);
            w.bytes(&bytes);
            return Ok(());
        }
        match want {
            ValType::I32 => {
                w.byte(op::I32_CONST);
                w.s32(expect_int(e)? as i32);
            }
            ValType::I64 => {
                w.byte(op::I64_CONST);
                w.s64(expect_int(e)?);
            }
            ValType::F32 => {
                w.byte(op::F32_CONST);
                w.f32(expect_float(e)? as f32);
            }
            ValType::F64 => {
                w.byte(op::F64_CONST);
                w.f64(expect_float(e)?);
            }
            _ => unreachable!("vectors handled above"),
        }
        Ok(())
    }

    /// Read a plain or dotted name, leaving its value (or address, for an
    /// embedded layout) on the stack. Returns the value's type.
    pub(super) fn emit_name_read(
        &self,
        w: &mut ByteWriter,
        ctx: &FuncCtx,
        name: &str,
    ) -> Result<ValType, CompileError> {
        // The function's own name reads the return accumulator.
        if name == ctx.func.name {
            if let Some(ret) = ctx.ret {
                w.byte(op::LOCAL_GET);
                w.u32(ctx.ret_index);
                return Ok(ret);
            }
        }
        if let Some(slot) = ctx.locals.get(name) {
            w.byte(op::LOCAL_GET);
            w.u32(slot.index);
            return Ok(slot.ty);
        }
        if let Some(g) = self.globals.get(name) {
            w.byte(op::GLOBAL_GET);
            w.u32(g.index);
            return Ok(g.ty);
        }
        if let Some(path) = self.resolve_path(ctx, name) {
            self.emit_path_addr(w, &path);
            if path.nested {
                return Ok(ValType::I32);
            }
            self.emit_load(w, path.ty);
            return Ok(path.ty);
        }
        Err(CompileError::Semantic(format!("undefined name '{}'", name)))
    }

    fn emit_unary(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        un: UnOp,
        operand: &Expr,
        want: ValType,
    ) -> Result<(), CompileError> {
        match un {
            UnOp::Neg => {
                if want.is_vector() {
                    self.emit_expr(w, ctx, operand, want)?;
                    let (code, _) = op::simd_op(want.name(), "neg").ok_or_else(|| {
                        CompileError::Opcode(format!("no negate opcode for {}", want))
                    })?;
                    w.byte(op::SIMD_PREFIX);
                    w.u32(code);
                    Ok(())
                } else if want.is_float() {
                    self.emit_expr(w, ctx, operand, want)?;
                    w.byte(op::neg_op(want).expect("float negate"));
                    Ok(())
                } else {
                    // Integers: 0 - x.
                    match want {
                        ValType::I32 => {
                            w.byte(op::I32_CONST);
                            w.s32(0);
                        }
                        _ => {
                            w.byte(op::I64_CONST);
                            w.s64(0);
                        }
                    }
                    self.emit_expr(w, ctx, operand, want)?;
                    w.byte(op::arith_op(BinOp::Sub, want).expect("integer sub"));
                    Ok(())
                }
            }
            UnOp::Not => {
                // i32.eqz; wider operands must be narrowed by the program.
                self.emit_expr(w, ctx, operand, ValType::I32)?;
                w.byte(op::I32_EQZ);
                self.coerce(w, ValType::I32, want)
            }
            UnOp::BitNot => {
                if want.is_vector() {
                    self.emit_expr(w, ctx, operand, want)?;
                    let (code, _) = op::simd_op("v128", "not").expect("v128.not");
                    w.byte(op::SIMD_PREFIX);
                    w.u32(code);
                    Ok(())
                } else if want.is_int() {
                    // x xor -1
                    self.emit_expr(w, ctx, operand, want)?;
                    match want {
                        ValType::I32 => {
                            w.byte(op::I32_CONST);
                            w.s32(-1);
                        }
                        _ => {
                            w.byte(op::I64_CONST);
                            w.s64(-1);
                        }
                    }
                    w.byte(op::arith_op(BinOp::BitXor, want).expect("integer xor"));
                    Ok(())
                } else {
                    Err(CompileError::Opcode(format!(
                        "no bitwise-not opcode for {}",
                        want
                    )))
                }
            }
        }
    }

    fn emit_bin(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        bin: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        want: ValType,
    ) -> Result<(), CompileError> {
        match bin {
            BinOp::Pow => {
                // x ** 0.5 is sqrt; everything else goes through f64 pow.
                if rhs.const_f64() == Some(0.5) {
                    let t = if want == ValType::F32 {
                        ValType::F32
                    } else {
                        ValType::F64
                    };
                    self.emit_expr(w, ctx, lhs, t)?;
                    w.byte(op::builtin_unary_op("sqrt", t).expect("float sqrt"));
                    return self.coerce(w, t, want);
                }
                self.emit_expr(w, ctx, lhs, ValType::F64)?;
                self.emit_expr(w, ctx, rhs, ValType::F64)?;
                let pow_idx = self.func_index.get("pow").copied().ok_or_else(|| {
                    CompileError::Semantic("'**' requires the pow import".to_string())
                })?;
                w.byte(op::CALL);
                w.u32(pow_idx);
                self.coerce(w, ValType::F64, want)
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                // Operands take the left side's inferred type.
                let t = self.infer(ctx, lhs)?;
                self.emit_expr(w, ctx, lhs, t)?;
                self.emit_expr(w, ctx, rhs, t)?;
                if t.is_vector() {
                    let code = op::simd_cmp_op(bin, t).ok_or_else(|| {
                        CompileError::Opcode(format!("no comparison opcode for {}", t))
                    })?;
                    w.byte(op::SIMD_PREFIX);
                    w.u32(code);
                    // SIMD comparisons yield a v128 mask.
                    self.coerce(w, ValType::V128, want)
                } else {
                    let code = op::cmp_op(bin, t).ok_or_else(|| {
                        CompileError::Opcode(format!("no comparison opcode for {}", t))
                    })?;
                    w.byte(code);
                    self.coerce(w, ValType::I32, want)
                }
            }
            BinOp::And | BinOp::Or => {
                // Bitwise on i32; both operands always execute.
                self.emit_expr(w, ctx, lhs, ValType::I32)?;
                self.emit_expr(w, ctx, rhs, ValType::I32)?;
                w.byte(if bin == BinOp::And {
                    op::I32_AND
                } else {
                    op::I32_OR
                });
                self.coerce(w, ValType::I32, want)
            }
            _ => {
                if want.is_vector() {
                    self.emit_expr(w, ctx, lhs, want)?;
                    if matches!(bin, BinOp::Shl | BinOp::Shr) {
                        self.emit_expr(w, ctx, rhs, ValType::I32)?;
                    } else {
                        self.emit_expr(w, ctx, rhs, want)?;
                    }
                    let code = op::simd_arith_op(bin, want).ok_or_else(|| {
                        CompileError::Opcode(format!("no {:?} opcode for {}", bin, want))
                    })?;
                    w.byte(op::SIMD_PREFIX);
                    w.u32(code);
                    Ok(())
                } else {
                    self.emit_expr(w, ctx, lhs, want)?;
                    self.emit_expr(w, ctx, rhs, want)?;
                    let code = op::arith_op(bin, want).ok_or_else(|| {
                        CompileError::Opcode(format!("no {:?} opcode for {}", bin, want))
                    })?;
                    w.byte(code);
                    Ok(())
                }
            }
        }
    }

    /// Convert the value on the stack from one type to another. Scalar
    /// conversions use the signed opcode table; a scalar meeting a vector
    /// expectation is splatted. Vector-to-scalar has no defined opcode.
    pub(super) fn coerce(
        &self,
        w: &mut ByteWriter,
        from: ValType,
        to: ValType,
    ) -> Result<(), CompileError> {
        if from == to || (from.is_vector() && to.is_vector()) {
            return Ok(());
        }
        if !from.is_vector() && to.is_vector() {
            let lane = to.lane();
            let splat = op::splat_op(to).ok_or_else(|| {
                CompileError::Semantic(format!("no conversion from {} to {}", from, to))
            })?;
            if from != lane {
                let code = op::convert_op(from, lane).ok_or_else(|| {
                    CompileError::Semantic(format!("no conversion from {} to {}", from, lane))
                })?;
                w.byte(code);
            }
            w.byte(op::SIMD_PREFIX);
            w.u32(splat);
            return Ok(());
        }
        if from.is_vector() {
            return Err(CompileError::Semantic(format!(
                "no conversion from {} to {}",
                from, to
            )));
        }
        let code = op::convert_op(from, to).ok_or_else(|| {
            CompileError::Semantic(format!("no conversion from {} to {}", from, to))
        })?;
        w.byte(code);
        Ok(())
    }

    /// Inferred type when no context demands one.
    pub(super) fn infer(&self, ctx: &FuncCtx, e: &Expr) -> Result<ValType, CompileError> {
        match e {
            Expr::Num {
                suffix, is_float, ..
            } => Ok(suffix.unwrap_or(if *is_float { ValType::F64 } else { ValType::I32 })),
            Expr::Ident { name, .. } => {
                if name == &ctx.func.name {
                    if let Some(ret) = ctx.ret {
                        return Ok(ret);
                    }
                }
                if let Some(slot) = ctx.locals.get(name) {
                    return Ok(slot.ty);
                }
                if let Some(g) = self.globals.get(name) {
                    return Ok(g.ty);
                }
                if let Some(path) = self.resolve_path(ctx, name) {
                    return Ok(if path.nested { ValType::I32 } else { path.ty });
                }
                Err(CompileError::Semantic(format!("undefined name '{}'", name)))
            }
            Expr::Bin { op: bin, lhs, .. } => match bin {
                BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Gt
                | BinOp::Le
                | BinOp::Ge
                | BinOp::And
                | BinOp::Or => Ok(ValType::I32),
                BinOp::Pow => Ok(ValType::F64),
                _ => self.infer(ctx, lhs),
            },
            Expr::Unary { op: un, operand } => match un {
                UnOp::Not => Ok(ValType::I32),
                _ => self.infer(ctx, operand),
            },
            Expr::Call { name, args, .. } => self.call_result_type(ctx, name, args),
            Expr::FuncRef(_) => Ok(ValType::I32),
            Expr::Index { name, .. } => ctx
                .locals
                .get(name)
                .and_then(|s| s.array_elem)
                .ok_or_else(|| CompileError::Semantic(format!("'{}' is not an array", name))),
            Expr::IfExpr { then_val, .. } => self.infer(ctx, then_val),
        }
    }

    // ------------------------------------------------------------------
    // Addresses: layout paths and array elements
    // ------------------------------------------------------------------

    /// Resolve `base.field.field` through the layout tables. Returns None
    /// when the name is not a dotted path rooted at a layout-typed slot.
    pub(super) fn resolve_path(&self, ctx: &FuncCtx, name: &str) -> Option<PathRef> {
        let (root, rest) = name.split_once('.')?;
        let (base, mut layout_name) = if let Some(slot) = ctx.locals.get(root) {
            (Place::Local(slot.index), slot.layout.clone()?)
        } else {
            let g = self.globals.get(root)?;
            (Place::Global(g.index), g.layout.clone()?)
        };

        let mut offset = 0u32;
        let mut segments = rest.split('.').peekable();
        while let Some(seg) = segments.next() {
            let layout = self.layouts.get(&layout_name)?;
            let field = layout.fields.get(seg)?;
            offset += field.offset;
            match (&field.nested, segments.peek()) {
                (Some(inner), Some(_)) => layout_name = inner.clone(),
                (Some(_), None) => {
                    return Some(PathRef {
                        base,
                        offset,
                        ty: ValType::I32,
                        nested: true,
                    });
                }
                (None, Some(_)) => return None,
                (None, None) => {
                    return Some(PathRef {
                        base,
                        offset,
                        ty: field.ty,
                        nested: false,
                    });
                }
            }
        }
        None
    }

    /// Push `base + offset`; the add is skipped for offset zero.
    pub(super) fn emit_path_addr(&self, w: &mut ByteWriter, path: &PathRef) {
        match path.base {
            Place::Local(idx) => {
                w.byte(op::LOCAL_GET);
                w.u32(idx);
            }
            Place::Global(idx) => {
                w.byte(op::GLOBAL_GET);
                w.u32(idx);
            }
        }
        if path.offset > 0 {
            w.byte(op::I32_CONST);
            w.s32(path.offset as i32);
            w.byte(op::I32_ADD);
        }
    }

    /// Push the address of an array element and return the element type.
    ///
    /// Supported shapes: `a[i]`; `a[i, j]` when the array was declared with
    /// two dimensions; and the stride form `a[i, stride, j]`.
    pub(super) fn emit_array_addr(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        name: &str,
        indices: &[Expr],
    ) -> Result<ValType, CompileError> {
        let (slot_index, elem, dims) = {
            let slot = ctx
                .locals
                .get(name)
                .ok_or_else(|| CompileError::Semantic(format!("undefined name '{}'", name)))?;
            let elem = slot
                .array_elem
                .ok_or_else(|| CompileError::Semantic(format!("'{}' is not an array", name)))?;
            (slot.index, elem, slot.dims.clone())
        };

        w.byte(op::LOCAL_GET);
        w.u32(slot_index);
        match indices {
            [i] => {
                self.emit_expr(w, ctx, i, ValType::I32)?;
            }
            [i, j] => {
                if dims.len() != 2 {
                    return Err(CompileError::Semantic(format!(
                        "'{}' needs declared dimensions for two-index access",
                        name
                    )));
                }
                self.emit_expr(w, ctx, i, ValType::I32)?;
                w.byte(op::I32_CONST);
                w.s32(dims[1] as i32);
                w.byte(op::I32_MUL);
                self.emit_expr(w, ctx, j, ValType::I32)?;
                w.byte(op::I32_ADD);
            }
            [i, stride, j] => {
                self.emit_expr(w, ctx, i, ValType::I32)?;
                self.emit_expr(w, ctx, stride, ValType::I32)?;
                w.byte(op::I32_MUL);
                self.emit_expr(w, ctx, j, ValType::I32)?;
                w.byte(op::I32_ADD);
            }
            _ => {
                return Err(CompileError::Semantic(format!(
                    "unsupported array index pattern on '{}'",
                    name
                )));
            }
        }
        w.byte(op::I32_CONST);
        w.s32(elem.size() as i32);
        w.byte(op::I32_MUL);
        w.byte(op::I32_ADD);
        Ok(elem)
    }

    pub(super) fn emit_load(&self, w: &mut ByteWriter, ty: ValType) {
        if ty.is_vector() {
            w.byte(op::SIMD_PREFIX);
            w.u32(op::V128_LOAD);
        } else {
            w.byte(op::load_op(ty).expect("scalar load"));
        }
        w.u32(ty.align_log2());
        w.u32(0);
    }

    pub(super) fn emit_store(&self, w: &mut ByteWriter, ty: ValType) {
        if ty.is_vector() {
            w.byte(op::SIMD_PREFIX);
            w.u32(op::V128_STORE);
        } else {
            w.byte(op::store_op(ty).expect("scalar store"));
        }
        w.u32(ty.align_log2());
        w.u32(0);
    }
}

fn expect_int(e: &Expr) -> Result<i64, CompileError> {
    e.const_i64()
        .ok_or_else(|| CompileError::Semantic("malformed numeric literal".to_string()))
}

fn expect_float(e: &Expr) -> Result<f64, CompileError> {
    e.const_f64()
        .ok_or_else(|| CompileError::Semantic("malformed numeric literal".to_string()))
}

/// Fill all 16 bytes with the literal replicated across the lanes.
pub(super) fn write_lanes(bytes: &mut [u8; 16], e: &Expr, lane: ValType) -> Result<(), CompileError> {
    let size = lane.size() as usize;
    for i in 0..(16 / size) {
        write_lane(&mut bytes[i * size..(i + 1) * size], e, lane)?;
    }
    Ok(())
}

/// Encode one lane of a `v128.const` from a literal (or negated literal).
pub(super) fn write_lane(out: &mut [u8], e: &Expr, lane: ValType) -> Result<(), CompileError> {
    match lane {
        ValType::I32 => out.copy_from_slice(&(expect_int(e)? as i32).to_le_bytes()),
        ValType::I64 => out.copy_from_slice(&expect_int(e)?.to_le_bytes()),
        ValType::F32 => out.copy_from_slice(&(expect_float(e)? as f32).to_le_bytes()),
        ValType::F64 => out.copy_from_slice(&expect_float(e)?.to_le_bytes()),
        _ => {
            return Err(CompileError::Semantic(
                "vector lanes must be scalar".to_string(),
            ));
        }
    }
    Ok(())
}
