//! Call dispatch
//!
//! Both expression and statement call sites resolve through the same
//! priority order: vector constructors, scalar type conversions, SIMD
//! namespaced operations, single-opcode builtins, the `wasm.*` escape hatch,
//! indirect calls through function-typed slots, and finally direct calls.

use super::expressions::{Place, write_lane};
use super::{CodeGen, FuncCtx};
use crate::CompileError;
use crate::ast::Expr;
use crate::opcodes as op;
use crate::opcodes::SimdShape;
use crate::types::{FuncSig, ValType};
use crate::writer::ByteWriter;

const VECTOR_CTORS: &[&str] = &["f64x2", "f32x4", "i32x4", "i64x2"];

impl<'a> CodeGen<'a> {
    /// Emit a call-shaped form and return its result type (None for the
    /// void builtins and subroutine calls).
    pub(super) fn dispatch_call(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        name: &str,
        args: &[Expr],
        want: Option<ValType>,
    ) -> Result<Option<ValType>, CompileError> {
        // 1. Vector constructors.
        if VECTOR_CTORS.contains(&name) {
            let family = ValType::from_name(name).expect("vector family");
            return self.emit_vector_ctor(w, ctx, family, args).map(Some);
        }

        // 2. Scalar type conversions.
        if let Some(target) = ValType::from_name(name) {
            if !target.is_vector() {
                self.expect_args(name, args, 1)?;
                let src = self.infer(ctx, &args[0])?;
                self.emit_expr(w, ctx, &args[0], src)?;
                if src != target {
                    let code = op::convert_op(src, target).ok_or_else(|| {
                        CompileError::Semantic(format!(
                            "no conversion from {} to {}",
                            src, target
                        ))
                    })?;
                    w.byte(code);
                }
                return Ok(Some(target));
            }
        }

        // 3. SIMD namespaced operations.
        if let Some((ns, opname)) = name.split_once('.') {
            if let Some((code, shape)) = op::simd_op(ns, opname) {
                let family = ValType::from_name(ns).expect("simd namespace");
                return self
                    .emit_simd(w, ctx, name, family, code, shape, args)
                    .map(Some);
            }
        }

        // 4. Native single-opcode builtins.
        if let Some(result) = self.emit_builtin(w, ctx, name, args)? {
            return Ok(result);
        }

        // 5. wasm.* escape hatch.
        if let Some(opname) = name.strip_prefix("wasm.") {
            return self.emit_wasm_escape(w, ctx, opname, args, want).map(Some);
        }

        // 6. Indirect call through a function-typed slot.
        if let Some((place, sig)) = self.func_slot(ctx, name) {
            self.expect_args(name, args, sig.params.len())?;
            for (a, p) in args.iter().zip(&sig.params) {
                self.emit_expr(w, ctx, a, *p)?;
            }
            match place {
                Place::Local(idx) => {
                    w.byte(op::LOCAL_GET);
                    w.u32(idx);
                }
                Place::Global(idx) => {
                    w.byte(op::GLOBAL_GET);
                    w.u32(idx);
                }
            }
            w.byte(op::CALL_INDIRECT);
            w.u32(self.sig_id(&sig));
            w.byte(0x00);
            return Ok(sig.ret);
        }

        // 7. Direct call.
        if let Some(sig) = self.func_sigs.get(name).cloned() {
            self.expect_args(name, args, sig.params.len())?;
            for (a, p) in args.iter().zip(&sig.params) {
                self.emit_expr(w, ctx, a, *p)?;
            }
            w.byte(op::CALL);
            w.u32(self.func_index[name]);
            return Ok(sig.ret);
        }

        Err(CompileError::Semantic(format!(
            "undefined function '{}'",
            name
        )))
    }

    /// Function-typed slot (local, param, or global) holding a table index.
    pub(super) fn func_slot(&self, ctx: &FuncCtx, name: &str) -> Option<(Place, FuncSig)> {
        if let Some(slot) = ctx.locals.get(name) {
            return slot.sig.clone().map(|sig| (Place::Local(slot.index), sig));
        }
        let g = self.globals.get(name)?;
        g.sig.clone().map(|sig| (Place::Global(g.index), sig))
    }

    fn expect_args(&self, name: &str, args: &[Expr], n: usize) -> Result<(), CompileError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(CompileError::Semantic(format!(
                "'{}' expects {} argument{}, got {}",
                name,
                n,
                if n == 1 { "" } else { "s" },
                args.len()
            )))
        }
    }

    /// `f64x2(a, b)` and friends. All-constant arguments fold into a
    /// `v128.const`; otherwise splat the first lane and replace the rest.
    fn emit_vector_ctor(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        family: ValType,
        args: &[Expr],
    ) -> Result<ValType, CompileError> {
        let lanes = family.lane_count();
        self.expect_args(family.name(), args, lanes)?;
        let lane = family.lane();

        if args.iter().all(|a| a.const_f64().is_some()) {
            let size = lane.size() as usize;
            let mut bytes = [0u8; 16];
            for (i, a) in args.iter().enumerate() {
                write_lane(&mut bytes[i * size..(i + 1) * size], a, lane)?;
            }
            w.byte(op::SIMD_PREFIX);
            w.u32(op::V128_CONST);
            w.bytes(&bytes);
            return Ok(family);
        }

        self.emit_expr(w, ctx, &args[0], lane)?;
        w.byte(op::SIMD_PREFIX);
        w.u32(op::splat_op(family).expect("splat"));
        let replace = op::replace_lane_op(family).expect("replace_lane");
        for (i, a) in args.iter().enumerate().skip(1) {
            self.emit_expr(w, ctx, a, lane)?;
            w.byte(op::SIMD_PREFIX);
            w.u32(replace);
            w.byte(i as u8);
        }
        Ok(family)
    }

    fn emit_simd(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        name: &str,
        family: ValType,
        code: u32,
        shape: SimdShape,
        args: &[Expr],
    ) -> Result<ValType, CompileError> {
        let emit_op = |w: &mut ByteWriter| {
            w.byte(op::SIMD_PREFIX);
            w.u32(code);
        };
        match shape {
            SimdShape::Splat => {
                self.expect_args(name, args, 1)?;
                self.emit_expr(w, ctx, &args[0], family.lane())?;
                emit_op(w);
                Ok(family)
            }
            SimdShape::ExtractLane => {
                self.expect_args(name, args, 2)?;
                self.emit_expr(w, ctx, &args[0], family)?;
                let lane = self.lane_immediate(name, &args[1], family)?;
                emit_op(w);
                w.byte(lane);
                Ok(family.lane())
            }
            SimdShape::ReplaceLane => {
                self.expect_args(name, args, 3)?;
                self.emit_expr(w, ctx, &args[0], family)?;
                let lane = self.lane_immediate(name, &args[1], family)?;
                self.emit_expr(w, ctx, &args[2], family.lane())?;
                emit_op(w);
                w.byte(lane);
                Ok(family)
            }
            SimdShape::Unary => {
                self.expect_args(name, args, 1)?;
                self.emit_expr(w, ctx, &args[0], family)?;
                emit_op(w);
                Ok(family)
            }
            SimdShape::Binary => {
                self.expect_args(name, args, 2)?;
                self.emit_expr(w, ctx, &args[0], family)?;
                self.emit_expr(w, ctx, &args[1], family)?;
                emit_op(w);
                Ok(family)
            }
            SimdShape::Shift => {
                self.expect_args(name, args, 2)?;
                self.emit_expr(w, ctx, &args[0], family)?;
                self.emit_expr(w, ctx, &args[1], ValType::I32)?;
                emit_op(w);
                Ok(family)
            }
            SimdShape::Test => {
                self.expect_args(name, args, 1)?;
                self.emit_expr(w, ctx, &args[0], family)?;
                emit_op(w);
                Ok(ValType::I32)
            }
            SimdShape::Bitselect => {
                self.expect_args(name, args, 3)?;
                for a in args {
                    self.emit_expr(w, ctx, a, ValType::V128)?;
                }
                emit_op(w);
                Ok(ValType::V128)
            }
        }
    }

    fn lane_immediate(
        &self,
        name: &str,
        e: &Expr,
        family: ValType,
    ) -> Result<u8, CompileError> {
        let lane = e.const_i64().ok_or_else(|| {
            CompileError::Semantic(format!("lane index of '{}' must be a constant", name))
        })?;
        if lane < 0 || lane as usize >= family.lane_count() {
            return Err(CompileError::Semantic(format!(
                "invalid lane immediate {} for {}",
                lane, family
            )));
        }
        Ok(lane as u8)
    }

    /// Builtins implemented as single opcodes. Returns Ok(None) when the
    /// name is not a builtin; Ok(Some(result)) when emitted.
    #[allow(clippy::type_complexity)]
    fn emit_builtin(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        name: &str,
        args: &[Expr],
    ) -> Result<Option<Option<ValType>>, CompileError> {
        match name {
            "sqrt" | "abs" | "floor" | "ceil" | "trunc" | "nearest" | "clz" | "ctz" | "popcnt" => {
                self.expect_args(name, args, 1)?;
                let t = self.infer(ctx, &args[0])?;
                self.emit_expr(w, ctx, &args[0], t)?;
                if t.is_vector() {
                    let (code, _) = op::simd_op(t.name(), name).ok_or_else(|| {
                        CompileError::Opcode(format!("no {} opcode for {}", name, t))
                    })?;
                    w.byte(op::SIMD_PREFIX);
                    w.u32(code);
                } else {
                    let code = op::builtin_unary_op(name, t).ok_or_else(|| {
                        CompileError::Opcode(format!("no {} opcode for {}", name, t))
                    })?;
                    w.byte(code);
                }
                Ok(Some(Some(t)))
            }
            "copysign" | "rotl" | "rotr" => {
                self.expect_args(name, args, 2)?;
                let t = self.infer(ctx, &args[0])?;
                self.emit_expr(w, ctx, &args[0], t)?;
                self.emit_expr(w, ctx, &args[1], t)?;
                let code = op::builtin_binary_op(name, t).ok_or_else(|| {
                    CompileError::Opcode(format!("no {} opcode for {}", name, t))
                })?;
                w.byte(code);
                Ok(Some(Some(t)))
            }
            "min" | "max" => {
                self.expect_args(name, args, 2)?;
                let t = self.infer(ctx, &args[0])?;
                if t.is_vector() {
                    // Float families have min/max; integer families only the
                    // signed variants.
                    let simd_name = if t.lane().is_int() {
                        format!("{}_s", name)
                    } else {
                        name.to_string()
                    };
                    let (code, _) = op::simd_op(t.name(), &simd_name).ok_or_else(|| {
                        CompileError::Opcode(format!("no {} opcode for {}", name, t))
                    })?;
                    self.emit_expr(w, ctx, &args[0], t)?;
                    self.emit_expr(w, ctx, &args[1], t)?;
                    w.byte(op::SIMD_PREFIX);
                    w.u32(code);
                } else if t.is_float() {
                    self.emit_expr(w, ctx, &args[0], t)?;
                    self.emit_expr(w, ctx, &args[1], t)?;
                    w.byte(op::builtin_binary_op(name, t).expect("float min/max"));
                } else {
                    // No integer min/max opcode: a, b, a, b, lt_s|gt_s, select.
                    let cmp = if name == "min" {
                        crate::ast::BinOp::Lt
                    } else {
                        crate::ast::BinOp::Gt
                    };
                    self.emit_expr(w, ctx, &args[0], t)?;
                    self.emit_expr(w, ctx, &args[1], t)?;
                    self.emit_expr(w, ctx, &args[0], t)?;
                    self.emit_expr(w, ctx, &args[1], t)?;
                    w.byte(op::cmp_op(cmp, t).expect("integer compare"));
                    w.byte(op::SELECT);
                }
                Ok(Some(Some(t)))
            }
            "select" => {
                self.expect_args(name, args, 3)?;
                let t = self.infer(ctx, &args[0])?;
                self.emit_expr(w, ctx, &args[0], t)?;
                self.emit_expr(w, ctx, &args[1], t)?;
                self.emit_expr(w, ctx, &args[2], ValType::I32)?;
                w.byte(op::SELECT);
                Ok(Some(Some(t)))
            }
            "memory_size" => {
                self.expect_args(name, args, 0)?;
                w.byte(op::MEMORY_SIZE);
                w.byte(0x00);
                Ok(Some(Some(ValType::I32)))
            }
            "memory_grow" => {
                self.expect_args(name, args, 1)?;
                self.emit_expr(w, ctx, &args[0], ValType::I32)?;
                w.byte(op::MEMORY_GROW);
                w.byte(0x00);
                Ok(Some(Some(ValType::I32)))
            }
            "memory_copy" => {
                self.expect_args(name, args, 3)?;
                for a in args {
                    self.emit_expr(w, ctx, a, ValType::I32)?;
                }
                w.byte(op::FC_PREFIX);
                w.u32(op::MEMORY_COPY);
                w.byte(0x00);
                w.byte(0x00);
                Ok(Some(None))
            }
            "memory_fill" => {
                self.expect_args(name, args, 3)?;
                for a in args {
                    self.emit_expr(w, ctx, a, ValType::I32)?;
                }
                w.byte(op::FC_PREFIX);
                w.u32(op::MEMORY_FILL);
                w.byte(0x00);
                Ok(Some(None))
            }
            _ => Ok(None),
        }
    }

    /// `wasm.<op>`: unsigned arithmetic and comparisons, sign extension,
    /// bit reinterpretation, saturating truncation. The operand type comes
    /// from the first argument, which makes unsuffixed literals default to
    /// i32.
    fn emit_wasm_escape(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        opname: &str,
        args: &[Expr],
        want: Option<ValType>,
    ) -> Result<ValType, CompileError> {
        if opname == "trunc_sat_s" || opname == "trunc_sat_u" {
            self.expect_args(opname, args, 1)?;
            let from = self.infer(ctx, &args[0])?;
            let to = match want {
                Some(t) if t.is_int() => t,
                _ => ValType::I32,
            };
            let unsigned = opname.ends_with("_u");
            let code = op::trunc_sat_op(from, to, unsigned).ok_or_else(|| {
                CompileError::Opcode(format!(
                    "no saturating truncation from {} to {}",
                    from, to
                ))
            })?;
            self.emit_expr(w, ctx, &args[0], from)?;
            w.byte(op::FC_PREFIX);
            w.u32(code);
            return Ok(to);
        }

        let binary = matches!(
            opname,
            "div_u" | "rem_u" | "shr_u" | "lt_u" | "gt_u" | "le_u" | "ge_u"
        );
        self.expect_args(opname, args, if binary { 2 } else { 1 })?;
        let from = self.infer(ctx, &args[0])?;
        let code = op::wasm_escape_op(opname, from).ok_or_else(|| {
            CompileError::Opcode(format!("no wasm.{} opcode for {}", opname, from))
        })?;
        self.emit_expr(w, ctx, &args[0], from)?;
        if binary {
            self.emit_expr(w, ctx, &args[1], from)?;
        }
        w.byte(code);
        op::wasm_escape_result(opname, from).ok_or_else(|| {
            CompileError::Opcode(format!("no wasm.{} result for {}", opname, from))
        })
    }

    /// Result type of a call form, mirroring the dispatch order without
    /// emitting anything. Used by inference.
    pub(super) fn call_result_type(
        &self,
        ctx: &FuncCtx,
        name: &str,
        args: &[Expr],
    ) -> Result<ValType, CompileError> {
        if VECTOR_CTORS.contains(&name) {
            return Ok(ValType::from_name(name).expect("vector family"));
        }
        if let Some(target) = ValType::from_name(name) {
            if !target.is_vector() {
                return Ok(target);
            }
        }
        if let Some((ns, opname)) = name.split_once('.') {
            if let Some((_, shape)) = op::simd_op(ns, opname) {
                let family = ValType::from_name(ns).expect("simd namespace");
                return Ok(match shape {
                    SimdShape::ExtractLane => family.lane(),
                    SimdShape::Test => ValType::I32,
                    SimdShape::Bitselect => ValType::V128,
                    _ => family,
                });
            }
        }
        match name {
            "sqrt" | "abs" | "floor" | "ceil" | "trunc" | "nearest" | "clz" | "ctz" | "popcnt"
            | "copysign" | "rotl" | "rotr" | "min" | "max" | "select" => {
                let first = args.first().ok_or_else(|| {
                    CompileError::Semantic(format!("'{}' expects arguments", name))
                })?;
                return self.infer(ctx, first);
            }
            "memory_size" | "memory_grow" => return Ok(ValType::I32),
            "memory_copy" | "memory_fill" => {
                return Err(CompileError::Semantic(format!(
                    "'{}' has no value to use in an expression",
                    name
                )));
            }
            _ => {}
        }
        if let Some(opname) = name.strip_prefix("wasm.") {
            if opname == "trunc_sat_s" || opname == "trunc_sat_u" {
                return Ok(ValType::I32);
            }
            let first = args.first().ok_or_else(|| {
                CompileError::Semantic(format!("'wasm.{}' expects arguments", opname))
            })?;
            let from = self.infer(ctx, first)?;
            return op::wasm_escape_result(opname, from).ok_or_else(|| {
                CompileError::Opcode(format!("no wasm.{} opcode for {}", opname, from))
            });
        }
        if let Some((_, sig)) = self.func_slot(ctx, name) {
            return sig.ret.ok_or_else(|| {
                CompileError::Semantic(format!(
                    "'{}' has no value to use in an expression",
                    name
                ))
            });
        }
        if let Some(sig) = self.func_sigs.get(name) {
            return sig.ret.ok_or_else(|| {
                CompileError::Semantic(format!(
                    "'{}' has no value to use in an expression",
                    name
                ))
            });
        }
        Err(CompileError::Semantic(format!(
            "undefined function '{}'",
            name
        )))
    }
}
