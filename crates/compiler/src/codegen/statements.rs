//! Statement emission
//!
//! Assignments (including the Fortran return-accumulator convention and
//! layout stores), structured control flow, and statement-level calls.
//! Loops lower to a block+loop pair; `break` branches to the innermost
//! enclosing loop's exit block, whose depth is tracked on a stack.

use super::{CodeGen, FuncCtx};
use crate::CompileError;
use crate::ast::{AssignOp, BinOp, Expr, Stmt};
use crate::opcodes as op;
use crate::types::ValType;
use crate::writer::ByteWriter;

impl<'a> CodeGen<'a> {
    pub(super) fn emit_stmt(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        s: &Stmt,
    ) -> Result<(), CompileError> {
        match s {
            Stmt::Assign { target, op, value } => self.emit_assign(w, ctx, target, *op, value),
            Stmt::ArrayStore {
                target,
                indices,
                op,
                value,
            } => self.emit_array_store(w, ctx, target, indices, *op, value),
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.emit_expr(w, ctx, cond, ValType::I32)?;
                w.byte(op::IF);
                w.byte(op::VOID_BLOCK);
                ctx.depth += 1;
                for s in then_body {
                    self.emit_stmt(w, ctx, s)?;
                }
                if let Some(body) = else_body {
                    w.byte(op::ELSE);
                    for s in body {
                        self.emit_stmt(w, ctx, s)?;
                    }
                }
                w.byte(op::END);
                ctx.depth -= 1;
                Ok(())
            }
            Stmt::For {
                var,
                start,
                end,
                step,
                body,
            } => self.emit_for(w, ctx, var, start, end, step.as_ref(), body),
            Stmt::While { cond, body } => {
                w.byte(op::BLOCK);
                w.byte(op::VOID_BLOCK);
                ctx.depth += 1;
                ctx.break_targets.push(ctx.depth);
                w.byte(op::LOOP);
                w.byte(op::VOID_BLOCK);
                ctx.depth += 1;
                self.emit_expr(w, ctx, cond, ValType::I32)?;
                w.byte(op::I32_EQZ);
                w.byte(op::BR_IF);
                w.u32(ctx.depth - ctx.break_targets.last().unwrap());
                for s in body {
                    self.emit_stmt(w, ctx, s)?;
                }
                w.byte(op::BR);
                w.u32(0);
                w.byte(op::END);
                ctx.depth -= 1;
                w.byte(op::END);
                ctx.depth -= 1;
                ctx.break_targets.pop();
                Ok(())
            }
            Stmt::DoWhile { body, cond } => {
                w.byte(op::BLOCK);
                w.byte(op::VOID_BLOCK);
                ctx.depth += 1;
                ctx.break_targets.push(ctx.depth);
                w.byte(op::LOOP);
                w.byte(op::VOID_BLOCK);
                ctx.depth += 1;
                for s in body {
                    self.emit_stmt(w, ctx, s)?;
                }
                self.emit_expr(w, ctx, cond, ValType::I32)?;
                w.byte(op::BR_IF);
                w.u32(0);
                w.byte(op::END);
                ctx.depth -= 1;
                w.byte(op::END);
                ctx.depth -= 1;
                ctx.break_targets.pop();
                Ok(())
            }
            Stmt::Break => {
                let target = *ctx.break_targets.last().ok_or_else(|| {
                    CompileError::Semantic(format!(
                        "'break' outside of a loop in '{}'",
                        ctx.func.name
                    ))
                })?;
                w.byte(op::BR);
                w.u32(ctx.depth - target);
                Ok(())
            }
            Stmt::Call { name, args, .. } => {
                if name == "return" {
                    return self.emit_return(w, ctx, args);
                }
                let result = self.dispatch_call(w, ctx, name, args, None)?;
                if result.is_some() {
                    // Statement calls keep the body stack-neutral.
                    w.byte(op::DROP);
                }
                Ok(())
            }
            Stmt::TailCall { name, args } => self.emit_tailcall(w, ctx, name, args),
        }
    }

    // ------------------------------------------------------------------
    // Assignment targets
    // ------------------------------------------------------------------

    fn emit_assign(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        target: &str,
        aop: AssignOp,
        value: &Expr,
    ) -> Result<(), CompileError> {
        // Writing the function's own name assigns the return accumulator.
        if target == ctx.func.name && ctx.ret.is_some() {
            let ty = ctx.ret.unwrap();
            let idx = ctx.ret_index;
            self.emit_value(w, ctx, aop, value, ty, |w| {
                w.byte(op::LOCAL_GET);
                w.u32(idx);
            })?;
            w.byte(op::LOCAL_SET);
            w.u32(idx);
            return Ok(());
        }
        if let Some(slot) = ctx.locals.get(target) {
            let (idx, ty) = (slot.index, slot.ty);
            self.emit_value(w, ctx, aop, value, ty, |w| {
                w.byte(op::LOCAL_GET);
                w.u32(idx);
            })?;
            w.byte(op::LOCAL_SET);
            w.u32(idx);
            return Ok(());
        }
        if let Some(g) = self.globals.get(target) {
            if !g.mutable {
                return Err(CompileError::Semantic(format!(
                    "cannot assign to constant '{}'",
                    target
                )));
            }
            let (idx, ty) = (g.index, g.ty);
            self.emit_value(w, ctx, aop, value, ty, |w| {
                w.byte(op::GLOBAL_GET);
                w.u32(idx);
            })?;
            w.byte(op::GLOBAL_SET);
            w.u32(idx);
            return Ok(());
        }
        if let Some(path) = self.resolve_path(ctx, target) {
            if path.nested {
                return Err(CompileError::Semantic(format!(
                    "cannot assign to embedded layout '{}'",
                    target
                )));
            }
            self.emit_path_addr(w, &path);
            match aop {
                AssignOp::Set => self.emit_expr(w, ctx, value, path.ty)?,
                _ => {
                    self.emit_path_addr(w, &path);
                    self.emit_load(w, path.ty);
                    self.emit_expr(w, ctx, value, path.ty)?;
                    self.emit_compound_op(w, aop, path.ty)?;
                }
            }
            self.emit_store(w, path.ty);
            return Ok(());
        }
        Err(CompileError::Semantic(format!(
            "undefined name '{}'",
            target
        )))
    }

    /// Emit the right-hand side, prefixed with a read of the current value
    /// for compound operators.
    fn emit_value(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        aop: AssignOp,
        value: &Expr,
        ty: ValType,
        read: impl Fn(&mut ByteWriter),
    ) -> Result<(), CompileError> {
        if aop == AssignOp::Set {
            return self.emit_expr(w, ctx, value, ty);
        }
        read(w);
        self.emit_expr(w, ctx, value, ty)?;
        self.emit_compound_op(w, aop, ty)
    }

    fn emit_compound_op(
        &self,
        w: &mut ByteWriter,
        aop: AssignOp,
        ty: ValType,
    ) -> Result<(), CompileError> {
        let bin = match aop {
            AssignOp::Add => BinOp::Add,
            AssignOp::Sub => BinOp::Sub,
            AssignOp::Mul => BinOp::Mul,
            AssignOp::Div => BinOp::Div,
            AssignOp::Set => unreachable!("plain assignment"),
        };
        if ty.is_vector() {
            let code = op::simd_arith_op(bin, ty).ok_or_else(|| {
                CompileError::Opcode(format!("no {:?} opcode for {}", bin, ty))
            })?;
            w.byte(op::SIMD_PREFIX);
            w.u32(code);
        } else {
            let code = op::arith_op(bin, ty).ok_or_else(|| {
                CompileError::Opcode(format!("no {:?} opcode for {}", bin, ty))
            })?;
            w.byte(code);
        }
        Ok(())
    }

    fn emit_array_store(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        target: &str,
        indices: &[Expr],
        aop: AssignOp,
        value: &Expr,
    ) -> Result<(), CompileError> {
        let elem = self.emit_array_addr(w, ctx, target, indices)?;
        match aop {
            AssignOp::Set => self.emit_expr(w, ctx, value, elem)?,
            _ => {
                self.emit_array_addr(w, ctx, target, indices)?;
                self.emit_load(w, elem);
                self.emit_expr(w, ctx, value, elem)?;
                self.emit_compound_op(w, aop, elem)?;
            }
        }
        self.emit_store(w, elem);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    /// `for v := start, end [, step]`. The bound is exclusive: the loop
    /// exits when `v >= end` (or `v <= end` for a negative constant step).
    fn emit_for(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        var: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        let ty = self.loop_var_type(ctx, var)?;
        self.emit_assign(w, ctx, var, AssignOp::Set, start)?;

        let negative_step = step.and_then(|s| s.const_f64()).is_some_and(|v| v < 0.0);
        let exit_cmp = if negative_step { BinOp::Le } else { BinOp::Ge };

        w.byte(op::BLOCK);
        w.byte(op::VOID_BLOCK);
        ctx.depth += 1;
        ctx.break_targets.push(ctx.depth);
        w.byte(op::LOOP);
        w.byte(op::VOID_BLOCK);
        ctx.depth += 1;

        self.emit_name_read(w, ctx, var)?;
        self.emit_expr(w, ctx, end, ty)?;
        let code = op::cmp_op(exit_cmp, ty).ok_or_else(|| {
            CompileError::Semantic(format!("loop variable '{}' must be scalar", var))
        })?;
        w.byte(code);
        w.byte(op::BR_IF);
        w.u32(ctx.depth - ctx.break_targets.last().unwrap());

        for s in body {
            self.emit_stmt(w, ctx, s)?;
        }

        // Increment: v := v + step (default 1).
        self.emit_name_read(w, ctx, var)?;
        match step {
            Some(s) => self.emit_expr(w, ctx, s, ty)?,
            None => self.emit_expr(w, ctx, &Expr::num("1"), ty)?,
        }
        w.byte(op::arith_op(BinOp::Add, ty).expect("scalar add"));
        self.emit_var_write(w, ctx, var)?;
        w.byte(op::BR);
        w.u32(0);

        w.byte(op::END);
        ctx.depth -= 1;
        w.byte(op::END);
        ctx.depth -= 1;
        ctx.break_targets.pop();
        Ok(())
    }

    fn loop_var_type(&self, ctx: &FuncCtx, var: &str) -> Result<ValType, CompileError> {
        if let Some(slot) = ctx.locals.get(var) {
            return Ok(slot.ty);
        }
        if let Some(g) = self.globals.get(var) {
            return Ok(g.ty);
        }
        Err(CompileError::Semantic(format!(
            "undefined loop variable '{}'",
            var
        )))
    }

    fn emit_var_write(
        &self,
        w: &mut ByteWriter,
        ctx: &FuncCtx,
        var: &str,
    ) -> Result<(), CompileError> {
        if let Some(slot) = ctx.locals.get(var) {
            w.byte(op::LOCAL_SET);
            w.u32(slot.index);
            return Ok(());
        }
        if let Some(g) = self.globals.get(var) {
            w.byte(op::GLOBAL_SET);
            w.u32(g.index);
            return Ok(());
        }
        Err(CompileError::Semantic(format!("undefined name '{}'", var)))
    }

    // ------------------------------------------------------------------
    // Returns and tail calls
    // ------------------------------------------------------------------

    /// `call return(x)` in a function, `call return()` in a subroutine.
    fn emit_return(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        args: &[Expr],
    ) -> Result<(), CompileError> {
        match ctx.ret {
            Some(ty) => {
                if args.len() != 1 {
                    return Err(CompileError::Semantic(format!(
                        "return() in function '{}' takes exactly one value",
                        ctx.func.name
                    )));
                }
                self.emit_expr(w, ctx, &args[0], ty)?;
            }
            None => {
                if !args.is_empty() {
                    return Err(CompileError::Semantic(format!(
                        "return() in subroutine '{}' takes no value",
                        ctx.func.name
                    )));
                }
            }
        }
        w.byte(op::RETURN);
        Ok(())
    }

    fn emit_tailcall(
        &self,
        w: &mut ByteWriter,
        ctx: &mut FuncCtx,
        name: &str,
        args: &[Expr],
    ) -> Result<(), CompileError> {
        // Indirect tail call through a function-typed slot.
        if let Some((place, sig)) = self.func_slot(ctx, name) {
            if args.len() != sig.params.len() {
                return Err(CompileError::Semantic(format!(
                    "'{}' expects {} arguments, got {}",
                    name,
                    sig.params.len(),
                    args.len()
                )));
            }
            for (a, p) in args.iter().zip(&sig.params) {
                self.emit_expr(w, ctx, a, *p)?;
            }
            match place {
                super::expressions::Place::Local(idx) => {
                    w.byte(op::LOCAL_GET);
                    w.u32(idx);
                }
                super::expressions::Place::Global(idx) => {
                    w.byte(op::GLOBAL_GET);
                    w.u32(idx);
                }
            }
            w.byte(op::RETURN_CALL_INDIRECT);
            w.u32(self.sig_id(&sig));
            w.byte(0x00);
            return Ok(());
        }

        let sig = self
            .func_sigs
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::Semantic(format!("undefined function '{}'", name)))?;
        if sig.ret != ctx.ret {
            return Err(CompileError::Semantic(format!(
                "tailcall '{}': return type {} does not match '{}' returning {}",
                name,
                sig.ret.map(|t| t.name()).unwrap_or("nothing"),
                ctx.func.name,
                ctx.ret.map(|t| t.name()).unwrap_or("nothing"),
            )));
        }
        if args.len() != sig.params.len() {
            return Err(CompileError::Semantic(format!(
                "'{}' expects {} arguments, got {}",
                name,
                sig.params.len(),
                args.len()
            )));
        }
        for (a, p) in args.iter().zip(&sig.params) {
            self.emit_expr(w, ctx, a, *p)?;
        }
        w.byte(op::RETURN_CALL);
        w.u32(self.func_index[name]);
        Ok(())
    }
}
