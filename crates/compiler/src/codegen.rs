//! Wasm code generation
//!
//! Emits a Wasm 1.0 module (with SIMD-128 and tail calls) straight from the
//! AST: no intermediate representation and no optimisation passes. The
//! generator runs its pre-emission passes first (classify items, compute
//! layouts, scan call targets and `@` references, build the index spaces)
//! and then writes the sections in order. Index tables are frozen once built;
//! body emission only reads them.
//!
//! Section order: Type(1), Import(2), Function(3), Table(4), Memory(5),
//! Global(6), Export(7), Element(9), Code(10).

mod calls;
mod expressions;
mod statements;

use crate::CompileError;
use crate::ast::{DeclType, Expr, Function, Item, Program, Stmt};
use crate::config::CompilerConfig;
use crate::layout::{Layout, compute_layouts};
use crate::opcodes as op;
use crate::parser::lowered;
use crate::types::{FuncSig, ValType};
use crate::writer::ByteWriter;
use indexmap::{IndexMap, IndexSet};

pub(crate) struct GlobalInfo<'a> {
    index: u32,
    ty: ValType,
    mutable: bool,
    init: Option<&'a Expr>,
    sig: Option<FuncSig>,
    layout: Option<String>,
}

struct ImportInfo {
    module: String,
    field: String,
    sig: FuncSig,
    /// Synthesised (math/host) rather than declared; auto imports enter the
    /// table only when explicitly referenced.
    auto: bool,
}

/// Per-function emission state, built fresh for each body and discarded
/// afterwards.
pub(crate) struct FuncCtx<'a> {
    func: &'a Function,
    locals: IndexMap<String, LocalSlot>,
    ret: Option<ValType>,
    /// Index of the hidden `$_return` accumulator (functions only).
    ret_index: u32,
    /// Block depth of each enclosing loop's exit block; `break` branches to
    /// the innermost entry.
    break_targets: Vec<u32>,
    /// Current structured-control nesting depth.
    depth: u32,
}

#[derive(Clone)]
pub(crate) struct LocalSlot {
    index: u32,
    ty: ValType,
    sig: Option<FuncSig>,
    layout: Option<String>,
    array_elem: Option<ValType>,
    /// Constant dimensions from an `array(d0, d1)` declaration.
    dims: Vec<i64>,
}

pub struct CodeGen<'a> {
    program: &'a Program,
    config: &'a CompilerConfig,
    layouts: IndexMap<String, Layout>,
    globals: IndexMap<String, GlobalInfo<'a>>,
    funcs: Vec<&'a Function>,
    imports: IndexMap<String, ImportInfo>,
    func_index: IndexMap<String, u32>,
    func_sigs: IndexMap<String, FuncSig>,
    sig_ids: IndexMap<String, u32>,
    sigs: Vec<FuncSig>,
    table_slots: IndexMap<String, u32>,
    func_refs: IndexSet<String>,
    uses_table: bool,
    owns_memory: bool,
    import_memory: bool,
}

impl<'a> CodeGen<'a> {
    pub fn new(program: &'a Program, config: &'a CompilerConfig) -> Self {
        CodeGen {
            program,
            config,
            layouts: IndexMap::new(),
            globals: IndexMap::new(),
            funcs: Vec::new(),
            imports: IndexMap::new(),
            func_index: IndexMap::new(),
            func_sigs: IndexMap::new(),
            sig_ids: IndexMap::new(),
            sigs: Vec::new(),
            table_slots: IndexMap::new(),
            func_refs: IndexSet::new(),
            uses_table: false,
            owns_memory: false,
            import_memory: false,
        }
    }

    /// Run the pre-emission passes, then emit the module bytes.
    pub fn compile(&mut self) -> Result<Vec<u8>, CompileError> {
        self.classify()?;
        self.layouts = compute_layouts(self.program.layouts())?;
        self.scan_call_targets()?;
        self.scan_func_refs();
        self.build_indices()?;
        self.build_table()?;
        self.decide_memory();
        self.emit_module()
    }

    /// Table-slot side table (`__table`), present when indirect calls are
    /// possible.
    pub fn table_slots(&self) -> Option<&IndexMap<String, u32>> {
        if self.uses_table {
            Some(&self.table_slots)
        } else {
            None
        }
    }

    /// Layout offset side table (`__layouts`), present when any layout was
    /// declared.
    pub fn layout_tables(&self) -> Option<IndexMap<String, IndexMap<String, u32>>> {
        if self.layouts.is_empty() {
            None
        } else {
            Some(
                self.layouts
                    .iter()
                    .map(|(name, l)| (name.clone(), l.offset_table()))
                    .collect(),
            )
        }
    }

    // ------------------------------------------------------------------
    // Pre-emission passes
    // ------------------------------------------------------------------

    fn classify(&mut self) -> Result<(), CompileError> {
        let program = self.program;
        for item in &program.items {
            match item {
                Item::Const(c) => {
                    let index = self.globals.len() as u32;
                    let prev = self.globals.insert(
                        c.name.clone(),
                        GlobalInfo {
                            index,
                            ty: c.vtype,
                            mutable: false,
                            init: Some(&c.init),
                            sig: None,
                            layout: None,
                        },
                    );
                    if prev.is_some() {
                        return Err(CompileError::Semantic(format!(
                            "duplicate global '{}'",
                            c.name
                        )));
                    }
                }
                Item::Var(v) => {
                    if matches!(v.vtype, DeclType::Array { .. }) {
                        return Err(CompileError::Semantic(format!(
                            "global '{}': arrays are passed as parameters, not globals",
                            v.name
                        )));
                    }
                    let index = self.globals.len() as u32;
                    let sig = match &v.vtype {
                        DeclType::Func(s) => Some(s.clone()),
                        _ => None,
                    };
                    let layout = match &v.vtype {
                        DeclType::Layout(l) => Some(l.clone()),
                        _ => None,
                    };
                    let prev = self.globals.insert(
                        v.name.clone(),
                        GlobalInfo {
                            index,
                            ty: lowered(&v.vtype),
                            mutable: true,
                            init: v.init.as_ref(),
                            sig,
                            layout,
                        },
                    );
                    if prev.is_some() {
                        return Err(CompileError::Semantic(format!(
                            "duplicate global '{}'",
                            v.name
                        )));
                    }
                }
                Item::Function(f) => self.funcs.push(f),
                Item::Import(d) => {
                    let prev = self.imports.insert(
                        d.name.clone(),
                        ImportInfo {
                            module: d.module.clone(),
                            field: d.name.clone(),
                            sig: FuncSig::new(d.params.clone(), d.ret),
                            auto: false,
                        },
                    );
                    if prev.is_some() {
                        return Err(CompileError::Semantic(format!(
                            "duplicate import '{}'",
                            d.name
                        )));
                    }
                }
                Item::Layout(_) => {}
            }
        }
        Ok(())
    }

    fn is_local_function(&self, name: &str) -> bool {
        self.funcs.iter().any(|f| f.name == name)
    }

    /// Names the call dispatcher resolves without an index-space entry.
    fn is_intrinsic_name(name: &str) -> bool {
        if name == "return" {
            return true;
        }
        if ValType::from_name(name).is_some() {
            return true;
        }
        if name.starts_with("wasm.") {
            return true;
        }
        if let Some((ns, opname)) = name.split_once('.') {
            if op::simd_op(ns, opname).is_some() {
                return true;
            }
        }
        matches!(
            name,
            "sqrt"
                | "abs"
                | "floor"
                | "ceil"
                | "trunc"
                | "nearest"
                | "copysign"
                | "min"
                | "max"
                | "select"
                | "clz"
                | "ctz"
                | "popcnt"
                | "rotl"
                | "rotr"
                | "memory_size"
                | "memory_grow"
                | "memory_copy"
                | "memory_fill"
        )
    }

    /// Walk every body for call targets. Unresolved math builtins become
    /// `math.<name>` imports; names known to the host surface (and
    /// interpolation markers) become `host.<name>` imports. A `**` whose
    /// exponent is not the literal 0.5 pulls in `pow`.
    fn scan_call_targets(&mut self) -> Result<(), CompileError> {
        let mut targets: Vec<(String, usize, bool)> = Vec::new();
        for f in &self.funcs {
            let local_names: IndexSet<&str> = f
                .params
                .iter()
                .chain(f.locals.iter())
                .map(|p| p.name.as_str())
                .collect();
            let mut collect = |name: &str, argc: usize, interp: bool| {
                if !local_names.contains(name) {
                    targets.push((name.to_string(), argc, interp));
                }
            };
            for s in &f.body {
                scan_stmt(s, &mut collect);
            }
        }

        for (name, argc, interp) in targets {
            if name == "pow" && !self.is_local_function("pow") && !self.imports.contains_key("pow")
            {
                self.imports.insert(
                    "pow".to_string(),
                    ImportInfo {
                        module: "math".to_string(),
                        field: "pow".to_string(),
                        sig: FuncSig::new(vec![ValType::F64; 2], Some(ValType::F64)),
                        auto: true,
                    },
                );
                continue;
            }
            if self.is_local_function(&name)
                || self.imports.contains_key(&name)
                || self.globals.contains_key(&name)
                || Self::is_intrinsic_name(&name)
            {
                continue;
            }
            if let Some(arity) = op::math_import_arity(&name) {
                self.imports.insert(
                    name.clone(),
                    ImportInfo {
                        module: "math".to_string(),
                        field: name.clone(),
                        sig: FuncSig::new(vec![ValType::F64; arity], Some(ValType::F64)),
                        auto: true,
                    },
                );
                continue;
            }
            let host_arity = self.config.host_functions.get(&name).copied();
            if let Some(arity) = host_arity.or(if interp { Some(argc) } else { None }) {
                self.imports.insert(
                    name.clone(),
                    ImportInfo {
                        module: "host".to_string(),
                        field: name.clone(),
                        sig: FuncSig::new(vec![ValType::F64; arity], Some(ValType::F64)),
                        auto: true,
                    },
                );
            }
            // Anything still unresolved fails at emission with a proper
            // undefined-name error.
        }
        Ok(())
    }

    fn scan_func_refs(&mut self) {
        let mut refs = IndexSet::new();
        for f in &self.funcs {
            let mut collect = |e: &Expr| {
                if let Expr::FuncRef(name) = e {
                    refs.insert(name.clone());
                }
            };
            for s in &f.body {
                scan_stmt_exprs(s, &mut collect);
            }
        }
        self.func_refs = refs;
    }

    /// funcIndex (imports first, then local functions), globalIndex (already
    /// assigned in declaration order), and the deduplicated signature table.
    fn build_indices(&mut self) -> Result<(), CompileError> {
        for (name, info) in &self.imports {
            let idx = self.func_index.len() as u32;
            if self.func_index.insert(name.clone(), idx).is_some() {
                return Err(CompileError::Semantic(format!("duplicate name '{}'", name)));
            }
            self.func_sigs.insert(name.clone(), info.sig.clone());
        }
        for f in &self.funcs {
            let idx = self.func_index.len() as u32;
            if self.func_index.insert(f.name.clone(), idx).is_some() {
                return Err(CompileError::Semantic(format!(
                    "duplicate function '{}'",
                    f.name
                )));
            }
            self.func_sigs.insert(f.name.clone(), function_sig(f));
        }

        let sigs: Vec<FuncSig> = self.func_sigs.values().cloned().collect();
        for sig in sigs {
            self.intern_sig(&sig);
        }
        // Signatures captured by function-typed slots must also be in the
        // type section for call_indirect.
        let mut captured: Vec<FuncSig> = Vec::new();
        for g in self.globals.values() {
            if let Some(sig) = &g.sig {
                captured.push(sig.clone());
            }
        }
        for f in &self.funcs {
            for p in f.params.iter().chain(f.locals.iter()) {
                if let DeclType::Func(sig) = &p.dtype {
                    captured.push(sig.clone());
                }
            }
        }
        for sig in captured {
            self.intern_sig(&sig);
        }
        Ok(())
    }

    fn intern_sig(&mut self, sig: &FuncSig) -> u32 {
        let key = sig.key();
        if let Some(&id) = self.sig_ids.get(&key) {
            return id;
        }
        let id = self.sigs.len() as u32;
        self.sig_ids.insert(key, id);
        self.sigs.push(sig.clone());
        id
    }

    fn sig_id(&self, sig: &FuncSig) -> u32 {
        self.sig_ids[&sig.key()]
    }

    /// Indirect calls are possible when any param, local, or global carries a
    /// function signature (or a `@` reference exists to feed one). The table
    /// then holds every explicit import and local function; auto imports
    /// join only when referenced. Slots are sorted by funcIndex so the
    /// element segment is deterministic.
    fn build_table(&mut self) -> Result<(), CompileError> {
        let has_func_slot = self.globals.values().any(|g| g.sig.is_some())
            || self.funcs.iter().any(|f| {
                f.params
                    .iter()
                    .chain(f.locals.iter())
                    .any(|p| matches!(p.dtype, DeclType::Func(_)))
            });
        self.uses_table = has_func_slot || !self.func_refs.is_empty();
        if !self.uses_table {
            return Ok(());
        }

        let mut members: IndexSet<String> = IndexSet::new();
        for (name, info) in &self.imports {
            if !info.auto {
                members.insert(name.clone());
            }
        }
        for f in &self.funcs {
            members.insert(f.name.clone());
        }
        for name in &self.func_refs {
            if !self.func_index.contains_key(name) {
                return Err(CompileError::Semantic(format!(
                    "function reference '@{}' does not name a function",
                    name
                )));
            }
            members.insert(name.clone());
        }

        let mut ordered: Vec<String> = members.into_iter().collect();
        ordered.sort_by_key(|name| self.func_index[name]);
        for (slot, name) in ordered.into_iter().enumerate() {
            self.table_slots.insert(name, slot as u32);
        }
        Ok(())
    }

    /// One page of internal memory when a function takes an array and the
    /// host supplied none; otherwise memory is imported as `env.memory`.
    fn decide_memory(&mut self) {
        let has_array_param = self.funcs.iter().any(|f| {
            f.params
                .iter()
                .any(|p| matches!(p.dtype, DeclType::Array { .. }))
        });
        self.owns_memory = has_array_param && !self.config.memory;
        self.import_memory = !self.owns_memory;
    }

    // ------------------------------------------------------------------
    // Section emission
    // ------------------------------------------------------------------

    fn emit_module(&self) -> Result<Vec<u8>, CompileError> {
        let mut w = ByteWriter::new();
        w.bytes(b"\0asm");
        w.bytes(&[0x01, 0x00, 0x00, 0x00]);

        // Type (1)
        w.section(1, |s| {
            s.u32(self.sigs.len() as u32);
            for sig in &self.sigs {
                s.byte(0x60);
                s.u32(sig.params.len() as u32);
                for p in &sig.params {
                    s.byte(p.code());
                }
                match sig.ret {
                    Some(r) => {
                        s.u32(1);
                        s.byte(r.code());
                    }
                    None => s.u32(0),
                }
            }
        });

        // Import (2)
        if !self.imports.is_empty() || self.import_memory {
            w.section(2, |s| {
                s.u32(self.imports.len() as u32 + self.import_memory as u32);
                for info in self.imports.values() {
                    s.str(&info.module);
                    s.str(&info.field);
                    s.byte(0x00);
                    s.u32(self.sig_id(&info.sig));
                }
                if self.import_memory {
                    s.str("env");
                    s.str("memory");
                    s.byte(0x02);
                    s.byte(0x00);
                    s.u32(1);
                }
            });
        }

        // Function (3)
        w.section(3, |s| {
            s.u32(self.funcs.len() as u32);
            for f in &self.funcs {
                s.u32(self.sig_id(&self.func_sigs[&f.name]));
            }
        });

        // Table (4)
        if self.uses_table {
            w.section(4, |s| {
                s.u32(1);
                s.byte(op::FUNCREF);
                s.byte(0x00);
                s.u32(self.table_slots.len() as u32);
            });
        }

        // Memory (5)
        if self.owns_memory {
            w.section(5, |s| {
                s.u32(1);
                s.byte(0x00);
                s.u32(1);
            });
        }

        // Global (6)
        if !self.globals.is_empty() {
            let mut content = ByteWriter::new();
            content.u32(self.globals.len() as u32);
            for (name, g) in &self.globals {
                content.byte(g.ty.code());
                content.byte(g.mutable as u8);
                self.emit_global_init(&mut content, name, g)?;
                content.byte(op::END);
            }
            w.section(6, |s| s.bytes(content.as_slice()));
        }

        // Export (7): every local function under its original name, plus the
        // memory when we own it.
        w.section(7, |s| {
            s.u32(self.funcs.len() as u32 + self.owns_memory as u32);
            for f in &self.funcs {
                s.str(&f.name);
                s.byte(0x00);
                s.u32(self.func_index[&f.name]);
            }
            if self.owns_memory {
                s.str("memory");
                s.byte(0x02);
                s.u32(0);
            }
        });

        // Element (9)
        if self.uses_table && !self.table_slots.is_empty() {
            w.section(9, |s| {
                s.u32(1);
                s.byte(0x00);
                s.byte(op::I32_CONST);
                s.s32(0);
                s.byte(op::END);
                s.u32(self.table_slots.len() as u32);
                for name in self.table_slots.keys() {
                    s.u32(self.func_index[name]);
                }
            });
        }

        // Code (10)
        let mut code = ByteWriter::new();
        code.u32(self.funcs.len() as u32);
        for f in &self.funcs {
            let body = self.emit_body(f)?;
            code.u32(body.len() as u32);
            code.bytes(&body);
        }
        w.section(10, |s| s.bytes(code.as_slice()));

        Ok(w.into_bytes())
    }

    /// Global initialisers are a single numeric literal, a negated literal,
    /// or zero. Vector globals are zero-filled.
    fn emit_global_init(
        &self,
        w: &mut ByteWriter,
        name: &str,
        g: &GlobalInfo,
    ) -> Result<(), CompileError> {
        if g.ty.is_vector() {
            w.byte(op::SIMD_PREFIX);
            w.u32(op::V128_CONST);
            w.bytes(&[0u8; 16]);
            return Ok(());
        }
        let init = g.init;
        match g.ty {
            ValType::I32 => {
                w.byte(op::I32_CONST);
                w.s32(self.const_int(name, init)? as i32);
            }
            ValType::I64 => {
                w.byte(op::I64_CONST);
                w.s64(self.const_int(name, init)?);
            }
            ValType::F32 => {
                w.byte(op::F32_CONST);
                w.f32(self.const_float(name, init)? as f32);
            }
            ValType::F64 => {
                w.byte(op::F64_CONST);
                w.f64(self.const_float(name, init)?);
            }
            _ => unreachable!("vector handled above"),
        }
        Ok(())
    }

    fn const_int(&self, name: &str, init: Option<&Expr>) -> Result<i64, CompileError> {
        match init {
            None => Ok(0),
            Some(e) => e.const_i64().ok_or_else(|| {
                CompileError::Semantic(format!("global '{}' initialiser is not a constant", name))
            }),
        }
    }

    fn const_float(&self, name: &str, init: Option<&Expr>) -> Result<f64, CompileError> {
        match init {
            None => Ok(0.0),
            Some(e) => e.const_f64().ok_or_else(|| {
                CompileError::Semantic(format!("global '{}' initialiser is not a constant", name))
            }),
        }
    }

    // ------------------------------------------------------------------
    // Function bodies
    // ------------------------------------------------------------------

    fn emit_body(&self, f: &'a Function) -> Result<Vec<u8>, CompileError> {
        let ctx = self.build_ctx(f)?;
        let mut w = ByteWriter::new();

        // Local declarations, compacted into runs of identical type.
        // Parameters are implicit; declared locals follow the hidden
        // `$_return` accumulator.
        let param_count = f.params.len();
        let local_codes: Vec<u8> = ctx
            .locals
            .values()
            .filter(|slot| slot.index as usize >= param_count)
            .map(|slot| slot.ty.code())
            .collect();
        let mut runs: Vec<(u32, u8)> = Vec::new();
        for code in local_codes {
            match runs.last_mut() {
                Some((count, last)) if *last == code => *count += 1,
                _ => runs.push((1, code)),
            }
        }
        w.u32(runs.len() as u32);
        for (count, code) in runs {
            w.u32(count);
            w.byte(code);
        }

        let mut ctx = ctx;
        for s in &f.body {
            self.emit_stmt(&mut w, &mut ctx, s)?;
        }

        // Epilogue: functions return the accumulator; subroutines just end.
        if ctx.ret.is_some() {
            w.byte(op::LOCAL_GET);
            w.u32(ctx.ret_index);
        }
        w.byte(op::END);
        Ok(w.into_bytes())
    }

    fn build_ctx(&self, f: &'a Function) -> Result<FuncCtx<'a>, CompileError> {
        let mut locals: IndexMap<String, LocalSlot> = IndexMap::new();
        let mut index = 0u32;
        for p in &f.params {
            let slot = self.make_slot(f, p, index)?;
            if locals.insert(p.name.clone(), slot).is_some() {
                return Err(CompileError::Semantic(format!(
                    "duplicate parameter '{}' in '{}'",
                    p.name, f.name
                )));
            }
            index += 1;
        }
        let ret_index = index;
        if let Some(ret) = f.ret {
            // The return accumulator is a real local, first after the
            // parameters.
            locals.insert(
                "$_return".to_string(),
                LocalSlot {
                    index,
                    ty: ret,
                    sig: None,
                    layout: None,
                    array_elem: None,
                    dims: Vec::new(),
                },
            );
            index += 1;
        }
        for l in &f.locals {
            let slot = self.make_slot(f, l, index)?;
            if locals.insert(l.name.clone(), slot).is_some() {
                return Err(CompileError::Semantic(format!(
                    "duplicate local '{}' in '{}'",
                    l.name, f.name
                )));
            }
            index += 1;
        }
        Ok(FuncCtx {
            func: f,
            locals,
            ret: f.ret,
            ret_index,
            break_targets: Vec::new(),
            depth: 0,
        })
    }

    fn make_slot(
        &self,
        f: &Function,
        p: &crate::ast::Param,
        index: u32,
    ) -> Result<LocalSlot, CompileError> {
        let mut slot = LocalSlot {
            index,
            ty: lowered(&p.dtype),
            sig: None,
            layout: None,
            array_elem: None,
            dims: Vec::new(),
        };
        match &p.dtype {
            DeclType::Scalar(_) => {}
            DeclType::Func(sig) => slot.sig = Some(sig.clone()),
            DeclType::Layout(name) => {
                if !self.layouts.contains_key(name) {
                    return Err(CompileError::Semantic(format!(
                        "unknown layout '{}' for '{}' in '{}'",
                        name, p.name, f.name
                    )));
                }
                slot.layout = Some(name.clone());
            }
            DeclType::Array { elem, dims } => {
                slot.array_elem = Some(*elem);
                for d in dims {
                    let v = d.const_i64().ok_or_else(|| {
                        CompileError::Semantic(format!(
                            "array dimensions of '{}' in '{}' must be constant",
                            p.name, f.name
                        ))
                    })?;
                    slot.dims.push(v);
                }
            }
        }
        Ok(slot)
    }
}

/// Wasm-level signature of a function item: lowered parameter types plus the
/// optional return type.
fn function_sig(f: &Function) -> FuncSig {
    FuncSig::new(f.params.iter().map(|p| lowered(&p.dtype)).collect(), f.ret)
}

/// Walk one statement, reporting every call target (name, arg count,
/// interpolation flag) plus the implicit `pow` from non-sqrt `**`.
fn scan_stmt(s: &Stmt, collect: &mut impl FnMut(&str, usize, bool)) {
    match s {
        Stmt::Assign { value, .. } => scan_expr(value, collect),
        Stmt::ArrayStore { indices, value, .. } => {
            for i in indices {
                scan_expr(i, collect);
            }
            scan_expr(value, collect);
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            scan_expr(cond, collect);
            for s in then_body {
                scan_stmt(s, collect);
            }
            if let Some(body) = else_body {
                for s in body {
                    scan_stmt(s, collect);
                }
            }
        }
        Stmt::For {
            start,
            end,
            step,
            body,
            ..
        } => {
            scan_expr(start, collect);
            scan_expr(end, collect);
            if let Some(step) = step {
                scan_expr(step, collect);
            }
            for s in body {
                scan_stmt(s, collect);
            }
        }
        Stmt::While { cond, body } => {
            scan_expr(cond, collect);
            for s in body {
                scan_stmt(s, collect);
            }
        }
        Stmt::DoWhile { body, cond } => {
            for s in body {
                scan_stmt(s, collect);
            }
            scan_expr(cond, collect);
        }
        Stmt::Break => {}
        Stmt::Call { name, args, interp } => {
            collect(name, args.len(), *interp);
            for a in args {
                scan_expr(a, collect);
            }
        }
        Stmt::TailCall { name, args } => {
            collect(name, args.len(), false);
            for a in args {
                scan_expr(a, collect);
            }
        }
    }
}

fn scan_expr(e: &Expr, collect: &mut impl FnMut(&str, usize, bool)) {
    match e {
        Expr::Num { .. } | Expr::Ident { .. } | Expr::FuncRef(_) => {}
        Expr::Bin { op, lhs, rhs } => {
            if *op == crate::ast::BinOp::Pow && rhs.const_f64() != Some(0.5) {
                collect("pow", 2, false);
            }
            scan_expr(lhs, collect);
            scan_expr(rhs, collect);
        }
        Expr::Unary { operand, .. } => scan_expr(operand, collect),
        Expr::Call { name, args, interp } => {
            collect(name, args.len(), *interp);
            for a in args {
                scan_expr(a, collect);
            }
        }
        Expr::Index { indices, .. } => {
            for i in indices {
                scan_expr(i, collect);
            }
        }
        Expr::IfExpr {
            cond,
            then_val,
            else_val,
        } => {
            scan_expr(cond, collect);
            scan_expr(then_val, collect);
            scan_expr(else_val, collect);
        }
    }
}

/// Walk a statement's expressions (for the `@` reference scan).
fn scan_stmt_exprs(s: &Stmt, collect: &mut impl FnMut(&Expr)) {
    match s {
        Stmt::Assign { value, .. } => walk_expr(value, collect),
        Stmt::ArrayStore { indices, value, .. } => {
            for i in indices {
                walk_expr(i, collect);
            }
            walk_expr(value, collect);
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            walk_expr(cond, collect);
            for s in then_body {
                scan_stmt_exprs(s, collect);
            }
            if let Some(body) = else_body {
                for s in body {
                    scan_stmt_exprs(s, collect);
                }
            }
        }
        Stmt::For {
            start,
            end,
            step,
            body,
            ..
        } => {
            walk_expr(start, collect);
            walk_expr(end, collect);
            if let Some(step) = step {
                walk_expr(step, collect);
            }
            for s in body {
                scan_stmt_exprs(s, collect);
            }
        }
        Stmt::While { cond, body } => {
            walk_expr(cond, collect);
            for s in body {
                scan_stmt_exprs(s, collect);
            }
        }
        Stmt::DoWhile { body, cond } => {
            for s in body {
                scan_stmt_exprs(s, collect);
            }
            walk_expr(cond, collect);
        }
        Stmt::Break => {}
        Stmt::Call { args, .. } | Stmt::TailCall { args, .. } => {
            for a in args {
                walk_expr(a, collect);
            }
        }
    }
}

fn walk_expr(e: &Expr, collect: &mut impl FnMut(&Expr)) {
    collect(e);
    match e {
        Expr::Num { .. } | Expr::Ident { .. } | Expr::FuncRef(_) => {}
        Expr::Bin { lhs, rhs, .. } => {
            walk_expr(lhs, collect);
            walk_expr(rhs, collect);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, collect),
        Expr::Call { args, .. } => {
            for a in args {
                walk_expr(a, collect);
            }
        }
        Expr::Index { indices, .. } => {
            for i in indices {
                walk_expr(i, collect);
            }
        }
        Expr::IfExpr {
            cond,
            then_val,
            else_val,
        } => {
            walk_expr(cond, collect);
            walk_expr(then_val, collect);
            walk_expr(else_val, collect);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn parsed(source: &str) -> Program {
        Parser::new(source).parse().expect("parse failed")
    }

    #[test]
    fn test_imports_occupy_low_indices() {
        let program = parsed(
            "import math.tan(x: f64): f64\nfunction f(x: f64): f64\nbegin  f := tan(x) + sin(x)  end",
        );
        let config = CompilerConfig::default();
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        // Explicit import first, synthesised sin second, local function last.
        assert_eq!(codegen.func_index["tan"], 0);
        assert_eq!(codegen.func_index["sin"], 1);
        assert_eq!(codegen.func_index["f"], 2);
    }

    #[test]
    fn test_signature_table_deduplicates() {
        let program = parsed(
            "function a(x: f64): f64 begin a := x end\nfunction b(x: f64): f64 begin b := x end\nfunction c(n: i32): i32 begin c := n end",
        );
        let config = CompilerConfig::default();
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        assert_eq!(codegen.sigs.len(), 2);
        assert_eq!(codegen.sig_ids["f64:f64"], 0);
        assert_eq!(codegen.sig_ids["i32:i32"], 1);
    }

    #[test]
    fn test_globals_keep_declaration_order() {
        let program = parsed(
            "const pi: f64 := 3.14159\nvar hits: i32 := 0\nvar scale: f64 := -2.0\nfunction f(): f64 begin f := pi end",
        );
        let config = CompilerConfig::default();
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        assert_eq!(codegen.globals["pi"].index, 0);
        assert!(!codegen.globals["pi"].mutable);
        assert_eq!(codegen.globals["hits"].index, 1);
        assert!(codegen.globals["hits"].mutable);
        assert_eq!(codegen.globals["scale"].index, 2);
    }

    #[test]
    fn test_table_slots_sorted_by_func_index() {
        // Reference the later function first; slots still follow funcIndex.
        let program = parsed(
            "function first(): i32 begin first := @second end\nfunction second(): i32 begin second := @first end",
        );
        let config = CompilerConfig::default();
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        assert!(codegen.uses_table);
        let slots: Vec<(&str, u32)> = codegen
            .table_slots
            .iter()
            .map(|(n, s)| (n.as_str(), *s))
            .collect();
        assert_eq!(slots, vec![("first", 0), ("second", 1)]);
    }

    #[test]
    fn test_auto_import_joins_table_only_when_referenced() {
        let program = parsed(
            "function f(x: f64): f64\nvar g: function(x: f64): f64\nbegin  f := sin(x)  end",
        );
        let config = CompilerConfig::default();
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        assert!(codegen.uses_table);
        assert!(!codegen.table_slots.contains_key("sin"));

        let program = parsed(
            "function f(x: f64): f64\nvar g: function(x: f64): f64\nbegin  g := @sin  f := sin(x)  end",
        );
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        assert!(codegen.table_slots.contains_key("sin"));
    }

    #[test]
    fn test_local_runs_compacted() {
        let program = parsed(
            "function f(n: i32): i32\nvar i, j: i32, x: f64\nbegin  f := n  end",
        );
        let config = CompilerConfig::default();
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        let body = codegen.emit_body(program.find_function("f").unwrap()).unwrap();
        // $_return, i, j are i32 and x is f64: two runs, 3 x i32 + 1 x f64.
        assert_eq!(&body[0..5], &[0x02, 0x03, 0x7F, 0x01, 0x7C]);
    }

    #[test]
    fn test_memory_decision_follows_config() {
        let source =
            "subroutine zero(a: array f64, n: i32)\nvar i: i32\nbegin\n  for i := 0, n\n    a[i] := 0.0\n  end for\nend";
        let program = parsed(source);
        let config = CompilerConfig::default();
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        assert!(codegen.owns_memory);

        let config = CompilerConfig::new().with_memory(true);
        let mut codegen = CodeGen::new(&program, &config);
        codegen.compile().unwrap();
        assert!(!codegen.owns_memory);
        assert!(codegen.import_memory);
    }
}
