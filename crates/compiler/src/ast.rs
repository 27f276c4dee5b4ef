//! Abstract syntax tree for Tern
//!
//! Nodes are built by the parser and read-only afterwards; the code generator
//! never mutates them. Everything derives `Serialize` so `ternc parse` can
//! render the tree as JSON.

use crate::types::{FuncSig, ValType};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.items.iter().find_map(|item| match item {
            Item::Function(f) if f.name == name => Some(f),
            _ => None,
        })
    }

    pub fn layouts(&self) -> impl Iterator<Item = &LayoutDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Layout(l) => Some(l),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Item {
    Const(ConstDecl),
    Var(VarDecl),
    /// Functions and subroutines share a node; a subroutine is a function
    /// with no return type (and no return accumulator).
    Function(Function),
    Import(ImportDecl),
    Layout(LayoutDecl),
}

/// `const name: type := literal`: an immutable global.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstDecl {
    pub name: String,
    pub vtype: ValType,
    pub init: Expr,
}

/// Module-level `var`. Function-typed and layout-typed slots lower to
/// mutable i32 globals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub name: String,
    pub vtype: DeclType,
    pub init: Option<Expr>,
}

/// A declared type as it appears after `:` in params, locals, and globals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeclType {
    Scalar(ValType),
    /// `array [( dims )] type`; dims may be empty for open arrays.
    Array { elem: ValType, dims: Vec<Expr> },
    /// `function (params): ret`, a table-slot value.
    Func(FuncSig),
    /// `layout Name`, a pointer into linear memory.
    Layout(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub dtype: DeclType,
}

/// Locals use the same shape as parameters.
pub type Local = Param;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    /// May contain dots (`geo.dist`); exported under this exact name.
    pub name: String,
    pub params: Vec<Param>,
    /// `None` for subroutines.
    pub ret: Option<ValType>,
    pub locals: Vec<Local>,
    pub body: Vec<Stmt>,
    pub exported: bool,
}

impl Function {
    pub fn is_subroutine(&self) -> bool {
        self.ret.is_none()
    }
}

/// `import module.name(params)[: ret]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportDecl {
    pub module: String,
    pub name: String,
    pub params: Vec<ValType>,
    pub ret: Option<ValType>,
}

/// `layout Name ... end layout`, optionally `packed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutDecl {
    pub name: String,
    pub packed: bool,
    pub fields: Vec<LayoutFieldDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutFieldDecl {
    pub name: String,
    pub ftype: FieldType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldType {
    Scalar(ValType),
    /// Embeds another layout by name.
    Layout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stmt {
    /// `name := expr` and the compound forms. The target may be a dotted
    /// layout path or the enclosing function's own name (return accumulator).
    Assign {
        target: String,
        op: AssignOp,
        value: Expr,
    },
    ArrayStore {
        target: String,
        indices: Vec<Expr>,
        op: AssignOp,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    /// `for v := start, end [, step]`; the upper bound is exclusive.
    For {
        var: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
    },
    Break,
    Call {
        name: String,
        args: Vec<Expr>,
        interp: bool,
    },
    TailCall {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// Numeric literal. The lexeme is kept verbatim so i64 constants don't
    /// round-trip through f64. Booleans arrive as `0`/`1` with an i32 suffix.
    Num {
        raw: String,
        is_float: bool,
        suffix: Option<ValType>,
    },
    Ident {
        name: String,
        interp: bool,
    },
    Bin {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// Covers user calls, conversions `i32(x)`, vector constructors
    /// `f64x2(a, b)`, SIMD namespaced ops, builtins, and `wasm.*` forms;
    /// the generator's dispatch order tells them apart.
    Call {
        name: String,
        args: Vec<Expr>,
        interp: bool,
    },
    /// `@name`, a table slot index.
    FuncRef(String),
    Index {
        name: String,
        indices: Vec<Expr>,
    },
    /// `if (cond) then a else b` in expression position.
    IfExpr {
        cond: Box<Expr>,
        then_val: Box<Expr>,
        else_val: Box<Expr>,
    },
}

impl Expr {
    pub fn num(raw: impl Into<String>) -> Expr {
        Expr::Num {
            raw: raw.into(),
            is_float: false,
            suffix: None,
        }
    }

    /// Literal value when the expression is a number or a negated number.
    pub fn const_f64(&self) -> Option<f64> {
        match self {
            Expr::Num { raw, .. } => raw.parse().ok(),
            Expr::Unary {
                op: UnOp::Neg,
                operand,
            } => operand.const_f64().map(|v| -v),
            _ => None,
        }
    }

    /// Integer constant value; wraps on negation without overflow checks.
    pub fn const_i64(&self) -> Option<i64> {
        match self {
            Expr::Num { raw, is_float, .. } => {
                if *is_float {
                    raw.parse::<f64>().ok().map(|v| v as i64)
                } else {
                    raw.parse::<i64>()
                        .ok()
                        .or_else(|| raw.parse::<f64>().ok().map(|v| v as i64))
                }
            }
            Expr::Unary {
                op: UnOp::Neg,
                operand,
            } => operand.const_i64().map(i64::wrapping_neg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_values() {
        let two = Expr::num("2");
        assert_eq!(two.const_i64(), Some(2));
        assert_eq!(two.const_f64(), Some(2.0));

        let neg = Expr::Unary {
            op: UnOp::Neg,
            operand: Box::new(Expr::num("5")),
        };
        assert_eq!(neg.const_i64(), Some(-5));
        assert_eq!(neg.const_f64(), Some(-5.0));

        let call = Expr::Call {
            name: "f".to_string(),
            args: vec![],
            interp: false,
        };
        assert_eq!(call.const_i64(), None);
    }

    #[test]
    fn test_find_function() {
        let program = Program {
            items: vec![Item::Function(Function {
                name: "main".to_string(),
                params: vec![],
                ret: Some(ValType::I32),
                locals: vec![],
                body: vec![],
                exported: false,
            })],
        };
        assert!(program.find_function("main").is_some());
        assert!(program.find_function("other").is_none());
    }
}
