//! Parser for Tern syntax
//!
//! Recursive descent over the token list for declarations and statements,
//! Pratt parsing for expressions. A single mutable cursor walks the tokens;
//! the first unexpected token aborts the parse with a syntax error citing the
//! expected and actual token. There is no error recovery.

use crate::CompileError;
use crate::ast::{
    AssignOp, BinOp, ConstDecl, DeclType, Expr, FieldType, Function, ImportDecl, Item, LayoutDecl,
    LayoutFieldDecl, Param, Program, Stmt, UnOp, VarDecl,
};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::types::{FuncSig, ValType};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokens: tokenize(source),
            pos: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Program, CompileError> {
        let mut items = Vec::new();
        while self.current().kind != TokenKind::Eof {
            items.push(self.parse_item()?);
        }
        Ok(Program { items })
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check_kw(&self, kw: &str) -> bool {
        let t = self.current();
        t.kind == TokenKind::Keyword && t.text == kw
    }

    fn check_op(&self, op: &str) -> bool {
        let t = self.current();
        t.kind == TokenKind::Op && t.text == op
    }

    fn check_punc(&self, p: &str) -> bool {
        let t = self.current();
        t.kind == TokenKind::Punc && t.text == p
    }

    /// Consume one token of the given kind (and lexeme, when provided) or
    /// fail with a syntax error citing what was expected.
    fn eat(&mut self, kind: TokenKind, lexeme: Option<&str>) -> Result<Token, CompileError> {
        let t = self.current();
        let matches = t.kind == kind && lexeme.map_or(true, |l| t.text == l);
        if matches {
            Ok(self.advance())
        } else {
            let expected = match lexeme {
                Some(l) => format!("'{}'", l),
                None => format!("{:?}", kind).to_lowercase(),
            };
            Err(self.error(format!("expected {}, found '{}'", expected, self.describe())))
        }
    }

    fn eat_kw(&mut self, kw: &str) -> Result<Token, CompileError> {
        self.eat(TokenKind::Keyword, Some(kw))
    }

    fn eat_op(&mut self, op: &str) -> Result<Token, CompileError> {
        self.eat(TokenKind::Op, Some(op))
    }

    fn eat_punc(&mut self, p: &str) -> Result<Token, CompileError> {
        self.eat(TokenKind::Punc, Some(p))
    }

    fn eat_ident(&mut self) -> Result<Token, CompileError> {
        self.eat(TokenKind::Ident, None)
    }

    fn describe(&self) -> String {
        let t = self.current();
        if t.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            t.text.clone()
        }
    }

    fn error(&self, message: String) -> CompileError {
        let t = self.current();
        CompileError::Syntax {
            message,
            line: t.line,
            col: t.col,
        }
    }

    /// Primitive type after `:`, a scalar or vector name.
    fn eat_prim_type(&mut self) -> Result<ValType, CompileError> {
        let t = self.current();
        if t.kind == TokenKind::Keyword {
            if let Some(vt) = ValType::from_name(&t.text) {
                self.advance();
                return Ok(vt);
            }
        }
        Err(self.error(format!("expected type name, found '{}'", self.describe())))
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    fn parse_item(&mut self) -> Result<Item, CompileError> {
        if self.check_kw("const") {
            return self.parse_const();
        }
        if self.check_kw("var") {
            return self.parse_global_var();
        }
        if self.check_kw("export") {
            self.advance();
            self.eat_kw("function")?;
            let mut f = self.parse_function(true)?;
            f.exported = true;
            return Ok(Item::Function(f));
        }
        if self.check_kw("function") {
            self.advance();
            return Ok(Item::Function(self.parse_function(true)?));
        }
        if self.check_kw("subroutine") {
            self.advance();
            return Ok(Item::Function(self.parse_function(false)?));
        }
        if self.check_kw("import") {
            return self.parse_import();
        }
        if self.check_kw("layout") || self.check_kw("packed") {
            return self.parse_layout();
        }
        Err(self.error(format!("expected declaration, found '{}'", self.describe())))
    }

    fn parse_const(&mut self) -> Result<Item, CompileError> {
        self.eat_kw("const")?;
        let name = self.eat_ident()?.text;
        self.eat_punc(":")?;
        let vtype = self.eat_prim_type()?;
        self.eat_op(":=")?;
        let init = self.parse_expr()?;
        Ok(Item::Const(ConstDecl { name, vtype, init }))
    }

    fn parse_global_var(&mut self) -> Result<Item, CompileError> {
        self.eat_kw("var")?;
        let name = self.eat_ident()?.text;
        self.eat_punc(":")?;
        let vtype = self.parse_decl_type()?;
        let init = if self.check_op(":=") {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Item::Var(VarDecl { name, vtype, init }))
    }

    /// `function` / `subroutine` body; the introducing keyword is consumed
    /// by the caller. `has_ret` distinguishes the two forms.
    fn parse_function(&mut self, has_ret: bool) -> Result<Function, CompileError> {
        let name = self.eat_ident()?.text;
        self.eat_punc("(")?;
        let params = if self.check_punc(")") {
            Vec::new()
        } else {
            self.parse_param_groups()?
        };
        self.eat_punc(")")?;
        let ret = if has_ret {
            self.eat_punc(":")?;
            Some(self.eat_prim_type()?)
        } else {
            None
        };
        let locals = if self.check_kw("var") {
            self.advance();
            self.parse_var_block()?
        } else {
            Vec::new()
        };
        self.eat_kw("begin")?;
        let body = self.parse_stmts(&["end"])?;
        self.eat_kw("end")?;
        Ok(Function {
            name,
            params,
            ret,
            locals,
            body,
            exported: false,
        })
    }

    fn parse_import(&mut self) -> Result<Item, CompileError> {
        self.eat_kw("import")?;
        let dotted = self.eat_ident()?;
        let (module, name) = match dotted.text.split_once('.') {
            Some((m, n)) if !m.is_empty() && !n.is_empty() => (m.to_string(), n.to_string()),
            _ => {
                return Err(self.error(format!(
                    "import name '{}' must be of the form module.name",
                    dotted.text
                )));
            }
        };
        self.eat_punc("(")?;
        let params = if self.check_punc(")") {
            Vec::new()
        } else {
            self.parse_param_groups()?
        };
        self.eat_punc(")")?;
        let ret = if self.check_punc(":") {
            self.advance();
            Some(self.eat_prim_type()?)
        } else {
            None
        };
        // Imports carry wasm-level signatures: arrays and function values
        // arrive as i32.
        let params = params.iter().map(|p| lowered(&p.dtype)).collect();
        Ok(Item::Import(ImportDecl {
            module,
            name,
            params,
            ret,
        }))
    }

    fn parse_layout(&mut self) -> Result<Item, CompileError> {
        let packed = if self.check_kw("packed") {
            self.advance();
            true
        } else {
            false
        };
        self.eat_kw("layout")?;
        let name = self.eat_ident()?.text;
        let mut fields = Vec::new();
        while !self.check_kw("end") {
            if self.current().kind == TokenKind::Eof {
                return Err(self.error(format!("unexpected end of input in layout '{}'", name)));
            }
            // Field group: names share the type, like parameters.
            let mut names = vec![self.eat_ident()?.text];
            while self.check_punc(",") {
                self.advance();
                names.push(self.eat_ident()?.text);
            }
            self.eat_punc(":")?;
            let ftype = if self.current().kind == TokenKind::Ident {
                FieldType::Layout(self.advance().text)
            } else {
                FieldType::Scalar(self.eat_prim_type()?)
            };
            for n in names {
                fields.push(LayoutFieldDecl {
                    name: n,
                    ftype: ftype.clone(),
                });
            }
        }
        self.eat_kw("end")?;
        self.eat_kw("layout")?;
        Ok(Item::Layout(LayoutDecl {
            name,
            packed,
            fields,
        }))
    }

    // ------------------------------------------------------------------
    // Parameter and local groups
    // ------------------------------------------------------------------

    /// One or more `name {, name} : type` groups separated by commas.
    fn parse_param_groups(&mut self) -> Result<Vec<Param>, CompileError> {
        let mut params = Vec::new();
        loop {
            self.parse_one_group(&mut params)?;
            if self.check_punc(",") {
                self.advance();
            } else {
                break;
            }
        }
        Ok(params)
    }

    /// A single shared-type group. While collecting names, a comma joins the
    /// group only when the two tokens after it are `ID ,` or `ID :`;
    /// otherwise the comma belongs to the caller.
    fn parse_one_group(&mut self, out: &mut Vec<Param>) -> Result<(), CompileError> {
        let mut names = vec![self.eat_ident()?.text];
        while self.check_punc(",") && self.comma_joins_group() {
            self.advance();
            names.push(self.eat_ident()?.text);
        }
        self.eat_punc(":")?;
        let dtype = self.parse_decl_type()?;
        for name in names {
            out.push(Param {
                name,
                dtype: dtype.clone(),
            });
        }
        Ok(())
    }

    fn comma_joins_group(&self) -> bool {
        let one = self.peek(1);
        let two = self.peek(2);
        one.kind == TokenKind::Ident
            && two.kind == TokenKind::Punc
            && (two.text == "," || two.text == ":")
    }

    /// Local declarations after `var`, up to `begin`. Groups may be
    /// separated by commas or plain whitespace.
    fn parse_var_block(&mut self) -> Result<Vec<Param>, CompileError> {
        let mut locals = Vec::new();
        loop {
            self.parse_one_group(&mut locals)?;
            if self.check_punc(",") {
                self.advance();
            }
            if self.check_kw("begin") {
                break;
            }
            if self.current().kind == TokenKind::Eof {
                return Err(self.error("unexpected end of input in var block".to_string()));
            }
        }
        Ok(locals)
    }

    fn parse_decl_type(&mut self) -> Result<DeclType, CompileError> {
        if self.check_kw("function") {
            self.advance();
            return Ok(DeclType::Func(self.parse_func_sig()?));
        }
        if self.check_kw("layout") {
            self.advance();
            let name = self.eat_ident()?.text;
            return Ok(DeclType::Layout(name));
        }
        if self.check_kw("array") {
            self.advance();
            let dims = if self.check_punc("(") {
                self.advance();
                let dims = self.parse_expr_list()?;
                self.eat_punc(")")?;
                dims
            } else {
                Vec::new()
            };
            let elem = self.eat_prim_type()?;
            return Ok(DeclType::Array { elem, dims });
        }
        Ok(DeclType::Scalar(self.eat_prim_type()?))
    }

    /// Signature of a function-typed parameter: `(params?) [: ret]`.
    /// Parameter names inside the signature are documentation only.
    fn parse_func_sig(&mut self) -> Result<FuncSig, CompileError> {
        self.eat_punc("(")?;
        let params = if self.check_punc(")") {
            Vec::new()
        } else {
            self.parse_param_groups()?
        };
        self.eat_punc(")")?;
        let ret = if self.check_punc(":") {
            self.advance();
            Some(self.eat_prim_type()?)
        } else {
            None
        };
        Ok(FuncSig::new(
            params.iter().map(|p| lowered(&p.dtype)).collect(),
            ret,
        ))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse statements until one of the stop keywords is current (it is
    /// left unconsumed).
    fn parse_stmts(&mut self, stops: &[&str]) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        loop {
            let t = self.current();
            if t.kind == TokenKind::Eof {
                return Err(self.error(format!("unexpected end of input, expected '{}'", stops[0])));
            }
            if t.kind == TokenKind::Keyword && stops.contains(&t.text.as_str()) {
                break;
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        if self.check_kw("if") {
            return self.parse_if_stmt(false);
        }
        if self.check_kw("for") {
            return self.parse_for();
        }
        if self.check_kw("while") {
            self.advance();
            self.eat_punc("(")?;
            let cond = self.parse_expr()?;
            self.eat_punc(")")?;
            let body = self.parse_stmts(&["end"])?;
            self.eat_kw("end")?;
            self.eat_kw("while")?;
            return Ok(Stmt::While { cond, body });
        }
        if self.check_kw("do") {
            self.advance();
            let body = self.parse_stmts(&["while"])?;
            self.eat_kw("while")?;
            self.eat_punc("(")?;
            let cond = self.parse_expr()?;
            self.eat_punc(")")?;
            return Ok(Stmt::DoWhile { body, cond });
        }
        if self.check_kw("break") {
            self.advance();
            return Ok(Stmt::Break);
        }
        if self.check_kw("tailcall") {
            self.advance();
            let name = self.eat_ident()?.text;
            self.eat_punc("(")?;
            let args = if self.check_punc(")") {
                Vec::new()
            } else {
                self.parse_expr_list()?
            };
            self.eat_punc(")")?;
            return Ok(Stmt::TailCall { name, args });
        }
        if self.check_kw("call") {
            self.advance();
            let tok = self.eat_ident()?;
            let name = tok.text;
            let interp = tok.interp;
            self.eat_punc("(")?;
            let args = if self.check_punc(")") {
                Vec::new()
            } else {
                self.parse_expr_list()?
            };
            self.eat_punc(")")?;
            return Ok(Stmt::Call { name, args, interp });
        }
        if self.current().kind == TokenKind::Ident {
            return self.parse_assign();
        }
        Err(self.error(format!("expected statement, found '{}'", self.describe())))
    }

    fn parse_if_stmt(&mut self, is_else_if: bool) -> Result<Stmt, CompileError> {
        self.eat_kw("if")?;
        self.eat_punc("(")?;
        let cond = self.parse_expr()?;
        self.eat_punc(")")?;
        self.eat_kw("then")?;
        let then_body = self.parse_stmts(&["else", "end"])?;
        let else_body = if self.check_kw("else") {
            self.advance();
            if self.check_kw("if") {
                // else-if chain: the nested if does not consume the single
                // closing `end if`; the outermost one does.
                Some(vec![self.parse_if_stmt(true)?])
            } else {
                Some(self.parse_stmts(&["end"])?)
            }
        } else {
            None
        };
        if !is_else_if {
            self.eat_kw("end")?;
            if self.check_kw("if") {
                self.advance();
            }
        }
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, CompileError> {
        self.eat_kw("for")?;
        let var = self.eat_ident()?.text;
        self.eat_op(":=")?;
        let start = self.parse_expr()?;
        self.eat_punc(",")?;
        let end = self.parse_expr()?;
        let step = if self.check_punc(",") {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        let body = self.parse_stmts(&["end"])?;
        self.eat_kw("end")?;
        self.eat_kw("for")?;
        Ok(Stmt::For {
            var,
            start,
            end,
            step,
            body,
        })
    }

    fn parse_assign(&mut self) -> Result<Stmt, CompileError> {
        let target = self.eat_ident()?.text;
        if self.check_punc("[") {
            self.advance();
            let indices = self.parse_expr_list()?;
            self.eat_punc("]")?;
            let op = self.eat_assign_op()?;
            let value = self.parse_expr()?;
            return Ok(Stmt::ArrayStore {
                target,
                indices,
                op,
                value,
            });
        }
        let op = self.eat_assign_op()?;
        let value = self.parse_expr()?;
        Ok(Stmt::Assign { target, op, value })
    }

    /// `/=` means divide-assign here; the expression parser reads the same
    /// token as not-equal.
    fn eat_assign_op(&mut self) -> Result<AssignOp, CompileError> {
        let t = self.current();
        if t.kind == TokenKind::Op {
            let op = match t.text.as_str() {
                ":=" => Some(AssignOp::Set),
                "+=" => Some(AssignOp::Add),
                "-=" => Some(AssignOp::Sub),
                "*=" => Some(AssignOp::Mul),
                "/=" => Some(AssignOp::Div),
                _ => None,
            };
            if let Some(op) = op {
                self.advance();
                return Ok(op);
            }
        }
        Err(self.error(format!(
            "expected assignment operator, found '{}'",
            self.describe()
        )))
    }

    // ------------------------------------------------------------------
    // Expressions (Pratt)
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_bin(0)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.check_punc(",") {
            self.advance();
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    /// Binding power of the current token as an infix operator.
    /// `**` is right-associative: its right operand recurses with the same
    /// binding power instead of bp+1.
    fn infix(&self) -> Option<(BinOp, u8, bool)> {
        let t = self.current();
        let entry = match (t.kind, t.text.as_str()) {
            (TokenKind::Keyword, "or") => (BinOp::Or, 2, false),
            (TokenKind::Keyword, "and") => (BinOp::And, 4, false),
            (TokenKind::Op, "==") => (BinOp::Eq, 6, false),
            (TokenKind::Op, "/=") => (BinOp::Ne, 6, false),
            (TokenKind::Op, "<") => (BinOp::Lt, 6, false),
            (TokenKind::Op, ">") => (BinOp::Gt, 6, false),
            (TokenKind::Op, "<=") => (BinOp::Le, 6, false),
            (TokenKind::Op, ">=") => (BinOp::Ge, 6, false),
            (TokenKind::Op, "|") => (BinOp::BitOr, 8, false),
            (TokenKind::Op, "^") => (BinOp::BitXor, 10, false),
            (TokenKind::Op, "&") => (BinOp::BitAnd, 12, false),
            (TokenKind::Op, "<<") => (BinOp::Shl, 14, false),
            (TokenKind::Op, ">>") => (BinOp::Shr, 14, false),
            (TokenKind::Op, "+") => (BinOp::Add, 16, false),
            (TokenKind::Op, "-") => (BinOp::Sub, 16, false),
            (TokenKind::Op, "*") => (BinOp::Mul, 18, false),
            (TokenKind::Op, "/") => (BinOp::Div, 18, false),
            (TokenKind::Keyword, "mod") => (BinOp::Mod, 18, false),
            (TokenKind::Op, "**") => (BinOp::Pow, 22, true),
            _ => return None,
        };
        Some(entry)
    }

    fn parse_bin(&mut self, min_bp: u8) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, bp, right_assoc)) = self.infix() {
            if bp < min_bp {
                break;
            }
            self.advance();
            let next_bp = if right_assoc { bp } else { bp + 1 };
            let rhs = self.parse_bin(next_bp)?;
            lhs = Expr::Bin {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        if self.check_op("-") {
            self.advance();
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(self.parse_bin(21)?),
            });
        }
        if self.check_kw("not") {
            self.advance();
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(self.parse_bin(21)?),
            });
        }
        if self.check_op("~") {
            self.advance();
            return Ok(Expr::Unary {
                op: UnOp::BitNot,
                operand: Box::new(self.parse_bin(21)?),
            });
        }
        if self.check_op("@") {
            self.advance();
            let name = self.eat_ident()?.text;
            return Ok(Expr::FuncRef(name));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let t = self.current().clone();
        match t.kind {
            TokenKind::Punc if t.text == "(" => {
                self.advance();
                let inner = self.parse_expr()?;
                self.eat_punc(")")?;
                Ok(inner)
            }
            TokenKind::Num => {
                self.advance();
                Ok(Expr::Num {
                    raw: t.text,
                    is_float: t.is_float,
                    suffix: t.suffix,
                })
            }
            TokenKind::Keyword if t.text == "true" || t.text == "false" => {
                self.advance();
                Ok(Expr::Num {
                    raw: if t.text == "true" { "1" } else { "0" }.to_string(),
                    is_float: false,
                    suffix: Some(ValType::I32),
                })
            }
            TokenKind::Keyword if t.text == "if" => {
                // Ternary: if (cond) then a else b
                self.advance();
                self.eat_punc("(")?;
                let cond = self.parse_expr()?;
                self.eat_punc(")")?;
                self.eat_kw("then")?;
                let then_val = self.parse_expr()?;
                self.eat_kw("else")?;
                let else_val = self.parse_expr()?;
                Ok(Expr::IfExpr {
                    cond: Box::new(cond),
                    then_val: Box::new(then_val),
                    else_val: Box::new(else_val),
                })
            }
            TokenKind::Keyword if ValType::from_name(&t.text).is_some() => {
                // Conversion or vector constructor: TYPE(args)
                self.advance();
                self.eat_punc("(")?;
                let args = if self.check_punc(")") {
                    Vec::new()
                } else {
                    self.parse_expr_list()?
                };
                self.eat_punc(")")?;
                Ok(Expr::Call {
                    name: t.text,
                    args,
                    interp: false,
                })
            }
            TokenKind::Ident => {
                self.advance();
                if self.check_punc("(") {
                    self.advance();
                    let args = if self.check_punc(")") {
                        Vec::new()
                    } else {
                        self.parse_expr_list()?
                    };
                    self.eat_punc(")")?;
                    Ok(Expr::Call {
                        name: t.text,
                        args,
                        interp: t.interp,
                    })
                } else if self.check_punc("[") {
                    self.advance();
                    let indices = self.parse_expr_list()?;
                    self.eat_punc("]")?;
                    Ok(Expr::Index {
                        name: t.text,
                        indices,
                    })
                } else {
                    Ok(Expr::Ident {
                        name: t.text,
                        interp: t.interp,
                    })
                }
            }
            _ => Err(self.error(format!("expected expression, found '{}'", self.describe()))),
        }
    }
}

/// Wasm-level type of a declared type: arrays, function values, and layout
/// pointers all travel as i32.
pub fn lowered(dtype: &DeclType) -> ValType {
    match dtype {
        DeclType::Scalar(t) => *t,
        DeclType::Array { .. } | DeclType::Func(_) | DeclType::Layout(_) => ValType::I32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        Parser::new(source).parse().expect("parse failed")
    }

    fn first_function(program: &Program) -> &Function {
        program
            .items
            .iter()
            .find_map(|i| match i {
                Item::Function(f) => Some(f),
                _ => None,
            })
            .expect("no function")
    }

    #[test]
    fn test_parse_simple_function() {
        let program = parse_ok("function add(a, b: i32): i32\nbegin  add := a + b  end");
        let f = first_function(&program);
        assert_eq!(f.name, "add");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.params[0].name, "a");
        assert_eq!(f.params[1].name, "b");
        assert_eq!(f.params[1].dtype, DeclType::Scalar(ValType::I32));
        assert_eq!(f.ret, Some(ValType::I32));
        assert_eq!(f.body.len(), 1);
    }

    #[test]
    fn test_param_groups_share_type() {
        let program = parse_ok(
            "function f(a, b: f64, n: i32): f64\nbegin f := a end",
        );
        let f = first_function(&program);
        assert_eq!(f.params.len(), 3);
        assert_eq!(f.params[0].dtype, DeclType::Scalar(ValType::F64));
        assert_eq!(f.params[1].dtype, DeclType::Scalar(ValType::F64));
        assert_eq!(f.params[2].dtype, DeclType::Scalar(ValType::I32));
    }

    #[test]
    fn test_subroutine_has_no_ret() {
        let program = parse_ok("subroutine go(n: i32)\nbegin call noop() end");
        let f = first_function(&program);
        assert!(f.is_subroutine());
    }

    #[test]
    fn test_pow_right_associative() {
        // a ** b ** c parses as a ** (b ** c)
        let program = parse_ok("function f(): f64\nbegin f := 2.0 ** 3 ** 2 end");
        let f = first_function(&program);
        match &f.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Bin { op, rhs, .. } => {
                    assert_eq!(*op, BinOp::Pow);
                    assert!(matches!(**rhs, Expr::Bin { op: BinOp::Pow, .. }));
                }
                other => panic!("expected pow chain, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_subtraction() {
        let program = parse_ok("function f(): i32\nbegin f := 10 - 3 - 2 end");
        let f = first_function(&program);
        match &f.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Bin { op, lhs, .. } => {
                    assert_eq!(*op, BinOp::Sub);
                    assert!(matches!(**lhs, Expr::Bin { op: BinOp::Sub, .. }));
                }
                other => panic!("expected sub chain, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_slash_equals_is_contextual() {
        // Statement level: divide-assign. Expression level: not-equal.
        let program = parse_ok("function f(a: i32): i32\nbegin f := 1 if (a /= 2) then f /= 2 end if end");
        let f = first_function(&program);
        match &f.body[1] {
            Stmt::If {
                cond, then_body, ..
            } => {
                assert!(matches!(cond, Expr::Bin { op: BinOp::Ne, .. }));
                match &then_body[0] {
                    Stmt::Assign { op, .. } => assert_eq!(*op, AssignOp::Div),
                    other => panic!("expected assign, got {:?}", other),
                }
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain_single_end() {
        let program = parse_ok(
            "function f(n: i32): i32\nbegin\n  if (n == 0) then f := 1\n  else if (n == 1) then f := 2\n  else f := 3\n  end if\nend",
        );
        let f = first_function(&program);
        match &f.body[0] {
            Stmt::If { else_body, .. } => {
                let inner = else_body.as_ref().unwrap();
                assert_eq!(inner.len(), 1);
                assert!(matches!(inner[0], Stmt::If { .. }));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_step() {
        let program = parse_ok(
            "function f(n: i32): i32\nvar i: i32\nbegin\n  f := 0\n  for i := 0, n, 2\n    f += i\n  end for\nend",
        );
        let f = first_function(&program);
        assert_eq!(f.locals.len(), 1);
        match &f.body[1] {
            Stmt::For { var, step, .. } => {
                assert_eq!(var, "i");
                assert!(step.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_do_while() {
        let program = parse_ok(
            "function f(n: i32): i32\nbegin\n  f := 0\n  do f += 1 while (f < n)\nend",
        );
        let f = first_function(&program);
        assert!(matches!(f.body[1], Stmt::DoWhile { .. }));
    }

    #[test]
    fn test_function_typed_param() {
        let program = parse_ok(
            "function apply(f: function(x: f64): f64, x: f64): f64\nbegin  apply := f(x)  end",
        );
        let f = first_function(&program);
        assert_eq!(f.params.len(), 2);
        match &f.params[0].dtype {
            DeclType::Func(sig) => {
                assert_eq!(sig.params, vec![ValType::F64]);
                assert_eq!(sig.ret, Some(ValType::F64));
            }
            other => panic!("expected function type, got {:?}", other),
        }
    }

    #[test]
    fn test_array_param_and_store() {
        let program = parse_ok(
            "subroutine fill(a: array f64, n: i32)\nvar i: i32\nbegin\n  for i := 0, n\n    a[i] := 0.0\n  end for\nend",
        );
        let f = first_function(&program);
        assert!(matches!(f.params[0].dtype, DeclType::Array { .. }));
    }

    #[test]
    fn test_layout_decl() {
        let program = parse_ok(
            "layout Sphere\n  cx, cy, cz: f64\n  radius: f64\n  id: i32\nend layout",
        );
        match &program.items[0] {
            Item::Layout(l) => {
                assert_eq!(l.name, "Sphere");
                assert!(!l.packed);
                assert_eq!(l.fields.len(), 5);
                assert_eq!(l.fields[3].name, "radius");
            }
            other => panic!("expected layout, got {:?}", other),
        }
    }

    #[test]
    fn test_packed_layout() {
        let program = parse_ok("packed layout Pix\n  r, g, b: i32\nend layout");
        match &program.items[0] {
            Item::Layout(l) => assert!(l.packed),
            other => panic!("expected layout, got {:?}", other),
        }
    }

    #[test]
    fn test_import_decl() {
        let program = parse_ok("import math.tan(x: f64): f64");
        match &program.items[0] {
            Item::Import(imp) => {
                assert_eq!(imp.module, "math");
                assert_eq!(imp.name, "tan");
                assert_eq!(imp.params, vec![ValType::F64]);
                assert_eq!(imp.ret, Some(ValType::F64));
            }
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn test_const_and_global_var() {
        let program = parse_ok("const pi: f64 := 3.14159\nvar counter: i32 := 0\nvar cb: function(x: f64): f64");
        assert!(matches!(program.items[0], Item::Const(_)));
        match &program.items[1] {
            Item::Var(v) => assert!(v.init.is_some()),
            other => panic!("expected var, got {:?}", other),
        }
        match &program.items[2] {
            Item::Var(v) => assert!(matches!(v.vtype, DeclType::Func(_))),
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn test_func_ref_and_ternary() {
        let program = parse_ok(
            "function f(x: i32): i32\nbegin f := if (x > 0) then 1 else 0 end",
        );
        let f = first_function(&program);
        match &f.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::IfExpr { .. })),
            other => panic!("expected assign, got {:?}", other),
        }

        let program = parse_ok("function g(): i32\nbegin g := @g end");
        let g = first_function(&program);
        match &g.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::FuncRef(_))),
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn test_syntax_error_has_position() {
        let err = Parser::new("function f(: i32").parse().unwrap_err();
        match err {
            CompileError::Syntax { line, col, .. } => {
                assert_eq!(line, 1);
                assert!(col > 1);
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_first_error_aborts() {
        assert!(Parser::new("function ()").parse().is_err());
        assert!(Parser::new("begin end").parse().is_err());
    }

    #[test]
    fn test_vector_constructor_call() {
        let program = parse_ok("function f(): f64\nbegin f := f64x2.extract_lane(f64x2(1.0, 2.0), 0) end");
        let f = first_function(&program);
        match &f.body[0] {
            Stmt::Assign { value, .. } => match value {
                Expr::Call { name, args, .. } => {
                    assert_eq!(name, "f64x2.extract_lane");
                    assert_eq!(args.len(), 2);
                    assert!(matches!(&args[0], Expr::Call { name, .. } if name == "f64x2"));
                }
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected assign, got {:?}", other),
        }
    }
}
