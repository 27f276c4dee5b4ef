//! Tern compiler library
//!
//! Compiles Tern source (a small statically-typed procedural language with
//! hybrid Fortran/Pascal syntax) to a WebAssembly 1.0 module using the
//! SIMD-128 and tail-call extensions. The pipeline is a single pass per
//! stage: lexer, parser, code generator. There is no IR and no optimisation.
//!
//! ```rust
//! use ternc::{compile, CompilerConfig};
//!
//! let out = compile(
//!     "function add(a, b: i32): i32\nbegin  add := a + b  end",
//!     &CompilerConfig::default(),
//! ).unwrap();
//! assert_eq!(&out.bytes[0..4], b"\0asm");
//! ```
//!
//! Alongside the module bytes, compilation returns two side tables for the
//! host: `table` (function name to indirect-call slot, when a table was
//! emitted) and `layouts` (record field offsets, when layouts were
//! declared).

pub mod ast;
pub mod codegen;
pub mod config;
pub mod layout;
pub mod lexer;
pub mod opcodes;
pub mod parser;
pub mod types;
pub mod writer;

pub use ast::Program;
pub use codegen::CodeGen;
pub use config::CompilerConfig;
pub use parser::Parser;
pub use types::{FuncSig, ValType};
pub use writer::ByteWriter;

use indexmap::IndexMap;

/// All compilation failures. The first error aborts; there are no warnings
/// and no partial output.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Unexpected token, with the 1-based source position.
    Syntax {
        message: String,
        line: u32,
        col: u32,
    },
    /// Undefined names, type mismatches, malformed constructs.
    Semantic(String),
    /// A builtin was invoked on a type that has no corresponding opcode.
    Opcode(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Syntax { message, line, col } => {
                write!(f, "{}:{}: {}", line, col, message)
            }
            CompileError::Semantic(msg) => write!(f, "{}", msg),
            CompileError::Opcode(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

/// Result of a successful compilation: the module bytes plus the
/// host-visible side tables.
#[derive(Debug)]
pub struct CompileOutput {
    pub bytes: Vec<u8>,
    /// `__table`: function name to table slot; present when indirect calls
    /// are possible.
    pub table: Option<IndexMap<String, u32>>,
    /// `__layouts`: layout name to field offsets (plus `__size`/`__align`);
    /// present when any layout was declared.
    pub layouts: Option<IndexMap<String, IndexMap<String, u32>>>,
}

/// Compile source text to a Wasm module.
pub fn compile(source: &str, config: &CompilerConfig) -> Result<CompileOutput, CompileError> {
    let program = Parser::new(source).parse()?;
    let mut codegen = CodeGen::new(&program, config);
    let bytes = codegen.compile()?;
    Ok(CompileOutput {
        bytes,
        table: codegen.table_slots().cloned(),
        layouts: codegen.layout_tables(),
    })
}

/// Parse source text, returning the AST together with the layout offset
/// table (the same data `compile` exposes as the `__layouts` side table).
#[allow(clippy::type_complexity)]
pub fn parse(
    source: &str,
) -> Result<(Program, IndexMap<String, IndexMap<String, u32>>), CompileError> {
    let program = Parser::new(source).parse()?;
    let layouts = layout::compute_layouts(program.layouts())?;
    let tables = layouts
        .iter()
        .map(|(name, l)| (name.clone(), l.offset_table()))
        .collect();
    Ok((program, tables))
}

/// Compile and render the module as a lowercase hex string.
pub fn dump(source: &str, config: &CompilerConfig) -> Result<String, CompileError> {
    let out = compile(source, config)?;
    Ok(out.bytes.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> CompileOutput {
        compile(source, &CompilerConfig::default()).expect("compile failed")
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_magic_and_version() {
        let out = compile_ok("function add(a, b: i32): i32\nbegin  add := a + b  end");
        assert_eq!(
            &out.bytes[0..8],
            &[0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_integer_add_module() {
        let out = compile_ok("function add(a, b: i32): i32\nbegin  add := a + b  end");
        // local.get 0, local.get 1, i32.add, local.set $_return
        assert!(contains(&out.bytes, &[0x20, 0x00, 0x20, 0x01, 0x6A, 0x21, 0x02]));
        // Exported under its own name.
        assert!(contains(&out.bytes, b"\x03add"));
        assert!(out.table.is_none());
        assert!(out.layouts.is_none());
    }

    #[test]
    fn test_accumulator_convention() {
        let out = compile_ok(
            "function accum(a, b, c: f64): f64\nbegin\n  accum := a\n  accum := accum + b\n  accum := accum + c\nend",
        );
        // accum := accum + b reads the hidden local (index 3) and f64.adds.
        assert!(contains(&out.bytes, &[0x20, 0x03, 0x20, 0x01, 0xA0, 0x21, 0x03]));
        // Epilogue returns the accumulator.
        assert!(contains(&out.bytes, &[0x20, 0x03, 0x0B]));
    }

    #[test]
    fn test_for_loop_exclusive_bound() {
        let out = compile_ok(
            "function findbreak(n: i32): i32\nvar i: i32\nbegin\n  findbreak := 0\n  for i := 0, n\n    if (i == 5) then break end if\n    findbreak := i\n  end for\nend",
        );
        // Exit comparison is i32.ge_s against the bound, then br_if 1.
        assert!(contains(&out.bytes, &[0x4E, 0x0D, 0x01]));
        // break inside the if is br 2 (if, loop, then the exit block).
        assert!(contains(&out.bytes, &[0x0C, 0x02]));
    }

    #[test]
    fn test_pow_half_is_sqrt_without_import() {
        let out = compile_ok("function r(x: f64): f64\nbegin  r := x ** 0.5  end");
        assert!(contains(&out.bytes, &[0x9F])); // f64.sqrt
        assert!(!contains(&out.bytes, b"pow"));
        assert!(!contains(&out.bytes, b"math"));
    }

    #[test]
    fn test_pow_imports_math_pow() {
        let out = compile_ok("function f(): f64\nbegin  f := 2.0 ** 3 ** 2  end");
        assert!(contains(&out.bytes, b"\x04math\x03pow"));
    }

    #[test]
    fn test_math_builtin_auto_import() {
        let out = compile_ok("function s(x: f64): f64\nbegin  s := sin(x)  end");
        assert!(contains(&out.bytes, b"\x04math\x03sin"));
    }

    #[test]
    fn test_host_import_from_config() {
        let config = CompilerConfig::new().with_host_function("now", 0);
        let out = compile("function t(): f64\nbegin  t := now()  end", &config).unwrap();
        assert!(contains(&out.bytes, b"\x04host\x03now"));
    }

    #[test]
    fn test_interp_marker_resolves_as_host_import() {
        let out = compile_ok("function t(): f64\nbegin  t := __INTERP_0__(1.0)  end");
        assert!(contains(&out.bytes, b"\x04host\x0C__INTERP_0__"));
    }

    #[test]
    fn test_indirect_call_table() {
        let out = compile_ok(
            "function double(x: f64): f64 begin double := x * 2.0 end\nfunction triple(x: f64): f64 begin triple := x * 3.0 end\nfunction apply(f: function(x: f64): f64, x: f64): f64\nbegin  apply := f(x)  end",
        );
        let table = out.table.expect("table expected");
        assert_eq!(table["double"], 0);
        assert_eq!(table["triple"], 1);
        assert_eq!(table["apply"], 2);
        // call_indirect with table index 0.
        assert!(contains(&out.bytes, &[0x11, 0x00, 0x00]));
        // Element section: three entries 0, 1, 2 after i32.const 0.
        assert!(contains(&out.bytes, &[0x41, 0x00, 0x0B, 0x03, 0x00, 0x01, 0x02]));
    }

    #[test]
    fn test_tail_recursive_countdown() {
        let out = compile_ok(
            "function countdown(n: i32): i32\nbegin\n  if (n <= 0) then countdown := 0\n  else tailcall countdown(n - 1)\n  end if\nend",
        );
        // n - 1, then return_call 0.
        assert!(contains(&out.bytes, &[0x6B, 0x12, 0x00]));
    }

    #[test]
    fn test_tailcall_type_mismatch_rejected() {
        let err = compile(
            "function g(): f64 begin g := 1.0 end\nfunction f(): i32\nbegin  tailcall g()  end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Semantic(_)));
        assert!(err.to_string().contains("tailcall"));
    }

    #[test]
    fn test_sphere_layout_side_table() {
        let out = compile_ok(
            "layout Sphere\n  cx, cy, cz: f64\n  radius: f64\n  id: i32\nend layout\nfunction r(s: layout Sphere): f64\nbegin  r := s.radius  end",
        );
        let layouts = out.layouts.expect("layouts expected");
        let sphere = &layouts["Sphere"];
        assert_eq!(sphere["cx"], 0);
        assert_eq!(sphere["cy"], 8);
        assert_eq!(sphere["cz"], 16);
        assert_eq!(sphere["radius"], 24);
        assert_eq!(sphere["id"], 32);
        assert_eq!(sphere["__size"], 40);
        assert_eq!(sphere["__align"], 8);
        // s.radius loads f64 at base + 24.
        assert!(contains(&out.bytes, &[0x20, 0x00, 0x41, 0x18, 0x6A, 0x2B, 0x03, 0x00]));
    }

    #[test]
    fn test_memory_imported_when_not_owned() {
        let out = compile_ok("function id(x: i32): i32\nbegin id := x end");
        assert!(contains(&out.bytes, b"\x03env\x06memory"));
    }

    #[test]
    fn test_memory_owned_with_array_params() {
        let out = compile_ok(
            "subroutine zero(a: array f64, n: i32)\nvar i: i32\nbegin\n  for i := 0, n\n    a[i] := 0.0\n  end for\nend",
        );
        assert!(!contains(&out.bytes, b"\x03env\x06memory"));
        // Memory exported under "memory".
        assert!(contains(&out.bytes, b"\x06memory\x02\x00"));
    }

    #[test]
    fn test_determinism() {
        let source = "const k: f64 := 2.5\nfunction f(x: f64): f64\nbegin  f := sin(x) * k  end";
        let a = compile_ok(source);
        let b = compile_ok(source);
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_signatures_deduplicated() {
        let out = compile_ok(
            "function a(x: i32): i32 begin a := x end\nfunction b(x: i32): i32 begin b := x end",
        );
        // One signature shared by both functions: the type section holds a
        // single functype (i32) -> i32 and is 6 bytes long.
        assert!(contains(&out.bytes, &[0x01, 0x06, 0x01, 0x60, 0x01, 0x7F, 0x01, 0x7F]));
    }

    #[test]
    fn test_vector_constant_folds() {
        let out = compile_ok("function f(): f64x2\nbegin  f := f64x2(1.0, 2.0)  end");
        let mut expected = vec![0xFD, 0x0C];
        expected.extend_from_slice(&1.0f64.to_le_bytes());
        expected.extend_from_slice(&2.0f64.to_le_bytes());
        assert!(contains(&out.bytes, &expected));
    }

    #[test]
    fn test_dump_hex() {
        let hex = dump(
            "function f(): i32\nbegin f := 1 end",
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(hex.starts_with("0061736d01000000"));
        assert_eq!(hex.len() % 2, 0);
    }

    #[test]
    fn test_parse_returns_layout_table() {
        let (program, layouts) =
            parse("packed layout P\n  a: i32\n  b: f64\nend layout").unwrap();
        assert_eq!(program.items.len(), 1);
        assert_eq!(layouts["P"]["b"], 4);
        assert_eq!(layouts["P"]["__align"], 1);
    }

    #[test]
    fn test_undefined_name_rejected() {
        let err = compile(
            "function f(): i32\nbegin  f := missing  end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_opcode_error_for_copysign_on_i32() {
        let err = compile(
            "function f(a, b: i32): i32\nbegin  f := copysign(a, b)  end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Opcode(_)));
    }

    #[test]
    fn test_return_arity_checked() {
        let err = compile(
            "subroutine s()\nbegin  call return(1)  end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Semantic(_)));

        let ok = compile(
            "function f(): i32\nbegin  call return(3)  end",
            &CompilerConfig::default(),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_non_constant_global_initialiser_rejected() {
        let err = compile(
            "var g: f64 := sin(1.0)\nfunction f(): f64 begin f := g end",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("constant"));
    }

    #[test]
    fn test_func_ref_slot_constant() {
        let out = compile_ok(
            "function f(x: f64): f64 begin f := x end\nfunction pick(): i32\nbegin  pick := @f  end",
        );
        let table = out.table.expect("table");
        assert_eq!(table["f"], 0);
    }
}
