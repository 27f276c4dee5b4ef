//! Compiler configuration
//!
//! Describes the host surface a compiled module may import from: a memory
//! supplied by the embedder, and host functions that calls to otherwise
//! undefined names resolve against (emitted as `host.<name>` imports).
//!
//! The CLI loads this from a TOML manifest; embedding projects build it
//! directly with the `with_*` methods.

use indexmap::IndexMap;
use serde::Deserialize;

/// Configuration for a single compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Host function surface: flattened dotted name to arity. Every
    /// parameter and the result default to f64.
    pub host_functions: IndexMap<String, usize>,

    /// The embedder supplies `env.memory`; the module imports it instead of
    /// allocating its own page.
    pub memory: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Register a host function by (possibly dotted) name and arity.
    pub fn with_host_function(mut self, name: impl Into<String>, arity: usize) -> Self {
        self.host_functions.insert(name.into(), arity);
        self
    }

    /// Mark the memory as embedder-supplied.
    pub fn with_memory(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    /// Parse a host manifest:
    ///
    /// ```toml
    /// memory = true
    ///
    /// [functions]
    /// now = 0
    /// "console.log" = 1
    /// ```
    pub fn from_manifest(content: &str) -> Result<Self, String> {
        let manifest: HostManifest =
            toml::from_str(content).map_err(|e| format!("invalid host manifest: {}", e))?;
        Ok(CompilerConfig {
            host_functions: manifest.functions.unwrap_or_default(),
            memory: manifest.memory.unwrap_or(false),
        })
    }
}

#[derive(Debug, Deserialize)]
struct HostManifest {
    memory: Option<bool>,
    functions: Option<IndexMap<String, usize>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_host_function("now", 0)
            .with_host_function("console.log", 1)
            .with_memory(true);
        assert_eq!(config.host_functions.len(), 2);
        assert_eq!(config.host_functions["console.log"], 1);
        assert!(config.memory);
    }

    #[test]
    fn test_manifest_parse() {
        let config = CompilerConfig::from_manifest(
            "memory = true\n\n[functions]\nnow = 0\n\"console.log\" = 1\n",
        )
        .unwrap();
        assert!(config.memory);
        assert_eq!(config.host_functions["now"], 0);
        assert_eq!(config.host_functions["console.log"], 1);
    }

    #[test]
    fn test_manifest_defaults() {
        let config = CompilerConfig::from_manifest("").unwrap();
        assert!(!config.memory);
        assert!(config.host_functions.is_empty());
    }

    #[test]
    fn test_manifest_rejects_garbage() {
        assert!(CompilerConfig::from_manifest("functions = 3").is_err());
    }
}
