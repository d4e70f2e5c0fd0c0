// Resource limits for one VM.

/// Caps on recursion through the trampoline plus native call nesting.
#[derive(Debug, Clone)]
pub struct LuaLimits {
    /// Nested call limit (trampoline contexts + native re-entries).
    /// Exceeding it raises "C stack overflow".
    pub max_call_depth: usize,
    /// Bound on `__index`/`__newindex`/`__call` chain walks.
    pub max_meta_chain: usize,
}

impl Default for LuaLimits {
    fn default() -> Self {
        LuaLimits {
            max_call_depth: 1000,
            max_meta_chain: 100,
        }
    }
}
