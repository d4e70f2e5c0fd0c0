// Pre-interned strings the VM looks up constantly: metamethod event
// names, type names, coroutine status names.

use crate::lua_value::{LuaStr, StringInterner};
use crate::lua_vm::execute::TmKind;

pub struct ConstString {
    /// Event names indexed by TmKind discriminant.
    pub tmname: [LuaStr; TmKind::COUNT],

    pub tm_name: LuaStr,      // "__name"
    pub tm_metatable: LuaStr, // "__metatable"
    pub tm_pairs: LuaStr,     // "__pairs"
    pub tm_tostring: LuaStr,  // "__tostring"
}

impl ConstString {
    pub fn new(interner: &mut StringInterner) -> Self {
        let tmname = std::array::from_fn(|i| interner.intern_str(TmKind::from_usize(i).event()));
        ConstString {
            tmname,
            tm_name: interner.intern_str("__name"),
            tm_metatable: interner.intern_str("__metatable"),
            tm_pairs: interner.intern_str("__pairs"),
            tm_tostring: interner.intern_str("__tostring"),
        }
    }

    #[inline]
    pub fn event_name(&self, tm: TmKind) -> LuaStr {
        self.tmname[tm as usize].clone()
    }
}
