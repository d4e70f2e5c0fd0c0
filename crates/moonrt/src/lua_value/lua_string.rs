// Lua strings are immutable byte sequences with content equality.
// Short strings are interned VM-wide so repeated keys share one allocation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ahash::{AHashMap, RandomState};

/// Longest byte length eligible for interning. Chunks of source text and
/// long user strings stay un-pooled.
const INTERN_MAX_LEN: usize = 64;

struct StrInner {
    hash: u64,
    bytes: Box<[u8]>,
}

/// An immutable Lua byte string. Cheap to clone; equality is by content
/// with an identity fast path (interned strings always hit it).
#[derive(Clone)]
pub struct LuaStr(Rc<StrInner>);

impl LuaStr {
    fn from_boxed(bytes: Box<[u8]>, hasher: &RandomState) -> Self {
        let hash = hasher.hash_one(&bytes[..]);
        LuaStr(Rc::new(StrInner { hash, bytes }))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    /// UTF-8 view, when the bytes happen to be valid UTF-8.
    #[inline]
    pub fn to_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0.bytes).ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.bytes.is_empty()
    }

    #[inline]
    pub fn hash64(&self) -> u64 {
        self.0.hash
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LuaStr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for LuaStr {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.hash == other.0.hash && self.0.bytes == other.0.bytes)
    }
}

impl Eq for LuaStr {}

impl Hash for LuaStr {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl fmt::Display for LuaStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0.bytes))
    }
}

impl fmt::Debug for LuaStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0.bytes))
    }
}

/// VM-wide pool for short strings. One interner per `LuaVM`; all string
/// creation goes through it.
pub struct StringInterner {
    hasher: RandomState,
    pool: AHashMap<Box<[u8]>, LuaStr>,
}

impl StringInterner {
    pub fn new() -> Self {
        StringInterner {
            hasher: RandomState::new(),
            pool: AHashMap::new(),
        }
    }

    pub fn intern(&mut self, bytes: &[u8]) -> LuaStr {
        if bytes.len() > INTERN_MAX_LEN {
            return LuaStr::from_boxed(bytes.into(), &self.hasher);
        }
        if let Some(s) = self.pool.get(bytes) {
            return s.clone();
        }
        let s = LuaStr::from_boxed(bytes.into(), &self.hasher);
        self.pool.insert(bytes.into(), s.clone());
        s
    }

    #[inline]
    pub fn intern_str(&mut self, s: &str) -> LuaStr {
        self.intern(s.as_bytes())
    }

    /// For owned buffers (concat results, string.format output) the long
    /// path avoids re-copying.
    pub fn intern_owned(&mut self, bytes: Vec<u8>) -> LuaStr {
        if bytes.len() > INTERN_MAX_LEN {
            return LuaStr::from_boxed(bytes.into_boxed_slice(), &self.hasher);
        }
        self.intern(&bytes)
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}
