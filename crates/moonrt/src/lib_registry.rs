// Library registration system for the standard libraries.
// Provides a declarative way to expose native functions to Lua code.

use crate::lua_value::LuaValue;
use crate::lua_vm::{CFunction, LuaResult, LuaVM};
use crate::stdlib::{self, Stdlib};

/// Creates a value when the module loads (constants like math.pi).
pub type ValueInitializer = fn(&mut LuaVM) -> LuaValue;

/// Runs after a module's table is installed (string metatable setup).
pub type ModuleInitializer = fn(&mut LuaVM, LuaValue) -> LuaResult<()>;

pub enum LibraryEntry {
    Function(CFunction),
    Value(ValueInitializer),
}

/// A library module: a named set of functions and values.
pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, LibraryEntry)>,
    pub initializer: Option<ModuleInitializer>,
}

impl LibraryModule {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
            initializer: None,
        }
    }

    pub fn with_function(mut self, name: &'static str, func: CFunction) -> Self {
        self.entries.push((name, LibraryEntry::Function(func)));
        self
    }

    pub fn with_value(mut self, name: &'static str, init: ValueInitializer) -> Self {
        self.entries.push((name, LibraryEntry::Value(init)));
        self
    }

    pub fn with_initializer(mut self, init: ModuleInitializer) -> Self {
        self.initializer = Some(init);
        self
    }
}

/// Builder macro for library modules.
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($item_name:expr => $item:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module.entries.push((
                $item_name,
                $crate::lib_registry::LibraryEntry::Function($item),
            ));
        )*
        module
    }};
}

pub struct LibraryRegistry {
    modules: Vec<LibraryModule>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    pub fn register(&mut self, module: LibraryModule) {
        self.modules.push(module);
    }

    pub fn load_all(&self, vm: &mut LuaVM) -> LuaResult<()> {
        for module in &self.modules {
            self.load_module(vm, module)?;
        }
        Ok(())
    }

    pub fn load_module(&self, vm: &mut LuaVM, module: &LibraryModule) -> LuaResult<()> {
        if module.name == "_G" {
            // Base functions install directly into the globals.
            for (name, entry) in &module.entries {
                let value = materialize(vm, name, entry);
                vm.set_global(name, value);
            }
            if let Some(init) = module.initializer {
                let globals = vm.globals();
                init(vm, globals)?;
            }
            return Ok(());
        }

        let lib_table = vm.create_table(0, module.entries.len());
        for (name, entry) in &module.entries {
            let value = materialize(vm, name, entry);
            let key = vm.create_string(name);
            if let Some(t) = lib_table.as_table() {
                let _ = t.borrow_mut().raw_set(&key, value);
            }
        }
        vm.set_global(module.name, lib_table.clone());
        if let Some(init) = module.initializer {
            init(vm, lib_table)?;
        }
        Ok(())
    }
}

fn materialize(vm: &mut LuaVM, name: &'static str, entry: &LibraryEntry) -> LuaValue {
    match entry {
        LibraryEntry::Function(func) => vm.create_native(name, *func),
        LibraryEntry::Value(init) => init(vm),
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry for the baseline standard libraries.
pub fn create_standard_registry(lib: Stdlib) -> LibraryRegistry {
    let mut registry = LibraryRegistry::new();
    if lib.includes(Stdlib::Base) {
        registry.register(stdlib::basic::create_basic_lib());
    }
    if lib.includes(Stdlib::Coroutine) {
        registry.register(stdlib::coroutine::create_coroutine_lib());
    }
    if lib.includes(Stdlib::String) {
        registry.register(stdlib::string::create_string_lib());
    }
    if lib.includes(Stdlib::Table) {
        registry.register(stdlib::table::create_table_lib());
    }
    if lib.includes(Stdlib::Math) {
        registry.register(stdlib::math::create_math_lib());
    }
    if lib.includes(Stdlib::Os) {
        registry.register(stdlib::os::create_os_lib());
    }
    if lib.includes(Stdlib::Debug) {
        registry.register(stdlib::debug::create_debug_lib());
    }
    registry
}
