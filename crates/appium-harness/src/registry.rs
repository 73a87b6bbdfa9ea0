//! Capability registry and composition
//!
//! Modules are registered under a tag; composing a tag wraps a session in a
//! [`CompositeSession`] that owns one fresh instance of every module registered
//! under it.
//!
//! ```text
//! register("base", PlatformShortcut)   ─┐
//! register("base", ElementHelper)      ─┼─► ComposedLayout("base")   (memoized)
//! register("base", Gestures)           ─┘        │ member -> module index,
//!                                                │ later modules shadow
//! compose(handle, "base") ───────────────────────┴─► CompositeSession
//! ```
//!
//! Duplicate registrations are allowed; the later copy shadows the earlier one
//! for every member they share.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use tracing::debug;

use crate::capabilities::{install_builtin_capabilities, Capability, CapabilityDef};
use crate::composite::CompositeSession;
use crate::result::{HarnessError, HarnessResult};
use crate::session::Session;

/// Tag of the cross-platform modules
pub const DEFAULT_TAG: &str = "base";

/// Registry entry: how to build one capability instance
#[derive(Clone, Copy)]
pub struct CapabilityModule {
    name: &'static str,
    members: &'static [&'static str],
    factory: fn() -> Box<dyn Capability>,
}

impl fmt::Debug for CapabilityModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityModule")
            .field("name", &self.name)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

fn instantiate<T: CapabilityDef>() -> Box<dyn Capability> {
    Box::new(T::default())
}

impl CapabilityModule {
    /// Module for a capability type
    #[must_use]
    pub fn of<T: CapabilityDef>() -> Self {
        Self {
            name: T::NAME,
            members: T::MEMBERS,
            factory: instantiate::<T>,
        }
    }

    /// Module with an explicit member list and factory
    #[must_use]
    pub const fn new(
        name: &'static str,
        members: &'static [&'static str],
        factory: fn() -> Box<dyn Capability>,
    ) -> Self {
        Self {
            name,
            members,
            factory,
        }
    }

    /// Module name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Members the module defines
    #[must_use]
    pub const fn members(&self) -> &'static [&'static str] {
        self.members
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Capability> {
        (self.factory)()
    }
}

/// Member table of one tag, built once and shared by every composition
#[derive(Debug)]
pub struct ComposedLayout {
    tag: String,
    modules: Vec<CapabilityModule>,
    dispatch: HashMap<&'static str, usize>,
}

impl ComposedLayout {
    fn build(tag: &str, modules: Vec<CapabilityModule>) -> Self {
        let mut dispatch = HashMap::new();
        for (index, module) in modules.iter().enumerate() {
            for member in module.members {
                dispatch.insert(*member, index);
            }
        }
        Self {
            tag: tag.to_string(),
            modules,
            dispatch,
        }
    }

    /// Tag this layout was built for
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Modules in registration order
    #[must_use]
    pub fn modules(&self) -> &[CapabilityModule] {
        &self.modules
    }

    /// Index of the module answering `member`
    #[must_use]
    pub fn resolve(&self, member: &str) -> Option<usize> {
        self.dispatch.get(member).copied()
    }

    /// Whether any module of the layout defines `member`
    #[must_use]
    pub fn defines(&self, member: &str) -> bool {
        self.dispatch.contains_key(member)
    }

    /// Every member name, sorted
    #[must_use]
    pub fn members(&self) -> Vec<&'static str> {
        self.dispatch
            .keys()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Tag → ordered capability modules
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    modules: RwLock<HashMap<String, Vec<CapabilityModule>>>,
    layouts: Mutex<HashMap<String, Arc<ComposedLayout>>>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in modules
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        install_builtin_capabilities(&registry);
        registry
    }

    /// Append `module` to `tag`'s list.
    ///
    /// Repeats are not filtered out.
    pub fn register(&self, tag: &str, module: CapabilityModule) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tag.to_string())
            .or_default()
            .push(module);
        self.layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag);
        debug!(tag, module = module.name, "registered capability module");
    }

    /// Register a capability type
    pub fn register_type<T: CapabilityDef>(&self, tag: &str) {
        self.register(tag, CapabilityModule::of::<T>());
    }

    /// Modules registered under `tag`, in order
    #[must_use]
    pub fn modules(&self, tag: &str) -> Vec<CapabilityModule> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether any module is registered under `tag`
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .is_some_and(|modules| !modules.is_empty())
    }

    /// Registered tags, sorted
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    /// Memoized member table for `tag`
    pub fn layout(&self, tag: &str) -> Arc<ComposedLayout> {
        let mut layouts = self.layouts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(layout) = layouts.get(tag) {
            return Arc::clone(layout);
        }
        let layout = Arc::new(ComposedLayout::build(tag, self.modules(tag)));
        debug!(tag, members = layout.dispatch.len(), "built composed layout");
        layouts.insert(tag.to_string(), Arc::clone(&layout));
        layout
    }

    /// Wrap `handle` with fresh instances of `tag`'s modules.
    ///
    /// # Errors
    ///
    /// Whatever a module initializer returns.
    pub fn compose(&self, handle: Box<dyn Session>, tag: &str) -> HarnessResult<CompositeSession> {
        CompositeSession::assemble(handle, self.layout(tag))
    }

    /// Compose `base`, then the platform tag the base layer reports.
    ///
    /// The platform layer is skipped when nothing is registered under it.
    pub fn compose_for_platform(&self, handle: Box<dyn Session>) -> HarnessResult<CompositeSession> {
        let base = self.compose(handle, DEFAULT_TAG)?;
        let platform = match base.invoke("platform", &[]) {
            Ok(value) => value.as_str().map(str::to_string),
            Err(HarnessError::UnknownMember { .. }) => None,
            Err(err) => return Err(err),
        };

        match platform {
            Some(tag) if tag != DEFAULT_TAG && self.has_tag(&tag) => {
                debug!(platform = %tag, "layering platform capabilities");
                self.compose(Box::new(base), &tag)
            }
            _ => Ok(base),
        }
    }
}

/// Process-wide registry, holding the built-in modules
pub fn global_registry() -> &'static CapabilityRegistry {
    static GLOBAL: OnceLock<CapabilityRegistry> = OnceLock::new();
    GLOBAL.get_or_init(CapabilityRegistry::with_builtins)
}

/// Register a module in the global registry
pub fn register(tag: &str, module: CapabilityModule) {
    global_registry().register(tag, module);
}

/// Compose a tag from the global registry
pub fn compose(handle: Box<dyn Session>, tag: &str) -> HarnessResult<CompositeSession> {
    global_registry().compose(handle, tag)
}

/// Compose `base` plus the platform layer from the global registry
pub fn compose_for_platform(handle: Box<dyn Session>) -> HarnessResult<CompositeSession> {
    global_registry().compose_for_platform(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{ElementHelper, Gestures};
    use serde_json::{json, Value};
    use std::cell::Cell;

    #[derive(Debug, Default)]
    struct First;

    impl Capability for First {
        fn call(&self, _: &dyn Session, _: &str, _: &[Value]) -> HarnessResult<Value> {
            Ok(json!("first"))
        }
    }

    impl CapabilityDef for First {
        const NAME: &'static str = "first";
        const MEMBERS: &'static [&'static str] = &["greet", "only_first"];
    }

    #[derive(Debug, Default)]
    struct Second;

    impl Capability for Second {
        fn call(&self, _: &dyn Session, _: &str, _: &[Value]) -> HarnessResult<Value> {
            Ok(json!("second"))
        }
    }

    impl CapabilityDef for Second {
        const NAME: &'static str = "second";
        const MEMBERS: &'static [&'static str] = &["greet"];
    }

    #[derive(Debug, Default)]
    struct Counter {
        initialized: Cell<u32>,
    }

    impl Capability for Counter {
        fn initialize(&self, _: &dyn Session) -> HarnessResult<()> {
            self.initialized.set(self.initialized.get() + 1);
            Ok(())
        }

        fn call(&self, _: &dyn Session, _: &str, _: &[Value]) -> HarnessResult<Value> {
            Ok(json!(self.initialized.get()))
        }
    }

    impl CapabilityDef for Counter {
        const NAME: &'static str = "counter";
        const MEMBERS: &'static [&'static str] = &["count"];
    }

    mod layout_tests {
        use super::*;

        #[test]
        fn test_later_module_shadows() {
            let registry = CapabilityRegistry::new();
            registry.register_type::<First>("t");
            registry.register_type::<Second>("t");

            let layout = registry.layout("t");
            assert_eq!(layout.resolve("greet"), Some(1));
            assert_eq!(layout.resolve("only_first"), Some(0));
            assert_eq!(layout.members(), vec!["greet", "only_first"]);
        }

        #[test]
        fn test_layout_is_memoized() {
            let registry = CapabilityRegistry::new();
            registry.register_type::<First>("t");
            assert!(Arc::ptr_eq(&registry.layout("t"), &registry.layout("t")));
        }

        #[test]
        fn test_register_invalidates_layout() {
            let registry = CapabilityRegistry::new();
            registry.register_type::<First>("t");
            let before = registry.layout("t");
            registry.register_type::<Second>("t");
            let after = registry.layout("t");
            assert!(!Arc::ptr_eq(&before, &after));
            assert_eq!(after.modules().len(), 2);
        }

        #[test]
        fn test_duplicates_are_kept() {
            let registry = CapabilityRegistry::new();
            registry.register_type::<First>("t");
            registry.register_type::<First>("t");
            let layout = registry.layout("t");
            assert_eq!(layout.modules().len(), 2);
            assert_eq!(layout.resolve("greet"), Some(1));
        }

        #[test]
        fn test_unknown_tag_is_empty() {
            let registry = CapabilityRegistry::new();
            assert!(registry.layout("nope").modules().is_empty());
            assert!(!registry.has_tag("nope"));
        }
    }

    mod compose_tests {
        use super::*;
        use crate::session::ScriptedSession;

        #[test]
        fn test_compose_dispatches_to_later_module() {
            let registry = CapabilityRegistry::new();
            registry.register_type::<First>(DEFAULT_TAG);
            registry.register_type::<Second>(DEFAULT_TAG);

            let composite = registry
                .compose(Box::new(ScriptedSession::new()), DEFAULT_TAG)
                .unwrap();
            assert_eq!(composite.invoke("greet", &[]).unwrap(), json!("second"));
            assert_eq!(composite.invoke("only_first", &[]).unwrap(), json!("first"));
        }

        #[test]
        fn test_undefined_member_reaches_handle() {
            let registry = CapabilityRegistry::new();
            registry.register_type::<First>(DEFAULT_TAG);
            let handle = ScriptedSession::new().with_member("device_time", json!("12:00"));

            let composite = registry.compose(Box::new(handle), DEFAULT_TAG).unwrap();
            assert_eq!(composite.invoke("device_time", &[]).unwrap(), json!("12:00"));
            assert!(matches!(
                composite.invoke("missing", &[]),
                Err(HarnessError::UnknownMember { .. })
            ));
        }

        #[test]
        fn test_instances_are_fresh_per_composition() {
            let registry = CapabilityRegistry::new();
            registry.register_type::<Counter>(DEFAULT_TAG);

            let a = registry.compose(Box::new(ScriptedSession::new()), DEFAULT_TAG).unwrap();
            let b = registry.compose(Box::new(ScriptedSession::new()), DEFAULT_TAG).unwrap();
            assert_eq!(a.invoke("count", &[]).unwrap(), json!(1));
            assert_eq!(b.invoke("count", &[]).unwrap(), json!(1));
        }

        #[test]
        fn test_platform_layer_is_applied() {
            let registry = CapabilityRegistry::with_builtins();
            let handle = ScriptedSession::new().with_capability("platformName", "Android");

            let composite = registry.compose_for_platform(Box::new(handle)).unwrap();
            assert_eq!(composite.tag(), "android");
            assert!(composite.defines("back"));
            assert!(composite.capability::<ElementHelper>().is_some());
            assert_eq!(composite.invoke("platform", &[]).unwrap(), json!("android"));
        }

        #[test]
        fn test_unregistered_platform_stays_base() {
            let registry = CapabilityRegistry::with_builtins();
            let handle = ScriptedSession::new().with_capability("platformName", "Windows");

            let composite = registry.compose_for_platform(Box::new(handle)).unwrap();
            assert_eq!(composite.tag(), DEFAULT_TAG);
            assert!(composite.capability::<Gestures>().is_some());
        }

        #[test]
        fn test_global_registry_has_builtins() {
            assert!(global_registry().has_tag(DEFAULT_TAG));
            assert!(global_registry().has_tag("ios"));
        }
    }
}
