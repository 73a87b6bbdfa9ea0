//! Composite session: a wrapped handle plus its capability instances

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::capabilities::Capability;
use crate::geometry::{BoundingBox, Size, SwipeVector};
use crate::locator::Locator;
use crate::registry::ComposedLayout;
use crate::result::HarnessResult;
use crate::session::{ElementHandle, Orientation, Session};

/// A session with capability modules layered on top.
///
/// Primitive operations go straight to the wrapped handle. [`Session::invoke`]
/// consults the layout first and falls back to the handle, so composing a
/// composite again stacks a new layer that still reaches every older one.
pub struct CompositeSession {
    inner: Box<dyn Session>,
    layout: Arc<ComposedLayout>,
    instances: Vec<Box<dyn Capability>>,
}

impl fmt::Debug for CompositeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeSession")
            .field("tag", &self.layout.tag())
            .field("instances", &self.instances)
            .field("inner", &self.inner)
            .finish()
    }
}

impl CompositeSession {
    /// Instantiate every module of `layout`, then run the initializers in
    /// registration order against the finished composite
    pub(crate) fn assemble(
        inner: Box<dyn Session>,
        layout: Arc<ComposedLayout>,
    ) -> HarnessResult<Self> {
        let instances = layout
            .modules()
            .iter()
            .map(|module| module.instantiate())
            .collect();
        let composite = Self {
            inner,
            layout,
            instances,
        };
        for instance in &composite.instances {
            instance.initialize(&composite)?;
        }
        Ok(composite)
    }

    /// Tag this layer was composed from
    #[must_use]
    pub fn tag(&self) -> &str {
        self.layout.tag()
    }

    /// Whether this layer defines `member` (older layers are not consulted)
    #[must_use]
    pub fn defines(&self, member: &str) -> bool {
        self.layout.defines(member)
    }

    /// The wrapped handle
    #[must_use]
    pub fn inner(&self) -> &dyn Session {
        self.inner.as_ref()
    }

    /// Unwrap the handle, dropping this layer's capability instances
    #[must_use]
    pub fn into_inner(self) -> Box<dyn Session> {
        self.inner
    }

    /// Most recently applied instance of capability `T`, outer layers first
    #[must_use]
    pub fn capability<T: Capability>(&self) -> Option<&T> {
        self.layered_capabilities()
            .into_iter()
            .find_map(|capability| capability.downcast_ref::<T>())
    }

    /// Invoke a member and deserialize its result
    pub fn call_as<T: DeserializeOwned>(&self, member: &str, args: &[Value]) -> HarnessResult<T> {
        Ok(serde_json::from_value(self.invoke(member, args)?)?)
    }
}

impl Session for CompositeSession {
    fn find_element(&self, locator: &Locator) -> HarnessResult<ElementHandle> {
        self.inner.find_element(locator)
    }

    fn element_rect(&self, element: &ElementHandle) -> HarnessResult<BoundingBox> {
        self.inner.element_rect(element)
    }

    fn window_size(&self) -> HarnessResult<Size> {
        self.inner.window_size()
    }

    fn swipe(&self, vector: SwipeVector, duration: Duration) -> HarnessResult<()> {
        self.inner.swipe(vector, duration)
    }

    fn tap(&self, x: f64, y: f64) -> HarnessResult<()> {
        self.inner.tap(x, y)
    }

    fn press_keycode(&self, keycode: u32) -> HarnessResult<()> {
        self.inner.press_keycode(keycode)
    }

    fn contexts(&self) -> HarnessResult<Vec<String>> {
        self.inner.contexts()
    }

    fn current_context(&self) -> HarnessResult<String> {
        self.inner.current_context()
    }

    fn switch_context(&self, name: &str) -> HarnessResult<()> {
        self.inner.switch_context(name)
    }

    fn orientation(&self) -> HarnessResult<Orientation> {
        self.inner.orientation()
    }

    fn set_orientation(&self, orientation: Orientation) -> HarnessResult<()> {
        self.inner.set_orientation(orientation)
    }

    fn capabilities(&self) -> Map<String, Value> {
        self.inner.capabilities()
    }

    fn invoke(&self, member: &str, args: &[Value]) -> HarnessResult<Value> {
        match self.layout.resolve(member) {
            Some(index) => self.instances[index].call(self, member, args),
            None => self.inner.invoke(member, args),
        }
    }

    fn layered_capabilities(&self) -> Vec<&(dyn Capability + 'static)> {
        let mut layered: Vec<&(dyn Capability + 'static)> =
            self.instances.iter().rev().map(AsRef::as_ref).collect();
        layered.extend(self.inner.layered_capabilities());
        layered
    }
}
