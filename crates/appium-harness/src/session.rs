//! Session - the remote automation handle seam
//!
//! Everything in this crate talks to a device through the [`Session`] trait.
//! Production code wraps an Appium/WebDriver client; tests use
//! [`ScriptedSession`], which records every call and serves canned answers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  CompositeSession (capabilities layered on top)          │
//! │      │ primitives delegate        │ invoke() dispatches  │
//! │      ▼                            ▼                      │
//! │  ┌────────────────┐     ┌──────────────────────────────┐ │
//! │  │ dyn Session    │     │ ComposedLayout member table  │ │
//! │  │ (remote client │     │ later modules shadow earlier │ │
//! │  │  or Scripted)  │     └──────────────────────────────┘ │
//! │  └────────────────┘                                      │
//! └──────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::capabilities::Capability;
use crate::geometry::{BoundingBox, Size, SwipeVector};
use crate::locator::Locator;
use crate::result::{HarnessError, HarnessResult};

/// Context name of the native UI layer
pub const NATIVE_CONTEXT: &str = "NATIVE_APP";

/// Opaque reference to a located remote element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Remote element id
    pub id: String,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Screen orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
    /// Tall
    #[default]
    Portrait,
    /// Wide
    Landscape,
}

impl Orientation {
    /// The other orientation
    #[must_use]
    pub const fn rotated(self) -> Self {
        match self {
            Self::Portrait => Self::Landscape,
            Self::Landscape => Self::Portrait,
        }
    }

    /// Upper-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Portrait => "PORTRAIT",
            Self::Landscape => "LANDSCAPE",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote automation session
///
/// The primitive operations a capability module may rely on. A lookup that
/// matches nothing fails with [`HarnessError::NoSuchElement`]; every other
/// remote failure is a [`HarnessError::Transport`].
pub trait Session: fmt::Debug {
    /// Find one element
    fn find_element(&self, locator: &Locator) -> HarnessResult<ElementHandle>;

    /// Position and size of a located element
    fn element_rect(&self, element: &ElementHandle) -> HarnessResult<BoundingBox>;

    /// Size of the device viewport
    fn window_size(&self) -> HarnessResult<Size>;

    /// Perform a swipe gesture
    fn swipe(&self, vector: SwipeVector, duration: Duration) -> HarnessResult<()>;

    /// Tap a screen coordinate
    fn tap(&self, x: f64, y: f64) -> HarnessResult<()>;

    /// Send a hardware key code
    fn press_keycode(&self, keycode: u32) -> HarnessResult<()>;

    /// Names of the available UI contexts
    fn contexts(&self) -> HarnessResult<Vec<String>>;

    /// Name of the active UI context
    fn current_context(&self) -> HarnessResult<String>;

    /// Activate a UI context
    fn switch_context(&self, name: &str) -> HarnessResult<()>;

    /// Current screen orientation
    fn orientation(&self) -> HarnessResult<Orientation>;

    /// Change the screen orientation
    fn set_orientation(&self, orientation: Orientation) -> HarnessResult<()>;

    /// Capabilities the session was created with
    fn capabilities(&self) -> Map<String, Value>;

    /// Call a member by name.
    ///
    /// Plain sessions only know their native extras; a composed session first
    /// consults its capability table.
    fn invoke(&self, member: &str, args: &[Value]) -> HarnessResult<Value>;

    /// Capability instances layered on this session, outermost first
    fn layered_capabilities(&self) -> Vec<&(dyn Capability + 'static)> {
        Vec::new()
    }
}

/// A shared handle is a session too, so a caller can keep inspecting a session
/// after handing a clone to [`crate::compose`].
impl<S: Session + ?Sized> Session for Rc<S> {
    fn find_element(&self, locator: &Locator) -> HarnessResult<ElementHandle> {
        (**self).find_element(locator)
    }

    fn element_rect(&self, element: &ElementHandle) -> HarnessResult<BoundingBox> {
        (**self).element_rect(element)
    }

    fn window_size(&self) -> HarnessResult<Size> {
        (**self).window_size()
    }

    fn swipe(&self, vector: SwipeVector, duration: Duration) -> HarnessResult<()> {
        (**self).swipe(vector, duration)
    }

    fn tap(&self, x: f64, y: f64) -> HarnessResult<()> {
        (**self).tap(x, y)
    }

    fn press_keycode(&self, keycode: u32) -> HarnessResult<()> {
        (**self).press_keycode(keycode)
    }

    fn contexts(&self) -> HarnessResult<Vec<String>> {
        (**self).contexts()
    }

    fn current_context(&self) -> HarnessResult<String> {
        (**self).current_context()
    }

    fn switch_context(&self, name: &str) -> HarnessResult<()> {
        (**self).switch_context(name)
    }

    fn orientation(&self) -> HarnessResult<Orientation> {
        (**self).orientation()
    }

    fn set_orientation(&self, orientation: Orientation) -> HarnessResult<()> {
        (**self).set_orientation(orientation)
    }

    fn capabilities(&self) -> Map<String, Value> {
        (**self).capabilities()
    }

    fn invoke(&self, member: &str, args: &[Value]) -> HarnessResult<Value> {
        (**self).invoke(member, args)
    }

    fn layered_capabilities(&self) -> Vec<&(dyn Capability + 'static)> {
        (**self).layered_capabilities()
    }
}

#[derive(Debug, Clone)]
struct ScriptedElement {
    locator: Locator,
    bounds: BoundingBox,
    revealed_after: usize,
}

#[derive(Debug, Clone)]
struct ScriptedContext {
    name: String,
    available_after: usize,
}

/// Scripted session for unit testing
///
/// Elements can be hidden until a number of swipes have happened, contexts
/// until a number of `contexts()` polls have happened, and the first N finds
/// can be made to fail with a transport fault.
#[derive(Debug)]
pub struct ScriptedSession {
    window: Size,
    elements: Vec<ScriptedElement>,
    capabilities: Map<String, Value>,
    members: HashMap<String, Value>,
    contexts: Vec<ScriptedContext>,
    current_context: RefCell<String>,
    context_polls: Cell<usize>,
    orientation: Cell<Orientation>,
    orientation_locked: bool,
    failing_taps: bool,
    transport_faults: Cell<usize>,
    swipes: RefCell<Vec<(SwipeVector, Duration)>>,
    keycodes: RefCell<Vec<u32>>,
    call_history: RefCell<Vec<String>>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self {
            window: Size::new(1000, 1000),
            elements: Vec::new(),
            capabilities: Map::new(),
            members: HashMap::new(),
            contexts: vec![ScriptedContext {
                name: NATIVE_CONTEXT.to_string(),
                available_after: 0,
            }],
            current_context: RefCell::new(NATIVE_CONTEXT.to_string()),
            context_polls: Cell::new(0),
            orientation: Cell::new(Orientation::Portrait),
            orientation_locked: false,
            failing_taps: false,
            transport_faults: Cell::new(0),
            swipes: RefCell::new(Vec::new()),
            keycodes: RefCell::new(Vec::new()),
            call_history: RefCell::new(Vec::new()),
        }
    }
}

impl ScriptedSession {
    /// Create a 1000x1000 session with nothing on screen
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the viewport size
    #[must_use]
    pub const fn with_window(mut self, window: Size) -> Self {
        self.window = window;
        self
    }

    /// Add an element that is visible immediately
    #[must_use]
    pub fn with_element(self, locator: Locator, bounds: BoundingBox) -> Self {
        self.with_element_after_swipes(locator, bounds, 0)
    }

    /// Add an element that appears once `swipes` swipes have been performed
    #[must_use]
    pub fn with_element_after_swipes(
        mut self,
        locator: Locator,
        bounds: BoundingBox,
        swipes: usize,
    ) -> Self {
        self.elements.push(ScriptedElement {
            locator,
            bounds,
            revealed_after: swipes,
        });
        self
    }

    /// Add a session capability
    #[must_use]
    pub fn with_capability(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.capabilities.insert(name.into(), value.into());
        self
    }

    /// Add a native member answering `invoke` with a fixed value
    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>, response: impl Into<Value>) -> Self {
        self.members.insert(name.into(), response.into());
        self
    }

    /// Add a context that is available immediately
    #[must_use]
    pub fn with_context(self, name: impl Into<String>) -> Self {
        self.with_context_after_polls(name, 0)
    }

    /// Add a context that shows up after `polls` calls to `contexts()`
    #[must_use]
    pub fn with_context_after_polls(mut self, name: impl Into<String>, polls: usize) -> Self {
        self.contexts.push(ScriptedContext {
            name: name.into(),
            available_after: polls,
        });
        self
    }

    /// Reject every orientation change
    #[must_use]
    pub const fn with_locked_orientation(mut self) -> Self {
        self.orientation_locked = true;
        self
    }

    /// Fail every tap
    #[must_use]
    pub const fn with_failing_taps(mut self) -> Self {
        self.failing_taps = true;
        self
    }

    /// Fail the next `count` finds with a transport fault
    #[must_use]
    pub fn with_transport_faults(self, count: usize) -> Self {
        self.transport_faults.set(count);
        self
    }

    /// Viewport size
    #[must_use]
    pub const fn window(&self) -> Size {
        self.window
    }

    /// Swipes performed so far
    #[must_use]
    pub fn swipes(&self) -> Vec<(SwipeVector, Duration)> {
        self.swipes.borrow().clone()
    }

    /// Key codes pressed so far
    #[must_use]
    pub fn keycodes(&self) -> Vec<u32> {
        self.keycodes.borrow().clone()
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.call_history.borrow().clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history
            .borrow()
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Number of calls to a method
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.call_history
            .borrow()
            .iter()
            .filter(|c| c.split(':').next() == Some(method))
            .count()
    }

    fn record(&self, call: String) {
        self.call_history.borrow_mut().push(call);
    }

    fn visible_contexts(&self) -> Vec<String> {
        let polls = self.context_polls.get();
        self.contexts
            .iter()
            .filter(|c| c.available_after <= polls)
            .map(|c| c.name.clone())
            .collect()
    }
}

impl Session for ScriptedSession {
    fn find_element(&self, locator: &Locator) -> HarnessResult<ElementHandle> {
        self.record(format!("find_element:{locator}"));
        let faults = self.transport_faults.get();
        if faults > 0 {
            self.transport_faults.set(faults - 1);
            return Err(HarnessError::transport("connection reset by peer"));
        }

        let swiped = self.swipes.borrow().len();
        self.elements
            .iter()
            .position(|e| &e.locator == locator && e.revealed_after <= swiped)
            .map(|index| ElementHandle::new(format!("element-{index}")))
            .ok_or_else(|| HarnessError::NoSuchElement {
                strategy: locator.strategy.to_string(),
                value: locator.value.clone(),
            })
    }

    fn element_rect(&self, element: &ElementHandle) -> HarnessResult<BoundingBox> {
        self.record(format!("element_rect:{}", element.id));
        element
            .id
            .strip_prefix("element-")
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(|index| self.elements.get(index))
            .map(|e| e.bounds)
            .ok_or_else(|| HarnessError::transport(format!("stale element {}", element.id)))
    }

    fn window_size(&self) -> HarnessResult<Size> {
        self.record("window_size".to_string());
        Ok(self.window)
    }

    fn swipe(&self, vector: SwipeVector, duration: Duration) -> HarnessResult<()> {
        self.record(format!(
            "swipe:{},{}->{},{}",
            vector.start_x, vector.start_y, vector.end_x, vector.end_y
        ));
        self.swipes.borrow_mut().push((vector, duration));
        Ok(())
    }

    fn tap(&self, x: f64, y: f64) -> HarnessResult<()> {
        self.record(format!("tap:{x},{y}"));
        if self.failing_taps {
            return Err(HarnessError::transport("tap rejected"));
        }
        Ok(())
    }

    fn press_keycode(&self, keycode: u32) -> HarnessResult<()> {
        self.record(format!("press_keycode:{keycode}"));
        self.keycodes.borrow_mut().push(keycode);
        Ok(())
    }

    fn contexts(&self) -> HarnessResult<Vec<String>> {
        self.record("contexts".to_string());
        let visible = self.visible_contexts();
        self.context_polls.set(self.context_polls.get() + 1);
        Ok(visible)
    }

    fn current_context(&self) -> HarnessResult<String> {
        self.record("current_context".to_string());
        Ok(self.current_context.borrow().clone())
    }

    fn switch_context(&self, name: &str) -> HarnessResult<()> {
        self.record(format!("switch_context:{name}"));
        let available = self.visible_contexts();
        if !available.iter().any(|c| c == name) {
            return Err(HarnessError::ContextNotFound {
                wanted: name.to_string(),
                available,
            });
        }
        *self.current_context.borrow_mut() = name.to_string();
        Ok(())
    }

    fn orientation(&self) -> HarnessResult<Orientation> {
        self.record("orientation".to_string());
        Ok(self.orientation.get())
    }

    fn set_orientation(&self, orientation: Orientation) -> HarnessResult<()> {
        self.record(format!("set_orientation:{orientation}"));
        if self.orientation_locked {
            return Err(HarnessError::transport(
                "set rotation failed: orientation is locked",
            ));
        }
        self.orientation.set(orientation);
        Ok(())
    }

    fn capabilities(&self) -> Map<String, Value> {
        self.capabilities.clone()
    }

    fn invoke(&self, member: &str, _args: &[Value]) -> HarnessResult<Value> {
        self.record(format!("invoke:{member}"));
        self.members
            .get(member)
            .cloned()
            .ok_or_else(|| HarnessError::UnknownMember {
                name: member.to_string(),
            })
    }
}
