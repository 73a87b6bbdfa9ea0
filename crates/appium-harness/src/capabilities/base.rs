//! Cross-platform capabilities registered under the `base` tag

use serde_json::Value;
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, warn};

use super::{to_json, unknown_member, Args, Capability, CapabilityDef};
use crate::clock::{Clock, SYSTEM_CLOCK};
use crate::geometry::{BoundingBox, SwipeVector};
use crate::locator::{
    element_bounds, find_element_safe, locate_with_scroll, swipe_element, Locator, ScrollOptions,
    SwipeOptions, DEFAULT_SWIPE_DURATION_MS,
};
use crate::result::{HarnessError, HarnessResult};
use crate::session::{ElementHandle, Orientation, Session};
use crate::wait::{wait_for_presence_with_clock, DEFAULT_PRESENCE_TIMEOUT_MS};

/// Platform name reported when the session does not advertise one
pub const UNKNOWN_PLATFORM: &str = "unknown";

/// Pause after a device rotation (500ms)
pub const DEFAULT_ROTATION_SETTLE_MS: u64 = 500;

/// `platform`: lower-cased `platformName` capability
#[derive(Debug, Default)]
pub struct PlatformShortcut;

impl PlatformShortcut {
    /// Lower-cased platform name, or `"unknown"`
    pub fn platform(&self, session: &dyn Session) -> String {
        session
            .capabilities()
            .get("platformName")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map_or_else(|| UNKNOWN_PLATFORM.to_string(), str::to_lowercase)
    }
}

impl CapabilityDef for PlatformShortcut {
    const NAME: &'static str = "platform_shortcut";
    const MEMBERS: &'static [&'static str] = &["platform"];
}

impl Capability for PlatformShortcut {
    fn call(&self, session: &dyn Session, member: &str, _args: &[Value]) -> HarnessResult<Value> {
        match member {
            "platform" => Ok(Value::String(self.platform(session))),
            _ => Err(unknown_member(member)),
        }
    }
}

/// `wait_for`: element presence wait that yields `null` on timeout
#[derive(Debug)]
pub struct PresenceWait {
    timeout: Cell<Duration>,
    interval: Cell<Duration>,
    clock: Cell<&'static dyn Clock>,
}

impl Default for PresenceWait {
    fn default() -> Self {
        Self {
            timeout: Cell::new(Duration::from_millis(DEFAULT_PRESENCE_TIMEOUT_MS)),
            interval: Cell::new(Duration::from_millis(500)),
            clock: Cell::new(&SYSTEM_CLOCK),
        }
    }
}

impl PresenceWait {
    /// Timeout used when a call does not pass one
    pub fn set_default_timeout(&self, timeout: Duration) {
        self.timeout.set(timeout);
    }

    /// Interval between presence checks
    pub fn set_interval(&self, interval: Duration) {
        self.interval.set(interval);
    }

    /// Clock used for sleeps and the deadline
    pub fn use_clock(&self, clock: &'static dyn Clock) {
        self.clock.set(clock);
    }

    /// Wait for `locator`, returning `None` if it never appears
    pub fn wait_for(
        &self,
        session: &dyn Session,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> HarnessResult<Option<ElementHandle>> {
        wait_for_presence_with_clock(
            self.clock.get(),
            session,
            locator,
            timeout.unwrap_or_else(|| self.timeout.get()),
            self.interval.get(),
        )
    }
}

impl CapabilityDef for PresenceWait {
    const NAME: &'static str = "presence_wait";
    const MEMBERS: &'static [&'static str] = &["wait_for"];
}

impl Capability for PresenceWait {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "wait_for" => {
                args.at_most(2)?;
                let locator = args.locator(0)?;
                let timeout = args.optional::<u64>(1)?.map(Duration::from_millis);
                to_json(self.wait_for(session, &locator, timeout)?)
            }
            _ => Err(unknown_member(member)),
        }
    }
}

/// Element lookup, bounds and swipe helpers
#[derive(Debug)]
pub struct ElementHelper {
    default_swipe_duration: Cell<Duration>,
}

impl Default for ElementHelper {
    fn default() -> Self {
        Self {
            default_swipe_duration: Cell::new(Duration::from_millis(DEFAULT_SWIPE_DURATION_MS)),
        }
    }
}

impl ElementHelper {
    /// Duration used by swipes that do not set one
    #[must_use]
    pub fn default_swipe_duration(&self) -> Duration {
        self.default_swipe_duration.get()
    }

    /// Change the duration used by swipes that do not set one
    pub fn set_default_swipe_duration(&self, duration: Duration) {
        self.default_swipe_duration.set(duration);
    }

    /// Find an element; "not found" is `None`
    pub fn find_element_safe(
        &self,
        session: &dyn Session,
        locator: &Locator,
    ) -> HarnessResult<Option<ElementHandle>> {
        find_element_safe(session, locator)
    }

    /// Bounds of an element, or of the viewport
    pub fn element_bounds(
        &self,
        session: &dyn Session,
        locator: Option<&Locator>,
    ) -> HarnessResult<BoundingBox> {
        element_bounds(session, locator)
    }

    /// Swipe across an element or the viewport
    pub fn swipe_element(
        &self,
        session: &dyn Session,
        options: &SwipeOptions,
    ) -> HarnessResult<SwipeVector> {
        let mut options = options.clone();
        options.duration_ms.get_or_insert(self.default_swipe_duration_ms());
        swipe_element(session, &options)
    }

    /// Find an element that may need scrolling into view
    pub fn find_element_on_page(
        &self,
        session: &dyn Session,
        locator: &Locator,
        options: &ScrollOptions,
    ) -> HarnessResult<Option<ElementHandle>> {
        let mut options = options.clone();
        options.duration_ms.get_or_insert(self.default_swipe_duration_ms());
        locate_with_scroll(session, locator, &options)
    }

    fn default_swipe_duration_ms(&self) -> u64 {
        self.default_swipe_duration.get().as_millis() as u64
    }
}

impl CapabilityDef for ElementHelper {
    const NAME: &'static str = "element_helper";
    const MEMBERS: &'static [&'static str] = &[
        "find_element_safe",
        "get_element_bounds",
        "swipe_element",
        "find_element_on_page",
    ];
}

impl Capability for ElementHelper {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "find_element_safe" => {
                args.at_most(1)?;
                to_json(self.find_element_safe(session, &args.locator(0)?)?)
            }
            "get_element_bounds" => {
                args.at_most(1)?;
                let locator = args.optional_locator(0)?;
                to_json(self.element_bounds(session, locator.as_ref())?)
            }
            "swipe_element" => {
                args.at_most(1)?;
                let options: SwipeOptions = args.optional(0)?.unwrap_or_default();
                to_json(self.swipe_element(session, &options)?)
            }
            "find_element_on_page" => {
                args.at_most(2)?;
                let locator = args.locator(0)?;
                let options: ScrollOptions = args.optional(1)?.unwrap_or_default();
                to_json(self.find_element_on_page(session, &locator, &options)?)
            }
            _ => Err(unknown_member(member)),
        }
    }
}

/// `tap_a_point`
#[derive(Debug, Default)]
pub struct Gestures;

impl Gestures {
    /// Tap a screen coordinate
    ///
    /// # Errors
    ///
    /// Any failure of the tap becomes a transport fault naming the point.
    pub fn tap_a_point(&self, session: &dyn Session, x: f64, y: f64) -> HarnessResult<()> {
        session.tap(x, y).map_err(|err| {
            debug!(error = %err, "tap failed");
            HarnessError::transport(format!("Can't click on a point at ({x},{y})"))
        })
    }
}

impl CapabilityDef for Gestures {
    const NAME: &'static str = "gestures";
    const MEMBERS: &'static [&'static str] = &["tap_a_point"];
}

impl Capability for Gestures {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "tap_a_point" => {
                args.at_most(2)?;
                let x = args.optional::<f64>(0)?.unwrap_or_default();
                let y = args.optional::<f64>(1)?.unwrap_or_default();
                self.tap_a_point(session, x, y)?;
                Ok(Value::Null)
            }
            _ => Err(unknown_member(member)),
        }
    }
}

/// Orientation get/set with remember/restore and rotation
#[derive(Debug)]
pub struct ScreenOrientation {
    original: Cell<Option<Orientation>>,
    settle: Cell<Duration>,
    clock: Cell<&'static dyn Clock>,
}

impl Default for ScreenOrientation {
    fn default() -> Self {
        Self {
            original: Cell::new(None),
            settle: Cell::new(Duration::from_millis(DEFAULT_ROTATION_SETTLE_MS)),
            clock: Cell::new(&SYSTEM_CLOCK),
        }
    }
}

impl ScreenOrientation {
    /// Clock used for the post-rotation pause
    pub fn use_clock(&self, clock: &'static dyn Clock) {
        self.clock.set(clock);
    }

    /// Pause after a rotation
    pub fn set_settle(&self, settle: Duration) {
        self.settle.set(settle);
    }

    /// Orientation stored by [`Self::remember_original_orientation`]
    #[must_use]
    pub fn original(&self) -> Option<Orientation> {
        self.original.get()
    }

    /// Current orientation
    pub fn get_orientation(&self, session: &dyn Session) -> HarnessResult<Orientation> {
        session.orientation()
    }

    /// Change orientation
    pub fn set_orientation(
        &self,
        session: &dyn Session,
        orientation: Orientation,
    ) -> HarnessResult<()> {
        session.set_orientation(orientation)
    }

    /// Store the current orientation for later restore
    pub fn remember_original_orientation(&self, session: &dyn Session) -> HarnessResult<Orientation> {
        let current = session.orientation()?;
        self.original.set(Some(current));
        Ok(current)
    }

    /// Return to the remembered orientation
    ///
    /// # Errors
    ///
    /// [`HarnessError::InvalidArgument`] if nothing was remembered.
    pub fn restore_original_orientation(&self, session: &dyn Session) -> HarnessResult<Orientation> {
        let original = self.original.get().ok_or_else(|| {
            HarnessError::invalid_argument(
                "restore_original_orientation",
                "no orientation has been remembered",
            )
        })?;
        session.set_orientation(original)?;
        Ok(original)
    }

    /// Flip between portrait and landscape, then pause briefly.
    ///
    /// Devices that refuse the change are logged, not raised; the result is the
    /// orientation requested, or `None` when the device refused.
    pub fn rotate_device(&self, session: &dyn Session) -> HarnessResult<Option<Orientation>> {
        let target = session.orientation()?.rotated();
        match session.set_orientation(target) {
            Ok(()) => {
                self.clock.get().sleep(self.settle.get());
                Ok(Some(target))
            }
            Err(err) if err.is_transport() => {
                warn!(
                    error = %err,
                    "device does not support orientation change, app may be left in an odd state"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl CapabilityDef for ScreenOrientation {
    const NAME: &'static str = "orientation";
    const MEMBERS: &'static [&'static str] = &[
        "get_orientation",
        "set_orientation",
        "remember_original_orientation",
        "restore_original_orientation",
        "rotate_device",
    ];
}

impl Capability for ScreenOrientation {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "get_orientation" => to_json(self.get_orientation(session)?),
            "set_orientation" => {
                args.at_most(1)?;
                self.set_orientation(session, args.required(0)?)?;
                Ok(Value::Null)
            }
            "remember_original_orientation" => to_json(self.remember_original_orientation(session)?),
            "restore_original_orientation" => to_json(self.restore_original_orientation(session)?),
            "rotate_device" => to_json(self.rotate_device(session)?),
            _ => Err(unknown_member(member)),
        }
    }
}
