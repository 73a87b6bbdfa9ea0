//! appium-harness: Session Helpers for Appium Test Suites
//!
//! Layers cross-platform and platform-specific helpers onto a remote mobile
//! automation session, compiles UiAutomator selector expressions, and provides
//! the swipe geometry and poll/wait loops those helpers are built from.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  appium-harness Architecture                     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────────────┐    │
//! │   │ Raw        │    │ compose    │    │ CompositeSession   │    │
//! │   │ Session    │───►│ "base"     │───►│ + platform layer   │    │
//! │   │ handle     │    │ registry   │    │ ("android"/"ios")  │    │
//! │   └────────────┘    └────────────┘    └────────────────────┘    │
//! │                                                │                │
//! │        ┌───────────────┬───────────────┬──────┴────────┐        │
//! │        ▼               ▼               ▼               ▼        │
//! │   selector         geometry         locator          wait       │
//! │   (UiSelector)     (SwipeVector)    (scroll-retry)   (poll)     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use appium_harness::prelude::*;
//!
//! let session = compose_for_platform(Box::new(remote))?;
//! let row = session
//!     .capability::<ElementHelper>()
//!     .expect("base layer")
//!     .find_element_on_page(&session, &Locator::id("row"), &ScrollOptions::default())?;
//! ```

#![warn(missing_docs)]

#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod capabilities;
pub mod clock;
#[allow(clippy::missing_errors_doc)]
mod composite;
pub mod config;
pub mod geometry;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::unnecessary_wraps
)]
pub mod locator;
pub mod logging;
pub mod registry;
mod result;
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
pub mod selector;
#[allow(clippy::missing_errors_doc, clippy::missing_const_for_fn)]
pub mod session;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
pub mod wait;

pub use capabilities::{
    install_builtin_capabilities, AndroidKeys, AndroidUiAutomator, AndroidWebView, Capability,
    CapabilityDef, ElementHelper, Gestures, IosWebView, PlatformShortcut, PresenceWait,
    ScreenOrientation,
};
pub use clock::{Clock, ManualClock, SystemClock, SYSTEM_CLOCK};
pub use composite::CompositeSession;
pub use config::{CaptureDebug, HarnessConfig};
pub use geometry::{swipe_vector, Axis, BoundingBox, Direction, Size, SwipeVector, TieBreak};
pub use locator::{
    element_bounds, find_element_safe, locate_with_scroll, swipe_element, Locator, ScrollOptions,
    Strategy, SwipeOptions,
};
pub use registry::{
    compose, compose_for_platform, global_registry, register, CapabilityModule,
    CapabilityRegistry, ComposedLayout, DEFAULT_TAG,
};
pub use result::{HarnessError, HarnessResult};
pub use selector::{Arg, ArgTransform, Expression, UiCollection, UiScrollable, UiSelector};
pub use session::{ElementHandle, Orientation, ScriptedSession, Session};
pub use wait::{
    poll, poll_until, wait_for_presence, wait_for_service_ready, wait_until_deadline,
    DeadlineOptions, PollState, Poller, WaitResult,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::capabilities::*;
    pub use super::clock::*;
    pub use super::composite::*;
    pub use super::config::*;
    pub use super::geometry::*;
    pub use super::locator::*;
    pub use super::registry::*;
    pub use super::result::*;
    pub use super::selector::*;
    pub use super::session::*;
    pub use super::wait::*;
}
