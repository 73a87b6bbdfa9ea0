//! Locators and the element helpers built on them.
//!
//! # Design Philosophy
//!
//! - **Absence is a value**: [`find_element_safe`] and [`locate_with_scroll`]
//!   return `Option`; only transport faults travel on the error channel
//! - **Validate before dispatch**: swipe vectors are checked before the first
//!   remote swipe is sent
//! - **Platform neutral**: scroll-retry works for any locator strategy, not just
//!   UiAutomator's own `UiScrollable`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::geometry::{swipe_vector, BoundingBox, Direction, SwipeVector};
use crate::result::{HarnessError, HarnessResult};
use crate::session::{ElementHandle, Session};

/// Default duration of a single swipe gesture (200ms)
pub const DEFAULT_SWIPE_DURATION_MS: u64 = 200;

/// Default fraction of the swipe area covered by [`swipe_element`]
pub const DEFAULT_SWIPE_DISTANCE: f64 = 0.7;

/// Default number of swipes per direction in [`locate_with_scroll`]
pub const DEFAULT_MAX_SWIPES: u32 = 4;

/// Default fraction of the screen covered per scroll-retry swipe
pub const DEFAULT_SCROLL_DISTANCE: f64 = 0.35;

/// Strategy used by the remote locator engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Resource id
    #[serde(rename = "id")]
    Id,
    /// XPath expression
    #[serde(rename = "xpath")]
    XPath,
    /// Native class name
    #[serde(rename = "class name")]
    ClassName,
    /// Accessibility id / content description
    #[serde(rename = "accessibility id")]
    AccessibilityId,
    /// UiAutomator selector expression
    #[serde(rename = "-android uiautomator")]
    AndroidUiAutomator,
    /// iOS NSPredicate string
    #[serde(rename = "-ios predicate string")]
    IosPredicate,
    /// iOS class chain
    #[serde(rename = "-ios class chain")]
    IosClassChain,
}

impl Strategy {
    /// All strategies
    pub const ALL: [Self; 7] = [
        Self::Id,
        Self::XPath,
        Self::ClassName,
        Self::AccessibilityId,
        Self::AndroidUiAutomator,
        Self::IosPredicate,
        Self::IosClassChain,
    ];

    /// Wire name of the strategy
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::XPath => "xpath",
            Self::ClassName => "class name",
            Self::AccessibilityId => "accessibility id",
            Self::AndroidUiAutomator => "-android uiautomator",
            Self::IosPredicate => "-ios predicate string",
            Self::IosClassChain => "-ios class chain",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| HarnessError::Config {
                message: format!("unknown locator strategy '{s}'"),
            })
    }
}

/// A (strategy, value) pair identifying a remote UI element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    /// How to search
    pub strategy: Strategy,
    /// What to search for
    pub value: String,
}

impl Locator {
    /// Create a locator
    #[must_use]
    pub fn new(strategy: Strategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }

    /// Locate by resource id
    #[must_use]
    pub fn id(value: impl Into<String>) -> Self {
        Self::new(Strategy::Id, value)
    }

    /// Locate by native class name
    #[must_use]
    pub fn class_name(value: impl Into<String>) -> Self {
        Self::new(Strategy::ClassName, value)
    }

    /// Locate by accessibility id
    #[must_use]
    pub fn accessibility_id(value: impl Into<String>) -> Self {
        Self::new(Strategy::AccessibilityId, value)
    }

    /// Locate by XPath
    #[must_use]
    pub fn xpath(value: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, value)
    }

    /// Locate by a rendered UiAutomator expression
    #[must_use]
    pub fn android_uiautomator(value: impl Into<String>) -> Self {
        Self::new(Strategy::AndroidUiAutomator, value)
    }

    /// Split into the `(strategy tag, value)` pair sent to the remote engine
    #[must_use]
    pub fn into_parts(self) -> (&'static str, String) {
        (self.strategy.as_str(), self.value)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

/// Find an element, mapping "not found" to `None`.
///
/// # Errors
///
/// Transport faults from the session propagate unchanged.
pub fn find_element_safe(
    session: &dyn Session,
    locator: &Locator,
) -> HarnessResult<Option<ElementHandle>> {
    match session.find_element(locator) {
        Ok(element) => Ok(Some(element)),
        Err(err) if err.is_not_found() => {
            debug!(%locator, "unable to locate element");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Bounds of the located element, or of the whole viewport when `locator`
/// is `None`.
pub fn element_bounds(
    session: &dyn Session,
    locator: Option<&Locator>,
) -> HarnessResult<BoundingBox> {
    match locator {
        Some(locator) => {
            let element = session.find_element(locator)?;
            session.element_rect(&element)
        }
        None => Ok(BoundingBox::viewport(session.window_size()?)),
    }
}

/// Options for [`swipe_element`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwipeOptions {
    /// Direction the finger travels
    pub direction: Direction,
    /// Fraction of the swipe area to cover
    pub swipe_distance: f64,
    /// Number of identical swipes to send
    pub repeat: u32,
    /// Element to swipe across (viewport when absent)
    pub swipe_locator: Option<Locator>,
    /// Gesture duration; the capability default applies when absent
    pub duration_ms: Option<u64>,
}

impl Default for SwipeOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Left,
            swipe_distance: DEFAULT_SWIPE_DISTANCE,
            repeat: 1,
            swipe_locator: None,
            duration_ms: None,
        }
    }
}

impl SwipeOptions {
    /// Swipe in `direction` with defaults for everything else
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Set the covered fraction
    #[must_use]
    pub const fn with_distance(mut self, swipe_distance: f64) -> Self {
        self.swipe_distance = swipe_distance;
        self
    }

    /// Set the repeat count
    #[must_use]
    pub const fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Swipe across an element instead of the viewport
    #[must_use]
    pub fn within(mut self, locator: Locator) -> Self {
        self.swipe_locator = Some(locator);
        self
    }

    /// Set the gesture duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Effective duration, falling back to `default`
    #[must_use]
    pub fn duration_or(&self, default: Duration) -> Duration {
        self.duration_ms.map_or(default, Duration::from_millis)
    }
}

/// Swipe across an element (or the viewport) and return the vector sent.
///
/// The vector is validated before the first remote swipe, so a
/// [`HarnessError::NegativeSwipeCoordinate`] means nothing was dispatched.
pub fn swipe_element(session: &dyn Session, options: &SwipeOptions) -> HarnessResult<SwipeVector> {
    let bounds = element_bounds(session, options.swipe_locator.as_ref())?;
    let vector = swipe_vector(options.direction, &bounds, options.swipe_distance)?;
    let duration = options.duration_or(Duration::from_millis(DEFAULT_SWIPE_DURATION_MS));

    for _ in 0..options.repeat {
        session.swipe(vector, duration)?;
    }
    Ok(vector)
}

/// Options for [`locate_with_scroll`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollOptions {
    /// Direction tried first; its inverse is tried second
    pub direction: Direction,
    /// Swipes per direction
    pub max_swipes: u32,
    /// Fraction of the viewport covered per swipe
    pub swipe_distance: f64,
    /// Gesture duration; the capability default applies when absent
    pub duration_ms: Option<u64>,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Up,
            max_swipes: DEFAULT_MAX_SWIPES,
            swipe_distance: DEFAULT_SCROLL_DISTANCE,
            duration_ms: None,
        }
    }
}

impl ScrollOptions {
    /// Scroll in `direction` first
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    /// Set swipes per direction
    #[must_use]
    pub const fn with_max_swipes(mut self, max_swipes: u32) -> Self {
        self.max_swipes = max_swipes;
        self
    }

    /// Set the covered fraction per swipe
    #[must_use]
    pub const fn with_distance(mut self, swipe_distance: f64) -> Self {
        self.swipe_distance = swipe_distance;
        self
    }

    fn swipe(&self, direction: Direction) -> SwipeOptions {
        SwipeOptions {
            direction,
            swipe_distance: self.swipe_distance,
            repeat: 1,
            swipe_locator: None,
            duration_ms: self.duration_ms,
        }
    }
}

/// Find an element that may be off screen by swiping for it.
///
/// Up to `max_swipes` times: look, swipe once in the primary direction, look
/// again. If that pass finds nothing the same pass runs in the inverse
/// direction. A never-found element costs exactly `2 * max_swipes` swipes and
/// yields `Ok(None)`.
pub fn locate_with_scroll(
    session: &dyn Session,
    locator: &Locator,
    options: &ScrollOptions,
) -> HarnessResult<Option<ElementHandle>> {
    if let Some(element) = scroll_pass(session, locator, options, options.direction)? {
        return Ok(Some(element));
    }
    scroll_pass(session, locator, options, options.direction.inverse())
}

fn scroll_pass(
    session: &dyn Session,
    locator: &Locator,
    options: &ScrollOptions,
    direction: Direction,
) -> HarnessResult<Option<ElementHandle>> {
    let swipe = options.swipe(direction);
    for attempt in 0..options.max_swipes {
        if let Some(element) = find_element_safe(session, locator)? {
            return Ok(Some(element));
        }
        debug!(%locator, %direction, attempt, "swiping again to locate element");
        swipe_element(session, &swipe)?;
        if let Some(element) = find_element_safe(session, locator)? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::session::ScriptedSession;

    mod strategy_tests {
        use super::*;

        #[test]
        fn test_wire_names() {
            assert_eq!(Strategy::AndroidUiAutomator.as_str(), "-android uiautomator");
            assert_eq!(Strategy::ClassName.as_str(), "class name");
            assert_eq!(Strategy::AccessibilityId.to_string(), "accessibility id");
        }

        #[test]
        fn test_parse_round_trips_every_strategy() {
            for strategy in Strategy::ALL {
                assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
            }
            assert!("css".parse::<Strategy>().is_err());
        }

        #[test]
        fn test_serde_matches_wire_names() {
            let locator = Locator::class_name("XCUIElementTypeWebView");
            let json = serde_json::to_value(&locator).unwrap();
            assert_eq!(json["strategy"], "class name");
            let back: Locator = serde_json::from_value(json).unwrap();
            assert_eq!(back, locator);
        }
    }

    mod locator_tests {
        use super::*;

        #[test]
        fn test_into_parts() {
            let (tag, value) = Locator::android_uiautomator("new UiSelector()").into_parts();
            assert_eq!(tag, "-android uiautomator");
            assert_eq!(value, "new UiSelector()");
        }

        #[test]
        fn test_display() {
            assert_eq!(Locator::id("login").to_string(), "id=login");
        }
    }

    mod find_tests {
        use super::*;

        #[test]
        fn test_find_safe_present() {
            let session =
                ScriptedSession::new().with_element(Locator::id("ok"), BoundingBox::default());
            let found = find_element_safe(&session, &Locator::id("ok")).unwrap();
            assert!(found.is_some());
        }

        #[test]
        fn test_find_safe_absent_is_none() {
            let session = ScriptedSession::new();
            let found = find_element_safe(&session, &Locator::id("missing")).unwrap();
            assert!(found.is_none());
        }

        #[test]
        fn test_find_safe_propagates_transport() {
            let session = ScriptedSession::new().with_transport_faults(1);
            let err = find_element_safe(&session, &Locator::id("any")).unwrap_err();
            assert!(matches!(err, HarnessError::Transport { .. }));
        }
    }

    mod bounds_tests {
        use super::*;

        #[test]
        fn test_viewport_bounds() {
            let session = ScriptedSession::new().with_window(Size::new(1080, 1920));
            let bounds = element_bounds(&session, None).unwrap();
            assert_eq!(bounds, BoundingBox::new(0, 0, 1080, 1920));
        }

        #[test]
        fn test_element_bounds() {
            let rect = BoundingBox::new(500, 500, 1000, 1000);
            let session = ScriptedSession::new().with_element(Locator::id("card"), rect);
            let bounds = element_bounds(&session, Some(&Locator::id("card"))).unwrap();
            assert_eq!(bounds, rect);
            assert_eq!(bounds.end_x(), 1499);
        }

        #[test]
        fn test_missing_swipe_area_is_an_error() {
            let session = ScriptedSession::new();
            let err = element_bounds(&session, Some(&Locator::id("gone"))).unwrap_err();
            assert!(err.is_not_found());
        }
    }

    mod swipe_tests {
        use super::*;

        #[test]
        fn test_swipe_dispatches_vector_with_default_duration() {
            let session = ScriptedSession::new();
            let options = SwipeOptions::new(Direction::Left).with_distance(0.5);
            let vector = swipe_element(&session, &options).unwrap();

            let swipes = session.swipes();
            assert_eq!(swipes.len(), 1);
            assert_eq!(swipes[0].0, vector);
            assert_eq!(swipes[0].1, Duration::from_millis(DEFAULT_SWIPE_DURATION_MS));
            assert_eq!((vector.start_x, vector.end_x), (750, 250));
        }

        #[test]
        fn test_swipe_repeat_and_duration() {
            let session = ScriptedSession::new();
            let options = SwipeOptions::new(Direction::Down)
                .with_repeat(3)
                .with_duration(Duration::from_millis(300));
            swipe_element(&session, &options).unwrap();

            let swipes = session.swipes();
            assert_eq!(swipes.len(), 3);
            assert!(swipes
                .iter()
                .all(|(_, duration)| *duration == Duration::from_millis(300)));
        }

        #[test]
        fn test_invalid_vector_dispatches_nothing() {
            let session = ScriptedSession::new();
            let options = SwipeOptions::new(Direction::Up).with_distance(3.0);
            assert!(swipe_element(&session, &options).is_err());
            assert!(session.swipes().is_empty());
        }

        #[test]
        fn test_options_deserialize_with_defaults() {
            let options: SwipeOptions =
                serde_json::from_value(serde_json::json!({"direction": "right"})).unwrap();
            assert_eq!(options.direction, Direction::Right);
            assert_eq!(options.swipe_distance, DEFAULT_SWIPE_DISTANCE);
            assert_eq!(options.repeat, 1);
        }
    }

    mod scroll_tests {
        use super::*;

        #[test]
        fn test_visible_element_needs_no_swipe() {
            let session =
                ScriptedSession::new().with_element(Locator::id("row"), BoundingBox::default());
            let found =
                locate_with_scroll(&session, &Locator::id("row"), &ScrollOptions::default())
                    .unwrap();
            assert!(found.is_some());
            assert!(session.swipes().is_empty());
        }

        #[test]
        fn test_found_after_primary_swipes() {
            let session = ScriptedSession::new().with_element_after_swipes(
                Locator::id("row"),
                BoundingBox::default(),
                2,
            );
            let options = ScrollOptions::new(Direction::Up).with_max_swipes(4);
            let found = locate_with_scroll(&session, &Locator::id("row"), &options).unwrap();
            assert!(found.is_some());
            assert_eq!(session.swipes().len(), 2);
        }

        #[test]
        fn test_never_found_swipes_both_directions() {
            let session = ScriptedSession::new();
            let options = ScrollOptions::new(Direction::Up).with_max_swipes(3);
            let found = locate_with_scroll(&session, &Locator::id("ghost"), &options).unwrap();
            assert!(found.is_none());

            let swipes = session.swipes();
            assert_eq!(swipes.len(), 6);
            let up = swipe_vector(Direction::Up, &BoundingBox::viewport(session.window()), 0.35)
                .unwrap();
            let down =
                swipe_vector(Direction::Down, &BoundingBox::viewport(session.window()), 0.35)
                    .unwrap();
            assert!(swipes[..3].iter().all(|(v, _)| *v == up));
            assert!(swipes[3..].iter().all(|(v, _)| *v == down));
            assert_eq!(session.call_count("find_element"), 12);
        }

        #[test]
        fn test_found_during_inverse_pass() {
            let session = ScriptedSession::new().with_element_after_swipes(
                Locator::id("footer"),
                BoundingBox::default(),
                3,
            );
            let options = ScrollOptions::new(Direction::Down).with_max_swipes(2);
            let found = locate_with_scroll(&session, &Locator::id("footer"), &options).unwrap();
            assert!(found.is_some());
            assert_eq!(session.swipes().len(), 3);
        }

        #[test]
        fn test_transport_fault_aborts_scroll() {
            let session = ScriptedSession::new().with_transport_faults(1);
            let err = locate_with_scroll(&session, &Locator::id("x"), &ScrollOptions::default())
                .unwrap_err();
            assert!(matches!(err, HarnessError::Transport { .. }));
            assert!(session.swipes().is_empty());
        }
    }
}
