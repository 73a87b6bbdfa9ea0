//! Android-only capabilities registered under the `android` tag

use serde_json::{json, Value};
use std::cell::Cell;
use std::time::Duration;
use tracing::debug;

use super::{to_json, unknown_member, Args, Capability, CapabilityDef};
use crate::clock::{Clock, SYSTEM_CLOCK};
use crate::locator::Locator;
use crate::result::{HarnessError, HarnessResult};
use crate::selector::{UiScrollable, UiSelector};
use crate::session::{ElementHandle, Session};

/// `KEYCODE_BACK`
pub const KEYCODE_BACK: u32 = 4;

/// `KEYCODE_HOME`
pub const KEYCODE_HOME: u32 = 3;

/// `KEYCODE_APP_SWITCH`
pub const KEYCODE_APP_SWITCH: u32 = 187;

/// Default webview wait (20s)
pub const DEFAULT_WEBVIEW_TIMEOUT_MS: u64 = 20_000;

/// Find by UiAutomator expression, optionally scrolling the target into view
#[derive(Debug, Default)]
pub struct AndroidUiAutomator;

impl AndroidUiAutomator {
    /// Find the element a selector matches
    pub fn find(&self, session: &dyn Session, selector: &UiSelector) -> HarnessResult<ElementHandle> {
        session.find_element(&selector.build()?)
    }

    /// Let the device scroll the first `ScrollView` until `selector` is visible
    pub fn scroll_to(&self, session: &dyn Session, selector: &UiSelector) -> HarnessResult<ElementHandle> {
        let locator = UiScrollable::new().scroll_into_view(selector.clone()).build()?;
        debug!(%locator, "scrolling element into view");
        session.find_element(&locator)
    }
}

impl CapabilityDef for AndroidUiAutomator {
    const NAME: &'static str = "android_uiautomator";
    const MEMBERS: &'static [&'static str] = &[
        "find_element_by_android_uiautomator",
        "scroll_to_element_by_android_uiautomator",
    ];
}

impl Capability for AndroidUiAutomator {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "find_element_by_android_uiautomator" => {
                args.at_most(1)?;
                let expression: String = args.required(0)?;
                to_json(session.find_element(&Locator::android_uiautomator(expression))?)
            }
            "scroll_to_element_by_android_uiautomator" => {
                args.at_most(1)?;
                let expression: String = args.required(0)?;
                let locator = UiScrollable::new()
                    .scroll_into_view_rendered(expression)
                    .build()?;
                to_json(session.find_element(&locator)?)
            }
            _ => Err(unknown_member(member)),
        }
    }
}

/// Hardware keys
#[derive(Debug)]
pub struct AndroidKeys {
    clock: Cell<&'static dyn Clock>,
}

impl Default for AndroidKeys {
    fn default() -> Self {
        Self {
            clock: Cell::new(&SYSTEM_CLOCK),
        }
    }
}

impl AndroidKeys {
    /// Clock used while the app is backgrounded
    pub fn use_clock(&self, clock: &'static dyn Clock) {
        self.clock.set(clock);
    }

    /// Press back
    pub fn back(&self, session: &dyn Session) -> HarnessResult<()> {
        session.press_keycode(KEYCODE_BACK)
    }

    /// Press home
    pub fn home(&self, session: &dyn Session) -> HarnessResult<()> {
        session.press_keycode(KEYCODE_HOME)
    }

    /// Open the recent-apps switcher
    pub fn app_switcher(&self, session: &dyn Session) -> HarnessResult<()> {
        session.press_keycode(KEYCODE_APP_SWITCH)
    }

    /// Send the app to the switcher for `duration`, then bring it back.
    ///
    /// Unlike the driver's own background call this never restarts the app.
    pub fn background_app(&self, session: &dyn Session, duration: Duration) -> HarnessResult<()> {
        self.app_switcher(session)?;
        self.clock.get().sleep(duration);
        self.back(session)
    }
}

impl CapabilityDef for AndroidKeys {
    const NAME: &'static str = "android_keys";
    const MEMBERS: &'static [&'static str] = &["back", "home", "app_switcher", "background_app"];
}

impl Capability for AndroidKeys {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "back" => self.back(session)?,
            "home" => self.home(session)?,
            "app_switcher" => self.app_switcher(session)?,
            "background_app" => {
                args.at_most(1)?;
                let seconds = args.optional::<f64>(0)?.unwrap_or_default();
                let duration = Duration::try_from_secs_f64(seconds).map_err(|err| {
                    HarnessError::invalid_argument(member, format!("bad duration {seconds}: {err}"))
                })?;
                self.background_app(session, duration)?;
            }
            _ => return Err(unknown_member(member)),
        }
        Ok(Value::Null)
    }
}

/// Wait for an embedded webview to render content
#[derive(Debug, Default)]
pub struct AndroidWebView;

impl AndroidWebView {
    /// Selector matching a webview that has at least one child view
    pub fn webview_locator() -> HarnessResult<Locator> {
        UiSelector::new()
            .class_name("android.webkit.WebView")
            .child_selector(UiSelector::new().class_name("android.view.View"))
            .build()
    }

    /// Wait for the webview through the session's `wait_for` member
    ///
    /// # Errors
    ///
    /// [`HarnessError::DeadlineExceeded`] if no webview appears in time.
    pub fn wait_for_webview(
        &self,
        session: &dyn Session,
        timeout: Option<Duration>,
    ) -> HarnessResult<ElementHandle> {
        let locator = Self::webview_locator()?;
        let ms = timeout.map_or(DEFAULT_WEBVIEW_TIMEOUT_MS, |t| t.as_millis() as u64);
        let found = session.invoke("wait_for", &[to_json(&locator)?, json!(ms)])?;
        if found.is_null() {
            return Err(HarnessError::DeadlineExceeded {
                ms,
                waited_for: locator.to_string(),
            });
        }
        Ok(serde_json::from_value(found)?)
    }
}

impl CapabilityDef for AndroidWebView {
    const NAME: &'static str = "android_webview";
    const MEMBERS: &'static [&'static str] = &["wait_for_webview"];
}

impl Capability for AndroidWebView {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "wait_for_webview" => {
                args.at_most(1)?;
                let timeout = args.optional::<u64>(0)?.map(Duration::from_millis);
                to_json(self.wait_for_webview(session, timeout)?)
            }
            _ => Err(unknown_member(member)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::geometry::BoundingBox;
    use crate::session::ScriptedSession;

    mod uiautomator_tests {
        use super::*;

        #[test]
        fn test_find_by_selector() {
            let selector = UiSelector::new().text("Login");
            let session = ScriptedSession::new()
                .with_element(selector.build().unwrap(), BoundingBox::default());
            assert!(AndroidUiAutomator.find(&session, &selector).is_ok());
        }

        #[test]
        fn test_scroll_to_wraps_in_scrollable() {
            let session = ScriptedSession::new();
            let err = AndroidUiAutomator
                .scroll_to(&session, &UiSelector::new().text("Footer"))
                .unwrap_err();
            assert!(err.is_not_found());
            assert!(session.was_called(
                "find_element:-android uiautomator=new UiScrollable(new UiSelector().className(\"android.widget.ScrollView\")).scrollIntoView(new UiSelector().text(\"Footer\"))"
            ));
        }

        #[test]
        fn test_dynamic_scroll_matches_typed() {
            let typed = UiScrollable::new()
                .scroll_into_view(UiSelector::new().text("A"))
                .build()
                .unwrap();
            let session = ScriptedSession::new().with_element(typed, BoundingBox::default());
            let found = AndroidUiAutomator
                .call(
                    &session,
                    "scroll_to_element_by_android_uiautomator",
                    &[json!("new UiSelector().text(\"A\")")],
                )
                .unwrap();
            assert_eq!(found, json!({"id": "element-0"}));
        }
    }

    mod key_tests {
        use super::*;

        #[test]
        fn test_key_codes() {
            let keys = AndroidKeys::default();
            let session = ScriptedSession::new();
            keys.call(&session, "back", &[]).unwrap();
            keys.call(&session, "home", &[]).unwrap();
            keys.call(&session, "app_switcher", &[]).unwrap();
            assert_eq!(session.keycodes(), vec![4, 3, 187]);
        }

        #[test]
        fn test_background_app() {
            let clock: &'static ManualClock = Box::leak(Box::new(ManualClock::new()));
            let keys = AndroidKeys::default();
            keys.use_clock(clock);
            let session = ScriptedSession::new();

            keys.call(&session, "background_app", &[json!(1.5)]).unwrap();
            assert_eq!(session.keycodes(), vec![187, 4]);
            assert_eq!(clock.sleeps(), vec![Duration::from_millis(1500)]);
        }

        #[test]
        fn test_negative_background_is_rejected() {
            let keys = AndroidKeys::default();
            let session = ScriptedSession::new();
            let err = keys.call(&session, "background_app", &[json!(-1)]).unwrap_err();
            assert!(matches!(err, HarnessError::InvalidArgument { .. }));
            assert!(session.keycodes().is_empty());
        }
    }

    mod webview_tests {
        use super::*;

        #[test]
        fn test_webview_locator() {
            assert_eq!(
                AndroidWebView::webview_locator().unwrap().value,
                "new UiSelector().className(\"android.webkit.WebView\").childSelector(new UiSelector().className(\"android.view.View\"))"
            );
        }

        #[test]
        fn test_wait_uses_session_wait_for() {
            let session = ScriptedSession::new().with_member("wait_for", json!({"id": "web-1"}));
            let element = AndroidWebView.wait_for_webview(&session, None).unwrap();
            assert_eq!(element, ElementHandle::new("web-1"));
            assert!(session.was_called("invoke:wait_for"));
        }

        #[test]
        fn test_wait_timeout() {
            let session = ScriptedSession::new().with_member("wait_for", Value::Null);
            let err = AndroidWebView
                .wait_for_webview(&session, Some(Duration::from_secs(1)))
                .unwrap_err();
            assert!(matches!(err, HarnessError::DeadlineExceeded { ms: 1_000, .. }));
        }
    }
}
