//! iOS-only capabilities registered under the `ios` tag

use serde_json::{json, Value};
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, warn};

use super::{to_json, unknown_member, Args, Capability, CapabilityDef};
use crate::clock::{Clock, SYSTEM_CLOCK};
use crate::locator::Locator;
use crate::result::{HarnessError, HarnessResult};
use crate::session::{ElementHandle, Session};
use crate::wait::{PollState, Poller};

/// Marker contained in every webview context name
pub const WEBVIEW_MARKER: &str = "WEBVIEW";

/// Native class of an embedded webview
pub const WEBVIEW_CLASS: &str = "XCUIElementTypeWebView";

/// Default webview wait (30s)
pub const DEFAULT_WEBVIEW_TIMEOUT_MS: u64 = 30_000;

/// Context polls before giving up on a webview
pub const WEBVIEW_CONTEXT_TRIES: usize = 10;

/// Webview context discovery and switching
#[derive(Debug)]
pub struct IosWebView {
    poll_interval: Cell<Duration>,
    clock: Cell<&'static dyn Clock>,
}

impl Default for IosWebView {
    fn default() -> Self {
        Self {
            poll_interval: Cell::new(Duration::from_secs(1)),
            clock: Cell::new(&SYSTEM_CLOCK),
        }
    }
}

impl IosWebView {
    /// Clock used between context polls
    pub fn use_clock(&self, clock: &'static dyn Clock) {
        self.clock.set(clock);
    }

    /// Interval between context polls
    pub fn set_poll_interval(&self, interval: Duration) {
        self.poll_interval.set(interval);
    }

    /// Contexts whose name contains `WEBVIEW`, in session order
    pub fn webview_contexts(&self, session: &dyn Session) -> HarnessResult<Vec<String>> {
        Ok(session
            .contexts()?
            .into_iter()
            .filter(|name| name.contains(WEBVIEW_MARKER))
            .collect())
    }

    /// Wait until a webview context exists and its native view is present.
    ///
    /// # Errors
    ///
    /// [`HarnessError::TimeoutExhausted`] when no webview context shows up,
    /// [`HarnessError::DeadlineExceeded`] when the native view never appears.
    pub fn wait_for_webview(
        &self,
        session: &dyn Session,
        timeout: Option<Duration>,
    ) -> HarnessResult<ElementHandle> {
        let contexts = Poller::new(WEBVIEW_CONTEXT_TRIES, self.poll_interval.get())
            .with_clock(self.clock.get())
            .run(
                || self.webview_contexts(session),
                |contexts| !contexts.is_empty(),
                PollState::into_error,
            )?;
        debug!(?contexts, "webview context available");

        let locator = Locator::class_name(WEBVIEW_CLASS);
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

    /// Run `f` inside the first webview context, then switch back.
    ///
    /// The previous context is restored whether or not `f` succeeds.
    pub fn with_webview_context<T, F>(&self, session: &dyn Session, f: F) -> HarnessResult<T>
    where
        F: FnOnce(&dyn Session) -> HarnessResult<T>,
    {
        let previous = session.current_context()?;
        let Some(target) = self.webview_contexts(session)?.into_iter().next() else {
            return Err(HarnessError::ContextNotFound {
                wanted: WEBVIEW_MARKER.to_string(),
                available: session.contexts()?,
            });
        };

        session.switch_context(&target)?;
        let result = f(session);
        let restored = session.switch_context(&previous);

        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), restored) => {
                if let Err(restore_err) = restored {
                    warn!(error = %restore_err, context = %previous, "failed to restore context");
                }
                Err(err)
            }
        }
    }
}

impl CapabilityDef for IosWebView {
    const NAME: &'static str = "ios_webview";
    const MEMBERS: &'static [&'static str] = &["webview_contexts", "wait_for_webview"];
}

impl Capability for IosWebView {
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value> {
        let args = Args::new(member, args);
        match member {
            "webview_contexts" => to_json(self.webview_contexts(session)?),
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
    use crate::session::{ScriptedSession, NATIVE_CONTEXT};

    fn webview(clock: &'static ManualClock) -> IosWebView {
        let capability = IosWebView::default();
        capability.use_clock(clock);
        capability
    }

    fn leaked_clock() -> &'static ManualClock {
        Box::leak(Box::new(ManualClock::new()))
    }

    #[test]
    fn test_webview_contexts_filter() {
        let session = ScriptedSession::new()
            .with_context("WEBVIEW_42")
            .with_context("CHROMIUM");
        let contexts = IosWebView::default()
            .call(&session, "webview_contexts", &[])
            .unwrap();
        assert_eq!(contexts, json!(["WEBVIEW_42"]));
    }

    #[test]
    fn test_wait_polls_contexts_then_element() {
        let clock = leaked_clock();
        let session = ScriptedSession::new()
            .with_context_after_polls("WEBVIEW_1", 3)
            .with_member("wait_for", json!({"id": "web"}));

        let element = webview(clock).wait_for_webview(&session, None).unwrap();
        assert_eq!(element.id, "web");
        assert_eq!(session.call_count("contexts"), 4);
        assert_eq!(clock.sleep_count(), 3);
    }

    #[test]
    fn test_wait_gives_up_after_ten_polls() {
        let clock = leaked_clock();
        let session = ScriptedSession::new().with_member("wait_for", json!({"id": "web"}));

        let err = webview(clock).wait_for_webview(&session, None).unwrap_err();
        assert!(matches!(err, HarnessError::TimeoutExhausted { attempts: 10, .. }));
        assert_eq!(clock.sleep_count(), 9);
        assert!(!session.was_called("invoke:wait_for"));
    }

    #[test]
    fn test_missing_native_view_times_out() {
        let clock = leaked_clock();
        let session = ScriptedSession::new()
            .with_context("WEBVIEW_1")
            .with_member("wait_for", Value::Null);
        let err = webview(clock).wait_for_webview(&session, None).unwrap_err();
        assert!(matches!(err, HarnessError::DeadlineExceeded { ms: 30_000, .. }));
    }

    #[test]
    fn test_with_webview_context_restores() {
        let session = ScriptedSession::new().with_context("WEBVIEW_7");
        let seen = IosWebView::default()
            .with_webview_context(&session, |s| s.current_context())
            .unwrap();
        assert_eq!(seen, "WEBVIEW_7");
        assert_eq!(session.current_context().unwrap(), NATIVE_CONTEXT);
    }

    #[test]
    fn test_with_webview_context_restores_on_failure() {
        let session = ScriptedSession::new().with_context("WEBVIEW_7");
        let result: HarnessResult<()> = IosWebView::default()
            .with_webview_context(&session, |_| Err(HarnessError::transport("script error")));
        assert!(result.is_err());
        assert_eq!(session.current_context().unwrap(), NATIVE_CONTEXT);
    }

    #[test]
    fn test_with_webview_context_without_webview() {
        let session = ScriptedSession::new();
        let err = IosWebView::default()
            .with_webview_context(&session, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, HarnessError::ContextNotFound { .. }));
        assert!(!session.was_called("switch_context"));
    }
}
