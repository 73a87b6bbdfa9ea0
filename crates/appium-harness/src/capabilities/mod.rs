//! Capability modules layered onto a session.
//!
//! A capability is a named set of members plus optional per-session state.
//! Members are reachable two ways:
//!
//! - dynamically, through [`Session::invoke`] on a composed session, with JSON
//!   arguments and a JSON result;
//! - statically, by downcasting with
//!   [`CompositeSession::capability`](crate::CompositeSession::capability) and
//!   calling the typed methods directly.

use downcast_rs::{impl_downcast, Downcast};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::locator::Locator;
use crate::registry::{CapabilityModule, CapabilityRegistry, DEFAULT_TAG};
use crate::result::{HarnessError, HarnessResult};
use crate::session::Session;

pub mod android;
pub mod base;
pub mod ios;

pub use android::{AndroidKeys, AndroidUiAutomator, AndroidWebView};
pub use base::{ElementHelper, Gestures, PlatformShortcut, PresenceWait, ScreenOrientation};
pub use ios::IosWebView;

/// Tag of the Android-only modules
pub const ANDROID_TAG: &str = "android";

/// Tag of the iOS-only modules
pub const IOS_TAG: &str = "ios";

/// Behaviour layered onto a session
pub trait Capability: Downcast + fmt::Debug {
    /// Run once per composition, after every module of the layer exists.
    ///
    /// `session` is the composite being built, so members of other modules in
    /// the same layer are already reachable through it.
    fn initialize(&self, _session: &dyn Session) -> HarnessResult<()> {
        Ok(())
    }

    /// Dispatch a member call
    fn call(&self, session: &dyn Session, member: &str, args: &[Value]) -> HarnessResult<Value>;
}

impl_downcast!(Capability);

/// A capability that can be registered by type
pub trait CapabilityDef: Capability + Default {
    /// Module name used in logs and introspection
    const NAME: &'static str;

    /// Members the module defines
    const MEMBERS: &'static [&'static str];
}

/// Register every built-in module under its tag
pub fn install_builtin_capabilities(registry: &CapabilityRegistry) {
    registry.register(DEFAULT_TAG, CapabilityModule::of::<PlatformShortcut>());
    registry.register(DEFAULT_TAG, CapabilityModule::of::<PresenceWait>());
    registry.register(DEFAULT_TAG, CapabilityModule::of::<ElementHelper>());
    registry.register(DEFAULT_TAG, CapabilityModule::of::<Gestures>());
    registry.register(DEFAULT_TAG, CapabilityModule::of::<ScreenOrientation>());

    registry.register(ANDROID_TAG, CapabilityModule::of::<AndroidUiAutomator>());
    registry.register(ANDROID_TAG, CapabilityModule::of::<AndroidKeys>());
    registry.register(ANDROID_TAG, CapabilityModule::of::<AndroidWebView>());

    registry.register(IOS_TAG, CapabilityModule::of::<IosWebView>());
}

pub(crate) fn unknown_member(member: &str) -> HarnessError {
    HarnessError::UnknownMember {
        name: member.to_string(),
    }
}

pub(crate) fn to_json<T: Serialize>(value: T) -> HarnessResult<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Positional JSON arguments of a dynamic member call
#[derive(Debug, Clone, Copy)]
pub(crate) struct Args<'a> {
    member: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub(crate) const fn new(member: &'a str, values: &'a [Value]) -> Self {
        Self { member, values }
    }

    fn present(&self, index: usize) -> Option<&'a Value> {
        self.values.get(index).filter(|v| !v.is_null())
    }

    pub(crate) fn required<T: DeserializeOwned>(&self, index: usize) -> HarnessResult<T> {
        self.optional(index)?.ok_or_else(|| {
            HarnessError::invalid_argument(self.member, format!("missing argument {index}"))
        })
    }

    pub(crate) fn optional<T: DeserializeOwned>(&self, index: usize) -> HarnessResult<Option<T>> {
        self.present(index)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|err| {
                    HarnessError::invalid_argument(self.member, format!("argument {index}: {err}"))
                })
            })
            .transpose()
    }

    pub(crate) fn locator(&self, index: usize) -> HarnessResult<Locator> {
        self.optional_locator(index)?.ok_or_else(|| {
            HarnessError::invalid_argument(self.member, format!("missing locator {index}"))
        })
    }

    /// Accepts `{"strategy": .., "value": ..}` or `[strategy, value]`
    pub(crate) fn optional_locator(&self, index: usize) -> HarnessResult<Option<Locator>> {
        let Some(value) = self.present(index) else {
            return Ok(None);
        };
        if let Value::Array(pair) = value {
            return match pair.as_slice() {
                [Value::String(strategy), Value::String(text)] => {
                    Ok(Some(Locator::new(strategy.parse()?, text.clone())))
                }
                _ => Err(HarnessError::invalid_argument(
                    self.member,
                    "locator must be a [strategy, value] pair",
                )),
            };
        }
        self.optional(index)
    }

    pub(crate) fn at_most(&self, count: usize) -> HarnessResult<()> {
        if self.values.len() > count {
            return Err(HarnessError::invalid_argument(
                self.member,
                format!("expected at most {count} arguments, got {}", self.values.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::Strategy;
    use serde_json::json;

    mod args_tests {
        use super::*;

        #[test]
        fn test_locator_from_pair() {
            let values = [json!(["accessibility id", "Login"])];
            let locator = Args::new("find", &values).locator(0).unwrap();
            assert_eq!(locator, Locator::accessibility_id("Login"));
        }

        #[test]
        fn test_locator_from_object() {
            let values = [json!({"strategy": "xpath", "value": "//a"})];
            let locator = Args::new("find", &values).locator(0).unwrap();
            assert_eq!(locator.strategy, Strategy::XPath);
        }

        #[test]
        fn test_bad_pair_is_invalid_argument() {
            let values = [json!(["id"])];
            let err = Args::new("find", &values).locator(0).unwrap_err();
            assert!(matches!(err, HarnessError::InvalidArgument { .. }));
        }

        #[test]
        fn test_null_counts_as_absent() {
            let values = [Value::Null];
            let args = Args::new("get_element_bounds", &values);
            assert!(args.optional_locator(0).unwrap().is_none());
            assert!(args.optional::<u64>(3).unwrap().is_none());
        }

        #[test]
        fn test_required_reports_member() {
            let err = Args::new("tap_a_point", &[]).required::<f64>(0).unwrap_err();
            assert!(err.to_string().contains("tap_a_point"));
        }

        #[test]
        fn test_at_most() {
            let values = [json!(1), json!(2), json!(3)];
            assert!(Args::new("m", &values).at_most(3).is_ok());
            assert!(Args::new("m", &values).at_most(2).is_err());
        }
    }

    #[test]
    fn test_builtin_tags() {
        let registry = CapabilityRegistry::new();
        install_builtin_capabilities(&registry);
        assert_eq!(registry.tags(), vec!["android", "base", "ios"]);
        assert!(registry.layout(DEFAULT_TAG).defines("swipe_element"));
        assert!(registry.layout(ANDROID_TAG).defines("back"));
        assert!(registry.layout(IOS_TAG).defines("webview_contexts"));
    }
}
