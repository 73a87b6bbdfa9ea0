//! UiAutomator selector expressions.
//!
//! A selector expression is an ordered list of `(name, args)` segments rendered
//! into the Java-like text the remote `-android uiautomator` locator engine
//! evaluates unparsed:
//!
//! ```text
//! UiScrollable::new()
//!     .scroll_into_view(UiSelector::new().text("Settings"))
//!
//! new UiScrollable(new UiSelector().className("android.widget.ScrollView"))
//!     .scrollIntoView(new UiSelector().text("Settings"))
//! ```
//!
//! The known vocabulary is available as snake_case methods; anything else goes
//! through [`Expression::segment`], which accepts any method name.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::locator::{Locator, Strategy};
use crate::result::{HarnessError, HarnessResult};

/// Class of the default container wrapped by [`UiScrollable`]
pub const DEFAULT_SCROLLABLE_CLASS: &str = "android.widget.ScrollView";

/// Class of the default container wrapped by [`UiCollection`]
pub const DEFAULT_COLLECTION_CLASS: &str = "android.support.v7.widget.RecyclerView";

/// A single segment argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Rendered double-quoted
    Str(String),
    /// Rendered `true` / `false`
    Bool(bool),
    /// Rendered in decimal
    Int(i64),
    /// Nested expression, rendered recursively
    Expr(Box<Nested>),
    /// Already-rendered expression text, emitted verbatim
    Rendered(String),
    /// Anything else; rendering it is an error
    Other(Value),
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Other(Value::from(value))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Str(s),
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Other(Value::Number(n)),
            },
            other => Self::Other(other),
        }
    }
}

impl From<UiSelector> for Arg {
    fn from(value: UiSelector) -> Self {
        Self::Expr(Box::new(Nested::Selector(value)))
    }
}

impl From<UiScrollable> for Arg {
    fn from(value: UiScrollable) -> Self {
        Self::Expr(Box::new(Nested::Scrollable(value)))
    }
}

impl From<UiCollection> for Arg {
    fn from(value: UiCollection) -> Self {
        Self::Expr(Box::new(Nested::Collection(value)))
    }
}

/// An expression nested inside a segment argument
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    /// `new UiSelector()...`
    Selector(UiSelector),
    /// `new UiScrollable(...)...`
    Scrollable(UiScrollable),
    /// `new UiCollection(...)...`
    Collection(UiCollection),
}

impl Nested {
    /// Render the nested expression
    pub fn render(&self) -> HarnessResult<String> {
        match self {
            Self::Selector(e) => e.render(),
            Self::Scrollable(e) => e.render(),
            Self::Collection(e) => e.render(),
        }
    }

    /// Dialect name of the nested expression
    #[must_use]
    pub const fn dialect_name(&self) -> &'static str {
        match self {
            Self::Selector(_) => SelectorDialect::NAME,
            Self::Scrollable(_) => ScrollableDialect::NAME,
            Self::Collection(_) => CollectionDialect::NAME,
        }
    }

    fn segments(&self) -> &[Segment] {
        match self {
            Self::Selector(e) => e.segments(),
            Self::Scrollable(e) => e.segments(),
            Self::Collection(e) => e.segments(),
        }
    }
}

/// One `.name(args)` call in the chain
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Method name as rendered
    pub name: String,
    /// Arguments in call order
    pub args: Vec<Arg>,
}

/// Argument rewrite applied to one segment at render time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgTransform {
    /// Prefix string arguments with `<app package>:id/` unless they already
    /// start with the package
    QualifyResourceId,
}

impl ArgTransform {
    fn apply<D: Dialect>(self, dialect: &D, arg: &Arg) -> Arg {
        match (self, arg) {
            (Self::QualifyResourceId, Arg::Str(id)) => match dialect.app_package() {
                Some(package) if !id.starts_with(package) => {
                    Arg::Str(format!("{package}:id/{id}"))
                }
                _ => arg.clone(),
            },
            _ => arg.clone(),
        }
    }
}

/// Constructor flavour of an expression
pub trait Dialect: Clone + fmt::Debug + PartialEq {
    /// Class name in the `new <NAME>(...)` head
    const NAME: &'static str;

    /// Rendered constructor argument, if any
    fn constructor_argument(&self) -> HarnessResult<Option<String>>;

    /// Package used by [`ArgTransform::QualifyResourceId`]
    fn app_package(&self) -> Option<&str> {
        None
    }

    /// Transforms every new expression of this dialect starts with
    fn default_transforms() -> Vec<(&'static str, ArgTransform)> {
        Vec::new()
    }
}

/// Plain `UiSelector` dialect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorDialect {
    app_package: Option<String>,
}

impl Dialect for SelectorDialect {
    const NAME: &'static str = "UiSelector";

    fn constructor_argument(&self) -> HarnessResult<Option<String>> {
        Ok(None)
    }

    fn app_package(&self) -> Option<&str> {
        self.app_package.as_deref()
    }

    fn default_transforms() -> Vec<(&'static str, ArgTransform)> {
        vec![("resourceId", ArgTransform::QualifyResourceId)]
    }
}

/// `UiScrollable` container dialect
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollableDialect {
    container: Box<UiSelector>,
}

impl Dialect for ScrollableDialect {
    const NAME: &'static str = "UiScrollable";

    fn constructor_argument(&self) -> HarnessResult<Option<String>> {
        self.container.render().map(Some)
    }
}

/// `UiCollection` container dialect
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDialect {
    container: Box<UiSelector>,
}

impl Dialect for CollectionDialect {
    const NAME: &'static str = "UiCollection";

    fn constructor_argument(&self) -> HarnessResult<Option<String>> {
        self.container.render().map(Some)
    }
}

/// Fluent selector expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression<D: Dialect> {
    dialect: D,
    segments: Vec<Segment>,
    transforms: BTreeMap<String, ArgTransform>,
}

/// `new UiSelector()...`
pub type UiSelector = Expression<SelectorDialect>;

/// `new UiScrollable(<container>)...`
pub type UiScrollable = Expression<ScrollableDialect>;

/// `new UiCollection(<container>)...`
pub type UiCollection = Expression<CollectionDialect>;

impl<D: Dialect> Expression<D> {
    fn with_dialect(dialect: D) -> Self {
        let transforms = D::default_transforms()
            .into_iter()
            .map(|(name, transform)| (name.to_string(), transform))
            .collect();
        Self {
            dialect,
            segments: Vec::new(),
            transforms,
        }
    }

    /// Append an arbitrary `.name(args)` segment
    #[must_use]
    pub fn segment<I, A>(mut self, name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.push_segment(name, args);
        self
    }

    /// Append a segment in place
    pub fn push_segment<I, A>(&mut self, name: impl Into<String>, args: I)
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.segments.push(Segment {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        });
    }

    /// Register a render-time transform for every segment named `segment`
    #[must_use]
    pub fn register_transform(mut self, segment: impl Into<String>, transform: ArgTransform) -> Self {
        self.transforms.insert(segment.into(), transform);
        self
    }

    /// Segments in insertion order
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Dialect state
    #[must_use]
    pub const fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Render the expression text.
    ///
    /// # Errors
    ///
    /// [`HarnessError::UnsupportedArgument`] for an argument outside
    /// string/bool/integer/nested expression, anywhere in the tree.
    pub fn render(&self) -> HarnessResult<String> {
        let mut out = format!("new {}(", D::NAME);
        if let Some(argument) = self.dialect.constructor_argument()? {
            out.push_str(&argument);
        }
        out.push(')');

        for segment in &self.segments {
            let transform = self.transforms.get(&segment.name).copied();
            let args = segment
                .args
                .iter()
                .map(|arg| match transform {
                    Some(t) => format_arg(&segment.name, &t.apply(&self.dialect, arg)),
                    None => format_arg(&segment.name, arg),
                })
                .collect::<HarnessResult<Vec<_>>>()?;
            out.push_str(&format!(".{}({})", segment.name, args.join(", ")));
        }
        Ok(out)
    }

    /// Render into a `-android uiautomator` locator
    pub fn build(&self) -> HarnessResult<Locator> {
        Ok(Locator::new(Strategy::AndroidUiAutomator, self.render()?))
    }

    /// Every expression reachable through segment arguments, depth first
    #[must_use]
    pub fn nested(&self) -> Vec<&Nested> {
        let mut found = Vec::new();
        collect_nested(&self.segments, &mut found);
        found
    }
}

fn collect_nested<'a>(segments: &'a [Segment], found: &mut Vec<&'a Nested>) {
    for arg in segments.iter().flat_map(|s| &s.args) {
        if let Arg::Expr(nested) = arg {
            found.push(nested);
            collect_nested(nested.segments(), found);
        }
    }
}

fn format_arg(segment: &str, arg: &Arg) -> HarnessResult<String> {
    match arg {
        Arg::Str(s) => Ok(format!("\"{s}\"")),
        Arg::Bool(b) => Ok(b.to_string()),
        Arg::Int(i) => Ok(i.to_string()),
        Arg::Expr(nested) => nested.render(),
        Arg::Rendered(text) => Ok(text.clone()),
        Arg::Other(value) => Err(HarnessError::UnsupportedArgument {
            segment: segment.to_string(),
            value: value.to_string(),
        }),
    }
}

macro_rules! verbs {
    ($( $(#[$doc:meta])* $method:ident => $segment:literal ( $($arg:ident : $ty:ty),* ); )*) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $method(self, $($arg: $ty),*) -> Self {
                let args: Vec<Arg> = vec![$(Arg::from($arg)),*];
                self.segment($segment, args)
            }
        )*
    };
}

impl Default for UiSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl UiSelector {
    /// `new UiSelector()` without a package context
    #[must_use]
    pub fn new() -> Self {
        Self::with_dialect(SelectorDialect::default())
    }

    /// `new UiSelector()` qualifying `resourceId` arguments with `package`
    #[must_use]
    pub fn with_package(package: impl Into<String>) -> Self {
        Self::with_dialect(SelectorDialect {
            app_package: Some(package.into()),
        })
    }

    /// Change the package context; already-appended segments pick it up
    pub fn set_app_package(&mut self, package: Option<String>) {
        self.dialect.app_package = package;
    }

    verbs! {
        /// `.text("...")`
        text => "text"(value: &str);
        /// `.textContains("...")`
        text_contains => "textContains"(value: &str);
        /// `.textStartsWith("...")`
        text_starts_with => "textStartsWith"(value: &str);
        /// `.textMatches("regex")`
        text_matches => "textMatches"(regex: &str);
        /// `.description("...")`
        description => "description"(value: &str);
        /// `.descriptionContains("...")`
        description_contains => "descriptionContains"(value: &str);
        /// `.descriptionStartsWith("...")`
        description_starts_with => "descriptionStartsWith"(value: &str);
        /// `.descriptionMatches("regex")`
        description_matches => "descriptionMatches"(regex: &str);
        /// `.resourceId("...")`, package-qualified at render time
        resource_id => "resourceId"(id: &str);
        /// `.resourceIdMatches("regex")`
        resource_id_matches => "resourceIdMatches"(regex: &str);
        /// `.className("...")`
        class_name => "className"(name: &str);
        /// `.classNameMatches("regex")`
        class_name_matches => "classNameMatches"(regex: &str);
        /// `.packageName("...")`
        package_name => "packageName"(name: &str);
        /// `.index(n)`
        index => "index"(index: i64);
        /// `.instance(n)`
        instance => "instance"(instance: i64);
        /// `.clickable(b)`
        clickable => "clickable"(value: bool);
        /// `.longClickable(b)`
        long_clickable => "longClickable"(value: bool);
        /// `.checkable(b)`
        checkable => "checkable"(value: bool);
        /// `.checked(b)`
        checked => "checked"(value: bool);
        /// `.enabled(b)`
        enabled => "enabled"(value: bool);
        /// `.focusable(b)`
        focusable => "focusable"(value: bool);
        /// `.focused(b)`
        focused => "focused"(value: bool);
        /// `.scrollable(b)`
        scrollable => "scrollable"(value: bool);
        /// `.selected(b)`
        selected => "selected"(value: bool);
        /// `.childSelector(new UiSelector()...)`
        child_selector => "childSelector"(child: UiSelector);
        /// `.fromParent(new UiSelector()...)`
        from_parent => "fromParent"(sibling: UiSelector);
    }
}

impl Default for UiScrollable {
    fn default() -> Self {
        Self::new()
    }
}

impl UiScrollable {
    /// Scrollable over the first `android.widget.ScrollView`
    #[must_use]
    pub fn new() -> Self {
        Self::within(UiSelector::new().class_name(DEFAULT_SCROLLABLE_CLASS))
    }

    /// Scrollable over a specific container
    #[must_use]
    pub fn within(container: UiSelector) -> Self {
        Self::with_dialect(ScrollableDialect {
            container: Box::new(container),
        })
    }

    /// The wrapped container selector
    #[must_use]
    pub fn container(&self) -> &UiSelector {
        &self.dialect.container
    }

    verbs! {
        /// `.scrollIntoView(new UiSelector()...)`
        scroll_into_view => "scrollIntoView"(target: UiSelector);
        /// `.scrollTextIntoView("...")`
        scroll_text_into_view => "scrollTextIntoView"(text: &str);
        /// `.setAsHorizontalList()`
        set_as_horizontal_list => "setAsHorizontalList"();
        /// `.setAsVerticalList()`
        set_as_vertical_list => "setAsVerticalList"();
        /// `.setMaxSearchSwipes(n)`
        set_max_search_swipes => "setMaxSearchSwipes"(swipes: i64);
        /// `.flingForward()`
        fling_forward => "flingForward"();
        /// `.flingBackward()`
        fling_backward => "flingBackward"();
        /// `.scrollToBeginning(n)`
        scroll_to_beginning => "scrollToBeginning"(max_swipes: i64);
        /// `.scrollToEnd(n)`
        scroll_to_end => "scrollToEnd"(max_swipes: i64);
        /// `.getChildByText(new UiSelector()..., "...")`
        child_by_text => "getChildByText"(child: UiSelector, text: &str);
        /// `.getChildByDescription(new UiSelector()..., "...")`
        child_by_description => "getChildByDescription"(child: UiSelector, description: &str);
        /// `.getChildByInstance(new UiSelector()..., n)`
        child_by_instance => "getChildByInstance"(child: UiSelector, instance: i64);
    }

    /// `.scrollIntoView(<text>)` with an already-rendered selector
    #[must_use]
    pub fn scroll_into_view_rendered(self, rendered: impl Into<String>) -> Self {
        self.segment("scrollIntoView", [Arg::Rendered(rendered.into())])
    }
}

impl Default for UiCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl UiCollection {
    /// Collection over the first support-library `RecyclerView`
    #[must_use]
    pub fn new() -> Self {
        Self::within(UiSelector::new().class_name(DEFAULT_COLLECTION_CLASS))
    }

    /// Collection over a specific container
    #[must_use]
    pub fn within(container: UiSelector) -> Self {
        Self::with_dialect(CollectionDialect {
            container: Box::new(container),
        })
    }

    verbs! {
        /// `.getChildByText(new UiSelector()..., "...")`
        child_by_text => "getChildByText"(child: UiSelector, text: &str);
        /// `.getChildByDescription(new UiSelector()..., "...")`
        child_by_description => "getChildByDescription"(child: UiSelector, description: &str);
        /// `.getChildByInstance(new UiSelector()..., n)`
        child_by_instance => "getChildByInstance"(child: UiSelector, instance: i64);
        /// `.getChildCount(new UiSelector()...)`
        child_count => "getChildCount"(child: UiSelector);
    }
}
