//! Listener constraints.
//!
//! A [`Constraint`] is the structural predicate a listener declares. Each
//! variant belongs to exactly one [`ListenerCategory`] and is only ever tested
//! against envelopes of a compatible category, so an empty constraint means
//! "every envelope of this category", never "every envelope".
//!
//! Identifier fields are compared with a [`Matcher`]: exact string equality
//! or a regular expression. Regex captures of the constraint that matched
//! are handed to the listener through the context.

use pylon_core::{
    ActionKind, ActionPayload, Envelope, OptionsKind, OptionsRequest, ShortcutKind, ViewKind,
};
use regex::{Regex, RegexBuilder};

/// Capture groups produced by a successful match; index 0 is the whole match.
pub type Captures = Vec<Option<String>>;

fn captures_of(regex: &Regex, haystack: &str) -> Option<Captures> {
    regex.captures(haystack).map(|caps| {
        caps.iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect()
    })
}

// ============================================================================
// Matcher
// ============================================================================

/// Compares an identifier field.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact string equality.
    Exact(String),
    /// A regular expression that must match somewhere in the value.
    Pattern(Regex),
}

impl Matcher {
    /// Tests `value`, returning the captures on success.
    ///
    /// Exact matches produce no captures.
    pub fn test(&self, value: &str) -> Option<Captures> {
        match self {
            Self::Exact(expected) => (expected == value).then(Vec::new),
            Self::Pattern(regex) => captures_of(regex, value),
        }
    }
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for Matcher {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

/// Tests an optional matcher against an optional value.
///
/// An unset matcher always passes; a set matcher fails on a missing value.
fn test_optional(matcher: Option<&Matcher>, value: Option<&str>) -> Option<Captures> {
    match matcher {
        None => Some(Vec::new()),
        Some(matcher) => matcher.test(value?),
    }
}

/// Keeps the first non-empty capture set.
fn merge(first: Captures, second: Captures) -> Captures {
    if first.is_empty() { second } else { first }
}

// ============================================================================
// Categories
// ============================================================================

/// The category a listener is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerCategory {
    Event,
    Message,
    Command,
    Action,
    Shortcut,
    View,
    Options,
}

impl ListenerCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Message => "message",
            Self::Command => "command",
            Self::Action => "action",
            Self::Shortcut => "shortcut",
            Self::View => "view",
            Self::Options => "options",
        }
    }

    /// Returns the listener categories that may see `envelope`.
    ///
    /// `message` events are visible to both event and message listeners.
    pub fn for_envelope(envelope: &Envelope) -> &'static [ListenerCategory] {
        match envelope {
            Envelope::Event(_) if envelope.as_message().is_some() => &[Self::Event, Self::Message],
            Envelope::Event(_) => &[Self::Event],
            Envelope::Command(_) => &[Self::Command],
            Envelope::Action(_) => &[Self::Action],
            Envelope::Shortcut(_) => &[Self::Shortcut],
            Envelope::View(_) => &[Self::View],
            Envelope::Options(_) => &[Self::Options],
        }
    }
}

impl std::fmt::Display for ListenerCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event & Message
// ============================================================================

/// Matches Events API envelopes by event type.
#[derive(Debug, Clone)]
pub struct EventConstraint {
    pub event_type: Matcher,
}

impl EventConstraint {
    fn test(&self, envelope: &Envelope) -> Option<Captures> {
        let event = &envelope.as_event()?.event;
        self.event_type.test(&event.event_type)
    }
}

/// What to match in a message's text.
#[derive(Debug, Clone)]
pub enum MessagePattern {
    /// Case-insensitive substring.
    Text(String),
    /// A regular expression, case-insensitive unless it turns that off
    /// with `(?-i)`.
    Regex(Regex),
}

impl MessagePattern {
    pub fn test(&self, text: &str) -> Option<Captures> {
        match self {
            Self::Text(needle) => text
                .to_lowercase()
                .contains(&needle.to_lowercase())
                .then(Vec::new),
            Self::Regex(regex) => captures_of(regex, text),
        }
    }
}

impl From<&str> for MessagePattern {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MessagePattern {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Regex> for MessagePattern {
    fn from(regex: Regex) -> Self {
        let regex = RegexBuilder::new(regex.as_str())
            .case_insensitive(true)
            .build()
            .unwrap_or(regex);
        Self::Regex(regex)
    }
}

/// Which message subtypes a message listener accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SubtypeFilter {
    /// Only plain messages without a subtype.
    #[default]
    PlainOnly,
    /// Any message, with or without a subtype.
    Any,
    /// Only messages with exactly this subtype.
    Only(String),
}

impl SubtypeFilter {
    fn accepts(&self, subtype: Option<&str>) -> bool {
        match self {
            Self::PlainOnly => subtype.is_none(),
            Self::Any => true,
            Self::Only(expected) => subtype == Some(expected.as_str()),
        }
    }
}

/// Matches `message` events by text.
#[derive(Debug, Clone, Default)]
pub struct MessageConstraint {
    pub pattern: Option<MessagePattern>,
    pub subtypes: SubtypeFilter,
}

impl MessageConstraint {
    fn test(&self, envelope: &Envelope) -> Option<Captures> {
        let message = envelope.as_message()?;
        if !self.subtypes.accepts(message.subtype.as_deref()) {
            return None;
        }
        match &self.pattern {
            None => Some(Vec::new()),
            Some(pattern) => pattern.test(message.text.as_deref().unwrap_or_default()),
        }
    }
}

// ============================================================================
// Command
// ============================================================================

/// Matches slash commands by name (including the leading slash).
#[derive(Debug, Clone)]
pub struct CommandConstraint {
    pub command: Matcher,
}

impl CommandConstraint {
    fn test(&self, envelope: &Envelope) -> Option<Captures> {
        match envelope {
            Envelope::Command(command) => self.command.test(&command.command),
            _ => None,
        }
    }
}

// ============================================================================
// Action
// ============================================================================

/// Matches interactive actions.
///
/// `action_id` and `block_id` only match block actions, and match when any
/// element of the `actions` array satisfies both. `callback_id` matches
/// legacy interactive messages and dialog submissions directly, and block
/// actions raised inside a view through the view's callback id.
#[derive(Debug, Clone, Default)]
pub struct ActionConstraint {
    pub kind: Option<ActionKind>,
    pub action_id: Option<Matcher>,
    pub block_id: Option<Matcher>,
    pub callback_id: Option<Matcher>,
}

impl ActionConstraint {
    fn test(&self, envelope: &Envelope) -> Option<Captures> {
        let Envelope::Action(payload) = envelope else {
            return None;
        };
        if self.kind.is_some_and(|kind| kind != payload.kind) {
            return None;
        }

        let element = self.test_elements(payload)?;
        let callback = match &self.callback_id {
            None => Vec::new(),
            Some(matcher) => matcher.test(action_callback_id(payload)?)?,
        };
        Some(merge(element, callback))
    }

    fn test_elements(&self, payload: &ActionPayload) -> Option<Captures> {
        if self.action_id.is_none() && self.block_id.is_none() {
            return Some(Vec::new());
        }
        if payload.kind != ActionKind::BlockActions {
            return None;
        }
        payload.actions.iter().find_map(|action| {
            let by_action = test_optional(self.action_id.as_ref(), action.action_id.as_deref())?;
            let by_block = test_optional(self.block_id.as_ref(), action.block_id.as_deref())?;
            Some(merge(by_action, by_block))
        })
    }
}

fn action_callback_id(payload: &ActionPayload) -> Option<&str> {
    match payload.kind {
        ActionKind::InteractiveMessage | ActionKind::DialogSubmission => {
            payload.callback_id.as_deref()
        }
        ActionKind::BlockActions => payload.view.as_ref().map(|view| view.callback_id.as_str()),
    }
}

// ============================================================================
// Shortcut
// ============================================================================

/// Matches global and message shortcuts.
#[derive(Debug, Clone, Default)]
pub struct ShortcutConstraint {
    pub kind: Option<ShortcutKind>,
    pub callback_id: Option<Matcher>,
}

impl ShortcutConstraint {
    fn test(&self, envelope: &Envelope) -> Option<Captures> {
        let Envelope::Shortcut(payload) = envelope else {
            return None;
        };
        if self.kind.is_some_and(|kind| kind != payload.kind) {
            return None;
        }
        test_optional(self.callback_id.as_ref(), Some(payload.callback_id.as_str()))
    }
}

// ============================================================================
// View
// ============================================================================

/// Matches view submissions or closures.
#[derive(Debug, Clone, Default)]
pub struct ViewConstraint {
    /// Defaults to submissions.
    pub kind: ViewKind,
    pub callback_id: Option<Matcher>,
}

impl ViewConstraint {
    fn test(&self, envelope: &Envelope) -> Option<Captures> {
        let Envelope::View(payload) = envelope else {
            return None;
        };
        if payload.kind != self.kind {
            return None;
        }
        test_optional(self.callback_id.as_ref(), Some(payload.view.callback_id.as_str()))
    }
}

// ============================================================================
// Options
// ============================================================================

/// Matches options requests.
///
/// Follows the same shape rules as [`ActionConstraint`]: `action_id` and
/// `block_id` only match block suggestions, `callback_id` matches dialog and
/// legacy suggestions directly and block suggestions through their view.
#[derive(Debug, Clone, Default)]
pub struct OptionsConstraint {
    pub kind: Option<OptionsKind>,
    pub action_id: Option<Matcher>,
    pub block_id: Option<Matcher>,
    pub callback_id: Option<Matcher>,
}

impl OptionsConstraint {
    fn test(&self, envelope: &Envelope) -> Option<Captures> {
        let Envelope::Options(request) = envelope else {
            return None;
        };
        if self.kind.is_some_and(|kind| kind != request.kind) {
            return None;
        }

        let ids = if self.action_id.is_none() && self.block_id.is_none() {
            Vec::new()
        } else {
            if request.kind != OptionsKind::BlockSuggestion {
                return None;
            }
            let by_action = test_optional(self.action_id.as_ref(), request.action_id.as_deref())?;
            let by_block = test_optional(self.block_id.as_ref(), request.block_id.as_deref())?;
            merge(by_action, by_block)
        };
        let callback = match &self.callback_id {
            None => Vec::new(),
            Some(matcher) => matcher.test(options_callback_id(request)?)?,
        };
        Some(merge(ids, callback))
    }
}

fn options_callback_id(request: &OptionsRequest) -> Option<&str> {
    match request.kind {
        OptionsKind::DialogSuggestion | OptionsKind::InteractiveMessage => {
            request.callback_id.as_deref()
        }
        OptionsKind::BlockSuggestion => request.view.as_ref().map(|view| view.callback_id.as_str()),
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl ActionConstraint {
    /// Matches block actions by `action_id`.
    pub fn action_id(action_id: impl Into<Matcher>) -> Self {
        Self {
            action_id: Some(action_id.into()),
            ..Self::default()
        }
    }

    /// Matches by `callback_id`.
    pub fn callback_id(callback_id: impl Into<Matcher>) -> Self {
        Self {
            callback_id: Some(callback_id.into()),
            ..Self::default()
        }
    }

    pub fn with_block_id(mut self, block_id: impl Into<Matcher>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    pub fn with_kind(mut self, kind: ActionKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

impl OptionsConstraint {
    /// Matches block suggestions by `action_id`.
    pub fn action_id(action_id: impl Into<Matcher>) -> Self {
        Self {
            action_id: Some(action_id.into()),
            ..Self::default()
        }
    }

    /// Matches by `callback_id`.
    pub fn callback_id(callback_id: impl Into<Matcher>) -> Self {
        Self {
            callback_id: Some(callback_id.into()),
            ..Self::default()
        }
    }

    pub fn with_block_id(mut self, block_id: impl Into<Matcher>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    pub fn with_kind(mut self, kind: OptionsKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

impl ShortcutConstraint {
    pub fn callback_id(callback_id: impl Into<Matcher>) -> Self {
        Self {
            kind: None,
            callback_id: Some(callback_id.into()),
        }
    }

    pub fn with_kind(mut self, kind: ShortcutKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

impl ViewConstraint {
    pub fn callback_id(callback_id: impl Into<Matcher>) -> Self {
        Self {
            kind: ViewKind::ViewSubmission,
            callback_id: Some(callback_id.into()),
        }
    }

    /// Matches `view_closed` instead of submissions.
    pub fn closed(mut self) -> Self {
        self.kind = ViewKind::ViewClosed;
        self
    }
}

/// Generates `From` impls that build a constraint from a single identifier.
macro_rules! impl_from_identifier {
    ($constraint:ty, $ctor:ident) => {
        impl From<&str> for $constraint {
            fn from(value: &str) -> Self {
                Self::$ctor(value)
            }
        }

        impl From<String> for $constraint {
            fn from(value: String) -> Self {
                Self::$ctor(value)
            }
        }

        impl From<Regex> for $constraint {
            fn from(regex: Regex) -> Self {
                Self::$ctor(regex)
            }
        }
    };
}

impl_from_identifier!(ActionConstraint, action_id);
impl_from_identifier!(OptionsConstraint, action_id);
impl_from_identifier!(ShortcutConstraint, callback_id);
impl_from_identifier!(ViewConstraint, callback_id);

/// Generates `From` impls lifting each constraint into [`Constraint`].
macro_rules! impl_into_constraint {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Constraint {
                fn from(constraint: $ty) -> Self {
                    Self::$variant(constraint)
                }
            }
        )*
    };
}

impl_into_constraint! {
    Event => EventConstraint,
    Message => MessageConstraint,
    Command => CommandConstraint,
    Action => ActionConstraint,
    Shortcut => ShortcutConstraint,
    View => ViewConstraint,
    Options => OptionsConstraint,
}

// ============================================================================
// Constraint
// ============================================================================

/// The predicate a listener is registered with.
#[derive(Debug, Clone)]
pub enum Constraint {
    Event(EventConstraint),
    Message(MessageConstraint),
    Command(CommandConstraint),
    Action(ActionConstraint),
    Shortcut(ShortcutConstraint),
    View(ViewConstraint),
    Options(OptionsConstraint),
}

impl Constraint {
    /// Returns the category this constraint is scoped to.
    pub fn category(&self) -> ListenerCategory {
        match self {
            Self::Event(_) => ListenerCategory::Event,
            Self::Message(_) => ListenerCategory::Message,
            Self::Command(_) => ListenerCategory::Command,
            Self::Action(_) => ListenerCategory::Action,
            Self::Shortcut(_) => ListenerCategory::Shortcut,
            Self::View(_) => ListenerCategory::View,
            Self::Options(_) => ListenerCategory::Options,
        }
    }

    /// Tests the constraint, returning regex captures on a match.
    pub fn test(&self, envelope: &Envelope) -> Option<Captures> {
        match self {
            Self::Event(c) => c.test(envelope),
            Self::Message(c) => c.test(envelope),
            Self::Command(c) => c.test(envelope),
            Self::Action(c) => c.test(envelope),
            Self::Shortcut(c) => c.test(envelope),
            Self::View(c) => c.test(envelope),
            Self::Options(c) => c.test(envelope),
        }
    }
}
