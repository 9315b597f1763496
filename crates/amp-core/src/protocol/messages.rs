//! All AMP broker protocol message types.
//!
//! Every message exchanged with the broker is a protobuf [`Envelope`] carrying
//! exactly one case of its `oneof`.  The structs below are annotated with
//! `prost` derives directly, so no `.proto` build step is required; the field
//! tags are the wire contract and must never be renumbered.

use prost::{Enumeration, Message};
use tracing::warn;

use crate::protocol::value::{self, Value, ValueType};

/// Channel name used for labels unless the SUT declares otherwise.
pub const DEFAULT_CHANNEL: &str = "extern";

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The top-level wire message.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(oneof = "envelope::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: Option<envelope::Kind>,
}

/// Nested types for [`Envelope`].
pub mod envelope {
    use super::{Announcement, Configuration, ErrorMessage, Label, Ready, Reset};
    use prost::Oneof;

    /// The populated case of an [`Envelope`](super::Envelope).
    #[derive(Clone, PartialEq, Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Announcement(Announcement),
        #[prost(message, tag = "2")]
        Configuration(Configuration),
        #[prost(message, tag = "3")]
        Ready(Ready),
        #[prost(message, tag = "4")]
        Label(Label),
        #[prost(message, tag = "5")]
        Error(ErrorMessage),
        #[prost(message, tag = "6")]
        Reset(Reset),
    }
}

impl Envelope {
    /// Builds an Announcement envelope.
    pub fn announcement(
        name: impl Into<String>,
        labels: Vec<Label>,
        configuration: Configuration,
    ) -> Self {
        Self::with_kind(envelope::Kind::Announcement(Announcement {
            name: name.into(),
            labels,
            configuration: Some(configuration),
        }))
    }

    /// Builds a Configuration envelope (sent by the broker).
    pub fn configuration(configuration: Configuration) -> Self {
        Self::with_kind(envelope::Kind::Configuration(configuration))
    }

    /// Builds an empty Ready envelope.
    pub fn ready() -> Self {
        Self::with_kind(envelope::Kind::Ready(Ready {}))
    }

    /// Wraps a label (stimulus confirmation or response).
    pub fn label(label: Label) -> Self {
        Self::with_kind(envelope::Kind::Label(label))
    }

    /// Builds an Error envelope with a human-readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_kind(envelope::Kind::Error(ErrorMessage {
            message: message.into(),
        }))
    }

    /// Builds an empty Reset envelope (sent by the broker).
    pub fn reset() -> Self {
        Self::with_kind(envelope::Kind::Reset(Reset {}))
    }

    fn with_kind(kind: envelope::Kind) -> Self {
        Self { kind: Some(kind) }
    }

    /// Returns a short name for the populated case.
    ///
    /// Used in log messages so that label payloads and tokens never end up in
    /// the logs by accident.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            Some(envelope::Kind::Announcement(_)) => "Announcement",
            Some(envelope::Kind::Configuration(_)) => "Configuration",
            Some(envelope::Kind::Ready(_)) => "Ready",
            Some(envelope::Kind::Label(_)) => "Label",
            Some(envelope::Kind::Error(_)) => "Error",
            Some(envelope::Kind::Reset(_)) => "Reset",
            None => "Empty",
        }
    }
}

// ── Envelope cases ────────────────────────────────────────────────────────────

/// First message sent by the adapter after the connection opens.
#[derive(Clone, PartialEq, Message)]
pub struct Announcement {
    /// Session name shown on the broker's adapter page.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Every stimulus and response the adapter supports.
    #[prost(message, repeated, tag = "2")]
    pub labels: Vec<Label>,
    #[prost(message, optional, tag = "3")]
    pub configuration: Option<Configuration>,
}

/// Adapter configuration, announced by the adapter and echoed by the broker.
#[derive(Clone, PartialEq, Message)]
pub struct Configuration {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<ConfigItem>,
}

/// A single configuration key.
#[derive(Clone, PartialEq, Message)]
pub struct ConfigItem {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub description: String,
    #[prost(message, optional, tag = "3")]
    pub value: Option<TypedValue>,
}

impl Configuration {
    /// Looks up the decoded value of a configuration item.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .and_then(|item| item.value.as_ref())
            .and_then(value::decode)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Ready {}

#[derive(Clone, PartialEq, Message)]
pub struct Reset {}

#[derive(Clone, PartialEq, Message)]
pub struct ErrorMessage {
    #[prost(string, tag = "1")]
    pub message: String,
}

// ── Labels ────────────────────────────────────────────────────────────────────

/// Direction of a label: broker → SUT or SUT → broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum LabelType {
    Stimulus = 0,
    Response = 1,
}

/// A stimulus or response together with its parameters.
///
/// `prost` generates accessors for the scalar fields: `kind()` returns the
/// [`LabelType`] (falling back to `Stimulus` on unknown values), and
/// `physical_label()`, `timestamp()`, and `correlation_id()` return the
/// default when the field is absent.
#[derive(Clone, PartialEq, Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "LabelType", tag = "2")]
    pub kind: i32,
    #[prost(string, tag = "3")]
    pub channel: String,
    /// SUT-native description of what was actually performed or observed.
    #[prost(string, optional, tag = "4")]
    pub physical_label: Option<String>,
    /// Nanoseconds since the Unix epoch.
    #[prost(int64, optional, tag = "5")]
    pub timestamp: Option<i64>,
    #[prost(message, repeated, tag = "6")]
    pub parameters: Vec<Parameter>,
    /// Pairs a stimulus with its confirmation.
    #[prost(int64, optional, tag = "7")]
    pub correlation_id: Option<i64>,
}

/// A named, typed label argument.
#[derive(Clone, PartialEq, Message)]
pub struct Parameter {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<TypedValue>,
}

impl Label {
    /// Creates a label without parameters on the default channel.
    pub fn new(name: impl Into<String>, kind: LabelType) -> Self {
        Self {
            name: name.into(),
            kind: kind as i32,
            channel: DEFAULT_CHANNEL.to_string(),
            ..Default::default()
        }
    }

    pub fn stimulus(name: impl Into<String>) -> Self {
        Self::new(name, LabelType::Stimulus)
    }

    pub fn response(name: impl Into<String>) -> Self {
        Self::new(name, LabelType::Response)
    }

    /// Declares a label for the announcement from `(parameter, type name)`
    /// pairs such as `("selector", "string")`.
    ///
    /// Each parameter gets a placeholder value of the requested type.  An
    /// unrecognized type name is logged and that parameter is omitted.
    pub fn declare(name: impl Into<String>, kind: LabelType, params: &[(&str, &str)]) -> Self {
        let mut label = Self::new(name, kind);
        for (param_name, type_name) in params {
            match type_name.parse::<ValueType>() {
                Ok(value_type) => label.set_param(*param_name, value_type.placeholder()),
                Err(e) => warn!(
                    "label '{}': omitting parameter '{param_name}': {e}",
                    label.name
                ),
            }
        }
        label
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Builder form of [`Label::set_param`].
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(name, value);
        self
    }

    /// Sets a parameter, replacing any earlier parameter with the same name.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let encoded = Some(value::encode(&value.into()));
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = encoded,
            None => self.parameters.push(Parameter {
                name,
                value: encoded,
            }),
        }
    }

    /// Returns the decoded value of the named parameter.
    ///
    /// A missing parameter or a parameter whose value has no populated variant
    /// is logged and reported as absent.
    pub fn param(&self, name: &str) -> Option<Value> {
        let Some(parameter) = self.parameters.iter().find(|p| p.name == name) else {
            warn!("could not find parameter '{name}' in label '{}'", self.name);
            return None;
        };
        match parameter.value.as_ref() {
            Some(typed) => value::decode(typed),
            None => {
                warn!("parameter '{name}' in label '{}' has no value", self.name);
                None
            }
        }
    }

    /// Strict decoding of the kind field; `None` for values outside the enum.
    pub fn label_type(&self) -> Option<LabelType> {
        LabelType::try_from(self.kind).ok()
    }

    pub fn is_stimulus(&self) -> bool {
        self.label_type() == Some(LabelType::Stimulus)
    }

    pub fn is_response(&self) -> bool {
        self.label_type() == Some(LabelType::Response)
    }

    /// Annotates the label with what happened on the SUT and when.
    ///
    /// An empty physical label is treated as absent.
    pub fn stamped(mut self, physical_label: Option<String>, timestamp: i64) -> Self {
        if let Some(physical) = physical_label.filter(|p| !p.is_empty()) {
            self.physical_label = Some(physical);
        }
        self.timestamp = Some(timestamp);
        self
    }

    /// Turns a received stimulus into its confirmation.
    pub fn confirmed(
        self,
        physical_label: Option<String>,
        timestamp: i64,
        correlation_id: i64,
    ) -> Self {
        let mut label = self.stamped(physical_label, timestamp);
        label.correlation_id = Some(correlation_id);
        label
    }
}

// ── Typed values ──────────────────────────────────────────────────────────────

/// Wire representation of a parameter value.
///
/// Use [`crate::protocol::value::encode`] and
/// [`crate::protocol::value::decode`] to convert from and to native
/// [`Value`]s.
#[derive(Clone, PartialEq, Message)]
pub struct TypedValue {
    #[prost(oneof = "typed_value::Kind", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub kind: Option<typed_value::Kind>,
}

/// Nested types for [`TypedValue`].
pub mod typed_value {
    use super::{TypedArray, TypedStruct};
    use prost::Oneof;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Kind {
        #[prost(string, tag = "1")]
        String(String),
        #[prost(int64, tag = "2")]
        Integer(i64),
        #[prost(double, tag = "3")]
        Decimal(f64),
        #[prost(bool, tag = "4")]
        Boolean(bool),
        /// Seconds since the Unix epoch.
        #[prost(int64, tag = "5")]
        Date(i64),
        /// Nanoseconds since the Unix epoch.
        #[prost(int64, tag = "6")]
        Time(i64),
        #[prost(message, tag = "7")]
        Array(TypedArray),
        #[prost(message, tag = "8")]
        Struct(TypedStruct),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TypedArray {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<TypedValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TypedStruct {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<StructEntry>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StructEntry {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(message, optional, tag = "2")]
    pub value: Option<TypedValue>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
