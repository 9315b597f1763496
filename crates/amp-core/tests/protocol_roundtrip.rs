//! Integration tests for the amp-core envelope protocol.
//!
//! These tests push every envelope case through the public encode/decode API
//! and check that labels with nested parameter values come back intact.

use std::collections::BTreeMap;

use amp_core::protocol::{
    decode, decode_envelope, encode, encode_envelope, envelope, ConfigItem, Configuration,
    Envelope, Label, LabelType, Value,
};

/// Encodes an envelope and then decodes it, asserting that decoding succeeds.
fn roundtrip(envelope: &Envelope) -> Envelope {
    let bytes = encode_envelope(envelope);
    decode_envelope(&bytes).expect("decode must succeed")
}

fn nested_value() -> Value {
    let mut map = BTreeMap::new();
    map.insert("a".to_string(), Value::from("x"));
    map.insert(
        "b".to_string(),
        Value::Array(vec![Value::from(1), Value::from(2), Value::from(true)]),
    );
    Value::Struct(map)
}

#[test]
fn test_roundtrip_announcement() {
    let original = Envelope::announcement(
        "extern@adapter",
        vec![
            Label::declare("click", LabelType::Stimulus, &[("selector", "string")]),
            Label::declare("page_title", LabelType::Response, &[("_title", "string")]),
        ],
        Configuration::default(),
    );

    assert_eq!(original, roundtrip(&original));
}

#[test]
fn test_roundtrip_configuration() {
    let original = Envelope::configuration(Configuration {
        items: vec![ConfigItem {
            key: "url".into(),
            description: "Start page".into(),
            value: Some(encode(&Value::from("https://example.test"))),
        }],
    });

    assert_eq!(original, roundtrip(&original));
}

#[test]
fn test_roundtrip_ready_reset_and_error() {
    for original in [Envelope::ready(), Envelope::reset(), Envelope::error("boom")] {
        assert_eq!(original, roundtrip(&original));
    }
}

#[test]
fn test_roundtrip_label_with_nested_struct_parameter() {
    // Arrange
    let mut label = Label::stimulus("inspect").with_param("payload", nested_value());
    label.correlation_id = Some(42);
    let original = Envelope::label(label);

    // Act
    let decoded = roundtrip(&original);

    // Assert
    assert_eq!(original, decoded);
    let Some(envelope::Kind::Label(got)) = decoded.kind else {
        panic!("expected label");
    };
    assert_eq!(got.param("payload"), Some(nested_value()));
    assert_eq!(got.correlation_id(), 42);
}

#[test]
fn test_value_codec_roundtrips_depth_three() {
    let mut inner = BTreeMap::new();
    inner.insert("deep".to_string(), nested_value());
    let value = Value::Array(vec![Value::Struct(inner), Value::Decimal(0.5)]);

    assert_eq!(decode(&encode(&value)), Some(value));
}

#[test]
fn test_response_label_kind_survives_the_wire() {
    let original = Envelope::label(Label::response("pong").with_param("token", 7));

    let Some(envelope::Kind::Label(got)) = roundtrip(&original).kind else {
        panic!("expected label");
    };

    assert!(got.is_response());
    assert_eq!(got.kind(), LabelType::Response);
}
