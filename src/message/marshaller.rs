//! Registry of payload marshallers, keyed by type name (spec §4.3).
//!
//! When a message crosses a transport boundary, the Actor System checks
//! whether a marshaller is registered for the payload's type name; if so,
//! the name travels in `body.marshalledType` and the receiving side runs
//! it through the same-named marshaller to reconstruct the value.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use serde_json::Value;

/// A pair of pure functions converting a value to/from its JSON wire form.
pub trait ValueMarshaller: Send + Sync {
    /// The type name placed in `body.marshalledType`.
    fn type_name(&self) -> &str;

    /// Convert a live value into its JSON representation.
    fn marshall(&self, value: &Value) -> Result<Value, MarshalError>;

    /// Reconstruct a value from its JSON representation.
    fn unmarshall(&self, value: Value) -> Result<Value, MarshalError>;
}

/// Error produced by a [`ValueMarshaller`] or by registry lookup.
#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("no marshaller registered for type {0:?}")]
    Unregistered(String),
    #[error("marshaller for {type_name:?} failed: {reason}")]
    Failed { type_name: String, reason: String },
}

/// Process-wide `typeName -> marshaller` map owned by the Actor System.
///
/// Read-heavy after system start-up (spec §5: "read-only thereafter"),
/// so a concurrent map is enough; no separate lock is needed around it.
#[derive(Default)]
pub struct MarshallerRegistry {
    marshallers: DashMap<String, Box<dyn ValueMarshaller>>,
}

impl fmt::Debug for MarshallerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarshallerRegistry")
            .field("registered", &self.marshallers.len())
            .finish()
    }
}

impl MarshallerRegistry {
    pub fn new() -> Self {
        Self {
            marshallers: DashMap::new(),
        }
    }

    pub fn register(&self, marshaller: Box<dyn ValueMarshaller>) {
        self.marshallers
            .insert(marshaller.type_name().to_string(), marshaller);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.marshallers.contains_key(type_name)
    }

    pub fn marshall(&self, type_name: &str, value: &Value) -> Result<Value, MarshalError> {
        self.marshallers
            .get(type_name)
            .ok_or_else(|| MarshalError::Unregistered(type_name.to_string()))?
            .marshall(value)
    }

    pub fn unmarshall(&self, type_name: &str, value: Value) -> Result<Value, MarshalError> {
        self.marshallers
            .get(type_name)
            .ok_or_else(|| MarshalError::Unregistered(type_name.to_string()))?
            .unmarshall(value)
    }
}

/// Reserved keys marking a `send`/`sendAndReceive` argument that should be
/// routed through a named marshaller when it crosses a transport boundary
/// (spec §4.3, testable property #2).
const MARSHALLED_TYPE_KEY: &str = "$marshalledType";
const MARSHALLED_VALUE_KEY: &str = "$value";

/// Wraps `value` so that, as the sole element of a `send`/`sendAndReceive`
/// argument list, the sending endpoint marshalls it through the registry
/// entry named `type_name` instead of crossing the wire as plain JSON.
pub fn marshalled(type_name: impl Into<String>, value: Value) -> Value {
    serde_json::json!({
        MARSHALLED_TYPE_KEY: type_name.into(),
        MARSHALLED_VALUE_KEY: value,
    })
}

fn as_marshalled(value: &Value) -> Option<(&str, &Value)> {
    let obj = value.as_object()?;
    if obj.len() != 2 {
        return None;
    }
    let type_name = obj.get(MARSHALLED_TYPE_KEY)?.as_str()?;
    let inner = obj.get(MARSHALLED_VALUE_KEY)?;
    Some((type_name, inner))
}

/// Applies outgoing marshalling to a `send`/`sendAndReceive` argument
/// list: a single argument built with [`marshalled`] is run through the
/// named registry entry and its type name is returned for `body.marshalledType`;
/// anything else crosses the wire as a plain JSON array, unmarshalled.
pub fn prepare_outgoing(registry: &MarshallerRegistry, args: Vec<Value>) -> Result<(Value, Option<String>), MarshalError> {
    if let [single] = args.as_slice() {
        if let Some((type_name, inner)) = as_marshalled(single) {
            let wire = registry.marshall(type_name, inner)?;
            return Ok((wire, Some(type_name.to_string())));
        }
    }
    Ok((Value::Array(args), None))
}

/// The receive-side counterpart of [`prepare_outgoing`]: reconstructs the
/// argument list a handler sees, running `message` through the
/// same-named marshaller first when `marshalled_type` is set.
pub fn prepare_incoming(registry: &MarshallerRegistry, message: Value, marshalled_type: Option<&str>) -> Result<Vec<Value>, MarshalError> {
    match marshalled_type {
        Some(type_name) => Ok(vec![registry.unmarshall(type_name, message)?]),
        None => Ok(message.as_array().cloned().unwrap_or_default()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct UppercaseMarshaller;

    impl ValueMarshaller for UppercaseMarshaller {
        fn type_name(&self) -> &str {
            "uppercase-string"
        }

        fn marshall(&self, value: &Value) -> Result<Value, MarshalError> {
            let s = value.as_str().unwrap_or_default();
            Ok(Value::String(s.to_uppercase()))
        }

        fn unmarshall(&self, value: Value) -> Result<Value, MarshalError> {
            Ok(value)
        }
    }

    #[test]
    fn registers_and_round_trips() {
        let registry = MarshallerRegistry::new();
        registry.register(Box::new(UppercaseMarshaller));
        assert!(registry.contains("uppercase-string"));

        let marshalled = registry
            .marshall("uppercase-string", &Value::String("hi".into()))
            .unwrap();
        assert_eq!(marshalled, Value::String("HI".into()));
    }

    #[test]
    fn unregistered_type_errors() {
        let registry = MarshallerRegistry::new();
        let err = registry.marshall("nope", &Value::Null).unwrap_err();
        assert!(matches!(err, MarshalError::Unregistered(_)));
    }

    #[test]
    fn prepare_outgoing_marshalls_a_wrapped_single_argument() {
        let registry = MarshallerRegistry::new();
        registry.register(Box::new(UppercaseMarshaller));

        let args = vec![marshalled("uppercase-string", Value::String("hi".into()))];
        let (wire, type_name) = prepare_outgoing(&registry, args).unwrap();
        assert_eq!(wire, Value::String("HI".into()));
        assert_eq!(type_name.as_deref(), Some("uppercase-string"));
    }

    #[test]
    fn prepare_outgoing_leaves_plain_arguments_untouched() {
        let registry = MarshallerRegistry::new();
        let args = vec![Value::String("plain".into()), Value::from(1)];
        let (wire, type_name) = prepare_outgoing(&registry, args.clone()).unwrap();
        assert_eq!(wire, Value::Array(args));
        assert_eq!(type_name, None);
    }

    #[test]
    fn prepare_incoming_round_trips_through_the_same_marshaller() {
        let registry = MarshallerRegistry::new();
        registry.register(Box::new(UppercaseMarshaller));

        let wire = registry.marshall("uppercase-string", &Value::String("hi".into())).unwrap();
        let args = prepare_incoming(&registry, wire, Some("uppercase-string")).unwrap();
        assert_eq!(args, vec![Value::String("HI".into())]);
    }

    #[test]
    fn prepare_outgoing_surfaces_unregistered_marshaller() {
        let registry = MarshallerRegistry::new();
        let args = vec![marshalled("nope", Value::Null)];
        let err = prepare_outgoing(&registry, args).unwrap_err();
        assert!(matches!(err, MarshalError::Unregistered(_)));
    }
}
