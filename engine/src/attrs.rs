//! Attribute bags and the inputs accepted by constructors and lists.

use crate::{Entity, Error, Result};
use serde_json::{Map, Value};

/// A flat-ish key/value bag holding resource state.
pub type Attrs = Map<String, Value>;

/// Input for building or resolving an entity.
///
/// A bare id is cheap to construct from; full attributes are parsed by the
/// resource kind; an existing entity is used as-is.
#[derive(Debug, Clone)]
pub enum Seed {
    Id(String),
    Attrs(Attrs),
    Entity(Entity),
}

impl Seed {
    /// Convert a JSON value from a response body into a seed.
    ///
    /// Strings are ids and objects are attributes; anything else is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(id) => Ok(Seed::Id(id)),
            Value::Object(attrs) => Ok(Seed::Attrs(attrs)),
            other => Err(Error::InvalidPayload(format!(
                "expected an id or an object, got {}",
                other
            ))),
        }
    }

    /// Whether this seed is just an id.
    pub fn is_id(&self) -> bool {
        matches!(self, Seed::Id(_))
    }

    /// Attributes carried by this seed (empty for a bare id).
    pub fn attrs(&self) -> Attrs {
        match self {
            Seed::Id(_) => Attrs::new(),
            Seed::Attrs(attrs) => attrs.clone(),
            Seed::Entity(entity) => entity.attrs(),
        }
    }
}

impl From<&str> for Seed {
    fn from(id: &str) -> Self {
        Seed::Id(id.to_string())
    }
}

impl From<String> for Seed {
    fn from(id: String) -> Self {
        Seed::Id(id)
    }
}

impl From<Attrs> for Seed {
    fn from(attrs: Attrs) -> Self {
        Seed::Attrs(attrs)
    }
}

impl From<Entity> for Seed {
    fn from(entity: Entity) -> Self {
        Seed::Entity(entity)
    }
}

impl From<&Entity> for Seed {
    fn from(entity: &Entity) -> Self {
        Seed::Entity(entity.clone())
    }
}

/// Read an id out of an attribute value.
///
/// Numeric ids are accepted and stringified; empty strings are not ids.
pub fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build an attribute bag from a JSON object literal.
///
/// Non-object values produce an empty bag.
pub fn attrs_of(value: Value) -> Attrs {
    match value {
        Value::Object(map) => map,
        _ => Attrs::new(),
    }
}

/// Dot-separated keypaths over nested objects.
///
/// Only object keys are traversed; arrays and scalars end the walk.
pub mod keypath {
    use super::Attrs;
    use serde_json::Value;

    pub fn get<'a>(attrs: &'a Attrs, keypath: &str) -> Option<&'a Value> {
        let mut segments = keypath.split('.');
        let mut current = attrs.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn has(attrs: &Attrs, keypath: &str) -> bool {
        get(attrs, keypath).is_some()
    }

    /// Set a value, creating (or replacing non-object) intermediate levels.
    pub fn set(attrs: &mut Attrs, keypath: &str, value: Value) {
        let segments: Vec<&str> = keypath.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = attrs;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Attrs::new()));
            if !slot.is_object() {
                *slot = Value::Object(Attrs::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.to_string(), value);
    }
}
