use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::options::DeserializationOptions;

#[derive(Error, Debug)]
pub enum DeserializeError {
    #[error("failed to parse JSON payload")]
    Parse(#[from] serde_json::Error),
    #[error("expected a JSON object wrapping the payload under a root key")]
    NotAnObject,
    #[error("payload has no root key named {0:?}")]
    MissingRoot(String),
    #[error("a payload without root can only fill one parameter, got {0}")]
    AmbiguousWithoutRoot(usize),
}

/// Derive the root key a payload of type `T` is expected to be wrapped in.
///
/// Path and generic arguments are dropped and the first character is lower-cased,
/// so `shop::Order<u32>` becomes `order` and `UserAccount` becomes `userAccount`.
///
/// Meant for named types. References, slices and tuples only keep the name of
/// their last element type: `&[shop::Order]` becomes `order`.
pub fn root_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let name = full.split('<').next().unwrap_or(full);
    let name = name.rsplit("::").next().unwrap_or(name);
    let name = name.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'));

    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deserializes JSON request payloads according to a set of [`DeserializationOptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Deserialization {
    options: DeserializationOptions,
}

impl Deserialization {
    pub fn new(options: DeserializationOptions) -> Self {
        Deserialization { options }
    }

    pub fn options(&self) -> &DeserializationOptions {
        &self.options
    }

    /// Deserialize `body` into a `T`.
    ///
    /// Unless the options say the payload comes without root, the value is taken
    /// from under the `root` key of the top-level object.
    pub fn deserialize<T>(&self, body: &[u8], root: &str) -> Result<T, DeserializeError>
    where
        T: DeserializeOwned,
    {
        let value: Value = serde_json::from_slice(body)?;
        let value = self.unwrap_root(value, root)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Like [`Deserialization::deserialize`], with the root key derived from `T`.
    pub fn deserialize_rooted<T>(&self, body: &[u8]) -> Result<T, DeserializeError>
    where
        T: DeserializeOwned,
    {
        self.deserialize(body, &root_name::<T>())
    }

    /// Split `body` into one JSON value per named parameter.
    ///
    /// Rooted payloads are objects keyed by parameter name; names missing from the
    /// object yield `None`. A payload without root is the value of its single parameter.
    pub fn deserialize_params(
        &self,
        body: &[u8],
        names: &[&str],
    ) -> Result<Vec<Option<Value>>, DeserializeError> {
        let value: Value = serde_json::from_slice(body)?;

        if self.options.is_without_root() {
            if names.len() != 1 {
                return Err(DeserializeError::AmbiguousWithoutRoot(names.len()));
            }
            return Ok(vec![Some(value)]);
        }

        let object = into_object(value)?;
        Ok(names.iter().map(|name| object.get(*name).cloned()).collect())
    }

    fn unwrap_root(&self, value: Value, root: &str) -> Result<Value, DeserializeError> {
        if self.options.is_without_root() {
            log::debug!("Deserializing payload without root");
            return Ok(value);
        }

        let mut object = into_object(value)?;
        log::debug!("Unwrapping payload root: {}", root);
        object
            .remove(root)
            .ok_or_else(|| DeserializeError::MissingRoot(root.to_owned()))
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, DeserializeError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(DeserializeError::NotAnObject),
    }
}
