use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::ir::Struct;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| Error::Decode {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| Error::Decode {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    })
}

/// A struct dump is either one struct object or an array of them.
pub fn structs_from_value(value: serde_json::Value) -> Result<Vec<Struct>> {
    if value.is_array() {
        from_value_with_path(value)
    } else {
        from_value_with_path::<Struct>(value).map(|x| vec![x])
    }
}

pub fn structs_from_str(src: &str) -> Result<Vec<Struct>> {
    let value: serde_json::Value = from_str_with_path(src)?;
    structs_from_value(value)
}
