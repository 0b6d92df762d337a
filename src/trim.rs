//! Serde helpers that trim text fields while deserializing, so length rules
//! see the value that will be stored.

use serde::{Deserialize, Deserializer};

pub fn trimmed<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|value| value.trim().to_owned())
}

/// Like [`trimmed`] for optional fields. Pair with `#[serde(default)]`.
pub fn trimmed_option<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
        .map(|value| value.map(|value| value.trim().to_owned()))
}
