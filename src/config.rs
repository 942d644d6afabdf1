//! Configuration types for the Mapper agent.

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Mapping configuration as supplied by the proxy.
///
/// Every field is optional, and a `null` field counts as absent. Unknown keys
/// are ignored so that host-level attributes living next to the mapping do
/// not break loading. Only an object is accepted at the top level.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct MapperConfig {
    /// Fields to duplicate under a new key (source -> destination)
    pub copy_fields: BTreeMap<String, String>,
    /// Fields to move to a new key (source -> destination)
    pub map_fields: BTreeMap<String, String>,
    /// Pipeline phases the mapping applies to
    pub scope: Vec<Phase>,
}

/// Wire layout of [`MapperConfig`].
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    #[serde(deserialize_with = "null_as_default")]
    copy_fields: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    map_fields: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    scope: Vec<Phase>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl<'de> Deserialize<'de> for MapperConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ConfigVisitor;

        impl<'de> Visitor<'de> for ConfigVisitor {
            type Value = MapperConfig;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping configuration object")
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<MapperConfig, A::Error> {
                let raw = RawConfig::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(MapperConfig {
                    copy_fields: raw.copy_fields,
                    map_fields: raw.map_fields,
                    scope: raw.scope,
                })
            }
        }

        deserializer.deserialize_map(ConfigVisitor)
    }
}

/// Pipeline phase in which a modifier runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the request is forwarded upstream
    Request,
    /// Before the response is returned to the client
    Response,
}

impl MapperConfig {
    /// Parse a configuration from raw JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Whether the configuration contains no rules at all.
    pub fn is_empty(&self) -> bool {
        self.copy_fields.is_empty() && self.map_fields.is_empty()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Request => f.write_str("request"),
            Phase::Response => f.write_str("response"),
        }
    }
}

/// Errors raised while loading a mapping configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
