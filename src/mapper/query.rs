//! Query string parameters.

use super::FieldStore;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Multi-valued query parameters.
///
/// Keys are encoded in sorted order; the values of one key keep the order in
/// which they appeared in the original query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, Vec<Param>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Param {
    /// Key as it appeared on the wire, if it was parsed rather than written
    encoded_key: Option<String>,
    value: QueryValue,
}

impl Param {
    fn new(value: QueryValue) -> Self {
        Self {
            encoded_key: None,
            value,
        }
    }
}

/// A single query parameter value.
///
/// A value parsed from a query string remembers the text it was sent as and
/// is encoded back to exactly that text, wherever it ends up. Escapes that
/// are not UTF-8 (`Jos%E9`) or not escapes at all (`%zz`, `100%`) therefore
/// reach the upstream unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryValue {
    decoded: String,
    encoded: Option<String>,
}

impl QueryValue {
    fn parsed(component: &str) -> Self {
        Self {
            decoded: decode(component),
            encoded: Some(component.to_string()),
        }
    }

    /// Decoded value. Bytes that are not UTF-8 are replaced with U+FFFD.
    pub fn as_str(&self) -> &str {
        &self.decoded
    }

    /// Percent-encoded form of the value.
    pub fn encode(&self) -> Cow<'_, str> {
        match &self.encoded {
            Some(text) => Cow::Borrowed(text.as_str()),
            None => urlencoding::encode(&self.decoded),
        }
    }
}

impl From<String> for QueryValue {
    fn from(decoded: String) -> Self {
        Self {
            decoded,
            encoded: None,
        }
    }
}

impl From<&str> for QueryValue {
    fn from(decoded: &str) -> Self {
        decoded.to_string().into()
    }
}

impl QueryParams {
    /// Parse a raw query string (without the leading `?`).
    pub fn parse(query: Option<&str>) -> Self {
        let mut params: BTreeMap<String, Vec<Param>> = BTreeMap::new();

        if let Some(qs) = query {
            for part in qs.split('&') {
                if part.is_empty() {
                    continue;
                }
                let (k, v) = part.split_once('=').unwrap_or((part, ""));
                params.entry(decode(k)).or_default().push(Param {
                    encoded_key: Some(k.to_string()),
                    value: QueryValue::parsed(v),
                });
            }
        }

        Self { params }
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|v| v.first())
            .map(|p| p.value.as_str())
    }

    /// All values of `key`.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.params
            .get(key)
            .map(|v| v.iter().map(|p| p.value.as_str()).collect())
            .unwrap_or_default()
    }

    /// Replace all values of `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.params.insert(key.into(), vec![Param::new(value.into())]);
    }

    /// Append a value to `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        self.params
            .entry(key.into())
            .or_default()
            .push(Param::new(value.into()));
    }

    /// Remove `key` and all its values.
    pub fn delete(&mut self, key: &str) -> Option<Vec<QueryValue>> {
        self.params
            .remove(key)
            .map(|values| values.into_iter().map(|p| p.value).collect())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Encode into a query string, sorted by key.
    ///
    /// Parsed keys and values keep their original encoding.
    pub fn encode(&self) -> String {
        self.params
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |p| (k, p)))
            .map(|(k, p)| {
                let key = match &p.encoded_key {
                    Some(text) => Cow::Borrowed(text.as_str()),
                    None => urlencoding::encode(k),
                };
                format!("{}={}", key, p.value.encode())
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Decode a form-encoded component, treating `+` as a space.
fn decode(component: &str) -> String {
    let component = component.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(component.as_bytes())).into_owned()
}

/// Only parameters with a non-empty first value act as rule sources.
/// The value moves with its original encoding.
impl FieldStore for QueryParams {
    type Value = QueryValue;

    fn source_value(&self, key: &str) -> Option<QueryValue> {
        self.params
            .get(key)
            .and_then(|v| v.first())
            .filter(|p| !p.value.as_str().is_empty())
            .map(|p| p.value.clone())
    }

    fn write(&mut self, key: &str, value: QueryValue) {
        self.set(key, value);
    }

    fn remove(&mut self, key: &str) {
        self.delete(key);
    }
}
