//! Per-request view over the fields the mapper can rewrite.

use crate::mapper::{decode_body, BodyMap, BodyUndecodable, QueryParams};
use tracing::debug;

/// Query parameters and decoded body of a single request.
///
/// Built at the start of one invocation, mutated by the mapper and encoded
/// back into the request before the invocation returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestView {
    /// Parsed query parameters
    pub query: QueryParams,
    /// Decoded flat JSON body; `None` when absent or undecodable
    pub body: Option<BodyMap>,
}

impl RequestView {
    /// Build a view from a raw query string and the buffered body bytes.
    pub fn parse(query_string: Option<&str>, body: &[u8]) -> Self {
        let body = match decode_body(body) {
            Ok(map) => Some(map),
            Err(BodyUndecodable::Empty) => None,
            Err(e) => {
                debug!(error = %e, body_size = body.len(), "Body left untouched");
                None
            }
        };

        Self {
            query: QueryParams::parse(query_string),
            body,
        }
    }

    /// Build a view for a request whose body is not available for mapping.
    pub fn query_only(query_string: Option<&str>) -> Self {
        Self {
            query: QueryParams::parse(query_string),
            body: None,
        }
    }

    /// Encoded query string, or `None` when no parameters remain.
    pub fn encode_query(&self) -> Option<String> {
        if self.query.is_empty() {
            None
        } else {
            Some(self.query.encode())
        }
    }

    /// Encoded body, or `None` when the body never decoded.
    pub fn encode_body(&self) -> Result<Option<Vec<u8>>, serde_json::Error> {
        self.body.as_ref().map(serde_json::to_vec).transpose()
    }
}
