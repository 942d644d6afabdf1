//! Request modifier exposed to the proxy.

use crate::config::{ConfigError, Phase};
use crate::context::RequestView;
use crate::mapper::{FieldMapper, MappingDefinition};
use crate::request::ProxyRequest;
use async_trait::async_trait;
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace, warn};

/// Name under which the proxy registers [`from_json`].
pub const MODIFIER_NAME: &str = "mapper.JSONMapper";

/// Default maximum body size buffered for mapping (10MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Signature of a configuration-to-modifier factory.
pub type ModifierFactory = fn(&[u8]) -> Result<ParsedModifier, ConfigError>;

/// Trait for request mutation invoked by the proxy.
#[async_trait]
pub trait RequestModifier: Send + Sync {
    /// Mutate the request in place.
    async fn modify_request(&self, req: &mut ProxyRequest) -> Result<(), ModifyError>;

    /// Get the modifier name for debugging.
    fn name(&self) -> &'static str;
}

/// Renames and copies query parameters and JSON body fields.
#[derive(Debug, Clone)]
pub struct MapperModifier {
    mapper: FieldMapper,
    max_body_size: usize,
}

impl MapperModifier {
    /// Create a modifier for the given definition.
    pub fn new(definition: MappingDefinition) -> Self {
        Self {
            mapper: FieldMapper::new(definition),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Limit how many body bytes are buffered for mapping.
    ///
    /// Larger bodies are forwarded unchanged; query rules still apply.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// The mapping definition in use.
    pub fn definition(&self) -> &MappingDefinition {
        self.mapper.definition()
    }

    /// Largest body, in bytes, that is buffered for mapping.
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Buffer the request body.
    ///
    /// Returns `None` when the body exceeds the limit; in that case the bytes
    /// read so far are chained back in front of the unread remainder.
    async fn buffer_body(&self, req: &mut ProxyRequest) -> Result<Option<Vec<u8>>, ModifyError> {
        let limit = self.max_body_size as u64;
        let mut limited = req.take_body().take(limit.saturating_add(1));

        let mut buf = Vec::new();
        limited
            .read_to_end(&mut buf)
            .await
            .map_err(ModifyError::BodyUnreadable)?;

        if buf.len() as u64 > limit {
            warn!(
                path = %req.path,
                max_body_size = self.max_body_size,
                "Body exceeds limit, skipping body rules"
            );
            let rest = limited.into_inner();
            req.set_body_stream(Cursor::new(buf).chain(rest));
            return Ok(None);
        }

        Ok(Some(buf))
    }
}

#[async_trait]
impl RequestModifier for MapperModifier {
    async fn modify_request(&self, req: &mut ProxyRequest) -> Result<(), ModifyError> {
        let original = self.buffer_body(req).await?;

        let mut view = match &original {
            Some(bytes) => RequestView::parse(req.query_string.as_deref(), bytes),
            None => RequestView::query_only(req.query_string.as_deref()),
        };

        self.mapper.apply(&mut view);

        req.query_string = view.encode_query();

        match (view.encode_body()?, original) {
            (Some(body), _) => {
                trace!(body_size = body.len(), "Replacing request body");
                req.replace_body(body);
            }
            // Undecodable or empty: put the original bytes back untouched.
            (None, Some(bytes)) => req.set_body_stream(Cursor::new(bytes)),
            (None, None) => {}
        }

        debug!(
            method = %req.method,
            path = %req.path,
            query = ?req.query_string,
            body_mapped = view.body.is_some(),
            "Applied field mapping"
        );

        Ok(())
    }

    fn name(&self) -> &'static str {
        "field_mapper"
    }
}

/// A modifier built from configuration, together with its scope.
#[derive(Debug, Clone)]
pub struct ParsedModifier {
    modifier: Arc<MapperModifier>,
}

impl ParsedModifier {
    /// Wrap a modifier so it can be handed out per phase.
    pub fn new(modifier: MapperModifier) -> Self {
        Self {
            modifier: Arc::new(modifier),
        }
    }

    /// The modifier to run in the request phase, if the scope includes it.
    pub fn request_modifier(&self) -> Option<Arc<dyn RequestModifier>> {
        if self.applies_to(Phase::Request) {
            Some(self.modifier.clone() as Arc<dyn RequestModifier>)
        } else {
            None
        }
    }

    /// Whether the modifier is scoped to `phase`.
    pub fn applies_to(&self, phase: Phase) -> bool {
        self.modifier.definition().applies_to(phase)
    }

    /// The wrapped modifier, regardless of scope.
    pub fn modifier(&self) -> &Arc<MapperModifier> {
        &self.modifier
    }
}

/// Build a modifier from a JSON configuration payload.
pub fn from_json(bytes: &[u8]) -> Result<ParsedModifier, ConfigError> {
    let definition = MappingDefinition::from_json(bytes)?;
    Ok(ParsedModifier::new(MapperModifier::new(definition)))
}

/// Build a modifier from a YAML configuration string.
pub fn from_yaml(yaml: &str) -> Result<ParsedModifier, ConfigError> {
    let definition = MappingDefinition::from_yaml(yaml)?;
    Ok(ParsedModifier::new(MapperModifier::new(definition)))
}

/// The registration name and factory the proxy's composition root wires up.
pub fn registration() -> (&'static str, ModifierFactory) {
    (MODIFIER_NAME, from_json as ModifierFactory)
}

/// Errors that abort a single modifier invocation.
#[derive(Debug, thiserror::Error)]
pub enum ModifyError {
    #[error("Failed to read request body: {0}")]
    BodyUnreadable(#[source] std::io::Error),

    #[error("Failed to encode request body: {0}")]
    BodyEncode(#[from] serde_json::Error),
}
