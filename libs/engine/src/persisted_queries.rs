use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use switchboard_cache::PersistedQueryCache;
use switchboard_common::{
  graphql::{GraphQLError, GraphQLRequest, GraphQLResponse},
  http::{GatewayHttpResponse, StatusCode},
};
use tracing::debug;

pub const PERSISTED_QUERY_EXTENSION: &str = "persistedQuery";
pub const SUPPORTED_PERSISTED_QUERY_VERSION: u64 = 1;

#[derive(Deserialize, Debug)]
struct PersistedQueryExtension {
  version: Option<u64>,
  #[serde(rename = "sha256Hash")]
  hash: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PersistedQueryError {
  /// Recoverable: the client retries with the full query text.
  #[error("PersistedQueryNotFound")]
  NotFound,
  #[error("provided sha does not match query")]
  HashMismatch,
  #[error("unsupported persisted query version")]
  UnsupportedVersion,
  #[error("invalid persisted query extension: {0}")]
  InvalidExtension(String),
}

impl PersistedQueryError {
  pub fn code(&self) -> &'static str {
    match self {
      PersistedQueryError::NotFound => "PERSISTED_QUERY_NOT_FOUND",
      PersistedQueryError::HashMismatch => "PERSISTED_QUERY_HASH_MISMATCH",
      PersistedQueryError::UnsupportedVersion => "PERSISTED_QUERY_VERSION_NOT_SUPPORTED",
      PersistedQueryError::InvalidExtension(_) => "PERSISTED_QUERY_INVALID_EXTENSION",
    }
  }

  pub fn status_code(&self) -> StatusCode {
    match self {
      // A miss is a protocol step, not an HTTP failure.
      PersistedQueryError::NotFound => StatusCode::OK,
      _ => StatusCode::BAD_REQUEST,
    }
  }

  pub fn to_graphql_error(&self) -> GraphQLError {
    GraphQLError::with_code(&self.to_string(), self.code())
  }

  pub fn into_response(self) -> GatewayHttpResponse {
    let status = self.status_code();

    GraphQLResponse::from_errors(vec![self.to_graphql_error()]).into_with_status_code(status)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistedQueryOutcome {
  /// The request carries no `persistedQuery` extension.
  NotPersisted,
  /// The query text was resolved from the cache.
  Hit,
  /// Hash and text were verified and the pair was stored.
  Registered,
}

/// Resolves the `persistedQuery` extension of a request against the shared cache.
///
/// Used by every transport, so a hash registered over POST resolves over GET or WebSocket as well.
#[derive(Debug, Clone)]
pub struct PersistedQueryResolver {
  cache: Arc<PersistedQueryCache>,
}

impl PersistedQueryResolver {
  pub fn new(cache: Arc<PersistedQueryCache>) -> Self {
    Self { cache }
  }

  pub fn cache(&self) -> &Arc<PersistedQueryCache> {
    &self.cache
  }

  #[tracing::instrument(level = "debug", skip_all)]
  pub fn resolve(
    &self,
    request: &mut GraphQLRequest,
  ) -> Result<PersistedQueryOutcome, PersistedQueryError> {
    let extension = match extract_extension(request)? {
      Some(extension) => extension,
      None => return Ok(PersistedQueryOutcome::NotPersisted),
    };

    if extension.version != Some(SUPPORTED_PERSISTED_QUERY_VERSION) {
      return Err(PersistedQueryError::UnsupportedVersion);
    }

    let hash = extension.hash.to_ascii_lowercase();

    if !request.has_operation() {
      return match self.cache.get(&hash) {
        Some(query) => {
          debug!("persisted query {} resolved from cache", hash);
          request.operation = Some(query);

          Ok(PersistedQueryOutcome::Hit)
        }
        None => {
          debug!("persisted query {} not found", hash);

          Err(PersistedQueryError::NotFound)
        }
      };
    }

    let query = request.operation.as_deref().unwrap_or_default();

    if hash_query(query) != hash {
      return Err(PersistedQueryError::HashMismatch);
    }

    debug!("registering persisted query {}", hash);
    self.cache.put(hash, query);

    Ok(PersistedQueryOutcome::Registered)
  }
}

fn extract_extension(
  request: &GraphQLRequest,
) -> Result<Option<PersistedQueryExtension>, PersistedQueryError> {
  let raw = match request
    .extensions
    .as_ref()
    .and_then(|extensions| extensions.get(PERSISTED_QUERY_EXTENSION))
  {
    None | Some(Value::Null) => return Ok(None),
    Some(raw) => raw,
  };

  PersistedQueryExtension::deserialize(raw)
    .map(Some)
    .map_err(|e| PersistedQueryError::InvalidExtension(e.to_string()))
}

/// Lowercase hex SHA-256 of the query text, as computed by clients.
pub fn hash_query(query: &str) -> String {
  hex::encode(Sha256::digest(query.as_bytes()))
}
