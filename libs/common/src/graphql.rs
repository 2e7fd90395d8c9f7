use std::fmt::{Display, Formatter};

use bytes::Bytes;
use graphql_parser::{
  parse_query,
  query::{Definition, Document, OperationDefinition, ParseError},
};
use mime::{Mime, APPLICATION_JSON};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Error as SerdeError, Map, Value};

use crate::http::{
  extract_accept, extract_content_type, GatewayHttpRequest, GatewayHttpResponse, StatusCode,
};

pub const APPLICATION_GRAPHQL_JSON: &str = "application/graphql-response+json";
pub static APPLICATION_GRAPHQL_JSON_MIME: Lazy<Mime> = Lazy::new(|| {
  APPLICATION_GRAPHQL_JSON
    .parse::<Mime>()
    // @expected: we're parsing a statically defined constant, we know it works ;)
    .unwrap()
});

/// A GraphQL operation request, as sent by the client over any of the transports.
///
/// `operation` is optional: a client using persisted queries may send only the
/// document hash in `extensions.persistedQuery`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct GraphQLRequest {
  // The GraphQL operation, as string
  #[serde(rename = "query", default, skip_serializing_if = "Option::is_none")]
  pub operation: Option<String>,
  // The operation name, if specified
  #[serde(rename = "operationName", default)]
  #[serde(skip_serializing_if = "Option::is_none")]
  pub operation_name: Option<String>,
  // GraphQL operation variables, in JSON format
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub variables: Option<Map<String, Value>>,
  // GraphQL execution extensions, in JSON format
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extensions: Option<Map<String, Value>>,
}

impl GraphQLRequest {
  pub fn new(operation: impl Into<String>) -> Self {
    GraphQLRequest {
      operation: Some(operation.into()),
      ..Default::default()
    }
  }

  pub fn has_operation(&self) -> bool {
    self
      .operation
      .as_deref()
      .is_some_and(|operation| !operation.trim().is_empty())
  }
}

impl Display for GraphQLRequest {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}",
      serde_json::to_string(self)
        .unwrap_or_else(|e| ExtractGraphQLOperationError::SerializationError(e).to_string())
    )
  }
}

#[derive(thiserror::Error, Debug)]
pub enum ExtractGraphQLOperationError {
  #[error("missing query parameter")]
  MissingQueryParameter,
  #[error("invalid content-type header")]
  InvalidContentTypeHeader,
  #[error("invalid body json format")]
  InvalidBodyJsonFormat(SerdeError),
  #[error("invalid variables json format")]
  InvalidVariablesJsonFormat(SerdeError),
  #[error("invalid extensions json format")]
  InvalidExtensionsJsonFormat(SerdeError),
  #[error("failed to read request body")]
  FailedToReadRequestBody,
  #[error("failed to parse GraphQL operation")]
  GraphQLParserError(ParseError),
  #[error("GraphQL operation is missing from the request")]
  MissingOperation,
  #[error("failed to locate any GraphQL operation in request")]
  EmptyExtraction,
  #[error("serialization error")]
  SerializationError(SerdeError),
}

impl ExtractGraphQLOperationError {
  pub fn into_response(&self, accept: Option<Mime>) -> GatewayHttpResponse {
    let status = match (self, accept) {
      (_, None) => StatusCode::OK,
      (ExtractGraphQLOperationError::GraphQLParserError(_), Some(accept))
        if accept == APPLICATION_JSON =>
      {
        StatusCode::OK
      }
      _ => StatusCode::BAD_REQUEST,
    };

    GraphQLResponse::new_error(self.to_string().as_str()).into_with_status_code(status)
  }
}

pub type ExtractionResult = (
  Option<Mime>,
  Option<Mime>,
  Result<GraphQLRequest, ExtractGraphQLOperationError>,
);

impl GraphQLRequest {
  pub fn new_from_http_post(http_request: &GatewayHttpRequest) -> ExtractionResult {
    // Extract the content-type and default to application/json when it's not set
    // see https://graphql.github.io/graphql-over-http/draft/#sec-POST
    let content_type = extract_content_type(&http_request.headers).unwrap_or(APPLICATION_JSON);
    let accept = extract_accept(&http_request.headers);

    if content_type.type_() != mime::APPLICATION_JSON.type_()
      || content_type.subtype() != mime::APPLICATION_JSON.subtype()
    {
      return (
        Some(content_type),
        accept,
        Err(ExtractGraphQLOperationError::InvalidContentTypeHeader),
      );
    }

    match http_request.json_body::<GraphQLRequest>() {
      Ok(body) => (Some(content_type), accept, Ok(body)),
      Err(e) => (
        Some(content_type),
        accept,
        Err(ExtractGraphQLOperationError::InvalidBodyJsonFormat(e)),
      ),
    }
  }
}

impl From<&GraphQLRequest> for Bytes {
  fn from(request: &GraphQLRequest) -> Self {
    serde_json::to_vec(&request)
      .unwrap_or_else(|e| {
        ExtractGraphQLOperationError::SerializationError(e)
          .to_string()
          .into_bytes()
      })
      .into()
  }
}

pub const ERROR_CODE_EXTENSION: &str = "code";

/// An error with a message and optional extensions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GraphQLError {
  /// The error message.
  pub message: String,
  /// Extensions to the error.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extensions: Option<Map<String, Value>>,
}

impl std::fmt::Display for GraphQLError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}

impl GraphQLError {
  pub fn new(message: &str) -> Self {
    GraphQLError {
      message: message.to_string(),
      extensions: None,
    }
  }

  pub fn with_code(message: &str, code: &str) -> Self {
    let mut extensions = Map::new();
    extensions.insert(ERROR_CODE_EXTENSION.to_string(), code.into());

    GraphQLError {
      message: message.to_string(),
      extensions: Some(extensions),
    }
  }

  pub fn code(&self) -> Option<&str> {
    self
      .extensions
      .as_ref()
      .and_then(|extensions| extensions.get(ERROR_CODE_EXTENSION))
      .and_then(Value::as_str)
  }
}

pub type ParsedGraphQLDocument = Document<'static, String>;

#[derive(Debug, Clone)]
pub struct ParsedGraphQLRequest {
  pub request: GraphQLRequest,
  pub parsed_operation: ParsedGraphQLDocument,
}

impl ParsedGraphQLRequest {
  #[tracing::instrument(level = "trace", name = "graphql_parse", skip_all)]
  pub fn create_and_parse(raw_request: GraphQLRequest) -> Result<Self, ExtractGraphQLOperationError> {
    let operation = match &raw_request.operation {
      Some(operation) if !operation.trim().is_empty() => operation,
      _ => return Err(ExtractGraphQLOperationError::MissingOperation),
    };

    parse_graphql_operation(operation)
      .map(|parsed_operation| ParsedGraphQLRequest {
        request: raw_request,
        parsed_operation,
      })
      .map_err(ExtractGraphQLOperationError::GraphQLParserError)
  }

  pub fn executable_operation(&self) -> Option<&OperationDefinition<'static, String>> {
    self
      .parsed_operation
      .definitions
      .iter()
      .filter_map(|definition| match definition {
        Definition::Operation(operation) => Some(operation),
        Definition::Fragment(_) => None,
      })
      .find(|operation| match &self.request.operation_name {
        Some(op_name) => operation_name(operation) == Some(op_name.as_str()),
        None => true,
      })
  }

  pub fn is_running_mutation(&self) -> bool {
    matches!(
      self.executable_operation(),
      Some(OperationDefinition::Mutation(_))
    )
  }

  pub fn is_subscription(&self) -> bool {
    matches!(
      self.executable_operation(),
      Some(OperationDefinition::Subscription(_))
    )
  }
}

fn operation_name<'a>(operation: &'a OperationDefinition<'static, String>) -> Option<&'a str> {
  match operation {
    OperationDefinition::SelectionSet(_) => None,
    OperationDefinition::Query(query) => query.name.as_deref(),
    OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
    OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
  }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct GraphQLResponse {
  /// `Some(Value::Null)` is an explicit `"data": null`, `None` means the field was absent.
  #[serde(
    default,
    deserialize_with = "deserialize_present",
    skip_serializing_if = "Option::is_none"
  )]
  pub data: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub errors: Option<Vec<GraphQLError>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extensions: Option<Value>,

  #[serde(skip)]
  downstream_http_code: Option<StatusCode>,
}

impl GraphQLResponse {
  pub fn new_data(data: Value) -> Self {
    GraphQLResponse {
      data: Some(data),
      ..Default::default()
    }
  }

  pub fn new_data_with_errors(data: Value, errors: Vec<GraphQLError>) -> Self {
    GraphQLResponse {
      data: Some(data),
      errors: Some(errors),
      ..Default::default()
    }
  }

  pub fn new_error(error: &str) -> Self {
    Self::from_errors(vec![GraphQLError::new(error)])
  }

  pub fn from_errors(errors: Vec<GraphQLError>) -> Self {
    GraphQLResponse {
      errors: Some(errors),
      ..Default::default()
    }
  }

  pub fn new_error_with_code(error: &str, status_code: StatusCode) -> Self {
    GraphQLResponse {
      errors: Some(vec![GraphQLError::new(error)]),
      downstream_http_code: Some(status_code),
      ..Default::default()
    }
  }

  pub fn into_with_status_code(self, code: StatusCode) -> GatewayHttpResponse {
    GatewayHttpResponse {
      body: self.into(),
      status: code,
      headers: Default::default(),
    }
  }
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
  D: Deserializer<'de>,
{
  Value::deserialize(deserializer).map(Some)
}

impl From<GraphQLResponse> for Bytes {
  fn from(response: GraphQLResponse) -> Self {
    serde_json::to_vec(&response)
      .unwrap_or_else(|e| {
        ExtractGraphQLOperationError::SerializationError(e)
          .to_string()
          .into_bytes()
      })
      .into()
  }
}

impl From<GraphQLResponse> for GatewayHttpResponse {
  fn from(response: GraphQLResponse) -> Self {
    let status = response.downstream_http_code.unwrap_or(StatusCode::OK);

    GatewayHttpResponse {
      body: response.into(),
      status,
      headers: Default::default(),
    }
  }
}

pub fn parse_graphql_operation(operation_str: &str) -> Result<ParsedGraphQLDocument, ParseError> {
  parse_query::<String>(operation_str).map(|v| v.into_static())
}
