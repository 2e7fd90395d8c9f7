use crate::config::{AllowedOrigin, CorsPluginConfig};
use switchboard_common::http::header::{
  HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
  ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
  ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
  CONTENT_LENGTH, ORIGIN, VARY,
};
use switchboard_common::http::{header_str, HttpHeadersMap, Method};
use tracing::debug;

use switchboard_common::execute::RequestExecutionContext;
use switchboard_common::http::{GatewayHttpResponse, StatusCode};
use switchboard_common::plugin::{CreatablePlugin, Plugin, PluginError};

#[derive(Debug)]
pub struct CorsPlugin(CorsPluginConfig);

static WILDCARD: &str = "*";

#[async_trait::async_trait]
impl CreatablePlugin for CorsPlugin {
  type Config = CorsPluginConfig;

  async fn create(config: Self::Config) -> Result<Box<Self>, PluginError> {
    Ok(Box::new(Self(config)))
  }
}

impl CorsPlugin {
  /// https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Access-Control-Allow-Origin#browser_compatibility
  pub fn configure_origin(
    &self,
    request_headers: &HttpHeadersMap,
    response_headers: &mut HttpHeadersMap,
  ) {
    let request_origin = header_str(request_headers, ORIGIN.as_str());

    let value = match &self.0.allowed_origin {
      None => return,
      Some(AllowedOrigin::Single(origin)) => match origin.as_str() {
        "*" => Some(WILDCARD),
        "reflect" => request_origin.or(Some(WILDCARD)),
        _ => Some(origin.as_str()),
      },
      Some(AllowedOrigin::List(origins)) => {
        request_origin.filter(|origin| origins.iter().any(|allowed| allowed == origin))
      }
    };

    match value {
      Some(value) => {
        if let Ok(parsed_value) = value.parse() {
          response_headers.append(ACCESS_CONTROL_ALLOW_ORIGIN, parsed_value);
        }
      }
      None => debug!(
        "origin {:?} is not part of the CORS allow-list, omitting CORS origin header",
        request_origin
      ),
    }

    response_headers.append(VARY, HeaderValue::from_static("Origin"));
  }

  /// https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Access-Control-Allow-Credentials
  pub fn configure_credentials(&self, response_headers: &mut HttpHeadersMap) {
    if self.0.allow_credentials == Some(true) {
      response_headers.append(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
      );
    }
  }

  /// https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Access-Control-Allow-Methods
  pub fn configure_methods(&self, response_headers: &mut HttpHeadersMap) {
    let value = self.0.allowed_methods.as_deref().unwrap_or(WILDCARD);
    if let Ok(parsed_value) = value.parse() {
      response_headers.append(ACCESS_CONTROL_ALLOW_METHODS, parsed_value);
    }
  }

  /// https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Access-Control-Allow-Headers
  pub fn configure_allowed_headers(
    &self,
    request_headers: &HttpHeadersMap,
    response_headers: &mut HttpHeadersMap,
  ) {
    match self.0.allowed_headers.as_deref() {
      None | Some("*") => {
        if let Some(source_header) = request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
          response_headers.append(ACCESS_CONTROL_ALLOW_HEADERS, source_header.clone());
          response_headers.append(VARY, HeaderValue::from_static("Access-Control-Request-Headers"));
        }
      }
      Some(list) => {
        if let Ok(parsed_value) = list.parse() {
          response_headers.append(ACCESS_CONTROL_ALLOW_HEADERS, parsed_value);
        }
      }
    }
  }

  /// https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Access-Control-Expose-Headers
  pub fn configure_exposed_headers(&self, response_headers: &mut HttpHeadersMap) {
    if let Some(exposed_headers) = &self.0.exposed_headers {
      if let Ok(header_value) = HeaderValue::from_str(exposed_headers) {
        response_headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, header_value);
      }
    }
  }

  /// https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Access-Control-Max-Age
  pub fn configure_max_age(&self, response_headers: &mut HttpHeadersMap) {
    if let Some(max_age) = &self.0.max_age {
      response_headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(*max_age));
    }
  }
}

fn is_preflight(ctx: &RequestExecutionContext) -> bool {
  let request = &ctx.downstream_http_request;

  request.method == Method::OPTIONS
    && request.headers.contains_key(ORIGIN)
    && request.headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

#[async_trait::async_trait]
impl Plugin for CorsPlugin {
  async fn on_downstream_http_request(&self, ctx: &mut RequestExecutionContext) {
    if is_preflight(ctx) {
      let request_headers = &ctx.downstream_http_request.headers;
      let mut response_headers = HttpHeadersMap::new();
      self.configure_origin(request_headers, &mut response_headers);
      self.configure_credentials(&mut response_headers);
      self.configure_methods(&mut response_headers);
      self.configure_exposed_headers(&mut response_headers);
      self.configure_max_age(&mut response_headers);
      self.configure_allowed_headers(request_headers, &mut response_headers);
      response_headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

      ctx.short_circuit(GatewayHttpResponse {
        status: StatusCode::OK,
        headers: response_headers,
        body: Default::default(),
      })
    }
  }

  fn on_downstream_http_response(
    &self,
    ctx: &mut RequestExecutionContext,
    response: &mut GatewayHttpResponse,
  ) {
    // Preflight responses were fully built in `on_downstream_http_request`.
    if is_preflight(ctx) {
      return;
    }

    let request_headers = &ctx.downstream_http_request.headers;
    self.configure_origin(request_headers, &mut response.headers);
    self.configure_credentials(&mut response.headers);
    self.configure_exposed_headers(&mut response.headers);
  }
}
