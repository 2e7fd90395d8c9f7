use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{anyhow, Result as AnyhowResult};
pub use bytes::Bytes;
use http::{HeaderMap, StatusCode as RawStatusCode};

pub use http::header;
pub use http::header::{HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
pub use http::Method;
pub use mime::{Mime, APPLICATION_JSON, APPLICATION_WWW_FORM_URLENCODED};
use serde::de::DeserializeOwned;
use serde_json::from_slice;
pub type StatusCode = RawStatusCode;
pub type HttpHeadersMap = HeaderMap<HeaderValue>;

pub trait ToHeadersMap {
  fn to_headers_map(&self) -> AnyhowResult<HttpHeadersMap>;
}

impl ToHeadersMap for Vec<(&str, &str)> {
  fn to_headers_map(&self) -> Result<HttpHeadersMap, anyhow::Error> {
    let mut headers_map = HeaderMap::new();

    for (key, value) in self {
      let header_name = HeaderName::from_str(key)
        .map_err(|e| anyhow!("Couldn't parse key into a header name: {}", e))?;
      let header_value = HeaderValue::from_str(value)
        .map_err(|e| anyhow!("Couldn't parse value into a header value: {}", e))?;

      headers_map.append(header_name, header_value);
    }

    Ok(headers_map)
  }
}

/// A downstream HTTP request, detached from the HTTP server that accepted it.
#[derive(Debug, Clone)]
pub struct GatewayHttpRequest {
  pub headers: HeaderMap<HeaderValue>,
  pub method: Method,
  pub uri: String,
  pub query_string: String,
  pub body: Bytes,
}

#[cfg(feature = "test_utils")]
impl Default for GatewayHttpRequest {
  fn default() -> Self {
    Self {
      headers: HeaderMap::new(),
      method: Method::POST,
      uri: "/graphql".to_string(),
      query_string: "".to_string(),
      body: serde_json::json!({
          "query": "query { __typename }",
      })
      .to_string()
      .into(),
    }
  }
}

impl GatewayHttpRequest {
  pub fn json_body<T>(&self) -> Result<T, serde_json::Error>
  where
    T: DeserializeOwned,
  {
    from_slice::<T>(&self.body)
  }

  pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
    header_str(&self.headers, name.as_ref())
  }
}

#[derive(Debug, Clone)]
pub struct GatewayHttpResponse {
  pub body: Bytes,
  pub status: StatusCode,
  pub headers: HeaderMap,
}

impl GatewayHttpResponse {
  pub fn empty(status: StatusCode) -> Self {
    Self {
      body: Bytes::new(),
      status,
      headers: HeaderMap::new(),
    }
  }
}

pub fn header_str<'a>(headers_map: &'a HttpHeadersMap, name: &str) -> Option<&'a str> {
  headers_map.get(name).and_then(|value| value.to_str().ok())
}

pub fn extract_content_type(headers_map: &HttpHeadersMap) -> Option<Mime> {
  header_str(headers_map, CONTENT_TYPE.as_str()).and_then(|content_type| content_type.parse().ok())
}

pub fn extract_accept(headers_map: &HeaderMap) -> Option<Mime> {
  header_str(headers_map, ACCEPT.as_str()).and_then(|accept| accept.parse().ok())
}

/// Decodes an `application/x-www-form-urlencoded` query string. Repeated keys keep the last value.
pub fn parse_query_string(input: &str) -> HashMap<String, String> {
  url::form_urlencoded::parse(input.as_bytes())
    .into_owned()
    .collect()
}
