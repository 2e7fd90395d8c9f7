//! Origin checks for streaming upgrades.
//!
//! Request/response transports are covered by the CORS plugin; this module only
//! answers whether a bidirectional connection may be opened for a given origin.

use crate::http::{header, header_str, HttpHeadersMap};

/// The origin-related facts a client declared on its request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
  pub origin: Option<String>,
  pub host: Option<String>,
}

impl RequestOrigin {
  pub fn new(origin: Option<&str>, host: Option<&str>) -> Self {
    RequestOrigin {
      origin: origin.map(ToString::to_string),
      host: host.map(ToString::to_string),
    }
  }

  pub fn from_headers(headers: &HttpHeadersMap) -> Self {
    Self::new(
      header_str(headers, header::ORIGIN.as_str()),
      header_str(headers, header::HOST.as_str()),
    )
  }
}

/// Exact-match list of origins allowed to open streaming connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginAllowList(Vec<String>);

impl OriginAllowList {
  pub fn new<I, S>(origins: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    OriginAllowList(origins.into_iter().map(Into::into).collect())
  }

  pub fn contains(&self, origin: &str) -> bool {
    self.0.iter().any(|allowed| allowed == origin)
  }

  pub fn allows(&self, request: &RequestOrigin) -> bool {
    is_origin_allowed(request.origin.as_deref(), request.host.as_deref(), self)
  }
}

/// Decides whether a streaming upgrade is allowed.
///
/// An empty or missing origin is allowed: same-origin and non-browser clients do not send one.
/// This is an accepted trade-off, the header is not a security boundary for such clients.
pub fn is_origin_allowed(
  declared_origin: Option<&str>,
  declared_host: Option<&str>,
  allow_list: &OriginAllowList,
) -> bool {
  let origin = match declared_origin {
    None | Some("") => return true,
    Some(origin) => origin,
  };

  if declared_host == Some(origin) {
    return true;
  }

  allow_list.contains(origin)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::ToHeadersMap;

  fn dev_origins() -> OriginAllowList {
    OriginAllowList::new(["http://localhost:8080", "http://localhost:8000"])
  }

  #[test]
  fn missing_or_empty_origin_is_allowed() {
    assert!(is_origin_allowed(None, Some("api.example.com"), &dev_origins()));
    assert!(is_origin_allowed(Some(""), None, &OriginAllowList::default()));
  }

  #[test]
  fn origin_equal_to_host_is_allowed() {
    assert!(is_origin_allowed(
      Some("api.example.com"),
      Some("api.example.com"),
      &OriginAllowList::default()
    ));
  }

  #[test]
  fn host_comparison_is_literal() {
    assert!(!is_origin_allowed(
      Some("http://api.example.com"),
      Some("api.example.com"),
      &OriginAllowList::default()
    ));
  }

  #[test]
  fn allow_list_is_exact_and_case_sensitive() {
    let list = dev_origins();

    assert!(is_origin_allowed(Some("http://localhost:8000"), None, &list));
    assert!(!is_origin_allowed(Some("http://LOCALHOST:8000"), None, &list));
    assert!(!is_origin_allowed(Some("http://localhost:8000/"), None, &list));
    assert!(!is_origin_allowed(Some("http://sub.localhost:8000"), None, &list));
  }

  #[test]
  fn unknown_origin_is_denied() {
    assert!(!is_origin_allowed(
      Some("https://evil.example"),
      Some("localhost:8080"),
      &dev_origins()
    ));
  }

  #[test]
  fn request_origin_from_headers() {
    let headers = vec![("origin", "http://localhost:8080"), ("host", "localhost:8080")]
      .to_headers_map()
      .unwrap();
    let request = RequestOrigin::from_headers(&headers);

    assert_eq!(
      request,
      RequestOrigin::new(Some("http://localhost:8080"), Some("localhost:8080"))
    );
    assert!(dev_origins().allows(&request));
  }
}
