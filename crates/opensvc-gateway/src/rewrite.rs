//! Response rewriting: literal removal of the proxy path prefix
//!
//! The rewrite is byte-oriented and not content-aware. A binary body that
//! happens to contain the prefix bytes is altered as well.
//!
//! Bodyless responses keep the length the upstream declared. For `HEAD` that
//! is the unrewritten `GET` length, which may overstate the rewritten body.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::response::Parts;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use std::borrow::Cow;

/// Removes every occurrence of a fixed prefix from headers and bodies
#[derive(Debug, Clone)]
pub struct PrefixStripper {
    prefix: String,
}

impl PrefixStripper {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Remove all non-overlapping occurrences of the prefix.
    pub fn strip<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        let needle = self.prefix.as_bytes();
        if needle.is_empty() || input.len() < needle.len() {
            return Cow::Borrowed(input);
        }

        let mut out: Option<Vec<u8>> = None;
        let mut start = 0;
        let mut i = 0;
        while i + needle.len() <= input.len() {
            if &input[i..i + needle.len()] == needle {
                out.get_or_insert_with(|| Vec::with_capacity(input.len()))
                    .extend_from_slice(&input[start..i]);
                i += needle.len();
                start = i;
            } else {
                i += 1;
            }
        }

        match out {
            Some(mut out) => {
                out.extend_from_slice(&input[start..]);
                Cow::Owned(out)
            }
            None => Cow::Borrowed(input),
        }
    }

    /// Rewrite every header value, keeping all values of multi-valued headers
    /// in their original order.
    pub fn rewrite_headers(&self, headers: &HeaderMap) -> HeaderMap {
        let mut rewritten = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let value = match self.strip(value.as_bytes()) {
                Cow::Borrowed(_) => value.clone(),
                Cow::Owned(bytes) => match HeaderValue::from_bytes(&bytes) {
                    Ok(mut new_value) => {
                        new_value.set_sensitive(value.is_sensitive());
                        new_value
                    }
                    Err(_) => value.clone(),
                },
            };
            rewritten.append(name.clone(), value);
        }
        rewritten
    }

    /// Rewrite a fully buffered response and fix up its `Content-Length`.
    pub fn rewrite_response(&self, mut parts: Parts, body: Bytes) -> Response<Full<Bytes>> {
        parts.headers = self.rewrite_headers(&parts.headers);
        let bodyless = body.is_empty();

        let body = match self.strip(&body) {
            Cow::Borrowed(_) => body,
            Cow::Owned(stripped) => Bytes::from(stripped),
        };

        parts.headers.remove(TRANSFER_ENCODING);
        if bodyless && forbids_content_length(parts.status) {
            parts.headers.remove(CONTENT_LENGTH);
        } else if !bodyless || !declares_unsent_body(&parts) {
            parts
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        Response::from_parts(parts, Full::new(body))
    }
}

/// HEAD and 304 responses describe a body that was not sent
fn declares_unsent_body(parts: &Parts) -> bool {
    parts.status == StatusCode::NOT_MODIFIED || parts.headers.contains_key(CONTENT_LENGTH)
}

fn forbids_content_length(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{LOCATION, SET_COOKIE};
    use http_body_util::BodyExt;

    const PREFIX: &str = "/api/v1/namespaces/default/services/nginx/proxy";

    fn response_parts(headers: &[(&str, &str)]) -> Parts {
        response_parts_with_status(200, headers)
    }

    fn response_parts_with_status(status: u16, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_strip_all_occurrences() {
        let stripper = PrefixStripper::new("/p");
        assert_eq!(stripper.strip(b"/p/a/p/b").as_ref(), b"/a/b");
        assert_eq!(stripper.strip(b"/p/p").as_ref(), b"");
        assert_eq!(stripper.strip(b"nothing").as_ref(), b"nothing");
    }

    #[test]
    fn test_strip_without_match_borrows() {
        let stripper = PrefixStripper::new(PREFIX);
        assert!(matches!(stripper.strip(b"<html></html>"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_empty_prefix_is_noop() {
        let stripper = PrefixStripper::new("");
        assert_eq!(stripper.strip(b"/api/v1").as_ref(), b"/api/v1");
    }

    #[test]
    fn test_strip_binary_body() {
        let stripper = PrefixStripper::new("ab");
        let body = [0u8, b'a', b'b', 0xff, b'a'];
        assert_eq!(stripper.strip(&body).as_ref(), &[0u8, 0xff, b'a']);
    }

    #[tokio::test]
    async fn test_rewrite_response() {
        let stripper = PrefixStripper::new(PREFIX);
        let parts = response_parts(&[
            ("location", format!("{}/login", PREFIX).as_str()),
            ("content-length", "86"),
        ]);
        let body = Bytes::from(format!(
            r#"<script src="{}/public/main.js"></script>"#,
            PREFIX
        ));
        assert_eq!(body.len(), 86);

        let response = stripper.rewrite_response(parts, body);

        assert_eq!(response.headers()[LOCATION], "/login");
        assert_eq!(response.headers()[CONTENT_LENGTH], "39");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), br#"<script src="/public/main.js"></script>"#);
    }

    #[test]
    fn test_rewrite_multi_valued_headers() {
        let stripper = PrefixStripper::new(PREFIX);
        let parts = response_parts(&[
            ("set-cookie", format!("a=1; Path={}/", PREFIX).as_str()),
            ("set-cookie", format!("b=2; Path={}/admin", PREFIX).as_str()),
            ("x-unrelated", "kept"),
        ]);

        let headers = stripper.rewrite_headers(&parts.headers);
        let cookies: Vec<_> = headers.get_all(SET_COOKIE).iter().collect();

        assert_eq!(cookies, vec!["a=1; Path=/", "b=2; Path=/admin"]);
        assert_eq!(headers["x-unrelated"], "kept");
    }

    #[test]
    fn test_rewrite_drops_transfer_encoding() {
        let stripper = PrefixStripper::new(PREFIX);
        let parts = response_parts(&[("transfer-encoding", "chunked")]);

        let response = stripper.rewrite_response(parts, Bytes::from_static(b"hello"));

        assert!(response.headers().get(TRANSFER_ENCODING).is_none());
        assert_eq!(response.headers()[CONTENT_LENGTH], "5");
    }

    #[test]
    fn test_head_response_keeps_declared_length() {
        let stripper = PrefixStripper::new(PREFIX);
        let parts = response_parts(&[("content-length", "1234")]);

        let response = stripper.rewrite_response(parts, Bytes::new());

        assert_eq!(response.headers()[CONTENT_LENGTH], "1234");
    }

    #[test]
    fn test_no_content_has_no_length() {
        let stripper = PrefixStripper::new(PREFIX);
        let parts = response_parts_with_status(204, &[("content-length", "0")]);

        let response = stripper.rewrite_response(parts, Bytes::new());

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_not_modified_length_untouched() {
        let stripper = PrefixStripper::new(PREFIX);

        let response =
            stripper.rewrite_response(response_parts_with_status(304, &[]), Bytes::new());
        assert!(response.headers().get(CONTENT_LENGTH).is_none());

        let parts = response_parts_with_status(304, &[("content-length", "512")]);
        let response = stripper.rewrite_response(parts, Bytes::new());
        assert_eq!(response.headers()[CONTENT_LENGTH], "512");
    }

    #[test]
    fn test_empty_body_without_length_gets_zero() {
        let stripper = PrefixStripper::new(PREFIX);
        let parts = response_parts(&[("transfer-encoding", "chunked")]);

        let response = stripper.rewrite_response(parts, Bytes::new());

        assert_eq!(response.headers()[CONTENT_LENGTH], "0");
    }

    #[test]
    fn test_body_stripped_to_empty_gets_zero() {
        let stripper = PrefixStripper::new(PREFIX);
        let parts = response_parts(&[("content-length", "47")]);
        assert_eq!(PREFIX.len(), 47);

        let response = stripper.rewrite_response(parts, Bytes::from_static(PREFIX.as_bytes()));

        assert_eq!(response.headers()[CONTENT_LENGTH], "0");
    }
}
