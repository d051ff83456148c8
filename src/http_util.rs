//! General-purpose HTTP-related facilities

/// header name for conveying request ids ("x-request-id")
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// MIME type for structured (JSON) bodies
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// MIME type for plain-text scalar bodies
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// MIME type for the documentation page
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";

/// Strips any parameters (e.g., `; charset=utf-8`) and surrounding whitespace
/// from a `Content-Type` header value and lowercases the media type itself.
///
/// RFC 7231 §3.1.1.1: media types are case insensitive and may be followed by
/// whitespace and/or a parameter, which we ignore.
pub(crate) fn media_type_of(content_type: &str) -> String {
    let end = content_type.find(';').unwrap_or(content_type.len());
    content_type[..end].trim().to_lowercase()
}

#[cfg(test)]
mod test {
    use super::media_type_of;

    #[test]
    fn test_media_type_of() {
        assert_eq!(media_type_of("application/json"), "application/json");
        assert_eq!(
            media_type_of("Application/JSON; charset=utf-8"),
            "application/json"
        );
        assert_eq!(media_type_of(" text/plain "), "text/plain");
    }
}
