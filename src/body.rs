use std::pin::Pin;
use std::task::{Context, Poll};

use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Body as HttpBody, Bytes, Frame};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A body type for both requests and responses.
///
/// This is a thin, type-erased wrapper so that the rest of the crate can pass
/// request and response bodies around without being generic over the
/// underlying `http_body::Body` implementation (hyper's incoming body on the
/// request side, buffered content on the response side).
#[derive(Debug)]
pub struct Body {
    inner: BoxBody<Bytes, BoxError>,
}

impl Body {
    /// Create an empty body.
    pub fn empty() -> Self {
        let inner = http_body_util::Empty::new()
            .map_err(|never| match never {})
            .boxed();
        Body { inner }
    }

    /// Create a body with content from a specific buffer.
    pub fn with_content(buf: impl Into<Bytes>) -> Self {
        let inner = http_body_util::Full::new(buf.into())
            .map_err(|never| match never {})
            .boxed();
        Body { inner }
    }

    /// Wrap any http body as a turnstile `Body`.
    pub fn wrap<B>(under: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let inner = under.map_err(Into::into).boxed();
        Body { inner }
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Body {
        Body::with_content(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(s: Vec<u8>) -> Body {
        Body::with_content(s)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Body {
        Body::with_content(s)
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Body {
        Body::with_content(s)
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = BoxError;

    #[inline]
    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    #[inline]
    fn size_hint(&self) -> hyper::body::SizeHint {
        self.inner.size_hint()
    }

    #[inline]
    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}
