//! Response handling.
//!
//! Backend responses are streamed back unchanged apart from hop-by-hop
//! headers. Forwarding failures become gateway-class responses through
//! `ForwardError`'s `IntoResponse`.

use axum::body::Body;
use axum::response::Response;
use futures_util::{stream, StreamExt};
use hyper::body::Incoming;
use tokio_util::sync::CancellationToken;

use crate::error::ForwardError;
use crate::http::request::strip_hop_by_hop;

/// Convert a backend response into the response sent to the client.
///
/// With a context, the body stream ends in an error once the context is
/// cancelled, so a long or stalled body cannot outlive the server.
pub fn from_upstream(response: hyper::Response<Incoming>, context: Option<&CancellationToken>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    let body = match context {
        Some(token) => bind_body(Body::new(body), token.clone()),
        None => Body::new(body),
    };
    Response::from_parts(parts, body)
}

fn bind_body(body: Body, token: CancellationToken) -> Body {
    let chunks = stream::unfold((body.into_data_stream(), token, false), |(mut data, token, done)| async move {
        if done {
            return None;
        }
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            chunk = data.next() => Some(chunk),
        };
        match next {
            None => Some((Err(axum::Error::new(ForwardError::Cancelled)), (data, token, true))),
            Some(Some(chunk)) => Some((chunk, (data, token, false))),
            Some(None) => None,
        }
    });
    Body::from_stream(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bound_body_fails_after_cancellation() {
        let token = CancellationToken::new();
        let pending = stream::iter([Ok::<_, std::io::Error>("partial")]).chain(stream::pending());
        let body = bind_body(Body::from_stream(pending), token.clone());

        let mut data = body.into_data_stream();
        assert_eq!(&data.next().await.unwrap().unwrap()[..], b"partial");

        token.cancel();
        assert!(data.next().await.unwrap().is_err());
        assert!(data.next().await.is_none());
    }

    #[tokio::test]
    async fn bound_body_passes_through_when_not_cancelled() {
        let token = CancellationToken::new();
        let body = bind_body(Body::from("complete"), token);

        let bytes = axum::body::to_bytes(body, 1024).await.unwrap();
        assert_eq!(&bytes[..], b"complete");
    }
}
