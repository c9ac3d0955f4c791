//! Route resolution for provider prefixes.
//!
//! # Responsibilities
//! - Map an inbound path prefix to the upstream URL it proxies to
//! - Select the subset of inbound headers each provider requires
//! - Decide whether the call is streamed (body `stream` flag, or URL
//!   operation for Gemini)
//!
//! # Design Decisions
//! - Pure functions over the immutable upstream config; no state
//! - Bodies are never interpreted beyond the `stream` flag
//! - Unknown prefixes are an explicit error, never a silent default

use axum::http::HeaderMap;
use thiserror::Error;

use crate::config::UpstreamConfig;

/// A resolved upstream target for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    /// Fully-qualified upstream URL.
    pub upstream_url: String,

    /// Headers to forward, in insertion order.
    pub headers: Vec<(String, String)>,

    /// Whether the upstream response is relayed as an event stream.
    pub streaming: bool,
}

/// Errors produced while classifying an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The request carried no body where one is required.
    #[error("empty body")]
    EmptyBody,

    /// The path matches no configured provider prefix.
    #[error("no upstream configured for path {0}")]
    UnknownPrefix(String),

    /// A Gemini path without the `{model}:{operation}` segment.
    #[error("malformed model path: {0}")]
    MalformedModelPath(String),
}

/// Resolve a chat/generation request to its upstream target.
///
/// `query` is the raw inbound query string; for Gemini the `key` parameter is
/// propagated to the upstream URL. The body is only inspected for the
/// top-level `stream` flag and is otherwise forwarded untouched.
pub fn resolve_chat(
    upstreams: &UpstreamConfig,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<RouteTarget, ResolveError> {
    if body.is_empty() {
        return Err(ResolveError::EmptyBody);
    }

    if path.starts_with("/openai") {
        Ok(RouteTarget {
            upstream_url: format!("{}/chat/completions", upstreams.openai),
            headers: forward_headers(headers, &["authorization"]),
            streaming: body_stream_flag(body),
        })
    } else if path.starts_with("/openrouter") {
        Ok(RouteTarget {
            upstream_url: format!("{}/chat/completions", upstreams.openrouter),
            headers: forward_headers(headers, &["authorization"]),
            streaming: body_stream_flag(body),
        })
    } else if path.starts_with("/cerebras") {
        Ok(RouteTarget {
            upstream_url: format!("{}/chat/completions", upstreams.cerebras),
            headers: forward_headers(headers, &["authorization"]),
            streaming: body_stream_flag(body),
        })
    } else if path.starts_with("/anthropic") {
        Ok(RouteTarget {
            upstream_url: format!("{}/messages", upstreams.anthropic),
            headers: forward_headers(headers, &["x-api-key", "anthropic-version"]),
            streaming: body_stream_flag(body),
        })
    } else if path.starts_with("/google") {
        resolve_google(upstreams, path, query)
    } else {
        Err(ResolveError::UnknownPrefix(path.to_string()))
    }
}

/// Resolve a models-listing request (GET, no body) to its upstream target.
pub fn resolve_models(
    upstreams: &UpstreamConfig,
    path: &str,
    headers: &HeaderMap,
) -> Result<RouteTarget, ResolveError> {
    let (base, names): (&str, &[&str]) = if path.starts_with("/openai") {
        (&upstreams.openai, &["authorization"])
    } else if path.starts_with("/openrouter") {
        (&upstreams.openrouter, &["authorization"])
    } else if path.starts_with("/cerebras") {
        (&upstreams.cerebras, &[])
    } else if path.starts_with("/anthropic") {
        (&upstreams.anthropic, &["x-api-key", "anthropic-version"])
    } else {
        return Err(ResolveError::UnknownPrefix(path.to_string()));
    };

    Ok(RouteTarget {
        upstream_url: format!("{}/models", base),
        headers: forward_headers(headers, names),
        streaming: false,
    })
}

/// Gemini paths end in `{model}:generateContent` or
/// `{model}:streamGenerateContent`; the operation picks the transport.
fn resolve_google(
    upstreams: &UpstreamConfig,
    path: &str,
    query: Option<&str>,
) -> Result<RouteTarget, ResolveError> {
    let model_segment = path.rsplit('/').next().unwrap_or_default();
    let Some((model, _operation)) = model_segment.split_once(':') else {
        return Err(ResolveError::MalformedModelPath(path.to_string()));
    };
    if model.is_empty() {
        return Err(ResolveError::MalformedModelPath(path.to_string()));
    }

    let key = query.and_then(query_key);
    let streaming = path.ends_with("streamGenerateContent");

    let mut upstream_url = if streaming {
        format!("{}{}:streamGenerateContent?alt=sse", upstreams.gemini, model)
    } else {
        format!("{}{}:generateContent", upstreams.gemini, model)
    };
    if let Some(key) = key {
        let sep = if upstream_url.contains('?') { '&' } else { '?' };
        upstream_url.push(sep);
        upstream_url.push_str("key=");
        upstream_url.push_str(&key);
    }

    // Gemini authenticates via the key query parameter; no headers forwarded.
    Ok(RouteTarget {
        upstream_url,
        headers: Vec::new(),
        streaming,
    })
}

/// Coarse provider label for logs and metrics (bounded cardinality).
pub fn provider_label(path: &str) -> &'static str {
    if path.starts_with("/openai") {
        "openai"
    } else if path.starts_with("/openrouter") {
        "openrouter"
    } else if path.starts_with("/cerebras") {
        "cerebras"
    } else if path.starts_with("/anthropic") {
        "anthropic"
    } else if path.starts_with("/google") {
        "google"
    } else {
        "unknown"
    }
}

/// Extract the `key` query parameter.
fn query_key(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == "key")
        .map(|(_, value)| value.into_owned())
}

/// Read the top-level `stream` flag from an opaque JSON body.
/// A body that is not valid JSON passes through as non-streaming; the
/// upstream is the authority on rejecting it.
fn body_stream_flag(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("stream").and_then(|s| s.as_bool()))
        .unwrap_or(false)
}

/// Copy the named inbound headers, preserving order, skipping absent ones.
fn forward_headers(headers: &HeaderMap, names: &[&str]) -> Vec<(String, String)> {
    names
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn upstreams() -> UpstreamConfig {
        UpstreamConfig::default()
    }

    fn auth_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer sk-test"));
        headers
    }

    #[test]
    fn test_openai_streaming() {
        let target = resolve_chat(
            &upstreams(),
            "/openai/v1/chat/completions",
            None,
            &auth_headers(),
            br#"{"model":"gpt-4o","stream":true}"#,
        )
        .unwrap();
        assert_eq!(
            target.upstream_url,
            "https://api.openai.com/v1/chat/completions"
        );
        assert!(target.streaming);
        assert_eq!(
            target.headers,
            vec![("authorization".to_string(), "Bearer sk-test".to_string())]
        );
    }

    #[test]
    fn test_openai_unary_when_stream_absent() {
        let target = resolve_chat(
            &upstreams(),
            "/openai/v1/chat/completions",
            None,
            &auth_headers(),
            br#"{"model":"gpt-4o"}"#,
        )
        .unwrap();
        assert!(!target.streaming);
    }

    #[test]
    fn test_openrouter_and_cerebras() {
        for (path, base) in [
            ("/openrouter/v1/chat/completions", "https://openrouter.ai/api/v1"),
            ("/cerebras/v1/chat/completions", "https://api.cerebras.ai/v1"),
        ] {
            let target =
                resolve_chat(&upstreams(), path, None, &auth_headers(), br#"{"stream":false}"#)
                    .unwrap();
            assert_eq!(target.upstream_url, format!("{}/chat/completions", base));
            assert!(!target.streaming);
        }
    }

    #[test]
    fn test_anthropic_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("sk-ant"));
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        headers.insert("authorization", HeaderValue::from_static("ignored"));

        let target = resolve_chat(
            &upstreams(),
            "/anthropic/v1/messages",
            None,
            &headers,
            br#"{"stream":true}"#,
        )
        .unwrap();
        assert_eq!(target.upstream_url, "https://api.anthropic.com/v1/messages");
        assert_eq!(
            target.headers,
            vec![
                ("x-api-key".to_string(), "sk-ant".to_string()),
                ("anthropic-version".to_string(), "2023-06-01".to_string()),
            ]
        );
    }

    #[test]
    fn test_google_stream_generate_content() {
        let target = resolve_chat(
            &upstreams(),
            "/google/v1beta/models/gemini-2.0-flash:streamGenerateContent",
            Some("key=AIza123"),
            &HeaderMap::new(),
            br#"{"contents":[]}"#,
        )
        .unwrap();
        assert!(target.streaming);
        assert_eq!(
            target.upstream_url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse&key=AIza123"
        );
        assert!(target.headers.is_empty());
    }

    #[test]
    fn test_google_generate_content() {
        let target = resolve_chat(
            &upstreams(),
            "/google/v1beta/models/gemini-2.0-flash:generateContent",
            Some("key=AIza123"),
            &HeaderMap::new(),
            br#"{"contents":[]}"#,
        )
        .unwrap();
        assert!(!target.streaming);
        assert_eq!(
            target.upstream_url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent?key=AIza123"
        );
    }

    #[test]
    fn test_google_missing_operation() {
        let err = resolve_chat(
            &upstreams(),
            "/google/v1beta/models/gemini-2.0-flash",
            None,
            &HeaderMap::new(),
            br#"{}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::MalformedModelPath(_)));
    }

    #[test]
    fn test_empty_body() {
        let err = resolve_chat(
            &upstreams(),
            "/openai/v1/chat/completions",
            None,
            &auth_headers(),
            b"",
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::EmptyBody);
    }

    #[test]
    fn test_unknown_prefix() {
        let err = resolve_chat(
            &upstreams(),
            "/mistral/v1/chat/completions",
            None,
            &auth_headers(),
            br#"{}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::UnknownPrefix(_)));
    }

    #[test]
    fn test_models_targets() {
        let target =
            resolve_models(&upstreams(), "/openai/v1/models", &auth_headers()).unwrap();
        assert_eq!(target.upstream_url, "https://api.openai.com/v1/models");
        assert!(!target.streaming);
        assert_eq!(target.headers.len(), 1);

        let target = resolve_models(&upstreams(), "/cerebras/v1/models", &auth_headers()).unwrap();
        assert_eq!(target.upstream_url, "https://api.cerebras.ai/v1/models");
        assert!(target.headers.is_empty());
    }

    #[test]
    fn test_missing_auth_header_skipped() {
        let target = resolve_chat(
            &upstreams(),
            "/openai/v1/chat/completions",
            None,
            &HeaderMap::new(),
            br#"{"stream":true}"#,
        )
        .unwrap();
        assert!(target.headers.is_empty());
    }
}
