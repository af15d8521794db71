use axum::http::{request::Parts, HeaderValue};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// An allowed origin, possibly containing `*` wildcards
/// (e.g. `https://frontend-*.vercel.app` for preview deployments).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPattern {
    pieces: Vec<String>,
}

impl OriginPattern {
    pub fn parse(pattern: &str) -> Self {
        Self {
            pieces: pattern.split('*').map(str::to_string).collect(),
        }
    }

    pub fn matches(&self, origin: &str) -> bool {
        let Some((first, rest)) = self.pieces.split_first() else {
            return false;
        };
        let Some((last, middle)) = rest.split_last() else {
            return origin == first;
        };
        let Some(mut remaining) = origin.strip_prefix(first.as_str()) else {
            return false;
        };
        for piece in middle {
            match remaining.find(piece.as_str()) {
                Some(idx) => remaining = &remaining[idx + piece.len()..],
                None => return false,
            }
        }
        remaining.ends_with(last.as_str())
    }
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let patterns: Vec<OriginPattern> = origins.iter().map(|o| OriginPattern::parse(o)).collect();
    layer.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|origin| patterns.iter().any(|p| p.matches(origin)))
                .unwrap_or(false)
        },
    ))
}
