//! Path matching for protected resource templates.
//!
//! Templates support literal segments, `{param}` placeholders and a
//! trailing `/*` wildcard. Matching is deterministic: exact literal paths
//! outrank templates, longer static prefixes outrank shorter ones,
//! method-specific configs outrank method-agnostic ones, and
//! configuration order breaks any remaining tie.

use crate::config::PathConfig;

/// A path template compiled for matching.
#[derive(Debug, Clone)]
struct CompiledPath {
    config: PathConfig,
    segments: Vec<Segment>,
    /// Trailing `/*` consumes any remainder.
    wildcard: bool,
    /// All-literal template with no wildcard.
    is_exact: bool,
    /// Byte length of the leading literal portion, used for ranking.
    static_prefix_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// Immutable matching table built once from configuration.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    entries: Vec<CompiledPath>,
}

impl PathMatcher {
    pub fn new(paths: &[PathConfig]) -> Self {
        let entries = paths
            .iter()
            .map(|config| compile(config.clone()))
            .collect();
        Self { entries }
    }

    /// All configs matching the request, most specific first.
    pub fn candidates(&self, method: &str, path: &str) -> Vec<&PathConfig> {
        let mut matched: Vec<&CompiledPath> = self
            .entries
            .iter()
            .filter(|entry| entry.config.applies_to_method(method) && entry.matches(path))
            .collect();

        // Stable sort keeps configuration order as the final tie-break.
        matched.sort_by_key(|entry| {
            std::cmp::Reverse((
                entry.is_exact,
                entry.static_prefix_len,
                !entry.config.methods.is_empty(),
            ))
        });

        matched.into_iter().map(|entry| &entry.config).collect()
    }

    /// The single most specific match, if any.
    pub fn best(&self, method: &str, path: &str) -> Option<&PathConfig> {
        self.candidates(method, path).into_iter().next()
    }
}

impl CompiledPath {
    fn matches(&self, path: &str) -> bool {
        if self.is_exact {
            return self.config.path == path;
        }

        let mut segments = path.trim_start_matches('/').split('/');
        for expected in &self.segments {
            let Some(actual) = segments.next() else {
                return false;
            };
            match expected {
                Segment::Literal(lit) if lit != actual => return false,
                _ => {}
            }
        }

        // A wildcard swallows whatever is left; otherwise the request
        // must be fully consumed.
        self.wildcard || segments.next().is_none()
    }
}

fn compile(config: PathConfig) -> CompiledPath {
    let template = config.path.clone();
    let (template, wildcard) = match template.strip_suffix("/*") {
        Some(prefix) => (prefix.to_string(), true),
        None => (template, false),
    };

    let segments: Vec<Segment> = template
        .trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with('{') && s.ends_with('}') {
                Segment::Param
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect();

    let is_exact = !wildcard && segments.iter().all(|s| matches!(s, Segment::Literal(_)));

    let static_prefix_len = config
        .path
        .find(['{', '*'])
        .map(|pos| config.path[..pos].trim_end_matches('/').len())
        .unwrap_or(config.path.len());

    CompiledPath {
        config,
        segments,
        wildcard,
        is_exact,
        static_prefix_len,
    }
}
