//! Route templates.
//!
//! A template such as `/rooms/:room/users/:user` is made of literal segments
//! and `:name` parameter segments. A parameter matches exactly one non-empty
//! segment. Matching is case-sensitive, anchored at both ends, and allows a
//! single trailing slash.

use std::collections::BTreeMap;
use std::collections::HashSet;

use regex::Regex;

use crate::error::RouteError;

/// Parameter values bound by a successful match, keyed by parameter name.
pub type Params = BTreeMap<String, String>;

/// A compiled route template.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    template: String,
    regex: Regex,
    names: Vec<String>,
}

impl RouteMatcher {
    /// Compile a template, rejecting empty or duplicated parameter names.
    pub fn compile(template: &str) -> Result<Self, RouteError> {
        if !template.starts_with('/') {
            return Err(RouteError::NotAbsolute(template.to_string()));
        }

        let body = template.strip_suffix('/').unwrap_or(template);
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut pattern = String::from("^");

        // `body` starts with '/', so the first split item is always empty.
        for segment in body.split('/').skip(1) {
            pattern.push('/');
            match segment.strip_prefix(':') {
                Some("") => {
                    return Err(RouteError::EmptyParam {
                        template: template.to_string(),
                    })
                }
                Some(name) => {
                    if !seen.insert(name) {
                        return Err(RouteError::DuplicateParam {
                            template: template.to_string(),
                            name: name.to_string(),
                        });
                    }
                    names.push(name.to_string());
                    pattern.push_str("([^/]+)");
                }
                None => pattern.push_str(&regex::escape(segment)),
            }
        }

        if body.is_empty() {
            pattern.push_str("/$");
        } else {
            pattern.push_str("/?$");
        }

        let regex = Regex::new(&pattern).map_err(|e| RouteError::Compile {
            template: template.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
            names,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// The anchored pattern that selects this template for concrete paths.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> &[String] {
        &self.names
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match a concrete path, returning its parameters or `None` when the
    /// path does not fit this template.
    pub fn extract(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        let params = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                captures
                    .get(i + 1)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect();
        Some(params)
    }
}

/// The registry key for a concrete path: one trailing slash is dropped so
/// `/count` and `/count/` share a channel.
pub fn channel_key(path: &str) -> String {
    match path.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => path.to_string(),
    }
}
