//! JSON pointer paths (RFC 6901) addressing locations inside a snapshot.

use crate::error::PatchError;

/// Escape a single reference token (`~` becomes `~0`, `/` becomes `~1`).
pub fn escape(token: &str) -> String {
    if !token.contains(['~', '/']) {
        return token.to_string();
    }
    token.replace('~', "~0").replace('/', "~1")
}

/// Append one token to a pointer.
pub fn child(parent: &str, token: &str) -> String {
    let mut path = String::with_capacity(parent.len() + token.len() + 1);
    path.push_str(parent);
    path.push('/');
    path.push_str(&escape(token));
    path
}

/// Split a pointer into unescaped tokens. The empty pointer is the root.
pub fn parse(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(path.to_string()));
    };

    rest.split('/')
        .map(|token| unescape(token).ok_or_else(|| PatchError::InvalidPointer(path.to_string())))
        .collect()
}

fn unescape(token: &str) -> Option<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();

    while let Some(ch) = chars.next() {
        if ch == '~' {
            match chars.next()? {
                '0' => out.push('~'),
                '1' => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(ch);
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_escapes() {
        assert_eq!(child("", "a"), "/a");
        assert_eq!(child("/a", "b/c"), "/a/b~1c");
        assert_eq!(child("/a", "~x"), "/a/~0x");
    }

    #[test]
    fn test_parse_round_trips_escapes() {
        assert_eq!(parse("").unwrap(), Vec::<String>::new());
        assert_eq!(parse("/a/b~1c/~0x").unwrap(), vec!["a", "b/c", "~x"]);
        assert_eq!(parse("/").unwrap(), vec![""]);
    }

    #[test]
    fn test_parse_rejects_bad_pointers() {
        assert!(parse("a/b").is_err());
        assert!(parse("/a~2").is_err());
        assert!(parse("/a~").is_err());
    }
}
