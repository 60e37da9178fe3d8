//! Resource and action matching.
//!
//! Resource patterns are `/`-separated paths where
//!
//! - a literal segment must match exactly,
//! - `:name` matches any one non-empty segment,
//! - `*` as the last segment matches one or more remaining segments
//!   (so `/admin/*` covers `/admin/users` and `/admin/` but not `/admin`).
//!
//! Paths may themselves be route templates (`/notes/:id`), which match
//! a pattern with the same shape.

/// Returns `true` if `path` is covered by `pattern`.
pub fn resource_matches(pattern: &str, path: &str) -> bool {
    let mut want = pattern.split('/').peekable();
    let mut have = path.split('/');

    loop {
        match (want.next(), have.next()) {
            (Some("*"), Some(_)) if want.peek().is_none() => return true,
            (Some(p), Some(s)) => {
                let ok = match p.strip_prefix(':') {
                    Some(_) => !s.is_empty(),
                    None => (p == "*" && !s.is_empty()) || p == s,
                };
                if !ok {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Returns `true` if `action` is covered by `pattern`: `*` matches
/// anything, otherwise a case-insensitive comparison.
pub fn action_matches(pattern: &str, action: &str) -> bool {
    pattern == "*" || pattern.eq_ignore_ascii_case(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_matches_exact() {
        assert!(resource_matches("/notes", "/notes"));
        assert!(!resource_matches("/notes", "/notes/1"));
        assert!(!resource_matches("/notes", "/media"));
    }

    #[test]
    fn test_resource_matches_param_segment() {
        assert!(resource_matches("/notes/:id", "/notes/42"));
        assert!(resource_matches("/notes/:id", "/notes/:id"));
        assert!(!resource_matches("/notes/:id", "/notes/"));
        assert!(!resource_matches("/notes/:id", "/notes"));
        assert!(!resource_matches("/notes/:id", "/notes/42/edit"));
    }

    #[test]
    fn test_resource_matches_trailing_wildcard() {
        assert!(resource_matches("/admin/*", "/admin/users"));
        assert!(resource_matches("/admin/*", "/admin/users/7/activate"));
        assert!(resource_matches("/admin/*", "/admin/"));
        assert!(!resource_matches("/admin/*", "/admin"));
        assert!(!resource_matches("/admin/*", "/administrator/x"));
    }

    #[test]
    fn test_resource_matches_inner_wildcard_is_one_segment() {
        assert!(resource_matches("/users/*/notes", "/users/7/notes"));
        assert!(!resource_matches("/users/*/notes", "/users/7/8/notes"));
    }

    #[test]
    fn test_action_matches_case_insensitive_and_wildcard() {
        assert!(action_matches("GET", "get"));
        assert!(action_matches("*", "DELETE"));
        assert!(!action_matches("GET", "POST"));
    }
}
