//! Name predicates for [`Pipeline::with_name_filter`](crate::Pipeline::with_name_filter).
//!
//! Each takes the source-relative path (forward slashes).

use globset::{GlobBuilder, GlobMatcher};

/// True when the path ends with any of `suffixes`.
pub fn ends_with<I, S>(suffixes: I, case_sensitive: bool) -> impl Fn(&str) -> bool + 'static
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let suffixes: Vec<String> = suffixes
        .into_iter()
        .map(Into::into)
        .map(|s: String| if case_sensitive { s } else { s.to_lowercase() })
        .collect();

    move |path: &str| {
        if case_sensitive {
            suffixes.iter().any(|s| path.ends_with(s.as_str()))
        } else {
            let path = path.to_lowercase();
            suffixes.iter().any(|s| path.ends_with(s.as_str()))
        }
    }
}

/// Normalize a glob pattern for matching against relative paths.
///
/// Empty or `*` matches everything, leading slashes are dropped, and a
/// pattern without a separator matches at any depth.
pub fn normalize_glob_pattern(raw: &str) -> String {
    let mut pattern = raw.trim().trim_start_matches('/').to_string();

    if pattern.is_empty() || pattern == "*" {
        pattern = "**/*".to_string();
    }

    if !pattern.contains('/') && !pattern.starts_with("**/") {
        pattern = format!("**/{}", pattern);
    }

    pattern
}

fn build_matcher(raw: &str) -> Result<GlobMatcher, globset::Error> {
    GlobBuilder::new(&normalize_glob_pattern(raw))
        .case_insensitive(true)
        .build()
        .map(|g| g.compile_matcher())
}

/// Case-insensitive glob match.
pub fn glob(pattern: &str) -> Result<impl Fn(&str) -> bool + 'static, globset::Error> {
    let matcher = build_matcher(pattern)?;
    Ok(move |path: &str| matcher.is_match(path.trim_start_matches('/')))
}
