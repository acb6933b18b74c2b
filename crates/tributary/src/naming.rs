//! Destination naming.
//!
//! A [`Namer`] maps a source-relative path to a destination-relative path.
//! Returning `None` (or an empty string) marks the input as unnameable.

use std::fmt;
use std::path::Path;

type SimpleFn = Box<dyn Fn(&str) -> Option<String>>;
type WithSourceFn = Box<dyn Fn(&str, &Path) -> Option<String>>;

/// Naming function, tagged by the arguments it takes.
pub enum Namer {
    /// Sees only the source-relative path.
    Simple(SimpleFn),
    /// Sees the source-relative path and the absolute source path, for names
    /// that depend on file contents or metadata.
    WithSource(WithSourceFn),
}

impl Namer {
    pub fn simple(f: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Namer::Simple(Box::new(f))
    }

    pub fn with_source(f: impl Fn(&str, &Path) -> Option<String> + 'static) -> Self {
        Namer::WithSource(Box::new(f))
    }

    /// Output mirrors the source layout.
    pub fn identity() -> Self {
        Namer::simple(|rel| Some(rel.to_string()))
    }

    /// Output name is the source path with its separators removed, so
    /// `2024/01/a.csv` becomes `202401a.csv` at the destination root.
    pub fn flatten() -> Self {
        Namer::simple(|rel| Some(rel.replace('/', "")))
    }

    /// Destination-relative name for a candidate, or `None` if it has none.
    pub fn resolve(&self, relative: &str, absolute: &Path) -> Option<String> {
        let name = match self {
            Namer::Simple(f) => f(relative),
            Namer::WithSource(f) => f(relative, absolute),
        }?;
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }
}

impl Default for Namer {
    fn default() -> Self {
        Namer::identity()
    }
}

impl fmt::Debug for Namer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namer::Simple(_) => f.write_str("Namer::Simple"),
            Namer::WithSource(_) => f.write_str("Namer::WithSource"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_default() {
        let namer = Namer::default();
        assert_eq!(namer.resolve("a/b.txt", Path::new("/src/a/b.txt")), Some("a/b.txt".into()));
    }

    #[test]
    fn test_flatten() {
        assert_eq!(
            Namer::flatten().resolve("01/20.aa", Path::new("/src/01/20.aa")),
            Some("0120.aa".into())
        );
    }

    #[test]
    fn test_empty_name_is_unnameable() {
        let namer = Namer::simple(|rel| if rel.ends_with(".skip") { Some(String::new()) } else { None });
        assert_eq!(namer.resolve("x.skip", Path::new("/x.skip")), None);
        assert_eq!(namer.resolve("x.txt", Path::new("/x.txt")), None);
    }

    #[test]
    fn test_with_source_sees_absolute_path() {
        let namer = Namer::with_source(|rel, abs| {
            let parent = abs.parent()?.file_name()?.to_str()?;
            Some(format!("{}-{}", parent, rel.rsplit('/').next()?))
        });
        assert_eq!(
            namer.resolve("b/c.txt", Path::new("/data/b/c.txt")),
            Some("b-c.txt".into())
        );
    }
}
