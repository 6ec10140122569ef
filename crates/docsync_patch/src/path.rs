//! Document paths.
//!
//! A path addresses a location inside a nested JSON document using
//! dot-separated keys and bracketed indexes: `profile.tags[2].name`.
//! A literal dot inside a key is escaped with a backslash
//! (`settings.ui\.theme` addresses the key `ui.theme`).

use crate::error::{PatchError, PatchResult};
use std::fmt;

/// One step of a document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

/// A parsed document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    segments: Vec<Segment>,
}

impl DocPath {
    /// Parses a dotted/bracketed path string.
    pub fn parse(raw: &str) -> PatchResult<Self> {
        if raw.is_empty() {
            return Err(PatchError::invalid_path(raw, "path is empty"));
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut has_current = false;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => {
                        current.push(escaped);
                        has_current = true;
                    }
                    None => {
                        return Err(PatchError::invalid_path(raw, "dangling escape"));
                    }
                },
                '.' => {
                    if !has_current {
                        // Allowed after a `]`: `tags[0].name`.
                        if !matches!(segments.last(), Some(Segment::Index(_))) {
                            return Err(PatchError::invalid_path(raw, "empty path segment"));
                        }
                    } else {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                        has_current = false;
                    }
                }
                '[' => {
                    if has_current {
                        segments.push(Segment::Key(std::mem::take(&mut current)));
                        has_current = false;
                    } else if segments.is_empty() {
                        return Err(PatchError::invalid_path(raw, "path starts with an index"));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            Some(other) => {
                                return Err(PatchError::invalid_path(
                                    raw,
                                    format!("unexpected `{other}` in index"),
                                ));
                            }
                            None => {
                                return Err(PatchError::invalid_path(raw, "unclosed index"));
                            }
                        }
                    }
                    let index: usize = digits
                        .parse()
                        .map_err(|_| PatchError::invalid_path(raw, "empty index"))?;
                    segments.push(Segment::Index(index));
                }
                other => {
                    current.push(other);
                    has_current = true;
                }
            }
        }

        if has_current {
            segments.push(Segment::Key(current));
        } else if !matches!(segments.last(), Some(Segment::Index(_))) {
            return Err(PatchError::invalid_path(raw, "trailing dot"));
        }

        Ok(Self { segments })
    }

    /// Returns the path segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the final segment.
    pub fn leaf(&self) -> &Segment {
        self.segments
            .last()
            .expect("DocPath::parse rejects empty paths")
    }

    /// Splits the path into its parent segments and the leaf segment.
    pub fn split_leaf(&self) -> (&[Segment], &Segment) {
        let (leaf, parents) = self
            .segments
            .split_last()
            .expect("DocPath::parse rejects empty paths");
        (parents, leaf)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    for c in key.chars() {
                        if c == '.' || c == '\\' || c == '[' {
                            write!(f, "\\")?;
                        }
                        write!(f, "{c}")?;
                    }
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_key() {
        let path = DocPath::parse("name").unwrap();
        assert_eq!(path.segments(), &[Segment::Key("name".into())]);
    }

    #[test]
    fn nested_keys() {
        let path = DocPath::parse("profile.address.city").unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.leaf(), &Segment::Key("city".into()));
    }

    #[test]
    fn indexed_path() {
        let path = DocPath::parse("tags[2].name").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("tags".into()),
                Segment::Index(2),
                Segment::Key("name".into()),
            ]
        );
    }

    #[test]
    fn trailing_index() {
        let path = DocPath::parse("items[0]").unwrap();
        assert_eq!(
            path.segments(),
            &[Segment::Key("items".into()), Segment::Index(0)]
        );
    }

    #[test]
    fn escaped_dot_is_a_literal() {
        let path = DocPath::parse("settings.ui\\.theme").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("settings".into()),
                Segment::Key("ui.theme".into()),
            ]
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(DocPath::parse("").is_err());
        assert!(DocPath::parse(".leading").is_err());
        assert!(DocPath::parse("trailing.").is_err());
        assert!(DocPath::parse("a..b").is_err());
        assert!(DocPath::parse("a[").is_err());
        assert!(DocPath::parse("a[x]").is_err());
        assert!(DocPath::parse("a\\").is_err());
        assert!(DocPath::parse("[0]").is_err());
    }

    #[test]
    fn display_roundtrip() {
        for raw in ["name", "a.b.c", "tags[2].name", "settings.ui\\.theme", "items[0]"] {
            let path = DocPath::parse(raw).unwrap();
            let shown = path.to_string();
            assert_eq!(DocPath::parse(&shown).unwrap(), path, "roundtrip of {raw}");
        }
    }
}
