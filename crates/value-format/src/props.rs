use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("segment {0:?} has no '='")]
    MissingSeparator(String),
    #[error("segment {0:?} has an empty key")]
    EmptyKey(String),
    #[error("dangling escape at end of input")]
    TrailingEscape,
}

impl PropertyError {
    /// The text the error refers to.
    pub fn segment(&self) -> &str {
        match self {
            PropertyError::MissingSeparator(s) | PropertyError::EmptyKey(s) => s,
            PropertyError::TrailingEscape => "\\",
        }
    }
}

/// Ordered `key=value` mapping parsed from a property string.
///
/// Grammar: pairs separated by `;`, key and value separated by the first `=`,
/// surrounding whitespace trimmed, empty segments ignored, and a backslash
/// escaping the next character. A repeated key keeps its first position and
/// takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    pairs: Vec<(String, String)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromStr for Properties {
    type Err = PropertyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_properties(s)
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", escape(k), escape(v))?;
        }
        Ok(())
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, ';' | '=' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Default)]
struct Segment {
    key: String,
    value: String,
    raw: String,
    has_separator: bool,
}

impl Segment {
    fn push(&mut self, c: char) {
        if self.has_separator {
            self.value.push(c);
        } else {
            self.key.push(c);
        }
    }

    fn finish(self, props: &mut Properties) -> Result<(), PropertyError> {
        let key = self.key.trim();
        if !self.has_separator {
            if key.is_empty() {
                return Ok(());
            }
            return Err(PropertyError::MissingSeparator(self.raw.trim().to_string()));
        }
        if key.is_empty() {
            return Err(PropertyError::EmptyKey(self.raw.trim().to_string()));
        }
        props.insert(key, self.value.trim());
        Ok(())
    }
}

pub fn parse_properties(s: &str) -> Result<Properties, PropertyError> {
    let mut props = Properties::new();
    let mut seg = Segment::default();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or(PropertyError::TrailingEscape)?;
                seg.raw.push(c);
                seg.raw.push(escaped);
                seg.push(escaped);
            }
            ';' => std::mem::take(&mut seg).finish(&mut props)?,
            '=' if !seg.has_separator => {
                seg.raw.push(c);
                seg.has_separator = true;
            }
            _ => {
                seg.raw.push(c);
                seg.push(c);
            }
        }
    }
    seg.finish(&mut props)?;
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ordered_pairs() {
        let p = parse_properties(" label = Volt ; numerator=1;denominator = 10 ").unwrap();
        let pairs: Vec<_> = p.iter().collect();
        assert_eq!(
            pairs,
            vec![("label", "Volt"), ("numerator", "1"), ("denominator", "10")]
        );
        assert_eq!(p.get_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn empty_segments_are_ignored() {
        let p = parse_properties(";;a=1;; ;").unwrap();
        assert_eq!(p.len(), 1);
        assert!(parse_properties("").unwrap().is_empty());
    }

    #[test]
    fn value_may_contain_equals_and_escapes() {
        let p = parse_properties(r"expr=a=b;sep=x\;y;path=c:\\tmp").unwrap();
        assert_eq!(p.get("expr"), Some("a=b"));
        assert_eq!(p.get("sep"), Some("x;y"));
        assert_eq!(p.get("path"), Some(r"c:\tmp"));
    }

    #[test]
    fn duplicate_keys_keep_position_take_last_value() {
        let p = parse_properties("a=1;b=2;a=3").unwrap();
        let pairs: Vec<_> = p.iter().collect();
        assert_eq!(pairs, vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn rejects_malformed_segments() {
        assert_eq!(
            parse_properties("a=1;oops"),
            Err(PropertyError::MissingSeparator("oops".into()))
        );
        assert_eq!(
            parse_properties("=1"),
            Err(PropertyError::EmptyKey("=1".into()))
        );
        assert_eq!(parse_properties("a=1\\"), Err(PropertyError::TrailingEscape));
    }

    #[test]
    fn display_escapes_and_reparses() {
        let mut p = Properties::new();
        p.insert("fmt", "%d;x");
        p.insert("k", "a=b");
        let text = p.to_string();
        assert_eq!(text, r"fmt=%d\;x;k=a\=b");
        assert_eq!(text.parse::<Properties>().unwrap(), p);
        assert_eq!(p.remove("fmt").as_deref(), Some("%d;x"));
        assert_eq!(p.len(), 1);
    }
}
