use core::fmt;
use serde::{Serialize, Serializer};

/// One step in a configuration access chain.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Dotted/bracketed access chain from the configuration root, e.g.
/// `ds2408[0].channels[1].pin`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.segments.push(Segment::Key(key.into()));
        next
    }

    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(Segment::Index(index));
        next
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Identifier-safe rendering used for derived object ids:
    /// `ds2408[1].channels[0]` becomes `ds2408_1_channels_0`.
    pub fn to_identifier(&self) -> String {
        let mut out = String::new();
        for seg in &self.segments {
            if !out.is_empty() {
                out.push('_');
            }
            match seg {
                Segment::Key(k) => out.extend(k.chars().map(|c| {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        c
                    } else {
                        '_'
                    }
                })),
                Segment::Index(i) => out.push_str(&i.to_string()),
            }
        }
        out
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("<root>");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_dotted_and_bracketed() {
        let p = FieldPath::root()
            .key("ds2408")
            .index(0)
            .key("channels")
            .index(1)
            .key("pin");
        assert_eq!(p.to_string(), "ds2408[0].channels[1].pin");
        assert_eq!(FieldPath::root().to_string(), "<root>");
        assert_eq!(FieldPath::root().key("bus_id").to_string(), "bus_id");
    }

    #[test]
    fn identifier_rendering() {
        let p = FieldPath::root().key("ds2408").index(1).key("channels").index(0);
        assert_eq!(p.to_identifier(), "ds2408_1_channels_0");
        assert_eq!(FieldPath::root().key("a-b").to_identifier(), "a_b");
    }
}
