//! Canonical identities for provider elements.
//!
//! Providers hand out opaque runtime identifiers; everything that compares or
//! looks up nodes goes through the canonical string key derived here.

use std::fmt;
use std::sync::Arc;

/// Opaque runtime identifier issued by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuntimeId {
    /// Sequence of integers (e.g. `[dev, inode]`).
    Ints(Vec<i64>),
    /// Sequence of opaque tokens (e.g. path components).
    Tokens(Vec<String>),
}

impl RuntimeId {
    pub fn is_empty(&self) -> bool {
        match self {
            RuntimeId::Ints(ints) => ints.is_empty(),
            RuntimeId::Tokens(tokens) => tokens.is_empty(),
        }
    }
}

/// Canonical, comparable key for one element.
///
/// Cheap to clone; immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalId(Arc<str>);

impl CanonicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve a runtime identifier into its canonical key.
///
/// Integers are rendered as upper-case hex padded to four digits and joined
/// with `.`. Tokens get a `t:` prefix, have `\` and `.` escaped with a
/// backslash, and are joined with `.`, so two different token sequences
/// never share a key and never collide with an integer key. A missing or
/// empty identifier yields `None`: such an element is ephemeral and must not
/// be cached.
pub fn resolve(runtime_id: Option<&RuntimeId>) -> Option<CanonicalId> {
    let runtime_id = runtime_id?;
    if runtime_id.is_empty() {
        return None;
    }

    let key = match runtime_id {
        RuntimeId::Ints(ints) => ints
            .iter()
            .map(|i| format!("{:04X}", i))
            .collect::<Vec<_>>()
            .join("."),
        RuntimeId::Tokens(tokens) => {
            let escaped: Vec<String> = tokens.iter().map(|t| escape_token(t)).collect();
            format!("{}{}", TOKEN_PREFIX, escaped.join("."))
        }
    };
    Some(CanonicalId(Arc::from(key)))
}

/// Marks token keys; integer keys only ever contain hex digits and `.`.
const TOKEN_PREFIX: &str = "t:";

fn escape_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if c == '\\' || c == '.' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
