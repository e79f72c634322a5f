use std::fmt;

use bstr::{BStr, BString, ByteSlice};

use crate::error::RefDbError;

/// A validated reference name.
///
/// Names are slash-separated byte paths (`refs/heads/main`). Validation
/// enforces the usual ref-format rules:
/// - No `..`, no `@{`, not the single character `@`
/// - No ASCII control characters, no space, `~`, `^`, `:`, `?`, `*`, `[`, `\`
/// - No leading or trailing `/`, no `//`
/// - No component starting with `.` or ending with `.lock`
/// - No trailing `.`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(BString);

/// Characters forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[u8] = b" ~^:?*[\\";

impl RefName {
    /// Create and validate a ref name.
    pub fn new(name: impl Into<BString>) -> Result<Self, RefDbError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Create without validation, for names coming from trusted stores.
    pub(crate) fn new_unchecked(name: impl Into<BString>) -> Self {
        Self(name.into())
    }

    /// The short form (`main` for `refs/heads/main`).
    pub fn short_name(&self) -> &BStr {
        let s = self.0.as_bstr();
        for prefix in [
            b"refs/heads/".as_slice(),
            b"refs/tags/".as_slice(),
            b"refs/remotes/".as_slice(),
        ] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return rest.as_bstr();
            }
        }
        s
    }

    /// Is this under `refs/heads/`?
    pub fn is_branch(&self) -> bool {
        self.0.starts_with(b"refs/heads/")
    }

    /// Is this under `refs/tags/`?
    pub fn is_tag(&self) -> bool {
        self.0.starts_with(b"refs/tags/")
    }

    /// Is this under `refs/remotes/`?
    pub fn is_remote(&self) -> bool {
        self.0.starts_with(b"refs/remotes/")
    }

    /// Whether this name and `other` collide under the path-hierarchy rule:
    /// one is a proper prefix of the other with `/` at the boundary.
    /// `refs/heads/x` crosses `refs/heads/x/y`; `refs/heads/xy` does not.
    pub fn collides_with(&self, other: &RefName) -> bool {
        fn is_dir_prefix(short: &[u8], long: &[u8]) -> bool {
            long.len() > short.len() && long.starts_with(short) && long[short.len()] == b'/'
        }
        is_dir_prefix(&self.0, &other.0) || is_dir_prefix(&other.0, &self.0)
    }

    /// The raw bytes of this name.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// This name as a `BStr`.
    pub fn as_bstr(&self) -> &BStr {
        self.0.as_bstr()
    }

    /// As a string slice (validated names are UTF-8 in practice).
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid-utf8>")
    }
}

impl AsRef<BStr> for RefName {
    fn as_ref(&self) -> &BStr {
        self.0.as_bstr()
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn validate(name: &[u8]) -> Result<(), RefDbError> {
    let bad = |why: &str| {
        Err(RefDbError::InvalidName(format!(
            "'{}': {}",
            String::from_utf8_lossy(name),
            why
        )))
    };

    if name.is_empty() {
        return bad("empty name");
    }
    if name == b"@" {
        return bad("'@' alone is reserved");
    }
    if name.contains(&0) {
        return bad("contains NUL byte");
    }
    for &b in name.iter() {
        if b < 0x20 || b == 0x7f {
            return bad("contains control character");
        }
        if FORBIDDEN_CHARS.contains(&b) {
            return bad("contains forbidden character");
        }
    }
    if name.starts_with(b"/") || name.ends_with(b"/") {
        return bad("leading or trailing '/'");
    }
    if name.ends_with(b".") {
        return bad("ends with '.'");
    }
    if name.find(b"..").is_some() {
        return bad("contains '..'");
    }
    if name.find(b"//").is_some() {
        return bad("contains '//'");
    }
    if name.find(b"@{").is_some() {
        return bad("contains '@{'");
    }
    for component in name.split_str(b"/") {
        if component.starts_with(b".") {
            return bad("component starts with '.'");
        }
        if component.ends_with(b".lock") {
            return bad("component ends with '.lock'");
        }
    }
    Ok(())
}
