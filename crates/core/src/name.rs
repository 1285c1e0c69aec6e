//! Entity names and sub-addresses
//!
//! Names are plain strings. Two rules apply everywhere a name is accepted:
//!
//! - `-` is normalized to `_`, so `config-data` and `config_data` address
//!   the same entity.
//! - `:` separates a top-level entity name from a path into its value, e.g.
//!   `relation:db:mysql/0`. Only the top-level part is a graph node; the
//!   remaining segments are resolved against the nested value at read time.

use std::fmt;

/// Separator between the top-level name and nested path segments
pub const ADDRESS_SEPARATOR: char = ':';

/// Normalize an entity name (`-` becomes `_`)
pub fn normalize_name(name: &str) -> String {
    name.replace('-', "_")
}

/// A parsed, normalized name with an optional nested path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    top: String,
    path: Vec<String>,
}

impl Address {
    /// Parse an address such as `relation:rid:uid`
    ///
    /// The top-level segment is normalized. Path segments are kept verbatim,
    /// since they address user data (relation ids, unit names) rather than
    /// registered entities.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split(ADDRESS_SEPARATOR);
        let top = normalize_name(parts.next().unwrap_or_default());
        let path = parts.map(str::to_string).collect();
        Address { top, path }
    }

    /// The top-level entity name
    pub fn top(&self) -> &str {
        &self.top
    }

    /// Nested path segments below the top-level value
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// True if the address has no nested path
    pub fn is_top_level(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.top)?;
        for segment in &self.path {
            write!(f, "{}{}", ADDRESS_SEPARATOR, segment)?;
        }
        Ok(())
    }
}
