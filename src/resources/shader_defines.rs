//! Shader Macro Definition System
//!
//! [`ShaderDefines`] is an insertion-ordered list of `NAME value` pairs with
//! unique names. Order matters only for the emitted `#define` lines; the
//! permutation cache hashes a define list as an unordered set.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kiln::resources::ShaderDefines;
//!
//! let mut defines = ShaderDefines::new();
//! defines.set("HAS_NORMAL_MAP", "1");
//! defines.set("LIGHT_COUNT", "2");
//!
//! let lines: Vec<String> = defines.lines().collect(); // ["HAS_NORMAL_MAP 1", "LIGHT_COUNT 2"]
//! ```

/// A collection of shader macro definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderDefines {
    defines: Vec<(String, String)>,
}

impl ShaderDefines {
    /// Create empty shader defines collection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            defines: Vec::new(),
        }
    }

    /// Create shader defines collection with pre-allocated capacity
    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            defines: Vec::with_capacity(capacity),
        }
    }

    /// Set shader define.
    ///
    /// If the name exists its value is replaced in place; otherwise the
    /// define is appended.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        if let Some(entry) = self.defines.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.defines.push((key.to_string(), value));
        }
    }

    /// Shorthand for `set(key, "1")`.
    pub fn enable(&mut self, key: &str) {
        self.set(key, "1");
    }

    /// Remove shader define
    pub fn remove(&mut self, key: &str) -> bool {
        if let Some(idx) = self.defines.iter().position(|(k, _)| k == key) {
            self.defines.remove(idx);
            true
        } else {
            false
        }
    }

    /// Check if contains a shader define
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.defines.iter().any(|(k, _)| k == key)
    }

    /// Get shader define value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.defines
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Clear all shader defines
    #[inline]
    pub fn clear(&mut self) {
        self.defines.clear();
    }

    /// Get shader defines count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.defines.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
    }

    /// Iterate all shader defines as `(name, value)`
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defines.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate the defines as the text that follows `#define`.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.defines.iter().map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k} {v}")
            }
        })
    }

    /// Merge shader defines from another `ShaderDefines`
    ///
    /// If there are conflicts, values from other will override values in self.
    pub fn merge(&mut self, other: &ShaderDefines) {
        for (key, value) in &other.defines {
            self.set(key, value);
        }
    }

    /// Create a new merged `ShaderDefines`
    #[must_use]
    pub fn merged_with(&self, other: &ShaderDefines) -> ShaderDefines {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

/// Create `ShaderDefines` from list of macro definitions
impl From<&[(&str, &str)]> for ShaderDefines {
    fn from(defines: &[(&str, &str)]) -> Self {
        let mut result = Self::with_capacity(defines.len());
        for (k, v) in defines {
            result.set(k, v);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut defines = ShaderDefines::new();
        defines.set("USE_MAP", "1");
        defines.enable("USE_NORMAL_MAP");

        assert!(defines.contains("USE_MAP"));
        assert!(defines.contains("USE_NORMAL_MAP"));
        assert!(!defines.contains("USE_AO_MAP"));

        assert_eq!(defines.get("USE_MAP"), Some("1"));
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut defines = ShaderDefines::new();
        defines.set("B", "1");
        defines.set("A", "1");
        defines.set("C", "");
        defines.set("B", "2");

        let lines: Vec<String> = defines.lines().collect();
        assert_eq!(lines, vec!["B 2", "A 1", "C"]);
    }

    #[test]
    fn test_merge() {
        let mut d1 = ShaderDefines::new();
        d1.set("A", "1");
        d1.set("B", "2");

        let mut d2 = ShaderDefines::new();
        d2.set("B", "3");
        d2.set("C", "4");

        d1.merge(&d2);

        assert_eq!(d1.get("A"), Some("1"));
        assert_eq!(d1.get("B"), Some("3")); // Overwritten
        assert_eq!(d1.get("C"), Some("4"));
        assert!(d1.remove("A"));
        assert!(!d1.remove("A"));
    }
}
