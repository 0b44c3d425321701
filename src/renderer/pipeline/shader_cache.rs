//! Shader Permutation Cache
//!
//! Owns the shader source table and every compiled shader and linked
//! program.
//!
//! ## Sources
//!
//! Built-in GLSL sources are embedded with `rust-embed`; hosts may register
//! more. Every `#include <name>` marker is resolved once when the table is
//! built: the first occurrence of an include in a source is replaced with
//! the (recursively resolved) named source, later identical markers are
//! dropped. Include cycles and unknown names are rejected immediately.
//!
//! ## Permutations
//!
//! A permutation is `(source name, define set)`. Its key is
//! `xxh32(name) ^ xxh32(d1) ^ xxh32(d2) ^ ...` over the *unique* defines, so
//! the key does not depend on define order. Programs are keyed by an
//! order-sensitive hash of the `(vertex, fragment)` permutation keys.
//!
//! Keys are 32 bits wide. A collision (same key, different permutation) is
//! detected, logged, and the first cached entry is kept.
//!
//! Compile and link failures are logged once, remembered, and never retried.

use log::{debug, error, warn};
use rust_embed::RustEmbed;
use rustc_hash::{FxHashMap, FxHashSet};
use xxhash_rust::xxh32::xxh32;

use crate::errors::{KilnError, Result};
use crate::renderer::device::{GpuDevice, ShaderId, ShaderStage};
use crate::renderer::pipeline::binding::ShaderProgram;

#[derive(RustEmbed)]
#[folder = "src/renderer/shaders"]
struct BuiltinShaders;

/// Prepended to every compiled permutation.
pub const VERSION_PREAMBLE: &str = "#version 300 es\n";

/// The 32-bit string hash used for permutation keys.
#[inline]
#[must_use]
pub fn string_hash(text: &str) -> u32 {
    xxh32(text.as_bytes(), 0)
}

/// Order-independent key of `(identifier, unique defines)`.
#[must_use]
pub fn permutation_hash<S: AsRef<str>>(identifier: &str, defines: &[S]) -> u32 {
    let mut seen = FxHashSet::default();
    defines
        .iter()
        .map(AsRef::as_ref)
        .filter(|d| seen.insert(*d))
        .fold(string_hash(identifier), |hash, d| hash ^ string_hash(d))
}

/// Order-sensitive key of a `(vertex, fragment)` pair.
#[must_use]
pub fn program_hash(vertex_hash: u32, fragment_hash: u32) -> u32 {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&vertex_hash.to_le_bytes());
    bytes[4..].copy_from_slice(&fragment_hash.to_le_bytes());
    xxh32(&bytes, 0)
}

#[derive(Debug, Clone)]
struct CachedShader {
    id: ShaderId,
    identifier: String,
    /// Sorted unique defines, kept for collision detection.
    defines: Vec<String>,
}

#[derive(Debug)]
pub struct ShaderCache {
    raw_sources: FxHashMap<String, String>,
    sources: FxHashMap<String, String>,

    shaders: FxHashMap<u32, CachedShader>,
    programs: FxHashMap<u32, ShaderProgram>,

    failed_shaders: FxHashSet<u32>,
    failed_programs: FxHashSet<u32>,
    unknown_sources: FxHashSet<String>,
    reported_collisions: FxHashSet<u32>,
}

impl ShaderCache {
    /// Builds a cache over the given sources, resolving includes.
    ///
    /// # Errors
    /// [`KilnError::ShaderIncludeCycle`] or [`KilnError::UnknownShaderInclude`].
    pub fn new<I, N, S>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        let raw_sources: FxHashMap<String, String> = sources
            .into_iter()
            .map(|(n, s)| (n.into(), s.into()))
            .collect();
        let sources = resolve_includes(&raw_sources)?;

        Ok(Self {
            raw_sources,
            sources,
            shaders: FxHashMap::default(),
            programs: FxHashMap::default(),
            failed_shaders: FxHashSet::default(),
            failed_programs: FxHashSet::default(),
            unknown_sources: FxHashSet::default(),
            reported_collisions: FxHashSet::default(),
        })
    }

    /// Cache over the embedded built-in sources.
    pub fn with_builtin_sources() -> Result<Self> {
        Self::new(builtin_sources())
    }

    /// Adds or replaces a source and re-resolves the table. Shaders already
    /// compiled from the old text stay cached.
    ///
    /// # Errors
    /// Fails (leaving the table unchanged) if the new source introduces an
    /// include cycle or an unknown include.
    pub fn register_source(&mut self, name: impl Into<String>, source: impl Into<String>) -> Result<()> {
        let mut raw = self.raw_sources.clone();
        raw.insert(name.into(), source.into());
        self.sources = resolve_includes(&raw)?;
        self.raw_sources = raw;
        Ok(())
    }

    /// Resolved text of a source.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    /// Returns the permutation key of `(identifier, defines)`, compiling the
    /// shader on first use.
    ///
    /// `None` if the identifier is unknown or compilation failed (now or on
    /// an earlier call).
    pub fn select_shader<S: AsRef<str>>(
        &mut self,
        device: &mut impl GpuDevice,
        identifier: &str,
        defines: &[S],
    ) -> Option<u32> {
        let hash = permutation_hash(identifier, defines);

        if let Some(cached) = self.shaders.get(&hash) {
            if (cached.identifier != identifier || cached.defines != sorted_unique(defines))
                && self.reported_collisions.insert(hash)
            {
                warn!(
                    "Shader permutation hash collision on {hash:#010x}: '{identifier}' reuses the cached '{}'",
                    cached.identifier
                );
            }
            return Some(hash);
        }
        if self.failed_shaders.contains(&hash) {
            return None;
        }

        let Some(body) = self.sources.get(identifier) else {
            if self.unknown_sources.insert(identifier.to_string()) {
                warn!("Unknown shader source '{identifier}'");
            }
            return None;
        };
        let Some(stage) = ShaderStage::from_source_name(identifier) else {
            if self.unknown_sources.insert(identifier.to_string()) {
                warn!("Cannot infer shader stage of '{identifier}'");
            }
            return None;
        };

        let text = assemble(body, defines);
        match device.compile_shader(stage, &text) {
            Ok(id) => {
                debug!("Compiled {identifier} permutation {hash:#010x}");
                self.shaders.insert(
                    hash,
                    CachedShader {
                        id,
                        identifier: identifier.to_string(),
                        defines: sorted_unique(defines),
                    },
                );
                Some(hash)
            }
            Err(e) => {
                error!("{identifier} permutation {hash:#010x}: {e}");
                self.failed_shaders.insert(hash);
                None
            }
        }
    }

    /// The linked program for a vertex/fragment permutation pair, linking
    /// and reflecting it on first use.
    pub fn get_program(
        &mut self,
        device: &mut impl GpuDevice,
        vertex_hash: u32,
        fragment_hash: u32,
    ) -> Option<&mut ShaderProgram> {
        let key = program_hash(vertex_hash, fragment_hash);

        if !self.programs.contains_key(&key) {
            if self.failed_programs.contains(&key) {
                return None;
            }
            let vertex = self.shaders.get(&vertex_hash)?.id;
            let fragment = self.shaders.get(&fragment_hash)?.id;

            match device.link_program(vertex, fragment) {
                Ok(id) => {
                    debug!("Linked program {key:#010x}");
                    self.programs.insert(key, ShaderProgram::reflect(&*device, id, key));
                }
                Err(e) => {
                    error!("Program {key:#010x}: {e}");
                    self.failed_programs.insert(key);
                    return None;
                }
            }
        }

        self.programs.get_mut(&key)
    }

    #[must_use]
    pub fn shader_id(&self, hash: u32) -> Option<ShaderId> {
        self.shaders.get(&hash).map(|s| s.id)
    }

    #[must_use]
    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    #[must_use]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Releases every program and shader and forgets past failures.
    pub fn destroy(&mut self, device: &mut impl GpuDevice) {
        for (_, program) in self.programs.drain() {
            device.delete_program(program.id());
        }
        for (_, shader) in self.shaders.drain() {
            device.delete_shader(shader.id);
        }
        self.failed_shaders.clear();
        self.failed_programs.clear();
    }
}

/// Every embedded source, keyed by file name.
#[must_use]
pub fn builtin_sources() -> Vec<(String, String)> {
    BuiltinShaders::iter()
        .filter_map(|name| {
            let file = BuiltinShaders::get(&name)?;
            let text = std::str::from_utf8(file.data.as_ref()).ok()?.to_string();
            Some((name.to_string(), text))
        })
        .collect()
}

fn sorted_unique<S: AsRef<str>>(defines: &[S]) -> Vec<String> {
    let mut out: Vec<String> = defines.iter().map(|d| d.as_ref().to_string()).collect();
    out.sort();
    out.dedup();
    out
}

/// Preamble + one `#define` per unique define (caller order) + body.
fn assemble<S: AsRef<str>>(body: &str, defines: &[S]) -> String {
    let mut seen = FxHashSet::default();
    let mut text = String::with_capacity(body.len() + defines.len() * 32 + VERSION_PREAMBLE.len());
    text.push_str(VERSION_PREAMBLE);
    for define in defines.iter().map(AsRef::as_ref) {
        if seen.insert(define) {
            text.push_str("#define ");
            text.push_str(define);
            text.push('\n');
        }
    }
    text.push_str(body);
    text
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?.trim();
    rest.strip_prefix('<')
        .and_then(|r| r.strip_suffix('>'))
        .or_else(|| rest.strip_prefix('"').and_then(|r| r.strip_suffix('"')))
        .map(str::trim)
}

/// Resolves every source. Each include is spliced at its first marker
/// anywhere in the expanded text of a source; later markers naming it are
/// stripped, so diamond-shaped include graphs yield one copy.
fn resolve_includes(raw: &FxHashMap<String, String>) -> Result<FxHashMap<String, String>> {
    let mut checked = FxHashSet::default();
    let mut stack = Vec::new();
    for name in raw.keys() {
        check_includes(name, raw, &mut checked, &mut stack)?;
    }

    let mut resolved = FxHashMap::default();
    for name in raw.keys() {
        let mut spliced = FxHashSet::default();
        spliced.insert(name.as_str());
        let mut text = String::new();
        splice(name, raw, &mut spliced, &mut text);
        resolved.insert(name.clone(), text);
    }
    Ok(resolved)
}

/// Fails on include cycles and unknown include names.
fn check_includes<'a>(
    name: &'a str,
    raw: &'a FxHashMap<String, String>,
    checked: &mut FxHashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Result<()> {
    if checked.contains(name) {
        return Ok(());
    }
    if stack.contains(&name) {
        let mut chain = stack.clone();
        chain.push(name);
        return Err(KilnError::ShaderIncludeCycle(chain.join(" -> ")));
    }
    let source = raw.get(name).ok_or_else(|| KilnError::UnknownShaderInclude {
        source_name: stack.last().map(ToString::to_string).unwrap_or_default(),
        include: name.to_string(),
    })?;

    stack.push(name);
    for target in source.lines().filter_map(include_target) {
        check_includes(target, raw, checked, stack)?;
    }
    stack.pop();
    checked.insert(name);
    Ok(())
}

fn splice<'a>(
    name: &str,
    raw: &'a FxHashMap<String, String>,
    spliced: &mut FxHashSet<&'a str>,
    text: &mut String,
) {
    let Some(source) = raw.get(name) else {
        return;
    };
    for line in source.lines() {
        match include_target(line) {
            Some(target) => {
                if spliced.insert(target) {
                    splice(target, raw, spliced, text);
                }
            }
            None => {
                text.push_str(line);
                text.push('\n');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permutation_hash_ignores_order_and_duplicates() {
        let a = permutation_hash("demo.frag", &["A", "B"]);
        assert_eq!(a, permutation_hash("demo.frag", &["B", "A"]));
        assert_eq!(a, permutation_hash("demo.frag", &["A", "B", "A"]));
        assert_ne!(a, permutation_hash("demo.frag", &["A"]));
    }

    #[test]
    fn program_hash_is_order_sensitive() {
        assert_ne!(program_hash(1, 2), program_hash(2, 1));
    }

    #[test]
    fn includes_resolve_first_occurrence_only() {
        let cache = ShaderCache::new([
            ("a.frag", "#include <lib.glsl>\nvoid main() {}\n#include <lib.glsl>\n"),
            ("lib.glsl", "float f() { return 1.0; }"),
        ])
        .unwrap();
        let text = cache.source("a.frag").unwrap();
        assert_eq!(text.matches("float f()").count(), 1);
        assert!(!text.contains("#include"));
    }

    #[test]
    fn diamond_includes_splice_once() {
        let cache = ShaderCache::new([
            ("a.frag", "#include <b.glsl>\n#include <c.glsl>\nvoid main() {}\n"),
            ("b.glsl", "#include <lib.glsl>\nfloat b() { return f(); }\n"),
            ("c.glsl", "#include <lib.glsl>\nfloat c() { return f(); }\n"),
            ("lib.glsl", "float f() { return 1.0; }\n"),
        ])
        .unwrap();
        let text = cache.source("a.frag").unwrap();
        assert_eq!(text.matches("float f()").count(), 1);
        assert!(text.find("float f()") < text.find("float c()"));

        // Each source still resolves on its own
        assert!(cache.source("c.glsl").unwrap().contains("float f()"));
    }

    #[test]
    fn include_cycle_fails_fast() {
        let result = ShaderCache::new([
            ("a.glsl", "#include <b.glsl>\n"),
            ("b.glsl", "#include <a.glsl>\n"),
        ]);
        assert!(matches!(result, Err(KilnError::ShaderIncludeCycle(_))));
    }

    #[test]
    fn unknown_include_fails_fast() {
        let result = ShaderCache::new([("a.frag", "#include <missing.glsl>\n")]);
        assert!(matches!(
            result,
            Err(KilnError::UnknownShaderInclude { ref include, .. }) if include == "missing.glsl"
        ));
    }

    #[test]
    fn assemble_prefixes_preamble_and_defines() {
        let text = assemble("void main() {}\n", &["A", "B 2", "A"]);
        assert_eq!(text, "#version 300 es\n#define A\n#define B 2\nvoid main() {}\n");
    }

    #[test]
    fn builtin_sources_resolve() {
        let cache = ShaderCache::with_builtin_sources().unwrap();
        assert!(cache.source("primitive.vert").is_some());
        assert!(cache.source("pbr.frag").is_some());
    }
}
