//! # testdock Build Context Archive (`common::archive::context`)
//!
//! File: testdock/src/common/archive/context.rs
//!
//! ## Overview
//!
//! This module produces the gzipped tarball that is uploaded to the engine as the
//! build context of `DockerImage::build`. Before archiving it checks that the
//! context is a directory and that the Dockerfile exists inside it, so a bad path
//! fails locally with a clear message instead of as an opaque engine error.
//!
//! ## Architecture
//!
//! - `walkdir` traverses the context; entries are stored relative to its root.
//! - `.dockerignore` is honored: blank lines and `#` comments are skipped,
//!   patterns are `glob` patterns (`*`, `?`, `[..]`, `**`), a leading `!`
//!   re-includes, the last matching pattern wins and a pattern matching a
//!   directory covers everything below it. The Dockerfile and `.dockerignore`
//!   are always sent.
//! - `tar` builds the archive, `flate2` compresses it.
//!
use crate::core::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::{fs, path::Path};
use tracing::{debug, info};
use walkdir::WalkDir;

/// A single `.dockerignore` line, compiled.
#[derive(Debug)]
struct IgnoreRule {
    pattern: Pattern,
    negated: bool,
}

impl IgnoreRule {
    /// Matches `relative` itself or any of its parent directories.
    fn matches(&self, relative: &str) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        let mut prefix_end = relative.len();
        loop {
            if self.pattern.matches_with(&relative[..prefix_end], options) {
                return true;
            }
            match relative[..prefix_end].rfind('/') {
                Some(slash) => prefix_end = slash,
                None => return false,
            }
        }
    }
}

/// Parsed `.dockerignore`.
#[derive(Debug, Default)]
pub(crate) struct IgnoreRules {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRules {
    pub(crate) fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (negated, raw) = match line.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, line),
            };
            let normalized = raw.trim_start_matches("./").trim_start_matches('/');
            let normalized = normalized.trim_end_matches('/');
            if normalized.is_empty() {
                continue;
            }
            let pattern = Pattern::new(normalized).map_err(|e| {
                Error::Config(format!("Invalid .dockerignore pattern '{}': {}", raw, e.msg))
            })?;
            rules.push(IgnoreRule { pattern, negated });
        }
        Ok(Self { rules })
    }

    /// Whether `relative` (forward-slash separated) is excluded from the context.
    ///
    /// Rules are applied in order and the last matching one wins. A rule matches a
    /// path when it matches the path or one of its parent directories.
    pub(crate) fn is_ignored(&self, relative: &str) -> bool {
        self.rules.iter().fold(false, |ignored, rule| {
            if rule.matches(relative) {
                !rule.negated
            } else {
                ignored
            }
        })
    }
}

/// Creates the gzipped TAR build context for `context_dir`.
///
/// # Arguments
///
/// * `context_dir` - Directory sent to the engine as the build context.
/// * `dockerfile` - Path of the Dockerfile relative to `context_dir`.
///
/// # Errors
///
/// * `Error::FileSystem` - The context is missing, not a directory, lacks the
///   Dockerfile, or a file could not be read while archiving.
/// * `Error::Config` - `.dockerignore` contains an invalid pattern.
pub fn pack_build_context(context_dir: &Path, dockerfile: &str) -> Result<Vec<u8>> {
    if !context_dir.is_dir() {
        return Err(Error::FileSystem(format!(
            "Build context '{}' is not a directory.",
            context_dir.display()
        )));
    }
    if !context_dir.join(dockerfile).is_file() {
        return Err(Error::FileSystem(format!(
            "Dockerfile '{}' not found in build context '{}'.",
            dockerfile,
            context_dir.display()
        )));
    }

    let ignore_path = context_dir.join(".dockerignore");
    let rules = if ignore_path.is_file() {
        let content = fs::read_to_string(&ignore_path).map_err(|e| {
            Error::FileSystem(format!("Failed to read {}: {}", ignore_path.display(), e))
        })?;
        IgnoreRules::parse(&content)?
    } else {
        IgnoreRules::default()
    };
    let always_sent = [dockerfile.trim_start_matches("./"), ".dockerignore"];

    let mut tar_gz_bytes = Vec::new();
    let enc = flate2::write::GzEncoder::new(&mut tar_gz_bytes, flate2::Compression::default());
    let mut builder = tar::Builder::new(enc);
    let mut file_count = 0usize;

    let walker = WalkDir::new(context_dir).min_depth(1).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| {
            Error::FileSystem(format!(
                "Failed to walk build context '{}': {}",
                context_dir.display(),
                e
            ))
        })?;
        let relative = match entry.path().strip_prefix(context_dir) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if !always_sent.contains(&relative.as_str()) && rules.is_ignored(&relative) {
            debug!("Excluding '{}' from build context", relative);
            continue;
        }
        let appended = if entry.file_type().is_dir() {
            builder.append_dir(&relative, entry.path())
        } else {
            file_count += 1;
            builder.append_path_with_name(entry.path(), &relative)
        };
        appended.map_err(|e| {
            Error::FileSystem(format!(
                "Failed to add '{}' to the build context: {}",
                relative, e
            ))
        })?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::FileSystem(format!("Failed to finalize build context: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::FileSystem(format!("Failed to compress build context: {}", e)))?;

    info!(
        "Packed build context '{}' ({} files, {} bytes)",
        context_dir.display(),
        file_count,
        tar_gz_bytes.len()
    );
    Ok(tar_gz_bytes)
}
