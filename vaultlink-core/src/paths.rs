//! Path canonicalization and identity keys.
//!
//! Every path that enters the engines passes through [`normalize`], so the
//! store only ever sees forward-slash, vault-relative paths without `./` or a
//! leading slash. Node keys are derived here and nowhere else.

use std::path::Path;

/// File extensions treated as documents (compared case-insensitively).
pub const DOCUMENT_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Canonicalize a vault-relative path.
///
/// Backslashes become forward slashes, empty and `.` segments are dropped and
/// `..` folds into its parent. Returns `None` when `..` climbs above the root.
pub fn normalize(input: &str) -> Option<String> {
    let unified = input.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Resolve `target` against the vault-relative directory `dir`.
///
/// Returns `None` if the result escapes the vault root.
pub fn join_relative(dir: &str, target: &str) -> Option<String> {
    if dir.is_empty() {
        normalize(target)
    } else {
        normalize(&format!("{dir}/{target}"))
    }
}

/// Directory part of a vault-relative path (`""` at the root).
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Final path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Extension of the final segment, without the dot. Dotfiles have none.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Whether the path carries one of [`DOCUMENT_EXTENSIONS`].
pub fn has_document_extension(path: &str) -> bool {
    extension(path).is_some_and(|ext| {
        DOCUMENT_EXTENSIONS
            .iter()
            .any(|doc| ext.eq_ignore_ascii_case(doc))
    })
}

/// Strip a trailing document extension, leaving other extensions alone.
pub fn strip_document_extension(path: &str) -> &str {
    if has_document_extension(path) {
        path.rfind('.').map_or(path, |idx| &path[..idx])
    } else {
        path
    }
}

/// File name without its extension, case preserved. Used as a note's name.
pub fn stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Case-insensitive grouping key for same-named documents.
///
/// Only document extensions are stripped, so a target like `v1.2 notes`
/// keeps its dot. Never persisted.
pub fn basename_key(path: &str) -> String {
    file_name(strip_document_extension(path)).to_lowercase()
}

/// Whether the path sits directly in the vault root.
pub fn is_root_level(path: &str) -> bool {
    !path.contains('/')
}

pub fn note_key(path: &str) -> String {
    format!("note:path:{path}")
}

pub fn phantom_key(name: &str) -> String {
    format!("phantom:name:{}", name.to_lowercase())
}

pub fn tag_key(name: &str) -> String {
    format!("tag:name:{}", name.to_lowercase())
}

pub fn asset_key(path: &str) -> String {
    format!("asset:path:{path}")
}

/// Path of `target` as seen from the directory `from_dir`, always carrying an
/// explicit `./` or `../` prefix.
pub fn relative_from(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    // Keep the target's file name out of the shared prefix.
    let to_dirs = to.len().saturating_sub(1);
    let common = from
        .iter()
        .zip(to.iter().take(to_dirs))
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from.len() - common;
    let rest = to[common..].join("/");
    if ups == 0 {
        format!("./{rest}")
    } else {
        format!("{}{rest}", "../".repeat(ups))
    }
}

/// Convert an absolute path under `root` into normalized vault-relative form.
pub fn vault_relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    normalize(&relative.to_string_lossy())
}
