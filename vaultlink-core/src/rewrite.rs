//! Multi-file link text rewriting.
//!
//! A [`RewritePlan`] collects the basename-form occurrences to replace;
//! [`apply`] writes them to disk as one batch. Every original file is backed
//! up before the first write, and a failure anywhere in the batch restores
//! what was already written. Callers whose later steps fail undo the batch
//! with [`AppliedRewrites::restore`].

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::{PreconditionError, Result, RewriteError, VaultError};
use crate::parser::code_spans;
use crate::paths;
use crate::types::{EdgeId, LinkKind, RewrittenLink};
use crate::vault::{FileBackup, VaultFs};

/// One recorded occurrence queued for replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteEntry {
    /// Edge whose `raw_link` must follow the rewrite (`None` in scan-only mode).
    pub edge_id: Option<EdgeId>,
    pub source: String,
    /// 1-based line of the occurrence.
    pub line: usize,
    pub kind: LinkKind,
    pub raw: String,
    pub new_raw: String,
}

impl RewriteEntry {
    /// Queue `raw` in `source` to point at `target` instead.
    ///
    /// Returns `None` if the raw text cannot be rewritten or already has the
    /// requested form.
    pub fn new(
        edge_id: Option<EdgeId>,
        source: &str,
        line: usize,
        kind: LinkKind,
        raw: &str,
        target: &str,
    ) -> Option<Self> {
        let new_raw = rewrite_raw_link(kind, raw, &link_path_for(source, target))?;
        (new_raw != raw).then(|| Self {
            edge_id,
            source: source.to_string(),
            line,
            kind,
            raw: raw.to_string(),
            new_raw,
        })
    }
}

/// The link path written for `target` when linking from `source`.
///
/// Targets in a subdirectory get their vault-root-relative path; root-level
/// targets get a source-relative `./` or `../` path so they cannot be
/// mistaken for a basename.
pub fn link_path_for(source: &str, target: &str) -> String {
    if paths::is_root_level(target) {
        paths::relative_from(paths::parent_dir(source), target)
    } else {
        target.to_string()
    }
}

/// Replace the target of one raw link with `link_path`.
///
/// Alias, heading, fragment, link text and the embed marker are kept. A
/// document extension is written only if the original target had one.
pub fn rewrite_raw_link(kind: LinkKind, raw: &str, link_path: &str) -> Option<String> {
    match kind {
        LinkKind::Wikilink | LinkKind::Embed => rewrite_wiki(raw, link_path),
        LinkKind::Markdown => rewrite_markdown(raw, link_path),
        LinkKind::Tag => None,
    }
}

fn new_target(old_target: &str, link_path: &str) -> String {
    if paths::has_document_extension(old_target) {
        link_path.to_string()
    } else {
        paths::strip_document_extension(link_path).to_string()
    }
}

fn rewrite_wiki(raw: &str, link_path: &str) -> Option<String> {
    let open = if raw.starts_with("![[") {
        3
    } else if raw.starts_with("[[") {
        2
    } else {
        return None;
    };
    if raw.len() < open + 2 || !raw.ends_with("]]") {
        return None;
    }
    let body = &raw[open..raw.len() - 2];

    let mut end = body.find(['|', '#']).unwrap_or(body.len());
    if body[..end].ends_with('\\') {
        end -= 1;
    }
    let target_region = &body[..end];
    let lead = target_region.len() - target_region.trim_start().len();
    let old_target = target_region.trim();
    if old_target.is_empty() {
        return None;
    }

    let start = open + lead;
    let stop = start + old_target.len();
    Some(format!(
        "{}{}{}",
        &raw[..start],
        new_target(old_target, link_path),
        &raw[stop..]
    ))
}

fn rewrite_markdown(raw: &str, link_path: &str) -> Option<String> {
    let text_start = if raw.starts_with('!') { 2 } else { 1 };
    let text_end = text_start + raw.get(text_start..)?.find(']')?;
    let url_start = text_end + 2;
    if raw.get(text_end + 1..url_start) != Some("(") || !raw.ends_with(')') {
        return None;
    }
    let inner = raw.get(url_start..raw.len() - 1)?;

    let lead = inner.len() - inner.trim_start().len();
    let rest = &inner[lead..];
    let (offset, url) = match rest.strip_prefix('<') {
        Some(bracketed) => (lead + 1, bracketed.split('>').next()?),
        None => (lead, rest.split_whitespace().next()?),
    };
    let path_len = url.find('#').unwrap_or(url.len());
    let old_target = url[..path_len].replace("%20", " ");
    if old_target.is_empty() {
        return None;
    }

    let encoded = new_target(&old_target, link_path).replace(' ', "%20");
    let start = url_start + offset;
    Some(format!(
        "{}{}{}",
        &raw[..start],
        encoded,
        &raw[start + path_len..]
    ))
}

/// Replace every occurrence of `raw` in `line` that lies outside inline code.
///
/// Returns the new line and the number of replacements made.
pub fn substitute_line(line: &str, raw: &str, new_raw: &str) -> (String, usize) {
    if raw.is_empty() {
        return (line.to_string(), 0);
    }
    let spans = code_spans(line);
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut copied = 0;
    let mut count = 0;

    for (pos, _) in line.match_indices(raw) {
        if spans.iter().any(|s| s.contains(&pos)) {
            continue;
        }
        let prev = pos.checked_sub(1).map(|p| bytes[p]);
        // `[[A]]` must not match inside `![[A]]`, nor an escaped link.
        if prev == Some(b'\\') || (prev == Some(b'!') && !raw.starts_with('!')) {
            continue;
        }
        out.push_str(&line[copied..pos]);
        out.push_str(new_raw);
        copied = pos + raw.len();
        count += 1;
    }
    out.push_str(&line[copied..]);
    (out, count)
}

/// Apply `entries` to the text of one document, line by line.
///
/// Line endings and every byte outside the replaced links are preserved.
pub fn rewrite_text(path: &str, text: &str, entries: &[RewriteEntry]) -> Result<String> {
    let mut by_line: BTreeMap<usize, Vec<(&str, &str)>> = BTreeMap::new();
    for entry in entries {
        let pairs = by_line.entry(entry.line).or_default();
        if !pairs.iter().any(|(raw, _)| *raw == entry.raw) {
            pairs.push((&entry.raw, &entry.new_raw));
        }
    }

    let mut out = String::with_capacity(text.len());
    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let Some(pairs) = by_line.remove(&(idx + 1)) else {
            out.push_str(line);
            continue;
        };
        let mut current = line.to_string();
        for (raw, new_raw) in pairs {
            let (next, count) = substitute_line(&current, raw, new_raw);
            if count == 0 {
                return Err(missing(path, idx + 1, raw));
            }
            current = next;
        }
        out.push_str(&current);
    }

    if let Some((line, pairs)) = by_line.into_iter().next() {
        let raw = pairs.first().map_or("", |(raw, _)| *raw);
        return Err(missing(path, line, raw));
    }
    Ok(out)
}

fn missing(path: &str, line: usize, raw: &str) -> VaultError {
    RewriteError::OccurrenceMissing {
        path: path.to_string(),
        line,
        raw: raw.to_string(),
    }
    .into()
}

/// Occurrences to rewrite, grouped by source document.
#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    by_file: BTreeMap<String, Vec<RewriteEntry>>,
}

impl RewritePlan {
    pub fn push(&mut self, entry: RewriteEntry) {
        self.by_file.entry(entry.source.clone()).or_default().push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }

    /// Number of queued occurrences.
    pub fn len(&self) -> usize {
        self.by_file.values().map(Vec::len).sum()
    }

    /// Source documents touched by the plan, sorted.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.by_file.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RewriteEntry> {
        self.by_file.values().flatten()
    }
}

/// A rewrite batch that reached the disk.
#[derive(Debug, Default)]
pub struct AppliedRewrites {
    backups: Vec<FileBackup>,
    mtimes: BTreeMap<String, i64>,
    links: Vec<RewrittenLink>,
    edge_updates: Vec<(EdgeId, String)>,
}

impl AppliedRewrites {
    pub fn is_empty(&self) -> bool {
        self.backups.is_empty()
    }

    /// New modification time of every rewritten file.
    pub fn mtimes(&self) -> &BTreeMap<String, i64> {
        &self.mtimes
    }

    /// (file, old, new) for every replaced occurrence.
    pub fn links(&self) -> &[RewrittenLink] {
        &self.links
    }

    /// New `raw_link` per edge.
    pub fn edge_updates(&self) -> &[(EdgeId, String)] {
        &self.edge_updates
    }

    pub fn into_links(self) -> Vec<RewrittenLink> {
        self.links
    }

    /// Put every rewritten file back to its original bytes and mtime.
    ///
    /// Best effort: failures are logged and the remaining files are still
    /// restored.
    pub fn restore(&self, fs: &dyn VaultFs) {
        restore_all(fs, &self.backups);
    }
}

fn restore_all(fs: &dyn VaultFs, backups: &[FileBackup]) {
    for backup in backups.iter().rev() {
        match backup.restore(fs) {
            Ok(()) => debug!(path = %backup.path, "Restored original file"),
            Err(e) => warn!(path = %backup.path, error = %e, "Failed to restore file"),
        }
    }
}

/// Write a plan to disk as one batch.
///
/// Every file is read and transformed before the first write, so a bad
/// occurrence fails the batch with nothing touched. A write failure restores
/// the files already written and fails the whole batch.
pub fn apply(fs: &dyn VaultFs, plan: &RewritePlan) -> Result<AppliedRewrites> {
    let mut staged = Vec::with_capacity(plan.by_file.len());
    for (path, entries) in &plan.by_file {
        let original = fs.read(path).map_err(|source| RewriteError::Read {
            path: path.clone(),
            source,
        })?;
        let text = std::str::from_utf8(&original)
            .map_err(|_| RewriteError::Encoding(path.clone()))?;
        let updated = rewrite_text(path, text, entries)?;
        let backup = FileBackup::capture(fs, path, original).map_err(|source| {
            RewriteError::Read {
                path: path.clone(),
                source,
            }
        })?;
        staged.push((backup, updated));
    }

    let mut applied = AppliedRewrites::default();
    for (backup, updated) in staged {
        let path = backup.path.clone();
        if let Err(source) = fs.write(&path, updated.as_bytes()) {
            warn!(path = %path, error = %source, "Rewrite failed; restoring batch");
            // The failed write may have truncated the file.
            applied.backups.push(backup);
            applied.restore(fs);
            return Err(RewriteError::Write { path, source }.into());
        }
        debug!(path = %path, "Rewrote links");
        applied.backups.push(backup);
    }

    for backup in &applied.backups {
        match fs.mtime(&backup.path) {
            Ok(Some(mtime)) => {
                applied.mtimes.insert(backup.path.clone(), mtime);
            }
            Ok(None) => {
                applied.restore(fs);
                return Err(PreconditionError::FileNotFound(backup.path.clone()).into());
            }
            Err(e) => {
                applied.restore(fs);
                return Err(e.into());
            }
        }
    }

    for entry in plan.entries() {
        applied.links.push(RewrittenLink {
            file: entry.source.clone(),
            old: entry.raw.clone(),
            new: entry.new_raw.clone(),
        });
        if let Some(edge) = entry.edge_id {
            applied.edge_updates.push((edge, entry.new_raw.clone()));
        }
    }

    info!(
        files = applied.backups.len(),
        links = applied.links.len(),
        "Applied link rewrites"
    );
    Ok(applied)
}

/// Fail if any source's on-disk mtime differs from the indexed one.
///
/// Runs before any byte is touched.
pub fn check_staleness<'a, I>(fs: &dyn VaultFs, sources: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, Option<i64>)>,
{
    for (path, indexed) in sources {
        let on_disk = fs
            .mtime(path)?
            .ok_or_else(|| PreconditionError::FileNotFound(path.to_string()))?;
        let indexed = indexed.unwrap_or_default();
        if on_disk != indexed {
            debug!(path, indexed, on_disk, "Source changed since indexing");
            return Err(VaultError::stale(path, indexed, on_disk));
        }
    }
    Ok(())
}
