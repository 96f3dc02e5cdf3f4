use serde::{Deserialize, Serialize};

// ── Typed ID wrappers ──────────────────────────────────────────────

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(NodeId);
typed_id!(EdgeId);

// ── Node types ─────────────────────────────────────────────────────

/// Kind discriminator for graph vertices.
///
/// A node keeps its id across a kind change (note → phantom), so edges that
/// point at it stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A document on disk and registered in the index.
    Note,
    /// A referenced document that does not exist.
    Phantom,
    /// A hashtag-style label.
    Tag,
    /// A referenced non-document file on disk.
    Asset,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Phantom => "phantom",
            Self::Tag => "tag",
            Self::Asset => "asset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "note" => Some(Self::Note),
            "phantom" => Some(Self::Phantom),
            "tag" => Some(Self::Tag),
            "asset" => Some(Self::Asset),
            _ => None,
        }
    }

    /// Whether nodes of this kind correspond to a file on disk.
    pub fn exists_on_disk(self) -> bool {
        matches!(self, Self::Note | Self::Asset)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vertex of the link graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Deterministic identity, e.g. `note:path:sub/A.md`.
    pub key: String,
    pub kind: NodeKind,
    pub name: String,
    /// Vault-relative path; set only for notes and assets.
    pub path: Option<String>,
    pub exists: bool,
    /// Last-seen disk modification time in ns since the Unix epoch; notes only.
    pub mtime: Option<i64>,
}

// ── Edge types ─────────────────────────────────────────────────────

/// Syntax a link occurrence was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// `[[Target#Heading|alias]]`
    Wikilink,
    /// `![[Target]]`
    Embed,
    /// `[text](url#frag)` or `![alt](url)`
    Markdown,
    /// `#tag` in the body or a `tags:` frontmatter entry.
    Tag,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wikilink => "wikilink",
            Self::Embed => "embed",
            Self::Markdown => "markdown",
            Self::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wikilink" => Some(Self::Wikilink),
            "embed" => Some(Self::Embed),
            "markdown" => Some(Self::Markdown),
            "tag" => Some(Self::Tag),
            _ => None,
        }
    }

    /// Wikilinks and embeds share the `[[…]]` body syntax.
    pub fn is_wiki_style(self) -> bool {
        matches!(self, Self::Wikilink | Self::Embed)
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed reference, one per literal link occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: LinkKind,
    /// Exact literal text matched in the source document.
    pub raw_link: String,
    /// In-document fragment (heading or block id).
    pub subpath: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
}

/// Edge fields supplied on insert; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: LinkKind,
    pub raw_link: String,
    pub subpath: Option<String>,
    pub line_start: usize,
    pub line_end: usize,
}

/// An incoming edge joined with what rewriting and staleness checks need
/// to know about its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEdge {
    pub edge: Edge,
    /// Source note path; `None` if the source is not a note.
    pub source_path: Option<String>,
    pub source_mtime: Option<i64>,
}

/// What `remove_or_phantomize` did with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalOutcome {
    /// The node and all of its edges are gone.
    Deleted,
    /// The node survives as a phantom (in place or merged) carrying its incoming edges.
    Phantomized,
}

/// Summary counts of the index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub notes: u64,
    pub phantoms: u64,
    pub tags: u64,
    pub assets: u64,
    pub edges: u64,
    /// RFC 3339 timestamp of the last full build, if any.
    pub built_at: Option<String>,
}

/// One link text replaced on disk: (file, old raw text, new raw text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenLink {
    pub file: String,
    pub old: String,
    pub new: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_round_trips_through_strings() {
        for kind in [NodeKind::Note, NodeKind::Phantom, NodeKind::Tag, NodeKind::Asset] {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("file"), None);
    }

    #[test]
    fn link_kind_round_trips_through_strings() {
        for kind in [LinkKind::Wikilink, LinkKind::Embed, LinkKind::Markdown, LinkKind::Tag] {
            assert_eq!(LinkKind::parse(kind.as_str()), Some(kind));
        }
        assert!(LinkKind::Embed.is_wiki_style());
        assert!(!LinkKind::Markdown.is_wiki_style());
    }

    #[test]
    fn only_notes_and_assets_exist_on_disk() {
        assert!(NodeKind::Note.exists_on_disk());
        assert!(NodeKind::Asset.exists_on_disk());
        assert!(!NodeKind::Phantom.exists_on_disk());
        assert!(!NodeKind::Tag.exists_on_disk());
    }

    #[test]
    fn typed_ids_display_as_integers() {
        assert_eq!(NodeId(7).to_string(), "7");
        assert_eq!(EdgeId::from(3), EdgeId(3));
    }
}
