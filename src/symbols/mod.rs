/// Structural symbol model and index.
///
/// A [`Symbol`] is a named code entity with a source location, optional
/// structural metadata, parent/child ownership links (weak, by id), and the
/// sites at which it is referenced. [`SymbolIndex`] stores symbols with
/// multi-key lookup and a bidirectional reference graph.
pub mod index;
pub mod trie;

pub use index::{SymbolHierarchy, SymbolIndex, SymbolQuery, SymbolStats};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The kind of code entity a symbol represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Trait,
    Enum,
    TypeAlias,
    Variable,
    Constant,
    Module,
}

impl SymbolKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Struct => "struct",
            SymbolKind::Trait => "trait",
            SymbolKind::Enum => "enum",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::Module => "module",
        }
    }

    /// Whether this kind introduces a definition a "go to definition"
    /// query should land on.
    #[must_use]
    pub fn is_definition(&self) -> bool {
        !matches!(self, SymbolKind::Variable)
    }

    /// Whether this kind can own nested symbols.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Interface
                | SymbolKind::Struct
                | SymbolKind::Trait
                | SymbolKind::Enum
                | SymbolKind::Module
        )
    }
}

/// How a symbol is referenced at a particular site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    Import,
    Use,
}

/// A source location at which a symbol is referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSite {
    pub path: String,
    pub line: u32,
    pub kind: ReferenceKind,
}

/// A named code entity with location and structural metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub path: String,
    /// 1-based first line of the definition.
    pub line: u32,
    /// 1-based last line of the definition (inclusive).
    pub end_line: u32,
    pub column: u32,
    pub language: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,

    /// Owning symbol, if nested. Weak link by id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Owned symbols. Weak links by id.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Sites at which this symbol is referenced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceSite>,

    /// Snapshot of the defining source text.
    pub content: String,
    pub content_hash: String,

    /// Bumped on every tracked lookup; feeds ranking/eviction heuristics.
    #[serde(default)]
    pub usage_count: u64,
}

impl Symbol {
    /// Derive the deterministic symbol id from its identity tuple, so
    /// re-extraction of unchanged code yields the same id.
    #[must_use]
    pub fn derive_id(path: &str, kind: SymbolKind, name: &str, line: u32) -> String {
        content_hash(&format!("{path}\u{1f}{}\u{1f}{name}\u{1f}{line}", kind.as_str()))
    }
}

/// Short stable hex digest used for symbol/chunk ids and content hashes.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(16);
    for byte in &digest[..8] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
