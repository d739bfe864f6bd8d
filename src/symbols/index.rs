/// In-memory symbol index with multi-key lookup and a reference graph.
///
/// Four hash-map-of-sets secondary indices (name, path, kind, language) give
/// O(1) bucket access; a prefix trie over lowercased names serves fuzzy
/// lookup. The reference graph is two maps of id sets, one per direction, so
/// edges are plain id references and the logical graph may be cyclic without
/// any ownership cycles.
///
/// The index performs no internal locking. Callers that share it across
/// tasks serialize writers externally; reads may interleave freely.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::trie::NameTrie;
use super::{ReferenceSite, Symbol, SymbolKind};

/// Filtered search over the index. With `text` set, the query delegates to
/// name search and the remaining fields act as filters; without it, the
/// kind/path/language buckets are intersected.
#[derive(Debug, Clone, Default)]
pub struct SymbolQuery {
    pub text: Option<String>,
    pub kind: Option<SymbolKind>,
    pub path: Option<String>,
    pub language: Option<String>,
    pub fuzzy: bool,
    pub limit: usize,
}

/// A symbol together with its live parent and children.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolHierarchy {
    pub symbol: Symbol,
    pub parent: Option<Symbol>,
    pub children: Vec<Symbol>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolStats {
    pub total_symbols: usize,
    pub files: usize,
    pub reference_edges: usize,
    pub trie_nodes: usize,
    pub by_kind: HashMap<String, usize>,
    pub by_language: HashMap<String, usize>,
}

/// Serialized snapshot for export/import.
#[derive(Debug, Serialize, Deserialize)]
struct SymbolSnapshot {
    symbols: Vec<Symbol>,
    edges: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct SymbolIndex {
    symbols: HashMap<String, Symbol>,
    by_name: HashMap<String, HashSet<String>>,
    by_path: HashMap<String, HashSet<String>>,
    by_kind: HashMap<SymbolKind, HashSet<String>>,
    by_language: HashMap<String, HashSet<String>>,
    trie: NameTrie,
    /// id -> ids of symbols it references
    refs_out: HashMap<String, HashSet<String>>,
    /// id -> ids of symbols referencing it
    refs_in: HashMap<String, HashSet<String>>,
}

impl SymbolIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Insert or replace a symbol by id. On replace, every secondary index
    /// is detached before re-attaching with the new data, so no index ever
    /// holds a stale entry for a live id. Returns `true` when the id was new.
    pub fn add_symbol(&mut self, mut symbol: Symbol) -> bool {
        let is_new = match self.symbols.remove(&symbol.id) {
            Some(old) => {
                self.detach_secondary(&old);
                // Usage history survives re-extraction of the same entity.
                symbol.usage_count = symbol.usage_count.max(old.usage_count);
                // Children that still point at this id keep their back-link.
                for child_id in old.children {
                    let live = self
                        .symbols
                        .get(&child_id)
                        .is_some_and(|c| c.parent_id.as_deref() == Some(symbol.id.as_str()));
                    if live && !symbol.children.contains(&child_id) {
                        symbol.children.push(child_id);
                    }
                }
                false
            }
            None => true,
        };

        self.attach_secondary(&symbol);

        // Ownership links are weak references and may dangle until the other
        // end arrives; both directions are repaired whenever an end exists.
        if let Some(parent_id) = symbol.parent_id.clone() {
            if let Some(parent) = self.symbols.get_mut(&parent_id) {
                if !parent.children.contains(&symbol.id) {
                    parent.children.push(symbol.id.clone());
                }
            }
        }
        for child_id in symbol.children.clone() {
            if let Some(child) = self.symbols.get_mut(&child_id) {
                if child.parent_id.as_deref() != Some(symbol.id.as_str()) {
                    child.parent_id = Some(symbol.id.clone());
                }
            }
        }

        self.symbols.insert(symbol.id.clone(), symbol);
        is_new
    }

    /// Insert a batch of symbols; returns how many ids were new.
    pub fn add_symbols(&mut self, symbols: Vec<Symbol>) -> usize {
        let mut added = 0;
        for symbol in symbols {
            if self.add_symbol(symbol) {
                added += 1;
            }
        }
        added
    }

    /// Remove a symbol: detaches it from all indices, the trie, the
    /// reference graph in both directions, and repairs parent/child links.
    /// Unknown ids are a no-op returning `false`.
    pub fn remove_symbol(&mut self, id: &str) -> bool {
        let Some(symbol) = self.symbols.remove(id) else {
            return false;
        };

        self.detach_secondary(&symbol);

        // Parent loses the back-link, children become roots.
        if let Some(parent_id) = &symbol.parent_id {
            if let Some(parent) = self.symbols.get_mut(parent_id) {
                parent.children.retain(|c| c != id);
            }
        }
        for child_id in &symbol.children {
            if let Some(child) = self.symbols.get_mut(child_id) {
                child.parent_id = None;
            }
        }

        // Drop graph edges in both directions.
        if let Some(targets) = self.refs_out.remove(id) {
            for target in targets {
                if let Some(sources) = self.refs_in.get_mut(&target) {
                    sources.remove(id);
                    if sources.is_empty() {
                        self.refs_in.remove(&target);
                    }
                }
            }
        }
        if let Some(sources) = self.refs_in.remove(id) {
            for source in sources {
                if let Some(targets) = self.refs_out.get_mut(&source) {
                    targets.remove(id);
                    if targets.is_empty() {
                        self.refs_out.remove(&source);
                    }
                }
            }
        }

        true
    }

    /// Remove every symbol defined in `path`. Reference sites recorded from
    /// that file on surviving symbols are dropped as well, so a re-index of
    /// the file cannot leave stale sites behind. Returns the removed count.
    pub fn remove_symbols_by_path(&mut self, path: &str) -> usize {
        let ids: Vec<String> = self
            .by_path
            .get(path)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for id in &ids {
            if self.remove_symbol(id) {
                removed += 1;
            }
        }

        if removed > 0 {
            for symbol in self.symbols.values_mut() {
                symbol.references.retain(|site| site.path != path);
            }
        }

        removed
    }

    /// Record a reference-graph edge `from -> to`. Both ids must be live;
    /// otherwise this is a no-op returning `false`.
    pub fn add_reference(&mut self, from: &str, to: &str) -> bool {
        if !self.symbols.contains_key(from) || !self.symbols.contains_key(to) {
            return false;
        }
        self.refs_out
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.refs_in
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
        true
    }

    /// Record a site at which `id` is referenced. No-op for unknown ids.
    pub fn add_reference_site(&mut self, id: &str, site: ReferenceSite) -> bool {
        match self.symbols.get_mut(id) {
            Some(symbol) => {
                if !symbol.references.contains(&site) {
                    symbol.references.push(site);
                }
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
        self.by_name.clear();
        self.by_path.clear();
        self.by_kind.clear();
        self.by_language.clear();
        self.trie.clear();
        self.refs_out.clear();
        self.refs_in.clear();
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Tracked lookup: bumps the symbol's usage counter.
    pub fn get_symbol(&mut self, id: &str) -> Option<&Symbol> {
        let symbol = self.symbols.get_mut(id)?;
        symbol.usage_count += 1;
        Some(symbol)
    }

    /// Untracked lookup, for internal traversals that must not skew usage
    /// heuristics.
    #[must_use]
    pub fn peek_symbol(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    /// Name lookup: the exact-name bucket first, then (with `fuzzy`) trie
    /// prefix matches merged in without duplicates, capped at `limit`.
    #[must_use]
    pub fn search_by_name(&self, name: &str, fuzzy: bool, limit: usize) -> Vec<Symbol> {
        let lowered = name.to_lowercase();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out: Vec<Symbol> = Vec::new();

        if let Some(bucket) = self.by_name.get(&lowered) {
            let mut exact: Vec<&Symbol> =
                bucket.iter().filter_map(|id| self.symbols.get(id)).collect();
            exact.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
            for symbol in exact {
                if out.len() >= limit {
                    return out;
                }
                seen.insert(symbol.id.as_str());
                out.push(symbol.clone());
            }
        }

        if fuzzy && out.len() < limit {
            // Over-fetch so duplicates of exact hits do not eat the cap.
            for id in self.trie.collect_prefix(&lowered, limit * 2) {
                if out.len() >= limit {
                    break;
                }
                if seen.contains(id.as_str()) {
                    continue;
                }
                if let Some(symbol) = self.symbols.get(&id) {
                    out.push(symbol.clone());
                }
            }
        }

        out
    }

    /// Filtered search, see [`SymbolQuery`].
    #[must_use]
    pub fn search(&self, query: &SymbolQuery) -> Vec<Symbol> {
        let limit = if query.limit == 0 { 50 } else { query.limit };

        if let Some(text) = &query.text {
            return self
                .search_by_name(text, query.fuzzy, limit * 2)
                .into_iter()
                .filter(|s| query.kind.is_none_or(|k| s.kind == k))
                .filter(|s| query.path.as_deref().is_none_or(|p| s.path == p))
                .filter(|s| query.language.as_deref().is_none_or(|l| s.language == l))
                .take(limit)
                .collect();
        }

        let mut buckets: Vec<&HashSet<String>> = Vec::new();
        if let Some(kind) = query.kind {
            match self.by_kind.get(&kind) {
                Some(bucket) => buckets.push(bucket),
                None => return Vec::new(),
            }
        }
        if let Some(path) = &query.path {
            match self.by_path.get(path) {
                Some(bucket) => buckets.push(bucket),
                None => return Vec::new(),
            }
        }
        if let Some(language) = &query.language {
            match self.by_language.get(language) {
                Some(bucket) => buckets.push(bucket),
                None => return Vec::new(),
            }
        }
        if buckets.is_empty() {
            return Vec::new();
        }

        // Intersect starting from the smallest bucket.
        buckets.sort_by_key(|b| b.len());
        let mut matches: Vec<&Symbol> = buckets[0]
            .iter()
            .filter(|id| buckets[1..].iter().all(|b| b.contains(*id)))
            .filter_map(|id| self.symbols.get(id))
            .collect();
        matches.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        matches.into_iter().take(limit).cloned().collect()
    }

    /// All symbols defined in `path`, ordered by line.
    #[must_use]
    pub fn get_symbols_by_path(&self, path: &str) -> Vec<Symbol> {
        let mut out: Vec<Symbol> = self
            .by_path
            .get(path)
            .map(|set| {
                set.iter()
                    .filter_map(|id| self.symbols.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|s| s.line);
        out
    }

    /// The symbol with its live parent and children. `None` for unknown ids.
    #[must_use]
    pub fn get_symbol_hierarchy(&self, id: &str) -> Option<SymbolHierarchy> {
        let symbol = self.symbols.get(id)?.clone();
        let parent = symbol
            .parent_id
            .as_ref()
            .and_then(|p| self.symbols.get(p))
            .cloned();
        let children = symbol
            .children
            .iter()
            .filter_map(|c| self.symbols.get(c))
            .cloned()
            .collect();
        Some(SymbolHierarchy {
            symbol,
            parent,
            children,
        })
    }

    /// Recorded sites at which `id` is referenced.
    #[must_use]
    pub fn get_references_to(&self, id: &str) -> Vec<ReferenceSite> {
        self.symbols
            .get(id)
            .map(|s| s.references.clone())
            .unwrap_or_default()
    }

    /// Symbols that `id` references (its dependencies).
    #[must_use]
    pub fn get_symbols_referenced_by(&self, id: &str) -> Vec<Symbol> {
        self.collect_edge_targets(self.refs_out.get(id))
    }

    /// Symbols that reference `id` (its dependents).
    #[must_use]
    pub fn get_symbols_that_reference(&self, id: &str) -> Vec<Symbol> {
        self.collect_edge_targets(self.refs_in.get(id))
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    /// Serialize the full index state.
    pub fn export(&self) -> serde_json::Result<String> {
        let mut symbols: Vec<Symbol> = self.symbols.values().cloned().collect();
        symbols.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<(String, String)> = self
            .refs_out
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (from.clone(), to.clone())))
            .collect();
        edges.sort();

        serde_json::to_string(&SymbolSnapshot { symbols, edges })
    }

    /// Rebuild the index from an exported snapshot. The payload is parsed
    /// as a whole first; a malformed payload leaves the prior state
    /// untouched and reports zero imported.
    pub fn import(&mut self, data: &str) -> usize {
        let snapshot: SymbolSnapshot = match serde_json::from_str(data) {
            Ok(s) => s,
            Err(e) => {
                warn!("symbol snapshot rejected: {e}");
                return 0;
            }
        };

        self.clear();
        let count = snapshot.symbols.len();
        for symbol in snapshot.symbols {
            self.add_symbol(symbol);
        }
        for (from, to) in snapshot.edges {
            self.add_reference(&from, &to);
        }
        count
    }

    #[must_use]
    pub fn get_stats(&self) -> SymbolStats {
        let by_kind = self
            .by_kind
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.len()))
            .collect();
        let by_language = self
            .by_language
            .iter()
            .map(|(k, v)| (k.clone(), v.len()))
            .collect();
        SymbolStats {
            total_symbols: self.symbols.len(),
            files: self.by_path.len(),
            reference_edges: self.refs_out.values().map(HashSet::len).sum(),
            trie_nodes: self.trie.node_count(),
            by_kind,
            by_language,
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn attach_secondary(&mut self, symbol: &Symbol) {
        let lowered = symbol.name.to_lowercase();
        self.by_name
            .entry(lowered.clone())
            .or_default()
            .insert(symbol.id.clone());
        self.by_path
            .entry(symbol.path.clone())
            .or_default()
            .insert(symbol.id.clone());
        self.by_kind
            .entry(symbol.kind)
            .or_default()
            .insert(symbol.id.clone());
        self.by_language
            .entry(symbol.language.clone())
            .or_default()
            .insert(symbol.id.clone());
        self.trie.insert(&lowered, &symbol.id);
    }

    fn detach_secondary(&mut self, symbol: &Symbol) {
        let lowered = symbol.name.to_lowercase();
        detach_bucket(&mut self.by_name, &lowered, &symbol.id);
        detach_bucket(&mut self.by_path, &symbol.path, &symbol.id);
        detach_bucket(&mut self.by_language, &symbol.language, &symbol.id);
        if let Some(bucket) = self.by_kind.get_mut(&symbol.kind) {
            bucket.remove(&symbol.id);
            if bucket.is_empty() {
                self.by_kind.remove(&symbol.kind);
            }
        }
        self.trie.remove(&lowered, &symbol.id);
    }

    fn collect_edge_targets(&self, ids: Option<&HashSet<String>>) -> Vec<Symbol> {
        let mut out: Vec<Symbol> = ids
            .map(|set| {
                set.iter()
                    .filter_map(|id| self.symbols.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        out
    }
}

fn detach_bucket(map: &mut HashMap<String, HashSet<String>>, key: &str, id: &str) {
    if let Some(bucket) = map.get_mut(key) {
        bucket.remove(id);
        if bucket.is_empty() {
            map.remove(key);
        }
    }
}
