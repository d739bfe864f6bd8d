/// Pattern-based symbol extraction.
///
/// Deliberately not a parser: per-language regex patterns find declaration
/// lines, block spans come from brace counting (or indentation for Python),
/// and nesting is resolved by span containment. Good enough for search,
/// navigation, and reference tracking; compiler-grade resolution is out of
/// scope.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::symbols::{Symbol, SymbolKind, content_hash};

/// Everything the patterns pulled out of one file.
#[derive(Debug, Default)]
pub struct ExtractedFile {
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<String>,
    pub call_sites: Vec<CallSite>,
}

/// One import statement: the names it brings in and where they come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub names: Vec<String>,
    pub source: String,
    pub line: u32,
}

/// A call-like occurrence of an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub name: String,
    pub line: u32,
}

/// A declaration found on a line, before spans and nesting are resolved.
struct RawDecl {
    name: String,
    kind: SymbolKind,
    /// 0-based line index of the declaration.
    line_idx: usize,
    /// 0-based inclusive end of the block span.
    end_idx: usize,
    column: u32,
    signature: Option<String>,
    return_type: Option<String>,
    parameters: Vec<String>,
    modifiers: Vec<String>,
    documentation: Option<String>,
    /// Go receiver type; forces Method kind and names the parent.
    receiver: Option<String>,
}

struct DeclPattern {
    kind: SymbolKind,
    regex: Regex,
}

fn pattern(kind: SymbolKind, re: &str) -> DeclPattern {
    DeclPattern {
        kind,
        regex: Regex::new(re).expect("static declaration pattern"),
    }
}

// Order matters: the first matching pattern on a line wins.
static TS_PATTERNS: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            SymbolKind::Function,
            r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][A-Za-z0-9_$]*)",
        ),
        pattern(
            SymbolKind::Class,
            r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        ),
        pattern(
            SymbolKind::Interface,
            r"^\s*(?:export\s+)?interface\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        ),
        pattern(
            SymbolKind::Enum,
            r"^\s*(?:export\s+)?(?:const\s+)?enum\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        ),
        pattern(
            SymbolKind::TypeAlias,
            r"^\s*(?:export\s+)?type\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?:<[^>]*>)?\s*=",
        ),
        pattern(
            SymbolKind::Function,
            r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][A-Za-z0-9_$]*\s*=>)",
        ),
        pattern(
            SymbolKind::Constant,
            r"^\s*(?:export\s+)?const\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        ),
        pattern(
            SymbolKind::Variable,
            r"^\s*(?:export\s+)?(?:let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)",
        ),
        pattern(
            SymbolKind::Method,
            r"^\s+(?:(?:public|private|protected|static|readonly|async|override|get|set)\s+)*([A-Za-z_$][A-Za-z0-9_$]*)\s*\([^)]*\)\s*(?::[^{;]+)?\{",
        ),
    ]
});

static RUST_PATTERNS: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    let vis = r"(?:pub(?:\([^)]*\))?\s+)?";
    vec![
        pattern(
            SymbolKind::Function,
            &format!(r#"^\s*{vis}(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)"#),
        ),
        pattern(
            SymbolKind::Struct,
            &format!(r"^\s*{vis}struct\s+([A-Za-z_][A-Za-z0-9_]*)"),
        ),
        pattern(
            SymbolKind::Trait,
            &format!(r"^\s*{vis}(?:unsafe\s+)?trait\s+([A-Za-z_][A-Za-z0-9_]*)"),
        ),
        pattern(
            SymbolKind::Enum,
            &format!(r"^\s*{vis}enum\s+([A-Za-z_][A-Za-z0-9_]*)"),
        ),
        pattern(
            SymbolKind::TypeAlias,
            &format!(r"^\s*{vis}type\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:<[^>]*>)?\s*="),
        ),
        pattern(
            SymbolKind::Constant,
            &format!(r"^\s*{vis}(?:const|static)\s+(?:mut\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*:"),
        ),
        pattern(
            SymbolKind::Module,
            &format!(r"^\s*{vis}mod\s+([A-Za-z_][A-Za-z0-9_]*)"),
        ),
    ]
});

static PYTHON_PATTERNS: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            SymbolKind::Function,
            r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)",
        ),
        pattern(SymbolKind::Class, r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)"),
        pattern(SymbolKind::Constant, r"^([A-Z_][A-Z0-9_]*)\s*="),
    ]
});

static GO_PATTERNS: LazyLock<Vec<DeclPattern>> = LazyLock::new(|| {
    vec![
        pattern(SymbolKind::Function, r"^func\s+([A-Za-z_][A-Za-z0-9_]*)"),
        pattern(
            SymbolKind::Struct,
            r"^type\s+([A-Za-z_][A-Za-z0-9_]*)\s+struct\b",
        ),
        pattern(
            SymbolKind::Interface,
            r"^type\s+([A-Za-z_][A-Za-z0-9_]*)\s+interface\b",
        ),
        pattern(SymbolKind::TypeAlias, r"^type\s+([A-Za-z_][A-Za-z0-9_]*)"),
        pattern(
            SymbolKind::Variable,
            r"^(?:var|const)\s+([A-Za-z_][A-Za-z0-9_]*)",
        ),
    ]
});

/// `func (r *Receiver) Name(...)` — capture 1 is the receiver type,
/// capture 2 the method name.
static GO_METHOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s+\(\s*\w+\s+\*?([A-Za-z_][A-Za-z0-9_]*)\s*\)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static go method pattern")
});

/// `impl Type {` / `impl Trait for Type {` — capture is the self type.
static RUST_IMPL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*impl(?:<[^>]*>)?\s+(?:[A-Za-z_][A-Za-z0-9_:]*(?:<[^>]*>)?\s+for\s+)?([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static impl pattern")
});

static CALL_SITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_$][A-Za-z0-9_$]*)\s*\(").expect("static call pattern")
});

/// Control-flow and declaration keywords that look like calls.
const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "match", "catch", "return", "function", "fn", "def", "new",
    "typeof", "await", "do", "else", "in", "of", "loop", "super", "yield",
];

/// Extract symbols, imports/exports, and call sites from one file.
#[must_use]
pub fn extract(path: &str, content: &str, language: &str) -> ExtractedFile {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return ExtractedFile::default();
    }

    let mut decls = collect_decls(&lines, language);

    // Nesting from span containment (plus impl blocks / Go receivers).
    let impl_spans = if language == "rust" {
        collect_impl_spans(&lines)
    } else {
        Vec::new()
    };
    resolve_nesting(&mut decls, &impl_spans);

    let imports = collect_imports(&lines, language);
    let exports = collect_exports(&lines, language, &decls);
    let call_sites = collect_call_sites(&lines, &decls);

    let symbols = materialize(path, language, &lines, decls);

    ExtractedFile {
        symbols,
        imports,
        exports,
        call_sites,
    }
}

// ── Declarations ─────────────────────────────────────────────────────

fn language_patterns(language: &str) -> Option<&'static [DeclPattern]> {
    match language {
        "typescript" | "javascript" => Some(TS_PATTERNS.as_slice()),
        "rust" => Some(RUST_PATTERNS.as_slice()),
        "python" => Some(PYTHON_PATTERNS.as_slice()),
        "go" => Some(GO_PATTERNS.as_slice()),
        _ => None,
    }
}

fn collect_decls(lines: &[&str], language: &str) -> Vec<RawDecl> {
    let Some(patterns) = language_patterns(language) else {
        return Vec::new();
    };

    let mut decls: Vec<RawDecl> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if is_comment_line(line) {
            continue;
        }

        // Go methods carry their receiver in the declaration itself.
        if language == "go" {
            if let Some(caps) = GO_METHOD.captures(line) {
                let receiver = caps.get(1).map(|m| m.as_str().to_string());
                let name = caps[2].to_string();
                decls.push(raw_decl(name, SymbolKind::Method, idx, lines, language, receiver));
                continue;
            }
        }

        for pat in patterns {
            let Some(caps) = pat.regex.captures(line) else {
                continue;
            };
            let name = caps[1].to_string();
            if pat.kind == SymbolKind::Method && CALL_KEYWORDS.contains(&name.as_str()) {
                break;
            }
            decls.push(raw_decl(name, pat.kind, idx, lines, language, None));
            break;
        }
    }
    decls
}

fn raw_decl(
    name: String,
    kind: SymbolKind,
    line_idx: usize,
    lines: &[&str],
    language: &str,
    receiver: Option<String>,
) -> RawDecl {
    let line = lines[line_idx];
    let end_idx = block_end(lines, line_idx, language);
    let column = (line.len() - line.trim_start().len()) as u32;

    RawDecl {
        signature: extract_signature(line, language),
        return_type: extract_return_type(line, language),
        parameters: extract_parameters(line),
        modifiers: extract_modifiers(line),
        documentation: extract_documentation(lines, line_idx),
        name,
        kind,
        line_idx,
        end_idx,
        column,
        receiver,
    }
}

/// Find the 0-based inclusive end of the block opened at `start`.
fn block_end(lines: &[&str], start: usize, language: &str) -> usize {
    if language == "python" {
        return indent_block_end(lines, start);
    }

    let mut depth = 0i32;
    let mut opened = false;
    for (offset, line) in lines[start..].iter().enumerate() {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return start + offset;
        }
        // A declaration that never opens a block ends where it starts.
        if !opened && (line.trim_end().ends_with(';') || offset >= 1) {
            return start;
        }
    }
    lines.len() - 1
}

fn indent_block_end(lines: &[&str], start: usize) -> usize {
    let base_indent = indent_of(lines[start]);
    let mut end = start;
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= base_indent {
            break;
        }
        end = start + 1 + offset;
    }
    end
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with('*') || trimmed.starts_with("/*")
}

// ── Nesting ──────────────────────────────────────────────────────────

fn collect_impl_spans(lines: &[&str]) -> Vec<(String, usize, usize)> {
    let mut spans = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(caps) = RUST_IMPL.captures(line) {
            let end = block_end(lines, idx, "rust");
            spans.push((caps[1].to_string(), idx, end));
        }
    }
    spans
}

fn resolve_nesting(decls: &mut [RawDecl], impl_spans: &[(String, usize, usize)]) {
    // Innermost container wins; record parent by index into `decls`.
    let containers: Vec<(usize, usize, usize)> = decls
        .iter()
        .enumerate()
        .filter(|(_, d)| d.kind.is_container())
        .map(|(i, d)| (i, d.line_idx, d.end_idx))
        .collect();

    for i in 0..decls.len() {
        let (line_idx, kind) = (decls[i].line_idx, decls[i].kind);
        if kind.is_container() {
            continue;
        }

        // Go receivers name their parent directly.
        if decls[i].receiver.is_some() {
            continue;
        }

        let parent = containers
            .iter()
            .filter(|&&(ci, start, end)| ci != i && start < line_idx && end >= line_idx)
            .max_by_key(|&&(_, start, _)| start)
            .map(|&(ci, _, _)| ci);

        if let Some(parent_idx) = parent {
            decls[i].receiver = Some(decls[parent_idx].name.clone());
            if decls[i].kind == SymbolKind::Function {
                decls[i].kind = SymbolKind::Method;
            }
        } else if let Some(&(ref impl_name, _, _)) = impl_spans
            .iter()
            .filter(|(_, start, end)| *start < line_idx && *end >= line_idx)
            .max_by_key(|(_, start, _)| *start)
        {
            // Function inside an `impl` block is a method of the self type.
            decls[i].receiver = Some(impl_name.clone());
            if decls[i].kind == SymbolKind::Function {
                decls[i].kind = SymbolKind::Method;
            }
        } else if decls[i].kind == SymbolKind::Method {
            // Method pattern outside any container is noise.
            decls[i].kind = SymbolKind::Function;
        }
    }
}

// ── Materialization ──────────────────────────────────────────────────

fn materialize(path: &str, language: &str, lines: &[&str], decls: Vec<RawDecl>) -> Vec<Symbol> {
    // First pass: ids for everything, so parent links can resolve by name.
    let ids: Vec<String> = decls
        .iter()
        .map(|d| Symbol::derive_id(path, d.kind, &d.name, (d.line_idx + 1) as u32))
        .collect();

    let mut symbols: Vec<Symbol> = Vec::with_capacity(decls.len());
    for (i, decl) in decls.iter().enumerate() {
        let span = lines[decl.line_idx..=decl.end_idx].join("\n");

        let parent_id = decl.receiver.as_ref().and_then(|parent_name| {
            decls
                .iter()
                .enumerate()
                .filter(|(j, d)| *j != i && d.name == *parent_name && d.kind.is_container())
                .map(|(j, _)| ids[j].clone())
                .next()
        });

        symbols.push(Symbol {
            id: ids[i].clone(),
            name: decl.name.clone(),
            kind: decl.kind,
            path: path.to_string(),
            line: (decl.line_idx + 1) as u32,
            end_line: (decl.end_idx + 1) as u32,
            column: decl.column,
            language: language.to_string(),
            signature: decl.signature.clone(),
            return_type: decl.return_type.clone(),
            parameters: decl.parameters.clone(),
            modifiers: decl.modifiers.clone(),
            documentation: decl.documentation.clone(),
            parent_id,
            children: Vec::new(),
            references: Vec::new(),
            content_hash: content_hash(&span),
            content: span,
            usage_count: 0,
        });
    }

    // Children back-links.
    let child_links: Vec<(String, String)> = symbols
        .iter()
        .filter_map(|s| s.parent_id.clone().map(|p| (p, s.id.clone())))
        .collect();
    for (parent_id, child_id) in child_links {
        if let Some(parent) = symbols.iter_mut().find(|s| s.id == parent_id) {
            parent.children.push(child_id);
        }
    }

    symbols
}

// ── Declaration metadata ─────────────────────────────────────────────

/// First line of the declaration up to the body, whitespace collapsed.
fn extract_signature(line: &str, language: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cut = match language {
        "python" => trimmed.rfind(':'),
        "typescript" | "javascript" => trimmed
            .find("=>")
            .map(|i| i + 2)
            .or_else(|| trimmed.find('{')),
        _ => trimmed.find('{'),
    };

    let head = match cut {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn extract_return_type(line: &str, language: &str) -> Option<String> {
    match language {
        "rust" | "python" => {
            let after = line.split("->").nth(1)?;
            let cut = after.find(['{', ':']).unwrap_or(after.len());
            let ty = after[..cut].trim();
            (!ty.is_empty()).then(|| ty.to_string())
        }
        "typescript" => {
            let close = line.find(')')?;
            let rest = line[close + 1..].trim_start();
            let ty = rest.strip_prefix(':')?;
            let cut = ty.find(['{', '=']).unwrap_or(ty.len());
            let ty = ty[..cut].trim();
            (!ty.is_empty()).then(|| ty.to_string())
        }
        _ => None,
    }
}

fn extract_parameters(line: &str) -> Vec<String> {
    let open = match line.find('(') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let close = match line[open..].find(')') {
        Some(i) => open + i,
        None => return Vec::new(),
    };

    line[open + 1..close]
        .split(',')
        .map(|p| {
            p.split([':', '=']).next().unwrap_or("").trim()
                .trim_start_matches('&')
                .trim_start_matches("mut ")
                .to_string()
        })
        .filter(|p| !p.is_empty() && p != "self" && p != "&self")
        .collect()
}

fn extract_modifiers(line: &str) -> Vec<String> {
    const MODIFIERS: &[&str] = &[
        "export", "default", "async", "static", "abstract", "public", "private", "protected",
        "readonly", "pub", "unsafe", "const",
    ];
    let head: Vec<&str> = line.trim_start().split_whitespace().take(4).collect();
    MODIFIERS
        .iter()
        .filter(|m| head.iter().any(|w| w.trim_end_matches("(crate)") == **m))
        .map(|m| (*m).to_string())
        .collect()
}

/// Contiguous comment lines immediately above the declaration.
fn extract_documentation(lines: &[&str], decl_idx: usize) -> Option<String> {
    let mut docs: Vec<String> = Vec::new();
    for line in lines[..decl_idx].iter().rev() {
        let trimmed = line.trim();
        let text = trimmed
            .strip_prefix("///")
            .or_else(|| trimmed.strip_prefix("//"))
            .or_else(|| trimmed.strip_prefix("/**"))
            .or_else(|| trimmed.strip_prefix('*'))
            .or_else(|| trimmed.strip_prefix('#'));
        match text {
            Some(t) => docs.push(t.trim_end_matches("*/").trim().to_string()),
            None => break,
        }
        if docs.len() >= 5 {
            break;
        }
    }
    if docs.is_empty() {
        return None;
    }
    docs.reverse();
    let joined = docs.join(" ").trim().to_string();
    (!joined.is_empty()).then_some(joined)
}

// ── Imports / exports / call sites ───────────────────────────────────

static TS_IMPORT_NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s+(?:type\s+)?\{([^}]*)\}\s*from\s*['"]([^'"]+)['"]"#).expect("pattern")
});
static TS_IMPORT_DEFAULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\s+([A-Za-z_$][A-Za-z0-9_$]*)\s*(?:,[^'"]*)?from\s*['"]([^'"]+)['"]"#)
        .expect("pattern")
});
static TS_EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s*\{([^}]*)\}").expect("pattern"));
static RUST_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:pub\s+)?use\s+([A-Za-z0-9_:]+)(?:::\{([^}]*)\})?").expect("pattern")
});
static PY_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+([\w.]+)").expect("pattern"));
static PY_FROM_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+([\w.]+)\s+import\s+(.+)").expect("pattern"));
static GO_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("pattern"));

fn collect_imports(lines: &[&str], language: &str) -> Vec<ImportRecord> {
    let mut imports = Vec::new();
    let mut in_go_import_block = false;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = (idx + 1) as u32;
        match language {
            "typescript" | "javascript" => {
                if let Some(caps) = TS_IMPORT_NAMED.captures(line) {
                    imports.push(ImportRecord {
                        names: split_name_list(&caps[1]),
                        source: caps[2].to_string(),
                        line: line_no,
                    });
                } else if let Some(caps) = TS_IMPORT_DEFAULT.captures(line) {
                    imports.push(ImportRecord {
                        names: vec![caps[1].to_string()],
                        source: caps[2].to_string(),
                        line: line_no,
                    });
                }
            }
            "rust" => {
                if let Some(caps) = RUST_USE.captures(line) {
                    let source = caps[1].to_string();
                    let names = match caps.get(2) {
                        Some(list) => split_name_list(list.as_str()),
                        None => source
                            .rsplit("::")
                            .next()
                            .map(|n| vec![n.to_string()])
                            .unwrap_or_default(),
                    };
                    imports.push(ImportRecord {
                        names,
                        source,
                        line: line_no,
                    });
                }
            }
            "python" => {
                if let Some(caps) = PY_FROM_IMPORT.captures(line) {
                    imports.push(ImportRecord {
                        names: split_name_list(&caps[2]),
                        source: caps[1].to_string(),
                        line: line_no,
                    });
                } else if let Some(caps) = PY_IMPORT.captures(line) {
                    imports.push(ImportRecord {
                        names: vec![caps[1].to_string()],
                        source: caps[1].to_string(),
                        line: line_no,
                    });
                }
            }
            "go" => {
                let trimmed = line.trim();
                if trimmed.starts_with("import (") {
                    in_go_import_block = true;
                    continue;
                }
                if in_go_import_block && trimmed.starts_with(')') {
                    in_go_import_block = false;
                    continue;
                }
                if in_go_import_block || trimmed.starts_with("import ") {
                    if let Some(caps) = GO_IMPORT.captures(trimmed) {
                        let source = caps[1].to_string();
                        let name = source.rsplit('/').next().unwrap_or(&source).to_string();
                        imports.push(ImportRecord {
                            names: vec![name],
                            source,
                            line: line_no,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    imports
}

fn collect_exports(lines: &[&str], language: &str, decls: &[RawDecl]) -> Vec<String> {
    let mut exports: Vec<String> = Vec::new();

    match language {
        "typescript" | "javascript" => {
            for decl in decls {
                if decl.modifiers.iter().any(|m| m == "export") {
                    exports.push(decl.name.clone());
                }
            }
            for line in lines {
                if let Some(caps) = TS_EXPORT_LIST.captures(line) {
                    exports.extend(split_name_list(&caps[1]));
                }
            }
        }
        "rust" => {
            for decl in decls {
                if decl.modifiers.iter().any(|m| m == "pub") {
                    exports.push(decl.name.clone());
                }
            }
        }
        "go" => {
            // Uppercase initial means exported.
            for decl in decls {
                if decl.name.chars().next().is_some_and(char::is_uppercase) {
                    exports.push(decl.name.clone());
                }
            }
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    exports.retain(|name| seen.insert(name.clone()));
    exports
}

fn collect_call_sites(lines: &[&str], decls: &[RawDecl]) -> Vec<CallSite> {
    // Skip self-matches on the declaration line of the same name.
    let decl_lines: HashSet<(usize, &str)> = decls
        .iter()
        .map(|d| (d.line_idx, d.name.as_str()))
        .collect();

    let mut seen: HashSet<(String, u32)> = HashSet::new();
    let mut sites = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if is_comment_line(line) {
            continue;
        }
        for caps in CALL_SITE.captures_iter(line) {
            let name = &caps[1];
            if CALL_KEYWORDS.contains(&name) {
                continue;
            }
            if decl_lines.contains(&(idx, name)) {
                continue;
            }
            let line_no = (idx + 1) as u32;
            if seen.insert((name.to_string(), line_no)) {
                sites.push(CallSite {
                    name: name.to_string(),
                    line: line_no,
                });
            }
        }
    }
    sites
}

fn split_name_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|n| {
            n.split_whitespace()
                .next()
                .unwrap_or("")
                .trim_matches(|c| c == '{' || c == '}')
                .to_string()
        })
        .filter(|n| !n.is_empty() && n != "*")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS_SOURCE: &str = r#"import { Logger } from './logger';
import config from './config';

// Loads one user record from the API.
export async function getUserData(userId: string): Promise<User> {
    const response = await fetchJson(`/api/users/${userId}`);
    return parseUser(response);
}

export class UserService {
    private cache: Map<string, User> = new Map();

    load(userId: string): User {
        return getUserData(userId);
    }

    invalidate(userId: string) {
        this.cache.delete(userId);
    }
}

export interface User {
    id: string;
    name: string;
}

export const MAX_RETRIES = 3;

export { getUserData, UserService };
"#;

    #[test]
    fn test_ts_extraction_finds_declarations() {
        let extracted = extract("/api/user.ts", TS_SOURCE, "typescript");
        let names: Vec<(&str, SymbolKind)> = extracted
            .symbols
            .iter()
            .map(|s| (s.name.as_str(), s.kind))
            .collect();

        assert!(names.contains(&("getUserData", SymbolKind::Function)));
        assert!(names.contains(&("UserService", SymbolKind::Class)));
        assert!(names.contains(&("User", SymbolKind::Interface)));
        assert!(names.contains(&("MAX_RETRIES", SymbolKind::Constant)));
        assert!(names.contains(&("load", SymbolKind::Method)));
        assert!(names.contains(&("invalidate", SymbolKind::Method)));
    }

    #[test]
    fn test_ts_methods_are_nested_under_class() {
        let extracted = extract("/api/user.ts", TS_SOURCE, "typescript");
        let class = extracted
            .symbols
            .iter()
            .find(|s| s.name == "UserService")
            .unwrap();
        let method = extracted.symbols.iter().find(|s| s.name == "load").unwrap();

        assert_eq!(method.parent_id.as_deref(), Some(class.id.as_str()));
        assert!(class.children.contains(&method.id));
    }

    #[test]
    fn test_ts_spans_cover_bodies() {
        let extracted = extract("/api/user.ts", TS_SOURCE, "typescript");
        let function = extracted
            .symbols
            .iter()
            .find(|s| s.name == "getUserData")
            .unwrap();
        assert_eq!(function.line, 5);
        assert_eq!(function.end_line, 8);
        assert!(function.content.contains("parseUser"));
    }

    #[test]
    fn test_ts_metadata() {
        let extracted = extract("/api/user.ts", TS_SOURCE, "typescript");
        let function = extracted
            .symbols
            .iter()
            .find(|s| s.name == "getUserData")
            .unwrap();

        assert!(function.modifiers.contains(&"export".to_string()));
        assert!(function.modifiers.contains(&"async".to_string()));
        assert_eq!(function.parameters, vec!["userId".to_string()]);
        assert_eq!(function.return_type.as_deref(), Some("Promise<User>"));
        assert!(
            function
                .documentation
                .as_deref()
                .unwrap()
                .contains("user record")
        );
        assert!(function.signature.as_deref().unwrap().starts_with("export async function"));
    }

    #[test]
    fn test_ts_imports_and_exports() {
        let extracted = extract("/api/user.ts", TS_SOURCE, "typescript");

        assert_eq!(extracted.imports.len(), 2);
        assert_eq!(extracted.imports[0].names, vec!["Logger".to_string()]);
        assert_eq!(extracted.imports[0].source, "./logger");
        assert_eq!(extracted.imports[1].names, vec!["config".to_string()]);

        assert!(extracted.exports.contains(&"getUserData".to_string()));
        assert!(extracted.exports.contains(&"UserService".to_string()));
        assert!(extracted.exports.contains(&"MAX_RETRIES".to_string()));
    }

    #[test]
    fn test_ts_call_sites() {
        let extracted = extract("/api/user.ts", TS_SOURCE, "typescript");
        let names: Vec<&str> = extracted.call_sites.iter().map(|c| c.name.as_str()).collect();

        assert!(names.contains(&"fetchJson"));
        assert!(names.contains(&"parseUser"));
        assert!(names.contains(&"getUserData"), "call inside load()");
        assert!(!names.contains(&"if"), "keywords are not calls");
    }

    const RUST_SOURCE: &str = r#"use std::collections::HashMap;

pub struct Cache {
    entries: HashMap<String, String>,
}

impl Cache {
    pub fn insert(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
    }

    pub fn lookup(&self, key: &str) -> Option<&String> {
        self.entries.get(key)
    }
}

pub fn build_cache() -> Cache {
    Cache {
        entries: HashMap::new(),
    }
}
"#;

    #[test]
    fn test_rust_extraction() {
        let extracted = extract("/src/cache.rs", RUST_SOURCE, "rust");

        let cache = extracted.symbols.iter().find(|s| s.name == "Cache").unwrap();
        assert_eq!(cache.kind, SymbolKind::Struct);

        let insert = extracted.symbols.iter().find(|s| s.name == "insert").unwrap();
        assert_eq!(insert.kind, SymbolKind::Method, "fn in impl is a method");
        assert_eq!(insert.parent_id.as_deref(), Some(cache.id.as_str()));

        let build = extracted
            .symbols
            .iter()
            .find(|s| s.name == "build_cache")
            .unwrap();
        assert_eq!(build.kind, SymbolKind::Function);
        assert_eq!(build.return_type.as_deref(), Some("Cache"));
        assert!(build.parent_id.is_none());
    }

    #[test]
    fn test_rust_imports() {
        let extracted = extract("/src/cache.rs", RUST_SOURCE, "rust");
        assert_eq!(extracted.imports.len(), 1);
        assert_eq!(extracted.imports[0].names, vec!["HashMap".to_string()]);
        assert_eq!(extracted.imports[0].source, "std::collections::HashMap");
    }

    const PY_SOURCE: &str = r#"from pathlib import Path

MAX_DEPTH = 5

class Walker:
    def walk(self, root):
        for entry in scan(root):
            self.visit(entry)

    def visit(self, entry):
        print(entry)

def scan(root):
    return Path(root).iterdir()
"#;

    #[test]
    fn test_python_extraction_uses_indentation() {
        let extracted = extract("/tools/walker.py", PY_SOURCE, "python");

        let class = extracted.symbols.iter().find(|s| s.name == "Walker").unwrap();
        assert_eq!(class.kind, SymbolKind::Class);

        let walk = extracted.symbols.iter().find(|s| s.name == "walk").unwrap();
        assert_eq!(walk.kind, SymbolKind::Method);
        assert_eq!(walk.parent_id.as_deref(), Some(class.id.as_str()));

        let scan = extracted.symbols.iter().find(|s| s.name == "scan").unwrap();
        assert_eq!(scan.kind, SymbolKind::Function);
        assert!(scan.parent_id.is_none(), "top-level def is not nested");

        let constant = extracted
            .symbols
            .iter()
            .find(|s| s.name == "MAX_DEPTH")
            .unwrap();
        assert_eq!(constant.kind, SymbolKind::Constant);
    }

    const GO_SOURCE: &str = r#"package server

import (
    "fmt"
    "net/http"
)

type Handler struct {
    routes map[string]string
}

func (h *Handler) Serve(w http.ResponseWriter) {
    fmt.Fprintln(w, "ok")
}

func NewHandler() *Handler {
    return &Handler{}
}
"#;

    #[test]
    fn test_go_extraction() {
        let extracted = extract("/srv/handler.go", GO_SOURCE, "go");

        let handler = extracted.symbols.iter().find(|s| s.name == "Handler").unwrap();
        assert_eq!(handler.kind, SymbolKind::Struct);

        let serve = extracted.symbols.iter().find(|s| s.name == "Serve").unwrap();
        assert_eq!(serve.kind, SymbolKind::Method);
        assert_eq!(serve.parent_id.as_deref(), Some(handler.id.as_str()));

        assert!(extracted.exports.contains(&"NewHandler".to_string()));
        let sources: Vec<&str> = extracted.imports.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["fmt", "net/http"]);
    }

    #[test]
    fn test_unknown_language_yields_nothing() {
        let extracted = extract("/notes.md", "# heading\nsome text", "markdown");
        assert!(extracted.symbols.is_empty());
        assert!(extracted.imports.is_empty());
    }

    #[test]
    fn test_comment_lines_are_skipped() {
        let source = "// function ghost() {}\nfunction real() {}\n";
        let extracted = extract("/a.js", source, "javascript");
        assert_eq!(extracted.symbols.len(), 1);
        assert_eq!(extracted.symbols[0].name, "real");
    }

    #[test]
    fn test_ids_stable_across_reextraction() {
        let first = extract("/api/user.ts", TS_SOURCE, "typescript");
        let second = extract("/api/user.ts", TS_SOURCE, "typescript");
        let first_ids: Vec<&String> = first.symbols.iter().map(|s| &s.id).collect();
        let second_ids: Vec<&String> = second.symbols.iter().map(|s| &s.id).collect();
        assert_eq!(first_ids, second_ids);
    }
}
