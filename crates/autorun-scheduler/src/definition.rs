//! Parser for automation definition files.
//!
//! Definitions use a small subset of a TOML-like format:
//!
//! ```text
//! # comment
//! id = "nightly"
//! enabled = true
//! cwds = ["../a", "b"]
//!
//! [handler.options]
//! retries = 3
//! ```
//!
//! The parser is lenient. Lines it cannot make sense of are skipped rather
//! than rejected, and are reported through [`ParsedDefinition::ignored`].
//! Comments are stripped before anything else, so a `#` inside a quoted
//! string still starts a comment. Multi-line strings, inline tables, escape
//! sequences and typed dates are not supported.
//!
//! An empty value (`key =`) is the empty string, not the number 0.

use std::collections::BTreeMap;
use std::fmt;

/// A mapping of keys to parsed values.
pub type Table = BTreeMap<String, Value>;

/// A parsed definition value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Number(f64),
    List(Vec<Value>),
    Table(Table),
}

impl Value {
    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Render scalars the way they would be written on the command line.
    ///
    /// Numbers without a fractional part print as integers, so `port = 8080`
    /// becomes `"8080"` rather than `"8080.0"`.
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::List(_) | Value::Table(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Table(table) => write!(f, "<table with {} keys>", table.len()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A line the parser skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredLine {
    /// 1-based line number.
    pub line: usize,
    /// The line with its comment stripped.
    pub text: String,
}

/// Result of parsing a definition document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDefinition {
    /// Top-level fields; sections appear as nested [`Value::Table`]s.
    pub fields: Table,
    /// Non-blank lines that were neither a section header nor `key = value`.
    pub ignored: Vec<IgnoredLine>,
}

/// Parse a definition document into a field mapping.
///
/// Never fails: malformed lines are dropped. Use [`parse_document`] to see
/// which lines were dropped.
pub fn parse(text: &str) -> Table {
    parse_document(text).fields
}

/// Parse a definition document, keeping track of skipped lines.
pub fn parse_document(text: &str) -> ParsedDefinition {
    let mut parsed = ParsedDefinition::default();
    let mut section: Vec<String> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(path) = section_header(line) {
            ensure_table(&mut parsed.fields, &path);
            section = path;
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            parsed.ignored.push(IgnoredLine {
                line: index + 1,
                text: line.to_string(),
            });
            continue;
        };

        let key = unquote(key.trim());
        if key.is_empty() {
            parsed.ignored.push(IgnoredLine {
                line: index + 1,
                text: line.to_string(),
            });
            continue;
        }

        ensure_table(&mut parsed.fields, &section).insert(key.to_string(), parse_value(value.trim()));
    }

    parsed
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Recognize `[a.b]` and return its path segments.
fn section_header(line: &str) -> Option<Vec<String>> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() || inner.contains(['[', ']', '=']) {
        return None;
    }

    let path: Vec<String> = inner
        .split('.')
        .map(|segment| unquote(segment.trim()).to_string())
        .filter(|segment| !segment.is_empty())
        .collect();

    if path.is_empty() { None } else { Some(path) }
}

/// Walk to the table at `path`, creating (or replacing non-table values with)
/// empty tables along the way.
fn ensure_table<'a>(root: &'a mut Table, path: &[String]) -> &'a mut Table {
    let mut table = root;
    for segment in path {
        let slot = table
            .entry(segment.clone())
            .or_insert_with(|| Value::Table(Table::new()));
        if !matches!(slot, Value::Table(_)) {
            *slot = Value::Table(Table::new());
        }
        table = match slot {
            Value::Table(child) => child,
            _ => unreachable!("slot was just set to a table"),
        };
    }
    table
}

fn unquote(s: &str) -> &str {
    if s.len() >= 2 {
        for quote in ['"', '\''] {
            if s.starts_with(quote) && s.ends_with(quote) {
                return &s[1..s.len() - 1];
            }
        }
    }
    s
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

/// Parse a single right-hand-side value.
pub fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();

    if is_quoted(raw) {
        return Value::String(unquote(raw).to_string());
    }

    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return Value::List(split_list(inner).into_iter().map(parse_value).collect());
    }

    match coerce_number(raw) {
        Some(n) => Value::Number(n),
        None => Value::String(raw.to_string()),
    }
}

/// Split list contents on top-level commas, respecting quotes and nested
/// brackets. Empty elements (e.g. from a trailing comma) are dropped.
fn split_list(inner: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (pos, c) in inner.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                items.push(&inner[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }
    items.push(&inner[start..]);

    items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Interpret `s` as a numeric literal.
///
/// Accepts signed decimals, exponents, and unsigned `0x`/`0o`/`0b` integers.
/// Non-finite results and the empty string are not numbers.
fn coerce_number(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }

    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)];
    for (prefix, base) in radix {
        if let Some(digits) = s.strip_prefix(prefix) {
            return u64::from_str_radix(digits, base).ok().map(|n| n as f64);
        }
    }

    // Rust also accepts "inf"/"nan" spellings; those stay strings.
    let starts_numeric = s
        .trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_digit() || c == '.');
    if !starts_numeric {
        return None;
    }

    s.parse::<f64>().ok().filter(|n| n.is_finite())
}
