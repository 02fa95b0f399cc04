// SQL INSERT dump parsing
//
// Restricted dialect: `INSERT INTO <table> (<cols>) VALUES (<tuple>),(<tuple>),...;`
// repeated any number of times per file. Everything between statements (DDL,
// comments, SET directives) is ignored.

use std::fmt;
use std::path::Path;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Values + rows
// ---------------------------------------------------------------------------

/// A decoded scalar from a VALUES tuple.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form for keys and display. `None` for NULL.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One tuple of one INSERT statement, zipped with the statement's column list.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub entity_type: String,
    pub table: String,
    /// 1-based line where the owning statement starts.
    pub line: usize,
    /// 1-based position of the tuple inside its statement.
    pub tuple: usize,
    pub fields: Vec<(String, Value)>,
}

impl SourceRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parse output + errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DumpError {
    #[error("not an INSERT INTO statement")]
    NotAnInsert,
    #[error("missing column list")]
    MissingColumns,
    #[error("missing VALUES keyword")]
    MissingValues,
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("unterminated quoted literal")]
    UnterminatedLiteral,
    #[error("unexpected text between tuples near '{0}'")]
    UnexpectedText(String),
}

/// Non-fatal problem found while parsing. Parsing always continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    /// 1-based line of the offending statement; 0 for file-level warnings.
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutput {
    pub rows: Vec<SourceRow>,
    pub warnings: Vec<ParseWarning>,
    /// INSERT statements seen, including skipped malformed ones.
    pub statements: usize,
}

impl ParseOutput {
    fn warn(&mut self, line: usize, message: impl Into<String>) {
        let warning = ParseWarning { line, message: message.into() };
        log::warn!("dump: {warning}");
        self.warnings.push(warning);
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Parse a dump file. A missing, unreadable or empty file yields an empty
/// output with a warning; the caller decides whether that is fatal.
pub fn parse_file(path: &Path, entity_type: &str) -> ParseOutput {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            let mut out = ParseOutput::default();
            out.warn(0, format!("cannot read {}: {e}", path.display()));
            return out;
        }
    };

    let text = String::from_utf8_lossy(&bytes);
    if text.trim().is_empty() {
        let mut out = ParseOutput::default();
        out.warn(0, format!("{} is empty", path.display()));
        return out;
    }

    parse_str(&text, entity_type)
}

/// Parse dump text. Rows come out in file order across all statements.
pub fn parse_str(text: &str, entity_type: &str) -> ParseOutput {
    let mut out = ParseOutput::default();

    for (line, raw) in statement_spans(text) {
        out.statements += 1;
        let normalized = collapse_whitespace(raw);

        let stmt = match parse_statement(&normalized) {
            Ok(stmt) => stmt,
            Err(e) => {
                out.warn(line, format!("skipped statement: {e}"));
                continue;
            }
        };

        let tuples = match split_tuples(stmt.values) {
            Ok(t) => t,
            Err(e) => {
                out.warn(line, format!("skipped statement on `{}`: {e}", stmt.table));
                continue;
            }
        };

        for (ti, tuple) in tuples.iter().enumerate() {
            let tokens = match split_tuple(tuple) {
                Ok(t) => t,
                Err(e) => {
                    out.warn(line, format!("skipped tuple {}: {e}", ti + 1));
                    continue;
                }
            };
            if tokens.len() > stmt.columns.len() {
                out.warn(
                    line,
                    format!(
                        "skipped tuple {}: {} values for {} columns",
                        ti + 1,
                        tokens.len(),
                        stmt.columns.len()
                    ),
                );
                continue;
            }

            let mut values = tokens.into_iter().map(decode_value);
            let fields = stmt
                .columns
                .iter()
                .map(|col| (col.clone(), values.next().unwrap_or(Value::Null)))
                .collect();

            out.rows.push(SourceRow {
                entity_type: entity_type.to_string(),
                table: stmt.table.clone(),
                line,
                tuple: ti + 1,
                fields,
            });
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Statement scanning
// ---------------------------------------------------------------------------

/// Locate INSERT statements in raw text. Returns (start line, statement text
/// without the terminating `;`). Comments outside statements are skipped.
fn statement_spans(text: &str) -> Vec<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    let mut line = 1;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'#' => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find_block_end(bytes, i + 2);
                line += count_newlines(&bytes[i..end]);
                i = end;
            }
            _ if starts_insert_into(bytes, i) => {
                let end = statement_end(bytes, i);
                spans.push((line, &text[i..end]));
                line += count_newlines(&bytes[i..end]);
                i = end + 1;
            }
            _ => i += 1,
        }
    }

    spans
}

fn skip_line(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| from + p)
        .unwrap_or(bytes.len())
}

fn find_block_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|p| from + p + 2)
        .unwrap_or(bytes.len())
}

fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// `INSERT <ws> INTO <ws|quote>` at `i`, on a word boundary.
fn starts_insert_into(bytes: &[u8], i: usize) -> bool {
    if i > 0 && is_ident_byte(bytes[i - 1]) {
        return false;
    }
    let Some(head) = bytes.get(i..i + 6) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(b"INSERT") {
        return false;
    }
    let mut j = i + 6;
    let ws_start = j;
    while j < bytes.len() && bytes[j].is_ascii_whitespace() {
        j += 1;
    }
    if j == ws_start {
        return false;
    }
    match bytes.get(j..j + 4) {
        Some(kw) if kw.eq_ignore_ascii_case(b"INTO") => {
            matches!(bytes.get(j + 4), Some(b) if b.is_ascii_whitespace() || *b == b'`' || *b == b'"')
        }
        _ => false,
    }
}

/// Index of the terminating `;` outside any quoted literal, or end of input.
fn statement_end(bytes: &[u8], from: usize) -> usize {
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => {
                i += 2;
                continue;
            }
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b';' => return i,
            None => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Collapse whitespace runs outside quoted literals to one space.
/// Literal contents are kept byte for byte.
fn collapse_whitespace(stmt: &str) -> String {
    let mut out = String::with_capacity(stmt.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;

    for c in stmt.chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
        out.push(c);
    }

    out
}

// ---------------------------------------------------------------------------
// Statement structure
// ---------------------------------------------------------------------------

struct InsertStatement<'a> {
    table: String,
    columns: Vec<String>,
    values: &'a str,
}

fn strip_keyword<'a>(s: &'a str, kw: &str) -> Option<&'a str> {
    let s = s.trim_start();
    let head = s.get(..kw.len())?;
    if head.eq_ignore_ascii_case(kw) {
        Some(&s[kw.len()..])
    } else {
        None
    }
}

fn parse_statement(stmt: &str) -> Result<InsertStatement<'_>, DumpError> {
    let rest = strip_keyword(stmt, "INSERT")
        .and_then(|r| strip_keyword(r, "INTO"))
        .ok_or(DumpError::NotAnInsert)?
        .trim_start();

    // Table identifier: bare, `quoted`, "quoted" or `db`.`table`.
    let ident_end = rest
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(rest.len());
    let table: String = rest[..ident_end]
        .chars()
        .filter(|&c| c != '`' && c != '"')
        .collect();
    if table.is_empty() {
        return Err(DumpError::NotAnInsert);
    }

    let rest = rest[ident_end..].trim_start();
    let Some(rest) = rest.strip_prefix('(') else {
        return Err(DumpError::MissingColumns);
    };
    let close = rest.find(')').ok_or(DumpError::UnbalancedParens)?;
    let columns = split_columns(&rest[..close]);
    if columns.is_empty() {
        return Err(DumpError::MissingColumns);
    }

    let values = strip_keyword(&rest[close + 1..], "VALUES")
        .ok_or(DumpError::MissingValues)?
        .trim();

    Ok(InsertStatement { table, columns, values })
}

fn split_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(|c| {
            c.trim_matches(|ch: char| ch == '`' || ch == '"' || ch == '\'' || ch.is_whitespace())
                .to_string()
        })
        .filter(|c| !c.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Tuple + value scanners
// ---------------------------------------------------------------------------

/// Split a VALUES blob into parenthesized tuples (outer parentheses kept).
///
/// A tuple closes only when paren depth returns to zero; parentheses and
/// commas inside quoted literals are ignored.
pub fn split_tuples(blob: &str) -> Result<Vec<&str>, DumpError> {
    let bytes = blob.as_bytes();
    let mut tuples = Vec::new();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'(' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b')' => {
                if depth == 0 {
                    return Err(DumpError::UnbalancedParens);
                }
                depth -= 1;
                if depth == 0 {
                    tuples.push(&blob[start..=i]);
                }
            }
            b'\'' | b'"' if depth > 0 => quote = Some(b),
            b',' | b';' => {}
            _ if b.is_ascii_whitespace() => {}
            _ if depth == 0 => {
                let tail: String = blob[i..].chars().take(16).collect();
                return Err(DumpError::UnexpectedText(tail));
            }
            _ => {}
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(DumpError::UnterminatedLiteral);
    }
    if depth != 0 {
        return Err(DumpError::UnbalancedParens);
    }
    Ok(tuples)
}

/// Strip a tuple's outer parentheses and split it into raw value tokens.
pub fn split_tuple(tuple: &str) -> Result<Vec<&str>, DumpError> {
    let inner = tuple
        .trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or(DumpError::UnbalancedParens)?;
    split_values(inner)
}

/// Quote-aware comma split of a tuple body. Tokens are trimmed; quotes are
/// kept so `decode_value` can tell `'NULL'` from `NULL`.
pub fn split_values(inner: &str) -> Result<Vec<&str>, DumpError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    let bytes = inner.as_bytes();
    let mut values = Vec::new();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => {
                // escape: next byte is taken verbatim
                i += 2;
                continue;
            }
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => {
                    values.push(inner[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(DumpError::UnterminatedLiteral);
    }
    values.push(inner[start..].trim());
    Ok(values)
}

/// Decode one raw token.
///
/// - unquoted `NULL` (any case) → `Null`
/// - quoted → text with `\'`, `\"`, `\\` and doubled quotes resolved
/// - numeric → `Int`/`Float`, except leading-zero codes like `007`
/// - anything else → raw text
pub fn decode_value(token: &str) -> Value {
    let token = token.trim();

    if token.eq_ignore_ascii_case("NULL") {
        return Value::Null;
    }

    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let q = bytes[0];
        if (q == b'\'' || q == b'"') && bytes[bytes.len() - 1] == q {
            return Value::Text(unescape(&token[1..token.len() - 1], q as char));
        }
    }

    decode_number(token).unwrap_or_else(|| Value::Text(token.to_string()))
}

fn unescape(inner: &str, quote: char) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n @ ('\'' | '"' | '\\')) => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
        } else if c == quote && chars.peek() == Some(&quote) {
            chars.next();
            out.push(quote);
        } else {
            out.push(c);
        }
    }

    out
}

fn decode_number(token: &str) -> Option<Value> {
    let unsigned = token.strip_prefix('-').unwrap_or(token);
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || frac_part.is_some_and(|f| !all_digits(f)) {
        return None;
    }
    // Leading-zero codes ("007", "042") are identifiers, not numbers.
    if int_part.len() > 1 && int_part.starts_with('0') {
        return None;
    }

    match frac_part {
        None => token.parse::<i64>().ok().map(Value::Int),
        Some(_) => token.parse::<f64>().ok().map(Value::Float),
    }
}
