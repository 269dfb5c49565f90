//! Source query composition and inspection
//!
//! Offset paging is only well defined over a stable order, so every query must
//! carry a top-level `ORDER BY` and must leave `OFFSET`/`FETCH`/`LIMIT` to the
//! row source. The inspection here is a small tokenizer, not a SQL parser: it
//! skips string literals, comments and parenthesised sub-expressions and looks
//! at the remaining top-level keywords.

use crate::{ConfigError, Result, SourceConfig};

/// Top-level facts about a query that matter for paging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryShape {
    /// Leading column of the top-level ORDER BY, unquoted and unqualified
    pub order_by_leading: Option<String>,
    pub has_order_by: bool,
    pub has_offset: bool,
    pub has_fetch: bool,
    pub has_limit: bool,
}

/// Build the base query for the configured source.
pub fn resolve_query(source: &SourceConfig) -> Result<String> {
    match (&source.table, &source.query) {
        (Some(_), Some(_)) => Err(ConfigError::invalid(
            "source.table and source.query are mutually exclusive",
        )),
        (None, None) => Err(ConfigError::invalid(
            "either source.table or source.query is required",
        )),
        (None, Some(query)) => {
            let trimmed = query.trim().trim_end_matches(';').trim_end();
            if trimmed.is_empty() {
                return Err(ConfigError::invalid("source.query must not be empty"));
            }
            Ok(trimmed.to_string())
        }
        (Some(table), None) => {
            validate_identifier("source.table", table)?;

            let order_by = source.order_by.as_deref().map(str::trim).unwrap_or("");
            if order_by.is_empty() {
                return Err(ConfigError::invalid(
                    "source.order_by is required with source.table; paging needs a deterministic order",
                ));
            }
            validate_order_by(order_by)?;

            let columns = match &source.columns {
                Some(columns) if !columns.is_empty() => {
                    for column in columns {
                        validate_identifier("source.columns", column)?;
                    }
                    columns.join(", ")
                }
                _ => "*".to_string(),
            };

            Ok(format!(
                "SELECT {} FROM {} ORDER BY {}",
                columns, table, order_by
            ))
        }
    }
}

/// Inspect the top level of `sql`.
pub fn inspect_query(sql: &str) -> QueryShape {
    let tokens = top_level_tokens(sql);
    let mut shape = QueryShape::default();

    for token in &tokens {
        if let Token::Word(word) = token {
            match word.to_ascii_uppercase().as_str() {
                "OFFSET" => shape.has_offset = true,
                "FETCH" => shape.has_fetch = true,
                "LIMIT" => shape.has_limit = true,
                _ => {}
            }
        }
    }

    // Last top-level ORDER BY wins (e.g. after a UNION)
    let order_by_at = tokens.windows(2).rposition(|pair| {
        matches!(
            (&pair[0], &pair[1]),
            (Token::Word(a), Token::Word(b))
                if a.eq_ignore_ascii_case("ORDER") && b.eq_ignore_ascii_case("BY")
        )
    });

    if let Some(at) = order_by_at {
        shape.has_order_by = true;
        shape.order_by_leading = leading_column(&tokens[at + 2..]);
    }

    shape
}

/// `t.created_on DESC, id` -> `created_on`
fn leading_column(tokens: &[Token]) -> Option<String> {
    let mut current = None;
    let mut expect_name = true;
    for token in tokens {
        match token {
            Token::Word(word) | Token::Quoted(word) if expect_name => {
                current = Some(word.clone());
                expect_name = false;
            }
            Token::Punct('.') if !expect_name => expect_name = true,
            _ => break,
        }
    }
    current
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Quoted(String),
    Punct(char),
}

/// Tokens at parenthesis depth zero, skipping literals and comments.
fn top_level_tokens(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' => {
                i = skip_quoted(&chars, i, '\'').0;
                continue;
            }
            '"' => {
                let (next, ident) = skip_quoted(&chars, i, '"');
                if depth == 0 {
                    tokens.push(Token::Quoted(ident));
                }
                i = next;
                continue;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c.is_alphanumeric() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                if depth == 0 {
                    tokens.push(Token::Word(chars[start..i].iter().collect()));
                }
                continue;
            }
            c if c.is_whitespace() => {}
            c => {
                if depth == 0 {
                    tokens.push(Token::Punct(c));
                }
            }
        }
        i += 1;
    }

    tokens
}

/// Returns the index after the closing quote and the unescaped content.
fn skip_quoted(chars: &[char], start: usize, quote: char) -> (usize, String) {
    let mut content = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                content.push(quote);
                i += 2;
                continue;
            }
            return (i + 1, content);
        }
        content.push(chars[i]);
        i += 1;
    }
    (i, content)
}

fn validate_identifier(field: &str, value: &str) -> Result<()> {
    let value = value.trim();
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '"' | '$'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid(format!(
            "{} contains an invalid identifier: '{}'",
            field, value
        )))
    }
}

fn validate_order_by(order_by: &str) -> Result<()> {
    let valid = order_by
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '"' | '$' | ',' | ' '));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid(format!(
            "source.order_by contains unsupported characters: '{}'",
            order_by
        )))
    }
}
