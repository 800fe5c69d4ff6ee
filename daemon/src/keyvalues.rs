/// Parser for Valve's text KeyValues format, used by Steam `.acf` app manifests.
///
/// A document is a sequence of `key value` or `key { ... }` pairs. Keys and
/// values are either double-quoted (with `\"`, `\\`, `\n`, `\t` escapes) or bare
/// tokens. `//` starts a comment that runs to the end of the line.
///
/// The result is a generic tree. Callers look fields up by name and treat an
/// absent or wrongly-typed field as missing rather than binding to a schema.
use anyhow::{bail, Result};

/// A node in a parsed KeyValues document.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Value(String),
    Table(Vec<(String, KeyValue)>),
}

impl KeyValue {
    /// Looks up the first child named `key` (case-insensitive).
    /// Returns `None` for leaf values.
    pub fn get(&self, key: &str) -> Option<&KeyValue> {
        match self {
            KeyValue::Table(entries) => entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v),
            KeyValue::Value(_) => None,
        }
    }

    /// Looks up a child string value by `key`. Tables yield `None`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            KeyValue::Value(s) => Some(s),
            KeyValue::Table(_) => None,
        }
    }

    /// The first nested table in the document, e.g. the `AppState` block of
    /// an app manifest.
    pub fn first_table(&self) -> Option<&KeyValue> {
        match self {
            KeyValue::Table(entries) => entries
                .iter()
                .map(|(_, v)| v)
                .find(|v| matches!(v, KeyValue::Table(_))),
            KeyValue::Value(_) => None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Str(String),
    Open,
    Close,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some('\n') => {
                    self.line += 1;
                    self.chars.next();
                }
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if lookahead.peek() != Some(&'/') {
                        return;
                    }
                    while let Some(c) = self.chars.peek() {
                        if *c == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_trivia();
        let Some(c) = self.chars.next() else {
            return Ok(None);
        };
        match c {
            '{' => Ok(Some(Token::Open)),
            '}' => Ok(Some(Token::Close)),
            '"' => self.quoted().map(|s| Some(Token::Str(s))),
            c => {
                let mut s = String::from(c);
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                        break;
                    }
                    s.push(c);
                    self.chars.next();
                }
                Ok(Some(Token::Str(s)))
            }
        }
    }

    fn quoted(&mut self) -> Result<String> {
        let start = self.line;
        let mut s = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => return Ok(s),
                '\\' => match self.chars.next() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(other) => s.push(other),
                    None => break,
                },
                '\n' => {
                    self.line += 1;
                    s.push('\n');
                }
                c => s.push(c),
            }
        }
        bail!("unterminated string starting on line {start}")
    }
}

/// Parses a KeyValues document into a root table. A leading UTF-8 byte order
/// mark is ignored.
pub fn parse(input: &str) -> Result<KeyValue> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut lexer = Lexer::new(input);
    let entries = parse_entries(&mut lexer, false)?;
    Ok(KeyValue::Table(entries))
}

fn parse_entries(lexer: &mut Lexer<'_>, nested: bool) -> Result<Vec<(String, KeyValue)>> {
    let mut entries = Vec::new();
    loop {
        let key = match lexer.next_token()? {
            Some(Token::Str(key)) => key,
            Some(Token::Close) if nested => return Ok(entries),
            Some(Token::Close) => bail!("unexpected '}}' on line {}", lexer.line),
            Some(Token::Open) => bail!("expected a key, found '{{' on line {}", lexer.line),
            None if nested => bail!("unexpected end of input inside a block"),
            None => return Ok(entries),
        };
        let value = match lexer.next_token()? {
            Some(Token::Str(value)) => KeyValue::Value(value),
            Some(Token::Open) => KeyValue::Table(parse_entries(lexer, true)?),
            Some(Token::Close) | None => {
                bail!("key \"{key}\" has no value (line {})", lexer.line)
            }
        };
        entries.push((key, value));
    }
}
