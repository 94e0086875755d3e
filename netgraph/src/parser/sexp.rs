use std::fmt;
use thiserror::Error;

/// Errors raised while turning schematic text into records.
///
/// Every variant carries the 1-based line where the problem was found so the
/// caller can point at the offending spot in the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty input")]
    Empty,
    #[error("unexpected end of input at line {line}: unclosed list opened at line {opened}")]
    UnexpectedEof { line: usize, opened: usize },
    #[error("unterminated string starting at line {line}")]
    UnterminatedString { line: usize },
    #[error("unbalanced ')' at line {line}, column {column}")]
    UnbalancedClose { line: usize, column: usize },
    #[error("unexpected token '{token}' at line {line}")]
    UnexpectedToken { token: String, line: usize },
    #[error("invalid number '{token}' at line {line}")]
    InvalidNumber { token: String, line: usize },
    #[error("missing {field} in {record} at line {line}")]
    MissingField {
        record: String,
        field: String,
        line: usize,
    },
    #[error("expected (kicad_sch ...) root, found '{found}' at line {line}")]
    InvalidRoot { found: String, line: usize },
}

/// Source position of a node (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SExp {
    Atom(String, Span),
    List(Vec<SExp>, Span),
}

impl SExp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            SExp::Atom(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExp]> {
        match self {
            SExp::List(items, _) => Some(items),
            _ => None,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            SExp::Atom(_, span) | SExp::List(_, span) => *span,
        }
    }

    pub fn line(&self) -> usize {
        self.span().line
    }

    /// Head atom of a list, e.g. `wire` for `(wire (pts ...))`.
    pub fn tag(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(SExp::as_atom)
    }

    /// Items after the head atom.
    pub fn args(&self) -> &[SExp] {
        match self.as_list() {
            Some(items) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }

    /// First child list whose head atom is `key`.
    pub fn child(&self, key: &str) -> Option<&SExp> {
        self.args().iter().find(|item| item.tag() == Some(key))
    }

    /// Every child list whose head atom is `key`, in file order.
    pub fn children<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SExp> + 'a {
        self.args().iter().filter(move |item| item.tag() == Some(key))
    }

    /// Atom at `index` among the arguments of this list.
    pub fn arg_atom(&self, index: usize) -> Option<&str> {
        self.args().get(index).and_then(SExp::as_atom)
    }

    /// Value of a `(key value)` child.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.child(key).and_then(|c| c.arg_atom(0))
    }

    /// True if a bare atom `flag` appears among the arguments, e.g. `(power)`
    /// children or `hide` markers.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args()
            .iter()
            .any(|item| item.as_atom() == Some(flag) || item.tag() == Some(flag))
    }
}

impl fmt::Display for SExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExp::Atom(s, _) => {
                if s.is_empty() || s.contains(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == '"') {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                } else {
                    write!(f, "{}", s)
                }
            }
            SExp::List(items, _) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

pub struct SExpParser<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> SExpParser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Parse exactly one expression; anything but whitespace after it is an
    /// error.
    pub fn parse(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        if self.is_eof() {
            return Err(ParseError::Empty);
        }
        let root = self.parse_sexp()?;
        self.skip_whitespace();
        if !self.is_eof() {
            if self.peek() == b')' {
                return Err(ParseError::UnbalancedClose {
                    line: self.line,
                    column: self.column,
                });
            }
            let line = self.line;
            let token = self.parse_sexp()?;
            return Err(ParseError::UnexpectedToken {
                token: truncate(&token.to_string()),
                line,
            });
        }
        Ok(root)
    }

    fn parse_sexp(&mut self) -> Result<SExp, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            b'(' => self.parse_list(),
            b')' => Err(ParseError::UnbalancedClose {
                line: self.line,
                column: self.column,
            }),
            b'"' => self.parse_string(),
            _ => self.parse_symbol(),
        }
    }

    // Iterative so that deeply nested input cannot exhaust the stack.
    fn parse_list(&mut self) -> Result<SExp, ParseError> {
        let mut stack: Vec<(Vec<SExp>, Span)> = Vec::new();
        stack.push((Vec::new(), self.span()));
        self.advance();

        loop {
            self.skip_whitespace();
            if self.is_eof() {
                let opened = stack.last().map(|(_, span)| span.line).unwrap_or(1);
                return Err(ParseError::UnexpectedEof {
                    line: self.line,
                    opened,
                });
            }

            match self.peek() {
                b'(' => {
                    stack.push((Vec::new(), self.span()));
                    self.advance();
                }
                b')' => {
                    self.advance();
                    let (items, span) = match stack.pop() {
                        Some(frame) => frame,
                        None => {
                            return Err(ParseError::UnbalancedClose {
                                line: self.line,
                                column: self.column,
                            })
                        }
                    };
                    let list = SExp::List(items, span);
                    match stack.last_mut() {
                        Some((parent, _)) => parent.push(list),
                        None => return Ok(list),
                    }
                }
                b'"' => {
                    let atom = self.parse_string()?;
                    if let Some((items, _)) = stack.last_mut() {
                        items.push(atom);
                    }
                }
                _ => {
                    let atom = self.parse_symbol()?;
                    if let Some((items, _)) = stack.last_mut() {
                        items.push(atom);
                    }
                }
            }
        }
    }

    fn parse_string(&mut self) -> Result<SExp, ParseError> {
        let span = self.span();
        self.advance();
        let mut bytes = Vec::new();
        let mut escaped = false;

        loop {
            if self.is_eof() {
                return Err(ParseError::UnterminatedString { line: span.line });
            }
            let ch = self.peek();
            self.advance();

            if escaped {
                match ch {
                    b'n' => bytes.push(b'\n'),
                    b't' => bytes.push(b'\t'),
                    b'r' => bytes.push(b'\r'),
                    other => bytes.push(other),
                }
                escaped = false;
            } else if ch == b'\\' {
                escaped = true;
            } else if ch == b'"' {
                break;
            } else {
                bytes.push(ch);
            }
        }

        Ok(SExp::Atom(String::from_utf8_lossy(&bytes).into_owned(), span))
    }

    fn parse_symbol(&mut self) -> Result<SExp, ParseError> {
        let span = self.span();
        let start = self.pos;

        while !self.is_eof() {
            let ch = self.peek();
            if ch.is_ascii_whitespace() || ch == b'(' || ch == b')' || ch == b'"' {
                break;
            }
            self.advance();
        }

        if self.pos == start {
            let token = (self.peek() as char).to_string();
            return Err(ParseError::UnexpectedToken {
                token,
                line: span.line,
            });
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        Ok(SExp::Atom(text, span))
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.is_eof() && self.peek().is_ascii_whitespace() {
            self.advance();
        }
    }

    fn peek(&self) -> u8 {
        self.input.get(self.pos).copied().unwrap_or(0)
    }

    fn advance(&mut self) {
        if let Some(&ch) = self.input.get(self.pos) {
            self.pos += 1;
            if ch == b'\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}

pub(crate) fn truncate(token: &str) -> String {
    const MAX: usize = 40;
    match token.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &token[..idx]),
        None => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Result<SExp, ParseError> {
        SExpParser::new(input).parse()
    }

    #[test]
    fn test_parse_atom() {
        let result = parse("hello").unwrap();
        assert_eq!(result.as_atom(), Some("hello"));
    }

    #[test]
    fn test_parse_string() {
        let result = parse("\"hello world\"").unwrap();
        assert_eq!(result.as_atom(), Some("hello world"));
    }

    #[test]
    fn test_parse_string_escapes() {
        let result = parse(r#""say \"hi\"\n""#).unwrap();
        assert_eq!(result.as_atom(), Some("say \"hi\"\n"));
    }

    #[test]
    fn test_parse_list() {
        let result = parse("(a b c)").unwrap();
        let items = result.as_list().expect("list");
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_atom(), Some("a"));
        assert_eq!(items[2].as_atom(), Some("c"));
    }

    #[test]
    fn test_parse_nested_with_lines() {
        let result = parse("(a\n  (b c)\n  d)").unwrap();
        assert_eq!(result.tag(), Some("a"));
        let b = result.child("b").unwrap();
        assert_eq!(b.line(), 2);
        assert_eq!(b.arg_atom(0), Some("c"));
        assert_eq!(result.args()[1].line(), 3);
    }

    #[test]
    fn test_value_of_and_children() {
        let result = parse("(sym (uuid \"x\") (pin \"1\") (pin \"2\") hide)").unwrap();
        assert_eq!(result.value_of("uuid"), Some("x"));
        let pins: Vec<_> = result.children("pin").filter_map(|p| p.arg_atom(0)).collect();
        assert_eq!(pins, vec!["1", "2"]);
        assert!(result.has_flag("hide"));
        assert!(!result.has_flag("power"));
    }

    #[test]
    fn test_unclosed_list_reports_opening_line() {
        let err = parse("(kicad_sch\n  (wire (pts (xy 0 0))\n").unwrap_err();
        match err {
            ParseError::UnexpectedEof { opened, .. } => assert_eq!(opened, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_stray_close_paren() {
        let err = parse("(a b))").unwrap_err();
        assert_eq!(err, ParseError::UnbalancedClose { line: 1, column: 6 });
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse("(a \"oops)").unwrap_err();
        assert_eq!(err, ParseError::UnterminatedString { line: 1 });
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("  \n ").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_trailing_expression_rejected() {
        let err = parse("(a) (b)").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_display_roundtrip_quotes() {
        let result = parse("(property \"Reference\" \"U 1\")").unwrap();
        assert_eq!(result.to_string(), "(property Reference \"U 1\")");
    }
}
