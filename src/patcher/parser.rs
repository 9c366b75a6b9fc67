//! Tolerant scanner for TypeScript/JavaScript source with inline markup.
//!
//! The parser does not build a script AST. It walks the script token stream
//! just far enough to know where an expression may begin, skipping comments,
//! string and template literals, regular expression literals and type
//! argument brackets, and parses markup wherever an expression may start.
//!
//! `<` starts markup only in expression position (after an operator,
//! punctuator or an expression keyword such as `return`). After an identifier,
//! literal or closing bracket it is a comparison or a type argument list,
//! which is how `useState<number>(0)` and `a < b` are told apart from
//! `return <div />`. `<T,>` and `<T extends U>` are generic parameter lists.
//! A `<T>(` that does not parse as markup is a generic function type such as
//! `type F = <T>(x: T) => T`.
//!
//! Postfix `++`/`--` leave a value behind, so `i++ / 2` is a division. The
//! `)` closing an `if`, `while`, `for` or `with` head is followed by a
//! statement, so `if (ok) /re/.test(s)` starts a regular expression.

use std::fmt;

use super::syntax::{
    Attribute, AttributeItem, AttributeValue, Document, Element, ElementName, Expression,
    Fragment, Node, Span, StringLiteral, Text,
};

/// Malformed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line of the failure.
    pub line: usize,
    /// 1-based column (in characters) of the failure.
    pub column: usize,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

/// 1-based `(line, column)` of a byte offset.
#[must_use]
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// Parse `source` into its markup roots.
pub fn parse(source: &str) -> Result<Document, ParseError> {
    let mut parser = Parser::new(source);
    let nodes = parser.scan_script(false)?;
    Ok(Document { nodes })
}

/// Keywords after which an expression (and therefore markup) may start.
const EXPRESSION_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "default",
];

/// Keywords whose parenthesised head is followed by a statement.
const CONTROL_KEYWORDS: &[&str] = &["if", "while", "for", "with"];

/// What the previous significant script token allows next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prev {
    /// An expression may start here (`(`, `=`, `return`, start of file...).
    ExpressionStart,
    /// A value just ended; `<` and `/` are operators here.
    Value,
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> ParseError {
        let (line, column) = line_column(self.src, offset);
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.bytes[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn read_ident(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    // ------------------------------------------------------------------
    // Script layer
    // ------------------------------------------------------------------

    /// Scan script code, collecting markup roots.
    ///
    /// With `in_braces`, stops after the `}` that closes the enclosing
    /// container; otherwise runs to end of input.
    fn scan_script(&mut self, in_braces: bool) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        let mut depth = 0usize;
        let mut prev = Prev::ExpressionStart;
        // One entry per open `(`: whether it heads a control statement
        let mut parens: Vec<bool> = Vec::new();
        let open = self.pos.saturating_sub(1);

        while let Some(b) = self.peek() {
            match b {
                b if b.is_ascii_whitespace() => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek_at(1) == Some(b'*') => self.skip_block_comment()?,
                b'/' if prev == Prev::ExpressionStart => {
                    self.skip_regex()?;
                    prev = Prev::Value;
                }
                b'\'' | b'"' => {
                    self.scan_js_string()?;
                    prev = Prev::Value;
                }
                b'`' => {
                    self.scan_template(&mut nodes)?;
                    prev = Prev::Value;
                }
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                    prev = Prev::ExpressionStart;
                }
                b'}' => {
                    if depth == 0 {
                        if in_braces {
                            self.pos += 1;
                            return Ok(nodes);
                        }
                        return Err(self.error(self.pos, "unexpected '}'"));
                    }
                    depth -= 1;
                    self.pos += 1;
                    prev = Prev::ExpressionStart;
                }
                b'(' => {
                    parens.push(self.follows_control_keyword());
                    self.pos += 1;
                    prev = Prev::ExpressionStart;
                }
                b')' => {
                    self.pos += 1;
                    prev = if parens.pop().unwrap_or(false) {
                        Prev::ExpressionStart
                    } else {
                        Prev::Value
                    };
                }
                b']' => {
                    self.pos += 1;
                    prev = Prev::Value;
                }
                // `++`/`--` keep whatever came before: a value stays a value
                op @ (b'+' | b'-') if self.peek_at(1) == Some(op) => self.pos += 2,
                b'<' if prev == Prev::ExpressionStart && self.markup_starts_here() => {
                    let start = self.pos;
                    match self.parse_markup() {
                        Ok(node) => {
                            nodes.push(node);
                            prev = Prev::Value;
                        }
                        Err(_) if self.type_parameters_at(start) => {
                            self.pos = start + 1;
                            prev = Prev::ExpressionStart;
                        }
                        Err(e) => return Err(e),
                    }
                }
                b if is_ident_start(b) => {
                    let word = self.read_ident();
                    prev = if EXPRESSION_KEYWORDS.contains(&word) {
                        Prev::ExpressionStart
                    } else {
                        Prev::Value
                    };
                }
                b if b.is_ascii_digit() => {
                    while self
                        .peek()
                        .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'.' || c == b'_')
                    {
                        self.pos += 1;
                    }
                    prev = Prev::Value;
                }
                _ => {
                    self.pos += 1;
                    prev = Prev::ExpressionStart;
                }
            }
        }

        if in_braces {
            return Err(self.error(open, "unterminated '{'"));
        }
        Ok(nodes)
    }

    /// Whether the `<` at the cursor opens markup rather than a type
    /// parameter list.
    fn markup_starts_here(&self) -> bool {
        let mut i = self.pos + 1;
        match self.bytes.get(i) {
            Some(b'>') => return true,
            Some(&b) if is_ident_start(b) => {}
            _ => return false,
        }
        while self.bytes.get(i).is_some_and(|&b| is_ident_char(b) || b == b'.' || b == b'-' || b == b':') {
            i += 1;
        }
        while self.bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        let rest = &self.bytes[i..];
        if rest.starts_with(b",") {
            return false;
        }
        !(rest.starts_with(b"extends ") || rest.starts_with(b"extends\n"))
    }

    /// Whether the `<` at `start` reads as `<Ident>(`, the opening of a
    /// generic function type.
    fn type_parameters_at(&self, start: usize) -> bool {
        let mut i = start + 1;
        let name_start = i;
        while self.bytes.get(i).is_some_and(|&b| is_ident_char(b)) {
            i += 1;
        }
        if i == name_start {
            return false;
        }
        while self.bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        if self.bytes.get(i) != Some(&b'>') {
            return false;
        }
        i += 1;
        while self.bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
            i += 1;
        }
        self.bytes.get(i) == Some(&b'(')
    }

    /// Whether the `(` at the cursor directly follows `if`, `while`, `for`
    /// or `with`.
    fn follows_control_keyword(&self) -> bool {
        let before = self.src[..self.pos].trim_end();
        let word_start = before
            .char_indices()
            .rev()
            .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '$'))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let word = &before[word_start..];
        CONTROL_KEYWORDS.contains(&word) && !before[..word_start].ends_with('.')
    }

    fn skip_line_comment(&mut self) {
        while self.peek().is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 2;
        while self.pos < self.bytes.len() {
            if self.starts_with("*/") {
                self.pos += 2;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(self.error(start, "unterminated comment"))
    }

    fn skip_regex(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.error(start, "unterminated regular expression")),
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        Ok(())
    }

    /// Scan a `'...'` or `"..."` script string, returning its decoded value.
    fn scan_js_string(&mut self) -> Result<StringLiteral, ParseError> {
        let start = self.pos;
        let quote = self.bytes[start];
        self.pos += 1;
        let mut value = String::new();
        let mut chunk_start = self.pos;
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.error(start, "unterminated string literal")),
                Some(b'\\') => {
                    value.push_str(&self.src[chunk_start..self.pos]);
                    self.pos += 1;
                    let Some(escaped) = self.src[self.pos..].chars().next() else {
                        return Err(self.error(start, "unterminated string literal"));
                    };
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '\n' => {}
                        other => value.push(other),
                    }
                    self.pos += escaped.len_utf8();
                    chunk_start = self.pos;
                }
                Some(b) if b == quote => {
                    value.push_str(&self.src[chunk_start..self.pos]);
                    self.pos += 1;
                    return Ok(StringLiteral {
                        span: Span::new(start, self.pos),
                        quote: char::from(quote),
                        value,
                    });
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Scan a template literal, collecting markup from `${}` substitutions.
    ///
    /// Returns the literal when it has no substitutions.
    fn scan_template(&mut self, nodes: &mut Vec<Node>) -> Result<Option<StringLiteral>, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut substituted = false;
        loop {
            match self.peek() {
                None => return Err(self.error(start, "unterminated template literal")),
                Some(b'\\') => self.pos += 2,
                Some(b'`') => {
                    self.pos += 1;
                    break;
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    self.pos += 2;
                    substituted = true;
                    nodes.extend(self.scan_script(true)?);
                }
                Some(_) => self.pos += 1,
            }
        }
        if substituted {
            return Ok(None);
        }
        let raw = &self.src[start + 1..self.pos - 1];
        Ok(Some(StringLiteral {
            span: Span::new(start, self.pos),
            quote: '`',
            value: raw.to_string(),
        }))
    }

    // ------------------------------------------------------------------
    // Markup layer
    // ------------------------------------------------------------------

    /// Parse an element or fragment starting at `<`.
    fn parse_markup(&mut self) -> Result<Node, ParseError> {
        let start = self.pos;
        self.pos += 1;
        self.skip_whitespace();

        if self.peek() == Some(b'>') {
            self.pos += 1;
            let children = self.parse_children(start, "")?;
            return Ok(Node::Fragment(Fragment {
                children,
                span: Span::new(start, self.pos),
            }));
        }

        let (name, name_span) = self.parse_element_name()?;
        let mut attributes = Vec::new();
        let mut attributes_end = name_span.end;

        loop {
            self.skip_markup_trivia()?;
            match self.peek() {
                None => return Err(self.error(start, format!("unterminated tag <{}>", name.as_str()))),
                Some(b'/') if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    return Ok(Node::Element(Element {
                        name,
                        name_span,
                        attributes,
                        attributes_end,
                        children: Vec::new(),
                        self_closing: true,
                        span: Span::new(start, self.pos),
                    }));
                }
                Some(b'>') => {
                    self.pos += 1;
                    let children = self.parse_children(start, name.as_str())?;
                    return Ok(Node::Element(Element {
                        name,
                        name_span,
                        attributes,
                        attributes_end,
                        children,
                        self_closing: false,
                        span: Span::new(start, self.pos),
                    }));
                }
                Some(b'{') => {
                    let spread = self.parse_container()?;
                    attributes_end = spread.span.end;
                    attributes.push(AttributeItem::Spread(spread));
                }
                Some(b) if is_ident_start(b) => {
                    let attr = self.parse_attribute()?;
                    attributes_end = attr.span.end;
                    attributes.push(AttributeItem::Attribute(attr));
                }
                Some(_) => {
                    return Err(self.error(
                        self.pos,
                        format!("unexpected character in tag <{}>", name.as_str()),
                    ))
                }
            }
        }
    }

    fn skip_markup_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("//") {
                self.skip_line_comment();
            } else if self.starts_with("/*") {
                self.skip_block_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_element_name(&mut self) -> Result<(ElementName, Span), ParseError> {
        let start = self.pos;
        let mut member = false;
        let mut namespaced = false;
        loop {
            if !self.peek().is_some_and(is_ident_start) {
                return Err(self.error(self.pos, "expected element name"));
            }
            while self.peek().is_some_and(|b| is_ident_char(b) || b == b'-') {
                self.pos += 1;
            }
            match self.peek() {
                Some(b'.') => {
                    member = true;
                    self.pos += 1;
                }
                Some(b':') => {
                    namespaced = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = self.src[start..self.pos].to_string();
        let name = if member {
            ElementName::Member(text)
        } else if namespaced {
            ElementName::Namespaced(text)
        } else {
            ElementName::Identifier(text)
        };
        Ok((name, Span::new(start, self.pos)))
    }

    fn parse_attribute(&mut self) -> Result<Attribute, ParseError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| is_ident_char(b) || b == b'-' || b == b':')
        {
            self.pos += 1;
        }
        let name = self.src[start..self.pos].to_string();
        let name_end = self.pos;

        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            // Bare attribute; leave trailing whitespace to the tag loop.
            self.pos = name_end;
            return Ok(Attribute {
                name,
                span: Span::new(start, name_end),
                value: None,
            });
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = match self.peek() {
            Some(b'"' | b'\'') => AttributeValue::String(self.parse_markup_string()?),
            Some(b'{') => AttributeValue::Expression(self.parse_container()?),
            Some(b'<') => AttributeValue::Element(Box::new(self.parse_markup()?)),
            _ => {
                return Err(self.error(self.pos, format!("expected value for attribute '{name}'")))
            }
        };
        Ok(Attribute {
            name,
            span: Span::new(start, self.pos),
            value: Some(value),
        })
    }

    /// Markup strings have no escapes and may span lines.
    fn parse_markup_string(&mut self) -> Result<StringLiteral, ParseError> {
        let start = self.pos;
        let quote = self.bytes[start];
        let Some(len) = self.bytes[start + 1..].iter().position(|&b| b == quote) else {
            return Err(self.error(start, "unterminated attribute string"));
        };
        let value = self.src[start + 1..start + 1 + len].to_string();
        self.pos = start + len + 2;
        Ok(StringLiteral {
            span: Span::new(start, self.pos),
            quote: char::from(quote),
            value,
        })
    }

    /// Parse `{ ... }`, recording a sole string literal when present.
    fn parse_container(&mut self) -> Result<Expression, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let inner_start = self.pos;
        let nodes = self.scan_script(true)?;
        let span = Span::new(start, self.pos);
        let string = self.sole_string_literal(inner_start, self.pos - 1);
        Ok(Expression { span, nodes, string })
    }

    fn sole_string_literal(&self, start: usize, end: usize) -> Option<StringLiteral> {
        let inner = &self.src[start..end];
        let trimmed = inner.trim();
        let first = *trimmed.as_bytes().first()?;
        if !matches!(first, b'"' | b'\'' | b'`') {
            return None;
        }
        let literal_start = start + (inner.len() - inner.trim_start().len());
        let mut scanner = Parser::new(self.src);
        scanner.pos = literal_start;
        let literal = if first == b'`' {
            let mut nested = Vec::new();
            scanner.scan_template(&mut nested).ok()??
        } else {
            scanner.scan_js_string().ok()?
        };
        (literal.span.end == literal_start + trimmed.len()).then_some(literal)
    }

    /// Parse children up to and including the closing tag for `name`.
    fn parse_children(&mut self, open: usize, name: &str) -> Result<Vec<Node>, ParseError> {
        let mut children = Vec::new();
        loop {
            match self.peek() {
                None => {
                    let label = if name.is_empty() { "<>" } else { name };
                    return Err(self.error(open, format!("unclosed element <{label}>")));
                }
                Some(b'<') => {
                    let tag_start = self.pos;
                    let mut next = self.pos + 1;
                    while self.bytes.get(next).is_some_and(u8::is_ascii_whitespace) {
                        next += 1;
                    }
                    if self.bytes.get(next) == Some(&b'/') {
                        self.pos = next + 1;
                        self.parse_closing_tag(tag_start, name)?;
                        return Ok(children);
                    }
                    children.push(self.parse_markup()?);
                }
                Some(b'{') => children.push(Node::Expression(self.parse_container()?)),
                Some(_) => {
                    let start = self.pos;
                    while self.peek().is_some_and(|b| b != b'<' && b != b'{') {
                        self.pos += 1;
                    }
                    children.push(Node::Text(Text {
                        span: Span::new(start, self.pos),
                    }));
                }
            }
        }
    }

    fn parse_closing_tag(&mut self, tag_start: usize, expected: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| is_ident_char(b) || matches!(b, b'-' | b'.' | b':'))
        {
            self.pos += 1;
        }
        let found = &self.src[start..self.pos];
        self.skip_whitespace();
        if self.peek() != Some(b'>') {
            return Err(self.error(self.pos, "expected '>' in closing tag"));
        }
        self.pos += 1;
        if found != expected {
            return Err(self.error(
                tag_start,
                format!("closing tag </{found}> does not match <{expected}>"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;

    fn tags(source: &str) -> Vec<String> {
        let document = parse(source).unwrap();
        let mut out = Vec::new();
        let _ = document.walk_elements::<()>(&mut |element| {
            out.push(element.name.as_str().to_string());
            ControlFlow::Continue(())
        });
        out
    }

    #[test]
    fn test_parses_nested_elements_in_document_order() {
        let source = r#"
function App() {
  return (
    <div className="outer">
      <h1>Title</h1>
      <ul>{items.map((item) => <li key={item}>{item}</li>)}</ul>
      <Footer />
    </div>
  );
}
"#;
        assert_eq!(tags(source), vec!["div", "h1", "ul", "li", "Footer"]);
    }

    #[test]
    fn test_type_arguments_are_not_markup() {
        let source = r"
const [count, setCount] = useState<number>(0);
const list: Array<string> = [];
const id = <T,>(value: T) => value;
function pick<T extends object>(value: T): T { return value; }
if (count < 10 && count > 2) { total = count / 2; }
export default () => <span>{count}</span>;
";
        assert_eq!(tags(source), vec!["span"]);
    }

    #[test]
    fn test_postfix_update_then_division() {
        let source = "let i = 0;\nconst half = i++ / 2;\nconst rest = i-- / 2;\nconst v = <b>{half}</b>;";
        assert_eq!(tags(source), vec!["b"]);
        // Prefix forms still expect an operand
        assert_eq!(tags("const n = ++i; const r = --n <= 0 ? <i /> : null;"), vec!["i"]);
    }

    #[test]
    fn test_generic_function_types_are_not_markup() {
        let source = r"
type F = <T>(x: T) => T;
const id: <T>(value: T) => T = (value) => value;
type Box = { map: <U>(f: (v: number) => U) => U };
export const View = () => <Box>(boxed)</Box>;
";
        assert_eq!(tags(source), vec!["Box"]);
    }

    #[test]
    fn test_regex_after_control_statement_head() {
        let source = r"
if (ok) /'/.test(s);
while (i < n) /[<]/.exec(s);
for (const c of s) /`/.test(c);
const total = (a + b) / 2;
obj.if(x) / 2;
const v = <p className='n'>{total}</p>;
";
        assert_eq!(tags(source), vec!["p"]);
    }

    #[test]
    fn test_skips_strings_comments_and_regex() {
        let source = r#"
// <div className="commented">
/* <p>also commented</p> */
const html = "<section>";
const re = /<b>(.*)<\/b>/g;
const tpl = `<em>${ok ? <strong>yes</strong> : 'no'}</em>`;
const view = <main />;
"#;
        assert_eq!(tags(source), vec!["strong", "main"]);
    }

    #[test]
    fn test_fragments_member_and_namespaced_names() {
        let source = "const x = (<><Foo.Bar /><svg:rect /><my-widget></my-widget></>);";
        let document = parse(source).unwrap();
        let Node::Fragment(fragment) = &document.nodes[0] else {
            panic!("expected fragment");
        };
        assert_eq!(fragment.children.len(), 3);
        assert_eq!(tags(source), vec!["Foo.Bar", "svg:rect", "my-widget"]);
    }

    #[test]
    fn test_attribute_values_and_spans() {
        let source = r#"const a = <button className="a b" disabled onClick={() => go()} {...rest}>Hi</button>;"#;
        let document = parse(source).unwrap();
        let Node::Element(button) = &document.nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(button.attributes.len(), 4);
        let class_attr = button.class_attribute().unwrap();
        assert_eq!(class_attr.literal_value(), Some("a b"));
        assert_eq!(class_attr.span.slice(source), r#"className="a b""#);
        assert_eq!(&source[button.attributes_end..button.attributes_end + 1], ">");
        assert!(matches!(button.attributes[3], AttributeItem::Spread(_)));
        assert_eq!(
            button.span.slice(source),
            r#"<button className="a b" disabled onClick={() => go()} {...rest}>Hi</button>"#
        );
    }

    #[test]
    fn test_string_literal_in_container() {
        let source = r#"const a = <p className={ 'x  y' } />;"#;
        let document = parse(source).unwrap();
        let Node::Element(p) = &document.nodes[0] else {
            panic!("expected element");
        };
        let class_attr = p.class_attribute().unwrap();
        assert_eq!(class_attr.literal_value(), Some("x  y"));

        let dynamic = parse("const a = <p className={cn('x', y)} />;").unwrap();
        let Node::Element(p) = &dynamic.nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(p.class_attribute().unwrap().literal_value(), None);
    }

    #[test]
    fn test_mismatched_closing_tag_is_an_error() {
        let err = parse("const a = (\n  <div></span>\n);").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 8);
        assert!(err.message.contains("does not match"));
    }

    #[test]
    fn test_unterminated_inputs_are_errors() {
        assert!(parse("const a = <div>").is_err());
        assert!(parse("const s = 'abc").is_err());
        assert!(parse("/* open").is_err());
        assert!(parse("const t = `abc").is_err());
        assert!(parse("const a = <div className=\"x>;").is_err());
        assert!(parse("function f() { return 1; }}").is_err());
    }

    #[test]
    fn test_line_column() {
        let source = "ab\ncd\nef";
        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 4), (2, 2));
        assert_eq!(line_column(source, 6), (3, 1));
    }
}
