//! Element locator and source patcher.
//!
//! Given the full source of one file, a baseline [`ElementDescriptor`]
//! captured before the edit, and a [`Mutation`], the patcher finds the
//! element that produced the selection and rewrites only that element's class
//! attribute.
//!
//! # Matching
//!
//! Elements are visited in pre-order, which is the order the renderer
//! instantiates them. Each element with a plain identifier name yields a
//! `(lowercased tag, class set)` pair using the same normalization as the
//! selection bridge. The first element whose pair equals the baseline pair is
//! the match; traversal stops there. Two elements with identical tag and
//! class set are indistinguishable, so edits always land on the first one in
//! document order.
//!
//! # Regeneration
//!
//! The edit is a single splice of the class value (or an inserted attribute)
//! into the original text. Every byte outside that span is identical in the
//! output. On any error the caller keeps the original text; nothing is ever
//! partially applied.

pub mod parser;
pub mod syntax;

use std::fmt;

pub use parser::{line_column, parse, ParseError};
pub use syntax::{Document, Element, Span};

use crate::descriptor::{ClassList, EditRequest, ElementDescriptor, Mutation};
use syntax::{AttributeValue, CLASS_ATTRIBUTE};

/// Errors from locating or patching an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// The source could not be parsed; it is left untouched.
    Parse(ParseError),
    /// No element matches the baseline descriptor; the source is left untouched.
    NoMatch {
        /// Display form of the descriptor that failed to match.
        target: String,
    },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "Parse error: {err}"),
            Self::NoMatch { target } => write!(f, "No element matches {target}"),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::NoMatch { .. } => None,
        }
    }
}

impl From<ParseError> for PatchError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

/// How a mutation changes the matched element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchAction {
    /// Replace the existing class attribute value at `span`.
    Update {
        /// Span of the replaced value.
        span: Span,
    },
    /// Insert a new class attribute at byte offset `at`.
    Insert {
        /// Insertion offset (end of the attribute list).
        at: usize,
    },
    /// The mutation does not touch the class attribute.
    Unchanged,
}

/// A matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Span of the whole element.
    pub span: Span,
    /// 1-based line of the opening `<`.
    pub line: usize,
    /// 1-based column of the opening `<`.
    pub column: usize,
    /// Tag name as written.
    pub tag_name: String,
    /// Class set derived from the source.
    pub class_list: ClassList,
}

/// A single text splice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Replaced range (empty for insertions).
    pub span: Span,
    /// Replacement text.
    pub replacement: String,
}

impl Edit {
    /// Apply the splice to `source`.
    #[must_use]
    pub fn apply(&self, source: &str) -> String {
        let mut out =
            String::with_capacity(source.len() - (self.span.end - self.span.start) + self.replacement.len());
        out.push_str(&source[..self.span.start]);
        out.push_str(&self.replacement);
        out.push_str(&source[self.span.end..]);
        out
    }
}

/// First element in document order matching `target`'s tag and class set.
pub fn find_match<'a>(document: &'a Document, target: &ElementDescriptor) -> Option<&'a Element> {
    document.find_element(|element| {
        element
            .tag_name()
            .is_some_and(|tag| target.matches(tag, &element.class_list()))
    })
}

/// Locate the element that produced `target`.
pub fn locate(source: &str, target: &ElementDescriptor) -> Result<Located, PatchError> {
    let document = parse(source)?;
    let element = find_match(&document, target).ok_or_else(|| no_match(target))?;
    let (line, column) = line_column(source, element.span.start);
    Ok(Located {
        span: element.span,
        line,
        column,
        tag_name: element.name.as_str().to_string(),
        class_list: element.class_list(),
    })
}

/// Decide how `mutation` applies to `element`.
#[must_use]
pub fn plan_action(element: &Element, mutation: &Mutation) -> PatchAction {
    if mutation.class_list.is_none() {
        return PatchAction::Unchanged;
    }
    match element.class_attribute() {
        Some(attr) => match &attr.value {
            Some(AttributeValue::String(lit)) => PatchAction::Update { span: lit.span },
            Some(AttributeValue::Expression(expr)) => PatchAction::Update {
                span: expr.string.as_ref().map_or(expr.span, |lit| lit.span),
            },
            Some(AttributeValue::Element(node)) => PatchAction::Update {
                span: node_span(node),
            },
            // `className` with no value: append `="..."` after the name
            None => PatchAction::Update {
                span: Span::new(attr.span.end, attr.span.end),
            },
        },
        None => PatchAction::Insert {
            at: element.attributes_end,
        },
    }
}

fn node_span(node: &syntax::Node) -> Span {
    match node {
        syntax::Node::Element(element) => element.span,
        syntax::Node::Fragment(fragment) => fragment.span,
        syntax::Node::Text(text) => text.span,
        syntax::Node::Expression(expr) => expr.span,
    }
}

/// Build the splice that applies `mutation` to `element`.
#[must_use]
pub fn plan_edit(source: &str, element: &Element, mutation: &Mutation) -> Option<Edit> {
    let classes = mutation.class_list.as_deref()?;
    let edit = match plan_action(element, mutation) {
        PatchAction::Unchanged => return None,
        PatchAction::Insert { at } => Edit {
            span: Span::new(at, at),
            replacement: format!(" {CLASS_ATTRIBUTE}={}", markup_value(classes, '"')),
        },
        PatchAction::Update { span } if span.start == span.end => Edit {
            span,
            replacement: format!("={}", markup_value(classes, '"')),
        },
        PatchAction::Update { span } => {
            let existing = span.slice(source);
            let in_container = element
                .class_attribute()
                .is_some_and(|attr| matches!(&attr.value, Some(AttributeValue::Expression(e)) if e.string.is_some()));
            let quote = existing.chars().next().unwrap_or('"');
            let replacement = if in_container {
                script_value(classes, quote)
            } else {
                markup_value(classes, quote)
            };
            Edit { span, replacement }
        }
    };
    Some(edit)
}

/// Render a markup attribute value, keeping `preferred` quotes when possible.
fn markup_value(value: &str, preferred: char) -> String {
    let preferred = if matches!(preferred, '"' | '\'') { preferred } else { '"' };
    let other = if preferred == '"' { '\'' } else { '"' };
    if !value.contains(preferred) {
        format!("{preferred}{value}{preferred}")
    } else if !value.contains(other) {
        format!("{other}{value}{other}")
    } else {
        format!("{{{}}}", script_string(value))
    }
}

/// Render a script string literal inside an existing `{...}` container.
fn script_value(value: &str, preferred: char) -> String {
    match preferred {
        '\'' | '"' | '`' if !value.contains(preferred) && !value.contains('\\') => {
            if preferred == '`' && value.contains("${") {
                script_string(value)
            } else {
                format!("{preferred}{value}{preferred}")
            }
        }
        _ => script_string(value),
    }
}

fn script_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn no_match(target: &ElementDescriptor) -> PatchError {
    PatchError::NoMatch {
        target: target.to_string(),
    }
}

/// Apply `request` to `source` and return the regenerated text.
///
/// The caller keeps `source` on error; use [`EditRequest::rebased`] as the
/// baseline for the next edit on success.
pub fn update_code(source: &str, request: &EditRequest) -> Result<String, PatchError> {
    let document = parse(source)?;
    let Some(element) = find_match(&document, &request.target) else {
        log::warn!("No element matches {} in source", request.target);
        return Err(no_match(&request.target));
    };
    let Some(edit) = plan_edit(source, element, &request.mutation) else {
        return Ok(source.to_string());
    };
    log::debug!(
        "Patching {} at bytes {}..{}",
        request.target,
        edit.span.start,
        edit.span.end
    );
    Ok(edit.apply(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tag: &str, class: &str, classes: &str) -> EditRequest {
        EditRequest::new(ElementDescriptor::new(tag, class), Mutation::set_classes(classes))
    }

    const APP: &str = r#"export default function App() {
  return (
    <main className="layout">
      <button className="a b">Hi</button>
      <p className='note'>Plain</p>
    </main>
  );
}
"#;

    #[test]
    fn test_concrete_button_scenario() {
        let source = "  <button className=\"a b\">Hi</button>\n";
        let source = format!("const view = (\n{source});\n");
        let out = update_code(&source, &request("button", "a b", "c d e")).unwrap();
        assert_eq!(
            out,
            "const view = (\n  <button className=\"c d e\">Hi</button>\n);\n"
        );
    }

    #[test]
    fn test_update_is_idempotent() {
        let req = request("button", "a b", "x y");
        let once = update_code(APP, &req).unwrap();
        let twice = update_code(&once, &EditRequest::new(req.rebased(), req.mutation.clone())).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_bytes_outside_value_are_unchanged() {
        let out = update_code(APP, &request("button", "a b", "px-4 py-2")).unwrap();
        let start = APP.find("\"a b\"").unwrap();
        let end = start + "\"a b\"".len();
        let new_value = "\"px-4 py-2\"";
        assert_eq!(&out[..start], &APP[..start]);
        assert_eq!(&out[start..start + new_value.len()], new_value);
        assert_eq!(&out[start + new_value.len()..], &APP[end..]);
    }

    #[test]
    fn test_matching_ignores_class_order() {
        let source = r#"const a = <div>
  <span className="a b c">one</span>
  <span className="c b a x">two</span>
  <span className="b  a">three</span>
</div>;"#;
        let out = update_code(source, &request("span", "a b", "z")).unwrap();
        assert!(out.contains(r#"<span className="z">three</span>"#));
        assert!(out.contains(r#"<span className="a b c">one</span>"#));
        assert!(out.contains(r#"<span className="c b a x">two</span>"#));
    }

    #[test]
    fn test_first_match_wins() {
        let source = r#"const a = <ul>
  <li className="item">first</li>
  <li className="item">second</li>
</ul>;"#;
        let out = update_code(source, &request("li", "item", "item active")).unwrap();
        assert!(out.contains(r#"<li className="item active">first</li>"#));
        assert!(out.contains(r#"<li className="item">second</li>"#));

        let located = locate(source, &ElementDescriptor::new("li", "item")).unwrap();
        assert_eq!((located.line, located.column), (2, 3));
    }

    #[test]
    fn test_no_match_is_an_error() {
        let err = update_code(APP, &request("button", "missing", "x")).unwrap_err();
        assert_eq!(
            err,
            PatchError::NoMatch {
                target: "<button class=\"missing\">".to_string()
            }
        );
        assert!(matches!(
            locate(APP, &ElementDescriptor::new("section", "")),
            Err(PatchError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let source = "const a = <div>\n  <span></div>\n";
        let err = update_code(source, &request("span", "", "x")).unwrap_err();
        assert!(matches!(err, PatchError::Parse(ParseError { line: 2, .. })));
    }

    #[test]
    fn test_operator_heavy_typescript_is_patchable() {
        for script in [
            "const half = i++ / 2;",
            "type F = <T>(x: T) => T;",
            "if (ok) /'/.test(s);",
        ] {
            let source = format!("let i = 0;\n{script}\nexport const V = () => <b className=\"x\">B</b>;\n");
            let out = update_code(&source, &request("b", "x", "y")).unwrap();
            assert!(out.starts_with(&format!("let i = 0;\n{script}\n")), "{script}");
            assert!(out.contains(r#"<b className="y">B</b>"#), "{script}");
        }
    }

    #[test]
    fn test_insert_when_class_attribute_missing() {
        let source = r#"const a = <section id="hero" hidden>text</section>;"#;
        let out = update_code(source, &request("section", "", "hero big")).unwrap();
        assert_eq!(
            out,
            r#"const a = <section id="hero" hidden className="hero big">text</section>;"#
        );

        let self_closing = "const b = <img src=\"a.png\" />;";
        let out = update_code(self_closing, &request("img", "", "w-4")).unwrap();
        assert_eq!(out, "const b = <img src=\"a.png\" className=\"w-4\" />;");

        let bare = "const c = <hr/>;";
        let out = update_code(bare, &request("hr", "", "rule")).unwrap();
        assert_eq!(out, "const c = <hr className=\"rule\"/>;");
    }

    #[test]
    fn test_quote_style_is_kept() {
        let out = update_code(APP, &request("p", "note", "note muted")).unwrap();
        assert!(out.contains("<p className='note muted'>Plain</p>"));

        let out = update_code(APP, &request("p", "note", "it's")).unwrap();
        assert!(out.contains("<p className=\"it's\">Plain</p>"));

        let out = update_code(APP, &request("p", "note", "a'b\"c")).unwrap();
        assert!(out.contains(r#"<p className={"a'b\"c"}>Plain</p>"#));
    }

    #[test]
    fn test_container_literal_and_dynamic_values() {
        let literal = "const a = <div className={'box'}>x</div>;";
        let out = update_code(literal, &request("div", "box", "box open")).unwrap();
        assert_eq!(out, "const a = <div className={'box open'}>x</div>;");

        let dynamic = "const a = <div className={cn('box', open)}>x</div>;";
        let out = update_code(dynamic, &request("div", "", "box")).unwrap();
        assert_eq!(out, "const a = <div className=\"box\">x</div>;");

        let valueless = "const a = <div className>x</div>;";
        let out = update_code(valueless, &request("div", "", "box")).unwrap();
        assert_eq!(out, "const a = <div className=\"box\">x</div>;");
    }

    #[test]
    fn test_empty_mutation_leaves_source_alone() {
        let req = EditRequest::new(ElementDescriptor::new("button", "a b"), Mutation::default());
        assert_eq!(update_code(APP, &req).unwrap(), APP);

        let missing = EditRequest::new(ElementDescriptor::new("table", ""), Mutation::default());
        assert!(update_code(APP, &missing).is_err());
    }

    #[test]
    fn test_member_and_namespaced_names_never_match() {
        let source = "const a = <><Foo.Bar className=\"x\" /><svg:g className=\"x\" /><g className=\"x\" /></>;";
        let out = update_code(source, &request("g", "x", "y")).unwrap();
        assert_eq!(
            out,
            "const a = <><Foo.Bar className=\"x\" /><svg:g className=\"x\" /><g className=\"y\" /></>;"
        );
    }

    #[test]
    fn test_markup_nested_in_attribute_is_visited_after_owner() {
        let source = "const a = <Card header={<h2 className=\"t\">T</h2>}><h2 className=\"t\">B</h2></Card>;";
        let out = update_code(source, &request("h2", "t", "u")).unwrap();
        assert_eq!(
            out,
            "const a = <Card header={<h2 className=\"u\">T</h2>}><h2 className=\"t\">B</h2></Card>;"
        );
    }

    #[test]
    fn test_uppercase_component_tag_matches_lowercased_descriptor() {
        let source = "const a = <Button className=\"primary\">Go</Button>;";
        let located = locate(source, &ElementDescriptor::new("button", "primary")).unwrap();
        assert_eq!(located.tag_name, "Button");
        assert_eq!(located.class_list, ClassList::parse("primary"));
        assert_eq!(located.span.slice(source), "<Button className=\"primary\">Go</Button>");
    }
}
