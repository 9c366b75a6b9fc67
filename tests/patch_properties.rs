// Integration tests for the element patcher
// Run with: cargo test --test patch_properties

use previewsync::descriptor::{EditRequest, ElementDescriptor, Mutation};
use previewsync::file_tree::FileTree;
use previewsync::patcher::{self, PatchError};

fn template_app() -> String {
    FileTree::vite_react_template()
        .read_text("src/App.tsx")
        .unwrap()
        .to_string()
}

fn set(tag: &str, class: &str, classes: &str) -> EditRequest {
    EditRequest::new(ElementDescriptor::new(tag, class), Mutation::set_classes(classes))
}

/// Everything before the first differing byte and after the last one must be
/// untouched, and the changed window must sit inside the class value.
fn changed_window(before: &str, after: &str) -> (usize, usize, usize) {
    let prefix = before
        .bytes()
        .zip(after.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = before[prefix..]
        .bytes()
        .rev()
        .zip(after[prefix..].bytes().rev())
        .take_while(|(a, b)| a == b)
        .count();
    (prefix, before.len() - suffix, after.len() - suffix)
}

#[test]
fn test_template_edit_is_minimal() {
    let source = template_app();
    let out = patcher::update_code(&source, &set("div", "card", "card shadow-lg")).unwrap();

    let (start, old_end, new_end) = changed_window(&source, &out);
    let value_start = source.find("\"card\"").unwrap();
    assert!(start >= value_start && old_end <= value_start + "\"card\"".len());
    assert_eq!(&out[start..new_end], " shadow-lg");
    assert!(out.contains(r#"<div className="card shadow-lg">"#));
}

#[test]
fn test_every_template_element_can_be_retargeted() {
    let source = template_app();
    for (tag, class) in [("h1", "title"), ("div", "card"), ("button", ""), ("p", ""), ("code", "")] {
        let out = patcher::update_code(&source, &set(tag, class, "x")).unwrap();
        let located = patcher::locate(&out, &ElementDescriptor::new(tag, "x")).unwrap();
        assert_eq!(located.tag_name, tag);
    }
}

#[test]
fn test_sequential_edits_with_rebasing() {
    let mut source = template_app();
    let mut target = ElementDescriptor::new("h1", "title");
    for classes in ["title big", "big title", "text-3xl font-bold", "title"] {
        let request = EditRequest::new(target.clone(), Mutation::set_classes(classes));
        source = patcher::update_code(&source, &request).unwrap();
        target = request.rebased();
    }
    assert_eq!(source, template_app());
}

#[test]
fn test_stale_baseline_is_rejected_without_changes() {
    let source = template_app();
    let first = set("h1", "title", "heading");
    let patched = patcher::update_code(&source, &first).unwrap();

    let stale = set("h1", "title", "other");
    let err = patcher::update_code(&patched, &stale).unwrap_err();
    assert!(matches!(err, PatchError::NoMatch { .. }));
}

#[test]
fn test_identical_siblings_first_wins_across_nesting() {
    let source = r#"export function List() {
  return (
    <section>
      <article className="post">
        <h2 className="post">Nested</h2>
      </article>
      <article className="post">Second</article>
    </section>
  );
}
"#;
    let out = patcher::update_code(source, &set("article", "post", "post pinned")).unwrap();
    let first = out.find(r#"<article className="post pinned">"#).unwrap();
    let second = out.find(r#"<article className="post">Second</article>"#).unwrap();
    assert!(first < second);
    assert!(out.contains(r#"<h2 className="post">Nested</h2>"#));
}

#[test]
fn test_parse_errors_carry_position() {
    let source = "export const A = () => (\n  <div>\n    <span>\n  </div>\n);\n";
    match patcher::update_code(source, &set("div", "", "x")) {
        Err(PatchError::Parse(e)) => {
            assert_eq!(e.line, 4);
            assert!(e.to_string().contains("4:"));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}
