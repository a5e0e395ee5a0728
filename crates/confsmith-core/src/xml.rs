//! XML text codec for [`ConfigTree`].
//!
//! Trees are always built structurally and serialized once; no fragment
//! concatenation anywhere.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::XmlError;
use crate::tree::{ConfigTree, NodeId};

/// Parses a `<config>`-rooted document.
pub fn parse_config(input: &str) -> Result<ConfigTree, XmlError> {
    let tree = parse_document(input)?;
    if tree.name(tree.root()) != "config" {
        return Err(XmlError::NotConfigRoot(tree.name(tree.root()).to_string()));
    }
    Ok(tree)
}

/// Parses any single-rooted XML document into a tree whose root is the
/// document element. Protocol documents (`<rpc>`, `<rpc-reply>`) go
/// through here.
pub fn parse_document(input: &str) -> Result<ConfigTree, XmlError> {
    let mut reader = Reader::from_str(input);
    let mut tree: Option<ConfigTree> = None;
    // Stack of open elements; empty once the document element closes.
    let mut stack: Vec<NodeId> = Vec::new();
    let mut done = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Syntax {
                message: e.to_string(),
            })?;
        match event {
            Event::Start(start) => {
                open_element(&mut tree, &mut stack, &mut done, &start, false)?;
            }
            Event::Empty(start) => {
                open_element(&mut tree, &mut stack, &mut done, &start, true)?;
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| XmlError::Syntax {
                        message: e.to_string(),
                    })?;
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                let (tree, top) = match (&mut tree, stack.last()) {
                    (Some(t), Some(top)) => (t, *top),
                    _ => {
                        return Err(XmlError::Syntax {
                            message: "text outside document element".to_string(),
                        })
                    }
                };
                if !tree.children(top).is_empty() {
                    return Err(XmlError::MixedContent(tree.name(top).to_string()));
                }
                tree.set_value(top, value);
            }
            Event::End(_) => {
                let (tree, top) = match (&tree, stack.pop()) {
                    (Some(t), Some(top)) => (t, top),
                    _ => {
                        return Err(XmlError::Syntax {
                            message: "unmatched end tag".to_string(),
                        })
                    }
                };
                if tree.value(top).is_some() && !tree.children(top).is_empty() {
                    return Err(XmlError::MixedContent(tree.name(top).to_string()));
                }
                if stack.is_empty() {
                    done = true;
                }
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).to_string();
                match (&mut tree, stack.last()) {
                    (Some(t), Some(top)) => t.set_value(*top, value),
                    _ => {
                        return Err(XmlError::Syntax {
                            message: "cdata outside document element".to_string(),
                        })
                    }
                }
            }
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::UnexpectedEof);
    }
    tree.ok_or(XmlError::UnexpectedEof)
}

fn open_element(
    tree: &mut Option<ConfigTree>,
    stack: &mut Vec<NodeId>,
    done: &mut bool,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<(), XmlError> {
    if *done {
        return Err(XmlError::Syntax {
            message: "content after document element".to_string(),
        });
    }
    let name = String::from_utf8_lossy(local_name(start.name().as_ref())).to_string();
    let id = match (tree.as_mut(), stack.last().copied()) {
        (None, _) => {
            let t = ConfigTree::with_root(name);
            let root = t.root();
            *tree = Some(t);
            root
        }
        (Some(t), Some(parent)) => t.append_child(parent, name),
        (Some(_), None) => {
            return Err(XmlError::Syntax {
                message: "multiple document elements".to_string(),
            })
        }
    };
    let t = tree.as_mut().expect("tree initialized above");
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax {
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(local_name(attr.key.as_ref())).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Syntax {
                message: e.to_string(),
            })?
            .to_string();
        t.set_attr(id, key, value);
    }
    if empty {
        if stack.is_empty() {
            *done = true;
        }
    } else {
        stack.push(id);
    }
    Ok(())
}

/// Strips any namespace prefix (`nc:operation` -> `operation`).
fn local_name(raw: &[u8]) -> &[u8] {
    match raw.iter().rposition(|b| *b == b':') {
        Some(pos) => &raw[pos + 1..],
        None => raw,
    }
}

/// Serializes a tree to XML text. With `pretty`, children are indented
/// two spaces per level.
pub fn to_xml(tree: &ConfigTree, pretty: bool) -> String {
    let buffer = if pretty {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_tree(&mut writer, tree);
        writer.into_inner()
    } else {
        let mut writer = Writer::new(Vec::new());
        write_tree(&mut writer, tree);
        writer.into_inner()
    };
    String::from_utf8(buffer).expect("writer emits utf-8")
}

/// Serializes a tree as a standalone document with an XML declaration;
/// the on-disk database format.
pub fn to_xml_document(tree: &ConfigTree, pretty: bool) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&to_xml(tree, pretty));
    out.push('\n');
    out
}

fn write_tree<W: std::io::Write>(writer: &mut Writer<W>, tree: &ConfigTree) {
    write_node(writer, tree, tree.root());
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, tree: &ConfigTree, id: NodeId) {
    let name = tree.name(id);
    let mut start = BytesStart::new(name);
    for (k, v) in tree.attrs(id) {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    let children = tree.children(id);
    let value = tree.value(id);
    // Writing to a Vec cannot fail.
    if children.is_empty() && value.is_none() {
        writer.write_event(Event::Empty(start)).expect("write to vec");
        return;
    }
    writer.write_event(Event::Start(start)).expect("write to vec");
    if let Some(v) = value {
        writer
            .write_event(Event::Text(BytesText::new(v)))
            .expect("write to vec");
    }
    for child in children {
        write_node(writer, tree, *child);
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .expect("write to vec");
}

/// The canonical empty database document.
pub fn empty_config_document() -> String {
    to_xml_document(&ConfigTree::new(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::NodePath;

    #[test]
    fn parse_simple_config() {
        let tree = parse_config("<config><a><x>1</x></a></config>").unwrap();
        let x = tree
            .find_first(&NodePath::parse("/a/x").unwrap())
            .unwrap();
        assert_eq!(tree.value(x), Some("1"));
    }

    #[test]
    fn parse_empty_config() {
        let tree = parse_config("<config/>").unwrap();
        assert!(tree.is_empty());
        let tree = parse_config("<config></config>").unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn parse_rejects_wrong_root() {
        assert!(matches!(
            parse_config("<data><a/></data>"),
            Err(XmlError::NotConfigRoot(_))
        ));
    }

    #[test]
    fn parse_rejects_truncated() {
        assert!(parse_config("<config><a>").is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_config("not xml at all <<<").is_err());
    }

    #[test]
    fn parse_skips_decl_and_comments() {
        let input = "<?xml version=\"1.0\"?><!-- saved --><config><a>1</a></config>";
        let tree = parse_config(input).unwrap();
        assert!(!tree.is_empty());
    }

    #[test]
    fn parse_captures_operation_attr() {
        let input = r#"<config><a operation="delete"/></config>"#;
        let tree = parse_config(input).unwrap();
        let a = tree.first_child(tree.root(), "a").unwrap();
        assert_eq!(tree.attr(a, "operation"), Some("delete"));
    }

    #[test]
    fn parse_strips_namespace_prefixes() {
        let input = r#"<nc:config xmlns:nc="urn:x"><nc:a nc:operation="merge">1</nc:a></nc:config>"#;
        let tree = parse_config(input).unwrap();
        let a = tree.first_child(tree.root(), "a").unwrap();
        assert_eq!(tree.attr(a, "operation"), Some("merge"));
        assert_eq!(tree.value(a), Some("1"));
    }

    #[test]
    fn parse_unescapes_text() {
        let tree = parse_config("<config><m>a &lt;b&gt; &amp; c</m></config>").unwrap();
        let m = tree.first_child(tree.root(), "m").unwrap();
        assert_eq!(tree.value(m), Some("a <b> & c"));
    }

    #[test]
    fn parse_rejects_mixed_content() {
        assert!(matches!(
            parse_config("<config><a>text<b/></a></config>"),
            Err(XmlError::MixedContent(_))
        ));
    }

    #[test]
    fn parse_document_any_root() {
        let tree = parse_document("<rpc message-id=\"1\"><commit/></rpc>").unwrap();
        assert_eq!(tree.name(tree.root()), "rpc");
        assert_eq!(tree.attr(tree.root(), "message-id"), Some("1"));
        assert!(tree.first_child(tree.root(), "commit").is_some());
    }

    #[test]
    fn roundtrip_compact() {
        let input = "<config><a><x>1</x></a><b/></config>";
        let tree = parse_config(input).unwrap();
        assert_eq!(to_xml(&tree, false), input);
    }

    #[test]
    fn roundtrip_escapes_values() {
        let mut tree = ConfigTree::new();
        tree.append_leaf(tree.root(), "m", "a <b> & c");
        let xml = to_xml(&tree, false);
        assert!(xml.contains("a &lt;b&gt; &amp; c"));
        let back = parse_config(&xml).unwrap();
        assert!(tree.semantic_eq(&back));
    }

    #[test]
    fn pretty_output_indents() {
        let tree = parse_config("<config><a><x>1</x></a></config>").unwrap();
        let pretty = to_xml(&tree, true);
        assert!(pretty.contains("\n  <a>"));
        assert!(parse_config(&pretty).unwrap().semantic_eq(&tree));
    }

    #[test]
    fn document_form_has_decl() {
        let tree = ConfigTree::new();
        let doc = to_xml_document(&tree, false);
        assert!(doc.starts_with("<?xml version=\"1.0\""));
        assert!(doc.contains("<config/>"));
    }

    #[test]
    fn empty_document_parses_empty() {
        let doc = empty_config_document();
        let tree = parse_config(&doc).unwrap();
        assert!(tree.is_empty());
    }
}
