use html5ever::{LocalName, Namespace, QualName};
use kuchiki::traits::*;
use kuchiki::{Attribute, ExpandedName, NodeData, NodeRef};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

pub fn parse_document(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

pub(crate) fn new_element(local: &str) -> NodeRef {
    let name = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from(local),
    );
    NodeRef::new_element(name, Vec::<(ExpandedName, Attribute)>::new())
}

pub(crate) fn is_document(node: &NodeRef) -> bool {
    matches!(node.data(), NodeData::Document(_))
}

pub(crate) fn tag_name(node: &NodeRef) -> Option<String> {
    node.as_element()
        .map(|element| (*element.name.local).to_ascii_lowercase())
}

pub(crate) fn is_tag(node: &NodeRef, name: &str) -> bool {
    node.as_element()
        .map(|element| (*element.name.local).eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

pub(crate) fn attr(node: &NodeRef, name: &str) -> Option<String> {
    let element = node.as_element()?;
    let attributes = element.attributes.borrow();
    attributes.get(name).map(|value| value.to_string())
}

pub(crate) fn set_attr(node: &NodeRef, name: &str, value: impl Into<String>) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().insert(name, value.into());
    }
}

pub(crate) fn remove_attr(node: &NodeRef, name: &str) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().remove(name);
    }
}

pub(crate) fn has_class(node: &NodeRef, class: &str) -> bool {
    attr(node, "class")
        .map(|value| value.split_whitespace().any(|item| item == class))
        .unwrap_or(false)
}

pub(crate) fn remove_classes(node: &NodeRef, classes: &[&str]) {
    let Some(current) = attr(node, "class") else {
        return;
    };
    let kept: Vec<&str> = current
        .split_whitespace()
        .filter(|item| !classes.contains(item))
        .collect();
    if kept.is_empty() {
        remove_attr(node, "class");
    } else {
        set_attr(node, "class", kept.join(" "));
    }
}

pub(crate) fn style_property(node: &NodeRef, property: &str) -> Option<String> {
    let style = attr(node, "style")?;
    parse_declarations(&style)
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(property))
        .map(|(_, value)| value)
}

// Sets (or with `None`, removes) one inline style declaration, keeping the others.
pub(crate) fn set_style_property(node: &NodeRef, property: &str, value: Option<&str>) {
    let style = attr(node, "style").unwrap_or_default();
    let mut declarations: Vec<(String, String)> = parse_declarations(&style)
        .into_iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(property))
        .collect();
    if let Some(value) = value {
        declarations.push((property.to_string(), value.to_string()));
    }
    if declarations.is_empty() {
        remove_attr(node, "style");
        return;
    }
    let rendered = declarations
        .iter()
        .map(|(name, value)| format!("{}: {};", name, value))
        .collect::<Vec<_>>()
        .join(" ");
    set_attr(node, "style", rendered);
}

fn parse_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|item| {
            let (name, value) = item.split_once(':')?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                None
            } else {
                Some((name.to_string(), value.to_string()))
            }
        })
        .collect()
}

pub(crate) fn select_all(root: &NodeRef, selector: &str) -> Vec<NodeRef> {
    match root.select(selector) {
        Ok(matches) => matches.map(|item| item.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    }
}

pub(crate) fn select_first(root: &NodeRef, selector: &str) -> Option<NodeRef> {
    root.select_first(selector)
        .ok()
        .map(|item| item.as_node().clone())
}

pub(crate) fn text_of(node: &NodeRef) -> Option<String> {
    node.as_text().map(|text| text.borrow().clone())
}

pub(crate) fn replace_children(node: &NodeRef, children: impl IntoIterator<Item = NodeRef>) {
    for child in node.children().collect::<Vec<_>>() {
        child.detach();
    }
    for child in children {
        node.append(child);
    }
}

pub(crate) fn set_text(node: &NodeRef, text: &str) {
    replace_children(node, [NodeRef::new_text(text)]);
}

pub fn inner_html(node: &NodeRef) -> String {
    node.children().map(|child| child.to_string()).collect()
}

#[derive(Default)]
pub(crate) struct Fragment {
    nodes: Vec<NodeRef>,
}

impl Fragment {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.nodes.last()
            && let Some(existing) = last.as_text()
        {
            existing.borrow_mut().push_str(text);
            return;
        }
        self.nodes.push(NodeRef::new_text(text));
    }

    pub(crate) fn push(&mut self, node: NodeRef) {
        self.nodes.push(node);
    }

    pub(crate) fn replace(self, target: &NodeRef) {
        for node in self.nodes {
            target.insert_before(node);
        }
        target.detach();
    }
}

// Inserts `<style id=..>` into `<head>` unless an element with that id exists.
pub(crate) fn ensure_style(document: &NodeRef, id: &str, css: &str) -> bool {
    if select_first(document, &format!("#{}", id)).is_some() {
        return false;
    }
    let Some(parent) = select_first(document, "head")
        .or_else(|| select_first(document, "body"))
    else {
        return false;
    };
    let style = new_element("style");
    set_attr(&style, "id", id);
    style.append(NodeRef::new_text(css));
    parent.append(style);
    true
}

pub(crate) fn tree_root(node: &NodeRef) -> NodeRef {
    node.ancestors().last().unwrap_or_else(|| node.clone())
}
