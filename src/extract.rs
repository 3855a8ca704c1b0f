use kuchiki::NodeRef;
use std::collections::VecDeque;
use tracing::debug;

use crate::dom;
use crate::kana;
use crate::wrap::TOKEN_CLASS;

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "div",
    "dl",
    "dt",
    "dd",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "td",
    "th",
    "ul",
];

const SKIPPED_SUBTREES: &[&str] = &["head", "script", "style", "noscript", "template", "title"];

const NON_TEXT_PARENTS: &[&str] = &["script", "style", "ruby", "rt", "rb"];

#[derive(Debug, Clone)]
pub struct NodeSpan {
    pub node: NodeRef,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Paragraph {
    pub container: NodeRef,
    pub text_nodes: Vec<NodeRef>,
    pub spans: Vec<NodeSpan>,
    pub text: String,
}

impl Paragraph {
    pub fn char_len(&self) -> usize {
        self.spans.last().map(|span| span.end).unwrap_or(0)
    }

    pub fn locate(&self, offset: usize) -> Option<(&NodeSpan, usize)> {
        let index = self.spans.partition_point(|span| span.end <= offset);
        let span = self.spans.get(index)?;
        if offset < span.start {
            return None;
        }
        Some((span, offset - span.start))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub generation: u64,
    pub paragraphs: Vec<Paragraph>,
}

impl Extraction {
    pub fn texts(&self) -> Vec<String> {
        self.paragraphs
            .iter()
            .map(|paragraph| paragraph.text.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}

// Stamps every pass with a fresh generation so results of an older pass can be
// recognised after the DOM moved on.
#[derive(Debug, Default)]
pub struct TextExtractor {
    generation: u64,
}

impl TextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn extract(&mut self, root: &NodeRef) -> Extraction {
        self.generation += 1;
        let paragraphs = extract_paragraphs(root);
        debug!(
            "extracted {} paragraphs (generation {})",
            paragraphs.len(),
            self.generation
        );
        Extraction {
            generation: self.generation,
            paragraphs,
        }
    }
}

pub fn extract_paragraphs(root: &NodeRef) -> Vec<Paragraph> {
    let mut queue: VecDeque<(NodeRef, bool)> = VecDeque::new();
    queue.push_back((root.clone(), true));
    for footer in detached_footers(root) {
        queue.push_back((footer, true));
    }

    let mut visited: Vec<NodeRef> = Vec::new();
    let mut paragraphs = Vec::new();
    while let Some((node, is_start)) = queue.pop_front() {
        if dom::is_document(&node) {
            for child in node.children().filter(|child| child.as_element().is_some()) {
                queue.push_back((child, true));
            }
            continue;
        }
        let Some(tag) = dom::tag_name(&node) else {
            continue;
        };
        if SKIPPED_SUBTREES.contains(&tag.as_str()) {
            continue;
        }
        let leaf = is_block_tag(&tag) && !has_block_child(&node);
        if leaf || (is_start && !has_block_descendant(&node)) {
            if visited.contains(&node) {
                continue;
            }
            visited.push(node.clone());
            if let Some(paragraph) = collect_paragraph(&node) {
                paragraphs.push(paragraph);
            }
            continue;
        }
        for child in node.children().filter(|child| child.as_element().is_some()) {
            queue.push_back((child, false));
        }
    }
    paragraphs
}

fn detached_footers(root: &NodeRef) -> Vec<NodeRef> {
    if dom::is_document(root) {
        return Vec::new();
    }
    let document = dom::tree_root(root);
    let footers = dom::select_all(&document, "footer");
    footers
        .into_iter()
        .filter(|footer| {
            footer != root
                && !footer.ancestors().any(|ancestor| &ancestor == root)
                && !footer
                    .ancestors()
                    .any(|ancestor| dom::is_tag(&ancestor, "footer"))
        })
        .collect()
}

fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

fn is_block(node: &NodeRef) -> bool {
    dom::tag_name(node)
        .map(|tag| is_block_tag(&tag))
        .unwrap_or(false)
}

fn has_block_child(node: &NodeRef) -> bool {
    node.children().any(|child| is_block(&child))
}

fn has_block_descendant(node: &NodeRef) -> bool {
    node.descendants().any(|child| is_block(&child))
}

fn collect_paragraph(container: &NodeRef) -> Option<Paragraph> {
    let mut text_nodes = Vec::new();
    let mut spans = Vec::new();
    let mut text = String::new();
    let mut cursor = 0usize;

    for node in container.descendants() {
        let Some(data) = dom::text_of(&node) else {
            continue;
        };
        if !accepts_text(&node, &data, container) {
            continue;
        }
        let len = data.chars().count();
        spans.push(NodeSpan {
            node: node.clone(),
            start: cursor,
            end: cursor + len,
        });
        text_nodes.push(node);
        text.push_str(&data);
        cursor += len;
    }

    if text.trim().is_empty() {
        return None;
    }
    Some(Paragraph {
        container: container.clone(),
        text_nodes,
        spans,
        text,
    })
}

fn accepts_text(node: &NodeRef, data: &str, container: &NodeRef) -> bool {
    if data.trim().is_empty() {
        return false;
    }
    if !kana::is_annotatable(data) {
        return false;
    }
    !inside_excluded_element(node, container)
}

fn inside_excluded_element(node: &NodeRef, container: &NodeRef) -> bool {
    for ancestor in node.ancestors() {
        if let Some(tag) = dom::tag_name(&ancestor) {
            if NON_TEXT_PARENTS.contains(&tag.as_str())
                || SKIPPED_SUBTREES.contains(&tag.as_str())
            {
                return true;
            }
            if tag == "span" && dom::has_class(&ancestor, TOKEN_CLASS) {
                return true;
            }
        }
        if &ancestor == container {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_document, select_first};

    fn texts(html: &str) -> Vec<String> {
        let doc = parse_document(html);
        let body = select_first(&doc, "body").expect("body");
        extract_paragraphs(&body)
            .into_iter()
            .map(|paragraph| paragraph.text)
            .collect()
    }

    #[test]
    fn collects_leaf_blocks_in_order() {
        let found = texts(
            "<body><div><p>日本語の<b>文章</b>です</p><div><p>二つ目</p></div></div></body>",
        );
        assert_eq!(found, vec!["日本語の文章です", "二つ目"]);
    }

    #[test]
    fn skips_scripts_ruby_and_non_japanese_nodes() {
        let found = texts(
            "<body><p>English only</p><p>漢字<ruby>字<rt>じ</rt></ruby><script>var x = '日本';</script></p></body>",
        );
        assert_eq!(found, vec!["漢字"]);
    }

    #[test]
    fn digits_count_as_annotatable() {
        let found = texts("<body><p>2024</p><p>   </p></body>");
        assert_eq!(found, vec!["2024"]);
    }

    #[test]
    fn inline_only_root_is_one_paragraph() {
        let doc = parse_document("<body><span>東京</span><em>大阪</em></body>");
        let body = select_first(&doc, "body").expect("body");
        let paragraphs = extract_paragraphs(&body);
        assert_eq!(paragraphs.len(), 1);
        assert_eq!(paragraphs[0].text, "東京大阪");
        assert_eq!(paragraphs[0].container, body);
    }

    #[test]
    fn footer_outside_root_is_included() {
        let doc = parse_document(
            "<body><main><p>本文</p></main><footer><p>脚注</p></footer></body>",
        );
        let main = select_first(&doc, "main").expect("main");
        let paragraphs = extract_paragraphs(&main);
        let found: Vec<_> = paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(found, vec!["本文", "脚注"]);
    }

    #[test]
    fn spans_cover_paragraph_text() {
        let doc = parse_document("<body><p>猫が<i>好き</i>です</p></body>");
        let body = select_first(&doc, "body").expect("body");
        let paragraphs = extract_paragraphs(&body);
        let paragraph = &paragraphs[0];
        assert_eq!(paragraph.char_len(), paragraph.text.chars().count());
        let mut rebuilt = String::new();
        for span in &paragraph.spans {
            rebuilt.push_str(&dom::text_of(&span.node).expect("text"));
        }
        assert_eq!(rebuilt, paragraph.text);

        let (span, local) = paragraph.locate(3).expect("offset 3");
        assert_eq!(dom::text_of(&span.node).as_deref(), Some("好き"));
        assert_eq!(local, 1);
        assert!(paragraph.locate(6).is_none());
    }

    #[test]
    fn every_generation_is_new() {
        let doc = parse_document("<body><p>一</p></body>");
        let mut extractor = TextExtractor::new();
        let first = extractor.extract(&doc);
        let second = extractor.extract(&doc);
        assert_eq!(first.generation + 1, second.generation);
        assert_eq!(second.texts(), vec!["一"]);
    }
}
