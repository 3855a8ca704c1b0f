use anyhow::{Result, anyhow};
use kuchiki::NodeRef;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::dom::{self, Fragment};
use crate::extract::{Extraction, Paragraph};
use crate::filters::{PosStates, TokenFilter};
use crate::kana;
use crate::token::Token;

pub const TOKEN_CLASS: &str = "lingua-token";
const TOKEN_CLASSES: &str = "lingua-token mw-no-invert notheme";

pub const ATTR_SURFACE: &str = "data-surface";
pub const ATTR_READING: &str = "data-reading";
pub const ATTR_POS: &str = "data-pos";
pub const ATTR_WORD_EXCLUDED: &str = "data-word-excluded";
pub const ATTR_POS_ENABLED: &str = "data-pos-enabled";
pub const ATTR_HOVER_SETTING: &str = "data-hover-setting";
pub const ATTR_HOVER_ENABLED: &str = "data-hover-enabled";

#[derive(Debug, Clone, Copy)]
pub struct WrapOptions {
    pub skip_non_japanese: bool,
    pub hover_setting: bool,
}

impl Default for WrapOptions {
    fn default() -> Self {
        Self {
            skip_non_japanese: true,
            hover_setting: false,
        }
    }
}

pub struct TokenWrapper<'a> {
    filter: &'a TokenFilter,
    pos_states: &'a PosStates,
    options: WrapOptions,
}

impl<'a> TokenWrapper<'a> {
    pub fn new(filter: &'a TokenFilter, pos_states: &'a PosStates, options: WrapOptions) -> Self {
        Self {
            filter,
            pos_states,
            options,
        }
    }

    // `current_generation` is the extractor's latest generation; an older
    // extraction is refused before anything is touched.
    pub fn wrap(
        &self,
        extraction: &Extraction,
        current_generation: u64,
        tokens: &[Vec<Token>],
    ) -> Result<Vec<Vec<NodeRef>>> {
        if extraction.generation != current_generation {
            return Err(anyhow!(
                "extraction generation {} is stale (current {})",
                extraction.generation,
                current_generation
            ));
        }
        let mut wrapped = Vec::with_capacity(extraction.paragraphs.len());
        for (index, paragraph) in extraction.paragraphs.iter().enumerate() {
            match tokens.get(index) {
                Some(row) => wrapped.push(self.wrap_paragraph(paragraph, row)),
                None => {
                    debug!("no tokens for paragraph {}; leaving it plain", index);
                    wrapped.push(Vec::new());
                }
            }
        }
        let total: usize = wrapped.iter().map(Vec::len).sum();
        info!(
            "wrapped {} tokens across {} paragraphs",
            total,
            extraction.paragraphs.len()
        );
        Ok(wrapped)
    }

    fn wrap_paragraph(&self, paragraph: &Paragraph, tokens: &[Token]) -> Vec<NodeRef> {
        let mut row = Vec::new();
        let mut next = 0usize;

        for span in &paragraph.spans {
            let node = &span.node;
            let chars: Vec<char> = dom::text_of(node)
                .map(|text| text.chars().collect())
                .unwrap_or_default();
            let attached = node
                .ancestors()
                .any(|ancestor| ancestor == paragraph.container);
            if !attached || chars.len() != span.end - span.start {
                debug!(
                    "text node at {}..{} changed since extraction; leaving it",
                    span.start, span.end
                );
                while next < tokens.len() && tokens[next].offset < span.end {
                    next += 1;
                }
                continue;
            }

            let mut fragment = Fragment::new();
            let mut local = 0usize;
            let mut touched = false;
            while next < tokens.len() && tokens[next].offset < span.end {
                let index = next;
                let token = &tokens[index];
                next += 1;

                let len = token.char_len();
                if len == 0 || token.offset < span.start + local || token.end() > span.end {
                    debug!(
                        "skipping token '{}' at {} (outside node or overlapping)",
                        token.surface, token.offset
                    );
                    continue;
                }
                let start = token.offset - span.start;
                let text: String = chars[start..start + len].iter().collect();
                if text != token.surface {
                    debug!(
                        "skipping token '{}' at {}: text there is '{}'",
                        token.surface, token.offset, text
                    );
                    continue;
                }
                if start > local {
                    let gap: String = chars[local..start].iter().collect();
                    fragment.push_text(&gap);
                }
                if self.is_filtered(token) {
                    fragment.push_text(&text);
                } else {
                    let pos_enabled = self.pos_states.is_enabled(&token.pos);
                    let element = build_span(token, index, pos_enabled, self.options.hover_setting);
                    fragment.push(element.clone());
                    row.push(element);
                }
                local = start + len;
                touched = true;
            }

            if !touched {
                continue;
            }
            if local < chars.len() {
                let rest: String = chars[local..].iter().collect();
                fragment.push_text(&rest);
            }
            fragment.replace(node);
        }
        row
    }

    fn is_filtered(&self, token: &Token) -> bool {
        if self.filter.should_exclude(token) {
            return true;
        }
        self.options.skip_non_japanese
            && (token.surface.trim().is_empty() || !kana::has_japanese(&token.surface))
    }
}

pub fn build_span(token: &Token, index: usize, pos_enabled: bool, hover_setting: bool) -> NodeRef {
    let span = dom::new_element("span");
    dom::set_attr(&span, "class", TOKEN_CLASSES);
    dom::set_attr(&span, ATTR_SURFACE, token.surface.as_str());
    dom::set_attr(&span, ATTR_POS, token.pos.as_str());
    dom::set_attr(&span, "data-lemma", token.lemma.as_str());
    dom::set_attr(&span, "data-tag", token.tag.as_str());
    dom::set_attr(&span, "data-dep", token.dep.as_str());
    dom::set_attr(&span, "data-head", token.head.as_str());
    dom::set_attr(&span, "data-offset", token.offset.to_string());
    dom::set_attr(&span, "data-index", index.to_string());
    if !token.reading.is_empty() {
        dom::set_attr(&span, ATTR_READING, token.reading.as_str());
    }
    dom::set_attr(&span, "data-ent_iob", token.ent_iob.as_str());
    dom::set_attr(&span, "data-ent_type", token.ent_type.as_str());
    dom::set_attr(&span, "data-is_japanese", token.is_japanese.to_string());
    let morph = serde_json::to_string(&token.morph).unwrap_or_else(|_| "{}".to_string());
    dom::set_attr(&span, "data-morph", morph);
    dom::set_attr(&span, ATTR_WORD_EXCLUDED, "false");
    dom::set_attr(&span, ATTR_POS_ENABLED, pos_enabled.to_string());
    dom::set_attr(&span, ATTR_HOVER_SETTING, hover_setting.to_string());
    recompute_hover_state(&span);
    span.append(NodeRef::new_text(token.surface.as_str()));
    span
}

// `data-hover-enabled` = hover setting and POS enabled and not word-excluded.
pub fn recompute_hover_state(span: &NodeRef) {
    let flag = |name: &str| dom::attr(span, name).as_deref() == Some("true");
    let enabled =
        flag(ATTR_HOVER_SETTING) && flag(ATTR_POS_ENABLED) && !flag(ATTR_WORD_EXCLUDED);
    dom::set_attr(span, ATTR_HOVER_ENABLED, enabled.to_string());
}

pub fn is_token_span(node: &NodeRef) -> bool {
    dom::is_tag(node, "span") && dom::has_class(node, TOKEN_CLASS)
}

pub fn token_spans(root: &NodeRef) -> Vec<NodeRef> {
    dom::select_all(root, &format!("span.{}", TOKEN_CLASS))
}

pub fn span_token(span: &NodeRef) -> Option<Token> {
    if !is_token_span(span) {
        return None;
    }
    let read = |name: &str| dom::attr(span, name).unwrap_or_default();
    let surface = dom::attr(span, ATTR_SURFACE).unwrap_or_else(|| span.text_contents());
    let morph: BTreeMap<String, String> = dom::attr(span, "data-morph")
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    Some(Token {
        surface,
        reading: read(ATTR_READING),
        lemma: read("data-lemma"),
        pos: read(ATTR_POS),
        tag: read("data-tag"),
        dep: read("data-dep"),
        head: read("data-head"),
        morph,
        offset: read("data-offset").parse().unwrap_or(0),
        ent_iob: read("data-ent_iob"),
        ent_type: read("data-ent_type"),
        is_japanese: read("data-is_japanese") == "true",
    })
}

pub fn unwrap_span(span: &NodeRef) {
    let surface = dom::attr(span, ATTR_SURFACE).unwrap_or_else(|| span.text_contents());
    let mut fragment = Fragment::new();
    fragment.push_text(&surface);
    fragment.replace(span);
}
