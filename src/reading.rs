use kuchiki::NodeRef;
use tracing::{debug, info};

use crate::align::{self, Segment};
use crate::dom;
use crate::filters::{PosStates, TokenFilter};
use crate::kana::{self, ReadingMode};
use crate::wrap::{self, ATTR_POS_ENABLED, ATTR_SURFACE, ATTR_WORD_EXCLUDED};

pub const RUBY_STYLE_ID: &str = "lingua-ruby-style";
const RUBY_STYLE: &str = "ruby { line-height: 1.65; } ruby rt { font-size: .55em; white-space: nowrap; }";
const KANA_ATTR: &str = "data-kana";

#[derive(Debug, Default)]
pub struct ReadingProcessor {
    mode: ReadingMode,
    readings_added: bool,
}

impl ReadingProcessor {
    pub fn new(mode: ReadingMode) -> Self {
        Self {
            mode,
            readings_added: false,
        }
    }

    pub fn mode(&self) -> ReadingMode {
        self.mode
    }

    pub fn readings_added(&self) -> bool {
        self.readings_added
    }

    pub fn add_readings(
        &mut self,
        root: &NodeRef,
        filter: &TokenFilter,
        pos_states: &PosStates,
        enable_word_filters: bool,
    ) -> usize {
        dom::ensure_style(&dom::tree_root(root), RUBY_STYLE_ID, RUBY_STYLE);
        let mut aligned = 0;
        for span in wrap::token_spans(root) {
            let Some(token) = wrap::span_token(&span) else {
                continue;
            };
            let pos_enabled = pos_states.is_enabled(&token.pos);
            let word_excluded = enable_word_filters && filter.should_exclude(&token);
            dom::set_attr(&span, ATTR_POS_ENABLED, pos_enabled.to_string());
            dom::set_attr(&span, ATTR_WORD_EXCLUDED, word_excluded.to_string());
            wrap::recompute_hover_state(&span);

            if token.reading.is_empty() {
                continue;
            }
            if dom::select_first(&span, "ruby").is_none() {
                let segments = align::align(&token.surface, &token.reading, self.mode);
                render_into(&span, &segments);
                aligned += 1;
            }
            let hidden = word_excluded || !pos_enabled;
            for rt in dom::select_all(&span, "rt") {
                dom::set_style_property(&rt, "display", hidden.then_some("none"));
            }
        }
        self.readings_added = true;
        info!("aligned readings for {} tokens", aligned);
        aligned
    }

    pub fn remove_readings(&mut self, root: &NodeRef) -> usize {
        if !self.readings_added {
            debug!("no readings to remove");
            return 0;
        }
        let mut removed = 0;
        for span in wrap::token_spans(root) {
            if dom::select_first(&span, "ruby").is_none() {
                continue;
            }
            let surface = dom::attr(&span, ATTR_SURFACE).unwrap_or_else(|| plain_text(&span));
            dom::set_text(&span, &surface);
            removed += 1;
        }
        self.readings_added = false;
        removed
    }

    pub fn change_reading_type(&mut self, root: &NodeRef, mode: ReadingMode) -> usize {
        self.mode = mode;
        if !self.readings_added {
            return 0;
        }
        let mut changed = 0;
        for rt in dom::select_all(root, &format!("span.{} rt", wrap::TOKEN_CLASS)) {
            let source = dom::attr(&rt, KANA_ATTR)
                .unwrap_or_else(|| kana::to_hiragana(&rt.text_contents()));
            dom::set_text(&rt, &kana::convert(&source, mode));
            changed += 1;
        }
        debug!("switched {} readings to {}", changed, mode);
        changed
    }
}

fn render_into(span: &NodeRef, segments: &[Segment]) {
    let mut children = Vec::with_capacity(segments.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => children.push(NodeRef::new_text(text.as_str())),
            Segment::Ruby {
                base,
                kana,
                reading,
            } => {
                let ruby = dom::new_element("ruby");
                ruby.append(NodeRef::new_text(base.as_str()));
                let rt = dom::new_element("rt");
                dom::set_attr(&rt, KANA_ATTR, kana.as_str());
                rt.append(NodeRef::new_text(reading.as_str()));
                ruby.append(rt);
                children.push(ruby);
            }
        }
    }
    dom::replace_children(span, children);
}

fn plain_text(node: &NodeRef) -> String {
    node.descendants()
        .filter(|child| !child.ancestors().any(|ancestor| dom::is_tag(&ancestor, "rt")))
        .filter_map(|child| dom::text_of(&child))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{inner_html, parse_document, select_first};
    use crate::storage::MemoryStore;
    use crate::test_util::token;
    use crate::wrap::build_span;
    use std::sync::Arc;

    fn page(spans: &[(&str, &str, &str)]) -> NodeRef {
        let doc = parse_document("<html><head></head><body><p></p></body></html>");
        let p = select_first(&doc, "p").expect("p");
        for (index, (surface, reading, pos)) in spans.iter().enumerate() {
            p.append(build_span(&token(surface, reading, pos, index), index, true, true));
        }
        doc
    }

    fn components() -> (TokenFilter, PosStates) {
        let store = Arc::new(MemoryStore::new());
        (TokenFilter::new(store.clone()), PosStates::new(store))
    }

    #[test]
    fn adds_ruby_once_and_installs_style() {
        let doc = page(&[("食べる", "タベル", "VERB"), ("。", "", "PUNCT")]);
        let (filter, states) = components();
        let mut readings = ReadingProcessor::new(ReadingMode::Hiragana);
        assert_eq!(readings.add_readings(&doc, &filter, &states, false), 1);
        assert_eq!(readings.add_readings(&doc, &filter, &states, false), 0);

        let span = select_first(&doc, "span").expect("span");
        assert_eq!(
            inner_html(&span),
            "<ruby>食<rt data-kana=\"た\">た</rt></ruby>べる"
        );
        assert_eq!(dom::select_all(&doc, "#lingua-ruby-style").len(), 1);
    }

    #[test]
    fn switching_scripts_is_idempotent() {
        let doc = page(&[("日本語", "ニホンゴ", "NOUN")]);
        let (filter, states) = components();
        let mut readings = ReadingProcessor::new(ReadingMode::Hiragana);
        readings.add_readings(&doc, &filter, &states, false);

        readings.change_reading_type(&doc, ReadingMode::Romaji);
        readings.change_reading_type(&doc, ReadingMode::Romaji);
        let rt = select_first(&doc, "rt").expect("rt");
        assert_eq!(rt.text_contents(), "nihongo");

        readings.change_reading_type(&doc, ReadingMode::Katakana);
        assert_eq!(rt.text_contents(), "ニホンゴ");
        readings.change_reading_type(&doc, ReadingMode::Hiragana);
        assert_eq!(rt.text_contents(), "にほんご");
    }

    #[test]
    fn mode_applies_to_newly_aligned_spans() {
        let doc = page(&[("猫", "ネコ", "NOUN")]);
        let (filter, states) = components();
        let mut readings = ReadingProcessor::new(ReadingMode::Hiragana);
        assert_eq!(readings.change_reading_type(&doc, ReadingMode::Katakana), 0);
        readings.add_readings(&doc, &filter, &states, false);
        let rt = select_first(&doc, "rt").expect("rt");
        assert_eq!(rt.text_contents(), "ネコ");
    }

    #[tokio::test]
    async fn excluded_words_hide_ruby_text() {
        let doc = page(&[("猫", "ネコ", "NOUN"), ("犬", "イヌ", "NOUN")]);
        let (mut filter, states) = components();
        filter.add(["猫"]).await.expect("exclude");
        let mut readings = ReadingProcessor::new(ReadingMode::Hiragana);
        readings.add_readings(&doc, &filter, &states, true);

        let rts = dom::select_all(&doc, "rt");
        assert_eq!(dom::attr(&rts[0], "style").as_deref(), Some("display: none;"));
        assert!(dom::attr(&rts[1], "style").is_none());
        let spans = wrap::token_spans(&doc);
        assert_eq!(dom::attr(&spans[0], ATTR_WORD_EXCLUDED).as_deref(), Some("true"));
        assert_eq!(
            dom::attr(&spans[0], wrap::ATTR_HOVER_ENABLED).as_deref(),
            Some("false")
        );

        readings.add_readings(&doc, &filter, &states, false);
        let rts = dom::select_all(&doc, "rt");
        assert!(dom::attr(&rts[0], "style").is_none());
    }

    #[tokio::test]
    async fn disabled_pos_hides_ruby_text() {
        let doc = page(&[("走る", "ハシル", "VERB")]);
        let (filter, mut states) = components();
        states.set("VERB", false).await.expect("disable");
        let mut readings = ReadingProcessor::new(ReadingMode::Hiragana);
        readings.add_readings(&doc, &filter, &states, false);
        let rt = select_first(&doc, "rt").expect("rt");
        assert_eq!(dom::style_property(&rt, "display").as_deref(), Some("none"));
    }

    #[test]
    fn removal_restores_surfaces() {
        let doc = page(&[("食べる", "タベル", "VERB"), ("物", "モノ", "NOUN")]);
        let (filter, states) = components();
        let mut readings = ReadingProcessor::new(ReadingMode::Hiragana);
        assert_eq!(readings.remove_readings(&doc), 0);
        readings.add_readings(&doc, &filter, &states, false);
        assert_eq!(readings.remove_readings(&doc), 2);
        assert!(dom::select_all(&doc, "ruby").is_empty());
        let p = select_first(&doc, "p").expect("p");
        assert_eq!(p.text_contents(), "食べる物");
        assert!(!readings.readings_added());
        assert_eq!(
            dom::attr(&wrap::token_spans(&doc)[0], wrap::ATTR_READING).as_deref(),
            Some("タベル")
        );
    }
}
