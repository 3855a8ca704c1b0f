use anyhow::{Result, anyhow};
use futures_util::future::join_all;
use kuchiki::NodeRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dom;
use crate::filters::{PosStates, TokenFilter};
use crate::storage::{self, Store};
use crate::wrap::{self, ATTR_POS_ENABLED, ATTR_WORD_EXCLUDED};

pub const CUSTOM_COLORS_KEY: &str = "customColors";

pub const LIGHT_DEFAULT_COLOR: &str = "#202124";
pub const DARK_DEFAULT_COLOR: &str = "#e0e0e0";

const THEME_CLASSES: &[&str] = &["skin-invert", "notheme-override"];

const LIGHT_POS_COLORS: &[(&str, &str)] = &[
    ("NOUN", "#1f77b4"),
    ("VERB", "#d65627"),
    ("ADJ", "#2ca02c"),
    ("ADV", "#ff7f0e"),
    ("PRON", "#9467bd"),
    ("PROPN", "#63A2B0"),
    ("PART", "#8c564b"),
    ("AUX", "#e377c2"),
    ("ADP", "#7f7f7f"),
    ("CCONJ", "#bcbd22"),
    ("SCONJ", "#17becf"),
];

const DARK_POS_COLORS: &[(&str, &str)] = &[
    ("NOUN", "#69a3f3"),
    ("VERB", "#f2706a"),
    ("ADJ", "#6dc66d"),
    ("ADV", "#ff9a4e"),
    ("PRON", "#b48cd5"),
    ("PROPN", "#2e7686"),
    ("PART", "#a67a6f"),
    ("AUX", "#f68fcf"),
    ("ADP", "#b3b3b3"),
    ("CCONJ", "#d9db4c"),
    ("SCONJ", "#5fdfea"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColors {
    #[serde(default)]
    pub light_colors: BTreeMap<String, String>,
    #[serde(default)]
    pub dark_colors: BTreeMap<String, String>,
}

pub fn default_color(pos: &str, dark: bool) -> &'static str {
    let (table, fallback) = if dark {
        (DARK_POS_COLORS, DARK_DEFAULT_COLOR)
    } else {
        (LIGHT_POS_COLORS, LIGHT_DEFAULT_COLOR)
    };
    let pos = pos.trim().to_uppercase();
    table
        .iter()
        .find(|(name, _)| *name == pos)
        .map(|(_, color)| *color)
        .unwrap_or(fallback)
}

fn is_hex_color(value: &str) -> bool {
    let Some(hex) = value.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|ch| ch.is_ascii_hexdigit())
}

#[derive(Clone)]
pub struct ColorPalette {
    store: Arc<dyn Store>,
}

impl ColorPalette {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn custom_colors(&self) -> CustomColors {
        match storage::get_json::<CustomColors>(self.store.as_ref(), CUSTOM_COLORS_KEY).await {
            Ok(colors) => colors.unwrap_or_default(),
            Err(err) => {
                warn!("failed to load custom colors: {:#}", err);
                CustomColors::default()
            }
        }
    }

    pub async fn color_for(&self, pos: &str, dark: bool) -> String {
        let custom = self.custom_colors().await;
        let overrides = if dark {
            &custom.dark_colors
        } else {
            &custom.light_colors
        };
        overrides
            .get(&pos.trim().to_uppercase())
            .cloned()
            .unwrap_or_else(|| default_color(pos, dark).to_string())
    }

    pub async fn set_color(&self, pos: &str, light: &str, dark: Option<&str>) -> Result<()> {
        let pos = pos.trim().to_uppercase();
        if pos.is_empty() {
            return Err(anyhow!("POS is empty"));
        }
        for color in std::iter::once(light).chain(dark) {
            if !is_hex_color(color) {
                return Err(anyhow!("invalid color '{}'", color));
            }
        }
        let mut custom = self.custom_colors().await;
        custom.light_colors.insert(pos.clone(), light.to_string());
        if let Some(dark) = dark {
            custom.dark_colors.insert(pos, dark.to_string());
        }
        storage::set_json(self.store.as_ref(), CUSTOM_COLORS_KEY, &custom).await
    }

    pub async fn reset_color(&self, pos: &str) -> Result<()> {
        let pos = pos.trim().to_uppercase();
        let mut custom = self.custom_colors().await;
        custom.light_colors.remove(&pos);
        custom.dark_colors.remove(&pos);
        storage::set_json(self.store.as_ref(), CUSTOM_COLORS_KEY, &custom).await
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextColoring {
    dark: bool,
}

impl TextColoring {
    pub fn new(dark: bool) -> Self {
        Self { dark }
    }

    pub fn set_dark(&mut self, dark: bool) {
        self.dark = dark;
    }

    pub async fn add_pos_annotations(
        &self,
        root: &NodeRef,
        palette: &ColorPalette,
        filter: &TokenFilter,
        pos_states: &PosStates,
        enable_word_filters: bool,
    ) -> usize {
        let spans = wrap::token_spans(root);
        let dark = self.dark;
        let passes = spans.iter().map(|span| async move {
            let Some(token) = wrap::span_token(span) else {
                return false;
            };
            let pos_enabled = pos_states.is_enabled(&token.pos);
            let word_excluded = enable_word_filters && filter.should_exclude(&token);
            dom::set_attr(span, ATTR_POS_ENABLED, pos_enabled.to_string());
            dom::set_attr(span, ATTR_WORD_EXCLUDED, word_excluded.to_string());
            wrap::recompute_hover_state(span);
            if !pos_enabled || word_excluded {
                dom::set_style_property(span, "color", None);
                return false;
            }
            let color = palette.color_for(&token.pos, dark).await;
            dom::remove_classes(span, THEME_CLASSES);
            let value = format!("{} !important", color);
            dom::set_style_property(span, "color", Some(value.as_str()));
            true
        });
        let colored = join_all(passes).await.into_iter().filter(|done| *done).count();
        info!("colored {} of {} tokens", colored, spans.len());
        colored
    }

    pub fn remove_pos_annotations(&self, root: &NodeRef) -> usize {
        let mut removed = 0;
        for span in wrap::token_spans(root) {
            if dom::style_property(&span, "color").is_some() {
                dom::set_style_property(&span, "color", None);
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_document, select_first};
    use crate::storage::MemoryStore;
    use crate::test_util::token;
    use crate::wrap::build_span;

    fn page(spans: &[(&str, &str)]) -> NodeRef {
        let doc = parse_document("<body><p></p></body>");
        let p = select_first(&doc, "p").expect("p");
        for (index, (surface, pos)) in spans.iter().enumerate() {
            p.append(build_span(&token(surface, "", pos, index), index, true, true));
        }
        doc
    }

    #[test]
    fn defaults_follow_the_palette() {
        assert_eq!(default_color("noun", false), "#1f77b4");
        assert_eq!(default_color("NOUN", true), "#69a3f3");
        assert_eq!(default_color("INTJ", false), LIGHT_DEFAULT_COLOR);
        assert_eq!(default_color("", true), DARK_DEFAULT_COLOR);
    }

    #[tokio::test]
    async fn overrides_and_reset() {
        let palette = ColorPalette::new(Arc::new(MemoryStore::new()));
        palette
            .set_color("verb", "#000000", Some("#ffffff"))
            .await
            .expect("set");
        assert_eq!(palette.color_for("VERB", false).await, "#000000");
        assert_eq!(palette.color_for("VERB", true).await, "#ffffff");
        palette.reset_color("VERB").await.expect("reset");
        assert_eq!(palette.color_for("VERB", false).await, "#d65627");
        assert!(palette.set_color("VERB", "red", None).await.is_err());
    }

    #[tokio::test]
    async fn colors_enabled_spans_only() {
        let doc = page(&[("猫", "NOUN"), ("走る", "VERB"), ("犬", "NOUN")]);
        let store = Arc::new(MemoryStore::new());
        let palette = ColorPalette::new(store.clone());
        let mut filter = TokenFilter::new(store.clone());
        filter.add(["犬"]).await.expect("exclude");
        let mut states = PosStates::new(store);
        states.set("VERB", false).await.expect("disable");

        let spans = wrap::token_spans(&doc);
        dom::set_attr(&spans[0], "class", "lingua-token skin-invert");
        let coloring = TextColoring::new(false);
        let colored = coloring
            .add_pos_annotations(&doc, &palette, &filter, &states, true)
            .await;
        assert_eq!(colored, 1);
        assert_eq!(
            dom::style_property(&spans[0], "color").as_deref(),
            Some("#1f77b4 !important")
        );
        assert!(!dom::has_class(&spans[0], "skin-invert"));
        assert!(dom::style_property(&spans[1], "color").is_none());
        assert!(dom::style_property(&spans[2], "color").is_none());

        assert_eq!(coloring.remove_pos_annotations(&doc), 1);
        assert!(dom::attr(&spans[0], "style").is_none());
    }

    #[tokio::test]
    async fn dark_mode_uses_dark_palette() {
        let doc = page(&[("猫", "NOUN")]);
        let store = Arc::new(MemoryStore::new());
        let palette = ColorPalette::new(store.clone());
        let filter = TokenFilter::new(store.clone());
        let states = PosStates::new(store);
        let coloring = TextColoring::new(true);
        coloring
            .add_pos_annotations(&doc, &palette, &filter, &states, false)
            .await;
        let span = &wrap::token_spans(&doc)[0];
        assert_eq!(
            dom::style_property(span, "color").as_deref(),
            Some("#69a3f3 !important")
        );
    }
}
