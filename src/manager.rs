use anyhow::{Result, anyhow};
use kuchiki::NodeRef;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::coloring::{ColorPalette, TextColoring};
use crate::config::Config;
use crate::dom;
use crate::extract::{Extraction, Paragraph, TextExtractor};
use crate::filters::{PosStates, TokenFilter, normalize_surface};
use crate::hover::{HoverController, HoverEffect, HoverEvent};
use crate::kana::ReadingMode;
use crate::messages::{ActionReply, PingReply, Request, Response};
use crate::reading::ReadingProcessor;
use crate::services::Services;
use crate::settings::Settings;
use crate::storage::{Store, Stores};
use crate::token::Token;
use crate::wrap::{self, ATTR_HOVER_SETTING, ATTR_POS_ENABLED, ATTR_SURFACE, ATTR_WORD_EXCLUDED};
use crate::wrap::{TokenWrapper, WrapOptions};

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub root_selector: String,
    pub skip_non_japanese: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            root_selector: "main".to_string(),
            skip_non_japanese: true,
        }
    }
}

impl From<&Config> for ManagerOptions {
    fn from(config: &Config) -> Self {
        Self {
            root_selector: config.root_selector.clone(),
            skip_non_japanese: config.skip_non_japanese,
        }
    }
}

pub struct LinguisticsManager {
    document: NodeRef,
    options: ManagerOptions,
    services: Services,
    settings_store: Arc<dyn Store>,
    settings: Settings,
    filter: TokenFilter,
    pos_states: PosStates,
    palette: ColorPalette,
    extractor: TextExtractor,
    extraction: Extraction,
    tokens: OnceCell<Vec<Vec<Token>>>,
    wrapped: Vec<Vec<NodeRef>>,
    is_wrapped: bool,
    colors_applied: bool,
    readings: ReadingProcessor,
    coloring: TextColoring,
    hover: HoverController<NodeRef>,
}

impl LinguisticsManager {
    pub async fn initialize(
        document: NodeRef,
        stores: &Stores,
        services: Services,
        options: ManagerOptions,
    ) -> Result<Self> {
        let synced = stores.tiered();
        let mut filter = TokenFilter::new(synced.clone());
        filter.initialize().await?;
        let mut pos_states = PosStates::new(stores.local.clone());
        pos_states.initialize().await?;
        let settings = Settings::load(synced.as_ref()).await;

        let mut extractor = TextExtractor::new();
        let root = resolve_root(&document, &options.root_selector);
        let extraction = extractor.extract(&root);
        info!(
            "page ready: {} paragraphs, {} excluded words",
            extraction.paragraphs.len(),
            filter.len()
        );

        Ok(Self {
            readings: ReadingProcessor::new(settings.reading_type),
            coloring: TextColoring::new(settings.dark_mode),
            hover: HoverController::new(settings.enable_dictionary),
            palette: ColorPalette::new(synced.clone()),
            settings_store: synced,
            document,
            options,
            services,
            settings,
            filter,
            pos_states,
            extractor,
            extraction,
            tokens: OnceCell::new(),
            wrapped: Vec::new(),
            is_wrapped: false,
            colors_applied: false,
        })
    }

    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    pub fn html(&self) -> String {
        self.document.to_string()
    }

    pub fn paragraphs(&self) -> &[Paragraph] {
        &self.extraction.paragraphs
    }

    pub fn wrapped(&self) -> &[Vec<NodeRef>] {
        &self.wrapped
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn filter(&self) -> &TokenFilter {
        &self.filter
    }

    pub fn hover(&self) -> &HoverController<NodeRef> {
        &self.hover
    }

    pub async fn handle_json(&mut self, message: Value) -> Response {
        match Request::parse(message) {
            Ok(request) => self.handle(request).await,
            Err(reply) => reply,
        }
    }

    pub async fn handle(&mut self, request: Request) -> Response {
        let response = match request {
            Request::Ping => Response::Ping(PingReply { ok: true }),
            Request::AddReadings => Response::from_result(self.add_readings().await),
            Request::RemoveReadings => {
                self.remove_readings();
                Response::success()
            }
            Request::ChangeReadingType { reading_type } => {
                self.change_reading_type(reading_type).await;
                Response::success()
            }
            Request::UpdateSettings { settings } => {
                Response::from_result(self.update_settings(&settings).await)
            }
            Request::AddPosAnnotations => Response::from_result(self.add_pos_annotations().await),
            Request::RemovePosAnnotations => {
                self.remove_pos_annotations();
                Response::success()
            }
            Request::ExcludeToken { surface } => {
                Response::from_result(self.exclude_token(&surface).await)
            }
            Request::IncludeToken { surface } => {
                Response::from_result(self.include_token(&surface).await)
            }
            Request::ClearExcludedTokens => {
                Response::from_result(self.clear_excluded_tokens().await)
            }
            Request::GetExcludedTokens => Response::Action(ActionReply {
                success: true,
                error: None,
                tokens: Some(self.filter.surfaces()),
            }),
            Request::SetPosState { pos, enabled } => {
                Response::from_result(self.set_pos_state(&pos, enabled).await)
            }
            Request::SetPosColor { pos, light, dark } => {
                Response::from_result(self.set_pos_color(&pos, &light, dark.as_deref()).await)
            }
            Request::ResetPosColor { pos } => {
                Response::from_result(self.reset_pos_color(&pos).await)
            }
            Request::Reextract => {
                self.reextract();
                Response::success()
            }
            Request::TokenizeParagraphs { .. } | Request::JishoLookup { .. } => {
                Response::failure("Unknown action")
            }
        };
        if let Response::Action(ActionReply {
            success: false,
            error: Some(error),
            ..
        }) = &response
        {
            warn!("page action failed: {}", error);
        }
        response
    }

    pub async fn ensure_wrapped(&mut self) -> Result<()> {
        if self.is_wrapped {
            return Ok(());
        }
        let texts = self.extraction.texts();
        let tokenizer = self.services.tokenizer.clone();
        let tokens = self
            .tokens
            .get_or_try_init(|| async move { tokenizer.tokenize_batch(&texts).await })
            .await?;
        let options = WrapOptions {
            skip_non_japanese: self.options.skip_non_japanese,
            hover_setting: self.settings.enable_hover,
        };
        let wrapper = TokenWrapper::new(&self.filter, &self.pos_states, options);
        self.wrapped = wrapper.wrap(&self.extraction, self.extractor.generation(), tokens)?;
        self.is_wrapped = true;
        Ok(())
    }

    pub async fn add_readings(&mut self) -> Result<()> {
        self.ensure_wrapped().await?;
        self.apply_colors().await;
        self.apply_readings();
        Ok(())
    }

    pub fn remove_readings(&mut self) {
        let removed = self.readings.remove_readings(&self.document);
        debug!("removed readings from {} tokens", removed);
    }

    pub async fn change_reading_type(&mut self, mode: ReadingMode) {
        self.readings.change_reading_type(&self.document, mode);
        if self.settings.reading_type != mode {
            self.settings.reading_type = mode;
            if let Err(err) = self.settings.save(self.settings_store.as_ref()).await {
                warn!("failed to persist reading type: {:#}", err);
            }
        }
    }

    pub async fn add_pos_annotations(&mut self) -> Result<()> {
        self.ensure_wrapped().await?;
        self.apply_colors().await;
        Ok(())
    }

    pub fn remove_pos_annotations(&mut self) {
        self.coloring.remove_pos_annotations(&self.document);
        self.colors_applied = false;
    }

    pub async fn update_settings(&mut self, partial: &Map<String, Value>) -> Result<()> {
        let changed = self.settings.apply_partial(partial)?;
        self.settings.save(self.settings_store.as_ref()).await?;
        for key in &changed {
            match key.as_str() {
                "readingType" => {
                    self.readings
                        .change_reading_type(&self.document, self.settings.reading_type);
                }
                "darkMode" => {
                    self.coloring.set_dark(self.settings.dark_mode);
                    if self.colors_applied {
                        self.apply_colors().await;
                    }
                }
                "enableColor" => {
                    if !self.settings.enable_color {
                        self.remove_pos_annotations();
                    } else if self.is_wrapped {
                        self.apply_colors().await;
                    }
                }
                "enableFurigana" => {
                    if !self.settings.enable_furigana {
                        self.remove_readings();
                    } else if self.is_wrapped {
                        self.apply_readings();
                    }
                }
                "enableHover" => self.apply_hover_setting(),
                "enableWordFilters" => self.refresh_annotations().await,
                "enableDictionary" => {
                    self.hover
                        .set_dictionary_enabled(self.settings.enable_dictionary);
                }
                _ => {}
            }
        }
        debug!("settings changed: {:?}", changed);
        Ok(())
    }

    pub async fn exclude_token(&mut self, surface: &str) -> Result<()> {
        let token = Token {
            surface: surface.to_string(),
            ..Token::default()
        };
        self.exclude(&token).await
    }

    pub async fn include_token(&mut self, surface: &str) -> Result<()> {
        self.filter.remove([surface]).await?;
        Ok(())
    }

    pub async fn clear_excluded_tokens(&mut self) -> Result<()> {
        self.filter.clear().await
    }

    pub async fn set_pos_state(&mut self, pos: &str, enabled: bool) -> Result<()> {
        self.pos_states.set(pos, enabled).await?;
        self.refresh_annotations().await;
        Ok(())
    }

    pub async fn set_pos_color(&mut self, pos: &str, light: &str, dark: Option<&str>) -> Result<()> {
        self.palette.set_color(pos, light, dark).await?;
        if self.colors_applied {
            self.apply_colors().await;
        }
        Ok(())
    }

    pub async fn reset_pos_color(&mut self, pos: &str) -> Result<()> {
        self.palette.reset_color(pos).await?;
        if self.colors_applied {
            self.apply_colors().await;
        }
        Ok(())
    }

    pub fn reextract(&mut self) {
        let root = resolve_root(&self.document, &self.options.root_selector);
        self.extraction = self.extractor.extract(&root);
        self.tokens = OnceCell::new();
        self.wrapped.clear();
        self.is_wrapped = false;
        self.hover.reset();
    }

    pub async fn hover_event(&mut self, event: HoverEvent<NodeRef>) -> Vec<HoverEffect<NodeRef>> {
        let effects = if event == HoverEvent::LookupRequested {
            let dictionary = self.services.dictionary.clone();
            self.hover.lookup(dictionary.as_ref()).await
        } else {
            self.hover.handle(event)
        };
        let mut remaining = Vec::with_capacity(effects.len());
        for effect in effects {
            match effect {
                HoverEffect::Exclude(span) => {
                    let token = wrap::span_token(&span).unwrap_or_else(|| Token {
                        surface: span.text_contents(),
                        ..Token::default()
                    });
                    if let Err(err) = self.exclude(&token).await {
                        warn!("failed to exclude word: {:#}", err);
                    }
                }
                other => remaining.push(other),
            }
        }
        remaining
    }

    async fn exclude(&mut self, token: &Token) -> Result<()> {
        let key = normalize_surface(&token.surface);
        if key.is_empty() {
            return Err(anyhow!("surface is empty"));
        }
        self.filter.add_token(token).await?;
        let mut unwrapped = 0;
        for span in wrap::token_spans(&self.document) {
            let surface = dom::attr(&span, ATTR_SURFACE).unwrap_or_default();
            if normalize_surface(&surface) == key {
                unwrap_token_span(&mut self.hover, &span);
                unwrapped += 1;
            }
        }
        for row in &mut self.wrapped {
            row.retain(|span| span.parent().is_some());
        }
        info!("excluded '{}' ({} spans unwrapped)", token.surface, unwrapped);
        Ok(())
    }

    fn apply_readings(&mut self) {
        self.readings.add_readings(
            &self.document,
            &self.filter,
            &self.pos_states,
            self.settings.enable_word_filters,
        );
    }

    async fn apply_colors(&mut self) {
        self.coloring
            .add_pos_annotations(
                &self.document,
                &self.palette,
                &self.filter,
                &self.pos_states,
                self.settings.enable_word_filters,
            )
            .await;
        self.colors_applied = true;
    }

    async fn refresh_annotations(&mut self) {
        for span in wrap::token_spans(&self.document) {
            let Some(token) = wrap::span_token(&span) else {
                continue;
            };
            let pos_enabled = self.pos_states.is_enabled(&token.pos);
            let word_excluded =
                self.settings.enable_word_filters && self.filter.should_exclude(&token);
            dom::set_attr(&span, ATTR_POS_ENABLED, pos_enabled.to_string());
            dom::set_attr(&span, ATTR_WORD_EXCLUDED, word_excluded.to_string());
            wrap::recompute_hover_state(&span);
        }
        if self.readings.readings_added() {
            self.apply_readings();
        }
        if self.colors_applied {
            self.apply_colors().await;
        }
    }

    fn apply_hover_setting(&mut self) {
        let enabled = self.settings.enable_hover;
        for span in wrap::token_spans(&self.document) {
            dom::set_attr(&span, ATTR_HOVER_SETTING, enabled.to_string());
            wrap::recompute_hover_state(&span);
        }
        if !enabled {
            self.hover.reset();
        }
    }
}

fn unwrap_token_span(hover: &mut HoverController<NodeRef>, span: &NodeRef) {
    if hover.active() == Some(span) {
        hover.reset();
    }
    wrap::unwrap_span(span);
}

fn resolve_root(document: &NodeRef, selector: &str) -> NodeRef {
    dom::select_first(document, selector)
        .or_else(|| dom::select_first(document, "body"))
        .unwrap_or_else(|| document.clone())
}
