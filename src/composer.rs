//! The dream composer: collects a new entry, optionally asks the AI for
//! suggestions, and submits it.

use crate::error::{Error, Result};
use chrono::Utc;
use dreamdeck_rust_dreams::{
    AudioAttachment, Dream, DreamEmotion, DreamsClient, NewDream, RefreshBus,
};
use dreamdeck_rust_insight::{merge_suggestions, InsightClient, SuggestedTag};
use std::sync::Arc;

/// Minimum content length before any AI-assist action is enabled
pub const MIN_CONTENT_FOR_ASSIST: usize = 50;

/// Modal workflow for recording a new dream.
///
/// Each AI-assist action is gated on the content length and fires at most
/// once per field; the gates are what keep rapid repeated clicks from
/// merging duplicate suggestions. Submit keeps the modal open on failure
/// so the user can retry, and signals the feed on success.
pub struct DreamComposer {
    dreams: DreamsClient,
    insight: Arc<InsightClient>,
    bus: Arc<RefreshBus>,

    title: String,
    content: String,
    is_lucid: bool,
    audio: Option<AudioAttachment>,

    emotion_pool: Vec<SuggestedTag>,
    theme_pool: Vec<SuggestedTag>,
    selected_emotions: Vec<DreamEmotion>,
    selected_themes: Vec<String>,

    title_suggested: bool,
    emotions_suggested: bool,
    themes_suggested: bool,

    submitting: bool,
    open: bool,
    error: Option<String>,
}

impl DreamComposer {
    pub fn new(dreams: DreamsClient, insight: Arc<InsightClient>, bus: Arc<RefreshBus>) -> Self {
        Self {
            dreams,
            insight,
            bus,
            title: String::new(),
            content: String::new(),
            is_lucid: false,
            audio: None,
            emotion_pool: Vec::new(),
            theme_pool: Vec::new(),
            selected_emotions: Vec::new(),
            selected_themes: Vec::new(),
            title_suggested: false,
            emotions_suggested: false,
            themes_suggested: false,
            submitting: false,
            open: true,
            error: None,
        }
    }

    /// Fill the selectable tag pools from the backend catalogs.
    pub async fn load_tag_pools(&mut self) -> Result<()> {
        let emotions = self.dreams.known_emotions().await?;
        let themes = self.dreams.known_themes().await?;
        self.emotion_pool = emotions
            .iter()
            .map(|name| SuggestedTag::new(name, false))
            .collect();
        self.theme_pool = themes
            .iter()
            .map(|name| SuggestedTag::new(name, false))
            .collect();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: &str) {
        self.content = content.to_string();
    }

    pub fn set_lucid(&mut self, is_lucid: bool) {
        self.is_lucid = is_lucid;
    }

    pub fn attach_audio(&mut self, audio: AudioAttachment) {
        self.audio = Some(audio);
    }

    pub fn emotion_pool(&self) -> &[SuggestedTag] {
        &self.emotion_pool
    }

    pub fn theme_pool(&self) -> &[SuggestedTag] {
        &self.theme_pool
    }

    pub fn selected_emotions(&self) -> &[DreamEmotion] {
        &self.selected_emotions
    }

    pub fn selected_themes(&self) -> &[String] {
        &self.selected_themes
    }

    /// Select an emotion at the default intensity. Selecting an already
    /// selected emotion is a no-op.
    pub fn select_emotion(&mut self, name: &str) {
        if !self
            .selected_emotions
            .iter()
            .any(|e| e.name.eq_ignore_ascii_case(name))
        {
            self.selected_emotions.push(DreamEmotion::new(name));
        }
    }

    pub fn deselect_emotion(&mut self, name: &str) {
        self.selected_emotions
            .retain(|e| !e.name.eq_ignore_ascii_case(name));
    }

    /// Set the intensity of a selected emotion, clamped to 1..=10.
    pub fn set_intensity(&mut self, name: &str, intensity: u8) {
        if let Some(emotion) = self
            .selected_emotions
            .iter_mut()
            .find(|e| e.name.eq_ignore_ascii_case(name))
        {
            emotion.intensity = intensity.clamp(1, 10);
        }
    }

    pub fn select_theme(&mut self, name: &str) {
        if !self
            .selected_themes
            .iter()
            .any(|t| t.eq_ignore_ascii_case(name))
        {
            self.selected_themes.push(name.to_string());
        }
    }

    pub fn deselect_theme(&mut self, name: &str) {
        self.selected_themes.retain(|t| !t.eq_ignore_ascii_case(name));
    }

    /// Whether the content is long enough for any AI-assist action.
    pub fn assist_gate_open(&self) -> bool {
        self.content.chars().count() >= MIN_CONTENT_FOR_ASSIST
    }

    pub fn can_suggest_title(&self) -> bool {
        self.assist_gate_open() && !self.title_suggested
    }

    pub fn can_suggest_emotions(&self) -> bool {
        self.assist_gate_open() && !self.emotions_suggested
    }

    pub fn can_suggest_themes(&self) -> bool {
        self.assist_gate_open() && !self.themes_suggested
    }

    /// Ask the AI for a title and replace the title field verbatim.
    pub async fn suggest_title(&mut self) -> Result<()> {
        if !self.can_suggest_title() {
            return Err(Error::AssistUnavailable("title"));
        }
        let suggestion = self.insight.suggest_title(&self.content).await?;
        self.title = suggestion;
        self.title_suggested = true;
        Ok(())
    }

    /// Ask the AI for emotions, merge them into the pool and auto-select
    /// the newly introduced ones at the default intensity.
    pub async fn suggest_emotions(&mut self) -> Result<()> {
        if !self.can_suggest_emotions() {
            return Err(Error::AssistUnavailable("emotions"));
        }
        let names = self.insight.suggest_emotions(&self.content).await?;
        let newly_added = merge_suggestions(&mut self.emotion_pool, &names);
        for name in &newly_added {
            self.select_emotion(name);
        }
        self.emotions_suggested = true;
        Ok(())
    }

    /// Ask the AI for themes, with the same merge and auto-select policy
    /// as emotions.
    pub async fn suggest_themes(&mut self) -> Result<()> {
        if !self.can_suggest_themes() {
            return Err(Error::AssistUnavailable("themes"));
        }
        let names = self.insight.suggest_themes(&self.content).await?;
        let newly_added = merge_suggestions(&mut self.theme_pool, &names);
        for name in &newly_added {
            self.select_theme(name);
        }
        self.themes_suggested = true;
        Ok(())
    }

    /// Submit the composed dream.
    ///
    /// On success the feed is signalled and the modal closes. On failure
    /// the error is kept inline and the modal stays open for a retry.
    pub async fn submit(&mut self) -> Result<Dream> {
        if self.submitting {
            return Err(Error::SubmitInFlight);
        }
        self.submitting = true;
        self.error = None;

        let new_dream = NewDream {
            title: self.title.clone(),
            content: self.content.clone(),
            date: Utc::now(),
            is_lucid: self.is_lucid,
            emotions: self.selected_emotions.clone(),
            themes: self.selected_themes.clone(),
        };

        let result = self.dreams.create(&new_dream, self.audio.clone()).await;
        self.submitting = false;

        match result {
            Ok(dream) => {
                self.bus.publish();
                self.open = false;
                Ok(dream)
            }
            Err(err) => {
                log::warn!("failed to record dream: {}", err);
                self.error = Some(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Close without submitting (cancel, or a click outside the modal).
    pub fn dismiss(&mut self) {
        self.open = false;
    }
}
