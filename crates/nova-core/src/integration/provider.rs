//! Provider interfaces and the provider registry.
//!
//! Concrete providers (OpenAI-compatible chat, TTS engines, ...) live outside
//! Nova. The [`ProviderRegistry`] is a process-scoped lookup table that is
//! created by the runtime and injected wherever providers are needed; nothing
//! in Nova constructs a provider itself.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::foundation::error::ProviderResult;
use crate::foundation::llm::{LlmRequest, LlmResponse};

/// Kind of generation a provider performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Chat,
    Tts,
    Stt,
}

/// Provider metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMeta {
    /// Unique id, used for lookups and conversation bindings.
    pub id: String,
    /// Model name, for logging.
    pub model: String,
    pub kind: ProviderKind,
}

impl ProviderMeta {
    pub fn new(id: impl Into<String>, model: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            kind,
        }
    }
}

/// A text generation provider.
#[async_trait]
pub trait Provider: Send + Sync {
    fn meta(&self) -> ProviderMeta;

    /// Runs one request. Context resolution has already happened: the
    /// request's `contexts` is the full history to send.
    async fn text_chat(&self, request: LlmRequest) -> ProviderResult<LlmResponse>;
}

/// A text-to-speech provider.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn meta(&self) -> ProviderMeta;

    /// Synthesizes `text` and returns the path of the audio file.
    async fn get_audio(&self, text: &str) -> ProviderResult<PathBuf>;
}

/// A speech-to-text provider.
#[async_trait]
pub trait SttProvider: Send + Sync {
    fn meta(&self) -> ProviderMeta;

    /// Transcribes the audio file at `audio`.
    async fn get_text(&self, audio: &Path) -> ProviderResult<String>;
}

// ============================================================================
// Registry
// ============================================================================

struct Slot<P: ?Sized> {
    all: Vec<(String, Arc<P>)>,
    using: Option<String>,
}

impl<P: ?Sized> Default for Slot<P> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            using: None,
        }
    }
}

impl<P: ?Sized> Slot<P> {
    fn register(&mut self, id: String, provider: Arc<P>) {
        self.all.retain(|(existing, _)| *existing != id);
        if self.using.is_none() {
            self.using = Some(id.clone());
        }
        self.all.push((id, provider));
    }

    fn get(&self, id: &str) -> Option<Arc<P>> {
        self.all
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, p)| Arc::clone(p))
    }

    fn using(&self) -> Option<Arc<P>> {
        self.get(self.using.as_deref()?)
    }

    fn set_using(&mut self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.using = Some(id.to_string());
        true
    }

    fn all(&self) -> Vec<Arc<P>> {
        self.all.iter().map(|(_, p)| Arc::clone(p)).collect()
    }
}

/// Lookup table for chat, TTS and STT providers.
///
/// The first provider registered of each kind becomes the "using" provider
/// until [`set_using_provider`](Self::set_using_provider) picks another.
#[derive(Default)]
pub struct ProviderRegistry {
    chat: RwLock<Slot<dyn Provider>>,
    tts: RwLock<Slot<dyn TtsProvider>>,
    stt: RwLock<Slot<dyn SttProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&self, provider: Arc<dyn Provider>) {
        let meta = provider.meta();
        info!(provider = %meta.id, model = %meta.model, "Chat provider registered");
        self.chat.write().register(meta.id, provider);
    }

    pub fn register_tts_provider(&self, provider: Arc<dyn TtsProvider>) {
        let meta = provider.meta();
        info!(provider = %meta.id, "TTS provider registered");
        self.tts.write().register(meta.id, provider);
    }

    pub fn register_stt_provider(&self, provider: Arc<dyn SttProvider>) {
        let meta = provider.meta();
        info!(provider = %meta.id, "STT provider registered");
        self.stt.write().register(meta.id, provider);
    }

    pub fn get_provider_by_id(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.chat.read().get(id)
    }

    /// The default text generation provider.
    pub fn get_using_provider(&self) -> Option<Arc<dyn Provider>> {
        self.chat.read().using()
    }

    pub fn get_all_providers(&self) -> Vec<Arc<dyn Provider>> {
        self.chat.read().all()
    }

    /// Selects the default text generation provider. Returns `false` for an
    /// unknown id.
    pub fn set_using_provider(&self, id: &str) -> bool {
        self.chat.write().set_using(id)
    }

    pub fn get_using_tts_provider(&self) -> Option<Arc<dyn TtsProvider>> {
        self.tts.read().using()
    }

    pub fn get_all_tts_providers(&self) -> Vec<Arc<dyn TtsProvider>> {
        self.tts.read().all()
    }

    pub fn set_using_tts_provider(&self, id: &str) -> bool {
        self.tts.write().set_using(id)
    }

    pub fn get_using_stt_provider(&self) -> Option<Arc<dyn SttProvider>> {
        self.stt.read().using()
    }

    pub fn get_all_stt_providers(&self) -> Vec<Arc<dyn SttProvider>> {
        self.stt.read().all()
    }

    pub fn set_using_stt_provider(&self, id: &str) -> bool {
        self.stt.write().set_using(id)
    }

    /// Drops every provider.
    pub fn clear(&self) {
        *self.chat.write() = Slot::default();
        *self.tts.write() = Slot::default();
        *self.stt.write() = Slot::default();
    }
}
