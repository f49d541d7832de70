use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::source::ComponentSource;
use crate::core::{AssembledComponent, AssetError, AvailableModel, ModelBundle, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_length: usize,
    pub temperature: f32,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub top_p: Option<f32>,
    pub repetition_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 128,
            temperature: 0.0,
            top_k: None,
            top_p: None,
            repetition_penalty: 1.0,
        }
    }
}

/// What a session builder consumes for an encoder/decoder model.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    pub encoder: AssembledComponent,
    pub decoder: AssembledComponent,
    pub config: Bytes,
    pub tokenizer: Bytes,
}

impl TryFrom<ModelBundle> for EngineSpec {
    type Error = AssetError;

    fn try_from(bundle: ModelBundle) -> Result<Self> {
        let found = bundle.components.len();
        let mut components = bundle.components.into_iter();
        match (components.next(), components.next(), components.next()) {
            (Some(encoder), Some(decoder), None) => Ok(EngineSpec {
                encoder,
                decoder,
                config: bundle.config,
                tokenizer: bundle.tokenizer,
            }),
            _ => Err(AssetError::UnsupportedBundle { expected: 2, found }),
        }
    }
}

/// The native inference engine. Opaque beyond accepting model bytes.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    async fn build(&self, spec: EngineSpec) -> Result<Box<dyn EngineSession>>;
}

#[async_trait]
pub trait EngineSession: Send {
    /// Each token only has to outlive its own callback invocation, so an
    /// engine may pass strings it has just decoded.
    async fn stream(
        &mut self,
        input: &str,
        on_token: &mut (dyn for<'t> FnMut(&'t str) + Send),
        config: &GenerationConfig,
    ) -> Result<()>;
}

#[derive(Default)]
pub struct Session {
    engine_session: Option<Box<dyn EngineSession>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.engine_session.is_some()
    }

    pub async fn init<S, E>(&mut self, source: &S, engine: &E, model: AvailableModel) -> Result<()>
    where
        S: ComponentSource + ?Sized,
        E: InferenceEngine + ?Sized,
    {
        if self.engine_session.is_some() {
            return Err(AssetError::AlreadyInitialized);
        }

        let bundle = source.get_components(model).await?;
        let spec = EngineSpec::try_from(bundle)?;
        tracing::info!(
            model = %model,
            encoder_tensors = spec.encoder.tensors.len(),
            decoder_tensors = spec.decoder.tensors.len(),
            "building session"
        );
        self.engine_session = Some(engine.build(spec).await?);
        Ok(())
    }

    pub async fn run<C>(
        &mut self,
        input: &str,
        mut on_token: C,
        config: Option<GenerationConfig>,
    ) -> Result<()>
    where
        C: for<'t> FnMut(&'t str) + Send,
    {
        let session = self
            .engine_session
            .as_mut()
            .ok_or(AssetError::NotInitialized)?;
        let config = config.unwrap_or_default();
        session.stream(input, &mut on_token, &config).await
    }

    pub fn destroy(&mut self) {
        self.engine_session = None;
    }
}
