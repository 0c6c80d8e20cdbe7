use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use super::{run_model, Backend, Inference, InferenceError, Stage, StandInProfile};
use crate::models::stage::{BackendKind, StageKind, StageResult};

/// Text generation model turning a gloss into natural Spanish.
pub trait TranslationModel: Send + Sync + 'static {
    fn translate(&self, gloss: &str) -> Result<Inference<String>, InferenceError>;
}

/// Third stage: gloss → Spanish sentence.
#[derive(Debug, Clone)]
pub struct Translator {
    backend: Backend<dyn TranslationModel>,
    timeout: Duration,
}

impl Translator {
    pub fn new(backend: Backend<dyn TranslationModel>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

impl Stage for Translator {
    type Input = str;
    type Output = String;

    const KIND: StageKind = StageKind::Translation;

    async fn run(&self, gloss: &str) -> StageResult<String> {
        if gloss.trim().is_empty() {
            return StageResult::failed("empty gloss", 0.0, self.backend.kind());
        }

        match &self.backend {
            Backend::Model(model) => {
                let model = Arc::clone(model);
                let gloss = gloss.to_string();
                run_model(self.timeout, move || model.translate(&gloss)).await
            }
            Backend::StandIn(profile) => stand_in_translation(profile, gloss).await,
        }
    }
}

/// Table translation used by the stand-in backend.
pub fn stand_in_text(gloss: &str) -> String {
    match gloss {
        "CASA TECHO GATO ESTAR-AHÍ" => "El gato está en el techo de la casa".to_string(),
        "PERSONA CORRER RÁPIDO" => "La persona está corriendo rápidamente".to_string(),
        "NIÑO JUGAR PELOTA PARQUE" => "El niño está jugando pelota en el parque".to_string(),
        "MUJER COMPRAR PAN PANADERÍA" => "La mujer compra pan en la panadería".to_string(),
        "HOMBRE TRABAJAR OFICINA COMPUTADORA" => {
            "El hombre trabaja en la oficina con una computadora".to_string()
        }
        other => format!("Traducción de: {other}"),
    }
}

async fn stand_in_translation(profile: &StandInProfile, gloss: &str) -> StageResult<String> {
    let (confidence, timing_ms) = {
        let mut rng = profile.rng();
        (rng.gen_range(0.80..0.92), rng.gen_range(600.0..1500.0))
    };
    profile.pause(timing_ms).await;
    StageResult::succeeded(stand_in_text(gloss), confidence, timing_ms, BackendKind::StandIn)
}
