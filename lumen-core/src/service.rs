use std::sync::Mutex;

use tracing::{error, info};

use crate::{GenerateError, GenerationRequest, ImageStore, ModelLike, SavedImage};

/// Holds the loaded pipeline for the lifetime of the process.
///
/// Callers share one instance. The model sits behind a mutex, so concurrent
/// `generate` calls run one after another instead of fighting over the device.
pub struct ImageService {
    model: Mutex<Box<dyn ModelLike>>,
    store: ImageStore,
    steps: usize,
}

impl ImageService {
    pub fn new(model: Box<dyn ModelLike>, store: ImageStore, steps: usize) -> Self {
        Self {
            model: Mutex::new(model),
            store,
            steps,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Generates one image for `prompt` and saves it. Blocks for the whole run.
    pub fn generate(&self, prompt: &str) -> Result<SavedImage, GenerateError> {
        if prompt.is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }

        let image = {
            let mut model = self.model.lock().map_err(|_| {
                error!("model lock poisoned by an earlier panic");
                GenerateError::ModelPoisoned
            })?;
            info!(steps = self.steps, "Starting image generation...");
            model
                .run(GenerationRequest {
                    prompt: prompt.to_string(),
                    steps: self.steps,
                })
                .map_err(GenerateError::Inference)?
        };

        let saved = self.store.save(prompt, &image)?;
        info!(path = %saved.public_path, "Image generated successfully.");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mock::MockModel, FailureKind};

    #[test]
    fn passes_configured_steps_to_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = MockModel::new();
        let requests = model.requests();
        let service = ImageService::new(Box::new(model), ImageStore::new(dir.path()), 25);
        assert_eq!(service.steps(), 25);

        service.generate("a red fox").unwrap();

        let seen = requests.lock().unwrap();
        assert_eq!(
            *seen,
            vec![GenerationRequest {
                prompt: "a red fox".to_string(),
                steps: 25
            }]
        );
    }

    #[test]
    fn empty_prompt_never_reaches_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = MockModel::new();
        let requests = model.requests();
        let service = ImageService::new(Box::new(model), ImageStore::new(dir.path()), 25);

        let err = service.generate("").unwrap_err();

        assert_eq!(err.kind(), FailureKind::InvalidInput);
        assert!(requests.lock().unwrap().is_empty());
    }

    #[test]
    fn model_failure_is_internal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let service = ImageService::new(
            Box::new(MockModel::new().with_failure(true)),
            ImageStore::new(&out),
            25,
        );

        let err = service.generate("a red fox").unwrap_err();

        assert!(matches!(err, GenerateError::Inference(_)));
        assert_eq!(err.kind(), FailureKind::Internal);
        assert!(!out.exists());
    }
}
