//! Failures a generation call can report back to its caller.

use thiserror::Error;

/// How a failure should be surfaced to whoever asked for the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The caller sent something unusable; nothing was attempted.
    InvalidInput,
    /// Generation or saving failed; details stay in the server log.
    Internal,
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("prompt is required")]
    EmptyPrompt,

    #[error("model is unavailable after an earlier run panicked")]
    ModelPoisoned,

    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerateError::EmptyPrompt => FailureKind::InvalidInput,
            _ => FailureKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_empty_prompt_is_a_client_error() {
        assert_eq!(GenerateError::EmptyPrompt.kind(), FailureKind::InvalidInput);
        assert_eq!(
            GenerateError::Inference(anyhow::anyhow!("out of memory")).kind(),
            FailureKind::Internal
        );
        assert_eq!(
            GenerateError::Io(std::io::Error::other("disk full")).kind(),
            FailureKind::Internal
        );
        assert_eq!(GenerateError::ModelPoisoned.kind(), FailureKind::Internal);
    }

    #[test]
    fn inference_error_keeps_context_chain() {
        let err = anyhow::anyhow!("CUDA_ERROR_OUT_OF_MEMORY").context("unet forward");
        let msg = GenerateError::Inference(err).to_string();
        assert_eq!(msg, "inference failed: unet forward: CUDA_ERROR_OUT_OF_MEMORY");
    }
}
