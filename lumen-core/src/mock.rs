//! A stand-in pipeline for tests and dry runs.

use std::sync::{Arc, Mutex};

use image::{DynamicImage, Rgb, RgbImage};

use crate::{GenerationRequest, ModelLike};

pub struct MockModel {
    size: u32,
    color: [u8; 3],
    should_fail: bool,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            size: 8,
            color: [32, 96, 160],
            should_fail: false,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_failure(mut self, should_fail: bool) -> Self {
        self.should_fail = should_fail;
        self
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    /// Every request the model has been asked to run, in order.
    pub fn requests(&self) -> Arc<Mutex<Vec<GenerationRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLike for MockModel {
    fn run(&mut self, request: GenerationRequest) -> anyhow::Result<DynamicImage> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        if self.should_fail {
            anyhow::bail!("mock failure");
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            self.size,
            self.size,
            Rgb(self.color),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            steps: 4,
        }
    }

    #[test]
    fn records_requests_and_paints_solid_color() {
        let mut model = MockModel::new().with_color([1, 2, 3]);
        let image = model.run(request("sunset")).unwrap();

        assert_eq!(image.to_rgb8().get_pixel(5, 5).0, [1, 2, 3]);
        assert_eq!(model.requests().lock().unwrap().len(), 1);
    }

    #[test]
    fn failing_mock_still_records() {
        let mut model = MockModel::new().with_failure(true);
        assert!(model.run(request("sunset")).is_err());
        assert_eq!(model.requests().lock().unwrap()[0].prompt, "sunset");
    }
}
