use std::{future::Future, path::Path};

use anyhow::Result;

use crate::{DeviceMap, ModelLike, ModelVariant};

pub trait Loader {
    type Model: ModelLike;

    /// Builds the model from a local directory and binds it to a device.
    fn load(
        variant: ModelVariant,
        model_dir: &Path,
        device_map: DeviceMap,
    ) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}
