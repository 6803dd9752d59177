use anyhow::Result;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device, Tensor};
use image::DynamicImage;

use crate::DeviceMap;

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Ok(Device::new_cuda(ordinal)?),
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Ok(Device::new_metal(ordinal)?),
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                tracing::warn!(
                    "Running on CPU, to run on GPU(metal), build with `--features metal`"
                );
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                tracing::warn!("Running on CPU, to run on GPU, build with `--features cuda`");
            }
            Ok(Device::Cpu)
        }
    }
}

/// Half precision on an accelerator, full precision on the CPU.
pub fn select_dtype(device: &Device) -> DType {
    if device.is_cpu() {
        DType::F32
    } else {
        DType::F16
    }
}

/// Converts a u8 tensor with shape (3, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| candle_core::Error::msg("error converting tensor to image buffer"))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_runs_in_full_precision() {
        assert_eq!(select_dtype(&Device::Cpu), DType::F32);
    }

    #[test]
    fn forced_cpu_never_touches_accelerators() {
        let device = select_best_device(DeviceMap::ForceCpu).unwrap();
        assert!(device.is_cpu());
    }

    #[test]
    fn tensor_becomes_rgb_image() {
        let data: Vec<u8> = (0..3 * 2 * 4).map(|v| v as u8).collect();
        let tensor = Tensor::from_vec(data, (3, 2, 4), &Device::Cpu).unwrap();
        let image = tensor_to_image(&tensor).unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
        let rgb = image.to_rgb8();
        // channel-major in, pixel-major out
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 8, 16]);
        assert_eq!(rgb.get_pixel(3, 1).0, [7, 15, 23]);
    }

    #[test]
    fn tensor_with_wrong_channel_count_is_rejected() {
        let tensor = Tensor::zeros((4, 2, 2), DType::U8, &Device::Cpu).unwrap();
        assert!(tensor_to_image(&tensor).is_err());
    }
}
