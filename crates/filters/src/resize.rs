use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;

use image::{GenericImageView, ImageFormat};
use tracing::{debug, warn};

use crate::{FilterError, UploadFilter};

/// Downscales images that exceed a bounding box.
///
/// The aspect ratio is preserved and the result is re-encoded in the
/// source format. Input that is not a recognized image, or that already
/// fits, passes through untouched. Decoding runs on the blocking pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeFilter {
    pub max_width: u32,
    pub max_height: u32,
}

impl ResizeFilter {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
        }
    }

    fn resize(self, data: Vec<u8>) -> Result<Vec<u8>, FilterError> {
        let Some(format) = image_format(&data) else {
            return Ok(data);
        };

        let img = image::load_from_memory_with_format(&data, format)?;
        let (width, height) = img.dimensions();
        if width <= self.max_width && height <= self.max_height {
            return Ok(data);
        }

        let scaled = img.thumbnail(self.max_width, self.max_height);
        let mut out = Vec::new();
        if let Err(e) = scaled.write_to(&mut Cursor::new(&mut out), format) {
            // Some formats decode but cannot be written back.
            warn!(?format, error = %e, "cannot re-encode image, keeping original");
            return Ok(data);
        }

        debug!(
            ?format,
            width,
            height,
            new_width = scaled.width(),
            new_height = scaled.height(),
            "image downscaled"
        );
        Ok(out)
    }
}

impl UploadFilter for ResizeFilter {
    fn name(&self) -> &str {
        "resize"
    }

    fn process(
        &self,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FilterError>> + Send + '_>> {
        let filter = *self;
        Box::pin(async move { tokio::task::spawn_blocking(move || filter.resize(data)).await? })
    }
}

/// Guesses the format of `data`, if it is an image this filter understands.
pub(crate) fn image_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn large_image_is_downscaled() {
        let filter = ResizeFilter::new(16, 16);
        let out = filter.process(png(64, 32)).await.unwrap();

        assert_eq!(image_format(&out), Some(ImageFormat::Png));
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (16, 8));
    }

    #[tokio::test]
    async fn small_image_is_untouched() {
        let filter = ResizeFilter::new(100, 100);
        let input = png(10, 20);
        let out = filter.process(input.clone()).await.unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn non_image_passes_through() {
        let filter = ResizeFilter::new(1, 1);
        let input = b"plain text, not an image".to_vec();
        let out = filter.process(input.clone()).await.unwrap();
        assert_eq!(out, input);
    }

    #[tokio::test]
    async fn truncated_image_fails() {
        let filter = ResizeFilter::new(8, 8);
        let mut input = png(32, 32);
        input.truncate(40);
        assert!(filter.process(input).await.is_err());
    }

    #[test]
    fn name_is_stable() {
        assert_eq!(ResizeFilter::new(1, 1).name(), "resize");
    }
}
