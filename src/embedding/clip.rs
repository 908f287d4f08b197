use std::io::Cursor;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions};
use image::{DynamicImage, ImageFormat};
use log::info;

use crate::domain::types::Embedding;
use crate::embedding::{EmbeddingError, EmbeddingResult, ImageEmbedder, validate_output};

/// Resolves a configured model name to the fastembed model and its output
/// dimension.
pub fn resolve_model(name: &str) -> EmbeddingResult<(ImageEmbeddingModel, usize)> {
    let resolved = match name.trim().to_lowercase().as_str() {
        "clip-vit-b-32" | "qdrant/clip-vit-b-32-vision" => (ImageEmbeddingModel::ClipVitB32, 512),
        "resnet50" | "qdrant/resnet50-onnx" => (ImageEmbeddingModel::Resnet50, 2048),
        "unicom-vit-b-16" | "qdrant/unicom-vit-b-16" => (ImageEmbeddingModel::UnicomVitB16, 768),
        "unicom-vit-b-32" | "qdrant/unicom-vit-b-32" => (ImageEmbeddingModel::UnicomVitB32, 512),
        "nomic-embed-vision-v1.5" | "nomic-ai/nomic-embed-vision-v1.5" => {
            (ImageEmbeddingModel::NomicEmbedVisionV15, 768)
        }
        _ => return Err(EmbeddingError::UnknownModel(name.to_string())),
    };
    Ok(resolved)
}

/// CLIP-family image embedder running locally through ONNX Runtime.
///
/// The session is not shareable across threads, so calls are serialised.
pub struct ClipEmbedder {
    session: Mutex<ImageEmbedding>,
    dimension: usize,
}

impl ClipEmbedder {
    /// Loads the model, downloading it into `cache_dir` on first use.
    pub fn try_new(model_name: &str, cache_dir: &Path) -> EmbeddingResult<Self> {
        let (model, dimension) = resolve_model(model_name)?;
        info!("Initializing image embedder {model_name} ({dimension} dimensions)");

        let options = ImageInitOptions::new(model)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);
        let session = ImageEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            dimension,
        })
    }
}

/// Encodes the image as an RGB PNG, the input format the model expects.
fn encode_rgb_png(image: &DynamicImage) -> EmbeddingResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

impl ImageEmbedder for ClipEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_images(&self, images: &[DynamicImage]) -> EmbeddingResult<Vec<Embedding>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = images
            .iter()
            .map(encode_rgb_png)
            .collect::<EmbeddingResult<Vec<_>>>()?;
        let inputs: Vec<&[u8]> = encoded.iter().map(Vec::as_slice).collect();

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = session
            .embed_bytes(&inputs, None)
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        validate_output(raw, images.len(), self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_models() {
        let (_, dim) = resolve_model("clip-vit-b-32").unwrap();
        assert_eq!(dim, 512);
        let (_, dim) = resolve_model("  Nomic-Embed-Vision-v1.5 ").unwrap();
        assert_eq!(dim, 768);
    }

    #[test]
    fn rejects_unknown_model() {
        assert!(matches!(
            resolve_model("openai/clip-vit-large-patch14"),
            Err(EmbeddingError::UnknownModel(name)) if name == "openai/clip-vit-large-patch14"
        ));
    }

    #[test]
    fn encodes_grayscale_as_rgb_png() {
        let gray = DynamicImage::new_luma8(3, 2);
        let bytes = encode_rgb_png(&gray).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgb8);
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}
