//! Indexing, search and listing of images.

use std::path::{Component, Path, PathBuf};

use log::{info, warn};
use rand::Rng;
use validator::Validate;
use walkdir::WalkDir;

use crate::augment::{self, Augmentation};
use crate::domain::image::NewImageEmbedding;
use crate::domain::types::{Embedding, TopK};
use crate::dto::api::{ListImagesQuery, ListImagesResponse, SearchResponse};
use crate::embedding::ImageEmbedder;
use crate::forms::images::ProcessFolderForm;
use crate::models::config::ServerConfig;
use crate::repository::{ImageListQuery, ImageReader, ImageWriter};
use crate::services::{ServiceError, ServiceResult};

const NO_RESULTS: &str = "No similar images found.";

/// Outcome of a folder indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingSummary {
    /// Image files found under the folder.
    pub found: usize,
    pub processed: usize,
    pub skipped: usize,
    /// Rows actually inserted; existing file paths are not counted.
    pub inserted: usize,
}

/// Validates the requested folder and resolves it inside the upload directory.
pub fn resolve_upload_folder(
    config: &ServerConfig,
    form: &ProcessFolderForm,
) -> ServiceResult<PathBuf> {
    form.validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;

    let requested = Path::new(form.folder.trim());
    let escapes = requested
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(ServiceError::BadRequest(format!(
            "Folder '{}' must be relative to the upload directory.",
            form.folder
        )));
    }

    let target = config.upload_dir.join(requested);
    if !target.is_dir() {
        return Err(ServiceError::NotFound(format!(
            "Folder '{}' not found in upload directory.",
            form.folder
        )));
    }
    Ok(target)
}

/// Image files below `folder`, recursively, in a stable order.
pub fn collect_image_files(config: &ServerConfig, folder: &Path) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| config.is_image(path))
        .collect()
}

/// Path stored in the database: relative to `upload_dir`, `/`-separated.
pub fn relative_path(upload_dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(upload_dir).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn variant_path(relative: &str, variant: Option<&str>) -> String {
    match variant {
        Some(name) => format!("{relative}#{name}"),
        None => relative.to_string(),
    }
}

/// Decodes one file and embeds the original plus its augmented variants.
fn embed_file<E, G>(
    embedder: &E,
    config: &ServerConfig,
    augmentations: &[Augmentation],
    file: &Path,
    rng: &mut G,
) -> ServiceResult<Vec<NewImageEmbedding>>
where
    E: ImageEmbedder + ?Sized,
    G: Rng + ?Sized,
{
    let image = image::open(file)
        .map_err(|err| ServiceError::BadRequest(format!("Failed to decode image: {err}")))?;

    let (names, images): (Vec<_>, Vec<_>) = augment::variants(image, augmentations, rng)
        .into_iter()
        .map(|variant| (variant.name, variant.image))
        .unzip();
    let embeddings = embedder.embed_images(&images)?;

    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let relative = relative_path(&config.upload_dir, file);

    Ok(names
        .into_iter()
        .zip(embeddings)
        .map(|(name, embedding)| {
            NewImageEmbedding::new(filename.clone(), variant_path(&relative, name), embedding)
        })
        .collect())
}

/// Scans `folder`, embeds every image and stores the vectors in batches.
///
/// Files that cannot be decoded or embedded are logged and skipped; a failed
/// insert aborts the run.
pub fn process_folder<R, E>(
    repo: &R,
    embedder: &E,
    config: &ServerConfig,
    folder: &Path,
) -> ServiceResult<ProcessingSummary>
where
    R: ImageWriter + ?Sized,
    E: ImageEmbedder + ?Sized,
{
    process_folder_with_rng(repo, embedder, config, folder, &mut rand::rng())
}

pub fn process_folder_with_rng<R, E, G>(
    repo: &R,
    embedder: &E,
    config: &ServerConfig,
    folder: &Path,
    rng: &mut G,
) -> ServiceResult<ProcessingSummary>
where
    R: ImageWriter + ?Sized,
    E: ImageEmbedder + ?Sized,
    G: Rng + ?Sized,
{
    info!("Starting to process folder: {}", folder.display());
    let files = collect_image_files(config, folder);
    let total = files.len();
    info!("Found {total} images to process.");

    let augmentations = if config.augment {
        augment::default_augmentations()
    } else {
        Vec::new()
    };
    let batch_size = config.batch_size.max(1);

    let mut summary = ProcessingSummary {
        found: total,
        ..ProcessingSummary::default()
    };
    let mut pending: Vec<NewImageEmbedding> = Vec::new();

    for (i, file) in files.iter().enumerate() {
        match embed_file(embedder, config, &augmentations, file, rng) {
            Ok(records) => {
                pending.extend(records);
                summary.processed += 1;
                info!("Processed {}/{total}: {}", i + 1, file.display());
            }
            Err(err) => {
                summary.skipped += 1;
                warn!("Skipping {} due to error: {err}", file.display());
                continue;
            }
        }

        if pending.len() >= batch_size {
            info!("Inserting batch of {} embeddings...", pending.len());
            summary.inserted += repo.insert_embeddings(&pending)?;
            pending.clear();
        }
    }

    if !pending.is_empty() {
        info!("Inserting final batch of {} embeddings...", pending.len());
        summary.inserted += repo.insert_embeddings(&pending)?;
    }

    info!("Folder processing complete: {summary:?}");
    Ok(summary)
}

/// Similarity search with a caller-supplied vector.
pub fn search_by_embedding<R>(
    repo: &R,
    values: Vec<f32>,
    top_k: usize,
    embedding_dim: usize,
) -> ServiceResult<SearchResponse>
where
    R: ImageReader + ?Sized,
{
    let top_k = TopK::new(top_k)?;
    let embedding = Embedding::with_dimension(values, embedding_dim)?;

    let similar_images = repo.search_similar(&embedding, top_k)?;
    if similar_images.is_empty() {
        return Err(ServiceError::NotFound(NO_RESULTS.to_string()));
    }

    Ok(SearchResponse {
        query_filename: None,
        similar_images,
    })
}

/// Embeds the uploaded image and searches for its nearest neighbours.
pub fn search_by_upload<R, E>(
    repo: &R,
    embedder: &E,
    bytes: &[u8],
    filename: Option<String>,
    top_k: usize,
) -> ServiceResult<SearchResponse>
where
    R: ImageReader + ?Sized,
    E: ImageEmbedder + ?Sized,
{
    let top_k = TopK::new(top_k)?;
    let image = image::load_from_memory(bytes)
        .map_err(|err| ServiceError::BadRequest(format!("Failed to decode image: {err}")))?;

    let embedding = embedder.embed_image(&image)?;
    let similar_images = repo.search_similar(&embedding, top_k)?;
    if similar_images.is_empty() {
        return Err(ServiceError::NotFound(NO_RESULTS.to_string()));
    }

    Ok(SearchResponse {
        query_filename: filename,
        similar_images,
    })
}

pub fn list_images<R>(repo: &R, query: ListImagesQuery) -> ServiceResult<ListImagesResponse>
where
    R: ImageReader + ?Sized,
{
    query
        .validate()
        .map_err(|err| ServiceError::Validation(err.to_string()))?;

    let images = repo.list_images(ImageListQuery::new().limit(query.limit).offset(query.offset))?;
    Ok(ListImagesResponse { images })
}
