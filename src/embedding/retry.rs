use std::time::Duration;

use backon::{BlockingRetryable, ConstantBuilder};
use image::DynamicImage;
use log::warn;

use crate::domain::types::Embedding;
use crate::embedding::{EmbeddingError, EmbeddingResult, ImageEmbedder};

/// Retries failed inference with a constant delay between attempts.
pub struct RetryingEmbedder<E> {
    inner: E,
    attempts: usize,
    delay: Duration,
}

impl<E> RetryingEmbedder<E> {
    /// `attempts` counts the first call; values below one are treated as one.
    pub fn new(inner: E, attempts: usize, delay: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl<E: ImageEmbedder> ImageEmbedder for RetryingEmbedder<E> {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn embed_images(&self, images: &[DynamicImage]) -> EmbeddingResult<Vec<Embedding>> {
        let backoff = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.attempts - 1);

        (|| self.inner.embed_images(images))
            .retry(backoff)
            .sleep(std::thread::sleep)
            .when(EmbeddingError::is_retryable)
            .notify(|err: &EmbeddingError, after: Duration| {
                warn!("Error generating embedding: {err}; retrying in {after:?}");
            })
            .call()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FlakyEmbedder {
        failures: usize,
        calls: AtomicUsize,
        error: fn() -> EmbeddingError,
    }

    impl FlakyEmbedder {
        fn new(failures: usize, error: fn() -> EmbeddingError) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                error,
            }
        }
    }

    impl ImageEmbedder for FlakyEmbedder {
        fn dimension(&self) -> usize {
            1
        }

        fn embed_images(&self, images: &[DynamicImage]) -> EmbeddingResult<Vec<Embedding>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            Ok(images
                .iter()
                .map(|_| Embedding::new(vec![1.0]).unwrap())
                .collect())
        }
    }

    fn inference_error() -> EmbeddingError {
        EmbeddingError::Inference("transient".to_string())
    }

    fn unknown_model() -> EmbeddingError {
        EmbeddingError::UnknownModel("nope".to_string())
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let embedder = RetryingEmbedder::new(
            FlakyEmbedder::new(2, inference_error),
            3,
            Duration::ZERO,
        );
        let image = DynamicImage::new_rgb8(1, 1);
        let result = embedder.embed_images(&[image]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn gives_up_after_configured_attempts() {
        let embedder = RetryingEmbedder::new(
            FlakyEmbedder::new(5, inference_error),
            3,
            Duration::ZERO,
        );
        let image = DynamicImage::new_rgb8(1, 1);
        assert!(embedder.embed_images(&[image]).is_err());
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let embedder =
            RetryingEmbedder::new(FlakyEmbedder::new(1, unknown_model), 3, Duration::ZERO);
        let image = DynamicImage::new_rgb8(1, 1);
        assert!(matches!(
            embedder.embed_images(&[image]),
            Err(EmbeddingError::UnknownModel(_))
        ));
        assert_eq!(embedder.inner.calls.load(Ordering::SeqCst), 1);
    }
}
