use super::quality::{self, QualityLevel};
use super::types::InferenceEngine;
use crate::error::ConstructError;

/// Owns the reusable inference request and decides when it must be rebuilt
///
/// A request is built lazily, kept across frames while the quality tier is
/// unchanged, and dropped when the tier changes or a reset is requested.
pub struct RequestLifecycle<R> {
    handle: Option<R>,
    active_level: QualityLevel,
    builds: u64,
}

impl<R> RequestLifecycle<R> {
    pub fn new() -> Self {
        Self {
            handle: None,
            active_level: QualityLevel::default(),
            builds: 0,
        }
    }

    /// Return a request configured for `desired`, building one if needed
    ///
    /// On construction failure the slot is left empty so the next call
    /// retries from scratch.
    pub fn ensure_handle<E>(
        &mut self,
        engine: &E,
        desired: QualityLevel,
    ) -> Result<&mut R, ConstructError>
    where
        E: InferenceEngine<Request = R>,
    {
        if self.handle.is_some() && self.active_level != desired {
            tracing::info!(
                "Quality changed from {} to {}, dropping inference request",
                self.active_level,
                desired
            );
            self.handle = None;
        }

        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                let _span = tracing::debug_span!("build_request", quality = %desired).entered();
                let handle = engine.build_request(&quality::resolve(desired))?;
                self.active_level = desired;
                self.builds += 1;
                tracing::info!(
                    "Built inference request for {} quality (build #{})",
                    desired,
                    self.builds
                );
                handle
            }
        };

        Ok(self.handle.insert(handle))
    }

    /// Drop the current request regardless of its quality tier
    ///
    /// Returns whether a request was actually dropped.
    pub fn invalidate(&mut self) -> bool {
        let dropped = self.handle.take().is_some();
        if dropped {
            tracing::info!("Inference request invalidated");
        }
        dropped
    }

    pub fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Tier of the live request, if there is one
    pub fn active_level(&self) -> Option<QualityLevel> {
        self.handle.as_ref().map(|_| self.active_level)
    }

    /// Number of requests built over the lifetime of this slot
    pub fn builds(&self) -> u64 {
        self.builds
    }
}

impl<R> Default for RequestLifecycle<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for RequestLifecycle<R> {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            tracing::debug!("Releasing inference request on teardown");
        }
    }
}
