//! Freezes the map surface into a PNG for report generation.
//!
//! Two one-shot barriers per call: one released by the surface's load state,
//! one by the UI thread after it has captured the bitmap. Each wait is bounded
//! by the same timeout.

use std::{path::PathBuf, sync::Arc, time::Duration};

use image::{ImageFormat, RgbaImage};
use tokio::sync::oneshot;

use crate::error::SnapshotError;
use crate::surface::{MapSurface, SurfaceLoadState};
use crate::ui::UiHandle;

/// Captured bitmap and the temporary PNG it was stored in. The caller owns
/// the file and deletes it when done.
#[derive(Debug, Clone)]
pub struct SnapshotResult {
    pub bitmap: RgbaImage,
    pub path: PathBuf,
}

#[derive(Clone)]
pub struct SnapshotCoordinator {
    ui: UiHandle,
}

impl SnapshotCoordinator {
    pub fn new(ui: UiHandle) -> Self {
        Self { ui }
    }

    /// Waits until `surface` has finished loading, then captures it on the UI
    /// thread.
    ///
    /// Called on the UI thread, a surface that has not loaded yet fails with
    /// [`SnapshotError::LoadTimeout`] right away, since waiting there would
    /// block the very thread that completes the load.
    pub async fn await_load_then_snapshot(
        &self,
        surface: Arc<dyn MapSurface>,
        timeout: Duration,
    ) -> Result<SnapshotResult, SnapshotError> {
        if self.ui.is_ui_thread() {
            return capture_on_ui_thread(surface.as_ref());
        }

        wait_for_load(surface.as_ref(), timeout).await?;

        let capture = self.ui.invoke(move || surface.snapshot());
        let bitmap = match tokio::time::timeout(timeout, capture).await {
            Ok(Ok(bitmap)) => bitmap,
            Ok(Err(_)) => return Err(SnapshotError::UiUnavailable),
            Err(_) => {
                tracing::warn!("map snapshot not taken within {timeout:?}");
                return Err(SnapshotError::SnapshotTimeout(timeout));
            }
        };
        store(bitmap)
    }

    /// Blocking variant for plain worker threads. Must not be called from
    /// within an async runtime.
    pub fn await_load_then_snapshot_blocking(
        &self,
        surface: Arc<dyn MapSurface>,
        timeout: Duration,
    ) -> Result<SnapshotResult, SnapshotError> {
        if self.ui.is_ui_thread() {
            return capture_on_ui_thread(surface.as_ref());
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        runtime.block_on(self.await_load_then_snapshot(surface, timeout))
    }
}

async fn wait_for_load(surface: &dyn MapSurface, timeout: Duration) -> Result<(), SnapshotError> {
    let (tx, loaded) = oneshot::channel();
    let subscription = surface
        .load_state()
        .when(SurfaceLoadState::is_succeeded, move |_| {
            let _ = tx.send(());
        });

    match tokio::time::timeout(timeout, loaded).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(SnapshotError::LoadTimeout(timeout)),
        Err(_) => {
            subscription.cancel();
            tracing::warn!("map did not finish loading within {timeout:?}");
            Err(SnapshotError::LoadTimeout(timeout))
        }
    }
}

fn capture_on_ui_thread(surface: &dyn MapSurface) -> Result<SnapshotResult, SnapshotError> {
    if !surface.load_state().get().is_succeeded() {
        tracing::warn!("snapshot requested on the UI thread before the map finished loading");
        return Err(SnapshotError::LoadTimeout(Duration::ZERO));
    }
    store(surface.snapshot())
}

fn store(bitmap: RgbaImage) -> Result<SnapshotResult, SnapshotError> {
    let file = tempfile::Builder::new()
        .prefix("tour-map-")
        .suffix(".png")
        .tempfile()?;
    bitmap.save_with_format(file.path(), ImageFormat::Png)?;
    let (_, path) = file.keep().map_err(|err| err.error)?;
    tracing::info!(
        "map snapshot {}x{} stored at {}",
        bitmap.width(),
        bitmap.height(),
        path.display()
    );
    Ok(SnapshotResult { bitmap, path })
}
