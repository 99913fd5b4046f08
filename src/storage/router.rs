//! Smart storage router
//!
//! Routes every storage operation to the real or mock backend based on the
//! feature flags and the real backend's observed health. When the real
//! backend fails mid-operation the router retries against the mock; if the
//! mock also fails, the original real error is surfaced so the root cause
//! is never masked by a secondary failure.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;

use super::backend::{
    DeleteResult, FileUpload, StorageBackend, StorageMode, UploadResult,
};
use super::error::StorageError;
use super::flags::{FeatureFlagManager, StorageModePreference};
use super::mock::MockStorageClient;
use super::path::generate_upload_path;
use super::r2::R2Client;

type Routed<T> = Result<(T, StorageMode, &'static str), (StorageError, StorageMode, &'static str)>;

struct RouterState {
    mode: StorageMode,
    real_healthy: bool,
    fallback_active: bool,
    last_health_check: Option<Instant>,
}

/// Point-in-time view of the router
#[derive(Debug, Clone, Copy)]
pub struct RouterStatus {
    pub mode: StorageMode,
    pub fallback_active: bool,
    pub real_configured: bool,
    pub real_healthy: bool,
}

/// Storage router with health tracking and mock fallback
pub struct SmartStorageRouter {
    real: Option<Arc<dyn StorageBackend>>,
    mock: Arc<dyn StorageBackend>,
    flags: Arc<FeatureFlagManager>,
    state: Mutex<RouterState>,
    health_check_interval: Duration,
}

impl SmartStorageRouter {
    /// Build a router from configuration.
    ///
    /// Missing or invalid credentials are not fatal: the router comes up
    /// mock-only and logs why.
    pub async fn from_config(config: &StorageConfig, flags: Arc<FeatureFlagManager>) -> Self {
        let real: Option<Arc<dyn StorageBackend>> = if config.has_real_credentials() {
            match R2Client::new(config).await {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Failed to create real storage client, running mock-only");
                    None
                }
            }
        } else {
            info!("Storage credentials not configured, running mock-only");
            None
        };

        let mock: Arc<dyn StorageBackend> = Arc::new(MockStorageClient::new(&config.mock_root));

        Self::with_backends(
            real,
            mock,
            flags,
            Duration::from_secs(config.health_check_interval_secs),
        )
    }

    /// Build a router over explicit backends
    pub fn with_backends(
        real: Option<Arc<dyn StorageBackend>>,
        mock: Arc<dyn StorageBackend>,
        flags: Arc<FeatureFlagManager>,
        health_check_interval: Duration,
    ) -> Self {
        let real_configured = real.is_some();
        let mode = if flags.should_use_real(real_configured) {
            StorageMode::Real
        } else {
            StorageMode::Mock
        };

        Self {
            real,
            mock,
            flags,
            state: Mutex::new(RouterState {
                mode,
                real_healthy: real_configured,
                fallback_active: false,
                last_health_check: None,
            }),
            health_check_interval,
        }
    }

    pub fn current_mode(&self) -> StorageMode {
        self.state.lock().mode
    }

    pub fn is_fallback_active(&self) -> bool {
        self.state.lock().fallback_active
    }

    pub fn status(&self) -> RouterStatus {
        let state = self.state.lock();
        RouterStatus {
            mode: state.mode,
            fallback_active: state.fallback_active,
            real_configured: self.real.is_some(),
            real_healthy: state.real_healthy,
        }
    }

    /// Upload a file under a generated path
    pub async fn upload_file(
        &self,
        upload: FileUpload,
        user_id: Option<&str>,
        category: Option<&str>,
    ) -> UploadResult {
        let path = generate_upload_path(&upload.file_name, user_id, category);
        self.upload_buffer(upload.data, &path, &upload.content_type)
            .await
    }

    /// Upload raw bytes to an explicit path
    pub async fn upload_buffer(
        &self,
        data: bytes::Bytes,
        path: &str,
        content_type: &str,
    ) -> UploadResult {
        let path_owned = path.to_string();
        let content_type = content_type.to_string();
        let routed = self
            .execute("upload", move |backend| {
                let data = data.clone();
                let path = path_owned.clone();
                let content_type = content_type.clone();
                async move { backend.upload_buffer(data, &path, &content_type).await }.boxed()
            })
            .await;

        match routed {
            Ok((outcome, mode, provider)) => UploadResult::ok(outcome, provider, mode),
            Err((e, mode, provider)) => UploadResult::failed(&e, provider, mode),
        }
    }

    /// Delete a file through the routed backend
    pub async fn delete_file(&self, path: &str) -> DeleteResult {
        let path_owned = path.to_string();
        let routed = self
            .execute("delete", move |backend| {
                let path = path_owned.clone();
                async move { backend.delete_file(&path).await }.boxed()
            })
            .await;

        match routed {
            Ok(((), mode, _)) => DeleteResult {
                success: true,
                mode,
                error: None,
            },
            Err((e, mode, _)) => DeleteResult {
                success: false,
                mode,
                error: Some(e.to_string()),
            },
        }
    }

    /// List stored paths through the routed backend
    pub async fn list_files(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let prefix_owned = prefix.map(|p| p.to_string());
        self.execute("list", move |backend| {
            let prefix = prefix_owned.clone();
            async move { backend.list_files(prefix.as_deref()).await }.boxed()
        })
        .await
        .map(|(paths, _, _)| paths)
        .map_err(|(e, _, _)| e)
    }

    /// Public URL for a path, resolved against the currently serving mode.
    /// Pure: performs no I/O and never fails.
    pub fn get_file_url(&self, path: &str) -> String {
        let mode = self.current_mode();
        match (&self.real, mode) {
            (Some(real), StorageMode::Real) => real.file_url(path),
            _ => self.mock.file_url(path),
        }
    }

    /// Probe real-backend health if the check interval has elapsed.
    ///
    /// Transitions are self-healing in both directions: a recovered real
    /// backend takes traffic back, a failed one hands it to the mock.
    pub async fn refresh_health(&self) {
        let flags = self.flags.flags();
        if !flags.enable_health_check {
            return;
        }
        let Some(real) = self.real.clone() else {
            return;
        };

        let due = {
            let state = self.state.lock();
            state
                .last_health_check
                .map(|at| at.elapsed() >= self.health_check_interval)
                .unwrap_or(true)
        };
        if !due {
            return;
        }

        let healthy = real.health_check().await;

        let mut state = self.state.lock();
        state.last_health_check = Some(Instant::now());
        let was_healthy = state.real_healthy;
        state.real_healthy = healthy;

        if healthy {
            if state.mode == StorageMode::Mock && flags.should_use_real(true) {
                info!("Real storage backend healthy, resuming real mode");
                state.mode = StorageMode::Real;
                state.fallback_active = false;
            }
        } else if was_healthy {
            warn!("Real storage backend unhealthy");
            if flags.fallback_to_mock {
                state.mode = StorageMode::Mock;
            }
        }
    }

    async fn execute<T>(
        &self,
        op: &'static str,
        run: impl Fn(Arc<dyn StorageBackend>) -> BoxFuture<'static, Result<T, StorageError>>,
    ) -> Routed<T> {
        self.refresh_health().await;
        let flags = self.flags.flags();
        let real_available = self.real.is_some() && self.state.lock().real_healthy;

        if !flags.should_use_real(real_available) {
            return self.run_on_mock(op, &run, false).await;
        }

        let Some(real) = self.real.clone() else {
            // Real demanded but never constructed
            if flags.force_real || flags.mode == StorageModePreference::Real {
                let err = StorageError::NotConfigured("real storage backend".to_string());
                return Err((err, StorageMode::Real, "none"));
            }
            warn!(op, "Real storage not configured, serving from mock");
            return self.run_on_mock(op, &run, false).await;
        };

        if flags.enable_detailed_logging {
            debug!(op, mode = %StorageMode::Real, "Routing storage operation");
        }

        match run(real.clone()).await {
            Ok(value) => {
                let mut state = self.state.lock();
                state.mode = StorageMode::Real;
                state.fallback_active = false;
                Ok((value, StorageMode::Real, real.provider()))
            }
            Err(real_err) => {
                if !flags.fallback_to_mock {
                    return Err((real_err, StorageMode::Real, real.provider()));
                }
                warn!(op, error = %real_err, "Real storage failed, retrying on mock");
                match run(self.mock.clone()).await {
                    Ok(value) => {
                        let mut state = self.state.lock();
                        state.mode = StorageMode::Mock;
                        state.fallback_active = true;
                        // Stay on mock until a health probe clears the real
                        // backend again
                        state.real_healthy = false;
                        Ok((value, StorageMode::Mock, self.mock.provider()))
                    }
                    Err(mock_err) => {
                        error!(
                            op,
                            real_error = %real_err,
                            mock_error = %mock_err,
                            "Both storage backends failed"
                        );
                        // Surface the original failure, not the mock's
                        Err((real_err, StorageMode::Real, real.provider()))
                    }
                }
            }
        }
    }

    async fn run_on_mock<T>(
        &self,
        op: &'static str,
        run: &impl Fn(Arc<dyn StorageBackend>) -> BoxFuture<'static, Result<T, StorageError>>,
        fallback: bool,
    ) -> Routed<T> {
        let flags = self.flags.flags();
        if flags.enable_detailed_logging {
            debug!(op, mode = %StorageMode::Mock, "Routing storage operation");
        }
        match run(self.mock.clone()).await {
            Ok(value) => {
                let mut state = self.state.lock();
                state.mode = StorageMode::Mock;
                state.fallback_active = fallback;
                Ok((value, StorageMode::Mock, self.mock.provider()))
            }
            Err(e) => Err((e, StorageMode::Mock, self.mock.provider())),
        }
    }
}
