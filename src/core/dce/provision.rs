//! One-time modem bring-up
//!
//! Steps, in order:
//! 1. `AT` sync, retried; fatal when exhausted
//! 2. `AT&F` and `ATE0`
//! 3. baud renegotiation when the stored rate differs from the working rate
//! 4. `AT+CPIN?`
//! 5. `AT&D<mode>`
//! 6. fast power-off enablement, retried; best effort

use super::command::{self, DtrMode};
use super::error::DceError;
use super::state::{BaudStatus, SimStatus};
use super::Dce;
use crate::core::persist::BaudRateStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Provisioning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Rate the modem is moved to
    pub working_baud_rate: u32,
    /// `AT` attempts before giving up
    pub sync_attempts: u32,
    /// Delay between `AT` attempts (ms)
    pub sync_retry_delay_ms: u64,
    /// Delay between provisioning steps (ms)
    pub step_delay_ms: u64,
    /// DTR behavior
    pub dtr_mode: DtrMode,
    /// Fast power-off enablement attempts
    pub fast_shutdown_attempts: u32,
    /// Settling time before the first fast power-off attempt (ms)
    pub fast_shutdown_initial_delay_ms: u64,
    /// Delay between fast power-off attempts (ms)
    pub fast_shutdown_retry_delay_ms: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            working_baud_rate: 921_600,
            sync_attempts: 3,
            sync_retry_delay_ms: 500,
            step_delay_ms: 300,
            dtr_mode: DtrMode::CommandModeAndDisconnect,
            fast_shutdown_attempts: 10,
            fast_shutdown_initial_delay_ms: 1_000,
            fast_shutdown_retry_delay_ms: 1_000,
        }
    }
}

impl ProvisionConfig {
    /// Set the working baud rate
    #[must_use]
    pub fn working_baud_rate(mut self, rate: u32) -> Self {
        self.working_baud_rate = rate;
        self
    }

    fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

/// Provisioning step, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStep {
    /// `AT` liveness sync
    Sync,
    /// `AT&F`
    FactoryReset,
    /// `ATE0`
    DisableEcho,
    /// Reading the stored baud rate
    LoadBaudRate,
    /// `AT+IPR`
    SetBaudRate,
    /// Host-side rate switch
    SwitchHostBaudRate,
    /// `AT&W`
    StoreProfile,
    /// Persisting the new rate
    PersistBaudRate,
    /// `AT+CPIN?`
    SimStatus,
    /// `AT&D`
    DtrMode,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Sync => "sync",
            Self::FactoryReset => "factory reset",
            Self::DisableEcho => "disable echo",
            Self::LoadBaudRate => "load baud rate",
            Self::SetBaudRate => "set baud rate",
            Self::SwitchHostBaudRate => "switch host baud rate",
            Self::StoreProfile => "store profile",
            Self::PersistBaudRate => "persist baud rate",
            Self::SimStatus => "SIM status",
            Self::DtrMode => "DTR mode",
        };
        f.write_str(text)
    }
}

/// Fatal provisioning failure
#[derive(Error, Debug)]
#[error("provisioning failed at {step}: {source}")]
pub struct ProvisionError {
    /// Step that failed
    pub step: ProvisionStep,
    /// Underlying failure
    #[source]
    pub source: DceError,
}

/// What provisioning did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    /// Whether the baud rate was renegotiated
    pub baud_rate_changed: bool,
    /// Rate the link runs at afterwards
    pub baud_rate: u32,
    /// SIM state after the query
    pub sim_status: SimStatus,
    /// Whether fast power-off could be enabled
    pub fast_shutdown_enabled: bool,
}

trait AtStep<T> {
    fn at(self, step: ProvisionStep) -> Result<T, ProvisionError>;
}

impl<T, E: Into<DceError>> AtStep<T> for Result<T, E> {
    fn at(self, step: ProvisionStep) -> Result<T, ProvisionError> {
        self.map_err(|e| ProvisionError {
            step,
            source: e.into(),
        })
    }
}

impl Dce {
    /// Run the bring-up sequence
    pub async fn provision(
        &mut self,
        store: &mut dyn BaudRateStore,
        config: &ProvisionConfig,
    ) -> Result<ProvisionReport, ProvisionError> {
        tracing::info!("Provisioning modem on {}", self.transport.connection_info());

        self.sync_with_retries(config).await.at(ProvisionStep::Sync)?;

        tracing::info!("Restoring factory settings");
        self.factory_reset().await.at(ProvisionStep::FactoryReset)?;
        tokio::time::sleep(config.step_delay()).await;

        tracing::info!("Disabling command echo");
        self.set_echo(false).await.at(ProvisionStep::DisableEcho)?;
        tokio::time::sleep(config.step_delay()).await;

        let stored = store.load().at(ProvisionStep::LoadBaudRate)?;
        let baud_rate_changed = stored != config.working_baud_rate;
        if baud_rate_changed {
            self.renegotiate_baud_rate(store, config).await?;
            tokio::time::sleep(config.step_delay()).await;
        } else {
            tracing::debug!("Baud rate already {}", stored);
        }

        tracing::info!("Querying SIM status");
        let sim_status = self.get_sim_status().await.at(ProvisionStep::SimStatus)?;
        tokio::time::sleep(config.step_delay()).await;

        tracing::info!("Setting DTR mode {:?}", config.dtr_mode);
        self.set_dtr_mode(config.dtr_mode)
            .await
            .at(ProvisionStep::DtrMode)?;
        tokio::time::sleep(Duration::from_millis(config.fast_shutdown_initial_delay_ms)).await;

        let fast_shutdown_enabled = self.enable_fast_shutdown_with_retries(config).await;

        tracing::info!("Provisioning complete, SIM {}", sim_status);
        Ok(ProvisionReport {
            baud_rate_changed,
            baud_rate: config.working_baud_rate,
            sim_status,
            fast_shutdown_enabled,
        })
    }

    async fn sync_with_retries(&mut self, config: &ProvisionConfig) -> Result<(), DceError> {
        let attempts = config.sync_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.sync().await {
                Ok(()) => {
                    self.state.set_baud_status(BaudStatus::Confirmed);
                    tracing::info!("Modem answered sync (attempt {})", attempt);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Sync attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(config.sync_retry_delay_ms)).await;
            }
        }

        self.state.set_baud_status(BaudStatus::Failed);
        Err(last_error.unwrap_or_else(|| DceError::Timeout {
            command: command::SYNC.to_string(),
            timeout: self.timeouts.default_timeout(),
        }))
    }

    async fn renegotiate_baud_rate(
        &mut self,
        store: &mut dyn BaudRateStore,
        config: &ProvisionConfig,
    ) -> Result<(), ProvisionError> {
        let rate = config.working_baud_rate;
        tracing::info!("Renegotiating baud rate to {}", rate);

        self.set_baud_rate(rate)
            .await
            .at(ProvisionStep::SetBaudRate)?;
        tokio::time::sleep(config.step_delay()).await;

        // The module must settle at the new rate before the profile is stored
        self.transport
            .change_baud_rate(rate)
            .await
            .at(ProvisionStep::SwitchHostBaudRate)?;
        tokio::time::sleep(config.step_delay()).await;

        self.store_profile()
            .await
            .at(ProvisionStep::StoreProfile)?;
        store.store(rate).at(ProvisionStep::PersistBaudRate)?;

        Ok(())
    }

    async fn enable_fast_shutdown_with_retries(&mut self, config: &ProvisionConfig) -> bool {
        let attempts = config.fast_shutdown_attempts.max(1);

        for attempt in 1..=attempts {
            match self.enable_fast_shutdown().await {
                Ok(()) => {
                    tracing::info!("Fast power-off enabled");
                    return true;
                }
                Err(e) => tracing::debug!("Fast power-off attempt {}/{}: {}", attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(config.fast_shutdown_retry_delay_ms)).await;
            }
        }

        tracing::warn!("Fast power-off could not be enabled after {} attempts", attempts);
        false
    }
}
