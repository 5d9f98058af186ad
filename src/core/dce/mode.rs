//! Command mode / data mode transitions

use super::command::{self, AtCommand};
use super::dispatcher::Dispatcher;
use super::error::DceError;
use super::state::WorkingMode;
use super::Dce;

impl Dce {
    /// Switch between command mode and data (PPP) mode.
    ///
    /// The mode is recorded only after the modem confirmed the switch.
    /// Requesting the current mode is a no-op.
    pub async fn set_working_mode(&mut self, mode: WorkingMode) -> Result<(), DceError> {
        if self.state.mode() == mode {
            tracing::debug!("Already in {} mode", mode);
            return Ok(());
        }

        match mode {
            WorkingMode::Data => self.enter_data_mode().await?,
            WorkingMode::Command => self.enter_command_mode().await?,
        }

        self.state.set_mode(mode);
        tracing::info!("Entered {} mode", mode);
        Ok(())
    }

    /// Dial PPP; if the modem refuses (a call may still be up), resume it
    async fn enter_data_mode(&mut self) -> Result<(), DceError> {
        let timeout = self.timeouts.mode_change();

        match self
            .execute(&AtCommand::new(command::DIAL_PPP), Dispatcher::Dial, timeout)
            .await
        {
            Err(e) if e.is_rejected() => {
                tracing::warn!("Dial refused, trying to resume the existing call");
                self.execute(&AtCommand::new(command::RESUME_DATA), Dispatcher::Dial, timeout)
                    .await
            }
            other => other,
        }
    }

    /// Guard interval, escape sequence; if nothing answers the escape the
    /// modem is taken to be in command mode already and must answer `AT`
    async fn enter_command_mode(&mut self) -> Result<(), DceError> {
        tokio::time::sleep(self.timeouts.guard()).await;

        let timeout = self.timeouts.mode_change();
        match self
            .execute(&AtCommand::raw(command::ESCAPE_SEQUENCE), Dispatcher::ExitDataMode, timeout)
            .await
        {
            Err(e) if e.is_timeout() => {
                tracing::warn!("No answer to escape sequence, probing with AT");
                self.simple(command::SYNC).await
            }
            other => other,
        }
    }
}
