//! Command execution and idle-line processing

use super::command::AtCommand;
use super::dispatcher::{Completion, Dispatch, Dispatcher};
use super::error::DceError;
use super::state::{AuxSlot, BaudStatus};
use super::Dce;
use crate::core::transport::TransportError;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{timeout_at, Instant};

impl Dce {
    /// Write `command` and interpret replies with `dispatcher` until a
    /// terminal line arrives or `timeout` elapses.
    ///
    /// Lines left in the channel by an earlier command are drained through
    /// the unsolicited handler first. The unsolicited dispatcher is
    /// reinstalled on every exit path.
    pub async fn execute(
        &mut self,
        command: &AtCommand,
        dispatcher: Dispatcher,
        timeout: Duration,
    ) -> Result<(), DceError> {
        self.drain_unsolicited();

        self.state.begin(dispatcher);
        let result = self.run(command, timeout).await;
        self.state.finish();
        // Notifications that interrupted the response
        self.publish_events();

        match &result {
            Ok(()) => tracing::debug!("{} -> OK", command),
            Err(e) => tracing::debug!("{} -> {}", command, e),
        }
        result
    }

    async fn run(&mut self, command: &AtCommand, timeout: Duration) -> Result<(), DceError> {
        tracing::trace!(target: "modemctl::wire", "TX {}", command);
        self.transport.send(&command.to_bytes()).await?;

        let deadline = deadline_after(timeout);
        loop {
            let line = match timeout_at(deadline, self.lines.recv()).await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(TransportError::Disconnected.into()),
                Err(_) => {
                    return Err(DceError::Timeout {
                        command: command.to_string(),
                        timeout,
                    })
                }
            };

            match self.state.dispatch(&line) {
                Dispatch::Completed(Completion::Success) => return Ok(()),
                Dispatch::Completed(Completion::Failure) => {
                    return Err(DceError::Rejected {
                        command: command.to_string(),
                    })
                }
                Dispatch::FieldExtracted | Dispatch::Ignore => {}
            }
        }
    }

    /// Execute a command whose success must carry a data line
    pub(crate) async fn query(
        &mut self,
        command: &str,
        dispatcher: Dispatcher,
        timeout: Duration,
    ) -> Result<AuxSlot, DceError> {
        let command = AtCommand::new(command);
        self.execute(&command, dispatcher, timeout).await?;

        match self.state.take_aux() {
            AuxSlot::Empty => Err(DceError::MissingResponse {
                command: command.to_string(),
            }),
            value => Ok(value),
        }
    }

    /// Execute a command that only reports `OK` / `ERROR`, with the default timeout
    pub(crate) async fn simple(&mut self, command: &str) -> Result<(), DceError> {
        let timeout = self.timeouts.default_timeout();
        self.execute(&AtCommand::new(command), Dispatcher::Generic, timeout)
            .await
    }

    /// Process idle lines for `duration`, returning how many were read
    pub async fn poll_unsolicited(&mut self, duration: Duration) -> Result<usize, DceError> {
        let deadline = deadline_after(duration);
        let mut count = 0;

        while let Ok(received) = timeout_at(deadline, self.lines.recv()).await {
            let Some(line) = received else {
                self.publish_events();
                return Err(TransportError::Disconnected.into());
            };
            self.state.dispatch(&line);
            self.publish_events();
            count += 1;
        }

        Ok(count)
    }

    /// Wait for a line proving the modem talks at the current baud rate
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<(), DceError> {
        self.drain_unsolicited();
        let deadline = deadline_after(timeout);

        while self.state.baud_status() != BaudStatus::Confirmed {
            match timeout_at(deadline, self.lines.recv()).await {
                Ok(Some(line)) => {
                    self.state.dispatch(&line);
                    self.publish_events();
                }
                Ok(None) => return Err(TransportError::Disconnected.into()),
                Err(_) => {
                    return Err(DceError::Timeout {
                        command: "ready banner".to_string(),
                        timeout,
                    })
                }
            }
        }

        Ok(())
    }

    /// Feed lines already waiting in the channel to the unsolicited handler
    fn drain_unsolicited(&mut self) {
        loop {
            match self.lines.try_recv() {
                Ok(line) => {
                    self.state.dispatch(&line);
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        self.publish_events();
    }

    fn publish_events(&mut self) {
        for event in self.state.drain_events() {
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}

/// `now + timeout`, saturating at roughly thirty years out
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}
