//! High-level modem operations
//!
//! Each operation is one command (or a short fixed series) on top of
//! [`Dce::execute`]. Values are returned only when the command succeeded.

use super::command::{self, AtCommand, DtrMode};
use super::dispatcher::Dispatcher;
use super::error::DceError;
use super::parsers::{
    BandConfig, BatteryStatus, LteBand, NetworkInfo, OperatorSelection, RegistrationStatus, SignalQuality,
    SUPPORTED_LTE_BANDS,
};
use super::state::{AuxSlot, Identity, SimStatus};
use super::Dce;
use crate::core::transport::SerialFlowControl;

/// Staged value of an unexpected kind
fn unexpected(command: &str, value: &AuxSlot) -> DceError {
    tracing::error!("{}: unexpected staged value {:?}", command, value);
    DceError::MissingResponse {
        command: command.to_string(),
    }
}

impl Dce {
    /// `AT`
    pub async fn sync(&mut self) -> Result<(), DceError> {
        self.simple(command::SYNC).await
    }

    /// `ATE0` / `ATE1`
    pub async fn set_echo(&mut self, enabled: bool) -> Result<(), DceError> {
        self.simple(if enabled { command::ECHO_ON } else { command::ECHO_OFF })
            .await
    }

    /// `AT&F`
    pub async fn factory_reset(&mut self) -> Result<(), DceError> {
        self.simple(command::FACTORY_RESET).await
    }

    /// `AT&W`
    pub async fn store_profile(&mut self) -> Result<(), DceError> {
        self.simple(command::STORE_PROFILE).await
    }

    /// `AT+IPR=<rate>`; the host side is not switched
    pub async fn set_baud_rate(&mut self, rate: u32) -> Result<(), DceError> {
        self.simple(AtCommand::set_baud_rate(rate).text()).await?;
        tracing::debug!("Modem baud rate set to {}", rate);
        Ok(())
    }

    /// `AT+IFC=<host>,<modem>`
    pub async fn set_flow_control(
        &mut self,
        host: SerialFlowControl,
        modem: SerialFlowControl,
    ) -> Result<(), DceError> {
        self.simple(AtCommand::set_flow_control(host, modem).text())
            .await
    }

    /// `AT+CGDCONT=<cid>,"<type>","<apn>"`
    pub async fn define_pdp_context(&mut self, cid: u32, pdp_type: &str, apn: &str) -> Result<(), DceError> {
        self.simple(AtCommand::define_pdp_context(cid, pdp_type, apn).text())
            .await
    }

    /// `ATH`
    pub async fn hang_up(&mut self) -> Result<(), DceError> {
        let timeout = self.timeouts.hang_up();
        self.execute(&AtCommand::new(command::HANG_UP), Dispatcher::Generic, timeout)
            .await
    }

    /// `ATA`
    pub async fn answer(&mut self) -> Result<(), DceError> {
        self.simple(command::ANSWER).await
    }

    /// `ATS0=<rings>`; 0 disables auto-answer
    pub async fn set_auto_answer(&mut self, rings: u32) -> Result<(), DceError> {
        self.simple(AtCommand::set_auto_answer(rings).text()).await
    }

    /// `AT&D<mode>`
    pub async fn set_dtr_mode(&mut self, mode: DtrMode) -> Result<(), DceError> {
        self.simple(AtCommand::set_dtr_mode(mode).text()).await
    }

    /// `AT+CSQ`
    pub async fn get_signal_quality(&mut self) -> Result<SignalQuality, DceError> {
        let timeout = self.timeouts.default_timeout();
        match self
            .query(command::SIGNAL_QUALITY, Dispatcher::SignalQuality, timeout)
            .await?
        {
            AuxSlot::Signal(quality) => Ok(quality),
            other => Err(unexpected(command::SIGNAL_QUALITY, &other)),
        }
    }

    /// `AT+CBC`
    pub async fn get_battery_status(&mut self) -> Result<BatteryStatus, DceError> {
        let timeout = self.timeouts.default_timeout();
        match self
            .query(command::BATTERY_STATUS, Dispatcher::Battery, timeout)
            .await?
        {
            AuxSlot::Battery(status) => Ok(status),
            other => Err(unexpected(command::BATTERY_STATUS, &other)),
        }
    }

    /// `AT+CPIN?`. A CME error answering the query still counts as an
    /// answer: the SIM state is derived from the error code.
    pub async fn get_sim_status(&mut self) -> Result<SimStatus, DceError> {
        let timeout = self.timeouts.default_timeout();
        self.execute(&AtCommand::new(command::SIM_STATUS), Dispatcher::SimStatus, timeout)
            .await?;
        Ok(self.state.sim_status())
    }

    /// `AT+CREG?`
    pub async fn get_network_status(&mut self) -> Result<RegistrationStatus, DceError> {
        let timeout = self.timeouts.default_timeout();
        match self
            .query(command::REGISTRATION, Dispatcher::Registration, timeout)
            .await?
        {
            AuxSlot::Registration(status) => Ok(status),
            other => Err(unexpected(command::REGISTRATION, &other)),
        }
    }

    /// `AT+QNWINFO`
    pub async fn get_network_extended_info(&mut self) -> Result<NetworkInfo, DceError> {
        let timeout = self.timeouts.default_timeout();
        match self
            .query(command::NETWORK_INFO, Dispatcher::NetworkInfo, timeout)
            .await?
        {
            AuxSlot::Network(info) => {
                tracing::info!("Serving cell: {}", info);
                Ok(info)
            }
            other => Err(unexpected(command::NETWORK_INFO, &other)),
        }
    }

    /// `AT+CGMM`
    pub async fn get_module_name(&mut self) -> Result<String, DceError> {
        let name = self.identity_query(command::MODULE_NAME, Dispatcher::ModuleName).await?;
        self.state.identity_mut().name.clone_from(&name);
        Ok(name)
    }

    /// `AT+CGSN`
    pub async fn get_imei(&mut self) -> Result<String, DceError> {
        let imei = self.identity_query(command::IMEI, Dispatcher::Imei).await?;
        self.state.identity_mut().imei.clone_from(&imei);
        Ok(imei)
    }

    /// `AT+CIMI`
    pub async fn get_imsi(&mut self) -> Result<String, DceError> {
        let imsi = self.identity_query(command::IMSI, Dispatcher::Imsi).await?;
        self.state.identity_mut().imsi.clone_from(&imsi);
        Ok(imsi)
    }

    async fn identity_query(&mut self, command: &str, dispatcher: Dispatcher) -> Result<String, DceError> {
        let timeout = self.timeouts.default_timeout();
        match self.query(command, dispatcher, timeout).await? {
            AuxSlot::Text(text) => Ok(text),
            other => Err(unexpected(command, &other)),
        }
    }

    /// `AT+COPS?` (long timeout: the modem may be scanning)
    pub async fn get_operator_name(&mut self) -> Result<OperatorSelection, DceError> {
        let timeout = self.timeouts.operator();
        let selection = match self
            .query(command::OPERATOR, Dispatcher::Operator, timeout)
            .await?
        {
            AuxSlot::Operator(selection) => selection,
            other => return Err(unexpected(command::OPERATOR, &other)),
        };

        let operator = &mut self.state.identity_mut().operator;
        match &selection {
            OperatorSelection::Selected(name) => operator.clone_from(name),
            OperatorSelection::NotSelected => operator.clear(),
        }
        Ok(selection)
    }

    /// Model, IMEI, IMSI and operator, in that order. Stops at the first
    /// failure; fields from earlier queries stay committed.
    pub async fn get_module_info(&mut self) -> Result<Identity, DceError> {
        self.get_module_name().await?;
        self.get_imei().await?;
        self.get_imsi().await?;
        self.get_operator_name().await?;

        let identity = self.state.identity().clone();
        tracing::info!(
            "Module {} IMEI {} IMSI {} operator {:?}",
            identity.name,
            identity.imei,
            identity.imsi,
            identity.operator
        );
        Ok(identity)
    }

    /// `AT+QCFG="roamservice"`
    pub async fn enable_roaming(&mut self, enabled: bool) -> Result<(), DceError> {
        self.simple(if enabled { command::ROAMING_AUTO } else { command::ROAMING_OFF })
            .await
    }

    /// `AT+QCFG="band"`
    pub async fn get_band_config(&mut self) -> Result<BandConfig, DceError> {
        let timeout = self.timeouts.default_timeout();
        match self
            .query(command::BAND_CONFIG, Dispatcher::BandConfig, timeout)
            .await?
        {
            AuxSlot::Band(config) => Ok(config),
            other => Err(unexpected(command::BAND_CONFIG, &other)),
        }
    }

    /// Whether `band` is enabled in the LTE mask
    pub async fn get_band_state(&mut self, band: LteBand) -> Result<bool, DceError> {
        let config = self.get_band_config().await?;
        Ok(config.lte_enabled(band))
    }

    /// Restrict LTE to the supported set, with `band` switched on or off
    pub async fn set_band_state(&mut self, band: LteBand, enabled: bool) -> Result<(), DceError> {
        let mask = if enabled {
            SUPPORTED_LTE_BANDS | band.mask()
        } else {
            SUPPORTED_LTE_BANDS & !band.mask()
        };
        tracing::info!("Setting LTE band mask 0x{:x}", mask);
        self.simple(AtCommand::set_lte_bands(mask).text()).await
    }

    /// `AT+QCFG="fast/poweroff",1`
    pub async fn enable_fast_shutdown(&mut self) -> Result<(), DceError> {
        self.simple(command::FAST_POWEROFF_ON).await
    }

    /// `AT+QCFG="fast/poweroff"`
    pub async fn get_fast_shutdown_state(&mut self) -> Result<bool, DceError> {
        let timeout = self.timeouts.default_timeout();
        match self
            .query(command::FAST_POWEROFF_STATE, Dispatcher::FastPowerOff, timeout)
            .await?
        {
            AuxSlot::FastPowerOff(enabled) => Ok(enabled),
            other => Err(unexpected(command::FAST_POWEROFF_STATE, &other)),
        }
    }

    /// `AT+QPOWD=1`; completes on `POWERED DOWN`
    pub async fn power_down(&mut self) -> Result<(), DceError> {
        let timeout = self.timeouts.power_off();
        self.execute(&AtCommand::new(command::POWER_DOWN), Dispatcher::PowerDown, timeout)
            .await?;
        tracing::info!("Modem powered down");
        Ok(())
    }

    /// `AT+QPOWD=0`; completes on `POWERED DOWN`
    pub async fn fast_power_down(&mut self) -> Result<(), DceError> {
        let timeout = self.timeouts.fast_power_off();
        self.execute(&AtCommand::new(command::FAST_POWER_DOWN), Dispatcher::PowerDown, timeout)
            .await?;
        tracing::info!("Modem powered down (fast)");
        Ok(())
    }
}
