//! Field extraction for information responses
//!
//! Every parser takes one trimmed response line and returns a typed value
//! or a [`ParseError`]. Parsers never touch device state; dispatchers decide
//! what to do with the result.
//!
//! Supported responses:
//! - `+CSQ: <rssi>,<ber>`
//! - `+CBC: <bcs>,<bcl>,<voltage>`
//! - `+CPIN: <code>` and `+CME ERROR: <n>`
//! - `+COPS: <mode>[,<format>,"<oper>"[,<act>]]`
//! - `+CREG: <n>,<stat>[,...]`
//! - `+QCFG: "band",<band>,<lte>,<tds>` (hex values)
//! - `+QCFG: "fast/poweroff",<enable>`
//! - `+QNWINFO: "<act>","<oper>","<band>",<channel>`
//! - bare identity lines (`AT+CGMM`, `AT+CGSN`, `AT+CIMI`)

use super::error::ParseError;
use super::state::SimStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// CME error code reported when no SIM is present
pub const CME_SIM_NOT_INSERTED: u16 = 10;

/// Value of rssi/ber meaning "not known or not detectable"
pub const CSQ_UNKNOWN: u32 = 99;

/// Signal quality from `+CSQ`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalQuality {
    /// Received signal strength indicator, 0..=31 or 99
    pub rssi: u32,
    /// Channel bit error rate, 0..=7 or 99
    pub ber: u32,
}

impl SignalQuality {
    /// RSSI converted to dBm, `None` when the modem has no reading
    pub fn rssi_dbm(&self) -> Option<i32> {
        match self.rssi {
            rssi @ 0..=31 => i32::try_from(rssi).ok().map(|r| -113 + 2 * r),
            _ => None,
        }
    }

    /// Whether the modem reported a usable reading
    pub fn is_known(&self) -> bool {
        self.rssi_dbm().is_some()
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rssi_dbm() {
            Some(dbm) => write!(f, "rssi {} ({dbm} dBm), ber {}", self.rssi, self.ber),
            None => write!(f, "rssi unknown, ber {}", self.ber),
        }
    }
}

/// Battery report from `+CBC`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge status (0 not charging, 1 charging, 2 finished)
    pub charge_status: u32,
    /// Charge level in percent
    pub level: u32,
    /// Supply voltage in millivolts
    pub voltage_mv: u32,
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% at {} mV (charge status {})",
            self.level, self.voltage_mv, self.charge_status
        )
    }
}

/// Result of `AT+COPS?`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorSelection {
    /// Only the mode field was reported
    NotSelected,
    /// Long alphanumeric operator name
    Selected(String),
}

/// Network registration state from `+CREG`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Not registered, not searching
    NotRegistered,
    /// Registered on the home network
    RegisteredHome,
    /// Not registered, searching
    Searching,
    /// Registration denied
    Denied,
    /// Unknown
    Unknown,
    /// Registered, roaming
    RegisteredRoaming,
}

impl RegistrationStatus {
    /// Map a 3GPP `<stat>` code
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::NotRegistered,
            1 => Self::RegisteredHome,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::RegisteredRoaming,
            _ => Self::Unknown,
        }
    }

    /// 3GPP `<stat>` code
    pub fn code(self) -> u32 {
        match self {
            Self::NotRegistered => 0,
            Self::RegisteredHome => 1,
            Self::Searching => 2,
            Self::Denied => 3,
            Self::Unknown => 4,
            Self::RegisteredRoaming => 5,
        }
    }

    /// Home or roaming registration
    pub fn is_registered(self) -> bool {
        matches!(self, Self::RegisteredHome | Self::RegisteredRoaming)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotRegistered => "not registered",
            Self::RegisteredHome => "registered (home)",
            Self::Searching => "searching",
            Self::Denied => "denied",
            Self::Unknown => "unknown",
            Self::RegisteredRoaming => "registered (roaming)",
        };
        f.write_str(text)
    }
}

/// LTE bands an EC21 variant can be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LteBand {
    /// 2100 MHz
    B1,
    /// 1800 MHz
    B3,
    /// 850 MHz
    B5,
    /// 2600 MHz
    B7,
    /// 900 MHz
    B8,
    /// 800 MHz
    B20,
}

/// Bit of LTE band 7 in the `+QCFG` LTE mask
pub const BAND7_LTE_MASK: u64 = 0x40;

/// LTE bands enabled when provisioning (B1, B3, B5, B7, B8, B20)
pub const SUPPORTED_LTE_BANDS: u64 = 0x800d5;

impl LteBand {
    /// Look up a band by its number
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::B1),
            3 => Some(Self::B3),
            5 => Some(Self::B5),
            7 => Some(Self::B7),
            8 => Some(Self::B8),
            20 => Some(Self::B20),
            _ => None,
        }
    }

    /// Band number
    pub fn number(self) -> u8 {
        match self {
            Self::B1 => 1,
            Self::B3 => 3,
            Self::B5 => 5,
            Self::B7 => 7,
            Self::B8 => 8,
            Self::B20 => 20,
        }
    }

    /// Bit in the LTE band mask (band N is bit N-1)
    pub fn mask(self) -> u64 {
        1 << (self.number() - 1)
    }
}

/// Band configuration from `+QCFG: "band"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandConfig {
    /// GSM/WCDMA band value
    pub band: u64,
    /// LTE band mask
    pub lte: u64,
    /// TD-SCDMA band value
    pub tds: u64,
}

impl BandConfig {
    /// Whether `band` is enabled in the LTE mask
    pub fn lte_enabled(&self, band: LteBand) -> bool {
        self.lte & band.mask() != 0
    }
}

impl fmt::Display for BandConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "band 0x{:x}, lte 0x{:x}, tds 0x{:x}", self.band, self.lte, self.tds)
    }
}

/// Serving cell summary from `+QNWINFO`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Access technology, or `No Service`
    pub access_technology: String,
    /// MCC+MNC of the serving network
    pub operator_code: Option<String>,
    /// Band name (e.g. `LTE BAND 7`)
    pub band: Option<String>,
    /// Channel number
    pub channel: Option<u32>,
}

impl NetworkInfo {
    /// Whether the modem is attached to a cell
    pub fn has_service(&self) -> bool {
        self.operator_code.is_some()
    }
}

impl fmt::Display for NetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.access_technology)?;
        if let Some(code) = &self.operator_code {
            write!(f, " {code}")?;
        }
        if let Some(band) = &self.band {
            write!(f, " {band}")?;
        }
        if let Some(channel) = self.channel {
            write!(f, " ch {channel}")?;
        }
        Ok(())
    }
}

/// Text after `<tag>:` with surrounding whitespace removed
fn payload<'a>(line: &'a str, tag: &'static str) -> Result<&'a str, ParseError> {
    let rest = line
        .strip_prefix(tag)
        .ok_or_else(|| ParseError::UnexpectedPrefix {
            expected: tag,
            line: line.to_string(),
        })?;
    Ok(rest.strip_prefix(':').unwrap_or(rest).trim())
}

fn fields(payload: &str) -> Vec<&str> {
    payload.split(',').map(str::trim).collect()
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}

fn field<'a>(fields: &[&'a str], index: usize, line: &str) -> Result<&'a str, ParseError> {
    fields
        .get(index)
        .copied()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ParseError::MissingField {
            index,
            line: line.to_string(),
        })
}

fn int_field(fields: &[&str], index: usize, line: &str) -> Result<u32, ParseError> {
    let raw = field(fields, index, line)?;
    raw.parse().map_err(|_| ParseError::InvalidField {
        field: raw.to_string(),
        line: line.to_string(),
    })
}

fn hex_field(fields: &[&str], index: usize, line: &str) -> Result<u64, ParseError> {
    let raw = field(fields, index, line)?;
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidField {
        field: raw.to_string(),
        line: line.to_string(),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// `+CSQ: <rssi>,<ber>`
pub fn parse_signal_quality(line: &str) -> Result<SignalQuality, ParseError> {
    let f = fields(payload(line, "+CSQ")?);
    Ok(SignalQuality {
        rssi: int_field(&f, 0, line)?,
        ber: int_field(&f, 1, line)?,
    })
}

/// `+CBC: <bcs>,<bcl>,<voltage>`
pub fn parse_battery(line: &str) -> Result<BatteryStatus, ParseError> {
    let f = fields(payload(line, "+CBC")?);
    Ok(BatteryStatus {
        charge_status: int_field(&f, 0, line)?,
        level: int_field(&f, 1, line)?,
        voltage_mv: int_field(&f, 2, line)?,
    })
}

/// `+CPIN: <code>`
pub fn parse_sim_status(line: &str) -> Result<SimStatus, ParseError> {
    let code = payload(line, "+CPIN")?;
    let status = match code {
        "READY" => SimStatus::Ready,
        "SIM PIN" => SimStatus::PinRequired,
        "SIM PUK" => SimStatus::PukRequired,
        "NOT INSERTED" => SimStatus::NotInserted,
        _ => SimStatus::Unknown,
    };
    Ok(status)
}

/// Numeric code of `+CME ERROR: <n>`
pub fn parse_cme_error(line: &str) -> Result<u16, ParseError> {
    let code = payload(line, "+CME ERROR")?;
    code.parse().map_err(|_| ParseError::InvalidField {
        field: code.to_string(),
        line: line.to_string(),
    })
}

/// SIM state implied by a CME error code answering `AT+CPIN?`
pub fn sim_status_from_cme(code: u16) -> SimStatus {
    if code == CME_SIM_NOT_INSERTED {
        SimStatus::NotInserted
    } else {
        SimStatus::Unknown
    }
}

/// `+COPS: <mode>[,<format>,"<oper>"[,<act>]]`
///
/// Only `<mode>` means no operator is selected. The name runs to its closing
/// quote, so commas inside it are kept.
pub fn parse_operator(line: &str, max_chars: usize) -> Result<OperatorSelection, ParseError> {
    let mut parts = payload(line, "+COPS")?.splitn(3, ',');
    let _mode = parts.next();
    let format = parts.next().map(str::trim).filter(|f| !f.is_empty());
    let oper = parts.next().map(str::trim).filter(|f| !f.is_empty());

    match (format, oper) {
        (None, None) => Ok(OperatorSelection::NotSelected),
        (_, Some(field)) => {
            let name = operator_name(field);
            if name.is_empty() {
                return Err(ParseError::InvalidField {
                    field: field.to_string(),
                    line: line.to_string(),
                });
            }
            Ok(OperatorSelection::Selected(truncate(name, max_chars)))
        }
        (Some(_), None) => Err(ParseError::MissingField {
            index: 2,
            line: line.to_string(),
        }),
    }
}

/// `"<oper>"[,<act>]` with the quotes optional
fn operator_name(field: &str) -> &str {
    match field.strip_prefix('"') {
        Some(quoted) => quoted.split_once('"').map_or(quoted, |(name, _)| name),
        None => field.split(',').next().map_or(field, str::trim),
    }
}

/// `+CREG: <n>,<stat>[,<lac>,<ci>[,<act>]]`
pub fn parse_registration(line: &str) -> Result<RegistrationStatus, ParseError> {
    let f = fields(payload(line, "+CREG")?);
    int_field(&f, 1, line).map(RegistrationStatus::from_code)
}

/// `+QCFG: "band",<band>,<lte>,<tds>`
pub fn parse_band_config(line: &str) -> Result<BandConfig, ParseError> {
    let f = fields(payload(line, "+QCFG")?);
    expect_setting(&f, "band", line)?;
    Ok(BandConfig {
        band: hex_field(&f, 1, line)?,
        lte: hex_field(&f, 2, line)?,
        tds: hex_field(&f, 3, line)?,
    })
}

/// `+QCFG: "fast/poweroff",<enable>`
pub fn parse_fast_poweroff(line: &str) -> Result<bool, ParseError> {
    let f = fields(payload(line, "+QCFG")?);
    expect_setting(&f, "fast/poweroff", line)?;
    Ok(int_field(&f, 1, line)? != 0)
}

fn expect_setting(fields: &[&str], name: &str, line: &str) -> Result<(), ParseError> {
    let setting = field(fields, 0, line)?;
    if unquote(setting) == name {
        Ok(())
    } else {
        Err(ParseError::InvalidField {
            field: setting.to_string(),
            line: line.to_string(),
        })
    }
}

/// `+QNWINFO: "<act>","<oper>","<band>",<channel>` or `+QNWINFO: No Service`
pub fn parse_network_info(line: &str) -> Result<NetworkInfo, ParseError> {
    let f = fields(payload(line, "+QNWINFO")?);
    let access_technology = unquote(field(&f, 0, line)?).to_string();

    let optional = |index: usize| {
        f.get(index)
            .map(|v| unquote(v))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let channel = match optional(3) {
        Some(raw) => Some(raw.parse().map_err(|_| ParseError::InvalidField {
            field: raw.clone(),
            line: line.to_string(),
        })?),
        None => None,
    };

    Ok(NetworkInfo {
        access_technology,
        operator_code: optional(1),
        band: optional(2),
        channel,
    })
}

/// Bare identity line (model name, IMEI, IMSI), truncated to `max_chars`
pub fn parse_identity_line(line: &str, max_chars: usize) -> Result<String, ParseError> {
    let value = line.trim();
    if value.len() <= 2 {
        return Err(ParseError::TooShort(line.to_string()));
    }
    Ok(truncate(value, max_chars))
}
