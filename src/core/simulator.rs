//! Simulated modem
//!
//! A scriptable stand-in for a real modem on the other end of the serial
//! link. Response rules match the command text the DCE writes and answer
//! with lines, delays, or nothing at all.
//!
//! Used by the test suite and by the CLI `--simulate` flag.

use crate::core::transport::{line_channel, LineReceiver, LineSender, TransportError, TransportTrait};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Response rule condition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MatchCondition {
    /// Match the exact command text (terminator stripped)
    Exact { text: String },
    /// Match commands starting with the given text
    Prefix { text: String },
    /// Match a regular expression against the command text
    Regex {
        #[serde(with = "compiled_pattern")]
        pattern: Regex,
    },
    /// Match any command
    Any,
}

impl MatchCondition {
    /// Regular expression condition, compiled once here
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Check if a command matches this condition
    pub fn matches(&self, command: &str) -> bool {
        match self {
            Self::Exact { text } => command == text,
            Self::Prefix { text } => command.starts_with(text.as_str()),
            Self::Regex { pattern } => pattern.is_match(command),
            Self::Any => true,
        }
    }
}

/// Patterns travel as plain strings and are compiled on load
mod compiled_pattern {
    use regex::Regex;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pattern: &Regex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(pattern.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Regex, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Regex::new(&pattern).map_err(D::Error::custom)
    }
}

/// Response action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseAction {
    /// Emit one line
    Line { text: String },
    /// Wait before the next action
    Delay { ms: u64 },
    /// Turn command echo on or off for subsequent commands
    Echo { enabled: bool },
    /// Emit nothing (the command will time out)
    Silence,
}

/// Response rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRule {
    /// Rule name
    pub name: String,
    /// Match condition
    pub condition: MatchCondition,
    /// Actions run in order when the rule matches
    pub actions: Vec<ResponseAction>,
    /// Priority (higher = checked first)
    pub priority: i32,
    /// Remaining matches before the rule retires (None = unlimited)
    pub remaining: Option<u32>,
    /// Match count
    #[serde(default)]
    pub match_count: u64,
}

impl ResponseRule {
    /// Answer an exact command with the given lines
    pub fn reply(command: &str, lines: &[&str]) -> Self {
        Self {
            name: command.to_string(),
            condition: MatchCondition::Exact { text: command.to_string() },
            actions: lines
                .iter()
                .map(|l| ResponseAction::Line { text: (*l).to_string() })
                .collect(),
            priority: 0,
            remaining: None,
            match_count: 0,
        }
    }

    /// Answer every command starting with `prefix` with the given lines
    pub fn prefix(prefix: &str, lines: &[&str]) -> Self {
        Self {
            condition: MatchCondition::Prefix { text: prefix.to_string() },
            ..Self::reply(prefix, lines)
        }
    }

    /// Never answer the exact command
    pub fn silent(command: &str) -> Self {
        Self {
            actions: vec![ResponseAction::Silence],
            ..Self::reply(command, &[])
        }
    }

    /// Replace the action list
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<ResponseAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Retire the rule after `n` matches
    #[must_use]
    pub fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }

    /// Set priority
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn is_active(&self) -> bool {
        self.remaining.map_or(true, |n| n > 0)
    }
}

#[derive(Debug, Default)]
struct SimulatorState {
    rules: Vec<ResponseRule>,
    sent: Vec<String>,
    sent_at: Vec<Instant>,
    baud_changes: Vec<u32>,
    echo: bool,
    closed: bool,
}

impl SimulatorState {
    fn add_rule(&mut self, rule: ResponseRule) {
        self.rules.push(rule);
        // Stable sort: equal priorities keep insertion order
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    fn take_actions(&mut self, command: &str) -> Option<Vec<ResponseAction>> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.is_active() && r.condition.matches(command))?;

        rule.match_count += 1;
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        Some(rule.actions.clone())
    }
}

/// Shared view onto a running simulator, for injecting unsolicited lines and
/// inspecting what the DCE wrote
#[derive(Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimulatorState>>,
    tx: LineSender,
}

impl SimulatorHandle {
    /// Push a line as if the modem sent it spontaneously
    pub fn inject(&self, line: &str) {
        let _ = self.tx.send(line.to_string());
    }

    /// Commands written so far, terminator stripped
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Commands written so far, each with the time it was written
    pub fn sent_timed(&self) -> Vec<(String, Instant)> {
        let state = self.state.lock();
        state.sent.iter().cloned().zip(state.sent_at.iter().copied()).collect()
    }

    /// Baud rates the host switched to
    pub fn baud_changes(&self) -> Vec<u32> {
        self.state.lock().baud_changes.clone()
    }

    /// Add a rule while the simulator is running
    pub fn add_rule(&self, rule: ResponseRule) {
        self.state.lock().add_rule(rule);
    }

    /// How many times the rule with the given name matched
    pub fn match_count(&self, name: &str) -> u64 {
        self.state
            .lock()
            .rules
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.match_count)
            .sum()
    }
}

/// Scriptable modem implementing [`TransportTrait`]
pub struct SimulatedModem {
    name: String,
    state: Arc<Mutex<SimulatorState>>,
    tx: LineSender,
}

impl SimulatedModem {
    /// Create an empty simulator and the line channel it feeds
    pub fn new(name: &str) -> (Self, LineReceiver) {
        let (tx, rx) = line_channel();
        let modem = Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(SimulatorState::default())),
            tx,
        };
        (modem, rx)
    }

    /// Add a response rule
    #[must_use]
    pub fn with_rule(self, rule: ResponseRule) -> Self {
        self.state.lock().add_rule(rule);
        self
    }

    /// Start with command echo enabled (the modem power-on default)
    #[must_use]
    pub fn with_echo(self, enabled: bool) -> Self {
        self.state.lock().echo = enabled;
        self
    }

    /// Handle for inspection and line injection
    pub fn handle(&self) -> SimulatorHandle {
        SimulatorHandle {
            state: self.state.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quectel EC21 profile with canned answers for every command the DCE
    /// issues. Unknown commands get `ERROR`. The boot banner is queued on
    /// the line channel.
    pub fn ec21() -> (Self, LineReceiver) {
        let (modem, rx) = Self::new("Simulated EC21");
        let modem = modem
            .with_echo(true)
            .with_rule(ResponseRule::reply("AT", &["OK"]))
            .with_rule(ResponseRule::reply("AT&F", &["OK"]))
            .with_rule(ResponseRule::reply("AT&W", &["OK"]))
            .with_rule(ResponseRule::reply("ATE0", &[]).with_actions(vec![
                ResponseAction::Echo { enabled: false },
                ResponseAction::Line { text: "OK".to_string() },
            ]))
            .with_rule(ResponseRule::reply("ATE1", &[]).with_actions(vec![
                ResponseAction::Echo { enabled: true },
                ResponseAction::Line { text: "OK".to_string() },
            ]))
            .with_rule(ResponseRule::prefix("AT+IPR=", &["OK"]))
            .with_rule(ResponseRule::prefix("AT+IFC=", &["OK"]))
            .with_rule(ResponseRule::prefix("AT&D", &["OK"]))
            .with_rule(ResponseRule::prefix("ATS0=", &["OK"]))
            .with_rule(ResponseRule::prefix("AT+CGDCONT=", &["OK"]))
            .with_rule(ResponseRule::reply("ATH", &["OK"]))
            .with_rule(ResponseRule::reply("ATA", &["OK"]))
            .with_rule(ResponseRule::reply("AT+CPIN?", &["+CPIN: READY", "OK"]))
            .with_rule(ResponseRule::reply("AT+CGMM", &["EC21", "OK"]))
            .with_rule(ResponseRule::reply("AT+CGSN", &["867698041234567", "OK"]))
            .with_rule(ResponseRule::reply("AT+CIMI", &["222100123456789", "OK"]))
            .with_rule(ResponseRule::reply("AT+COPS?", &["+COPS: 0,0,\"vodafone IT\",7", "OK"]))
            .with_rule(ResponseRule::reply("AT+CSQ", &["+CSQ: 23,99", "OK"]))
            .with_rule(ResponseRule::reply("AT+CBC", &["+CBC: 0,85,3950", "OK"]))
            .with_rule(ResponseRule::reply("AT+CREG?", &["+CREG: 0,1", "OK"]))
            .with_rule(ResponseRule::reply(
                "AT+QNWINFO",
                &["+QNWINFO: \"FDD LTE\",\"22210\",\"LTE BAND 7\",3350", "OK"],
            ))
            .with_rule(ResponseRule::reply("AT+QCFG=\"band\"", &["+QCFG: \"band\",93,800d5,0", "OK"]))
            .with_rule(ResponseRule::prefix("AT+QCFG=\"band\",", &["OK"]))
            .with_rule(ResponseRule::prefix("AT+QCFG=\"roamservice\",", &["OK"]))
            .with_rule(ResponseRule::reply("AT+QCFG=\"fast/poweroff\",1", &["OK"]))
            .with_rule(ResponseRule::reply(
                "AT+QCFG=\"fast/poweroff\"",
                &["+QCFG: \"fast/poweroff\",1", "OK"],
            ))
            .with_rule(ResponseRule::reply("ATD*99***1#", &["CONNECT 150000000"]))
            .with_rule(ResponseRule::reply("ATO", &["CONNECT 150000000"]))
            .with_rule(ResponseRule::reply("+++", &["OK"]))
            .with_rule(ResponseRule::reply("AT+QPOWD=1", &[]).with_actions(vec![
                ResponseAction::Line { text: "OK".to_string() },
                ResponseAction::Delay { ms: 300 },
                ResponseAction::Line { text: "POWERED DOWN".to_string() },
            ]))
            .with_rule(ResponseRule::reply("AT+QPOWD=0", &["OK", "POWERED DOWN"]))
            .with_rule(ResponseRule::prefix("", &["ERROR"]).priority(i32::MIN));

        let handle = modem.handle();
        for line in ["RDY", "+CFUN: 1", "+CPIN: READY", "+QUSIM: 1", "+QIND: SMS DONE"] {
            handle.inject(line);
        }

        (modem, rx)
    }

    fn emit(&self, actions: Vec<ResponseAction>) {
        let needs_task = actions.iter().any(|a| matches!(a, ResponseAction::Delay { .. }));
        if !needs_task {
            for action in actions {
                apply_action(&self.state, &self.tx, action);
            }
            return;
        }

        let state = self.state.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            for action in actions {
                if let ResponseAction::Delay { ms } = action {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                } else {
                    apply_action(&state, &tx, action);
                }
            }
        });
    }
}

fn apply_action(state: &Mutex<SimulatorState>, tx: &LineSender, action: ResponseAction) {
    match action {
        ResponseAction::Line { text } => {
            let _ = tx.send(text);
        }
        ResponseAction::Echo { enabled } => state.lock().echo = enabled,
        ResponseAction::Delay { .. } | ResponseAction::Silence => {}
    }
}

#[async_trait]
impl TransportTrait for SimulatedModem {
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let command = String::from_utf8_lossy(data).trim_end_matches(['\r', '\n']).to_string();

        let (actions, echo) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransportError::Disconnected);
            }
            state.sent.push(command.clone());
            state.sent_at.push(Instant::now());
            (state.take_actions(&command), state.echo)
        };

        if echo && command != "+++" {
            let _ = self.tx.send(command.clone());
        }

        match actions {
            Some(actions) => self.emit(actions),
            None => tracing::warn!("{}: no rule for {:?}", self.name, command),
        }

        Ok(data.len())
    }

    async fn change_baud_rate(&mut self, rate: u32) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TransportError::Disconnected);
        }
        state.baud_changes.push(rate);
        Ok(())
    }

    fn connection_info(&self) -> String {
        format!("{} (simulated)", self.name)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_conditions() {
        let exact = MatchCondition::Exact { text: "AT+CSQ".to_string() };
        assert!(exact.matches("AT+CSQ"));
        assert!(!exact.matches("AT+CSQ?"));

        let prefix = MatchCondition::Prefix { text: "AT+IPR=".to_string() };
        assert!(prefix.matches("AT+IPR=921600"));
        assert!(!prefix.matches("AT+IPR?"));

        let regex = MatchCondition::regex(r"^AT&D[0-2]$").unwrap();
        assert!(regex.matches("AT&D2"));
        assert!(!regex.matches("AT&D7"));
    }

    #[test]
    fn test_regex_rule_loads_compiled() {
        let rule: ResponseRule = serde_json::from_str(
            r#"{"name":"dtr","condition":{"type":"regex","pattern":"^AT&D[0-2]$"},
                "actions":[{"type":"line","text":"OK"}],"priority":0,"remaining":null}"#,
        )
        .unwrap();
        assert!(rule.condition.matches("AT&D1"));
        assert!(!rule.condition.matches("AT&D9"));

        let bad = r#"{"name":"bad","condition":{"type":"regex","pattern":"AT("},
            "actions":[],"priority":0,"remaining":null}"#;
        assert!(serde_json::from_str::<ResponseRule>(bad).is_err());
        assert!(MatchCondition::regex("AT(").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_follow_the_clock() {
        let (modem, _rx) = SimulatedModem::new("test");
        let mut modem = modem.with_rule(ResponseRule::prefix("AT", &["OK"]));
        let handle = modem.handle();

        tokio_test::assert_ok!(modem.send(b"AT\r").await);
        tokio::time::sleep(Duration::from_millis(250)).await;
        tokio_test::assert_ok!(modem.send(b"AT+CSQ\r").await);

        let sent = handle.sent_timed();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "AT+CSQ");
        assert_eq!(sent[1].1 - sent[0].1, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_reply_and_record() {
        let (mut modem, mut rx) = SimulatedModem::new("test");
        modem = modem.with_rule(ResponseRule::reply("AT+CSQ", &["+CSQ: 20,99", "OK"]));
        let handle = modem.handle();

        modem.send(b"AT+CSQ\r").await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("+CSQ: 20,99"));
        assert_eq!(rx.recv().await.as_deref(), Some("OK"));
        assert_eq!(handle.sent(), vec!["AT+CSQ".to_string()]);
        assert_eq!(handle.match_count("AT+CSQ"), 1);
    }

    #[tokio::test]
    async fn test_limited_rule_falls_through() {
        let (modem, mut rx) = SimulatedModem::new("test");
        let mut modem = modem
            .with_rule(ResponseRule::reply("AT", &["ERROR"]).times(1))
            .with_rule(ResponseRule::reply("AT", &["OK"]));

        modem.send(b"AT\r").await.unwrap();
        modem.send(b"AT\r").await.unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("ERROR"));
        assert_eq!(rx.recv().await.as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn test_echo_toggle() {
        let (modem, mut rx) = SimulatedModem::ec21();
        let mut modem = modem;
        // Drain the boot banner
        for _ in 0..5 {
            rx.recv().await.unwrap();
        }

        modem.send(b"ATE0\r").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("ATE0"));
        assert_eq!(rx.recv().await.as_deref(), Some("OK"));

        modem.send(b"AT\r").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("OK"));
    }

    #[tokio::test]
    async fn test_closed_simulator_rejects_writes() {
        let (mut modem, _rx) = SimulatedModem::new("test");
        modem.close().await.unwrap();
        assert!(matches!(modem.send(b"AT\r").await, Err(TransportError::Disconnected)));
    }
}
