//! End-to-end tests of the command engine against the simulated modem

use modemctl_core::core::dce::{
    AtCommand, BaudStatus, CommandOutcome, Dce, Dispatcher, Identity, LteBand, OperatorSelection,
    RegistrationStatus, SimStatus, UnsolicitedEvent, WorkingMode,
};
use modemctl_core::core::dce::ProvisionConfig;
use modemctl_core::core::persist::{BaudRateStore, MemoryBaudRateStore, FACTORY_BAUD_RATE};
use modemctl_core::core::simulator::{ResponseRule, SimulatedModem, SimulatorHandle};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const BOUND: Duration = Duration::from_secs(2);

/// Dispatchers of ordinary commands: completed by `OK`
const QUERY_DISPATCHERS: &[Dispatcher] = &[
    Dispatcher::Generic,
    Dispatcher::SignalQuality,
    Dispatcher::Battery,
    Dispatcher::ModuleName,
    Dispatcher::Imei,
    Dispatcher::Imsi,
    Dispatcher::SimStatus,
    Dispatcher::Operator,
    Dispatcher::Registration,
    Dispatcher::BandConfig,
    Dispatcher::FastPowerOff,
    Dispatcher::NetworkInfo,
    Dispatcher::ExitDataMode,
];

fn modem_with(rules: Vec<ResponseRule>) -> (Dce, SimulatorHandle) {
    let (modem, rx) = SimulatedModem::new("test");
    let modem = rules.into_iter().fold(modem, SimulatedModem::with_rule);
    let handle = modem.handle();
    (Dce::bind(modem, rx), handle)
}

#[tokio::test(start_paused = true)]
async fn test_ok_completes_without_side_effects() {
    for &dispatcher in QUERY_DISPATCHERS {
        let (mut dce, _) = modem_with(vec![ResponseRule::reply("AT+TEST", &["OK"])]);

        assert_ok!(dce.execute(&AtCommand::new("AT+TEST"), dispatcher, BOUND).await);
        assert_eq!(dce.state().outcome(), CommandOutcome::Success, "{dispatcher:?}");
        assert_eq!(dce.identity(), &Identity::default(), "{dispatcher:?}");
        assert_eq!(dce.sim_status(), SimStatus::Unknown, "{dispatcher:?}");
        assert_eq!(dce.mode(), WorkingMode::Command, "{dispatcher:?}");
        assert_eq!(dce.state().active_dispatcher(), Dispatcher::Unsolicited);
    }
}

#[tokio::test(start_paused = true)]
async fn test_error_fails_every_dispatcher() {
    let all = QUERY_DISPATCHERS
        .iter()
        .copied()
        .chain([Dispatcher::Dial, Dispatcher::PowerDown]);

    for dispatcher in all {
        let (mut dce, _) = modem_with(vec![ResponseRule::reply("AT+TEST", &["+CSQ: 1", "ERROR"])]);

        let err = dce
            .execute(&AtCommand::new("AT+TEST"), dispatcher, BOUND)
            .await
            .unwrap_err();
        assert!(err.is_rejected(), "{dispatcher:?}: {err}");
        assert_eq!(dce.state().outcome(), CommandOutcome::Failure);
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_bounded() {
    let (mut dce, _) = modem_with(vec![
        ResponseRule::silent("AT+CSQ"),
        ResponseRule::reply("AT", &["OK"]),
    ]);

    let started = tokio::time::Instant::now();
    let err = dce.get_signal_quality().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(started.elapsed() >= dce.timeouts().default_timeout());
    assert_eq!(dce.state().outcome(), CommandOutcome::Pending);
    assert_eq!(dce.state().active_dispatcher(), Dispatcher::Unsolicited);

    // The link is still usable afterwards
    assert_ok!(dce.sync().await);
}

#[tokio::test(start_paused = true)]
async fn test_operator_names() {
    let (mut dce, handle) = modem_with(vec![]);

    handle.add_rule(ResponseRule::reply("AT+COPS?", &["+COPS: 0,0,\"AT&T\",7", "OK"]).times(1));
    assert_eq!(
        assert_ok!(dce.get_operator_name().await),
        OperatorSelection::Selected("AT&T".to_string())
    );
    assert_eq!(dce.identity().operator, "AT&T");

    handle.add_rule(ResponseRule::reply("AT+COPS?", &["+COPS: 0", "OK"]).times(1));
    assert_eq!(assert_ok!(dce.get_operator_name().await), OperatorSelection::NotSelected);
    assert_eq!(dce.identity().operator, "");

    handle.add_rule(ResponseRule::reply("AT+COPS?", &["+COPS: 0,0,\"Carrier, Inc\",7", "OK"]).times(1));
    let OperatorSelection::Selected(name) = assert_ok!(dce.get_operator_name().await) else {
        panic!("operator not selected");
    };
    assert_eq!(name, "Carrier, Inc");
    assert_eq!(dce.identity().operator, "Carrier, Inc");
}

#[tokio::test(start_paused = true)]
async fn test_band_mask() {
    let (mut dce, handle) = modem_with(vec![ResponseRule::prefix("AT+QCFG=\"band\",", &["OK"])]);

    handle.add_rule(ResponseRule::reply("AT+QCFG=\"band\"", &["+QCFG: \"band\",1,40,0", "OK"]).times(1));
    let config = assert_ok!(dce.get_band_config().await);
    assert_eq!((config.band, config.lte, config.tds), (0x1, 0x40, 0x0));
    assert!(config.lte_enabled(LteBand::B7));

    handle.add_rule(ResponseRule::reply("AT+QCFG=\"band\"", &["+QCFG: \"band\",40,95,0", "OK"]).times(1));
    assert!(!assert_ok!(dce.get_band_state(LteBand::B7).await));

    assert_ok!(dce.set_band_state(LteBand::B7, false).await);
    assert_eq!(handle.sent().last().map(String::as_str), Some("AT+QCFG=\"band\",0,80095,0,1"));
}

#[tokio::test(start_paused = true)]
async fn test_registration_status() {
    let (mut dce, _) = modem_with(vec![ResponseRule::reply("AT+CREG?", &["+CREG: 0,1", "OK"])]);

    let status = assert_ok!(dce.get_network_status().await);
    assert_eq!(status, RegistrationStatus::RegisteredHome);
    assert_eq!(status.code(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sim_error_mapping() {
    let (mut dce, handle) = modem_with(vec![]);

    handle.add_rule(ResponseRule::reply("AT+CPIN?", &["+CME ERROR: 10"]).times(1));
    assert_eq!(assert_ok!(dce.get_sim_status().await), SimStatus::NotInserted);
    assert_eq!(dce.state().outcome(), CommandOutcome::Success);

    handle.add_rule(ResponseRule::reply("AT+CPIN?", &["+CME ERROR: 13"]).times(1));
    assert_eq!(assert_ok!(dce.get_sim_status().await), SimStatus::Unknown);

    handle.add_rule(ResponseRule::reply("AT+CPIN?", &["+CPIN: SIM PIN", "OK"]).times(1));
    assert_eq!(assert_ok!(dce.get_sim_status().await), SimStatus::PinRequired);

    handle.add_rule(ResponseRule::reply("AT+CPIN?", &["ERROR"]).times(1));
    assert_err!(dce.get_sim_status().await);
}

#[tokio::test(start_paused = true)]
async fn test_mode_round_trip_after_call_drop() {
    let (mut dce, handle) = modem_with(vec![
        ResponseRule::reply("ATD*99***1#", &["CONNECT 150000000"]),
        ResponseRule::reply("+++", &["NO CARRIER"]),
    ]);

    assert_ok!(dce.set_working_mode(WorkingMode::Data).await);
    assert_eq!(dce.mode(), WorkingMode::Data);

    assert_ok!(dce.set_working_mode(WorkingMode::Command).await);
    assert_eq!(dce.mode(), WorkingMode::Command);
    assert_eq!(handle.sent(), vec!["ATD*99***1#".to_string(), "+++".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_queries_agree() {
    let (modem, rx) = SimulatedModem::ec21();
    let mut dce = Dce::bind(modem, rx);

    let first = assert_ok!(dce.get_module_info().await);
    let second = assert_ok!(dce.get_module_info().await);
    assert_eq!(first, second);
    assert_eq!(first.name, "EC21");
    assert_eq!(first.imei, "867698041234567");
    assert_eq!(first.operator, "vodafone IT");

    let a = assert_ok!(dce.get_signal_quality().await);
    let b = assert_ok!(dce.get_signal_quality().await);
    assert_eq!(a, b);
    assert_eq!(a.rssi_dbm(), Some(-67));
}

#[tokio::test(start_paused = true)]
async fn test_boot_banner_is_published() {
    let (modem, rx) = SimulatedModem::ec21();
    let mut dce = Dce::bind(modem, rx);
    let mut events = dce.subscribe();

    assert_ok!(dce.wait_until_ready(BOUND).await);
    assert_eq!(dce.baud_status(), BaudStatus::Confirmed);
    assert_ok!(dce.sync().await);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(received.first(), Some(&UnsolicitedEvent::Ready));
    assert!(received.contains(&UnsolicitedEvent::SimState {
        status: SimStatus::Ready
    }));
}

#[tokio::test(start_paused = true)]
async fn test_boot_banner_inside_name_response() {
    let (mut dce, _) = modem_with(vec![ResponseRule::reply("AT+CGMM", &["RDY", "EC21", "OK"])]);
    let mut events = dce.subscribe();

    assert_eq!(assert_ok!(dce.get_module_name().await), "EC21");
    assert_eq!(dce.identity().name, "EC21");
    assert_eq!(events.try_recv().ok(), Some(UnsolicitedEvent::Ready));
}

#[tokio::test(start_paused = true)]
async fn test_urc_between_commands() {
    let (mut dce, handle) = modem_with(vec![ResponseRule::reply("AT", &["OK"])]);
    let mut events = dce.subscribe();

    handle.inject("+CREG: 5");
    handle.inject("RING");
    assert_ok!(dce.sync().await);

    assert_eq!(
        events.try_recv().ok(),
        Some(UnsolicitedEvent::Registration {
            status: RegistrationStatus::RegisteredRoaming
        })
    );
    assert_eq!(events.try_recv().ok(), Some(UnsolicitedEvent::Ring));
}

#[tokio::test(start_paused = true)]
async fn test_provision_simulated_ec21() {
    let (modem, rx) = SimulatedModem::ec21();
    let handle = modem.handle();
    let mut dce = Dce::bind(modem, rx);
    let mut store = MemoryBaudRateStore::new(FACTORY_BAUD_RATE);

    let report = assert_ok!(dce.provision(&mut store, &ProvisionConfig::default()).await);
    assert!(report.baud_rate_changed);
    assert_eq!(report.baud_rate, 921_600);
    assert_eq!(report.sim_status, SimStatus::Ready);
    assert!(report.fast_shutdown_enabled);

    assert_eq!(dce.baud_status(), BaudStatus::Confirmed);
    assert_eq!(handle.baud_changes(), vec![921_600]);
    assert_eq!(assert_ok!(store.load()), 921_600);

    // Second run finds the rate already negotiated
    let report = assert_ok!(dce.provision(&mut store, &ProvisionConfig::default()).await);
    assert!(!report.baud_rate_changed);
    assert_eq!(handle.baud_changes(), vec![921_600]);
}

#[tokio::test(start_paused = true)]
async fn test_power_down_consumes_final_line() {
    let (modem, rx) = SimulatedModem::ec21();
    let mut dce = Dce::bind(modem, rx);
    let mut events = dce.subscribe();

    assert_ok!(dce.power_down().await);
    assert_ok!(dce.deinit().await);
    while let Ok(event) = events.try_recv() {
        assert_ne!(event, UnsolicitedEvent::PoweredDown);
    }
}
