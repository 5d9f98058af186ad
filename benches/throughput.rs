//! Throughput benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use modemctl_core::core::dce::protocol::{
    parse_band_config, parse_network_info, parse_operator, parse_registration, parse_signal_quality,
};
use modemctl_core::core::dce::{DeviceState, Dispatcher, MAX_OPERATOR_LENGTH};

const RESPONSES: &[&str] = &[
    "+CSQ: 23,99",
    "+COPS: 0,0,\"vodafone IT\",7",
    "+CREG: 0,1",
    "+QCFG: \"band\",93,800d5,0",
    "+QNWINFO: \"FDD LTE\",\"22210\",\"LTE BAND 7\",3350",
];

const URCS: &[&str] = &[
    "RDY",
    "+CFUN: 1",
    "+CPIN: READY",
    "+QUSIM: 1",
    "+QIND: SMS DONE",
    "+CREG: 5",
    "RING",
    "NO CARRIER",
];

fn parser_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsers");
    group.throughput(Throughput::Elements(1));

    group.bench_function("signal_quality", |b| {
        b.iter(|| black_box(parse_signal_quality(black_box(RESPONSES[0]))))
    });

    group.bench_function("operator", |b| {
        b.iter(|| black_box(parse_operator(black_box(RESPONSES[1]), MAX_OPERATOR_LENGTH)))
    });

    group.bench_function("registration", |b| {
        b.iter(|| black_box(parse_registration(black_box(RESPONSES[2]))))
    });

    group.bench_function("band_config", |b| {
        b.iter(|| black_box(parse_band_config(black_box(RESPONSES[3]))))
    });

    group.bench_function("network_info", |b| {
        b.iter(|| black_box(parse_network_info(black_box(RESPONSES[4]))))
    });

    group.finish();
}

fn dispatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    group.throughput(Throughput::Elements(URCS.len() as u64));
    group.bench_function("unsolicited", |b| {
        b.iter(|| {
            let mut state = DeviceState::new();
            for line in URCS {
                black_box(state.dispatch(black_box(line)));
            }
            state
        })
    });

    group.throughput(Throughput::Elements(3));
    group.bench_function("operator_query", |b| {
        b.iter(|| {
            let mut state = DeviceState::new();
            for line in ["AT+COPS?", RESPONSES[1], "OK"] {
                black_box(Dispatcher::Operator.interpret(black_box(line), &mut state));
            }
            state
        })
    });

    group.finish();
}

criterion_group!(benches, parser_benchmark, dispatch_benchmark);
criterion_main!(benches);
