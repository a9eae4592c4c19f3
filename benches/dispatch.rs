use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bacnet_core::app::dispatch::{confirmed_fn, unconfirmed_fn, ApduDispatcher, DispatchTable};
use bacnet_core::app::tsm::TransactionTable;
use bacnet_core::app::ApplicationConfig;
use bacnet_core::datalink::mstp::{MstpFrame, ReceiveFsm};
use bacnet_core::network::BacnetAddress;
use bacnet_core::service::{ConfirmedServiceChoice, UnconfirmedServiceChoice};
use bacnet_core::DccConfig;

const READ_PROPERTY: [u8; 11] = [
    0x00, 0x05, 0x01, 0x0C, 0x0C, 0x02, 0x00, 0x00, 0x01, 0x19, 0x4D,
];
const WHO_IS: [u8; 2] = [0x10, 0x08];
const SIMPLE_ACK: [u8; 3] = [0x20, 0x01, 0x0F];

fn dispatcher() -> ApduDispatcher {
    let mut table = DispatchTable::new();
    table.register_confirmed(
        ConfirmedServiceChoice::ReadProperty,
        confirmed_fn(|_ctx, request| {
            black_box(request.service_data);
        }),
    );
    table.register_unconfirmed(
        UnconfirmedServiceChoice::WhoIs,
        unconfirmed_fn(|_ctx, request| {
            black_box(request.service_data);
        }),
    );
    ApduDispatcher::new(table, &DccConfig::default())
}

fn dispatch_benchmark(c: &mut Criterion) {
    let source = BacnetAddress::mstp(5);
    let mut dispatcher = dispatcher();
    let mut tsm: TransactionTable = TransactionTable::new(&ApplicationConfig::default());
    let mut reply = Vec::with_capacity(64);

    c.bench_function("dispatch_confirmed", |b| {
        b.iter(|| {
            dispatcher
                .dispatch(&source, black_box(&READ_PROPERTY), &mut tsm, &mut reply)
                .ok()
        })
    });

    c.bench_function("dispatch_unconfirmed", |b| {
        b.iter(|| {
            dispatcher
                .dispatch(&source, black_box(&WHO_IS), &mut tsm, &mut reply)
                .ok()
        })
    });

    c.bench_function("dispatch_simple_ack", |b| {
        b.iter(|| {
            dispatcher
                .dispatch(&source, black_box(&SIMPLE_ACK), &mut tsm, &mut reply)
                .ok()
        })
    });
}

fn receive_benchmark(c: &mut Criterion) {
    let frame = MstpFrame::bacnet_data(1, 2, &[0x55; 480], false)
        .map(|frame| frame.encode())
        .unwrap_or_default();

    c.bench_function("receive_data_frame", |b| {
        b.iter(|| {
            let mut fsm = ReceiveFsm::new(1, 95);
            let mut events = 0;
            for &octet in black_box(&frame) {
                if fsm.receive_octet(octet, 0).is_some() {
                    events += 1;
                }
            }
            events
        })
    });
}

criterion_group!(benches, dispatch_benchmark, receive_benchmark);
criterion_main!(benches);
