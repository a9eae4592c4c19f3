//! Two-station MS/TP token ring
//!
//! Station 0 and station 1 share an in-memory EIA-485 line. Once the token
//! is circulating, station 1 reads the object name of station 0 every
//! second and station 0 answers from its ReadProperty handler.
//!
//! Run with `RUST_LOG=debug` to follow the token, and stop with Ctrl+C.
//! An optional argument limits the run to that many seconds.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bacnet_core::app::dispatch::{complex_ack_fn, confirmed_fn, unconfirmed_fn};
use bacnet_core::app::{Apdu, ComplexAck};
use bacnet_core::datalink::mstp::{ClockDriver, MstpConfig, SerialPort, SystemClock};
use bacnet_core::network::BacnetAddress;
use bacnet_core::service::{ConfirmedServiceChoice, UnconfirmedServiceChoice};
use bacnet_core::stack::{ProtocolStack, StackConfig};

/// Octets travelling in one direction on the line
#[derive(Debug, Clone, Default)]
struct Wire(Rc<RefCell<VecDeque<u8>>>);

#[derive(Debug)]
struct WirePort {
    outgoing: Wire,
}

impl SerialPort for WirePort {
    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.outgoing.0.borrow_mut().extend(frame);
        Ok(())
    }
}

fn station(address: u8, outgoing: Wire) -> Result<ProtocolStack<WirePort>, Box<dyn std::error::Error>> {
    let config = StackConfig {
        mstp: MstpConfig {
            station_address: address,
            max_master: 3,
            ..Default::default()
        },
        ..Default::default()
    };
    Ok(ProtocolStack::new(config, WirePort { outgoing })?)
}

fn deliver(wire: &Wire, stack: &mut ProtocolStack<WirePort>) {
    let octets: Vec<u8> = wire.0.borrow_mut().drain(..).collect();
    for octet in octets {
        stack.node_mut().receive_octet(octet);
    }
}

// ReadProperty device,0 object-name
const READ_OBJECT_NAME: [u8; 7] = [0x0C, 0x02, 0x00, 0x00, 0x00, 0x19, 0x4D];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let limit: Option<u64> = std::env::args().nth(1).and_then(|arg| arg.parse().ok());

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let zero_to_one = Wire::default();
    let one_to_zero = Wire::default();
    let mut server = station(0, zero_to_one.clone())?;
    let mut client = station(1, one_to_zero.clone())?;

    server.dispatcher_mut().table_mut().register_confirmed(
        ConfirmedServiceChoice::ReadProperty,
        confirmed_fn(|ctx, request| {
            let mut value = request.service_data.to_vec();
            // opening tag 3, CharacterString "ring", closing tag 3
            value.extend_from_slice(&[0x3E, 0x75, 0x05, 0x00, b'r', b'i', b'n', b'g', 0x3F]);
            let ack = Apdu::ComplexAck(ComplexAck {
                segmented_message: false,
                more_follows: false,
                invoke_id: request.header.invoke_id,
                sequence_number: 0,
                proposed_window_number: 0,
                service_choice: request.service_choice,
                service_data: &value,
            });
            if let Err(err) = ctx.reply(&ack) {
                log::warn!("could not encode ReadProperty ack: {}", err);
            }
        }),
    );

    let answers = Rc::new(RefCell::new(0u32));
    let seen = answers.clone();
    client.dispatcher_mut().table_mut().register_ack(
        ConfirmedServiceChoice::ReadProperty,
        complex_ack_fn(move |ctx, ack| {
            *seen.borrow_mut() += 1;
            println!(
                "ReadProperty answer {} from {}: {}",
                seen.borrow(),
                ctx.source,
                bacnet_core::util::hex_string(ack.service_data)
            );
        }),
    );
    client.dispatcher_mut().table_mut().register_unconfirmed(
        UnconfirmedServiceChoice::IAm,
        unconfirmed_fn(|ctx, _request| println!("I-Am from {}", ctx.source)),
    );

    server.send_unconfirmed(
        &BacnetAddress::local_broadcast(),
        UnconfirmedServiceChoice::IAm,
        &[0xC4, 0x02, 0x00, 0x00, 0x00, 0x22, 0x01, 0xE0, 0x91, 0x00, 0x21, 0x0F],
    )?;

    let mut clock = ClockDriver::new(SystemClock::new());
    let mut since_request = 0u32;
    let mut elapsed_total = 0u64;

    println!("Token ring running, press Ctrl+C to stop.");
    while running.load(Ordering::SeqCst) {
        let elapsed = clock.elapsed_ms();
        elapsed_total += u64::from(elapsed);
        if limit.is_some_and(|seconds| elapsed_total >= seconds * 1000) {
            break;
        }

        for stack in [&mut server, &mut client] {
            for invoke_id in stack.tick_ms(elapsed)? {
                println!("invoke id {} timed out", invoke_id);
            }
        }
        deliver(&zero_to_one, &mut client);
        deliver(&one_to_zero, &mut server);
        server.poll()?;
        client.poll()?;

        since_request += elapsed;
        if since_request >= 1000 {
            since_request = 0;
            if let Err(err) = client.send_confirmed(
                &BacnetAddress::mstp(0),
                ConfirmedServiceChoice::ReadProperty,
                &READ_OBJECT_NAME,
            ) {
                log::warn!("ReadProperty not sent: {}", err);
            }
        }

        std::thread::sleep(Duration::from_millis(2));
    }

    for (name, stack) in [("server", &server), ("client", &client)] {
        println!(
            "{}: {:?} next station {} {:?}",
            name,
            stack.node().state(),
            stack.node().next_station(),
            stack.node().statistics()
        );
    }
    println!("{} answers received", answers.borrow());
    Ok(())
}
