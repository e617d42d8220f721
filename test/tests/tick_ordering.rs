//! Deferral semantics: commands issued off-tick wait for the next tick
//! boundary, commands issued on-tick run immediately, and the queue drains
//! in order before the event pump.

use std::{cell::RefCell, rc::Rc};

use ticknet_client::Client;
use ticknet_shared::{transport::mem::MemoryNetwork, SendMode};
use ticknet_test::{connect_pair, tick_pair, tick_pair_n, tick_until_connected};

const PING: u8 = 1;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn off_tick_send_waits_for_the_next_tick() {
    init_logs();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connect_pair(&net, 7777);

    let counter = Rc::new(RefCell::new(0u32));
    let sink = counter.clone();
    client.register_message(PING, move |_context, _reader| {
        *sink.borrow_mut() += 1;
    });

    // issued between ticks, so it sits in the queue
    server.send_to_all(PING, |writer| writer.write_u8(0), SendMode::Default);
    client.begin_tick();
    client.end_tick();
    assert_eq!(*counter.borrow(), 0);

    // the next server tick drains the queue and flushes the send
    tick_pair(&mut server, &mut client);
    assert_eq!(*counter.borrow(), 1);
}

#[test]
fn on_tick_send_goes_out_with_the_current_tick() {
    init_logs();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connect_pair(&net, 7777);

    let counter = Rc::new(RefCell::new(0u32));
    let sink = counter.clone();
    client.register_message(PING, move |_context, _reader| {
        *sink.borrow_mut() += 1;
    });

    server.begin_tick();
    assert!(server.is_on_tick());
    server.send_to_all(PING, |writer| writer.write_u8(0), SendMode::Default);
    server.end_tick();
    assert!(!server.is_on_tick());

    client.begin_tick();
    client.end_tick();
    assert_eq!(*counter.borrow(), 1);
}

#[test]
fn client_tick_window_opens_and_closes() {
    init_logs();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connect_pair(&net, 7777);

    let counter = Rc::new(RefCell::new(0u32));
    let sink = counter.clone();
    server.register_message(PING, move |_context, _handle, _reader| {
        *sink.borrow_mut() += 1;
    });

    assert!(!client.is_on_tick());
    client.begin_tick();
    assert!(client.is_on_tick());
    client.send_message(PING, |writer| writer.write_u8(0), SendMode::Default);
    client.end_tick();
    assert!(!client.is_on_tick());

    server.begin_tick();
    server.end_tick();
    assert_eq!(*counter.borrow(), 1);
}

#[test]
fn deferred_sends_keep_their_order() {
    init_logs();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connect_pair(&net, 7777);

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    server.register_message(PING, move |_context, _handle, reader| {
        sink.borrow_mut().push(reader.read_u8().unwrap());
    });

    client.send_message(PING, |writer| writer.write_u8(1), SendMode::Reliable);
    client.send_message(PING, |writer| writer.write_u8(2), SendMode::Reliable);
    client.send_message(PING, |writer| writer.write_u8(3), SendMode::Reliable);
    tick_pair_n(&mut server, &mut client, 2);

    assert_eq!(&*received.borrow(), &[1, 2, 3]);
}

#[test]
fn queued_disconnect_runs_before_the_event_pump() {
    init_logs();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connect_pair(&net, 7777);
    let handle = server.connection_handles()[0];

    server.register_message(PING, |_context, _handle, _reader| {
        panic!("data from a disconnected handle must not be dispatched");
    });

    // land a frame in the server's inbox, then disconnect the sender before
    // the server ticks again
    client.send_message(PING, |writer| writer.write_u8(0), SendMode::Default);
    client.begin_tick();
    client.end_tick();
    server.disconnect(handle);

    tick_pair_n(&mut server, &mut client, 2);
    assert_eq!(server.connection_count(), 0);
    assert!(!server.has_connection(handle));
}

#[test]
fn client_disconnect_discards_queued_commands() {
    init_logs();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connect_pair(&net, 7777);

    let counter = Rc::new(RefCell::new(0u32));
    let sink = counter.clone();
    server.register_message(PING, move |_context, _handle, _reader| {
        *sink.borrow_mut() += 1;
    });

    client.send_message(PING, |writer| writer.write_u8(0), SendMode::Default);
    client.disconnect();

    client.connect(net.socket(), "127.0.0.1", 7777);
    tick_until_connected(&mut server, &mut client);
    tick_pair_n(&mut server, &mut client, 2);

    // the send queued before the disconnect never went out
    assert_eq!(*counter.borrow(), 0);
}

#[test]
fn server_stop_discards_queued_commands() {
    init_logs();
    let net = MemoryNetwork::new();
    let (mut server, mut client) = connect_pair(&net, 7777);

    let counter = Rc::new(RefCell::new(0u32));
    let sink = counter.clone();
    client.register_message(PING, move |_context, _reader| {
        *sink.borrow_mut() += 1;
    });

    server.send_to_all(PING, |writer| writer.write_u8(0), SendMode::Default);
    server.stop();
    server.start(net.socket(), 7777);

    let mut fresh = Client::new();
    fresh.connect(net.socket(), "127.0.0.1", 7777);
    tick_until_connected(&mut server, &mut fresh);
    tick_pair_n(&mut server, &mut client, 2);

    assert_eq!(*counter.borrow(), 0);
}
