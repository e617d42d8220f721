use std::net::SocketAddr;

use ticknet_client::{Client, ConnectionState};
use ticknet_server::Server;
use ticknet_shared::transport::mem::MemoryNetwork;

/// Ticks the server session, then the client session, once each. This is
/// the fixed ordering the tests assume: server work for a tick happens
/// before the client sees its results.
pub fn tick_pair(server: &mut Server, client: &mut Client) {
    server.begin_tick();
    server.end_tick();
    client.begin_tick();
    client.end_tick();
}

pub fn tick_pair_n(server: &mut Server, client: &mut Client, count: usize) {
    for _ in 0..count {
        tick_pair(server, client);
    }
}

/// Ticks until the client reports `Connected`, panicking if it never does.
pub fn tick_until_connected(server: &mut Server, client: &mut Client) {
    for _ in 0..8 {
        if client.connection_state() == ConnectionState::Connected {
            return;
        }
        tick_pair(server, client);
    }
    panic!(
        "client never connected, stuck in {:?}",
        client.connection_state()
    );
}

/// Builds a started server and a connected client sharing one in-memory
/// network.
pub fn connect_pair(net: &MemoryNetwork, port: u16) -> (Server, Client) {
    let mut server = Server::new();
    server.start(net.socket(), port);
    assert!(server.is_running());

    let mut client = Client::new();
    client.connect(net.socket(), "127.0.0.1", port);
    tick_until_connected(&mut server, &mut client);
    assert_eq!(server.connection_count(), 1);
    (server, client)
}

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}
