//! Helpers for end-to-end tests: a server on a loopback port, backed by a [`MemoryBoard`].
use std::{
    io::Write,
    net::{SocketAddr, TcpListener},
    os::unix::net::UnixStream,
    thread::{self, JoinHandle},
};

use modbus_io_server::{
    ChannelCounts,
    memory::MemoryBoard,
    server::{Builder, ServerError},
};

pub const COUNTS: ChannelCounts = ChannelCounts {
    coils: 5,
    discretes: 5,
    pwms: 4,
    analogs: 6,
};

/// A server running on its own thread until [`TestServer::stop`] is called or it is dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    /// Shares its channels with the board of the server
    pub board: MemoryBoard,
    trigger: UnixStream,
    handle: Option<JoinHandle<Result<(), ServerError>>>,
}

impl TestServer {
    pub fn start() -> TestServer {
        TestServer::start_with(Builder::new())
    }

    pub fn start_with(builder: Builder) -> TestServer {
        let board = MemoryBoard::new(COUNTS);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (trigger, shutdown) = UnixStream::pair().unwrap();

        let server_board = board.clone();
        let handle = thread::spawn(move || {
            let mut server = builder.build(server_board);
            server.serve_until(listener, &shutdown)
        });
        TestServer {
            addr,
            board,
            trigger,
            handle: Some(handle),
        }
    }

    /// Requests shutdown and waits for the service loop to return.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), ServerError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.trigger.write_all(&[1]).unwrap();
        handle.join().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
