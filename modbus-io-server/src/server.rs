use std::{
    error::Error,
    fmt::Display,
    io,
    net::{TcpListener, ToSocketAddrs},
    os::fd::{AsFd, BorrowedFd},
    time::Duration,
};

use crate::{HardwareBinding, dispatch::Dispatcher, mux::Multiplexer};
use modbus_io_protocol::{ServerIdentity, mapping::RegisterMap};

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Read and write timeout of client connections. `None` waits forever.
    pub frame_timeout: Option<Duration>,
    /// Reported to clients that ask for the server id.
    pub identity: ServerIdentity,
}

/// Errors that end the service loop.
#[derive(Debug)]
pub enum ServerError {
    /// The listening socket could not be created.
    Bind(io::Error),
    /// Waiting for readiness failed.
    Poll(io::Error),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind(error) => write!(f, "Failed to bind listener: {}", error),
            ServerError::Poll(error) => write!(f, "Server poll() failure: {}", error),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ServerError::Bind(error) | ServerError::Poll(error) => Some(error),
        }
    }
}

#[derive(Debug)]
pub struct Server<T: HardwareBinding> {
    binding: T,
    map: RegisterMap,
    config: Config,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use modbus_io_server::server::Builder;
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .frame_timeout(Duration::from_secs(5))
///     .server_id(0x01)
///     .build(my_board);
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the time a partially received request, or a reply the client does not
    /// accept, may block the server before the connection is dropped.
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.config.frame_timeout = Some(timeout);
        self
    }

    /// Set the id reported for the report server id function
    pub fn server_id(mut self, server_id: u8) -> Self {
        self.config.identity =
            ServerIdentity::new(server_id, self.config.identity.identification());
        self
    }

    /// Set the identification text reported for the report server id function
    pub fn identification(mut self, identification: &str) -> Self {
        self.config.identity =
            ServerIdentity::new(self.config.identity.server_id(), identification.as_bytes());
        self
    }

    /// Build and return the server
    pub fn build<T: HardwareBinding>(self, binding: T) -> Server<T> {
        Server::new(binding, self.config)
    }
}

impl<T: HardwareBinding> Server<T> {
    /// Creates a server with a register map sized to the channels of `binding`.
    pub fn new(binding: T, config: Config) -> Server<T> {
        let counts = binding.channel_counts();
        log::debug!(
            "Register map: coils={}, discretes={}, holding_registers={}, input_registers={}",
            counts.coils,
            counts.discretes,
            counts.pwms,
            counts.analogs
        );
        Server {
            map: counts.register_map(),
            binding,
            config,
        }
    }

    pub fn binding(&self) -> &T {
        &self.binding
    }

    pub fn register_map(&self) -> &RegisterMap {
        &self.map
    }

    /// Binds to `addr` and serves clients until polling fails.
    pub fn listen(&mut self, addr: impl ToSocketAddrs) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).map_err(ServerError::Bind)?;
        if let Ok(addr) = listener.local_addr() {
            log::info!("Server listening for connections on {}", addr);
        }
        self.serve(listener)
    }

    /// Serves clients of an already bound listener until polling fails.
    pub fn serve(&mut self, listener: TcpListener) -> Result<(), ServerError> {
        self.run(listener, None)
    }

    /// Serves clients until `shutdown` becomes readable.
    ///
    /// On return, the listener and every client connection are closed. The binding stays
    /// with the server and is released when the server is dropped.
    pub fn serve_until(
        &mut self,
        listener: TcpListener,
        shutdown: impl AsFd,
    ) -> Result<(), ServerError> {
        self.run(listener, Some(shutdown.as_fd()))
    }

    fn run(
        &mut self,
        listener: TcpListener,
        shutdown: Option<BorrowedFd<'_>>,
    ) -> Result<(), ServerError> {
        let Server {
            binding,
            map,
            config,
        } = self;
        let mut dispatcher = Dispatcher::new(map, &*binding, &config.identity);
        let mut mux =
            Multiplexer::new(listener, shutdown, config.frame_timeout).map_err(ServerError::Bind)?;
        mux.run(|stream| dispatcher.handle_request(stream))
            .map_err(ServerError::Poll)
    }
}

#[cfg(test)]
mod test {
    use super::Builder;
    use crate::{ChannelCounts, memory::MemoryBoard};
    use std::time::Duration;

    #[test]
    fn register_map_matches_channel_counts() {
        let counts = ChannelCounts {
            coils: 5,
            discretes: 5,
            pwms: 4,
            analogs: 6,
        };
        let server = Builder::new().build(MemoryBoard::new(counts));
        let map = server.register_map();
        assert_eq!(map.coils().len(), 5);
        assert_eq!(map.discretes().len(), 5);
        assert_eq!(map.holding_registers().len(), 4);
        assert_eq!(map.input_registers().len(), 6);
    }

    #[test]
    fn builder_sets_identity() {
        let server = Builder::new()
            .identification("edison")
            .server_id(7)
            .frame_timeout(Duration::from_millis(250))
            .build(MemoryBoard::new(ChannelCounts::default()));
        assert_eq!(server.config.identity.server_id(), 7);
        assert_eq!(server.config.identity.identification(), b"edison");
        assert_eq!(server.config.frame_timeout, Some(Duration::from_millis(250)));
    }
}
