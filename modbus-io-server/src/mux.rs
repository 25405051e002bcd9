//! Single-threaded readiness multiplexing of one listener and its client connections.
use std::{
    collections::BTreeMap,
    io,
    net::{TcpListener, TcpStream},
    os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd},
    time::Duration,
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
};

use crate::dispatch::Outcome;

/// The set of open client connections, ordered by handle.
#[derive(Debug, Default)]
pub struct ConnectionSet {
    connections: BTreeMap<RawFd, TcpStream>,
}

impl ConnectionSet {
    pub fn new() -> ConnectionSet {
        ConnectionSet::default()
    }

    /// Registers a connection and returns its handle.
    pub fn insert(&mut self, stream: TcpStream) -> RawFd {
        let handle = stream.as_raw_fd();
        self.connections.insert(handle, stream);
        handle
    }

    /// Removes a connection. The connection is closed once the returned stream is dropped.
    pub fn remove(&mut self, handle: RawFd) -> Option<TcpStream> {
        self.connections.remove(&handle)
    }

    pub fn get_mut(&mut self, handle: RawFd) -> Option<&mut TcpStream> {
        self.connections.get_mut(&handle)
    }

    pub fn contains(&self, handle: RawFd) -> bool {
        self.connections.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// The highest handle currently registered
    pub fn max_handle(&self) -> Option<RawFd> {
        self.connections.keys().next_back().copied()
    }

    /// All connections in ascending handle order
    pub fn iter(&self) -> impl Iterator<Item = (RawFd, &TcpStream)> {
        self.connections
            .iter()
            .map(|(handle, stream)| (*handle, stream))
    }
}

/// A handle that became ready during [`Multiplexer::poll_ready`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Ready {
    /// The listening socket has a pending connection.
    Listener,
    /// The shutdown handle became readable.
    Shutdown,
    /// A client connection has data, or was closed by the peer.
    Client(RawFd),
}

/// Owns the listening socket and every client connection.
///
/// The listener is declared before the connections so that it is closed first on drop.
pub struct Multiplexer<'a> {
    listener: TcpListener,
    connections: ConnectionSet,
    shutdown: Option<BorrowedFd<'a>>,
    frame_timeout: Option<Duration>,
}

impl<'a> Multiplexer<'a> {
    /// # Arguments
    ///
    /// * `listener` - A bound listener. It is switched to non-blocking mode so that a
    ///   connection that vanishes between poll and accept cannot stall the loop.
    /// * `shutdown` - Polled alongside the sockets. Once it is readable, [`Multiplexer::run`] returns.
    /// * `frame_timeout` - Read and write timeout applied to every accepted connection.
    ///   Bounds how long a partially delivered request may stall the loop.
    pub fn new(
        listener: TcpListener,
        shutdown: Option<BorrowedFd<'a>>,
        frame_timeout: Option<Duration>,
    ) -> io::Result<Multiplexer<'a>> {
        listener.set_nonblocking(true)?;
        Ok(Multiplexer {
            listener,
            connections: ConnectionSet::new(),
            shutdown,
            frame_timeout,
        })
    }

    pub fn connections(&self) -> &ConnectionSet {
        &self.connections
    }

    /// Blocks until at least one handle is ready.
    ///
    /// Returns the ready handles in ascending handle order. A connection accepted after this
    /// call is not part of the result, so every handle shows up at most once per cycle.
    pub fn poll_ready(&self) -> io::Result<Vec<Ready>> {
        let listener = self.listener.as_fd();
        let mut handles = vec![(listener.as_raw_fd(), Ready::Listener)];
        let mut fds = vec![PollFd::new(listener, PollFlags::POLLIN)];

        if let Some(shutdown) = self.shutdown {
            handles.push((shutdown.as_raw_fd(), Ready::Shutdown));
            fds.push(PollFd::new(shutdown, PollFlags::POLLIN));
        }
        for (handle, stream) in self.connections.iter() {
            handles.push((handle, Ready::Client(handle)));
            fds.push(PollFd::new(stream.as_fd(), PollFlags::POLLIN));
        }

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno.into()),
            }
        }

        let mut ready = fds
            .iter()
            .zip(handles)
            .filter(|(fd, _)| fd.revents().is_some_and(|revents| !revents.is_empty()))
            .map(|(_, handle)| handle)
            .collect::<Vec<_>>();
        ready.sort_unstable_by_key(|(handle, _)| *handle);
        Ok(ready.into_iter().map(|(_, ready)| ready).collect())
    }

    /// Accepts exactly one pending connection and registers it.
    ///
    /// Fails with [`io::ErrorKind::WouldBlock`] if no connection is pending.
    pub fn accept_one(&mut self) -> io::Result<RawFd> {
        let (stream, peer) = self.listener.accept()?;
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(self.frame_timeout)?;
        stream.set_write_timeout(self.frame_timeout)?;
        stream.set_nodelay(true)?;

        let handle = self.connections.insert(stream);
        log::info!("New connection from {} on socket {}", peer, handle);
        Ok(handle)
    }

    /// Services a ready listener. A failed accept is logged and leaves every
    /// registered connection untouched.
    pub fn accept_pending(&mut self) -> Option<RawFd> {
        match self.accept_one() {
            Ok(handle) => Some(handle),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                log::debug!("Pending connection vanished before accept()");
                None
            }
            Err(err) => {
                log::error!("Server accept() error: {}", err);
                None
            }
        }
    }

    /// Removes a connection from the set and closes it.
    pub fn retire(&mut self, handle: RawFd) {
        if let Some(stream) = self.connections.remove(handle) {
            drop(stream);
            log::debug!(
                "Retired socket {}, {} connections left, highest socket {:?}",
                handle,
                self.connections.len(),
                self.connections.max_handle()
            );
        }
    }

    /// Waits for readiness once and services every ready handle.
    ///
    /// Returns `false` if the shutdown handle became readable.
    pub fn run_once(
        &mut self,
        dispatch: &mut impl FnMut(&mut TcpStream) -> Outcome,
    ) -> io::Result<bool> {
        for ready in self.poll_ready()? {
            match ready {
                Ready::Shutdown => {
                    log::info!(
                        "Shutdown requested, closing {} connections",
                        self.connections.len()
                    );
                    return Ok(false);
                }
                Ready::Listener => {
                    self.accept_pending();
                }
                Ready::Client(handle) => {
                    let Some(stream) = self.connections.get_mut(handle) else {
                        continue;
                    };
                    match dispatch(stream) {
                        Outcome::Continue => {}
                        Outcome::Closed => {
                            log::info!("Connection closed on socket {}", handle);
                            self.retire(handle);
                        }
                        Outcome::Error(err) => {
                            log::warn!("Closing connection on socket {}: {}", handle, err);
                            self.retire(handle);
                        }
                    }
                }
            }
        }
        Ok(true)
    }

    /// Services ready handles until the shutdown handle becomes readable.
    ///
    /// `dispatch` is called once for every ready client connection and must process
    /// exactly one request. Connections for which it reports [`Outcome::Closed`] or
    /// [`Outcome::Error`] are retired. Failed accepts are logged and do not end the loop,
    /// a failed poll does.
    pub fn run(&mut self, mut dispatch: impl FnMut(&mut TcpStream) -> Outcome) -> io::Result<()> {
        while self.run_once(&mut dispatch)? {}
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{ConnectionSet, Multiplexer, Ready};
    use crate::{ChannelCounts, HardwareBinding, dispatch::Dispatcher, memory::MemoryBoard};
    use modbus_io_protocol::ServerIdentity;
    use std::{
        io::{ErrorKind, Read, Write},
        net::{TcpListener, TcpStream},
        os::{
            fd::{AsFd, RawFd},
            unix::net::UnixStream,
        },
    };

    fn listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").unwrap()
    }

    /// Waits until the listener has a pending connection and accepts it.
    fn accept(mux: &mut Multiplexer) -> RawFd {
        while !mux.poll_ready().unwrap().contains(&Ready::Listener) {}
        mux.accept_one().unwrap()
    }

    #[test]
    fn connection_set_tracks_highest_handle() {
        let listener = listener();
        let addr = listener.local_addr().unwrap();
        let mut set = ConnectionSet::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let _client = TcpStream::connect(addr).unwrap();
            let (stream, _) = listener.accept().unwrap();
            handles.push(set.insert(stream));
        }
        handles.sort();

        assert_eq!(set.max_handle(), Some(handles[2]));
        set.remove(handles[1]);
        assert_eq!(set.max_handle(), Some(handles[2]));
        set.remove(handles[2]);
        assert_eq!(set.max_handle(), Some(handles[0]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn pending_connection_makes_listener_ready() {
        let listener = listener();
        let addr = listener.local_addr().unwrap();
        let mut mux = Multiplexer::new(listener, None, None).unwrap();

        let _client = TcpStream::connect(addr).unwrap();
        assert_eq!(mux.poll_ready().unwrap(), vec![Ready::Listener]);
        let handle = mux.accept_one().unwrap();
        assert!(mux.connections().contains(handle));
    }

    #[test]
    fn ready_handles_are_sorted() {
        let listener = listener();
        let addr = listener.local_addr().unwrap();
        let mut mux = Multiplexer::new(listener, None, None).unwrap();

        let mut clients = Vec::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            clients.push(TcpStream::connect(addr).unwrap());
            handles.push(accept(&mut mux));
        }
        for client in clients.iter_mut().rev() {
            client.write_all(&[0]).unwrap();
        }
        handles.sort();

        // Data may arrive in several steps, poll until all clients are reported
        let ready = loop {
            let ready = mux.poll_ready().unwrap();
            if ready.len() == 3 {
                break ready;
            }
        };
        let expected = handles.into_iter().map(Ready::Client).collect::<Vec<_>>();
        assert_eq!(ready, expected);
    }

    #[test]
    fn shutdown_handle_is_polled() {
        let listener = listener();
        let (mut trigger, shutdown) = UnixStream::pair().unwrap();
        let mux = Multiplexer::new(listener, Some(shutdown.as_fd()), None).unwrap();

        trigger.write_all(&[1]).unwrap();
        assert_eq!(mux.poll_ready().unwrap(), vec![Ready::Shutdown]);
    }

    #[test]
    fn retire_closes_connection() {
        let listener = listener();
        let addr = listener.local_addr().unwrap();
        let mut mux = Multiplexer::new(listener, None, None).unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        let handle = accept(&mut mux);
        mux.retire(handle);
        assert!(mux.connections().is_empty());

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn failed_accept_keeps_connections() {
        let listener = listener();
        let addr = listener.local_addr().unwrap();
        let mut mux = Multiplexer::new(listener, None, None).unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        let handle = accept(&mut mux);

        // Nothing is pending anymore
        assert_eq!(mux.accept_one().unwrap_err().kind(), ErrorKind::WouldBlock);
        assert_eq!(mux.accept_pending(), None);
        assert!(mux.connections().contains(handle));
        assert_eq!(mux.connections().len(), 1);

        client.write_all(&[0]).unwrap();
        assert_eq!(mux.poll_ready().unwrap(), vec![Ready::Client(handle)]);
    }

    #[test]
    fn peer_close_retires_only_that_connection() {
        let listener = listener();
        let addr = listener.local_addr().unwrap();
        let mut mux = Multiplexer::new(listener, None, None).unwrap();

        let leaving = TcpStream::connect(addr).unwrap();
        let leaving_handle = accept(&mut mux);
        let _staying = TcpStream::connect(addr).unwrap();
        let staying_handle = accept(&mut mux);
        drop(leaving);

        let board = MemoryBoard::new(ChannelCounts {
            coils: 5,
            discretes: 5,
            pwms: 4,
            analogs: 6,
        });
        let mut map = board.channel_counts().register_map();
        let identity = ServerIdentity::default();
        let mut dispatcher = Dispatcher::new(&mut map, &board, &identity);

        assert!(mux.run_once(&mut |stream| dispatcher.handle_request(stream)).unwrap());
        assert!(!mux.connections().contains(leaving_handle));
        assert!(mux.connections().contains(staying_handle));
        assert_eq!(mux.connections().len(), 1);
    }

    #[test]
    fn peer_close_of_only_connection_empties_set() {
        let listener = listener();
        let addr = listener.local_addr().unwrap();
        let mut mux = Multiplexer::new(listener, None, None).unwrap();

        let client = TcpStream::connect(addr).unwrap();
        accept(&mut mux);
        drop(client);

        let board = MemoryBoard::new(ChannelCounts::default());
        let mut map = board.channel_counts().register_map();
        let identity = ServerIdentity::default();
        let mut dispatcher = Dispatcher::new(&mut map, &board, &identity);

        assert!(mux.run_once(&mut |stream| dispatcher.handle_request(stream)).unwrap());
        assert!(mux.connections().is_empty());
    }
}
