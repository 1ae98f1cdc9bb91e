use super::Communicator;
use crate::{KMeansError, Result};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{debug, trace};

/// Rank of this worker within its group.
pub const RANK_VAR: &str = "KMEANS_RANK";
/// Number of workers in the group.
pub const WORLD_SIZE_VAR: &str = "KMEANS_WORLD_SIZE";
/// `ip:port` of rank 0; rank `r` listens on `port + r`.
pub const ADDR_VAR: &str = "KMEANS_ADDR";

const CONNECT_ATTEMPTS: usize = 600;
const CONNECT_BACKOFF: Duration = Duration::from_millis(50);

/// Fully meshed TCP transport. Each message is framed as a little-endian `u64` length followed by the payload.
pub struct TcpCommunicator {
    rank: usize,
    peers: Vec<Option<Mutex<TcpStream>>>,
}

fn comm_err(peer: usize) -> impl FnOnce(io::Error) -> KMeansError {
    move |source| KMeansError::Communication { peer, source }
}

fn peer_addr(ip: IpAddr, base_port: u16, rank: usize) -> Result<SocketAddr> {
    usize::from(base_port).checked_add(rank)
        .and_then(|port| u16::try_from(port).ok())
        .map(|port| SocketAddr::new(ip, port))
        .ok_or_else(|| KMeansError::Launch(format!("no port left for worker {} above {}", rank, base_port)))
}

fn connect_with_retry(addr: SocketAddr, peer: usize) -> Result<TcpStream> {
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt >= CONNECT_ATTEMPTS => return Err(comm_err(peer)(e)),
            Err(e) => {
                trace!(peer, attempt, error = %e, "worker not reachable yet");
                attempt += 1;
                std::thread::sleep(CONNECT_BACKOFF);
            }
        }
    }
}

impl TcpCommunicator {
    /// Join the group described by [`RANK_VAR`], [`WORLD_SIZE_VAR`] and [`ADDR_VAR`].
    pub fn from_env() -> Result<Self> {
        fn var<V: std::str::FromStr>(name: &str) -> Result<V> {
            let raw = std::env::var(name).map_err(|_| KMeansError::Launch(format!("{} is not set", name)))?;
            raw.trim().parse().map_err(|_| KMeansError::Launch(format!("{} has an invalid value: {:?}", name, raw)))
        }
        Self::connect(var(RANK_VAR)?, var(WORLD_SIZE_VAR)?, var(ADDR_VAR)?)
    }

    /// Listen on `base` port + `rank`, connect to every lower rank and accept every higher one.
    pub fn connect(rank: usize, world: usize, base: SocketAddr) -> Result<Self> {
        if rank >= world {
            return Err(KMeansError::Launch(format!("rank {} outside of a group of {}", rank, world)));
        }
        let listener = TcpListener::bind(peer_addr(base.ip(), base.port(), rank)?).map_err(comm_err(rank))?;
        let mut peers: Vec<Option<Mutex<TcpStream>>> = (0..world).map(|_| None).collect();

        for (peer, slot) in peers.iter_mut().enumerate().take(rank) {
            let mut stream = connect_with_retry(peer_addr(base.ip(), base.port(), peer)?, peer)?;
            stream.set_nodelay(true).map_err(comm_err(peer))?;
            stream.write_all(&(rank as u64).to_le_bytes()).map_err(comm_err(peer))?;
            *slot = Some(Mutex::new(stream));
        }
        for _ in rank + 1..world {
            let (mut stream, from) = listener.accept().map_err(comm_err(rank))?;
            stream.set_nodelay(true).map_err(comm_err(rank))?;
            let mut hello = [0u8; 8];
            stream.read_exact(&mut hello).map_err(comm_err(rank))?;
            let peer = u64::from_le_bytes(hello) as usize;
            let slot = peers.get_mut(peer)
                .filter(|slot| slot.is_none() && peer > rank)
                .ok_or_else(|| KMeansError::Launch(format!("unexpected handshake from {} claiming rank {}", from, peer)))?;
            *slot = Some(Mutex::new(stream));
        }
        debug!(rank, world, "worker connected to all peers");
        Ok(Self { rank, peers })
    }

    fn stream(&self, peer: usize) -> Result<&Mutex<TcpStream>> {
        self.peers.get(peer).and_then(Option::as_ref).ok_or_else(|| KMeansError::Communication {
            peer,
            source: io::Error::new(io::ErrorKind::NotConnected, "no connection to this worker"),
        })
    }
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize { self.rank }
    fn world_size(&self) -> usize { self.peers.len() }

    fn send(&self, dest: usize, payload: &[u8]) -> Result<()> {
        let mut stream = self.stream(dest)?.lock();
        stream.write_all(&(payload.len() as u64).to_le_bytes()).map_err(comm_err(dest))?;
        stream.write_all(payload).map_err(comm_err(dest))?;
        stream.flush().map_err(comm_err(dest))
    }

    fn recv(&self, src: usize) -> Result<Vec<u8>> {
        let mut stream = self.stream(src)?.lock();
        let mut len = [0u8; 8];
        stream.read_exact(&mut len).map_err(comm_err(src))?;
        let mut payload = vec![0u8; u64::from_le_bytes(len) as usize];
        stream.read_exact(&mut payload).map_err(comm_err(src))?;
        Ok(payload)
    }
}
