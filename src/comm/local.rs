use super::Communicator;
use crate::{KMeansError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io;

/// In-process transport: every worker is a thread, every ordered pair of ranks has its own channel.
pub struct LocalCommunicator {
    rank: usize,
    senders: Vec<Sender<Vec<u8>>>,
    receivers: Vec<Receiver<Vec<u8>>>,
}

impl LocalCommunicator {
    /// Create the fully connected communicators for a group of `world` workers, indexed by rank.
    pub fn new_group(world: usize) -> Vec<LocalCommunicator> {
        let mut senders: Vec<Vec<Sender<Vec<u8>>>> = (0..world).map(|_| Vec::with_capacity(world)).collect();
        let mut receivers: Vec<Vec<Receiver<Vec<u8>>>> = (0..world).map(|_| Vec::with_capacity(world)).collect();
        for src in 0..world {
            for dst in 0..world {
                let (tx, rx) = unbounded();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }
        senders.into_iter().zip(receivers).enumerate()
            .map(|(rank, (senders, receivers))| LocalCommunicator { rank, senders, receivers })
            .collect()
    }

    fn hung_up(peer: usize) -> KMeansError {
        KMeansError::Communication { peer, source: io::Error::new(io::ErrorKind::BrokenPipe, "worker hung up") }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize { self.rank }
    fn world_size(&self) -> usize { self.senders.len() }

    fn send(&self, dest: usize, payload: &[u8]) -> Result<()> {
        let channel = self.senders.get(dest).ok_or_else(|| Self::hung_up(dest))?;
        channel.send(payload.to_vec()).map_err(|_| Self::hung_up(dest))
    }

    fn recv(&self, src: usize) -> Result<Vec<u8>> {
        let channel = self.receivers.get(src).ok_or_else(|| Self::hung_up(src))?;
        channel.recv().map_err(|_| Self::hung_up(src))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_keep_order_per_pair() {
        let group = LocalCommunicator::new_group(3);
        group[2].send(0, b"first").unwrap();
        group[1].send(0, b"other").unwrap();
        group[2].send(0, b"second").unwrap();

        assert_eq!(group[0].recv(2).unwrap(), b"first");
        assert_eq!(group[0].recv(2).unwrap(), b"second");
        assert_eq!(group[0].recv(1).unwrap(), b"other");
        assert_eq!(group[1].world_size(), 3);
        assert_eq!(group[1].rank(), 1);
    }

    #[test]
    fn dropped_peer_is_an_error() {
        let mut group = LocalCommunicator::new_group(2);
        let lonely = group.remove(0);
        drop(group);
        assert!(matches!(lonely.recv(1), Err(KMeansError::Communication { peer: 1, .. })));
        assert!(lonely.send(5, b"x").is_err());
    }
}
