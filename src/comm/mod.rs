//! Message passing between the workers of a distributed calculation.
//!
//! A [`Communicator`] only provides ordered point-to-point messages between ranks. The collectives the
//! distributed k-means needs ([`broadcast`], [`scatter`], [`gather`], [`all_reduce`], [`barrier`]) are
//! built on top of it and always involve every rank of the group. Reductions run along a binomial tree
//! rooted at [`ROOT`], so for a fixed group size the summation order, and therefore the result, is
//! reproducible bit for bit.

use crate::{KMeansError, Result};
use serde::{de::DeserializeOwned, Serialize};

mod local;
mod tcp;

pub use local::LocalCommunicator;
pub use tcp::{TcpCommunicator, ADDR_VAR, RANK_VAR, WORLD_SIZE_VAR};

/// Rank of the coordinating worker: loads inputs, scatters samples, gathers results.
pub const ROOT: usize = 0;

/// Point-to-point transport between the workers of one group.
///
/// Messages between one pair of ranks arrive in the order they were sent. `send` may return before the
/// receiver picked the message up.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;
    fn world_size(&self) -> usize;
    fn send(&self, dest: usize, payload: &[u8]) -> Result<()>;
    fn recv(&self, src: usize) -> Result<Vec<u8>>;

    fn is_root(&self) -> bool { self.rank() == ROOT }
}

/// A value that can be summed across workers.
pub trait Reducible: Serialize + DeserializeOwned {
    fn combine(&mut self, other: Self);
}
impl Reducible for () {
    fn combine(&mut self, _: Self) {}
}

pub(crate) fn encode<V: Serialize>(peer: usize, value: &V) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| KMeansError::Codec { peer, reason: e.to_string() })
}

pub(crate) fn decode<V: DeserializeOwned>(peer: usize, bytes: &[u8]) -> Result<V> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| KMeansError::Codec { peer, reason: e.to_string() })
}

/// Combine the values of all ranks at [`ROOT`]. Returns `Some` on the root only.
pub fn reduce_to_root<C, V>(comm: &C, value: V) -> Result<Option<V>>
        where C: Communicator + ?Sized, V: Reducible {
    let (rank, size) = (comm.rank(), comm.world_size());
    let mut acc = value;
    let mut step = 1;
    while step < size {
        if rank % (2 * step) == 0 {
            let peer = rank + step;
            if peer < size {
                let other: V = decode(peer, &comm.recv(peer)?)?;
                acc.combine(other);
            }
        } else {
            let parent = rank - step;
            comm.send(parent, &encode(parent, &acc)?)?;
            return Ok(None);
        }
        step *= 2;
    }
    Ok(Some(acc))
}

/// Binomial-tree broadcast of raw bytes from [`ROOT`]; the payload of non-root ranks is ignored.
fn broadcast_bytes<C>(comm: &C, payload: Vec<u8>) -> Result<Vec<u8>>
        where C: Communicator + ?Sized {
    let (rank, size) = (comm.rank(), comm.world_size());
    let (data, span) = if rank == ROOT {
        (payload, size.next_power_of_two())
    } else {
        let lowest_bit = rank & rank.wrapping_neg();
        (comm.recv(rank - lowest_bit)?, lowest_bit)
    };
    let mut step = span >> 1;
    while step > 0 {
        if rank + step < size {
            comm.send(rank + step, &data)?;
        }
        step >>= 1;
    }
    Ok(data)
}

/// Overwrite `value` on every rank with the root's `value`.
pub fn broadcast<C, V>(comm: &C, value: &mut V) -> Result<()>
        where C: Communicator + ?Sized, V: Serialize + DeserializeOwned {
    let payload = if comm.is_root() { encode(ROOT, value)? } else { Vec::new() };
    let data = broadcast_bytes(comm, payload)?;
    if !comm.is_root() {
        *value = decode(ROOT, &data)?;
    }
    Ok(())
}

/// Sum `value` over all ranks; every rank receives the identical total.
pub fn all_reduce<C, V>(comm: &C, value: V) -> Result<V>
        where C: Communicator + ?Sized, V: Reducible {
    let payload = match reduce_to_root(comm, value)? {
        Some(total) => encode(ROOT, &total)?,
        None => Vec::new(),
    };
    decode(ROOT, &broadcast_bytes(comm, payload)?)
}

/// Returns once every rank of the group entered the barrier.
pub fn barrier<C>(comm: &C) -> Result<()>
        where C: Communicator + ?Sized {
    all_reduce(comm, ())
}

/// Hand part `i` of the root's `parts` to rank `i`. Non-root ranks pass `None`.
pub fn scatter<C, V>(comm: &C, parts: Option<Vec<V>>) -> Result<V>
        where C: Communicator + ?Sized, V: Serialize + DeserializeOwned {
    if !comm.is_root() {
        return decode(ROOT, &comm.recv(ROOT)?);
    }
    let parts = parts.ok_or_else(|| KMeansError::Collective("scatter root has no parts".into()))?;
    if parts.len() != comm.world_size() {
        return Err(KMeansError::Collective(format!("scatter needs {} parts, got {}", comm.world_size(), parts.len())));
    }
    let mut parts = parts.into_iter();
    let own = parts.next().ok_or_else(|| KMeansError::Collective("empty group".into()))?;
    for (dest, part) in (1..).zip(parts) {
        comm.send(dest, &encode(dest, &part)?)?;
    }
    Ok(own)
}

/// Collect `value` of every rank at the root, in rank order. Returns `Some` on the root only.
pub fn gather<C, V>(comm: &C, value: V) -> Result<Option<Vec<V>>>
        where C: Communicator + ?Sized, V: Serialize + DeserializeOwned {
    if !comm.is_root() {
        comm.send(ROOT, &encode(ROOT, &value)?)?;
        return Ok(None);
    }
    let mut all = Vec::with_capacity(comm.world_size());
    all.push(value);
    for src in 1..comm.world_size() {
        all.push(decode(src, &comm.recv(src)?)?);
    }
    Ok(Some(all))
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Trace(Vec<usize>);
    impl Reducible for Trace {
        fn combine(&mut self, other: Self) { self.0.extend(other.0); }
    }

    fn run_group<R: Send>(world: usize, f: impl Fn(&LocalCommunicator) -> R + Sync) -> Vec<R> {
        let group = LocalCommunicator::new_group(world);
        let f = &f;
        std::thread::scope(|s| {
            let handles: Vec<_> = group.iter().map(|comm| s.spawn(move || f(comm))).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }

    #[test]
    fn all_reduce_sums_everywhere() {
        for world in 1..=9 {
            let results = run_group(world, |comm| all_reduce(comm, Trace(vec![comm.rank()])).unwrap());
            let first = &results[0];
            let mut sorted = first.0.clone();
            sorted.sort();
            assert_eq!(sorted, (0..world).collect::<Vec<_>>());
            assert!(results.iter().all(|r| r == first));
        }
    }

    #[test]
    fn reduction_order_is_fixed() {
        let results = run_group(4, |comm| reduce_to_root(comm, Trace(vec![comm.rank()])).unwrap());
        assert_eq!(results[0], Some(Trace(vec![0, 1, 2, 3])));
        assert!(results[1..].iter().all(|r| r.is_none()));

        let results = run_group(6, |comm| reduce_to_root(comm, Trace(vec![comm.rank()])).unwrap());
        assert_eq!(results[0], Some(Trace(vec![0, 1, 2, 3, 4, 5])));
    }

    #[test]
    fn broadcast_from_root() {
        for world in [1, 2, 3, 5, 8] {
            let results = run_group(world, |comm| {
                let mut value = if comm.is_root() { vec![1.5f64, -2.0, 1e300] } else { Vec::new() };
                broadcast(comm, &mut value).unwrap();
                value
            });
            assert!(results.iter().all(|v| v == &vec![1.5, -2.0, 1e300]));
        }
    }

    #[test]
    fn scatter_then_gather() {
        let results = run_group(3, |comm| {
            let parts = comm.is_root().then(|| vec![vec![0u64], vec![10, 11], vec![]]);
            let mine: Vec<u64> = scatter(comm, parts).unwrap();
            barrier(comm).unwrap();
            gather(comm, mine).unwrap()
        });
        assert_eq!(results[0], Some(vec![vec![0], vec![10, 11], vec![]]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], None);
    }

    #[test]
    fn scatter_rejects_wrong_part_count() {
        let group = LocalCommunicator::new_group(1);
        let err = scatter::<_, u64>(&group[0], Some(vec![1, 2])).unwrap_err();
        assert!(matches!(err, KMeansError::Collective(_)));
    }
}
