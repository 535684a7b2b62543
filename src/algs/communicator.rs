//! Thin façade over intra-process or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). Sends are
//! fire-and-forget from the caller's point of view; receives return a handle
//! that yields the payload on `.wait()`. Messages between one `(src, dst, tag)`
//! triple are delivered in the order they were sent.
//!
//! A communicator is an explicit context handle: every collective in the crate
//! takes one by reference, and nothing here is process-global.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;

/// Typed message tag. Each protocol reserves a small block of tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    /// Tag of the `k`-th stage of a protocol.
    #[inline]
    pub const fn offset(self, k: u16) -> CommTag {
        CommTag(self.0.wrapping_add(k))
    }
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

/// Non-blocking point-to-point communication interface.
pub trait Communicator: Send + Sync {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of at most `len` bytes from `peer`.
    fn irecv(&self, peer: usize, tag: u16, len: usize) -> Self::RecvHandle;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-rank communicator for serial runs. Every collective degenerates to
/// local work, so it never actually sends.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _len: usize) {}

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
}

// --- LocalComm: several ranks inside one process ---
type Key = (usize, usize, u16); // (src, dst, tag)
type Mailbox = DashMap<Key, VecDeque<Bytes>>;

/// Rank handle of an in-process "world". Ranks usually live on separate
/// threads; they share one mailbox and nothing else.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl LocalComm {
    /// Create all `size` ranks of a fresh world.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let mailbox = Arc::new(Mailbox::new());
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
            })
            .collect()
    }
}

pub struct LocalHandle {
    key: Key,
    len: usize,
    mailbox: Arc<Mailbox>,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            if let Some(mut queue) = self.mailbox.get_mut(&self.key) {
                if let Some(bytes) = queue.pop_front() {
                    let n = bytes.len().min(self.len);
                    return Some(bytes[..n].to_vec());
                }
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        self.mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, len: usize) -> LocalHandle {
        LocalHandle {
            key: (peer, self.rank, tag),
            len,
            mailbox: Arc::clone(&self.mailbox),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Wraps a duplicate of the world communicator, so decomposition traffic
    /// never matches user messages. Freed when the last clone is dropped.
    #[derive(Clone)]
    pub struct MpiComm {
        comm: Arc<SimpleCommunicator>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// The caller keeps the `mpi::environment::Universe` alive for as long
        /// as any `MpiComm` exists.
        pub fn new(universe: &mpi::environment::Universe) -> Self {
            let comm = universe.world().duplicate();
            let rank = comm.rank() as usize;
            let size = comm.size() as usize;
            Self {
                comm: Arc::new(comm),
                rank,
                size,
            }
        }
    }

    pub struct MpiSendHandle {
        req: Option<Request<'static, [u8], StaticScope>>,
        buf: *mut [u8],
    }

    // The buffer is only reachable through the pending request.
    unsafe impl Send for MpiSendHandle {}

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(req) = self.req.take() {
                req.wait();
            }
            // SAFETY: `buf` came from `Box::into_raw` in `isend` and the request
            // that borrowed it has completed.
            drop(unsafe { Box::from_raw(self.buf) });
            None
        }
    }

    /// Receives block in `wait`. All sends of a protocol stage are posted
    /// before any wait, so blocking here cannot deadlock.
    pub struct MpiRecvHandle {
        comm: Arc<SimpleCommunicator>,
        peer: usize,
        tag: u16,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .comm
                .process_at_rank(self.peer as i32)
                .receive_vec_with_tag::<u8>(self.tag as i32);
            data.truncate(self.len);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiSendHandle {
            let raw: *mut [u8] = Box::into_raw(buf.to_vec().into_boxed_slice());
            // SAFETY: the allocation outlives the request; it is released in
            // `MpiSendHandle::wait` after completion.
            let slice: &'static [u8] = unsafe { &*raw };
            let req = self.comm.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                slice,
                tag as i32,
            );
            MpiSendHandle {
                req: Some(req),
                buf: raw,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, len: usize) -> MpiRecvHandle {
            MpiRecvHandle {
                comm: Arc::clone(&self.comm),
                peer,
                tag,
                len,
            }
        }

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_roundtrip_two_ranks() {
        let world = LocalComm::world(2);
        let (c0, c1) = (&world[0], &world[1]);

        let recv = c1.irecv(0, 7, 4);
        c0.isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv.wait().expect("Expected to receive data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn local_fifo_per_tag() {
        let world = LocalComm::world(2);
        for i in 0..5u8 {
            world[0].isend(1, 3, &[i]);
        }
        world[0].isend(1, 4, &[99]);
        assert_eq!(world[1].irecv(0, 4, 1).wait(), Some(vec![99]));
        let got: Vec<u8> = (0..5)
            .map(|_| world[1].irecv(0, 3, 1).wait().unwrap()[0])
            .collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn worlds_are_isolated() {
        let a = LocalComm::world(2);
        let b = LocalComm::world(2);
        a[0].isend(1, 1, &[1]);
        b[0].isend(1, 1, &[2]);
        assert_eq!(b[1].irecv(0, 1, 1).wait(), Some(vec![2]));
        assert_eq!(a[1].irecv(0, 1, 1).wait(), Some(vec![1]));
    }

    #[test]
    fn truncation_is_ok() {
        let w = LocalComm::world(2);
        w[0].isend(1, 2, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(w[1].irecv(0, 2, 4).wait(), Some(vec![1, 2, 3, 4]));
        assert_eq!((NoComm.rank(), NoComm.size()), (0, 1));
    }
}
