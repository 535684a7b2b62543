//! Collective operations built on the point-to-point [`Communicator`].
//!
//! Every helper follows the same two-stage pattern: first a [`WireCount`] per
//! peer announcing the payload length, then the payloads themselves with
//! receives sized from stage one. A zero-length payload skips stage two on
//! both sides. Send handles are always drained before returning, even when a
//! receive failed.
//!
//! All functions here are collective: every rank of `comm` must call them in
//! the same order with the same `tag`, or the program hangs.

use std::collections::BTreeMap;

use crate::algs::communicator::{CommTag, Communicator, Wait};
use crate::algs::wire::WireCount;
use crate::decomp_error::DecompError;

fn comm_err(neighbor: usize, message: impl Into<String>) -> DecompError {
    DecompError::CommError {
        neighbor,
        message: message.into(),
    }
}

/// Stage 1: tell each peer in `outgoing` how many bytes follow and learn the
/// same from each peer in `incoming`.
fn exchange_sizes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    incoming: &[usize],
) -> Result<BTreeMap<usize, usize>, DecompError> {
    let recvs: Vec<_> = incoming
        .iter()
        .map(|&nbr| {
            let h = comm.irecv(nbr, tag.as_u16(), std::mem::size_of::<WireCount>());
            (nbr, h)
        })
        .collect();

    let pending: Vec<_> = outgoing
        .iter()
        .map(|(&nbr, buf)| {
            let count = WireCount::new(buf.len());
            comm.isend(nbr, tag.as_u16(), bytemuck::bytes_of(&count))
        })
        .collect();

    let mut sizes = BTreeMap::new();
    let mut maybe_err = None;
    for (nbr, h) in recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                let cnt: WireCount = bytemuck::pod_read_unaligned(&data);
                sizes.insert(nbr, cnt.get());
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(comm_err(
                    nbr,
                    format!(
                        "expected {} bytes for size header, got {}",
                        std::mem::size_of::<WireCount>(),
                        data.len()
                    ),
                ));
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(comm_err(nbr, format!("failed to receive size from rank {nbr}")));
            }
            _ => {}
        }
    }
    for send in pending {
        let _ = send.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes),
    }
}

/// Stage 2: move the payloads announced in stage 1.
fn exchange_data<C: Communicator>(
    comm: &C,
    tag: CommTag,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    sizes: &BTreeMap<usize, usize>,
) -> Result<BTreeMap<usize, Vec<u8>>, DecompError> {
    let recvs: Vec<_> = sizes
        .iter()
        .filter(|&(_, &len)| len > 0)
        .map(|(&nbr, &len)| (nbr, len, comm.irecv(nbr, tag.as_u16(), len)))
        .collect();

    let pending: Vec<_> = outgoing
        .iter()
        .filter(|(_, buf)| !buf.is_empty())
        .map(|(&nbr, buf)| comm.isend(nbr, tag.as_u16(), buf))
        .collect();

    let mut out: BTreeMap<usize, Vec<u8>> = sizes
        .iter()
        .filter(|&(_, &len)| len == 0)
        .map(|(&nbr, _)| (nbr, Vec::new()))
        .collect();
    let mut maybe_err = None;
    for (nbr, len, h) in recvs {
        match h.wait() {
            Some(data) if data.len() == len => {
                out.insert(nbr, data);
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(comm_err(
                    nbr,
                    format!("expected {len} bytes, got {}", data.len()),
                ));
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(comm_err(nbr, format!("failed to receive data from rank {nbr}")));
            }
            _ => {}
        }
    }
    for send in pending {
        let _ = send.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(out),
    }
}

/// Point-to-point exchange with a known pattern.
///
/// Sends `outgoing[q]` to each `q` and returns the payload received from each
/// rank in `incoming`. Both lists must be consistent across ranks (if `p`
/// sends to `q`, `q` lists `p`). The local rank must not appear in either.
pub fn sparse_exchange<C: Communicator>(
    comm: &C,
    tag: CommTag,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    incoming: &[usize],
) -> Result<BTreeMap<usize, Vec<u8>>, DecompError> {
    let me = comm.rank();
    if outgoing.contains_key(&me) || incoming.contains(&me) {
        return Err(comm_err(me, "self-messages must be handled locally"));
    }
    let sizes = exchange_sizes(comm, tag.offset(0), outgoing, incoming)?;
    exchange_data(comm, tag.offset(1), outgoing, &sizes)
}

/// Every rank contributes `local`; every rank receives all contributions in
/// rank order.
pub fn all_gather_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    local: &[u8],
) -> Result<Vec<Vec<u8>>, DecompError> {
    let me = comm.rank();
    let peers: Vec<usize> = (0..comm.size()).filter(|&r| r != me).collect();
    let outgoing: BTreeMap<usize, Vec<u8>> =
        peers.iter().map(|&r| (r, local.to_vec())).collect();
    let mut received = sparse_exchange(comm, tag, &outgoing, &peers)?;
    received.insert(me, local.to_vec());
    Ok((0..comm.size())
        .map(|r| received.remove(&r).unwrap_or_default())
        .collect())
}

fn gather_f64<C: Communicator>(comm: &C, tag: CommTag, x: f64) -> Result<Vec<f64>, DecompError> {
    let bytes = x.to_bits().to_le_bytes();
    all_gather_bytes(comm, tag, &bytes)?
        .into_iter()
        .enumerate()
        .map(|(r, b)| {
            let arr: [u8; 8] = b
                .as_slice()
                .try_into()
                .map_err(|_| comm_err(r, format!("expected 8 bytes for f64, got {}", b.len())))?;
            Ok(f64::from_bits(u64::from_le_bytes(arr)))
        })
        .collect()
}

/// Sum of `x` over all ranks. Summed in rank order, so every rank obtains
/// the bit-identical result.
pub fn all_reduce_sum<C: Communicator>(comm: &C, tag: CommTag, x: f64) -> Result<f64, DecompError> {
    Ok(gather_f64(comm, tag, x)?.into_iter().sum())
}

/// Maximum of `x` over all ranks.
pub fn all_reduce_max<C: Communicator>(comm: &C, tag: CommTag, x: f64) -> Result<f64, DecompError> {
    Ok(gather_f64(comm, tag, x)?
        .into_iter()
        .fold(f64::NEG_INFINITY, f64::max))
}

/// Element-wise sum of equally long vectors over all ranks.
pub fn all_reduce_sum_vec<C: Communicator>(
    comm: &C,
    tag: CommTag,
    xs: &[f64],
) -> Result<Vec<f64>, DecompError> {
    let bytes: Vec<u8> = xs.iter().flat_map(|x| x.to_bits().to_le_bytes()).collect();
    let mut acc = vec![0.0; xs.len()];
    for (r, buf) in all_gather_bytes(comm, tag, &bytes)?.into_iter().enumerate() {
        if buf.len() != bytes.len() {
            return Err(comm_err(
                r,
                format!("expected {} bytes, got {}", bytes.len(), buf.len()),
            ));
        }
        for (a, chunk) in acc.iter_mut().zip(buf.chunks_exact(8)) {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(chunk);
            *a += f64::from_bits(u64::from_le_bytes(arr));
        }
    }
    Ok(acc)
}
