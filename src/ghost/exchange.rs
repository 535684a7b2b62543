//! Ghost exchange: `ghost_get` (owners push copies out) and `ghost_put`
//! (ghost contributions flow back and are fused into the owners).
//!
//! Both are collective. Per destination rank one message is sent holding,
//! for each internal box to that rank in layout order, an element count
//! followed by the elements. Receivers walk their external boxes from that
//! rank in the same order, so element order within a rank pair is the
//! packing order. Where boxes of one `(rank, sub-domain, shift)` group
//! overlap, an element travels in the first of them only. Positions travel
//! already shifted into the receiver's frame. Boxes a rank holds for itself
//! (periodic images) are served without messaging.
//!
//! Message buffers live for one call only; the returned [`GhostPlan`] keeps
//! just the index bookkeeping `ghost_put` needs.

use std::collections::BTreeMap;
use std::ops::Range;

use bytemuck::Pod;
use hashbrown::HashMap;
use rayon::prelude::*;

use super::delta::Delta;
use super::storage::GhostStorage;
use super::{GhostBox, GhostLayout};
use crate::algs::collective::sparse_exchange;
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::wire::{WireReader, WireWriter, kind};
use crate::decomp_error::DecompError;
use crate::geometry::Point;
use crate::graph::CostGraph;

const GET_TAG: CommTag = CommTag(0x3000);
const PUT_TAG: CommTag = CommTag(0x3100);

/// Bookkeeping of one `ghost_get`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GhostPlan {
    pub version: u64,
    /// Owned element count at the time of the exchange.
    pub n_local: usize,
    /// Local element indices sent for each internal box, in packing order.
    pub sent: Vec<Vec<usize>>,
    /// Ghost index range filled by each external box.
    pub received: Vec<Range<usize>>,
}

impl GhostPlan {
    pub fn n_ghosts(&self) -> usize {
        self.received.last().map_or(0, |r| r.end)
    }
}

fn mismatch(rank: usize, reason: impl Into<String>) -> DecompError {
    DecompError::GhostPlanMismatch {
        rank,
        reason: reason.into(),
    }
}

/// Pairs the k-th external box a rank holds for itself with the k-th
/// internal box it holds for itself.
fn self_pairs<const D: usize>(layout: &GhostLayout<D>) -> Result<Vec<(usize, usize)>, DecompError> {
    let me = layout.rank;
    let ext: Vec<_> = layout.external_from(me).collect();
    let int: Vec<_> = layout.internal_to(me).collect();
    if ext.len() != int.len() {
        return Err(mismatch(me, format!("{} self images received, {} sent", ext.len(), int.len())));
    }
    ext.into_iter()
        .zip(int)
        .map(|((ei, e), (ii, i))| {
            if e.sort_key() == i.sort_key() {
                Ok((ei, ii))
            } else {
                Err(mismatch(me, format!("self image {ei} does not match {ii}")))
            }
        })
        .collect()
}

/// Index ranges of consecutive boxes sharing a group key.
fn groups<const D: usize>(boxes: &[GhostBox<D>]) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=boxes.len() {
        if i == boxes.len() || boxes[i].group_key() != boxes[start].group_key() {
            out.push(start..i);
            start = i;
        }
    }
    out
}

fn shifted<const D: usize>(p: &Point<D>, b: &GhostBox<D>, period: &[f64; D]) -> Point<D> {
    std::array::from_fn(|k| p[k] + b.shift[k] as f64 * period[k])
}

/// Open the message from `rank` and check version and box count.
fn open<'a>(
    bytes: &'a [u8],
    msg_kind: u16,
    rank: usize,
    version: u64,
    n_boxes: usize,
) -> Result<WireReader<'a>, DecompError> {
    let mut r = WireReader::expect_header(bytes, msg_kind)
        .ok_or_else(|| mismatch(rank, "bad header"))?;
    let v = r.get::<u64>().map(u64::from_le).ok_or_else(|| mismatch(rank, "truncated"))?;
    if v != version {
        return Err(mismatch(rank, format!("sender at version {v}, receiver at {version}")));
    }
    let n = r.get_count().ok_or_else(|| mismatch(rank, "truncated"))?;
    if n != n_boxes {
        return Err(mismatch(rank, format!("{n} boxes sent, {n_boxes} expected")));
    }
    Ok(r)
}

/// Push copies of local elements to every rank that holds them as ghosts and
/// replace this rank's ghosts with the copies it receives.
///
/// Collective. An element is sent for an internal box when it lies in the
/// box's sub-domain and inside the box (closed test).
pub fn ghost_get<C, S, const D: usize>(
    layout: &GhostLayout<D>,
    graph: &CostGraph<D>,
    storage: &mut S,
    comm: &C,
) -> Result<GhostPlan, DecompError>
where
    C: Communicator,
    S: GhostStorage<D> + Sync,
{
    let me = comm.rank();
    if layout.rank != me {
        return Err(mismatch(me, format!("layout built for rank {}", layout.rank)));
    }
    let period = graph.domain().extent();
    let store = &*storage;

    // bucket local elements by sub-domain
    let cells: Vec<Option<usize>> = (0..store.n_local())
        .into_par_iter()
        .map(|e| graph.locate(store.position(e)))
        .collect();
    let mut by_cell: HashMap<usize, Vec<usize>> = HashMap::new();
    for (e, c) in cells.into_iter().enumerate() {
        if let Some(c) = c {
            by_cell.entry(c).or_default().push(e);
        }
    }

    // each element once per group, in the first box holding it
    let sent: Vec<Vec<usize>> = groups(&layout.internal)
        .into_par_iter()
        .flat_map_iter(|g| {
            let boxes = &layout.internal[g];
            let mut out = vec![Vec::new(); boxes.len()];
            let members = boxes
                .first()
                .and_then(|b| by_cell.get(&b.sub_domain))
                .map_or(&[][..], Vec::as_slice);
            for &e in members {
                let p = store.position(e);
                if let Some(k) = boxes.iter().position(|b| b.region.contains_closed(p)) {
                    out[k].push(e);
                }
            }
            out
        })
        .collect();

    let mut outgoing: BTreeMap<usize, WireWriter> = BTreeMap::new();
    for q in layout.destinations() {
        let mut w = WireWriter::with_header(kind::GHOST_GET);
        w.put(&layout.version.to_le());
        w.put_count(layout.internal_to(q).count());
        outgoing.insert(q, w);
    }
    for (b, idx) in layout.internal.iter().zip(&sent) {
        let Some(w) = outgoing.get_mut(&b.rank) else {
            continue;
        };
        w.put_count(idx.len());
        for &e in idx {
            for x in shifted(store.position(e), b, &period) {
                w.put_f64(x);
            }
            w.put(store.value(e));
        }
    }
    let outgoing: BTreeMap<usize, Vec<u8>> =
        outgoing.into_iter().map(|(q, w)| (q, w.finish())).collect();

    let incoming = sparse_exchange(comm, GET_TAG, &outgoing, &layout.sources())?;

    let mut readers = HashMap::new();
    for (&q, bytes) in &incoming {
        let n = layout.external_from(q).count();
        readers.insert(q, open(bytes, kind::GHOST_GET, q, layout.version, n)?);
    }
    let self_int: HashMap<usize, usize> = self_pairs(layout)?.into_iter().collect();

    storage.clear_ghosts();
    let mut received = Vec::with_capacity(layout.external.len());
    for (i, b) in layout.external.iter().enumerate() {
        let start = storage.n_ghost();
        if b.rank == me {
            let ii = *self_int
                .get(&i)
                .ok_or_else(|| mismatch(me, format!("self image {i} has no source")))?;
            let src = &layout.internal[ii];
            for &e in &sent[ii] {
                let p = shifted(storage.position(e), src, &period);
                let v = *storage.value(e);
                storage.push_ghost(p, v);
            }
        } else {
            let r = readers
                .get_mut(&b.rank)
                .ok_or_else(|| mismatch(b.rank, "no message"))?;
            let n = r.get_count().ok_or_else(|| mismatch(b.rank, "truncated"))?;
            for _ in 0..n {
                let mut p = [0.0; D];
                for x in p.iter_mut() {
                    *x = r.get_f64().ok_or_else(|| mismatch(b.rank, "truncated"))?;
                }
                let v: S::Value = r.get().ok_or_else(|| mismatch(b.rank, "truncated"))?;
                storage.push_ghost(p, v);
            }
        }
        received.push(start..storage.n_ghost());
    }
    if let Some((&q, _)) = readers.iter().find(|(_, r)| !r.is_exhausted()) {
        return Err(mismatch(q, "trailing bytes"));
    }

    Ok(GhostPlan {
        version: layout.version,
        n_local: storage.n_local(),
        sent,
        received,
    })
}

/// Send every ghost's contribution back to its owner and fuse it with `Dl`.
///
/// Collective; `plan` must come from the latest `ghost_get` on `layout`,
/// and the owned elements must not have been removed or reordered since.
/// Such a change is reported as `GhostPlanMismatch` after the messages are
/// exchanged and before any value is fused. With [`CopyDelta`](super::CopyDelta) on unchanged ghosts this is a no-op
/// on the owners; with [`AddDelta`](super::AddDelta) it scatter-adds.
pub fn ghost_put<Dl, C, S, const D: usize>(
    layout: &GhostLayout<D>,
    plan: &GhostPlan,
    storage: &mut S,
    comm: &C,
) -> Result<(), DecompError>
where
    C: Communicator,
    S: GhostStorage<D>,
    Dl: Delta<S::Value>,
    Dl::Part: Pod,
{
    let me = comm.rank();
    if plan.version != layout.version {
        return Err(DecompError::StaleDecomposition {
            built: plan.version,
            current: layout.version,
        });
    }
    if plan.received.len() != layout.external.len()
        || plan.sent.len() != layout.internal.len()
        || plan.n_ghosts() > storage.n_ghost()
    {
        return Err(mismatch(me, "ghost plan does not match layout or storage"));
    }

    let mut outgoing: BTreeMap<usize, WireWriter> = BTreeMap::new();
    for q in layout.sources() {
        let mut w = WireWriter::with_header(kind::GHOST_PUT);
        w.put(&layout.version.to_le());
        w.put_count(layout.external_from(q).count());
        outgoing.insert(q, w);
    }
    for (b, range) in layout.external.iter().zip(&plan.received) {
        let Some(w) = outgoing.get_mut(&b.rank) else {
            continue;
        };
        w.put_count(range.len());
        for g in range.clone() {
            w.put(&Dl::restrict(storage.ghost_value(g)));
        }
    }
    let outgoing: BTreeMap<usize, Vec<u8>> =
        outgoing.into_iter().map(|(q, w)| (q, w.finish())).collect();

    let incoming = sparse_exchange(comm, PUT_TAG, &outgoing, &layout.destinations())?;

    // nothing is fused until every check and every message has passed
    check_local_set(layout, plan, storage, me)?;

    let mut readers = HashMap::new();
    for (&q, bytes) in &incoming {
        let n = layout.internal_to(q).count();
        readers.insert(q, open(bytes, kind::GHOST_PUT, q, layout.version, n)?);
    }
    let self_ext: HashMap<usize, usize> = self_pairs(layout)?
        .into_iter()
        .map(|(ei, ii)| (ii, ei))
        .collect();

    let mut updates: Vec<(usize, Dl::Part)> = Vec::new();
    for (i, b) in layout.internal.iter().enumerate() {
        let targets = &plan.sent[i];
        if b.rank == me {
            let ei = *self_ext
                .get(&i)
                .ok_or_else(|| mismatch(me, format!("self image {i} has no target")))?;
            let range = plan.received[ei].clone();
            if range.len() != targets.len() {
                return Err(mismatch(me, "self image size changed"));
            }
            updates.extend(
                range
                    .zip(targets)
                    .map(|(g, &e)| (e, Dl::restrict(storage.ghost_value(g)))),
            );
            continue;
        }
        let r = readers
            .get_mut(&b.rank)
            .ok_or_else(|| mismatch(b.rank, "no message"))?;
        let n = r.get_count().ok_or_else(|| mismatch(b.rank, "truncated"))?;
        if n != targets.len() {
            return Err(mismatch(b.rank, format!("{n} values for {} elements", targets.len())));
        }
        for &e in targets {
            let part: Dl::Part = r.get().ok_or_else(|| mismatch(b.rank, "truncated"))?;
            updates.push((e, part));
        }
    }
    if let Some((&q, _)) = readers.iter().find(|(_, r)| !r.is_exhausted()) {
        return Err(mismatch(q, "trailing bytes"));
    }
    for (e, part) in updates {
        Dl::fuse(storage.value_mut(e), part);
    }
    Ok(())
}

/// The owned elements must be the ones `ghost_get` packed: same count, and
/// every sent element still inside the box it was sent for.
fn check_local_set<S: GhostStorage<D>, const D: usize>(
    layout: &GhostLayout<D>,
    plan: &GhostPlan,
    storage: &S,
    me: usize,
) -> Result<(), DecompError> {
    let n_local = storage.n_local();
    if plan.n_local != n_local {
        return Err(mismatch(
            me,
            format!("{} local elements at ghost_get, {n_local} now", plan.n_local),
        ));
    }
    for (b, idx) in layout.internal.iter().zip(&plan.sent) {
        if let Some(&e) = idx
            .iter()
            .find(|&&e| e >= n_local || !b.region.contains_closed(storage.position(e)))
        {
            return Err(mismatch(me, format!("local element {e} moved since ghost_get")));
        }
    }
    Ok(())
}
