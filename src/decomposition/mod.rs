//! The decomposition session: cost graph, active assignment and ghost layout
//! of one process.
//!
//! A [`CartDecomposition`] owns its communicator for its whole lifetime and
//! threads it through every collective. `distribute`, `refine`, `unbalance`,
//! `ghost_get` and `ghost_put` are collective: every rank must call them in
//! the same order.
//!
//! Each successful `distribute` or `refine` installs a new
//! [`ActiveDecomposition`] with the next version number and drops the ghost
//! layout and plan built for the previous one. Failed calls install nothing.
//!
//! ```
//! use cart_decomp::algs::NoComm;
//! use cart_decomp::decomposition::{CartDecomposition, DecompositionConfig};
//! use cart_decomp::geometry::Aabb;
//!
//! let cfg = DecompositionConfig::new(Aabb::new([0.0; 2], [1.0; 2]), [4, 4]).on_test();
//! let mut dec = CartDecomposition::new(cfg, NoComm).unwrap();
//! dec.distribute().unwrap();
//! assert_eq!(dec.ndec(), 1);
//! assert_eq!(dec.n_owned_sub_domains(), 16);
//! ```

pub mod config;

pub use config::{DecompositionConfig, TEST_SEED};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytemuck::Pod;
use log::{debug, info, warn};

use crate::algs::collective::all_reduce_sum_vec;
use crate::algs::communicator::{CommTag, Communicator};
use crate::decomp_error::DecompError;
use crate::geometry::{Aabb, Point};
use crate::ghost::{self, Delta, GhostBox, GhostLayout, GhostPlan, GhostStorage};
use crate::graph::{CartGrid, CostGraph, CostModel};
use crate::io::{SubDomainRecord, VtkWriter};
use crate::partitioning::{Assignment, Partitioner, Strategy, StrategyKind, metrics};

const UNBALANCE_TAG: CommTag = CommTag(0x4000);

/// One installed decomposition. Replaced as a whole, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDecomposition {
    pub version: u64,
    pub assignment: Assignment,
}

#[derive(Debug, Clone)]
pub struct CartDecomposition<const D: usize, C: Communicator> {
    cfg: DecompositionConfig<D>,
    comm: C,
    graph: CostGraph<D>,
    strategy: Strategy,
    ndec: u64,
    current: Option<Arc<ActiveDecomposition>>,
    ghosts: Option<Arc<GhostLayout<D>>>,
    plan: Option<GhostPlan>,
}

impl<const D: usize, C: Communicator> CartDecomposition<D, C> {
    /// Build the cost graph of `cfg` with neutral costs. No assignment is
    /// installed until [`distribute`](Self::distribute).
    pub fn new(cfg: DecompositionConfig<D>, comm: C) -> Result<Self, DecompError> {
        cfg.validate()?;
        let grid = CartGrid::new(cfg.resolution)?;
        let graph = CostGraph::cartesian(grid, cfg.domain, cfg.boundary)?;
        let solver = cfg.partitioner_config(comm.size());
        solver.validate()?;
        let strategy = Strategy::new(cfg.strategy, solver);
        Ok(Self {
            cfg,
            comm,
            graph,
            strategy,
            ndec: 0,
            current: None,
            ghosts: None,
            plan: None,
        })
    }

    pub fn config(&self) -> &DecompositionConfig<D> {
        &self.cfg
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn graph(&self) -> &CostGraph<D> {
        &self.graph
    }

    /// Number of decompositions installed so far.
    pub fn ndec(&self) -> u64 {
        self.ndec
    }

    pub fn set_computation_cost(&mut self, id: usize, w: f64) -> Result<(), DecompError> {
        self.graph.set_computation_cost(id, w)
    }

    pub fn set_migration_cost(&mut self, id: usize, w: f64) -> Result<(), DecompError> {
        self.graph.set_migration_cost(id, w)
    }

    pub fn set_communication_cost(
        &mut self,
        id: usize,
        neighbor: usize,
        w: f64,
    ) -> Result<(), DecompError> {
        self.graph.set_communication_cost(id, neighbor, w)
    }

    /// Re-weight the whole graph from `model`. Local; takes effect at the
    /// next `distribute` or `refine`.
    pub fn apply_cost_model<M: CostModel<D> + ?Sized>(
        &mut self,
        model: &M,
    ) -> Result<(), DecompError> {
        self.graph.apply_cost_model(model)
    }

    /// Fresh decomposition of the current costs. Collective.
    pub fn distribute(&mut self) -> Result<(), DecompError> {
        self.strategy.config_mut().rng_seed = self.cfg.seed_for(self.ndec + 1);
        let assignment = self.strategy.decompose(&self.graph, &self.comm)?;
        let u = self.local_unbalance(&assignment);
        self.install(assignment);
        info!(
            "rank {}: decomposition {} installed ({:?}, unbalance {:.4})",
            self.rank(),
            self.ndec,
            self.strategy.kind(),
            u
        );
        Ok(())
    }

    /// Re-weight the graph from `model`, then rebalance. Collective.
    pub fn refine_with<M: CostModel<D> + ?Sized>(&mut self, model: &M) -> Result<(), DecompError> {
        self.apply_cost_model(model)?;
        self.refine()
    }

    /// Rebalance the current costs, biased toward the installed assignment.
    /// Falls back to [`distribute`](Self::distribute) when nothing is
    /// installed yet. Collective.
    ///
    /// The result is installed even when it does not lower the unbalance.
    pub fn refine(&mut self) -> Result<(), DecompError> {
        let Some(previous) = self.current.clone() else {
            return self.distribute();
        };
        self.strategy.config_mut().rng_seed = self.cfg.seed_for(self.ndec + 1);
        let assignment = self
            .strategy
            .refine(&self.graph, &previous.assignment, &self.comm)?;
        let before = self.local_unbalance(&previous.assignment);
        let after = self.local_unbalance(&assignment);
        let migrated = metrics::migrated_volume(
            &self.graph,
            previous.assignment.owners(),
            assignment.owners(),
        );
        self.install(assignment);
        info!(
            "rank {}: decomposition {} refined, unbalance {:.4} -> {:.4}, migrated {:.1}",
            self.rank(),
            self.ndec,
            before,
            after,
            migrated
        );
        if after > before {
            warn!(
                "rank {}: rebalance {} raised unbalance from {:.4} to {:.4}",
                self.rank(),
                self.ndec,
                before,
                after
            );
        }
        Ok(())
    }

    fn install(&mut self, assignment: Assignment) {
        self.ndec += 1;
        self.current = Some(Arc::new(ActiveDecomposition {
            version: self.ndec,
            assignment,
        }));
        self.ghosts = None;
        self.plan = None;
    }

    /// Unbalance of `a` under this rank's view of the costs. Used for logging
    /// only, so it never communicates.
    fn local_unbalance(&self, a: &Assignment) -> f64 {
        metrics::unbalance(&metrics::part_loads(&self.graph, a.owners(), a.n_parts()))
    }

    fn active(&self) -> Result<&ActiveDecomposition, DecompError> {
        self.current.as_deref().ok_or(DecompError::NotDecomposed)
    }

    /// `(max - avg) / avg` of the per-process computation cost. Collective
    /// when there is one part per process; otherwise evaluated on the local
    /// graph, which every rank holds identically.
    pub fn unbalance(&self) -> Result<f64, DecompError> {
        let active = self.active()?;
        let a = &active.assignment;
        let loads = if a.n_parts() == self.comm.size() {
            let mut mine = vec![0.0; a.n_parts()];
            mine[self.rank()] = a
                .members(self.rank())
                .map(|id| self.graph.sub_domains()[id].computation)
                .sum();
            all_reduce_sum_vec(&self.comm, UNBALANCE_TAG, &mine)?
        } else {
            metrics::part_loads(&self.graph, a.owners(), a.n_parts())
        };
        Ok(metrics::unbalance(&loads))
    }

    /// Snapshot of the installed decomposition, if any.
    pub fn get_decomposition(&self) -> Option<Arc<ActiveDecomposition>> {
        self.current.clone()
    }

    pub fn assignment(&self) -> Result<&Assignment, DecompError> {
        Ok(&self.active()?.assignment)
    }

    /// Sub-domains owned by this rank, ascending. Empty before `distribute`.
    pub fn owned_sub_domains(&self) -> Vec<usize> {
        match self.current.as_deref() {
            Some(a) => a.assignment.members(self.rank()).collect(),
            None => Vec::new(),
        }
    }

    pub fn n_owned_sub_domains(&self) -> usize {
        self.current
            .as_deref()
            .map_or(0, |a| a.assignment.members(self.rank()).count())
    }

    pub fn sub_domain_box(&self, id: usize) -> Result<Aabb<D>, DecompError> {
        self.graph.sub_domain_box(id)
    }

    pub fn sub_domain_center(&self, id: usize) -> Result<Point<D>, DecompError> {
        Ok(self.graph.sub_domain(id)?.center)
    }

    /// Owner of the sub-domain containing `p`, wrapping periodic axes.
    pub fn owner_of_point(&self, p: &Point<D>) -> Option<usize> {
        let id = self.graph.locate(p)?;
        self.current.as_deref()?.assignment.owner(id)
    }

    /// Whether `p`, taken as is, lies in a sub-domain of this rank. Points
    /// outside the domain are never local.
    pub fn is_local(&self, p: &Point<D>) -> bool {
        self.graph.domain().contains_closed(p) && self.owner_of_point(p) == Some(self.rank())
    }

    /// Like [`is_local`](Self::is_local), but a point outside a periodic
    /// axis is first wrapped back into the domain.
    pub fn is_local_bc(&self, p: &Point<D>) -> bool {
        self.owner_of_point(p) == Some(self.rank())
    }

    /// Compute the ghost boxes of the installed decomposition. Local.
    pub fn build_ghosts(&mut self) -> Result<(), DecompError> {
        let active = self.active()?;
        let layout = ghost::build_ghost_layout(
            &self.graph,
            &active.assignment,
            self.rank(),
            &self.cfg.ghost_width,
            active.version,
        )?;
        debug!(
            "rank {}: {} external, {} internal ghost boxes for decomposition {}",
            self.rank(),
            layout.external.len(),
            layout.internal.len(),
            layout.version
        );
        self.ghosts = Some(Arc::new(layout));
        self.plan = None;
        Ok(())
    }

    /// Ghost layout of the installed decomposition.
    pub fn ghost_layout(&self) -> Result<Arc<GhostLayout<D>>, DecompError> {
        let layout = self.ghosts.as_ref().ok_or(DecompError::GhostNotBuilt(self.ndec))?;
        if layout.version != self.ndec {
            return Err(DecompError::StaleDecomposition {
                built: layout.version,
                current: self.ndec,
            });
        }
        Ok(Arc::clone(layout))
    }

    pub fn external_ghost_boxes(&self) -> Result<Vec<GhostBox<D>>, DecompError> {
        Ok(self.ghost_layout()?.external.clone())
    }

    pub fn internal_ghost_boxes(&self) -> Result<Vec<GhostBox<D>>, DecompError> {
        Ok(self.ghost_layout()?.internal.clone())
    }

    pub fn n_external_ghost_boxes(&self) -> Result<usize, DecompError> {
        Ok(self.ghost_layout()?.external.len())
    }

    pub fn external_ghost_box(&self, i: usize) -> Result<GhostBox<D>, DecompError> {
        let layout = self.ghost_layout()?;
        layout.external.get(i).cloned().ok_or_else(|| {
            DecompError::InvalidConfig(format!(
                "external ghost box {i} requested, {} exist",
                layout.external.len()
            ))
        })
    }

    pub fn external_ghost_box_owner(&self, i: usize) -> Result<usize, DecompError> {
        Ok(self.external_ghost_box(i)?.rank)
    }

    /// Replace the ghosts in `storage` with fresh copies from their owners.
    /// Collective.
    pub fn ghost_get<S>(&mut self, storage: &mut S) -> Result<(), DecompError>
    where
        S: GhostStorage<D> + Sync,
    {
        let layout = self.ghost_layout()?;
        let plan = ghost::ghost_get(&layout, &self.graph, storage, &self.comm)?;
        self.plan = Some(plan);
        Ok(())
    }

    /// Return the ghost values of the latest `ghost_get` to their owners,
    /// merged with `Dl`. Collective.
    pub fn ghost_put<Dl, S>(&mut self, storage: &mut S) -> Result<(), DecompError>
    where
        S: GhostStorage<D>,
        Dl: Delta<S::Value>,
        Dl::Part: Pod,
    {
        let layout = self.ghost_layout()?;
        let plan = self.plan.as_ref().ok_or(DecompError::NoGhostExchange(self.ndec))?;
        if plan.version != self.ndec {
            return Err(DecompError::StaleDecomposition {
                built: plan.version,
                current: self.ndec,
            });
        }
        ghost::ghost_put::<Dl, _, _, D>(&layout, plan, storage, &self.comm)
    }

    /// One record per sub-domain, for diagnostics.
    pub fn records(&self) -> Result<Vec<SubDomainRecord<D>>, DecompError> {
        let a = self.assignment()?;
        self.graph
            .sub_domains()
            .iter()
            .map(|sd| {
                Ok(SubDomainRecord {
                    id: sd.id,
                    owner: a.owner(sd.id).ok_or(DecompError::UnknownSubDomain {
                        id: sd.id,
                        len: a.len(),
                    })?,
                    computation: sd.computation,
                    bounds: self.graph.sub_domain_box(sd.id)?,
                })
            })
            .collect()
    }
}

impl<const D: usize, C: Communicator> CartDecomposition<D, C> {
    /// Write this rank's view of the decomposition to `dir/{stem}_{rank}.vtk`.
    pub fn write_vtk(&self, dir: &Path, stem: &str) -> Result<PathBuf, DecompError> {
        VtkWriter::write_rank_file(dir, stem, self.rank(), &self.records()?)
    }
}

/// Equal when configuration, costs and installed decomposition match.
impl<const D: usize, C: Communicator> PartialEq for CartDecomposition<D, C> {
    fn eq(&self, other: &Self) -> bool {
        self.cfg == other.cfg
            && self.ndec == other.ndec
            && self.graph == other.graph
            && self.current.as_deref() == other.current.as_deref()
    }
}
