use crate::partition::{ExhaustivePartition, NoWorkersError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How the runner hands out iterations to workers.
///
/// A scenario picks its plan with [crate::prelude::ScenarioDefinitionBuilder::use_iteration_plan],
/// usually after loading its data in the setup hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IterationPlan {
    /// Walk a catalog exactly once, split between the workers.
    Partitioned { catalog_size: usize },
    /// Run `total` iterations between all workers, whichever worker is free takes the next one.
    Shared { total: usize },
    /// Keep iterating until the run ends.
    #[default]
    Unbounded,
}

/// One unit of work handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    worker: usize,
    sequence: usize,
    catalog_index: Option<usize>,
}

impl Iteration {
    pub fn new(worker: usize, sequence: usize, catalog_index: Option<usize>) -> Self {
        Self {
            worker,
            sequence,
            catalog_index,
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// The position of this iteration among the iterations the worker has been handed.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// The catalog entry this iteration works on, when the plan partitions a catalog.
    pub fn catalog_index(&self) -> Option<usize> {
        self.catalog_index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextIteration {
    Run(Iteration),
    /// The worker's block has no entry here. Skip it without running the behaviour.
    NoOp,
    Exhausted,
}

/// Hands out iterations according to an [IterationPlan].
///
/// An optional cap limits how many iterations each worker is handed, whatever the plan.
#[derive(Debug)]
pub struct IterationSource {
    plan: IterationPlan,
    partition: Option<ExhaustivePartition>,
    per_worker_cap: Option<usize>,
    shared_taken: AtomicUsize,
}

impl IterationSource {
    pub fn new(
        plan: IterationPlan,
        worker_count: usize,
        per_worker_cap: Option<usize>,
    ) -> Result<Self, NoWorkersError> {
        let partition = match plan {
            IterationPlan::Partitioned { catalog_size } => {
                Some(ExhaustivePartition::new(catalog_size, worker_count)?)
            }
            _ => None,
        };

        Ok(Self {
            plan,
            partition,
            per_worker_cap,
            shared_taken: AtomicUsize::new(0),
        })
    }

    pub fn plan(&self) -> IterationPlan {
        self.plan
    }

    /// The iteration to run for `worker` after it has been handed `sequence` iterations.
    pub fn next(&self, worker: usize, sequence: usize) -> NextIteration {
        if self.per_worker_cap.is_some_and(|cap| sequence >= cap) {
            return NextIteration::Exhausted;
        }

        match (self.plan, &self.partition) {
            (IterationPlan::Partitioned { .. }, Some(partition)) => {
                if sequence >= partition.iterations_per_worker() {
                    return NextIteration::Exhausted;
                }

                match partition.resolve(worker, sequence) {
                    Some(index) => NextIteration::Run(Iteration::new(worker, sequence, Some(index))),
                    None => NextIteration::NoOp,
                }
            }
            (IterationPlan::Shared { total }, _) => {
                let taken = self.shared_taken.fetch_add(1, Ordering::AcqRel);
                if taken < total {
                    NextIteration::Run(Iteration::new(worker, sequence, None))
                } else {
                    NextIteration::Exhausted
                }
            }
            _ => NextIteration::Run(Iteration::new(worker, sequence, None)),
        }
    }
}
