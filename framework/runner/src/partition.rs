/// Splits a catalog of `catalog_size` entries between `worker_count` workers so that every entry
/// is visited exactly once.
///
/// Each worker owns a contiguous block of `ceil(catalog_size / worker_count)` indices. When the
/// catalog does not divide evenly the trailing workers get a short block, or none at all, and
/// their extra iterations resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExhaustivePartition {
    catalog_size: usize,
    worker_count: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Cannot partition a catalog between zero workers")]
pub struct NoWorkersError;

impl ExhaustivePartition {
    pub fn new(catalog_size: usize, worker_count: usize) -> Result<Self, NoWorkersError> {
        if worker_count == 0 {
            return Err(NoWorkersError);
        }

        Ok(Self {
            catalog_size,
            worker_count,
        })
    }

    pub fn catalog_size(&self) -> usize {
        self.catalog_size
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// The number of iterations each worker runs.
    pub fn iterations_per_worker(&self) -> usize {
        self.catalog_size.div_ceil(self.worker_count)
    }

    /// The catalog index for a worker's `iteration`, counting from zero.
    ///
    /// `None` means the iteration has no entry and should be skipped.
    pub fn resolve(&self, worker: usize, iteration: usize) -> Option<usize> {
        let per_worker = self.iterations_per_worker();
        if worker >= self.worker_count || iteration >= per_worker {
            return None;
        }

        let global = worker * per_worker + iteration;
        (global < self.catalog_size).then_some(global)
    }
}
