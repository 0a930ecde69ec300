use super::*;
use futures::stream::{FuturesUnordered, StreamExt};
use std::marker::PhantomData;
use tokio_util::task::LocalPoolHandle;
use tracing::*;

/// The WorkerPool spins up a pool of workers that can execute work.
///
/// This pool is _lazy_ and will only spin up workers at execution time. However, at that time it
/// is _eager_, and will spin up exactly as many workers as it was asked for, the main worker
/// included.
///
#[derive(Debug)]
pub struct WorkerPool<W: Worker> {
    worker_pool: LocalPoolHandle,
    ctx: W::Context,
    _worker: PhantomData<W>,
}

impl<W> WorkerPool<W>
where
    W: Worker + 'static,
    W::Context: std::fmt::Debug + 'static,
{
    #[tracing::instrument(name = "WorkerPool::from_shared_context", skip(ctx))]
    pub fn from_shared_context(ctx: W::Context, workers: usize) -> Self {
        Self {
            worker_pool: LocalPoolHandle::new(workers.max(1)),
            ctx,
            _worker: PhantomData,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.worker_pool.num_threads()
    }

    /// Run workers until every action reached a terminal state.
    ///
    /// A worker that errors or panics shuts the others down, and its error is returned.
    ///
    #[tracing::instrument(name = "WorkerPool::execute", skip(self))]
    pub async fn execute(&self) -> Result<BuildResults, WorkerPoolError> {
        let results = self.ctx.results()?;
        if results.is_empty() {
            return Ok(results);
        }

        let mut worker_tasks = FuturesUnordered::new();
        worker_tasks.push(self.spawn_worker(Role::MainWorker));

        // NOTE: we are skipping the 1st thread since that's the main worker.
        for worker_id in 1..self.worker_pool.num_threads() {
            worker_tasks.push(self.spawn_worker(Role::HelperWorker(worker_id)));
        }

        let mut first_error = None;
        while let Some(task_result) = worker_tasks.next().await {
            let worker_result = task_result
                .map_err(|err| WorkerPoolError::WorkerPanicked(err.to_string()))
                .and_then(|result| result);
            if let Err(err) = worker_result {
                error!("Worker stopped early: {}", err);
                self.ctx.shutdown();
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        let results = self.ctx.results()?;
        debug!(
            "Executed {} actions, {} from cache",
            results.executed().len(),
            results.cache_hits().len()
        );
        Ok(results)
    }

    fn spawn_worker(&self, role: Role) -> tokio::task::JoinHandle<Result<(), WorkerPoolError>> {
        let ctx = self.ctx.clone();
        self.worker_pool.spawn_pinned(move || async move {
            let mut worker = W::new(role, ctx)?;
            worker.run().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ActionGraph;
    use crate::sync::{Arc, Mutex};
    use std::time::Duration;

    /// A context that hands out a fixed list of "actions" and remembers who ran what.
    #[derive(Clone, Debug)]
    struct CountingContext {
        graph: Arc<ActionGraph>,
        remaining: Arc<Mutex<Vec<usize>>>,
        ran: Arc<Mutex<Vec<(Role, usize)>>>,
        coordinator: Arc<Coordinator>,
    }

    impl CountingContext {
        fn new(graph: ActionGraph) -> Self {
            let len = graph.len();
            Self {
                graph: Arc::new(graph),
                remaining: Arc::new(Mutex::new((0..len).collect())),
                ran: Arc::new(Mutex::new(vec![])),
                coordinator: Arc::new(Coordinator::new()),
            }
        }
    }

    impl Context for CountingContext {
        fn results(&self) -> Result<BuildResults, WorkerError> {
            Ok(ReadinessTracker::new(self.graph.clone()).results())
        }

        fn shutdown(&self) {
            self.coordinator.signal_shutdown();
        }
    }

    #[derive(Debug)]
    struct CountingWorker {
        role: Role,
        ctx: CountingContext,
    }

    #[async_trait(?Send)]
    impl Worker for CountingWorker {
        type Context = CountingContext;

        fn new(role: Role, ctx: Self::Context) -> Result<Self, WorkerError> {
            Ok(Self { role, ctx })
        }

        async fn run(&mut self) -> Result<(), WorkerError> {
            while self.ctx.coordinator.should_run() {
                tokio::time::sleep(Duration::from_micros(10)).await;
                let next = self.ctx.remaining.lock().unwrap().pop();
                match next {
                    Some(n) => self.ctx.ran.lock().unwrap().push((self.role, n)),
                    None if self.role.is_main_worker() => self.ctx.coordinator.signal_shutdown(),
                    None => (),
                }
            }
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingWorker;

    #[async_trait(?Send)]
    impl Worker for FailingWorker {
        type Context = CountingContext;

        fn new(_role: Role, _ctx: Self::Context) -> Result<Self, WorkerError> {
            Ok(FailingWorker)
        }

        async fn run(&mut self) -> Result<(), WorkerError> {
            Err(WorkerError::StatePoisoned)
        }
    }

    /// Helpers panic right away, the main worker waits for someone to shut it down.
    #[derive(Debug)]
    struct PanickingHelper {
        role: Role,
        ctx: CountingContext,
    }

    #[async_trait(?Send)]
    impl Worker for PanickingHelper {
        type Context = CountingContext;

        fn new(role: Role, ctx: Self::Context) -> Result<Self, WorkerError> {
            Ok(Self { role, ctx })
        }

        async fn run(&mut self) -> Result<(), WorkerError> {
            if !self.role.is_main_worker() {
                panic!("helper blew up");
            }
            while self.ctx.coordinator.should_run() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Ok(())
        }
    }

    fn chain(len: usize) -> ActionGraph {
        crate::graph::testing::RandomDag {
            prerequisites: (0..len).map(|_| vec![]).collect(),
        }
        .graph()
    }

    #[tokio::test]
    async fn executing_an_empty_graph_yields_empty_results() {
        let ctx = CountingContext::new(ActionGraph::builder().build().unwrap());
        let pool: WorkerPool<CountingWorker> = WorkerPool::from_shared_context(ctx.clone(), 4);
        let results = pool.execute().await.unwrap();
        assert!(results.is_empty());
        assert!(ctx.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_unit_of_work_runs_exactly_once() {
        let ctx = CountingContext::new(chain(12));
        let pool: WorkerPool<CountingWorker> = WorkerPool::from_shared_context(ctx.clone(), 3);
        assert_eq!(pool.num_workers(), 3);

        let results = pool.execute().await.unwrap();
        assert_eq!(results.len(), 12);

        let mut ran: Vec<usize> = ctx.ran.lock().unwrap().iter().map(|(_, n)| *n).collect();
        ran.sort();
        assert_eq!(ran, (0..12).collect::<Vec<usize>>());
        assert!(ctx.coordinator.should_shutdown());
    }

    #[tokio::test]
    async fn asking_for_zero_workers_still_runs_the_main_worker() {
        let ctx = CountingContext::new(chain(2));
        let pool: WorkerPool<CountingWorker> = WorkerPool::from_shared_context(ctx.clone(), 0);
        pool.execute().await.unwrap();
        assert!(ctx
            .ran
            .lock()
            .unwrap()
            .iter()
            .all(|(role, _)| *role == Role::MainWorker));
    }

    #[tokio::test]
    async fn worker_errors_are_reported() {
        let ctx = CountingContext::new(chain(1));
        let pool: WorkerPool<FailingWorker> = WorkerPool::from_shared_context(ctx, 2);
        let err = pool.execute().await.unwrap_err();
        assert_matches::assert_matches!(
            err,
            WorkerPoolError::WorkerError(WorkerError::StatePoisoned)
        );
    }

    #[tokio::test]
    async fn a_panicking_worker_stops_the_others() {
        let ctx = CountingContext::new(chain(1));
        let pool: WorkerPool<PanickingHelper> = WorkerPool::from_shared_context(ctx.clone(), 2);
        let err = tokio::time::timeout(Duration::from_secs(10), pool.execute())
            .await
            .unwrap()
            .unwrap_err();
        assert_matches::assert_matches!(err, WorkerPoolError::WorkerPanicked(_));
        assert!(ctx.coordinator.should_shutdown());
    }
}
