use crate::worker::CacheStatus;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QueueEvent {
    ActionsQueued { action_count: u64 },
    ActionReady { owner: String, mnemonic: String },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerEvent {
    ActionStarted {
        owner: String,
        mnemonic: String,
        strategy: String,
    },
    ActionCompleted {
        owner: String,
        key: String,
        cache_status: CacheStatus,
    },
    ActionFailed {
        owner: String,
        error: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SandboxEvent {
    SandboxCreated { path: PathBuf },
    SandboxRemoved { path: PathBuf },
    SandboxKept { path: PathBuf },
    SandboxCleanupFailed { path: PathBuf, error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CacheEvent {
    CacheHit { key: String },
    CacheMiss { key: String },
    CacheStored { key: String },
    CacheEntryCorrupted { key: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkflowEvent {
    BuildStarted(std::time::Instant),
    BuildCompleted(std::time::Instant),
    BuildAborted,
    Shutdown,
}

impl WorkflowEvent {
    pub(crate) fn build_completed() -> Self {
        Self::BuildCompleted(std::time::Instant::now())
    }
    pub(crate) fn build_started() -> Self {
        Self::BuildStarted(std::time::Instant::now())
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    /// The "nothing happened" event.
    #[default]
    Noop,
    QueueEvent(QueueEvent),
    WorkerEvent(WorkerEvent),
    SandboxEvent(SandboxEvent),
    CacheEvent(CacheEvent),
    WorkflowEvent(WorkflowEvent),
}

impl From<QueueEvent> for Event {
    fn from(value: QueueEvent) -> Self {
        Event::QueueEvent(value)
    }
}

impl From<WorkerEvent> for Event {
    fn from(value: WorkerEvent) -> Self {
        Event::WorkerEvent(value)
    }
}

impl From<SandboxEvent> for Event {
    fn from(value: SandboxEvent) -> Self {
        Event::SandboxEvent(value)
    }
}

impl From<CacheEvent> for Event {
    fn from(value: CacheEvent) -> Self {
        Event::CacheEvent(value)
    }
}

impl From<WorkflowEvent> for Event {
    fn from(value: WorkflowEvent) -> Self {
        Event::WorkflowEvent(value)
    }
}
