//! Engine configuration.

use std::cell::RefCell;
use std::sync::OnceLock;

thread_local! {
    static CURRENT: RefCell<Option<EngineConfig>> = const { RefCell::new(None) };
}

/// Knobs for how stages spawn their tasks.
///
/// Every stage runs on dedicated OS threads; these settings control how those
/// threads are named and sized, and how many workers
/// [`Transformer::concurrently_default`](crate::Transformer::concurrently_default)
/// launches.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Prefix for stage thread names (`<prefix>-<stage>-<role>`).
    pub thread_prefix: String,
    /// Stack size for stage threads; `None` uses the platform default.
    pub stack_size: Option<usize>,
    /// Worker count for fan-out stages that don't specify one.
    pub default_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_prefix: "tablestream".to_string(),
            stack_size: None,
            default_concurrency: num_cpus::get().max(1),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn with_default_concurrency(mut self, workers: usize) -> Self {
        self.default_concurrency = workers.max(1);
        self
    }

    /// The process-wide defaults used by [`transform`](crate::transform).
    pub fn global() -> &'static EngineConfig {
        static GLOBAL: OnceLock<EngineConfig> = OnceLock::new();
        GLOBAL.get_or_init(EngineConfig::default)
    }

    /// The configuration of the stage running on this thread, or
    /// [`global`](Self::global) outside of any stage.
    ///
    /// Transforms that spawn threads or build nested stages use this so they
    /// follow the config given to [`transform_with`](crate::transform_with).
    pub fn current() -> EngineConfig {
        CURRENT
            .with(|current| current.borrow().clone())
            .unwrap_or_else(|| Self::global().clone())
    }

    /// Make `self` the [`current`](Self::current) config of this thread until
    /// the guard is dropped.
    pub(crate) fn enter(&self) -> CurrentGuard {
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        CurrentGuard { previous }
    }

    pub(crate) fn thread_builder(&self, name: String) -> std::thread::Builder {
        let builder = std::thread::Builder::new().name(name);
        match self.stack_size {
            Some(bytes) => builder.stack_size(bytes),
            None => builder,
        }
    }
}

pub(crate) struct CurrentGuard {
    previous: Option<EngineConfig>,
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}
