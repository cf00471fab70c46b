//! Ordered, cancellable hook pipelines around resource lifecycle operations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// Result of one hook: continue with (possibly changed) data, or stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome<T> {
    Proceed(T),
    Halt { reason: String },
}

impl<T> HookOutcome<T> {
    #[must_use]
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed(_))
    }

    #[must_use]
    pub fn halt(reason: impl Into<String>) -> Self {
        Self::Halt {
            reason: reason.into(),
        }
    }
}

type HookFn<T> = Arc<dyn Fn(T) -> HookOutcome<T> + Send + Sync>;

/// Hooks run in registration order; the first `Halt` ends the run.
pub struct HookPipeline<T> {
    hooks: Vec<(String, HookFn<T>)>,
}

impl<T> Default for HookPipeline<T> {
    fn default() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl<T> Clone for HookPipeline<T> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<T> fmt::Debug for HookPipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(name, _)| name))
            .finish()
    }
}

impl<T> HookPipeline<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: Fn(T) -> HookOutcome<T> + Send + Sync + 'static,
    {
        self.hooks.push((name.into(), Arc::new(hook)));
    }

    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(T) -> HookOutcome<T> + Send + Sync + 'static,
    {
        self.push(name, hook);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    #[must_use]
    pub fn run(&self, data: T) -> HookOutcome<T> {
        let mut current = data;
        for (name, hook) in &self.hooks {
            match hook(current) {
                HookOutcome::Proceed(next) => current = next,
                HookOutcome::Halt { reason } => {
                    debug!(hook = %name, reason = %reason, "Hook halted pipeline");
                    return HookOutcome::Halt { reason };
                }
            }
        }
        HookOutcome::Proceed(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    BeforeCreate,
    AfterCreate,
    BeforeRead,
    AfterRead,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    BeforeList,
    AfterList,
}

impl LifecycleStage {
    /// Before-stages may veto the operation.
    #[must_use]
    pub fn is_before(self) -> bool {
        matches!(
            self,
            Self::BeforeCreate
                | Self::BeforeRead
                | Self::BeforeUpdate
                | Self::BeforeDelete
                | Self::BeforeList
        )
    }
}

/// One pipeline per lifecycle stage. Stages without hooks pass data through.
pub struct LifecycleHooks<T> {
    stages: HashMap<LifecycleStage, HookPipeline<T>>,
}

impl<T> Default for LifecycleHooks<T> {
    fn default() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }
}

impl<T> LifecycleHooks<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on<F>(mut self, stage: LifecycleStage, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(T) -> HookOutcome<T> + Send + Sync + 'static,
    {
        self.stages.entry(stage).or_default().push(name, hook);
        self
    }

    #[must_use]
    pub fn run(&self, stage: LifecycleStage, data: T) -> HookOutcome<T> {
        match self.stages.get(&stage) {
            Some(pipeline) => pipeline.run(data),
            None => HookOutcome::Proceed(data),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn pipeline_threads_data_in_order() {
        let pipeline = HookPipeline::new()
            .with("double", |n: i32| HookOutcome::Proceed(n * 2))
            .with("plus_one", |n: i32| HookOutcome::Proceed(n + 1));
        assert_eq!(pipeline.run(5), HookOutcome::Proceed(11));
    }

    #[test]
    fn halt_short_circuits() {
        let later = Arc::new(AtomicUsize::new(0));
        let counter = later.clone();
        let pipeline = HookPipeline::new()
            .with("guard", |n: i32| {
                if n < 0 {
                    HookOutcome::halt("negative")
                } else {
                    HookOutcome::Proceed(n)
                }
            })
            .with("count", move |n: i32| {
                counter.fetch_add(1, Ordering::SeqCst);
                HookOutcome::Proceed(n)
            });

        assert_eq!(
            pipeline.run(-1),
            HookOutcome::Halt {
                reason: "negative".to_owned()
            }
        );
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert!(pipeline.run(1).is_proceed());
        assert_eq!(later.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stages_are_independent() {
        let hooks = LifecycleHooks::new()
            .on(LifecycleStage::BeforeDelete, "protect", |_: String| {
                HookOutcome::halt("protected")
            });
        assert!(!hooks.run(LifecycleStage::BeforeDelete, "x".to_owned()).is_proceed());
        assert!(hooks.run(LifecycleStage::BeforeCreate, "x".to_owned()).is_proceed());
        assert!(LifecycleStage::BeforeList.is_before());
        assert!(!LifecycleStage::AfterList.is_before());
    }
}
