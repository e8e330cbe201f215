//! Task executor abstraction.
//!
//! The engine's parallelism is structural: independent leaves (assembly) are
//! submitted as a batch of closures and joined. The core never owns a thread
//! pool; callers pick an executor. [`SequentialExecutor`] is the default;
//! `RayonExecutor` (behind the `rayon` feature) fans the batch out on the
//! global rayon pool.

use crate::error::Result;

/// One unit of independent work.
pub type Task<'a> = Box<dyn FnOnce() -> Result<()> + Send + 'a>;

/// Submit-and-join executor for batches of independent tasks.
pub trait TaskExecutor: Sync {
    /// Run every task; `max_parallel` (0 = no bound) caps how many run at
    /// once. The first error is returned after the batch settles.
    fn execute<'a>(&self, tasks: Vec<Task<'a>>, max_parallel: usize) -> Result<()>;
}

/// Runs tasks in submission order on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl TaskExecutor for SequentialExecutor {
    fn execute<'a>(&self, tasks: Vec<Task<'a>>, _max_parallel: usize) -> Result<()> {
        for task in tasks {
            task()?;
        }
        Ok(())
    }
}

/// Fans tasks out on the global rayon pool.
#[cfg(feature = "rayon")]
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonExecutor;

#[cfg(feature = "rayon")]
impl TaskExecutor for RayonExecutor {
    fn execute<'a>(&self, tasks: Vec<Task<'a>>, max_parallel: usize) -> Result<()> {
        use std::sync::Mutex;
        let first_error: Mutex<Option<crate::error::HmatError>> = Mutex::new(None);
        let chunk = if max_parallel == 0 {
            tasks.len().max(1)
        } else {
            max_parallel
        };
        let mut remaining = tasks;
        while !remaining.is_empty() {
            let batch: Vec<Task<'a>> = remaining
                .drain(..chunk.min(remaining.len()))
                .collect();
            let slot = &first_error;
            rayon::scope(|s| {
                for task in batch {
                    s.spawn(move |_| {
                        if let Err(e) = task() {
                            let mut slot = slot.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                        }
                    });
                }
            });
            if first_error.lock().unwrap().is_some() {
                break;
            }
        }
        match first_error.into_inner().unwrap() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
