//! Weighted chunking and the map/reduce controller.
//!
//! The controller never computes risk itself: it splits the weighted
//! input sequence, submits chunks to the rayon pool, and folds partial
//! results into the accumulator as they arrive, in arrival order. The
//! fold must therefore be associative and tolerate any interleaving.
//! There are no retries; the first worker error tears down the whole
//! reduction.

use std::fmt;
use std::mem;
use std::sync::mpsc;

use crate::config::RiskConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskError {
    /// An item reported a negative weight.
    NegativeWeight(f64),
    MaxWeight(f64),
    /// System memory crossed the hard threshold before a submission.
    Memory { used_percent: f64, limit_percent: u32 },
    /// A worker failed; carries the chunk context and the worker's text.
    Worker(String),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::NegativeWeight(w) => {
                write!(f, "item weights must be non-negative, got {w}")
            }
            TaskError::MaxWeight(w) => {
                write!(f, "max chunk weight must be positive, got {w}")
            }
            TaskError::Memory { used_percent, limit_percent } => write!(
                f,
                "memory usage {used_percent:.1}% exceeds the hard limit {limit_percent}%"
            ),
            TaskError::Worker(text) => write!(f, "worker error: {text}"),
        }
    }
}

impl std::error::Error for TaskError {}

/// Group `items` into blocks of total weight at most `max_weight`, never
/// mixing two key values in one block.
///
/// Zero-weight items are dropped, but still move the running key, so a
/// dropped item with a fresh key forces the next block boundary. An item
/// heavier than `max_weight` gets a block of its own.
pub fn block_splitter<T, W, K, Q>(
    items: Vec<T>,
    max_weight: f64,
    weight: W,
    key: K,
) -> Result<Vec<Vec<T>>, TaskError>
where
    W: Fn(&T) -> f64,
    K: Fn(&T) -> Q,
    Q: PartialEq,
{
    if max_weight <= 0.0 {
        return Err(TaskError::MaxWeight(max_weight));
    }
    let mut blocks = Vec::new();
    let mut block: Vec<T> = Vec::new();
    let mut block_weight = 0.0;
    let mut prev_key: Option<Q> = None;
    for item in items {
        let w = weight(&item);
        if w < 0.0 {
            return Err(TaskError::NegativeWeight(w));
        }
        let k = key(&item);
        if w == 0.0 {
            prev_key = Some(k);
            continue;
        }
        let boundary = block_weight + w > max_weight
            || prev_key.as_ref().is_some_and(|prev| *prev != k);
        if boundary && !block.is_empty() {
            blocks.push(mem::take(&mut block));
            block_weight = 0.0;
        }
        block.push(item);
        block_weight += w;
        prev_key = Some(k);
    }
    if !block.is_empty() {
        blocks.push(block);
    }
    Ok(blocks)
}

/// Sort `items` by key, then split them into balanced blocks whose
/// weight stays within `ceil(total_weight / hint)`.
pub fn split_in_blocks<T, W, K, Q>(
    items: Vec<T>,
    hint: usize,
    weight: W,
    key: K,
) -> Result<Vec<Vec<T>>, TaskError>
where
    W: Fn(&T) -> f64,
    K: Fn(&T) -> Q,
    Q: Ord,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let mut items = items;
    items.sort_by_key(|item| key(item));
    let total: f64 = items.iter().map(|item| weight(item)).sum();
    if total <= 0.0 {
        return Ok(Vec::new());
    }
    let hint = hint.max(1);
    let max_weight = (total / hint as f64).ceil().max(1.0);
    block_splitter(items, max_weight, weight, key)
}

/// Splits, submits and reduces one weighted workload.
pub struct TaskManager {
    concurrent_tasks: usize,
    soft_mem_percent: u32,
    hard_mem_percent: u32,
}

impl TaskManager {
    pub fn new(concurrent_tasks: usize, soft_mem_percent: u32, hard_mem_percent: u32) -> Self {
        TaskManager {
            concurrent_tasks,
            soft_mem_percent,
            hard_mem_percent,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        TaskManager::new(
            config.concurrent_tasks,
            config.soft_mem_percent,
            config.hard_mem_percent,
        )
    }

    /// Split `items`, run `task` over every chunk and fold the partial
    /// results into `initial`.
    ///
    /// With a concurrency hint of 0 every chunk runs in-process,
    /// synchronously, in submission order. Otherwise chunks run on the
    /// rayon pool, scoped to this call, and partials fold in arrival
    /// order; the fold must not depend on it.
    pub fn apply<T, Q, R, E, Task, Weight, Key, Fold, Acc>(
        &self,
        task: Task,
        items: Vec<T>,
        weight: Weight,
        key: Key,
        initial: Acc,
        mut fold: Fold,
    ) -> Result<Acc, TaskError>
    where
        T: Sync,
        Q: Ord,
        R: Send,
        E: fmt::Display,
        Task: Fn(&[T]) -> Result<R, E> + Sync,
        Weight: Fn(&T) -> f64,
        Key: Fn(&T) -> Q,
        Fold: FnMut(&mut Acc, R) + Send,
        Acc: Send,
    {
        let chunks = split_in_blocks(items, self.concurrent_tasks, weight, key)?;
        let mut acc = initial;
        if chunks.is_empty() {
            return Ok(acc);
        }

        if self.concurrent_tasks == 0 {
            for (index, chunk) in chunks.iter().enumerate() {
                self.check_memory()?;
                let partial = task(chunk.as_slice())
                    .map_err(|e| TaskError::Worker(format!("chunk {index}: {e}")))?;
                fold(&mut acc, partial);
            }
            return Ok(acc);
        }

        let mut failure: Option<TaskError> = None;
        rayon::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for (index, chunk) in chunks.iter().enumerate() {
                if let Err(err) = self.check_memory() {
                    failure = Some(err);
                    break;
                }
                let tx = tx.clone();
                let task = &task;
                scope.spawn(move |_| {
                    let result = task(chunk.as_slice())
                        .map_err(|e| TaskError::Worker(format!("chunk {index}: {e}")));
                    let _ = tx.send(result);
                });
            }
            drop(tx);
            if failure.is_some() {
                return;
            }
            for result in rx {
                match result {
                    Ok(partial) => fold(&mut acc, partial),
                    Err(err) => {
                        failure = Some(err);
                        break;
                    }
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(acc),
        }
    }

    fn check_memory(&self) -> Result<(), TaskError> {
        let Some(used_percent) = system_memory_percent() else {
            return Ok(());
        };
        if used_percent > self.hard_mem_percent as f64 {
            return Err(TaskError::Memory {
                used_percent,
                limit_percent: self.hard_mem_percent,
            });
        }
        if used_percent > self.soft_mem_percent as f64 {
            eprintln!(
                "warning: memory usage {used_percent:.1}% above the soft limit {}%",
                self.soft_mem_percent
            );
        }
        Ok(())
    }
}

/// Used fraction of system memory, from /proc/meminfo. None when the
/// platform does not expose it; the guard is then skipped.
fn system_memory_percent() -> Option<f64> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_meminfo_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_meminfo_kb(rest);
        }
    }
    let total = total?;
    let available = available?;
    if total <= 0.0 {
        return None;
    }
    Some((total - available) / total * 100.0)
}

fn parse_meminfo_kb(rest: &str) -> Option<f64> {
    rest.split_whitespace().next()?.parse().ok()
}
