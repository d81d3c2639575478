//! Consumer-side record cache with last-confirmed-write-wins merging
//!
//! A background refresh must never clobber a mutation the user just made.
//! Each cached record keeps its store version; a polled copy only replaces it
//! when it is at least as new, and a provisional (optimistic) copy only gives
//! way to a strictly newer one.

use std::{collections::HashMap, future::Future, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::models::BorrowRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecord {
    pub record: BorrowRecord,
    /// Applied locally, not yet confirmed by the store
    pub provisional: bool,
}

/// Identifies one background fetch started with [`RecordView::begin_poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTicket {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied { replaced: usize, kept: usize },
    /// The view was detached or a newer poll already merged
    Discarded,
}

#[derive(Debug, Default)]
pub struct RecordView {
    records: HashMap<i64, CachedRecord>,
    issued: u64,
    merged: u64,
    detached: bool,
}

impl RecordView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<&CachedRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Show a locally computed result before the store answers
    pub fn apply_optimistic(&mut self, record: BorrowRecord) {
        if self.detached {
            return;
        }
        self.records.insert(
            record.id,
            CachedRecord {
                record,
                provisional: true,
            },
        );
    }

    /// Install the store's answer to a user mutation.
    ///
    /// Returns false when the cache already holds this or a newer confirmed
    /// version, so each write is confirmed exactly once.
    pub fn confirm(&mut self, record: BorrowRecord) -> bool {
        if self.detached {
            return false;
        }
        if let Some(cached) = self.records.get(&record.id) {
            let stale = cached.record.version > record.version
                || (!cached.provisional && cached.record.version == record.version);
            if stale {
                return false;
            }
        }
        self.records.insert(
            record.id,
            CachedRecord {
                record,
                provisional: false,
            },
        );
        true
    }

    pub fn begin_poll(&mut self) -> PollTicket {
        self.issued += 1;
        PollTicket {
            generation: self.issued,
        }
    }

    /// Merge a poll result record by record
    pub fn merge_poll(&mut self, ticket: PollTicket, records: Vec<BorrowRecord>) -> MergeOutcome {
        if self.detached || ticket.generation <= self.merged {
            return MergeOutcome::Discarded;
        }
        self.merged = ticket.generation;

        let mut replaced = 0;
        let mut kept = 0;
        for record in records {
            let newer = match self.records.get(&record.id) {
                Some(cached) if cached.provisional => record.version > cached.record.version,
                Some(cached) => record.version >= cached.record.version,
                None => true,
            };
            if newer {
                replaced += 1;
                self.records.insert(
                    record.id,
                    CachedRecord {
                        record,
                        provisional: false,
                    },
                );
            } else {
                kept += 1;
            }
        }

        MergeOutcome::Applied { replaced, kept }
    }

    /// Stop accepting results; anything still in flight is ignored on arrival
    pub fn detach(&mut self) {
        self.detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

/// Owner of a periodic background task; dropping it stops the task
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `task` every `period`, first tick immediately. Slow runs skip ticks.
pub fn spawn_refresh<F, Fut>(period: Duration, mut task: F) -> RefreshHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            task().await;
        }
    });

    RefreshHandle { task: handle }
}
