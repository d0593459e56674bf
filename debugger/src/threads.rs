//! Choosing the thread to present after a process stops
use transport::types::{StopReason, ThreadId, ThreadInfo};

use crate::engine::Process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reselection {
    /// The selected thread is already one the user cares about
    Keep,
    Select(ThreadId),
    /// The process has no threads to select
    NoThreads,
}

/// Decide which thread should be selected given the threads of a stopped process
///
/// A stopped-for-a-reason selected thread is kept. Otherwise the first thread that completed a
/// plan wins, then the first thread that stopped for any other interesting reason, then the
/// selected thread if it is still valid, then the first thread.
pub fn select_thread(current: Option<&ThreadInfo>, threads: &[ThreadInfo]) -> Reselection {
    if let Some(current) = current {
        if current.valid && !current.stop_reason.is_unset() {
            return Reselection::Keep;
        }
    }

    let mut plan_thread = None;
    let mut other_thread = None;
    for thread in threads.iter().filter(|t| t.stop_reason.is_interesting()) {
        if thread.stop_reason == StopReason::PlanComplete {
            plan_thread.get_or_insert(thread.id);
        } else {
            other_thread.get_or_insert(thread.id);
        }
    }

    if let Some(id) = plan_thread.or(other_thread) {
        return Reselection::Select(id);
    }

    match current.filter(|t| t.valid) {
        Some(current) => Reselection::Select(current.id),
        None => threads
            .first()
            .map(|t| Reselection::Select(t.id))
            .unwrap_or(Reselection::NoThreads),
    }
}

/// Apply [`select_thread`] to a process, returning the thread selected afterwards
pub fn update_selected_thread(process: &mut dyn Process) -> Option<ThreadId> {
    let current = process.selected_thread();
    let threads = process.threads();

    match select_thread(current.as_ref(), &threads) {
        Reselection::Keep => current.map(|t| t.id),
        Reselection::Select(id) => {
            tracing::debug!(thread_id = %id, "selecting thread");
            if !process.set_selected_thread(id) {
                tracing::warn!(thread_id = %id, "engine refused thread selection");
            }
            Some(id)
        }
        Reselection::NoThreads => {
            tracing::debug!("stopped process has no threads");
            None
        }
    }
}
