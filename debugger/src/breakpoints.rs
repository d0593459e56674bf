//! Resolution of breakpoint events into marker updates for the host
use std::path::PathBuf;

use transport::types::{BreakpointEvent, BreakpointEventType, BreakpointId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointChange {
    Added,
    Changed,
    Removed,
}

/// One source location whose breakpoint marker should be updated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointUpdate {
    pub breakpoint: BreakpointId,
    pub file: PathBuf,
    pub line: u32,
    pub enabled: bool,
    pub change: BreakpointChange,
}

fn change_for(event_type: BreakpointEventType) -> Option<BreakpointChange> {
    match event_type {
        BreakpointEventType::Added | BreakpointEventType::LocationsAdded => {
            Some(BreakpointChange::Added)
        }
        BreakpointEventType::Enabled | BreakpointEventType::Disabled => {
            Some(BreakpointChange::Changed)
        }
        BreakpointEventType::Removed | BreakpointEventType::LocationsRemoved => {
            Some(BreakpointChange::Removed)
        }
        BreakpointEventType::LocationsResolved
        | BreakpointEventType::CommandChanged
        | BreakpointEventType::ConditionChanged
        | BreakpointEventType::IgnoreChanged
        | BreakpointEventType::ThreadChanged => None,
    }
}

/// The marker updates for every location of `event` that resolves to a source line
pub fn updates(event: &BreakpointEvent) -> Vec<BreakpointUpdate> {
    let Some(change) = change_for(event.event_type) else {
        return Vec::new();
    };

    event
        .locations
        .iter()
        .filter_map(|location| {
            let Some(entry) = &location.line_entry else {
                tracing::debug!(breakpoint = %event.breakpoint, "location without a line entry");
                return None;
            };
            Some(BreakpointUpdate {
                breakpoint: event.breakpoint,
                file: entry.path.clone(),
                line: entry.line,
                enabled: location.enabled,
                change,
            })
        })
        .collect()
}

/// Text reported when new locations were added to an existing breakpoint
pub fn locations_added_notice(event: &BreakpointEvent) -> Option<String> {
    if event.event_type != BreakpointEventType::LocationsAdded || event.num_locations == 0 {
        return None;
    }
    Some(format!(
        "{} locations added to breakpoint {}\n",
        event.num_locations, event.breakpoint
    ))
}
