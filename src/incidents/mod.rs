//! Incident records, recording and retention

pub mod cleanup;
pub mod model;
pub mod recorder;

pub use cleanup::{run_cleanup, CleanupPolicy, CleanupReport, CleanupWorker};
pub use model::{
    sort_for_display, Incident, IncidentFilter, IncidentStatus, IncidentSummary, NewIncident,
};
pub use recorder::{build_incident, IncidentRecorder};
