mod status;
mod submit;

pub use status::{JobState, StatusPoller};
pub use submit::{Submitter, parse_job_handle};

use std::fmt;

/// Durable identity of a submitted job: the two leading components of the
/// dotted name the scheduler prints on submission. Produced exactly once per
/// submission; the sole key needed to query status or cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
    pub server: String,
}

impl JobHandle {
    /// The `<job_id>.<server>.<domain>` form the status query expects.
    pub fn qualified(&self, domain: &str) -> String {
        format!("{}.{}.{}", self.job_id, self.server, domain)
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job_id, self.server)
    }
}
