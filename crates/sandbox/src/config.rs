/// Per-container resource caps. `None` leaves the engine default in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceLimits {
    pub memory_mb: Option<u32>,
    pub cpus: Option<f64>,
    pub pids_limit: Option<u32>,
}
