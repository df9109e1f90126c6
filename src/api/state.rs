use std::sync::Arc;

use crate::bridge::Bridge;
use crate::scheduler::{Clock, ScheduledTask};

#[derive(Clone)]
pub struct AppState {
    pub bridge: Bridge,
    /// Static task definition, for previews that do not need the worker.
    pub task: ScheduledTask,
    pub clock: Arc<dyn Clock>,
}
