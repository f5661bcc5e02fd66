//! Deferred reload coordinator
//!
//! Mutations that touch persisted configuration never reload the supervisor
//! directly; they call `schedule()` and the reload fires once per quiet
//! period. Pre- and post-hooks are one-shot: a hook registered now runs on
//! the next firing only, and hooks registered while a firing is in progress
//! run on the firing after that.

use crate::error::Result;
use crate::supervisor::LinkSupervisor;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Debounce window between the last `schedule()` call and the reload
pub const QUIET_PERIOD: Duration = Duration::from_secs(3);

/// One-shot hook run around a supervisor reload
pub type Hook = Box<dyn FnOnce() -> Result<()> + Send>;

/// Debounced pre/post-hook reload machinery (C6)
pub struct ReloadCoordinator {
    pre_hooks: Vec<Hook>,
    post_hooks: Vec<Hook>,
    deadline: Option<Instant>,
    quiet_period: Duration,
}

impl ReloadCoordinator {
    pub fn new() -> Self {
        Self::with_quiet_period(QUIET_PERIOD)
    }

    pub fn with_quiet_period(quiet_period: Duration) -> Self {
        Self {
            pre_hooks: Vec::new(),
            post_hooks: Vec::new(),
            deadline: None,
            quiet_period,
        }
    }

    /// Append a hook that runs before the next reload
    pub fn add_pre_hook(&mut self, hook: Hook) {
        self.pre_hooks.push(hook);
    }

    /// Append a hook that runs after the next successful reload
    pub fn add_post_hook(&mut self, hook: Hook) {
        self.post_hooks.push(hook);
    }

    /// (Re)arm the timer to fire once, a quiet period from now.
    /// Successive calls within the quiet period collapse into one firing.
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.quiet_period);
        debug!("Supervisor reload scheduled");
    }

    /// The pending firing deadline, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run the firing sequence: pre-hooks, supervisor reload, post-hooks.
    ///
    /// A failing hook is logged and does not abort the sequence. A failing
    /// reload discards the post-hooks. Both lists are consumed whole at the
    /// start, so hooks registered from here on belong to the next firing.
    pub async fn fire(&mut self, supervisor: &dyn LinkSupervisor) {
        self.deadline = None;
        let pre_hooks = std::mem::take(&mut self.pre_hooks);
        let post_hooks = std::mem::take(&mut self.post_hooks);

        for hook in pre_hooks {
            if let Err(e) = hook() {
                warn!(error = %e, "Pre-reload hook failed");
            }
        }

        if let Err(e) = supervisor.reload().await {
            warn!(
                error = %e,
                discarded = post_hooks.len(),
                "Supervisor reload failed, discarding post hooks"
            );
            return;
        }
        debug!("Supervisor reload complete");

        for hook in post_hooks {
            if let Err(e) = hook() {
                warn!(error = %e, "Post-reload hook failed");
            }
        }
    }
}

impl Default for ReloadCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
