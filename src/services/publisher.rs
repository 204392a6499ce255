//! Publisher: commit the package repository and push it to a shared branch.
//!
//! Pushing is optimistic. Nothing locks the remote branch; a refused push is
//! repaired by fetching the remote tip and rebasing onto it (remote side wins
//! conflicts), then retried, at most `budget` times.

use crate::domain::{PublishReport, PublishState, PublishTarget, PushOutcome};
use crate::error::PublishError;
use crate::services::git::VersionControl;

pub struct Publisher<'a, V: VersionControl + ?Sized> {
    vcs: &'a V,
    target: PublishTarget,
    budget: u32,
    message: String,
}

impl<'a, V: VersionControl + ?Sized> Publisher<'a, V> {
    /// `budget` is the maximum number of push attempts (at least one is made)
    pub fn new(vcs: &'a V, target: PublishTarget, budget: u32, message: impl Into<String>) -> Self {
        Self {
            vcs,
            target,
            budget: budget.max(1),
            message: message.into(),
        }
    }

    /// Run the state machine to a terminal state
    pub fn publish(&self) -> Result<PublishReport, PublishError> {
        let mut state = PublishState::Idle;
        let mut resyncs = 0;

        while !state.is_terminal() {
            tracing::debug!("Publisher state: {}", state);
            state = match state {
                PublishState::Idle => {
                    self.commit()?;
                    PublishState::Committed
                }
                PublishState::Committed => PublishState::Pushing { attempt: 1 },
                PublishState::Pushing { attempt } => self.push(attempt)?,
                PublishState::Conflicted { attempt } => {
                    self.resync();
                    resyncs += 1;
                    PublishState::Pushing {
                        attempt: attempt + 1,
                    }
                }
                terminal => terminal,
            };
        }

        if let PublishState::Succeeded { attempts } = state {
            tracing::info!("Published {} after {} attempt(s)", self.target, attempts);
            return Ok(PublishReport { attempts, resyncs });
        }

        tracing::error!("Can't push on {}", self.target);
        Err(PublishError::Exhausted {
            remote: self.target.remote.clone(),
            branch: self.target.branch.clone(),
            attempts: state.attempts(),
        })
    }

    fn commit(&self) -> Result<(), PublishError> {
        tracing::info!("Committing: {}", self.message);
        self.vcs.stage_all().map_err(PublishError::Commit)?;
        self.vcs.commit(&self.message).map_err(PublishError::Commit)?;

        let files = self.vcs.list_files().map_err(PublishError::Commit)?;
        for line in files.lines() {
            tracing::debug!("  {}", line);
        }
        Ok(())
    }

    fn push(&self, attempt: u32) -> Result<PublishState, PublishError> {
        tracing::info!(
            "Pushing to {} (attempt {}/{})",
            self.target,
            attempt,
            self.budget
        );

        let refused = match self.vcs.push_force(&self.target)? {
            PushOutcome::Accepted => return Ok(PublishState::Succeeded { attempts: attempt }),
            PushOutcome::Rejected(detail) => {
                tracing::warn!("Push rejected by remote: {}", detail);
                detail
            }
            PushOutcome::Failed(detail) => {
                tracing::warn!("Push failed: {}", detail);
                detail
            }
        };

        if attempt >= self.budget {
            tracing::debug!("Last push output: {}", refused);
            Ok(PublishState::Exhausted { attempts: attempt })
        } else {
            Ok(PublishState::Conflicted { attempt })
        }
    }

    /// Bring the local branch on top of the remote tip.
    ///
    /// Failures are logged and left to the next push attempt to surface.
    fn resync(&self) {
        self.log_branches();

        if let Err(e) = self.vcs.fetch(&self.target) {
            tracing::warn!("Fetch of {} failed: {}", self.target, e);
            return;
        }
        self.log_branches();

        if let Err(e) = self.vcs.rebase_onto_fetched() {
            tracing::warn!("Rebase onto {} failed: {}", self.target, e);
            if let Err(e) = self.vcs.abort_rebase() {
                tracing::warn!("Rebase abort failed: {}", e);
            }
        }
        self.log_branches();
    }

    fn log_branches(&self) {
        match self.vcs.describe_branches() {
            Ok(branches) => {
                for line in branches.lines() {
                    tracing::debug!("  {}", line);
                }
            }
            Err(e) => tracing::debug!("Cannot list branches: {}", e),
        }
    }
}
