//! Domain entities for ci-deploy.
//!
//! This module contains the pure parts of a deployment:
//! - EnvSnapshot: the environment captured at start-up
//! - CI providers and their registry
//! - Gate: the proceed/skip/fatal decision
//! - Artifacts: the build outputs to publish
//! - Workspace: resolved paths of a run
//! - Publish: the commit/push state machine types

mod artifact;
mod ci;
mod env;
mod gate;
mod publish;
mod workspace;

pub use artifact::{Artifact, ArtifactSet};
pub use ci::{
    AppVeyor, CiKind, CiProvider, CiRegistry, GitHubActions, GitLabCi, Local, Travis,
};
pub use env::EnvSnapshot;
pub use gate::{DeploySecrets, DeploymentGate, GateDecision, GatePass, SkipReason};
pub use publish::{PublishReport, PublishState, PublishTarget, PushOutcome};
pub use workspace::Workspace;
