//! ci-deploy: CI artifact deployment to a static package repository
//!
//! This crate decides whether a CI build should be deployed, copies its
//! artifacts into a git-hosted package repository with regenerated index
//! pages, and pushes the result with a bounded fetch/rebase retry loop.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;

pub use app::{Deployer, RunOutcome};
pub use config::DeployConfig;
pub use error::{DeployError, Result};
