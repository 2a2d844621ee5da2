//! In-memory runtime for tests and dry runs
//!
//! Containers, stats snapshots and exec results are scripted up front.
//! Stats are served from a per-container queue; the last snapshot is
//! repeated once the queue drains.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ContainerAttrs, ContainerRuntime, ExecOutput, RawStats};
use crate::error::CollectorError;
use crate::models::{ContainerInfo, ContainerState};

#[derive(Debug, Clone, Default)]
struct ScriptedContainer {
    name: String,
    state: Option<ContainerState>,
    stats: VecDeque<RawStats>,
    fail_stats: bool,
    attrs: ContainerAttrs,
    exec: HashMap<String, ExecOutput>,
}

/// Scripted [`ContainerRuntime`]
#[derive(Default)]
pub struct StaticRuntime {
    containers: DashMap<String, ScriptedContainer>,
    fail_listing: AtomicBool,
}

impl StaticRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, id: &str, name: &str, state: ContainerState) {
        let mut entry = self.containers.entry(id.to_string()).or_default();
        entry.name = name.to_string();
        entry.state = Some(state);
    }

    /// Queue a stats snapshot for the container
    pub fn push_stats(&self, id: &str, stats: RawStats) {
        self.containers
            .entry(id.to_string())
            .or_default()
            .stats
            .push_back(stats);
    }

    pub fn set_attrs(&self, id: &str, attrs: ContainerAttrs) {
        self.containers.entry(id.to_string()).or_default().attrs = attrs;
    }

    /// Script the result of a command, keyed by the space-joined argv
    pub fn set_exec_output(&self, id: &str, command: &str, output: ExecOutput) {
        self.containers
            .entry(id.to_string())
            .or_default()
            .exec
            .insert(command.to_string(), output);
    }

    pub fn fail_stats(&self, id: &str, fail: bool) {
        self.containers.entry(id.to_string()).or_default().fail_stats = fail;
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    fn missing(id: &str) -> CollectorError {
        CollectorError::Stats {
            container_id: id.to_string(),
            message: "no such container".to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for StaticRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerInfo>, CollectorError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(CollectorError::Enumeration("runtime unavailable".to_string()));
        }

        let mut containers: Vec<ContainerInfo> = self
            .containers
            .iter()
            .filter_map(|entry| {
                let state = entry.state?;
                (all || state == ContainerState::Running).then(|| ContainerInfo {
                    id: entry.key().clone(),
                    name: entry.name.clone(),
                    state,
                })
            })
            .collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(containers)
    }

    async fn stats(&self, container_id: &str) -> Result<RawStats, CollectorError> {
        let mut entry = self
            .containers
            .get_mut(container_id)
            .ok_or_else(|| Self::missing(container_id))?;

        if entry.fail_stats {
            return Err(CollectorError::Stats {
                container_id: container_id.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        if entry.stats.len() > 1 {
            entry.stats.pop_front().ok_or_else(|| Self::missing(container_id))
        } else {
            entry
                .stats
                .front()
                .cloned()
                .ok_or_else(|| Self::missing(container_id))
        }
    }

    async fn exec(&self, container_id: &str, command: &[String]) -> Result<ExecOutput, CollectorError> {
        let entry = self
            .containers
            .get(container_id)
            .ok_or_else(|| Self::missing(container_id))?;

        entry
            .exec
            .get(&command.join(" "))
            .cloned()
            .ok_or_else(|| CollectorError::Exec {
                container_id: container_id.to_string(),
                message: format!("command not scripted: {}", command.join(" ")),
            })
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerAttrs, CollectorError> {
        self.containers
            .get(container_id)
            .map(|entry| entry.attrs.clone())
            .ok_or_else(|| CollectorError::Inspect {
                container_id: container_id.to_string(),
                message: "no such container".to_string(),
            })
    }
}
