// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker runtime backed by bollard.

use super::{
    split_image_tag, ContainerRuntime, ContainerSummary, CreatedContainer, ImageSummary,
    InspectReport, NetworkSummary, PruneReport, PulledImage, RunRequest, RuntimeError, StatsReport,
    StatusReport, VolumeSummary,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
    UpdateContainerOptions,
};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use bollard::models::{HostConfig, MountPointTypeEnum, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::network::CreateNetworkOptions;
use bollard::volume::{CreateVolumeOptions, RemoveVolumeOptions};
use bollard::Docker;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tomo_core::{BindMount, NamedVolume};

/// Process-wide runtime handle, initialized once on first use.
static SHARED: OnceLock<Result<Arc<DockerRuntime>, RuntimeError>> = OnceLock::new();

/// The shared Docker runtime for this process.
pub fn shared_runtime() -> Result<Arc<DockerRuntime>, RuntimeError> {
    SHARED
        .get_or_init(|| DockerRuntime::connect().map(Arc::new))
        .clone()
}

/// Bollard-backed [`ContainerRuntime`].
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }
}

fn map_err(operation: &'static str, error: bollard::errors::Error) -> RuntimeError {
    match &error {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, message } => {
            RuntimeError::NotFound(message.clone())
        }
        _ => RuntimeError::Failed { operation, message: error.to_string() },
    }
}

/// `"unless-stopped"` / `"on-failure:3"` → bollard restart policy.
fn restart_policy(policy: &str) -> RestartPolicy {
    let (name, retries) = match policy.split_once(':') {
        Some((name, count)) => (name, count.parse::<i64>().ok()),
        None => (policy, None),
    };
    let name = match name {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::NO,
    };
    RestartPolicy { name: Some(name), maximum_retry_count: retries }
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await.map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn version(&self) -> Result<String, RuntimeError> {
        let version =
            self.docker.version().await.map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> { all, ..Default::default() };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_err("containers.list", e))?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.as_deref().map(short_id).unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                status: c.state.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
            })
            .collect())
    }

    async fn run_container(&self, request: RunRequest) -> Result<CreatedContainer, RuntimeError> {
        // host → container port map inverts into Docker's exposed-port form
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for (host_port, container_spec) in &request.ports {
            exposed_ports.insert(container_spec.clone(), HashMap::new());
            port_bindings.insert(
                container_spec.clone(),
                Some(vec![PortBinding { host_ip: None, host_port: Some(host_port.clone()) }]),
            );
        }

        let binds: Vec<String> = request
            .volumes
            .iter()
            .map(|v| format!("{}:{}:{}", v.host, v.container, v.mode))
            .collect();

        let env: Vec<String> =
            request.env.iter().map(|(key, value)| format!("{key}={value}")).collect();

        let host_config = HostConfig {
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            binds: (!binds.is_empty()).then_some(binds),
            network_mode: request.network_mode.clone().or_else(|| request.network.clone()),
            privileged: Some(request.privileged),
            cap_add: (!request.capabilities.is_empty()).then(|| request.capabilities.clone()),
            restart_policy: request.restart_policy.as_deref().map(restart_policy),
            ..Default::default()
        };

        let config = Config {
            image: Some(request.image.clone()),
            env: (!env.is_empty()).then_some(env),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = request
            .name
            .as_deref()
            .map(|name| CreateContainerOptions { name: name.to_string(), platform: None });

        let created = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| map_err("containers.run", e))?;
        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_err("containers.run", e))?;

        Ok(CreatedContainer {
            id: short_id(&created.id),
            name: request.name.unwrap_or_else(|| short_id(&created.id)),
            container_id: created.id,
        })
    }

    async fn start_container(&self, container: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(container, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_err("containers.start", e))
    }

    async fn stop_container(&self, container: &str, timeout_secs: u64) -> Result<(), RuntimeError> {
        let options = StopContainerOptions { t: timeout_secs as i64 };
        self.docker
            .stop_container(container, Some(options))
            .await
            .map_err(|e| map_err("containers.stop", e))
    }

    async fn restart_container(&self, container: &str) -> Result<(), RuntimeError> {
        self.docker
            .restart_container(container, None)
            .await
            .map_err(|e| map_err("containers.restart", e))
    }

    async fn remove_container(&self, container: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions { force, ..Default::default() };
        self.docker
            .remove_container(container, Some(options))
            .await
            .map_err(|e| map_err("containers.remove", e))
    }

    async fn container_logs(&self, container: &str, tail: u64) -> Result<String, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.logs(container, Some(options));
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message } | LogOutput::StdErr { message } | LogOutput::Console { message }) => {
                    collected.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => return Err(map_err("containers.logs", e)),
            }
        }
        Ok(collected)
    }

    async fn inspect_container(&self, container: &str) -> Result<InspectReport, RuntimeError> {
        let info = self
            .docker
            .inspect_container(container, None)
            .await
            .map_err(|e| map_err("containers.inspect", e))?;

        let status = info
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_default();

        let settings = info.network_settings.unwrap_or_default();
        let networks = settings.networks.map(|n| n.into_keys().collect()).unwrap_or_default();
        let ports = settings.ports.map(|p| p.into_keys().collect()).unwrap_or_default();

        let mut named_volumes = Vec::new();
        let mut bind_mounts = Vec::new();
        for mount in info.mounts.unwrap_or_default() {
            let mode = match mount.rw {
                Some(false) => "ro".to_string(),
                _ => mount.mode.clone().filter(|m| !m.is_empty()).unwrap_or_else(|| "rw".into()),
            };
            match mount.typ {
                Some(MountPointTypeEnum::VOLUME) => named_volumes.push(NamedVolume {
                    name: mount.name.unwrap_or_default(),
                    destination: mount.destination.unwrap_or_default(),
                    mode,
                }),
                Some(MountPointTypeEnum::BIND) => bind_mounts.push(BindMount {
                    source: mount.source.unwrap_or_default(),
                    destination: mount.destination.unwrap_or_default(),
                    mode,
                }),
                _ => {}
            }
        }

        Ok(InspectReport { status, networks, named_volumes, bind_mounts, ports })
    }

    async fn container_status(
        &self,
        container: &str,
        include_logs: bool,
    ) -> Result<StatusReport, RuntimeError> {
        let info = self
            .docker
            .inspect_container(container, None)
            .await
            .map_err(|e| map_err("containers.status", e))?;

        let state = info.state.unwrap_or_default();
        let health = state
            .health
            .as_ref()
            .and_then(|h| h.status)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string());

        let logs = if include_logs {
            let text = self.container_logs(container, 50).await.unwrap_or_default();
            // Only the tail matters for crash diagnostics
            let mut tail_start = text.len().saturating_sub(500);
            while !text.is_char_boundary(tail_start) {
                tail_start += 1;
            }
            Some(text[tail_start..].to_string())
        } else {
            None
        };

        Ok(StatusReport {
            status: state.status.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string()),
            health,
            restart_count: info.restart_count.unwrap_or(0).max(0) as u64,
            running: state.running.unwrap_or(false),
            started_at: state.started_at,
            finished_at: state.finished_at,
            logs,
        })
    }

    async fn container_stats(&self, container: &str) -> Result<StatsReport, RuntimeError> {
        let options = StatsOptions { stream: false, one_shot: false };
        let stats = self
            .docker
            .stats(container, Some(options))
            .next()
            .await
            .ok_or_else(|| RuntimeError::failed("containers.stats", "no stats sample"))?
            .map_err(|e| map_err("containers.stats", e))?;

        let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
            - stats.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
            - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
        let cpu_count = stats
            .cpu_stats
            .cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len().max(1))
            .unwrap_or(1) as f64;
        let cpu_percent = if system_delta > 0.0 && cpu_delta > 0.0 {
            (cpu_delta / system_delta) * cpu_count * 100.0
        } else {
            0.0
        };

        Ok(StatsReport {
            cpu_percent,
            memory_usage: stats.memory_stats.usage.unwrap_or(0),
            memory_limit: stats.memory_stats.limit.unwrap_or(0),
        })
    }

    async fn update_restart_policy(
        &self,
        container: &str,
        policy: &str,
    ) -> Result<(), RuntimeError> {
        let options = UpdateContainerOptions::<String> {
            restart_policy: Some(restart_policy(policy)),
            ..Default::default()
        };
        self.docker
            .update_container(container, options)
            .await
            .map_err(|e| map_err("containers.update", e))?;
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, RuntimeError> {
        let images = self
            .docker
            .list_images::<String>(None)
            .await
            .map_err(|e| map_err("images.list", e))?;
        Ok(images
            .into_iter()
            .map(|img| ImageSummary {
                id: short_id(&img.id),
                tags: img.repo_tags,
                size: img.size.max(0) as u64,
            })
            .collect())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<PulledImage, RuntimeError> {
        let options =
            CreateImageOptions { from_image: image.to_string(), tag: tag.to_string(), ..Default::default() };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.map_err(|e| map_err("images.pull", e))?;
        }

        let reference = format!("{image}:{tag}");
        let info = self
            .docker
            .inspect_image(&reference)
            .await
            .map_err(|e| map_err("images.pull", e))?;
        Ok(PulledImage {
            id: info.id.as_deref().map(short_id).unwrap_or_default(),
            tags: info.repo_tags.unwrap_or_default(),
        })
    }

    async fn remove_image(&self, image: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveImageOptions { force, ..Default::default() };
        self.docker
            .remove_image(image, Some(options), None)
            .await
            .map_err(|e| map_err("images.remove", e))?;
        Ok(())
    }

    async fn prune_images(&self) -> Result<PruneReport, RuntimeError> {
        let report = self
            .docker
            .prune_images::<String>(None)
            .await
            .map_err(|e| map_err("images.prune", e))?;
        Ok(PruneReport {
            deleted: report
                .images_deleted
                .unwrap_or_default()
                .into_iter()
                .filter_map(|d| d.deleted.or(d.untagged))
                .collect(),
            space_reclaimed: report.space_reclaimed.unwrap_or(0).max(0) as u64,
        })
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeSummary>, RuntimeError> {
        let response = self
            .docker
            .list_volumes::<String>(None)
            .await
            .map_err(|e| map_err("volumes.list", e))?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|v| VolumeSummary { name: v.name, driver: v.driver, mountpoint: v.mountpoint })
            .collect())
    }

    async fn create_volume(&self, name: &str, driver: &str) -> Result<VolumeSummary, RuntimeError> {
        let options = CreateVolumeOptions {
            name: name.to_string(),
            driver: driver.to_string(),
            ..Default::default()
        };
        let volume =
            self.docker.create_volume(options).await.map_err(|e| map_err("volumes.create", e))?;
        Ok(VolumeSummary { name: volume.name, driver: volume.driver, mountpoint: volume.mountpoint })
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveVolumeOptions { force };
        self.docker
            .remove_volume(name, Some(options))
            .await
            .map_err(|e| map_err("volumes.remove", e))
    }

    async fn prune_volumes(&self, filter: Option<&str>) -> Result<PruneReport, RuntimeError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(label) = filter.and_then(|f| f.strip_prefix("label=")) {
            filters.insert("label".to_string(), vec![label.to_string()]);
        }
        let options = bollard::volume::PruneVolumesOptions { filters };
        let report = self
            .docker
            .prune_volumes(Some(options))
            .await
            .map_err(|e| map_err("volumes.prune", e))?;
        Ok(PruneReport {
            deleted: report.volumes_deleted.unwrap_or_default(),
            space_reclaimed: report.space_reclaimed.unwrap_or(0).max(0) as u64,
        })
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        let networks = self
            .docker
            .list_networks::<String>(None)
            .await
            .map_err(|e| map_err("networks.list", e))?;
        Ok(networks
            .into_iter()
            .map(|n| NetworkSummary {
                id: n.id.as_deref().map(short_id).unwrap_or_default(),
                name: n.name.unwrap_or_default(),
                driver: n.driver.unwrap_or_else(|| "bridge".to_string()),
            })
            .collect())
    }

    async fn create_network(
        &self,
        name: &str,
        driver: &str,
    ) -> Result<NetworkSummary, RuntimeError> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: driver.to_string(),
            ..Default::default()
        };
        let response = self
            .docker
            .create_network(options)
            .await
            .map_err(|e| map_err("networks.create", e))?;
        Ok(NetworkSummary {
            id: response.id.as_deref().map(short_id).unwrap_or_default(),
            name: name.to_string(),
            driver: driver.to_string(),
        })
    }

    async fn remove_network(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker.remove_network(name).await.map_err(|e| map_err("networks.remove", e))
    }
}
