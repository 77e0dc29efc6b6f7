// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host inspection via sysinfo.
//!
//! These calls block (CPU sampling sleeps for the refresh interval);
//! async callers wrap them in `spawn_blocking`.

use parking_lot::Mutex;
use std::path::Path;
use sysinfo::{Disks, System};
use tomo_core::ResourceUsage;

/// When the host filesystem is mounted into the agent container it sits
/// under `/host`; disk and OS probes prefer it.
const HOST_PREFIX: &str = "/host";

/// Cached sysinfo handle.
pub struct HostProbe {
    system: Mutex<System>,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe {
    pub fn new() -> Self {
        Self { system: Mutex::new(System::new()) }
    }

    /// CPU usage percent across all cores. Blocks for one sample interval.
    pub fn cpu_percent(&self) -> f64 {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu_usage();
        system.global_cpu_usage() as f64
    }

    pub fn memory(&self) -> ResourceUsage {
        let mut system = self.system.lock();
        system.refresh_memory();
        ResourceUsage::new(system.used_memory(), system.total_memory())
    }

    /// Free memory in bytes (available, not just unused).
    pub fn available_memory(&self) -> u64 {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.available_memory()
    }

    /// Usage of the disk backing the host root.
    pub fn disk(&self) -> ResourceUsage {
        let disks = Disks::new_with_refreshed_list();
        let target = if Path::new(HOST_PREFIX).exists() { HOST_PREFIX } else { "/" };
        let disk = disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point().to_string_lossy().as_ref()))
            .max_by_key(|d| d.mount_point().as_os_str().len());
        match disk {
            Some(disk) => {
                let total = disk.total_space();
                ResourceUsage::new(total.saturating_sub(disk.available_space()), total)
            }
            None => ResourceUsage::default(),
        }
    }

    /// Free disk space in bytes on the host root.
    pub fn available_disk(&self) -> u64 {
        let usage = self.disk();
        usage.total.saturating_sub(usage.used)
    }

    pub fn hostname(&self) -> String {
        System::host_name().unwrap_or_else(|| "unknown".to_string())
    }

    pub fn kernel(&self) -> String {
        System::kernel_version().unwrap_or_else(|| "unknown".to_string())
    }

    pub fn arch(&self) -> String {
        std::env::consts::ARCH.to_string()
    }

    /// Pretty OS name, preferring the host's os-release over the
    /// container's.
    pub fn os_info(&self) -> String {
        for path in ["/host/etc/os-release", "/etc/os-release"] {
            if let Some(name) = pretty_name(Path::new(path)) {
                return name;
            }
        }
        System::long_os_version().unwrap_or_else(|| "unknown".to_string())
    }
}

fn pretty_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        line.strip_prefix("PRETTY_NAME=").map(|v| v.trim().trim_matches('"').to_string())
    })
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
