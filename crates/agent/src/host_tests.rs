// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn memory_usage_is_consistent() {
    let probe = HostProbe::new();
    let usage = probe.memory();
    assert!(usage.total > 0);
    assert!(usage.used <= usage.total);
    assert!(usage.percent >= 0.0 && usage.percent <= 100.0);
}

#[test]
fn available_memory_fits_total() {
    let probe = HostProbe::new();
    assert!(probe.available_memory() <= probe.memory().total);
}

#[test]
fn hostname_and_kernel_are_nonempty() {
    let probe = HostProbe::new();
    assert!(!probe.hostname().is_empty());
    assert!(!probe.kernel().is_empty());
    assert!(!probe.arch().is_empty());
}

#[test]
fn pretty_name_parses_os_release() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("os-release");
    std::fs::write(&path, "NAME=Debian\nPRETTY_NAME=\"Debian GNU/Linux 12\"\n").unwrap();
    assert_eq!(pretty_name(&path).as_deref(), Some("Debian GNU/Linux 12"));
    assert_eq!(pretty_name(&dir.path().join("missing")), None);
}
