// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn resource_usage_computes_percent() {
    let usage = ResourceUsage::new(512, 1024);
    assert!((usage.percent - 50.0).abs() < f64::EPSILON);
}

#[test]
fn resource_usage_zero_total_is_zero_percent() {
    let usage = ResourceUsage::new(0, 0);
    assert_eq!(usage.percent, 0.0);
}

#[test]
fn metrics_report_wire_shape() {
    let report = MetricsReport {
        cpu: 12.5,
        memory: ResourceUsage::new(1, 2),
        disk: ResourceUsage::new(3, 4),
        containers: ContainerCounts { running: 2, stopped: 1 },
    };
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["cpu"], 12.5);
    assert_eq!(value["memory"]["used"], 1);
    assert_eq!(value["containers"]["running"], 2);
}

#[test]
fn health_report_roundtrip() {
    let report = HealthReport { status: "healthy".into(), uptime: 42, version: "1.0.0".into() };
    let json = serde_json::to_string(&report).unwrap();
    let back: HealthReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}
