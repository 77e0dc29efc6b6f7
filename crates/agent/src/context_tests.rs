// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::runtime::FakeRuntime;
use tomo_core::AgentConfigUpdate;
use tomo_guard::RecordingSink;

fn context() -> AgentContext {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::open(dir.path()).unwrap());
    std::mem::forget(dir); // keep tempdir alive for the test process
    AgentContext::new(
        AgentConfig::default(),
        store,
        Arc::new(FakeRuntime::new()),
        Arc::new(RecordingSink::new()),
    )
}

#[test]
fn config_swap_is_copy_on_write() {
    let ctx = context();
    let before = ctx.current_config();

    let mut next = (*before).clone();
    next.merge(AgentConfigUpdate { metrics_interval: Some(5), ..Default::default() });
    ctx.set_config(next);

    // The old snapshot is unchanged; new readers see the update
    assert_eq!(before.metrics_interval, 30);
    assert_eq!(ctx.current_config().metrics_interval, 5);
}

#[test]
fn agent_id_starts_unset() {
    let ctx = context();
    assert!(ctx.agent_id().is_none());
    ctx.set_agent_id(AgentId::from_string("agt-1"));
    assert_eq!(ctx.agent_id().map(|id| id.to_string()), Some("agt-1".to_string()));
}

#[test]
fn uptime_is_monotonic() {
    let ctx = context();
    let first = ctx.uptime_secs();
    assert!(ctx.uptime_secs() >= first);
}
