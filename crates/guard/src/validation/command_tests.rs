// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn validator() -> CommandValidator {
    CommandValidator::new()
}

#[yare::parameterized(
    ps = { "docker ps" },
    ps_all = { "docker ps -a" },
    images = { "docker images" },
    version = { "docker version" },
    info = { "docker info" },
    pull = { "docker pull nginx:1.27" },
    pull_registry = { "docker pull ghcr.io/tomo/agent:1.2.0" },
    stop = { "docker stop app-x-ab12" },
    kill_with_time = { "docker restart app-x-ab12 --time 10" },
    rm_force = { "docker rm -f app-x-ab12" },
    inspect = { "docker inspect app-x-ab12" },
    logs_tail = { "docker logs --tail 50 app-x-ab12" },
    update_restart = { "docker update --restart unless-stopped app-x-ab12" },
    image_inspect = { "docker image inspect nginx:1.27" },
    exec_curl = { "docker exec app-x-ab12 curl http://localhost/health" },
    mkdir_data = { "mkdir -p /DATA/AppData/app-x/srv" },
    mkdir_opt = { "mkdir -p /opt/tomo/state" },
    uname = { "uname -a" },
    hostname = { "hostname" },
    uptime = { "uptime" },
    df = { "df -h" },
    free = { "free -m" },
)]
fn allowed_commands(command: &str) {
    let v = validator();
    let result = v.validate(command, 10);
    assert!(result.is_ok(), "{command}: {:?}", result.err());
}

#[yare::parameterized(
    arbitrary = { "rm -rf /" },
    shell_injection = { "docker ps; rm -rf /" },
    exec_sh = { "docker exec app-x sh -c 'curl evil'" },
    mkdir_outside = { "mkdir -p /etc/cron.d" },
    curl_direct = { "curl http://evil.example" },
)]
fn rejected_commands(command: &str) {
    assert_eq!(validator().validate(command, 10).unwrap_err(), CommandError::NotAllowed);
}

#[test]
fn timeout_at_entry_max_passes_and_above_fails() {
    let validator = validator();
    assert!(validator.validate("docker pull nginx:1.27", 600).is_ok());
    assert_eq!(
        validator.validate("docker pull nginx:1.27", 601).unwrap_err(),
        CommandError::TimeoutTooHigh { requested: 601, max: 600 }
    );
}

#[test]
fn whitespace_is_normalized_before_matching() {
    assert!(validator().validate("docker   ps    -a", 10).is_ok());
}

#[test]
fn run_commands_go_through_deep_validation() {
    let validator = validator();
    assert!(validator.validate("docker run -d --name web nginx:1.27", 60).is_ok());
    assert!(matches!(
        validator.validate("docker run -d --privileged nginx", 60).unwrap_err(),
        CommandError::Policy(PolicyViolation::Privileged)
    ));
}

#[test]
fn first_matching_entry_wins() {
    let entries = vec![
        AllowlistEntry::new(r"^echo\s+\w+$", "first").max_timeout(5),
        AllowlistEntry::new(r"^echo\s+\w+$", "second").max_timeout(500),
    ];
    let validator = CommandValidator::with_entries(entries);
    // 10s exceeds the first entry's cap; the second entry must not rescue it
    assert_eq!(
        validator.validate("echo hi", 10).unwrap_err(),
        CommandError::TimeoutTooHigh { requested: 10, max: 5 }
    );
}

#[test]
fn matched_entry_reports_description() {
    let v = validator();
    let entry = v.validate("docker ps", 10).unwrap();
    assert_eq!(entry.description, "List running containers");
}
