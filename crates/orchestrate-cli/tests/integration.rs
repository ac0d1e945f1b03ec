#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn orchestrate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("orchestrate").unwrap();
    cmd.current_dir(dir.path())
        .env("ORCHESTRATE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

const THREE_TIER: &str = "\
components:
  - name: frontend
    context: web
    image: app/frontend:1
    port: 80
    depends_on: [backend]
  - name: backend
    context: api
    image: app/backend:1
    port: 8080
    depends_on: [storage]
  - name: storage
    context: db
    image: app/storage:1
    port: 5432
";

fn write_plan(dir: &TempDir, yaml: &str) {
    std::fs::write(dir.path().join("plan.yaml"), yaml).unwrap();
}

/// Plan plus a build context with a Dockerfile for every component.
fn three_tier_project(dir: &TempDir) {
    write_plan(dir, THREE_TIER);
    for ctx in ["web", "api", "db"] {
        let path = dir.path().join(ctx);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("Dockerfile"), "FROM scratch\n").unwrap();
    }
}

fn write_config(dir: &TempDir, yaml: &str) {
    let path = dir.path().join(".orchestrate");
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("config.yaml"), yaml).unwrap();
}

fn run_records(dir: &TempDir) -> Vec<serde_json::Value> {
    let runs = dir.path().join(".orchestrate/runs");
    let mut out = Vec::new();
    for entry in std::fs::read_dir(runs).unwrap() {
        let text = std::fs::read_to_string(entry.unwrap().path()).unwrap();
        out.push(serde_json::from_str(&text).unwrap());
    }
    out
}

// ---------------------------------------------------------------------------
// Plan validation
// ---------------------------------------------------------------------------

#[test]
fn dry_run_prints_startup_order() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, THREE_TIER);

    let out = orchestrate(&dir).arg("--dry-run").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let storage = stdout.find("storage").unwrap();
    let backend = stdout.find("backend").unwrap();
    let frontend = stdout.find("frontend").unwrap();
    assert!(storage < backend && backend < frontend, "{stdout}");
}

#[test]
fn dry_run_json_lists_ranks() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, THREE_TIER);

    let out = orchestrate(&dir)
        .args(["--dry-run", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let order: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(order[0]["component"], "storage");
    assert_eq!(order[0]["rank"], 1);
    assert_eq!(order[2]["component"], "frontend");
    assert_eq!(order[2]["depends_on"][0], "backend");
}

#[test]
fn cyclic_plan_exits_4_before_any_tool_runs() {
    let dir = TempDir::new().unwrap();
    write_plan(
        &dir,
        "\
components:
  - name: a
    context: a
    image: app/a:1
    port: 80
    depends_on: [b]
  - name: b
    context: b
    image: app/b:1
    port: 80
    depends_on: [a]
",
    );
    // A docker that could not possibly run proves nothing was invoked.
    write_config(&dir, "tools:\n  docker: no-such-docker-binary\n");

    orchestrate(&dir)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("dependency cycle"));
    assert!(!dir.path().join(".orchestrate/runs").exists());
}

#[test]
fn unknown_dependency_exits_4() {
    let dir = TempDir::new().unwrap();
    write_plan(
        &dir,
        "components:\n  - name: web\n    context: web\n    image: app/web:1\n    port: 80\n    depends_on: [cache]\n",
    );
    orchestrate(&dir)
        .arg("--dry-run")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("unknown component 'cache'"));
}

#[test]
fn unknown_plan_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_plan(
        &dir,
        "components:\n  - name: web\n    context: web\n    image: app/web:1\n    port: 80\n    replica: 3\n",
    );
    orchestrate(&dir).arg("--dry-run").assert().code(4);
}

#[test]
fn missing_plan_exits_4() {
    let dir = TempDir::new().unwrap();
    orchestrate(&dir)
        .arg("--dry-run")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("plan.yaml"));
}

#[test]
fn explicit_plan_path_is_used() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("staging.yaml"), THREE_TIER).unwrap();
    orchestrate(&dir)
        .args(["--dry-run", "--plan"])
        .arg(dir.path().join("staging.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("frontend"));
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[test]
fn zero_poll_interval_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, THREE_TIER);
    write_config(&dir, "readiness:\n  poll_interval_secs: 0\n");
    orchestrate(&dir)
        .arg("--dry-run")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("poll_interval_secs"));
}

#[test]
fn flag_overrides_config_readiness() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, THREE_TIER);
    write_config(&dir, "readiness:\n  poll_interval_secs: 0\n");
    orchestrate(&dir)
        .args(["--dry-run", "--poll-interval", "1"])
        .assert()
        .success();
}

#[test]
fn missing_tool_exits_4() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    write_config(&dir, "tools:\n  docker: no-such-docker-binary\n");
    orchestrate(&dir)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("no-such-docker-binary"));
}

// ---------------------------------------------------------------------------
// Runs against stand-in tools
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn build_failure_exits_1_and_records_the_run() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    write_config(&dir, "tools:\n  docker: \"false\"\n  kubectl: \"true\"\n");

    orchestrate(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("build failed for 'storage'"))
        .stderr(predicate::str::contains("remain in the cluster").not());

    let records = run_records(&dir);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["outcome"]["type"], "failed");
    assert_eq!(record["outcome"]["stage"], "build");
    assert_eq!(record["outcome"]["exit_code"], 1);
    assert!(record.get("applied").is_none());

    let id = record["id"].as_str().unwrap();
    let log = dir
        .path()
        .join(".orchestrate/logs")
        .join(id)
        .join("storage.build.log");
    assert!(log.exists());
}

#[cfg(unix)]
#[test]
fn missing_build_context_fails_before_building() {
    let dir = TempDir::new().unwrap();
    write_plan(&dir, THREE_TIER);
    write_config(&dir, "tools:\n  docker: \"true\"\n  kubectl: \"true\"\n");
    orchestrate(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[cfg(unix)]
#[test]
fn render_writes_resource_set_without_applying() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    write_config(&dir, "tools:\n  docker: \"true\"\n  kubectl: \"false\"\n");
    let out = dir.path().join("rendered.yaml");

    orchestrate(&dir)
        .arg("--render")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("resource set written"));

    let yaml = std::fs::read_to_string(&out).unwrap();
    assert_eq!(yaml.matches("kind: Deployment").count(), 3);
    assert_eq!(yaml.matches("kind: Service").count(), 3);
    let storage = yaml.find("name: storage").unwrap();
    let frontend = yaml.find("name: frontend").unwrap();
    assert!(storage < frontend);
}

/// Write an executable shell script into the project and return its path.
#[cfg(unix)]
fn stand_in(dir: &TempDir, name: &str, script: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{script}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
const ROLLED_OUT: &str = r#"{"metadata":{"generation":1},"spec":{"replicas":1},"status":{"observedGeneration":1,"replicas":1,"updatedReplicas":1,"readyReplicas":1,"availableReplicas":1}}"#;

#[cfg(unix)]
const NOT_READY: &str = r#"{"metadata":{"generation":1},"spec":{"replicas":1},"status":{"observedGeneration":1,"replicas":1,"updatedReplicas":1,"readyReplicas":0}}"#;

/// kubectl that accepts the resource set (saving it next to itself) and
/// answers every status query with `status`.
#[cfg(unix)]
fn fake_kubectl(dir: &TempDir, status: &str) -> std::path::PathBuf {
    let script = r#"case "$*" in
  *" apply "*)
    cat > "$0.applied"
    for n in storage backend frontend; do
      echo "deployment.apps/$n created"
      echo "service/$n created"
    done
    ;;
  *" get "*)
    echo 'STATUS'
    ;;
esac
"#;
    stand_in(dir, "fake-kubectl", &script.replace("STATUS", status))
}

#[cfg(unix)]
fn rejecting_kubectl(dir: &TempDir) -> std::path::PathBuf {
    stand_in(
        dir,
        "rejecting-kubectl",
        "cat > /dev/null\necho 'Error from server (Forbidden): admission webhook denied the request' >&2\nexit 1\n",
    )
}

#[cfg(unix)]
const DIGEST: &str = "sha256:abababababababababababababababababababababababababababababababab";

/// docker whose builds always succeed; `push` succeeds with a digest or is denied.
#[cfg(unix)]
fn fake_docker(dir: &TempDir, push_ok: bool) -> std::path::PathBuf {
    let push = if push_ok {
        format!("echo \"The push refers to repository [$2]\"\n    echo \"1: digest: {DIGEST} size: 1570\"")
    } else {
        "echo 'denied: requested access to the resource is denied' >&2\n    exit 1".to_string()
    };
    let script = format!("case \"$1\" in\n  push)\n    {push}\n    ;;\nesac\nexit 0\n");
    stand_in(dir, "fake-docker", &script)
}

#[cfg(unix)]
fn use_tools(dir: &TempDir, docker: &std::path::Path, kubectl: &std::path::Path) {
    write_config(
        dir,
        &format!(
            "tools:\n  docker: {}\n  kubectl: {}\n",
            docker.display(),
            kubectl.display()
        ),
    );
}

#[cfg(unix)]
#[test]
fn full_run_reports_every_component_ready() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    let kubectl = fake_kubectl(&dir, ROLLED_OUT);
    write_config(
        &dir,
        &format!(
            "tools:\n  docker: \"true\"\n  kubectl: {}\n",
            kubectl.display()
        ),
    );

    let out = orchestrate(&dir).arg("--json").output().unwrap();
    assert!(
        out.status.success(),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let record: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(record["outcome"]["type"], "succeeded");
    assert_eq!(record["push"], false);
    let readiness = record["readiness"].as_array().unwrap();
    assert_eq!(readiness.len(), 3);
    assert!(readiness.iter().all(|r| r["state"] == "ready"));
    assert_eq!(record["applied"]["resources"].as_array().unwrap().len(), 6);
    assert!(record["publishes"]
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["type"] == "skipped"));

    orchestrate(&dir)
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded"));
}

#[cfg(unix)]
#[test]
fn push_publishes_and_pins_digests() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    let docker = fake_docker(&dir, true);
    let kubectl = fake_kubectl(&dir, ROLLED_OUT);
    use_tools(&dir, &docker, &kubectl);

    let out = orchestrate(&dir).args(["--push", "--json"]).output().unwrap();
    assert!(
        out.status.success(),
        "{}",
        String::from_utf8_lossy(&out.stderr)
    );
    let record: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(record["push"], true);
    let publishes = record["publishes"].as_array().unwrap();
    assert_eq!(publishes.len(), 3);
    assert!(publishes
        .iter()
        .all(|p| p["type"] == "published" && p["digest"] == DIGEST));

    let applied = std::fs::read_to_string(dir.path().join("fake-kubectl.applied")).unwrap();
    assert!(applied.contains(&format!("app/storage:1@{DIGEST}")), "{applied}");
}

#[cfg(unix)]
#[test]
fn denied_push_exits_2_without_touching_the_cluster() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    let docker = fake_docker(&dir, false);
    let kubectl = fake_kubectl(&dir, ROLLED_OUT);
    use_tools(&dir, &docker, &kubectl);

    orchestrate(&dir)
        .arg("--push")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("publish failed for 'storage'"))
        .stderr(predicate::str::contains("remain in the cluster").not());

    assert!(!dir.path().join("fake-kubectl.applied").exists());
    let record = &run_records(&dir)[0];
    assert_eq!(record["outcome"]["stage"], "publish");
    assert_eq!(record["outcome"]["exit_code"], 2);
    assert!(record.get("applied").is_none());
}

#[cfg(unix)]
#[test]
fn without_push_flag_docker_push_never_runs() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    // Any push would fail this run.
    let docker = fake_docker(&dir, false);
    let kubectl = fake_kubectl(&dir, ROLLED_OUT);
    use_tools(&dir, &docker, &kubectl);

    orchestrate(&dir).assert().success();
}

#[cfg(unix)]
#[test]
fn rejected_apply_exits_3_and_notes_cluster_state() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    let kubectl = rejecting_kubectl(&dir);
    write_config(
        &dir,
        &format!("tools:\n  docker: \"true\"\n  kubectl: {}\n", kubectl.display()),
    );

    orchestrate(&dir)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("cluster rejected resource set"))
        .stderr(predicate::str::contains("admission webhook denied"))
        .stderr(predicate::str::contains(
            "note: resources applied before the failure remain in the cluster",
        ));

    let record = &run_records(&dir)[0];
    assert_eq!(record["outcome"]["stage"], "apply");
    assert_eq!(record["outcome"]["exit_code"], 3);
}

#[cfg(unix)]
#[test]
fn readiness_deadline_exits_3_and_keeps_partial_state() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    let kubectl = fake_kubectl(&dir, NOT_READY);
    write_config(
        &dir,
        &format!("tools:\n  docker: \"true\"\n  kubectl: {}\n", kubectl.display()),
    );

    orchestrate(&dir)
        .args(["--deadline", "1", "--poll-interval", "1"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("'storage' did not become ready within 1s"))
        .stderr(predicate::str::contains("remain in the cluster"));

    let record = &run_records(&dir)[0];
    assert_eq!(record["outcome"]["stage"], "readiness");
    assert_eq!(record["outcome"]["component"], "storage");
    assert_eq!(record["applied"]["resources"].as_array().unwrap().len(), 6);
    let states: Vec<&str> = record["readiness"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["state"].as_str().unwrap())
        .collect();
    assert_eq!(states, vec!["failed", "pending", "pending"]);
}

#[cfg(unix)]
#[test]
fn runs_limit_zero_reports_hidden_records() {
    let dir = TempDir::new().unwrap();
    three_tier_project(&dir);
    write_config(&dir, "tools:\n  docker: \"false\"\n  kubectl: \"true\"\n");
    orchestrate(&dir).assert().code(1);

    orchestrate(&dir)
        .args(["runs", "--limit", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 of 1 runs shown"));
}

#[test]
fn runs_with_no_history() {
    let dir = TempDir::new().unwrap();
    orchestrate(&dir)
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("no runs recorded"));
}
