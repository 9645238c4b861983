//! Boot command integration tests.

use predicates::prelude::*;

use super::common::{ADDRESS, HOSTNAME, RUNTIME_HOSTS, TestEnv};

fn sh(script: &str) -> [&str; 4] {
  ["--", "/bin/sh", "-c", script]
}

#[test]
fn exit_code_is_passed_through() {
  let env = TestEnv::new();

  for code in [0, 1, 17, 137] {
    env
      .gsnode_cmd()
      .arg("boot")
      .args(sh(&format!("exit {}", code)))
      .assert()
      .code(code);
  }
}

#[test]
fn exit_code_is_passed_through_when_supervising() {
  let env = TestEnv::new();

  for code in [0, 1, 17, 137] {
    env
      .gsnode_cmd()
      .env("GSNODE_HANDOFF", "supervise")
      .arg("boot")
      .args(sh(&format!("exit {}", code)))
      .assert()
      .code(code);
  }
}

#[test]
fn supervised_signal_death_is_128_plus_signal() {
  let env = TestEnv::new();

  env
    .gsnode_cmd()
    .env("GSNODE_HANDOFF", "supervise")
    .arg("boot")
    .args(sh("kill -9 $$"))
    .assert()
    .code(137);
}

#[test]
fn hosts_table_is_patched_before_the_command_runs() {
  let env = TestEnv::new();
  let seen = env.output_path("seen");

  env
    .gsnode_cmd()
    .arg("boot")
    .args(sh(&format!("cp \"$GSNODE_HOSTS_FILE\" {}", seen.display())))
    .assert()
    .success();

  let expected_first = format!("{}\t{}\t# gsnode", ADDRESS, HOSTNAME);
  let patched = std::fs::read_to_string(&seen).unwrap();
  assert_eq!(patched.lines().next(), Some(expected_first.as_str()));
  assert_eq!(env.hosts(), patched);
  assert!(patched.ends_with(RUNTIME_HOSTS));
}

#[test]
fn boot_twice_equals_boot_once() {
  let env = TestEnv::new();

  env.gsnode_cmd().arg("boot").args(sh("exit 0")).assert().success();
  let once = env.hosts();

  env.gsnode_cmd().arg("boot").args(sh("exit 0")).assert().success();
  assert_eq!(env.hosts(), once);
  assert_eq!(once.matches("# gsnode").count(), 1);
}

#[test]
fn correct_hosts_table_is_left_byte_for_byte() {
  let env = TestEnv::new();
  let correct = format!("127.0.0.1 localhost\n{}   {}  # set by hand\n", ADDRESS, HOSTNAME);
  env.write_hosts(&correct);

  env.gsnode_cmd().arg("boot").args(sh("exit 0")).assert().success();

  assert_eq!(env.hosts(), correct);
}

#[test]
fn detection_failure_never_starts_the_command() {
  let env = TestEnv::new();
  let sentinel = env.output_path("started");

  env
    .gsnode_cmd()
    .env("GSNODE_ADVERTISE_ADDR", "127.0.0.1")
    .arg("boot")
    .args(["--", "/usr/bin/touch"])
    .arg(&sentinel)
    .assert()
    .code(200)
    .stdout(predicate::str::is_empty());

  assert!(!sentinel.exists());
  assert_eq!(env.hosts(), RUNTIME_HOSTS);
}

#[test]
fn missing_hosts_table_is_a_bootstrap_failure() {
  let env = TestEnv::new();
  let sentinel = env.output_path("started");
  std::fs::remove_file(env.hosts_path()).unwrap();

  env
    .gsnode_cmd()
    .arg("boot")
    .args(["--", "/usr/bin/touch"])
    .arg(&sentinel)
    .assert()
    .code(200);

  assert!(!sentinel.exists());
}

#[test]
fn missing_command_is_127() {
  let env = TestEnv::new();

  env
    .gsnode_cmd()
    .arg("boot")
    .args(["--", "/nonexistent/trainer"])
    .assert()
    .code(127);
}

#[test]
fn identity_is_exported() {
  let env = TestEnv::new();

  env
    .gsnode_cmd()
    .arg("boot")
    .args(sh("printf '%s %s' \"$GSNODE_NODE_NAME\" \"$GSNODE_NODE_ADDR\""))
    .assert()
    .success()
    .stdout(format!("{} {}", HOSTNAME, ADDRESS));
}

#[test]
fn search_path_is_appended() {
  let env = TestEnv::new();

  env
    .gsnode_cmd()
    .env("PYTHONPATH", "/a:/b")
    .arg("boot")
    .args(sh("printf %s \"$PYTHONPATH\""))
    .assert()
    .success()
    .stdout("/a:/b:/opt/ml/code/graphstorm/python");
}

#[test]
fn search_path_entry_already_present_is_not_duplicated() {
  let env = TestEnv::new();

  env
    .gsnode_cmd()
    .env("PYTHONPATH", "/opt/ml/code/graphstorm/python:/a")
    .arg("boot")
    .args(sh("printf %s \"$PYTHONPATH\""))
    .assert()
    .success()
    .stdout("/opt/ml/code/graphstorm/python:/a");
}

#[test]
fn configured_search_paths_are_used() {
  let env = TestEnv::with_config(
    r#"
search_paths = [
  { var = "PYTHONPATH", entries = ["/srv/code"] },
  { var = "LD_LIBRARY_PATH", entries = ["/opt/lib"] },
]
"#,
  );

  env
    .gsnode_cmd()
    .env_remove("LD_LIBRARY_PATH")
    .arg("boot")
    .args(sh("printf '%s|%s' \"$PYTHONPATH\" \"$LD_LIBRARY_PATH\""))
    .assert()
    .success()
    .stdout("/srv/code|/opt/lib");
}

#[test]
fn platform_host_becomes_an_alias() {
  let env = TestEnv::new();
  env.write_file(
    "resourceconfig.json",
    r#"{"current_host": "algo-2", "hosts": ["algo-1", "algo-2"], "network_interface_name": "eth0"}"#,
  );

  env
    .gsnode_cmd()
    .env("GSNODE_HOSTNAME", "ip-10-0-0-5")
    .arg("boot")
    .args(sh("exit 0"))
    .assert()
    .success();

  let first = env.hosts().lines().next().unwrap().to_string();
  assert_eq!(first, format!("{}\tip-10-0-0-5 algo-2\t# gsnode", ADDRESS));
}

#[test]
fn marker_is_exported_as_dev_type() {
  let env = TestEnv::new();
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .args(["resolve", "gpu", "--out"])
    .arg(&layer)
    .assert()
    .success();
  std::fs::copy(layer.join("variant.json"), env.marker_path()).unwrap();

  env
    .gsnode_cmd()
    .arg("boot")
    .args(sh("printf %s \"$dev_type\""))
    .assert()
    .success()
    .stdout("GPU");
}

#[test]
fn no_command_runs_the_default_shell() {
  let env = TestEnv::new();

  env
    .gsnode_cmd()
    .env("GSNODE_DEFAULT_SHELL", "/bin/sh")
    .arg("boot")
    .write_stdin("exit 5\n")
    .assert()
    .code(5);
}

#[test]
fn dry_run_writes_nothing_and_runs_nothing() {
  let env = TestEnv::new();
  let sentinel = env.output_path("started");

  env
    .gsnode_cmd()
    .args(["boot", "--dry-run", "--", "/usr/bin/touch"])
    .arg(&sentinel)
    .assert()
    .success()
    .stdout(predicate::str::is_empty())
    .stderr(predicate::str::contains("Would patch the hosts table"));

  assert!(!sentinel.exists());
  assert_eq!(env.hosts(), RUNTIME_HOSTS);
}
