//! Resolve command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const GPU_INDEX: &str = "https://data.dgl.ai/wheels/cu117/repo.html";
const CPU_INDEX: &str = "https://data.dgl.ai/wheels/repo.html";

fn read(path: &std::path::Path) -> String {
  std::fs::read_to_string(path).unwrap()
}

fn marker(layer: &std::path::Path) -> serde_json::Value {
  serde_json::from_str(&read(&layer.join("variant.json"))).unwrap()
}

#[test]
fn gpu_layer_has_only_the_gpu_branch() {
  let env = TestEnv::new();
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .args(["resolve", "gpu", "--out"])
    .arg(&layer)
    .assert()
    .success()
    .stdout(predicate::str::contains("GPU"));

  assert_eq!(marker(&layer)["dev_type"], "GPU");

  let dockerfile = read(&layer.join("Dockerfile"));
  assert!(dockerfile.contains("ENV dev_type=GPU"));
  assert!(dockerfile.contains("LABEL dev_type=\"GPU\""));
  assert!(dockerfile.contains(GPU_INDEX));
  assert!(!dockerfile.contains(CPU_INDEX));
  assert!(dockerfile.contains("dgl==1.0.4+cu117"));

  let requirements = read(&layer.join("requirements.txt"));
  assert!(requirements.contains("dgl==1.0.4+cu117"));
  assert!(!requirements.contains(CPU_INDEX));
}

#[test]
fn cpu_layer_has_only_the_cpu_branch() {
  let env = TestEnv::new();
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .args(["resolve", "CPU", "--out"])
    .arg(&layer)
    .assert()
    .success();

  assert_eq!(marker(&layer)["dev_type"], "CPU");

  let dockerfile = read(&layer.join("Dockerfile"));
  assert!(dockerfile.contains("ENV dev_type=CPU"));
  assert!(dockerfile.contains(CPU_INDEX));
  assert!(!dockerfile.contains(GPU_INDEX));
  assert!(!dockerfile.contains("+cu117"));
}

#[test]
fn layer_extends_search_path_and_sets_entrypoint() {
  let env = TestEnv::new();
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .args(["resolve", "gpu", "--out"])
    .arg(&layer)
    .assert()
    .success();

  let dockerfile = read(&layer.join("Dockerfile"));
  assert!(dockerfile.contains("ENV PYTHONPATH=\"${PYTHONPATH:+${PYTHONPATH}:}/opt/ml/code/graphstorm/python\""));
  assert!(dockerfile.contains("ENTRYPOINT [\"/usr/local/bin/gsnode\",\"boot\",\"--\"]"));
  assert!(dockerfile.contains("COPY variant.json /etc/gsnode/variant.json"));
  assert!(dockerfile.contains("COPY gsnode /usr/local/bin/gsnode"));
  assert!(layer.join("gsnode").is_file());
}

#[test]
fn configured_binary_is_staged_into_the_layer() {
  let env = TestEnv::new();
  env.write_file("build/gsnode", "built elsewhere");
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .env("GSNODE_BINARY", env.output_path("build/gsnode"))
    .args(["resolve", "cpu", "--out"])
    .arg(&layer)
    .assert()
    .success();

  assert_eq!(read(&layer.join("gsnode")), "built elsewhere");
}

#[test]
fn missing_binary_writes_no_layer() {
  let env = TestEnv::new();
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .env("GSNODE_BINARY", env.output_path("no-such-binary"))
    .args(["resolve", "cpu", "--out"])
    .arg(&layer)
    .assert()
    .code(2);

  assert!(!layer.exists());
}

#[test]
fn selector_from_environment() {
  let env = TestEnv::new();
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .env("GSNODE_DEVICE", "gpu")
    .args(["resolve", "--out"])
    .arg(&layer)
    .assert()
    .success();

  assert_eq!(marker(&layer)["dev_type"], "GPU");
}

#[test]
fn existing_output_needs_force() {
  let env = TestEnv::new();
  let layer = env.output_path("layer");
  env.write_file("layer/keep", "x");

  env
    .gsnode_cmd()
    .args(["resolve", "gpu", "--out"])
    .arg(&layer)
    .assert()
    .code(2)
    .stderr(predicate::str::contains("--force"));
  assert!(layer.join("keep").exists());

  env
    .gsnode_cmd()
    .args(["resolve", "gpu", "--force", "--out"])
    .arg(&layer)
    .assert()
    .success();
  assert!(!layer.join("keep").exists());
  assert_eq!(marker(&layer)["dev_type"], "GPU");
}

#[test]
fn declared_variant_resolves_without_touching_builtins() {
  let env = TestEnv::from_fixture("trn_variant.toml");
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .args(["resolve", "trn", "--json", "--out"])
    .arg(&layer)
    .assert()
    .success()
    .stdout(predicate::str::contains("\"dev_type\": \"TRN\""));

  let dockerfile = read(&layer.join("Dockerfile"));
  assert!(dockerfile.contains("FROM example.com/neuron-training:1.13.1-neuron-py39-ubuntu20.04"));
  assert!(dockerfile.contains("torch-neuronx==1.13.1.1.7.0"));

  env
    .gsnode_cmd()
    .arg("variants")
    .assert()
    .success()
    .stdout(predicate::str::contains("trn").and(predicate::str::contains("gpu")));
}

#[test]
fn duplicate_package_in_declared_variant_exits_2() {
  let env = TestEnv::with_config(
    r#"
[[variants]]
selector = "trn"
label = "TRN"
base_image = "example.com/neuron"
dependencies = [
  { name = "torch_neuronx", version = "1" },
  { name = "Torch-Neuronx", version = "2" },
]
"#,
  );
  let layer = env.output_path("layer");

  env
    .gsnode_cmd()
    .args(["resolve", "trn", "--out"])
    .arg(&layer)
    .assert()
    .code(2)
    .stderr(predicate::str::contains("more than once"));
  assert!(!layer.exists());
}

#[test]
fn same_variant_renders_the_same_fingerprint() {
  let env = TestEnv::new();
  let first = env.output_path("first");
  let second = env.output_path("second");

  for out in [&first, &second] {
    env
      .gsnode_cmd()
      .args(["resolve", "gpu", "--out"])
      .arg(out)
      .assert()
      .success();
  }

  assert_eq!(marker(&first)["fingerprint"], marker(&second)["fingerprint"]);
  assert_eq!(read(&first.join("Dockerfile")), read(&second.join("Dockerfile")));
}
