use std::error::Error;
use std::process::{Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Returns true if the given binary is accessible in PATH.
fn tool_available(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

const OPERATOR_NAMESPACE: &str = "metal3-remediation-system";
const TEST_NAMESPACE: &str = "metal3-e2e";
const OPERATOR_NAME: &str = "metal3-remediation-controller";
const HOST_NAME: &str = "e2e-worker-0";
const MACHINE_NAME: &str = "e2e-worker-0";
const REMEDIATION_NAME: &str = "e2e-worker-0";
const NODE_NAME: &str = "e2e-worker-0-node";

/// End-to-end test exercising the full reboot-remediation lifecycle against
/// a real Kind cluster: create an unhealthy `Machine`/`BareMetalHost`/`Node`
/// triple, apply a `Metal3Remediation`, and watch the controller power the
/// host off, delete the stale `Node`, power the host back on, and retire the
/// `Metal3Remediation` once the node rejoins (spec.md §8, scenario S1).
///
/// Run with: `cargo test --test e2e_kind -- --ignored`
#[test]
#[ignore]
fn e2e_reboot_remediation_lifecycle() -> Result<(), Box<dyn Error>> {
    for tool in &["kind", "kubectl", "docker"] {
        if !tool_available(tool) {
            eprintln!("Skipping e2e test: `{tool}` not found in PATH.");
            return Ok(());
        }
    }

    let cluster_name =
        std::env::var("KIND_CLUSTER_NAME").unwrap_or_else(|_| "metal3-remediation-e2e".into());
    ensure_kind_cluster(&cluster_name)?;

    // ── Install CRDs ──────────────────────────────────────────────────────
    // This controller's own CRDs, plus minimal stand-ins for the external
    // `BareMetalHost` / `Machine` CRDs it reads and patches a subset of.
    kubectl_apply(&remediation_crd_yaml())?;
    kubectl_apply(&baremetalhost_crd_yaml())?;
    kubectl_apply(&machine_crd_yaml())?;

    // ── Deploy the operator ───────────────────────────────────────────────
    let image = std::env::var("E2E_OPERATOR_IMAGE")
        .unwrap_or_else(|_| "metal3-remediation-controller:e2e".into());
    let build_image = env_true("E2E_BUILD_IMAGE", true);
    let load_image = env_true("E2E_LOAD_IMAGE", true);

    if build_image {
        run_cmd("docker", &["build", "-t", &image, "."])?;
    }
    if load_image {
        run_cmd(
            "kind",
            &["load", "docker-image", &image, "--name", &cluster_name],
        )?;
    }

    let operator_yaml = operator_manifest(&image);
    let _cleanup = E2eCleanup::new(operator_yaml.clone());

    run_cmd(
        "kubectl",
        &[
            "create",
            "namespace",
            OPERATOR_NAMESPACE,
            "--dry-run=client",
            "-o",
            "yaml",
        ],
    )
    .and_then(|output| kubectl_apply(&output))?;

    kubectl_apply(&operator_yaml)?;
    run_cmd(
        "kubectl",
        &[
            "rollout",
            "status",
            &format!("deployment/{OPERATOR_NAME}"),
            "-n",
            OPERATOR_NAMESPACE,
            "--timeout=180s",
        ],
    )?;

    run_cmd(
        "kubectl",
        &[
            "create",
            "namespace",
            TEST_NAMESPACE,
            "--dry-run=client",
            "-o",
            "yaml",
        ],
    )
    .and_then(|output| kubectl_apply(&output))?;

    // ── Scenario S1 fixture: unhealthy Machine backed by a powered-on Host ──
    kubectl_apply(&node_manifest())?;
    kubectl_apply(&baremetalhost_manifest())?;
    kubectl_apply(&machine_manifest())?;
    kubectl_apply(&remediation_manifest())?;

    // ── Step 1: controller requests power-off ──────────────────────────────
    wait_for("BareMetalHost powered off", Duration::from_secs(90), || {
        let online = run_cmd(
            "kubectl",
            &[
                "get",
                "baremetalhost",
                HOST_NAME,
                "-n",
                TEST_NAMESPACE,
                "-o",
                "jsonpath={.spec.online}",
            ],
        )?;
        Ok(online == "false")
    })?;

    // ── Step 2: stale Node removed once the host confirms power-off ────────
    wait_for("stale Node deleted", Duration::from_secs(90), || {
        Ok(run_cmd("kubectl", &["get", "node", NODE_NAME]).is_err())
    })?;

    // ── Step 3: controller requests power back on ──────────────────────────
    wait_for("BareMetalHost powered back on", Duration::from_secs(90), || {
        let online = run_cmd(
            "kubectl",
            &[
                "get",
                "baremetalhost",
                HOST_NAME,
                "-n",
                TEST_NAMESPACE,
                "-o",
                "jsonpath={.spec.online}",
            ],
        )?;
        Ok(online == "true")
    })?;

    // Node controller (out of scope for this repo) rejoining is simulated by
    // re-creating the Node once the host reports powered on, matching what a
    // real kubelet would do after the machine reboots.
    kubectl_apply(&node_manifest())?;

    // ── Step 4: Metal3Remediation is retired once the node is healthy ──────
    wait_for("Metal3Remediation deleted", Duration::from_secs(120), || {
        Ok(run_cmd(
            "kubectl",
            &["get", "metal3remediation", REMEDIATION_NAME, "-n", TEST_NAMESPACE],
        )
        .is_err())
    })?;

    Ok(())
}

fn node_manifest() -> String {
    format!(
        r#"apiVersion: v1
kind: Node
metadata:
  name: {node_name}
spec: {{}}
status:
  conditions:
    - type: Ready
      status: "True"
"#,
        node_name = NODE_NAME,
    )
}

fn baremetalhost_manifest() -> String {
    format!(
        r#"apiVersion: metal3.io/v1alpha1
kind: BareMetalHost
metadata:
  name: {host_name}
  namespace: {namespace}
spec:
  online: true
status:
  poweredOn: true
"#,
        host_name = HOST_NAME,
        namespace = TEST_NAMESPACE,
    )
}

fn machine_manifest() -> String {
    format!(
        r#"apiVersion: machine.openshift.io/v1beta1
kind: Machine
metadata:
  name: {machine_name}
  namespace: {namespace}
  annotations:
    metal3.io/BareMetalHost: {namespace}/{host_name}
  labels:
    machine.openshift.io/cluster-api-machine-role: master
status:
  nodeRef:
    name: {node_name}
"#,
        machine_name = MACHINE_NAME,
        namespace = TEST_NAMESPACE,
        host_name = HOST_NAME,
        node_name = NODE_NAME,
    )
}

fn remediation_manifest() -> String {
    format!(
        r#"apiVersion: infrastructure.cluster.x-k8s.io/v1beta1
kind: Metal3Remediation
metadata:
  name: {name}
  namespace: {namespace}
  ownerReferences:
    - apiVersion: machine.openshift.io/v1beta1
      kind: Machine
      name: {machine_name}
      uid: {machine_name}
      controller: true
      blockOwnerDeletion: true
spec:
  strategy:
    type: Reboot
    retryLimit: 1
    timeout: 60s
"#,
        name = REMEDIATION_NAME,
        namespace = TEST_NAMESPACE,
        machine_name = MACHINE_NAME,
    )
}

// The `crdgen` binary emits both owned CRDs (Metal3Remediation and
// Metal3RemediationTemplate) as one multi-document YAML stream.
fn remediation_crd_yaml() -> String {
    run_cmd_binary_with_args("crdgen", &[]).unwrap_or_else(|_| String::new())
}

fn baremetalhost_crd_yaml() -> String {
    r#"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: baremetalhosts.metal3.io
spec:
  group: metal3.io
  scope: Namespaced
  names:
    plural: baremetalhosts
    singular: baremetalhost
    kind: BareMetalHost
  versions:
    - name: v1alpha1
      served: true
      storage: true
      schema:
        openAPIV3Schema:
          type: object
          x-kubernetes-preserve-unknown-fields: true
"#
    .to_string()
}

fn machine_crd_yaml() -> String {
    r#"apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: machines.machine.openshift.io
spec:
  group: machine.openshift.io
  scope: Namespaced
  names:
    plural: machines
    singular: machine
    kind: Machine
  versions:
    - name: v1beta1
      served: true
      storage: true
      schema:
        openAPIV3Schema:
          type: object
          x-kubernetes-preserve-unknown-fields: true
"#
    .to_string()
}

fn operator_manifest(image: &str) -> String {
    format!(
        r#"---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: {operator_name}
  namespace: {operator_namespace}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: {operator_name}
rules:
  - apiGroups: ["infrastructure.cluster.x-k8s.io"]
    resources: ["metal3remediations", "metal3remediationtemplates"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
  - apiGroups: ["infrastructure.cluster.x-k8s.io"]
    resources: ["metal3remediations/status", "metal3remediations/finalizers"]
    verbs: ["get", "update", "patch"]
  - apiGroups: ["metal3.io"]
    resources: ["baremetalhosts"]
    verbs: ["get", "list", "watch", "update", "patch"]
  - apiGroups: ["machine.openshift.io"]
    resources: ["machines"]
    verbs: ["get", "list", "watch", "delete"]
  - apiGroups: [""]
    resources: ["nodes"]
    verbs: ["get", "list", "watch", "delete"]
  - apiGroups: [""]
    resources: ["events"]
    verbs: ["create", "patch"]
  - apiGroups: ["coordination.k8s.io"]
    resources: ["leases"]
    verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: {operator_name}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: {operator_name}
subjects:
  - kind: ServiceAccount
    name: {operator_name}
    namespace: {operator_namespace}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {operator_name}
  namespace: {operator_namespace}
spec:
  replicas: 1
  selector:
    matchLabels:
      app: {operator_name}
  template:
    metadata:
      labels:
        app: {operator_name}
    spec:
      serviceAccountName: {operator_name}
      containers:
        - name: controller
          image: {image}
          imagePullPolicy: IfNotPresent
          args:
            - "--leader-elect=false"
            - "--webhook-enabled=false"
"#,
        operator_name = OPERATOR_NAME,
        operator_namespace = OPERATOR_NAMESPACE,
        image = image
    )
}

struct E2eCleanup {
    operator_manifest: String,
}

impl E2eCleanup {
    fn new(operator_manifest: String) -> Self {
        Self { operator_manifest }
    }
}

impl Drop for E2eCleanup {
    fn drop(&mut self) {
        let _ = run_cmd_quiet(
            "kubectl",
            &[
                "delete",
                "metal3remediation",
                REMEDIATION_NAME,
                "-n",
                TEST_NAMESPACE,
                "--ignore-not-found=true",
                "--timeout=60s",
                "--wait=true",
            ],
        );
        let _ = run_cmd_quiet("kubectl", &["delete", "node", NODE_NAME, "--ignore-not-found=true"]);
        let _ =
            run_cmd_with_stdin_quiet("kubectl", &["delete", "-f", "-"], &self.operator_manifest);
        let _ = run_cmd_quiet(
            "kubectl",
            &["delete", "namespace", TEST_NAMESPACE, "--ignore-not-found=true"],
        );
        let _ = run_cmd_quiet(
            "kubectl",
            &[
                "delete",
                "namespace",
                OPERATOR_NAMESPACE,
                "--ignore-not-found=true",
            ],
        );
    }
}

fn ensure_kind_cluster(name: &str) -> Result<(), Box<dyn Error>> {
    let clusters = run_cmd("kind", &["get", "clusters"])?;
    if clusters.lines().any(|line| line.trim() == name) {
        return Ok(());
    }
    run_cmd("kind", &["create", "cluster", "--name", name])?;
    Ok(())
}

fn kubectl_apply(manifest: &str) -> Result<(), Box<dyn Error>> {
    if manifest.trim().is_empty() {
        return Ok(());
    }
    run_cmd_with_stdin("kubectl", &["apply", "-f", "-"], manifest)
}

fn run_cmd(program: &str, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let output = cmd.output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Runs a binary built by this crate (`cargo run --bin <name> --`) and
/// captures its stdout, used to pull the CRD YAML out of `crdgen`.
fn run_cmd_binary_with_args(bin: &str, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let mut full_args = vec!["run", "--quiet", "--bin", bin, "--"];
    full_args.extend_from_slice(args);
    run_cmd("cargo", &full_args)
}

fn run_cmd_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        stdin.write_all(input.as_bytes())?;
        stdin.flush()?;
        drop(stdin);
    }
    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "command failed: {} {:?}\nstdout:\n{}\nstderr:\n{}",
            program, args, stdout, stderr
        )
        .into());
    }
    Ok(())
}

fn run_cmd_quiet(program: &str, args: &[&str]) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let _ = cmd.output();
    Ok(())
}

fn run_cmd_with_stdin_quiet(
    program: &str,
    args: &[&str],
    input: &str,
) -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        cmd.env("KUBECONFIG", kubeconfig);
    }
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        use std::io::Write;
        let _ = stdin.write_all(input.as_bytes());
        let _ = stdin.flush();
        drop(stdin);
    }
    let _ = child.wait_with_output();
    Ok(())
}

fn env_true(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn wait_for<F>(label: &str, timeout: Duration, mut condition: F) -> Result<(), Box<dyn Error>>
where
    F: FnMut() -> Result<bool, Box<dyn Error>>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;
    loop {
        if condition()? {
            return Ok(());
        }
        attempts += 1;
        if start.elapsed() > timeout {
            return Err(format!(
                "timeout while waiting for {} after {:?} (attempts={})",
                label, timeout, attempts
            )
            .into());
        }
        sleep(Duration::from_secs(3));
    }
}
