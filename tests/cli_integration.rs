// CLI integration tests for the env/run command surface.
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_benchtop");
    Command::new(exe)
}

fn parse_json(value: &str) -> Value {
    serde_json::from_str(value).expect("valid json")
}

fn stdout_json(output: &std::process::Output) -> Value {
    parse_json(std::str::from_utf8(&output.stdout).expect("utf8"))
}

fn stderr_json(output: &std::process::Output) -> Value {
    parse_json(std::str::from_utf8(&output.stderr).expect("utf8"))
}

#[test]
fn create_show_add_remove_eval_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let create = cmd()
        .args([
            "--dir",
            dir,
            "env",
            "create",
            "tensorflowEnv",
            "--package",
            "python3Packages/python",
            "--package",
            "python3Packages/numpy",
        ])
        .output()
        .expect("create");
    assert!(create.status.success());
    let created = stdout_json(&create);
    let env = created.get("created").expect("created envelope");
    assert_eq!(env["environment"], "tensorflowEnv");
    assert!(
        env["path"]
            .as_str()
            .unwrap()
            .ends_with("envs/tensorflowEnv.env.json")
    );
    assert_eq!(env["packages"].as_array().unwrap().len(), 2);

    let show = cmd()
        .args(["--dir", dir, "env", "show", "tensorflowEnv"])
        .output()
        .expect("show");
    assert!(show.status.success());
    let shown = stdout_json(&show);
    assert_eq!(shown["packages"][0]["collection"], "python3Packages");
    assert_eq!(shown["packages"][0]["name"], "python");
    assert_eq!(shown["packages"][1]["name"], "numpy");

    let eval = cmd()
        .args(["--dir", dir, "env", "eval", "tensorflowEnv"])
        .output()
        .expect("eval");
    assert!(eval.status.success());
    let evaluated = stdout_json(&eval);
    assert_eq!(evaluated["environment"], "tensorflowEnv");
    assert_eq!(evaluated["packages"].as_array().unwrap().len(), 2);

    // Evaluation is a pure read: a second eval emits identical bytes.
    let again = cmd()
        .args(["--dir", dir, "env", "eval", "tensorflowEnv"])
        .output()
        .expect("eval again");
    assert_eq!(eval.stdout, again.stdout);

    let add = cmd()
        .args(["--dir", dir, "env", "add", "tensorflowEnv", "python3Packages/scipy"])
        .output()
        .expect("add");
    assert!(add.status.success());
    assert_eq!(stdout_json(&add)["packages"].as_array().unwrap().len(), 3);

    // Removing a reference leaves exactly the remaining entries.
    let remove = cmd()
        .args([
            "--dir",
            dir,
            "env",
            "remove",
            "tensorflowEnv",
            "python3Packages/python",
            "python3Packages/scipy",
        ])
        .output()
        .expect("remove");
    assert!(remove.status.success());
    let removed = stdout_json(&remove);
    let names: Vec<&str> = removed["packages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["numpy"]);
}

#[test]
fn eval_with_catalog_resolves_or_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();
    let catalog_path = temp.path().join("catalog.json");
    std::fs::write(
        &catalog_path,
        r#"{
  "collections": {
    "python3Packages": {
      "python": { "version": "3.12.4", "summary": "CPython interpreter" },
      "numpy": { "version": "1.26.4" }
    }
  }
}"#,
    )
    .expect("write catalog");

    let create = cmd()
        .args([
            "--dir",
            dir,
            "env",
            "create",
            "tensorflowEnv",
            "--package",
            "python3Packages/python",
            "--package",
            "python3Packages/numpy",
        ])
        .output()
        .expect("create");
    assert!(create.status.success());

    let eval = cmd()
        .args([
            "--dir",
            dir,
            "env",
            "eval",
            "tensorflowEnv",
            "--catalog",
            catalog_path.to_str().unwrap(),
        ])
        .output()
        .expect("eval");
    assert!(eval.status.success());
    let resolved = stdout_json(&eval);
    assert_eq!(resolved["packages"][0]["version"], "3.12.4");
    assert_eq!(resolved["packages"][1]["version"], "1.26.4");

    // Unknown references fail resolution; they are never dropped.
    let add = cmd()
        .args(["--dir", dir, "env", "add", "tensorflowEnv", "python3Packages/nonexistent"])
        .output()
        .expect("add");
    assert!(add.status.success());

    let failed = cmd()
        .args([
            "--dir",
            dir,
            "env",
            "eval",
            "tensorflowEnv",
            "--catalog",
            catalog_path.to_str().unwrap(),
        ])
        .output()
        .expect("eval unknown");
    assert_eq!(failed.status.code(), Some(3));
    let err = stderr_json(&failed);
    assert_eq!(err["error"]["kind"], "NotFound");
    assert_eq!(err["error"]["reference"], "python3Packages/nonexistent");
}

#[test]
fn empty_environment_is_valid_and_noticed() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let create = cmd()
        .args(["--dir", dir, "env", "create", "bare"])
        .output()
        .expect("create");
    assert!(create.status.success());
    let notice = stderr_json(&create);
    assert_eq!(notice["notice"]["kind"], "empty-package-set");

    let eval = cmd()
        .args(["--dir", dir, "env", "eval", "bare"])
        .output()
        .expect("eval");
    assert!(eval.status.success());
    assert_eq!(stdout_json(&eval)["packages"].as_array().unwrap().len(), 0);
}

#[test]
fn not_found_and_already_exists_exit_codes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let show = cmd()
        .args(["--dir", dir, "env", "show", "ghost"])
        .output()
        .expect("show");
    assert_eq!(show.status.code(), Some(3));
    assert_eq!(stderr_json(&show)["error"]["kind"], "NotFound");

    let create = cmd()
        .args(["--dir", dir, "env", "create", "demo"])
        .output()
        .expect("create");
    assert!(create.status.success());
    let twice = cmd()
        .args(["--dir", dir, "env", "create", "demo"])
        .output()
        .expect("create twice");
    assert_eq!(twice.status.code(), Some(4));
    assert_eq!(stderr_json(&twice)["error"]["kind"], "AlreadyExists");
}

#[test]
fn usage_error_on_bad_package_reference() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let create = cmd()
        .args(["--dir", dir, "env", "create", "demo", "--package", "numpy"])
        .output()
        .expect("create");
    assert_eq!(create.status.code(), Some(2));
    assert_eq!(stderr_json(&create)["error"]["kind"], "Usage");
}

#[test]
fn doctor_reports_ok_and_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let create = cmd()
        .args(["--dir", dir, "env", "create", "demo", "--package", "c/n"])
        .output()
        .expect("create");
    assert!(create.status.success());

    let ok = cmd()
        .args(["--dir", dir, "env", "doctor", "demo"])
        .output()
        .expect("doctor");
    assert!(ok.status.success());
    assert_eq!(stdout_json(&ok)["status"], "ok");

    let envs_dir = temp.path().join("envs");
    std::fs::write(envs_dir.join("broken.env.json"), "not json").expect("write broken");
    let invalid = cmd()
        .args(["--dir", dir, "env", "doctor", "broken"])
        .output()
        .expect("doctor broken");
    assert_eq!(invalid.status.code(), Some(7));
    let report = stdout_json(&invalid);
    assert_eq!(report["status"], "invalid");
    assert_eq!(report["issues"][0]["code"], "malformed-manifest");
}

#[test]
fn env_list_enumerates_manifests() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    for name in ["zeta", "alpha"] {
        let create = cmd()
            .args(["--dir", dir, "env", "create", name])
            .output()
            .expect("create");
        assert!(create.status.success());
    }

    let list = cmd()
        .args(["--dir", dir, "env", "list"])
        .output()
        .expect("list");
    assert!(list.status.success());
    let listed = stdout_json(&list);
    let names: Vec<&str> = listed["environments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|env| env["environment"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["alpha", "zeta"]);
}

#[test]
fn run_new_record_show_path_flow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();
    let script = temp.path().join("train.py");
    std::fs::write(&script, "print('hi')\n").expect("write script");

    let create_env = cmd()
        .args(["--dir", dir, "env", "create", "tensorflowEnv", "--package", "python3Packages/numpy"])
        .output()
        .expect("create env");
    assert!(create_env.status.success());

    let new = cmd()
        .args([
            "--dir",
            dir,
            "run",
            "new",
            "baseline",
            "--env",
            "tensorflowEnv",
            "--source",
            script.to_str().unwrap(),
        ])
        .output()
        .expect("run new");
    assert!(new.status.success());
    let created = stdout_json(&new);
    let run_path = created["run"]["path"].as_str().unwrap().to_string();
    assert_eq!(created["run"]["label"], "baseline");
    assert_eq!(created["run"]["environment"], "tensorflowEnv");
    assert_eq!(created["run"]["source"]["file"], "source.py");
    assert_eq!(created["run"]["source"]["sha256"].as_str().unwrap().len(), 64);
    assert!(std::path::Path::new(&run_path).join("source.py").is_file());

    let record = cmd()
        .args([
            "--dir",
            dir,
            "run",
            "record",
            &run_path,
            "--param",
            "learning_rate=0.001",
            "--param",
            "optimizer=adam",
        ])
        .output()
        .expect("record");
    assert!(record.status.success());
    let recorded = stdout_json(&record);
    assert_eq!(recorded["params"]["learning_rate"], 0.001);
    assert_eq!(recorded["params"]["optimizer"], "adam");

    let show = cmd()
        .args(["--dir", dir, "run", "show", &run_path])
        .output()
        .expect("show");
    assert!(show.status.success());
    assert_eq!(stdout_json(&show)["params"]["optimizer"], "adam");

    let path = cmd()
        .args(["--dir", dir, "run", "path", &run_path, "figures/loss.png"])
        .output()
        .expect("path");
    assert!(path.status.success());
    let figure = stdout_json(&path)["path"].as_str().unwrap().to_string();
    assert!(figure.ends_with("figures/loss.png"));
    assert!(std::path::Path::new(&figure).parent().unwrap().is_dir());

    let list = cmd()
        .args(["--dir", dir, "run", "list", "baseline"])
        .output()
        .expect("list");
    assert!(list.status.success());
    let runs = stdout_json(&list)["runs"].as_array().unwrap().clone();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].as_str().unwrap(), run_path);
}

#[test]
fn run_new_with_unknown_env_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path().to_str().unwrap();

    let new = cmd()
        .args(["--dir", dir, "run", "new", "baseline", "--env", "ghost"])
        .output()
        .expect("run new");
    assert_eq!(new.status.code(), Some(3));
}

#[test]
fn version_envelope() {
    let output = cmd().args(["version"]).output().expect("version");
    assert!(output.status.success());
    let value = stdout_json(&output);
    assert_eq!(value["name"], "benchtop");
    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
}
