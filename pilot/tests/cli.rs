//! CLI tests: spawn the pilot binary against scratch projects and check exit
//! codes, stdout, and files on disk.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pilot::exit_codes;
use pilot::io::config::{PilotConfig, PilotPaths, load_config, write_config};

fn pilot(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pilot"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn pilot")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = pilot(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let paths = PilotPaths::new(temp.path());
    let cfg = load_config(&paths.config_path).expect("load");
    assert_eq!(cfg, PilotConfig::default());

    let again = pilot(temp.path(), &["init"]);
    assert!(stdout(&again).contains("kept existing"));
}

#[test]
fn tree_prints_snapshot_without_ignored_entries() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(temp.path().join("src")).expect("mkdir");
    fs::write(temp.path().join("src/main.rs"), "fn main() {}").expect("write");
    fs::write(temp.path().join("README.md"), "# hi").expect("write");
    fs::write(temp.path().join("debug.log"), "noise").expect("write");
    fs::create_dir_all(temp.path().join("node_modules/x")).expect("mkdir");

    let output = pilot(temp.path(), &["tree"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "src/\n  main.rs\nREADME.md\n");
}

#[test]
fn ls_rejects_paths_outside_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir(temp.path().join("project")).expect("mkdir");
    let root = temp.path().join("project");

    let output = pilot(&root, &["ls", ".."]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("escapes the workspace root"));
}

#[test]
fn exec_runs_plan_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan_path = temp.path().join("plan.json");
    fs::write(
        &plan_path,
        r#"{
  "thought": "write a greeting",
  "plan": [
    {"type": "file_creation", "description": "greet", "filePath": "greeting.txt", "content": "Hello"},
    {"type": "thought", "description": "done"}
  ]
}"#,
    )
    .expect("write plan");

    let output = pilot(
        temp.path(),
        &["exec", "--plan", plan_path.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        fs::read_to_string(temp.path().join("greeting.txt")).expect("read"),
        "Hello"
    );
    assert!(stdout(&output).contains("completed"));
}

#[cfg(unix)]
#[test]
fn exec_failing_command_exits_halted() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan_path = temp.path().join("plan.json");
    fs::write(
        &plan_path,
        r#"{"thought": "", "plan": [{"type": "command", "description": "fail", "command": "echo broken; exit 4"}]}"#,
    )
    .expect("write plan");

    let output = pilot(
        temp.path(),
        &["exec", "--plan", plan_path.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::HALTED));
    let out = stdout(&output);
    assert!(out.contains("broken"));
    assert!(out.contains("[process exited with code 4]"));
    assert!(out.contains("autonomous mode is off"));
}

#[test]
fn exec_empty_plan_exits_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let plan_path = temp.path().join("plan.json");
    fs::write(&plan_path, r#"{"thought": "nothing", "plan": []}"#).expect("write plan");

    let output = pilot(
        temp.path(),
        &["exec", "--plan", plan_path.to_str().expect("utf8 path")],
    );
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY_PLAN));
}

/// Configure the planner command as a shell script that copies `reply` to
/// the path given after `--output-last-message`.
#[cfg(unix)]
fn fake_agent(root: &Path, reply: &Path) {
    let script = format!(
        r#"while [ "$1" != "--output-last-message" ]; do shift; done; cat >/dev/null; cp "{}" "$2""#,
        reply.display()
    );
    let mut cfg = PilotConfig::default();
    cfg.planner.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        script,
        "agent".to_string(),
    ];
    write_config(&PilotPaths::new(root).config_path, &cfg).expect("write config");
}

#[cfg(unix)]
#[test]
fn run_previews_then_executes_plan() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("project");
    fs::create_dir(&root).expect("mkdir");
    let reply = temp.path().join("reply.json");
    fs::write(
        &reply,
        "Sure! Here is the plan:\n{\"thought\":\"one file\",\"plan\":[{\"type\":\"file_creation\",\"description\":\"greet\",\"filePath\":\"greeting.txt\",\"content\":\"Hello\"}]}\n",
    )
    .expect("write reply");
    fake_agent(&root, &reply);

    let saved = temp.path().join("saved.json");
    let preview = pilot(
        &root,
        &[
            "run",
            "create file greeting.txt with content Hello",
            "--save-plan",
            saved.to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(preview.status.code(), Some(exit_codes::OK));
    assert!(stdout(&preview).contains("[file_creation] greet (greeting.txt)"));
    assert!(!root.join("greeting.txt").exists());
    assert!(saved.exists());

    let run = pilot(
        &root,
        &["run", "create file greeting.txt with content Hello", "--execute"],
    );
    assert_eq!(run.status.code(), Some(exit_codes::OK));
    assert_eq!(
        fs::read_to_string(root.join("greeting.txt")).expect("read"),
        "Hello"
    );

    fs::remove_file(root.join("greeting.txt")).expect("remove");
    let replay = pilot(
        &root,
        &["exec", "--plan", saved.to_str().expect("utf8 path")],
    );
    assert_eq!(replay.status.code(), Some(exit_codes::OK));
    assert!(root.join("greeting.txt").exists());
}

#[cfg(unix)]
#[test]
fn run_with_unusable_reply_exits_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("project");
    fs::create_dir(&root).expect("mkdir");
    let reply = temp.path().join("reply.txt");
    fs::write(&reply, "I am not able to help with that.").expect("write reply");
    fake_agent(&root, &reply);

    let output = pilot(&root, &["run", "anything"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY_PLAN));
    assert!(stdout(&output).contains("planner produced no steps"));
}

#[cfg(unix)]
#[test]
fn explain_prints_agent_explanation() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("project");
    fs::create_dir_all(root.join("src")).expect("mkdir");
    fs::write(root.join("src/math.rs"), "pub fn add(a: i32, b: i32) -> i32 { a + b }\n")
        .expect("write source");
    let reply = temp.path().join("reply.json");
    fs::write(&reply, r#"{"explanation": "`add` returns the sum of two integers."}"#)
        .expect("write reply");
    fake_agent(&root, &reply);

    let output = pilot(&root, &["explain", "src/math.rs"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("`add` returns the sum of two integers."));

    let prompt = fs::read_to_string(PilotPaths::new(&root).planner_dir.join("explain.prompt.md"))
        .expect("prompt");
    assert!(prompt.contains("pub fn add(a: i32, b: i32)"));
}

#[test]
fn explain_rejects_paths_outside_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("project");
    fs::create_dir(&root).expect("mkdir");
    fs::write(temp.path().join("secret.txt"), "hidden").expect("write");

    let output = pilot(&root, &["explain", "../secret.txt"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("escapes the workspace root"));
}

#[cfg(unix)]
#[test]
fn refactor_writes_only_after_confirmation() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("project");
    fs::create_dir(&root).expect("mkdir");
    fs::write(root.join("greet.py"), "print('hi')\n").expect("write source");
    let reply = temp.path().join("reply.json");
    fs::write(
        &reply,
        r#"{"summary": "wrapped in main", "content": "def main():\n    print('hi')\n"}"#,
    )
    .expect("write reply");
    fake_agent(&root, &reply);

    let declined = pilot(&root, &["refactor", "greet.py", "-i", "add a main function"]);
    assert_eq!(declined.status.code(), Some(exit_codes::OK));
    let out = stdout(&declined);
    assert!(out.contains("wrapped in main"));
    assert!(out.contains("--- proposed greet.py ---"));
    assert!(out.contains("no changes written"));
    assert_eq!(
        fs::read_to_string(root.join("greet.py")).expect("read"),
        "print('hi')\n"
    );

    let applied = pilot(
        &root,
        &["refactor", "greet.py", "-i", "add a main function", "--yes"],
    );
    assert_eq!(applied.status.code(), Some(exit_codes::OK));
    assert!(stdout(&applied).contains("updated greet.py"));
    assert_eq!(
        fs::read_to_string(root.join("greet.py")).expect("read"),
        "def main():\n    print('hi')\n"
    );
}
