use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn tributary_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tributary"))
}

fn run_cli(args: &[&str]) -> Output {
    Command::new(tributary_bin())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute tributary CLI")
}

fn assert_cli_success(output: &Output, args: &[&str]) {
    assert!(
        output.status.success(),
        "command failed: {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write_tree(base: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = base.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

fn ledger(dest: &Path) -> Connection {
    Connection::open(dest.join(".tributary").join("provenance.sqlite")).expect("open ledger")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

struct Trees {
    _temp: TempDir,
    source: PathBuf,
    dest: PathBuf,
}

impl Trees {
    fn new(files: &[(&str, &str)]) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let source = temp.path().join("in");
        let dest = temp.path().join("out");
        fs::create_dir_all(&source).unwrap();
        write_tree(&source, files);
        Self {
            _temp: temp,
            source,
            dest,
        }
    }

    fn source_arg(&self) -> &str {
        self.source.to_str().unwrap()
    }

    fn dest_arg(&self) -> &str {
        self.dest.to_str().unwrap()
    }
}

#[test]
fn test_run_copies_and_records() {
    let trees = Trees::new(&[("01/20.aa", "asdfgh"), ("01/21.ab", "qwasds"), ("02/11.aa", "oooppp")]);
    let args = ["run", trees.source_arg(), trees.dest_arg(), "--ext", "aa", "--flatten"];

    let output = run_cli(&args);
    assert_cli_success(&output, &args);

    assert_eq!(fs::read_to_string(trees.dest.join("0120.aa")).unwrap(), "asdfgh");
    assert_eq!(fs::read_to_string(trees.dest.join("0211.aa")).unwrap(), "oooppp");
    assert!(!trees.dest.join("0121.ab").exists());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("01/20.aa -> 0120.aa"));
    assert!(stdout.contains("2 processed, 0 already present"));

    let conn = ledger(&trees.dest);
    let mut stmt = conn
        .prepare("SELECT input_path, output_path FROM provenance ORDER BY input_path")
        .unwrap();
    let rows: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(
        rows,
        vec![
            ("01/20.aa".to_string(), "0120.aa".to_string()),
            ("02/11.aa".to_string(), "0211.aa".to_string()),
        ]
    );

    assert!(trees.dest.join(".tributary/logs/tributary.log").exists());
}

#[test]
fn test_second_run_json_reports_already_present() {
    let trees = Trees::new(&[("a.txt", "1"), ("b/c.txt", "2")]);
    let args = ["run", trees.source_arg(), trees.dest_arg(), "--json"];

    assert_cli_success(&run_cli(&args), &args);
    let output = run_cli(&args);
    assert_cli_success(&output, &args);

    let report = stdout_json(&output);
    assert_eq!(report["processed"].as_array().unwrap().len(), 0);
    assert_eq!(report["already_present"].as_array().unwrap().len(), 2);
    assert_eq!(report["already_present"][0]["source"], "a.txt");
    assert_eq!(report["stopped_early"], false);
}

#[test]
fn test_dry_run_leaves_only_metadata() {
    let trees = Trees::new(&[("a.txt", "1")]);
    let args = ["run", trees.source_arg(), trees.dest_arg(), "--dry-run", "--json"];

    let output = run_cli(&args);
    assert_cli_success(&output, &args);

    let report = stdout_json(&output);
    assert_eq!(report["dry_run"], true);
    assert_eq!(report["processed"][0]["dest"], "a.txt");

    let entries: Vec<String> = fs::read_dir(&trees.dest)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec![".tributary".to_string()]);

    let count: i64 = ledger(&trees.dest)
        .query_row("SELECT COUNT(*) FROM provenance", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[cfg(unix)]
#[test]
fn test_failed_command_exits_with_one() {
    let trees = Trees::new(&[("good.txt", "ok"), ("bad.txt", "no")]);
    let script = "case \"$1\" in *bad.txt) exit 4;; esac; cp \"$1\" \"$2\"";
    let args = [
        "run",
        trees.source_arg(),
        trees.dest_arg(),
        "--json",
        "--",
        "sh",
        "-c",
        script,
        "sh",
        "{in}",
        "{out}",
    ];

    let output = run_cli(&args);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report = stdout_json(&output);
    assert_eq!(report["processed"][0]["source"], "good.txt");
    assert_eq!(report["failed"][0]["source"], "bad.txt");
    assert!(trees.dest.join("good.txt").exists());
    assert!(!trees.dest.join("bad.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_capture_writes_stdout() {
    let trees = Trees::new(&[("list.txt", "b\na\n")]);
    let args = ["run", trees.source_arg(), trees.dest_arg(), "--capture", "--", "sort", "{in}"];

    let output = run_cli(&args);
    assert_cli_success(&output, &args);
    assert_eq!(fs::read_to_string(trees.dest.join("list.txt")).unwrap(), "a\nb\n");
}

#[test]
fn test_config_file_drives_run() {
    let trees = Trees::new(&[("x/1.csv", "c"), ("x/2.json", "j")]);
    let config_path = trees.source.parent().unwrap().join("pipeline.toml");
    fs::write(
        &config_path,
        format!(
            "source = {:?}\ndest = {:?}\noperation = \"csv\"\nglob = \"*.csv\"\n",
            trees.source_arg(),
            trees.dest_arg()
        ),
    )
    .unwrap();

    let args = ["run", "--config", config_path.to_str().unwrap()];
    let output = run_cli(&args);
    assert_cli_success(&output, &args);

    assert!(trees.dest.join("x/1.csv").exists());
    assert!(!trees.dest.join("x/2.json").exists());

    let operation: Option<String> = ledger(&trees.dest)
        .query_row("SELECT operation_name FROM provenance", [], |row| row.get(0))
        .unwrap();
    assert_eq!(operation.as_deref(), Some("csv"));
}

#[test]
fn test_resume_with_limit_to_is_fatal() {
    let trees = Trees::new(&[("a/1", "")]);
    let args = ["run", trees.source_arg(), trees.dest_arg(), "--resume", "--limit-to", "a"];

    let output = run_cli(&args);
    assert_eq!(output.status.code(), Some(2));
    assert!(!trees.dest.join("a/1").exists());
}

#[test]
fn test_missing_source_is_fatal() {
    let trees = Trees::new(&[]);
    let missing = trees.source.join("nope");
    let args = ["run", missing.to_str().unwrap(), trees.dest_arg()];

    let output = run_cli(&args);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Path not found"), "stderr: {}", stderr);
    assert!(!trees.dest.exists());
}

#[test]
fn test_max_items_then_resume() {
    let trees = Trees::new(&[("a", ""), ("b", ""), ("c", "")]);

    let args = ["run", trees.source_arg(), trees.dest_arg(), "--max-items", "1", "--json"];
    let output = run_cli(&args);
    assert_cli_success(&output, &args);
    let report = stdout_json(&output);
    assert_eq!(report["processed"].as_array().unwrap().len(), 1);
    assert_eq!(report["stopped_early"], true);

    let args = ["run", trees.source_arg(), trees.dest_arg(), "--resume", "--json"];
    let output = run_cli(&args);
    assert_cli_success(&output, &args);
    let report = stdout_json(&output);
    assert_eq!(report["processed"][0]["source"], "b");
    assert_eq!(report["processed"][1]["source"], "c");
    assert_eq!(report["already_present"].as_array().unwrap().len(), 0);
}

#[test]
fn test_status_reports_ledger() {
    let trees = Trees::new(&[("a", ""), ("b", "")]);
    let run_args = ["run", trees.source_arg(), trees.dest_arg(), "--operation", "mirror"];
    assert_cli_success(&run_cli(&run_args), &run_args);

    let args = ["status", trees.dest_arg(), "--output", "a", "--json"];
    let output = run_cli(&args);
    assert_cli_success(&output, &args);

    let status = stdout_json(&output);
    assert_eq!(status["records"], 2);
    assert_eq!(status["last_processed"], "b");
    assert_eq!(status["output"]["input_path"], "a");
    assert_eq!(status["output"]["operation_name"], "mirror");

    let args = ["status", trees.dest_arg()];
    let output = run_cli(&args);
    assert_cli_success(&output, &args);
    assert!(String::from_utf8_lossy(&output.stdout).contains("Records"));
}

#[test]
fn test_status_without_ledger_is_fatal() {
    let trees = Trees::new(&[]);
    let output = run_cli(&["status", trees.dest_arg()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!trees.dest.exists());
}
