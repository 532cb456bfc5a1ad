use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn shell(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_treesh"));
    cmd.args(args)
        .current_dir(dir)
        .env("HOME", "/home/ann")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn run_with(dir: &Path, args: &[&str], script: &str) -> Output {
    let mut child = shell(dir, args).spawn().expect("failed to start treesh");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(script.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "treesh exited with {}", output.status);
    output
}

fn run(dir: &Path, script: &str) -> (String, String) {
    let output = run_with(dir, &[], script);
    (
        String::from_utf8(output.stdout).unwrap(),
        String::from_utf8(output.stderr).unwrap(),
    )
}

fn stdout_of(script: &str) -> String {
    let dir = TempDir::new().unwrap();
    run(dir.path(), script).0
}

#[test]
fn test_simple_command() {
    assert_eq!(stdout_of("echo hello world\n"), "hello world\n");
}

#[test]
fn test_empty_input() {
    assert_eq!(stdout_of(""), "");
    assert_eq!(stdout_of("\n\n   \n# just a comment\n"), "");
}

#[test]
fn test_redirect_round_trip() {
    let dir = TempDir::new().unwrap();
    let (out, _) = run(dir.path(), "echo hi > out.txt ; cat < out.txt\n");
    assert_eq!(out, "hi\n");
    assert_eq!(fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hi\n");
}

#[test]
fn test_truncate_and_append() {
    let dir = TempDir::new().unwrap();
    let script = "echo one > log.txt\necho two >> log.txt\ncat < log.txt\necho three > log.txt\n";
    let (out, _) = run(dir.path(), script);
    assert_eq!(out, "one\ntwo\n");
    assert_eq!(fs::read_to_string(dir.path().join("log.txt")).unwrap(), "three\n");
}

#[test]
fn test_conditional_chain() {
    assert_eq!(stdout_of("false && echo a || echo b\n"), "b\n");
    assert_eq!(stdout_of("true && echo a || echo b\n"), "a\n");
    assert_eq!(stdout_of("true || echo skipped\n"), "");
    assert_eq!(stdout_of("false ; echo always\n"), "always\n");
}

#[test]
fn test_pipeline() {
    assert_eq!(stdout_of("printf 'b\\na\\nc\\n' | sort | head -n 1\n"), "a\n");
}

#[test]
fn test_pipeline_into_file() {
    let dir = TempDir::new().unwrap();
    run(dir.path(), "printf 'x\\ny\\n' | sort -r > sorted.txt\n");
    assert_eq!(
        fs::read_to_string(dir.path().join("sorted.txt")).unwrap(),
        "y\nx\n"
    );
}

#[test]
fn test_writer_stops_when_reader_exits() {
    let dir = TempDir::new().unwrap();
    let (out, err) = run(
        dir.path(),
        "sh -c 'while :; do echo y; done' | head -n 1\nyes | head -n 1\necho after\n",
    );
    assert_eq!(out, "y\ny\nafter\n");
    assert!(!err.contains("Broken pipe"), "stderr: {err}");
    assert!(!err.contains("I/O error"), "stderr: {err}");
}

#[test]
fn test_subshell_shares_its_redirect() {
    let dir = TempDir::new().unwrap();
    let (out, _) = run(dir.path(), "(echo a ; echo b) > out.txt\ncat < out.txt\n");
    assert_eq!(out, "a\nb\n");
}

#[test]
fn test_subshell_feeds_pipeline() {
    assert_eq!(stdout_of("(echo b ; echo a) | sort\n"), "a\nb\n");
}

#[test]
fn test_group_status_drives_chaining() {
    assert_eq!(stdout_of("(true ; false) || echo failed\n"), "failed\n");
    assert_eq!(stdout_of("(false ; true) && echo ok\n"), "ok\n");
}

#[test]
fn test_variables() {
    assert_eq!(stdout_of("echo $HOME\n"), "/home/ann\n");
    assert_eq!(stdout_of("echo \"dir=$HOME\"\n"), "dir=/home/ann\n");
    assert_eq!(stdout_of("echo $UNKNOWNVAR foo\n"), "foo\n");
    assert_eq!(stdout_of("echo \\$HOME\n"), "$HOME\n");
}

#[test]
fn test_comment_ends_line() {
    assert_eq!(stdout_of("echo hi # echo ignored\n"), "hi\n");
}

#[test]
fn test_lexical_error_skips_only_that_line() {
    let dir = TempDir::new().unwrap();
    let (out, err) = run(dir.path(), "echo \"open\necho after\n");
    assert_eq!(out, "after\n");
    assert!(err.contains("treesh: lexical error"), "stderr: {err}");
}

#[test]
fn test_syntax_error_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let (out, err) = run(dir.path(), ")\necho a > made.txt |\necho after\n");
    assert_eq!(out, "after\n");
    assert!(err.contains("treesh: invalid syntax: error code 1"), "stderr: {err}");
    assert!(err.contains("treesh: invalid syntax: error code 4"), "stderr: {err}");
    assert!(!dir.path().join("made.txt").exists());
}

#[test]
fn test_missing_input_file() {
    let dir = TempDir::new().unwrap();
    let (out, err) = run(dir.path(), "cat < missing.txt || echo fallback\n");
    assert_eq!(out, "fallback\n");
    assert!(
        err.contains("treesh: missing.txt: No such file or directory"),
        "stderr: {err}"
    );
}

#[test]
fn test_directory_as_redirect_target() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("d")).unwrap();
    let (out, err) = run(dir.path(), "echo hi > d || echo out-failed\ncat < d || echo in-failed\n");
    assert_eq!(out, "out-failed\nin-failed\n");
    assert_eq!(err.matches("treesh: d: Is a directory").count(), 2, "stderr: {err}");
}

#[test]
fn test_unknown_command() {
    let dir = TempDir::new().unwrap();
    let (out, err) = run(dir.path(), "definitely-not-a-command-4711 || echo fallback\n");
    assert_eq!(out, "fallback\n");
    assert!(
        err.contains("treesh: definitely-not-a-command-4711: exec: ENOENT"),
        "stderr: {err}"
    );
}

#[test]
fn test_cd_does_not_persist() {
    let dir = TempDir::new().unwrap();
    let here = dir.path().canonicalize().unwrap();
    let (out, _) = run(dir.path(), "cd /\npwd\ncd / && pwd\n");
    let expected = format!("{0}\n{0}\n", here.display());
    assert_eq!(out, expected);
}

#[test]
fn test_cd_failure_is_a_failed_stage() {
    let dir = TempDir::new().unwrap();
    let (out, err) = run(dir.path(), "cd /definitely/not/here || echo no-such-dir\n");
    assert_eq!(out, "no-such-dir\n");
    assert!(err.contains("treesh: cd:"), "stderr: {err}");
}

#[test]
fn test_background_returns_immediately() {
    let dir = TempDir::new().unwrap();
    let mut child = shell(dir.path(), &[]).spawn().unwrap();
    let started = Instant::now();
    {
        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(b"sleep 3 &\necho done\n").unwrap();
    }

    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut first = String::new();
    stdout.read_line(&mut first).unwrap();
    assert_eq!(first, "done\n");
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(child.wait().unwrap().success());
}

#[test]
fn test_background_then_sequence_on_one_line() {
    let dir = TempDir::new().unwrap();
    let mut child = shell(dir.path(), &[]).spawn().unwrap();
    let started = Instant::now();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"sleep 3 & echo next\n")
        .unwrap();

    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut first = String::new();
    stdout.read_line(&mut first).unwrap();
    assert_eq!(first, "next\n");
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(child.wait().unwrap().success());
}

/// Children of `parent` that have exited but were never waited for.
fn zombie_children(parent: u32) -> Vec<u32> {
    let mut zombies = Vec::new();
    for entry in fs::read_dir("/proc").unwrap().flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        let Ok(stat) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        // fields after the parenthesized command name: state, ppid, ...
        let Some((_, rest)) = stat.rsplit_once(')') else {
            continue;
        };
        let mut fields = rest.split_whitespace();
        let state = fields.next();
        let ppid = fields.next().and_then(|p| p.parse::<u32>().ok());
        if state == Some("Z") && ppid == Some(parent) {
            zombies.push(pid);
        }
    }
    zombies
}

#[test]
fn test_finished_background_job_is_reaped() {
    let dir = TempDir::new().unwrap();
    let mut child = shell(dir.path(), &[]).spawn().unwrap();
    let pid = child.id();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    stdin.write_all(b"sleep 0.2 &\n").unwrap();
    thread::sleep(Duration::from_secs(1));
    assert_eq!(zombie_children(pid).len(), 1, "finished job is not waiting to be reaped");

    stdin.write_all(b"echo next\n").unwrap();
    let mut line = String::new();
    stdout.read_line(&mut line).unwrap();
    assert_eq!(line, "next\n");

    let deadline = Instant::now() + Duration::from_secs(5);
    while !zombie_children(pid).is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(zombie_children(pid), Vec::<u32>::new());

    drop(stdin);
    assert!(child.wait().unwrap().success());
}

#[test]
fn test_nested_background_job_does_not_block() {
    let dir = TempDir::new().unwrap();
    let mut child = shell(dir.path(), &[]).spawn().unwrap();
    let started = Instant::now();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    stdin.write_all(b"sleep 0.2 & echo first\n").unwrap();
    thread::sleep(Duration::from_secs(1));
    stdin.write_all(b"echo second\n").unwrap();
    drop(stdin);

    let mut out = String::new();
    stdout.read_to_string(&mut out).unwrap();
    assert_eq!(out, "first\nsecond\n");
    assert!(child.wait().unwrap().success());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_parse_only_mode_prints_tokens_and_tree() {
    let dir = TempDir::new().unwrap();
    let output = run_with(
        dir.path(),
        &["--no-exec", "--print-tokens", "--print-tree"],
        "echo hi > x.txt\n",
    );
    let out = String::from_utf8(output.stdout).unwrap();
    assert!(out.contains("Tokens:\n[echo] [hi] [>] [x.txt]\n"), "stdout: {out}");
    assert!(out.contains("Tree:\n{\n:   argv: [echo] [hi]\n"), "stdout: {out}");
    assert!(out.contains(":   outfile: x.txt\n"), "stdout: {out}");
    assert!(!out.contains("Execution:"));
    assert!(!dir.path().join("x.txt").exists());
}

#[test]
fn test_print_input_shows_chunks() {
    let dir = TempDir::new().unwrap();
    let output = run_with(dir.path(), &["--print-input", "--no-exec"], "echo hi\n");
    let out = String::from_utf8(output.stdout).unwrap();
    assert_eq!(out, "Input:\n[echo] [ hi]\n");
}

#[test]
fn test_full_tree_lists_empty_fields() {
    let dir = TempDir::new().unwrap();
    let output = run_with(
        dir.path(),
        &["--no-exec", "--print-tree", "--full-tree"],
        "ls\n",
    );
    let out = String::from_utf8(output.stdout).unwrap();
    assert!(out.contains(":   infile: none\n"), "stdout: {out}");
    assert!(out.contains(":   pipe_to: none\n"), "stdout: {out}");
}

#[test]
fn test_script_mode_echoes_lines() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("commands.txt");
    fs::write(&script, "echo hi\nfalse || echo fallback\n").unwrap();

    let output = run_with(dir.path(), &["--script", script.to_str().unwrap()], "");
    let out = String::from_utf8(output.stdout).unwrap();
    assert_eq!(out, "echo hi\nhi\nfalse || echo fallback\nfallback\n");
}

#[test]
fn test_missing_script_is_an_error() {
    let dir = TempDir::new().unwrap();
    let output = shell(dir.path(), &["--script", "no-such-script.txt"])
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
}
