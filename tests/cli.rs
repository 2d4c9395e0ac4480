// パス: tests/cli.rs
// 役割: lync 実行ファイルのサブコマンドと終了コードを検証する
// 意図: フラグの上書き・統計出力・診断表示がライブラリの結果と一致することを外部から確認する
// 関連ファイル: src/bin/lync.rs, src/lib.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

fn lync(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lync"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run lync")
}

fn source_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).expect("write source");
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

const PROGRAM: &str = "func add(a: int, b: int) -> int\n  return a + b\nend\nx = 2 * 3\nprint(add(x, 1))\n";

#[test]
fn build_writes_c_and_json_stats() {
    let dir = tempfile::tempdir().unwrap();
    let src = source_file(&dir, "prog.lyn", PROGRAM);
    let out_path = dir.path().join("prog.c");
    let out = lync(&["build", arg(&src), "-o", arg(&out_path), "--stats", "json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let c = fs::read_to_string(&out_path).unwrap();
    assert!(c.starts_with("/* module prog : generated by lync */"));
    assert!(c.contains("long long add(long long a, long long b)"));

    let stderr = String::from_utf8_lossy(&out.stderr);
    let json_start = stderr.find('{').expect("json on stderr");
    let stats: serde_json::Value = serde_json::from_str(&stderr[json_start..]).unwrap();
    assert!(stats["optimization"]["constant_folding_applied"].as_u64().unwrap() >= 1);
    assert_eq!(stats["diagnostics"], 0);
}

#[test]
fn build_without_output_prints_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let src = source_file(&dir, "demo.lyn", PROGRAM);
    let out = lync(&["build", arg(&src), "-O", "0"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("int main(void) {"));
    // -O 0 では畳み込みが走らない
    assert!(stdout.contains("x = (2 * 3);"));
}

#[test]
fn check_reports_type_errors_with_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let src = source_file(&dir, "bad.lyn", "x: int = 1\nif \"s\" print(x) end\n");
    let out = lync(&["check", arg(&src)]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("bad:2:"), "{stderr}");
    assert!(stderr.contains("[TYPE080]"), "{stderr}");
}

#[test]
fn parse_errors_show_context() {
    let dir = tempfile::tempdir().unwrap();
    let src = source_file(&dir, "broken.lyn", "x = 1\ny = (2 +\n");
    let out = lync(&["check", arg(&src)]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("broken:"), "{stderr}");
    assert!(stderr.contains("syntax"), "{stderr}");
}

#[test]
fn parse_dumps_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let src = source_file(&dir, "tree.lyn", PROGRAM);
    let out = lync(&["parse", arg(&src)]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("Program"));
    assert!(stdout.contains("FunctionDef add -> int"));
}

#[test]
fn config_file_and_flags_combine() {
    let dir = tempfile::tempdir().unwrap();
    let src = source_file(
        &dir,
        "woven.lyn",
        "func f() -> int return 1 end\naspect A pointcut p \"f\" before p print(0) end end\nprint(f())\n",
    );
    let cfg = source_file(&dir, "lync.toml", "module_name = \"custom\"\n");
    let out = lync(&["build", arg(&src), "--config", arg(&cfg), "--no-weave", "--stats", "text"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("/* module custom : generated by lync */"));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("weaving: joinpoints=0 advice=0 errors=0"), "{stderr}");
}
