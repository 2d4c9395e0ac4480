// パス: tests/config_emit.rs
// 役割: 設定ファイルの読み込みと、パイプライン全体による C 出力を検証する
// 意図: TOML の各表が解析・織り込み・最適化・出力の振る舞いに反映されることを確認する
// 関連ファイル: src/config.rs, src/lib.rs, src/codegen/c.rs
use std::io::Write;

use lyn::codegen::EmitError;
use lyn::config::ConfigError;
use lyn::optimizer::{OptLevel, OptimizerConfig};
use lyn::{compile, CompilationContext, CompileError, CompilerConfig};
use tempfile::NamedTempFile;

fn write_config(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("tempfile");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn loaded_config_drives_the_pipeline() {
    let file = write_config(
        r#"
module_name = "geo"

[optimizer]
level = "O2"

[modules."geo.util"]
scale = "(int) -> int"
"#,
    );
    let cfg = CompilerConfig::load(file.path()).unwrap();
    let out = compile("x = 2 * 3 + 1\nprint(x)", &cfg).unwrap();
    assert!(!out.context.has_errors(), "{:?}", out.context.diagnostics);
    assert!(out.c_source.starts_with("/* module geo : generated by lync */"));
    assert!(out.c_source.contains("    x = 7;"));
    assert!(out.context.stats.optimization.constant_folding_applied >= 1);

    // [modules] の型は import 経由で型検査に使われる
    let mut ctx = CompilationContext::new(cfg);
    let mut program = ctx.parse("import geo.util\ny = scale(3)\nz: string = scale(4)").unwrap();
    ctx.analyze(&mut program).unwrap();
    assert_eq!(ctx.stats.type_errors, 1);
    assert!(ctx.diagnostics[0].message.contains("TYPE070"));
}

#[test]
fn weaving_can_be_switched_off() {
    let src = "func f() -> int return 1 end\naspect A pointcut p \"f\" before p print(0) end end\nprint(f())";
    let on = compile(src, &CompilerConfig::default()).unwrap();
    assert_eq!(on.context.stats.weaving.advice_applied, 1);

    let cfg = CompilerConfig::from_toml_str("weave = false").unwrap();
    let off = compile(src, &cfg).unwrap();
    assert_eq!(off.context.stats.weaving.advice_applied, 0);
    assert!(!off.c_source.contains("(long long)(0)"));
}

#[test]
fn bad_module_type_is_a_config_error() {
    let cfg = CompilerConfig::from_toml_str("[modules.m]\nf = \"(int ->\"").unwrap();
    let err = compile("print(1)", &cfg).unwrap_err();
    assert!(matches!(err, CompileError::Config(ConfigError::BadType { ref name, .. }) if name == "f"));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = CompilerConfig::load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
/// 出力できない構文はエラーになり、許可すれば注釈に置き換わる。
fn unsupported_output_depends_on_emit_table() {
    let src = "f = (x: int) -> int => x + 1\nprint(1)";
    let err = compile(src, &CompilerConfig::default()).unwrap_err();
    assert!(matches!(err, CompileError::Emit(EmitError::Unsupported { .. })));

    let cfg = CompilerConfig::from_toml_str("[emit]\nallow_unsupported = true").unwrap();
    let out = compile(src, &cfg).unwrap();
    assert!(out.c_source.contains("/* unsupported: lambda"));
}

fn c_at(level: OptLevel, src: &str) -> String {
    let cfg = CompilerConfig {
        optimizer: OptimizerConfig::with_level(level),
        ..CompilerConfig::default()
    };
    let out = compile(src, &cfg).unwrap();
    assert!(!out.context.has_errors(), "{:?}", out.context.diagnostics);
    out.c_source
}

#[test]
/// 関数がグローバルを書き換える場合、最適化しても呼び出し後の値を読む。
fn globals_written_by_calls_survive_optimization() {
    let src = "func f()\n  k = 5\nend\nk = 3\nf()\nprint(k)";
    for level in [OptLevel::O0, OptLevel::O1, OptLevel::O2] {
        let c = c_at(level, src);
        assert!(c.contains("    k = 5;"), "{level:?}\n{c}");
        assert!(c.contains("printf(\"%lld\\n\", (long long)(k));"), "{level:?}\n{c}");
    }
}

#[test]
/// 比較の値は最適化レベルによらず true/false で表示される。
fn printed_comparisons_stay_booleans() {
    let src = "b = 3 > 2\nprint(b)\nprint(3 > 2)";
    for level in [OptLevel::O0, OptLevel::O2] {
        let c = c_at(level, src);
        assert_eq!(c.matches(") ? \"true\" : \"false\"").count(), 2, "{level:?}\n{c}");
        assert!(c.contains("static int b;"), "{level:?}\n{c}");
        assert!(!c.contains("%lld"), "{level:?}\n{c}");
    }
}
