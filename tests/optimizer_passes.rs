// パス: tests/optimizer_passes.rs
// 役割: 最適化パスの単体と組み合わせの振る舞いを検証する
// 意図: 畳み込み・不要コード削除・伝播・共通部分式除去が保守的な規則を守ることを確認する
// 関連ファイル: src/optimizer/mod.rs, src/optimizer/fold.rs, src/optimizer/dce.rs
#[path = "test_support.rs"]
mod support;

use lyn::ast::NodeKind;
use lyn::optimizer::{
    eliminate_common_subexpressions, eliminate_dead_code, fold_constants, optimize, propagate_constants,
    remove_redundant, OptLevel, OptimizerConfig,
};
use lyn::typesys::Type;
use support::{assert_number, function_body, optimize_src, parse_expr, parse_program, statements};

#[test]
/// `3 + 4 * 2` は 1 つの数値リテラル 11 になり、2 回目は何もしない。
fn folding_reaches_a_single_literal() {
    let mut e = parse_expr("3 + 4 * 2");
    assert!(fold_constants(&mut e) > 0);
    assert_number(&e, 11.0, "3 + 4 * 2");
    assert_eq!(fold_constants(&mut e), 0);
}

#[test]
fn division_by_literal_zero_is_kept() {
    let mut e = parse_expr("10 / 0");
    assert_eq!(fold_constants(&mut e), 0);
    assert_eq!(e.to_string(), "(10 / 0)");
    let mut e = parse_expr("7 / 2");
    fold_constants(&mut e);
    assert_number(&e, 3.0, "integer division truncates");
    let mut e = parse_expr("7.5 / 2");
    fold_constants(&mut e);
    assert_number(&e, 3.75, "float division");
}

#[test]
fn dead_code_after_return_is_removed() {
    let mut p = parse_program("func f() -> int\n  return 1\n  print(2)\nend");
    assert_eq!(eliminate_dead_code(&mut p), 1);
    assert_eq!(function_body(&p, "f"), vec!["return 1"]);
}

#[test]
fn redundant_self_assignment_is_removed() {
    let mut p = parse_program("x = 1\nx = x\nprint(x)");
    assert_eq!(remove_redundant(&mut p), 1);
    assert_eq!(statements(&p).len(), 2);
}

#[test]
/// 分岐内で書き換えられる変数は、分岐の後では伝播しない。
fn propagation_is_conservative_around_control_flow() {
    let mut p = parse_program("n = 3\nk = 1\nwhile k < n k = k * 2 end\nprint(n, k)");
    let replaced = propagate_constants(&mut p);
    assert_eq!(
        p.to_string(),
        "n = 3; k = 1; while (k < 3); k = (k * 2); end; print(3, k)"
    );
    assert_eq!(replaced, 2);
}

#[test]
fn cse_reuses_earlier_holder() {
    let mut p = parse_program("a = x * y + 1\nb = x * y + 1");
    assert_eq!(eliminate_common_subexpressions(&mut p), 1);
    assert_eq!(p.to_string(), "a = ((x * y) + 1); b = a");
}

#[test]
fn full_pipeline_prunes_literal_branches() {
    let (out, stats) = optimize_src("debug = 0\nif debug print(\"trace\") else print(\"run\") end");
    assert_eq!(out, "debug = 0; if 0; else; print(\"run\"); end");
    assert!(stats.constants_propagated >= 1);
    assert!(stats.dead_code_removed >= 1);
}

#[test]
fn switches_disable_individual_passes() {
    let mut cfg = OptimizerConfig::default();
    cfg.constant_folding = false;
    let mut p = parse_program("x = 1 + 2");
    let stats = optimize(&mut p, cfg);
    assert_eq!(stats.constant_folding_applied, 0);
    assert_eq!(p.to_string(), "x = (1 + 2)");

    let mut p = parse_program("func f() return; print(1) end");
    let stats = optimize(&mut p, OptimizerConfig::with_level(OptLevel::O1));
    assert_eq!(stats.dead_code_removed, 0);
}

#[test]
/// 算術の畳み込み結果は型メモを持たず、比較の結果は bool のメモを持つ。
fn folded_nodes_reset_type_memo_except_comparisons() {
    let mut e = parse_expr("2 * 3");
    e.inferred_type = Some(Type::Int);
    fold_constants(&mut e);
    assert!(matches!(e.kind, NodeKind::Number { .. }));
    assert!(e.inferred_type.is_none());

    let mut e = parse_expr("3 > 2");
    fold_constants(&mut e);
    assert_number(&e, 1.0, "3 > 2");
    assert_eq!(e.inferred_type, Some(Type::Bool));
}

#[test]
/// 呼び出し先が書き換えるグローバルは、呼び出しの後では定数として扱わない。
fn propagation_stops_at_calls_that_write_globals() {
    let mut p = parse_program("func f()\n  k = 5\nend\nk = 3\nf()\nprint(k)");
    propagate_constants(&mut p);
    assert_eq!(p.to_string(), "func f(); k = 5; end; k = 3; f(); print(k)");

    // UFCS で書いた呼び出しも同じ
    let mut p = parse_program("func bump(n: int) k = n end\nk = 3\nv = 1\nv.bump()\nprint(k, v)");
    propagate_constants(&mut p);
    assert_eq!(
        p.to_string(),
        "func bump(n: int); k = n; end; k = 3; v = 1; bump(1); print(k, 1)"
    );
}
