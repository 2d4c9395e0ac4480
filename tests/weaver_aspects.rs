// パス: tests/weaver_aspects.rs
// 役割: ポイントカット照合とアドバイスの差し込み順序を検証する
// 意図: 織り込み結果の文順と統計が公開 API から観測できることを保証する
// 関連ファイル: src/weaver/mod.rs, src/weaver/pointcut.rs
#[path = "test_support.rs"]
mod support;

use lyn::weaver::pointcut::matches;
use lyn::weaver::{WeaveError, Weaver, WeaverState};
use support::{function_body, parse_program, weave_src};

const TARGET: &str = "func work()\n  s1()\n  s2()\nend\n";

#[test]
fn pointcut_glob_cases() {
    let cases = [
        ("test_*", "test_foo", true),
        ("test_*", "test_", true),
        ("test_*", "footest_", false),
        ("*_test", "foo_test", true),
        ("*_test", "test_foo", false),
        ("get*", "getValue", true),
        ("getValue", "getValue", true),
        ("getValue", "getValueX", false),
        ("getValue", "setValue", false),
        ("Get*", "getValue", false),
        ("*", "", true),
    ];
    for (pattern, name, expected) in cases {
        assert_eq!(matches(pattern, name), expected, "{pattern} vs {name}");
    }
}

#[test]
fn before_advice_goes_first() {
    let (p, stats) = weave_src(&format!("{TARGET}aspect A pointcut p \"work\" before p a1() end end"));
    assert_eq!(function_body(&p, "work"), vec!["a1()", "s1()", "s2()"]);
    assert_eq!((stats.joinpoints_found, stats.advice_applied), (1, 1));
}

#[test]
fn after_advice_goes_last() {
    let (p, _) = weave_src(&format!("{TARGET}aspect A pointcut p \"work\" after p a2() end end"));
    assert_eq!(function_body(&p, "work"), vec!["s1()", "s2()", "a2()"]);
}

#[test]
fn before_and_after_surround_the_body() {
    let src = format!("{TARGET}aspect A\n  pointcut p \"w*\"\n  before p a1() end\n  after p a2() end\nend");
    let (p, stats) = weave_src(&src);
    assert_eq!(function_body(&p, "work"), vec!["a1()", "s1()", "s2()", "a2()"]);
    assert_eq!(stats.advice_applied, 2);
}

#[test]
/// 複数のアスペクトは定義順に適用される。
fn aspects_apply_in_definition_order() {
    let src = format!(
        "{TARGET}aspect A pointcut p \"work\" before p first() end end\naspect B pointcut q \"work\" before q second() end end"
    );
    let (p, stats) = weave_src(&src);
    assert_eq!(function_body(&p, "work"), vec!["second()", "first()", "s1()", "s2()"]);
    assert_eq!(stats.joinpoints_found, 2);
}

#[test]
fn nested_functions_are_joinpoints_too() {
    let src = "func outer()\n  func inner() body() end\n  inner()\nend\naspect A pointcut p \"inner\" before p hook() end end";
    let (p, stats) = weave_src(src);
    assert_eq!(stats.advice_applied, 1);
    assert_eq!(
        function_body(&p, "outer"),
        vec!["func inner(); hook(); body(); end", "inner()"]
    );
}

#[test]
fn unknown_pointcut_is_reported_and_skipped() {
    let mut p = parse_program(&format!(
        "{TARGET}aspect A pointcut p \"work\" before missing nope() end before p ok() end end"
    ));
    let mut weaver = Weaver::new();
    let err = weaver.weave(&mut p).unwrap_err();
    assert!(matches!(err, WeaveError::Failed { count: 1, .. }));
    assert_eq!(weaver.state(), WeaverState::Done);
    assert!(weaver.stats().last_error.as_deref().unwrap_or("").contains("missing"));
    assert_eq!(function_body(&p, "work"), vec!["ok()", "s1()", "s2()"]);
}

#[test]
/// 同じ Weaver を使い回しても、統計とエラーは前回の実行から持ち越さない。
fn reused_weaver_starts_from_fresh_stats() {
    let mut weaver = Weaver::new();
    let mut bad = parse_program(&format!(
        "{TARGET}aspect A pointcut p \"work\" before missing nope() end end"
    ));
    assert!(weaver.weave(&mut bad).is_err());
    assert_eq!(weaver.stats().errors, 1);

    let mut good = parse_program(&format!("{TARGET}aspect A pointcut p \"work\" before p a1() end end"));
    let stats = weaver.weave(&mut good).unwrap();
    assert_eq!((stats.joinpoints_found, stats.advice_applied, stats.errors), (1, 1, 0));
    assert_eq!(stats.last_error, None);
    assert_eq!(weaver.state(), WeaverState::Done);
}
