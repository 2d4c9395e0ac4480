// パス: tests/parser_structure.rs
// 役割: パーサが生成する木の形と、ラムダ先読みの非干渉を検証する
// 意図: 文の判別・優先順位・先読みの復元という構文解析の要所を外部 API から確認する
// 関連ファイル: src/parser/mod.rs, src/parser/expr.rs, src/parser/program.rs
#[path = "test_support.rs"]
mod support;

use lyn::ast::{BinaryOp, NodeKind, NodeTag, TypeExpr};
use lyn::parser::{self, Parser};
use support::{parse_expr, parse_program, statements};

#[test]
/// 関数・クラス・アスペクト・制御構文の混在したプログラムの文数と種別。
fn top_level_statement_kinds() {
    let src = r#"
module app.main
import util.math
func add(a: int, b: int) -> int
    return a + b
end
class Point
    x: int = 0
    y int
end
aspect Trace
    pointcut all "*"
    before all print("enter") end
end
total = 0
for i in range(10)
    total = total + add(i, 1)
end
"#;
    let program = parse_program(src);
    let tags: Vec<NodeTag> = statements(&program).iter().map(|s| s.tag()).collect();
    assert_eq!(
        tags,
        vec![
            NodeTag::ModuleDecl,
            NodeTag::Import,
            NodeTag::FunctionDef,
            NodeTag::ClassDef,
            NodeTag::AspectDef,
            NodeTag::Assign,
            NodeTag::For,
        ]
    );
    match &statements(&program)[2].kind {
        NodeKind::FunctionDef {
            params,
            return_type,
            body,
            ..
        } => {
            assert_eq!(params.len(), 2);
            assert_eq!(return_type.as_ref(), Some(&TypeExpr::Named("int".into())));
            assert_eq!(body.len(), 1);
        }
        other => panic!("unexpected {:?}", other.tag()),
    }
    match &statements(&program)[3].kind {
        NodeKind::ClassDef { members, .. } => {
            assert_eq!(members.len(), 2);
            assert!(members.iter().all(|m| m.tag() == NodeTag::VarDecl));
        }
        other => panic!("unexpected {:?}", other.tag()),
    }
    match &statements(&program)[6].kind {
        NodeKind::For { start, end, .. } => {
            assert_eq!(start.to_string(), "0");
            assert_eq!(end.to_string(), "10");
        }
        other => panic!("unexpected {:?}", other.tag()),
    }
}

#[test]
/// 2 引数・戻り値 int のラムダは Lambda ノードになる。
fn lambda_with_two_params() {
    let program = parse_program("f = (a: int, b: int) -> int => a + b");
    let NodeKind::Assign { value, .. } = &statements(&program)[0].kind else {
        panic!("expected assignment");
    };
    match &value.kind {
        NodeKind::Lambda {
            params,
            return_type,
            body,
        } => {
            assert_eq!(params.len(), 2);
            assert_eq!(return_type.as_ref().map(|t| t.to_string()), Some("int".into()));
            assert_eq!(body.to_string(), "(a + b)");
        }
        other => panic!("expected lambda, got {:?}", other.tag()),
    }
}

#[test]
/// 括弧式は二項演算の木になり、ラムダとは解釈されない。
fn parenthesized_expression_is_binary() {
    let e = parse_expr("(a + b) * c");
    match &e.kind {
        NodeKind::Binary { op, left, right } => {
            assert_eq!(*op, BinaryOp::Mul);
            assert_eq!(left.tag(), NodeTag::Binary);
            assert_eq!(right.to_string(), "c");
        }
        other => panic!("expected binary, got {:?}", other.tag()),
    }
}

#[test]
/// 先読みが失敗しても成功しても、字句解析器の位置は変わらない。
fn lookahead_restores_lexer_state() {
    let mut p = Parser::new("(a + b) * c").unwrap();
    let before = p.lexer_state();
    assert!(!p.lambda_ahead());
    assert_eq!(p.lexer_state(), before);

    let mut p = Parser::new("(x: (int) -> int, y: int[]) -> int => x(y[0])").unwrap();
    let before = p.lexer_state();
    assert!(p.lambda_ahead());
    assert_eq!(p.lexer_state(), before);
}

#[test]
fn ufcs_and_statement_disambiguation() {
    let program = parse_program("p.move(1, 2)\nn int = 3\nm: float\np.x = 4\nxs[0] = 5");
    let rendered: Vec<String> = statements(&program).iter().map(|s| s.to_string()).collect();
    assert_eq!(
        rendered,
        vec!["move(p, 1, 2)", "n: int = 3", "m: float", "p.x = 4", "xs[0] = 5"]
    );
    let tags: Vec<NodeTag> = statements(&program).iter().map(|s| s.tag()).collect();
    assert_eq!(&tags[1..], &[
        NodeTag::VarDecl,
        NodeTag::VarDecl,
        NodeTag::MemberAssign,
        NodeTag::IndexAssign
    ]);
}

#[test]
fn match_and_else_if_chains() {
    let src = "match n\n case 0 => print(\"zero\")\n case -1 => print(\"neg\")\n case k => print(k)\nend\nif a print(1) else if b print(2) else print(3) end";
    let program = parse_program(src);
    match &statements(&program)[0].kind {
        NodeKind::Match { arms, .. } => assert_eq!(arms.len(), 3),
        other => panic!("unexpected {:?}", other.tag()),
    }
    match &statements(&program)[1].kind {
        NodeKind::If { else_body, .. } => {
            assert_eq!(else_body.len(), 1);
            assert_eq!(else_body[0].tag(), NodeTag::If);
        }
        other => panic!("unexpected {:?}", other.tag()),
    }
}

#[test]
/// 構文エラーは最初の 1 件で止まり、コードと規則スタックを持つ。
fn syntax_errors_carry_code_and_rule_stack() {
    let err = parser::parse_program("func f() while end").unwrap_err();
    assert_eq!(err.code(), "PAR010");
    assert!(err.rules.contains(&"function"));
    assert!(err.rules.contains(&"while"));

    let err = parser::parse_program("1 + 2 = 3").unwrap_err();
    assert_eq!(err.code(), "PAR040");

    let err = parser::parse_program("while x print(x)").unwrap_err();
    assert_eq!(err.code(), "PAR060");

    let err = parser::parse_expr("1 2").unwrap_err();
    assert_eq!(err.code(), "PAR090");
}

#[test]
/// 値なしの return は行末で終わり、次の行の文を取り込まない。
fn bare_return_stops_at_line_break() {
    let program = parse_program("func f()\n  return\n  x = 1\nend\nfunc g() -> int return 2 end");
    let s = statements(&program);
    let NodeKind::FunctionDef { body, .. } = &s[0].kind else {
        panic!("unexpected {:?}", s[0].tag());
    };
    assert_eq!(body.len(), 2);
    assert!(matches!(body[0].kind, NodeKind::Return { value: None }));
    assert_eq!(body[1].tag(), NodeTag::Assign);
    let NodeKind::FunctionDef { body, .. } = &s[1].kind else {
        panic!("unexpected {:?}", s[1].tag());
    };
    assert!(matches!(body[0].kind, NodeKind::Return { value: Some(_) }));
}

#[test]
/// 型注釈だけの解析は文中の注釈と同じ文法で、余りのトークンを拒否する。
fn standalone_type_annotations() {
    let t = parser::parse_type_expr("(int, float[]) -> bool").unwrap();
    assert_eq!(t.to_string(), "(int, float[]) -> bool");
    assert!(matches!(parser::parse_type_expr("string[]"), Ok(TypeExpr::Array(_))));
    let err = parser::parse_type_expr("int x").unwrap_err();
    assert!(err.to_string().contains("PAR090"), "{err}");
}
