// パス: tests/test_support.rs
// 役割: 統合テスト共通の補助関数とアサーションを提供する
// 意図: 繰り返しがちな解析・型検査・最適化・織り込み操作を一元化しテストを簡潔に保つ
// 関連ファイル: tests/parser_structure.rs, tests/optimizer_passes.rs, tests/weaver_aspects.rs
#![allow(dead_code)]
use lyn::{
    ast::{AstNode, NodeKind},
    errors::TypeError,
    infer,
    modules::NoModules,
    optimizer::{self, OptimizationStats, OptimizerConfig},
    parser, weaver,
};

pub fn parse_expr(src: &str) -> AstNode {
    parser::parse_expr(src).expect("parse expr")
}

pub fn parse_program(src: &str) -> AstNode {
    parser::parse_program(src).expect("parse program")
}

/// プログラム直下の文を返す。
pub fn statements(program: &AstNode) -> &[AstNode] {
    match &program.kind {
        NodeKind::Program { statements } => statements,
        other => panic!("expected Program, got {:?}", other.tag()),
    }
}

/// 名前で関数定義を探し、本体の各文を 1 行表現で返す。
pub fn function_body(program: &AstNode, name: &str) -> Vec<String> {
    statements(program)
        .iter()
        .find_map(|s| match &s.kind {
            NodeKind::FunctionDef { name: n, body, .. } if n == name => {
                Some(body.iter().map(|b| b.to_string()).collect())
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("function {name} not found"))
}

pub fn type_errors(src: &str) -> (AstNode, Vec<TypeError>) {
    let mut program = parse_program(src);
    let errors = infer::check_program(&mut program, &NoModules);
    (program, errors)
}

pub fn error_codes(errors: &[TypeError]) -> Vec<&'static str> {
    errors.iter().map(|e| e.code()).collect()
}

/// 既定設定で最適化し、結果の 1 行表現と統計を返す。
pub fn optimize_src(src: &str) -> (String, OptimizationStats) {
    let mut program = parse_program(src);
    let stats = optimizer::optimize(&mut program, OptimizerConfig::default());
    (program.to_string(), stats)
}

/// 織り込み後のプログラムと統計を返す。
pub fn weave_src(src: &str) -> (AstNode, weaver::WeavingStats) {
    let mut program = parse_program(src);
    let (stats, _) = weaver::weave(&mut program);
    (program, stats)
}

pub fn assert_number(node: &AstNode, expected: f64, note: &str) {
    match node.kind {
        NodeKind::Number { value } => assert!(
            approx_eq(value, expected),
            "{note}: expected ≈ {expected}, got {value}"
        ),
        ref other => panic!("{note}: expected Number({expected}), got {:?}", other.tag()),
    }
}

pub fn approx_eq(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() < 1e-12
}
