// パス: src/optimizer/fold.rs
// 役割: 定数畳み込みパス
// 意図: リテラル同士の演算をビルド時に計算し、元の部分木を置き換える

use crate::ast::{AstNode, BinaryOp, NodeKind, UnaryOp};
use crate::typesys::Type;

/// 木全体を下から畳み込み、置き換えたノード数を返す。
///
/// リテラル 0 による除算・剰余は実行時エラーを隠さないよう畳み込まない。
/// 比較の結果は数値 0/1 で、型メモは bool。
pub fn fold_constants(node: &mut AstNode) -> usize {
    let mut count = 0;
    for child in node.children_mut() {
        count += fold_constants(child);
    }
    if let Some(kind) = folded(&node.kind) {
        let comparison = matches!(&node.kind, NodeKind::Binary { op, .. } if op.is_comparison());
        let mut lit = AstNode::new(kind, node.line, node.column);
        if comparison {
            lit.inferred_type = Some(Type::Bool);
        }
        *node = lit;
        count += 1;
    }
    count
}

fn folded(kind: &NodeKind) -> Option<NodeKind> {
    match kind {
        NodeKind::Binary { op, left, right } => match (&left.kind, &right.kind) {
            (NodeKind::Number { value: l }, NodeKind::Number { value: r }) => {
                fold_numbers(*op, *l, *r).map(|value| NodeKind::Number { value })
            }
            (NodeKind::Str { value: l }, NodeKind::Str { value: r }) if *op == BinaryOp::Add => {
                Some(NodeKind::Str {
                    value: format!("{l}{r}"),
                })
            }
            _ => None,
        },
        NodeKind::Unary { op, operand } => match (op, &operand.kind) {
            (UnaryOp::Neg, NodeKind::Number { value }) => Some(NodeKind::Number { value: -value }),
            (UnaryOp::Not, NodeKind::Bool { value }) => Some(NodeKind::Bool { value: !value }),
            _ => None,
        },
        _ => None,
    }
}

fn is_integral(v: f64) -> bool {
    v.is_finite() && v.fract() == 0.0
}

/// 数値二項演算を評価する。整数同士の `/` と `%` は整数演算として切り捨てる。
fn fold_numbers(op: BinaryOp, l: f64, r: f64) -> Option<f64> {
    let ints = is_integral(l) && is_integral(r);
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    Some(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div if r == 0.0 => return None,
        BinaryOp::Div if ints => (l / r).trunc(),
        BinaryOp::Div => l / r,
        BinaryOp::Mod if r == 0.0 => return None,
        BinaryOp::Mod => l % r,
        BinaryOp::Gt => flag(l > r),
        BinaryOp::Lt => flag(l < r),
        BinaryOp::Ge => flag(l >= r),
        BinaryOp::Le => flag(l <= r),
        BinaryOp::Eq => flag(l == r),
        BinaryOp::Ne => flag(l != r),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expr;

    fn fold_src(src: &str) -> (String, usize) {
        let mut e = parse_expr(src).unwrap();
        let n = fold_constants(&mut e);
        (e.to_string(), n)
    }

    #[test]
    /// `3 + 4 * 2` は 1 つのリテラルになる。
    fn folds_nested_arithmetic() {
        let (out, n) = fold_src("3 + 4 * 2");
        assert_eq!(out, "11");
        assert_eq!(n, 2);
    }

    #[test]
    fn division_by_zero_is_kept() {
        assert_eq!(fold_src("10 / 0"), ("(10 / 0)".to_string(), 0));
        assert_eq!(fold_src("10 % 0").1, 0);
    }

    #[test]
    fn comparisons_fold_to_flags() {
        assert_eq!(fold_src("3 > 2").0, "1");
        assert_eq!(fold_src("3 == 2").0, "0");
        let mut e = parse_expr("1 + 1 >= 2").unwrap();
        fold_constants(&mut e);
        assert_eq!(e.inferred_type, Some(Type::Bool));
        let mut e = parse_expr("1 + 1").unwrap();
        e.inferred_type = Some(Type::Int);
        fold_constants(&mut e);
        assert_eq!(e.inferred_type, None);
    }

    #[test]
    fn unary_string_and_integer_division() {
        assert_eq!(fold_src("-(2 + 3)").0, "-5");
        assert_eq!(fold_src("!true").0, "false");
        assert_eq!(fold_src("\"ab\" + \"cd\"").0, "\"abcd\"");
        assert_eq!(fold_src("7 / 2").0, "3");
        assert_eq!(fold_src("7.5 / 2.5").0, "3");
    }

    #[test]
    fn second_run_changes_nothing() {
        let mut e = parse_expr("(1 + 2) * x").unwrap();
        assert_eq!(fold_constants(&mut e), 1);
        assert_eq!(fold_constants(&mut e), 0);
        assert_eq!(e.to_string(), "(3 * x)");
    }
}
