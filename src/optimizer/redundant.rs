// パス: src/optimizer/redundant.rs
// 役割: トップレベルの冗長な代入文を取り除くパス
// 意図: 削除対象の添字を先に集め、最後にまとめて詰めることで文の相対順序を保つ

use std::collections::HashSet;

use crate::ast::{AstNode, NodeKind};
use crate::typesys::Type;

/// 旧来の特例: `explicit_float = inferred_int`（右辺が int 推論の変数）を冗長とみなす。
const LEGACY_TARGET: &str = "explicit_float";
const LEGACY_SOURCE: &str = "inferred_int";

/// プログラム直下の冗長な代入を削除し、削除数を返す。
pub fn remove_redundant(program: &mut AstNode) -> usize {
    let NodeKind::Program { statements } = &mut program.kind else {
        return 0;
    };
    let marked: HashSet<usize> = statements
        .iter()
        .enumerate()
        .filter(|(i, stmt)| is_redundant(stmt, &statements[..*i]))
        .map(|(i, _)| i)
        .collect();
    if marked.is_empty() {
        return 0;
    }
    let mut index = 0;
    statements.retain(|_| {
        let keep = !marked.contains(&index);
        index += 1;
        keep
    });
    marked.len()
}

fn is_redundant(stmt: &AstNode, earlier: &[AstNode]) -> bool {
    let NodeKind::Assign { name, value } = &stmt.kind else {
        return false;
    };
    let NodeKind::Identifier { name: source } = &value.kind else {
        return false;
    };
    if name == source {
        return true;
    }
    name == LEGACY_TARGET && source == LEGACY_SOURCE && inferred_int(value, earlier)
}

/// 右辺の変数が int と推論されているか。型メモがなければ直前の宣言から判断する。
fn inferred_int(value: &AstNode, earlier: &[AstNode]) -> bool {
    if let Some(t) = &value.inferred_type {
        return *t == Type::Int;
    }
    earlier.iter().rev().find_map(|s| match &s.kind {
        NodeKind::Assign { name, value } if name == LEGACY_SOURCE => Some(is_int_literal(value)),
        NodeKind::VarDecl {
            name,
            type_expr: None,
            init: Some(init),
        } if name == LEGACY_SOURCE => Some(is_int_literal(init)),
        _ => None,
    }) == Some(true)
}

fn is_int_literal(node: &AstNode) -> bool {
    node.as_number().is_some_and(|v| v.fract() == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    #[test]
    fn removes_self_assignments_preserving_order() {
        let mut p = parse_program("a = 1\na = a\nb = 2\nb = b\nc = a").unwrap();
        assert_eq!(remove_redundant(&mut p), 2);
        assert_eq!(p.to_string(), "a = 1; b = 2; c = a");
        assert_eq!(remove_redundant(&mut p), 0);
    }

    #[test]
    fn legacy_float_from_inferred_int() {
        let src = "explicit_float: float = 0.5\ninferred_int = 3\nexplicit_float = inferred_int";
        let mut p = parse_program(src).unwrap();
        assert_eq!(remove_redundant(&mut p), 1);
        let mut q = parse_program("inferred_int = 2.5\nexplicit_float = inferred_int").unwrap();
        assert_eq!(remove_redundant(&mut q), 0);
    }

    #[test]
    fn nested_statements_are_not_touched() {
        let mut p = parse_program("func f(a: int) a = a end").unwrap();
        assert_eq!(remove_redundant(&mut p), 0);
    }
}
