// パス: src/optimizer/dce.rs
// 役割: 到達不能な文と、定数条件で決まる分岐を取り除くパス
// 意図: 条件が畳み込み済みリテラルである場合にのみ刈り込み、判断できない分岐は残す

use crate::ast::{AstNode, NodeKind};

/// 削除した文の数を返す。
///
/// - 関数本体（とその中の入れ子の文列）では、無条件の `return` 以降を削除する。
/// - 条件がリテラルの `if` は取られない側の文を削除する（`if` 自体は残す）。
/// - 条件がリテラルの偽である `while` は本体を空にする。
pub fn eliminate_dead_code(node: &mut AstNode) -> usize {
    walk(node, false)
}

fn walk(node: &mut AstNode, in_function: bool) -> usize {
    let mut removed = 0;
    let in_function = in_function || matches!(node.kind, NodeKind::FunctionDef { .. });
    match &mut node.kind {
        NodeKind::If {
            condition,
            then_body,
            else_body,
        } => match condition.literal_truth() {
            Some(true) => removed += drain(else_body),
            Some(false) => removed += drain(then_body),
            None => {}
        },
        NodeKind::While { condition, body } => {
            if condition.literal_truth() == Some(false) {
                removed += drain(body);
            }
        }
        _ => {}
    }
    if in_function {
        for list in node.statement_lists_mut() {
            removed += truncate_after_return(list);
        }
    }
    for child in node.children_mut() {
        removed += walk(child, in_function);
    }
    removed
}

fn drain(list: &mut Vec<AstNode>) -> usize {
    let n = list.len();
    list.clear();
    n
}

fn truncate_after_return(list: &mut Vec<AstNode>) -> usize {
    match list
        .iter()
        .position(|s| matches!(s.kind, NodeKind::Return { .. }))
    {
        Some(i) if i + 1 < list.len() => {
            let n = list.len() - (i + 1);
            list.truncate(i + 1);
            n
        }
        _ => 0,
    }
}
