// パス: src/optimizer/cse.rs
// 役割: 文列内の共通部分式除去パスと、構造ハッシュ・構造比較
// 意図: 同じ純粋式を再計算せず、先に値を保持した変数を参照させる
//
// 文列ごとに表を持ち、制御構造に入るとき・出るときに表を空にする。
// 到達定義や生存解析は行わない。

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use tracing::trace;

use crate::ast::{AstNode, NodeKind};
use crate::builtins;

/// 位置と型メモを無視した構造ハッシュ。
pub fn structural_hash(node: &AstNode) -> u64 {
    let mut h = DefaultHasher::new();
    hash_into(node, &mut h);
    h.finish()
}

fn hash_into(node: &AstNode, h: &mut DefaultHasher) {
    node.tag().hash(h);
    match &node.kind {
        NodeKind::Number { value } => value.to_bits().hash(h),
        NodeKind::Str { value } => value.hash(h),
        NodeKind::Bool { value } => value.hash(h),
        NodeKind::Identifier { name } => name.hash(h),
        NodeKind::Binary { op, .. } => op.hash(h),
        NodeKind::Unary { op, .. } => op.hash(h),
        NodeKind::MemberAccess { member, .. } => member.hash(h),
        _ => {}
    }
    for child in node.children() {
        hash_into(child, h);
    }
}

/// 位置と型メモを無視して 2 つの部分木が同じ形かを比べる。
pub fn structurally_equal(a: &AstNode, b: &AstNode) -> bool {
    let same_scalars = match (&a.kind, &b.kind) {
        (NodeKind::Number { value: x }, NodeKind::Number { value: y }) => x.to_bits() == y.to_bits(),
        (NodeKind::Str { value: x }, NodeKind::Str { value: y }) => x == y,
        (NodeKind::Bool { value: x }, NodeKind::Bool { value: y }) => x == y,
        (NodeKind::Identifier { name: x }, NodeKind::Identifier { name: y }) => x == y,
        (NodeKind::Binary { op: x, .. }, NodeKind::Binary { op: y, .. }) => x == y,
        (NodeKind::Unary { op: x, .. }, NodeKind::Unary { op: y, .. }) => x == y,
        (NodeKind::MemberAccess { member: x, .. }, NodeKind::MemberAccess { member: y, .. }) => {
            x == y
        }
        (x, y) => x.tag() == y.tag(),
    };
    if !same_scalars {
        return false;
    }
    let (ca, cb) = (a.children(), b.children());
    ca.len() == cb.len() && ca.iter().zip(cb.iter()).all(|(x, y)| structurally_equal(x, y))
}

/// 識別子とリテラルだけから成る二項・単項式か。
fn is_candidate(node: &AstNode) -> bool {
    matches!(node.kind, NodeKind::Binary { .. } | NodeKind::Unary { .. }) && is_pure(node)
}

fn is_pure(node: &AstNode) -> bool {
    match &node.kind {
        NodeKind::Binary { left, right, .. } => is_pure(left) && is_pure(right),
        NodeKind::Unary { operand, .. } => is_pure(operand),
        NodeKind::Identifier { .. } => true,
        _ => node.is_literal(),
    }
}

fn reads(node: &AstNode, out: &mut HashSet<String>) {
    if let NodeKind::Identifier { name } = &node.kind {
        out.insert(name.clone());
    }
    for child in node.children() {
        reads(child, out);
    }
}

/// 組み込み以外の関数呼び出しを含むか（呼び出し先が変数を書き換えうる）。
pub(super) fn has_user_call(node: &AstNode) -> bool {
    if let NodeKind::Call { callee, .. } = &node.kind {
        let builtin = matches!(&callee.kind, NodeKind::Identifier { name } if builtins::is_builtin(name));
        if !builtin {
            return true;
        }
    }
    node.children().into_iter().any(has_user_call)
}

fn is_region(node: &AstNode) -> bool {
    matches!(
        node.kind,
        NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::DoWhile { .. }
            | NodeKind::For { .. }
            | NodeKind::ForEach { .. }
            | NodeKind::Match { .. }
            | NodeKind::MatchArm { .. }
            | NodeKind::Block { .. }
            | NodeKind::FunctionDef { .. }
            | NodeKind::ClassDef { .. }
            | NodeKind::AspectDef { .. }
            | NodeKind::Advice { .. }
    )
}

struct Entry {
    expr: AstNode,
    holder: String,
    deps: HashSet<String>,
}

/// 文列 1 つ分の式表。
#[derive(Default)]
struct ExprTable {
    entries: HashMap<u64, Vec<Entry>>,
}

impl ExprTable {
    fn find(&self, expr: &AstNode) -> Option<&str> {
        self.entries
            .get(&structural_hash(expr))?
            .iter()
            .find(|e| structurally_equal(&e.expr, expr))
            .map(|e| e.holder.as_str())
    }

    fn insert(&mut self, expr: &AstNode, holder: &str) {
        let mut deps = HashSet::new();
        reads(expr, &mut deps);
        let mut expr = expr.clone();
        expr.invalidate_types();
        self.entries
            .entry(structural_hash(&expr))
            .or_default()
            .push(Entry {
                expr,
                holder: holder.to_string(),
                deps,
            });
    }

    /// `name` を読む式と、`name` が保持している式を無効にする。
    fn invalidate(&mut self, name: &str) {
        for bucket in self.entries.values_mut() {
            bucket.retain(|e| e.holder != name && !e.deps.contains(name));
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// 置き換えた部分式の数を返す。
pub fn eliminate_common_subexpressions(node: &mut AstNode) -> usize {
    let mut count = 0;
    for list in node.statement_lists_mut() {
        count += process_list(list);
    }
    count
}

/// 代入・宣言の右辺全体だけを記録し、後の右辺全体が一致すれば変数に置き換える。
/// 式の内側にある部分式どうしは照合しない。
fn process_list(list: &mut [AstNode]) -> usize {
    let mut table = ExprTable::default();
    let mut count = 0;
    for stmt in list.iter_mut() {
        if is_region(stmt) {
            table.clear();
            count += eliminate_common_subexpressions(stmt);
            table.clear();
            continue;
        }
        let pos = (stmt.line, stmt.column);
        let calls = has_user_call(stmt);
        let (name, value) = match &mut stmt.kind {
            NodeKind::Assign { name, value } => (name.clone(), &mut **value),
            NodeKind::VarDecl {
                name,
                init: Some(init),
                ..
            } => (name.clone(), &mut **init),
            _ => {
                if calls {
                    table.clear();
                }
                continue;
            }
        };
        if is_candidate(value) {
            if let Some(holder) = table.find(value).filter(|h| *h != name) {
                trace!(holder, line = pos.0, "共通部分式を再利用");
                let mut replacement = AstNode::identifier(holder, value.line, value.column);
                replacement.inferred_type = value.inferred_type.clone();
                *value = replacement;
                count += 1;
            }
        }
        table.invalidate(&name);
        if calls {
            table.clear();
        } else if is_candidate(value) {
            let mut deps = HashSet::new();
            reads(value, &mut deps);
            if !deps.contains(&name) {
                table.insert(value, &name);
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expr, parse_program};

    fn run(src: &str) -> (String, usize) {
        let mut p = parse_program(src).unwrap();
        let n = eliminate_common_subexpressions(&mut p);
        (p.to_string(), n)
    }

    #[test]
    fn hash_ignores_positions() {
        let a = parse_expr("x * (y + 1)").unwrap();
        let b = parse_expr("x   *   (y+1)").unwrap();
        assert_eq!(structural_hash(&a), structural_hash(&b));
        assert!(structurally_equal(&a, &b));
        let c = parse_expr("x * (y + 2)").unwrap();
        assert!(!structurally_equal(&a, &c));
    }

    #[test]
    /// 同じ式は先に保持した変数で置き換える。
    fn reuses_holder_variable() {
        let (out, n) = run("a = x * y\nb = x * y\nc = x * y");
        assert_eq!(out, "a = (x * y); b = a; c = a");
        assert_eq!(n, 2);
    }

    #[test]
    fn reassignment_of_dependency_invalidates() {
        let (out, n) = run("a = x + 1\nx = 5\nb = x + 1");
        assert_eq!(out, "a = (x + 1); x = 5; b = (x + 1)");
        assert_eq!(n, 0);
        let (_, n) = run("a = x + 1\na = 0\nb = x + 1");
        assert_eq!(n, 0);
    }

    #[test]
    fn table_is_cleared_at_control_flow() {
        let (out, n) = run("a = x * y\nif c b = x * y end\nd = x * y");
        assert_eq!(out, "a = (x * y); if c; b = (x * y); end; d = (x * y)");
        assert_eq!(n, 0);
    }

    #[test]
    fn user_calls_clear_the_table() {
        let (_, n) = run("a = x * y\nf()\nb = x * y");
        assert_eq!(n, 0);
        let (_, n) = run("a = x * y\nprint(a)\nb = x * y");
        assert_eq!(n, 1);
    }

    #[test]
    fn works_inside_function_bodies() {
        let (out, n) = run("func f(p: int, q: int) -> int s = p - q; t = p - q; return t end");
        assert_eq!(n, 1);
        assert!(out.contains("t = s"));
    }

    #[test]
    /// 部分式は置き換えず、右辺全体が一致したときだけ再利用する。
    fn only_whole_right_hand_sides_are_reused() {
        let (out, n) = run("a = x * y\nb = x * y + 1");
        assert_eq!(out, "a = (x * y); b = ((x * y) + 1)");
        assert_eq!(n, 0);
    }
}
