// パス: src/optimizer/propagate.rs
// 役割: スコープ解析に基づく定数伝播パス
// 意図: 直近の代入がリテラルである変数の参照を、そのリテラルの複製で置き換える
//
// 保守的な規則:
// - ループ内のどこかで代入される変数は、ループに入る前に非定数にする。
// - 分岐・ループ・関数の中で外側の変数に代入したら、その領域を抜けた後は非定数。
// - プログラム中で再代入されるグローバル変数は関数本体へ伝播しない。
// - 組み込み以外の関数呼び出しの後は、再代入される変数をすべて非定数にする。
//   ループ内に呼び出しがあれば、ループに入る前にも同じことをする。
// - 代入先（左辺）は書き換えない。

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::ast::{AstNode, NodeKind};
use crate::builtins;

use super::cse::has_user_call;
use super::scope::SymbolTable;

/// 置き換えた参照の数を返す。
pub fn propagate_constants(program: &mut AstNode) -> usize {
    let mut writes = HashMap::new();
    count_writes(program, &mut writes);
    let mut p = Propagator {
        table: SymbolTable::new(),
        writes,
        function_depth: 0,
        replaced: 0,
    };
    p.statement(program);
    p.replaced
}

struct Propagator {
    table: SymbolTable,
    // 変数名ごとの書き込み回数（宣言の初期化・代入・ループ変数）
    writes: HashMap<String, usize>,
    function_depth: usize,
    replaced: usize,
}

/// リテラルの複製。型メモも引き継ぐ。
fn literal_of(node: &AstNode) -> Option<AstNode> {
    node.is_literal().then(|| node.clone())
}

impl Propagator {
    fn statements(&mut self, list: &mut [AstNode]) {
        for stmt in list.iter_mut() {
            self.statement(stmt);
        }
    }

    /// 新しいフレームで本体をたどり、前後で `assigned` の変数を非定数にする。
    fn region(&mut self, assigned: &HashSet<String>, body: &mut [AstNode]) {
        self.forget_all(assigned);
        self.table.push();
        self.statements(body);
        self.table.pop();
        self.forget_all(assigned);
    }

    fn forget_all(&mut self, names: &HashSet<String>) {
        for name in names {
            self.table.forget(name);
        }
    }

    /// 呼び出し先から書き換えられうる変数（2 回以上書き込まれるもの）を非定数にする。
    fn forget_shared(&mut self) {
        let shared: Vec<&String> = self
            .writes
            .iter()
            .filter(|(_, n)| **n > 1)
            .map(|(name, _)| name)
            .collect();
        for name in shared {
            self.table.forget_in_all_frames(name);
        }
    }

    /// ループの本体か条件に呼び出しがあれば、最初の反復の前に `forget_shared` する。
    fn before_loop(&mut self, parts: &[&AstNode], body: &[AstNode]) {
        if parts.iter().copied().chain(body.iter()).any(has_user_call) {
            self.forget_shared();
        }
    }

    fn statement(&mut self, node: &mut AstNode) {
        let pos = (node.line, node.column);
        match &mut node.kind {
            NodeKind::Program { statements } => self.statements(statements),
            NodeKind::Block { statements } => {
                let assigned = assigned_in(statements);
                self.region(&assigned, statements);
            }
            NodeKind::VarDecl { name, init, .. } => {
                let constant = match init {
                    Some(init) => {
                        self.expr(init);
                        literal_of(init)
                    }
                    None => None,
                };
                self.table.declare(name, constant, pos);
            }
            NodeKind::Assign { name, value } => {
                self.expr(value);
                let constant = literal_of(value);
                match self.table.lookup_mut(name) {
                    Some(sym) => sym.constant = constant,
                    None => self.table.declare(name, constant, pos),
                }
            }
            NodeKind::MemberAssign { value, .. } => self.expr(value),
            NodeKind::IndexAssign { index, value, .. } => {
                self.expr(index);
                self.expr(value);
            }
            NodeKind::ExprStmt { expr } => self.expr(expr),
            NodeKind::Return { value } => {
                if let Some(v) = value {
                    self.expr(v);
                }
            }
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.expr(condition);
                let mut assigned = assigned_in(then_body);
                assigned.extend(assigned_in(else_body));
                self.region(&assigned, then_body);
                self.region(&assigned, else_body);
            }
            NodeKind::While { condition, body } => {
                let mut assigned = assigned_in(body);
                collect_assigned(condition, &mut assigned);
                self.before_loop(&[&**condition], body);
                self.forget_all(&assigned);
                self.expr(condition);
                self.region(&assigned, body);
            }
            NodeKind::DoWhile { body, condition } => {
                let mut assigned = assigned_in(body);
                collect_assigned(condition, &mut assigned);
                self.before_loop(&[&**condition], body);
                self.region(&assigned, body);
                self.expr(condition);
            }
            NodeKind::For {
                var,
                start,
                end,
                body,
            } => {
                self.expr(start);
                self.expr(end);
                let mut assigned = assigned_in(body);
                assigned.insert(var.clone());
                self.before_loop(&[], body);
                self.loop_with_var(&assigned, var, pos, body);
            }
            NodeKind::ForEach {
                var,
                iterable,
                body,
            } => {
                self.expr(iterable);
                let mut assigned = assigned_in(body);
                assigned.insert(var.clone());
                self.before_loop(&[], body);
                self.loop_with_var(&assigned, var, pos, body);
            }
            NodeKind::FunctionDef { params, body, .. } => {
                let assigned = assigned_in(body);
                self.table.push();
                for p in params.iter() {
                    if let NodeKind::Parameter { name, .. } = &p.kind {
                        self.table.declare(name, None, (p.line, p.column));
                    }
                }
                self.function_depth += 1;
                self.statements(body);
                self.function_depth -= 1;
                self.table.pop();
                self.forget_all(&assigned);
            }
            NodeKind::ClassDef { members, .. } => {
                self.table.push();
                self.statements(members);
                self.table.pop();
            }
            NodeKind::Match { subject, arms } => {
                self.expr(subject);
                let mut assigned = HashSet::new();
                for arm in arms.iter() {
                    collect_assigned(arm, &mut assigned);
                }
                for arm in arms.iter_mut() {
                    let arm_pos = (arm.line, arm.column);
                    let NodeKind::MatchArm { pattern, body } = &mut arm.kind else {
                        continue;
                    };
                    self.forget_all(&assigned);
                    self.table.push();
                    if let NodeKind::BindingPattern { name } = &pattern.kind {
                        self.table.declare(name, None, arm_pos);
                    }
                    self.statements(body);
                    self.table.pop();
                }
                self.forget_all(&assigned);
            }
            NodeKind::AspectDef { .. }
            | NodeKind::Import { .. }
            | NodeKind::ModuleDecl { .. }
            | NodeKind::Break
            | NodeKind::Continue => {}
            _ => self.expr(node),
        }
    }

    fn loop_with_var(
        &mut self,
        assigned: &HashSet<String>,
        var: &str,
        pos: (usize, usize),
        body: &mut [AstNode],
    ) {
        self.forget_all(assigned);
        self.table.push();
        self.table.declare(var, None, pos);
        self.statements(body);
        self.table.pop();
        self.forget_all(assigned);
    }

    fn constant_for(&self, name: &str) -> Option<AstNode> {
        let (frame, sym) = self.table.lookup(name)?;
        let reassigned = self.writes.get(name).copied().unwrap_or(0) > 1;
        if self.function_depth > 0 && frame == 0 && reassigned {
            return None;
        }
        sym.constant.clone()
    }

    fn expr(&mut self, node: &mut AstNode) {
        match &mut node.kind {
            NodeKind::Identifier { name } => {
                if let Some(mut lit) = self.constant_for(name) {
                    trace!(name = %name, line = node.line, "定数を伝播");
                    lit.line = node.line;
                    lit.column = node.column;
                    *node = lit;
                    self.replaced += 1;
                }
            }
            NodeKind::Call { callee, args } => {
                let builtin = matches!(
                    &callee.kind,
                    NodeKind::Identifier { name } if builtins::is_builtin(name)
                );
                if !matches!(callee.kind, NodeKind::Identifier { .. }) {
                    self.expr(callee);
                }
                for a in args.iter_mut() {
                    self.expr(a);
                }
                if !builtin {
                    self.forget_shared();
                }
            }
            NodeKind::Lambda { params, body, .. } => {
                self.table.push();
                for p in params.iter() {
                    if let NodeKind::Parameter { name, .. } = &p.kind {
                        self.table.declare(name, None, (p.line, p.column));
                    }
                }
                self.function_depth += 1;
                self.expr(body);
                self.function_depth -= 1;
                self.table.pop();
            }
            _ => {
                for child in node.children_mut() {
                    self.expr(child);
                }
            }
        }
    }
}

fn count_writes(node: &AstNode, writes: &mut HashMap<String, usize>) {
    match &node.kind {
        NodeKind::VarDecl {
            name,
            init: Some(_),
            ..
        }
        | NodeKind::Assign { name, .. } => *writes.entry(name.clone()).or_default() += 1,
        NodeKind::For { var, .. } | NodeKind::ForEach { var, .. } => {
            *writes.entry(var.clone()).or_default() += 2
        }
        _ => {}
    }
    for child in node.children() {
        count_writes(child, writes);
    }
}

fn assigned_in(list: &[AstNode]) -> HashSet<String> {
    let mut out = HashSet::new();
    for stmt in list {
        collect_assigned(stmt, &mut out);
    }
    out
}

fn collect_assigned(node: &AstNode, out: &mut HashSet<String>) {
    match &node.kind {
        NodeKind::Assign { name, .. } => {
            out.insert(name.clone());
        }
        NodeKind::For { var, .. } | NodeKind::ForEach { var, .. } => {
            out.insert(var.clone());
        }
        _ => {}
    }
    for child in node.children() {
        collect_assigned(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn run(src: &str) -> (String, usize) {
        let mut p = parse_program(src).unwrap();
        let n = propagate_constants(&mut p);
        (p.to_string(), n)
    }

    #[test]
    fn replaces_reads_of_literal_variables() {
        let (out, n) = run("x: int = 4\ny = x + x\nx = y\nprint(x)");
        assert_eq!(out, "x: int = 4; y = (4 + 4); x = y; print(x)");
        assert_eq!(n, 2);
    }

    #[test]
    /// ループ内で代入される変数はループの前後とも伝播しない。
    fn loop_assigned_variables_are_not_propagated() {
        let (out, n) = run("i = 0\nwhile i < 10 i = i + 1 end\nprint(i)");
        assert_eq!(out, "i = 0; while (i < 10); i = (i + 1); end; print(i)");
        assert_eq!(n, 0);
    }

    #[test]
    fn branch_assignment_kills_outer_constant() {
        let (out, _) = run("a = 1\nif c a = 2; print(a) else print(a) end\nprint(a)");
        assert_eq!(out, "a = 1; if c; a = 2; print(2); else; print(a); end; print(a)");
    }

    #[test]
    fn reassigned_globals_stay_out_of_functions() {
        let (out, _) = run("k = 3\ng = 1\ng = 2\nfunc f() -> int return k + g end");
        assert_eq!(out, "k = 3; g = 1; g = 2; func f() -> int; return (3 + g); end");
    }

    #[test]
    fn shadowing_parameter_is_not_replaced() {
        let (out, n) = run("x = 1\nfunc f(x: int) -> int return x end\nh = (x: int) -> int => x");
        assert_eq!(n, 0, "{out}");
    }

    #[test]
    /// 呼び出し先が書き換えるグローバルは、呼び出しの後では伝播しない。
    fn user_calls_kill_globals_written_elsewhere() {
        let (out, _) = run("func f() k = 5 end\nk = 3\nprint(k)\nf()\nprint(k)");
        assert_eq!(out, "func f(); k = 5; end; k = 3; print(3); f(); print(k)");
        let (out, _) = run("func f() k = 5 end\nk = 3\nc = 1\nprint(len(\"ab\"), k, c)");
        assert_eq!(out, "func f(); k = 5; end; k = 3; c = 1; print(len(\"ab\"), 3, 1)");
    }

    #[test]
    fn calls_inside_loops_kill_before_the_loop() {
        let (out, _) = run("func f() k = k + 1 end\nk = 0\nwhile k < 3 f() end");
        assert_eq!(out, "func f(); k = (k + 1); end; k = 0; while (k < 3); f(); end");
    }

    #[test]
    fn second_run_is_idempotent() {
        let mut p = parse_program("x = 5\nprint(x)").unwrap();
        assert_eq!(propagate_constants(&mut p), 1);
        assert_eq!(propagate_constants(&mut p), 0);
    }
}
