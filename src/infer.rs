// パス: src/infer.rs
// 役割: ベストエフォートの型推論と型検査を実装する
// 意図: 式の型をノードにメモし、型エラーを止めずに診断として蓄積する
// 関連ファイル: src/typesys.rs, src/ast.rs, src/builtins.rs, src/modules.rs
//! 型推論モジュール
//!
//! - 式の型は `AstNode::inferred_type` に一度だけ書き込む（メモ化）。文は毎回たどる。
//! - 名前解決は 変数スコープ（内→外）→ 関数 → クラス → 組み込み → import の順。
//! - 型エラーは `TypeError` として記録し、そのノードは `Unknown` にして推論を続ける。
//! - 宣言は事前に巻き上げるため、前方参照する関数・クラスも解決できる。

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::ast::{AstNode, BinaryOp, NodeKind, NodeTag, TypeExpr, UnaryOp};
use crate::builtins;
use crate::errors::TypeError;
use crate::modules::{NoModules, SymbolResolver};
use crate::typesys::*;

static NO_MODULES: NoModules = NoModules;

/// クラス宣言から集めたメンバ情報。
#[derive(Clone, Debug, Default)]
pub struct ClassInfo {
    pub name: String,
    pub base: Option<String>,
    pub fields: HashMap<String, Type>,
    pub methods: HashMap<String, FunctionType>,
}

/// 型検査器。スコープ・関数シグネチャ・クラス表・エラーを所有する。
pub struct TypeChecker<'r> {
    scopes: Vec<HashMap<String, Type>>,
    functions: HashMap<String, FunctionType>,
    classes: HashMap<String, ClassInfo>,
    imports: Vec<Vec<String>>,
    resolver: &'r dyn SymbolResolver,
    // 囲んでいる関数の宣言戻り値型（注釈なしは None）
    returns: Vec<Option<Type>>,
    errors: Vec<TypeError>,
}

impl Default for TypeChecker<'static> {
    fn default() -> Self {
        TypeChecker::new(&NO_MODULES)
    }
}

impl<'r> TypeChecker<'r> {
    pub fn new(resolver: &'r dyn SymbolResolver) -> Self {
        Self {
            scopes: vec![HashMap::new()],
            functions: HashMap::new(),
            classes: HashMap::new(),
            imports: Vec::new(),
            resolver,
            returns: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TypeError> {
        self.errors
    }

    /// グローバルスコープに登録された変数の型。
    pub fn global_type(&self, name: &str) -> Option<&Type> {
        self.scopes.first().and_then(|s| s.get(name))
    }

    pub fn function_signature(&self, name: &str) -> Option<&FunctionType> {
        self.functions.get(name)
    }

    pub fn class_info(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// プログラム全体を検査する。宣言を巻き上げてから文を順にたどる。
    pub fn check_program(&mut self, program: &mut AstNode) {
        if let NodeKind::Program { statements } = &mut program.kind {
            self.hoist(statements);
            for stmt in statements.iter_mut() {
                self.check_statement(stmt);
            }
        } else {
            self.check_statement(program);
        }
        debug!(errors = self.errors.len(), "型検査完了");
    }

    fn report(&mut self, code: &'static str, msg: String, node: &AstNode) {
        warn!(code, line = node.line, col = node.column, "{msg}");
        self.errors
            .push(TypeError::at(code, msg, node.line, node.column));
    }

    // ---- 宣言の巻き上げ ----

    fn hoist(&mut self, statements: &[AstNode]) {
        for stmt in statements {
            match &stmt.kind {
                NodeKind::ClassDef {
                    name,
                    base,
                    members,
                } => self.register_class(name, base.as_deref(), members),
                NodeKind::FunctionDef { name, .. } => {
                    let sig = self.signature_of(stmt);
                    self.functions.insert(name.clone(), sig);
                }
                _ => {}
            }
        }
    }

    fn register_class(&mut self, name: &str, base: Option<&str>, members: &[AstNode]) {
        let mut info = ClassInfo {
            name: name.to_string(),
            base: base.map(str::to_string),
            ..ClassInfo::default()
        };
        // 自クラスを参照するフィールド型のため、先に名前だけ登録する
        self.classes.insert(name.to_string(), info.clone());
        for member in members {
            match &member.kind {
                NodeKind::VarDecl {
                    name: field,
                    type_expr,
                    ..
                } => {
                    let ty = type_expr
                        .as_ref()
                        .map(|t| self.resolve_type_expr(t))
                        .unwrap_or(Type::Unknown);
                    info.fields.insert(field.clone(), ty);
                }
                NodeKind::FunctionDef { name: method, .. } => {
                    let sig = self.signature_of(member);
                    info.methods.insert(method.clone(), sig);
                }
                _ => {}
            }
        }
        self.classes.insert(name.to_string(), info);
    }

    fn signature_of(&self, func: &AstNode) -> FunctionType {
        match &func.kind {
            NodeKind::FunctionDef {
                params,
                return_type,
                ..
            } => {
                let params = params.iter().map(|p| self.param_type(p)).collect();
                let ret = return_type
                    .as_ref()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or(Type::Unknown);
                FunctionType::new(params, ret)
            }
            _ => FunctionType::new(Vec::new(), Type::Unknown),
        }
    }

    fn param_type(&self, param: &AstNode) -> Type {
        match &param.kind {
            NodeKind::Parameter {
                type_expr: Some(t), ..
            } => self.resolve_type_expr(t),
            _ => Type::Unknown,
        }
    }

    /// 型注釈を型へ変換する。未知の名前は `Unknown`。
    pub fn resolve_type_expr(&self, te: &TypeExpr) -> Type {
        match te {
            TypeExpr::Named(name) => match name.as_str() {
                "int" => Type::Int,
                "float" => Type::Float,
                "bool" => Type::Bool,
                "string" => Type::String,
                "void" => Type::Void,
                "null" => Type::Null,
                other => self
                    .class_type(other)
                    .map(Type::Class)
                    .unwrap_or(Type::Unknown),
            },
            TypeExpr::Array(elem) => Type::array(self.resolve_type_expr(elem)),
            TypeExpr::Function { params, ret } => Type::function(
                params.iter().map(|p| self.resolve_type_expr(p)).collect(),
                self.resolve_type_expr(ret),
            ),
        }
    }

    /// 登録済みクラスから基底鎖付きの `ClassType` を組み立てる。
    pub fn class_type(&self, name: &str) -> Option<ClassType> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(name);
        while let Some(n) = cur {
            if !seen.insert(n) {
                break;
            }
            let info = self.classes.get(n)?;
            chain.push(info.name.clone());
            cur = info.base.as_deref().filter(|b| self.classes.contains_key(*b));
        }
        let mut out: Option<ClassType> = None;
        for n in chain.into_iter().rev() {
            let mut c = ClassType::new(n);
            c.base = out.map(Box::new);
            out = Some(c);
        }
        out
    }

    /// 基底クラス鎖をたどってメンバ（フィールドかメソッド）の型を引く。
    fn lookup_member(&self, class: &ClassType, member: &str) -> Option<Type> {
        class.ancestry().into_iter().find_map(|name| {
            let info = self.classes.get(name)?;
            info.fields.get(member).cloned().or_else(|| {
                info.methods
                    .get(member)
                    .map(|m| Type::Function(m.clone()))
            })
        })
    }

    fn lookup_method(&self, class: &ClassType, method: &str) -> Option<FunctionType> {
        class
            .ancestry()
            .into_iter()
            .find_map(|name| self.classes.get(name)?.methods.get(method).cloned())
    }

    // ---- スコープ ----

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    fn declare(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn lookup_var(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn resolve_import(&self, name: &str) -> Option<Type> {
        self.imports
            .iter()
            .find_map(|path| self.resolver.resolve(path, name))
    }

    // ---- 文 ----

    fn check_block(&mut self, body: &mut [AstNode]) {
        self.push_scope();
        for stmt in body.iter_mut() {
            self.check_statement(stmt);
        }
        self.pop_scope();
    }

    pub fn check_statement(&mut self, node: &mut AstNode) {
        match &mut node.kind {
            NodeKind::Program { statements } | NodeKind::Block { statements } => {
                let stmts = statements;
                self.push_scope();
                self.hoist(stmts);
                for s in stmts.iter_mut() {
                    self.check_statement(s);
                }
                self.pop_scope();
            }
            NodeKind::Import { path } => {
                let path = path.clone();
                self.imports.push(path);
            }
            NodeKind::ModuleDecl { .. }
            | NodeKind::AspectDef { .. }
            | NodeKind::Break
            | NodeKind::Continue => {}
            NodeKind::FunctionDef { name, .. } => {
                let name = name.clone();
                let sig = self.signature_of(node);
                self.check_function(node, &name, sig);
            }
            NodeKind::ClassDef { name, base, members } => {
                let name = name.clone();
                if !self.classes.contains_key(&name) {
                    let base = base.clone();
                    self.register_class(&name, base.as_deref(), members);
                }
                self.push_scope();
                for member in members.iter_mut() {
                    self.check_statement(member);
                }
                self.pop_scope();
            }
            NodeKind::VarDecl { .. } => self.check_var_decl(node),
            NodeKind::Assign { .. } => self.check_assign(node),
            NodeKind::MemberAssign {
                object,
                member,
                value,
            } => {
                let obj_ty = self.infer_expr(object);
                let val_ty = self.infer_expr(value);
                let member = member.clone();
                let target = match &obj_ty {
                    Type::Class(c) => match self.lookup_member(c, &member) {
                        Some(t) => t,
                        None => {
                            let msg = format!("クラス {} にメンバ {member} はありません", c.name);
                            self.report("TYPE030", msg, node);
                            return;
                        }
                    },
                    _ => Type::Unknown,
                };
                if !is_compatible(&target, &val_ty) {
                    let msg = format!("{member} ({target}) に {val_ty} は代入できません");
                    self.report("TYPE070", msg, node);
                }
            }
            NodeKind::IndexAssign {
                target,
                index,
                value,
            } => {
                let target_ty = self.infer_expr(target);
                self.infer_expr(index);
                let val_ty = self.infer_expr(value);
                match target_ty {
                    Type::Array(elem) => {
                        if !is_compatible(&elem, &val_ty) {
                            let msg = format!("{elem} の配列要素に {val_ty} は代入できません");
                            self.report("TYPE070", msg, node);
                        }
                    }
                    Type::Unknown => {}
                    other => {
                        let msg = format!("{other} は添字代入できません");
                        self.report("TYPE040", msg, node);
                    }
                }
            }
            NodeKind::ExprStmt { expr } => {
                self.infer_expr(expr);
            }
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => {
                self.check_condition(condition);
                self.check_block(then_body);
                self.check_block(else_body);
            }
            NodeKind::While { condition, body } => {
                self.check_condition(condition);
                self.check_block(body);
            }
            NodeKind::DoWhile { body, condition } => {
                self.check_block(body);
                self.check_condition(condition);
            }
            NodeKind::For {
                var,
                start,
                end,
                body,
            } => {
                for bound in [start, end] {
                    let t = self.infer_expr(bound);
                    if !(t.is_numeric() || t.is_unknown()) {
                        let msg = format!("range の境界は数値でなければなりません: {t}");
                        self.report("TYPE080", msg, bound);
                    }
                }
                let var = var.clone();
                self.push_scope();
                self.declare(&var, Type::Int);
                self.check_block(body);
                self.pop_scope();
            }
            NodeKind::ForEach {
                var,
                iterable,
                body,
            } => {
                let var = var.clone();
                let elem = match self.infer_expr(iterable) {
                    Type::Array(elem) => *elem,
                    Type::String => Type::String,
                    Type::Unknown => Type::Unknown,
                    other => {
                        let msg = format!("{other} は反復できません");
                        self.report("TYPE040", msg, iterable);
                        Type::Unknown
                    }
                };
                self.push_scope();
                self.declare(&var, elem);
                self.check_block(body);
                self.pop_scope();
            }
            NodeKind::Return { value } => {
                let actual = match value {
                    Some(v) => self.infer_expr(v),
                    None => Type::Void,
                };
                if let Some(Some(expected)) = self.returns.last().cloned() {
                    if !is_compatible(&expected, &actual) {
                        let msg = format!("戻り値の型 {actual} は宣言 {expected} と互換ではありません");
                        self.report("TYPE090", msg, node);
                    }
                }
            }
            NodeKind::Match { subject, arms } => {
                let subject_ty = self.infer_expr(subject);
                for arm in arms.iter_mut() {
                    self.check_match_arm(arm, &subject_ty);
                }
            }
            // 式が文の位置に現れた場合
            _ => {
                self.infer_expr(node);
            }
        }
    }

    fn check_function(&mut self, node: &mut AstNode, name: &str, sig: FunctionType) {
        // 入れ子の関数はここで初めて登録される
        if self.scopes.len() > 1 && !self.functions.contains_key(name) {
            self.declare(name, Type::Function(sig.clone()));
        }
        let declared_ret = node_return_type(node).map(|t| self.resolve_type_expr(t));
        node.inferred_type = Some(Type::Function(sig.clone()));
        let NodeKind::FunctionDef { params, body, .. } = &mut node.kind else {
            return;
        };
        self.push_scope();
        for (param, ty) in params.iter_mut().zip(sig.params.iter()) {
            if let NodeKind::Parameter { name, .. } = &param.kind {
                let name = name.clone();
                self.declare(&name, ty.clone());
            }
            param.inferred_type = Some(ty.clone());
        }
        self.returns.push(declared_ret);
        self.hoist(body);
        for stmt in body.iter_mut() {
            self.check_statement(stmt);
        }
        self.returns.pop();
        self.pop_scope();
    }

    fn check_var_decl(&mut self, node: &mut AstNode) {
        let NodeKind::VarDecl {
            name,
            type_expr,
            init,
        } = &mut node.kind
        else {
            return;
        };
        let name = name.clone();
        let declared = type_expr.as_ref().map(|t| self.resolve_type_expr(t));
        let init_ty = init.as_deref_mut().map(|e| self.infer_expr(e));
        let ty = match (declared, init_ty) {
            (Some(d), Some(i)) => {
                if !is_compatible(&d, &i) {
                    let msg = format!("{name}: {d} に {i} は代入できません");
                    self.report("TYPE070", msg, node);
                }
                d
            }
            (Some(d), None) => d,
            (None, Some(i)) => i,
            (None, None) => Type::Unknown,
        };
        self.declare(&name, ty.clone());
        node.inferred_type = Some(ty);
    }

    /// 代入。未宣言の名前への代入は、その場のスコープでの暗黙宣言になる。
    fn check_assign(&mut self, node: &mut AstNode) {
        let NodeKind::Assign { name, value } = &mut node.kind else {
            return;
        };
        let name = name.clone();
        let val_ty = self.infer_expr(value);
        match self.lookup_var(&name).cloned() {
            Some(existing) => {
                if !is_compatible(&existing, &val_ty) {
                    let msg = format!("{name} ({existing}) に {val_ty} は代入できません");
                    self.report("TYPE070", msg, node);
                }
                node.inferred_type = Some(existing);
            }
            None => {
                self.declare(&name, val_ty.clone());
                node.inferred_type = Some(val_ty);
            }
        }
    }

    fn check_condition(&mut self, cond: &mut AstNode) {
        let t = self.infer_expr(cond);
        if !(t == Type::Bool || t.is_numeric() || t.is_unknown()) {
            let msg = format!("条件式は bool か数値でなければなりません: {t}");
            self.report("TYPE080", msg, cond);
        }
    }

    fn check_match_arm(&mut self, arm: &mut AstNode, subject_ty: &Type) {
        let NodeKind::MatchArm { pattern, body } = &mut arm.kind else {
            return;
        };
        self.push_scope();
        let binding = match &pattern.kind {
            NodeKind::BindingPattern { name } => Some(name.clone()),
            _ => None,
        };
        if let Some(name) = binding {
            self.declare(&name, subject_ty.clone());
            pattern.inferred_type = Some(subject_ty.clone());
        } else if pattern.tag() != NodeTag::WildcardPattern {
            let lit = self.infer_expr(pattern);
            if !is_compatible(subject_ty, &lit) {
                let msg = format!("パターン {lit} は {subject_ty} と比較できません");
                self.report("TYPE002", msg, pattern);
            }
        }
        for stmt in body.iter_mut() {
            self.check_statement(stmt);
        }
        self.pop_scope();
    }

    // ---- 式 ----

    /// 式の型を推論し、ノードにメモする。既にメモがあればそれを返す。
    pub fn infer_expr(&mut self, node: &mut AstNode) -> Type {
        if let Some(t) = &node.inferred_type {
            return t.clone();
        }
        let ty = self.compute(node);
        node.inferred_type = Some(ty.clone());
        ty
    }

    fn compute(&mut self, node: &mut AstNode) -> Type {
        match &mut node.kind {
            NodeKind::Number { value } => {
                if value.fract() == 0.0 {
                    Type::Int
                } else {
                    Type::Float
                }
            }
            NodeKind::Str { .. } => Type::String,
            NodeKind::Bool { .. } => Type::Bool,
            NodeKind::Null => Type::Null,
            NodeKind::Identifier { name } => {
                let name = name.clone();
                match self.resolve_name(&name) {
                    Some(t) => t,
                    None => {
                        self.report("TYPE010", format!("未定義の名前: {name}"), node);
                        Type::Unknown
                    }
                }
            }
            NodeKind::Binary { op, left, right } => {
                let op = *op;
                let l = self.infer_expr(left);
                let r = self.infer_expr(right);
                self.binary_type(op, &l, &r, node)
            }
            NodeKind::Unary { op, operand } => {
                let op = *op;
                let t = self.infer_expr(operand);
                match op {
                    UnaryOp::Not => Type::Bool,
                    UnaryOp::Neg if t.is_numeric() || t.is_unknown() => t,
                    UnaryOp::Neg => {
                        self.report("TYPE001", format!("{t} に単項 - は使えません"), node);
                        Type::Unknown
                    }
                }
            }
            NodeKind::Call { .. } => self.infer_call(node),
            NodeKind::MemberAccess { object, member } => {
                let member = member.clone();
                match self.infer_expr(object) {
                    Type::Class(c) => match self.lookup_member(&c, &member) {
                        Some(t) => t,
                        None => {
                            let msg = format!("クラス {} にメンバ {member} はありません", c.name);
                            self.report("TYPE030", msg, node);
                            Type::Unknown
                        }
                    },
                    Type::Unknown => Type::Unknown,
                    other => {
                        let msg = format!("{other} にメンバ {member} はありません");
                        self.report("TYPE030", msg, node);
                        Type::Unknown
                    }
                }
            }
            NodeKind::Index { target, index } => {
                let target_ty = self.infer_expr(target);
                let index_ty = self.infer_expr(index);
                if !(index_ty.is_numeric() || index_ty.is_unknown()) {
                    let msg = format!("添字は数値でなければなりません: {index_ty}");
                    self.report("TYPE040", msg, node);
                    return Type::Unknown;
                }
                match target_ty {
                    Type::Array(elem) => *elem,
                    Type::String => Type::String,
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.report("TYPE040", format!("{other} は添字アクセスできません"), node);
                        Type::Unknown
                    }
                }
            }
            NodeKind::ArrayLiteral { elements } => {
                let mut elem_ty: Option<Type> = None;
                let mut mismatch = None;
                for e in elements.iter_mut() {
                    let t = self.infer_expr(e);
                    match &elem_ty {
                        None => elem_ty = Some(t),
                        Some(first) if !is_compatible(first, &t) && mismatch.is_none() => {
                            mismatch = Some(format!("配列要素の型が一致しません: {first} と {t}"));
                        }
                        _ => {}
                    }
                }
                if let Some(msg) = mismatch {
                    self.report("TYPE041", msg, node);
                }
                Type::array(elem_ty.unwrap_or(Type::Unknown))
            }
            NodeKind::Lambda {
                params,
                return_type,
                body,
            } => {
                let declared = return_type.as_ref().map(|t| self.resolve_type_expr(t));
                let param_types: Vec<Type> = params.iter().map(|p| self.param_type(p)).collect();
                self.push_scope();
                for (p, ty) in params.iter_mut().zip(param_types.iter()) {
                    if let NodeKind::Parameter { name, .. } = &p.kind {
                        let name = name.clone();
                        self.declare(&name, ty.clone());
                    }
                    p.inferred_type = Some(ty.clone());
                }
                let body_ty = self.infer_expr(body);
                self.pop_scope();
                let ret = match declared {
                    Some(d) => {
                        if !is_compatible(&d, &body_ty) {
                            let msg = format!("ラムダ本体の型 {body_ty} は宣言 {d} と互換ではありません");
                            self.report("TYPE050", msg, node);
                        }
                        d
                    }
                    None => body_ty,
                };
                Type::function(param_types, ret)
            }
            NodeKind::Compose { first, second } => {
                let f = self.infer_expr(first);
                let g = self.infer_expr(second);
                if f.is_unknown() || g.is_unknown() {
                    return Type::Unknown;
                }
                match (f.as_callable(), g.as_callable()) {
                    (Some(f), Some(g))
                        if !g.params.is_empty() && is_compatible(&f.ret, &g.params[0]) =>
                    {
                        Type::function(f.params, *g.ret)
                    }
                    _ => {
                        let msg = format!("{f} と {g} は合成できません");
                        self.report("TYPE060", msg, node);
                        Type::Unknown
                    }
                }
            }
            NodeKind::WildcardPattern | NodeKind::BindingPattern { .. } => Type::Unknown,
            // 文ノードが式として渡された場合は文として検査する
            _ => {
                self.check_statement(node);
                Type::Void
            }
        }
    }

    fn resolve_name(&self, name: &str) -> Option<Type> {
        if let Some(t) = self.lookup_var(name) {
            return Some(t.clone());
        }
        if let Some(sig) = self.functions.get(name) {
            return Some(Type::Function(sig.clone()));
        }
        if let Some(c) = self.class_type(name) {
            return Some(Type::Class(c));
        }
        if let Some(b) = builtins::lookup(name) {
            return Some(b.as_type());
        }
        self.resolve_import(name)
    }

    fn binary_type(&mut self, op: BinaryOp, l: &Type, r: &Type, node: &AstNode) -> Type {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                match arithmetic_result(op == BinaryOp::Add, l, r) {
                    Some(t) => t,
                    None => {
                        let msg = format!("{l} {} {r} は演算できません", op.symbol());
                        self.report("TYPE001", msg, node);
                        Type::Unknown
                    }
                }
            }
            BinaryOp::Mod => match (l, r) {
                (Type::Int, Type::Int) => Type::Int,
                (Type::Unknown, _) | (_, Type::Unknown) => Type::Unknown,
                _ => {
                    self.report("TYPE001", format!("{l} % {r} は int 同士でのみ有効です"), node);
                    Type::Unknown
                }
            },
            BinaryOp::Eq | BinaryOp::Ne => {
                if !is_compatible(l, r) {
                    let msg = format!("{l} と {r} は比較できません");
                    self.report("TYPE002", msg, node);
                }
                Type::Bool
            }
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => {
                let ok = l.is_unknown()
                    || r.is_unknown()
                    || (l.is_numeric() && r.is_numeric())
                    || (*l == Type::String && *r == Type::String);
                if !ok {
                    let msg = format!("{l} {} {r} は順序比較できません", op.symbol());
                    self.report("TYPE002", msg, node);
                }
                Type::Bool
            }
        }
    }

    fn infer_call(&mut self, node: &mut AstNode) -> Type {
        let NodeKind::Call { callee, args } = &mut node.kind else {
            return Type::Unknown;
        };
        let arg_types: Vec<Type> = args.iter_mut().map(|a| self.infer_expr(a)).collect();
        let callee_name = match &callee.kind {
            NodeKind::Identifier { name } => Some(name.clone()),
            _ => None,
        };
        let callee_ty = match callee_name {
            Some(name) => match self.resolve_callee(&name, &arg_types) {
                Callee::Class(c) => {
                    callee.inferred_type = Some(Type::Class(c.clone()));
                    return Type::Class(c);
                }
                Callee::Variadic(ret) => {
                    callee.inferred_type = Some(Type::Unknown);
                    return ret;
                }
                Callee::Value(t) => {
                    callee.inferred_type = Some(t.clone());
                    t
                }
                Callee::Missing => {
                    self.report("TYPE010", format!("未定義の関数: {name}"), callee);
                    callee.inferred_type = Some(Type::Unknown);
                    return Type::Unknown;
                }
            },
            None => self.infer_expr(callee),
        };
        self.apply(&callee_ty, &arg_types, node)
    }

    /// 呼び出し先の名前を解決する。自由関数でなければ第 1 引数のクラスのメソッドとして探す。
    fn resolve_callee(&self, name: &str, arg_types: &[Type]) -> Callee {
        if let Some(t) = self.lookup_var(name) {
            return Callee::Value(t.clone());
        }
        if let Some(sig) = self.functions.get(name) {
            return Callee::Value(Type::Function(sig.clone()));
        }
        if let Some(c) = self.class_type(name) {
            return Callee::Class(c);
        }
        if let Some(b) = builtins::lookup(name) {
            return if b.is_variadic() {
                Callee::Variadic(b.ret.clone())
            } else {
                Callee::Value(b.as_type())
            };
        }
        if let Some(Type::Class(c)) = arg_types.first() {
            if let Some(m) = self.lookup_method(c, name) {
                return Callee::Value(Type::Function(m));
            }
        }
        match self.resolve_import(name) {
            Some(t) => Callee::Value(t),
            None => Callee::Missing,
        }
    }

    /// 関数型に引数を適用する。引数が足りなければカリー化型になる。
    fn apply(&mut self, callee_ty: &Type, arg_types: &[Type], node: &AstNode) -> Type {
        let (base, applied) = match callee_ty {
            Type::Unknown => return Type::Unknown,
            Type::Function(f) => (f.clone(), 0),
            Type::Curried { base, applied } => (base.clone(), *applied),
            other => {
                self.report("TYPE020", format!("{other} は呼び出せません"), node);
                return Type::Unknown;
            }
        };
        let remaining = &base.params[applied.min(base.params.len())..];
        if arg_types.len() > remaining.len() {
            let msg = format!(
                "引数が多すぎます: {} 個を期待しましたが {} 個",
                remaining.len(),
                arg_types.len()
            );
            self.report("TYPE020", msg, node);
            return Type::Unknown;
        }
        let mismatches: Vec<String> = remaining
            .iter()
            .zip(arg_types.iter())
            .enumerate()
            .filter(|(_, (p, a))| !is_compatible(p, a))
            .map(|(i, (p, a))| format!("第 {} 引数: {p} に {a} は渡せません", applied + i + 1))
            .collect();
        for msg in mismatches {
            self.report("TYPE021", msg, node);
        }
        if arg_types.len() < remaining.len() {
            Type::Curried {
                base,
                applied: applied + arg_types.len(),
            }
        } else {
            *base.ret
        }
    }
}

enum Callee {
    Value(Type),
    Class(ClassType),
    Variadic(Type),
    Missing,
}

fn node_return_type(node: &AstNode) -> Option<&TypeExpr> {
    match &node.kind {
        NodeKind::FunctionDef { return_type, .. } => return_type.as_ref(),
        _ => None,
    }
}

/// プログラムを型検査し、記録された型エラーを返す。
pub fn check_program(program: &mut AstNode, resolver: &dyn SymbolResolver) -> Vec<TypeError> {
    let mut checker = TypeChecker::new(resolver);
    checker.check_program(program);
    checker.into_errors()
}

/// 式の型を文字列で返す（補助 API）。
pub fn infer_type_str(expr: &mut AstNode) -> String {
    TypeChecker::default().infer_expr(expr).to_string()
}
