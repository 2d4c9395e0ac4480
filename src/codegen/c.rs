// パス: src/codegen/c.rs
// 役割: 型付き AST から C99 ソースを生成するバックエンド
// 意図: 型エンジンのメモ（inferred_type）を優先し、欠けていれば構造から型を補って出力する
// 関連ファイル: src/codegen/mod.rs, src/builtins.rs, src/typesys.rs
//! C バックエンド
//!
//! 対応表:
//! - クラス → `struct`（基底のフィールドを先頭に平坦化）と `<Name>_new` 構築関数。
//! - 関数 → C 関数。メソッドは第 1 引数にオブジェクトを取る自由関数として出力する（UFCS と一致）。
//! - トップレベルの宣言 → グローバル変数。初期化とその他のトップレベル文は `main` に置く。
//! - `print` → 引数の型ごとの書式を持つ `printf`。
//! - `match` → 一時変数と if/else 連鎖。`for .. in range` → C の `for`。
//! - アスペクト・import・module 宣言はコードを生成しない。
//!
//! ラムダ・関数合成・配列・文字列連結・for-each・部分適用は未対応。
//! `allow_unsupported` のときはコメントのプレースホルダを出力し、それ以外はエラーにする。

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::ast::{format_number, AstNode, BinaryOp, NodeKind, TypeExpr, UnaryOp};
use crate::builtins::{self, BuiltinKind};
use crate::typesys::{ClassType, Type};

use super::{EmitConfig, EmitError, EmitResult, Emitter};

const INDENT: &str = "    ";

#[derive(Clone, Debug)]
struct Signature {
    params: Vec<(String, Type)>,
    ret: Type,
}

#[derive(Clone, Debug)]
struct Field {
    name: String,
    ty: Type,
    init: Option<AstNode>,
}

#[derive(Clone, Debug, Default)]
struct ClassLayout {
    base: Option<String>,
    fields: Vec<Field>,
}

/// C99 ソースを生成する。1 つのインスタンスを複数回 `emit` に使ってよい。
#[derive(Debug, Default)]
pub struct CEmitter {
    config: EmitConfig,
    module_name: String,
    globals: HashMap<String, Type>,
    scopes: Vec<HashMap<String, Type>>,
    functions: HashMap<String, Signature>,
    classes: HashMap<String, ClassLayout>,
    class_order: Vec<String>,
    needs_string_h: bool,
    needs_math_h: bool,
    temp_counter: usize,
    placeholders: usize,
}

impl CEmitter {
    pub fn new(config: EmitConfig) -> Self {
        Self {
            config,
            module_name: "main".to_string(),
            ..Self::default()
        }
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// 直前の `emit` で出力したプレースホルダの数。
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }

    fn reset(&mut self) {
        self.globals.clear();
        self.scopes.clear();
        self.functions.clear();
        self.classes.clear();
        self.class_order.clear();
        self.needs_string_h = false;
        self.needs_math_h = false;
        self.temp_counter = 0;
        self.placeholders = 0;
    }

    // ---- 未対応構文 ----

    fn unsupported_expr(&mut self, what: &str, line: usize) -> EmitResult<String> {
        if self.config.allow_unsupported {
            warn!(what, line, "未対応の式をプレースホルダに置き換えます");
            self.placeholders += 1;
            Ok(format!("0 /* unsupported: {what} */"))
        } else {
            Err(EmitError::unsupported(what, line))
        }
    }

    fn unsupported_stmt(&mut self, what: &str, line: usize, depth: usize, out: &mut String) -> EmitResult<()> {
        if self.config.allow_unsupported {
            warn!(what, line, "未対応の文をプレースホルダに置き換えます");
            self.placeholders += 1;
            push_line(out, depth, &format!("/* unsupported: {what} (line {line}) */"));
            Ok(())
        } else {
            Err(EmitError::unsupported(what, line))
        }
    }

    // ---- 型 ----

    fn resolve_type_expr(&self, te: &TypeExpr) -> Type {
        match te {
            TypeExpr::Named(name) => match name.as_str() {
                "int" => Type::Int,
                "float" => Type::Float,
                "bool" => Type::Bool,
                "string" => Type::String,
                "void" => Type::Void,
                "null" => Type::Null,
                other if self.classes.contains_key(other) => Type::Class(ClassType::new(other)),
                _ => Type::Unknown,
            },
            TypeExpr::Array(elem) => Type::array(self.resolve_type_expr(elem)),
            TypeExpr::Function { params, ret } => Type::function(
                params.iter().map(|p| self.resolve_type_expr(p)).collect(),
                self.resolve_type_expr(ret),
            ),
        }
    }

    fn c_type(&mut self, ty: &Type, context: &str, line: usize) -> EmitResult<String> {
        let name = match ty {
            Type::Int => "long long".to_string(),
            Type::Float => "double".to_string(),
            Type::Bool => "int".to_string(),
            Type::String => "const char*".to_string(),
            Type::Void => "void".to_string(),
            Type::Null => "void*".to_string(),
            Type::Class(c) => format!("{}*", c.name),
            Type::Unknown | Type::Array(_) | Type::Function(_) | Type::Curried { .. } => {
                if self.config.allow_unsupported {
                    self.placeholders += 1;
                    return Ok(format!("void* /* {ty} */"));
                }
                return Err(EmitError::UnrepresentableType {
                    ty: ty.to_string(),
                    context: context.to_string(),
                    line,
                });
            }
        };
        Ok(name)
    }

    fn lookup_var(&self, name: &str) -> Option<&Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name))
            .or_else(|| self.globals.get(name))
    }

    fn declare_local(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    /// 先頭から派生側へ向かう順の祖先クラス名（自身を含む）。
    fn ancestry(&self, class: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = Some(class.to_string());
        while let Some(name) = cur {
            if !seen.insert(name.clone()) {
                break;
            }
            let Some(layout) = self.classes.get(&name) else {
                break;
            };
            cur = layout.base.clone();
            chain.push(name);
        }
        chain.reverse();
        chain
    }

    fn all_fields(&self, class: &str) -> Vec<Field> {
        self.ancestry(class)
            .iter()
            .filter_map(|c| self.classes.get(c))
            .flat_map(|l| l.fields.iter().cloned())
            .collect()
    }

    fn field_type(&self, class: &str, member: &str) -> Option<Type> {
        self.all_fields(class)
            .into_iter()
            .rev()
            .find(|f| f.name == member)
            .map(|f| f.ty)
    }

    /// 式の型。型メモが既知ならそれを、なければ構造から求める。
    fn type_of(&self, node: &AstNode) -> Type {
        if let Some(t) = &node.inferred_type {
            if !t.is_unknown() {
                return t.clone();
            }
        }
        match &node.kind {
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
            NodeKind::Identifier { name } => self.lookup_var(name).cloned().unwrap_or(Type::Unknown),
            NodeKind::Binary { op, left, right } => {
                if op.is_comparison() {
                    return Type::Bool;
                }
                let (l, r) = (self.type_of(left), self.type_of(right));
                match (l, r) {
                    (Type::String, _) | (_, Type::String) if *op == BinaryOp::Add => Type::String,
                    (Type::Float, Type::Int | Type::Float) | (Type::Int, Type::Float) => Type::Float,
                    (Type::Int, Type::Int) => Type::Int,
                    _ => Type::Unknown,
                }
            }
            NodeKind::Unary { op, operand } => match op {
                UnaryOp::Not => Type::Bool,
                UnaryOp::Neg => self.type_of(operand),
            },
            NodeKind::Call { callee, .. } => match &callee.kind {
                NodeKind::Identifier { name } => {
                    if let Some(sig) = self.functions.get(name) {
                        sig.ret.clone()
                    } else if self.classes.contains_key(name) {
                        Type::Class(ClassType::new(name.as_str()))
                    } else if let Some(b) = builtins::lookup(name) {
                        b.ret.clone()
                    } else {
                        Type::Unknown
                    }
                }
                _ => Type::Unknown,
            },
            NodeKind::MemberAccess { object, member } => match self.type_of(object) {
                Type::Class(c) => self.field_type(&c.name, member).unwrap_or(Type::Unknown),
                _ => Type::Unknown,
            },
            _ => Type::Unknown,
        }
    }

    // ---- 事前収集 ----

    fn collect(&mut self, statements: &[AstNode]) {
        for stmt in statements {
            if let NodeKind::ClassDef { name, base, .. } = &stmt.kind {
                self.classes.insert(
                    name.clone(),
                    ClassLayout {
                        base: base.clone(),
                        fields: Vec::new(),
                    },
                );
                self.class_order.push(name.clone());
            }
        }
        // フィールド型はクラス名が揃ってから解決する
        let mut methods = Vec::new();
        for stmt in statements {
            match &stmt.kind {
                NodeKind::ClassDef { name, members, .. } => {
                    let mut fields = Vec::new();
                    for member in members {
                        match &member.kind {
                            NodeKind::VarDecl {
                                name: field,
                                type_expr,
                                init,
                            } => {
                                let ty = match type_expr {
                                    Some(te) => self.resolve_type_expr(te),
                                    None => init.as_deref().map(|i| self.type_of(i)).unwrap_or(Type::Unknown),
                                };
                                fields.push(Field {
                                    name: field.clone(),
                                    ty,
                                    init: init.as_deref().cloned(),
                                });
                            }
                            NodeKind::FunctionDef { .. } => methods.push(member),
                            _ => {}
                        }
                    }
                    if let Some(layout) = self.classes.get_mut(name) {
                        layout.fields = fields;
                    }
                }
                NodeKind::FunctionDef { .. } => methods.push(stmt),
                _ => {}
            }
        }
        for func in methods {
            if let NodeKind::FunctionDef { name, .. } = &func.kind {
                let sig = self.signature_of(func);
                self.functions.insert(name.clone(), sig);
            }
        }
        for stmt in statements {
            match &stmt.kind {
                NodeKind::VarDecl {
                    name,
                    type_expr,
                    init,
                } if !self.globals.contains_key(name) => {
                    let ty = match type_expr {
                        Some(te) => self.resolve_type_expr(te),
                        None => init.as_deref().map(|i| self.type_of(i)).unwrap_or(Type::Unknown),
                    };
                    self.globals.insert(name.clone(), ty);
                }
                NodeKind::Assign { name, value } if !self.globals.contains_key(name) => {
                    let ty = stmt
                        .inferred_type
                        .clone()
                        .filter(|t| !t.is_unknown())
                        .unwrap_or_else(|| self.type_of(value));
                    self.globals.insert(name.clone(), ty);
                }
                _ => {}
            }
        }
    }

    fn signature_of(&self, func: &AstNode) -> Signature {
        let NodeKind::FunctionDef {
            params,
            return_type,
            body,
            ..
        } = &func.kind
        else {
            return Signature {
                params: Vec::new(),
                ret: Type::Void,
            };
        };
        let params: Vec<(String, Type)> = params
            .iter()
            .filter_map(|p| match &p.kind {
                NodeKind::Parameter { name, type_expr } => {
                    let ty = match type_expr {
                        Some(te) => self.resolve_type_expr(te),
                        None => p.inferred_type.clone().unwrap_or(Type::Unknown),
                    };
                    Some((name.clone(), ty))
                }
                _ => None,
            })
            .collect();
        let ret = match return_type {
            Some(te) => self.resolve_type_expr(te),
            None => match first_return_value(body) {
                // 注釈なしの戻り値は、引数だけを見える状態にして型を求める
                Some(value) => {
                    let scratch = CEmitter {
                        scopes: vec![params.iter().cloned().collect()],
                        globals: self.globals.clone(),
                        classes: self.classes.clone(),
                        ..CEmitter::default()
                    };
                    scratch.type_of(value)
                }
                None => Type::Void,
            },
        };
        Signature { params, ret }
    }

    // ---- 宣言部 ----

    fn emit_structs(&mut self, out: &mut String) -> EmitResult<()> {
        for name in self.class_order.clone() {
            out.push_str(&format!("typedef struct {name} {name};\n"));
        }
        for name in self.class_order.clone() {
            out.push_str(&format!("\nstruct {name} {{\n"));
            let fields = self.all_fields(&name);
            if fields.is_empty() {
                push_line(out, 1, "char _unused;");
            }
            for f in &fields {
                let ty = self.c_type(&f.ty, &format!("field {name}.{}", f.name), 0)?;
                push_line(out, 1, &format!("{ty} {};", f.name));
            }
            out.push_str("};\n");
        }
        Ok(())
    }

    fn emit_constructors(&mut self, out: &mut String) -> EmitResult<()> {
        for name in self.class_order.clone() {
            out.push_str(&format!("\n{name}* {name}_new(void) {{\n"));
            push_line(out, 1, &format!("{name}* self = calloc(1, sizeof({name}));"));
            self.scopes.push(HashMap::new());
            for f in self.all_fields(&name) {
                if let Some(init) = &f.init {
                    let value = self.expr(init)?;
                    push_line(out, 1, &format!("self->{} = {value};", f.name));
                }
            }
            self.scopes.pop();
            push_line(out, 1, "return self;");
            out.push_str("}\n");
        }
        Ok(())
    }

    fn prototype(&mut self, name: &str, sig: &Signature, line: usize) -> EmitResult<String> {
        let ret = self.c_type(&sig.ret, &format!("return type of {name}"), line)?;
        let params = if sig.params.is_empty() {
            "void".to_string()
        } else {
            let mut parts = Vec::new();
            for (p, ty) in &sig.params {
                let t = self.c_type(ty, &format!("parameter {p} of {name}"), line)?;
                parts.push(format!("{t} {p}"));
            }
            parts.join(", ")
        };
        Ok(format!("{ret} {name}({params})"))
    }

    fn emit_function(&mut self, func: &AstNode, out: &mut String) -> EmitResult<()> {
        let NodeKind::FunctionDef { name, body, .. } = &func.kind else {
            return Ok(());
        };
        let Some(sig) = self.functions.get(name).cloned() else {
            return Ok(());
        };
        let head = self.prototype(name, &sig, func.line)?;
        out.push_str(&format!("\n{head} {{\n"));
        self.scopes.push(sig.params.iter().cloned().collect());
        for stmt in body {
            self.stmt(stmt, 1, out)?;
        }
        self.scopes.pop();
        out.push_str("}\n");
        debug!(function = %name, "関数を出力");
        Ok(())
    }

    // ---- 文 ----

    fn block(&mut self, body: &[AstNode], depth: usize, out: &mut String) -> EmitResult<()> {
        self.scopes.push(HashMap::new());
        let result = body.iter().try_for_each(|s| self.stmt(s, depth, out));
        self.scopes.pop();
        result
    }

    fn stmt(&mut self, node: &AstNode, depth: usize, out: &mut String) -> EmitResult<()> {
        match &node.kind {
            NodeKind::AspectDef { .. } | NodeKind::Import { .. } | NodeKind::ModuleDecl { .. } => {}
            NodeKind::FunctionDef { name, .. } => {
                return self.unsupported_stmt(&format!("nested function {name}"), node.line, depth, out)
            }
            NodeKind::ClassDef { name, .. } => {
                return self.unsupported_stmt(&format!("nested class {name}"), node.line, depth, out)
            }
            NodeKind::VarDecl {
                name,
                type_expr,
                init,
            } => {
                let ty = match type_expr {
                    Some(te) => self.resolve_type_expr(te),
                    None => init.as_deref().map(|i| self.type_of(i)).unwrap_or(Type::Unknown),
                };
                let c_ty = self.c_type(&ty, &format!("variable {name}"), node.line)?;
                let value = match init {
                    Some(init) => self.expr(init)?,
                    None => zero_value(&ty).to_string(),
                };
                self.declare_local(name, ty);
                push_line(out, depth, &format!("{c_ty} {name} = {value};"));
            }
            NodeKind::Assign { name, value } => {
                let rhs = self.expr(value)?;
                if self.lookup_var(name).is_some() {
                    push_line(out, depth, &format!("{name} = {rhs};"));
                } else {
                    let ty = node
                        .inferred_type
                        .clone()
                        .filter(|t| !t.is_unknown())
                        .unwrap_or_else(|| self.type_of(value));
                    let c_ty = self.c_type(&ty, &format!("variable {name}"), node.line)?;
                    self.declare_local(name, ty);
                    push_line(out, depth, &format!("{c_ty} {name} = {rhs};"));
                }
            }
            NodeKind::MemberAssign {
                object,
                member,
                value,
            } => {
                let obj = self.expr(object)?;
                let rhs = self.expr(value)?;
                push_line(out, depth, &format!("{obj}->{member} = {rhs};"));
            }
            NodeKind::IndexAssign { .. } => {
                return self.unsupported_stmt("array element assignment", node.line, depth, out)
            }
            NodeKind::ExprStmt { expr } => {
                let e = self.expr(expr)?;
                push_line(out, depth, &format!("{e};"));
            }
            NodeKind::Block { statements } => {
                push_line(out, depth, "{");
                self.block(statements, depth + 1, out)?;
                push_line(out, depth, "}");
            }
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => {
                let c = self.expr(condition)?;
                push_line(out, depth, &format!("if ({c}) {{"));
                self.block(then_body, depth + 1, out)?;
                if else_body.is_empty() {
                    push_line(out, depth, "}");
                } else {
                    push_line(out, depth, "} else {");
                    self.block(else_body, depth + 1, out)?;
                    push_line(out, depth, "}");
                }
            }
            NodeKind::While { condition, body } => {
                let c = self.expr(condition)?;
                push_line(out, depth, &format!("while ({c}) {{"));
                self.block(body, depth + 1, out)?;
                push_line(out, depth, "}");
            }
            NodeKind::DoWhile { body, condition } => {
                push_line(out, depth, "do {");
                self.block(body, depth + 1, out)?;
                let c = self.expr(condition)?;
                push_line(out, depth, &format!("}} while ({c});"));
            }
            NodeKind::For {
                var,
                start,
                end,
                body,
            } => {
                let s = self.expr(start)?;
                let e = self.expr(end)?;
                push_line(
                    out,
                    depth,
                    &format!("for (long long {var} = {s}; {var} < {e}; {var}++) {{"),
                );
                self.scopes.push(HashMap::from([(var.clone(), Type::Int)]));
                let result = self.block(body, depth + 1, out);
                self.scopes.pop();
                result?;
                push_line(out, depth, "}");
            }
            NodeKind::ForEach { .. } => {
                return self.unsupported_stmt("for-each loop", node.line, depth, out)
            }
            NodeKind::Return { value } => match value {
                Some(v) => {
                    let e = self.expr(v)?;
                    push_line(out, depth, &format!("return {e};"));
                }
                None => push_line(out, depth, "return;"),
            },
            NodeKind::Break => push_line(out, depth, "break;"),
            NodeKind::Continue => push_line(out, depth, "continue;"),
            NodeKind::Match { subject, arms } => self.emit_match(node, subject, arms, depth, out)?,
            _ => {
                let e = self.expr(node)?;
                push_line(out, depth, &format!("{e};"));
            }
        }
        Ok(())
    }

    fn emit_match(
        &mut self,
        node: &AstNode,
        subject: &AstNode,
        arms: &[AstNode],
        depth: usize,
        out: &mut String,
    ) -> EmitResult<()> {
        let subject_ty = self.type_of(subject);
        let c_ty = self.c_type(&subject_ty, "match subject", node.line)?;
        let tmp = format!("_match{}", self.temp_counter);
        self.temp_counter += 1;
        let value = self.expr(subject)?;
        push_line(out, depth, "{");
        push_line(out, depth + 1, &format!("{c_ty} {tmp} = {value};"));
        let mut first = true;
        for arm in arms {
            let NodeKind::MatchArm { pattern, body } = &arm.kind else {
                continue;
            };
            let (cond, binding) = match &pattern.kind {
                NodeKind::WildcardPattern => ("1".to_string(), None),
                NodeKind::BindingPattern { name } => ("1".to_string(), Some(name.clone())),
                NodeKind::Str { .. } => {
                    self.needs_string_h = true;
                    let lit = self.expr(pattern)?;
                    (format!("strcmp({tmp}, {lit}) == 0"), None)
                }
                _ => {
                    let lit = self.expr(pattern)?;
                    (format!("{tmp} == {lit}"), None)
                }
            };
            let keyword = if first { "if" } else { "} else if" };
            push_line(out, depth + 1, &format!("{keyword} ({cond}) {{"));
            first = false;
            self.scopes.push(HashMap::new());
            if let Some(name) = &binding {
                self.declare_local(name, subject_ty.clone());
                push_line(out, depth + 2, &format!("{c_ty} {name} = {tmp};"));
            }
            let result = body.iter().try_for_each(|s| self.stmt(s, depth + 2, out));
            self.scopes.pop();
            result?;
            if cond == "1" {
                // 以降の腕には到達しない
                break;
            }
        }
        if !first {
            push_line(out, depth + 1, "}");
        }
        push_line(out, depth, "}");
        Ok(())
    }

    // ---- 式 ----

    fn expr(&mut self, node: &AstNode) -> EmitResult<String> {
        match &node.kind {
            NodeKind::Number { value } => Ok(format_number(*value)),
            NodeKind::Str { value } => Ok(c_string(value)),
            NodeKind::Bool { value } => Ok(if *value { "1" } else { "0" }.to_string()),
            NodeKind::Null => Ok("NULL".to_string()),
            NodeKind::Identifier { name } => Ok(name.clone()),
            NodeKind::Binary { op, left, right } => self.binary(node, *op, left, right),
            NodeKind::Unary { op, operand } => {
                let e = self.expr(operand)?;
                Ok(format!("({}{e})", op.symbol()))
            }
            NodeKind::Call { callee, args } => self.call(node, callee, args),
            NodeKind::MemberAccess { object, member } => {
                let obj = self.expr(object)?;
                Ok(format!("{obj}->{member}"))
            }
            NodeKind::Index { .. } => self.unsupported_expr("indexing", node.line),
            NodeKind::Lambda { .. } => self.unsupported_expr("lambda", node.line),
            NodeKind::Compose { .. } => self.unsupported_expr("function composition", node.line),
            NodeKind::ArrayLiteral { .. } => self.unsupported_expr("array literal", node.line),
            _ => self.unsupported_expr(&format!("{:?} in expression position", node.tag()), node.line),
        }
    }

    fn binary(&mut self, node: &AstNode, op: BinaryOp, left: &AstNode, right: &AstNode) -> EmitResult<String> {
        let (lt, rt) = (self.type_of(left), self.type_of(right));
        let strings = lt == Type::String && rt == Type::String;
        if op == BinaryOp::Add && (lt == Type::String || rt == Type::String) {
            return self.unsupported_expr("string concatenation", node.line);
        }
        let l = self.expr(left)?;
        let r = self.expr(right)?;
        if strings && op.is_comparison() {
            self.needs_string_h = true;
            return Ok(format!("(strcmp({l}, {r}) {} 0)", op.symbol()));
        }
        Ok(format!("({l} {} {r})", op.symbol()))
    }

    fn call(&mut self, node: &AstNode, callee: &AstNode, args: &[AstNode]) -> EmitResult<String> {
        let NodeKind::Identifier { name } = &callee.kind else {
            return self.unsupported_expr("call through a function value", node.line);
        };
        if self.lookup_var(name).is_some() {
            return self.unsupported_expr(&format!("call through variable {name}"), node.line);
        }
        if let Some(sig) = self.functions.get(name) {
            if args.len() != sig.params.len() {
                return self.unsupported_expr(&format!("partial application of {name}"), node.line);
            }
            let parts = self.args(args)?;
            return Ok(format!("{name}({})", parts.join(", ")));
        }
        if self.classes.contains_key(name) {
            if !args.is_empty() {
                return self.unsupported_expr(&format!("constructor arguments for {name}"), node.line);
            }
            return Ok(format!("{name}_new()"));
        }
        let Some(builtin) = builtins::lookup(name) else {
            return self.unsupported_expr(&format!("call to unknown function {name}"), node.line);
        };
        match builtin.kind {
            BuiltinKind::Print => self.print(node, args),
            BuiltinKind::Len => match args.first().map(|a| self.type_of(a)) {
                Some(Type::String) if args.len() == 1 => {
                    self.needs_string_h = true;
                    let s = self.expr(&args[0])?;
                    Ok(format!("((long long)strlen({s}))"))
                }
                _ => self.unsupported_expr("len of a non-string", node.line),
            },
            BuiltinKind::ToString => self.unsupported_expr("str conversion", node.line),
            BuiltinKind::ToInt | BuiltinKind::ToFloat | BuiltinKind::Sqrt if args.len() != 1 => {
                self.unsupported_expr(&format!("{name} with {} arguments", args.len()), node.line)
            }
            BuiltinKind::ToInt => {
                let a = self.expr(&args[0])?;
                Ok(format!("((long long)({a}))"))
            }
            BuiltinKind::ToFloat => {
                let a = self.expr(&args[0])?;
                Ok(format!("((double)({a}))"))
            }
            BuiltinKind::Sqrt => {
                self.needs_math_h = true;
                let a = self.expr(&args[0])?;
                Ok(format!("sqrt({a})"))
            }
        }
    }

    fn args(&mut self, args: &[AstNode]) -> EmitResult<Vec<String>> {
        args.iter().map(|a| self.expr(a)).collect()
    }

    /// 引数を空白区切りで 1 行に出力する `printf` 呼び出し。
    fn print(&mut self, node: &AstNode, args: &[AstNode]) -> EmitResult<String> {
        let mut format = String::new();
        let mut values = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                format.push(' ');
            }
            let value = self.expr(arg)?;
            match self.type_of(arg) {
                Type::Int => {
                    format.push_str("%lld");
                    values.push(format!("(long long)({value})"));
                }
                Type::Float => {
                    format.push_str("%g");
                    values.push(format!("(double)({value})"));
                }
                Type::String => {
                    format.push_str("%s");
                    values.push(value);
                }
                Type::Bool => {
                    format.push_str("%s");
                    values.push(format!("({value}) ? \"true\" : \"false\""));
                }
                Type::Null => format.push_str("null"),
                Type::Class(c) => {
                    format.push_str(&format!("<{}>", c.name));
                }
                other => {
                    return self.unsupported_expr(&format!("print of {other}"), node.line);
                }
            }
        }
        format.push_str("\\n");
        let mut call = format!("printf(\"{format}\"");
        for v in values {
            call.push_str(", ");
            call.push_str(&v);
        }
        call.push(')');
        Ok(call)
    }
}

impl Emitter for CEmitter {
    fn emit(&mut self, program: &AstNode) -> EmitResult<String> {
        let NodeKind::Program { statements } = &program.kind else {
            return Err(EmitError::NotAProgram);
        };
        self.reset();
        self.collect(statements);

        let mut decls = String::new();
        self.emit_structs(&mut decls)?;

        let mut protos = String::new();
        let mut funcs: Vec<&AstNode> = Vec::new();
        for stmt in statements {
            match &stmt.kind {
                NodeKind::FunctionDef { .. } => funcs.push(stmt),
                NodeKind::ClassDef { members, .. } => {
                    funcs.extend(members.iter().filter(|m| matches!(m.kind, NodeKind::FunctionDef { .. })))
                }
                _ => {}
            }
        }
        for func in &funcs {
            if let NodeKind::FunctionDef { name, .. } = &func.kind {
                if let Some(sig) = self.functions.get(name).cloned() {
                    let p = self.prototype(name, &sig, func.line)?;
                    protos.push_str(&format!("{p};\n"));
                }
            }
        }

        let mut bodies = String::new();
        self.emit_constructors(&mut bodies)?;
        for func in &funcs {
            self.emit_function(func, &mut bodies)?;
        }

        let mut main = String::from("\nint main(void) {\n");
        for stmt in statements {
            match &stmt.kind {
                NodeKind::FunctionDef { .. } | NodeKind::ClassDef { .. } => {}
                NodeKind::VarDecl { name, init, .. } => {
                    if let Some(init) = init {
                        let value = self.expr(init)?;
                        push_line(&mut main, 1, &format!("{name} = {value};"));
                    }
                }
                _ => self.stmt(stmt, 1, &mut main)?,
            }
        }
        push_line(&mut main, 1, "return 0;");
        main.push_str("}\n");

        // グローバルの型エラーより先に、本体の未対応構文を報告する
        let mut globals = String::new();
        let mut names: Vec<_> = self.globals.iter().map(|(n, t)| (n.clone(), t.clone())).collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, ty) in &names {
            let c_ty = self.c_type(ty, &format!("global {name}"), 0)?;
            globals.push_str(&format!("static {c_ty} {name};\n"));
        }

        let mut out = format!("/* module {} : generated by lync */\n", self.module_name);
        out.push_str("#include <stdio.h>\n#include <stdlib.h>\n");
        if self.needs_string_h {
            out.push_str("#include <string.h>\n");
        }
        if self.needs_math_h {
            out.push_str("#include <math.h>\n");
        }
        for section in [&decls, &globals, &protos] {
            if !section.is_empty() {
                out.push('\n');
                out.push_str(section);
            }
        }
        out.push_str(&bodies);
        out.push_str(&main);
        debug!(
            functions = funcs.len(),
            classes = self.class_order.len(),
            placeholders = self.placeholders,
            "C ソースを生成"
        );
        Ok(out)
    }
}

fn push_line(out: &mut String, depth: usize, text: &str) {
    out.push_str(&INDENT.repeat(depth));
    out.push_str(text);
    out.push('\n');
}

fn zero_value(ty: &Type) -> &'static str {
    match ty {
        Type::Float => "0.0",
        Type::String | Type::Class(_) | Type::Null => "NULL",
        _ => "0",
    }
}

fn first_return_value(body: &[AstNode]) -> Option<&AstNode> {
    body.iter().find_map(|stmt| match &stmt.kind {
        NodeKind::Return { value: Some(v) } => Some(&**v),
        NodeKind::FunctionDef { .. } | NodeKind::ClassDef { .. } => None,
        _ => stmt
            .children()
            .into_iter()
            .find_map(|c| first_return_value(std::slice::from_ref(c))),
    })
}

/// C の文字列リテラルへエスケープする。
fn c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::check_program;
    use crate::modules::NoModules;
    use crate::parser::parse_program;

    fn emit(src: &str) -> EmitResult<String> {
        let mut program = parse_program(src).unwrap();
        check_program(&mut program, &NoModules);
        CEmitter::new(EmitConfig::default()).emit(&program)
    }

    #[test]
    fn functions_globals_and_print() {
        let c = emit("func add(a: int, b: int) -> int\n  return a + b\nend\nx = add(2, 3)\nprint(x)").unwrap();
        assert!(c.contains("#include <stdio.h>"));
        assert!(c.contains("long long add(long long a, long long b);"));
        assert!(c.contains("    return (a + b);"));
        assert!(c.contains("static long long x;"));
        assert!(c.contains("    x = add(2, 3);"));
        assert!(c.contains("    printf(\"%lld\\n\", (long long)(x));"));
        assert!(c.contains("int main(void) {"));
    }

    #[test]
    /// print の書式は引数の型で決まる。
    fn print_formats_follow_types() {
        let c = emit("print(1.5, \"s\", true, null)").unwrap();
        assert!(c.contains(r#"printf("%g %s %s null\n", (double)(1.5), "s", (1) ? "true" : "false")"#));
    }

    #[test]
    fn classes_become_structs_with_constructors() {
        let c = emit(
            "class A x: int = 1 end\nclass B : A y: float = 0.5 func gety(self: B) -> float return self.y end end\nb = B()\nprint(b.gety())",
        )
        .unwrap();
        assert!(c.contains("typedef struct B B;"));
        assert!(c.contains("struct B {\n    long long x;\n    double y;\n};"));
        assert!(c.contains("B* B_new(void) {"));
        assert!(c.contains("    self->x = 1;\n    self->y = 0.5;"));
        assert!(c.contains("double gety(B* self);"));
        assert!(c.contains("return self->y;"));
        assert!(c.contains("static B* b;"));
        assert!(c.contains("printf(\"%g\\n\", (double)(gety(b)))"));
    }

    #[test]
    fn control_flow_and_match() {
        let src = "for i in range(0, 3)\n print(i)\nend\nn = 2\nmatch n\n case 1 => print(\"one\")\n case _ => print(\"many\")\nend\ndo n = n - 1 end while n > 0";
        let c = emit(src).unwrap();
        assert!(c.contains("for (long long i = 0; i < 3; i++) {"));
        assert!(c.contains("long long _match0 = n;"));
        assert!(c.contains("if (_match0 == 1) {"));
        assert!(c.contains("} else if (1) {"));
        assert!(c.contains("} while ((n > 0));"));
    }

    #[test]
    fn string_comparison_uses_strcmp() {
        let c = emit("s = \"a\"\nif s == \"b\" print(1) end").unwrap();
        assert!(c.contains("#include <string.h>"));
        assert!(c.contains("if ((strcmp(s, \"b\") == 0)) {"));
    }

    #[test]
    fn unsupported_constructs_are_errors_by_default() {
        let err = emit("f = (x: int) -> int => x + 1").unwrap_err();
        assert!(matches!(err, EmitError::Unsupported { ref what, line: 1 } if what == "lambda"));
        let err = emit("s = \"a\" + \"b\"").unwrap_err();
        assert!(matches!(err, EmitError::Unsupported { ref what, .. } if what == "string concatenation"));
    }

    #[test]
    fn allow_unsupported_emits_placeholders() {
        let mut program = parse_program("print(1)\nfor x in [1, 2] print(x) end").unwrap();
        check_program(&mut program, &NoModules);
        let mut e = CEmitter::new(EmitConfig {
            allow_unsupported: true,
        });
        let c = e.emit(&program).unwrap();
        assert!(c.contains("/* unsupported: for-each loop (line 2) */"));
        assert_eq!(e.placeholders(), 1);
    }

    #[test]
    fn aspects_and_imports_emit_nothing() {
        let c = emit("import math\naspect A pointcut p \"f\" before p print(0) end end\nprint(1)").unwrap();
        assert!(!c.contains("aspect"));
        assert!(!c.contains("math"));
        assert!(c.contains("printf(\"%lld\\n\", (long long)(1));"));
    }

    #[test]
    fn string_literals_are_escaped() {
        assert_eq!(c_string("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }
}
