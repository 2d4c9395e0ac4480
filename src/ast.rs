// パス: src/ast.rs
// 役割: Lyn の抽象構文木（タグ付き共用体）と、その生成・複製・走査・表示を提供する
// 意図: パーサ・型エンジン・ウィーバ・最適化器が共有する単一所有の木を定義する
// 関連ファイル: src/parser/mod.rs, src/infer.rs, src/optimizer/mod.rs, src/weaver/mod.rs
//! 抽象構文木（AST）
//!
//! 目的:
//! - すべての構文要素を `AstNode` 1 種類で表し、種類ごとのペイロードは `NodeKind` に閉じ込める。
//!
//! 設計ノート:
//! - 子ノードは親が排他的に所有する（`Box` / `Vec`）。共有は存在せず、複製は常に深い。
//! - 破棄は所有権に任せる。部分木を置き換えると古い部分木はその場で解放される。
//! - `inferred_type` は型エンジンが一度だけ書き込むメモ。`invalidate_types` で消去する。
//! - 型注釈（`TypeExpr`）は構文上の表現で、型エンジンの `Type` とは分離する。

use std::fmt::{self, Write as _};

use crate::typesys::Type;

/// 二項演算子。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

/// 単項演算子。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

/// アドバイスの種類。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdviceKind {
    Before,
    After,
    Around,
}

impl AdviceKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            AdviceKind::Before => "before",
            AdviceKind::After => "after",
            AdviceKind::Around => "around",
        }
    }
}

// 型注釈（パーサ用）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeExpr {
    Named(String),
    Array(Box<TypeExpr>),
    Function {
        params: Vec<TypeExpr>,
        ret: Box<TypeExpr>,
    },
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Named(name) => write!(f, "{name}"),
            TypeExpr::Array(elem) => write!(f, "{elem}[]"),
            TypeExpr::Function { params, ret } => {
                let parts: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "({}) -> {}", parts.join(", "), ret)
            }
        }
    }
}

/// ノード種別の判別子（ペイロードを持たない）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Program,
    Import,
    ModuleDecl,
    FunctionDef,
    Parameter,
    ClassDef,
    VarDecl,
    Assign,
    MemberAssign,
    IndexAssign,
    ExprStmt,
    Block,
    If,
    While,
    DoWhile,
    For,
    ForEach,
    Return,
    Break,
    Continue,
    Number,
    Str,
    Bool,
    Null,
    Identifier,
    Binary,
    Unary,
    Call,
    MemberAccess,
    Index,
    Lambda,
    ArrayLiteral,
    Compose,
    AspectDef,
    Pointcut,
    Advice,
    Match,
    MatchArm,
    WildcardPattern,
    BindingPattern,
}

// ノードのペイロード
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Program {
        statements: Vec<AstNode>,
    },
    Import {
        path: Vec<String>,
    },
    ModuleDecl {
        path: Vec<String>,
    },
    FunctionDef {
        name: String,
        params: Vec<AstNode>,
        return_type: Option<TypeExpr>,
        body: Vec<AstNode>,
    },
    Parameter {
        name: String,
        type_expr: Option<TypeExpr>,
    },
    ClassDef {
        name: String,
        base: Option<String>,
        members: Vec<AstNode>,
    },
    VarDecl {
        name: String,
        type_expr: Option<TypeExpr>,
        init: Option<Box<AstNode>>,
    },
    Assign {
        name: String,
        value: Box<AstNode>,
    },
    MemberAssign {
        object: Box<AstNode>,
        member: String,
        value: Box<AstNode>,
    },
    IndexAssign {
        target: Box<AstNode>,
        index: Box<AstNode>,
        value: Box<AstNode>,
    },
    ExprStmt {
        expr: Box<AstNode>,
    },
    Block {
        statements: Vec<AstNode>,
    },
    If {
        condition: Box<AstNode>,
        then_body: Vec<AstNode>,
        else_body: Vec<AstNode>,
    },
    While {
        condition: Box<AstNode>,
        body: Vec<AstNode>,
    },
    DoWhile {
        body: Vec<AstNode>,
        condition: Box<AstNode>,
    },
    For {
        var: String,
        start: Box<AstNode>,
        end: Box<AstNode>,
        body: Vec<AstNode>,
    },
    ForEach {
        var: String,
        iterable: Box<AstNode>,
        body: Vec<AstNode>,
    },
    Return {
        value: Option<Box<AstNode>>,
    },
    Break,
    Continue,
    Number {
        value: f64,
    },
    Str {
        value: String,
    },
    Bool {
        value: bool,
    },
    Null,
    Identifier {
        name: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<AstNode>,
        right: Box<AstNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<AstNode>,
    },
    Call {
        callee: Box<AstNode>,
        args: Vec<AstNode>,
    },
    MemberAccess {
        object: Box<AstNode>,
        member: String,
    },
    Index {
        target: Box<AstNode>,
        index: Box<AstNode>,
    },
    Lambda {
        params: Vec<AstNode>,
        return_type: Option<TypeExpr>,
        body: Box<AstNode>,
    },
    ArrayLiteral {
        elements: Vec<AstNode>,
    },
    Compose {
        first: Box<AstNode>,
        second: Box<AstNode>,
    },
    AspectDef {
        name: String,
        pointcuts: Vec<AstNode>,
        advices: Vec<AstNode>,
    },
    Pointcut {
        name: String,
        pattern: String,
    },
    Advice {
        kind: AdviceKind,
        pointcut: String,
        body: Vec<AstNode>,
    },
    Match {
        subject: Box<AstNode>,
        arms: Vec<AstNode>,
    },
    MatchArm {
        pattern: Box<AstNode>,
        body: Vec<AstNode>,
    },
    WildcardPattern,
    BindingPattern {
        name: String,
    },
}

impl NodeKind {
    pub fn tag(&self) -> NodeTag {
        match self {
            NodeKind::Program { .. } => NodeTag::Program,
            NodeKind::Import { .. } => NodeTag::Import,
            NodeKind::ModuleDecl { .. } => NodeTag::ModuleDecl,
            NodeKind::FunctionDef { .. } => NodeTag::FunctionDef,
            NodeKind::Parameter { .. } => NodeTag::Parameter,
            NodeKind::ClassDef { .. } => NodeTag::ClassDef,
            NodeKind::VarDecl { .. } => NodeTag::VarDecl,
            NodeKind::Assign { .. } => NodeTag::Assign,
            NodeKind::MemberAssign { .. } => NodeTag::MemberAssign,
            NodeKind::IndexAssign { .. } => NodeTag::IndexAssign,
            NodeKind::ExprStmt { .. } => NodeTag::ExprStmt,
            NodeKind::Block { .. } => NodeTag::Block,
            NodeKind::If { .. } => NodeTag::If,
            NodeKind::While { .. } => NodeTag::While,
            NodeKind::DoWhile { .. } => NodeTag::DoWhile,
            NodeKind::For { .. } => NodeTag::For,
            NodeKind::ForEach { .. } => NodeTag::ForEach,
            NodeKind::Return { .. } => NodeTag::Return,
            NodeKind::Break => NodeTag::Break,
            NodeKind::Continue => NodeTag::Continue,
            NodeKind::Number { .. } => NodeTag::Number,
            NodeKind::Str { .. } => NodeTag::Str,
            NodeKind::Bool { .. } => NodeTag::Bool,
            NodeKind::Null => NodeTag::Null,
            NodeKind::Identifier { .. } => NodeTag::Identifier,
            NodeKind::Binary { .. } => NodeTag::Binary,
            NodeKind::Unary { .. } => NodeTag::Unary,
            NodeKind::Call { .. } => NodeTag::Call,
            NodeKind::MemberAccess { .. } => NodeTag::MemberAccess,
            NodeKind::Index { .. } => NodeTag::Index,
            NodeKind::Lambda { .. } => NodeTag::Lambda,
            NodeKind::ArrayLiteral { .. } => NodeTag::ArrayLiteral,
            NodeKind::Compose { .. } => NodeTag::Compose,
            NodeKind::AspectDef { .. } => NodeTag::AspectDef,
            NodeKind::Pointcut { .. } => NodeTag::Pointcut,
            NodeKind::Advice { .. } => NodeTag::Advice,
            NodeKind::Match { .. } => NodeTag::Match,
            NodeKind::MatchArm { .. } => NodeTag::MatchArm,
            NodeKind::WildcardPattern => NodeTag::WildcardPattern,
            NodeKind::BindingPattern { .. } => NodeTag::BindingPattern,
        }
    }
}

/// AST の唯一のノード型。
#[derive(Clone, Debug, PartialEq)]
pub struct AstNode {
    pub kind: NodeKind,
    pub line: usize,
    pub column: usize,
    pub inferred_type: Option<Type>,
}

/// 空の子スロットを埋めるプレースホルダ。
fn placeholder(line: usize, column: usize) -> Box<AstNode> {
    Box::new(AstNode::new(NodeKind::Null, line, column))
}

impl AstNode {
    pub fn new(kind: NodeKind, line: usize, column: usize) -> Self {
        Self {
            kind,
            line,
            column,
            inferred_type: None,
        }
    }

    /// 種別タグから、すべての子が空の（ゼロ初期化された）ノードを作る。
    ///
    /// 単一の子を必須とするスロットには `Null` ノードが入る。
    pub fn empty(tag: NodeTag, line: usize, column: usize) -> Self {
        let p = || placeholder(line, column);
        let kind = match tag {
            NodeTag::Program => NodeKind::Program {
                statements: Vec::new(),
            },
            NodeTag::Import => NodeKind::Import { path: Vec::new() },
            NodeTag::ModuleDecl => NodeKind::ModuleDecl { path: Vec::new() },
            NodeTag::FunctionDef => NodeKind::FunctionDef {
                name: String::new(),
                params: Vec::new(),
                return_type: None,
                body: Vec::new(),
            },
            NodeTag::Parameter => NodeKind::Parameter {
                name: String::new(),
                type_expr: None,
            },
            NodeTag::ClassDef => NodeKind::ClassDef {
                name: String::new(),
                base: None,
                members: Vec::new(),
            },
            NodeTag::VarDecl => NodeKind::VarDecl {
                name: String::new(),
                type_expr: None,
                init: None,
            },
            NodeTag::Assign => NodeKind::Assign {
                name: String::new(),
                value: p(),
            },
            NodeTag::MemberAssign => NodeKind::MemberAssign {
                object: p(),
                member: String::new(),
                value: p(),
            },
            NodeTag::IndexAssign => NodeKind::IndexAssign {
                target: p(),
                index: p(),
                value: p(),
            },
            NodeTag::ExprStmt => NodeKind::ExprStmt { expr: p() },
            NodeTag::Block => NodeKind::Block {
                statements: Vec::new(),
            },
            NodeTag::If => NodeKind::If {
                condition: p(),
                then_body: Vec::new(),
                else_body: Vec::new(),
            },
            NodeTag::While => NodeKind::While {
                condition: p(),
                body: Vec::new(),
            },
            NodeTag::DoWhile => NodeKind::DoWhile {
                body: Vec::new(),
                condition: p(),
            },
            NodeTag::For => NodeKind::For {
                var: String::new(),
                start: p(),
                end: p(),
                body: Vec::new(),
            },
            NodeTag::ForEach => NodeKind::ForEach {
                var: String::new(),
                iterable: p(),
                body: Vec::new(),
            },
            NodeTag::Return => NodeKind::Return { value: None },
            NodeTag::Break => NodeKind::Break,
            NodeTag::Continue => NodeKind::Continue,
            NodeTag::Number => NodeKind::Number { value: 0.0 },
            NodeTag::Str => NodeKind::Str {
                value: String::new(),
            },
            NodeTag::Bool => NodeKind::Bool { value: false },
            NodeTag::Null => NodeKind::Null,
            NodeTag::Identifier => NodeKind::Identifier {
                name: String::new(),
            },
            NodeTag::Binary => NodeKind::Binary {
                op: BinaryOp::Add,
                left: p(),
                right: p(),
            },
            NodeTag::Unary => NodeKind::Unary {
                op: UnaryOp::Neg,
                operand: p(),
            },
            NodeTag::Call => NodeKind::Call {
                callee: p(),
                args: Vec::new(),
            },
            NodeTag::MemberAccess => NodeKind::MemberAccess {
                object: p(),
                member: String::new(),
            },
            NodeTag::Index => NodeKind::Index {
                target: p(),
                index: p(),
            },
            NodeTag::Lambda => NodeKind::Lambda {
                params: Vec::new(),
                return_type: None,
                body: p(),
            },
            NodeTag::ArrayLiteral => NodeKind::ArrayLiteral {
                elements: Vec::new(),
            },
            NodeTag::Compose => NodeKind::Compose {
                first: p(),
                second: p(),
            },
            NodeTag::AspectDef => NodeKind::AspectDef {
                name: String::new(),
                pointcuts: Vec::new(),
                advices: Vec::new(),
            },
            NodeTag::Pointcut => NodeKind::Pointcut {
                name: String::new(),
                pattern: String::new(),
            },
            NodeTag::Advice => NodeKind::Advice {
                kind: AdviceKind::Before,
                pointcut: String::new(),
                body: Vec::new(),
            },
            NodeTag::Match => NodeKind::Match {
                subject: p(),
                arms: Vec::new(),
            },
            NodeTag::MatchArm => NodeKind::MatchArm {
                pattern: p(),
                body: Vec::new(),
            },
            NodeTag::WildcardPattern => NodeKind::WildcardPattern,
            NodeTag::BindingPattern => NodeKind::BindingPattern {
                name: String::new(),
            },
        };
        Self::new(kind, line, column)
    }

    pub fn tag(&self) -> NodeTag {
        self.kind.tag()
    }

    pub fn number(value: f64, line: usize, column: usize) -> Self {
        Self::new(NodeKind::Number { value }, line, column)
    }

    pub fn identifier(name: impl Into<String>, line: usize, column: usize) -> Self {
        Self::new(NodeKind::Identifier { name: name.into() }, line, column)
    }

    /// スカラー部分（名前・演算子・リテラル値・位置・型メモ）だけを複製し、子は空にする。
    ///
    /// 子の所有権は元ノードに残るため、結果は一時的な操作にのみ使う。
    pub fn shallow_copy(&self) -> Self {
        let mut out = AstNode::empty(self.tag(), self.line, self.column);
        out.inferred_type = self.inferred_type.clone();
        copy_scalars(&mut out.kind, &self.kind);
        out
    }

    /// ノードを取り出し、同じ種別の空ノードを残す。
    pub fn take(&mut self) -> AstNode {
        let empty = AstNode::empty(self.tag(), self.line, self.column);
        std::mem::replace(self, empty)
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Number { .. } | NodeKind::Str { .. } | NodeKind::Bool { .. } | NodeKind::Null
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Number { value } => Some(value),
            _ => None,
        }
    }

    /// 条件として評価したときの真偽（リテラルのみ）。
    pub fn literal_truth(&self) -> Option<bool> {
        match &self.kind {
            NodeKind::Number { value } => Some(*value != 0.0),
            NodeKind::Bool { value } => Some(*value),
            NodeKind::Null => Some(false),
            NodeKind::Str { value } => Some(!value.is_empty()),
            _ => None,
        }
    }

    /// 直接の子ノードを順番どおりに返す。
    pub fn children(&self) -> Vec<&AstNode> {
        let mut out: Vec<&AstNode> = Vec::new();
        match &self.kind {
            NodeKind::Program { statements } | NodeKind::Block { statements } => {
                out.extend(statements)
            }
            NodeKind::FunctionDef { params, body, .. } => {
                out.extend(params);
                out.extend(body);
            }
            NodeKind::ClassDef { members, .. } => out.extend(members),
            NodeKind::VarDecl { init, .. } => out.extend(init.as_deref()),
            NodeKind::Assign { value, .. } => out.push(value),
            NodeKind::MemberAssign { object, value, .. } => {
                out.push(object);
                out.push(value);
            }
            NodeKind::IndexAssign {
                target,
                index,
                value,
            } => {
                out.push(target);
                out.push(index);
                out.push(value);
            }
            NodeKind::ExprStmt { expr } => out.push(expr),
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => {
                out.push(condition);
                out.extend(then_body);
                out.extend(else_body);
            }
            NodeKind::While { condition, body } => {
                out.push(condition);
                out.extend(body);
            }
            NodeKind::DoWhile { body, condition } => {
                out.extend(body);
                out.push(condition);
            }
            NodeKind::For {
                start, end, body, ..
            } => {
                out.push(start);
                out.push(end);
                out.extend(body);
            }
            NodeKind::ForEach { iterable, body, .. } => {
                out.push(iterable);
                out.extend(body);
            }
            NodeKind::Return { value } => out.extend(value.as_deref()),
            NodeKind::Binary { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            NodeKind::Unary { operand, .. } => out.push(operand),
            NodeKind::Call { callee, args } => {
                out.push(callee);
                out.extend(args);
            }
            NodeKind::MemberAccess { object, .. } => out.push(object),
            NodeKind::Index { target, index } => {
                out.push(target);
                out.push(index);
            }
            NodeKind::Lambda { params, body, .. } => {
                out.extend(params);
                out.push(body);
            }
            NodeKind::ArrayLiteral { elements } => out.extend(elements),
            NodeKind::Compose { first, second } => {
                out.push(first);
                out.push(second);
            }
            NodeKind::AspectDef {
                pointcuts, advices, ..
            } => {
                out.extend(pointcuts);
                out.extend(advices);
            }
            NodeKind::Advice { body, .. } => out.extend(body),
            NodeKind::Match { subject, arms } => {
                out.push(subject);
                out.extend(arms);
            }
            NodeKind::MatchArm { pattern, body } => {
                out.push(pattern);
                out.extend(body);
            }
            NodeKind::Import { .. }
            | NodeKind::ModuleDecl { .. }
            | NodeKind::Parameter { .. }
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Number { .. }
            | NodeKind::Str { .. }
            | NodeKind::Bool { .. }
            | NodeKind::Null
            | NodeKind::Identifier { .. }
            | NodeKind::Pointcut { .. }
            | NodeKind::WildcardPattern
            | NodeKind::BindingPattern { .. } => {}
        }
        out
    }

    /// `children` の可変版。
    pub fn children_mut(&mut self) -> Vec<&mut AstNode> {
        let mut out: Vec<&mut AstNode> = Vec::new();
        match &mut self.kind {
            NodeKind::Program { statements } | NodeKind::Block { statements } => {
                out.extend(statements.iter_mut())
            }
            NodeKind::FunctionDef { params, body, .. } => {
                out.extend(params.iter_mut());
                out.extend(body.iter_mut());
            }
            NodeKind::ClassDef { members, .. } => out.extend(members.iter_mut()),
            NodeKind::VarDecl { init, .. } => out.extend(init.as_deref_mut()),
            NodeKind::Assign { value, .. } => out.push(value),
            NodeKind::MemberAssign { object, value, .. } => {
                out.push(object);
                out.push(value);
            }
            NodeKind::IndexAssign {
                target,
                index,
                value,
            } => {
                out.push(target);
                out.push(index);
                out.push(value);
            }
            NodeKind::ExprStmt { expr } => out.push(expr),
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => {
                out.push(condition);
                out.extend(then_body.iter_mut());
                out.extend(else_body.iter_mut());
            }
            NodeKind::While { condition, body } => {
                out.push(condition);
                out.extend(body.iter_mut());
            }
            NodeKind::DoWhile { body, condition } => {
                out.extend(body.iter_mut());
                out.push(condition);
            }
            NodeKind::For {
                start, end, body, ..
            } => {
                out.push(start);
                out.push(end);
                out.extend(body.iter_mut());
            }
            NodeKind::ForEach { iterable, body, .. } => {
                out.push(iterable);
                out.extend(body.iter_mut());
            }
            NodeKind::Return { value } => out.extend(value.as_deref_mut()),
            NodeKind::Binary { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            NodeKind::Unary { operand, .. } => out.push(operand),
            NodeKind::Call { callee, args } => {
                out.push(callee);
                out.extend(args.iter_mut());
            }
            NodeKind::MemberAccess { object, .. } => out.push(object),
            NodeKind::Index { target, index } => {
                out.push(target);
                out.push(index);
            }
            NodeKind::Lambda { params, body, .. } => {
                out.extend(params.iter_mut());
                out.push(body);
            }
            NodeKind::ArrayLiteral { elements } => out.extend(elements.iter_mut()),
            NodeKind::Compose { first, second } => {
                out.push(first);
                out.push(second);
            }
            NodeKind::AspectDef {
                pointcuts, advices, ..
            } => {
                out.extend(pointcuts.iter_mut());
                out.extend(advices.iter_mut());
            }
            NodeKind::Advice { body, .. } => out.extend(body.iter_mut()),
            NodeKind::Match { subject, arms } => {
                out.push(subject);
                out.extend(arms.iter_mut());
            }
            NodeKind::MatchArm { pattern, body } => {
                out.push(pattern);
                out.extend(body.iter_mut());
            }
            NodeKind::Import { .. }
            | NodeKind::ModuleDecl { .. }
            | NodeKind::Parameter { .. }
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Number { .. }
            | NodeKind::Str { .. }
            | NodeKind::Bool { .. }
            | NodeKind::Null
            | NodeKind::Identifier { .. }
            | NodeKind::Pointcut { .. }
            | NodeKind::WildcardPattern
            | NodeKind::BindingPattern { .. } => {}
        }
        out
    }

    /// このノードが直接所有する文の列（本体・分岐など）。
    pub fn statement_lists_mut(&mut self) -> Vec<&mut Vec<AstNode>> {
        match &mut self.kind {
            NodeKind::Program { statements } | NodeKind::Block { statements } => vec![statements],
            NodeKind::FunctionDef { body, .. }
            | NodeKind::While { body, .. }
            | NodeKind::DoWhile { body, .. }
            | NodeKind::For { body, .. }
            | NodeKind::ForEach { body, .. }
            | NodeKind::Advice { body, .. }
            | NodeKind::MatchArm { body, .. } => vec![body],
            NodeKind::If {
                then_body,
                else_body,
                ..
            } => vec![then_body, else_body],
            NodeKind::ClassDef { members, .. } => vec![members],
            _ => Vec::new(),
        }
    }

    /// 部分木に含まれるノード数（自身を含む）。
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// 部分木全体の型メモを消去する。
    pub fn invalidate_types(&mut self) {
        self.inferred_type = None;
        for child in self.children_mut() {
            child.invalidate_types();
        }
    }

    /// インデント付きのデバッグ表示。
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(out, "{indent}{:?}", self.tag());
        let detail = match &self.kind {
            NodeKind::Import { path } | NodeKind::ModuleDecl { path } => path.join("."),
            NodeKind::FunctionDef {
                name, return_type, ..
            } => match return_type {
                Some(rt) => format!("{name} -> {rt}"),
                None => name.clone(),
            },
            NodeKind::Parameter { name, type_expr } | NodeKind::VarDecl { name, type_expr, .. } => {
                match type_expr {
                    Some(t) => format!("{name}: {t}"),
                    None => name.clone(),
                }
            }
            NodeKind::ClassDef { name, base, .. } => match base {
                Some(b) => format!("{name} : {b}"),
                None => name.clone(),
            },
            NodeKind::Assign { name, .. } | NodeKind::Identifier { name } => name.clone(),
            NodeKind::MemberAssign { member, .. } | NodeKind::MemberAccess { member, .. } => {
                format!(".{member}")
            }
            NodeKind::For { var, .. } | NodeKind::ForEach { var, .. } => var.clone(),
            NodeKind::Number { value } => format_number(*value),
            NodeKind::Str { value } => format!("{value:?}"),
            NodeKind::Bool { value } => value.to_string(),
            NodeKind::Binary { op, .. } => op.symbol().to_string(),
            NodeKind::Unary { op, .. } => op.symbol().to_string(),
            NodeKind::Lambda {
                return_type: Some(rt),
                ..
            } => format!("-> {rt}"),
            NodeKind::AspectDef { name, .. } => name.clone(),
            NodeKind::Pointcut { name, pattern } => format!("{name} {pattern:?}"),
            NodeKind::Advice { kind, pointcut, .. } => format!("{} {pointcut}", kind.keyword()),
            NodeKind::BindingPattern { name } => name.clone(),
            _ => String::new(),
        };
        if !detail.is_empty() {
            let _ = write!(out, " {detail}");
        }
        if let Some(ty) = &self.inferred_type {
            let _ = write!(out, " : {ty}");
        }
        let _ = writeln!(out, " @{}:{}", self.line, self.column);
        for child in self.children() {
            child.dump_into(out, depth + 1);
        }
    }
}

/// 種別ごとのスカラーフィールドを `src` から `dst` へ写す（両者は同じ種別）。
fn copy_scalars(dst: &mut NodeKind, src: &NodeKind) {
    match (dst, src) {
        (NodeKind::Import { path: d }, NodeKind::Import { path: s })
        | (NodeKind::ModuleDecl { path: d }, NodeKind::ModuleDecl { path: s }) => d.clone_from(s),
        (
            NodeKind::FunctionDef {
                name: dn,
                return_type: dr,
                ..
            },
            NodeKind::FunctionDef {
                name, return_type, ..
            },
        ) => {
            dn.clone_from(name);
            dr.clone_from(return_type);
        }
        (
            NodeKind::Parameter {
                name: dn,
                type_expr: dt,
            },
            NodeKind::Parameter { name, type_expr },
        )
        | (
            NodeKind::VarDecl {
                name: dn,
                type_expr: dt,
                ..
            },
            NodeKind::VarDecl {
                name, type_expr, ..
            },
        ) => {
            dn.clone_from(name);
            dt.clone_from(type_expr);
        }
        (
            NodeKind::ClassDef {
                name: dn, base: db, ..
            },
            NodeKind::ClassDef { name, base, .. },
        ) => {
            dn.clone_from(name);
            db.clone_from(base);
        }
        (NodeKind::Assign { name: d, .. }, NodeKind::Assign { name: s, .. })
        | (NodeKind::Identifier { name: d }, NodeKind::Identifier { name: s })
        | (NodeKind::BindingPattern { name: d }, NodeKind::BindingPattern { name: s })
        | (NodeKind::AspectDef { name: d, .. }, NodeKind::AspectDef { name: s, .. })
        | (NodeKind::For { var: d, .. }, NodeKind::For { var: s, .. })
        | (NodeKind::ForEach { var: d, .. }, NodeKind::ForEach { var: s, .. })
        | (NodeKind::MemberAssign { member: d, .. }, NodeKind::MemberAssign { member: s, .. })
        | (NodeKind::MemberAccess { member: d, .. }, NodeKind::MemberAccess { member: s, .. })
        | (NodeKind::Str { value: d }, NodeKind::Str { value: s }) => d.clone_from(s),
        (NodeKind::Number { value: d }, NodeKind::Number { value: s }) => *d = *s,
        (NodeKind::Bool { value: d }, NodeKind::Bool { value: s }) => *d = *s,
        (NodeKind::Binary { op: d, .. }, NodeKind::Binary { op: s, .. }) => *d = *s,
        (NodeKind::Unary { op: d, .. }, NodeKind::Unary { op: s, .. }) => *d = *s,
        (
            NodeKind::Lambda {
                return_type: d, ..
            },
            NodeKind::Lambda { return_type: s, .. },
        ) => d.clone_from(s),
        (
            NodeKind::Pointcut {
                name: dn,
                pattern: dp,
            },
            NodeKind::Pointcut { name, pattern },
        ) => {
            dn.clone_from(name);
            dp.clone_from(pattern);
        }
        (
            NodeKind::Advice {
                kind: dk,
                pointcut: dp,
                ..
            },
            NodeKind::Advice { kind, pointcut, .. },
        ) => {
            *dk = *kind;
            dp.clone_from(pointcut);
        }
        _ => {}
    }
}

/// 整数値なら小数点なしで、それ以外は通常の浮動小数表記で整形する。
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn join_nodes(items: &[AstNode], sep: &str) -> String {
    items
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[AstNode]) -> fmt::Result {
    for stmt in body {
        write!(f, "; {stmt}")?;
    }
    Ok(())
}

/// Lyn 構文として再解析できる 1 行表現。
impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Program { statements } => write!(f, "{}", join_nodes(statements, "; ")),
            NodeKind::Import { path } => write!(f, "import {}", path.join(".")),
            NodeKind::ModuleDecl { path } => write!(f, "module {}", path.join(".")),
            NodeKind::FunctionDef {
                name,
                params,
                return_type,
                body,
            } => {
                write!(f, "func {name}({})", join_nodes(params, ", "))?;
                if let Some(rt) = return_type {
                    write!(f, " -> {rt}")?;
                }
                write_body(f, body)?;
                write!(f, "; end")
            }
            NodeKind::Parameter { name, type_expr } => match type_expr {
                Some(t) => write!(f, "{name}: {t}"),
                None => write!(f, "{name}"),
            },
            NodeKind::ClassDef {
                name,
                base,
                members,
            } => {
                write!(f, "class {name}")?;
                if let Some(b) = base {
                    write!(f, " : {b}")?;
                }
                write_body(f, members)?;
                write!(f, "; end")
            }
            NodeKind::VarDecl {
                name,
                type_expr,
                init,
            } => {
                match type_expr {
                    Some(t) => write!(f, "{name}: {t}")?,
                    None => write!(f, "{name}")?,
                }
                if let Some(init) = init {
                    write!(f, " = {init}")?;
                }
                Ok(())
            }
            NodeKind::Assign { name, value } => write!(f, "{name} = {value}"),
            NodeKind::MemberAssign {
                object,
                member,
                value,
            } => write!(f, "{object}.{member} = {value}"),
            NodeKind::IndexAssign {
                target,
                index,
                value,
            } => write!(f, "{target}[{index}] = {value}"),
            NodeKind::ExprStmt { expr } => write!(f, "{expr}"),
            NodeKind::Block { statements } => write!(f, "{}", join_nodes(statements, "; ")),
            NodeKind::If {
                condition,
                then_body,
                else_body,
            } => {
                write!(f, "if {condition}")?;
                write_body(f, then_body)?;
                if !else_body.is_empty() {
                    write!(f, "; else")?;
                    write_body(f, else_body)?;
                }
                write!(f, "; end")
            }
            NodeKind::While { condition, body } => {
                write!(f, "while {condition}")?;
                write_body(f, body)?;
                write!(f, "; end")
            }
            NodeKind::DoWhile { body, condition } => {
                write!(f, "do")?;
                write_body(f, body)?;
                write!(f, "; end while {condition}")
            }
            NodeKind::For {
                var,
                start,
                end,
                body,
            } => {
                write!(f, "for {var} in range({start}, {end})")?;
                write_body(f, body)?;
                write!(f, "; end")
            }
            NodeKind::ForEach {
                var,
                iterable,
                body,
            } => {
                write!(f, "for {var} in {iterable}")?;
                write_body(f, body)?;
                write!(f, "; end")
            }
            NodeKind::Return { value } => match value {
                Some(v) => write!(f, "return {v}"),
                None => write!(f, "return"),
            },
            NodeKind::Break => write!(f, "break"),
            NodeKind::Continue => write!(f, "continue"),
            NodeKind::Number { value } => write!(f, "{}", format_number(*value)),
            NodeKind::Str { value } => write!(f, "{value:?}"),
            NodeKind::Bool { value } => write!(f, "{value}"),
            NodeKind::Null => write!(f, "null"),
            NodeKind::Identifier { name } => write!(f, "{name}"),
            NodeKind::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            NodeKind::Unary { op, operand } => write!(f, "({}{})", op.symbol(), operand),
            NodeKind::Call { callee, args } => write!(f, "{callee}({})", join_nodes(args, ", ")),
            NodeKind::MemberAccess { object, member } => write!(f, "{object}.{member}"),
            NodeKind::Index { target, index } => write!(f, "{target}[{index}]"),
            NodeKind::Lambda {
                params,
                return_type,
                body,
            } => {
                write!(f, "({})", join_nodes(params, ", "))?;
                if let Some(rt) = return_type {
                    write!(f, " -> {rt}")?;
                }
                write!(f, " => {body}")
            }
            NodeKind::ArrayLiteral { elements } => write!(f, "[{}]", join_nodes(elements, ", ")),
            NodeKind::Compose { first, second } => write!(f, "({first} >> {second})"),
            NodeKind::AspectDef {
                name,
                pointcuts,
                advices,
            } => {
                write!(f, "aspect {name}")?;
                write_body(f, pointcuts)?;
                write_body(f, advices)?;
                write!(f, "; end")
            }
            NodeKind::Pointcut { name, pattern } => write!(f, "pointcut {name} {pattern:?}"),
            NodeKind::Advice {
                kind,
                pointcut,
                body,
            } => {
                write!(f, "{} {pointcut}", kind.keyword())?;
                write_body(f, body)?;
                write!(f, "; end")
            }
            NodeKind::Match { subject, arms } => {
                write!(f, "match {subject}")?;
                write_body(f, arms)?;
                write!(f, "; end")
            }
            NodeKind::MatchArm { pattern, body } => {
                write!(f, "case {pattern} =>")?;
                write_body(f, body)
            }
            NodeKind::WildcardPattern => write!(f, "_"),
            NodeKind::BindingPattern { name } => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bin(op: BinaryOp, l: AstNode, r: AstNode) -> AstNode {
        AstNode::new(
            NodeKind::Binary {
                op,
                left: Box::new(l),
                right: Box::new(r),
            },
            1,
            1,
        )
    }

    #[test]
    /// 空ノードは子スロットがすべて空で、型メモも持たない。
    fn empty_factory_zero_initializes() {
        let n = AstNode::empty(NodeTag::FunctionDef, 3, 4);
        assert_eq!(n.tag(), NodeTag::FunctionDef);
        assert_eq!(n.node_count(), 1);
        assert!(n.inferred_type.is_none());
        let b = AstNode::empty(NodeTag::Binary, 1, 1);
        assert_eq!(b.children().len(), 2);
        assert!(b.children().iter().all(|c| c.tag() == NodeTag::Null));
    }

    #[test]
    /// 浅い複製はスカラーのみを保持し、子を持たない。
    fn shallow_copy_keeps_scalars_only() {
        let n = bin(
            BinaryOp::Mul,
            AstNode::number(2.0, 1, 1),
            AstNode::identifier("x", 1, 5),
        );
        let s = n.shallow_copy();
        match &s.kind {
            NodeKind::Binary { op, left, right } => {
                assert_eq!(*op, BinaryOp::Mul);
                assert_eq!(left.tag(), NodeTag::Null);
                assert_eq!(right.tag(), NodeTag::Null);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(n.node_count(), 3);
    }

    #[test]
    /// 深い複製を破棄しても元の木は変化しない。
    fn clone_is_independent() {
        let original = bin(
            BinaryOp::Add,
            AstNode::number(1.0, 1, 1),
            bin(BinaryOp::Mul, AstNode::number(2.0, 1, 5), AstNode::identifier("y", 1, 9)),
        );
        let before = original.to_string();
        let count = original.node_count();
        {
            let mut copy = original.clone();
            if let NodeKind::Binary { left, .. } = &mut copy.kind {
                **left = AstNode::number(99.0, 1, 1);
            }
            drop(copy);
        }
        assert_eq!(original.node_count(), count);
        assert_eq!(original.to_string(), before);
    }

    #[test]
    fn take_leaves_empty_node_of_same_kind() {
        let mut n = AstNode::identifier("abc", 2, 2);
        let taken = n.take();
        assert_eq!(taken.to_string(), "abc");
        assert_eq!(n.tag(), NodeTag::Identifier);
        assert_eq!(n.to_string(), "");
    }

    #[test]
    fn display_renders_nested_binary() {
        let n = bin(
            BinaryOp::Add,
            AstNode::number(3.0, 1, 1),
            bin(BinaryOp::Mul, AstNode::number(4.0, 1, 5), AstNode::number(2.5, 1, 9)),
        );
        assert_eq!(n.to_string(), "(3 + (4 * 2.5))");
    }

    #[test]
    fn dump_indents_children() {
        let n = bin(
            BinaryOp::Sub,
            AstNode::number(1.0, 1, 1),
            AstNode::identifier("z", 1, 5),
        );
        let d = n.dump();
        let lines: Vec<&str> = d.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Binary -"));
        assert!(lines[1].starts_with("  Number 1"));
        assert!(lines[2].starts_with("  Identifier z"));
    }
}
