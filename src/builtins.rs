// パス: src/builtins.rs
// 役割: 組み込み関数の定義メタデータを集約する
// 意図: 型エンジンとコード生成で同じ組み込み一覧を共有する
// 関連ファイル: src/infer.rs, src/codegen/c.rs
//! 組み込み関数定義モジュール
//!
//! - 名前・引数型・戻り値型・C 側の展開方法を一元管理し、重複列挙を防ぐ。
//! - 型エンジンは `lookup` でシグネチャを引き、コード生成は `BuiltinKind` をマッチして出力を決める。

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::typesys::Type;

/// 組み込み関数の分類。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinKind {
    /// 可変長引数の出力。
    Print,
    Len,
    ToString,
    ToInt,
    ToFloat,
    Sqrt,
}

/// 組み込み関数の定義。`params` が `None` なら可変長。
#[derive(Clone, Debug, PartialEq)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub kind: BuiltinKind,
    pub params: Option<Vec<Type>>,
    pub ret: Type,
}

impl BuiltinDef {
    pub fn is_variadic(&self) -> bool {
        self.params.is_none()
    }

    /// 関数値として参照されたときの型（可変長は `Unknown`）。
    pub fn as_type(&self) -> Type {
        match &self.params {
            Some(params) => Type::function(params.clone(), self.ret.clone()),
            None => Type::Unknown,
        }
    }
}

fn def(name: &'static str, kind: BuiltinKind, params: Option<Vec<Type>>, ret: Type) -> BuiltinDef {
    BuiltinDef {
        name,
        kind,
        params,
        ret,
    }
}

/// 言語が標準で提供する組み込み関数の一覧。
static BUILTINS: Lazy<HashMap<&'static str, BuiltinDef>> = Lazy::new(|| {
    [
        def("print", BuiltinKind::Print, None, Type::Void),
        def("len", BuiltinKind::Len, Some(vec![Type::Unknown]), Type::Int),
        def("str", BuiltinKind::ToString, Some(vec![Type::Unknown]), Type::String),
        def("int", BuiltinKind::ToInt, Some(vec![Type::Unknown]), Type::Int),
        def("float", BuiltinKind::ToFloat, Some(vec![Type::Unknown]), Type::Float),
        def("sqrt", BuiltinKind::Sqrt, Some(vec![Type::Float]), Type::Float),
    ]
    .into_iter()
    .map(|d| (d.name, d))
    .collect()
});

pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.get(name)
}

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains_key(name)
}
