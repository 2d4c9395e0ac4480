// パス: src/typesys.rs
// 役割: 型表現と互換性・部分型判定のユーティリティを提供する
// 意図: 推論エンジンと最適化器が共有する型の比較規則を一か所に集める
// 関連ファイル: src/infer.rs, src/ast.rs, tests/typesys_additional.rs
//! 型システム（typesys）
//!
//! 目的:
//! - Lyn の型（`Type`）と、その互換性規則 `is_compatible` / 部分型判定 `is_subclass` を提供する。
//!
//! 方針:
//! - 健全性よりも推論を止めないことを優先する。`Unknown` は何とでも互換。
//! - クラスの部分型は基底クラス鎖を名前比較でたどって判定する（構造的同一性は見ない）。

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// クラス型。`base` は基底クラスの鎖を保持する。
pub struct ClassType {
    pub name: String,
    pub base: Option<Box<ClassType>>,
}

impl ClassType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
        }
    }

    pub fn with_base(mut self, base: ClassType) -> Self {
        self.base = Some(Box::new(base));
        self
    }

    /// 自身から根までのクラス名を順に返す。
    pub fn ancestry(&self) -> Vec<&str> {
        let mut out = vec![self.name.as_str()];
        let mut cur = self.base.as_deref();
        while let Some(c) = cur {
            out.push(c.name.as_str());
            cur = c.base.as_deref();
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// 関数（ラムダ）型の引数列と戻り値。
pub struct FunctionType {
    pub params: Vec<Type>,
    pub ret: Box<Type>,
}

impl FunctionType {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self {
            params,
            ret: Box::new(ret),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// 型システムで利用する型バリアント。
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    Null,
    Unknown,
    Array(Box<Type>),
    Class(ClassType),
    Function(FunctionType),
    /// 部分適用済みの関数。`applied` は適用済み引数の数。
    Curried {
        base: FunctionType,
        applied: usize,
    },
}

impl Type {
    pub fn array(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Type::Function(FunctionType::new(params, ret))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// 未適用の引数と戻り値を持つ関数型として見る（カリー化型は残りの引数だけ）。
    pub fn as_callable(&self) -> Option<FunctionType> {
        match self {
            Type::Function(f) => Some(f.clone()),
            Type::Curried { base, applied } => Some(FunctionType {
                params: base.params.iter().skip(*applied).cloned().collect(),
                ret: base.ret.clone(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Unknown => write!(f, "unknown"),
            Type::Array(elem) => write!(f, "{elem}[]"),
            Type::Class(c) => write!(f, "{}", c.name),
            Type::Function(ft) => write_fn(f, &ft.params, &ft.ret),
            Type::Curried { base, applied } => {
                write!(f, "curried<{applied}>")?;
                write_fn(f, &base.params, &base.ret)
            }
        }
    }
}

fn write_fn(f: &mut fmt::Formatter<'_>, params: &[Type], ret: &Type) -> fmt::Result {
    let parts: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    write!(f, "({}) -> {}", parts.join(", "), ret)
}

/// `sub` が `sup` と同じクラスか、その派生クラスかを判定する。
pub fn is_subclass(sub: &ClassType, sup: &ClassType) -> bool {
    sub.ancestry().iter().any(|name| *name == sup.name)
}

/// 2 つの型が互換かどうか（代入・引数渡しで許容されるか）。
///
/// # Examples
/// ```
/// use lyn::typesys::*;
/// assert!(is_compatible(&Type::Int, &Type::Float));
/// assert!(is_compatible(&Type::Unknown, &Type::String));
/// assert!(!is_compatible(&Type::Bool, &Type::String));
/// ```
pub fn is_compatible(a: &Type, b: &Type) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Type::Unknown, _) | (_, Type::Unknown) => true,
        (Type::Int, Type::Float) | (Type::Float, Type::Int) => true,
        (Type::Null, Type::Class(_) | Type::String | Type::Array(_))
        | (Type::Class(_) | Type::String | Type::Array(_), Type::Null) => true,
        (Type::Array(x), Type::Array(y)) => is_compatible(x, y),
        (Type::Class(x), Type::Class(y)) => is_subclass(x, y) || is_subclass(y, x),
        (
            Type::Function(_) | Type::Curried { .. },
            Type::Function(_) | Type::Curried { .. },
        ) => match (a.as_callable(), b.as_callable()) {
            (Some(fa), Some(fb)) => functions_compatible(&fa, &fb),
            _ => false,
        },
        _ => false,
    }
}

fn functions_compatible(a: &FunctionType, b: &FunctionType) -> bool {
    a.params.len() == b.params.len()
        && is_compatible(&a.ret, &b.ret)
        && a
            .params
            .iter()
            .zip(b.params.iter())
            .all(|(x, y)| is_compatible(x, y))
}

/// 二項算術演算の結果型。`None` は型エラー。
pub fn arithmetic_result(op_is_add: bool, l: &Type, r: &Type) -> Option<Type> {
    match (l, r) {
        (Type::Unknown, _) | (_, Type::Unknown) => Some(Type::Unknown),
        (Type::String, _) | (_, Type::String) if op_is_add => Some(Type::String),
        (Type::Float, t) | (t, Type::Float) if t.is_numeric() => Some(Type::Float),
        (Type::Int, Type::Int) => Some(Type::Int),
        _ => None,
    }
}
