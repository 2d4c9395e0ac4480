// パス: src/modules.rs
// 役割: import したモジュールのシンボル型を解決するインターフェース
// 意図: 型エンジンをファイル探索やキャッシュから切り離し、差し替え可能にする
// 関連ファイル: src/infer.rs, src/config.rs, src/lib.rs

use std::collections::HashMap;

use crate::ast::TypeExpr;
use crate::parser;
use crate::typesys::Type;

/// `import a.b` されたモジュールから名前の型を引く。
pub trait SymbolResolver {
    fn resolve(&self, module: &[String], name: &str) -> Option<Type>;
}

/// 何も解決しない既定のリゾルバ。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoModules;

impl SymbolResolver for NoModules {
    fn resolve(&self, _module: &[String], _name: &str) -> Option<Type> {
        None
    }
}

/// メモリ上の表で解決するリゾルバ。キーはドット区切りのモジュールパス。
#[derive(Clone, Debug, Default)]
pub struct StaticModules {
    modules: HashMap<String, HashMap<String, Type>>,
}

impl StaticModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: impl Into<String>, name: impl Into<String>, ty: Type) {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(name.into(), ty);
    }

    pub fn with(mut self, module: &str, name: &str, ty: Type) -> Self {
        self.insert(module, name, ty);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl SymbolResolver for StaticModules {
    fn resolve(&self, module: &[String], name: &str) -> Option<Type> {
        self.modules.get(&module.join("."))?.get(name).cloned()
    }
}

/// 型名の文字列（`int`, `float[]`, `(int) -> bool`）を型に変換する。
///
/// 設定ファイルの `[modules]` 表で使う。構文は型注釈と同じで、クラス名など解釈できなければ `None`。
pub fn parse_type_name(src: &str) -> Option<Type> {
    let te = parser::parse_type_expr(src).ok()?;
    builtin_type(&te)
}

fn builtin_type(te: &TypeExpr) -> Option<Type> {
    Some(match te {
        TypeExpr::Named(name) => match name.as_str() {
            "int" => Type::Int,
            "float" => Type::Float,
            "bool" => Type::Bool,
            "string" => Type::String,
            "void" => Type::Void,
            "null" => Type::Null,
            _ => return None,
        },
        TypeExpr::Array(elem) => Type::array(builtin_type(elem)?),
        TypeExpr::Function { params, ret } => Type::function(
            params.iter().map(builtin_type).collect::<Option<Vec<_>>>()?,
            builtin_type(ret)?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_modules_resolve_by_dotted_path() {
        let m = StaticModules::new().with("math.trig", "sin", Type::function(vec![Type::Float], Type::Float));
        let path = vec!["math".to_string(), "trig".to_string()];
        assert!(m.resolve(&path, "sin").is_some());
        assert!(m.resolve(&path, "cos").is_none());
        assert!(NoModules.resolve(&path, "sin").is_none());
    }

    #[test]
    fn parses_type_names() {
        assert_eq!(parse_type_name("int[]"), Some(Type::array(Type::Int)));
        assert_eq!(
            parse_type_name("(int, (float) -> bool) -> string").map(|t| t.to_string()),
            Some("(int, (float) -> bool) -> string".to_string())
        );
        assert_eq!(parse_type_name("() -> void"), Some(Type::function(vec![], Type::Void)));
        assert_eq!(parse_type_name("widget"), None);
        assert_eq!(parse_type_name("  float[][] "), Some(Type::array(Type::array(Type::Float))));
        assert_eq!(parse_type_name("(int ->"), None);
        assert_eq!(parse_type_name("int int"), None);
    }
}
