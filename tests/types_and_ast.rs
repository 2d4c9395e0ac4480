// パス: tests/types_and_ast.rs
// 役割: 型互換性・型エンジンの推論結果と、AST の複製独立性を検証する
// 意図: 型検査が最善努力で続行すること、木の複製が元を共有しないことを外部から確認する
// 関連ファイル: src/typesys.rs, src/infer.rs, src/ast.rs
#[path = "test_support.rs"]
mod support;

use lyn::ast::{AstNode, NodeKind, NodeTag};
use lyn::infer::{self, TypeChecker};
use lyn::modules::StaticModules;
use lyn::typesys::{is_compatible, ClassType, Type};
use support::{error_codes, parse_program, statements, type_errors};

#[test]
/// 互換性は対称で、Unknown はすべてと互換。
fn compatibility_is_symmetric() {
    let all = [
        Type::Int,
        Type::Float,
        Type::Bool,
        Type::String,
        Type::Void,
        Type::Null,
        Type::array(Type::Int),
        Type::Class(ClassType::new("A")),
        Type::function(vec![Type::Int], Type::Int),
    ];
    assert!(is_compatible(&Type::Int, &Type::Float));
    assert!(is_compatible(&Type::Float, &Type::Int));
    for t in &all {
        assert!(is_compatible(&Type::Unknown, t), "unknown vs {t}");
        assert!(is_compatible(t, &Type::Unknown), "{t} vs unknown");
        for u in &all {
            assert_eq!(is_compatible(t, u), is_compatible(u, t), "{t} / {u}");
        }
    }
    assert!(!is_compatible(&Type::Bool, &Type::Int));
}

#[test]
fn subclass_values_are_compatible_with_base() {
    let base = ClassType::new("Animal");
    let dog = ClassType::new("Dog").with_base(base.clone());
    assert!(is_compatible(&Type::Class(dog.clone()), &Type::Class(base)));
    assert!(!is_compatible(&Type::Class(dog), &Type::Class(ClassType::new("Car"))));
}

#[test]
/// カリー化: 部分適用の結果を呼ぶと最終的な戻り値型になる。
fn curried_calls_resolve_to_return_type() {
    let (p, errs) = type_errors(
        "func mul3(a: int, b: int, c: float) -> float return a * b * c end\nstep = mul3(2)\nstep2 = step(3)\nr = step2(0.5)",
    );
    assert!(errs.is_empty(), "{errs:?}");
    let s = statements(&p);
    assert!(matches!(s[1].inferred_type, Some(Type::Curried { applied: 1, .. })));
    assert!(matches!(s[2].inferred_type, Some(Type::Curried { applied: 2, .. })));
    assert_eq!(s[3].inferred_type, Some(Type::Float));
}

#[test]
fn errors_are_collected_and_checking_continues() {
    let (p, errs) = type_errors("a = missing + 1\nb: bool = 3\nc = true - 1\nd = 2 * 2");
    assert_eq!(error_codes(&errs), vec!["TYPE010", "TYPE070", "TYPE001"]);
    assert_eq!(statements(&p)[3].inferred_type, Some(Type::Int));
    for e in &errs {
        assert!(e.0.line.is_some());
    }
}

#[test]
fn method_lookup_through_base_class_via_ufcs() {
    let src = "class Shape\n  name: string = \"shape\"\n  func describe(self: Shape) -> string return self.name end\nend\nclass Square : Shape\n  side: float = 1.0\nend\nsq = Square()\ndesc = sq.describe()\nside = sq.side";
    let (p, errs) = type_errors(src);
    assert!(errs.is_empty(), "{errs:?}");
    let s = statements(&p);
    assert_eq!(s[3].inferred_type, Some(Type::String));
    assert_eq!(s[4].inferred_type, Some(Type::Float));
}

#[test]
fn resolver_supplies_imported_names() {
    let modules = StaticModules::new().with(
        "geo.util",
        "dist",
        Type::function(vec![Type::Float, Type::Float], Type::Float),
    );
    let mut p = parse_program("import geo.util\nd = dist(1.0, 2.5)\ne = dist(1.0)");
    let mut tc = TypeChecker::new(&modules);
    tc.check_program(&mut p);
    assert!(tc.errors().is_empty(), "{:?}", tc.errors());
    assert_eq!(tc.global_type("d"), Some(&Type::Float));
    assert!(matches!(tc.global_type("e"), Some(Type::Curried { .. })));
}

#[test]
fn aspect_bodies_are_not_type_checked() {
    let (_, errs) = type_errors("aspect A pointcut p \"*\" before p undefined_thing() end end");
    assert!(errs.is_empty());
    let mut e = support::parse_expr("1 < 2");
    assert_eq!(infer::infer_type_str(&mut e), "bool");
}

#[test]
/// 複製を変更・破棄しても元の木の内容とノード数は変わらない。
fn cloned_subtrees_are_independent() {
    let original = parse_program("func f(a: int) -> int\n  if a > 1 return a * 2 end\n  return 0\nend");
    let count = original.node_count();
    let text = original.to_string();
    {
        let mut copy = original.clone();
        if let NodeKind::Program { statements } = &mut copy.kind {
            statements.push(AstNode::empty(NodeTag::Break, 9, 9));
            if let NodeKind::FunctionDef { body, .. } = &mut statements[0].kind {
                body.clear();
            }
        }
        assert_ne!(copy.node_count(), count);
    }
    assert_eq!(original.node_count(), count);
    assert_eq!(original.to_string(), text);
}

#[test]
fn empty_nodes_have_placeholder_children() {
    let n = AstNode::empty(NodeTag::If, 1, 1);
    assert_eq!(n.children().len(), 1);
    assert_eq!(n.children()[0].tag(), NodeTag::Null);
    let mut taken = AstNode::identifier("x", 2, 3);
    let moved = taken.take();
    assert_eq!(moved.to_string(), "x");
    assert_eq!((taken.line, taken.column), (2, 3));
}
