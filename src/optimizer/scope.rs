// パス: src/optimizer/scope.rs
// 役割: 定数伝播が使うスコープ付き記号表
// 意図: フレームのスタックで宣言と参照の可視範囲を表し、定数値を所有して保持する

use std::collections::HashMap;

use crate::ast::AstNode;

/// 記号表の 1 エントリ。
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    /// 直近の宣言・代入がリテラルなら、その複製を所有する。
    pub constant: Option<AstNode>,
    /// 宣言位置（行, 列）。
    pub declared_at: (usize, usize),
}

impl Symbol {
    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }
}

/// フレーム 0 をグローバルとするスコープスタック。
#[derive(Debug)]
pub struct SymbolTable {
    frames: Vec<HashMap<String, Symbol>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// グローバルフレームは取り除かない。
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// 現在のフレームに宣言する（同名は上書き）。
    pub fn declare(&mut self, name: &str, constant: Option<AstNode>, declared_at: (usize, usize)) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(
                name.to_string(),
                Symbol {
                    name: name.to_string(),
                    constant,
                    declared_at,
                },
            );
        }
    }

    /// 内側から外側へ探し、見つかったフレーム番号とエントリを返す。
    pub fn lookup(&self, name: &str) -> Option<(usize, &Symbol)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, f)| f.get(name).map(|s| (i, s)))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.frames.iter_mut().rev().find_map(|f| f.get_mut(name))
    }

    /// 見えているエントリを非定数にする。
    pub fn forget(&mut self, name: &str) {
        if let Some(sym) = self.lookup_mut(name) {
            sym.constant = None;
        }
    }

    /// 隠されている外側のエントリも含め、すべてのフレームで非定数にする。
    pub fn forget_in_all_frames(&mut self, name: &str) {
        for frame in self.frames.iter_mut() {
            if let Some(sym) = frame.get_mut(name) {
                sym.constant = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frames_shadow_outer() {
        let mut t = SymbolTable::new();
        t.declare("x", Some(AstNode::number(1.0, 1, 1)), (1, 1));
        t.push();
        t.declare("x", None, (2, 1));
        assert_eq!(t.lookup("x").map(|(i, s)| (i, s.is_constant())), Some((1, false)));
        t.pop();
        assert_eq!(t.lookup("x").map(|(i, s)| (i, s.is_constant())), Some((0, true)));
        t.pop();
        assert_eq!(t.depth(), 1);
    }
}
