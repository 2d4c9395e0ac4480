// パス: src/parser/types.rs
// 役割: 型注釈（名前型・配列型・関数型）の構文解析を実装する
// 意図: 宣言・引数・ラムダで共通の型注釈ルーチンを提供する
// 関連ファイル: src/parser/expr.rs, src/parser/program.rs, src/ast.rs

use super::*;

/// 組み込み型名の集合（推論型宣言の省略記法 `x int` で使う）。
pub(super) const SHORTHAND_TYPES: &[&str] = &["int", "float", "bool", "string"];

impl<'a> Parser<'a> {
    pub(super) fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        let mut ty = match self.peek().kind {
            TokenKind::IDENT => TypeExpr::Named(self.advance()?.value),
            TokenKind::NULL => {
                self.advance()?;
                TypeExpr::Named("null".into())
            }
            TokenKind::LPAREN => self.parse_function_type()?,
            _ => {
                let msg = format!("型注釈が必要です: {:?}", self.peek().value);
                return Err(self.error("PAR030", msg));
            }
        };
        while self.at(TokenKind::LBRACK) {
            self.advance()?;
            self.pop(TokenKind::RBRACK)?;
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_function_type(&mut self) -> Result<TypeExpr, ParseError> {
        self.pop(TokenKind::LPAREN)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RPAREN) {
            loop {
                params.push(self.parse_type()?);
                if self.accept(TokenKind::COMMA)?.is_none() {
                    break;
                }
            }
        }
        self.pop(TokenKind::RPAREN)?;
        self.pop(TokenKind::ARROW)?;
        let ret = self.parse_type()?;
        Ok(TypeExpr::Function {
            params,
            ret: Box::new(ret),
        })
    }
}
