// パス: src/parser/mod.rs
// 役割: トークン列から AST を生成する再帰下降パーサのエントリポイント
// 意図: 字句解析器を直接駆動し、投機的先読みと規則スタック付きエラーを提供する
// 関連ファイル: src/parser/program.rs, src/parser/expr.rs, src/parser/types.rs
//! 構文解析モジュール
//!
//! - 文は `program.rs`、式は `expr.rs`、型注釈は `types.rs` が担当する。
//! - 演算子は `>>` < (`+ - 比較` の単一段) < (`* / %`) < 単項 < 因子 の順でハンドコードする。
//! - 先読みは字句解析器の状態を保存して読み進め、必ず復元する。トークンのバッファは持たない。
//! - 最初の構文エラーで解析を打ち切り、`ParseError` を返す（部分木は返さない）。

use crate::ast::{AdviceKind, AstNode, BinaryOp, NodeKind, TypeExpr, UnaryOp};
use crate::errors::ParseError;
use crate::lexer::{Lexer, LexerState, Token, TokenKind};

mod expr;
mod program;
mod types;

/// 再帰下降パーサの進行状態を保持する構造体。
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    rules: Vec<&'static str>,
}

impl<'a> Parser<'a> {
    /// ソースから新しいパーサを構築し、最初のトークンを読み込む。
    pub fn new(src: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(src);
        let cur = lexer.next_token()?;
        Ok(Self {
            lexer,
            cur,
            rules: Vec::new(),
        })
    }

    /// 字句解析器の現在位置（先読みの検査用）。
    pub fn lexer_state(&self) -> LexerState {
        self.lexer.save_state()
    }

    pub(super) fn peek(&self) -> &Token {
        &self.cur
    }

    pub(super) fn at(&self, kind: TokenKind) -> bool {
        self.cur.kind == kind
    }

    /// 現在のトークンを返し、次のトークンを読み込む。
    pub(super) fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.cur, next))
    }

    pub(super) fn pop(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.cur.kind != kind {
            let msg = format!(
                "{:?} を期待しましたが {:?} ({})",
                kind, self.cur.kind, self.cur.value
            );
            return Err(self.error("PAR001", msg));
        }
        self.advance()
    }

    pub(super) fn accept(&mut self, kind: TokenKind) -> Result<Option<Token>, ParseError> {
        if self.cur.kind == kind {
            self.advance().map(Some)
        } else {
            Ok(None)
        }
    }

    /// 現在トークンの次を 1 つだけ覗く。字句解析器の状態は元に戻す。
    pub(super) fn peek_next(&mut self) -> Option<Token> {
        let saved = self.lexer.save_state();
        let tok = self.lexer.next_token().ok();
        self.lexer.restore_state(saved);
        tok
    }

    /// 現在位置での構文エラーを組み立てる（スニペットと規則スタック付き）。
    pub(super) fn error(&self, code: &'static str, msg: impl Into<String>) -> ParseError {
        let t = &self.cur;
        let mut err = ParseError::at(code, msg, Some(t.pos), Some(t.line), Some(t.col))
            .with_rules(&self.rules);
        err.info.snippet = Some(self.lexer.line_text(t.line).to_string());
        err
    }

    pub(super) fn enter(&mut self, rule: &'static str) {
        self.rules.push(rule);
    }

    pub(super) fn leave(&mut self) {
        self.rules.pop();
    }

    /// 指定した終端トークンのいずれかに達するまで文を読む（終端は消費しない）。
    pub(super) fn parse_block_until(
        &mut self,
        terminators: &[TokenKind],
    ) -> Result<Vec<AstNode>, ParseError> {
        let mut body = Vec::new();
        loop {
            if self.at(TokenKind::SEMI) {
                self.advance()?;
                continue;
            }
            if terminators.contains(&self.cur.kind) {
                return Ok(body);
            }
            if self.at(TokenKind::EOF) {
                let expected: Vec<String> = terminators.iter().map(|k| format!("{k:?}")).collect();
                return Err(self.error(
                    "PAR060",
                    format!("ブロックが閉じていません（{} が必要です）", expected.join(" / ")),
                ));
            }
            body.push(self.parse_statement()?);
        }
    }
}

pub(super) fn node_at(kind: NodeKind, token: &Token) -> AstNode {
    AstNode::new(kind, token.line, token.col)
}

pub(super) fn decode_string(quoted: &str) -> Result<String, ParseError> {
    if quoted.len() < 2 || !quoted.starts_with('"') || !quoted.ends_with('"') {
        return Err(ParseError::new("PAR201", "文字列リテラルが不正", None));
    }
    let s = &quoted[1..quoted.len() - 1];
    let mut out = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let Some(e) = chars.next() else {
                return Err(ParseError::new("PAR202", "末尾のバックスラッシュ", None));
            };
            match e {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '"' => out.push('"'),
                _ => out.push(e),
            }
        } else {
            out.push(ch);
        }
    }
    Ok(out)
}

/// プログラム全体を解析する。根は常に `Program` ノード。
pub fn parse_program(src: &str) -> Result<AstNode, ParseError> {
    Parser::new(src)?.parse_program()
}

/// 単一の式を解析する。余分なトークンが残ればエラー。
pub fn parse_expr(src: &str) -> Result<AstNode, ParseError> {
    let mut p = Parser::new(src)?;
    let e = p.parse_expr()?;
    if !p.at(TokenKind::EOF) {
        return Err(p.error("PAR090", "余分なトークンが残っています"));
    }
    Ok(e)
}

/// 型注釈だけを解析する（設定ファイルの型名などに使う）。余分なトークンが残ればエラー。
pub fn parse_type_expr(src: &str) -> Result<TypeExpr, ParseError> {
    let mut p = Parser::new(src)?;
    let t = p.parse_type()?;
    if !p.at(TokenKind::EOF) {
        return Err(p.error("PAR090", "余分なトークンが残っています"));
    }
    Ok(t)
}
