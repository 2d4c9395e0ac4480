// パス: src/codegen/mod.rs
// 役割: コード生成バックエンド共通のトレイト・設定・エラー型を定義し、各バックエンドを束ねる
// 意図: 出力先言語を差し替えられるよう、AST から文字列への変換を 1 つのトレイトに閉じ込める
// 関連ファイル: src/codegen/c.rs, src/lib.rs

pub mod c;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::AstNode;

pub use c::CEmitter;

/// コード生成の設定。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitConfig {
    /// 未対応の構文をエラーにせず、コメントのプレースホルダとして出力する。
    pub allow_unsupported: bool,
}

/// コード生成で発生しうるエラー種別。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("[EMIT001] コード生成の根は Program でなければなりません")]
    NotAProgram,
    #[error("[EMIT010] バックエンド未対応: {what} (line {line})")]
    Unsupported { what: String, line: usize },
    #[error("[EMIT020] 型 {ty} を出力できません: {context} (line {line})")]
    UnrepresentableType {
        ty: String,
        context: String,
        line: usize,
    },
}

impl EmitError {
    pub fn unsupported(what: impl Into<String>, line: usize) -> Self {
        Self::Unsupported {
            what: what.into(),
            line,
        }
    }
}

/// コード生成の結果を表す型。
pub type EmitResult<T> = Result<T, EmitError>;

/// AST プログラムを目的言語のソース文字列へ変換するバックエンド。
pub trait Emitter {
    fn emit(&mut self, program: &AstNode) -> EmitResult<String>;
}
