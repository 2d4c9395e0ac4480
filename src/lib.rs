// パス: src/lib.rs
// 役割: クレートのルート。モジュール配線と、解析から C 出力までのパイプラインを提供する
// 意図: 各段の状態を CompilationContext に集め、グローバル状態なしでコンパイルできるようにする
// 関連ファイル: src/parser/mod.rs, src/weaver/mod.rs, src/infer.rs, src/optimizer/mod.rs, src/codegen/mod.rs
//! Lyn コンパイラ（Rust）ルートモジュール
//!
//! 目的:
//! - Lyn のソースを解析し、アスペクトを織り込み、型を検査し、AST を最適化して C を出力する。
//!
//! 方針:
//! - コメント/ドキュメントは日本語、識別子は英語。
//! - 段の順序は 解析 → 織り込み → 型検査 → 最適化 → 出力。
//! - 解析エラーだけが処理を打ち切る。型エラーと織り込みエラーは診断として残し、先へ進む。
//! - ライブラリはログ購読者を設定しない（`tracing` のマクロを出すだけ）。

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod config;
pub mod errors;
pub mod infer;
pub mod lexer;
pub mod modules;
pub mod optimizer;
pub mod parser;
pub mod typesys;
pub mod weaver;

// 便利な再エクスポート（AST/エラー/パーサは利用側から直接参照可）
pub use crate::ast::*;
pub use crate::errors::*;
pub use crate::parser::*;
pub use crate::config::CompilerConfig;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::codegen::{CEmitter, EmitError, Emitter};
use crate::config::ConfigError;
use crate::optimizer::{OptimizationStats, Optimizer};
use crate::weaver::{Weaver, WeavingStats};

/// パイプライン全体のエラー。
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Emit(#[from] EmitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// 1 回のコンパイルで集めた統計。CLI の `--stats` で出力する。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    pub weaving: WeavingStats,
    pub optimization: OptimizationStats,
    pub type_errors: usize,
    pub diagnostics: usize,
}

/// 1 モジュール分のコンパイル状態（設定・診断・統計）。
#[derive(Debug)]
pub struct CompilationContext {
    pub config: CompilerConfig,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: CompileStats,
}

impl CompilationContext {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            diagnostics: Vec::new(),
            stats: CompileStats::default(),
        }
    }

    fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
        self.stats.diagnostics = self.diagnostics.len();
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// すべての診断をソースの文脈付きで描画する。
    pub fn render_diagnostics(&self, source: &str) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.render(source))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn parse(&mut self, source: &str) -> Result<AstNode, CompileError> {
        match parse_program(source) {
            Ok(program) => Ok(program),
            Err(err) => {
                self.push(Diagnostic::from_parse_error(&self.config.module_name, &err));
                Err(err.into())
            }
        }
    }

    /// 織り込みと型検査。どちらのエラーも診断として残し、処理は続ける。
    pub fn analyze(&mut self, program: &mut AstNode) -> Result<(), CompileError> {
        if self.config.weave {
            let mut weaver = Weaver::new();
            if let Err(err) = weaver.weave(program) {
                warn!("{err}");
                self.push(Diagnostic::new(
                    self.config.module_name.clone(),
                    0,
                    0,
                    err.to_string(),
                    ErrorCategory::Semantic,
                ));
            }
            self.stats.weaving = weaver.into_stats();
        }
        if self.config.typecheck {
            let resolver = self.config.resolver()?;
            let errors = infer::check_program(program, &resolver);
            self.stats.type_errors = errors.len();
            for err in &errors {
                self.push(Diagnostic::from_type_error(&self.config.module_name, err));
            }
        }
        Ok(())
    }

    pub fn optimize(&mut self, program: &mut AstNode) {
        let mut optimizer = Optimizer::new(self.config.optimizer.clone());
        optimizer.optimize(program);
        self.stats.optimization = optimizer.into_stats();
    }

    pub fn emit(&mut self, program: &AstNode) -> Result<String, CompileError> {
        let mut emitter =
            CEmitter::new(self.config.emit.clone()).with_module_name(self.config.module_name.clone());
        Ok(emitter.emit(program)?)
    }
}

/// `compile` の成果物。
#[derive(Debug)]
pub struct CompileOutput {
    pub program: AstNode,
    pub c_source: String,
    pub context: CompilationContext,
}

/// ソースを解析・織り込み・型検査・最適化し、C ソースを生成する。
pub fn compile(source: &str, config: &CompilerConfig) -> Result<CompileOutput, CompileError> {
    let mut context = CompilationContext::new(config.clone());
    let mut program = context.parse(source)?;
    context.analyze(&mut program)?;
    context.optimize(&mut program);
    let c_source = context.emit(&program)?;
    info!(
        module = %context.config.module_name,
        diagnostics = context.diagnostics.len(),
        bytes = c_source.len(),
        "コンパイル完了"
    );
    Ok(CompileOutput {
        program,
        c_source,
        context,
    })
}
