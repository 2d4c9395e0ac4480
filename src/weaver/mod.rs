// パス: src/weaver/mod.rs
// 役割: アスペクト定義のアドバイスを、ポイントカットに一致する関数本体へ織り込む
// 意図: 収集と適用の 2 段に分け、アスペクトは複製スナップショットとして保持する
// 関連ファイル: src/weaver/pointcut.rs, src/ast.rs, src/lib.rs
//! アスペクト織り込みモジュール
//!
//! - 状態: `Init → Collect → (Done | MatchApply → Done)`、`Error` は終端。
//! - 収集段で `AspectDef` を複製して保持するため、適用段は木への参照を持ち越さない。
//! - `before` と `around` は本体の先頭へ、`after` は末尾へ、アドバイスの文をそのまま差し込む。
//! - 失敗はアドバイス単位で局所化する。根が `Program` でない場合だけ処理全体を中断する。

pub mod pointcut;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ast::{AdviceKind, AstNode, NodeKind, NodeTag};

/// 織り込み 1 回分の状態。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WeaverState {
    Init,
    Collect,
    MatchApply,
    Done,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WeavingStats {
    /// ポイントカットが関数名に一致した回数（アドバイスが 0 件でも数える）。
    pub joinpoints_found: usize,
    pub advice_applied: usize,
    pub errors: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WeaveError {
    #[error("[WEAVE001] 織り込みの根は Program でなければなりません（{0:?}）")]
    NotAProgram(NodeTag),
    #[error("[WEAVE010] 織り込み中に {count} 件のエラー（最後: {last}）")]
    Failed { count: usize, last: String },
}

#[derive(Clone, Debug)]
struct AdviceSnapshot {
    kind: AdviceKind,
    pointcut: String,
    body: Vec<AstNode>,
}

#[derive(Clone, Debug)]
struct AspectSnapshot {
    name: String,
    pointcuts: Vec<(String, String)>,
    advices: Vec<AdviceSnapshot>,
}

#[derive(Debug)]
pub struct Weaver {
    state: WeaverState,
    stats: WeavingStats,
    aspects: Vec<AspectSnapshot>,
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new()
    }
}

impl Weaver {
    pub fn new() -> Self {
        Self {
            state: WeaverState::Init,
            stats: WeavingStats::default(),
            aspects: Vec::new(),
        }
    }

    pub fn state(&self) -> WeaverState {
        self.state
    }

    pub fn stats(&self) -> &WeavingStats {
        &self.stats
    }

    pub fn into_stats(self) -> WeavingStats {
        self.stats
    }

    /// 収集したアスペクトの数。
    pub fn aspect_count(&self) -> usize {
        self.aspects.len()
    }

    fn record_error(&mut self, msg: String) {
        warn!("{msg}");
        self.stats.errors += 1;
        self.stats.last_error = Some(msg);
    }

    /// プログラムへアドバイスを織り込む。
    ///
    /// エラーが 1 件でもあれば `Err` を返すが、木はそれまでに織り込んだ状態で残る。
    /// 統計は実行ごとに初期化される。
    pub fn weave(&mut self, program: &mut AstNode) -> Result<&WeavingStats, WeaveError> {
        self.state = WeaverState::Init;
        self.stats = WeavingStats::default();
        if program.tag() != NodeTag::Program {
            let err = WeaveError::NotAProgram(program.tag());
            self.record_error(err.to_string());
            self.state = WeaverState::Error;
            return Err(err);
        }

        self.state = WeaverState::Collect;
        self.aspects.clear();
        self.collect(program);
        debug!(aspects = self.aspects.len(), "アスペクト収集完了");

        if !self.aspects.is_empty() {
            self.state = WeaverState::MatchApply;
            self.apply(program);
        }
        self.state = WeaverState::Done;
        info!(
            joinpoints = self.stats.joinpoints_found,
            applied = self.stats.advice_applied,
            errors = self.stats.errors,
            "織り込み完了"
        );
        match &self.stats.last_error {
            Some(last) if self.stats.errors > 0 => Err(WeaveError::Failed {
                count: self.stats.errors,
                last: last.clone(),
            }),
            _ => Ok(&self.stats),
        }
    }

    fn collect(&mut self, node: &AstNode) {
        if let NodeKind::AspectDef {
            name,
            pointcuts,
            advices,
        } = &node.kind
        {
            let snapshot = self.snapshot(name, pointcuts, advices);
            self.aspects.push(snapshot);
            return;
        }
        for child in node.children() {
            self.collect(child);
        }
    }

    /// アスペクト定義を複製する。未知のポイントカットを指すアドバイスはここで除外する。
    fn snapshot(&mut self, name: &str, pointcuts: &[AstNode], advices: &[AstNode]) -> AspectSnapshot {
        let pointcuts: Vec<(String, String)> = pointcuts
            .iter()
            .filter_map(|p| match &p.kind {
                NodeKind::Pointcut { name, pattern } => Some((name.clone(), pattern.clone())),
                _ => None,
            })
            .collect();
        let mut kept = Vec::new();
        for advice in advices {
            let NodeKind::Advice {
                kind,
                pointcut,
                body,
            } = &advice.kind
            else {
                continue;
            };
            if !pointcuts.iter().any(|(pc, _)| pc == pointcut) {
                self.record_error(format!(
                    "アスペクト {name} のアドバイス（{} {pointcut}, {}行目）は未定義のポイントカットを参照しています",
                    kind.keyword(),
                    advice.line
                ));
                continue;
            }
            kept.push(AdviceSnapshot {
                kind: *kind,
                pointcut: pointcut.clone(),
                body: body.clone(),
            });
        }
        AspectSnapshot {
            name: name.to_string(),
            pointcuts,
            advices: kept,
        }
    }

    /// 子を先に処理してから、自身が関数なら織り込む。アスペクト定義の中には入らない。
    fn apply(&mut self, node: &mut AstNode) {
        if node.tag() == NodeTag::AspectDef {
            return;
        }
        for child in node.children_mut() {
            self.apply(child);
        }
        if let NodeKind::FunctionDef { name, body, .. } = &mut node.kind {
            weave_function(&self.aspects, &mut self.stats, name, body);
        }
    }
}

fn weave_function(
    aspects: &[AspectSnapshot],
    stats: &mut WeavingStats,
    name: &str,
    body: &mut Vec<AstNode>,
) {
    for aspect in aspects {
        for (pc_name, pattern) in &aspect.pointcuts {
            if !pointcut::matches(pattern, name) {
                continue;
            }
            stats.joinpoints_found += 1;
            debug!(aspect = %aspect.name, pointcut = %pc_name, function = name, "ジョインポイント");
            for advice in aspect.advices.iter().filter(|a| &a.pointcut == pc_name) {
                let statements = advice.body.iter().cloned();
                match advice.kind {
                    AdviceKind::Before | AdviceKind::Around => {
                        body.splice(0..0, statements);
                    }
                    AdviceKind::After => body.extend(statements),
                }
                stats.advice_applied += 1;
            }
        }
    }
}

/// 新しい織り込み器で 1 回織り込み、統計と結果を返す。
pub fn weave(program: &mut AstNode) -> (WeavingStats, Result<(), WeaveError>) {
    let mut weaver = Weaver::new();
    let result = weaver.weave(program).map(|_| ());
    (weaver.into_stats(), result)
}
