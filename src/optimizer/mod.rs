// パス: src/optimizer/mod.rs
// 役割: AST 書き換えパス群の設定・統計・駆動ループを提供する
// 意図: 各パスを独立に切り替えられるようにし、不動点まで繰り返し適用する
// 関連ファイル: src/optimizer/fold.rs, src/optimizer/propagate.rs, src/optimizer/cse.rs
//! 最適化モジュール
//!
//! - パスの適用順は 畳み込み → 冗長代入除去 → 到達不能コード除去 → 定数伝播 → 共通部分式除去。
//! - 各パスは変更数を返し、0 になるまで（`max_iterations` を上限に）繰り返す。
//! - いずれかのパスが木を変えた間は、パス列全体を再実行する。
//! - パスは失敗しない。解析できない形は変更せずに残す。

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ast::AstNode;

mod cse;
mod dce;
mod fold;
mod propagate;
mod redundant;
mod scope;

pub use cse::{eliminate_common_subexpressions, structural_hash, structurally_equal};
pub use dce::eliminate_dead_code;
pub use fold::fold_constants;
pub use propagate::propagate_constants;
pub use redundant::remove_redundant;
pub use scope::{Symbol, SymbolTable};

/// 最適化レベル。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptLevel {
    O0,
    O1,
    #[default]
    O2,
}

impl OptLevel {
    /// `-O N` の数値から変換する（3 以上は O2 扱い）。
    pub fn from_number(n: u8) -> Self {
        match n {
            0 => OptLevel::O0,
            1 => OptLevel::O1,
            _ => OptLevel::O2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub level: OptLevel,
    pub constant_folding: bool,
    pub redundant_removal: bool,
    pub dead_code_elimination: bool,
    pub constant_propagation: bool,
    pub common_subexpression_elimination: bool,
    /// 不動点反復の上限。
    pub max_iterations: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            level: OptLevel::default(),
            constant_folding: true,
            redundant_removal: true,
            dead_code_elimination: true,
            constant_propagation: true,
            common_subexpression_elimination: true,
            max_iterations: 8,
        }
    }
}

impl OptimizerConfig {
    pub fn with_level(level: OptLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// レベルと個別スイッチの両方が許すときだけパスを有効にする。
    pub fn enabled(&self, pass: Pass) -> bool {
        let by_level = match pass {
            Pass::Fold | Pass::Redundant | Pass::Propagate => self.level >= OptLevel::O1,
            Pass::DeadCode | Pass::Cse => self.level >= OptLevel::O2,
        };
        let toggle = match pass {
            Pass::Fold => self.constant_folding,
            Pass::Redundant => self.redundant_removal,
            Pass::DeadCode => self.dead_code_elimination,
            Pass::Propagate => self.constant_propagation,
            Pass::Cse => self.common_subexpression_elimination,
        };
        by_level && toggle
    }
}

/// 個々の最適化パス。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Fold,
    Redundant,
    DeadCode,
    Propagate,
    Cse,
}

impl Pass {
    pub const ORDER: [Pass; 5] = [
        Pass::Fold,
        Pass::Redundant,
        Pass::DeadCode,
        Pass::Propagate,
        Pass::Cse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Pass::Fold => "constant-folding",
            Pass::Redundant => "redundant-removal",
            Pass::DeadCode => "dead-code-elimination",
            Pass::Propagate => "constant-propagation",
            Pass::Cse => "common-subexpression-elimination",
        }
    }
}

/// 最適化 1 回分の統計。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub constant_folding_applied: usize,
    pub redundant_assignments_removed: usize,
    pub dead_code_removed: usize,
    pub constants_propagated: usize,
    pub common_subexpressions_eliminated: usize,
    pub iterations: usize,
}

impl OptimizationStats {
    fn record(&mut self, pass: Pass, n: usize) {
        match pass {
            Pass::Fold => self.constant_folding_applied += n,
            Pass::Redundant => self.redundant_assignments_removed += n,
            Pass::DeadCode => self.dead_code_removed += n,
            Pass::Propagate => self.constants_propagated += n,
            Pass::Cse => self.common_subexpressions_eliminated += n,
        }
    }

    pub fn total_changes(&self) -> usize {
        self.constant_folding_applied
            + self.redundant_assignments_removed
            + self.dead_code_removed
            + self.constants_propagated
            + self.common_subexpressions_eliminated
    }
}

pub struct Optimizer {
    config: OptimizerConfig,
    stats: OptimizationStats,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            stats: OptimizationStats::default(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn stats(&self) -> &OptimizationStats {
        &self.stats
    }

    pub fn into_stats(self) -> OptimizationStats {
        self.stats
    }

    /// 有効なパスを不動点まで適用する。統計はこの最適化器に累積する。
    pub fn optimize(&mut self, program: &mut AstNode) -> &OptimizationStats {
        let limit = self.config.max_iterations.max(1);
        for round in 0..limit {
            let mut changed = false;
            for pass in Pass::ORDER {
                if !self.config.enabled(pass) {
                    continue;
                }
                for _ in 0..limit {
                    let n = run_pass(pass, program);
                    if n == 0 {
                        break;
                    }
                    debug!(pass = pass.name(), changes = n, round, "パス適用");
                    self.stats.record(pass, n);
                    changed = true;
                }
            }
            self.stats.iterations += 1;
            if !changed {
                break;
            }
        }
        info!(
            iterations = self.stats.iterations,
            changes = self.stats.total_changes(),
            "最適化完了"
        );
        &self.stats
    }
}

fn run_pass(pass: Pass, program: &mut AstNode) -> usize {
    match pass {
        Pass::Fold => fold_constants(program),
        Pass::Redundant => remove_redundant(program),
        Pass::DeadCode => eliminate_dead_code(program),
        Pass::Propagate => propagate_constants(program),
        Pass::Cse => eliminate_common_subexpressions(program),
    }
}

/// 既定の設定でプログラムを最適化し、統計を返す。
pub fn optimize(program: &mut AstNode, config: OptimizerConfig) -> OptimizationStats {
    let mut opt = Optimizer::new(config);
    opt.optimize(program);
    opt.into_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    #[test]
    fn levels_gate_passes() {
        let o0 = OptimizerConfig::with_level(OptLevel::O0);
        assert!(Pass::ORDER.iter().all(|p| !o0.enabled(*p)));
        let o1 = OptimizerConfig::with_level(OptLevel::O1);
        assert!(o1.enabled(Pass::Fold) && o1.enabled(Pass::Propagate));
        assert!(!o1.enabled(Pass::DeadCode) && !o1.enabled(Pass::Cse));
        let mut o2 = OptimizerConfig::with_level(OptLevel::O2);
        o2.constant_folding = false;
        assert!(!o2.enabled(Pass::Fold) && o2.enabled(Pass::Cse));
    }

    #[test]
    /// 伝播と畳み込みが交互に効いて不動点に達する。
    fn passes_cooperate_to_fixpoint() {
        let mut p = parse_program("x = 2\ny = x * 3\nprint(y + 1)").unwrap();
        let stats = optimize(&mut p, OptimizerConfig::default());
        assert_eq!(p.to_string(), "x = 2; y = 6; print(7)");
        assert!(stats.constants_propagated >= 2);
        assert!(stats.constant_folding_applied >= 2);
        let again = optimize(&mut p, OptimizerConfig::default());
        assert_eq!(again.total_changes(), 0);
        assert_eq!(again.iterations, 1);
    }

    #[test]
    fn o0_leaves_tree_untouched() {
        let mut p = parse_program("x = 1 + 2").unwrap();
        let stats = optimize(&mut p, OptimizerConfig::with_level(OptLevel::O0));
        assert_eq!(p.to_string(), "x = (1 + 2)");
        assert_eq!(stats.total_changes(), 0);
    }
}
