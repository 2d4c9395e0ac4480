// パス: src/bin/lync.rs
// 役割: Lyn コンパイラのコマンドラインエントリポイント
// 意図: parse / check / build の 3 段を 1 つの実行ファイルから呼べるようにする
// 関連ファイル: src/lib.rs, src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use lyn::optimizer::OptLevel;
use lyn::{CompilationContext, CompileError, CompilerConfig};

#[derive(Parser, Debug)]
#[command(name = "lync", version, about = "Lyn compiler front-end")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// ログレベル（RUST_LOG より優先）
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 解析して AST を表示する
    Parse(CommonArgs),
    /// 織り込みと型検査まで行い、診断を表示する
    Check(CommonArgs),
    /// 最適化して C ソースを出力する
    Build {
        #[command(flatten)]
        common: CommonArgs,
        /// 出力先（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// 入力ファイル
    file: PathBuf,
    /// 設定ファイル（TOML）
    #[arg(long)]
    config: Option<PathBuf>,
    /// 最適化レベル（0-3、3 以上は O2 と同じ）
    #[arg(short = 'O', value_parser = clap::value_parser!(u8).range(0..=3))]
    opt_level: Option<u8>,
    #[arg(long)]
    no_fold: bool,
    #[arg(long)]
    no_dce: bool,
    #[arg(long)]
    no_propagate: bool,
    #[arg(long)]
    no_cse: bool,
    #[arg(long)]
    no_weave: bool,
    /// 統計を標準エラーへ出力する
    #[arg(long, value_enum)]
    stats: Option<StatsFormat>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatsFormat {
    Json,
    Text,
}

impl CommonArgs {
    /// 設定ファイルを読み、フラグで上書きする。
    fn config(&self) -> Result<CompilerConfig, CompileError> {
        let mut cfg = match &self.config {
            Some(path) => CompilerConfig::load(path)?,
            None => CompilerConfig::default(),
        };
        if cfg.module_name == "main" {
            if let Some(stem) = self.file.file_stem().and_then(|s| s.to_str()) {
                cfg.module_name = stem.to_string();
            }
        }
        if let Some(n) = self.opt_level {
            cfg.optimizer.level = OptLevel::from_number(n);
        }
        let opt = &mut cfg.optimizer;
        opt.constant_folding &= !self.no_fold;
        opt.dead_code_elimination &= !self.no_dce;
        opt.constant_propagation &= !self.no_propagate;
        opt.common_subexpression_elimination &= !self.no_cse;
        cfg.weave &= !self.no_weave;
        Ok(cfg)
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_source(path: &Path) -> Result<String, CompileError> {
    Ok(fs::read_to_string(path)?)
}

fn print_stats(ctx: &CompilationContext, format: Option<StatsFormat>) {
    match format {
        Some(StatsFormat::Json) => match serde_json::to_string_pretty(&ctx.stats) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => eprintln!("stats: {e}"),
        },
        Some(StatsFormat::Text) => {
            let w = &ctx.stats.weaving;
            let o = &ctx.stats.optimization;
            eprintln!(
                "weaving: joinpoints={} advice={} errors={}",
                w.joinpoints_found, w.advice_applied, w.errors
            );
            eprintln!(
                "optimizer: folded={} redundant={} dead={} propagated={} cse={} iterations={}",
                o.constant_folding_applied,
                o.redundant_assignments_removed,
                o.dead_code_removed,
                o.constants_propagated,
                o.common_subexpressions_eliminated,
                o.iterations
            );
            eprintln!(
                "diagnostics: {} (type errors {})",
                ctx.stats.diagnostics, ctx.stats.type_errors
            );
        }
        None => {}
    }
}

/// 成功なら `Ok(true)`、診断が残れば `Ok(false)`。
fn run(command: &Command) -> Result<bool, (CompileError, Option<(String, CompilationContext)>)> {
    let (common, output) = match command {
        Command::Parse(c) | Command::Check(c) => (c, None),
        Command::Build { common, output } => (common, output.as_ref()),
    };
    let config = common.config().map_err(|e| (e, None))?;
    let source = read_source(&common.file).map_err(|e| (e, None))?;
    let mut ctx = CompilationContext::new(config);
    let mut program = match ctx.parse(&source) {
        Ok(p) => p,
        Err(e) => return Err((e, Some((source, ctx)))),
    };
    if let Command::Parse(_) = command {
        print!("{}", program.dump());
        return Ok(true);
    }
    if let Err(e) = ctx.analyze(&mut program) {
        return Err((e, Some((source, ctx))));
    }
    let ok = !ctx.has_errors();
    if ctx.has_errors() {
        eprintln!("{}", ctx.render_diagnostics(&source));
    }
    if let Command::Build { .. } = command {
        ctx.optimize(&mut program);
        let c = match ctx.emit(&program) {
            Ok(c) => c,
            Err(e) => return Err((e, Some((source, ctx)))),
        };
        match output {
            Some(path) => {
                if let Err(e) = fs::write(path, c) {
                    return Err((e.into(), Some((source, ctx))));
                }
            }
            None => print!("{c}"),
        }
    }
    print_stats(&ctx, common.stats);
    Ok(ok)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    match run(&cli.command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err((err, ctx)) => {
            match ctx {
                Some((source, ctx)) if ctx.has_errors() => {
                    eprintln!("{}", ctx.render_diagnostics(&source))
                }
                _ => eprintln!("error: {err}"),
            }
            ExitCode::from(1)
        }
    }
}
