// パス: src/config.rs
// 役割: コンパイラ設定（TOML）の読み込みと既定値
// 意図: CLI フラグとファイルの両方から同じ構造体を組み立て、パイプラインへ渡す
// 関連ファイル: src/lib.rs, src/bin/lync.rs, src/modules.rs
//! コンパイラ設定
//!
//! ```toml
//! module_name = "app"
//! weave = true
//! typecheck = true
//!
//! [optimizer]
//! level = "O1"
//! common_subexpression_elimination = false
//!
//! [emit]
//! allow_unsupported = true
//!
//! [modules.math]
//! pi = "float"
//! sqrt = "(float) -> float"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codegen::EmitConfig;
use crate::modules::{parse_type_name, StaticModules};
use crate::optimizer::OptimizerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("設定ファイル {path} を読めません: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("設定の TOML が不正です: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("[modules.{module}] の {name} の型 `{ty}` を解釈できません")]
    BadType {
        module: String,
        name: String,
        ty: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// 診断と生成コードに表示するモジュール名。
    pub module_name: String,
    pub optimizer: OptimizerConfig,
    pub weave: bool,
    pub typecheck: bool,
    pub emit: EmitConfig,
    /// モジュールのドット区切りパス → 名前 → 型名。
    pub modules: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            module_name: "main".to_string(),
            optimizer: OptimizerConfig::default(),
            weave: true,
            typecheck: true,
            emit: EmitConfig::default(),
            modules: BTreeMap::new(),
        }
    }
}

impl CompilerConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    /// `[modules]` 表から型エンジン用のリゾルバを組み立てる。
    pub fn resolver(&self) -> Result<StaticModules, ConfigError> {
        let mut out = StaticModules::new();
        for (module, names) in &self.modules {
            for (name, ty) in names {
                let parsed = parse_type_name(ty).ok_or_else(|| ConfigError::BadType {
                    module: module.clone(),
                    name: name.clone(),
                    ty: ty.clone(),
                })?;
                out.insert(module.clone(), name.clone(), parsed);
            }
        }
        Ok(out)
    }
}
