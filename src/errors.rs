// パス: src/errors.rs
// 役割: 字句・構文・型エラーと診断レポートの共通表現を定義する
// 意図: コード付きエラー形式と、ソース文脈つきの診断出力を一か所にまとめる
// 関連ファイル: src/parser/mod.rs, src/infer.rs, src/lib.rs
//! エラー型の定義（共通フォーマット: \[CODE\] メッセージ @line:col / @pos）。
//!
//! - `ErrorInfo` はコード・位置・スニペットを保持する最小単位。
//! - `Diagnostic` はモジュール名とカテゴリを持ち、パイプライン全体で収集される。
//! - 致命的かどうかは呼び出し側（`compile` や CLI）が判断する。

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub msg: String,
    pub pos: Option<usize>,      // バイトオフセット（任意）
    pub line: Option<usize>,     // 1-origin（任意）
    pub col: Option<usize>,      // 1-origin（任意）
    pub snippet: Option<String>, // エラー行のスニペット（任意）
}

impl ErrorInfo {
    pub fn new(code: &'static str, msg: impl Into<String>, pos: Option<usize>) -> Self {
        Self {
            code,
            msg: msg.into(),
            pos,
            line: None,
            col: None,
            snippet: None,
        }
    }
    pub fn at(
        code: &'static str,
        msg: impl Into<String>,
        pos: Option<usize>,
        line: Option<usize>,
        col: Option<usize>,
    ) -> Self {
        Self {
            code,
            msg: msg.into(),
            pos,
            line,
            col,
            snippet: None,
        }
    }
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (self.line, self.col, self.pos) {
            (Some(l), Some(c), Some(p)) => write!(
                f,
                "[{}] {} @line={},col={} @pos={}",
                self.code, self.msg, l, c, p
            )?,
            (Some(l), Some(c), None) => {
                write!(f, "[{}] {} @line={},col={}", self.code, self.msg, l, c)?
            }
            (_, _, Some(p)) => write!(f, "[{}] {} @pos={}", self.code, self.msg, p)?,
            _ => write!(f, "[{}] {}", self.code, self.msg)?,
        }
        if let (Some(s), Some(c)) = (&self.snippet, self.col) {
            let caret = if c > 1 {
                " ".repeat(c - 1) + "^"
            } else {
                "^".to_string()
            };
            write!(f, "\n{}\n{}", s, caret)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerError(pub ErrorInfo);
impl LexerError {
    pub fn at_with_snippet(
        code: &'static str,
        msg: impl Into<String>,
        pos: Option<usize>,
        line: Option<usize>,
        col: Option<usize>,
        snippet: impl Into<String>,
    ) -> Self {
        Self(ErrorInfo::at(code, msg, pos, line, col).with_snippet(snippet))
    }
}

/// 構文エラー。`rules` は失敗時に解析中だった文法規則（外側から順）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub info: ErrorInfo,
    pub rules: Vec<&'static str>,
}

impl ParseError {
    pub fn new(code: &'static str, msg: impl Into<String>, pos: Option<usize>) -> Self {
        Self {
            info: ErrorInfo::new(code, msg, pos),
            rules: Vec::new(),
        }
    }
    pub fn at(
        code: &'static str,
        msg: impl Into<String>,
        pos: Option<usize>,
        line: Option<usize>,
        col: Option<usize>,
    ) -> Self {
        Self {
            info: ErrorInfo::at(code, msg, pos, line, col),
            rules: Vec::new(),
        }
    }
    pub fn with_rules(mut self, rules: &[&'static str]) -> Self {
        self.rules = rules.to_vec();
        self
    }
    pub fn code(&self) -> &'static str {
        self.info.code
    }
}

impl From<LexerError> for ParseError {
    fn from(err: LexerError) -> Self {
        let mut info = err.0;
        info.msg = format!("lex error: [{}] {}", info.code, info.msg);
        info.code = "PAR100";
        Self {
            info,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError(pub ErrorInfo);
impl TypeError {
    pub fn at(
        code: &'static str,
        msg: impl Into<String>,
        line: usize,
        col: usize,
    ) -> Self {
        Self(ErrorInfo::at(code, msg, None, Some(line), Some(col)))
    }
    pub fn code(&self) -> &'static str {
        self.0.code
    }
    /// 未解決シンボル由来のエラーかどうか。
    pub fn category(&self) -> ErrorCategory {
        match self.0.code {
            "TYPE010" => ErrorCategory::Undefined,
            "TYPE030" => ErrorCategory::Name,
            _ => ErrorCategory::Type,
        }
    }
}

impl Display for LexerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
impl StdError for LexerError {}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.info, f)?;
        if !self.rules.is_empty() {
            write!(f, "\n  while parsing: {}", self.rules.join(" > "))?;
        }
        Ok(())
    }
}
impl StdError for ParseError {}

impl Display for TypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}
impl StdError for TypeError {}

/// 診断カテゴリ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Semantic,
    Type,
    Name,
    Memory,
    Io,
    Limit,
    Undefined,
    Runtime,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Semantic => "semantic",
            ErrorCategory::Type => "type",
            ErrorCategory::Name => "name",
            ErrorCategory::Memory => "memory",
            ErrorCategory::Io => "io",
            ErrorCategory::Limit => "limit",
            ErrorCategory::Undefined => "undefined",
            ErrorCategory::Runtime => "runtime",
        }
    }

    /// 処理を打ち切るべきカテゴリか。
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorCategory::Syntax | ErrorCategory::Memory)
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// パイプライン全体で収集される構造化診断。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub module: String,
    pub line: usize,
    pub column: usize,
    pub message: String,
    pub category: ErrorCategory,
}

/// 表示する文脈行数（エラー行を含む）。
const CONTEXT_LINES: usize = 3;

impl Diagnostic {
    pub fn new(
        module: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Self {
            module: module.into(),
            line,
            column,
            message: message.into(),
            category,
        }
    }

    pub fn from_parse_error(module: &str, err: &ParseError) -> Self {
        let mut message = format!("[{}] {}", err.info.code, err.info.msg);
        if !err.rules.is_empty() {
            message.push_str(&format!(" (while parsing: {})", err.rules.join(" > ")));
        }
        Self::new(
            module,
            err.info.line.unwrap_or(0),
            err.info.col.unwrap_or(0),
            message,
            ErrorCategory::Syntax,
        )
    }

    pub fn from_type_error(module: &str, err: &TypeError) -> Self {
        Self::new(
            module,
            err.0.line.unwrap_or(0),
            err.0.col.unwrap_or(0),
            format!("[{}] {}", err.0.code, err.0.msg),
            err.category(),
        )
    }

    /// `module:line:col: category: message` に続けて最大 3 行の文脈とキャレットを描画する。
    pub fn render(&self, source: &str) -> String {
        let mut out = format!(
            "{}:{}:{}: {}: {}",
            self.module, self.line, self.column, self.category, self.message
        );
        if self.line == 0 {
            return out;
        }
        let lines: Vec<&str> = source.lines().collect();
        if self.line > lines.len() {
            return out;
        }
        let first = self.line.saturating_sub(CONTEXT_LINES - 1).max(1);
        let width = self.line.to_string().len();
        for n in first..=self.line {
            out.push_str(&format!("\n{:>width$} | {}", n, lines[n - 1], width = width));
        }
        let pad = " ".repeat(width) + " | " + &" ".repeat(self.column.saturating_sub(1));
        out.push_str(&format!("\n{}^", pad));
        out
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.module, self.line, self.column, self.category, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 文脈行とキャレットの位置を確認する。
    fn diagnostic_render_shows_context_and_caret() {
        let src = "a = 1\nb = 2\nc = a +\nd = 4";
        let d = Diagnostic::new("main", 3, 7, "式が必要です", ErrorCategory::Syntax);
        let rendered = d.render(src);
        let expected = "main:3:7: syntax: 式が必要です\n1 | a = 1\n2 | b = 2\n3 | c = a +\n  |       ^";
        assert_eq!(rendered, expected);
    }

    #[test]
    /// 先頭行のエラーでは存在する行だけを表示する。
    fn diagnostic_render_clamps_to_first_line() {
        let d = Diagnostic::new("m", 1, 1, "oops", ErrorCategory::Type);
        assert_eq!(d.render("x\ny"), "m:1:1: type: oops\n1 | x\n  | ^");
    }

    #[test]
    fn parse_error_lists_rule_stack() {
        let err = ParseError::at("PAR001", "msg", None, Some(2), Some(3))
            .with_rules(&["program", "func", "expression"]);
        assert_eq!(
            err.to_string(),
            "[PAR001] msg @line=2,col=3\n  while parsing: program > func > expression"
        );
    }
}
