// パス: src/lexer.rs
// 役割: Lyn ソースを要求駆動でトークン化する字句解析器を提供する
// 意図: パーサの投機的先読みのために状態の保存・復元を正確に行えるようにする
// 関連ファイル: src/parser/mod.rs, src/errors.rs, tests/lexer_parser.rs
//! 字句解析モジュール
//!
//! - `Lexer::next_token` で 1 トークンずつ取り出すプル型のインタフェース。
//! - `save_state` / `restore_state` は位置・行・列のみを保持し、副作用を持たない。
//! - すべてのトークンに行・列・バイト位置を記録し、診断情報と連携させる。

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::errors::LexerError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// 生成されたトークンとその位置情報を保持するレコード。
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: usize,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// 字句解析で識別されるトークンの分類。
pub enum TokenKind {
    EOF,
    // 演算子・記号トークン
    ARROW,    // `->`
    FATARROW, // `=>`
    COMPOSE,  // `>>`
    LE,
    GE,
    EQ,
    NE,
    LT,
    GT,
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    BANG,
    LPAREN,
    RPAREN,
    LBRACK,
    RBRACK,
    COMMA,
    COLON,
    SEMI,
    DOT,
    EQUAL,
    UNDERSCORE,
    // リテラル分類
    NUMBER,
    STRING,
    IDENT,
    // キーワード分類
    FUNC,
    END,
    CLASS,
    IF,
    ELSE,
    WHILE,
    DO,
    FOR,
    IN,
    RETURN,
    BREAK,
    CONTINUE,
    IMPORT,
    MODULE,
    ASPECT,
    POINTCUT,
    BEFORE,
    AFTER,
    AROUND,
    MATCH,
    CASE,
    TRUE,
    FALSE,
    NULL,
}

/// キーワード表。内容は不変なのでプロセス全体で共有する。
static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("func", TokenKind::FUNC),
        ("end", TokenKind::END),
        ("class", TokenKind::CLASS),
        ("if", TokenKind::IF),
        ("else", TokenKind::ELSE),
        ("while", TokenKind::WHILE),
        ("do", TokenKind::DO),
        ("for", TokenKind::FOR),
        ("in", TokenKind::IN),
        ("return", TokenKind::RETURN),
        ("break", TokenKind::BREAK),
        ("continue", TokenKind::CONTINUE),
        ("import", TokenKind::IMPORT),
        ("module", TokenKind::MODULE),
        ("aspect", TokenKind::ASPECT),
        ("pointcut", TokenKind::POINTCUT),
        ("before", TokenKind::BEFORE),
        ("after", TokenKind::AFTER),
        ("around", TokenKind::AROUND),
        ("match", TokenKind::MATCH),
        ("case", TokenKind::CASE),
        ("true", TokenKind::TRUE),
        ("false", TokenKind::FALSE),
        ("null", TokenKind::NULL),
    ])
});

/// 予約語かどうかを判定する。
pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains_key(word)
}

#[derive(Debug)]
/// 行頭オフセットを事前計算し、行・列情報を素早く算出するヘルパ。
struct LineMap {
    starts: Vec<usize>,
}

impl LineMap {
    /// 入力全体を 1 度だけ走査して行頭インデックスを収集する。
    fn new(src: &str) -> Self {
        let mut starts = vec![0];
        for (idx, ch) in src.char_indices() {
            if ch == '\n' {
                starts.push(idx + 1);
            }
        }
        Self { starts }
    }

    /// 指定行に対応するテキスト断片を返す（改行は除去する）。
    fn line_text<'a>(&self, src: &'a str, line: usize) -> &'a str {
        if line == 0 || line > self.starts.len() {
            return "";
        }
        let start = self.starts[line - 1];
        let end = self.starts.get(line).copied().unwrap_or(src.len());
        let slice = &src[start..end];
        let slice = slice.strip_suffix('\n').unwrap_or(slice);
        slice.strip_suffix('\r').unwrap_or(slice)
    }
}

/// 字句解析器の位置スナップショット。中身は不透明として扱う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerState {
    pos: usize,
    line: usize,
    col: usize,
}

/// 空白文字かどうかを判定するユーティリティ。
fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}
/// 識別子の先頭に使用可能な文字かどうかを判定する。
fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}
/// 識別子の後続として許容される文字か判定する。
fn is_ident_rest(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub struct Lexer<'a> {
    src: &'a str,
    cursor: usize,
    line: usize,
    col: usize,
    line_map: LineMap,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            cursor: 0,
            line: 1,
            col: 1,
            line_map: LineMap::new(src),
        }
    }

    /// 現在位置のスナップショットを取る。
    pub fn save_state(&self) -> LexerState {
        LexerState {
            pos: self.cursor,
            line: self.line,
            col: self.col,
        }
    }

    /// `save_state` で得た位置へ正確に巻き戻す。
    pub fn restore_state(&mut self, state: LexerState) {
        self.cursor = state.pos;
        self.line = state.line;
        self.col = state.col;
    }

    /// 指定行のソース文字列（診断用）。
    pub fn line_text(&self, line: usize) -> &'a str {
        self.line_map.line_text(self.src, line)
    }

    /// 次のトークンを返す。入力末尾では `EOF` を返し続ける。
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_trivia()?;
        let Some(ch) = self.peek_char() else {
            return Ok(self.make(TokenKind::EOF, String::new(), self.save_state()));
        };
        let start = self.save_state();
        if let Some(tok) = self.try_symbol(ch, start) {
            return Ok(tok);
        }
        if ch == '"' {
            return self.lex_string(start);
        }
        if ch.is_ascii_digit() {
            return Ok(self.lex_number(start));
        }
        if is_letter(ch) {
            return Ok(self.lex_identifier_or_keyword(start));
        }
        Err(self.err("LEX090", format!("字句解析に失敗: {:?}", ch), start))
    }

    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        loop {
            while let Some(ch) = self.peek_char() {
                if is_whitespace(ch) {
                    self.advance_char();
                } else {
                    break;
                }
            }
            if self.starts_with("//") {
                while let Some(ch) = self.peek_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance_char();
                }
                continue;
            }
            if self.starts_with("/*") {
                let start = self.save_state();
                self.advance_char();
                self.advance_char();
                loop {
                    if self.starts_with("*/") {
                        self.advance_char();
                        self.advance_char();
                        break;
                    }
                    if self.advance_char().is_none() {
                        return Err(self.err("LEX001", "ブロックコメントが閉じていません", start));
                    }
                }
                continue;
            }
            return Ok(());
        }
    }

    fn try_symbol(&mut self, first: char, start: LexerState) -> Option<Token> {
        let second = self.peek_second_char();
        let double = match (first, second) {
            ('-', Some('>')) => Some(TokenKind::ARROW),
            ('=', Some('>')) => Some(TokenKind::FATARROW),
            ('>', Some('>')) => Some(TokenKind::COMPOSE),
            ('<', Some('=')) => Some(TokenKind::LE),
            ('>', Some('=')) => Some(TokenKind::GE),
            ('=', Some('=')) => Some(TokenKind::EQ),
            ('!', Some('=')) => Some(TokenKind::NE),
            _ => None,
        };
        if let Some(kind) = double {
            self.advance_char();
            self.advance_char();
            return Some(self.make(kind, self.src[start.pos..self.cursor].to_string(), start));
        }
        let single = match first {
            '<' => TokenKind::LT,
            '>' => TokenKind::GT,
            '+' => TokenKind::PLUS,
            '-' => TokenKind::MINUS,
            '*' => TokenKind::STAR,
            '/' => TokenKind::SLASH,
            '%' => TokenKind::PERCENT,
            '!' => TokenKind::BANG,
            '(' => TokenKind::LPAREN,
            ')' => TokenKind::RPAREN,
            '[' => TokenKind::LBRACK,
            ']' => TokenKind::RBRACK,
            ',' => TokenKind::COMMA,
            ':' => TokenKind::COLON,
            ';' => TokenKind::SEMI,
            '.' => TokenKind::DOT,
            '=' => TokenKind::EQUAL,
            '_' if !second.map(is_ident_rest).unwrap_or(false) => TokenKind::UNDERSCORE,
            _ => return None,
        };
        self.advance_char();
        Some(self.make(single, first.to_string(), start))
    }

    fn lex_string(&mut self, start: LexerState) -> Result<Token, LexerError> {
        self.advance_char(); // 開始ダブルクォート
        let mut escaped = false;
        let mut ok = false;
        while let Some(ch) = self.peek_char() {
            if ch == '\n' {
                break;
            }
            self.advance_char();
            if escaped {
                escaped = false;
                continue;
            }
            if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                ok = true;
                break;
            }
        }
        if !ok {
            return Err(self.err("LEX003", "文字列リテラルが閉じていません", start));
        }
        let text = self.src[start.pos..self.cursor].to_string();
        Ok(self.make(TokenKind::STRING, text, start))
    }

    fn lex_number(&mut self, start: LexerState) -> Token {
        self.eat_digits();
        if self.peek_char() == Some('.')
            && self.peek_second_char().map(|c| c.is_ascii_digit()) == Some(true)
        {
            self.advance_char(); // '.'
            self.eat_digits();
        }
        if let Some('e') | Some('E') = self.peek_char() {
            let save = self.save_state();
            self.advance_char();
            if let Some('+') | Some('-') = self.peek_char() {
                self.advance_char();
            }
            if self.peek_char().map(|c| c.is_ascii_digit()) == Some(true) {
                self.eat_digits();
            } else {
                self.restore_state(save);
            }
        }
        let text = self.src[start.pos..self.cursor].to_string();
        self.make(TokenKind::NUMBER, text, start)
    }

    fn eat_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn lex_identifier_or_keyword(&mut self, start: LexerState) -> Token {
        self.advance_char();
        while let Some(ch) = self.peek_char() {
            if is_ident_rest(ch) {
                self.advance_char();
            } else {
                break;
            }
        }
        let slice = &self.src[start.pos..self.cursor];
        let kind = KEYWORDS.get(slice).copied().unwrap_or(TokenKind::IDENT);
        self.make(kind, slice.to_string(), start)
    }

    fn make(&self, kind: TokenKind, value: String, start: LexerState) -> Token {
        Token {
            kind,
            value,
            pos: start.pos,
            line: start.line,
            col: start.col,
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.cursor..].chars().next()
    }

    fn peek_second_char(&self) -> Option<char> {
        let mut iter = self.src[self.cursor..].chars();
        iter.next()?;
        iter.next()
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.cursor += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, pattern: &str) -> bool {
        self.src[self.cursor..].starts_with(pattern)
    }

    fn err(&self, code: &'static str, message: impl Into<String>, at: LexerState) -> LexerError {
        LexerError::at_with_snippet(
            code,
            message,
            Some(at.pos),
            Some(at.line),
            Some(at.col),
            self.line_map.line_text(self.src, at.line).to_string(),
        )
    }
}

/// ソース全体をトークン列へ変換する（末尾に `EOF` を含む）。
pub fn lex(src: &str) -> Result<Vec<Token>, LexerError> {
    let mut lexer = Lexer::new(src);
    let mut out = Vec::new();
    loop {
        let tok = lexer.next_token()?;
        let done = tok.kind == TokenKind::EOF;
        out.push(tok);
        if done {
            return Ok(out);
        }
    }
}
