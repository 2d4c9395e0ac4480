// パス: src/parser/program.rs
// 役割: 文・宣言・制御構造の構文解析ルーチンを実装する
// 意図: プログラム全体の解析ロジックを式の解析から分離し可読性を高める
// 関連ファイル: src/parser/expr.rs, src/parser/types.rs, src/parser/mod.rs

use super::types::SHORTHAND_TYPES;
use super::*;

/// `return` の直後で式を読み始めてよいトークンか。
fn starts_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::NUMBER
            | TokenKind::STRING
            | TokenKind::TRUE
            | TokenKind::FALSE
            | TokenKind::NULL
            | TokenKind::IDENT
            | TokenKind::LPAREN
            | TokenKind::LBRACK
            | TokenKind::MINUS
            | TokenKind::BANG
    )
}

impl<'a> Parser<'a> {
    pub(super) fn parse_program(&mut self) -> Result<AstNode, ParseError> {
        self.enter("program");
        let (line, col) = (self.peek().line, self.peek().col);
        let mut statements = Vec::new();
        while !self.at(TokenKind::EOF) {
            if self.accept(TokenKind::SEMI)?.is_some() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.leave();
        Ok(AstNode::new(NodeKind::Program { statements }, line, col))
    }

    pub(super) fn parse_statement(&mut self) -> Result<AstNode, ParseError> {
        match self.peek().kind {
            TokenKind::FUNC => self.parse_function(),
            TokenKind::CLASS => self.parse_class(),
            TokenKind::ASPECT => self.parse_aspect(),
            TokenKind::IF => self.parse_if(),
            TokenKind::WHILE => self.parse_while(),
            TokenKind::DO => self.parse_do_while(),
            TokenKind::FOR => self.parse_for(),
            TokenKind::MATCH => self.parse_match(),
            TokenKind::RETURN => self.parse_return(),
            TokenKind::BREAK => {
                let tok = self.advance()?;
                Ok(node_at(NodeKind::Break, &tok))
            }
            TokenKind::CONTINUE => {
                let tok = self.advance()?;
                Ok(node_at(NodeKind::Continue, &tok))
            }
            TokenKind::IMPORT => {
                let tok = self.advance()?;
                let path = self.parse_dotted_path()?;
                Ok(node_at(NodeKind::Import { path }, &tok))
            }
            TokenKind::MODULE => {
                let tok = self.advance()?;
                let path = self.parse_dotted_path()?;
                Ok(node_at(NodeKind::ModuleDecl { path }, &tok))
            }
            TokenKind::IDENT => self.parse_ident_statement(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_dotted_path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut path = vec![self.pop(TokenKind::IDENT)?.value];
        while self.accept(TokenKind::DOT)?.is_some() {
            path.push(self.pop(TokenKind::IDENT)?.value);
        }
        Ok(path)
    }

    /// 識別子で始まる文を 1 トークン先読みで振り分ける。
    fn parse_ident_statement(&mut self) -> Result<AstNode, ParseError> {
        let next = self.peek_next();
        let shorthand = next.as_ref().is_some_and(|t| {
            t.kind == TokenKind::IDENT && SHORTHAND_TYPES.contains(&t.value.as_str())
        });
        match next.map(|t| t.kind) {
            Some(TokenKind::COLON) => {
                self.enter("declaration");
                let name = self.advance()?;
                self.pop(TokenKind::COLON)?;
                let ty = self.parse_type()?;
                let decl = self.finish_declaration(name, ty)?;
                self.leave();
                Ok(decl)
            }
            Some(TokenKind::IDENT) if shorthand => {
                self.enter("declaration");
                let name = self.advance()?;
                let ty = TypeExpr::Named(self.advance()?.value);
                let decl = self.finish_declaration(name, ty)?;
                self.leave();
                Ok(decl)
            }
            Some(TokenKind::EQUAL) => {
                self.enter("assignment");
                let name = self.advance()?;
                self.pop(TokenKind::EQUAL)?;
                let value = self.parse_expr()?;
                self.leave();
                Ok(node_at(
                    NodeKind::Assign {
                        name: name.value.clone(),
                        value: Box::new(value),
                    },
                    &name,
                ))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn finish_declaration(&mut self, name: Token, ty: TypeExpr) -> Result<AstNode, ParseError> {
        let init = match self.accept(TokenKind::EQUAL)? {
            Some(_) => Some(Box::new(self.parse_expr()?)),
            None => None,
        };
        Ok(node_at(
            NodeKind::VarDecl {
                name: name.value.clone(),
                type_expr: Some(ty),
                init,
            },
            &name,
        ))
    }

    /// 式文。直後に `=` があればメンバ代入・添字代入として扱う。
    fn parse_expression_statement(&mut self) -> Result<AstNode, ParseError> {
        let expr = self.parse_expr()?;
        let (line, column) = (expr.line, expr.column);
        if !self.at(TokenKind::EQUAL) {
            return Ok(AstNode::new(
                NodeKind::ExprStmt {
                    expr: Box::new(expr),
                },
                line,
                column,
            ));
        }
        self.enter("assignment");
        let kind = match expr.kind {
            NodeKind::MemberAccess { object, member } => {
                self.advance()?;
                let value = Box::new(self.parse_expr()?);
                NodeKind::MemberAssign {
                    object,
                    member,
                    value,
                }
            }
            NodeKind::Index { target, index } => {
                self.advance()?;
                let value = Box::new(self.parse_expr()?);
                NodeKind::IndexAssign {
                    target,
                    index,
                    value,
                }
            }
            _ => return Err(self.error("PAR040", "代入先として不正な式です")),
        };
        self.leave();
        Ok(AstNode::new(kind, line, column))
    }

    fn parse_function(&mut self) -> Result<AstNode, ParseError> {
        self.enter("function");
        let func = self.pop(TokenKind::FUNC)?;
        let name = self.pop(TokenKind::IDENT)?.value;
        self.pop(TokenKind::LPAREN)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RPAREN) {
            loop {
                let p = self.pop(TokenKind::IDENT)?;
                let type_expr = match self.accept(TokenKind::COLON)? {
                    Some(_) => Some(self.parse_type()?),
                    None => None,
                };
                params.push(node_at(
                    NodeKind::Parameter {
                        name: p.value.clone(),
                        type_expr,
                    },
                    &p,
                ));
                if self.accept(TokenKind::COMMA)?.is_none() {
                    break;
                }
            }
        }
        self.pop(TokenKind::RPAREN)?;
        let return_type = match self.accept(TokenKind::ARROW)? {
            Some(_) => Some(self.parse_type()?),
            None => None,
        };
        let body = self.parse_block_until(&[TokenKind::END])?;
        self.pop(TokenKind::END)?;
        self.leave();
        Ok(node_at(
            NodeKind::FunctionDef {
                name,
                params,
                return_type,
                body,
            },
            &func,
        ))
    }

    fn parse_class(&mut self) -> Result<AstNode, ParseError> {
        self.enter("class");
        let class = self.pop(TokenKind::CLASS)?;
        let name = self.pop(TokenKind::IDENT)?.value;
        let base = match self.accept(TokenKind::COLON)? {
            Some(_) => Some(self.pop(TokenKind::IDENT)?.value),
            None => None,
        };
        let mut members = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::SEMI => {
                    self.advance()?;
                }
                TokenKind::END => break,
                TokenKind::FUNC => members.push(self.parse_function()?),
                TokenKind::IDENT => {
                    let member = self.parse_ident_statement()?;
                    if !matches!(member.kind, NodeKind::VarDecl { .. }) {
                        return Err(self.error(
                            "PAR061",
                            format!("クラス {name} のメンバは宣言か関数でなければなりません"),
                        ));
                    }
                    members.push(member);
                }
                _ => {
                    return Err(self.error(
                        "PAR061",
                        format!("クラス {name} のメンバは宣言か関数でなければなりません"),
                    ))
                }
            }
        }
        self.pop(TokenKind::END)?;
        self.leave();
        Ok(node_at(
            NodeKind::ClassDef {
                name,
                base,
                members,
            },
            &class,
        ))
    }

    fn parse_aspect(&mut self) -> Result<AstNode, ParseError> {
        self.enter("aspect");
        let aspect = self.pop(TokenKind::ASPECT)?;
        let name = self.pop(TokenKind::IDENT)?.value;
        let mut pointcuts = Vec::new();
        let mut advices = Vec::new();
        loop {
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::SEMI => {
                    self.advance()?;
                }
                TokenKind::END => break,
                TokenKind::POINTCUT => {
                    self.advance()?;
                    let pc_name = self.pop(TokenKind::IDENT)?.value;
                    let pattern = decode_string(&self.pop(TokenKind::STRING)?.value)?;
                    pointcuts.push(node_at(
                        NodeKind::Pointcut {
                            name: pc_name,
                            pattern,
                        },
                        &tok,
                    ));
                }
                TokenKind::BEFORE | TokenKind::AFTER | TokenKind::AROUND => {
                    self.enter("advice");
                    self.advance()?;
                    let kind = match tok.kind {
                        TokenKind::BEFORE => AdviceKind::Before,
                        TokenKind::AFTER => AdviceKind::After,
                        _ => AdviceKind::Around,
                    };
                    let pointcut = self.pop(TokenKind::IDENT)?.value;
                    let body = self.parse_block_until(&[TokenKind::END])?;
                    self.pop(TokenKind::END)?;
                    self.leave();
                    advices.push(node_at(
                        NodeKind::Advice {
                            kind,
                            pointcut,
                            body,
                        },
                        &tok,
                    ));
                }
                _ => {
                    return Err(self.error(
                        "PAR001",
                        format!(
                            "pointcut / before / after / around を期待しましたが {:?} ({})",
                            tok.kind, tok.value
                        ),
                    ))
                }
            }
        }
        self.pop(TokenKind::END)?;
        self.leave();
        Ok(node_at(
            NodeKind::AspectDef {
                name,
                pointcuts,
                advices,
            },
            &aspect,
        ))
    }

    /// `else if` は入れ子の `if` が `end` を消費する。
    fn parse_if(&mut self) -> Result<AstNode, ParseError> {
        self.enter("if");
        let tok = self.pop(TokenKind::IF)?;
        let condition = self.parse_expr()?;
        let then_body = self.parse_block_until(&[TokenKind::ELSE, TokenKind::END])?;
        let else_body = if self.accept(TokenKind::ELSE)?.is_some() {
            if self.at(TokenKind::IF) {
                vec![self.parse_if()?]
            } else {
                let body = self.parse_block_until(&[TokenKind::END])?;
                self.pop(TokenKind::END)?;
                body
            }
        } else {
            self.pop(TokenKind::END)?;
            Vec::new()
        };
        self.leave();
        Ok(node_at(
            NodeKind::If {
                condition: Box::new(condition),
                then_body,
                else_body,
            },
            &tok,
        ))
    }

    fn parse_while(&mut self) -> Result<AstNode, ParseError> {
        self.enter("while");
        let tok = self.pop(TokenKind::WHILE)?;
        let condition = self.parse_expr()?;
        let body = self.parse_block_until(&[TokenKind::END])?;
        self.pop(TokenKind::END)?;
        self.leave();
        Ok(node_at(
            NodeKind::While {
                condition: Box::new(condition),
                body,
            },
            &tok,
        ))
    }

    fn parse_do_while(&mut self) -> Result<AstNode, ParseError> {
        self.enter("do-while");
        let tok = self.pop(TokenKind::DO)?;
        let body = self.parse_block_until(&[TokenKind::END])?;
        self.pop(TokenKind::END)?;
        self.pop(TokenKind::WHILE)?;
        let condition = self.parse_expr()?;
        self.leave();
        Ok(node_at(
            NodeKind::DoWhile {
                body,
                condition: Box::new(condition),
            },
            &tok,
        ))
    }

    /// `for i in range(a[, b])` は範囲ループ、それ以外の `for x in e` は要素ループ。
    fn parse_for(&mut self) -> Result<AstNode, ParseError> {
        self.enter("for");
        let tok = self.pop(TokenKind::FOR)?;
        let var = self.pop(TokenKind::IDENT)?.value;
        self.pop(TokenKind::IN)?;
        let is_range = self.at(TokenKind::IDENT)
            && self.peek().value == "range"
            && self.peek_next().map(|t| t.kind) == Some(TokenKind::LPAREN);
        let kind = if is_range {
            let range_tok = self.advance()?;
            self.pop(TokenKind::LPAREN)?;
            let first = self.parse_expr()?;
            let (start, end) = match self.accept(TokenKind::COMMA)? {
                Some(_) => (first, self.parse_expr()?),
                None => (AstNode::number(0.0, range_tok.line, range_tok.col), first),
            };
            self.pop(TokenKind::RPAREN)?;
            let body = self.parse_block_until(&[TokenKind::END])?;
            NodeKind::For {
                var,
                start: Box::new(start),
                end: Box::new(end),
                body,
            }
        } else {
            let iterable = self.parse_expr()?;
            let body = self.parse_block_until(&[TokenKind::END])?;
            NodeKind::ForEach {
                var,
                iterable: Box::new(iterable),
                body,
            }
        };
        self.pop(TokenKind::END)?;
        self.leave();
        Ok(node_at(kind, &tok))
    }

    fn parse_match(&mut self) -> Result<AstNode, ParseError> {
        self.enter("match");
        let tok = self.pop(TokenKind::MATCH)?;
        let subject = self.parse_expr()?;
        let mut arms = Vec::new();
        loop {
            if self.accept(TokenKind::SEMI)?.is_some() {
                continue;
            }
            let Some(case) = self.accept(TokenKind::CASE)? else {
                break;
            };
            let pattern = self.parse_pattern()?;
            self.pop(TokenKind::FATARROW)?;
            let body = self.parse_block_until(&[TokenKind::CASE, TokenKind::END])?;
            arms.push(node_at(
                NodeKind::MatchArm {
                    pattern: Box::new(pattern),
                    body,
                },
                &case,
            ));
        }
        self.pop(TokenKind::END)?;
        self.leave();
        Ok(node_at(
            NodeKind::Match {
                subject: Box::new(subject),
                arms,
            },
            &tok,
        ))
    }

    fn parse_pattern(&mut self) -> Result<AstNode, ParseError> {
        let tok = self.peek().clone();
        let kind = match tok.kind {
            TokenKind::UNDERSCORE => NodeKind::WildcardPattern,
            TokenKind::IDENT => NodeKind::BindingPattern {
                name: tok.value.clone(),
            },
            TokenKind::NUMBER => NodeKind::Number {
                value: self.number_value(&tok)?,
            },
            TokenKind::MINUS => {
                self.advance()?;
                let num = self.peek().clone();
                if num.kind != TokenKind::NUMBER {
                    return Err(self.error("PAR050", "`-` の後には数値パターンが必要です"));
                }
                NodeKind::Number {
                    value: -self.number_value(&num)?,
                }
            }
            TokenKind::STRING => NodeKind::Str {
                value: decode_string(&tok.value)?,
            },
            TokenKind::TRUE | TokenKind::FALSE => NodeKind::Bool {
                value: tok.kind == TokenKind::TRUE,
            },
            TokenKind::NULL => NodeKind::Null,
            _ => {
                return Err(self.error(
                    "PAR050",
                    format!("パターンが必要ですが {:?} ({})", tok.kind, tok.value),
                ))
            }
        };
        self.advance()?;
        Ok(node_at(kind, &tok))
    }

    fn number_value(&self, tok: &Token) -> Result<f64, ParseError> {
        tok.value
            .parse::<f64>()
            .map_err(|_| self.error("PAR020", format!("数値リテラルが不正: {}", tok.value)))
    }

    fn parse_return(&mut self) -> Result<AstNode, ParseError> {
        self.enter("return");
        let tok = self.pop(TokenKind::RETURN)?;
        // 戻り値は return と同じ行から始まる。改行後の式は次の文。
        let next = self.peek();
        let value = if next.line == tok.line && starts_expression(next.kind) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.leave();
        Ok(node_at(NodeKind::Return { value }, &tok))
    }
}
