// パス: src/parser/expr.rs
// 役割: 式（演算子・因子・後置連鎖・ラムダ）の解析を `Parser` に実装する
// 意図: ラムダ判定の投機的先読みなど複雑なロジックを専用モジュールに切り分ける
// 関連ファイル: src/parser/program.rs, src/parser/types.rs, src/parser/mod.rs

use super::*;

/// 加算段で扱う演算子（比較演算子も同じ優先順位・左結合）。
fn additive_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::PLUS => Some(BinaryOp::Add),
        TokenKind::MINUS => Some(BinaryOp::Sub),
        TokenKind::GT => Some(BinaryOp::Gt),
        TokenKind::LT => Some(BinaryOp::Lt),
        TokenKind::GE => Some(BinaryOp::Ge),
        TokenKind::LE => Some(BinaryOp::Le),
        TokenKind::EQ => Some(BinaryOp::Eq),
        TokenKind::NE => Some(BinaryOp::Ne),
        _ => None,
    }
}

fn multiplicative_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::STAR => Some(BinaryOp::Mul),
        TokenKind::SLASH => Some(BinaryOp::Div),
        TokenKind::PERCENT => Some(BinaryOp::Mod),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: AstNode, right: AstNode) -> AstNode {
    let (line, column) = (left.line, left.column);
    AstNode::new(
        NodeKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        line,
        column,
    )
}

impl<'a> Parser<'a> {
    pub(super) fn parse_expr(&mut self) -> Result<AstNode, ParseError> {
        self.enter("expression");
        let mut left = self.parse_additive()?;
        while self.at(TokenKind::COMPOSE) {
            self.advance()?;
            let right = self.parse_additive()?;
            let (line, column) = (left.line, left.column);
            left = AstNode::new(
                NodeKind::Compose {
                    first: Box::new(left),
                    second: Box::new(right),
                },
                line,
                column,
            );
        }
        self.leave();
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_term()?;
        while let Some(op) = additive_op(self.peek().kind) {
            self.advance()?;
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = multiplicative_op(self.peek().kind) {
            self.advance()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<AstNode, ParseError> {
        let op = match self.peek().kind {
            TokenKind::MINUS => UnaryOp::Neg,
            TokenKind::BANG => UnaryOp::Not,
            _ => return self.parse_factor(),
        };
        let tok = self.advance()?;
        let operand = self.parse_unary()?;
        Ok(node_at(
            NodeKind::Unary {
                op,
                operand: Box::new(operand),
            },
            &tok,
        ))
    }

    fn parse_factor(&mut self) -> Result<AstNode, ParseError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::NUMBER => {
                self.advance()?;
                let value = tok.value.parse::<f64>().map_err(|_| {
                    self.error("PAR020", format!("数値リテラルが不正: {}", tok.value))
                })?;
                Ok(node_at(NodeKind::Number { value }, &tok))
            }
            TokenKind::STRING => {
                self.advance()?;
                let value = decode_string(&tok.value)?;
                Ok(node_at(NodeKind::Str { value }, &tok))
            }
            TokenKind::TRUE | TokenKind::FALSE => {
                self.advance()?;
                Ok(node_at(
                    NodeKind::Bool {
                        value: tok.kind == TokenKind::TRUE,
                    },
                    &tok,
                ))
            }
            TokenKind::NULL => {
                self.advance()?;
                Ok(node_at(NodeKind::Null, &tok))
            }
            TokenKind::IDENT => {
                self.advance()?;
                let ident = node_at(NodeKind::Identifier { name: tok.value.clone() }, &tok);
                self.parse_postfix(ident)
            }
            TokenKind::LPAREN => {
                if self.lambda_ahead() {
                    return self.parse_lambda();
                }
                self.advance()?;
                let inner = self.parse_expr()?;
                self.pop(TokenKind::RPAREN)?;
                self.parse_postfix(inner)
            }
            TokenKind::LBRACK => self.parse_array_literal(),
            _ => Err(self.error(
                "PAR010",
                format!("式が必要ですが {:?} ({}) が見つかりました", tok.kind, tok.value),
            )),
        }
    }

    /// `.name` / `(args)` / `[index]` の後置を左深に連鎖させる。
    ///
    /// `a.b(x)` は `b(a, x)` に書き換える（オブジェクトを第 1 引数へ）。
    pub(super) fn parse_postfix(&mut self, mut expr: AstNode) -> Result<AstNode, ParseError> {
        loop {
            match self.peek().kind {
                TokenKind::DOT => {
                    self.advance()?;
                    let member = self.pop(TokenKind::IDENT)?;
                    let (line, column) = (expr.line, expr.column);
                    expr = AstNode::new(
                        NodeKind::MemberAccess {
                            object: Box::new(expr),
                            member: member.value,
                        },
                        line,
                        column,
                    );
                }
                TokenKind::LPAREN => {
                    self.advance()?;
                    let mut args = self.parse_arguments()?;
                    let (line, column) = (expr.line, expr.column);
                    let callee = match expr.kind {
                        NodeKind::MemberAccess { object, member } => {
                            args.insert(0, *object);
                            AstNode::identifier(member, line, column)
                        }
                        kind => AstNode::new(kind, line, column),
                    };
                    expr = AstNode::new(
                        NodeKind::Call {
                            callee: Box::new(callee),
                            args,
                        },
                        line,
                        column,
                    );
                }
                TokenKind::LBRACK => {
                    self.advance()?;
                    let index = self.parse_expr()?;
                    self.pop(TokenKind::RBRACK)?;
                    let (line, column) = (expr.line, expr.column);
                    expr = AstNode::new(
                        NodeKind::Index {
                            target: Box::new(expr),
                            index: Box::new(index),
                        },
                        line,
                        column,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// `(` の直後から `)` までの実引数列を読む。
    fn parse_arguments(&mut self) -> Result<Vec<AstNode>, ParseError> {
        let mut args = Vec::new();
        if self.accept(TokenKind::RPAREN)?.is_some() {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.accept(TokenKind::COMMA)?.is_none() {
                break;
            }
        }
        self.pop(TokenKind::RPAREN)?;
        Ok(args)
    }

    fn parse_array_literal(&mut self) -> Result<AstNode, ParseError> {
        let open = self.pop(TokenKind::LBRACK)?;
        let mut elements = Vec::new();
        if !self.at(TokenKind::RBRACK) {
            loop {
                elements.push(self.parse_expr()?);
                if self.accept(TokenKind::COMMA)?.is_none() {
                    break;
                }
            }
        }
        self.pop(TokenKind::RBRACK)?;
        Ok(node_at(NodeKind::ArrayLiteral { elements }, &open))
    }

    /// 現在の `(` がラムダ `(x: T, ...) -> R =>` の開始かを投機的に調べる。
    ///
    /// 字句解析器の状態は結果にかかわらず必ず復元する。
    pub fn lambda_ahead(&mut self) -> bool {
        if !self.at(TokenKind::LPAREN) {
            return false;
        }
        let saved = self.lexer.save_state();
        let found = self.scan_lambda_shape();
        self.lexer.restore_state(saved);
        found
    }

    fn scan_lambda_shape(&mut self) -> bool {
        let mut next = || {
            self.lexer
                .next_token()
                .map(|t| t.kind)
                .unwrap_or(TokenKind::EOF)
        };
        let mut t = next();
        if t == TokenKind::RPAREN {
            return next() == TokenKind::ARROW;
        }
        loop {
            if t != TokenKind::IDENT || next() != TokenKind::COLON {
                return false;
            }
            // 型注釈を読み飛ばす。関数型の括弧は深さで数える。
            let mut depth = 0usize;
            loop {
                match next() {
                    TokenKind::LPAREN | TokenKind::LBRACK => depth += 1,
                    TokenKind::RPAREN | TokenKind::RBRACK if depth > 0 => depth -= 1,
                    TokenKind::RPAREN => return next() == TokenKind::ARROW,
                    TokenKind::COMMA if depth == 0 => break,
                    TokenKind::EOF => return false,
                    _ => {}
                }
            }
            t = next();
        }
    }

    fn parse_lambda(&mut self) -> Result<AstNode, ParseError> {
        self.enter("lambda");
        let open = self.pop(TokenKind::LPAREN)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RPAREN) {
            loop {
                let name = self.pop(TokenKind::IDENT)?;
                self.pop(TokenKind::COLON)?;
                let ty = self.parse_type()?;
                params.push(node_at(
                    NodeKind::Parameter {
                        name: name.value.clone(),
                        type_expr: Some(ty),
                    },
                    &name,
                ));
                if self.accept(TokenKind::COMMA)?.is_none() {
                    break;
                }
            }
        }
        self.pop(TokenKind::RPAREN)?;
        self.pop(TokenKind::ARROW)?;
        let return_type = self.parse_type()?;
        self.pop(TokenKind::FATARROW)?;
        let body = self.parse_expr()?;
        self.leave();
        Ok(node_at(
            NodeKind::Lambda {
                params,
                return_type: Some(return_type),
                body: Box::new(body),
            },
            &open,
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{NodeKind, NodeTag};
    use crate::parser::parse_expr;

    #[test]
    /// 乗算が加算より強く結合する。
    fn precedence_mul_over_add() {
        let e = parse_expr("3 + 4 * 2").unwrap();
        assert_eq!(e.to_string(), "(3 + (4 * 2))");
    }

    #[test]
    /// 比較演算子は加算と同じ段で左結合になる。
    fn comparison_shares_additive_tier() {
        let e = parse_expr("1 + 2 > 2 - 1").unwrap();
        assert_eq!(e.to_string(), "(((1 + 2) > 2) - 1)");
    }

    #[test]
    fn ufcs_moves_object_to_first_argument() {
        let e = parse_expr("p.dist(q, 2)").unwrap();
        assert_eq!(e.to_string(), "dist(p, q, 2)");
        match &e.kind {
            NodeKind::Call { callee, args } => {
                assert_eq!(callee.tag(), NodeTag::Identifier);
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn member_chain_is_left_deep() {
        let e = parse_expr("a.b.c").unwrap();
        match &e.kind {
            NodeKind::MemberAccess { object, member } => {
                assert_eq!(member, "c");
                assert_eq!(object.to_string(), "a.b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_parameter_lambda() {
        let e = parse_expr("() -> int => 42").unwrap();
        match &e.kind {
            NodeKind::Lambda { params, body, .. } => {
                assert!(params.is_empty());
                assert_eq!(body.to_string(), "42");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lambda_with_function_typed_parameter() {
        let e = parse_expr("(f: (int) -> int, x: int) -> int => f(x)").unwrap();
        assert_eq!(e.tag(), NodeTag::Lambda);
        assert_eq!(e.to_string(), "(f: (int) -> int, x: int) -> int => f(x)");
    }

    #[test]
    fn compose_and_index() {
        let e = parse_expr("f >> g").unwrap();
        assert_eq!(e.tag(), NodeTag::Compose);
        let e = parse_expr("xs[i + 1]").unwrap();
        assert_eq!(e.to_string(), "xs[(i + 1)]");
    }
}
