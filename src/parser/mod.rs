use crate::ast::*;
use crate::lexer::{numeric_value, LexerError};
use crate::lexer::tokens::{Token, TokenType};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

const MAX_PARSER_DEPTH: usize = 256;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    filename: String,
    depth: usize,
    /// Set while parsing the `extends` clause of a conditional type, where a
    /// bare nested conditional is not allowed
    in_extends_clause: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            filename: filename.to_string(),
            depth: 0,
            in_extends_clause: false,
        }
    }

    fn enter_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            Err(self.error(format!(
                "Maximum nesting depth ({}) exceeded; expression is too deeply nested",
                MAX_PARSER_DEPTH
            )))
        } else {
            Ok(())
        }
    }

    fn exit_depth(&mut self) {
        self.depth -= 1;
    }

    // ── Public API ──────────────────────────────────────────────────────

    pub fn parse(&mut self) -> Result<SourceFile, ParseError> {
        let mut statements = Vec::new();
        while !self.at_end() {
            if self.eat(TokenType::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(SourceFile {
            file: self.filename.clone(),
            statements,
        })
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        self.enter_depth()?;
        let result = self.parse_statement_inner();
        self.exit_depth();
        result
    }

    fn parse_statement_inner(&mut self) -> Result<Statement, ParseError> {
        let tt = self.current().token_type;
        match tt {
            TokenType::Type if self.peek_type(1) == Some(TokenType::Identifier) => {
                Ok(Statement::TypeAlias(self.parse_type_alias()?))
            }
            TokenType::Const | TokenType::Let | TokenType::Var => {
                Ok(Statement::Variable(self.parse_variable_decl()?))
            }
            TokenType::Function => Ok(Statement::Function(self.parse_function_decl()?)),
            TokenType::If => self.parse_if_stmt(),
            TokenType::Return => self.parse_return_stmt(),
            TokenType::LBrace => {
                let start = self.current_span();
                let statements = self.parse_block()?;
                Ok(Statement::Block {
                    statements,
                    span: self.finish(start),
                })
            }
            tt if tt.can_be_identifier() && self.peek_type(1) == Some(TokenType::Assign) => {
                let start = self.current_span();
                let target = self.parse_ident()?;
                self.expect(TokenType::Assign)?;
                let value = self.parse_expression()?;
                self.eat(TokenType::Semicolon);
                Ok(Statement::Assignment {
                    target,
                    value,
                    span: self.finish(start),
                })
            }
            _ => {
                let expr = self.parse_expression()?;
                self.eat(TokenType::Semicolon);
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn parse_type_alias(&mut self) -> Result<TypeAlias, ParseError> {
        let start = self.current_span();
        self.expect(TokenType::Type)?;
        let name = self.parse_ident()?;
        let params = self.parse_type_params()?;
        self.expect(TokenType::Assign)?;
        let body = self.parse_type()?;
        self.eat(TokenType::Semicolon);
        Ok(TypeAlias {
            name,
            params,
            body,
            span: self.finish(start),
        })
    }

    fn parse_type_params(&mut self) -> Result<Vec<TypeParam>, ParseError> {
        let mut params = Vec::new();
        if !self.eat(TokenType::LessThan) {
            return Ok(params);
        }
        loop {
            let name = self.parse_ident()?;
            let constraint = if self.eat(TokenType::Extends) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.eat(TokenType::Assign) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(TypeParam { name, constraint, default });
            if !self.eat(TokenType::Comma) || self.check(TokenType::GreaterThan) {
                break;
            }
        }
        self.expect(TokenType::GreaterThan)?;
        Ok(params)
    }

    fn parse_variable_decl(&mut self) -> Result<VariableDecl, ParseError> {
        let start = self.current_span();
        let kind = match self.advance().token_type {
            TokenType::Const => VarKind::Const,
            TokenType::Let => VarKind::Let,
            _ => VarKind::Var,
        };
        let name = self.parse_ident()?;
        let annotation = if self.eat(TokenType::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenType::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.eat(TokenType::Semicolon);
        Ok(VariableDecl {
            kind,
            name,
            annotation,
            init,
            span: self.finish(start),
        })
    }

    fn parse_function_decl(&mut self) -> Result<FunctionDecl, ParseError> {
        let start = self.current_span();
        self.expect(TokenType::Function)?;
        let name = self.parse_ident()?;
        let type_params = self.parse_type_params()?;
        let params = self.parse_param_list()?;
        let return_type = if self.eat(TokenType::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDecl {
            name,
            type_params,
            params,
            return_type,
            body,
            span: self.finish(start),
        })
    }

    fn parse_param_list(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenType::LParen)?;
        let mut params = Vec::new();
        while !self.check(TokenType::RParen) {
            let name = self.parse_ident()?;
            let optional = self.eat(TokenType::Question);
            let annotation = if self.eat(TokenType::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(Param { name, annotation, optional });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(params)
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect(TokenType::LBrace)?;
        let mut statements = Vec::new();
        while !self.check(TokenType::RBrace) {
            if self.at_end() {
                return Err(self.error("Expected '}' before end of file".to_string()));
            }
            if self.eat(TokenType::Semicolon) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenType::RBrace)?;
        Ok(statements)
    }

    fn parse_if_stmt(&mut self) -> Result<Statement, ParseError> {
        let start = self.current_span();
        self.expect(TokenType::If)?;
        self.expect(TokenType::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenType::RParen)?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(TokenType::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
            span: self.finish(start),
        })
    }

    fn parse_return_stmt(&mut self) -> Result<Statement, ParseError> {
        let start = self.current_span();
        self.expect(TokenType::Return)?;
        let tt = self.current().token_type;
        let value = match tt {
            TokenType::Semicolon | TokenType::RBrace | TokenType::Eof => None,
            _ => Some(self.parse_expression()?),
        };
        self.eat(TokenType::Semicolon);
        Ok(Statement::Return {
            value,
            span: self.finish(start),
        })
    }

    // ── Types ───────────────────────────────────────────────────────────

    pub fn parse_type(&mut self) -> Result<TypeNode, ParseError> {
        self.enter_depth()?;
        let result = self.parse_conditional_type();
        self.exit_depth();
        result
    }

    fn parse_conditional_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        let check = self.parse_union_type()?;
        if self.in_extends_clause || !self.check(TokenType::Extends) {
            return Ok(check);
        }
        self.advance();
        let saved = std::mem::replace(&mut self.in_extends_clause, true);
        let extends = self.parse_type();
        self.in_extends_clause = saved;
        let extends = extends?;
        self.expect(TokenType::Question)?;
        let when_true = self.parse_type()?;
        self.expect(TokenType::Colon)?;
        let when_false = self.parse_type()?;
        Ok(TypeNode::Conditional {
            check: Box::new(check),
            extends: Box::new(extends),
            when_true: Box::new(when_true),
            when_false: Box::new(when_false),
            span: self.finish(start),
        })
    }

    fn parse_union_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        self.eat(TokenType::Pipe);
        let first = self.parse_intersection_type()?;
        if !self.check(TokenType::Pipe) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(TokenType::Pipe) {
            members.push(self.parse_intersection_type()?);
        }
        Ok(TypeNode::Union {
            members,
            span: self.finish(start),
        })
    }

    fn parse_intersection_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        self.eat(TokenType::Amp);
        let first = self.parse_type_operator()?;
        if !self.check(TokenType::Amp) {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(TokenType::Amp) {
            members.push(self.parse_type_operator()?);
        }
        Ok(TypeNode::Intersection {
            members,
            span: self.finish(start),
        })
    }

    fn parse_type_operator(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        let tt = self.current().token_type;
        match tt {
            TokenType::KeyOf => {
                self.advance();
                let operand = self.parse_type_operator()?;
                Ok(TypeNode::KeyOf {
                    operand: Box::new(operand),
                    span: self.finish(start),
                })
            }
            TokenType::Infer => {
                self.advance();
                let name = self.parse_ident()?;
                Ok(TypeNode::Infer {
                    name,
                    span: self.finish(start),
                })
            }
            _ => self.parse_postfix_type(),
        }
    }

    fn parse_postfix_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        let mut ty = self.parse_primary_type()?;
        while self.check(TokenType::LBracket) {
            self.advance();
            if self.eat(TokenType::RBracket) {
                ty = TypeNode::Array {
                    element: Box::new(ty),
                    span: self.finish(start),
                };
            } else {
                let index = self.parse_type()?;
                self.expect(TokenType::RBracket)?;
                ty = TypeNode::IndexedAccess {
                    object: Box::new(ty),
                    index: Box::new(index),
                    span: self.finish(start),
                };
            }
        }
        Ok(ty)
    }

    fn parse_primary_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        let tok = self.current().clone();

        match tok.token_type {
            TokenType::LParen if self.is_function_type_start() => self.parse_function_type(),
            TokenType::LParen => {
                self.advance();
                let saved = std::mem::replace(&mut self.in_extends_clause, false);
                let inner = self.parse_type();
                self.in_extends_clause = saved;
                let inner = inner?;
                self.expect(TokenType::RParen)?;
                Ok(inner)
            }
            TokenType::LBracket => self.parse_tuple_type(),
            TokenType::LBrace => self.parse_object_type(),
            TokenType::StringLit => {
                self.advance();
                Ok(TypeNode::StringLiteral {
                    value: tok.value,
                    span: start,
                })
            }
            TokenType::Number => {
                self.advance();
                Ok(TypeNode::NumberLiteral {
                    value: self.number_value(&tok)?,
                    span: start,
                })
            }
            TokenType::Minus if self.peek_type(1) == Some(TokenType::Number) => {
                self.advance();
                let number = self.advance().clone();
                Ok(TypeNode::NumberLiteral {
                    value: -self.number_value(&number)?,
                    span: self.finish(start),
                })
            }
            TokenType::True | TokenType::False => {
                self.advance();
                Ok(TypeNode::BooleanLiteral {
                    value: tok.token_type == TokenType::True,
                    span: start,
                })
            }
            TokenType::Null => {
                self.advance();
                Ok(TypeNode::Keyword {
                    kind: KeywordType::Null,
                    span: start,
                })
            }
            TokenType::TemplateNoSub => {
                self.advance();
                Ok(TypeNode::StringLiteral {
                    value: tok.value,
                    span: start,
                })
            }
            TokenType::TemplateHead => {
                self.advance();
                let mut spans = Vec::new();
                loop {
                    let hole = self.parse_type()?;
                    let text = self.current().clone();
                    match text.token_type {
                        TokenType::TemplateMiddle => {
                            self.advance();
                            spans.push((hole, text.value));
                        }
                        TokenType::TemplateTail => {
                            self.advance();
                            spans.push((hole, text.value));
                            break;
                        }
                        _ => return Err(self.error("Expected end of template substitution".to_string())),
                    }
                }
                Ok(TypeNode::TemplateLiteral {
                    head: tok.value,
                    spans,
                    span: self.finish(start),
                })
            }
            TokenType::TypeOf => {
                self.advance();
                let name = self.parse_ident()?;
                Ok(TypeNode::Query {
                    name,
                    span: self.finish(start),
                })
            }
            _ if tok.token_type.can_be_identifier() => {
                if let Some(kind) = KeywordType::from_name(&tok.value) {
                    self.advance();
                    return Ok(TypeNode::Keyword { kind, span: start });
                }
                let name = self.parse_ident()?;
                let args = if self.check(TokenType::LessThan) {
                    self.parse_type_args()?
                } else {
                    Vec::new()
                };
                Ok(TypeNode::Reference {
                    name,
                    args,
                    span: self.finish(start),
                })
            }
            _ => Err(self.error(format!("Expected a type, got {:?} ({:?})", tok.token_type, tok.value))),
        }
    }

    fn parse_type_args(&mut self) -> Result<Vec<TypeNode>, ParseError> {
        self.expect(TokenType::LessThan)?;
        let mut args = Vec::new();
        while !self.check(TokenType::GreaterThan) {
            args.push(self.parse_type()?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::GreaterThan)?;
        Ok(args)
    }

    fn parse_tuple_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        self.expect(TokenType::LBracket)?;
        let mut elements = Vec::new();
        while !self.check(TokenType::RBracket) {
            let spread = self.eat(TokenType::Ellipsis);
            let ty = self.parse_type()?;
            elements.push(TupleElement { spread, ty });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBracket)?;
        Ok(TypeNode::Tuple {
            elements,
            span: self.finish(start),
        })
    }

    fn parse_object_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        self.expect(TokenType::LBrace)?;
        let mut members = Vec::new();
        while !self.check(TokenType::RBrace) {
            let member_start = self.current_span();
            let name = self.parse_property_name()?;
            let optional = self.eat(TokenType::Question);
            self.expect(TokenType::Colon)?;
            let ty = self.parse_type()?;
            members.push(PropertySignature {
                name,
                optional,
                ty,
                span: self.finish(member_start),
            });
            if !self.eat(TokenType::Semicolon) && !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBrace)?;
        Ok(TypeNode::Object {
            members,
            span: self.finish(start),
        })
    }

    /// `(` starts a function type when followed by `)`, `...`, or a
    /// parameter name followed by `:`, `,`, `?` or `) =>`
    fn is_function_type_start(&self) -> bool {
        match self.peek_type(1) {
            Some(TokenType::RParen) | Some(TokenType::Ellipsis) => true,
            Some(tt) if tt.can_be_identifier() => matches!(
                self.peek_type(2),
                Some(TokenType::Colon | TokenType::Comma | TokenType::Question)
            ) || (self.peek_type(2) == Some(TokenType::RParen)
                && self.peek_type(3) == Some(TokenType::Arrow)),
            _ => false,
        }
    }

    fn parse_function_type(&mut self) -> Result<TypeNode, ParseError> {
        let start = self.current_span();
        let params = self.parse_param_list()?;
        self.expect(TokenType::Arrow)?;
        let ret = self.parse_type()?;
        Ok(TypeNode::Function {
            params,
            ret: Box::new(ret),
            span: self.finish(start),
        })
    }

    // ── Expressions (precedence climbing) ───────────────────────────────

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.enter_depth()?;
        let result = self.parse_or_expr();
        self.exit_depth();
        result
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let span = left.span().to(right.span());
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span,
        }
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.eat(TokenType::OrOr) {
            let right = self.parse_and_expr()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.eat(TokenType::AndAnd) {
            let right = self.parse_equality()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current().token_type {
                TokenType::EqEq => BinaryOp::Eq,
                TokenType::NotEq => BinaryOp::NotEq,
                TokenType::EqEqEq => BinaryOp::StrictEq,
                TokenType::NotEqEq => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current().token_type {
                TokenType::LessThan => BinaryOp::Lt,
                TokenType::LessEqual => BinaryOp::Le,
                TokenType::GreaterThan if self.adjacent_assign() => {
                    self.advance();
                    BinaryOp::Ge
                }
                TokenType::GreaterThan => BinaryOp::Gt,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().token_type {
                TokenType::Star => BinaryOp::Mul,
                TokenType::Slash => BinaryOp::Div,
                TokenType::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.current_span();
        let op = match self.current().token_type {
            TokenType::Bang => UnaryOp::Not,
            TokenType::Minus => UnaryOp::Negate,
            TokenType::Plus => UnaryOp::Plus,
            TokenType::TypeOf => UnaryOp::TypeOf,
            _ => return self.parse_postfix(),
        };
        self.advance();
        self.enter_depth()?;
        let operand = self.parse_unary();
        self.exit_depth();
        let operand = operand?;

        // Fold `-5` into a literal
        if let (UnaryOp::Negate, Expr::NumberLiteral { value, .. }) = (op, &operand) {
            return Ok(Expr::NumberLiteral {
                value: -*value,
                span: self.finish(start),
            });
        }
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span: self.finish(start),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.current_span();
        let mut expr = self.parse_primary()?;

        loop {
            if self.eat(TokenType::Dot) {
                let tok = self.current().clone();
                if !tok.token_type.can_be_property_name() {
                    return Err(self.error(format!("Expected property name, got {:?}", tok.token_type)));
                }
                self.advance();
                let span = self.token_span(&tok);
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: Ident { name: tok.value, span },
                    span: self.finish(start),
                };
            } else if self.eat(TokenType::LBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenType::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span: self.finish(start),
                };
            } else if self.eat(TokenType::LParen) {
                let mut args = Vec::new();
                while !self.check(TokenType::RParen) {
                    args.push(self.parse_expression()?);
                    if !self.eat(TokenType::Comma) {
                        break;
                    }
                }
                self.expect(TokenType::RParen)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span: self.finish(start),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.current_span();
        let tok = self.current().clone();

        match tok.token_type {
            TokenType::Number => {
                self.advance();
                Ok(Expr::NumberLiteral {
                    value: self.number_value(&tok)?,
                    span: start,
                })
            }
            TokenType::StringLit | TokenType::TemplateNoSub => {
                self.advance();
                Ok(Expr::StringLiteral {
                    value: tok.value,
                    span: start,
                })
            }
            TokenType::TemplateHead => {
                self.advance();
                let mut spans = Vec::new();
                loop {
                    let hole = self.parse_expression()?;
                    let text = self.current().clone();
                    match text.token_type {
                        TokenType::TemplateMiddle => {
                            self.advance();
                            spans.push((hole, text.value));
                        }
                        TokenType::TemplateTail => {
                            self.advance();
                            spans.push((hole, text.value));
                            break;
                        }
                        _ => return Err(self.error("Expected end of template substitution".to_string())),
                    }
                }
                Ok(Expr::Template {
                    head: tok.value,
                    spans,
                    span: self.finish(start),
                })
            }
            TokenType::True | TokenType::False => {
                self.advance();
                Ok(Expr::BoolLiteral {
                    value: tok.token_type == TokenType::True,
                    span: start,
                })
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::Null { span: start })
            }
            TokenType::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenType::RParen)?;
                Ok(inner)
            }
            TokenType::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.check(TokenType::RBracket) {
                    let spread = self.eat(TokenType::Ellipsis);
                    let expr = self.parse_expression()?;
                    elements.push(ArrayElement { spread, expr });
                    if !self.eat(TokenType::Comma) {
                        break;
                    }
                }
                self.expect(TokenType::RBracket)?;
                Ok(Expr::Array {
                    elements,
                    span: self.finish(start),
                })
            }
            TokenType::LBrace => {
                self.advance();
                let mut properties = Vec::new();
                while !self.check(TokenType::RBrace) {
                    let key_tok = self.current().clone();
                    let key = self.parse_property_name()?;
                    let value = if self.eat(TokenType::Colon) {
                        self.parse_expression()?
                    } else {
                        Expr::Identifier {
                            name: key.clone(),
                            span: self.token_span(&key_tok),
                        }
                    };
                    properties.push((key, value));
                    if !self.eat(TokenType::Comma) {
                        break;
                    }
                }
                self.expect(TokenType::RBrace)?;
                Ok(Expr::Object {
                    properties,
                    span: self.finish(start),
                })
            }
            _ if tok.token_type.can_be_identifier() => {
                self.advance();
                Ok(Expr::Identifier {
                    name: tok.value,
                    span: start,
                })
            }
            _ => Err(self.error(format!(
                "Expected expression, got {:?} ({:?})",
                tok.token_type, tok.value
            ))),
        }
    }

    // ── Names ───────────────────────────────────────────────────────────

    fn parse_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.current().clone();
        if !tok.token_type.can_be_identifier() {
            return Err(self.error(format!(
                "Expected identifier, got {:?} ({:?})",
                tok.token_type, tok.value
            )));
        }
        self.advance();
        Ok(Ident {
            span: self.token_span(&tok),
            name: tok.value,
        })
    }

    fn parse_property_name(&mut self) -> Result<String, ParseError> {
        let tok = self.current().clone();
        match tok.token_type {
            TokenType::StringLit => {
                self.advance();
                Ok(tok.value)
            }
            TokenType::Number => {
                self.advance();
                Ok(crate::types::format_number(self.number_value(&tok)?))
            }
            tt if tt.can_be_property_name() => {
                self.advance();
                Ok(tok.value)
            }
            _ => Err(self.error(format!("Expected property name, got {:?}", tok.token_type))),
        }
    }

    fn number_value(&self, tok: &Token) -> Result<f64, ParseError> {
        numeric_value(&tok.value).ok_or_else(|| ParseError {
            message: format!("Invalid number literal: {}", tok.value),
            line: tok.line,
            column: tok.column,
            file: tok.file.clone(),
        })
    }

    // ── Token stream helpers ────────────────────────────────────────────

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> &Token {
        let pos = self.pos.min(self.tokens.len().saturating_sub(1));
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[pos]
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    fn eat(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token_type: TokenType) -> Result<&Token, ParseError> {
        let tok = self.current();
        if tok.token_type != token_type {
            return Err(self.error(format!(
                "Expected {:?}, got {:?} ({:?})",
                token_type, tok.token_type, tok.value
            )));
        }
        Ok(self.advance())
    }

    fn peek_type(&self, offset: usize) -> Option<TokenType> {
        self.tokens.get(self.pos + offset).map(|t| t.token_type)
    }

    /// `>` immediately followed by `=` spells `>=`
    fn adjacent_assign(&self) -> bool {
        match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
            (Some(gt), Some(eq)) => eq.token_type == TokenType::Assign && eq.start == gt.end,
            _ => false,
        }
    }

    fn at_end(&self) -> bool {
        self.current().token_type == TokenType::Eof
    }

    fn token_span(&self, tok: &Token) -> Span {
        Span::new(tok.start as u32, tok.end as u32, tok.line as u32, tok.column as u32)
    }

    fn current_span(&self) -> Span {
        self.token_span(self.current())
    }

    /// Span from `start` through the last consumed token
    fn finish(&self, start: Span) -> Span {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(prev) => start.to(self.token_span(prev)),
            None => start,
        }
    }

    fn error(&self, message: String) -> ParseError {
        let tok = self.current();
        ParseError {
            message,
            line: tok.line,
            column: tok.column,
            file: tok.file.clone(),
        }
    }
}

/// Either front-end failure
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Lex(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Lex and parse one source text
pub fn parse_source(source: &str, filename: &str) -> Result<SourceFile, FrontendError> {
    let tokens = crate::lexer::Lexer::new(source, filename).tokenize()?;
    let mut parser = Parser::new(tokens, filename);
    Ok(parser.parse()?)
}
