pub mod tokens;

use thiserror::Error;
use tokens::{keyword_type, Token, TokenType};

#[derive(Debug, Error)]
#[error("{file}:{line}:{column}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

pub struct Lexer {
    source: Vec<char>,
    filename: String,
    pos: usize,
    offset: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    /// Open `{` count
    brace_depth: usize,
    /// Brace depth at which each open template substitution resumes
    template_stack: Vec<usize>,
    token_start: (usize, usize, usize),
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Self {
        Self {
            source: source.chars().collect(),
            filename: filename.to_string(),
            pos: 0,
            offset: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            brace_depth: 0,
            template_stack: Vec::new(),
            token_start: (0, 1, 1),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexerError> {
        loop {
            self.skip_trivia()?;
            if self.at_end() {
                break;
            }
            self.scan_token()?;
        }

        if !self.template_stack.is_empty() {
            return Err(self.error("Unterminated template literal"));
        }

        self.mark();
        self.push(TokenType::Eof, String::new());
        Ok(self.tokens)
    }

    fn scan_token(&mut self) -> Result<(), LexerError> {
        self.mark();
        let ch = self.peek();

        if ch == '"' || ch == '\'' {
            return self.scan_string(ch);
        }
        if ch == '`' {
            self.advance();
            return self.scan_template(TokenType::TemplateNoSub, TokenType::TemplateHead);
        }
        if ch.is_ascii_digit() || (ch == '.' && self.peek_ahead(1).is_some_and(|c| c.is_ascii_digit())) {
            return self.scan_number();
        }
        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            return self.scan_identifier();
        }

        if ch == '{' {
            self.brace_depth += 1;
            self.advance();
            self.push(TokenType::LBrace, "{".to_string());
            return Ok(());
        }
        if ch == '}' {
            if self.template_stack.last() == Some(&self.brace_depth) {
                self.template_stack.pop();
                self.advance();
                return self.scan_template(TokenType::TemplateTail, TokenType::TemplateMiddle);
            }
            self.brace_depth = self.brace_depth.saturating_sub(1);
            self.advance();
            self.push(TokenType::RBrace, "}".to_string());
            return Ok(());
        }

        // Longest match first
        const OPERATORS: &[(&str, TokenType)] = &[
            ("...", TokenType::Ellipsis),
            ("===", TokenType::EqEqEq),
            ("!==", TokenType::NotEqEq),
            ("=>", TokenType::Arrow),
            ("==", TokenType::EqEq),
            ("!=", TokenType::NotEq),
            ("<=", TokenType::LessEqual),
            ("&&", TokenType::AndAnd),
            ("||", TokenType::OrOr),
            ("(", TokenType::LParen),
            (")", TokenType::RParen),
            ("[", TokenType::LBracket),
            ("]", TokenType::RBracket),
            (",", TokenType::Comma),
            (":", TokenType::Colon),
            (";", TokenType::Semicolon),
            ("?", TokenType::Question),
            (".", TokenType::Dot),
            ("+", TokenType::Plus),
            ("-", TokenType::Minus),
            ("*", TokenType::Star),
            ("/", TokenType::Slash),
            ("%", TokenType::Percent),
            ("!", TokenType::Bang),
            ("|", TokenType::Pipe),
            ("&", TokenType::Amp),
            ("<", TokenType::LessThan),
            // `>=` and `>>` are never produced; the parser joins adjacent
            // tokens so `A<B<C>>` and `T>=` stay unambiguous
            (">", TokenType::GreaterThan),
            ("=", TokenType::Assign),
        ];
        for (text, tt) in OPERATORS {
            if self.lookahead_is(text) {
                for _ in 0..text.len() {
                    self.advance();
                }
                self.push(*tt, text.to_string());
                return Ok(());
            }
        }

        Err(self.error(&format!("Unexpected character: {:?}", ch)))
    }

    fn scan_string(&mut self, quote: char) -> Result<(), LexerError> {
        self.advance(); // opening quote
        let mut chars = String::new();

        loop {
            if self.at_end() || self.peek() == '\n' {
                return Err(self.error_at_start("Unterminated string literal"));
            }
            let ch = self.advance();
            if ch == quote {
                break;
            }
            if ch == '\\' {
                self.scan_escape(&mut chars)?;
            } else {
                chars.push(ch);
            }
        }

        self.push(TokenType::StringLit, chars);
        Ok(())
    }

    /// Template text up to the closing backtick (`done`) or the next `${`
    /// (`open`)
    fn scan_template(&mut self, done: TokenType, open: TokenType) -> Result<(), LexerError> {
        let mut chars = String::new();
        loop {
            if self.at_end() {
                return Err(self.error_at_start("Unterminated template literal"));
            }
            let ch = self.advance();
            match ch {
                '`' => {
                    self.push(done, chars);
                    return Ok(());
                }
                '$' if !self.at_end() && self.peek() == '{' => {
                    self.advance();
                    self.template_stack.push(self.brace_depth);
                    self.push(open, chars);
                    return Ok(());
                }
                '\\' => self.scan_escape(&mut chars)?,
                other => chars.push(other),
            }
        }
    }

    fn scan_escape(&mut self, out: &mut String) -> Result<(), LexerError> {
        if self.at_end() {
            return Err(self.error_at_start("Unterminated string literal"));
        }
        let escaped = self.advance();
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'u' => {
                let digits = if !self.at_end() && self.peek() == '{' {
                    self.advance();
                    let mut digits = String::new();
                    while !self.at_end() && self.peek() != '}' {
                        digits.push(self.advance());
                    }
                    if self.at_end() {
                        return Err(self.error("Unterminated unicode escape"));
                    }
                    self.advance();
                    digits
                } else {
                    let mut digits = String::new();
                    for _ in 0..4 {
                        if self.at_end() {
                            break;
                        }
                        digits.push(self.advance());
                    }
                    digits
                };
                let ch = u32::from_str_radix(&digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error(&format!("Invalid unicode escape: \\u{}", digits)))?;
                out.push(ch);
            }
            '\n' => {}
            other => out.push(other),
        }
        Ok(())
    }

    fn scan_number(&mut self) -> Result<(), LexerError> {
        let mut text = String::new();
        let radix_prefix = self.peek() == '0'
            && matches!(self.peek_ahead(1), Some('x' | 'X' | 'b' | 'B' | 'o' | 'O'));

        if radix_prefix {
            text.push(self.advance());
            text.push(self.advance());
            while !self.at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
                let ch = self.advance();
                if ch != '_' {
                    text.push(ch);
                }
            }
        } else {
            let mut seen_dot = false;
            let mut seen_exp = false;
            while !self.at_end() {
                let ch = self.peek();
                if ch.is_ascii_digit() {
                    text.push(ch);
                } else if ch == '_' {
                    // numeric separator
                } else if ch == '.' && !seen_dot && !seen_exp {
                    seen_dot = true;
                    text.push(ch);
                } else if (ch == 'e' || ch == 'E') && !seen_exp {
                    seen_exp = true;
                    text.push(ch);
                    if matches!(self.peek_ahead(1), Some('+' | '-')) {
                        self.advance();
                        text.push(self.peek());
                    }
                } else {
                    break;
                }
                self.advance();
            }
        }

        if numeric_value(&text).is_none() {
            return Err(self.error_at_start(&format!("Invalid number literal: {}", text)));
        }
        self.push(TokenType::Number, text);
        Ok(())
    }

    fn scan_identifier(&mut self) -> Result<(), LexerError> {
        let mut word = String::new();
        while !self.at_end() && (self.peek().is_alphanumeric() || self.peek() == '_' || self.peek() == '$') {
            word.push(self.advance());
        }
        let tt = keyword_type(&word).unwrap_or(TokenType::Identifier);
        self.push(tt, word);
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn skip_trivia(&mut self) -> Result<(), LexerError> {
        while !self.at_end() {
            let ch = self.peek();
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '/' && self.peek_ahead(1) == Some('/') {
                while !self.at_end() && self.peek() != '\n' {
                    self.advance();
                }
            } else if ch == '/' && self.peek_ahead(1) == Some('*') {
                self.mark();
                self.advance();
                self.advance();
                loop {
                    if self.at_end() {
                        return Err(self.error_at_start("Unterminated block comment"));
                    }
                    if self.peek() == '*' && self.peek_ahead(1) == Some('/') {
                        self.advance();
                        self.advance();
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn lookahead_is(&self, text: &str) -> bool {
        text.chars().enumerate().all(|(i, c)| self.peek_ahead(i) == Some(c))
    }

    fn peek(&self) -> char {
        self.source[self.pos]
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.source[self.pos];
        self.pos += 1;
        self.offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        ch
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn mark(&mut self) {
        self.token_start = (self.offset, self.line, self.column);
    }

    fn push(&mut self, token_type: TokenType, value: String) {
        let (start, line, column) = self.token_start;
        self.tokens.push(Token {
            token_type,
            value,
            start,
            end: self.offset,
            line,
            column,
            file: self.filename.clone(),
        });
    }

    fn error(&self, message: &str) -> LexerError {
        LexerError {
            message: message.to_string(),
            line: self.line,
            column: self.column,
            file: self.filename.clone(),
        }
    }

    fn error_at_start(&self, message: &str) -> LexerError {
        let (_, line, column) = self.token_start;
        LexerError {
            message: message.to_string(),
            line,
            column,
            file: self.filename.clone(),
        }
    }
}

/// Value of a numeric literal token (separators already removed)
pub fn numeric_value(text: &str) -> Option<f64> {
    let radix = match text.get(..2) {
        Some("0x" | "0X") => 16,
        Some("0b" | "0B") => 2,
        Some("0o" | "0O") => 8,
        _ => return text.parse::<f64>().ok(),
    };
    u64::from_str_radix(&text[2..], radix).ok().map(|v| v as f64)
}
