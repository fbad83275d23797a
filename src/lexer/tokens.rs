use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,

    // Literals
    StringLit,
    Number,
    /// `` `text` `` with no substitutions
    TemplateNoSub,
    /// `` `text${ ``
    TemplateHead,
    /// `}text${`
    TemplateMiddle,
    /// `` }text` ``
    TemplateTail,
    True,
    False,
    Null,

    Identifier,

    // Punctuation
    Dot,
    Ellipsis,
    Comma,
    Colon,
    Semicolon,
    Question,
    Arrow,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Operators
    LessThan,
    GreaterThan,
    LessEqual,
    Assign,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Pipe,
    Amp,
    AndAnd,
    OrOr,

    // Keywords: declarations
    Type,
    Const,
    Let,
    Var,
    Function,

    // Keywords: statements
    Return,
    If,
    Else,

    // Keywords: type operators
    Extends,
    Infer,
    KeyOf,
    TypeOf,
}

impl TokenType {
    /// Keywords that are still valid property names (`a.type`, `{ if: 1 }`)
    pub fn can_be_property_name(&self) -> bool {
        matches!(
            self,
            TokenType::Identifier
                | TokenType::Type
                | TokenType::Const
                | TokenType::Let
                | TokenType::Var
                | TokenType::Function
                | TokenType::Return
                | TokenType::If
                | TokenType::Else
                | TokenType::Extends
                | TokenType::Infer
                | TokenType::KeyOf
                | TokenType::TypeOf
                | TokenType::True
                | TokenType::False
                | TokenType::Null
        )
    }

    /// Contextual keywords usable as ordinary identifiers
    pub fn can_be_identifier(&self) -> bool {
        matches!(self, TokenType::Identifier | TokenType::Type | TokenType::Infer | TokenType::KeyOf)
    }
}

/// Look up a keyword string and return its TokenType, or None if it's a plain identifier.
pub fn keyword_type(word: &str) -> Option<TokenType> {
    match word {
        "type" => Some(TokenType::Type),
        "const" => Some(TokenType::Const),
        "let" => Some(TokenType::Let),
        "var" => Some(TokenType::Var),
        "function" => Some(TokenType::Function),
        "return" => Some(TokenType::Return),
        "if" => Some(TokenType::If),
        "else" => Some(TokenType::Else),
        "extends" => Some(TokenType::Extends),
        "infer" => Some(TokenType::Infer),
        "keyof" => Some(TokenType::KeyOf),
        "typeof" => Some(TokenType::TypeOf),
        "true" => Some(TokenType::True),
        "false" => Some(TokenType::False),
        "null" => Some(TokenType::Null),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub value: String,
    /// Byte offsets into the source
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
    pub file: String,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::Eof => write!(f, "Token({:?}, {}:{})", self.token_type, self.line, self.column),
            _ => write!(
                f,
                "Token({:?}, {:?}, {}:{})",
                self.token_type, self.value, self.line, self.column
            ),
        }
    }
}
