use phf::phf_map;

pub static KEYWORDS: phf::Map<&str, TokenKind> = phf_map! {
    "void" => TokenKind::Void,
    "char" => TokenKind::Char,
    "short" => TokenKind::Short,
    "int" => TokenKind::Int,
    "long" => TokenKind::Long,
    "struct" => TokenKind::Struct,
    "union" => TokenKind::Union,
    "enum" => TokenKind::Enum,
    "typedef" => TokenKind::Typedef,
    "extern" => TokenKind::Extern,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "for" => TokenKind::For,
    "return" => TokenKind::Return,
    "switch" => TokenKind::Switch,
    "case" => TokenKind::Case,
    "default" => TokenKind::Default,
    "break" => TokenKind::Break,
    "continue" => TokenKind::Continue,
    "sizeof" => TokenKind::Sizeof,
};

pub static TWO_SYMBOLS_TOKENS: phf::Map<&str, TokenKind> = phf_map! {
    "==" => TokenKind::DoubleEqual,
    "!=" => TokenKind::NotEqual,
    "<=" => TokenKind::LessEqual,
    ">=" => TokenKind::GreaterEqual,
    "<<" => TokenKind::LeftShift,
    ">>" => TokenKind::RightShift,
    "&&" => TokenKind::LogicalAnd,
    "||" => TokenKind::LogicalOr,
    "++" => TokenKind::Increment,
    "--" => TokenKind::Decrement,
    "->" => TokenKind::Arrow,
};

pub static ONE_SYMBOL_TOKENS: phf::Map<char, TokenKind> = phf_map! {
    '+' => TokenKind::Plus,
    '-' => TokenKind::Minus,
    '*' => TokenKind::Star,
    '/' => TokenKind::Slash,
    '%' => TokenKind::Percent,
    '=' => TokenKind::Equal,
    '<' => TokenKind::LessThan,
    '>' => TokenKind::GreaterThan,
    '&' => TokenKind::Ampersand,
    '|' => TokenKind::Pipe,
    '^' => TokenKind::Hat,
    '~' => TokenKind::Tilde,
    '!' => TokenKind::Not,
    '.' => TokenKind::Dot,
    '(' => TokenKind::OpenParen,
    ')' => TokenKind::CloseParen,
    '{' => TokenKind::OpenCurlyBrace,
    '}' => TokenKind::CloseCurlyBrace,
    '[' => TokenKind::OpenSquareBrace,
    ']' => TokenKind::CloseSquareBrace,
    ',' => TokenKind::Comma,
    ':' => TokenKind::Colon,
    ';' => TokenKind::SemiColon,
};

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    IntLit(i64),
    StrLit(String),
    Ident(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    Equal,
    DoubleEqual,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    LeftShift,
    RightShift,
    Ampersand,
    Pipe,
    Hat,
    Tilde,
    Not,
    LogicalAnd,
    LogicalOr,
    Increment,
    Decrement,

    Dot,
    Arrow,
    OpenParen,
    CloseParen,
    OpenCurlyBrace,
    CloseCurlyBrace,
    OpenSquareBrace,
    CloseSquareBrace,
    Comma,
    Colon,
    SemiColon,

    Void,
    Char,
    Short,
    Int,
    Long,
    Struct,
    Union,
    Enum,
    Typedef,
    Extern,
    If,
    Else,
    While,
    For,
    Return,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Sizeof,

    Eof,
}

impl TokenKind {
    /// Tokens that can start a declaration without consulting the typedef list.
    pub fn starts_declaration(&self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Enum
                | TokenKind::Typedef
                | TokenKind::Extern
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}
