use crate::error::ChartError;
use crate::note::TouchZone;

/// Token types for one DSL fragment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    // Numbers are lexed digit by digit; lanes are single digits
    Digit(u8),
    Dot,

    // Directives
    LeftParen,    // (
    RightParen,   // )
    LeftBrace,    // {
    RightBrace,   // }

    // Durations
    LeftBracket,  // [
    RightBracket, // ]
    Colon,        // :
    Hash,         // #

    // Note grouping
    Slash,        // / (each)
    Backtick,     // ` (pseudo-each)
    Asterisk,     // * (another slide from the same star)

    // Touch sensors
    Zone(TouchZone),

    // Modifiers
    Break,        // b
    Ex,           // x
    Star,         // $
    Tapless,      // ? or !
    NoStar,       // @
    Hold,         // h
    Firework,     // f

    // Slide shapes: - ^ < > v s z w p q V
    Pattern(char),
}

/// A token with its column in the fragment
#[derive(Debug, Clone, Copy)]
pub struct LocatedToken {
    pub token: Token,
    pub column: usize,
}

/// Lexer for one whitespace-free DSL fragment
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            column: 1,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.column += 1;
        Some(c)
    }

    pub fn tokenize(&mut self) -> Result<Vec<LocatedToken>, ChartError> {
        let mut tokens = Vec::new();

        while let Some(&c) = self.chars.peek() {
            let column = self.column;
            self.advance();

            let token = match c {
                '0'..='9' => Token::Digit(c as u8 - b'0'),
                '.' => Token::Dot,
                '(' => Token::LeftParen,
                ')' => Token::RightParen,
                '{' => Token::LeftBrace,
                '}' => Token::RightBrace,
                '[' => Token::LeftBracket,
                ']' => Token::RightBracket,
                ':' => Token::Colon,
                '#' => Token::Hash,
                '/' => Token::Slash,
                '`' => Token::Backtick,
                '*' => Token::Asterisk,
                'b' => Token::Break,
                'x' => Token::Ex,
                '$' => Token::Star,
                '?' | '!' => Token::Tapless,
                '@' => Token::NoStar,
                'h' => Token::Hold,
                'f' => Token::Firework,
                '-' | '^' | '<' | '>' | 'v' | 's' | 'z' | 'w' | 'p' | 'q' | 'V' => Token::Pattern(c),
                _ => match TouchZone::from_letter(c) {
                    Some(zone) => Token::Zone(zone),
                    None => {
                        return Err(ChartError::malformed(format!(
                            "unexpected character '{}' at column {}",
                            c, column
                        )))
                    }
                },
            };
            tokens.push(LocatedToken { token, column });
        }

        Ok(tokens)
    }
}
