use std::collections::HashMap;
use std::fmt;
use std::str::Chars;

use lazy_static::lazy_static;

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "<eof>"),
            Token::Def => write!(f, "def"),
            Token::Extern => write!(f, "extern"),
            Token::Ident(name) => write!(f, "{}", name),
            Token::Number(value) => write!(f, "{}", value),
            Token::Char(c) => write!(f, "'{}'", c),
        }
    }
}

lazy_static! {
    static ref KEYWORDS: HashMap<&'static str, Token> = {
        let mut keywords = HashMap::new();
        keywords.insert("def", Token::Def);
        keywords.insert("extern", Token::Extern);
        keywords
    };
}

/// Streaming lexer over a character source. Tokens are produced on demand
/// and nothing is buffered beyond a single lookahead character.
pub struct Lexer<I: Iterator<Item = char>> {
    input: I,
    pushback: Option<char>,
}

impl<'src> Lexer<Chars<'src>> {
    pub fn from_source(source: &'src str) -> Self {
        Lexer::new(source.chars())
    }
}

impl<I: Iterator<Item = char>> Lexer<I> {
    pub fn new(input: I) -> Self {
        Lexer {
            input,
            pushback: None,
        }
    }

    fn next_char(&mut self) -> Option<char> {
        self.pushback.take().or_else(|| self.input.next())
    }

    /// Scans the next token. Unrecognized characters come back as
    /// `Token::Char`, and an exhausted source yields `Token::Eof` forever,
    /// so scanning never fails.
    pub fn next_token(&mut self) -> Token {
        let mut cur = self.next_char();

        while let Some(c) = cur {
            if !c.is_whitespace() {
                break;
            }
            cur = self.next_char();
        }

        let c = match cur {
            Some(c) => c,
            None => return Token::Eof,
        };

        if c.is_ascii_alphabetic() {
            let mut ident = c.to_string();
            while let Some(c) = self.next_char() {
                if c.is_ascii_alphanumeric() {
                    ident.push(c);
                } else {
                    self.pushback = Some(c);
                    break;
                }
            }
            return match KEYWORDS.get(ident.as_str()) {
                Some(keyword) => keyword.clone(),
                None => Token::Ident(ident),
            };
        }

        if c.is_ascii_digit() || c == '.' {
            let mut text = c.to_string();
            while let Some(c) = self.next_char() {
                if c.is_ascii_digit() || c == '.' {
                    text.push(c);
                } else {
                    self.pushback = Some(c);
                    break;
                }
            }
            return Token::Number(parse_number(&text));
        }

        if c == '#' {
            loop {
                match self.next_char() {
                    Some('\n') | Some('\r') => return self.next_token(),
                    Some(_) => continue,
                    None => return Token::Eof,
                }
            }
        }

        Token::Char(c)
    }
}

/// Converts a scanned `[0-9.]+` run to a value the way `strtod` would:
/// the longest prefix that parses as a float wins, and a run with no
/// valid prefix (for example `"."`) is 0.
fn parse_number(text: &str) -> f64 {
    for end in (1..=text.len()).rev() {
        if let Ok(value) = text[..end].parse() {
            return value;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::from_source(source);
        let mut tokens = Vec::new();
        loop {
            match lexer.next_token() {
                Token::Eof => return tokens,
                token => tokens.push(token),
            }
        }
    }

    #[test]
    fn lex_works() {
        let input = "def add(x y) x + 1.0;";
        let tokenized = [
            Token::Def,
            Token::Ident("add".to_string()),
            Token::Char('('),
            Token::Ident("x".to_string()),
            Token::Ident("y".to_string()),
            Token::Char(')'),
            Token::Ident("x".to_string()),
            Token::Char('+'),
            Token::Number(1.0),
            Token::Char(';'),
        ];
        assert_eq!(lex_all(input), tokenized);
    }

    #[test]
    fn keywords_only_match_whole_identifiers() {
        assert_eq!(
            lex_all("define externs"),
            [
                Token::Ident("define".to_string()),
                Token::Ident("externs".to_string()),
            ]
        );
    }

    #[test]
    fn adjacent_tokens_are_split_without_whitespace() {
        assert_eq!(
            lex_all("foo(2)<bar"),
            [
                Token::Ident("foo".to_string()),
                Token::Char('('),
                Token::Number(2.0),
                Token::Char(')'),
                Token::Char('<'),
                Token::Ident("bar".to_string()),
            ]
        );
    }

    #[test]
    fn numbers_may_start_with_a_dot() {
        assert_eq!(
            lex_all(".5 42. 1.25"),
            [
                Token::Number(0.5),
                Token::Number(42.0),
                Token::Number(1.25),
            ]
        );
    }

    #[test]
    fn number_runs_convert_leniently() {
        assert_eq!(lex_all("1.2.3"), [Token::Number(1.2)]);
        assert_eq!(lex_all("."), [Token::Number(0.0)]);
        assert_eq!(lex_all("1..5"), [Token::Number(1.0)]);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            lex_all("1 # two 3.0 def (\n4"),
            [Token::Number(1.0), Token::Number(4.0)]
        );
    }

    #[test]
    fn comment_at_end_of_input() {
        assert_eq!(lex_all("1 # trailing"), [Token::Number(1.0)]);
    }

    #[test]
    fn eof_repeats() {
        let mut lexer = Lexer::from_source("x");
        assert_eq!(lexer.next_token(), Token::Ident("x".to_string()));
        assert_eq!(lexer.next_token(), Token::Eof);
        assert_eq!(lexer.next_token(), Token::Eof);
    }
}
