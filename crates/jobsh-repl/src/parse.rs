//! Line splitter: turns one input line into jobs.
//!
//! Understands words, single and double quotes, backslash escapes, `|`,
//! `<`, `>`, `>>`, `;`, a `&` that sends the job before it to the
//! background, and `#` comments. No expansion of any kind.

use jobsh_types::{JobMode, JobSpec, OutputMode, ProcessSpec};
use logos::Logos;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(&'static str),
    #[error("missing file name after `{0}`")]
    MissingTarget(&'static str),
    #[error("syntax error near `{0}`")]
    Unexpected(&'static str),
}

/// Errors raised by the lexer itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum LexError {
    #[default]
    UnexpectedCharacter,
    UnterminatedSingle,
    UnterminatedDouble,
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        match err {
            LexError::UnexpectedCharacter => ParseError::Unexpected("character"),
            LexError::UnterminatedSingle => ParseError::UnterminatedQuote("single"),
            LexError::UnterminatedDouble => ParseError::UnterminatedQuote("double"),
        }
    }
}

/// Tokens of one command line.
///
/// A word is any run of unquoted characters, backslash escapes and quoted
/// sections; it ends at whitespace or an operator. `#` only starts a
/// comment at the beginning of a word.
#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(error = LexError)]
#[logos(skip r"\s+")]
enum Token {
    #[regex(
        r#"([^\s|<>;&'"\\#]|\\.?|'[^']*'|"([^"\\]|\\.)*")([^\s|<>;&'"\\]|\\.?|'[^']*'|"([^"\\]|\\.)*")*"#,
        unescape
    )]
    Word(String),

    #[token("|")]
    Pipe,

    #[token("<")]
    Input,

    #[token(">")]
    Output,

    #[token(">>")]
    Append,

    /// `;` or `&`, with the mode it gives the job before it.
    #[token(";", |_| JobMode::Foreground)]
    #[token("&", |_| JobMode::Background)]
    End(JobMode),

    /// Everything after it is ignored.
    #[token("#")]
    Comment,

    // Never produced: their callbacks always fail.
    #[regex(r"'[^']*", unterminated_single)]
    UnterminatedSingle,

    #[regex(r#""([^"\\]|\\.)*"#, unterminated_double)]
    UnterminatedDouble,
}

impl Token {
    fn text(&self) -> &'static str {
        match self {
            Token::Word(_) => "word",
            Token::Pipe => "|",
            Token::Input => "<",
            Token::Output => ">",
            Token::Append => ">>",
            Token::End(JobMode::Foreground) => ";",
            Token::End(JobMode::Background) => "&",
            Token::Comment => "#",
            Token::UnterminatedSingle => "'",
            Token::UnterminatedDouble => "\"",
        }
    }
}

/// Strip quotes and resolve escapes in a matched word.
///
/// Single quotes keep everything literally. Inside double quotes only
/// `\"` and `\\` are escapes; outside quotes a backslash takes the next
/// character literally.
fn unescape(lex: &mut logos::Lexer<Token>) -> String {
    let mut word = String::new();
    let mut chars = lex.slice().chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => word.extend(chars.by_ref().take_while(|&c| c != '\'')),
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => match chars.next_if(|&c| c == '"' || c == '\\') {
                            Some(escaped) => word.push(escaped),
                            None => word.push('\\'),
                        },
                        c => word.push(c),
                    }
                }
            }
            '\\' => word.extend(chars.next()),
            c => word.push(c),
        }
    }
    word
}

fn unterminated_single(_lex: &mut logos::Lexer<Token>) -> Result<(), LexError> {
    Err(LexError::UnterminatedSingle)
}

fn unterminated_double(_lex: &mut logos::Lexer<Token>) -> Result<(), LexError> {
    Err(LexError::UnterminatedDouble)
}

/// Tokens with the byte offset each one starts at.
fn tokenize(line: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(line).spanned() {
        match result? {
            Token::Comment => break,
            token => tokens.push((span.start, token)),
        }
    }
    Ok(tokens)
}

/// Stage being assembled.
#[derive(Default)]
struct Stage {
    argv: Vec<String>,
    input: Option<String>,
    output: Option<(String, OutputMode)>,
}

impl Stage {
    fn is_empty(&self) -> bool {
        self.argv.is_empty() && self.input.is_none() && self.output.is_none()
    }

    fn finish(self, near: &'static str) -> Result<ProcessSpec, ParseError> {
        let mut spec = ProcessSpec::from_argv(self.argv).ok_or(ParseError::Unexpected(near))?;
        if let Some(path) = self.input {
            spec = spec.stdin_from(path);
        }
        if let Some((path, mode)) = self.output {
            spec = spec.stdout_to(path, mode);
        }
        Ok(spec)
    }
}

/// Split `line` into jobs, in the order they should run.
pub fn parse_line(line: &str) -> Result<Vec<JobSpec>, ParseError> {
    let mut jobs = Vec::new();
    let mut stages: Vec<ProcessSpec> = Vec::new();
    let mut stage = Stage::default();
    let mut job_start: Option<usize> = None;
    let mut tokens = tokenize(line)?.into_iter().peekable();

    while let Some((offset, token)) = tokens.next() {
        job_start.get_or_insert(offset);
        match token {
            Token::Word(word) => stage.argv.push(word),
            Token::Input | Token::Output | Token::Append => {
                let Some((_, Token::Word(path))) = tokens.next_if(|(_, t)| matches!(t, Token::Word(_)))
                else {
                    return Err(ParseError::MissingTarget(token.text()));
                };
                match token {
                    Token::Input => stage.input = Some(path),
                    Token::Output => stage.output = Some((path, OutputMode::Truncate)),
                    _ => stage.output = Some((path, OutputMode::Append)),
                }
            }
            Token::Pipe => {
                stages.push(std::mem::take(&mut stage).finish("|")?);
            }
            Token::End(mode) => {
                if stage.is_empty() && stages.is_empty() {
                    return Err(ParseError::Unexpected(token.text()));
                }
                stages.push(std::mem::take(&mut stage).finish(token.text())?);
                let start = job_start.take().unwrap_or(0);
                let command = line[start..offset].trim();
                jobs.push(JobSpec::new(std::mem::take(&mut stages), mode).with_command(command));
            }
            // `tokenize` stops at `Comment`; the unterminated variants always fail to lex.
            Token::Comment | Token::UnterminatedSingle | Token::UnterminatedDouble => unreachable!(),
        }
    }

    if !stage.is_empty() || !stages.is_empty() {
        stages.push(stage.finish("|")?);
        let start = job_start.unwrap_or(0);
        let command = strip_comment(&line[start..]).trim();
        jobs.push(JobSpec::foreground(stages).with_command(command));
    }
    Ok(jobs)
}

/// Drop a trailing unquoted `#` comment from display text.
fn strip_comment(text: &str) -> &str {
    let mut quote = None;
    let mut prev_space = true;
    for (index, c) in text.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), c) if q == c => quote = None,
            (None, '#') if prev_space => return &text[..index],
            _ => {}
        }
        prev_space = c.is_whitespace();
    }
    text
}
