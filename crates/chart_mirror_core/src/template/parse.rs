//! Lexing and parsing of template text.

use std::iter::Peekable;
use std::str::Chars;

use super::{
    Command, ControlKind, Declaration, Definitions, Node, Operand, Pipeline, TemplateError,
    functions, syntax,
};
use crate::values::Value;

#[derive(Debug)]
enum Token {
    Text(String),
    Action { body: String, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
enum Word {
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
    Dot,
    Field(Vec<String>),
    /// Field access written directly after `)`.
    Chain(Vec<String>),
    Variable { name: String, path: Vec<String> },
    Literal(Value),
    Ident(String),
}

/// Parse `source` into its top-level nodes and the templates it defines.
pub(super) fn parse(source: &str) -> Result<(Vec<Node>, Definitions), TemplateError> {
    let mut parser = Parser {
        tokens: lex(source)?.into_iter(),
        definitions: Definitions::new(),
        depth: 0,
        loops: 0,
    };
    let (nodes, stop) = parser.block()?;
    match stop {
        Stop::Eof => Ok((nodes, parser.definitions)),
        Stop::End(line) => Err(syntax(line, "unexpected {{end}}")),
        Stop::Else(line) | Stop::ElseControl(_, _, line) => Err(syntax(line, "unexpected {{else}}")),
    }
}

fn lex(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1;
    let mut trim_next = false;

    while let Some(open) = rest.find("{{") {
        let (text, tail) = rest.split_at(open);
        let after_open = tail.get(2..).unwrap_or_default();
        let (trim_left, region) = match after_open.strip_prefix('-') {
            Some(stripped) if stripped.starts_with(char::is_whitespace) => (true, stripped),
            _ => (false, after_open),
        };
        push_text(&mut tokens, text, trim_next, trim_left);
        line += text.matches('\n').count();

        let close = find_close(region, line)?;
        let (body, after_body) = region.split_at(close);
        let (trim_right, body) = match body.strip_suffix('-') {
            Some(stripped) if stripped.ends_with(char::is_whitespace) => (true, stripped),
            _ => (false, body),
        };
        if !is_comment(body) {
            tokens.push(Token::Action {
                body: body.to_owned(),
                line,
            });
        }
        line += body.matches('\n').count();
        rest = after_body.strip_prefix("}}").unwrap_or(after_body);
        trim_next = trim_right;
    }
    push_text(&mut tokens, rest, trim_next, false);
    Ok(tokens)
}

fn push_text(tokens: &mut Vec<Token>, text: &str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        tokens.push(Token::Text(text.to_owned()));
    }
}

fn is_comment(body: &str) -> bool {
    let body = body.trim();
    body.starts_with("/*") && body.ends_with("*/")
}

/// Byte offset of the `}}` closing the action that starts `region`.
fn find_close(region: &str, line: usize) -> Result<usize, TemplateError> {
    let leading = region.len() - region.trim_start().len();
    if region.trim_start().starts_with("/*") {
        let opened = leading + 2;
        let end = region
            .get(opened..)
            .and_then(|tail| tail.find("*/"))
            .map(|end| opened + end)
            .ok_or_else(|| syntax(line, "unclosed comment"))?;
        let after = end + 2;
        return region
            .get(after..)
            .and_then(|tail| tail.find("}}"))
            .map(|close| after + close)
            .ok_or_else(|| syntax(line, "unclosed action"));
    }

    let mut quote = None;
    let mut escaped = false;
    let mut previous_brace = false;
    for (position, c) in region.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if c == '"' || c == '`' => quote = Some(c),
            None if c == '}' && previous_brace => return Ok(position - 1),
            None => {}
        }
        previous_brace = quote.is_none() && c == '}';
    }
    Err(syntax(line, "unclosed action"))
}

fn scan_words(body: &str, line: usize) -> Result<Vec<Word>, TemplateError> {
    let mut words = Vec::new();
    let mut chars = body.chars().peekable();
    let mut after_paren = false;
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            after_paren = false;
            continue;
        }
        let word = match c {
            '|' | '(' | ')' | ',' | '=' => {
                chars.next();
                match c {
                    '|' => Word::Pipe,
                    '(' => Word::LeftParen,
                    ')' => Word::RightParen,
                    ',' => Word::Comma,
                    _ => Word::Assign,
                }
            }
            ':' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(syntax(line, "expected := after colon"));
                }
                Word::Declare
            }
            '"' => {
                chars.next();
                Word::Literal(Value::String(scan_quoted(&mut chars, line)?))
            }
            '`' => {
                chars.next();
                Word::Literal(Value::String(scan_raw(&mut chars, line)?))
            }
            '.' => {
                chars.next();
                let path = scan_path(&mut chars, line)?;
                match (after_paren, path.is_empty()) {
                    (true, true) => return Err(syntax(line, "unexpected . after term")),
                    (true, false) => Word::Chain(path),
                    (false, true) => Word::Dot,
                    (false, false) => Word::Field(path),
                }
            }
            '$' => {
                chars.next();
                let ident = take_while(&mut chars, |c| c.is_alphanumeric() || c == '_');
                let path = if chars.next_if_eq(&'.').is_some() {
                    let path = scan_path(&mut chars, line)?;
                    if path.is_empty() {
                        return Err(syntax(line, &format!("bad field path after ${ident}")));
                    }
                    path
                } else {
                    Vec::new()
                };
                Word::Variable {
                    name: format!("${ident}"),
                    path,
                }
            }
            '-' | '+' | '0'..='9' => Word::Literal(scan_number(&mut chars, line)?),
            c if c.is_alphabetic() || c == '_' => {
                let ident = take_while(&mut chars, |c| c.is_alphanumeric() || c == '_');
                match ident.as_str() {
                    "true" => Word::Literal(Value::Bool(true)),
                    "false" => Word::Literal(Value::Bool(false)),
                    "nil" => Word::Literal(Value::Null),
                    _ => Word::Ident(ident),
                }
            }
            other => return Err(syntax(line, &format!("unexpected {other:?} in action"))),
        };
        after_paren = matches!(word, Word::RightParen);
        words.push(word);
    }
    Ok(words)
}

fn take_while(chars: &mut Peekable<Chars<'_>>, accept: impl Fn(char) -> bool) -> String {
    let mut taken = String::new();
    while let Some(c) = chars.next_if(|c| accept(*c)) {
        taken.push(c);
    }
    taken
}

/// Dotted path following a `.` that has already been consumed. Empty when
/// the dot stands alone.
fn scan_path(chars: &mut Peekable<Chars<'_>>, line: usize) -> Result<Vec<String>, TemplateError> {
    let path = take_while(chars, |c| c.is_alphanumeric() || c == '_' || c == '.');
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
    if segments.iter().any(String::is_empty) {
        return Err(syntax(line, &format!("bad field path .{path}")));
    }
    Ok(segments)
}

fn scan_number(chars: &mut Peekable<Chars<'_>>, line: usize) -> Result<Value, TemplateError> {
    let literal = take_while(chars, |c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.')
    });
    if let Ok(number) = literal.parse() {
        return Ok(Value::Integer(number));
    }
    match literal.parse::<f64>() {
        Ok(number) if number.is_finite() => Ok(Value::Float(number)),
        _ => Err(TemplateError::Unsupported {
            line,
            construct: format!("number literal {literal}"),
        }),
    }
}

fn scan_quoted(chars: &mut Peekable<Chars<'_>>, line: usize) -> Result<String, TemplateError> {
    let mut text = String::new();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Ok(text),
            '\\' => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('r') => text.push('\r'),
                Some(other) => text.push(other),
                None => break,
            },
            other => text.push(other),
        }
    }
    Err(syntax(line, "unterminated quoted string"))
}

fn scan_raw(chars: &mut Peekable<Chars<'_>>, line: usize) -> Result<String, TemplateError> {
    let mut text = String::new();
    for c in chars.by_ref() {
        if c == '`' {
            return Ok(text);
        }
        text.push(c);
    }
    Err(syntax(line, "unterminated raw string"))
}

enum Stop {
    Eof,
    End(usize),
    Else(usize),
    ElseControl(ControlKind, Pipeline, usize),
}

enum Directive {
    Output(Pipeline),
    Open(ControlKind, Pipeline),
    ElseControl(ControlKind, Pipeline),
    Else,
    End,
    Define(String),
    Block(String, Pipeline),
    Call(String, Option<Pipeline>),
    Break,
    Continue,
}

struct Parser {
    tokens: std::vec::IntoIter<Token>,
    definitions: Definitions,
    /// Open actions enclosing the current position.
    depth: usize,
    /// Open `range` bodies enclosing the current position.
    loops: usize,
}

impl Parser {
    fn block(&mut self) -> Result<(Vec<Node>, Stop), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(token) = self.tokens.next() {
            let (body, line) = match token {
                Token::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Token::Action { body, line } => (body, line),
            };
            match directive(&body, line)? {
                Directive::Output(pipeline) => nodes.push(Node::Action { pipeline, line }),
                Directive::Open(kind, pipeline) => nodes.push(self.control(kind, pipeline, line)?),
                Directive::ElseControl(kind, pipeline) => {
                    return Ok((nodes, Stop::ElseControl(kind, pipeline, line)));
                }
                Directive::Else => return Ok((nodes, Stop::Else(line))),
                Directive::End => return Ok((nodes, Stop::End(line))),
                Directive::Define(name) => {
                    if self.depth > 0 {
                        return Err(syntax(line, "unexpected {{define}} inside an action"));
                    }
                    let body = self.definition(line)?;
                    self.definitions.insert(name, body);
                }
                Directive::Block(name, pipeline) => {
                    let body = self.definition(line)?;
                    self.definitions.insert(name.clone(), body);
                    nodes.push(Node::Call {
                        name,
                        argument: Some(pipeline),
                        line,
                    });
                }
                Directive::Call(name, argument) => nodes.push(Node::Call {
                    name,
                    argument,
                    line,
                }),
                Directive::Break if self.loops > 0 => nodes.push(Node::Break),
                Directive::Continue if self.loops > 0 => nodes.push(Node::Continue),
                Directive::Break => return Err(syntax(line, "{{break}} outside {{range}}")),
                Directive::Continue => return Err(syntax(line, "{{continue}} outside {{range}}")),
            }
        }
        Ok((nodes, Stop::Eof))
    }

    /// Body of a `define` or `block`, up to its `{{end}}`.
    fn definition(&mut self, line: usize) -> Result<Vec<Node>, TemplateError> {
        let loops = std::mem::take(&mut self.loops);
        self.depth += 1;
        let (body, stop) = self.block()?;
        self.depth -= 1;
        self.loops = loops;
        match stop {
            Stop::End(_) => Ok(body),
            Stop::Eof => Err(syntax(line, "unexpected EOF in {{define}}")),
            Stop::Else(extra) | Stop::ElseControl(_, _, extra) => {
                Err(syntax(extra, "unexpected {{else}} in {{define}}"))
            }
        }
    }

    /// Body and `else` branch of an `if`, `with` or `range`, up to the
    /// matching `{{end}}`. `else if` and `else with` nest a new action that
    /// shares that `{{end}}`.
    fn control(&mut self, kind: ControlKind, pipeline: Pipeline, line: usize) -> Result<Node, TemplateError> {
        let looping = kind == ControlKind::Range;
        self.depth += 1;
        self.loops += usize::from(looping);
        let parsed = self.block();
        self.loops -= usize::from(looping);
        let (body, stop) = parsed?;

        let otherwise = match stop {
            Stop::End(_) => Vec::new(),
            Stop::Else(else_line) => {
                let (otherwise, stop) = self.block()?;
                match stop {
                    Stop::End(_) => otherwise,
                    Stop::Eof => return Err(syntax(else_line, "unexpected EOF in {{else}}")),
                    Stop::Else(extra) | Stop::ElseControl(_, _, extra) => {
                        return Err(syntax(extra, "{{else}} after {{else}}"));
                    }
                }
            }
            Stop::ElseControl(nested, condition, else_line) => {
                vec![self.control(nested, condition, else_line)?]
            }
            Stop::Eof => return Err(syntax(line, &format!("unexpected EOF in {{{{{kind}}}}}"))),
        };
        self.depth -= 1;
        Ok(Node::Control {
            kind,
            pipeline,
            line,
            body,
            otherwise,
        })
    }
}

fn directive(body: &str, line: usize) -> Result<Directive, TemplateError> {
    let words = scan_words(body, line)?;
    let Some((first, rest)) = words.split_first() else {
        return Err(syntax(line, "missing value for command"));
    };
    let keyword = match first {
        Word::Ident(keyword) => keyword.as_str(),
        _ => "",
    };
    match keyword {
        "if" | "with" | "range" => {
            let kind = control_kind(keyword);
            if rest.is_empty() {
                return Err(syntax(line, &format!("missing value for {keyword}")));
            }
            let variables = if kind == ControlKind::Range { 2 } else { 1 };
            pipeline(rest, line, variables).map(|pipeline| Directive::Open(kind, pipeline))
        }
        "else" => match rest.split_first() {
            None => Ok(Directive::Else),
            Some((Word::Ident(nested), condition))
                if (nested == "if" || nested == "with") && !condition.is_empty() =>
            {
                let kind = control_kind(nested);
                pipeline(condition, line, 1).map(|pipeline| Directive::ElseControl(kind, pipeline))
            }
            Some(_) => Err(syntax(line, "unexpected words after {{else}}")),
        },
        "end" => bare(rest, line, Directive::End),
        "break" => bare(rest, line, Directive::Break),
        "continue" => bare(rest, line, Directive::Continue),
        "define" => match rest {
            [Word::Literal(Value::String(name))] => Ok(Directive::Define(name.clone())),
            _ => Err(syntax(line, "define expects a quoted template name")),
        },
        "template" => match rest {
            [Word::Literal(Value::String(name)), argument @ ..] => {
                let argument = if argument.is_empty() {
                    None
                } else {
                    Some(pipeline(argument, line, 0)?)
                };
                Ok(Directive::Call(name.clone(), argument))
            }
            _ => Err(syntax(line, "template expects a quoted template name")),
        },
        "block" => match rest {
            [Word::Literal(Value::String(name)), argument @ ..] if !argument.is_empty() => {
                pipeline(argument, line, 0).map(|pipeline| Directive::Block(name.clone(), pipeline))
            }
            _ => Err(syntax(line, "block expects a quoted template name and a pipeline")),
        },
        _ => pipeline(&words, line, 1).map(Directive::Output),
    }
}

fn control_kind(keyword: &str) -> ControlKind {
    match keyword {
        "with" => ControlKind::With,
        "range" => ControlKind::Range,
        _ => ControlKind::If,
    }
}

fn bare(rest: &[Word], line: usize, directive: Directive) -> Result<Directive, TemplateError> {
    if rest.is_empty() {
        Ok(directive)
    } else {
        Err(syntax(line, "unexpected words after keyword"))
    }
}

/// Parse a whole action body as a pipeline declaring at most `variables`
/// variables.
fn pipeline(words: &[Word], line: usize, variables: usize) -> Result<Pipeline, TemplateError> {
    let mut cursor = Cursor {
        words,
        position: 0,
        line,
    };
    let declaration = cursor.declaration(variables)?;
    let pipeline = cursor.pipeline(declaration)?;
    match cursor.peek() {
        None => Ok(pipeline),
        Some(Word::RightParen) => Err(syntax(line, "unexpected right paren")),
        Some(_) => Err(syntax(line, "unexpected word in action")),
    }
}

struct Cursor<'w> {
    words: &'w [Word],
    position: usize,
    line: usize,
}

impl<'w> Cursor<'w> {
    fn peek(&self) -> Option<&'w Word> {
        self.words.get(self.position)
    }

    fn advance(&mut self) -> Option<&'w Word> {
        let word = self.peek();
        if word.is_some() {
            self.position += 1;
        }
        word
    }

    fn declaration(&mut self, variables: usize) -> Result<Option<Declaration>, TemplateError> {
        let rest = self.words.get(self.position..).unwrap_or_default();
        let (names, operator, consumed) = match rest {
            [
                Word::Variable { name, path },
                operator @ (Word::Declare | Word::Assign),
                ..,
            ] if path.is_empty() => (vec![name.clone()], operator, 2),
            [
                Word::Variable { name: key, path: key_path },
                Word::Comma,
                Word::Variable { name: value, path: value_path },
                operator @ (Word::Declare | Word::Assign),
                ..,
            ] if key_path.is_empty() && value_path.is_empty() => {
                (vec![key.clone(), value.clone()], operator, 4)
            }
            _ => return Ok(None),
        };
        if names.len() > variables {
            return Err(syntax(self.line, "too many declarations in command"));
        }
        if names.iter().any(|name| name == "$") {
            return Err(syntax(self.line, "cannot assign to $"));
        }
        self.position += consumed;
        Ok(Some(Declaration {
            names,
            assign: matches!(operator, Word::Assign),
        }))
    }

    fn pipeline(&mut self, declaration: Option<Declaration>) -> Result<Pipeline, TemplateError> {
        let mut commands = Vec::new();
        loop {
            let command = self.command()?;
            if !commands.is_empty() && !matches!(command.operands.first(), Some(Operand::Function(_))) {
                return Err(syntax(self.line, "non executable command in pipeline stage"));
            }
            commands.push(command);
            if matches!(self.peek(), Some(Word::Pipe)) {
                self.position += 1;
            } else {
                break;
            }
        }
        Ok(Pipeline {
            declaration,
            commands,
        })
    }

    fn command(&mut self) -> Result<Command, TemplateError> {
        let mut operands = Vec::new();
        while let Some(word) = self.peek() {
            if matches!(word, Word::Pipe | Word::RightParen) {
                break;
            }
            operands.push(self.operand()?);
        }
        match operands.as_slice() {
            [] => Err(syntax(self.line, "missing command in pipeline")),
            [Operand::Function(_), ..] | [_] => Ok(Command { operands }),
            _ => Err(syntax(self.line, "can't give argument to non-function")),
        }
    }

    fn operand(&mut self) -> Result<Operand, TemplateError> {
        let line = self.line;
        let mut operand = match self.advance() {
            Some(Word::Dot) => Operand::Dot,
            Some(Word::Field(path)) => Operand::Field(path.clone()),
            Some(Word::Variable { name, path }) => Operand::Variable {
                name: name.clone(),
                path: path.clone(),
            },
            Some(Word::Literal(value)) => Operand::Literal(value.clone()),
            Some(Word::Ident(name)) => {
                if !functions::is_defined(name) {
                    return Err(TemplateError::UnknownFunction {
                        line,
                        name: name.clone(),
                    });
                }
                Operand::Function(name.clone())
            }
            Some(Word::LeftParen) => {
                let inner = self.pipeline(None)?;
                if !matches!(self.advance(), Some(Word::RightParen)) {
                    return Err(syntax(line, "unclosed left paren"));
                }
                Operand::Group(Box::new(inner))
            }
            Some(Word::Declare | Word::Assign | Word::Comma) => {
                return Err(syntax(line, "unexpected declaration in command"));
            }
            Some(Word::Pipe | Word::RightParen | Word::Chain(_)) | None => {
                return Err(syntax(line, "missing operand"));
            }
        };
        while let Some(Word::Chain(path)) = self.peek() {
            self.position += 1;
            operand = Operand::Chain {
                base: Box::new(operand),
                path: path.clone(),
            };
        }
        Ok(operand)
    }
}
