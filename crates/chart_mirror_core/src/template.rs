//! Template parsing and evaluation.
//!
//! Implements the chart template language:
//!
//! - literal text and `{{ pipeline }}` actions, with `{{-` and `-}}`
//!   trimming adjacent whitespace, and `{{/* comments */}}`;
//! - `if`, `with` and `range` actions with `else`, `else if` and
//!   `else with` branches, plus `break` and `continue` inside `range`;
//! - named templates through `define`, `template`, `block` and the
//!   `include` function;
//! - `$` variables declared with `:=` and reassigned with `=`, including
//!   `range $key, $value := ...`;
//! - parenthesized pipelines and field access on their results;
//! - the string, logic, collection and encoding functions charts rely on,
//!   among them `default`, `required`, `printf`, `trunc`, `nindent`,
//!   `toYaml`, `tpl` and `semverCompare`.
//!
//! Calls to functions outside the library are rejected when the template
//! is parsed. `set` updates a dictionary held in a variable; a dictionary
//! reached through a field path is returned updated but the context itself
//! is never modified. `lookup` always yields an empty dictionary.
//!
//! A [`TemplateSet`] shares named templates across files, so the
//! definitions in a chart's `_helpers.tpl` are visible to every manifest.

mod eval;
mod functions;
mod parse;

use std::collections::BTreeMap;
use std::fmt;

use crate::values::Value;

use self::eval::Evaluator;

/// Errors raised while parsing or executing a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// The template text is malformed.
    #[error("line {line}: {message}")]
    Syntax {
        /// 1-based line of the offending action.
        line: usize,
        /// Parser diagnostic.
        message: String,
    },

    /// A pipeline calls a function outside the library.
    #[error("line {line}: function {name:?} not defined")]
    UnknownFunction {
        /// 1-based line of the offending action.
        line: usize,
        /// Function name.
        name: String,
    },

    /// The action uses a construct the language does not provide.
    #[error("line {line}: {construct} is not supported")]
    Unsupported {
        /// 1-based line of the offending action.
        line: usize,
        /// Description of the construct.
        construct: String,
    },

    /// A `template` action or `include` call names an unknown template.
    #[error("line {line}: no template {name:?} defined")]
    UndefinedTemplate {
        /// 1-based line of the offending action.
        line: usize,
        /// Requested template name.
        name: String,
    },

    /// Evaluation failed.
    #[error("line {line}: {message}")]
    Execution {
        /// 1-based line of the offending action.
        line: usize,
        /// Evaluation diagnostic.
        message: String,
    },
}

/// One argument or callee of a command.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Dot,
    Field(Vec<String>),
    Variable { name: String, path: Vec<String> },
    Literal(Value),
    Function(String),
    Group(Box<Pipeline>),
    Chain { base: Box<Operand>, path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
struct Command {
    operands: Vec<Operand>,
}

/// `$a := ...`, `$a = ...` or `$k, $v := ...` at the head of a pipeline.
#[derive(Debug, Clone, PartialEq)]
struct Declaration {
    names: Vec<String>,
    assign: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Pipeline {
    declaration: Option<Declaration>,
    commands: Vec<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKind {
    If,
    With,
    Range,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::If => "if",
            Self::With => "with",
            Self::Range => "range",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Action {
        pipeline: Pipeline,
        line: usize,
    },
    Control {
        kind: ControlKind,
        pipeline: Pipeline,
        line: usize,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Call {
        name: String,
        argument: Option<Pipeline>,
        line: usize,
    },
    Break,
    Continue,
}

type Definitions = BTreeMap<String, Vec<Node>>;

/// A parsed template together with the named templates it defines.
///
/// # Examples
///
/// ```
/// use chart_mirror_core::template::Template;
/// use chart_mirror_core::values::Value;
///
/// let template = Template::parse("image: {{ .image | default \"nginx\" | quote }}")
///     .expect("valid template");
/// let context = Value::map([("image", Value::Null)]);
/// assert_eq!(
///     template.render(&context, false).expect("renders"),
///     "image: \"nginx\""
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
    definitions: Definitions,
}

impl Template {
    /// Parse template text.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] for malformed actions, unbalanced
    /// blocks, `break` or `continue` outside `range`, nested `define`
    /// actions and calls to unknown functions.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let (nodes, definitions) = parse::parse(source)?;
        Ok(Self { nodes, definitions })
    }

    /// Render the template against `context`, the value bound to `.` and
    /// `$`. Only the templates this text defines can be called.
    ///
    /// In `lint_mode`, `required` and `fail` yield an empty string instead
    /// of failing.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] when a field path walks through a
    /// missing or scalar value, a function rejects its arguments, a named
    /// template is missing, or `required` or `fail` trigger outside lint
    /// mode.
    pub fn render(&self, context: &Value, lint_mode: bool) -> Result<String, TemplateError> {
        Evaluator::new(&self.definitions, lint_mode).execute(&self.nodes, context.clone())
    }
}

/// Templates sharing one namespace of named definitions.
///
/// # Examples
///
/// ```
/// use chart_mirror_core::template::TemplateSet;
/// use chart_mirror_core::values::Value;
///
/// let mut set = TemplateSet::new();
/// set.add("_helpers.tpl", "{{ define \"app.image\" }}nginx:{{ .tag }}{{ end }}")
///     .expect("helpers parse");
/// set.add("pod.yaml", "image: {{ include \"app.image\" . | quote }}")
///     .expect("manifest parses");
///
/// let context = Value::map([("tag", Value::from("1.25"))]);
/// assert_eq!(
///     set.render("pod.yaml", &context, false).expect("renders"),
///     "image: \"nginx:1.25\""
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSet {
    templates: Definitions,
}

impl TemplateSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` and register it under `name`, together with every
    /// template it defines. A later definition replaces an earlier one of
    /// the same name.
    ///
    /// # Errors
    ///
    /// Returns the [`TemplateError`] raised by [`Template::parse`].
    pub fn add(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        let Template { nodes, definitions } = Template::parse(source)?;
        self.templates.extend(definitions);
        self.templates.insert(name.to_owned(), nodes);
        Ok(())
    }

    /// Returns true when a template is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Render the template registered under `name` against `context`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UndefinedTemplate`] for an unknown name and
    /// otherwise the errors of [`Template::render`].
    pub fn render(&self, name: &str, context: &Value, lint_mode: bool) -> Result<String, TemplateError> {
        Evaluator::new(&self.templates, lint_mode).include(name, context.clone(), 0)
    }
}

fn syntax(line: usize, message: &str) -> TemplateError {
    TemplateError::Syntax {
        line,
        message: message.to_owned(),
    }
}

fn execution(line: usize, message: String) -> TemplateError {
    TemplateError::Execution { line, message }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
