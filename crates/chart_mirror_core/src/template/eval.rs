//! Template execution.

use super::{
    Command, ControlKind, Definitions, Node, Operand, Pipeline, Template, TemplateError, execution,
    functions,
};
use crate::values::Value;

/// Nesting limit for `template`, `include` and `tpl` calls.
const MAX_DEPTH: usize = 100;

static NULL: Value = Value::Null;

/// How execution continues after a node list.
enum Flow {
    Next,
    Break,
    Continue,
}

/// Dot and variables visible at the current position.
struct Scope {
    dot: Value,
    variables: Vec<(String, Value)>,
}

pub(super) struct Evaluator<'a> {
    definitions: &'a Definitions,
    lint_mode: bool,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub(super) const fn new(definitions: &'a Definitions, lint_mode: bool) -> Self {
        Self {
            definitions,
            lint_mode,
            depth: 0,
        }
    }

    pub(super) const fn lint_mode(&self) -> bool {
        self.lint_mode
    }

    /// Execute `nodes` with `dot` bound to both `.` and `$`.
    pub(super) fn execute(&self, nodes: &[Node], dot: Value) -> Result<String, TemplateError> {
        let mut scope = Scope {
            variables: vec![("$".to_owned(), dot.clone())],
            dot,
        };
        let mut output = String::new();
        self.write_nodes(nodes, &mut scope, &mut output)?;
        Ok(output)
    }

    /// Render the named template `name` with `dot`.
    pub(super) fn include(&self, name: &str, dot: Value, line: usize) -> Result<String, TemplateError> {
        let nodes = self
            .definitions
            .get(name)
            .ok_or_else(|| TemplateError::UndefinedTemplate {
                line,
                name: name.to_owned(),
            })?;
        self.nested(self.definitions, line)?.execute(nodes, dot)
    }

    /// Parse `source` and render it with `dot`. Templates it defines are
    /// visible to it alongside the ones already in scope.
    pub(super) fn tpl(&self, source: &str, dot: Value, line: usize) -> Result<String, TemplateError> {
        let Template { nodes, definitions } = Template::parse(source)?;
        let mut visible = self.definitions.clone();
        visible.extend(definitions);
        self.nested(&visible, line)?.execute(&nodes, dot)
    }

    fn nested<'b>(&self, definitions: &'b Definitions, line: usize) -> Result<Evaluator<'b>, TemplateError> {
        if self.depth >= MAX_DEPTH {
            return Err(execution(
                line,
                format!("exceeded max template depth of {MAX_DEPTH}"),
            ));
        }
        Ok(Evaluator {
            definitions,
            lint_mode: self.lint_mode,
            depth: self.depth + 1,
        })
    }

    fn write_nodes(&self, nodes: &[Node], scope: &mut Scope, output: &mut String) -> Result<Flow, TemplateError> {
        for node in nodes {
            let flow = match node {
                Node::Text(text) => {
                    output.push_str(text);
                    Flow::Next
                }
                Node::Action { pipeline, line } => {
                    let value = self.pipeline(pipeline, scope, *line)?;
                    if pipeline.declaration.is_none() {
                        output.push_str(&value.to_string());
                    }
                    Flow::Next
                }
                Node::Control {
                    kind,
                    pipeline,
                    line,
                    body,
                    otherwise,
                } => {
                    let mark = scope.variables.len();
                    let flow = match kind {
                        ControlKind::If => {
                            let condition = self.pipeline(pipeline, scope, *line)?;
                            let branch = if condition.is_truthy() { body } else { otherwise };
                            self.write_nodes(branch, scope, output)?
                        }
                        ControlKind::With => {
                            let value = self.pipeline(pipeline, scope, *line)?;
                            if value.is_truthy() {
                                let outer = std::mem::replace(&mut scope.dot, value);
                                let flow = self.write_nodes(body, scope, output);
                                scope.dot = outer;
                                flow?
                            } else {
                                self.write_nodes(otherwise, scope, output)?
                            }
                        }
                        ControlKind::Range => {
                            self.range(pipeline, *line, body, otherwise, scope, output)?
                        }
                    };
                    scope.variables.truncate(mark);
                    flow
                }
                Node::Call {
                    name,
                    argument,
                    line,
                } => {
                    let dot = match argument {
                        Some(pipeline) => self.pipeline(pipeline, scope, *line)?,
                        None => Value::Null,
                    };
                    output.push_str(&self.include(name, dot, *line)?);
                    Flow::Next
                }
                Node::Break => Flow::Break,
                Node::Continue => Flow::Continue,
            };
            if !matches!(flow, Flow::Next) {
                return Ok(flow);
            }
        }
        Ok(Flow::Next)
    }

    /// Iterate sequences in order, maps in key order and non-negative
    /// integers from zero. Null and empty collections run the `else`
    /// branch.
    fn range(
        &self,
        pipeline: &Pipeline,
        line: usize,
        body: &[Node],
        otherwise: &[Node],
        scope: &mut Scope,
        output: &mut String,
    ) -> Result<Flow, TemplateError> {
        let items: Vec<(Value, Value)> = match self.commands(pipeline, scope, line)? {
            Value::Sequence(items) => (0_i64..).map(Value::Integer).zip(items).collect(),
            Value::Map(map) => map
                .into_iter()
                .map(|(key, value)| (Value::String(key), value))
                .collect(),
            Value::Integer(count) if count >= 0 => (0..count)
                .map(|index| (Value::Integer(index), Value::Integer(index)))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(execution(
                    line,
                    format!("range can't iterate over {other}"),
                ));
            }
        };
        if items.is_empty() {
            return self.write_nodes(otherwise, scope, output);
        }

        let outer = scope.dot.clone();
        for (key, item) in items {
            let mark = scope.variables.len();
            if let Some(declaration) = &pipeline.declaration {
                let bound: Vec<Value> = match declaration.names.len() {
                    1 => vec![item.clone()],
                    _ => vec![key, item.clone()],
                };
                for (name, value) in declaration.names.iter().zip(bound) {
                    bind(scope, name, value, declaration.assign, line)?;
                }
            }
            scope.dot = item;
            let flow = self.write_nodes(body, scope, output)?;
            scope.variables.truncate(mark);
            if matches!(flow, Flow::Break) {
                break;
            }
        }
        scope.dot = outer;
        Ok(Flow::Next)
    }

    /// Evaluate `pipeline` and apply its declaration, if any.
    fn pipeline(&self, pipeline: &Pipeline, scope: &mut Scope, line: usize) -> Result<Value, TemplateError> {
        let value = self.commands(pipeline, scope, line)?;
        if let Some(declaration) = &pipeline.declaration {
            for name in &declaration.names {
                bind(scope, name, value.clone(), declaration.assign, line)?;
            }
        }
        Ok(value)
    }

    fn commands(&self, pipeline: &Pipeline, scope: &mut Scope, line: usize) -> Result<Value, TemplateError> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, piped, scope, line)?);
        }
        Ok(piped.unwrap_or_default())
    }

    fn command(
        &self,
        command: &Command,
        piped: Option<Value>,
        scope: &mut Scope,
        line: usize,
    ) -> Result<Value, TemplateError> {
        match command.operands.split_first() {
            Some((Operand::Function(name), args)) if name == "and" || name == "or" => {
                self.logical(name == "and", args, piped, scope, line)
            }
            Some((Operand::Function(name), args)) => {
                let mut values = args
                    .iter()
                    .map(|arg| self.operand(arg, scope, line))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped);
                let result = functions::call(self, name, values, line)?;
                if name == "set" {
                    if let Some(Operand::Variable { name: variable, path }) = args.first() {
                        if path.is_empty() {
                            bind(scope, variable, result.clone(), true, line)?;
                        }
                    }
                }
                Ok(result)
            }
            Some((operand, [])) if piped.is_none() => self.operand(operand, scope, line),
            _ => Err(execution(line, "can't give argument to non-function".to_owned())),
        }
    }

    /// `and` stops at the first falsy argument and `or` at the first truthy
    /// one; later arguments are not evaluated.
    fn logical(
        &self,
        and: bool,
        args: &[Operand],
        piped: Option<Value>,
        scope: &mut Scope,
        line: usize,
    ) -> Result<Value, TemplateError> {
        if args.is_empty() && piped.is_none() {
            let name = if and { "and" } else { "or" };
            return Err(execution(
                line,
                format!("wrong number of args for {name}: want at least 1 got 0"),
            ));
        }
        let mut last = Value::Null;
        for arg in args {
            last = self.operand(arg, scope, line)?;
            if last.is_truthy() != and {
                return Ok(last);
            }
        }
        Ok(piped.unwrap_or(last))
    }

    fn operand(&self, operand: &Operand, scope: &mut Scope, line: usize) -> Result<Value, TemplateError> {
        match operand {
            Operand::Dot => Ok(scope.dot.clone()),
            Operand::Field(path) => walk(&scope.dot, path, line),
            Operand::Variable { name, path } => {
                let value = scope
                    .variables
                    .iter()
                    .rev()
                    .find(|(declared, _)| declared == name)
                    .map(|(_, value)| value)
                    .ok_or_else(|| execution(line, format!("undefined variable: {name}")))?;
                walk(value, path, line)
            }
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Function(name) => functions::call(self, name, Vec::new(), line),
            Operand::Group(pipeline) => self.commands(pipeline, scope, line),
            Operand::Chain { base, path } => {
                let value = self.operand(base, scope, line)?;
                walk(&value, path, line)
            }
        }
    }
}

/// Declare a new variable or, when `assign` is set, update the innermost
/// one of the same name.
fn bind(scope: &mut Scope, name: &str, value: Value, assign: bool, line: usize) -> Result<(), TemplateError> {
    if !assign {
        scope.variables.push((name.to_owned(), value));
        return Ok(());
    }
    match scope
        .variables
        .iter_mut()
        .rev()
        .find(|(declared, _)| declared == name)
    {
        Some((_, slot)) => {
            *slot = value;
            Ok(())
        }
        None => Err(execution(line, format!("undefined variable: {name}"))),
    }
}

/// Missing map keys yield null; walking further through null or a scalar
/// is an error.
fn walk(base: &Value, path: &[String], line: usize) -> Result<Value, TemplateError> {
    let mut node = base;
    for (depth, segment) in path.iter().enumerate() {
        node = match node {
            Value::Map(map) => map.get(segment).unwrap_or(&NULL),
            Value::Null => {
                let walked = path.iter().take(depth + 1).cloned().collect::<Vec<_>>();
                return Err(execution(
                    line,
                    format!("nil pointer evaluating .{}", walked.join(".")),
                ));
            }
            other => {
                return Err(execution(
                    line,
                    format!(
                        "can't evaluate field {segment} in type {}",
                        other.type_name()
                    ),
                ));
            }
        };
    }
    Ok(node.clone())
}
