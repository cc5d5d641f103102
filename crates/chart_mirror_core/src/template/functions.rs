//! Function library available to pipelines.
//!
//! Functions take their arguments in call order with any piped value
//! appended last, so `{{ .name | trunc 63 }}` calls `trunc 63 .name`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::eval::Evaluator;
use super::{TemplateError, execution};
use crate::values::Value;

/// Every function a pipeline may call.
const FUNCTIONS: &[&str] = &[
    // logic and comparison
    "and", "or", "not", "eq", "ne", "lt", "le", "gt", "ge", "default", "empty", "coalesce",
    "ternary", "required", "fail",
    // strings
    "quote", "squote", "upper", "lower", "title", "trim", "trimSuffix", "trimPrefix", "trunc",
    "replace", "contains", "hasPrefix", "hasSuffix", "printf", "print", "cat", "indent",
    "nindent", "b64enc", "toString",
    // numbers
    "int", "int64", "add", "sub",
    // collections
    "list", "dict", "get", "set", "hasKey", "keys", "index", "len", "merge",
    // encoding
    "toYaml", "toJson",
    // charts
    "include", "tpl", "lookup", "semverCompare",
];

pub(super) fn is_defined(name: &str) -> bool {
    FUNCTIONS.contains(&name)
}

/// Call `name` with already evaluated arguments.
pub(super) fn call(
    evaluator: &Evaluator<'_>,
    name: &str,
    args: Vec<Value>,
    line: usize,
) -> Result<Value, TemplateError> {
    match name {
        "include" => {
            let [template, dot] = exactly(name, args, line)?;
            evaluator
                .include(&template.to_string(), dot, line)
                .map(Value::String)
        }
        "tpl" => {
            let [source, dot] = exactly(name, args, line)?;
            evaluator
                .tpl(&source.to_string(), dot, line)
                .map(Value::String)
        }
        "required" => {
            let [message, value] = exactly(name, args, line)?;
            let missing = match &value {
                Value::Null => true,
                Value::String(text) => text.is_empty(),
                _ => false,
            };
            match (missing, evaluator.lint_mode()) {
                (false, _) => Ok(value),
                (true, true) => Ok(Value::String(String::new())),
                (true, false) => Err(execution(line, format!("error calling required: {message}"))),
            }
        }
        "fail" => {
            let [message] = exactly(name, args, line)?;
            if evaluator.lint_mode() {
                Ok(Value::String(String::new()))
            } else {
                Err(execution(line, format!("error calling fail: {message}")))
            }
        }
        _ => builtin(name, args).map_err(|message| execution(line, message)),
    }
}

/// Functions that only depend on their arguments.
fn builtin(name: &str, args: Vec<Value>) -> Result<Value, String> {
    let value = match name {
        "and" => {
            at_least(name, &args, 1)?;
            args.iter()
                .find(|value| !value.is_truthy())
                .or(args.last())
                .cloned()
                .unwrap_or_default()
        }
        "or" => {
            at_least(name, &args, 1)?;
            args.iter()
                .find(|value| value.is_truthy())
                .or(args.last())
                .cloned()
                .unwrap_or_default()
        }
        "not" => {
            let [value] = arity(name, args)?;
            Value::Bool(!value.is_truthy())
        }
        "eq" => {
            at_least(name, &args, 2)?;
            let mut args = args.into_iter();
            let first = args.next().unwrap_or_default();
            Value::Bool(args.any(|other| loosely_equal(&first, &other)))
        }
        "ne" => {
            let [left, right] = arity(name, args)?;
            Value::Bool(!loosely_equal(&left, &right))
        }
        "lt" | "le" | "gt" | "ge" => {
            let [left, right] = arity(name, args)?;
            let ordering = compare(&left, &right)?;
            Value::Bool(match name {
                "lt" => ordering == Ordering::Less,
                "le" => ordering != Ordering::Greater,
                "gt" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        "default" => {
            let mut args = args.into_iter();
            let fallback = args
                .next()
                .ok_or_else(|| "wrong number of args for default: want 1 got 0".to_owned())?;
            match args.next() {
                Some(given) if given.is_truthy() => given,
                _ => fallback,
            }
        }
        "empty" => {
            let [value] = arity(name, args)?;
            Value::Bool(!value.is_truthy())
        }
        "coalesce" => args
            .into_iter()
            .find(Value::is_truthy)
            .unwrap_or_default(),
        "ternary" => {
            let [when_true, when_false, condition] = arity(name, args)?;
            if condition.is_truthy() { when_true } else { when_false }
        }
        "quote" => Value::String(join_quoted(&args, |text| format!("{text:?}"))),
        "squote" => Value::String(join_quoted(&args, |text| format!("'{text}'"))),
        "upper" | "lower" | "title" | "trim" | "b64enc" | "toString" => {
            let [value] = arity(name, args)?;
            let text = value.to_string();
            Value::String(match name {
                "upper" => text.to_uppercase(),
                "lower" => text.to_lowercase(),
                "title" => title_case(&text),
                "trim" => text.trim().to_owned(),
                "b64enc" => STANDARD.encode(text),
                _ => text,
            })
        }
        "trimSuffix" => {
            let [suffix, value] = arity(name, args)?;
            let (suffix, text) = (suffix.to_string(), value.to_string());
            Value::from(text.strip_suffix(suffix.as_str()).unwrap_or(&text))
        }
        "trimPrefix" => {
            let [prefix, value] = arity(name, args)?;
            let (prefix, text) = (prefix.to_string(), value.to_string());
            Value::from(text.strip_prefix(prefix.as_str()).unwrap_or(&text))
        }
        "trunc" => {
            let [length, value] = arity(name, args)?;
            Value::String(truncate(&value.to_string(), integer(&length)?))
        }
        "replace" => {
            let [old, new, value] = arity(name, args)?;
            Value::String(value.to_string().replace(&old.to_string(), &new.to_string()))
        }
        "contains" | "hasPrefix" | "hasSuffix" => {
            let [needle, value] = arity(name, args)?;
            let (needle, text) = (needle.to_string(), value.to_string());
            Value::Bool(match name {
                "contains" => text.contains(&needle),
                "hasPrefix" => text.starts_with(&needle),
                _ => text.ends_with(&needle),
            })
        }
        "printf" => {
            at_least(name, &args, 1)?;
            let mut args = args.into_iter();
            let format = args.next().unwrap_or_default().to_string();
            Value::String(sprintf(&format, &args.collect::<Vec<_>>()))
        }
        "print" => Value::String(sprint(&args)),
        "cat" => Value::String(
            args.iter()
                .filter(|value| !matches!(value, Value::Null))
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "indent" | "nindent" => {
            let [width, value] = arity(name, args)?;
            let indented = indent(&value.to_string(), integer(&width)?);
            Value::String(if name == "nindent" {
                format!("\n{indented}")
            } else {
                indented
            })
        }
        "int" | "int64" => {
            let [value] = arity(name, args)?;
            Value::Integer(integer(&value)?)
        }
        "add" => {
            at_least(name, &args, 1)?;
            let mut total: i64 = 0;
            for value in &args {
                total = total.saturating_add(integer(value)?);
            }
            Value::Integer(total)
        }
        "sub" => {
            let [left, right] = arity(name, args)?;
            Value::Integer(integer(&left)?.saturating_sub(integer(&right)?))
        }
        "list" => Value::Sequence(args),
        "dict" => {
            let mut map = BTreeMap::new();
            let mut args = args.into_iter();
            while let Some(key) = args.next() {
                let value = args.next().unwrap_or_else(|| Value::from(""));
                map.insert(key.to_string(), value);
            }
            Value::Map(map)
        }
        "get" => {
            let [map, key] = arity(name, args)?;
            dictionary(name, &map)?
                .get(&key.to_string())
                .cloned()
                .unwrap_or_else(|| Value::from(""))
        }
        "set" => {
            let [map, key, value] = arity(name, args)?;
            let mut map = dictionary(name, &map)?.clone();
            map.insert(key.to_string(), value);
            Value::Map(map)
        }
        "hasKey" => {
            let [map, key] = arity(name, args)?;
            Value::Bool(dictionary(name, &map)?.contains_key(&key.to_string()))
        }
        "keys" => {
            at_least(name, &args, 1)?;
            let mut keys = Vec::new();
            for map in &args {
                keys.extend(dictionary(name, map)?.keys().cloned().map(Value::String));
            }
            Value::Sequence(keys)
        }
        "index" => {
            at_least(name, &args, 1)?;
            let mut args = args.into_iter();
            let mut node = args.next().unwrap_or_default();
            for key in args {
                node = index(node, &key)?;
            }
            node
        }
        "len" => {
            let [value] = arity(name, args)?;
            let length = match &value {
                Value::String(text) => text.chars().count(),
                Value::Sequence(items) => items.len(),
                Value::Map(map) => map.len(),
                other => return Err(format!("len of type {}", other.type_name())),
            };
            Value::Integer(i64::try_from(length).unwrap_or(i64::MAX))
        }
        "merge" => {
            at_least(name, &args, 1)?;
            let mut args = args.into_iter();
            let mut merged = dictionary(name, &args.next().unwrap_or_default())?.clone();
            for source in args {
                merge_missing(&mut merged, dictionary(name, &source)?);
            }
            Value::Map(merged)
        }
        "toYaml" => {
            let [value] = arity(name, args)?;
            let yaml = serde_yaml::to_string(&value).map_err(|err| err.to_string())?;
            Value::String(yaml.strip_suffix('\n').unwrap_or(&yaml).to_owned())
        }
        "toJson" => {
            let [value] = arity(name, args)?;
            Value::String(serde_json::to_string(&value).map_err(|err| err.to_string())?)
        }
        "lookup" => Value::Map(BTreeMap::new()),
        "semverCompare" => {
            let [constraint, version] = arity(name, args)?;
            Value::Bool(semver_compare(&constraint.to_string(), &version.to_string())?)
        }
        other => return Err(format!("function {other:?} not defined")),
    };
    Ok(value)
}

fn exactly<const N: usize>(name: &str, args: Vec<Value>, line: usize) -> Result<[Value; N], TemplateError> {
    arity(name, args).map_err(|message| execution(line, message))
}

fn arity<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], String> {
    let got = args.len();
    <[Value; N]>::try_from(args)
        .map_err(|_| format!("wrong number of args for {name}: want {N} got {got}"))
}

fn at_least(name: &str, args: &[Value], minimum: usize) -> Result<(), String> {
    if args.len() >= minimum {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args for {name}: want at least {minimum} got {}",
            args.len()
        ))
    }
}

fn integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Null => Ok(0),
        Value::Bool(flag) => Ok(i64::from(*flag)),
        Value::Integer(number) => Ok(*number),
        Value::Float(number) => Ok(float_to_integer(*number)),
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| format!("cannot convert {text:?} to an integer")),
        other => Err(format!("cannot convert {} to an integer", other.type_name())),
    }
}

#[expect(clippy::cast_possible_truncation, reason = "floats truncate toward zero")]
fn float_to_integer(number: f64) -> i64 {
    number.trunc() as i64
}

#[expect(clippy::cast_precision_loss, reason = "comparison across number kinds")]
fn integer_to_float(number: i64) -> f64 {
    number as f64
}

fn dictionary<'v>(name: &str, value: &'v Value) -> Result<&'v BTreeMap<String, Value>, String> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(format!("{name} expects a dictionary, got {}", other.type_name())),
    }
}

fn index(node: Value, key: &Value) -> Result<Value, String> {
    match node {
        Value::Map(mut map) => Ok(map.remove(&key.to_string()).unwrap_or_default()),
        Value::Sequence(mut items) => {
            let position = integer(key)?;
            let length = items.len();
            usize::try_from(position)
                .ok()
                .filter(|position| *position < length)
                .map(|position| items.swap_remove(position))
                .ok_or_else(|| format!("index out of range: {position}"))
        }
        Value::Null => Err("index of untyped nil".to_owned()),
        other => Err(format!("can't index item of type {}", other.type_name())),
    }
}

/// Copy keys of `source` missing from `target`, recursing into nested
/// dictionaries present on both sides.
fn merge_missing(target: &mut BTreeMap<String, Value>, source: &BTreeMap<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Map(existing)), Value::Map(nested)) => merge_missing(existing, nested),
            (Some(_), _) => {}
            (None, _) => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(number) => Some(integer_to_float(*number)),
        Value::Float(number) => Some(*number),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a == b,
        _ => match (numeric(left), numeric(right)) {
            (Some(a), Some(b)) => a.total_cmp(&b) == Ordering::Equal,
            _ => left == right,
        },
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, String> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (numeric(left), numeric(right)) {
            (Some(a), Some(b)) => Ok(a.total_cmp(&b)),
            _ => Err(format!(
                "incompatible types for comparison: {} and {}",
                left.type_name(),
                right.type_name()
            )),
        },
    }
}

/// Quote every non-null argument and join the results with spaces.
fn join_quoted(args: &[Value], quote: impl Fn(&str) -> String) -> String {
    args.iter()
        .filter(|value| !matches!(value, Value::Null))
        .map(|value| quote(&value.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(text: &str) -> String {
    let mut titled = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start {
            titled.extend(c.to_uppercase());
        } else {
            titled.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    titled
}

/// Keep the first `length` characters, or the last `-length` when negative.
fn truncate(text: &str, length: i64) -> String {
    let count = text.chars().count();
    let keep = usize::try_from(length.unsigned_abs()).unwrap_or(usize::MAX);
    if keep >= count {
        return text.to_owned();
    }
    if length >= 0 {
        text.chars().take(keep).collect()
    } else {
        text.chars().skip(count - keep).collect()
    }
}

/// Prefix every line of `text` with `width` spaces.
fn indent(text: &str, width: i64) -> String {
    let pad = " ".repeat(usize::try_from(width).unwrap_or_default());
    format!("{pad}{}", text.replace('\n', &format!("\n{pad}")))
}

/// Join arguments, separating two operands with a space when neither is a
/// string.
fn sprint(args: &[Value]) -> String {
    let mut printed = String::new();
    let mut previous_is_text = true;
    for (position, value) in args.iter().enumerate() {
        let is_text = matches!(value, Value::String(_));
        if position > 0 && !is_text && !previous_is_text {
            printed.push(' ');
        }
        printed.push_str(&value.to_string());
        previous_is_text = is_text;
    }
    printed
}

/// Format with `%s`, `%v`, `%d` and `%q` verbs; flags and widths are
/// skipped and any other verb prints the value plainly.
fn sprintf(format: &str, args: &[Value]) -> String {
    let mut formatted = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            formatted.push(c);
            continue;
        }
        while chars
            .next_if(|c| matches!(c, '-' | '+' | '#' | ' ' | '.' | '0'..='9'))
            .is_some()
        {}
        match chars.next() {
            Some('%') => formatted.push('%'),
            Some(verb) => match args.next() {
                Some(value) if verb == 'q' => formatted.push_str(&format!("{:?}", value.to_string())),
                Some(value) => formatted.push_str(&value.to_string()),
                None => formatted.push_str(&format!("%!{verb}(MISSING)")),
            },
            None => formatted.push_str("%!(NOVERB)"),
        }
    }
    formatted
}

/// Match `version` against a constraint such as `>=1.18-0` or
/// `^1.2 || ~2.0`. A leading `v` on the version is ignored, as are
/// prerelease markers on partial constraint versions.
fn semver_compare(constraint: &str, version: &str) -> Result<bool, String> {
    let version = semver::Version::parse(version.trim().trim_start_matches('v'))
        .map_err(|err| format!("invalid semantic version {version:?}: {err}"))?;
    for alternative in constraint.split("||") {
        let requirement = alternative
            .split(',')
            .map(relax_partial_prerelease)
            .collect::<Vec<_>>()
            .join(",");
        let requirement = semver::VersionReq::parse(&requirement)
            .map_err(|err| format!("invalid constraint {constraint:?}: {err}"))?;
        if requirement.matches(&version) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn relax_partial_prerelease(comparator: &str) -> String {
    let comparator = comparator.trim();
    let digits_at = comparator
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(comparator.len());
    let (operator, version) = comparator.split_at(digits_at);
    match version.split_once('-') {
        Some((core, _)) if core.matches('.').count() < 2 => format!("{operator}{core}"),
        _ => comparator.to_owned(),
    }
}
