//! Filter expressions for [`MemoryWiki`](crate::MemoryWiki).
//!
//! Supports the commonly used subset of TiddlyWiki filter syntax:
//!
//! ```text
//! [tag[Journal]!is[system]sort[modified]limit[10]] [[Some Title]] -[prefix[Draft]]
//! ```
//!
//! A filter is a sequence of whitespace separated runs. Plain runs are
//! unioned into the result, `-` runs remove their titles from it and `+`
//! runs are evaluated with the current result as their input. Operators
//! that are not recognised are treated as field-equality tests, as in
//! TiddlyWiki.

use std::collections::BTreeMap;

use crate::error::{McpError, Result};
use crate::wiki::{matches_search, SearchOptions, Tiddler, SYSTEM_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPrefix {
    Or,
    And,
    Except,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    negate: bool,
    op: String,
    suffix: Option<String>,
    param: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunKind {
    Literal(String),
    Steps(Vec<Step>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Run {
    prefix: RunPrefix,
    kind: RunKind,
}

fn syntax_error(expr: &str, reason: &str) -> McpError {
    McpError::Filter(format!("{} in filter '{}'", reason, expr))
}

fn parse(expr: &str) -> Result<Vec<Run>> {
    let mut runs = Vec::new();
    let mut rest = expr.trim_start();

    while !rest.is_empty() {
        let (prefix, body) = if let Some(r) = rest.strip_prefix('-') {
            (RunPrefix::Except, r)
        } else if let Some(r) = rest.strip_prefix('+') {
            (RunPrefix::And, r)
        } else {
            (RunPrefix::Or, rest)
        };

        if body.is_empty() || body.starts_with(char::is_whitespace) {
            return Err(syntax_error(expr, "Dangling run prefix"));
        }

        let (kind, remaining) = if let Some(after) = body.strip_prefix("[[") {
            let end = after
                .find("]]")
                .ok_or_else(|| syntax_error(expr, "Missing ']]'"))?;
            (RunKind::Literal(after[..end].to_string()), &after[end + 2..])
        } else if let Some(after) = body.strip_prefix('[') {
            let (steps, remaining) = parse_steps(expr, after)?;
            (RunKind::Steps(steps), remaining)
        } else if let Some(after) = body.strip_prefix('"') {
            let end = after
                .find('"')
                .ok_or_else(|| syntax_error(expr, "Missing closing quote"))?;
            (RunKind::Literal(after[..end].to_string()), &after[end + 1..])
        } else {
            let end = body.find(char::is_whitespace).unwrap_or(body.len());
            (RunKind::Literal(body[..end].to_string()), &body[end..])
        };

        runs.push(Run { prefix, kind });
        rest = remaining.trim_start();
    }

    Ok(runs)
}

/// Parse the steps of a `[...]` run; `s` starts just after the opening bracket.
fn parse_steps<'a>(expr: &str, mut s: &'a str) -> Result<(Vec<Step>, &'a str)> {
    let mut steps = Vec::new();

    loop {
        if let Some(after) = s.strip_prefix(']') {
            if steps.is_empty() {
                return Err(syntax_error(expr, "Empty filter run"));
            }
            return Ok((steps, after));
        }

        let negate = match s.strip_prefix('!') {
            Some(after) => {
                s = after;
                true
            }
            None => false,
        };

        let open = s
            .find('[')
            .ok_or_else(|| syntax_error(expr, "Missing operator parameter"))?;
        let name = &s[..open];
        if name.contains(']') {
            return Err(syntax_error(expr, "Malformed operator"));
        }
        let (op, suffix) = match name.split_once(':') {
            Some((op, suffix)) => (op, Some(suffix.to_string())),
            None => (name, None),
        };

        let after_open = &s[open + 1..];
        let close = after_open
            .find(']')
            .ok_or_else(|| syntax_error(expr, "Missing ']'"))?;

        steps.push(Step {
            negate,
            op: if op.is_empty() { "title" } else { op }.to_string(),
            suffix,
            param: after_open[..close].to_string(),
        });
        s = &after_open[close + 1..];
    }
}

/// Evaluate a filter expression against a title-ordered tiddler map.
pub fn evaluate(expr: &str, tiddlers: &BTreeMap<String, Tiddler>) -> Result<Vec<String>> {
    let all: Vec<String> = tiddlers.keys().cloned().collect();
    let mut result: Vec<String> = Vec::new();

    for run in parse(expr)? {
        match run.prefix {
            RunPrefix::Or => {
                for title in eval_run(&run.kind, all.clone(), tiddlers)? {
                    if !result.contains(&title) {
                        result.push(title);
                    }
                }
            }
            RunPrefix::Except => {
                let removed = eval_run(&run.kind, all.clone(), tiddlers)?;
                result.retain(|title| !removed.contains(title));
            }
            RunPrefix::And => {
                result = eval_run(&run.kind, result, tiddlers)?;
            }
        }
    }

    Ok(result)
}

fn eval_run(
    kind: &RunKind,
    input: Vec<String>,
    tiddlers: &BTreeMap<String, Tiddler>,
) -> Result<Vec<String>> {
    match kind {
        RunKind::Literal(title) => Ok(vec![title.clone()]),
        RunKind::Steps(steps) => steps
            .iter()
            .try_fold(input, |titles, step| apply_step(step, titles, tiddlers)),
    }
}

fn field_of(title: &str, name: &str, tiddlers: &BTreeMap<String, Tiddler>) -> String {
    if name == "title" {
        return title.to_string();
    }
    tiddlers
        .get(title)
        .map(|t| t.field_string(name))
        .unwrap_or_default()
}

fn keep(input: Vec<String>, negate: bool, pred: impl Fn(&str) -> bool) -> Vec<String> {
    input.into_iter().filter(|t| pred(t) != negate).collect()
}

fn apply_step(
    step: &Step,
    input: Vec<String>,
    tiddlers: &BTreeMap<String, Tiddler>,
) -> Result<Vec<String>> {
    let param = step.param.as_str();
    let unsupported = || {
        McpError::Filter(format!(
            "Unsupported operand '{}' for operator '{}'",
            param, step.op
        ))
    };

    let output = match step.op.as_str() {
        "all" => match (param, step.negate) {
            ("tiddlers", false) => tiddlers.keys().cloned().collect(),
            _ => return Err(unsupported()),
        },
        "title" if !step.negate => vec![param.to_string()],
        "tag" => keep(input, step.negate, |t| {
            tiddlers
                .get(t)
                .is_some_and(|tiddler| tiddler.field_list("tags").iter().any(|tag| tag == param))
        }),
        "prefix" => keep(input, step.negate, |t| t.starts_with(param)),
        "suffix" => keep(input, step.negate, |t| t.ends_with(param)),
        "is" => match param {
            "system" => keep(input, step.negate, |t| t.starts_with(SYSTEM_PREFIX)),
            "tiddler" => keep(input, step.negate, |t| tiddlers.contains_key(t)),
            "missing" => keep(input, step.negate, |t| !tiddlers.contains_key(t)),
            _ => return Err(unsupported()),
        },
        "has" => keep(input, step.negate, |t| {
            !field_of(t, param, tiddlers).is_empty()
        }),
        "search" => {
            let options = SearchOptions::default();
            keep(input, step.negate, |t| {
                tiddlers
                    .get(t)
                    .is_some_and(|tiddler| matches_search(tiddler, param, &options))
            })
        }
        "sort" => {
            let field = if param.is_empty() { "title" } else { param };
            let mut keyed: Vec<(String, String)> = input
                .into_iter()
                .map(|t| (field_of(&t, field, tiddlers).to_lowercase(), t))
                .collect();
            keyed.sort();
            if step.negate {
                keyed.reverse();
            }
            keyed.into_iter().map(|(_, t)| t).collect()
        }
        "limit" => {
            let n: usize = param.trim().parse().map_err(|_| unsupported())?;
            if step.negate {
                let skip = input.len().saturating_sub(n);
                input.into_iter().skip(skip).collect()
            } else {
                input.into_iter().take(n).collect()
            }
        }
        other => {
            let field = match (other, &step.suffix) {
                ("field", Some(name)) => name.as_str(),
                ("field", None) => return Err(unsupported()),
                (name, _) => name,
            };
            keep(input, step.negate, |t| field_of(t, field, tiddlers) == param)
        }
    };

    Ok(output)
}
