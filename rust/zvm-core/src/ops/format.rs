//! `fstring` and `assert`.
//!
//! `fstring` understands the brace syntax of Python's `str.format`:
//! `{}` and `{0}` take positional arguments popped from the stack, `{name}`
//! takes a keyword parameter, `{name[0]}`/`{name.key}` index into it, and an
//! optional `!r`/`!s` conversion and `:spec` may follow. `{{` and `}}` are
//! literal braces.

use serde::Deserialize;

use crate::error::{Result, VmError};
use crate::registry::{Params, Registry};
use crate::value::{display, truthy, Value};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AssertParams {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    negate: bool,
}

pub(super) fn install(registry: &mut Registry) {
    registry.op("fstring", |state, mut params| {
        let fmt = match params.remove("fmt") {
            Some(Value::String(fmt)) => fmt,
            Some(_) => return Err(VmError::params(state.op_name(), "'fmt' must be a string")),
            None => return Err(VmError::params(state.op_name(), "missing field `fmt`")),
        };
        let template = Template::parse(&fmt)?;
        let args = state.popn(template.positional_count())?;
        Ok(Value::String(template.render(&args, &params)?))
    });

    registry.op("assert", |state, params| {
        let AssertParams { error, negate } = state.decode(params)?;
        let value = state.pop()?;
        if truthy(&value) == negate {
            let message = error.unwrap_or_else(|| {
                let expected = if negate { "falsy" } else { "truthy" };
                format!("expected a {expected} value, got {value}")
            });
            return Err(VmError::AssertionFailed(message));
        }
        Ok(())
    });
}

fn format_error(message: impl Into<String>) -> VmError {
    VmError::TypeError(format!("format string: {}", message.into()))
}

// ---------------------------------------------------------------------------
// Template parsing
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Piece {
    Text(String),
    Field(Field),
}

#[derive(Debug, PartialEq)]
struct Field {
    arg: Arg,
    /// `.key` and `[index]` accessors, in order.
    path: Vec<String>,
    conversion: Option<char>,
    spec: String,
}

#[derive(Debug, PartialEq)]
enum Arg {
    Auto,
    Index(usize),
    Name(String),
}

#[derive(Debug)]
struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    fn parse(fmt: &str) -> Result<Self> {
        let mut pieces = Vec::new();
        let mut text = String::new();
        let mut chars = fmt.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '}' => return Err(format_error("single '}' encountered")),
                '{' => {
                    let mut body = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(format_error("nested replacement fields are not supported")),
                            Some(c) => body.push(c),
                            None => return Err(format_error("single '{' encountered")),
                        }
                    }
                    if !text.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(Piece::Field(Field::parse(&body)?));
                }
                c => text.push(c),
            }
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text));
        }
        Ok(Self { pieces })
    }

    /// Number of fields bound to stack values.
    fn positional_count(&self) -> usize {
        self.fields()
            .filter(|f| matches!(f.arg, Arg::Auto | Arg::Index(_)))
            .count()
    }

    fn fields(&self) -> impl Iterator<Item = &Field> {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Field(f) => Some(f),
            Piece::Text(_) => None,
        })
    }

    fn render(&self, args: &[Value], kwargs: &Params) -> Result<String> {
        let mut out = String::new();
        let mut next_auto = 0usize;
        let mut manual = false;
        for piece in &self.pieces {
            let field = match piece {
                Piece::Text(text) => {
                    out.push_str(text);
                    continue;
                }
                Piece::Field(field) => field,
            };
            let base = match &field.arg {
                Arg::Auto => {
                    if manual {
                        return Err(format_error(
                            "cannot switch from manual field numbering to automatic",
                        ));
                    }
                    next_auto += 1;
                    positional(args, next_auto - 1)?
                }
                Arg::Index(i) => {
                    if next_auto > 0 {
                        return Err(format_error(
                            "cannot switch from automatic field numbering to manual",
                        ));
                    }
                    manual = true;
                    positional(args, *i)?
                }
                Arg::Name(name) => kwargs
                    .get(name)
                    .ok_or_else(|| format_error(format!("no keyword argument '{name}'")))?,
            };
            let value = field.path.iter().try_fold(base, |value, key| lookup(value, key))?;
            let rendered = match field.conversion {
                Some('r') => repr(value),
                Some('s') | None => display(value),
                Some(other) => return Err(format_error(format!("unknown conversion '!{other}'"))),
            };
            out.push_str(&apply_spec(value, rendered, &field.spec)?);
        }
        Ok(out)
    }
}

const FIELD_ACCESSORS: &[char] = &['.', '['];

impl Field {
    fn parse(body: &str) -> Result<Self> {
        let (head, spec) = match body.find(':') {
            Some(i) => (&body[..i], body[i + 1..].to_string()),
            None => (body, String::new()),
        };
        let (head, conversion) = match head.find('!') {
            Some(i) => {
                let mut conv = head[i + 1..].chars();
                match (conv.next(), conv.next()) {
                    (Some(c), None) => (&head[..i], Some(c)),
                    _ => return Err(format_error("expected a single conversion character after '!'")),
                }
            }
            None => (head, None),
        };
        let split = head.find(FIELD_ACCESSORS).unwrap_or(head.len());
        let (name, mut rest) = head.split_at(split);
        let mut path = Vec::new();
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(FIELD_ACCESSORS).unwrap_or(after.len());
                path.push(after[..end].to_string());
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let end = after
                    .find(']')
                    .ok_or_else(|| format_error("missing ']' in field name"))?;
                path.push(after[..end].to_string());
                rest = &after[end + 1..];
            } else {
                return Err(format_error("only '.' or '[' may follow ']' in a field name"));
            }
        }
        let arg = if name.is_empty() {
            Arg::Auto
        } else if let Ok(index) = name.parse::<usize>() {
            Arg::Index(index)
        } else {
            Arg::Name(name.to_string())
        };
        Ok(Field {
            arg,
            path,
            conversion,
            spec,
        })
    }
}

fn positional(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index)
        .ok_or_else(|| format_error(format!("replacement index {index} out of range")))
}

fn lookup<'v>(value: &'v Value, key: &str) -> Result<&'v Value> {
    let found = match value {
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(key),
        _ => None,
    };
    found.ok_or_else(|| format_error(format!("cannot look up '{key}' in {value}")))
}

fn repr(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Format specs: [[fill]align][sign][0][width][,][.precision][type]
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Spec {
    fn parse(spec: &str) -> Result<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = Spec::default();
        let mut i = 0;
        let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
        if chars.len() >= 2 && is_align(chars[1]) {
            out.fill = Some(chars[0]);
            out.align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if let Some(c) = chars.get(i).copied().filter(|c| matches!(c, '+' | '-' | ' ')) {
            out.sign = Some(c);
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            out.zero = true;
            i += 1;
        }
        let digits = |from: usize| chars[from..].iter().take_while(|c| c.is_ascii_digit()).count();
        let n = digits(i);
        if n > 0 {
            out.width = chars[i..i + n].iter().collect::<String>().parse().unwrap_or(0);
            i += n;
        }
        if chars.get(i) == Some(&',') {
            out.grouping = true;
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            let n = digits(i + 1);
            if n == 0 {
                return Err(format_error("format specifier missing precision"));
            }
            out.precision = chars[i + 1..i + 1 + n].iter().collect::<String>().parse().ok();
            i += 1 + n;
        }
        match &chars[i..] {
            [] => {}
            [kind] => out.kind = Some(*kind),
            _ => return Err(format_error(format!("invalid format specifier '{spec}'"))),
        }
        Ok(out)
    }
}

fn apply_spec(value: &Value, rendered: String, spec: &str) -> Result<String> {
    if spec.is_empty() {
        return Ok(rendered);
    }
    let spec = Spec::parse(spec)?;
    let body = match (spec.kind, value) {
        (None | Some('s'), Value::String(_)) | (Some('s'), _) => {
            let mut text = rendered;
            if let Some(p) = spec.precision {
                text = text.chars().take(p).collect();
            }
            return Ok(pad(text, &spec, '<'));
        }
        (kind, Value::Number(_) | Value::Bool(_)) => format_number(value, kind, &spec)?,
        (None, _) => return Ok(pad(rendered, &spec, '<')),
        (Some(kind), other) => {
            return Err(format_error(format!(
                "unknown format code '{kind}' for {}",
                crate::value::type_name(other)
            )))
        }
    };
    Ok(pad(body, &spec, '>'))
}

fn format_number(value: &Value, kind: Option<char>, spec: &Spec) -> Result<String> {
    let int = value.as_i64().or_else(|| value.as_bool().map(i64::from));
    let float = value.as_f64().or_else(|| int.map(|i| i as f64)).unwrap_or(0.0);
    let (negative, digits) = match (kind, int) {
        (Some('d') | None, Some(i)) if spec.precision.is_none() || kind == Some('d') => {
            (i < 0, group(&i.unsigned_abs().to_string(), spec.grouping))
        }
        (Some('x'), Some(i)) => (i < 0, format!("{:x}", i.unsigned_abs())),
        (Some('X'), Some(i)) => (i < 0, format!("{:X}", i.unsigned_abs())),
        (Some('o'), Some(i)) => (i < 0, format!("{:o}", i.unsigned_abs())),
        (Some('b'), Some(i)) => (i < 0, format!("{:b}", i.unsigned_abs())),
        (Some('f' | 'F'), _) => {
            let p = spec.precision.unwrap_or(6);
            (float < 0.0, group_float(&format!("{:.p$}", float.abs()), spec.grouping))
        }
        (Some('e' | 'E'), _) => {
            let p = spec.precision.unwrap_or(6);
            let text = python_exponent(&format!("{:.p$e}", float.abs()));
            let text = if kind == Some('E') { text.to_uppercase() } else { text };
            (float < 0.0, text)
        }
        (Some('%'), _) => {
            let p = spec.precision.unwrap_or(6);
            (float < 0.0, format!("{:.p$}%", (float * 100.0).abs()))
        }
        (None, _) => match spec.precision {
            Some(p) => (float < 0.0, format!("{:.p$}", float.abs())),
            None => (float < 0.0, display(value).trim_start_matches('-').to_string()),
        },
        (Some(kind), _) => {
            return Err(format_error(format!("unknown format code '{kind}' for a number")))
        }
    };
    let sign = match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    };
    if spec.zero && spec.align.is_none() && spec.fill.is_none() {
        let width = spec.width.saturating_sub(sign.len());
        return Ok(format!("{sign}{digits:0>width$}"));
    }
    if spec.align == Some('=') {
        let fill = spec.fill.unwrap_or(' ');
        let pad_len = spec.width.saturating_sub(sign.len() + digits.chars().count());
        return Ok(format!("{sign}{}{digits}", fill.to_string().repeat(pad_len)));
    }
    Ok(format!("{sign}{digits}"))
}

/// Rust writes `1.5e2`; Python writes `1.5e+02`.
fn python_exponent(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text.to_string(),
    }
}

fn group(digits: &str, grouping: bool) -> String {
    if !grouping {
        return digits.to_string();
    }
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn group_float(text: &str, grouping: bool) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, grouping)),
        None => group(text, grouping),
    }
}

fn pad(text: String, spec: &Spec, default_align: char) -> String {
    let len = text.chars().count();
    if len >= spec.width {
        return text;
    }
    let fill = spec.fill.unwrap_or(' ');
    let total = spec.width - len;
    let (left, right) = match spec.align.unwrap_or(default_align) {
        '<' => (0, total),
        '^' => (total / 2, total - total / 2),
        _ => (total, 0),
    };
    let fill = |n: usize| fill.to_string().repeat(n);
    format!("{}{text}{}", fill(left), fill(right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testutil::run;
    use serde_json::json;

    fn fstring(stack: Vec<Value>, op: Value) -> Result<Value> {
        run(stack, json!([op])).map(|mut s| s.pop().unwrap_or(Value::Null))
    }

    #[test]
    fn named_fields_come_from_params() {
        let out = fstring(vec![], json!({"op": "fstring", "fmt": "a={a},b={b}", "a": 1, "b": 2})).unwrap();
        assert_eq!(out, json!("a=1,b=2"));
    }

    #[test]
    fn positional_fields_pop_in_stack_order() {
        let out = fstring(
            vec![json!("keep"), json!("x"), json!("y")],
            json!({"op": "fstring", "fmt": "{}-{}"}),
        );
        assert_eq!(out.unwrap(), json!("x-y"));
        let stack = run(
            vec![json!("keep"), json!("x"), json!("y")],
            json!([{"op": "fstring", "fmt": "{1}{0}"}]),
        )
        .unwrap();
        assert_eq!(stack, vec![json!("keep"), json!("yx")]);
    }

    #[test]
    fn escapes_accessors_and_conversions() {
        let out = fstring(
            vec![],
            json!({"op": "fstring", "fmt": "{{{p[0]}}} {p[1].k!r} {s!r}", "p": [1, {"k": "v"}], "s": "it's"}),
        )
        .unwrap();
        assert_eq!(out, json!("{1} 'v' 'it\\'s'"));
    }

    #[test]
    fn format_specs() {
        let cases = [
            ("{x:.2f}", json!(3.14159), "3.14"),
            ("{x:>6}", json!(42), "    42"),
            ("{x:<4}|", json!("ab"), "ab  |"),
            ("{x:*^7}", json!("mid"), "**mid**"),
            ("{x:05d}", json!(-42), "-0042"),
            ("{x:+d}", json!(7), "+7"),
            ("{x:,}", json!(1234567), "1,234,567"),
            ("{x:x}", json!(255), "ff"),
            ("{x:.1%}", json!(0.25), "25.0%"),
            ("{x:.2e}", json!(1234.5), "1.23e+03"),
            ("{x:.3}", json!("abcdef"), "abc"),
        ];
        for (fmt, x, expected) in cases {
            let out = fstring(vec![], json!({"op": "fstring", "fmt": fmt, "x": x})).unwrap();
            assert_eq!(out, json!(expected), "{fmt}");
        }
    }

    #[test]
    fn values_render_as_json() {
        let out = fstring(
            vec![json!(true), json!([1, "a"]), json!(null)],
            json!({"op": "fstring", "fmt": "{} {} {}"}),
        )
        .unwrap();
        assert_eq!(out, json!("true [1,\"a\"] null"));
    }

    #[test]
    fn malformed_templates() {
        for fmt in ["{", "}", "{a", "{0}{}", "{x:.f}"] {
            let err = fstring(vec![json!(1), json!(2)], json!({"op": "fstring", "fmt": fmt, "x": 1, "a": 1}))
                .unwrap_err();
            assert!(err.message_contains("format string"), "{fmt}: {err}");
        }
        let err = fstring(vec![], json!({"op": "fstring", "fmt": "{missing}"})).unwrap_err();
        assert!(err.message_contains("no keyword argument 'missing'"));
        let err = fstring(vec![], json!({"op": "fstring", "fmt": "{}"})).unwrap_err();
        assert!(err.message_contains("cannot pop 1"));
        let err = fstring(vec![], json!({"op": "fstring"})).unwrap_err();
        assert!(err.message_contains("missing field `fmt`"));
    }

    #[test]
    fn assert_and_negate() {
        assert!(run(vec![json!(1)], json!([{"op": "assert"}])).unwrap().is_empty());
        assert!(run(vec![json!(0)], json!([{"op": "assert", "negate": true}])).unwrap().is_empty());
        let err = run(vec![json!(0)], json!([{"op": "assert", "error": "n must be positive"}])).unwrap_err();
        assert!(matches!(err.root(), VmError::AssertionFailed(m) if m == "n must be positive"));
        let err = run(vec![json!("x")], json!([{"op": "assert", "negate": true}])).unwrap_err();
        assert!(err.message_contains("expected a falsy value, got \"x\""));
    }
}
