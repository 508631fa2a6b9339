//! Extra template filters
//!
//! Filters commonly used in task scripts on top of the minijinja built-ins:
//! boolean coercion, dictionary helpers, set operations and regexes.

use minijinja::value::Kwargs;
use minijinja::{Environment, Error, ErrorKind, Value};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value as Data};

/// Register all filters with an environment
pub fn register(env: &mut Environment<'_>) {
    env.add_filter("bool", to_bool);
    env.add_filter("combine", combine);
    env.add_filter("dict2items", dict2items);
    env.add_filter("items2dict", items2dict);
    env.add_filter("flatten", flatten);
    env.add_filter("union", union);
    env.add_filter("intersect", intersect);
    env.add_filter("difference", difference);
    env.add_filter("symmetric_difference", symmetric_difference);
    env.add_filter("regex_escape", regex_escape);
    env.add_filter("regex_search", regex_search);
    env.add_filter("regex_findall", regex_findall);
    env.add_filter("regex_replace", regex_replace);
}

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_data(value: &Value) -> Result<Data, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

fn from_data(data: &Data) -> Value {
    Value::from_serialize(data)
}

/// Coerce a value to a boolean: yes/true/1 (any case) are true
fn to_bool(value: Value) -> Result<bool, Error> {
    Ok(match to_data(&value)? {
        Data::Bool(b) => b,
        Data::String(s) => matches!(s.trim().to_lowercase().as_str(), "yes" | "true" | "1" | "on"),
        Data::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    })
}

/// Merge objects left to right; `recursive=true` merges nested objects too.
///
/// The input may be a single object or a list of objects.
fn combine(value: Value, other: Option<Value>, kwargs: Kwargs) -> Result<Value, Error> {
    let recursive = kwargs.get::<Option<bool>>("recursive")?.unwrap_or(false);
    let list_merge = kwargs
        .get::<Option<String>>("list_merge")?
        .unwrap_or_else(|| "replace".to_string());
    kwargs.assert_all_used()?;

    if !["replace", "keep", "append", "prepend"].contains(&list_merge.as_str()) {
        return Err(invalid(format!("unsupported list_merge value '{}'", list_merge)));
    }

    let mut sources = Vec::new();
    match to_data(&value)? {
        Data::Array(items) => sources.extend(items),
        other => sources.push(other),
    }
    if let Some(other) = other {
        sources.push(to_data(&other)?);
    }

    let mut result = Map::new();
    for source in sources {
        match source {
            Data::Object(map) => merge(&mut result, map, recursive, &list_merge),
            other => return Err(invalid(format!("combine expects objects, got {}", other))),
        }
    }
    Ok(from_data(&Data::Object(result)))
}

fn merge(
    target: &mut Map<String, Data>,
    source: Map<String, Data>,
    recursive: bool,
    list_merge: &str,
) {
    for (key, value) in source {
        let existing = match target.get_mut(&key) {
            Some(existing) => existing,
            None => {
                target.insert(key, value);
                continue;
            }
        };

        match (existing, value) {
            (Data::Object(existing), Data::Object(incoming)) if recursive => {
                merge(existing, incoming, recursive, list_merge);
            }
            (Data::Array(existing), Data::Array(incoming)) => match list_merge {
                "keep" => {}
                "append" => existing.extend(incoming),
                "prepend" => {
                    let mut merged = incoming;
                    merged.append(existing);
                    *existing = merged;
                }
                _ => *existing = incoming,
            },
            (existing, value) => *existing = value,
        }
    }
}

/// Turn an object into a list of `{key, value}` objects
fn dict2items(value: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let key_name = kwargs.get::<Option<String>>("key_name")?.unwrap_or_else(|| "key".to_string());
    let value_name = kwargs
        .get::<Option<String>>("value_name")?
        .unwrap_or_else(|| "value".to_string());
    kwargs.assert_all_used()?;

    let Data::Object(map) = to_data(&value)? else {
        return Err(invalid("dict2items expects an object"));
    };

    let items: Vec<Data> = map
        .into_iter()
        .map(|(key, value)| {
            let mut item = Map::new();
            item.insert(key_name.clone(), Data::String(key));
            item.insert(value_name.clone(), value);
            Data::Object(item)
        })
        .collect();
    Ok(from_data(&Data::Array(items)))
}

/// Turn a list of `{key, value}` objects into an object
fn items2dict(value: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let key_name = kwargs.get::<Option<String>>("key_name")?.unwrap_or_else(|| "key".to_string());
    let value_name = kwargs
        .get::<Option<String>>("value_name")?
        .unwrap_or_else(|| "value".to_string());
    kwargs.assert_all_used()?;

    let Data::Array(items) = to_data(&value)? else {
        return Err(invalid("items2dict expects a list"));
    };

    let mut result = Map::new();
    for item in items {
        let key = match item.get(&key_name) {
            Some(Data::String(key)) => key.clone(),
            Some(other) => other.to_string(),
            None => return Err(invalid(format!("item has no '{}' field", key_name))),
        };
        let value = item.get(&value_name).cloned().unwrap_or(Data::Null);
        result.insert(key, value);
    }
    Ok(from_data(&Data::Object(result)))
}

/// Flatten nested lists, optionally only `levels` deep
fn flatten(value: Value, kwargs: Kwargs) -> Result<Value, Error> {
    let levels = kwargs.get::<Option<usize>>("levels")?;
    kwargs.assert_all_used()?;

    let Data::Array(items) = to_data(&value)? else {
        return Err(invalid("flatten expects a list"));
    };

    fn walk(items: Vec<Data>, depth: Option<usize>, out: &mut Vec<Data>) {
        for item in items {
            match item {
                Data::Array(nested) if depth != Some(0) => walk(nested, depth.map(|d| d - 1), out),
                other => out.push(other),
            }
        }
    }

    let mut result = Vec::new();
    walk(items, levels, &mut result);
    Ok(from_data(&Data::Array(result)))
}

fn as_list(value: &Value) -> Result<Vec<Data>, Error> {
    match to_data(value)? {
        Data::Array(items) => Ok(items),
        other => Err(invalid(format!("expected a list, got {}", other))),
    }
}

fn unique(items: impl IntoIterator<Item = Data>) -> Vec<Data> {
    let mut result: Vec<Data> = Vec::new();
    for item in items {
        if !result.contains(&item) {
            result.push(item);
        }
    }
    result
}

fn union(value: Value, other: Value) -> Result<Value, Error> {
    let left = as_list(&value)?;
    let right = as_list(&other)?;
    Ok(from_data(&Data::Array(unique(left.into_iter().chain(right)))))
}

fn intersect(value: Value, other: Value) -> Result<Value, Error> {
    let right = as_list(&other)?;
    let left = as_list(&value)?.into_iter().filter(|item| right.contains(item));
    Ok(from_data(&Data::Array(unique(left))))
}

fn difference(value: Value, other: Value) -> Result<Value, Error> {
    let right = as_list(&other)?;
    let left = as_list(&value)?.into_iter().filter(|item| !right.contains(item));
    Ok(from_data(&Data::Array(unique(left))))
}

fn symmetric_difference(value: Value, other: Value) -> Result<Value, Error> {
    let left = as_list(&value)?;
    let right = as_list(&other)?;
    let only_left = left.iter().filter(|item| !right.contains(item)).cloned();
    let only_right = right.iter().filter(|item| !left.contains(item)).cloned();
    Ok(from_data(&Data::Array(unique(only_left.chain(only_right)))))
}

fn regex_escape(value: String) -> String {
    regex::escape(&value)
}

fn build_regex(pattern: &str, kwargs: &Kwargs) -> Result<Regex, Error> {
    let ignorecase = kwargs.get::<Option<bool>>("ignorecase")?.unwrap_or(false);
    let multiline = kwargs.get::<Option<bool>>("multiline")?.unwrap_or(false);
    RegexBuilder::new(pattern)
        .case_insensitive(ignorecase)
        .multi_line(multiline)
        .build()
        .map_err(|e| invalid(format!("invalid regex '{}': {}", pattern, e)))
}

/// First match of a pattern, or none
fn regex_search(value: String, pattern: String, kwargs: Kwargs) -> Result<Value, Error> {
    let re = build_regex(&pattern, &kwargs)?;
    kwargs.assert_all_used()?;
    Ok(re
        .find(&value)
        .map(|m| Value::from(m.as_str()))
        .unwrap_or_else(|| Value::from(())))
}

/// All matches of a pattern; the first group when the pattern has groups
fn regex_findall(value: String, pattern: String, kwargs: Kwargs) -> Result<Value, Error> {
    let re = build_regex(&pattern, &kwargs)?;
    kwargs.assert_all_used()?;
    let matches: Vec<String> = re
        .captures_iter(&value)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
        .map(|m| m.as_str().to_string())
        .collect();
    Ok(Value::from(matches))
}

/// Replace matches of a pattern; `\1` style back-references are supported
fn regex_replace(
    value: String,
    pattern: String,
    replacement: Option<String>,
    kwargs: Kwargs,
) -> Result<String, Error> {
    let re = build_regex(&pattern, &kwargs)?;
    let count = kwargs.get::<Option<usize>>("count")?.unwrap_or(0);
    kwargs.assert_all_used()?;

    let replacement = convert_backrefs(&replacement.unwrap_or_default());
    Ok(re.replacen(&value, count, replacement.as_str()).into_owned())
}

fn convert_backrefs(replacement: &str) -> String {
    let mut result = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(|next| next.is_ascii_digit()) => {
                let mut group = String::new();
                while let Some(digit) = chars.peek().copied().filter(char::is_ascii_digit) {
                    group.push(digit);
                    chars.next();
                }
                result.push_str(&format!("${{{}}}", group));
            }
            '$' => result.push_str("$$"),
            other => result.push(other),
        }
    }
    result
}
