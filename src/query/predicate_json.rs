//! Predicate parsing from a decoded JSON document
//!
//! Stricter than the text DSL: operators are only accepted as keys of the
//! document bound to a field, `$and`/`$or` only with arrays of documents.

use serde_json::{Map, Value};

use super::errors::{QueryError, QueryResult};
use super::predicate::*;
use super::value::as_number;

impl Predicate {
    /// Build a predicate from a JSON object such as
    /// `{"age": {"$gte": 18}, "$or": [{"a": 1}, {"b": 2}]}`
    pub fn from_json(query: &Value) -> QueryResult<Predicate> {
        match query {
            Value::Object(map) => parse_map(map, None).map(Predicate),
            _ => Err(QueryError::parse("predicate must be a dict")),
        }
    }
}

fn parse_map(map: &Map<String, Value>, parent: Option<&str>) -> QueryResult<Vec<Expression>> {
    let mut exprs = Vec::new();
    for (key, exp) in map {
        let op = key.as_str();
        match op {
            OP_AND | OP_OR => {
                let subs = match exp {
                    Value::Array(subs) => subs,
                    _ => return Err(invalid_logical(op)),
                };
                if subs.len() < 2 {
                    return Err(QueryError::parse(format!(
                        "{} must contain at least two elements",
                        op
                    )));
                }
                let mut children = Vec::with_capacity(subs.len());
                for sub in subs {
                    let sub = sub.as_object().ok_or_else(|| invalid_logical(op))?;
                    let mut parsed = parse_map(sub, None)?;
                    if parsed.len() == 1 {
                        children.push(parsed.remove(0));
                    } else {
                        children.push(Expression::And(parsed));
                    }
                }
                exprs.push(if op == OP_AND {
                    Expression::And(children)
                } else {
                    Expression::Or(children)
                });
            }
            OP_REGEX | OP_EXISTS | OP_NOT_EQUAL | OP_GREATER_THAN | OP_GREATER_OR_EQUAL
            | OP_LOWER_THAN | OP_LOWER_OR_EQUAL | OP_IN | OP_NOT_IN => {
                let field = parent.ok_or_else(|| {
                    QueryError::parse(format!("{} can't be at first level", op))
                })?;
                exprs.push(parse_operator(field, op, exp)?);
            }
            _ => {
                if let Some(parent) = parent {
                    return Err(QueryError::parse(format!("{}: invalid expression", parent)));
                }
                match exp {
                    Value::Object(sub) if !sub.is_empty() => exprs.extend(parse_map(sub, Some(op))?),
                    _ => exprs.push(Expression::equal(key.clone(), exp.clone())),
                }
            }
        }
    }
    Ok(exprs)
}

fn parse_operator(field: &str, op: &str, exp: &Value) -> QueryResult<Expression> {
    let field_name = field.to_string();
    let expr = match op {
        OP_REGEX => {
            let source = exp.as_str().ok_or_else(|| {
                QueryError::parse(format!("{}: value for {} must be a string", field, op))
            })?;
            let pattern = Pattern::new(source)
                .map_err(|e| QueryError::parse(format!("{}: invalid regex: {}", op, e)))?;
            Expression::Regex {
                field: field_name,
                pattern,
            }
        }
        OP_EXISTS => match exp {
            Value::Bool(true) => Expression::Exist { field: field_name },
            Value::Bool(false) => Expression::NotExist { field: field_name },
            _ => return Err(QueryError::parse("$exists can only get Boolean as value")),
        },
        OP_NOT_EQUAL => Expression::NotEqual {
            field: field_name,
            value: exp.clone(),
        },
        OP_IN | OP_NOT_IN => {
            let values = match exp {
                Value::Object(_) => {
                    return Err(QueryError::parse(format!(
                        "{}: value for {} can't be a dict",
                        field, op
                    )))
                }
                Value::Array(values) => values.clone(),
                single => vec![single.clone()],
            };
            if op == OP_IN {
                Expression::In {
                    field: field_name,
                    values,
                }
            } else {
                Expression::NotIn {
                    field: field_name,
                    values,
                }
            }
        }
        _ => {
            let value = as_number(exp).ok_or_else(|| {
                QueryError::parse(format!("{}: value for {} must be a number", field, op))
            })?;
            match op {
                OP_GREATER_THAN => Expression::GreaterThan { field: field_name, value },
                OP_GREATER_OR_EQUAL => Expression::GreaterOrEqual { field: field_name, value },
                OP_LOWER_THAN => Expression::LowerThan { field: field_name, value },
                _ => Expression::LowerOrEqual { field: field_name, value },
            }
        }
    };
    Ok(expr)
}

fn invalid_logical(op: &str) -> QueryError {
    QueryError::parse(format!("value for {} must be an array of dicts", op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_err(query: Value) -> String {
        Predicate::from_json(&query).unwrap_err().to_string()
    }

    #[test]
    fn test_from_json_equal_and_operators() {
        let p = Predicate::from_json(&json!({
            "name": "alice",
            "age": {"$gte": 18, "$lt": 65},
            "role": {"$in": "admin"},
            "gone": {"$exists": false},
        }))
        .unwrap();
        assert_eq!(
            p.0,
            vec![
                Expression::equal("name", json!("alice")),
                Expression::GreaterOrEqual { field: "age".into(), value: 18.0 },
                Expression::LowerThan { field: "age".into(), value: 65.0 },
                Expression::in_list("role", vec![json!("admin")]),
                Expression::NotExist { field: "gone".into() },
            ]
        );
    }

    #[test]
    fn test_from_json_or_wraps_multi_key_elements() {
        let p = Predicate::from_json(&json!({"$or": [{"a": 1}, {"b": 2, "c": 3}]})).unwrap();
        assert_eq!(
            p.0,
            vec![Expression::Or(vec![
                Expression::equal("a", json!(1)),
                Expression::And(vec![
                    Expression::equal("b", json!(2)),
                    Expression::equal("c", json!(3)),
                ]),
            ])]
        );
        assert!(p.matches(json!({"b": 2, "c": 3}).as_object().unwrap()));
        assert!(!p.matches(json!({"b": 2}).as_object().unwrap()));
    }

    #[test]
    fn test_from_json_empty_dict_is_equal() {
        let p = Predicate::from_json(&json!({"meta": {}})).unwrap();
        assert_eq!(p.0, vec![Expression::equal("meta", json!({}))]);
    }

    #[test]
    fn test_from_json_errors() {
        assert_eq!(parse_err(json!({"$regex": "x"})), "$regex can't be at first level");
        assert_eq!(parse_err(json!({"$gt": 1})), "$gt can't be at first level");
        assert_eq!(
            parse_err(json!({"a": {"$exists": 1}})),
            "$exists can only get Boolean as value"
        );
        assert_eq!(parse_err(json!({"a": {"$gt": "1"}})), "a: value for $gt must be a number");
        assert_eq!(parse_err(json!({"a": {"$in": {"b": 1}}})), "a: value for $in can't be a dict");
        assert_eq!(parse_err(json!({"$or": {"a": 1}})), "value for $or must be an array of dicts");
        assert_eq!(parse_err(json!({"$and": [{"a": 1}, 2]})), "value for $and must be an array of dicts");
        assert_eq!(parse_err(json!({"$or": [{"a": 1}]})), "$or must contain at least two elements");
        assert_eq!(parse_err(json!({"a": {"b": 1}})), "a: invalid expression");
        assert_eq!(parse_err(json!({"a": {"$regex": 1}})), "a: value for $regex must be a string");
        assert_eq!(parse_err(json!([1])), "predicate must be a dict");
    }
}
