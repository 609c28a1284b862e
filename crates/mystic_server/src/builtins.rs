//! Demo functions registered by the server binary

use mystic_core::{CallArgs, CallError, Function, FunctionId, Value};

/// Module name of the builtin functions
pub const MODULE: &str = "builtin";

/// All builtin functions
#[must_use]
pub fn all() -> Vec<Function> {
    vec![
        Function::new(FunctionId::new(MODULE, "echo"), echo)
            .with_doc("Return the first positional argument"),
        Function::new(FunctionId::new(MODULE, "length"), length)
            .with_doc("Length of a string, array or object"),
        Function::new(FunctionId::new(MODULE, "concat"), concat)
            .with_doc("Concatenate all positional arguments as text"),
        Function::new(FunctionId::new(MODULE, "add"), add).with_doc("Add two numbers"),
    ]
}

fn echo(args: &CallArgs) -> Result<Value, CallError> {
    Ok(args.arg(0).cloned().unwrap_or(Value::Null))
}

fn length(args: &CallArgs) -> Result<Value, CallError> {
    let len = match args.arg(0) {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        Some(other) => {
            return Err(CallError::type_error(format!("object of type {} has no len()", type_name(other))));
        }
        None => return Err(CallError::type_error("length() takes exactly one argument")),
    };
    Ok(Value::from(len))
}

fn concat(args: &CallArgs) -> Result<Value, CallError> {
    let text: String = args
        .args
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    Ok(Value::String(text))
}

fn add(args: &CallArgs) -> Result<Value, CallError> {
    let (Some(x), Some(y)) = (args.arg(0), args.arg(1)) else {
        return Err(CallError::type_error("add() takes exactly two arguments"));
    };
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::from(a + b)),
        _ => Err(CallError::type_error(format!(
            "unsupported operand types for +: {} and {}",
            type_name(x),
            type_name(y)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: CallArgs) -> Result<Value, CallError> {
        let function = all()
            .into_iter()
            .find(|f| f.id().name == name)
            .unwrap();
        function.call(&args)
    }

    #[test]
    fn test_builtin_names() {
        let names: Vec<_> = all().iter().map(Function::qualname).collect();
        assert_eq!(
            names,
            vec!["builtin.echo", "builtin.length", "builtin.concat", "builtin.add"]
        );
    }

    #[test]
    fn test_echo_and_length() {
        assert_eq!(call("echo", CallArgs::new().with_arg("hi")).unwrap(), json!("hi"));
        assert_eq!(call("echo", CallArgs::new()).unwrap(), Value::Null);
        assert_eq!(call("length", CallArgs::new().with_arg("héllo")).unwrap(), json!(5));
        assert_eq!(call("length", CallArgs::new().with_arg(json!([1, 2]))).unwrap(), json!(2));
        let err = call("length", CallArgs::new().with_arg(3)).unwrap_err();
        assert_eq!(err.kind, "TypeError");
    }

    #[test]
    fn test_concat_and_add() {
        let args = CallArgs::positional([json!("a"), json!(1), json!(true)]);
        assert_eq!(call("concat", args).unwrap(), json!("a1true"));
        assert_eq!(call("add", CallArgs::positional([json!(2), json!(3)])).unwrap(), json!(5));
        assert_eq!(
            call("add", CallArgs::positional([json!(0.5), json!(1)])).unwrap(),
            json!(1.5)
        );
        assert!(call("add", CallArgs::positional([json!("x"), json!(1)])).is_err());
        assert!(call("add", CallArgs::new().with_arg(1)).is_err());
    }
}
