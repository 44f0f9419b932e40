//! Application of functions, operations, sequences and maps.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::trace;

use crate::diagnostics::error_codes::runtime as codes;
use crate::typechecker::types::{FunctionType, Type};

use super::context::Context;
use super::convert::convert_to;
use super::error::{check_arity, EvalResult, MatchError, RuntimeError};
use super::ops::seq_index;
use super::pattern::{match_each, Bindings};
use super::value::{FunctionBody, FunctionValue, OperationValue, Value};

/// Apply any applicable value to evaluated arguments
pub fn apply(callee: &Value, args: Vec<Value>, ctx: &Context<'_>) -> EvalResult<Value> {
    match callee {
        Value::Function(function) => call_function(function, args, ctx),
        Value::Operation(operation) => call_operation(operation, args, ctx),
        Value::Seq(items) => {
            check_arity(&args, 1)?;
            Ok(items[seq_index(&args[0], items.len())?].clone())
        }
        Value::Map(map) => {
            check_arity(&args, 1)?;
            map.get(&args[0]).cloned().ok_or_else(|| {
                RuntimeError::new(
                    codes::KEY_NOT_IN_DOMAIN,
                    format!("Key {} is not in the domain of the map", args[0]),
                )
            })
        }
        Value::Updatable(cell) => apply(&cell.get(), args, ctx),
        other => Err(RuntimeError::expected(
            codes::INAPPLICABLE_VALUE,
            "a function, operation, sequence or map",
            other,
        )),
    }
}

pub fn call_function(function: &Arc<FunctionValue>, args: Vec<Value>, ctx: &Context<'_>) -> EvalResult<Value> {
    invoke(function, args, ctx, true)
}

/// Evaluate `inv_T(value)` without converting the argument to `T`, which
/// would run the same invariant again
pub(crate) fn call_invariant(function: &Arc<FunctionValue>, value: &Value, ctx: &Context<'_>) -> EvalResult<Value> {
    invoke(function, vec![value.clone()], ctx, false)
}

fn invoke(function: &Arc<FunctionValue>, args: Vec<Value>, ctx: &Context<'_>, checked: bool) -> EvalResult<Value> {
    if function.is_polymorphic() {
        return Err(RuntimeError::new(
            codes::POLYMORPHIC_UNINSTANTIATED,
            format!("Polymorphic function {} has not been instantiated", function.name),
        ));
    }
    trace!(function = %function.name, args = args.len(), "apply");
    match &function.body {
        FunctionBody::Iterate { function: inner, times } => {
            check_arity(&args, 1)?;
            let mut current = args;
            for _ in 0..*times {
                current = vec![invoke(inner, current, ctx, checked)?];
            }
            Ok(current.remove(0))
        }
        FunctionBody::Compose { outer, inner } => {
            let middle = invoke(inner, args, ctx, checked)?;
            invoke(outer, vec![middle], ctx, checked)
        }
        FunctionBody::Expr(body) => {
            let Some(params) = function.params.first() else {
                return Err(RuntimeError::arity_mismatch(0, args.len()));
            };
            check_arity(&args, params.len())?;

            let root = ctx.root();
            let mut frame = match &function.self_obj {
                Some(object) => root.object_child(function.name.clone(), Arc::clone(object)),
                None => root.child(function.name.clone()),
            };
            frame.define_all(function.free.clone());
            for (name, ty) in &function.type_bindings {
                frame.define_type_param(name, ty.clone());
            }

            let settings = ctx.settings().clone();
            let args = if checked && settings.dynamic_type_checks {
                args.iter()
                    .zip(&function.ty.params)
                    .map(|(arg, ty)| convert_to(arg, ty, &frame))
                    .collect::<EvalResult<Vec<_>>>()
                    .map_err(|err| argument_failure(&function.name, err))?
            } else {
                args
            };

            let bindings = first_match(params, &args, &frame)?;
            frame.define_all(bindings.clone());

            // The condition may mention any parameter list, so it waits for the last
            if function.params.len() > 1 {
                return Ok(Value::Function(Arc::new(curry(function, bindings))));
            }

            if checked && settings.pre_checks {
                if let Some(pre) = &function.precondition {
                    if !pre.eval(&frame)?.as_bool()? {
                        return Err(RuntimeError::new(
                            codes::PRECONDITION_FAILURE,
                            format!("Precondition failure: pre_{}", function.name),
                        ));
                    }
                }
            }

            let mut result = body.eval(&frame)?;
            if checked && settings.dynamic_type_checks {
                result = convert_to(&result, &function.ty.result, &frame)?;
            }

            if checked && settings.post_checks {
                if let Some(post) = &function.postcondition {
                    let mut scope = frame.child("post");
                    scope.define("RESULT", result.clone());
                    if !post.eval(&scope)?.as_bool()? {
                        return Err(RuntimeError::new(
                            codes::POSTCONDITION_FAILURE,
                            format!("Postcondition failure: post_{}", function.name),
                        ));
                    }
                }
            }
            Ok(result)
        }
    }
}

/// A parameter conversion failure, re-raised as a failure of the call.
/// The code is kept so invariant failures stay recognisable.
fn argument_failure(callee: &str, err: RuntimeError) -> RuntimeError {
    RuntimeError::new(
        err.code,
        format!("Arguments of {} do not fit its parameter types", callee),
    )
    .caused_by(err)
}

fn first_match(params: &[crate::syntax::InPattern], args: &[Value], frame: &Context<'_>) -> EvalResult<Bindings> {
    match_each(params, args, frame)
        .map_err(MatchError::into_runtime)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            RuntimeError::new(
                codes::PATTERN_MISMATCH,
                "Arguments do not match the parameter patterns",
            )
        })
}

/// The function left after consuming the first parameter list
fn curry(function: &FunctionValue, bindings: Bindings) -> FunctionValue {
    let mut free = function.free.clone();
    for (name, value) in bindings {
        free.push(name, value);
    }
    let ty = match function.ty.result.as_ref() {
        Type::Function(next) => next.clone(),
        _ => FunctionType::new(Vec::new(), function.ty.result.as_ref().clone()),
    };
    FunctionValue {
        params: function.params[1..].to_vec(),
        ty,
        free,
        ..function.clone()
    }
}

/// `f[T1, ..., Tn]`
pub fn instantiate(function: &FunctionValue, actuals: Vec<Type>) -> EvalResult<Value> {
    if function.type_params.len() != actuals.len() {
        return Err(RuntimeError::new(
            codes::ARITY_MISMATCH,
            format!(
                "Function {} expects {} type parameters, found {}",
                function.name,
                function.type_params.len(),
                actuals.len()
            ),
        ));
    }
    let bindings: BTreeMap<String, Type> = function.type_params.iter().cloned().zip(actuals).collect();
    let substitution: HashMap<String, Type> = bindings.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let ty = match Type::Function(function.ty.clone()).substitute(&substitution) {
        Type::Function(ty) => ty,
        _ => function.ty.clone(),
    };
    Ok(Value::Function(Arc::new(FunctionValue {
        ty,
        type_bindings: bindings,
        ..function.clone()
    })))
}

/// `pre_(f, args)`: true when `f` has no precondition
pub fn precondition_holds(callee: &Value, args: Vec<Value>, ctx: &Context<'_>) -> EvalResult<Value> {
    let function = match callee {
        Value::Function(function) => function,
        Value::Operation(_) => return Ok(Value::Bool(true)),
        other => return Err(RuntimeError::expected(codes::EXPECTED_FUNCTION, "a function", other)),
    };
    let (Some(pre), Some(params)) = (&function.precondition, function.params.first()) else {
        return Ok(Value::Bool(true));
    };
    check_arity(&args, params.len())?;
    let root = ctx.root();
    let mut frame = match &function.self_obj {
        Some(object) => root.object_child(format!("pre_{}", function.name), Arc::clone(object)),
        None => root.child(format!("pre_{}", function.name)),
    };
    frame.define_all(function.free.clone());
    for (name, ty) in &function.type_bindings {
        frame.define_type_param(name, ty.clone());
    }
    let bindings = first_match(params, &args, &frame)?;
    if function.params.len() > 1 {
        // `pre_(f, a)(b)`: the rest of the lists are supplied by further applications
        let rest = curry(function, bindings);
        return Ok(Value::Function(Arc::new(FunctionValue {
            name: format!("pre_{}", function.name),
            ty: condition_type(&rest.ty, rest.params.len()),
            body: FunctionBody::Expr(Arc::clone(pre)),
            precondition: None,
            postcondition: None,
            ..rest
        })));
    }
    frame.define_all(bindings);
    Ok(Value::Bool(pre.eval(&frame)?.as_bool()?))
}

/// The curried type of a precondition over `lists` parameter lists of `ty`
fn condition_type(ty: &FunctionType, lists: usize) -> FunctionType {
    match ty.result.as_ref() {
        Type::Function(next) if lists > 1 => FunctionType::new(
            ty.params.clone(),
            Type::Function(condition_type(next, lists - 1)),
        ),
        _ => FunctionType::new(ty.params.clone(), Type::Bool),
    }
}

/// Call an operation, maintaining the history counters of its object
pub fn call_operation(operation: &Arc<OperationValue>, args: Vec<Value>, ctx: &Context<'_>) -> EvalResult<Value> {
    check_arity(&args, operation.params.len())?;
    trace!(operation = %operation.name, args = args.len(), "call");
    let settings = ctx.settings().clone();

    let root = ctx.root();
    let mut frame = match &operation.self_obj {
        Some(object) => root.object_child(operation.name.clone(), Arc::clone(object)),
        None => root.child(operation.name.clone()),
    };
    let args = if settings.dynamic_type_checks {
        args.iter()
            .zip(&operation.ty.params)
            .map(|(arg, ty)| convert_to(arg, ty, &frame))
            .collect::<EvalResult<Vec<_>>>()
            .map_err(|err| argument_failure(&operation.name, err))?
    } else {
        args
    };
    frame.define_all(first_match(&operation.params, &args, &frame)?);

    if let Some(object) = &operation.self_obj {
        object.record_request(&operation.name);
    }
    if settings.pre_checks {
        if let Some(pre) = &operation.precondition {
            if !pre.eval(&frame)?.as_bool()? {
                return Err(RuntimeError::new(
                    codes::PRECONDITION_FAILURE,
                    format!("Precondition failure: pre_{}", operation.name),
                ));
            }
        }
    }

    let old_state: Vec<(String, Value)> = match (&operation.self_obj, &operation.postcondition) {
        (Some(object), Some(_)) if settings.post_checks => object
            .members_snapshot()
            .into_iter()
            .map(|(name, value)| (name, value.deref()))
            .collect(),
        _ => Vec::new(),
    };

    if let Some(object) = &operation.self_obj {
        object.record_activation(&operation.name);
    }
    let outcome = operation.body.execute(&frame);
    if let Some(object) = &operation.self_obj {
        object.record_finish(&operation.name);
    }
    let mut result = outcome?;

    if settings.dynamic_type_checks && *operation.ty.result != Type::Void {
        result = convert_to(&result, &operation.ty.result, &frame)?;
    }

    if settings.post_checks {
        if let Some(post) = &operation.postcondition {
            let mut scope = frame.child("post");
            for (name, value) in old_state {
                scope.set_old(name, value);
            }
            scope.define("RESULT", result.clone());
            if !post.eval(&scope)?.as_bool()? {
                return Err(RuntimeError::new(
                    codes::POSTCONDITION_FAILURE,
                    format!("Postcondition failure: post_{}", operation.name),
                ));
            }
        }
    }
    Ok(result)
}
