//! Expression evaluation

use crate::error::{EvalError, EvalResult};
use crate::logic::builtins;
use crate::logic::operators::{self, array_index, OperandError};
use crate::scope::Scope;
use quill_core::{ObjectMap, Value};
use quill_dsl::{
    print_expression, ArrayElement, AssignmentOperator, Expression, Literal, LogicalOperator,
    MemberProperty, Property, PropertyKey, Span, UnaryOperator, UpdateOperator,
};
use tracing::trace;

/// Arrays may not be grown past this many items by assignment.
const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Evaluate an expression against a scope.
///
/// Assignments and updates write into `scope`; everything else only reads.
pub fn evaluate(expression: &Expression, scope: &mut Scope) -> EvalResult<Value> {
    Evaluator { scope }.eval(expression)
}

/// An assignable location: a binding plus a property path into its value.
struct Place {
    root: String,
    path: Vec<String>,
    span: Span,
}

struct Evaluator<'s> {
    scope: &'s mut Scope,
}

impl Evaluator<'_> {
    fn eval(&mut self, expression: &Expression) -> EvalResult<Value> {
        match expression {
            Expression::Literal { value, .. } => Ok(literal(value)),

            Expression::Identifier { name, span } => self.identifier(name, *span),

            Expression::Array { elements, .. } => self.elements(elements).map(Value::Array),

            Expression::Object { properties, .. } => self.object(properties),

            Expression::Sequence { expressions, .. } => {
                let mut last = Value::Undefined;
                for expression in expressions {
                    last = self.eval(expression)?;
                }
                Ok(last)
            }

            Expression::Logical {
                operator,
                left,
                right,
                ..
            } => {
                let left = self.eval(left)?;
                if short_circuits(*operator, &left) {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }

            Expression::Binary {
                operator,
                left,
                right,
                span,
            } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                operators::binary(*operator, &left, &right)
                    .map_err(|e| operand_error(operator.as_str(), e, *span))
            }

            Expression::Unary {
                operator, argument, ..
            } => {
                if *operator == UnaryOperator::Typeof {
                    if let Expression::Identifier { name, .. } = argument.as_ref() {
                        if !self.scope.is_defined(name) && builtins::global_constant(name).is_none() {
                            return Ok(Value::string("undefined"));
                        }
                    }
                }
                let argument = self.eval(argument)?;
                Ok(operators::unary(*operator, &argument))
            }

            Expression::Update {
                operator,
                prefix,
                argument,
                ..
            } => {
                let place = self.place(argument)?;
                let old = self.read(&place)?.to_number();
                let new = match operator {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.write(&place, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }

            Expression::Assignment {
                operator,
                target,
                value,
                span,
            } => self.assignment(*operator, target, value, *span),

            Expression::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }

            // Outside a chain no access is optional, so nothing can short-circuit.
            Expression::Member { .. } | Expression::Call { .. } => {
                Ok(self.link(expression)?.unwrap_or_default())
            }

            Expression::Chain { expression, .. } => Ok(self.link(expression)?.unwrap_or_default()),
        }
    }

    fn identifier(&self, name: &str, span: Span) -> EvalResult<Value> {
        if let Some(value) = self.scope.get(name) {
            return Ok(value.clone());
        }
        builtins::global_constant(name).ok_or_else(|| EvalError::UndefinedVariable {
            name: name.to_string(),
            span,
        })
    }

    fn is_namespace_reference(&self, expression: &Expression) -> Option<String> {
        match expression {
            Expression::Identifier { name, .. }
                if builtins::is_namespace(name) && !self.scope.is_defined(name) =>
            {
                Some(name.clone())
            }
            _ => None,
        }
    }

    // ========================================================================
    // MEMBER ACCESS AND CALLS
    // ========================================================================

    /// Evaluate one link of a member/call chain. `None` means an optional
    /// access hit a nullish value and the rest of the chain is skipped.
    fn link(&mut self, expression: &Expression) -> EvalResult<Option<Value>> {
        match expression {
            Expression::Member {
                object,
                property,
                optional,
                span,
            } => {
                if let Some(namespace) = self.is_namespace_reference(object) {
                    let key = self.property_key(property)?;
                    return Ok(Some(
                        builtins::namespace_constant(&namespace, &key).unwrap_or_default(),
                    ));
                }
                let Some(target) = self.link(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property)?;
                get_property(&target, &key, *span).map(Some)
            }
            Expression::Call {
                callee,
                arguments,
                optional,
                span,
            } => self.call(callee, arguments, *optional, *span),
            other => self.eval(other).map(Some),
        }
    }

    fn property_key(&mut self, property: &MemberProperty) -> EvalResult<String> {
        match property {
            MemberProperty::Named(name) => Ok(name.clone()),
            MemberProperty::Computed(expression) => Ok(self.eval(expression)?.to_js_string()),
        }
    }

    fn call(
        &mut self,
        callee: &Expression,
        arguments: &[ArrayElement],
        optional: bool,
        span: Span,
    ) -> EvalResult<Option<Value>> {
        let unknown = || EvalError::UnknownFunction {
            name: print_expression(callee),
            span,
        };

        match callee {
            Expression::Identifier { name, .. } => {
                if let Some(value) = self.scope.get(name) {
                    // Values are never callable.
                    return if optional && value.is_nullish() {
                        Ok(None)
                    } else {
                        Err(unknown())
                    };
                }
                if !builtins::is_global_function(name) {
                    return Err(unknown());
                }
                let args = self.elements(arguments)?;
                trace!(function = %name, "builtin call");
                invoke(builtins::call_function(name, &args), name, span)
                    .and_then(|result| result.ok_or_else(unknown))
                    .map(Some)
            }

            Expression::Member {
                object,
                property,
                optional: optional_member,
                span: member_span,
            } => {
                if let Some(namespace) = self.is_namespace_reference(object) {
                    let method = self.property_key(property)?;
                    let args = self.elements(arguments)?;
                    let function = format!("{}.{}", namespace, method);
                    trace!(function = %function, "builtin call");
                    return invoke(
                        builtins::call_namespace(&namespace, &method, &args),
                        &function,
                        span,
                    )
                    .and_then(|result| result.ok_or_else(unknown))
                    .map(Some);
                }

                let Some(receiver) = self.link(object)? else {
                    return Ok(None);
                };
                if *optional_member && receiver.is_nullish() {
                    return Ok(None);
                }
                let method = self.property_key(property)?;
                if receiver.is_nullish() {
                    return Err(EvalError::NullReference {
                        property: method,
                        target: receiver.to_js_string(),
                        span: *member_span,
                    });
                }
                if !builtins::has_method(&receiver, &method) {
                    return if optional { Ok(None) } else { Err(unknown()) };
                }
                let args = self.elements(arguments)?;
                trace!(method = %method, receiver = receiver.type_of(), "builtin call");
                invoke(builtins::call_method(&receiver, &method, &args), &method, span)
                    .and_then(|result| result.ok_or_else(unknown))
                    .map(Some)
            }

            other => {
                let Some(value) = self.link(other)? else {
                    return Ok(None);
                };
                if optional && value.is_nullish() {
                    Ok(None)
                } else {
                    Err(unknown())
                }
            }
        }
    }

    // ========================================================================
    // CONSTRUCTORS
    // ========================================================================

    fn elements(&mut self, elements: &[ArrayElement]) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                ArrayElement::Item(expression) => out.push(self.eval(expression)?),
                ArrayElement::Spread(expression) => match self.eval(expression)? {
                    Value::Array(items) => out.extend(items),
                    Value::String(s) => out.extend(s.chars().map(|c| Value::String(c.to_string()))),
                    other => {
                        return Err(EvalError::InvalidOperand {
                            operator: "...".to_string(),
                            reason: format!("{} is not iterable", other.type_of()),
                            span: expression.span(),
                        })
                    }
                },
            }
        }
        Ok(out)
    }

    fn object(&mut self, properties: &[Property]) -> EvalResult<Value> {
        let mut map = ObjectMap::new();
        for property in properties {
            match property {
                Property::KeyValue { key, value } => {
                    let key = match key {
                        PropertyKey::Named(name) => name.clone(),
                        PropertyKey::Computed(expression) => self.eval(expression)?.to_js_string(),
                    };
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                Property::Spread(expression) => match self.eval(expression)? {
                    Value::Object(entries) => map.extend(entries),
                    Value::Array(items) => {
                        map.extend(items.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)))
                    }
                    Value::String(s) => map.extend(
                        s.chars()
                            .enumerate()
                            .map(|(i, c)| (i.to_string(), Value::String(c.to_string()))),
                    ),
                    // Spreading a primitive contributes nothing.
                    _ => {}
                },
            }
        }
        Ok(Value::Object(map))
    }

    // ========================================================================
    // ASSIGNMENT
    // ========================================================================

    fn assignment(
        &mut self,
        operator: AssignmentOperator,
        target: &Expression,
        value: &Expression,
        span: Span,
    ) -> EvalResult<Value> {
        let place = self.place(target)?;

        if let Some(binary) = operator.binary() {
            let current = self.read(&place)?;
            let rhs = self.eval(value)?;
            let result = operators::binary(binary, &current, &rhs)
                .map_err(|e| operand_error(operator.as_str(), e, span))?;
            self.write(&place, result.clone())?;
            return Ok(result);
        }

        let logical = match operator {
            AssignmentOperator::And => Some(LogicalOperator::And),
            AssignmentOperator::Or => Some(LogicalOperator::Or),
            AssignmentOperator::Nullish => Some(LogicalOperator::Nullish),
            _ => None,
        };
        if let Some(logical) = logical {
            let current = self.read(&place)?;
            if short_circuits(logical, &current) {
                return Ok(current);
            }
        }

        let value = self.eval(value)?;
        self.write(&place, value.clone())?;
        Ok(value)
    }

    fn place(&mut self, target: &Expression) -> EvalResult<Place> {
        match target {
            Expression::Identifier { name, span } => Ok(Place {
                root: name.clone(),
                path: Vec::new(),
                span: *span,
            }),
            Expression::Member {
                object,
                property,
                optional: false,
                span,
            } => {
                let mut place = self.place(object)?;
                place.path.push(self.property_key(property)?);
                place.span = *span;
                Ok(place)
            }
            other => Err(EvalError::InvalidAssignment {
                reason: format!("cannot assign to '{}'", print_expression(other)),
                span: other.span(),
            }),
        }
    }

    fn read(&self, place: &Place) -> EvalResult<Value> {
        let mut current = self
            .scope
            .get(&place.root)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable {
                name: place.root.clone(),
                span: place.span,
            })?;
        for key in &place.path {
            current = get_property(&current, key, place.span)?;
        }
        Ok(current)
    }

    fn write(&mut self, place: &Place, value: Value) -> EvalResult<()> {
        let Some((last, parents)) = place.path.split_last() else {
            self.scope.set(place.root.clone(), value);
            return Ok(());
        };

        let span = place.span;
        let mut current = self
            .scope
            .get_mut(&place.root)
            .ok_or_else(|| EvalError::UndefinedVariable {
                name: place.root.clone(),
                span,
            })?;
        for key in parents {
            current = child_mut(current, key, span)?;
        }
        set_property(current, last, value, span)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn literal(literal: &Literal) -> Value {
    match literal {
        Literal::Undefined => Value::Undefined,
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
    }
}

/// True if `left <op> right` evaluates to `left` without looking at `right`.
fn short_circuits(operator: LogicalOperator, left: &Value) -> bool {
    match operator {
        LogicalOperator::And => !left.is_truthy(),
        LogicalOperator::Or => left.is_truthy(),
        LogicalOperator::Nullish => !left.is_nullish(),
    }
}

fn operand_error(operator: &str, error: OperandError, span: Span) -> EvalError {
    EvalError::InvalidOperand {
        operator: operator.to_string(),
        reason: error.0,
        span,
    }
}

fn invoke(
    result: builtins::BuiltinResult,
    function: &str,
    span: Span,
) -> EvalResult<Option<Value>> {
    match result {
        None => Ok(None),
        Some(Ok(value)) => Ok(Some(value)),
        Some(Err(reason)) => Err(EvalError::InvalidArgument {
            function: function.to_string(),
            reason,
            span,
        }),
    }
}

fn null_reference(target: &Value, property: &str, span: Span) -> EvalError {
    EvalError::NullReference {
        property: property.to_string(),
        target: target.to_js_string(),
        span,
    }
}

/// Read `target[key]`.
pub(crate) fn get_property(target: &Value, key: &str, span: Span) -> EvalResult<Value> {
    let value = match target {
        Value::Undefined | Value::Null => return Err(null_reference(target, key, span)),
        Value::String(s) => {
            if key == "length" {
                Value::Number(s.encode_utf16().count() as f64)
            } else if let Some(index) = array_index(key) {
                s.encode_utf16()
                    .nth(index)
                    .map(|unit| Value::String(String::from_utf16_lossy(&[unit])))
                    .unwrap_or_default()
            } else {
                Value::Undefined
            }
        }
        Value::Array(items) => {
            if key == "length" {
                Value::Number(items.len() as f64)
            } else {
                array_index(key)
                    .and_then(|index| items.get(index))
                    .cloned()
                    .unwrap_or_default()
            }
        }
        Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
        Value::Bool(_) | Value::Number(_) => Value::Undefined,
    };
    Ok(value)
}

fn child_mut<'v>(value: &'v mut Value, key: &str, span: Span) -> EvalResult<&'v mut Value> {
    if value.is_nullish() {
        return Err(null_reference(value, key, span));
    }
    let type_name = value.type_of();
    match value {
        Value::Object(map) => map
            .get_mut(key)
            .ok_or_else(|| null_reference(&Value::Undefined, key, span)),
        Value::Array(items) => array_index(key)
            .and_then(|index| items.get_mut(index))
            .ok_or_else(|| null_reference(&Value::Undefined, key, span)),
        _ => Err(EvalError::InvalidAssignment {
            reason: format!("cannot set properties on a {}", type_name),
            span,
        }),
    }
}

fn set_property(container: &mut Value, key: &str, value: Value, span: Span) -> EvalResult<()> {
    let invalid = |reason: String| EvalError::InvalidAssignment { reason, span };
    match container {
        Value::Object(map) => {
            map.insert(key.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            if key == "length" {
                let n = value.to_number();
                if n < 0.0 || n.fract() != 0.0 || n as usize > MAX_ARRAY_LENGTH {
                    return Err(invalid(format!("invalid array length {}", value)));
                }
                items.resize(n as usize, Value::Undefined);
                return Ok(());
            }
            let index = array_index(key)
                .ok_or_else(|| invalid(format!("'{}' is not an array index", key)))?;
            if index >= MAX_ARRAY_LENGTH {
                return Err(invalid(format!("array index {} is too large", index)));
            }
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        Value::Undefined | Value::Null => Err(null_reference(container, key, span)),
        other => Err(invalid(format!(
            "cannot set property '{}' on a {}",
            key,
            other.type_of()
        ))),
    }
}
