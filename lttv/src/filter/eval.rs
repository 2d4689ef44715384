//! Filter evaluation (C7), grounded on `filter.c`'s `lttv_filter_tree_parse`
//! expression walker, simplified since this engine has no GQuark-keyed field
//! dispatch table to thread through: evaluation just matches on the closed
//! `FieldRef` enum directly.
//!
//! Evaluation never fails. A field that cannot be resolved in the current
//! context (an unknown marker field, say) or a type mismatch between a
//! field's value and the literal it's compared against simply evaluates the
//! leaf to `false`, rather than raising an error mid-trace-walk.

use std::collections::HashMap;

use super::ast::{CompareOp, FieldRef, FilterExpr, Literal, SimpleExpression};
use crate::domain::types::{Cpu, Tsc};
use crate::state::ProcessState;

/// Everything a leaf expression might need to read, bundled by the caller
/// (the process-trace driver) once per event.
pub struct FilterContext<'a> {
    pub process: &'a ProcessState,
    pub cpu: Cpu,
    pub tsc: Tsc,
    pub event_name: &'a str,
    pub marker_fields: &'a HashMap<String, Literal>,
}

#[must_use]
pub fn evaluate(expr: &FilterExpr, ctx: &FilterContext<'_>) -> bool {
    match expr {
        FilterExpr::And(lhs, rhs) => evaluate(lhs, ctx) && evaluate(rhs, ctx),
        FilterExpr::Or(lhs, rhs) => evaluate(lhs, ctx) || evaluate(rhs, ctx),
        FilterExpr::Xor(lhs, rhs) => evaluate(lhs, ctx) ^ evaluate(rhs, ctx),
        FilterExpr::Not(inner) => !evaluate(inner, ctx),
        FilterExpr::Leaf(simple) => evaluate_leaf(simple, ctx),
    }
}

fn evaluate_leaf(simple: &SimpleExpression, ctx: &FilterContext<'_>) -> bool {
    match field_value(&simple.field, ctx) {
        Some(value) => compare(simple.op, &value, &simple.value),
        None => false,
    }
}

fn field_value(field: &FieldRef, ctx: &FilterContext<'_>) -> Option<Literal> {
    Some(match field {
        FieldRef::Pid => Literal::Int(i64::from(ctx.process.pid.0)),
        FieldRef::Ppid => Literal::Int(i64::from(ctx.process.ppid.0)),
        FieldRef::Cpu => Literal::Int(i64::from(ctx.cpu.0)),
        FieldRef::ProcessName => Literal::Str(ctx.process.name.clone()),
        FieldRef::Brand => Literal::Str(ctx.process.brand.clone()),
        FieldRef::ExecutionMode => Literal::Str(ctx.process.current().mode.as_str().to_owned()),
        FieldRef::Submode => Literal::Str(ctx.process.current().submode.as_str().to_owned()),
        FieldRef::ProcessStatus => Literal::Str(ctx.process.current().status.as_str().to_owned()),
        FieldRef::ProcessType => Literal::Str(ctx.process.process_type.as_str().to_owned()),
        FieldRef::Tsc => Literal::Int(i64::try_from(ctx.tsc.0).ok()?),
        FieldRef::EventName => Literal::Str(ctx.event_name.to_owned()),
        FieldRef::Marker(name) => ctx.marker_fields.get(name)?.clone(),
    })
}

fn compare(op: CompareOp, lhs: &Literal, rhs: &Literal) -> bool {
    match (lhs, rhs) {
        (Literal::Int(a), Literal::Int(b)) => compare_ord(op, a, b),
        (Literal::Str(a), Literal::Str(b)) => compare_ord(op, a, b),
        // a field's actual type never matches the literal it's compared
        // against: treat as unequal rather than raising an error.
        _ => matches!(op, CompareOp::Ne),
    }
}

fn compare_ord<T: PartialOrd>(op: CompareOp, a: &T, b: &T) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
    }
}
