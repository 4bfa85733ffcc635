use std::time::Duration;

use glam::DVec3;

use super::ast::Expr;
use super::compiler::{AssignOp, Instruction};
use crate::clock::Clock;
use crate::error::{ExecutionError, InstructionFault};
use crate::events::ScriptLog;
use crate::model::{EntityCapabilities, InputState, ScriptParameters, TimeInfo, TransformField};
use crate::util::duration_ms;

/// Everything one execution may read or write. Built per call, never kept.
pub struct ExecutionContext<'a> {
    pub entity_id: u64,
    pub time: TimeInfo,
    pub input: &'a dyn InputState,
    pub parameters: &'a ScriptParameters,
    pub budget: Option<Duration>,
    pub entity: Option<&'a mut dyn EntityCapabilities>,
}

/// What a run did. A run that stopped early still reports the work done
/// before it stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub executed: usize,
    pub total: usize,
    /// Instructions skipped because their target capability was missing.
    pub faults: Vec<InstructionFault>,
    pub logs: Vec<ScriptLog>,
    pub stopped: Option<ExecutionError>,
}

/// Read-only inputs to expression evaluation.
#[derive(Clone, Copy)]
struct Env<'a> {
    time: TimeInfo,
    input: &'a dyn InputState,
    parameters: &'a ScriptParameters,
}

/// Run `instructions` top to bottom. The budget is only checked between
/// instructions and only stops the run while work remains.
pub fn run(instructions: &[Instruction], ctx: &mut ExecutionContext<'_>, clock: &dyn Clock) -> RunReport {
    let env = Env {
        time: ctx.time,
        input: ctx.input,
        parameters: ctx.parameters,
    };
    let total = instructions.len();
    let mut report = RunReport {
        total,
        ..RunReport::default()
    };
    let start = ctx.budget.map(|_| clock.now());

    for (index, instruction) in instructions.iter().enumerate() {
        let entity = ctx.entity.as_deref_mut();
        if let Err(reason) = dispatch(instruction, env, entity, &mut report.logs) {
            log::debug!(
                "[Script] entity {}: skipped {} at {index}: {reason}",
                ctx.entity_id,
                instruction.opcode().name()
            );
            report.faults.push(InstructionFault {
                index,
                opcode: instruction.opcode().name().to_string(),
                reason: reason.to_string(),
            });
        }
        report.executed = index + 1;

        if let (Some(budget), Some(start)) = (ctx.budget, start) {
            let elapsed = clock.now().saturating_duration_since(start);
            if elapsed > budget && report.executed < total {
                report.stopped = Some(ExecutionError::BudgetExceeded {
                    completed: report.executed,
                    total,
                    budget_ms: duration_ms(budget),
                });
                break;
            }
        }
    }
    report
}

fn dispatch(
    instruction: &Instruction,
    env: Env<'_>,
    entity: Option<&mut (dyn EntityCapabilities + '_)>,
    logs: &mut Vec<ScriptLog>,
) -> Result<(), &'static str> {
    match instruction {
        Instruction::SetPosition(args) => write_vector(entity, TransformField::Position, eval3(args, env), false),
        Instruction::SetRotation(args) => write_vector(entity, TransformField::Rotation, eval3(args, env), false),
        Instruction::SetScale(args) => write_vector(entity, TransformField::Scale, eval3(args, env), false),
        Instruction::Translate(args) => write_vector(entity, TransformField::Position, eval3(args, env), true),
        Instruction::Rotate(args) => write_vector(entity, TransformField::Rotation, eval3(args, env), true),
        Instruction::AssignField { field, axis, op, value } => {
            let value = eval(value, env);
            let transform = entity.ok_or(NO_ENTITY)?.transform().ok_or(NO_TRANSFORM)?;
            let mut v = transform.get(*field);
            let current = axis.get(v);
            let next = match op {
                AssignOp::Set => value,
                AssignOp::Add => current + value,
                AssignOp::Sub => current - value,
            };
            axis.set(&mut v, finite_or_zero(next));
            transform.set(*field, v);
            Ok(())
        }
        Instruction::SetMaterialColor(color) => {
            let material = entity.ok_or(NO_ENTITY)?.material().ok_or(NO_MATERIAL)?;
            material.set_color(*color);
            Ok(())
        }
        Instruction::SetMaterialScalar { property, value } => {
            let value = eval(value, env).clamp(0.0, 1.0);
            let material = entity.ok_or(NO_ENTITY)?.material().ok_or(NO_MATERIAL)?;
            material.set_scalar(*property, value);
            Ok(())
        }
        Instruction::Log { level, message } => {
            logs.push(ScriptLog {
                level: *level,
                message: message.clone(),
            });
            Ok(())
        }
    }
}

const NO_ENTITY: &str = "no entity bound to this execution";
const NO_TRANSFORM: &str = "entity has no transform";
const NO_MATERIAL: &str = "entity has no material";

fn write_vector(
    entity: Option<&mut (dyn EntityCapabilities + '_)>,
    field: TransformField,
    value: DVec3,
    relative: bool,
) -> Result<(), &'static str> {
    let transform = entity.ok_or(NO_ENTITY)?.transform().ok_or(NO_TRANSFORM)?;
    let next = if relative { transform.get(field) + value } else { value };
    transform.set(field, next);
    Ok(())
}

fn eval3(args: &[Expr; 3], env: Env<'_>) -> DVec3 {
    let [x, y, z] = args;
    DVec3::new(
        finite_or_zero(eval(x, env)),
        finite_or_zero(eval(y, env)),
        finite_or_zero(eval(z, env)),
    )
}

/// Entity state must stay finite; NaN or infinity becomes 0.
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[allow(clippy::cast_precision_loss)]
fn eval(expr: &Expr, env: Env<'_>) -> f64 {
    match expr {
        Expr::Const(v) => *v,
        Expr::Time => env.time.time,
        Expr::DeltaTime => env.time.delta_time,
        Expr::FrameCount => env.time.frame_count as f64,
        Expr::Param(name) => env.parameters.number(name).unwrap_or(0.0),
        Expr::KeyDown(key) => bool_to_f64(env.input.is_key_down(key)),
        Expr::MouseButtonDown(button) => bool_to_f64(env.input.is_mouse_button_down(*button)),
        Expr::Neg(inner) => -eval(inner, env),
        Expr::Binary { op, left, right } => op.apply(eval(left, env), eval(right, env)),
        Expr::Call { func, arg } => func.apply(eval(arg, env)),
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
