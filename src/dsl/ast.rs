//! Syntax types for the entity behavior script dialect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Source span for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

// ── Lifecycles ───────────────────────────────────────────────────

/// One of the five recognized script entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Lifecycle {
    #[serde(rename = "onStart")]
    OnStart,
    #[serde(rename = "onUpdate")]
    OnUpdate,
    #[serde(rename = "onDestroy")]
    OnDestroy,
    #[serde(rename = "onEnable")]
    OnEnable,
    #[serde(rename = "onDisable")]
    OnDisable,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 5] = [
        Lifecycle::OnStart,
        Lifecycle::OnUpdate,
        Lifecycle::OnDestroy,
        Lifecycle::OnEnable,
        Lifecycle::OnDisable,
    ];

    /// The name a script uses to declare this lifecycle.
    pub const fn script_name(self) -> &'static str {
        match self {
            Lifecycle::OnStart => "onStart",
            Lifecycle::OnUpdate => "onUpdate",
            Lifecycle::OnDestroy => "onDestroy",
            Lifecycle::OnEnable => "onEnable",
            Lifecycle::OnDisable => "onDisable",
        }
    }

    pub fn from_script_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.script_name() == name)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}

impl FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_script_name(s).ok_or_else(|| {
            format!(
                "unknown lifecycle '{s}' (expected one of: {})",
                Self::ALL.map(Lifecycle::script_name).join(", ")
            )
        })
    }
}

/// The raw source of one lifecycle body, exactly as written between its braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleBody {
    pub lifecycle: Lifecycle,
    pub body: String,
    /// Span of the body text inside the script source.
    pub span: Span,
}

/// Output of the lifecycle extractor. Built once per compile attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub bodies: Vec<LifecycleBody>,
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ParseResult {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            bodies: Vec::new(),
            is_valid: false,
            error: Some(message.into()),
        }
    }

    pub fn body(&self, lifecycle: Lifecycle) -> Option<&str> {
        self.bodies
            .iter()
            .find(|b| b.lifecycle == lifecycle)
            .map(|b| b.body.as_str())
    }

    /// Bodies a caller may execute. An invalid result has none.
    pub fn executable_bodies(&self) -> &[LifecycleBody] {
        if self.is_valid {
            &self.bodies
        } else {
            &[]
        }
    }
}

// ── Expressions ──────────────────────────────────────────────────

/// Arithmetic-over-time expression. The grammar is closed: there are no
/// variables beyond the builtins below and no user functions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    /// Seconds since the simulation started.
    Time,
    /// Seconds since the previous frame.
    DeltaTime,
    FrameCount,
    /// Numeric script parameter, `parameters.speed`.
    Param(String),
    /// `input.isKeyDown("Space")`, 1.0 when held.
    KeyDown(String),
    /// `input.isMouseButtonDown(0)`, 1.0 when held.
    MouseButtonDown(u8),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: MathFn,
        arg: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sin,
    Cos,
}

impl BinOp {
    /// Division by zero yields 0.0 rather than infinity.
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
        }
    }
}

impl MathFn {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            MathFn::Sin => x.sin(),
            MathFn::Cos => x.cos(),
        }
    }
}

impl Expr {
    pub fn constant(&self) -> Option<f64> {
        match self {
            Expr::Const(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_names_round_trip() {
        for lifecycle in Lifecycle::ALL {
            assert_eq!(Lifecycle::from_script_name(lifecycle.script_name()), Some(lifecycle));
            assert_eq!(lifecycle.script_name().parse::<Lifecycle>().unwrap(), lifecycle);
        }
        assert!(Lifecycle::from_script_name("onTick").is_none());
        assert!("update".parse::<Lifecycle>().is_err());
    }

    #[test]
    fn lifecycle_serializes_with_script_name() {
        let json = serde_json::to_string(&Lifecycle::OnUpdate).unwrap();
        assert_eq!(json, "\"onUpdate\"");
    }

    #[test]
    fn invalid_result_has_no_executable_bodies() {
        let mut result = ParseResult::invalid("broken");
        result.bodies.push(LifecycleBody {
            lifecycle: Lifecycle::OnStart,
            body: String::new(),
            span: Span::default(),
        });
        assert!(result.executable_bodies().is_empty());
        assert_eq!(result.body(Lifecycle::OnStart), Some(""));
    }

    #[test]
    fn division_by_zero_is_zero() {
        assert_eq!(BinOp::Div.apply(4.0, 0.0), 0.0);
        assert_eq!(BinOp::Div.apply(4.0, 2.0), 2.0);
    }
}
