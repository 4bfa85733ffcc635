use super::ast::{BinOp, Expr};

// ── Constant Folding on Expr ─────────────────────────────────────────

/// Fold constant subtrees. Anything that reads time, input or a parameter
/// stays as written; everything else collapses to `Expr::Const`.
pub fn fold_constants(expr: Expr) -> Expr {
    match expr {
        Expr::Neg(inner) => match fold_constants(*inner) {
            Expr::Const(v) => Expr::Const(-v),
            // --x → x
            Expr::Neg(x) => *x,
            folded => Expr::Neg(Box::new(folded)),
        },

        Expr::Binary { op, left, right } => {
            let left = fold_constants(*left);
            let right = fold_constants(*right);
            match (left.constant(), right.constant()) {
                (Some(a), Some(b)) => Expr::Const(op.apply(a, b)),
                _ => simplify(op, left, right),
            }
        }

        Expr::Call { func, arg } => {
            let arg = fold_constants(*arg);
            match arg.constant() {
                Some(v) => Expr::Const(func.apply(v)),
                None => Expr::Call { func, arg: Box::new(arg) },
            }
        }

        leaf @ (Expr::Const(_)
        | Expr::Time
        | Expr::DeltaTime
        | Expr::FrameCount
        | Expr::Param(_)
        | Expr::KeyDown(_)
        | Expr::MouseButtonDown(_)) => leaf,
    }
}

/// Identity rewrites with exactly one constant side. Only rewrites that hold
/// for every finite input are applied; `x * 0` is left alone.
fn simplify(op: BinOp, left: Expr, right: Expr) -> Expr {
    match (op, left.constant(), right.constant()) {
        (BinOp::Add, Some(z), None) if z == 0.0 => right,
        (BinOp::Add | BinOp::Sub, None, Some(z)) if z == 0.0 => left,
        (BinOp::Mul, Some(one), None) if one == 1.0 => right,
        (BinOp::Mul | BinOp::Div, None, Some(one)) if one == 1.0 => left,
        _ => Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::ast::MathFn;

    fn bin(op: BinOp, l: Expr, r: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(l),
            right: Box::new(r),
        }
    }

    #[test]
    fn folds_arithmetic() {
        let e = bin(BinOp::Mul, Expr::Const(2.0), bin(BinOp::Add, Expr::Const(1.0), Expr::Const(2.0)));
        assert_eq!(fold_constants(e), Expr::Const(6.0));
    }

    #[test]
    fn folds_division_by_zero_to_zero() {
        let e = bin(BinOp::Div, Expr::Const(5.0), Expr::Const(0.0));
        assert_eq!(fold_constants(e), Expr::Const(0.0));
    }

    #[test]
    fn folds_negation_and_calls() {
        let e = Expr::Neg(Box::new(Expr::Call {
            func: MathFn::Cos,
            arg: Box::new(Expr::Const(0.0)),
        }));
        assert_eq!(fold_constants(e), Expr::Const(-1.0));
        let double = Expr::Neg(Box::new(Expr::Neg(Box::new(Expr::Time))));
        assert_eq!(fold_constants(double), Expr::Time);
    }

    #[test]
    fn keeps_dynamic_parts() {
        let e = bin(
            BinOp::Mul,
            Expr::Param("speed".into()),
            bin(BinOp::Mul, Expr::Const(2.0), Expr::Const(3.0)),
        );
        assert_eq!(
            fold_constants(e),
            bin(BinOp::Mul, Expr::Param("speed".into()), Expr::Const(6.0))
        );
    }

    #[test]
    fn identity_rewrites() {
        assert_eq!(fold_constants(bin(BinOp::Add, Expr::Time, Expr::Const(0.0))), Expr::Time);
        assert_eq!(fold_constants(bin(BinOp::Mul, Expr::Const(1.0), Expr::DeltaTime)), Expr::DeltaTime);
        assert_eq!(fold_constants(bin(BinOp::Div, Expr::FrameCount, Expr::Const(1.0))), Expr::FrameCount);
        // 0 - x is not x.
        assert_eq!(
            fold_constants(bin(BinOp::Sub, Expr::Const(0.0), Expr::Time)),
            bin(BinOp::Sub, Expr::Const(0.0), Expr::Time)
        );
    }
}
