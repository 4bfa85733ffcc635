use std::fmt::Write;

use super::builtins::{Shape, CATALOG, IMPLICIT_VARS, MATH_FNS, PARAM_PREFIXES};

fn operands(shape: Shape) -> &'static str {
    match shape {
        Shape::Vector { .. } => "(x, y, z)",
        Shape::FieldAssign(_) => ".x = expr",
        Shape::Color => "(color)",
        Shape::Scalar(_) => "(value)",
        Shape::Log(_) => "(\"message\")",
    }
}

fn operations_table() -> String {
    let mut out = String::new();
    out.push_str("## Operations\n");
    out.push_str("| Statement | Also | Description |\n");
    out.push_str("|-----------|------|-------------|\n");

    for entry in CATALOG {
        let Some((canonical, aliases)) = entry.paths.split_first() else {
            continue;
        };
        let aliases: Vec<String> = aliases.iter().map(|a| format!("`{a}`")).collect();
        let _ = writeln!(
            out,
            "| `{canonical}{}` | {} | {} |",
            operands(entry.shape),
            aliases.join(", "),
            entry.description,
        );
    }
    out.push('\n');
    out
}

fn implicit_variables_table() -> String {
    let mut out = String::new();
    out.push_str("## Implicit Variables\n");
    out.push_str("| Variable | Description |\n");
    out.push_str("|----------|-------------|\n");

    let mut seen = Vec::new();
    for &(_, var, desc) in IMPLICIT_VARS {
        if seen.contains(&var) {
            continue;
        }
        seen.push(var);
        let names: Vec<String> = IMPLICIT_VARS
            .iter()
            .filter(|&&(_, v, _)| v == var)
            .map(|&(name, _, _)| format!("`{name}`"))
            .collect();
        let _ = writeln!(out, "| {} | {desc} |", names.join(", "));
    }
    out.push('\n');
    out
}

/// Markdown reference of everything a script can do, generated from the
/// builtins tables so it never drifts from what the compiler accepts.
pub fn script_reference() -> String {
    let mut out = String::new();
    out.push_str(
        r"# Entity Script Reference

## Lifecycles
Define any of `onStart`, `onUpdate`, `onDestroy`, `onEnable`, `onDisable` as
`function onUpdate() { ... }` or `const onUpdate = () => { ... }`.
Statements outside the table below are skipped.

",
    );
    out.push_str(&operations_table());
    out.push_str(&implicit_variables_table());

    out.push_str("## Expressions\n");
    let math: Vec<String> = MATH_FNS.iter().map(|(name, _)| format!("`{name}`")).collect();
    let _ = writeln!(out, "Numbers, `+ - * /`, parentheses and {}.", math.join(", "));
    let params: Vec<String> = PARAM_PREFIXES.iter().map(|p| format!("`{p}.name`")).collect();
    let _ = writeln!(out, "Parameters read as {}; a missing one reads as 0.", params.join(" or "));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_row_is_documented() {
        let doc = script_reference();
        for entry in CATALOG {
            assert!(doc.contains(entry.description), "missing {}", entry.description);
            for path in entry.paths {
                assert!(doc.contains(&format!("`{path}")), "missing {path}");
            }
        }
    }

    #[test]
    fn implicit_variables_are_grouped() {
        let doc = script_reference();
        assert!(doc.contains("| `time`, `time.time` | Seconds since the simulation started |"));
        assert!(doc.contains("| `PI`, `Math.PI` |"));
        assert_eq!(doc.matches("Seconds since the previous frame").count(), 1);
    }

    #[test]
    fn operands_follow_shape() {
        let doc = script_reference();
        assert!(doc.contains("| `entity.transform.translate(x, y, z)` |  | Add (dx, dy, dz) to position |"));
        assert!(doc.contains("| `entity.position.x = expr` | `entity.transform.position` |"));
    }
}
