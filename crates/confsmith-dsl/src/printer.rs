use std::fmt::Write;

use confsmith_core::schema::{Module, SchemaNodeId, SchemaNodeKind, SchemaSpec, YangType};

/// Prints every module of a spec as yang-lite source.
///
/// Round-trip fidelity: `parse(print(spec))` produces an equivalent spec.
pub fn print(spec: &SchemaSpec) -> String {
    spec.modules()
        .iter()
        .map(|m| print_module(spec, m))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prints a single module as yang-lite source.
pub fn print_module(spec: &SchemaSpec, module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "module {} {{", module.name);
    let _ = writeln!(out, "    namespace \"{}\";", module.namespace);
    let _ = writeln!(out, "    prefix {};", module.prefix);
    if let Some(rev) = &module.revision {
        let _ = writeln!(out, "    revision \"{rev}\";");
    }
    for feature in &module.features {
        let _ = writeln!(out, "    feature {feature};");
    }
    for top in &module.top {
        print_node(spec, *top, 1, &mut out);
    }
    for stmt in &module.unknown {
        match &stmt.argument {
            Some(arg) => {
                let _ = writeln!(out, "    {}:{} \"{arg}\";", stmt.prefix, stmt.keyword);
            }
            None => {
                let _ = writeln!(out, "    {}:{};", stmt.prefix, stmt.keyword);
            }
        }
    }
    out.push_str("}\n");
    out
}

fn print_node(spec: &SchemaSpec, id: SchemaNodeId, depth: usize, out: &mut String) {
    let pad = "    ".repeat(depth);
    let node = spec.node(id);
    match &node.kind {
        SchemaNodeKind::Container { presence } => {
            let _ = writeln!(out, "{pad}container {} {{", node.name);
            if *presence {
                let _ = writeln!(out, "{pad}    presence;");
            }
            for child in &node.children {
                print_node(spec, *child, depth + 1, out);
            }
            let _ = writeln!(out, "{pad}}}");
        }
        SchemaNodeKind::List { keys } => {
            let _ = writeln!(out, "{pad}list {} {{", node.name);
            if !keys.is_empty() {
                let _ = writeln!(out, "{pad}    key {};", keys.join(" "));
            }
            for child in &node.children {
                print_node(spec, *child, depth + 1, out);
            }
            let _ = writeln!(out, "{pad}}}");
        }
        SchemaNodeKind::Leaf {
            yang_type,
            mandatory,
            default,
        } => {
            let _ = writeln!(out, "{pad}leaf {} {{", node.name);
            print_type(yang_type, &format!("{pad}    "), out);
            if *mandatory {
                let _ = writeln!(out, "{pad}    mandatory true;");
            }
            if let Some(value) = default {
                let _ = writeln!(out, "{pad}    default {};", print_default(value));
            }
            let _ = writeln!(out, "{pad}}}");
        }
        SchemaNodeKind::LeafList { yang_type } => {
            let _ = writeln!(out, "{pad}leaf-list {} {{", node.name);
            print_type(yang_type, &format!("{pad}    "), out);
            let _ = writeln!(out, "{pad}}}");
        }
        SchemaNodeKind::Choice => {
            let _ = writeln!(out, "{pad}choice {} {{", node.name);
            for child in &node.children {
                print_node(spec, *child, depth + 1, out);
            }
            let _ = writeln!(out, "{pad}}}");
        }
        SchemaNodeKind::Case => {
            let _ = writeln!(out, "{pad}case {} {{", node.name);
            for child in &node.children {
                print_node(spec, *child, depth + 1, out);
            }
            let _ = writeln!(out, "{pad}}}");
        }
        _ => {}
    }
}

fn print_type(yang_type: &YangType, pad: &str, out: &mut String) {
    let rendered = yang_type.to_string();
    if rendered.contains('{') {
        let _ = writeln!(out, "{pad}type {rendered}");
    } else {
        let _ = writeln!(out, "{pad}type {rendered};");
    }
}

/// Integers and booleans print bare; everything else is quoted so the
/// parser reads it back as a string literal.
fn print_default(value: &str) -> String {
    if value == "true" || value == "false" || value.parse::<i128>().is_ok() {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
