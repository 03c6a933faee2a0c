use std::fmt::Write;

use crate::graph::{Dim, OperandGraph, OperandKind, Quantization};

pub fn graph_to_dot(graph: &OperandGraph) -> String {
    let mut dot = String::from("digraph hal {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [fontname=\"Helvetica\"];\n");
    dot.push_str("  edge [fontname=\"Helvetica\"];\n\n");

    for (idx, operand) in graph.operands().iter().enumerate() {
        let node_id = format!("operand_{}", idx);
        let (kind, shape, fill) = match operand.kind {
            OperandKind::Variable if operand.name.is_some() => ("Variable", "oval", "#d0e6ff"),
            OperandKind::Variable => ("Intermediate", "ellipse", "#fff4d6"),
            OperandKind::Constant => ("Constant", "diamond", "#f0f0f0"),
        };
        let mut label_lines = vec![format!("{} operand {}", kind, idx)];
        if let Some(name) = &operand.name
            && !name.is_empty()
        {
            label_lines.push(format!("name: {}", name));
        }
        label_lines.push(format!("{:?}", operand.operand_type.code()));
        label_lines.push(format_shape(&operand.operand_type.dimensions));
        match &operand.operand_type.quantization {
            Quantization::None => {}
            Quantization::PerLayer { scale } => label_lines.push(format!("scale {}", scale)),
            Quantization::PerChannel {
                scales,
                channel_dim,
            } => label_lines.push(format!("{} scales on axis {}", scales.len(), channel_dim)),
        }
        let label = escape_label(&label_lines.join("\n"));
        let _ = writeln!(
            dot,
            "  {} [shape={},style=filled,fillcolor=\"{}\",label=\"{}\"];",
            node_id, shape, fill, label
        );
    }

    dot.push('\n');

    for (idx, operation) in graph.operations().iter().enumerate() {
        let node_id = format!("op_{}", idx);
        let label = escape_label(&format!("{} (#{})", operation.display_name(), idx));
        let _ = writeln!(
            dot,
            "  {} [shape=box,style=rounded,label=\"{}\"];",
            node_id, label
        );

        for (input_idx, operand_id) in operation.inputs.iter().enumerate() {
            let _ = writeln!(
                dot,
                "  operand_{} -> {} [label=\"in{}\"];",
                operand_id, node_id, input_idx
            );
        }
        for operand_id in &operation.outputs {
            let _ = writeln!(
                dot,
                "  {} -> operand_{} [label=\"out\"];",
                node_id, operand_id
            );
        }
    }

    dot.push_str("}\n");
    dot
}

fn escape_label(label: &str) -> String {
    label
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_shape(shape: &[Dim]) -> String {
    if shape.is_empty() {
        "scalar".to_string()
    } else {
        shape
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("x")
    }
}
