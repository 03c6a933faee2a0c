use std::path::PathBuf;

use clap::Parser;
use hal_bridge::{
    BridgeRegistry, ContextProperties, GraphError, GraphValidator, graph_to_dot,
    load_subgraph_from_path,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Lower framework subgraphs to HAL operand graphs", long_about = None)]
struct Cli {
    /// Path to a JSON file holding the subgraph operators and their tensors.
    subgraph: PathBuf,
    /// Optional override for the tensor byte length limit.
    #[arg(long)]
    tensor_limit: Option<usize>,
    /// Optional path to write a Graphviz DOT export of the lowered graph.
    #[arg(long)]
    export_dot: Option<PathBuf>,
    /// Optional path to write the lowered graph as JSON.
    #[arg(long)]
    dump_json: Option<PathBuf>,
}

fn run() -> Result<(), GraphError> {
    let cli = Cli::parse();
    let subgraph = load_subgraph_from_path(&cli.subgraph)?;
    let lowered = BridgeRegistry::with_defaults().lower(&subgraph)?;
    let graph = &lowered.graph;

    let mut context = ContextProperties::default();
    if let Some(limit) = cli.tensor_limit {
        context.tensor_byte_length_limit = limit;
    }
    let artifacts = GraphValidator::new(graph, context).validate()?;

    println!(
        "Lowered {} operators from `{}` into {} operands and {} operations.",
        subgraph.ops.len(),
        cli.subgraph.display(),
        graph.operands().len(),
        graph.operations().len()
    );
    if lowered.rebuild_on_shape_change {
        println!("The graph must be rebuilt when input shapes change.");
    }
    println!("Inputs:");
    for name in &artifacts.input_names {
        println!("  - {}", name);
    }
    println!("Outputs:");
    for name in &artifacts.output_names {
        println!("  - {}", name);
    }
    println!("Dependency fan-out:");
    let mut fan_out: Vec<_> = artifacts.operand_to_dependent_operations.iter().collect();
    fan_out.sort_unstable_by_key(|(operand, _)| **operand);
    for (operand, deps) in fan_out {
        println!("  - operand {} -> {}", operand, deps.join(", "));
    }

    if let Some(dot_path) = cli.export_dot {
        let dot = graph_to_dot(graph);
        std::fs::write(&dot_path, dot).map_err(|err| GraphError::export(dot_path.clone(), err))?;
        println!("Exported Graphviz DOT to `{}`.", dot_path.display());
    }

    if let Some(json_path) = cli.dump_json {
        let json = serde_json::to_string_pretty(graph)
            .map_err(|err| GraphError::export(json_path.clone(), err.into()))?;
        std::fs::write(&json_path, json)
            .map_err(|err| GraphError::export(json_path.clone(), err))?;
        println!("Wrote lowered graph JSON to `{}`.", json_path.display());
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
