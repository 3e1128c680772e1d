use narwhal::graphlib::{Graph, GraphOptions, alg};
use narwhal::{
    Bounds, EdgeData, Energy, Layout, LayoutOptions, ManualScheduler, NodeData, Vector2,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::sync::{Arc, RwLock};
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_TICKS: usize = 10_000;
const DEFAULT_SEED: u64 = 1;

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Json(serde_json::Error),
    Layout(narwhal::Error),
    InvalidGraph(Vec<String>),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::Layout(err) => write!(f, "{err}"),
            CliError::InvalidGraph(problems) => {
                write!(f, "invalid graph ({} problem(s))", problems.len())?;
                for p in problems {
                    write!(f, "\n  - {p}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<narwhal::Error> for CliError {
    fn from(value: narwhal::Error) -> Self {
        Self::Layout(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Layout,
    Check,
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    pretty: bool,
    options: Option<String>,
    max_ticks: Option<usize>,
    seed: Option<u64>,
    viewport_width: Option<f64>,
    viewport_height: Option<f64>,
}

fn usage() -> &'static str {
    "narwhal-cli\n\
\n\
USAGE:\n\
  narwhal-cli [layout] [--pretty] [--options <json-file>] [--max-ticks <n>] [--seed <n>] [--viewport-width <w>] [--viewport-height <h>] [<path>|-]\n\
  narwhal-cli check [--pretty] [<path>|-]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', input is read from stdin.\n\
  - Input is JSON: {\"nodes\": [{\"id\", \"x\"?, \"y\"?, \"mass\"?, \"fixed\"?, \"data\"?}], \"edges\": [{\"source\", \"target\", \"length\"?, \"directed\"?}]}.\n\
  - layout runs the simulation until it settles or --max-ticks (default 10000) is reached.\n\
  - Without --seed or a randomSeed in --options, seed 1 is used so output is reproducible.\n\
  - Set NARWHAL_LOG (e.g. NARWHAL_LOG=debug) to control diagnostics on stderr.\n\
"
}

fn next_value<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<&'a String, CliError> {
    it.next().ok_or(CliError::Usage(usage()))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "layout" => args.command = Command::Layout,
            "check" => args.command = Command::Check,
            "--pretty" => args.pretty = true,
            "--options" => args.options = Some(next_value(&mut it)?.clone()),
            "--max-ticks" => {
                let n = next_value(&mut it)?;
                args.max_ticks = Some(n.parse::<usize>().map_err(|_| CliError::Usage(usage()))?);
            }
            "--seed" => {
                let n = next_value(&mut it)?;
                args.seed = Some(n.parse::<u64>().map_err(|_| CliError::Usage(usage()))?);
            }
            "--viewport-width" => {
                let w = next_value(&mut it)?;
                args.viewport_width =
                    Some(w.parse::<f64>().map_err(|_| CliError::Usage(usage()))?);
            }
            "--viewport-height" => {
                let h = next_value(&mut it)?;
                args.viewport_height =
                    Some(h.parse::<f64>().map_err(|_| CliError::Usage(usage()))?);
            }
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(CliError::Usage(usage()));
            }
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    Ok(args)
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn write_json(value: &impl Serialize, pretty: bool) -> Result<(), CliError> {
    if pretty {
        serde_json::to_writer_pretty(std::io::stdout().lock(), value)?;
    } else {
        serde_json::to_writer(std::io::stdout().lock(), value)?;
    }
    println!();
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GraphInput {
    #[serde(default)]
    directed: Option<bool>,
    nodes: Vec<NodeInput>,
    #[serde(default)]
    edges: Vec<EdgeInput>,
}

#[derive(Debug, Deserialize)]
struct NodeInput {
    id: String,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    mass: Option<f64>,
    #[serde(default)]
    fixed: bool,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct EdgeInput {
    source: String,
    target: String,
    #[serde(default)]
    length: Option<f64>,
    #[serde(default)]
    directed: bool,
}

/// Everything wrong with the input, in input order. Empty means the graph can be laid out.
fn problems(input: &GraphInput) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = rustc_hash::FxHashSet::default();

    for n in &input.nodes {
        if n.id.is_empty() {
            out.push("node with an empty id".to_string());
        }
        if !seen.insert(n.id.as_str()) {
            out.push(format!("duplicate node id `{}`", n.id));
        }
        if n.x.is_some() != n.y.is_some() {
            out.push(format!("node `{}` has only one of x/y", n.id));
        }
        for (name, v) in [("x", n.x), ("y", n.y)] {
            if v.is_some_and(|v| !v.is_finite()) {
                out.push(format!("node `{}` has a non-finite {name}", n.id));
            }
        }
        if n.mass.is_some_and(|m| !(m.is_finite() && m > 0.0)) {
            out.push(format!("node `{}` must have a positive mass", n.id));
        }
    }

    for (i, e) in input.edges.iter().enumerate() {
        for end in [&e.source, &e.target] {
            if !seen.contains(end.as_str()) {
                out.push(format!("edge #{i} references unknown node `{end}`"));
            }
        }
        if e.source == e.target {
            out.push(format!("edge #{i} is a self loop on `{}`", e.source));
        }
        if e.length.is_some_and(|l| !(l.is_finite() && l >= 0.0)) {
            out.push(format!("edge #{i} has an invalid length"));
        }
    }
    out
}

fn build_graph(input: GraphInput) -> Graph<NodeData, EdgeData> {
    let mut g: Graph<NodeData, EdgeData> = Graph::new(GraphOptions {
        directed: input.directed.unwrap_or(true),
    });
    for n in input.nodes {
        g.set_node(
            n.id,
            NodeData {
                x: n.x,
                y: n.y,
                mass: n.mass,
                fixed: n.fixed,
                data: n.data,
            },
        );
    }
    for e in input.edges {
        g.set_edge_with_label(
            e.source,
            e.target,
            EdgeData {
                length: e.length,
                directed: e.directed,
            },
        );
    }
    g
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckOut {
    nodes: usize,
    edges: usize,
    components: usize,
    isolated: Vec<String>,
    problems: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeOut {
    id: String,
    x: f64,
    y: f64,
    screen_x: Option<f64>,
    screen_y: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    fixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EdgeOut {
    source: String,
    target: String,
    length: f64,
    directed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LayoutOut {
    ticks: usize,
    converged: bool,
    energy: Energy,
    bounds: Bounds,
    nodes: Vec<NodeOut>,
    edges: Vec<EdgeOut>,
}

fn load_options(args: &Args) -> Result<LayoutOptions, CliError> {
    let mut options = match args.options.as_deref() {
        Some(path) => serde_json::from_str::<LayoutOptions>(&std::fs::read_to_string(path)?)?,
        None => LayoutOptions::default(),
    };
    if let Some(seed) = args.seed {
        options.random_seed = Some(seed);
    }
    options.random_seed.get_or_insert(DEFAULT_SEED);
    if let Some(w) = args.viewport_width {
        options.viewport.width = w;
    }
    if let Some(h) = args.viewport_height {
        options.viewport.height = h;
    }
    options.validate()?;
    Ok(options)
}

fn run(args: Args) -> Result<(), CliError> {
    let text = read_input(args.input.as_deref())?;
    let input: GraphInput = serde_json::from_str(&text)?;
    let found = problems(&input);

    match args.command {
        Command::Check => {
            let graph = build_graph(input);
            let out = CheckOut {
                nodes: graph.node_count(),
                edges: graph.edge_count(),
                components: alg::components(&graph).len(),
                isolated: alg::isolated_nodes(&graph),
                problems: found.clone(),
            };
            write_json(&out, args.pretty)?;
            if found.is_empty() {
                Ok(())
            } else {
                Err(CliError::InvalidGraph(found))
            }
        }
        Command::Layout => {
            if !found.is_empty() {
                return Err(CliError::InvalidGraph(found));
            }
            let options = load_options(&args)?;
            let max_ticks = args.max_ticks.unwrap_or(DEFAULT_MAX_TICKS);

            let graph = Arc::new(RwLock::new(build_graph(input)));
            let layout = Layout::with_scheduler(options, Box::new(ManualScheduler::new()))?;
            layout.attach_source(graph);

            let summary = layout.run_to_convergence(max_ticks);
            tracing::info!(
                ticks = summary.ticks,
                converged = summary.converged,
                energy = summary.energy.mean,
                "layout finished"
            );

            let nodes = layout
                .nodes()
                .into_iter()
                .map(|n| NodeOut {
                    id: n.label,
                    x: n.position.x,
                    y: n.position.y,
                    screen_x: n.screen.map(|s: Vector2| s.x),
                    screen_y: n.screen.map(|s: Vector2| s.y),
                    fixed: n.pinned,
                    data: n.data,
                })
                .collect();
            let edges = layout
                .edges()
                .into_iter()
                .map(|e| EdgeOut {
                    source: e.source,
                    target: e.target,
                    length: e.rest_length,
                    directed: e.directed,
                })
                .collect();

            let out = LayoutOut {
                ticks: summary.ticks,
                converged: summary.converged,
                energy: summary.energy,
                bounds: layout.graph_bounds(),
                nodes,
                edges,
            };
            write_json(&out, args.pretty)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("NARWHAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    match run(args) {
        Ok(()) => {}
        Err(err @ CliError::InvalidGraph(_)) => {
            eprintln!("{err}");
            std::process::exit(3);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
