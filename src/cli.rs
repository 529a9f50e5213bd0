use crate::config::{Config, load_config};
use crate::ir::{Direction, Flow};
use crate::layout::{LayeredSolver, LayoutEngine, LayoutSolver, SizeMap, build_layout_request, flatten};
use crate::layout_dump::{LayoutDump, write_layout_dump};
use crate::measure::Measurer;
use crate::parser::{InputFormat, parse_input};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sclayout", version, about = "Hierarchical statechart layout")]
pub struct Args {
    /// Input file (flow JSON/JSON5 or XState machine) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Input format
    #[arg(short = 'f', long = "format", value_enum, default_value = "json")]
    pub format: InputFormat,

    /// Layout direction, overriding the config file
    #[arg(short = 'd', long = "direction", value_enum)]
    pub direction: Option<Direction>,

    /// Config JSON/JSON5 file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// What to write: the solver request, the solved tree, or flat positions
    #[arg(short = 'e', long = "emit", value_enum, default_value = "positions")]
    pub emit: Emit,

    /// Placement engine used inside each container
    #[arg(long = "engine", value_enum, default_value = "dagre")]
    pub engine: LayoutEngine,

    /// JSON map of position id to size, overriding measured sizes
    #[arg(short = 's', long = "sizes")]
    pub sizes: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    Graph,
    Solved,
    Positions,
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(direction) = args.direction {
        config.layout.direction = direction;
    }

    let input = read_input(args.input.as_deref())?;
    let flow = parse_input(&input, args.format)?;
    let mut sizes = Measurer::new(config.measure.clone()).size_map(&flow);
    if let Some(path) = args.sizes.as_deref() {
        sizes.extend(read_sizes(path)?);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(emit(&args, &config, &flow, &sizes))
}

async fn emit(args: &Args, config: &Config, flow: &Flow, sizes: &SizeMap) -> Result<()> {
    let request = build_layout_request(flow, sizes, &config.layout);
    if args.emit == Emit::Graph {
        return write_json(args.output.as_deref(), &request);
    }

    let solver = LayeredSolver::new(config.layout.clone()).with_engine(args.engine);
    let solved = solver.layout(request).await?;
    tracing::debug!(nodes = solved.node_count(), edges = solved.edge_count(), "layout solved");
    match args.emit {
        Emit::Solved => write_json(args.output.as_deref(), &solved),
        _ => {
            let positions = flatten(sizes, &solved);
            match args.output.as_deref() {
                Some(path) => write_layout_dump(path, &flow.id, config.layout.direction, &positions),
                None => write_json(
                    None,
                    &LayoutDump::from_positions(&flow.id, config.layout.direction, &positions),
                ),
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn read_sizes(path: &Path) -> Result<SizeMap> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let sizes: HashMap<_, _> = serde_json::from_str(&content)
        .or_else(|_| json5::from_str(&content))
        .with_context(|| format!("invalid size map in {}", path.display()))?;
    Ok(sizes)
}

fn write_json<T: serde::Serialize>(output: Option<&Path>, value: &T) -> Result<()> {
    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            writeln!(handle)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_emit_and_direction_flags() {
        let args = Args::try_parse_from([
            "sclayout", "-i", "flow.json", "-d", "horizontal", "--emit", "graph", "--format", "xstate",
        ])
        .unwrap();
        assert_eq!(args.direction, Some(Direction::Horizontal));
        assert_eq!(args.emit, Emit::Graph);
        assert_eq!(args.format, InputFormat::Xstate);
        assert_eq!(args.engine, LayoutEngine::Dagre);
    }

    #[test]
    fn size_overrides_accept_json5() {
        let dir = std::env::temp_dir().join(format!("sclayout-sizes-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("sizes.json5");
        std::fs::write(&path, "{ 'state:a': { width: 10, height: 20, }, }").unwrap();
        let sizes = read_sizes(&path).unwrap();
        let size = sizes[&crate::layout::PositionedItemId::from_raw("state:a")];
        assert_eq!((size.width, size.height), (10.0, 20.0));
        std::fs::remove_dir_all(&dir).ok();
    }
}
