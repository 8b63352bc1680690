use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use renderer::{RenderCycle, RendererConfig};
use resources::{DataUriFetcher, FileFetcher, LoadBudget, LoadState, ResourceFetcher};
use serde::Serialize;
use serde_json::{Map, Value};
use symbology::{Geometry, ResourceDescriptor, ResourceId, Symbol};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "List and load the external resources of a map symbol")]
struct Args {
    /// Symbol JSON file
    symbol: PathBuf,

    /// Geometry kind the symbol is attached to
    #[arg(long, value_enum, default_value_t = Kind::Marker)]
    geometry: Kind,

    /// Renderer config JSON (default: SYMRES_* environment variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL relative resource paths resolve against
    #[arg(long)]
    base_url: Option<String>,

    /// Camera zoom for zoom-driven expressions
    #[arg(long)]
    zoom: Option<f64>,

    /// Feature properties as a JSON object
    #[arg(long)]
    properties: Option<String>,

    /// Also load every resource (data: and file:// only)
    #[arg(long)]
    load: bool,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
enum Kind {
    Marker,
    Line,
    Polygon,
}

#[derive(Serialize)]
struct Report {
    resources: Vec<ResourceDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    loads: Vec<LoadReport>,
}

#[derive(Serialize)]
struct LoadReport {
    id: ResourceId,
    state: LoadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    natural_size: Option<(u32, u32)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main(Args::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => RendererConfig::from_path(path)?,
        None => RendererConfig::from_env(),
    };
    if args.base_url.is_some() {
        config.base_url = args.base_url.clone();
    }

    let text = std::fs::read_to_string(&args.symbol)
        .map_err(|e| format!("failed to read {}: {e}", args.symbol.display()))?;
    let symbol = Symbol::from_json(serde_json::from_str(&text)?)?;
    let properties = match &args.properties {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err("--properties must be a JSON object".into()),
        },
        None => Map::new(),
    };

    let geometry = match args.geometry {
        Kind::Marker => Geometry::marker(),
        Kind::Line => Geometry::line_string(),
        Kind::Polygon => Geometry::polygon(),
    }
    .with_symbol(symbol)
    .with_properties(properties);

    let mut cycle = RenderCycle::new(config)?;
    if let Some(zoom) = args.zoom {
        cycle.set_zoom(zoom);
    }
    let id = cycle.add_geometry(geometry);
    let plan = cycle.prepare_frame()?;
    let resources = cycle.descriptors(id).unwrap_or_default().to_vec();
    info!(resources = resources.len(), waiting = plan.waiting.len(), "symbol collected");

    let mut loads = Vec::new();
    if args.load {
        let mut fetcher = DataUriFetcher::new(FileFetcher);
        load_all(&mut cycle, &mut fetcher);
        for descriptor in &resources {
            let cache = cycle.cache();
            let Some(state) = cache.state(&descriptor.id) else {
                continue;
            };
            if loads.iter().any(|l: &LoadReport| l.id == descriptor.id) {
                continue;
            }
            loads.push(LoadReport {
                id: descriptor.id.clone(),
                state,
                natural_size: cache.asset(&descriptor.id).and_then(|a| a.natural_size),
                error: cache.error(&descriptor.id).map(ToString::to_string),
            });
        }
    }

    let report = Report { resources, loads };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Drains the load queue. Pumps within the configured per-frame budget and
/// falls back to one unbounded pass when a pump makes no progress.
fn load_all<F: ResourceFetcher + ?Sized>(cycle: &mut RenderCycle, fetcher: &mut F) -> usize {
    let mut settled = 0;
    while cycle.cache().queued() > 0 {
        let n = cycle.pump(fetcher);
        if n == 0 {
            settled += cycle
                .cache_mut()
                .pump(fetcher, &mut LoadBudget::unlimited());
            cycle.poll_notifications();
            break;
        }
        settled += n;
    }
    settled
}
