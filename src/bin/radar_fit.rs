use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use pitch_radar::config::FitConfig;
use pitch_radar::export::{export_summaries_xlsx, load_artifact, save_artifact};
use pitch_radar::model_book::{ModelBook, ModelRequest};
use pitch_radar::table::PlayerTable;

const USAGE: &str = "usage: radar_fit --table <players.parquet|players.json> --plan <plan.json> \
[--season <caption>] [--player <name>] [--radar-json <path>] [--out <artifact.json>] [--xlsx <path>] \
[--iterations N] [--draws N] [--seed N] [--sequential] [--verbose]
       radar_fit --load <artifact.json> --player <name> [--radar-json <path>]";

#[derive(Debug, Deserialize)]
struct Plan {
    #[serde(default)]
    league_season: Option<String>,
    #[serde(default)]
    subtitle: Option<String>,
    models: Vec<ModelRequest>,
}

fn main() -> Result<()> {
    setup_logging(has_flag("--verbose"));
    if has_flag("--help") || has_flag("-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = FitConfig::from_env();
    if let Some(v) = parse_usize_arg("--iterations") {
        config.iterations = v.max(1);
    }
    if let Some(v) = parse_usize_arg("--draws") {
        config.draws = v.max(1);
    }
    if let Some(v) = parse_u64_arg("--seed") {
        config.seed = v;
    }

    let book = match parse_path_arg("--load") {
        Some(path) => load_artifact(&path).with_context(|| format!("load {}", path.display()))?,
        None => fit_book(&config)?,
    };

    if let Some(out) = parse_path_arg("--out") {
        save_artifact(&out, &book).with_context(|| format!("save {}", out.display()))?;
        println!("artifact written: {}", out.display());
    }
    if let Some(xlsx) = parse_path_arg("--xlsx") {
        let report = export_summaries_xlsx(&xlsx, &book, &config)?;
        println!(
            "workbook written: {} ({} sheets, {} rows)",
            xlsx.display(),
            report.sheets,
            report.rows
        );
    }
    if let Some(player) = parse_string_arg("--player") {
        print_radar(&book, &player, &config)?;
    }
    Ok(())
}

fn fit_book(config: &FitConfig) -> Result<ModelBook> {
    let Some(table_path) = parse_path_arg("--table") else {
        bail!("missing --table\n{USAGE}");
    };
    let Some(plan_path) = parse_path_arg("--plan") else {
        bail!("missing --plan\n{USAGE}");
    };

    let table = PlayerTable::load(&table_path)?;
    let plan = read_plan(&plan_path)?;
    info!(
        players = table.len(),
        models = plan.models.len(),
        iterations = config.iterations,
        draws = config.draws,
        "fitting plan"
    );

    let season = parse_string_arg("--season")
        .or(plan.league_season)
        .unwrap_or_default();
    let mut book = ModelBook::new(table, season);
    if let Some(subtitle) = plan.subtitle {
        book = book.with_subtitle(subtitle);
    }

    if has_flag("--sequential") {
        for request in &plan.models {
            book.add_model(request, config)
                .with_context(|| format!("fit model '{}'", request.label))?;
        }
    } else {
        book.add_models_parallel(&plan.models, config)
            .context("fit plan")?;
    }
    for (label, fit) in book.iter() {
        if let Some(trace) = fit.trace() {
            info!(
                label,
                kind = %fit.kind(),
                players = fit.observed_count(),
                elbo = trace.final_elbo,
                "fitted"
            );
        }
    }
    Ok(book)
}

fn read_plan(path: &Path) -> Result<Plan> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str::<Plan>(&raw).with_context(|| format!("parse plan {}", path.display()))
}

fn print_radar(book: &ModelBook, player: &str, config: &FitConfig) -> Result<()> {
    let chart = book.radar(player, config)?;
    println!("{}", chart.title);
    println!("{}", chart.subtitle);
    for wedge in &chart.wedges {
        println!("  {:<24} {}", wedge.label, wedge.annotation);
    }
    if let Some(path) = parse_path_arg("--radar-json") {
        let raw = serde_json::to_string_pretty(&chart).context("serialize radar")?;
        fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
        println!("radar written: {}", path.display());
    }
    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    parse_string_arg(name).map(PathBuf::from)
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    parse_string_arg(name).and_then(|raw| raw.parse::<usize>().ok())
}

fn parse_u64_arg(name: &str) -> Option<u64> {
    parse_string_arg(name).and_then(|raw| raw.parse::<u64>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
