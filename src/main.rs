mod args;

use std::{fs, process::ExitCode};

use clap::Parser;
use color_eyre::Result;
use graph_expr::{
    scene::{AssemblerOptions, SceneAssembler},
    try_evaluate, VisualizationConfig,
};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use self::args::Args;

fn main() -> Result<ExitCode> {
    install_tracing();
    color_eyre::install()?;

    match Args::parse() {
        Args::Render {
            config_path,
            value,
            resolution,
            pretty,
        } => {
            let raw_data = fs::read_to_string(config_path)?;
            let config = VisualizationConfig::from_json(&raw_data)?;
            let scene = SceneAssembler::with_options(&config, AssemblerOptions { resolution })
                .assemble(value);

            let output = if pretty {
                serde_json::to_string_pretty(&scene)?
            } else {
                serde_json::to_string(&scene)?
            };
            println!("{output}");
        }
        Args::Eval { expression, vars } => {
            let bindings = vars
                .iter()
                .map(|(name, value)| (name.as_str(), *value))
                .collect::<Vec<_>>();
            println!("{}", try_evaluate(&expression, &bindings)?);
        }
        Args::Validate { config_path } => {
            let raw_data = fs::read_to_string(config_path)?;
            let config = VisualizationConfig::from_json(&raw_data)?;
            let issues = config.issues();
            if !issues.is_empty() {
                for issue in &issues {
                    println!("{issue}");
                }
                return Ok(ExitCode::FAILURE);
            }
            println!("ok: {} element(s)", config.elements.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn install_tracing() {
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter_layer);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}
