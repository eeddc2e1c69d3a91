use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Evaluate lesson graph expressions and assemble scenes")]
pub enum Args {
    /// Assemble the scene for a configuration and print it as JSON.
    Render {
        config_path: PathBuf,
        /// Interactive control value, 0 to 100.
        #[arg(short, long, default_value_t = 50.0)]
        value: f64,
        /// Step count of the shared x grid.
        #[arg(short, long, default_value_t = graph_expr::sample::DEFAULT_RESOLUTION)]
        resolution: usize,
        #[arg(short, long)]
        pretty: bool,
    },
    /// Evaluate a single expression.
    Eval {
        expression: String,
        /// A variable binding, `name=value`. May be repeated.
        #[arg(long = "var", value_parser = parse_binding)]
        vars: Vec<(String, f64)>,
    },
    /// Check a configuration from an untrusted source.
    Validate { config_path: PathBuf },
}

fn parse_binding(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `name=value`, found `{raw}`"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for `{}`: {e}", name.trim()))?;
    Ok((name.trim().to_owned(), value))
}
