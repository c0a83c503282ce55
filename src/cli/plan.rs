//! CLI command for previewing the window plan

use crate::downloader::WindowPlanner;
use crate::format_timestamp;
use clap::Args;
use serde_json::json;

use super::download::RangeArgs;
use super::{CliError, OutputFormat};

/// Plan subcommand
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Time range to plan
    #[command(flatten)]
    pub range: RangeArgs,
}

impl PlanArgs {
    /// Print every window of the plan; no network call is made
    pub fn execute(&self, output_format: OutputFormat) -> Result<(), CliError> {
        let planner = self.range.planner()?;

        match output_format {
            OutputFormat::Json => println!("{}", render_json(&planner)),
            OutputFormat::Human => print!("{}", render_human(&planner)),
        }

        Ok(())
    }
}

fn render_json(planner: &WindowPlanner) -> serde_json::Value {
    let windows: Vec<_> = planner
        .windows()
        .map(|w| {
            json!({
                "start": format_timestamp(&w.start()),
                "end": format_timestamp(&w.end()),
            })
        })
        .collect();

    json!({
        "start": format_timestamp(&planner.start()),
        "end": format_timestamp(&planner.end()),
        "window_count": windows.len(),
        "windows": windows,
    })
}

fn render_human(planner: &WindowPlanner) -> String {
    let mut out = format!(
        "Planned {} windows from {} to {}:\n",
        planner.window_count(),
        format_timestamp(&planner.start()),
        format_timestamp(&planner.end())
    );
    for (i, window) in planner.windows().enumerate() {
        out.push_str(&format!("{:>5}  {window}\n", i + 1));
    }
    out
}
