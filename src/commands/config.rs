use clap::{Args, Subcommand};

use crate::config::{ConfigReport, config_path, validate_config};

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand, Clone)]
enum ConfigAction {
    /// Parse the config file and validate its profiles
    Check {
        /// Only validate this profile
        #[arg(long)]
        profile: Option<String>,
    },
    /// Print the config file location
    Path,
}

pub fn run(args: ConfigArgs) -> Result<(), String> {
    match args.action {
        ConfigAction::Check { profile } => {
            print!("{}", check_summary(&validate_config(profile.as_deref())?));
        }
        ConfigAction::Path => {
            let path = config_path()?;
            let state = if path.is_file() { "" } else { " (not created yet)" };
            println!("{}{state}", path.display());
        }
    }
    Ok(())
}

/// One header line, then one line per validated profile.
fn check_summary(report: &ConfigReport) -> String {
    let mut summary = match report.profiles.len() {
        1 => format!("config OK: {} (1 profile)\n", report.path.display()),
        count => format!("config OK: {} ({count} profiles)\n", report.path.display()),
    };
    for name in &report.profiles {
        summary.push_str(&format!("  {name}\n"));
    }
    summary
}
