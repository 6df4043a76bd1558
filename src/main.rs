use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use toxmap::portal::PortalTransport;
use toxmap::publish::{PublishOutcome, PublishWorkflow};
use toxmap::{console, Config, GeoWorkspace, HttpTransport, SystemClock};

#[derive(Parser, Debug)]
#[command(name = "toxmap")]
#[command(author, version, about = "Poison-control call ETL and hosted map publisher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full batch pipeline: import, clean, geocode, merge, publish
    Run {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "toxmap.toml")]
        config: PathBuf,

        /// Process the data locally but do not touch the remote host
        #[arg(long)]
        skip_publish: bool,
    },

    /// Run only the feature-service publish workflow
    Publish {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "toxmap.toml")]
        config: PathBuf,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            skip_publish,
        } => run_pipeline(&config, skip_publish),
        Command::Publish { config } => run_publish(&config),
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "toxmap", &mut std::io::stdout());
        }
    }
}

fn load_config(path: &Path) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(message) => {
            console::error_banner(&[
                message,
                format!(
                    "Make sure a valid '{}' file exists before running.",
                    path.display()
                ),
            ]);
            std::process::exit(1);
        }
    }
}

fn build_transport(config: &Config) -> HttpTransport {
    match HttpTransport::new(&format!("{}/", config.portal.host)) {
        Ok(transport) => transport,
        Err(e) => {
            console::error_banner(&[e.to_string()]);
            std::process::exit(1);
        }
    }
}

fn run_pipeline(config_path: &Path, skip_publish: bool) {
    println!("****** Start time: {} ******", Local::now().format("%c"));
    let config = load_config(config_path);

    let store = match GeoWorkspace::open(&config.workspace.dir) {
        Ok(store) => store,
        Err(e) => {
            console::error_banner(&[e.to_string()]);
            std::process::exit(1);
        }
    };

    let transport = if skip_publish {
        None
    } else {
        Some(build_transport(&config))
    };
    let transport_ref = transport.as_ref().map(|t| t as &dyn PortalTransport);

    match toxmap::run(&config, &store, &SystemClock, transport_ref) {
        Ok(summary) => {
            println!();
            println!("{}", "Summary:".bold());
            println!("  Imported:    {} record(s)", summary.imported_rows);
            println!("  In scope:    {} record(s)", summary.cleaned_rows);
            println!(
                "  Master:      {} ({} row(s))",
                summary.month_table, summary.master_rows
            );
            println!(
                "  Views:       {} today, {} this hour",
                summary.daily_rows, summary.hourly_rows
            );
            if !summary.deleted_tables.is_empty() {
                println!("  Retention:   deleted {}", summary.deleted_tables.join(", "));
            }
            match summary.publish {
                Some(PublishOutcome::Published {
                    ref service_item_id,
                    attempts,
                }) => println!(
                    "  Published:   {} (attempt {})",
                    service_item_id, attempts
                ),
                Some(PublishOutcome::Abandoned { .. }) => {
                    println!("  Published:   {}", "failed (reported above)".yellow())
                }
                None => println!("  Published:   skipped"),
            }
            println!("\nfinished.");
        }
        Err(e) => {
            console::error_banner(&e.banner_lines());
            std::process::exit(e.exit_code());
        }
    }
}

fn run_publish(config_path: &Path) {
    println!("Starting Feature Service publish process");
    let config = load_config(config_path);
    let transport = build_transport(&config);

    match PublishWorkflow::new(&config, &transport).run() {
        PublishOutcome::Published {
            service_item_id,
            attempts,
        } => {
            println!(
                "\nfinished. Published {} (attempt {}).",
                service_item_id, attempts
            );
        }
        PublishOutcome::Abandoned { attempts, failure } => {
            console::error_banner(&[format!("{} (after {} attempt(s))", failure, attempts)]);
            std::process::exit(1);
        }
    }
}
