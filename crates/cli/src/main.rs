//! Command-line access to archived captures.
//!
//! # Commands
//!
//! - `list <URL>` - List captures of a URL
//! - `lookup <URL>` - Raw index lines, optionally by prefix, host or domain
//! - `resolve <TIMESTAMP> <URL>` - Playback URL of a capture
//! - `fetch <URL>` - Fetch the capture closest to a timestamp
//! - `warc <URL>` - Export the raw record of a capture
//! - `pwid generate <TIMESTAMP> <URL>` / `pwid parse <PWID>` / `pwid fetch <PWID>`
//! - `cache purge` - Purge the render cache
//!
//! Configuration is read from `MEMENTO_*` environment variables and the TOML
//! file named by `MEMENTO_CONFIG_FILE`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use memento_client::{
    ArchiveService, ImageForm, LookupQuery, LookupSort, MatchType, Payload, RenderOptions, RetrievalRequest, Source,
};
use memento_core::{AppConfig, CacheDb, PurgePlan, Pwid};
use tracing_subscriber::EnvFilter;

/// Temporal access to a web archive.
#[derive(Parser)]
#[command(name = "memento")]
#[command(about = "Resolve and retrieve archived web captures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List captures of a URL, oldest first.
    List {
        url: String,

        /// List a rendered form (e.g. screenshot) instead of the page.
        #[arg(long)]
        render_type: Option<String>,
    },

    /// Raw index lines for a URL.
    Lookup {
        url: String,

        /// exact, prefix, host or domain.
        #[arg(long, default_value = "exact", value_parser = parse_arg::<MatchType>)]
        match_type: MatchType,

        /// default, reverse or closest.
        #[arg(long, default_value = "default", value_parser = parse_arg::<LookupSort>)]
        sort: LookupSort,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the playback URL of a URL at a timestamp.
    Resolve { timestamp: String, url: String },

    /// Fetch the capture closest to a timestamp.
    Fetch {
        url: String,

        /// Target time, YYYYMMDDHHMMSS or ISO-8601 with Z. Defaults to now.
        #[arg(short, long)]
        timestamp: Option<String>,

        #[command(flatten)]
        render: RenderArgs,

        /// Write the payload here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the raw WARC/ARC record of a capture.
    Warc {
        url: String,

        #[arg(short, long)]
        timestamp: Option<String>,

        /// Directory to write the record into.
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },

    /// Persistent web identifiers.
    Pwid {
        #[command(subcommand)]
        action: PwidCommands,
    },

    /// Render cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(Subcommand)]
enum PwidCommands {
    /// Build a PWID for a capture.
    Generate {
        /// 14-digit capture timestamp.
        timestamp: String,
        url: String,
    },

    /// Decode a PWID token or URN.
    Parse { pwid: String },

    /// Fetch the rendered form a PWID names.
    Fetch {
        pwid: String,

        #[command(flatten)]
        render: RenderArgs,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Delete cache entries.
    Purge {
        /// Delete entries whose TTL has passed.
        #[arg(long)]
        expired: bool,

        /// Keep only the newest N entries.
        #[arg(long)]
        max_entries: Option<usize>,

        /// Delete everything.
        #[arg(long)]
        all: bool,
    },
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Rendered form to fetch (e.g. screenshot).
    #[arg(long)]
    render_type: Option<String>,

    /// original or archive.
    #[arg(long, value_parser = parse_arg::<Source>)]
    source: Option<Source>,

    /// as_captured, full or thumbnail.
    #[arg(long, value_parser = parse_arg::<ImageForm>)]
    form: Option<ImageForm>,

    /// Keep only the top 640 rows of normalised images.
    #[arg(long)]
    crop: bool,
}

impl RenderArgs {
    fn shapes_output(&self) -> bool {
        self.source.is_some() || self.form.is_some() || self.crop
    }

    fn options(self, defaults: RenderOptions) -> RenderOptions {
        RenderOptions {
            render_type: self.render_type.unwrap_or(defaults.render_type),
            source: self.source.unwrap_or(defaults.source),
            form: self.form.unwrap_or(defaults.form),
            crop: self.crop,
        }
    }
}

fn parse_arg<T: FromStr<Err = memento_core::Error>>(s: &str) -> Result<T, String> {
    s.parse().map_err(|e: memento_core::Error| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command {
        Commands::List { url, render_type } => {
            let captures = service(&config).await?.list_captures(&url, render_type.as_deref()).await?;
            for (timestamp, locator) in &captures {
                let length = locator.length.map(|l| l.to_string()).unwrap_or_else(|| "-".into());
                println!("{timestamp}\t{}\t{}\t{length}", locator.file, locator.offset);
            }
            tracing::info!(count = captures.len(), "listed captures");
        }
        Commands::Lookup { url, match_type, sort, limit } => {
            let query = LookupQuery { match_type, sort, limit, ..LookupQuery::exact(url) };
            for line in service(&config).await?.lookup(&query).await? {
                println!("{}", serde_json::to_string(&line)?);
            }
        }
        Commands::Resolve { timestamp, url } => {
            println!("{}", service(&config).await?.resolve(&timestamp, &url)?);
        }
        Commands::Fetch { url, timestamp, render, output } => {
            if render.render_type.is_none() && render.shapes_output() {
                bail!("--source, --form and --crop need --render-type");
            }
            let options = render
                .render_type
                .is_some()
                .then(|| render.options(RenderOptions::new("")));
            let request = RetrievalRequest { url, timestamp, render: options };
            let retrieval = service(&config).await?.retrieve(&request).await?;
            if let Some(ts) = retrieval.timestamp {
                eprintln!("capture {ts} ({})", retrieval.payload.content_type);
            }
            emit(&retrieval.payload, output.as_deref())?;
        }
        Commands::Warc { url, timestamp, dir } => {
            let export = service(&config).await?.export_record(&url, timestamp.as_deref()).await?;
            let path = dir.join(&export.filename);
            std::fs::write(&path, &export.payload.bytes).with_context(|| format!("writing {}", path.display()))?;
            println!("{}", path.display());
        }
        Commands::Pwid { action } => match action {
            PwidCommands::Generate { timestamp, url } => {
                let layout = config.pwid_layout();
                let pwid = Pwid::new(&timestamp, &url)
                    .map_err(memento_core::Error::from)?
                    .with_archive_id(&config.archive_id);
                println!("{}", pwid.to_urn(layout));
                println!("{}", pwid.encode(layout));
            }
            PwidCommands::Parse { pwid } => {
                let parsed = memento_core::pwid::parse(&pwid)?;
                println!("{}", serde_json::to_string_pretty(&parsed)?);
            }
            PwidCommands::Fetch { pwid, render, output } => {
                let options = render.options(RenderOptions::pwid_default());
                let retrieval = service(&config).await?.retrieve_pwid(&pwid, &options).await?;
                emit(&retrieval.payload, output.as_deref())?;
            }
        },
        Commands::Cache { action: CacheCommands::Purge { expired, max_entries, all } } => {
            let cache = CacheDb::open(&config.db_path).await?;
            let report = cache.purge(PurgePlan { expired, max_entries, all }).await?;
            println!("deleted {}, remaining {}", report.deleted, report.remaining);
        }
    }

    Ok(())
}

async fn service(config: &AppConfig) -> Result<ArchiveService> {
    let cache = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache {}", config.db_path.display()))?;
    Ok(ArchiveService::from_config(config, cache)?)
}

fn emit(payload: &Payload, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, &payload.bytes).with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {} bytes to {}", payload.bytes.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&payload.bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch_with_render_options() {
        let cli = Cli::try_parse_from([
            "memento",
            "fetch",
            "http://example.org/",
            "--render-type",
            "screenshot",
            "--source",
            "archive",
            "--form",
            "thumbnail",
        ])
        .unwrap();

        let Commands::Fetch { render, .. } = cli.command else {
            panic!("expected fetch");
        };
        let options = render.options(RenderOptions::new(""));
        assert_eq!(options.render_type, "screenshot");
        assert_eq!(options.source, Source::Archive);
        assert_eq!(options.form, ImageForm::Thumbnail);
    }

    #[test]
    fn test_pwid_fetch_defaults() {
        let cli = Cli::try_parse_from(["memento", "pwid", "fetch", "dXJuOnB3aWQ6"]).unwrap();
        let Commands::Pwid { action: PwidCommands::Fetch { render, .. } } = cli.command else {
            panic!("expected pwid fetch");
        };
        assert_eq!(render.options(RenderOptions::pwid_default()), RenderOptions::pwid_default());
    }

    #[test]
    fn test_parse_lookup_options() {
        let cli = Cli::try_parse_from(["memento", "lookup", "http://example.org/", "--match-type", "domain", "--limit", "10"])
            .unwrap();
        let Commands::Lookup { match_type, sort, limit, .. } = cli.command else {
            panic!("expected lookup");
        };
        assert_eq!(match_type, MatchType::Domain);
        assert_eq!(sort, LookupSort::Default);
        assert_eq!(limit, Some(10));
    }

    #[test]
    fn test_render_flags_detected_without_render_type() {
        let cli = Cli::try_parse_from(["memento", "fetch", "http://example.org/", "--form", "thumbnail"]).unwrap();
        let Commands::Fetch { render, .. } = cli.command else {
            panic!("expected fetch");
        };
        assert!(render.render_type.is_none());
        assert!(render.shapes_output());

        let plain = Cli::try_parse_from(["memento", "fetch", "http://example.org/"]).unwrap();
        let Commands::Fetch { render, .. } = plain.command else {
            panic!("expected fetch");
        };
        assert!(!render.shapes_output());
    }

    #[test]
    fn test_bad_form_rejected() {
        assert!(Cli::try_parse_from(["memento", "fetch", "http://example.org/", "--form", "sideways"]).is_err());
    }
}
