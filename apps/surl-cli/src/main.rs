//! surl — local command-line front end for the URL shortener.
//!
//! Runs the same creation and resolution flows as the HTTP functions against
//! a SQLite file, so the system can be exercised without cloud access.
//!
//! # Usage
//!
//! ```bash
//! surl create https://example.com/very/long/path
//! surl get 1
//! surl trend --minutes 60
//! surl encode 125      # -> 21
//! surl decode 21       # -> 125
//! ```
//!
//! # Environment Variables
//!
//! - `DB_PATH`: SQLite file (default `./local_links.db`), same as `--db`
//! - `RUST_LOG`: log filter, logs go to stderr (default `warn`)

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use domain::enrich::NoopEnricher;
use domain::service::LinkService;
use domain::{base62, trend, ShortCode, SystemClock, Visit};
use sqlite_adapter::SqliteRepo;
use tracing_subscriber::EnvFilter;

/// Shorten and resolve URLs against a local SQLite database.
#[derive(Parser)]
#[command(name = "surl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "./local_links.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a short code for a URL
    Create { url: String },

    /// Resolve a short code to its original URL
    Get {
        code: String,
        /// Record the lookup as a click
        #[arg(long)]
        visit: bool,
    },

    /// Show click counts per category
    Trend {
        #[arg(long)]
        minutes: Option<i64>,
    },

    /// Print the short code for an identifier
    Encode { id: u64 },

    /// Print the identifier behind a short code
    Decode { code: String },
}

fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

fn open(db: &std::path::Path) -> Result<LinkService<SqliteRepo, NoopEnricher, SystemClock>> {
    let repo =
        SqliteRepo::new(db).with_context(|| format!("open database {}", db.display()))?;
    Ok(LinkService::new(repo, NoopEnricher, SystemClock))
}

fn run(cli: Cli, out: &mut impl Write) -> Result<()> {
    match cli.command {
        Commands::Create { url } => {
            let record = open(&cli.db)?.create(&url).context("create failed")?;
            writeln!(out, "{}\t{}", record.short_code, record.original_url)?;
        }
        Commands::Get { code, visit } => {
            let svc = open(&cli.db)?;
            let code = ShortCode::parse(code).context("invalid short code")?;
            let record = if visit {
                svc.redirect(&code, &Visit::default())
            } else {
                svc.resolve(&code)
            }
            .with_context(|| format!("lookup {code}"))?;
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                record.short_code, record.original_url, record.category, record.summary
            )?;
        }
        Commands::Trend { minutes } => {
            let svc = open(&cli.db)?;
            let report = trend::trend_report(svc.repo(), svc.clock(), minutes)?;
            if let Some(msg) = &report.message {
                writeln!(out, "{msg}")?;
            }
            for (category, count) in &report.stats {
                writeln!(out, "{category}\t{count}")?;
            }
        }
        // pure transcoding, no database needed
        Commands::Encode { id } => writeln!(out, "{}", base62::encode(id))?,
        Commands::Decode { code } => {
            let id = base62::decode(code.trim())
                .with_context(|| format!("cannot decode {code:?}"))?;
            writeln!(out, "{id}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(db: &std::path::Path, args: &[&str]) -> Result<String> {
        let mut argv = vec!["surl", "--db", db.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv)?;
        let mut buf = Vec::new();
        run(cli, &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    #[test]
    fn create_then_get_persists_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("links.db");

        let out = exec(&db, &["create", "https://example.com/very/long/path"]).unwrap();
        assert_eq!(out, "1\thttps://example.com/very/long/path\n");
        let out = exec(&db, &["create", "https://e.com/2"]).unwrap();
        assert!(out.starts_with("2\t"));

        let out = exec(&db, &["get", "1"]).unwrap();
        assert!(out.starts_with("1\thttps://example.com/very/long/path\t"));
    }

    #[test]
    fn get_unknown_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = exec(&dir.path().join("t.db"), &["get", "zz"]).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }

    #[test]
    fn visit_shows_up_in_trend() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("t.db");
        exec(&db, &["create", "https://e.com"]).unwrap();
        assert_eq!(exec(&db, &["trend"]).unwrap(), "no data\n");

        exec(&db, &["get", "1", "--visit"]).unwrap();
        let out = exec(&db, &["trend", "--minutes", "5"]).unwrap();
        assert_eq!(out, format!("{}\t1\n", domain::DEFAULT_CATEGORY));
    }

    #[test]
    fn encode_decode_commands() {
        let db = PathBuf::from("unused.db");
        assert_eq!(exec(&db, &["encode", "61"]).unwrap(), "Z\n");
        assert_eq!(exec(&db, &["decode", "21"]).unwrap(), "125\n");
        assert!(exec(&db, &["decode", "a-b"]).is_err());
    }
}
