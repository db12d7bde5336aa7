use std::{ path::PathBuf, process::ExitCode };

use clap::Parser;
use tracing::{ info, error };
use anyhow::{ Result, Context };

use crate::reconcile::{ Plan, Source, Summary };

mod config;
mod error;
mod iplist;
mod logger;
mod reconcile;
mod sc;
mod template;

#[derive(Parser)]
#[command(
    version,
    about = "Remove agent-scanned hosts from a Tenable.sc IPv4 repository",
    long_about = "Remove agent-scanned hosts from a Tenable.sc IPv4 repository\n\n\
    Reads IP addresses from a file or an agent repository, deletes the ones that also\n\
    exist in the target repository by importing an empty scan result for them, and\n\
    optionally stores the addresses in a static asset list.\n\n\
    API keys are read from TSC_ACCESS_KEY and TSC_SECRET_KEY, either in the environment\n\
    or in the env file."
)]
struct Cli {
    /// File with IP addresses to process, one per line
    #[arg(
        short('f'),
        long = "input-file",
        value_name = "path",
        conflicts_with = "input_repository"
    )]
    input_file: Option<PathBuf>,
    /// Agent repository to read IP addresses from
    #[arg(short('i'), long = "input-repository", value_name = "name")]
    input_repository: Option<String>,
    /// IPv4 repository to delete matching IP addresses from
    #[arg(short('t'), long = "target-repository", value_name = "name")]
    target_repository: Option<String>,
    /// Max. number of IP addresses to delete in one run
    #[arg(
        short('l'),
        long,
        value_name = "count",
        default_value_t = reconcile::DEFAULT_LIMIT as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    limit: u64,
    /// Static asset list to create or replace with the input IP addresses
    #[arg(short('a'), long = "update-asset-list", value_name = "name")]
    update_asset_list: Option<String>,
    /// Tenable.sc server hostname or address
    #[arg(short('s'), long = "tsc-server", env = "TSC_SERVER", value_name = "host")]
    tsc_server: String,
    /// Tenable.sc HTTPS port
    #[arg(
        short('p'),
        long = "tsc-port",
        env = "TSC_PORT",
        value_name = "port",
        default_value_t = 443
    )]
    tsc_port: u16,
    /// Report what would change without modifying anything
    #[arg(long = "dry-run", default_value_t = false)]
    dry_run: bool,
    /// Scan result template, {TARGET_IPS} is replaced with the addresses to delete
    #[arg(long, value_name = "path", default_value = "template.nessus")]
    template: PathBuf,
    /// File to load API keys from
    #[arg(long = "env-file", value_name = "path", default_value = ".env")]
    env_file: PathBuf,
    /// Use TSC_ADMIN_ACCESS_KEY and TSC_ADMIN_SECRET_KEY instead of the user keys
    #[arg(long, default_value_t = false)]
    admin: bool,
    /// Accept invalid TLS certificates from the server
    #[arg(long, default_value_t = false)]
    insecure: bool,
    /// Write logs as JSON lines
    #[arg(long = "json-log", default_value_t = false)]
    json_log: bool,
    /// Increase logging verbosity
    #[arg(short('v'), long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

impl Cli {
    fn plan(&self) -> Result<Plan> {
        let source = match (&self.input_file, &self.input_repository) {
            (Some(p), _) => Source::File(p.clone()),
            (None, Some(r)) => Source::Repository(r.clone()),
            (None, None) => Source::None,
        };
        Ok(Plan {
            source,
            target_repository: self.target_repository.clone(),
            limit: usize::try_from(self.limit).context("limit is too large")?,
            asset_list: self.update_asset_list.clone(),
            template: self.template.clone(),
            dry_run: self.dry_run,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Cli::parse();
    let level = logger::verbosity_to_level_filter(args.verbosity);
    let sub = logger::setup_logger(level, args.json_log);
    if let Err(e) = tracing::subscriber::set_global_default(sub) {
        eprintln!("cannot setup logging: {}", e);
    }

    match run(args).await {
        Ok(summary) => {
            print!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

// printed as well as logged, logging may be off or in json
fn failure_message(e: &anyhow::Error) -> String {
    format!("error: {:#}", e)
}

async fn run(args: Cli) -> Result<Summary> {
    let plan = args.plan()?;
    let creds = config
        ::load_credentials(&args.env_file, args.admin)
        .context("loading api keys")?;
    let cfg = config::ScConfig::new(&args.tsc_server, args.tsc_port, creds, args.insecure);
    info!("using tenable.sc at {}", cfg.base_url);
    if plan.dry_run {
        info!("dry run, no changes will be made");
    }
    let client = sc::ScClient::new(cfg)?;
    reconcile::run(&client, &plan).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["dedup-ips", "-s", "sc.local", "-f", "ips.txt"]).unwrap();
        assert_eq!(cli.tsc_server, "sc.local");
        assert_eq!(cli.limit, 500);
        assert_eq!(cli.limit, reconcile::DEFAULT_LIMIT as u64);
        assert!(!cli.dry_run);
        assert_eq!(cli.template, PathBuf::from("template.nessus"));
        assert_eq!(cli.env_file, PathBuf::from(".env"));
        let plan = cli.plan().unwrap();
        assert_eq!(plan.source, Source::File(PathBuf::from("ips.txt")));
        assert_eq!(plan.limit, reconcile::DEFAULT_LIMIT);
        assert!(plan.target_repository.is_none());
    }

    #[test]
    fn test_cli_full() {
        let cli = Cli::try_parse_from([
            "dedup-ips",
            "--tsc-server",
            "10.1.1.1",
            "--tsc-port",
            "8443",
            "-i",
            "Agents",
            "-t",
            "Servers",
            "-l",
            "25",
            "-a",
            "decommissioned",
            "--dry-run",
            "-vv",
        ]).unwrap();
        assert_eq!(cli.tsc_port, 8443);
        assert_eq!(cli.verbosity, 2);
        let plan = cli.plan().unwrap();
        assert_eq!(plan.source, Source::Repository("Agents".to_string()));
        assert_eq!(plan.target_repository.as_deref(), Some("Servers"));
        assert_eq!(plan.asset_list.as_deref(), Some("decommissioned"));
        assert_eq!(plan.limit, 25);
        assert!(plan.dry_run);
    }

    #[test]
    fn test_cli_rejects_invalid() {
        // both sources at once
        assert!(
            Cli::try_parse_from(["dedup-ips", "-s", "sc", "-f", "a.txt", "-i", "Agents"]).is_err()
        );
        assert!(Cli::try_parse_from(["dedup-ips", "-s", "sc", "-l", "0"]).is_err());
        assert!(Cli::try_parse_from(["dedup-ips", "-s", "sc", "-l", "many"]).is_err());
    }

    #[test]
    fn test_failure_message_keeps_context() {
        let e = anyhow::anyhow!("TSC_SECRET_KEY is not set").context("loading api keys");
        assert_eq!(failure_message(&e), "error: loading api keys: TSC_SECRET_KEY is not set");
        let e: anyhow::Error = crate::error::ReconcileError::RepositoryNotFound("Agents".into()).into();
        assert_eq!(failure_message(&e), "error: Agents not found");
    }
}
