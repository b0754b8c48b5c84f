use clap::{Args, Parser, Subcommand};

use crate::extract::EmailFormat;

#[derive(Parser, Debug)]
#[command(name = "scry")]
#[command(about = "Harvests contacts and file links from search engines via dork queries")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/scry.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Print example dorks and exit
    #[arg(long)]
    pub show_examples: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Gather names from search results and generate email addresses
    Contacts(ContactsArgs),

    /// Dork for exposed files, optionally download them
    Files(FilesArgs),
}

/// Flags shared by both subcommands
#[derive(Args, Debug, Clone)]
pub struct SharedArgs {
    /// Serper API key (or set SERPER_API_KEY env)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Data source: auto (both if key present), api (Serper only), browser (scrape only)
    #[arg(long, default_value = "auto", value_parser = ["auto", "api", "browser"])]
    pub source: String,

    /// Output format
    #[arg(long, default_value = "txt", value_parser = ["txt", "json", "csv"])]
    pub format_output: String,

    /// Print results to stdout (pipe-friendly)
    #[arg(long)]
    pub stdout: bool,

    /// Show what would run, no execution
    #[arg(long)]
    pub dry_run: bool,

    /// Minimal output
    #[arg(long)]
    pub quiet: bool,

    /// Verbose logging (use -v for detailed, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Structured output directory (timestamped subdirectory per run)
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Max pages per query (overrides config)
    #[arg(short, long, value_name = "N")]
    pub pages: Option<u32>,

    /// Seconds between browser result pages (overrides config)
    #[arg(long, value_name = "SEC")]
    pub delay: Option<u64>,

    /// Export execution logs to a file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ContactsArgs {
    /// Company name
    #[arg(short, long)]
    pub company: String,

    /// Domain used for generated emails (e.g. acme.com)
    #[arg(short, long)]
    pub domain: String,

    /// Email format 1-10
    #[arg(
        short = 'f',
        long,
        default_value_t = 1,
        value_name = "N",
        value_parser = clap::value_parser!(u8).range(1..=10),
        help = EmailFormat::HELP,
    )]
    pub format: u8,

    /// Output filename (ignored with --output-dir or --stdout)
    #[arg(short, long, default_value = "emails.txt", value_name = "FILE")]
    pub output: String,

    /// Also save extracted names to a file
    #[arg(long, value_name = "FILE")]
    pub save_names: Option<String>,

    #[command(flatten)]
    pub shared: SharedArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FilesArgs {
    /// Dork to run, repeatable
    #[arg(short, long, value_name = "DORK")]
    pub query: Vec<String>,

    /// File with dorks, one per line
    #[arg(long, value_name = "PATH")]
    pub dorks_file: Option<String>,

    /// Replaces {company} in dorks
    #[arg(short, long, value_name = "NAME")]
    pub company: Option<String>,

    /// Replaces {domain} in dorks
    #[arg(short, long, value_name = "DOMAIN")]
    pub domain: Option<String>,

    /// Output filename (ignored with --output-dir or --stdout)
    #[arg(short, long, default_value = "file_links.txt", value_name = "FILE")]
    pub output: String,

    /// Skip the search entirely, download URLs listed in this file
    #[arg(long, value_name = "PATH")]
    pub input_file: Option<String>,

    /// Download found files
    #[arg(long)]
    pub download: bool,

    /// Directory for downloaded files
    #[arg(long, default_value = "downloads", value_name = "DIR")]
    pub download_dir: String,

    /// Forward proxy for downloads
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// FlareSolverr endpoint for challenge-protected downloads
    #[arg(long, value_name = "URL")]
    pub flaresolverr: Option<String>,

    /// Re-download files even if they already exist
    #[arg(long)]
    pub no_resume: bool,

    #[command(flatten)]
    pub shared: SharedArgs,
}

impl ContactsArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.company.trim().is_empty() {
            return Err("Company cannot be empty".to_string());
        }
        if self.domain.trim().is_empty() || !self.domain.contains('.') {
            return Err("Domain must look like a hostname (e.g. acme.com)".to_string());
        }
        Ok(())
    }
}

impl FilesArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.query.is_empty() && self.dorks_file.is_none() && self.input_file.is_none() {
            return Err(
                "files requires at least one of -q/--query, --dorks-file or --input-file"
                    .to_string(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn contacts_parses_with_required_flags() {
        let cli = Cli::parse_from(["scry", "contacts", "-c", "Acme Corp", "-d", "acme.com"]);
        match cli.command {
            Some(Commands::Contacts(args)) => {
                assert_eq!(args.company, "Acme Corp");
                assert_eq!(args.domain, "acme.com");
                assert_eq!(args.format, 1);
                assert_eq!(args.shared.source, "auto");
                assert!(args.validate().is_ok());
            }
            other => panic!("expected contacts subcommand, got {:?}", other),
        }
    }

    #[test]
    fn files_accepts_repeated_queries() {
        let cli = Cli::parse_from([
            "scry",
            "files",
            "-q",
            "site:{domain} filetype:pdf",
            "-q",
            "site:{domain} filetype:xlsx",
            "-d",
            "acme.com",
            "--download",
        ]);
        match cli.command {
            Some(Commands::Files(args)) => {
                assert_eq!(args.query.len(), 2);
                assert!(args.download);
                assert!(!args.no_resume);
                assert!(args.validate().is_ok());
            }
            other => panic!("expected files subcommand, got {:?}", other),
        }
    }

    #[test]
    fn files_without_any_dork_source_fails_validation() {
        let cli = Cli::parse_from(["scry", "files", "-d", "acme.com"]);
        match cli.command {
            Some(Commands::Files(args)) => assert!(args.validate().is_err()),
            other => panic!("expected files subcommand, got {:?}", other),
        }
    }

    #[test]
    fn email_format_out_of_range_is_rejected() {
        assert!(Cli::try_parse_from([
            "scry", "contacts", "-c", "Acme", "-d", "acme.com", "-f", "11"
        ])
        .is_err());
    }

    #[test]
    fn invalid_source_is_rejected() {
        assert!(Cli::try_parse_from([
            "scry", "contacts", "-c", "Acme", "-d", "acme.com", "--source", "bing"
        ])
        .is_err());
    }
}
