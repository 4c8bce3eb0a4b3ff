//! CLI interface for cowechat - send WeCom application messages from the terminal.

use std::env;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use cowechat_core::paths::write_default_config;
use cowechat_core::{
    AppConfig, AppPaths, CacheStatus, CoreError, MediaKind, MessageKind, Recipients, SendReceipt,
    TokenManager, WeComClient, generate_schema, write_generated_files,
};
use env_logger::fmt::WriteStyle;
use log::{LevelFilter, debug};

const APP_NAME: &str = "cowechat";
const REPO_URL: &str = "https://github.com/nikozhangwj/cowechat-rs";

/// Media ID shown in dry-run payloads instead of uploading.
const DRY_RUN_MEDIA_ID: &str = "<uploaded-media-id>";

fn main() -> anyhow::Result<()> {
    try_main()
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("resolved paths: {:#?}", ctx.paths);

    match cli.command {
        Command::Send(cmd) => handle_send(&ctx, cmd),
        Command::Upload(cmd) => handle_upload(&ctx, &cmd),
        Command::Token {
            credential,
            subcommand,
        } => handle_token(&ctx, &credential, subcommand),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "cowechat",
    author,
    version,
    about = "Send WeCom application messages from the terminal",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

/// Common CLI options shared across all subcommands.
#[derive(Debug, Clone, Args)]
pub struct CommonOpts {
    /// Override the config file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Reduce output to only errors.
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    pub quiet: bool,
    /// Increase logging verbosity (stackable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,
    /// Enable trace logging.
    #[arg(long, global = true)]
    pub trace: bool,
    /// Output machine-readable JSON.
    #[arg(long, global = true)]
    pub json: bool,
    /// Disable ANSI colors in output.
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    pub no_color: bool,
    /// Control color output.
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    pub color: ColorOption,
    /// Validate and print what would be sent without contacting WeCom.
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,
    /// Assume "yes" for interactive prompts.
    #[arg(short = 'y', long = "yes", global = true)]
    pub assume_yes: bool,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorOption {
    /// Detect terminal capabilities automatically.
    Auto,
    /// Always emit ANSI color codes.
    Always,
    /// Never emit ANSI color codes.
    Never,
}

/// Credential flags; each overrides the configured value.
#[derive(Debug, Clone, Default, Args)]
struct CredentialArgs {
    /// Enterprise (corp) ID.
    #[arg(short = 'i', long = "corp-id", alias = "companyId", env = "COWECHAT_CORP_ID")]
    corp_id: Option<String>,
    /// Application secret.
    #[arg(
        short = 's',
        long = "secret",
        env = "COWECHAT_SECRET",
        hide_env_values = true
    )]
    secret: Option<String>,
    /// Application agent ID.
    #[arg(short = 'a', long = "agent-id", alias = "agentId", env = "COWECHAT_AGENT_ID")]
    agent_id: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message to users, parties and/or tags.
    Send(SendCommand),
    /// Upload a temporary media file and print the raw response.
    Upload(UploadCommand),
    /// Inspect or manage the cached access token.
    Token {
        #[command(flatten)]
        credential: CredentialArgs,
        #[command(subcommand)]
        subcommand: TokenSubcommand,
    },
    /// Create config directories and default files.
    Init(InitCommand),
    /// Inspect and manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct SendCommand {
    #[command(flatten)]
    credential: CredentialArgs,
    /// Recipient user ID (repeatable, or `a|b`). `@all` targets everyone.
    #[arg(short = 'u', long = "user", value_name = "ID")]
    users: Vec<String>,
    /// Recipient party (department) ID (repeatable, or `a|b`).
    #[arg(short = 'p', long = "party", value_name = "ID")]
    parties: Vec<String>,
    /// Recipient tag ID (repeatable, or `a|b`).
    #[arg(short = 't', long = "tag", value_name = "ID")]
    tags: Vec<String>,
    /// Message type: text, image, voice, video, file.
    #[arg(short = 'm', long = "msg-type", alias = "msgType", default_value = "text")]
    msg_type: MessageKind,
    /// Text content for text messages.
    #[arg(short = 'c', long)]
    content: Option<String>,
    /// Media ID for image, voice, video and file messages.
    #[arg(long = "media-id", alias = "mediaId", conflicts_with = "file")]
    media_id: Option<String>,
    /// Upload this file first and send the resulting media ID.
    #[arg(short = 'f', long, value_name = "PATH")]
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct UploadCommand {
    #[command(flatten)]
    credential: CredentialArgs,
    /// Media type: image, voice, video, file.
    media_type: MediaKind,
    /// File to upload.
    path: PathBuf,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum TokenSubcommand {
    /// Show whether a cached token exists and how long it stays valid.
    Status,
    /// Print a usable access token, fetching one if the cache is stale.
    Get,
    /// Fetch a new token and overwrite the cache.
    Refresh,
    /// Delete the cached token.
    Clear,
}

#[derive(Debug, Clone, Copy, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists.
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration (secret redacted).
    Show,
    /// Print the resolved config file path.
    Path,
    /// Print all resolved paths.
    Paths,
    /// Print the JSON schema.
    Schema,
    /// Write the JSON schema and an example config to a directory.
    Generate {
        /// Output directory.
        #[arg(default_value = "schemas")]
        dir: PathBuf,
    },
    /// Regenerate the default configuration file.
    Reset,
}

// ─── Runtime ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.as_deref())?;
        let config = AppConfig::load(&paths, common.dry_run)?;
        let paths = paths.apply_overrides(&config)?;
        let ctx = Self {
            common,
            paths,
            config,
        };
        ctx.ensure_directories()?;
        Ok(ctx)
    }

    fn init_logging(&self) -> Result<()> {
        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        builder.filter_level(self.effective_log_level());

        if let Some(ref file) = self.config.logging.file {
            let target = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .with_context(|| format!("opening log file {file}"))?;
            builder.target(env_logger::Target::Pipe(Box::new(target)));
            builder.write_style(WriteStyle::Never);
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            if disable_color {
                builder.write_style(WriteStyle::Never);
            } else if force_color {
                builder.write_style(WriteStyle::Always);
            } else {
                builder.write_style(WriteStyle::Auto);
            }
        }

        builder.try_init().or_else(|err| {
            if self.common.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    /// Flags win; otherwise a log file gets the configured level and stderr gets warnings.
    const fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 if self.config.logging.file.is_some() => {
                    self.config.logging.level.to_level_filter()
                }
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn ensure_directories(&self) -> Result<()> {
        if self.common.dry_run {
            self.paths.log_dry_run();
            return Ok(());
        }
        self.paths.ensure_directories()
    }

    /// Build a client from the configuration with command-line credential overrides.
    fn client(&self, overrides: &CredentialArgs) -> Result<WeComClient> {
        let mut config = self.config.clone();
        if let Some(ref corp_id) = overrides.corp_id {
            config.credential.corp_id = Some(corp_id.clone());
        }
        if let Some(ref secret) = overrides.secret {
            config.credential.corp_secret = Some(secret.clone());
        }
        if let Some(agent_id) = overrides.agent_id {
            config.credential.agent_id = Some(agent_id);
        }

        let credential = config.credential()?;
        let cache_file = self.paths.token_cache_file(&credential);
        debug!("token cache: {}", cache_file.display());

        let client = WeComClient::builder(credential)
            .base_url(config.api.base_url)
            .timeout(config.api.timeout.map(Duration::from_secs))
            .retry_count(config.delivery.retry_count)
            .safe(config.delivery.safe)
            .cache_file(cache_file)
            .build()?;
        Ok(client)
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serializing output to JSON")?
    );
    Ok(())
}

// ─── Handlers ────────────────────────────────────────────────────────

/// Result of the send flow.
#[derive(Debug)]
enum SendOutcome {
    /// Dry run: the payload that would have been posted.
    DryRun(serde_json::Value),
    /// Delivered.
    Sent {
        kind: MessageKind,
        receipt: SendReceipt,
    },
}

fn handle_send(ctx: &RuntimeContext, cmd: SendCommand) -> Result<()> {
    let client = ctx.client(&cmd.credential)?;
    match run_send(&client, cmd, ctx.common.dry_run)? {
        SendOutcome::DryRun(payload) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("serializing payload")?
            );
            Ok(())
        }
        SendOutcome::Sent { kind, receipt } if ctx.common.json => print_json(&serde_json::json!({
            "ok": true,
            "msgtype": kind.as_str(),
            "attempts": receipt.attempts,
            "errmsg": receipt.errmsg,
        })),
        SendOutcome::Sent { kind, receipt } => {
            if !ctx.common.quiet {
                println!(
                    "Sent {kind} message (attempt {}/{}).",
                    receipt.attempts,
                    client.retry_count()
                );
            }
            Ok(())
        }
    }
}

/// Validate, optionally upload `--file`, then send or (dry run) render the payload.
///
/// Nothing is requested before the arguments are validated, and a dry run
/// makes no request at all.
fn run_send(client: &WeComClient, cmd: SendCommand, dry_run: bool) -> Result<SendOutcome> {
    let kind = cmd.msg_type;
    let recipients = Recipients::new()
        .users(cmd.users)
        .parties(cmd.parties)
        .tags(cmd.tags);

    let media_id = match cmd.file {
        Some(path) => {
            let Some(media_kind) = kind.media_kind() else {
                return Err(reject(
                    client,
                    kind,
                    "--file needs an image, voice, video or file message",
                ));
            };
            if recipients.is_empty() {
                return Err(reject(
                    client,
                    kind,
                    "--user, --party and --tag cannot all be empty",
                ));
            }
            if dry_run {
                log::info!("dry-run: would upload {} as {media_kind}", path.display());
                Some(DRY_RUN_MEDIA_ID.to_string())
            } else {
                Some(client.upload_media(media_kind, &path)?)
            }
        }
        None => cmd.media_id,
    };

    let message = client.prepare(kind, recipients, cmd.content.as_deref(), media_id.as_deref())?;

    if dry_run {
        let agent_id = client.tokens().credential().agent_id();
        let payload = serde_json::to_value(message.payload(agent_id, client.safe()))
            .context("serializing payload")?;
        return Ok(SendOutcome::DryRun(payload));
    }

    let receipt = client.send(&message)?;
    Ok(SendOutcome::Sent { kind, receipt })
}

fn reject(client: &WeComClient, kind: MessageKind, reason: &str) -> anyhow::Error {
    client
        .sink()
        .error(&format!("{kind} message rejected: {reason}"));
    CoreError::Validation(reason.to_string()).into()
}

fn handle_upload(ctx: &RuntimeContext, cmd: &UploadCommand) -> Result<()> {
    let client = ctx.client(&cmd.credential)?;
    if ctx.common.dry_run {
        log::info!(
            "dry-run: would upload {} as {}",
            cmd.path.display(),
            cmd.media_type
        );
        return Ok(());
    }
    let body = client.upload(cmd.media_type, &cmd.path)?;
    println!("{body}");
    Ok(())
}

fn handle_token(
    ctx: &RuntimeContext,
    credential: &CredentialArgs,
    cmd: TokenSubcommand,
) -> Result<()> {
    let client = ctx.client(credential)?;
    let tokens = client.tokens();
    let cache_path = tokens.cache().path().display().to_string();

    match cmd {
        TokenSubcommand::Status => {
            let status = tokens.cache_status()?;
            if ctx.common.json {
                return print_json(&serde_json::json!({
                    "cache": cache_path,
                    "present": status.is_some(),
                    "valid": status.as_ref().is_some_and(|s| s.valid),
                    "obtained": status.as_ref().and_then(|s| s.record.date.clone()),
                    "errmsg": status.as_ref().and_then(|s| s.record.errmsg.clone()),
                    "remaining_secs": status.as_ref().and_then(CacheStatus::remaining_secs),
                }));
            }
            println!("Cache file:  {cache_path}");
            match status {
                None => println!("No cached token. Run 'cowechat token refresh' to fetch one."),
                Some(status) => {
                    println!(
                        "Obtained:    {}",
                        status.record.date.as_deref().unwrap_or("unknown")
                    );
                    println!(
                        "Status:      {}",
                        status.record.errmsg.as_deref().unwrap_or("unknown")
                    );
                    match status.remaining_secs() {
                        Some(remaining) => println!(
                            "Expires:     {}m {}s remaining",
                            remaining / 60,
                            remaining % 60
                        ),
                        None => println!("Expires:     expired or unusable"),
                    }
                }
            }
            Ok(())
        }
        TokenSubcommand::Get => {
            if let Some(token) = usable_token(tokens, ctx.common.dry_run)? {
                println!("{token}");
            }
            Ok(())
        }
        TokenSubcommand::Refresh => {
            if ctx.common.dry_run {
                log::info!("dry-run: would refresh token cache at {cache_path}");
                return Ok(());
            }
            tokens.fetch_remote_token()?;
            if !ctx.common.quiet {
                println!("Refreshed token cache at {cache_path}.");
            }
            Ok(())
        }
        TokenSubcommand::Clear => {
            if ctx.common.dry_run {
                log::info!("dry-run: would delete {cache_path}");
                return Ok(());
            }
            if tokens.clear_cache()? {
                println!("Removed {cache_path}.");
            } else {
                println!("No token cache at {cache_path}.");
            }
            Ok(())
        }
    }
}

/// A usable token. A dry run only reads a still-valid cache and never fetches.
fn usable_token(tokens: &TokenManager, dry_run: bool) -> Result<Option<String>> {
    if !dry_run {
        return Ok(Some(tokens.get_token()?));
    }
    if tokens.is_cache_valid() {
        return Ok(Some(tokens.read_cached_token()?));
    }
    log::info!(
        "dry-run: would fetch a new token into {}",
        tokens.cache().path().display()
    );
    Ok(None)
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !(cmd.force || ctx.common.assume_yes) {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.config_file.display()
        ));
    }
    if ctx.common.dry_run {
        log::info!(
            "dry-run: would write default config to {}",
            ctx.paths.config_file.display()
        );
        return Ok(());
    }
    write_default_config(&ctx.paths.config_file)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let mut shown = ctx.config.clone();
            if shown.credential.corp_secret.is_some() {
                shown.credential.corp_secret = Some("<redacted>".to_string());
            }
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&shown).context("serializing config to JSON")?
                );
            } else {
                println!("{shown:#?}");
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Paths => {
            if ctx.common.json {
                let paths = serde_json::json!({
                    "config": ctx.paths.config_file,
                    "cache": ctx.paths.cache_dir,
                    "cache_file": ctx.paths.cache_file,
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&paths).context("serializing paths to JSON")?
                );
            } else {
                println!("config: {}", ctx.paths.config_file.display());
                println!("cache:  {}", ctx.paths.cache_dir.display());
                if let Some(ref file) = ctx.paths.cache_file {
                    println!("token:  {}", file.display());
                }
            }
            Ok(())
        }
        ConfigCommand::Schema => {
            println!("{}", generate_schema(APP_NAME, REPO_URL)?);
            Ok(())
        }
        ConfigCommand::Generate { dir } => {
            if ctx.common.dry_run {
                log::info!("dry-run: would write schema and example config to {}", dir.display());
                return Ok(());
            }
            write_generated_files(&dir, APP_NAME, REPO_URL)?;
            println!("Wrote config.schema.json and config.toml to {}", dir.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            if ctx.common.dry_run {
                log::info!(
                    "dry-run: would reset config at {}",
                    ctx.paths.config_file.display()
                );
                return Ok(());
            }
            write_default_config(&ctx.paths.config_file)
        }
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use cowechat_core::wecom::transport::Query;
    use cowechat_core::{Credential, MemorySink, Transport};
    use serde_json::{Value, json};

    use super::*;

    const UPLOAD_BODY: &str =
        r#"{"errcode":0,"errmsg":"","type":"file","media_id":"MEDIA-9","created_at":"1380000000"}"#;

    /// Answers every endpoint successfully and records `(url, body)` per request.
    #[derive(Debug, Clone, Default)]
    struct RecordingWeCom {
        requests: Arc<Mutex<Vec<(String, Option<Value>)>>>,
    }

    impl RecordingWeCom {
        fn requests(&self) -> Vec<(String, Option<Value>)> {
            self.requests.lock().expect("requests").clone()
        }

        fn record(&self, url: &str, body: Option<Value>) {
            self.requests
                .lock()
                .expect("requests")
                .push((url.to_string(), body));
        }
    }

    impl Transport for RecordingWeCom {
        fn get_json(&self, url: &str, _query: &Query<'_>) -> cowechat_core::Result<Value> {
            self.record(url, None);
            Ok(json!({
                "errcode": 0,
                "errmsg": "ok",
                "access_token": "ACCESS",
                "expires_in": 7200
            }))
        }

        fn post_json(
            &self,
            url: &str,
            _query: &Query<'_>,
            body: &Value,
        ) -> cowechat_core::Result<Value> {
            self.record(url, Some(body.clone()));
            Ok(json!({"errcode": 0, "errmsg": "ok"}))
        }

        fn post_file(
            &self,
            url: &str,
            _query: &Query<'_>,
            _field: &str,
            path: &Path,
        ) -> cowechat_core::Result<String> {
            std::fs::metadata(path)?;
            self.record(url, None);
            Ok(UPLOAD_BODY.to_string())
        }
    }

    fn fake_client(
        dir: &tempfile::TempDir,
        fake: &RecordingWeCom,
        sink: &MemorySink,
    ) -> WeComClient {
        let credential =
            Credential::new("ww0011223344", "app-secret", 1_000_002).expect("credential");
        WeComClient::builder(credential)
            .base_url("https://wecom.test/cgi-bin")
            .cache_file(dir.path().join("token.json"))
            .transport(fake.clone())
            .sink(sink.clone())
            .build()
            .expect("client")
    }

    fn send_args(args: &[&str]) -> SendCommand {
        let cli = Cli::try_parse_from(["cowechat", "send"].iter().chain(args)).expect("parse");
        let Command::Send(cmd) = cli.command else {
            panic!("expected send");
        };
        cmd
    }

    #[test]
    fn file_is_uploaded_then_sent_by_media_id() {
        let dir = tempfile::tempdir().expect("temp dir");
        let report = dir.path().join("report.pdf");
        std::fs::write(&report, b"%PDF").expect("write report");
        let fake = RecordingWeCom::default();
        let client = fake_client(&dir, &fake, &MemorySink::new());

        let report = report.to_str().expect("utf-8");
        let cmd = send_args(&["-p", "2", "-m", "file", "-f", report]);
        let outcome = run_send(&client, cmd, false).expect("sent");
        assert!(matches!(
            outcome,
            SendOutcome::Sent { kind: MessageKind::File, ref receipt } if receipt.attempts == 1
        ));

        let urls: Vec<String> = fake.requests().into_iter().map(|(url, _)| url).collect();
        assert_eq!(
            urls,
            vec![
                "https://wecom.test/cgi-bin/gettoken".to_string(),
                "https://wecom.test/cgi-bin/media/upload".to_string(),
                "https://wecom.test/cgi-bin/message/send".to_string(),
            ]
        );
        let sent = fake
            .requests()
            .into_iter()
            .find_map(|(_, body)| body)
            .expect("send body");
        assert_eq!(sent["toparty"], "2");
        assert_eq!(sent["file"]["media_id"], "MEDIA-9");
    }

    #[test]
    fn file_with_text_type_fails_before_any_request() {
        let dir = tempfile::tempdir().expect("temp dir");
        let fake = RecordingWeCom::default();
        let sink = MemorySink::new();
        let client = fake_client(&dir, &fake, &sink);

        let cmd = send_args(&["-u", "zhangsan", "-m", "text", "-f", "/tmp/notes.txt"]);
        let err = run_send(&client, cmd, false).expect_err("text cannot carry a file");
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::Validation(_))
        ));
        assert!(fake.requests().is_empty());
        assert!(
            sink.at_level(log::Level::Error)
                .iter()
                .any(|m| m.starts_with("text message rejected"))
        );
    }

    #[test]
    fn dry_run_renders_payload_without_requests() {
        let dir = tempfile::tempdir().expect("temp dir");
        let image = dir.path().join("chart.png");
        std::fs::write(&image, b"\x89PNG").expect("write image");
        let fake = RecordingWeCom::default();
        let client = fake_client(&dir, &fake, &MemorySink::new());

        let image = image.to_str().expect("utf-8");
        let cmd = send_args(&["-u", "zhangsan|lisi", "-m", "image", "-f", image]);
        let SendOutcome::DryRun(payload) = run_send(&client, cmd, true).expect("dry run") else {
            panic!("expected a dry-run payload");
        };
        assert_eq!(payload["touser"], "zhangsan|lisi");
        assert_eq!(payload["msgtype"], "image");
        assert_eq!(payload["image"]["media_id"], DRY_RUN_MEDIA_ID);

        let cmd = send_args(&["-t", "3", "-c", "deploy done"]);
        let SendOutcome::DryRun(payload) = run_send(&client, cmd, true).expect("dry run") else {
            panic!("expected a dry-run payload");
        };
        assert_eq!(payload["text"]["content"], "deploy done");
        assert_eq!(payload["agentid"], 1_000_002);

        assert!(fake.requests().is_empty());
        assert!(!dir.path().join("token.json").exists());
    }

    #[test]
    fn dry_run_token_lookup_never_fetches() {
        let dir = tempfile::tempdir().expect("temp dir");
        let fake = RecordingWeCom::default();
        let client = fake_client(&dir, &fake, &MemorySink::new());

        assert_eq!(usable_token(client.tokens(), true).expect("dry run"), None);
        assert!(fake.requests().is_empty());
        assert!(!dir.path().join("token.json").exists());

        assert_eq!(
            usable_token(client.tokens(), false).expect("fetch").as_deref(),
            Some("ACCESS")
        );
        assert_eq!(
            usable_token(client.tokens(), true).expect("cached").as_deref(),
            Some("ACCESS")
        );
        assert_eq!(fake.requests().len(), 1, "only the non-dry lookup hits the endpoint");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_accepts_original_flag_spellings() {
        let cli = Cli::try_parse_from([
            "cowechat",
            "send",
            "--companyId",
            "ww1",
            "-s",
            "secret",
            "--agentId",
            "1000002",
            "-u",
            "zhangsan|lisi",
            "--msgType",
            "image",
            "--mediaId",
            "MEDIA",
        ])
        .expect("parse");
        let Command::Send(cmd) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(cmd.msg_type, MessageKind::Image);
        assert_eq!(cmd.credential.agent_id, Some(1_000_002));
        assert_eq!(cmd.media_id.as_deref(), Some("MEDIA"));
    }

    #[test]
    fn unknown_message_type_is_rejected_by_parser() {
        let result = Cli::try_parse_from(["cowechat", "send", "-u", "a", "-m", "markdown"]);
        assert!(result.is_err());
    }
}
