use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sow_composer::config::{init_default_config, resolve_config, ResolvedConfig};
use sow_composer::docx::extract::extract_blocks;
use sow_composer::engine::{verify_roundtrip, DirTemplateLoader, DocumentEngine, DocumentKind};
use sow_composer::render::BlockHtmlRenderer;
use sow_composer::snapshot::{FsSnapshotStore, SnapshotStore};
use sow_composer::substitute::ReplacementMap;
use sow_composer::vocabulary::{build_replacements, download_file_name, EngagementRequest};

#[derive(Parser, Debug)]
#[command(name = "sow-composer", version)]
#[command(about = "Fill SOW/MSA .docx templates from %%TOKEN%% replacement maps", long_about = None)]
struct Cli {
    /// Config file path (default: SOW_COMPOSER_CONFIG, or sow-composer.toml searched upwards)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default sow-composer.toml and a templates/ directory
    InitConfig {
        /// Directory to write into (default: current directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Dump the annotated block model as JSON
    Blocks {
        #[command(flatten)]
        source: SourceArgs,
        /// Only blocks with non-whitespace text
        #[arg(long)]
        non_empty: bool,
        #[arg(short, long, value_name = "JSON")]
        output: Option<PathBuf>,
    },

    /// Fill a template and write the resulting .docx
    Generate {
        #[arg(long, value_enum, default_value_t = DocumentKind::Sow)]
        kind: DocumentKind,
        #[command(flatten)]
        values: ValueArgs,
        /// Output .docx (default: <KIND>_<company>.docx)
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
        /// Write the generation report as JSON
        #[arg(long, value_name = "JSON")]
        report: Option<PathBuf>,
    },

    /// Render the generated document (or the bare template) as HTML
    Preview {
        #[arg(long, value_enum, default_value_t = DocumentKind::Sow)]
        kind: DocumentKind,
        #[command(flatten)]
        values: ValueArgs,
        /// Preview the template itself, without substitution
        #[arg(long)]
        original: bool,
        #[arg(short, long, value_name = "HTML")]
        output: Option<PathBuf>,
    },

    /// Rewrite every block with its own text and verify re-extraction matches
    Roundtrip {
        #[command(flatten)]
        source: SourceArgs,
        /// Keep the rewritten package
        #[arg(short, long, value_name = "DOCX")]
        output: Option<PathBuf>,
    },

    /// Edited-HTML snapshots
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    /// Store HTML for a client and document kind
    Save {
        #[arg(long)]
        client: String,
        #[arg(long, value_enum)]
        kind: DocumentKind,
        /// HTML file to store
        #[arg(long, value_name = "HTML")]
        html: PathBuf,
    },
    /// Print the stored HTML
    Show {
        #[arg(long)]
        client: String,
        #[arg(long, value_enum)]
        kind: DocumentKind,
    },
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// Configured template to read
    #[arg(long, value_enum, default_value_t = DocumentKind::Sow)]
    kind: DocumentKind,
    /// Read this .docx instead of a configured template
    #[arg(long, value_name = "DOCX")]
    input: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ValueArgs {
    /// Engagement request JSON (companyName, services, techStack, ...)
    #[arg(long, value_name = "JSON")]
    request: Option<PathBuf>,
    /// Raw KEY -> value JSON object; wins over values derived from --request
    #[arg(long, value_name = "JSON")]
    replacements: Option<PathBuf>,
    /// Use this .docx as the template
    #[arg(long, value_name = "DOCX")]
    template: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("current dir")?;

    let command = match cli.command {
        Command::InitConfig { dir, force } => {
            let dir = dir.unwrap_or_else(|| cwd.clone());
            let path = init_default_config(&dir, force).context("init default config")?;
            eprintln!("Wrote config: {}", path.display());
            return Ok(());
        }
        other => other,
    };

    let cfg = resolve_config(cli.config.as_deref(), &cwd).context("load config")?;
    match &cfg.config_path {
        Some(p) => info!(config = %p.display(), "config loaded"),
        None => info!("no config file found, using defaults"),
    }

    match command {
        Command::InitConfig { .. } => Ok(()),
        Command::Blocks {
            source,
            non_empty,
            output,
        } => {
            let bytes = read_source(&cfg, &source)?;
            let model = extract_blocks(&bytes)?;
            let json = if non_empty {
                serde_json::to_string_pretty(&model.non_empty)
            } else {
                serde_json::to_string_pretty(&model)
            }
            .context("serialize blocks")?;
            write_text(output.as_deref(), &json)
        }
        Command::Generate {
            kind,
            values,
            output,
            report,
        } => {
            let (map, company) = load_values(&cfg, &values)?;
            let engine = engine_for(&cfg, values.template.as_deref())?;
            let doc = engine.generate(kind, &map)?;

            let output = output.unwrap_or_else(|| {
                let name = download_file_name(kind, company.as_deref().unwrap_or("generated"));
                cwd.join(name)
            });
            std::fs::write(&output, &doc.bytes)
                .with_context(|| format!("write docx: {}", output.display()))?;
            info!(output = %output.display(), "wrote document");

            if !doc.report.remaining_placeholders.is_empty() {
                warn!(
                    blocks = doc.report.remaining_placeholders.len(),
                    "document still contains unresolved placeholders"
                );
            }
            if let Some(p) = report {
                let json = serde_json::to_string_pretty(&doc.report).context("serialize report")?;
                write_text(Some(&p), &json)?;
            }
            Ok(())
        }
        Command::Preview {
            kind,
            values,
            original,
            output,
        } => {
            let engine = engine_for(&cfg, values.template.as_deref())?;
            let renderer = BlockHtmlRenderer;
            let html = if original {
                engine.preview_template(kind, &renderer)?
            } else {
                let (map, _) = load_values(&cfg, &values)?;
                engine.preview(kind, &map, &renderer)?
            };
            write_text(output.as_deref(), &html)
        }
        Command::Roundtrip { source, output } => {
            let bytes = read_source(&cfg, &source)?;
            let report = verify_roundtrip(&bytes)?;
            if let Some(p) = output.as_ref() {
                std::fs::write(p, &report.package)
                    .with_context(|| format!("write docx: {}", p.display()))?;
            }
            let json = serde_json::to_string_pretty(&report).context("serialize report")?;
            println!("{json}");
            if !report.is_identical() {
                return Err(anyhow!(
                    "roundtrip mismatch in {} block(s)",
                    report.mismatched.len()
                ));
            }
            Ok(())
        }
        Command::Snapshot(cmd) => {
            let store = FsSnapshotStore::new(&cfg.snapshot_dir);
            match cmd {
                SnapshotCommand::Save { client, kind, html } => {
                    let body = std::fs::read_to_string(&html)
                        .with_context(|| format!("read html: {}", html.display()))?;
                    let snap = store.upsert(&client, kind, &body)?;
                    info!(client = %snap.client_id, %kind, updated_at = %snap.updated_at, "snapshot saved");
                    Ok(())
                }
                SnapshotCommand::Show { client, kind } => {
                    let snap = store
                        .load(&client, kind)?
                        .ok_or_else(|| anyhow!("no {kind} snapshot for client {client}"))?;
                    println!("{}", snap.html);
                    Ok(())
                }
            }
        }
    }
}

fn engine_for(
    cfg: &ResolvedConfig,
    template: Option<&Path>,
) -> anyhow::Result<DocumentEngine<DirTemplateLoader>> {
    let loader = match template {
        Some(p) => DirTemplateLoader::new(p, p),
        None => cfg.template_loader(),
    };
    Ok(DocumentEngine::with_delimiter(loader, &cfg.delimiter)?)
}

fn read_source(cfg: &ResolvedConfig, source: &SourceArgs) -> anyhow::Result<Vec<u8>> {
    let path = match source.input.as_ref() {
        Some(p) => p.clone(),
        None => cfg.template_loader().path(source.kind).to_path_buf(),
    };
    std::fs::read(&path).with_context(|| format!("read docx: {}", path.display()))
}

/// Replacement map from `--request` and/or `--replacements`, plus the company
/// name when a request was given.
fn load_values(
    cfg: &ResolvedConfig,
    values: &ValueArgs,
) -> anyhow::Result<(ReplacementMap, Option<String>)> {
    if values.request.is_none() && values.replacements.is_none() {
        return Err(anyhow!("need --request and/or --replacements"));
    }

    let mut map = ReplacementMap::new();
    let mut company = None;
    if let Some(p) = values.request.as_ref() {
        let req: EngagementRequest = serde_json::from_value(read_json(p)?)
            .with_context(|| format!("parse request: {}", p.display()))?;
        if req.company_name.trim().is_empty() {
            warn!("request has no companyName");
        }
        let today = chrono::Local::now().date_naive();
        map = build_replacements(&req, &cfg.provider, &cfg.slots, today);
        company = Some(req.company_name);
    }
    if let Some(p) = values.replacements.as_ref() {
        let raw = ReplacementMap::from_json(&read_json(p)?)
            .with_context(|| format!("parse replacements: {}", p.display()))?;
        map.extend(raw);
    }
    Ok((map, company))
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read json: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse json: {}", path.display()))
}

fn write_text(path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match path {
        Some(p) => {
            std::fs::write(p, text).with_context(|| format!("write: {}", p.display()))?;
            info!(output = %p.display(), "written");
        }
        None => println!("{text}"),
    }
    Ok(())
}
