use clap::{Args, Parser, Subcommand};
use hgbase::container::{BlockCodec, Layout};
use hgbase::document::{to_pretty_json, Document};
use hgbase::header::Header;
use hgbase::keymap::{looks_plain, FileMappingProvider, KeyMapping, MappingProvider};
use hgbase::locator::{BaseFilter, BaseSchema, BaseSummary};
use hgbase::{pipeline, scan, Session};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hgbase", about = "Decode, inspect and edit .hg save containers")]
struct Cli {
    /// More log output (-v debug, -vv trace).  RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    input: PathBuf,
    /// Container layout: framed (header + blocks) or bare (blocks only)
    #[arg(long, default_value = "framed")]
    layout: Layout,
}

#[derive(Args)]
#[group(id = "BaseArgs")]
struct Bases {
    /// MBINCompiler mapping.json
    #[arg(short, long)]
    mapping: PathBuf,
    /// ship, planet or either
    #[arg(short, long, default_value = "either")]
    kind: BaseFilter,
    /// JSON file overriding where bases live and how they are tagged
    #[arg(long)]
    schema: Option<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Selector {
    /// Select the base with this name
    #[arg(long)]
    name: Option<String>,
    /// Select the n-th matching base, as numbered by `bases`
    #[arg(long)]
    index: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompress a container to JSON
    Decode {
        #[command(flatten)]
        source: Source,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Rename keys through this mapping.json
        #[arg(short, long, conflicts_with = "no_map")]
        mapping: Option<PathBuf>,
        /// Write the decoded stream untouched
        #[arg(long)]
        no_map: bool,
        /// Indent the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Compress JSON into a container
    Encode {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Obfuscate plain keys through this mapping.json
        #[arg(short, long)]
        mapping: Option<PathBuf>,
        /// Copy header metadata and terminator from an existing container
        #[arg(short, long)]
        template: Option<PathBuf>,
        #[arg(long, default_value = "framed")]
        layout: Layout,
        /// Maximum uncompressed block size in KiB, 1 to 512
        #[arg(long, default_value = "512", value_parser = clap::value_parser!(u32).range(1..=512))]
        block_size: u32,
    },
    /// Show header, block table and stream fingerprint
    Info {
        #[command(flatten)]
        source: Source,
    },
    /// Grade every block without failing on damage
    Scan {
        #[command(flatten)]
        source: Source,
        /// Write the payloads of all healthy blocks here
        #[arg(long)]
        salvage: Option<PathBuf>,
    },
    /// List bases
    Bases {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        bases: Bases,
    },
    /// Write one base as pretty JSON
    ExportBase {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        bases: Bases,
        #[command(flatten)]
        select: Selector,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write every matching base as one JSON array
    ExportBases {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        bases: Bases,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also write the overview rows (name, kind, owner, mode, ...) as JSON
        #[arg(long)]
        overview: Option<PathBuf>,
    },
    /// Append a base read from a JSON file
    AddBase {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        bases: Bases,
        /// Base JSON to add
        #[arg(long)]
        from: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Copy the existing output file to <output>.bak before writing
        #[arg(long)]
        backup: bool,
    },
    /// Delete one base
    RemoveBase {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        bases: Bases,
        #[command(flatten)]
        select: Selector,
        #[arg(short, long)]
        output: PathBuf,
        /// Copy the existing output file to <output>.bak before writing
        #[arg(long)]
        backup: bool,
    },
    /// Replace one base with the contents of a JSON file
    ReplaceBase {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        bases: Bases,
        #[command(flatten)]
        select: Selector,
        /// Replacement base JSON
        #[arg(long = "with")]
        replacement: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Copy the existing output file to <output>.bak before writing
        #[arg(long)]
        backup: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {

        // ── Decode ───────────────────────────────────────────────────────────
        Commands::Decode { source, output, mapping, no_map, pretty } => {
            let raw = std::fs::read(&source.input)?;
            let codec = BlockCodec::new(source.layout);
            let text = if no_map {
                let mut stream = codec.decode(&raw)?.stream;
                let end = stream.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                stream.truncate(end);
                stream
            } else {
                decode_json(&raw, &codec, mapping.as_deref(), pretty)?
            };
            emit(output.as_deref(), &text)?;
        }

        // ── Encode ───────────────────────────────────────────────────────────
        Commands::Encode { input, output, mapping, template, layout, block_size } => {
            let codec = BlockCodec::new(layout).with_block_size_limit(block_size as usize * 1024);
            let mut document = Document::parse(&std::fs::read(&input)?)?;

            let mut header = match layout {
                Layout::Framed => Some(Header::default()),
                Layout::Bare   => None,
            };
            if let Some(path) = template {
                let original = codec.decode(&std::fs::read(&path)?)?;
                header = original.header;
                document.trailing_nuls = Document::parse(&original.stream)?.trailing_nuls;
            }

            let raw = match mapping {
                Some(path) if looks_plain(&document.tree) => {
                    let mapping = load_mapping(&path)?;
                    pipeline::encode_save(header.as_ref(), &document, &codec, &*mapping)?
                }
                other => {
                    if other.is_some() {
                        warn!("input already carries obfuscated keys; mapping not applied");
                    }
                    codec.encode(header.as_ref(), &document.to_stream()?)?
                }
            };
            write_atomic(&output, &raw)?;
            println!("Encoded {} byte(s) → {}", raw.len(), output.display());
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { source } => {
            let raw = std::fs::read(&source.input)?;
            let decoded = BlockCodec::new(source.layout).decode(&raw)?;

            println!("── .hg container ────────────────────────────────────────");
            println!("  Path           {}", source.input.display());
            println!("  Layout         {}", source.layout);
            if let Some(h) = &decoded.header {
                println!("  Version word   {:#010x}", h.version_word());
                println!("  Metadata       {}", hex::encode(h.metadata));
            }
            println!("  Size           {} B", raw.len());
            println!("  Stream         {} B", decoded.stream.len());
            println!("  Fingerprint    {}", blake3::hash(&decoded.stream).to_hex());
            println!("  Blocks         {}", decoded.blocks.len());
            println!("    {:>10} {:>12} {:>12}", "Offset", "Compressed", "Plain");
            for b in &decoded.blocks {
                println!("    {:>10} {:>12} {:>12}", b.offset, b.compressed_size, b.uncompressed_size);
            }
        }

        // ── Scan ─────────────────────────────────────────────────────────────
        Commands::Scan { source, salvage } => {
            let raw = std::fs::read(&source.input)?;
            let (stream, report) = scan::salvage(&raw, source.layout);
            if let Some(err) = &report.header_error {
                println!("Header unreadable: {err}");
            }
            for b in &report.blocks {
                println!("  @{:<10} c={:<8} u={:<8} {:?}",
                    b.offset, b.header.compressed_size, b.header.uncompressed_size, b.health);
            }
            println!("{}", report.summary());
            if let Some(path) = salvage {
                write_atomic(&path, &stream)?;
                println!("Salvaged {} byte(s) → {}", stream.len(), path.display());
            }
        }

        // ── Bases ────────────────────────────────────────────────────────────
        Commands::Bases { source, bases } => {
            let session = open_session(&source, &bases)?;
            let rows = session.summaries(bases.kind)?;
            if rows.is_empty() {
                println!("No {} bases found.", bases.kind);
            }
            print_table(&rows);
        }

        Commands::ExportBases { source, bases, output, overview } => {
            let session = open_session(&source, &bases)?;
            emit(output.as_deref(), session.export_bases(bases.kind)?.as_bytes())?;
            if let Some(path) = overview {
                let rows = session.summaries(bases.kind)?;
                write_atomic(&path, to_pretty_json(&serde_json::to_value(&rows)?)?.as_bytes())?;
                eprintln!("Overview of {} base(s) → {}", rows.len(), path.display());
            }
        }

        // ── Export ───────────────────────────────────────────────────────────
        Commands::ExportBase { source, bases, select, output } => {
            let mut session = open_session(&source, &bases)?;
            choose(&mut session, bases.kind, &select)?;
            let text = session.export_selected()?;
            emit(output.as_deref(), text.as_bytes())?;
        }

        // ── Replace ──────────────────────────────────────────────────────────
        Commands::ReplaceBase { source, bases, select, replacement, output, backup } => {
            let mut session = open_session(&source, &bases)?;
            let handle = choose(&mut session, bases.kind, &select)?;
            session.edit_json(&std::fs::read_to_string(&replacement)?)?;
            session.inject()?;
            session.save_with(commit_to(&output, backup))?;
            println!("Replaced {} base '{}' → {}", handle.kind, handle.name, output.display());
        }

        // ── Add / remove ─────────────────────────────────────────────────────
        Commands::AddBase { source, bases, from, output, backup } => {
            let mut session = open_session(&source, &bases)?;
            let base = serde_json::from_slice(&std::fs::read(&from)?)?;
            let path = session.add_base(base)?;
            session.save_with(commit_to(&output, backup))?;
            println!("Added base at {path} → {}", output.display());
        }

        Commands::RemoveBase { source, bases, select, output, backup } => {
            let mut session = open_session(&source, &bases)?;
            let handle = choose(&mut session, bases.kind, &select)?;
            session.remove_selected()?;
            session.save_with(commit_to(&output, backup))?;
            println!("Removed {} base '{}' → {}", handle.kind, handle.name, output.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_mapping(path: &Path) -> hgbase::Result<Arc<KeyMapping>> {
    FileMappingProvider::new(path).load().map(Arc::new)
}

fn load_schema(path: Option<&Path>) -> hgbase::Result<BaseSchema> {
    match path {
        Some(p) => Ok(serde_json::from_slice(&std::fs::read(p)?)?),
        None => Ok(BaseSchema::default()),
    }
}

fn open_session(source: &Source, bases: &Bases) -> hgbase::Result<Session> {
    let mut session = Session::new(BlockCodec::new(source.layout))
        .with_schema(load_schema(bases.schema.as_deref())?);
    session.load(std::fs::read(&source.input)?);
    let unmapped = session.decode(load_mapping(&bases.mapping)?)?;
    if !unmapped.is_empty() {
        eprintln!("{} key(s) had no mapping and were kept as-is", unmapped.len());
    }
    Ok(session)
}

/// Decoded stream as JSON text, keys renamed through `mapping` when given.
fn decode_json(raw: &[u8], codec: &BlockCodec, mapping: Option<&Path>, pretty: bool) -> hgbase::Result<Vec<u8>> {
    let tree = match mapping {
        Some(path) => {
            let mapping = load_mapping(path)?;
            let decoded = pipeline::decode_save(raw, codec, &*mapping)?;
            if !decoded.unmapped.is_empty() {
                eprintln!("{} key(s) had no mapping and were kept as-is", decoded.unmapped.len());
            }
            decoded.document.tree
        }
        None => Document::parse(&codec.decode(raw)?.stream)?.tree,
    };
    if pretty {
        Ok(to_pretty_json(&tree)?.into_bytes())
    } else {
        Ok(serde_json::to_vec(&tree)?)
    }
}

fn print_table(rows: &[BaseSummary]) {
    println!("{:>3}  {:<28} {:<7} {:<20} {:<18} {:<12} {:<12} {:>7}",
             "#", "Name", "Kind", "Owner", "UID", "Mode", "Difficulty", "Objects");
    for r in rows {
        println!("{:>3}  {:<28} {:<7} {:<20} {:<18} {:<12} {:<12} {:>7}",
            r.index, r.name, r.kind, r.owner, r.owner_uid, r.game_mode, r.difficulty, r.objects);
    }
}

fn choose(session: &mut Session, kind: BaseFilter, select: &Selector) -> hgbase::Result<hgbase::BaseHandle> {
    let handle = match (&select.name, select.index) {
        (Some(name), _) => session.select(kind, name)?,
        (None, Some(n)) => session.select_nth(kind, n)?,
        (None, None)    => return Err(hgbase::Error::NoSelection),
    };
    Ok(handle.clone())
}

fn emit(output: Option<&Path>, bytes: &[u8]) -> std::io::Result<()> {
    match output {
        Some(path) => write_atomic(path, bytes),
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(bytes)?;
            out.write_all(b"\n")
        }
    }
}

/// Commit hook for [`Session::save_with`]: optional `.bak` copy of the old
/// output, then an atomic write.
fn commit_to(output: &Path, backup: bool) -> impl FnOnce(&[u8]) -> hgbase::Result<()> + '_ {
    move |bytes| {
        if backup && output.exists() {
            let mut bak = output.as_os_str().to_owned();
            bak.push(".bak");
            std::fs::copy(output, &bak)?;
        }
        write_atomic(output, bytes)?;
        Ok(())
    }
}

/// Write to `<path>.tmp`, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
