//! Duty replay command-line tool
//!
//! Inspects replay files, replay libraries and opcode tables.
//!
//! ## Commands
//!
//! - `info` - Display header metadata and pull statistics
//! - `chapters` - List a replay's chapters
//! - `opcodes` - Count the recorded opcodes in a replay
//! - `list` - List every valid replay in a library folder
//! - `compare` - Build the translation map between two protocol versions
//! - `archive` - Move unplayable replays into the library's archive
//!
//! Log output goes to stderr and is controlled with `RUST_LOG`.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use duty_replay::config::EngineConfig;
use duty_replay::header::format_duration_ms;
use duty_replay::library::{LibraryPaths, ReplayLibrary, RetentionPolicy};
use duty_replay::navigation::PullStatistics;
use duty_replay::opcode::{OpcodeRegistry, TranslationWarning};
use duty_replay::{ChapterType, ReplayFile, ReplayHeader};

/// Duty replay inspection tool
#[derive(Parser)]
#[command(name = "replay-tool")]
#[command(about = "Inspect duty replays, replay libraries and opcode tables", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format: json, pretty
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display replay information
    Info {
        /// Path to the replay file
        file: PathBuf,
    },
    /// List chapters
    Chapters {
        /// Path to the replay file
        file: PathBuf,
    },
    /// Count recorded opcodes
    Opcodes {
        /// Path to the replay file
        file: PathBuf,
    },
    /// List a replay library
    List {
        /// Primary replay folder
        directory: PathBuf,
        /// Engine configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Compare two opcode tables
    Compare {
        /// Folder of opcode table documents
        tables: PathBuf,
        /// Recorded protocol version
        old: u16,
        /// Running protocol version
        new: u16,
    },
    /// Archive unplayable replays
    Archive {
        /// Primary replay folder
        directory: PathBuf,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

// ============================================================================
// Serializable Output Structures
// ============================================================================

#[derive(Serialize)]
struct HeaderInfo {
    valid: bool,
    playable: bool,
    locked: bool,
    replay_version: u16,
    patch: u32,
    character_id: String,
    content_id: u16,
    recorded_at: Option<String>,
    duration_ms: u32,
    duration: String,
    party: Vec<u8>,
    recording_job: Option<u8>,
}

impl HeaderInfo {
    fn from_header(header: &ReplayHeader) -> Self {
        HeaderInfo {
            valid: header.is_valid(),
            playable: header.is_playable(),
            locked: header.is_locked(),
            replay_version: header.replay_version,
            patch: header.patch,
            character_id: format!("{:016X}", header.character_id),
            content_id: header.content_id,
            recorded_at: header.recorded_at().map(|t| t.to_rfc3339()),
            duration_ms: header.duration_ms,
            duration: header.duration_string(),
            party: header.party_members().collect(),
            recording_job: header.recording_player_job(),
        }
    }
}

#[derive(Serialize)]
struct InfoOutput {
    file_size: usize,
    header: HeaderInfo,
    chapters: usize,
    segments: usize,
    pulls: usize,
    longest_pull: String,
}

#[derive(Serialize)]
struct ChapterInfo {
    index: usize,
    kind: ChapterType,
    ms: u32,
    time: String,
    offset: u32,
}

#[derive(Serialize)]
struct OpcodeInfo {
    opcode: String,
    count: usize,
    last_payload_len: usize,
}

#[derive(Serialize)]
struct OpcodesOutput {
    total_segments: usize,
    opcodes: Vec<OpcodeInfo>,
}

#[derive(Serialize)]
struct ListEntry {
    path: PathBuf,
    header: HeaderInfo,
    chapters: usize,
    pulls: usize,
}

#[derive(Serialize)]
struct CompareOutput {
    old: u16,
    new: u16,
    mapped: Vec<(String, String)>,
    warnings: Vec<TranslationWarning>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = cli.output;

    match cli.command {
        Commands::Info { file } => cmd_info(&file, output),
        Commands::Chapters { file } => cmd_chapters(&file, output),
        Commands::Opcodes { file } => cmd_opcodes(&file, output),
        Commands::List { directory, config } => cmd_list(&directory, config.as_deref(), output),
        Commands::Compare { tables, old, new } => cmd_compare(&tables, old, new, output),
        Commands::Archive { directory } => cmd_archive(&directory),
    }
}

fn open_replay(file: &Path) -> Option<ReplayFile> {
    match ReplayFile::open(file) {
        Ok(replay) => Some(replay),
        Err(e) => {
            eprintln!("Error reading replay: {e}");
            None
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing to JSON: {e}"),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn cmd_info(file: &Path, output: OutputFormat) -> ExitCode {
    let Some(replay) = open_replay(file) else {
        return ExitCode::FAILURE;
    };

    let header = replay.header();
    let pulls = PullStatistics::compute(replay.chapters(), header.duration_ms);
    let info = InfoOutput {
        file_size: replay.as_bytes().len(),
        header: HeaderInfo::from_header(header),
        chapters: replay.chapters().len(),
        segments: replay.segments().iter().count(),
        pulls: pulls.pulls,
        longest_pull: format_duration_ms(pulls.longest_pull_ms),
    };

    match output {
        OutputFormat::Json => print_json(&info),
        OutputFormat::Pretty => {
            println!("=== Replay Information ===\n");
            println!("File:");
            println!("  Size: {} bytes", info.file_size);
            println!("  Valid: {}", info.header.valid);
            println!("  Playable: {}", info.header.playable);
            println!("  Locked: {}", info.header.locked);
            println!();
            println!("Recording:");
            println!("  Protocol Version: {}", info.header.replay_version);
            println!("  Patch: {}", info.header.patch);
            println!("  Character: {}", info.header.character_id);
            println!("  Content: {}", info.header.content_id);
            if let Some(recorded_at) = &info.header.recorded_at {
                println!("  Recorded: {recorded_at}");
            }
            println!("  Duration: {}", info.header.duration);
            println!("  Party: {:?}", info.header.party);
            println!();
            println!("Playback:");
            println!("  Chapters: {}", info.chapters);
            println!("  Segments: {}", info.segments);
            println!("  Pulls: {}", info.pulls);
            println!("  Longest Pull: {}", info.longest_pull);
        }
    }
    ExitCode::SUCCESS
}

fn cmd_chapters(file: &Path, output: OutputFormat) -> ExitCode {
    let Some(replay) = open_replay(file) else {
        return ExitCode::FAILURE;
    };

    let chapters: Vec<ChapterInfo> = replay
        .chapters()
        .iter()
        .enumerate()
        .map(|(index, chapter)| ChapterInfo {
            index,
            kind: chapter.kind,
            ms: chapter.ms,
            time: format_duration_ms(chapter.ms),
            offset: chapter.offset,
        })
        .collect();

    match output {
        OutputFormat::Json => print_json(&chapters),
        OutputFormat::Pretty => {
            println!("{:>3}  {:<12} {:>9}  {:>10}", "#", "Type", "Time", "Offset");
            for chapter in &chapters {
                println!(
                    "{:>3}  {:<12} {:>9}  {:>#10x}",
                    chapter.index,
                    format!("{:?}", chapter.kind),
                    chapter.time,
                    chapter.offset
                );
            }
        }
    }
    ExitCode::SUCCESS
}

fn cmd_opcodes(file: &Path, output: OutputFormat) -> ExitCode {
    let Some(replay) = open_replay(file) else {
        return ExitCode::FAILURE;
    };

    let stats = replay.segments().opcode_statistics();
    let result = OpcodesOutput {
        total_segments: stats.total_segments,
        opcodes: stats
            .opcodes
            .iter()
            .map(|(opcode, count)| OpcodeInfo {
                opcode: format!("{opcode:#06X}"),
                count: count.count,
                last_payload_len: count.last_payload_len,
            })
            .collect(),
    };

    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Pretty => {
            println!(
                "Opcodes: {} distinct, {} segments",
                result.opcodes.len(),
                result.total_segments
            );
            for info in &result.opcodes {
                println!(
                    "  [{}] {} ({} bytes)",
                    info.opcode, info.count, info.last_payload_len
                );
            }
        }
    }
    ExitCode::SUCCESS
}

fn cmd_list(directory: &Path, config: Option<&Path>, output: OutputFormat) -> ExitCode {
    let config = config.map(EngineConfig::load).unwrap_or_default();
    let library = ReplayLibrary::new(
        LibraryPaths::new(directory),
        RetentionPolicy::from(&config),
    );

    let entries: Vec<ListEntry> = library
        .enumerate()
        .into_iter()
        .map(|entry| ListEntry {
            pulls: PullStatistics::compute(&entry.chapters, entry.header.duration_ms).pulls,
            chapters: entry.chapters.len(),
            header: HeaderInfo::from_header(&entry.header),
            path: entry.path,
        })
        .collect();

    match output {
        OutputFormat::Json => print_json(&entries),
        OutputFormat::Pretty => {
            println!("Found {} replays in {}", entries.len(), directory.display());
            for entry in &entries {
                let name = entry
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let playable = if entry.header.playable { "" } else { " [unplayable]" };
                println!(
                    "  {name}  {}  {} pulls{playable}",
                    entry.header.duration, entry.pulls
                );
            }
        }
    }
    ExitCode::SUCCESS
}

fn cmd_compare(tables: &Path, old: u16, new: u16, output: OutputFormat) -> ExitCode {
    let registry = match OpcodeRegistry::load_dir(tables) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error loading opcode tables: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (map, warnings) = match registry.build_map(old, new) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut mapped: Vec<(u16, u16)> = map.iter().collect();
    mapped.sort_unstable();
    let result = CompareOutput {
        old,
        new,
        mapped: mapped
            .into_iter()
            .map(|(from, to)| (format!("{from:#06X}"), format!("{to:#06X}")))
            .collect(),
        warnings,
    };

    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Pretty => {
            println!("Version {old} -> {new}: {} opcodes mapped", result.mapped.len());
            for (from, to) in &result.mapped {
                println!("  {from} -> {to}");
            }
            if !result.warnings.is_empty() {
                println!("\nWarnings:");
                for warning in &result.warnings {
                    println!("  {warning}");
                }
            }
        }
    }
    ExitCode::SUCCESS
}

fn cmd_archive(directory: &Path) -> ExitCode {
    let library = ReplayLibrary::new(LibraryPaths::new(directory), RetentionPolicy::default());
    match library.archive() {
        Ok(0) => {
            println!("No unplayable replays to archive");
            ExitCode::SUCCESS
        }
        Ok(count) => {
            println!(
                "Archived {count} replays into {}",
                library.paths().archive.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
