use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand, ValueEnum};
use symscope_core::{
    Address, DataSource, DebugInfoError, MatchMode, OpenOptions, Result as DebugInfoResult, Session, SymbolId,
    SymbolKind, TypeCategory,
};
use symscope_utils::{debug, init_logging_with, LogFormat, LogLevel, LoggingConfig};

/// Browse PDB and DWARF debug information from the command line.
#[derive(Parser, Debug)]
#[command(name = "symscope")]
#[command(version)]
#[command(about = "Browse PDB and DWARF debug information", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true, value_parser = LogLevel::from_str)]
    log_level: Option<LogLevel>,

    /// Log format (pretty or json); overrides SYMSCOPE_LOG_FORMAT
    #[arg(long, global = true, value_parser = LogFormat::from_str)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the debug information comes from.
#[derive(Args, Debug)]
struct SourceArgs
{
    /// Binary image (PE, ELF, Mach-O) or standalone PDB
    path: PathBuf,

    /// Extra directory to search for debug stores (repeatable)
    #[arg(long = "symbol-path", value_name = "DIR")]
    symbol_paths: Vec<PathBuf>,

    /// Ignore _NT_SYMBOL_PATH and SYMSCOPE_SYMBOL_PATH
    #[arg(long, default_value_t = false)]
    no_env_symbol_path: bool,

    /// Use this debug store instead of searching for one
    #[arg(long, value_name = "FILE")]
    pdb: Option<PathBuf>,
}

impl SourceArgs
{
    fn open(&self) -> DebugInfoResult<DataSource>
    {
        let mut options = OpenOptions::new()
            .with_search_dirs(&self.symbol_paths)
            .use_env_symbol_path(!self.no_env_symbol_path);
        if let Some(store) = &self.pdb {
            options = options.with_debug_store(store);
        }
        DataSource::open_with(&self.path, &options)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode
{
    Exact,
    IgnoreCase,
    Prefix,
    PrefixIgnoreCase,
    Regex,
}

impl From<Mode> for MatchMode
{
    fn from(mode: Mode) -> Self
    {
        match mode {
            Mode::Exact => MatchMode::Exact,
            Mode::IgnoreCase => MatchMode::ExactIgnoreCase,
            Mode::Prefix => MatchMode::Prefix,
            Mode::PrefixIgnoreCase => MatchMode::PrefixIgnoreCase,
            Mode::Regex => MatchMode::Regex,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Show the container format, signature and located debug store
    Info
    {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Find symbols by name
    Find
    {
        #[command(flatten)]
        source: SourceArgs,
        /// Name or pattern to look for
        name: String,
        /// Restrict results to one symbol kind (function, data, udt, ...)
        #[arg(short, long, value_parser = SymbolKind::from_str)]
        kind: Option<SymbolKind>,
        /// How the name is matched
        #[arg(short, long, value_enum, default_value_t = Mode::Exact)]
        mode: Mode,
        /// Print at most this many symbols
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the innermost symbol at an address, with its enclosing scopes
    Addr
    {
        #[command(flatten)]
        source: SourceArgs,
        /// Address (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Restrict the lookup to one symbol kind
        #[arg(short, long, value_parser = SymbolKind::from_str)]
        kind: Option<SymbolKind>,
    },
    /// Show the source line for an address
    Line
    {
        #[command(flatten)]
        source: SourceArgs,
        /// Address (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_address)]
        address: Address,
    },
    /// Show the address ranges generated for a source line
    Lines
    {
        #[command(flatten)]
        source: SourceArgs,
        /// Source file; a trailing part of the recorded path is enough
        file: String,
        /// One-based line number
        line: u32,
    },
    /// Print a type by name
    Type
    {
        #[command(flatten)]
        source: SourceArgs,
        /// Type name
        name: String,
        /// Also list every type reachable from it
        #[arg(long, default_value_t = false)]
        walk: bool,
    },
    /// List the children of a symbol (the global scope by default)
    Children
    {
        #[command(flatten)]
        source: SourceArgs,
        /// Symbol id as printed by other commands (e.g. 42 or #42)
        #[arg(value_parser = parse_symbol_id)]
        id: Option<SymbolId>,
    },
    /// List the image's export table
    Exports
    {
        #[command(flatten)]
        source: SourceArgs,
    },
}

fn main()
{
    let cli = Cli::parse();

    let mut config = match LoggingConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    if let Some(level) = cli.log_level {
        config = config.with_level(level);
    }
    if let Some(format) = cli.log_format {
        config = config.with_format(format);
    }
    let _guard = match init_logging_with(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(exit_code(&e));
    }
}

fn run_command(command: Commands) -> DebugInfoResult<()>
{
    match command {
        Commands::Info { source } => {
            let source = source.open()?;
            print_info(&source)
        }
        Commands::Find {
            source,
            name,
            kind,
            mode,
            limit,
        } => {
            let source = source.open()?;
            let session = source.create_session()?;
            let query = session.find_symbols_by_name(&name, kind, mode.into())?;
            let mut printed = 0;
            for symbol in query.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("{symbol}");
                printed += 1;
            }
            debug!(name = %name, printed, "find finished");
            if printed == 0 {
                println!("No symbols match '{name}'");
            }
            Ok(())
        }
        Commands::Addr { source, address, kind } => {
            let source = source.open()?;
            let session = source.create_session()?;
            let symbol = session.find_symbol_by_address(address, kind)?;
            println!("{symbol}");
            for ancestor in session.symbols().ancestors(symbol.id())? {
                println!("  in {ancestor}");
            }
            match session.resolve_line(address) {
                Ok(line) => println!("  at {line}"),
                Err(DebugInfoError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            Ok(())
        }
        Commands::Line { source, address } => {
            let source = source.open()?;
            let session = source.create_session()?;
            println!("{}", session.resolve_line(address)?);
            Ok(())
        }
        Commands::Lines { source, file, line } => {
            let source = source.open()?;
            let session = source.create_session()?;
            for range in session.resolve_address(&file, line)? {
                println!("{range}");
            }
            Ok(())
        }
        Commands::Type { source, name, walk } => {
            let source = source.open()?;
            let session = source.create_session()?;
            print_type(&session, &name, walk)
        }
        Commands::Children { source, id } => {
            let source = source.open()?;
            let session = source.create_session()?;
            let parent = id.unwrap_or(SymbolId::ROOT);
            println!("{}", session.symbol(parent)?);
            for child in session.symbols().children(parent)?.iter() {
                println!("  {child}");
            }
            Ok(())
        }
        Commands::Exports { source } => {
            let source = source.open()?;
            for export in source.exports() {
                println!("{} {}", export.address, export.name);
            }
            Ok(())
        }
    }
}

fn print_info(source: &DataSource) -> DebugInfoResult<()>
{
    println!("Path:         {}", source.path().display());
    println!("Format:       {}", source.format());
    if let Some(architecture) = source.architecture() {
        println!("Architecture: {architecture}");
    }
    if let Some(signature) = source.signature() {
        println!("Signature:    {signature}");
    }
    match source.debug_store_path() {
        Some(store) => println!("Debug store:  {}", store.display()),
        None if source.has_debug_store() => println!("Debug store:  embedded"),
        None => println!("Debug store:  none"),
    }
    println!("Exports:      {}", source.exports().len());
    if !source.has_debug_store() {
        return Ok(());
    }

    let session = source.create_session()?;
    let store = session.store();
    println!("Records:      {}", store.len());
    println!("Malformed:    {}", store.malformed_count());
    println!("Compilands:   {}", session.symbols().by_kind(SymbolKind::Compiland)?.iter().count());
    println!("Source files: {}", store.files().len());
    for diagnostic in session.diagnostics() {
        println!("  {diagnostic}");
    }
    Ok(())
}

fn print_type(session: &Session, name: &str, walk: bool) -> DebugInfoResult<()>
{
    let types = session.types();
    let candidates: Vec<_> = session
        .find_symbols_by_name(name, None, MatchMode::Exact)?
        .iter()
        .filter(|symbol| symbol.kind().is_type())
        .collect();
    // Prefer a definition over forward declarations of the same name.
    let symbol = candidates
        .iter()
        .find(|symbol| !symbol.is_forward())
        .or_else(|| candidates.first())
        .ok_or_else(|| DebugInfoError::NotFound(format!("no type named '{name}'")))?;

    let ty = types.resolve_type(symbol.id())?;
    match ty.category() {
        TypeCategory::Udt(_) => print!("{}", types.render_udt(ty.id())?),
        TypeCategory::Enum => {
            println!("{} /* 0x{:x} */", types.type_name(ty.id())?, ty.size());
            for enumerator in types.enumerators(ty.id())? {
                println!("    {} = {}", enumerator.name, enumerator.value);
            }
        }
        _ => println!("{} /* 0x{:x} */", types.type_name(ty.id())?, ty.size()),
    }

    if walk {
        for visit in types.walk(ty.id())?.skip(1) {
            println!("{:indent$}{} <- {}", "", types.type_name_of(&visit.ty), visit.edge, indent = visit.depth * 2);
        }
    }
    Ok(())
}

fn parse_address(value: &str) -> Result<Address, String>
{
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('`', ""), 16),
        None => value.parse::<u64>(),
    };
    parsed
        .map(Address::new)
        .map_err(|e| format!("invalid address '{value}': {e}"))
}

fn parse_symbol_id(value: &str) -> Result<SymbolId, String>
{
    let value = value.trim();
    value
        .strip_prefix('#')
        .unwrap_or(value)
        .parse::<u32>()
        .map(SymbolId::new)
        .map_err(|e| format!("invalid symbol id '{value}': {e}"))
}

fn exit_code(error: &DebugInfoError) -> i32
{
    match error {
        DebugInfoError::NotFound(_) => 2,
        DebugInfoError::CorruptStore(_) | DebugInfoError::MalformedRecord { .. } => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_address()
    {
        assert_eq!(parse_address("0x1000").unwrap(), Address::new(0x1000));
        assert_eq!(parse_address("0X00000001`40001000").unwrap(), Address::new(0x1_4000_1000));
        assert_eq!(parse_address("4096").unwrap(), Address::new(4096));
        assert!(parse_address("0xZZ").is_err());
        assert!(parse_address("").is_err());
    }

    #[test]
    fn test_parse_symbol_id()
    {
        assert_eq!(parse_symbol_id("42").unwrap(), SymbolId::new(42));
        assert_eq!(parse_symbol_id("#7").unwrap(), SymbolId::new(7));
        assert!(parse_symbol_id("main").is_err());
    }

    #[test]
    fn test_cli_parses_flags()
    {
        let cli = Cli::try_parse_from([
            "symscope",
            "find",
            "app.exe",
            "Dbg",
            "--mode",
            "prefix-ignore-case",
            "--kind",
            "function",
            "--symbol-path",
            "C:\\symbols",
            "--no-env-symbol-path",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        match cli.command {
            Commands::Find { source, name, kind, mode, .. } => {
                assert_eq!(source.path, PathBuf::from("app.exe"));
                assert_eq!(source.symbol_paths, vec![PathBuf::from("C:\\symbols")]);
                assert!(source.no_env_symbol_path);
                assert_eq!(name, "Dbg");
                assert_eq!(kind, Some(SymbolKind::Function));
                assert_eq!(MatchMode::from(mode), MatchMode::PrefixIgnoreCase);
            }
            other => panic!("Expected find, got {other:?}"),
        }
    }

    #[test]
    fn test_exit_codes()
    {
        assert_eq!(exit_code(&DebugInfoError::NotFound("x".into())), 2);
        assert_eq!(exit_code(&DebugInfoError::CorruptStore("x".into())), 3);
        assert_eq!(exit_code(&DebugInfoError::Format("x".into())), 1);
    }
}
