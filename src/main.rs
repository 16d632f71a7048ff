use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use rowmap::codec::{CellCodec, CodecError};
use rowmap::config::{Config, LogFormat, LoggingConfig};
use rowmap::row::{FieldMeta, Row, RowSchema, RowSink, RowSource, RowStreamReader, RowStreamWriter};
use rowmap::step::{FoldConfig, FoldOperator, StepOutcome, StopFlag, UnfoldConfig, UnfoldOperator};
use rowmap::value::{TypeRegistry, Value, ValueMeta, text};
use tracing::warn;

/// How rows and cells are printed.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// `field=value` pairs, one row per line.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Parser)]
#[command(name = "rowmap")]
#[command(about = "Fold rows into typed maps and unfold them back, with a binary row stream")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "ROWMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overrides the configuration file (e.g. "debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a textual map ({k=v,...}) and write it as a binary cell
    Parse {
        /// Map text
        text: String,

        /// Output file for the binary cell
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decode a binary map cell and print it
    Render {
        /// Input file containing one binary cell
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Fold delimited text rows (header line first) into a single map row
    Fold {
        /// Delimited text input, comma separated, `"` quoted
        #[arg(short, long)]
        input: PathBuf,

        /// Output row stream
        #[arg(short, long)]
        output: PathBuf,

        /// Field providing map keys
        #[arg(long)]
        key_field: Option<String>,

        /// Field providing map values
        #[arg(long)]
        value_field: Option<String>,

        /// Name of the output map field
        #[arg(long)]
        map_field: Option<String>,
    },

    /// Expand the map field of a row stream into one row per entry
    Unfold {
        /// Input row stream
        #[arg(short, long)]
        input: PathBuf,

        /// Output row stream (rows are printed if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Field holding the map
        #[arg(long)]
        map_field: Option<String>,

        /// Output field for entry keys
        #[arg(long)]
        key_field: Option<String>,

        /// Output field for entry values
        #[arg(long)]
        value_field: Option<String>,

        /// Keep the map field in output rows
        #[arg(long)]
        keep_map_field: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the schema and rows of a row stream
    Dump {
        /// Input row stream
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// An explicit `--log-level` wins over `RUST_LOG`, which wins over the file.
fn init_logging(config: &LoggingConfig, level: Option<&str>) -> anyhow::Result<()> {
    let filter = match (level, EnvFilter::try_from_default_env()) {
        (None, Ok(filter)) => filter,
        (level, _) => {
            let level = level.unwrap_or(&config.level);
            EnvFilter::try_new(level).with_context(|| format!("invalid log filter '{}'", level))?
        }
    };
    let registry = tracing_subscriber::registry().with(filter);
    let layer = fmt::layer().with_writer(io::stderr).with_target(false);
    let result = match (config.format, config.timestamps) {
        (LogFormat::Text, true) => registry.with(layer).try_init(),
        (LogFormat::Text, false) => registry.with(layer.without_time()).try_init(),
        (LogFormat::Json, true) => registry.with(layer.json()).try_init(),
        (LogFormat::Json, false) => registry.with(layer.json().without_time()).try_init(),
    };
    result.context("failed to install log subscriber")
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn required(flag: Option<String>, configured: Option<&String>, name: &str) -> anyhow::Result<String> {
    match flag.or_else(|| configured.cloned()) {
        Some(value) => Ok(value),
        None => bail!("--{} is required (or set it in the configuration file)", name),
    }
}

/// Rows read from CSV. The header record names the fields; every field
/// is a string.
struct CsvRowSource<R> {
    reader: csv::Reader<R>,
    record: csv::StringRecord,
    schema: Arc<RowSchema>,
}

impl<R: Read> CsvRowSource<R> {
    fn new(input: R) -> Result<Self, CodecError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
        let schema: RowSchema = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|name| FieldMeta::new(name, ValueMeta::string()))
            .collect();
        Ok(Self {
            reader,
            record: csv::StringRecord::new(),
            schema: Arc::new(schema),
        })
    }
}

fn csv_error(err: csv::Error) -> CodecError {
    let position = err.position().map(|p| p.line());
    let message = err.to_string();
    match (err.into_kind(), position) {
        (csv::ErrorKind::Io(e), _) => CodecError::Io(e),
        (_, Some(line)) => CodecError::Corrupt(format!("CSV line {}: {}", line, message)),
        (_, None) => CodecError::Corrupt(format!("CSV: {}", message)),
    }
}

impl<R: Read> RowSource for CsvRowSource<R> {
    fn next_row(&mut self) -> Result<Option<Row>, CodecError> {
        if !self.reader.read_record(&mut self.record).map_err(csv_error)? {
            return Ok(None);
        }
        let values = self.record.iter().map(Value::from).collect();
        Row::new(Arc::clone(&self.schema), values)
            .map(Some)
            .map_err(|e| CodecError::Corrupt(e.to_string()))
    }
}

/// Route SIGINT and SIGTERM to `stop`. Operators finish the row in hand and
/// return; a second signal exits immediately.
fn install_stop_handler(stop: &StopFlag) -> anyhow::Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to install signal handlers")?;
    let stop = stop.clone();
    thread::spawn(move || {
        if let Some(code) = watch_signals(signals.forever(), &stop) {
            std::process::exit(code);
        }
    });
    Ok(())
}

/// Sets `stop` on the first signal. Returns the exit code on the second.
fn watch_signals(signals: impl IntoIterator<Item = i32>, stop: &StopFlag) -> Option<i32> {
    for signal in signals {
        if stop.is_stopped() {
            return Some(128 + signal);
        }
        warn!(signal, "stop requested");
        stop.request_stop();
    }
    None
}

/// Prints every emitted row to stdout.
struct PrintSink {
    format: OutputFormat,
}

impl RowSink for PrintSink {
    fn emit(&mut self, row: Row) -> Result<(), CodecError> {
        let line = match self.format {
            OutputFormat::Text => row_to_text(&row),
            OutputFormat::Json => row_to_json(&row).to_string(),
        };
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        io::stdout().flush()?;
        Ok(())
    }
}

fn row_to_text(row: &Row) -> String {
    row.schema()
        .iter()
        .zip(row.values())
        .map(|(field, value)| {
            let text = match field.meta.get_string(value) {
                Ok(Some(text)) => text,
                Ok(None) => "null".to_string(),
                Err(e) => format!("<{}>", e),
            };
            format!("{}={}", field.name, text)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn row_to_json(row: &Row) -> serde_json::Value {
    let object = row
        .schema()
        .iter()
        .zip(row.values())
        .map(|(field, value)| (field.name.clone(), cell_to_json(&field.meta, value)))
        .collect();
    serde_json::Value::Object(object)
}

fn cell_to_json(meta: &ValueMeta, value: &Value) -> serde_json::Value {
    match meta.to_native(value) {
        Ok(native) => value_to_json(&native),
        Err(e) => serde_json::Value::String(format!("<{}>", e)),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
        Value::Map(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (k.to_text().unwrap_or_else(|| "null".into()), value_to_json(v)))
                .collect(),
        ),
        other => other.to_text().map_or(Json::Null, Json::String),
    }
}

fn report(outcome: StepOutcome) -> anyhow::Result<()> {
    eprintln!("{}", outcome.summary());
    outcome.into_result()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    init_logging(&config.logging, cli.log_level.as_deref())?;

    let registry = TypeRegistry::with_builtins();
    let stop = StopFlag::new();
    install_stop_handler(&stop)?;

    match cli.command {
        Commands::Parse { text: input, output } => {
            let meta = ValueMeta::default_map();
            let value = meta.parse_text(&input)?;
            let bytes = CellCodec::new(&registry).encode(&meta, &value)?;
            let mut out = create(&output)?;
            out.write_all(&bytes)?;
            out.flush()?;
            println!("Wrote map cell to {} ({} bytes)", output.display(), bytes.len());
            Ok(())
        }
        Commands::Render { input, format } => {
            let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let meta = ValueMeta::default_map();
            let value = CellCodec::new(&registry).decode(&meta, &bytes)?;
            match (format, &value) {
                (_, Value::Null) => println!("null"),
                (OutputFormat::Text, Value::Map(map)) => println!("{{{}}}", text::render_map(map)),
                (OutputFormat::Json, _) => println!("{}", value_to_json(&value)),
                (OutputFormat::Text, other) => println!("{}", other.to_text().unwrap_or_default()),
            }
            Ok(())
        }
        Commands::Fold {
            input,
            output,
            key_field,
            value_field,
            map_field,
        } => {
            let configured = config.fold.as_ref();
            let fold_config = FoldConfig {
                key_field: required(key_field, configured.map(|c| &c.key_field), "key-field")?,
                value_field: required(value_field, configured.map(|c| &c.value_field), "value-field")?,
                map_field: required(map_field, configured.map(|c| &c.map_field), "map-field")?,
                feedback_interval: configured.and_then(|c| c.feedback_interval),
            };
            let mut source = CsvRowSource::new(open(&input)?)?;
            let mut sink = RowStreamWriter::new(&registry, create(&output)?);
            let outcome = FoldOperator::new(fold_config).run(&mut source, &mut sink, &stop);
            report(outcome)
        }
        Commands::Unfold {
            input,
            output,
            map_field,
            key_field,
            value_field,
            keep_map_field,
            format,
        } => {
            let configured = config.unfold.as_ref();
            let unfold_config = UnfoldConfig {
                map_field: required(map_field, configured.map(|c| &c.map_field), "map-field")?,
                key_field: required(key_field, configured.map(|c| &c.key_field), "key-field")?,
                value_field: required(value_field, configured.map(|c| &c.value_field), "value-field")?,
                remove_map_field: !keep_map_field
                    && configured.is_none_or(|c| c.remove_map_field),
                feedback_interval: configured.and_then(|c| c.feedback_interval),
            };
            let mut source = RowStreamReader::new(&registry, open(&input)?);
            let mut operator = UnfoldOperator::new(unfold_config);
            let outcome = match output {
                Some(path) => {
                    let mut sink = RowStreamWriter::new(&registry, create(&path)?);
                    operator.run(&mut source, &mut sink, &stop)
                }
                None => operator.run(&mut source, &mut PrintSink { format }, &stop),
            };
            report(outcome)
        }
        Commands::Dump { input, format } => {
            let mut reader = RowStreamReader::new(&registry, open(&input)?);
            match reader.schema()? {
                Some(schema) => eprintln!("schema: {}", schema),
                None => {
                    eprintln!("empty stream");
                    return Ok(());
                }
            }
            let mut sink = PrintSink { format };
            let mut rows = 0u64;
            while !stop.is_stopped() {
                let Some(row) = reader.read_row()? else {
                    break;
                };
                sink.emit(row)?;
                rows += 1;
            }
            sink.finish()?;
            eprintln!("{} rows", rows);
            Ok(())
        }
    }
}
