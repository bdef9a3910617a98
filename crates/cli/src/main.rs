mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use binstore_backend::LocalFsBackend;
use binstore_protocol::{ReadResult, parse_range_header};
use binstore_store::metrics::InMemoryMetrics;
use binstore_store::{BinaryStore, NewFile, ReadEvent};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "binstore", version)]
#[command(about = "Chunked binary object store")]
struct Cli {
    /// Config file (default: ~/.config/binstore/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Store directory, overrides `dataDir`
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Keyspace, overrides the config file
    #[arg(long, global = true)]
    keyspace: Option<String>,
    /// Print backend call metrics to stderr when done
    #[arg(long, global = true)]
    stats: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file, or stdin when PATH is "-"
    Put {
        path: PathBuf,
        /// File id (random when omitted)
        #[arg(long)]
        id: Option<Uuid>,
        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<u32>,
        /// File name (defaults to the file name of PATH)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        /// Metadata entry, repeatable
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,
    },
    /// Print a file record as JSON
    Info { id: Uuid },
    /// Stream a file, or a byte range of it
    Get {
        id: Uuid,
        /// HTTP style range, e.g. "bytes=0-1023" or "bytes=4096-"
        #[arg(long)]
        range: Option<String>,
        /// Output file (default: stdout)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Dump one raw chunk
    Chunk {
        id: Uuid,
        num: u32,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = CliConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir.clone() {
        cfg.data_dir = dir;
    }
    if let Some(keyspace) = cli.keyspace.clone() {
        cfg.store.keyspace = keyspace;
    }
    cfg.store.validate()?;

    if let Commands::Config { write } = cli.command {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        if write {
            let path = cfg.save(cli.config.as_deref())?;
            tracing::info!(path = %path.display(), "configuration written");
        }
        return Ok(());
    }

    let metrics = Arc::new(InMemoryMetrics::new());
    let store = BinaryStore::with_metrics(
        Arc::new(LocalFsBackend::new(&cfg.data_dir)),
        cfg.store.clone(),
        metrics.clone(),
    );

    let result = run(&store, cli.command).await;

    if cli.stats {
        eprintln!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    }
    result
}

async fn run(store: &BinaryStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Put {
            path,
            id,
            chunk_size,
            name,
            content_type,
            metadata,
        } => {
            let mut new = NewFile::new(id.unwrap_or_else(Uuid::new_v4))
                .with_chunk_size(chunk_size.unwrap_or(0));
            let name = name.or_else(|| {
                path.file_name()
                    .filter(|_| path != Path::new("-"))
                    .map(|n| n.to_string_lossy().into_owned())
            });
            if let Some(name) = name {
                new = new.with_file_name(name);
            }
            if let Some(content_type) = content_type {
                new = new.with_content_type(content_type);
            }
            for (key, value) in metadata {
                new = new.with_metadata(key, value);
            }

            let source = open_input(&path).await?;
            let file = store.write_file(new, source).await?;
            println!("{}", file.id);
        }
        Commands::Info { id } => {
            let file = store
                .load_file(id)
                .await?
                .ok_or_else(|| anyhow!("file {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&file)?);
        }
        Commands::Get { id, range, out } => {
            let mut reader = match range {
                Some(header) => store.read_range(id, parse_range_header(&header)?),
                None => store.read(id),
            };
            let mut sink = open_output(out.as_deref()).await?;
            let mut failure = None;

            while let Some(event) = reader.next_event().await {
                match event {
                    ReadEvent::File(info) => {
                        tracing::debug!(
                            file_id = %info.file.id,
                            bytes = info.content_length(),
                            content_range = ?info.content_range_header(),
                            "streaming"
                        );
                    }
                    ReadEvent::Data(bytes) => sink.write_all(&bytes).await?,
                    ReadEvent::Error(e) => failure = Some(e),
                    ReadEvent::End(ReadResult::Ok) => break,
                    ReadEvent::End(ReadResult::NotFound) => bail!("file {id} not found"),
                    ReadEvent::End(ReadResult::Error) => {
                        return Err(failure
                            .map(anyhow::Error::from)
                            .unwrap_or_else(|| anyhow!("read of {id} failed")));
                    }
                }
            }
            sink.flush().await?;
        }
        Commands::Chunk { id, num, out } => {
            let chunk = store
                .load_chunk(id, num)
                .await?
                .ok_or_else(|| anyhow!("chunk {num} of file {id} not found"))?;
            let mut sink = open_output(out.as_deref()).await?;
            sink.write_all(&chunk.data).await?;
            sink.flush().await?;
        }
        Commands::Config { .. } => {}
    }
    Ok(())
}

async fn open_input(path: &Path) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
    if path == Path::new("-") {
        return Ok(Box::new(tokio::io::stdin()));
    }
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    Ok(Box::new(file))
}

async fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("cannot create {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}
