mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use shelf_core::config::Config;
use shelf_core::format;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults by verbosity.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "shelf=trace,shelf_server=trace,shelf_db=debug,shelf_core=debug,tower_http=debug"
                .to_string()
        } else {
            "shelf=debug,shelf_server=debug,shelf_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            config.server.host = host;
            config.server.port = port;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(shelf_server::start(config))?;
            Ok(())
        }
        Commands::Ingest { file, name, mime } => {
            let config = Config::load_or_default(cli.config.as_deref());
            ingest_file(&config, &file, name, mime)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("shelf {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn ingest_file(
    config: &Config,
    file: &std::path::Path,
    name: Option<String>,
    mime: Option<String>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file does not exist: {:?}", file);
    }

    let name = name.or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
    });
    let mime = mime.unwrap_or_else(|| {
        file.extension()
            .map(|e| format::mime_for_extension(&e.to_string_lossy()))
            .unwrap_or(format::OCTET_STREAM)
            .to_string()
    });

    std::fs::create_dir_all(&config.server.assetstore)?;
    let pool = shelf_db::init_pool(&config.server.db_path.to_string_lossy())?;
    let conn = shelf_db::get_conn(&pool)?;

    let stored = shelf_db::assetstore::store(&config.server.assetstore, file)?;
    let bitstream = shelf_db::queries::bitstreams::create_bitstream(
        &conn,
        name.as_deref(),
        stored.size_bytes,
        &stored.checksum,
        "SHA-256",
        &mime,
        &stored.internal_id,
    )?;

    println!("Ingested {}", file.display());
    println!("  id:       {}", bitstream.id);
    println!("  size:     {} bytes", bitstream.size_bytes);
    println!("  mime:     {}", bitstream.mime_type);
    println!("  checksum: {}", bitstream.checksum);
    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Database: {}", config.server.db_path.display());
            println!("  Assetstore: {}", config.server.assetstore.display());
            println!("  Buffer size: {} bytes", config.delivery.buffer_size);
            for warning in config.validate() {
                println!("  Warning: {warning}");
            }
        }
        None => {
            println!("No config file specified, using defaults");
            let config = Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
