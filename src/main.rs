use std::path::PathBuf;

use ::tracing::{error, info};
use anyhow::{Result, bail};
use blob_store::Blobs;
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;

mod config;
mod tracing;
use config::BlobHelperConfig;
use tracing::setup_tracing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Write a value given on the command line
    Write {
        key: String,
        data: String,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Print a blob to stdout
    Get { key: String },
    /// Delete a blob
    Del { key: String },
    /// Stream a local file into a blob
    Upload {
        file: PathBuf,
        key: String,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Stream a blob into a local file
    Download { key: String, file: PathBuf },
    /// Check whether a blob exists
    Exists { key: String },
    /// Show blob metadata
    Md { key: String },
    /// List blobs one page at a time
    Enum {
        #[arg(long)]
        token: Option<String>,
        /// Follow continuation tokens to the end of the listing
        #[arg(long)]
        all: bool,
    },
}

async fn run(blobs: &Blobs, command: Command) -> Result<()> {
    match command {
        Command::Write {
            key,
            data,
            content_type,
        } => {
            blobs
                .write(&key, content_type.as_deref(), data.into_bytes())
                .await?;
            println!("wrote {}", key);
        }
        Command::Get { key } => {
            let Some(data) = blobs.get(&key).await? else {
                bail!("blob not found: {}", key);
            };
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&data).await?;
            stdout.flush().await?;
        }
        Command::Del { key } => {
            if blobs.delete(&key).await? {
                println!("deleted {}", key);
            } else {
                println!("not found: {}", key);
            }
        }
        Command::Upload {
            file,
            key,
            content_type,
        } => {
            let source = tokio::fs::File::open(&file).await?;
            let content_length = source.metadata().await?.len();
            blobs
                .write_stream(&key, content_type.as_deref(), content_length, source)
                .await?;
            println!("uploaded {} bytes to {}", content_length, key);
        }
        Command::Download { key, file } => {
            let Some(stream) = blobs.get_stream(&key).await? else {
                bail!("blob not found: {}", key);
            };
            let mut target = tokio::fs::File::create(&file).await?;
            let written = stream.copy_to(&mut target).await?;
            println!("downloaded {} bytes to {}", written, file.display());
        }
        Command::Exists { key } => {
            println!("{}", blobs.exists(&key).await?);
        }
        Command::Md { key } => match blobs.get_metadata(&key).await? {
            Some(md) => println!("{}", md),
            None => bail!("blob not found: {}", key),
        },
        Command::Enum { token, all } => {
            let mut token = token;
            loop {
                let page = blobs.enumerate(token.as_deref()).await?;
                for md in &page.blobs {
                    println!("{}", md);
                }
                if !page.has_more() {
                    break;
                }
                token = page.next_token;
                if !all {
                    if let Some(next) = &token {
                        println!("next token: {}", next);
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match BlobHelperConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = setup_tracing(&config) {
        eprintln!("Error setting up tracing: {:?}", err);
    }

    let blobs = match Blobs::new(config.storage.clone()) {
        Ok(blobs) => blobs,
        Err(err) => {
            error!("Error creating blob client: {}", err);
            std::process::exit(1);
        }
    };
    info!(storage_type = %blobs.storage_type(), "blob client ready");

    if let Err(err) = run(&blobs, cli.command).await {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use blob_store::DiskSettings;

    use super::*;

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from([
            "blobhelper",
            "write",
            "a.txt",
            "hello",
            "--content-type",
            "text/plain",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Write {
                key: "a.txt".to_string(),
                data: "hello".to_string(),
                content_type: Some("text/plain".to_string()),
            }
        );

        let cli = Cli::try_parse_from(["blobhelper", "-c", "cfg.yaml", "enum", "--all"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("cfg.yaml")));
        assert_eq!(
            cli.command,
            Command::Enum {
                token: None,
                all: true
            }
        );

        assert!(Cli::try_parse_from(["blobhelper", "frobnicate"]).is_err());
    }

    #[tokio::test]
    async fn test_upload_download_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Blobs::new(DiskSettings::new(dir.path().join("store")).unwrap()).unwrap();

        let source = dir.path().join("source.bin");
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &data).unwrap();

        run(
            &blobs,
            Command::Upload {
                file: source,
                key: "files/source.bin".to_string(),
                content_type: None,
            },
        )
        .await
        .unwrap();

        let target = dir.path().join("target.bin");
        run(
            &blobs,
            Command::Download {
                key: "files/source.bin".to_string(),
                file: target.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), data);

        run(
            &blobs,
            Command::Enum {
                token: None,
                all: true,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_enum_pages_and_follows_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let settings = DiskSettings::new(dir.path()).unwrap().with_page_size(2);
        let blobs = Blobs::new(settings).unwrap();
        for i in 0..5 {
            blobs.write(&format!("k{}", i), None, "v").await.unwrap();
        }

        run(&blobs, Command::Enum { token: None, all: false })
            .await
            .unwrap();
        run(
            &blobs,
            Command::Enum {
                token: Some("2".to_string()),
                all: true,
            },
        )
        .await
        .unwrap();
        assert!(
            run(
                &blobs,
                Command::Enum {
                    token: Some("not-a-token".to_string()),
                    all: false,
                },
            )
            .await
            .is_err()
        );
    }

    #[tokio::test]
    async fn test_missing_blob_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Blobs::new(DiskSettings::new(dir.path()).unwrap()).unwrap();

        assert!(
            run(
                &blobs,
                Command::Get {
                    key: "missing".to_string()
                }
            )
            .await
            .is_err()
        );
        assert!(
            run(
                &blobs,
                Command::Del {
                    key: "missing".to_string()
                }
            )
            .await
            .is_ok()
        );
    }
}
