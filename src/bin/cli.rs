// image-downloader-core - download-and-persist engine for mobile hosts
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use image_downloader_core::download::HttpTransferEngine;
use image_downloader_core::permission::StaticAuthority;
use image_downloader_core::storage::LocalMediaCatalog;
use image_downloader_core::viewer::SystemViewer;
use image_downloader_core::{
    DownloadImageArgs, DownloaderConfig, FindArgs, HostContext, ImageDownloader, OpenArgs,
    ProgressUpdate,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "image-downloader-cli")]
#[command(about = "Image downloader CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Base directory for shared storage, private storage and databases
    #[arg(short, long, default_value = ".image-downloader")]
    root: PathBuf,

    /// JSON configuration file; overrides --root
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emulated platform API level
    #[arg(long)]
    sdk: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file and print its id
    Download {
        url: String,

        /// Save to app-private storage instead of shared storage
        #[arg(long)]
        private: bool,

        /// Target directory, e.g. DIRECTORY_PICTURES
        #[arg(short, long)]
        directory: Option<String>,

        /// Fixed file name
        #[arg(short, long)]
        name: Option<String>,

        /// MIME type to record instead of the sniffed one
        #[arg(short, long)]
        mime_type: Option<String>,

        /// Request header as KEY:VALUE, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
    /// Print the absolute path of a downloaded file
    FindPath(FindCommand),
    /// Print the display name of a downloaded file
    FindName(FindCommand),
    /// Print the size in bytes of a downloaded file
    FindByteSize(FindCommand),
    /// Print the MIME type of a downloaded file
    FindMimeType(FindCommand),
    /// Open a file in the system viewer
    Open {
        path: String,
    },
}

#[derive(Args)]
struct FindCommand {
    id: String,

    /// Look in the private index
    #[arg(long)]
    private: bool,

    /// Look in the video collection
    #[arg(long)]
    video: bool,
}

impl FindCommand {
    fn into_args(self) -> FindArgs {
        FindArgs {
            id: Some(self.id),
            is_video: Some(self.video),
            in_public_dir: Some(!self.private),
        }
    }
}

fn parse_headers(headers: Vec<String>) -> anyhow::Result<HashMap<String, String>> {
    headers
        .into_iter()
        .map(|header| match header.split_once(':') {
            Some((key, value)) => Ok((key.trim().to_string(), value.trim().to_string())),
            None => bail!("header must look like KEY:VALUE, got {:?}", header),
        })
        .collect()
}

async fn load_config(cli: &Cli) -> anyhow::Result<DownloaderConfig> {
    let mut config = match &cli.config {
        Some(path) => DownloaderConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let root = if cli.root.is_absolute() {
                cli.root.clone()
            } else {
                std::env::current_dir()?.join(&cli.root)
            };
            DownloaderConfig::for_base_dir(root)
        }
    };

    if let Some(sdk) = cli.sdk {
        config.sdk_version = sdk;
    }
    Ok(config)
}

fn print_field<T: std::fmt::Display>(value: Option<T>) {
    match value {
        Some(value) => println!("{}", value),
        None => println!("(not found)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli).await?;

    let catalog = LocalMediaCatalog::open(&config.catalog_path, config.public_root.clone())
        .await
        .context("opening media catalog")?;

    let context = HostContext::new(
        config.clone(),
        Arc::new(HttpTransferEngine::new(config.progress_interval())),
        Arc::new(catalog),
        Arc::new(StaticAuthority::granting()),
        Arc::new(SystemViewer),
    );

    let downloader = ImageDownloader::new();
    downloader.attach(context).await.context("attaching downloader")?;

    let result = run(&downloader, cli.command).await;
    downloader.detach();
    result
}

async fn run(downloader: &ImageDownloader, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Download {
            url,
            private,
            directory,
            name,
            mime_type,
            headers,
        } => {
            let args = DownloadImageArgs {
                url: Some(url),
                headers: Some(parse_headers(headers)?),
                mime_type,
                in_public_dir: Some(!private),
                directory,
                sub_directory: name,
            };

            let progress = Arc::new(|update: ProgressUpdate| {
                eprint!("\r{}: {:>3}%", update.id, update.progress);
                let _ = std::io::stderr().flush();
            });

            let id = downloader.download_image(args, progress).await?;
            eprintln!();
            match id {
                Some(id) => println!("{}", id),
                None => bail!("storage permission denied"),
            }
        }
        Commands::FindPath(find) => print_field(downloader.find_path(find.into_args()).await?),
        Commands::FindName(find) => print_field(downloader.find_name(find.into_args()).await?),
        Commands::FindByteSize(find) => {
            print_field(downloader.find_byte_size(find.into_args()).await?)
        }
        Commands::FindMimeType(find) => {
            print_field(downloader.find_mime_type(find.into_args()).await?)
        }
        Commands::Open { path } => downloader.open(OpenArgs { path: Some(path) })?,
    }

    Ok(())
}
