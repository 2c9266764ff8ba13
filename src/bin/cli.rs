// ncm-core - NCM container decoder
// Copyright (C) 2025 ncm-core contributors
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


//! ncm-core CLI - desktop testing tool

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use ncm_core::audio::NoopTagWriter;
use ncm_core::file::{convert_file, scan_for_containers, BatchConverter, ConvertConfig};
use ncm_core::{AudioFormat, Metadata, NcmReader};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ncm-core-cli")]
#[command(about = "ncm-core CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header of a container without decoding the audio
    Inspect {
        file: PathBuf,
        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert container files
    Decode {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Convert every container in a directory
    Batch {
        directory: PathBuf,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Concurrent conversions
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Fetch the album cover URL when none is embedded
        #[arg(long)]
        remote_cover: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Naming template, e.g. "{artists} - {title}"
    #[arg(short, long)]
    template: Option<String>,
    /// Replace existing files
    #[arg(long)]
    overwrite: bool,
    /// Write the cover image next to the audio file
    #[arg(long)]
    cover: bool,
    /// Decode through memory instead of streaming
    #[arg(long)]
    whole_file: bool,
}

impl OutputArgs {
    fn apply(&self, config: &mut ConvertConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_directory = Some(dir.clone());
        }
        if let Some(template) = &self.template {
            config.file_naming_template = template.clone();
        }
        config.overwrite |= self.overwrite;
        config.write_cover_file |= self.cover;
        if self.whole_file {
            config.streaming = false;
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ConvertConfig> {
    match path {
        Some(path) => ConvertConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ConvertConfig::default()),
    }
}

fn print_metadata(metadata: &Metadata) {
    let track = metadata.track();
    if let Metadata::DjProgram(program) = metadata {
        println!("Program:  {} ({})", program.program_name, program.dj_name);
        if let Some(created) = program.created_at() {
            println!("Created:  {}", created.to_rfc3339());
        }
    }
    println!("Title:    {}", track.title);
    println!("Artists:  {}", track.artist_names().join(", "));
    println!("Album:    {}", track.album);
    println!("Id:       {}", track.id);
    if track.bitrate > 0 {
        println!("Bitrate:  {} kbps", track.bitrate / 1000);
    }
    if track.duration_ms > 0 {
        let seconds = track.duration_ms / 1000;
        println!("Duration: {}:{:02}", seconds / 60, seconds % 60);
    }
}

fn inspect(file: PathBuf, json: bool) -> anyhow::Result<()> {
    let source = File::open(&file).with_context(|| format!("opening {}", file.display()))?;
    let reader = NcmReader::open(BufReader::new(source))
        .with_context(|| format!("reading {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reader.header().metadata())?);
        return Ok(());
    }

    // Decrypt into a sink to get the payload preview
    let (header, summary) = reader.decode_to(io::sink())?;

    println!("File:     {}", file.display());
    println!("Format:   {}", header.format());
    match header.metadata() {
        Some(metadata) => print_metadata(metadata),
        None => println!("Metadata: none"),
    }
    let cover = header.cover();
    if cover.is_empty() {
        println!("Cover:    none");
    } else {
        println!("Cover:    {} ({} bytes)", cover.mime_type(), cover.len());
    }
    println!("Audio:    {} bytes at offset {}", summary.bytes_written, header.audio_offset());
    let sniffed = AudioFormat::sniff(&summary.header_preview)
        .map(|format| format.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("Preview:  {} (looks like {})", hex::encode(&summary.header_preview), sniffed);
    Ok(())
}

fn decode(files: Vec<PathBuf>, config: ConvertConfig) -> anyhow::Result<()> {
    config.validate()?;
    let mut failed = 0;

    for file in files {
        match convert_file(&file, &config, Some(&NoopTagWriter)) {
            Ok(outcome) => {
                println!(
                    "{} -> {} [{} bytes, header {}]",
                    file.display(),
                    outcome.audio_path.display(),
                    outcome.bytes_written,
                    hex::encode(&outcome.header_preview)
                );
                if let Some(cover) = outcome.cover_path {
                    println!("  cover -> {}", cover.display());
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: {}", file.display(), e.user_message());
            }
        }
    }

    if failed > 0 {
        bail!("{} file(s) failed", failed);
    }
    Ok(())
}

async fn batch(
    directory: PathBuf,
    recursive: bool,
    config: ConvertConfig,
) -> anyhow::Result<()> {
    let inputs = scan_for_containers(&directory, recursive).await?;
    if inputs.is_empty() {
        println!("No containers found in {}", directory.display());
        return Ok(());
    }

    let converter = BatchConverter::new(config)?.with_tag_writer(Arc::new(NoopTagWriter));
    let items = converter.run(inputs).await;

    let mut failed = 0;
    for item in &items {
        match &item.result {
            Ok(outcome) => println!(
                "ok    {} -> {}",
                item.input.display(),
                outcome.audio_path.display()
            ),
            Err(e) => {
                failed += 1;
                println!("FAIL  {}: {}", item.input.display(), e.user_message());
            }
        }
    }
    println!("{} converted, {} failed", items.len() - failed, failed);

    if failed > 0 {
        bail!("{} file(s) failed", failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Inspect { file, json } => inspect(file, json),
        Commands::Decode { files, output } => {
            output.apply(&mut config);
            decode(files, config)
        }
        Commands::Batch {
            directory,
            recursive,
            jobs,
            remote_cover,
            output,
        } => {
            output.apply(&mut config);
            if let Some(jobs) = jobs {
                config.max_concurrent_conversions = jobs;
            }
            config.fetch_remote_cover |= remote_cover;
            batch(directory, recursive, config).await
        }
    }
}
