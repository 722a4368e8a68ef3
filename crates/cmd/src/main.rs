// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmd::commands::{
    BundleCommands, KeepAwakeArgs, VaultDbCommands, bundle_check_command, bundle_download_command,
    download_command, init_command, keep_awake_command, upload_command,
};
use cmd::common::Services;
use cmd::config::load_config;
use diagnostics::*;
use std::path::PathBuf;
use std::sync::Arc;
use vault::{BundleDescriptor, Digests, VaultDbDescriptor};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "cloudbackup")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "cloudbackup.yaml")]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write an example configuration file
    Init {
        /// Where to write it (defaults to --config)
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// VaultDB snapshot transfers
    #[command(subcommand)]
    Vaultdb(VaultDbCommands),
    /// Data bundle checks and transfers
    #[command(subcommand)]
    Bundle(BundleCommands),
    /// Keep agents awake for a while
    KeepAwake(KeepAwakeArgs),
}

#[allow(clippy::print_stdout)]
fn print_vaultdb(action: &str, descriptor: &VaultDbDescriptor) {
    println!(
        "{action} {} (snapshot {}, {} bytes stored)",
        descriptor.blob_name, descriptor.snapshot_id, descriptor.size_bytes
    );
    if let Some(digests) = &descriptor.content_digests {
        println!("  content md5 {} sha1 {}", digests.md5, digests.sha1);
    }
}

#[allow(clippy::print_stdout)]
fn print_bundle(bundle: &BundleDescriptor, digests: Option<&Digests>) {
    match digests {
        Some(d) => println!(
            "Bundle {} ok ({} bytes, md5 {} sha1 {})",
            bundle.bundle_id, d.bytes, d.md5, d.sha1
        ),
        None => println!("Bundle {} ok", bundle.bundle_id),
    }
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
    println!("{line}");
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { path, force } = &cli.command {
        return init_command(path.as_ref().unwrap_or(&cli.config), *force);
    }

    let config = load_config(&cli.config)?;
    let config_path = cli.config.display().to_string();
    debug!("Loaded configuration from {config_path}", config_path: config_path);
    let services = Services::connect(&config)?;

    match &cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Vaultdb(VaultDbCommands::Download(args)) => {
            let descriptor = download_command(&services.files, &config, args)?;
            print_vaultdb("Downloaded", &descriptor);
            Ok(())
        }
        Commands::Vaultdb(VaultDbCommands::Upload(args)) => {
            let descriptor = upload_command(&services.files, &config, args)?;
            print_vaultdb("Uploaded", &descriptor);
            Ok(())
        }
        Commands::Bundle(BundleCommands::Check {
            vault_path,
            bundle_id,
            digest,
        }) => {
            let bundle = BundleDescriptor::new(*bundle_id, digest.as_str());
            bundle_check_command(&services.files, &config, vault_path, &bundle)?;
            print_bundle(&bundle, None);
            Ok(())
        }
        Commands::Bundle(BundleCommands::Download {
            vault_path,
            bundle_id,
            digest,
            output,
        }) => {
            let bundle = BundleDescriptor::new(*bundle_id, digest.as_str());
            let digests = bundle_download_command(&services.files, &config, vault_path, &bundle, output)?;
            print_bundle(&bundle, Some(&digests));
            Ok(())
        }
        Commands::KeepAwake(args) => {
            let waker = Arc::new(keepawake::poller_client(services.backup_api()?));
            let interval = config.keep_awake_interval()?;
            for report in keep_awake_command(waker, interval, args)? {
                print_line(&format!(
                    "Agent {}: {} wakes, {} failures",
                    report.agent_id, report.wakes, report.failures
                ));
            }
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    init_diagnostics();
    let cli = Cli::parse();
    run(cli).context("cloudbackup failed")
}
