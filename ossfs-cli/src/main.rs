//! ossfs-sync: flush a local file into a disk-backed object store through the
//! multipart pipeline

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use ossfs_client::AbortHandle;
use ossfs_core::{Acl, Config, ObjectKey, SignatureVersion};
use ossfs_engine::StoreEngine;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod sync;

use sync::{parse_range, SyncOptions};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn command() -> Command {
    Command::new("ossfs-sync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Persist dirty ranges of a local file as an object, using multipart upload")
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("PATH")
                .help("Store directory")
                .default_value("./ossfs-store"),
        )
        .arg(
            Arg::new("bucket")
                .long("bucket")
                .value_name("NAME")
                .help("Bucket name")
                .default_value("mount"),
        )
        .arg(
            Arg::new("key")
                .long("key")
                .value_name("KEY")
                .help("Object key")
                .required(true),
        )
        .arg(
            Arg::new("file")
                .long("file")
                .value_name("PATH")
                .help("Local file holding the full object contents")
                .required(true),
        )
        .arg(
            Arg::new("dirty")
                .long("dirty")
                .value_name("START:LEN")
                .help("Modified byte range; repeatable. Defaults to the whole file")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("acl")
                .long("acl")
                .value_name("ACL")
                .help("Object ACL: private, public-read, public-read-write or default"),
        )
        .arg(
            Arg::new("signature")
                .long("signature")
                .value_name("VERSION")
                .help("Signature version: v1, v4 or auto; recorded with each stored object"),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .value_name("N")
                .help("Parts uploaded at once")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Emit logs as JSON")
                .action(ArgAction::SetTrue),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = command().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_json_file(path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };
    if let Some(acl) = matches.get_one::<String>("acl") {
        config.store.acl = acl.parse::<Acl>()?;
    }
    if let Some(signature) = matches.get_one::<String>("signature") {
        config.store.signature = signature.parse::<SignatureVersion>()?;
    }
    if let Some(&concurrency) = matches.get_one::<u32>("concurrency") {
        config.upload.concurrency_limit = concurrency;
    }
    config.upload.validate()?;

    let dirty = matches
        .get_many::<String>("dirty")
        .unwrap_or_default()
        .map(|arg| parse_range(arg))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let key = matches
        .get_one::<String>("key")
        .context("--key is required")?;
    let file = matches
        .get_one::<String>("file")
        .context("--file is required")?;
    let store = matches
        .get_one::<String>("store")
        .map(PathBuf::from)
        .context("--store is required")?;

    let options = SyncOptions {
        bucket: matches
            .get_one::<String>("bucket")
            .cloned()
            .unwrap_or_default(),
        key: ObjectKey::new(key)?,
        file: PathBuf::from(file),
        dirty,
        config,
    };

    if !store.exists() {
        std::fs::create_dir_all(&store)?;
        info!("Created store directory: {}", store.display());
    }
    let engine = StoreEngine::new(&store)
        .with_context(|| format!("opening store at {}", store.display()))?;

    let abort = AbortHandle::new();
    let on_signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, aborting upload");
            on_signal.abort();
        }
    });

    let meta = sync::run(&engine, options, abort).await?;
    println!("{}", serde_json::to_string_pretty(&meta)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn test_dirty_is_repeatable() {
        let matches = command()
            .try_get_matches_from([
                "ossfs-sync", "--key", "k", "--file", "f", "--dirty", "0:10", "--dirty", "20:5",
            ])
            .unwrap();
        let dirty: Vec<&String> = matches.get_many::<String>("dirty").unwrap().collect();
        assert_eq!(dirty, ["0:10", "20:5"]);
        assert_eq!(matches.get_one::<String>("bucket").unwrap(), "mount");
    }
}
