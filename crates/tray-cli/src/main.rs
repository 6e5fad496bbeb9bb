use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tray_contracts::menu::{validate_items, Category, RawMenuItem, ValidatedMenu};
use tray_contracts::templates::STANDARD_TEMPLATE_ID;
use tray_engine::{EnhanceKind, ImageResponse, TrayConfig, TrayService};

#[derive(Debug, Parser)]
#[command(name = "tray-rs", version, about = "Cafeteria tray image generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate (or fetch from cache) a tray image for a menu.
    Generate(GenerateArgs),
    /// Generate a single-dish preview image.
    Preview(PreviewArgs),
    /// Apply a fixed enhancement filter to a stored image.
    Enhance(EnhanceArgs),
    /// Print the stored file path for an image id.
    Find(FindArgs),
    Stats(ServiceArgs),
    /// Validate a menu without generating anything.
    Validate(MenuArgs),
    Templates,
}

#[derive(Debug, Parser)]
struct ServiceArgs {
    #[arg(long, default_value = "tray-data")]
    data_dir: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// `openai`, `dryrun`, or `none` for mock trays.
    #[arg(long)]
    provider: Option<String>,
}

#[derive(Debug, Parser)]
struct MenuArgs {
    /// Items as `category:name`, e.g. `main:Kimchi Stew`.
    items: Vec<String>,
    /// JSON array of `{name, category, id?, description?}` objects.
    #[arg(long)]
    items_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[command(flatten)]
    service: ServiceArgs,
    #[command(flatten)]
    menu: MenuArgs,
    #[arg(long, default_value = STANDARD_TEMPLATE_ID)]
    template: String,
}

#[derive(Debug, Parser)]
struct PreviewArgs {
    #[command(flatten)]
    service: ServiceArgs,
    #[arg(long)]
    name: String,
    #[arg(long)]
    category: Option<String>,
}

#[derive(Debug, Parser)]
struct EnhanceArgs {
    #[command(flatten)]
    service: ServiceArgs,
    #[arg(long)]
    image_url: String,
    #[arg(long, default_value = "general")]
    kind: String,
}

#[derive(Debug, Parser)]
struct FindArgs {
    #[command(flatten)]
    service: ServiceArgs,
    image_id: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("tray-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => {
            let menu = load_menu(&args.menu)?;
            let service = open_service(&args.service)?;
            let response = service.generate_tray(&menu.items, &args.template)?;
            print_json(&response)?;
            Ok(0)
        }
        Command::Preview(args) => {
            let category = args
                .category
                .as_deref()
                .map(str::parse::<Category>)
                .transpose()?;
            let service = open_service(&args.service)?;
            image_exit(service.preview_food(&args.name, category))
        }
        Command::Enhance(args) => {
            let service = open_service(&args.service)?;
            image_exit(service.enhance(&args.image_url, EnhanceKind::from_name(&args.kind)))
        }
        Command::Find(args) => {
            let service = open_service(&args.service)?;
            match service.find_cached_path(&args.image_id) {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(0)
                }
                None => {
                    eprintln!("image not found: {}", args.image_id);
                    Ok(1)
                }
            }
        }
        Command::Stats(args) => {
            print_json(&open_service(&args)?.stats())?;
            Ok(0)
        }
        Command::Validate(args) => {
            print_json(&load_menu(&args)?)?;
            Ok(0)
        }
        Command::Templates => {
            print_json(&tray_contracts::templates::TRAY_TEMPLATES)?;
            Ok(0)
        }
    }
}

fn open_service(args: &ServiceArgs) -> Result<TrayService> {
    TrayService::new(build_config(args))
}

fn build_config(args: &ServiceArgs) -> TrayConfig {
    let mut config = TrayConfig::from_env(&args.data_dir);
    if let Some(events) = args.events.clone() {
        config.events_path = events;
    }
    if let Some(provider) = args.provider.as_deref().map(str::trim) {
        let provider = provider.to_ascii_lowercase();
        config.provider = match provider.as_str() {
            "" | "none" | "mock" => None,
            _ => Some(provider),
        };
    }
    config
}

fn load_menu(args: &MenuArgs) -> Result<ValidatedMenu> {
    let mut raw = match args.items_file.as_deref() {
        Some(path) => read_items_file(path)?,
        None => Vec::new(),
    };
    raw.extend(args.items.iter().map(String::as_str).map(parse_item_arg));
    validate_items(&raw)
}

fn read_items_file(path: &Path) -> Result<Vec<RawMenuItem>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: Value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    let rows = match parsed {
        Value::Array(rows) => rows,
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(rows)) => rows,
            _ => bail!("{} must contain an `items` array", path.display()),
        },
        _ => bail!("{} must be a JSON array of menu items", path.display()),
    };
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(anyhow::Error::from))
        .collect()
}

/// `main:Kimchi Stew` → category `main`, name `Kimchi Stew`.
fn parse_item_arg(arg: &str) -> RawMenuItem {
    match arg.split_once(':') {
        Some((category, name)) => RawMenuItem {
            name: Some(name.trim().to_string()),
            category: Some(category.trim().to_string()),
            ..RawMenuItem::default()
        },
        None => RawMenuItem {
            name: Some(arg.trim().to_string()),
            ..RawMenuItem::default()
        },
    }
}

fn image_exit(response: ImageResponse) -> Result<i32> {
    print_json(&response)?;
    Ok(if response.success { 0 } else { 1 })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
