use clap::{Args as ClapArgs, Parser, Subcommand};
use dgm_core::{PatchOpts, Pipeline, ScaffoldOpts, UnmatchedPolicy};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "dgm",
    about = "Merge mod packages into a decompiled Dungeons & Degenerate Gamblers source tree",
    version
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Reset the working tree and apply every enabled mod
    Patch(PatchArgs),
    /// Create a blank mod package
    Create(CreateArgs),
    /// List mod packages in load order
    List(ListArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct PatchArgs {
    /// YAML run configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory holding src/, modified_src/, mods/ and assets/
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Pristine decompiled tree
    #[arg(long)]
    source: Option<PathBuf>,
    /// Output tree (deleted and recreated)
    #[arg(long)]
    working: Option<PathBuf>,
    #[arg(long)]
    mods: Option<PathBuf>,
    #[arg(long)]
    assets: Option<PathBuf>,
    /// Fail on unknown card triggers instead of skipping them
    #[arg(long, default_value_t = false)]
    strict_triggers: bool,
    /// Fail when a mod patch pattern is not found
    #[arg(long, default_value_t = false)]
    abort_on_unmatched: bool,
    /// Print the run report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(ClapArgs, Debug)]
struct CreateArgs {
    /// Display name of the mod
    name: String,
    /// Author shown in the manifest
    #[arg(long, default_value = "Anonymous")]
    creator: String,
    /// Directory name; derived from the name when omitted
    #[arg(long)]
    slug: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long = "mod-version")]
    version: Option<String>,
    /// Also export encounters
    #[arg(long, default_value_t = false)]
    encounters: bool,
    #[arg(long, default_value = "mods")]
    mods: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    #[arg(long, default_value = "mods")]
    mods: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dgm_core={0},dgm={0}", cli.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.cmd.unwrap_or(Cmd::Patch(PatchArgs::default())) {
        Cmd::Patch(a) => cmd_patch(a),
        Cmd::Create(a) => cmd_create(a),
        Cmd::List(a) => cmd_list(a),
    }
}

fn load_opts(args: &PatchArgs) -> PatchOpts {
    let mut opts = match (&args.config, &args.data_dir) {
        (Some(path), _) => PatchOpts::from_yaml_file(path).unwrap_or_else(|e| {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }),
        (None, Some(dir)) => PatchOpts::rooted_at(dir),
        (None, None) => PatchOpts::default(),
    };
    if let Some(p) = &args.source {
        opts.source_dir = p.clone();
    }
    if let Some(p) = &args.working {
        opts.working_dir = p.clone();
    }
    if let Some(p) = &args.mods {
        opts.mods_dir = p.clone();
    }
    if let Some(p) = &args.assets {
        opts.assets_dir = p.clone();
    }
    if args.strict_triggers {
        opts.strict_triggers = true;
    }
    if args.abort_on_unmatched {
        opts.unmatched_patch = UnmatchedPolicy::Abort;
    }
    tracing::debug!(?opts, "run configuration");
    opts
}

fn cmd_patch(args: PatchArgs) {
    let opts = load_opts(&args);
    let report = Pipeline::new(opts).run().unwrap_or_else(|e| {
        tracing::error!(error = %e, "patch run aborted; the working tree may be partially patched");
        eprintln!("error: {}", e);
        std::process::exit(3);
    });
    tracing::info!(
        mods = report.mods.len(),
        skipped = report.skipped.len(),
        atlases = report.atlases.len(),
        "patch run finished"
    );
    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(3);
            }
        }
        return;
    }
    for m in &report.mods {
        println!(
            "{}\tcards={}\tdecks={}\tencounters={}\tpatches={}",
            m.name,
            m.cards.len(),
            m.decks.len(),
            m.encounters.len(),
            m.patches.len()
        );
    }
    for name in &report.skipped {
        println!("{}\t(disabled)", name);
    }
}

fn cmd_create(args: CreateArgs) {
    let mut opts = ScaffoldOpts::new(args.name, args.creator);
    opts.slug = args.slug;
    if let Some(d) = args.description {
        opts.description = d;
    }
    if let Some(v) = args.version {
        opts.version = v;
    }
    opts.export_encounters = args.encounters;
    match dgm_core::scaffold_mod(&args.mods, &opts) {
        Ok(dir) => println!("{}", dir.display()),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    }
}

fn cmd_list(args: ListArgs) {
    let dirs = dgm_core::list_mods(&args.mods).unwrap_or_else(|e| {
        eprintln!("error: {}", e);
        std::process::exit(2);
    });
    for dir in dirs {
        match dgm_core::load_manifest(&dir) {
            Ok(m) => println!(
                "{}\t{}\t{}{}",
                dir.display(),
                m.name,
                m.version.as_deref().unwrap_or("-"),
                if m.enabled { "" } else { "\t(disabled)" }
            ),
            Err(e) => eprintln!("{}\terror: {}", dir.display(), e),
        }
    }
}
