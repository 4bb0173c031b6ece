use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facecheck::storage::{FaceRecord, FaceStore};
use facecheck::{config, embedder, recognize, verify, FaceAnalyzer, Pipeline};
use log::info;

#[derive(Parser)]
#[command(name = "facecheck")]
#[command(version, about = "Face verification and recognition from a live camera")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a placeholder embedding for an image path as JSON
    Embed {
        /// Image path; only its name is used
        image: Option<String>,
    },
    /// Verify live camera frames against a reference image
    Verify {
        /// Reference image (defaults to verify.reference)
        #[arg(short, long)]
        reference: Option<PathBuf>,
        /// Camera device path or index
        #[arg(long)]
        camera: Option<String>,
    },
    /// Recognize every face in live camera frames
    Recognize {
        /// Reference image (defaults to recognize.reference)
        #[arg(short, long, conflicts_with = "enrolled")]
        reference: Option<PathBuf>,
        /// Match against enrolled faces instead of a reference image
        #[arg(short, long)]
        enrolled: bool,
        /// Camera device path or index
        #[arg(long)]
        camera: Option<String>,
    },
    /// Enroll the face in an image under a name
    Enroll {
        #[arg(short, long)]
        name: String,
        image: PathBuf,
    },
    /// List enrolled faces
    List,
    /// Remove all enrolled faces
    Purge,
    /// Open config file in editor
    Config,
}

fn main() -> Result<ExitCode> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    match cli.command {
        // Neither needs a loadable config
        Commands::Embed { image } => {
            let code = embedder::run(image.as_deref(), &mut std::io::stdout().lock())?;
            Ok(ExitCode::from(code as u8))
        }
        Commands::Config => {
            open_config(cli.config)?;
            Ok(ExitCode::SUCCESS)
        }
        command => {
            run(command, cli.config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run(command: Commands, config_path: Option<PathBuf>) -> Result<()> {
    let cfg = config::load_config(config_path.as_deref())?;

    match command {
        Commands::Embed { .. } | Commands::Config => {}
        Commands::Verify { reference, camera } => {
            let reference = reference.unwrap_or_else(|| cfg.verify.reference.clone());
            let camera = camera.unwrap_or_else(|| cfg.camera.clone());
            verify::run(&cfg, &reference, &camera)?;
        }
        Commands::Recognize {
            reference,
            enrolled,
            camera,
        } => {
            let reference = reference.unwrap_or_else(|| cfg.recognize.reference.clone());
            let camera = camera.unwrap_or_else(|| cfg.camera.clone());
            recognize::run(&cfg, &reference, enrolled, &camera)?;
        }
        Commands::Enroll { name, image } => enroll(&cfg, &name, &image)?,
        Commands::List => list(&cfg)?,
        Commands::Purge => purge(&cfg)?,
    }
    Ok(())
}

fn enroll(cfg: &config::Config, name: &str, image: &std::path::Path) -> Result<()> {
    info!("Enrolling {} from {}", name, image.display());

    let img = verify::open_reference(image)?;
    let mut pipeline = Pipeline::new(&cfg.models.detector, &cfg.models.recognizer)
        .context("Failed to initialize face recognition pipeline")?
        .with_thresholds(cfg.detection.score_threshold, cfg.detection.nms_threshold);

    let face = pipeline.best_face(&img)?.ok_or_else(|| {
        anyhow::anyhow!("Failed to detect a face in {}", image.display())
    })?;
    info!("Best face: score {:.3}", face.detection.score);

    let store = FaceStore::new(&cfg.store.dir);
    store
        .save(FaceRecord::new(name, face.embedding.to_vec()))
        .context("Failed to save face record")?;

    info!("✓ Face enrolled successfully: {}", name);
    Ok(())
}

fn list(cfg: &config::Config) -> Result<()> {
    let records = FaceStore::new(&cfg.store.dir)
        .load()
        .context("Failed to load face records")?;
    if records.is_empty() {
        info!("No enrolled faces");
    }
    for record in records {
        println!("{} {}", record.id, record.name);
    }
    Ok(())
}

fn purge(cfg: &config::Config) -> Result<()> {
    let store = FaceStore::new(&cfg.store.dir);
    info!("Purging enrolled faces in {}", store.dir().display());

    store.purge().context("Failed to purge face records")?;

    info!("✓ All enrolled faces purged");
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.clone());
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path.as_path()))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
