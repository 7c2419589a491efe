use std::fs;
use std::path::Path;
use std::process;

use tracing_subscriber::{filter::LevelFilter, fmt};
use vigil_app::cli::{Cli, Commands, ExtractArgs, ProcessArgs, StatusArgs, VideoCallbackArgs};
use vigil_app::config;
use vigil_app::error::AppError;
use vigil_app::extract::{self, PdfImageFilters, SourceFormat};
use vigil_app::keys;
use vigil_app::moderate::VideoCallbackPayload;
use vigil_app::pipeline::{
    ObjectEvent, PipelineContext, build_pipeline_context, handle_processing_object, handle_upload,
    handle_video_callback,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Process(_)) | Some(Commands::VideoCallback(_)) => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        _ => match cli.verbose {
            0 => LevelFilter::OFF,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Process(args)) => run_process(args).await?,
        Some(Commands::Extract(args)) => run_extract(args).await?,
        Some(Commands::VideoCallback(args)) => run_video_callback(args).await?,
        Some(Commands::Status(args)) => run_status(args).await?,
        None => {
            Cli::print_help();
        }
    }
    Ok(())
}

fn build_context() -> Result<PipelineContext, AppError> {
    let config = config::load()?;
    Ok(build_pipeline_context(&config)?)
}

async fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let ctx = build_context()?;
    if args.processing {
        // Processing-bucket keys arrive transport-encoded, same as uploads.
        // Internal callers always pass decoded keys, so decode here only.
        handle_processing_object(&ctx, &keys::decode_event_key(&args.key)).await?;
    } else {
        let event = ObjectEvent::new(ctx.buckets.library.clone(), args.key);
        handle_upload(&ctx, &event).await?;
    }
    Ok(())
}

async fn run_extract(args: ExtractArgs) -> Result<(), AppError> {
    let key = args
        .input
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| AppError::Config(format!("invalid input path {}", args.input.display())))?
        .to_owned();
    let Some(format) = SourceFormat::from_key(&key) else {
        return Err(AppError::Config(format!("unsupported document type: {key}")));
    };
    let Some(extractor) = extract::extractor_for(format, PdfImageFilters::default()) else {
        return Err(AppError::Config(format!(
            "{key} is moderated directly and has nothing to extract"
        )));
    };

    let bytes = fs::read(&args.input).map_err(|source| AppError::Io {
        path: args.input.clone(),
        source,
    })?;
    let extraction = extractor.extract(&key, &bytes)?;

    let mut written = 0_usize;
    for (artifact_key, body) in extraction
        .text
        .iter()
        .map(|a| (&a.key, &a.body))
        .chain(extraction.media.iter().map(|a| (&a.key, &a.body)))
    {
        let path = args.output.join(Path::new(artifact_key));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| AppError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, body).map_err(|source| AppError::Io {
            path: path.clone(),
            source,
        })?;
        println!("{}", path.display());
        written += 1;
    }
    println!("wrote {written} artifact(s) to {}", args.output.display());
    Ok(())
}

async fn run_video_callback(args: VideoCallbackArgs) -> Result<(), AppError> {
    let raw = match args.payload.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.into(),
            source,
        })?,
        None => args.payload,
    };
    let payload: VideoCallbackPayload = serde_json::from_str(&raw)?;

    let ctx = build_context()?;
    handle_video_callback(&ctx, &payload).await?;
    Ok(())
}

async fn run_status(args: StatusArgs) -> Result<(), AppError> {
    let ctx = build_context()?;
    let state = ctx.coordinator.state_of(&args.key).await?;
    println!("{}\t{state}", args.key);
    Ok(())
}
