use std::io;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
#[cfg(not(feature = "tracing"))]
use log::LevelFilter;
use procam_calib::{
    calibrate_projector, image_size, AutoAccept, CalibrationResult, ChessboardPatternDetector,
    DecisionSource, DirectoryFrameSource, IntakeError, IntakeOutcome, IntakeSession,
    PipelineError, PngCaptureSink, ReaderDecisions,
};
use procam_core::{CalibrationSettings, SettingsError, TermCriteria};

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

/// Calibrate a camera and a projector from frames showing a printed
/// chessboard and a projected chessboard side by side.
#[derive(Debug, Parser)]
#[command(name = "procam-calibrate", version, about)]
struct Args {
    /// Camera calibration settings (JSON or OpenCV FileStorage YAML).
    #[arg(value_name = "camCalibPath")]
    cam_calib_path: Option<PathBuf>,

    /// Projector settings.
    #[arg(value_name = "projSettingsPath")]
    proj_settings_path: Option<PathBuf>,

    /// Projected pattern image; its size is the projector resolution.
    #[arg(value_name = "patternPath")]
    pattern_path: Option<PathBuf>,

    /// Report is written to `<outputName>.json`.
    #[arg(value_name = "outputName")]
    output_name: Option<String>,

    /// Directory of camera frames, read in file-name order.
    #[arg(long, value_name = "DIR")]
    frames: Option<PathBuf>,

    /// Accept every frame where both patterns are found.
    #[arg(long)]
    auto_accept: bool,

    /// Save accepted frames as `capture{n}.png` in this directory.
    #[arg(long, value_name = "DIR")]
    captures: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Emit tracing output as JSON.
    #[cfg(feature = "tracing")]
    #[arg(long)]
    log_json: bool,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{0}")]
    Input(String),
    #[error("{path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: SettingsError,
    },
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliError {
    /// Setup failures exit with -1, failures after intake started with 1.
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Input(_) | CliError::Settings { .. } => -1,
            CliError::Intake(_) | CliError::Pipeline(_) => 1,
        }
    }
}

fn init_logging(args: &Args) {
    #[cfg(feature = "tracing")]
    {
        let _ = LogTracer::init();
        procam_core::init_tracing(args.log_json);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let level = match args.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        let _ = procam_core::init_with_level(level);
    }
}

fn required<'a, T>(value: &'a Option<T>, name: &str) -> Result<&'a T, CliError> {
    value
        .as_ref()
        .ok_or_else(|| CliError::Input(format!("missing required argument <{name}>")))
}

fn existing(path: &Path) -> Result<&Path, CliError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(CliError::Input(format!("{} does not exist", path.display())))
    }
}

fn load_settings(path: &Path) -> Result<CalibrationSettings, CliError> {
    CalibrationSettings::load(path).map_err(|source| CliError::Settings {
        path: path.to_path_buf(),
        source,
    })
}

fn print_device(name: &str, result: &CalibrationResult) {
    let k = &result.camera.intrinsics;
    let d = result.camera.distortion.to_array();
    println!("{name} rms = {:.6}", result.rms);
    println!("{name} matrix =");
    println!("  [{:12.4}, {:12.4}, {:12.4}]", k.fx, 0.0, k.cx);
    println!("  [{:12.4}, {:12.4}, {:12.4}]", 0.0, k.fy, k.cy);
    println!("  [{:12.4}, {:12.4}, {:12.4}]", 0.0, 0.0, 1.0);
    println!(
        "{name} dist coeffs = [{:.6}, {:.6}, {:.6}, {:.6}, {:.6}]",
        d[0], d[1], d[2], d[3], d[4]
    );
}

fn run(args: &Args) -> Result<(), CliError> {
    let cam_path = existing(required(&args.cam_calib_path, "camCalibPath")?)?;
    let proj_path = existing(required(&args.proj_settings_path, "projSettingsPath")?)?;
    let pattern_path = existing(required(&args.pattern_path, "patternPath")?)?;
    let output_name = required(&args.output_name, "outputName")?;

    let camera = load_settings(cam_path)?;
    let mut projector = load_settings(proj_path)?;
    let projector_size = image_size(pattern_path).map_err(|e| {
        CliError::Input(format!("cannot read pattern {}: {e}", pattern_path.display()))
    })?;
    projector.image_size = Some(projector_size);
    log::info!(
        "projector {}x{}, camera pattern {}, projector pattern {}",
        projector_size.width,
        projector_size.height,
        camera.pattern_size,
        projector.pattern_size
    );

    let frames_dir = required(&args.frames, "--frames")?;
    let mut frames = DirectoryFrameSource::open(frames_dir).map_err(|e| {
        CliError::Input(format!("cannot open frames {}: {e}", frames_dir.display()))
    })?;
    let mut detector = ChessboardPatternDetector::default();
    let mut auto = AutoAccept;
    let mut interactive = ReaderDecisions::new(io::stdin().lock(), io::stderr());
    let decisions: &mut dyn DecisionSource = if args.auto_accept {
        &mut auto
    } else {
        &mut interactive
    };
    let mut sink = match &args.captures {
        Some(dir) => Some(PngCaptureSink::new(dir).map_err(|e| {
            CliError::Input(format!("cannot create captures {}: {e}", dir.display()))
        })?),
        None => None,
    };

    let mut session = IntakeSession::new(&camera, &projector, &mut frames, &mut detector, decisions)
        .map_err(|e| CliError::Input(e.to_string()))?;
    if let Some(sink) = sink.as_mut() {
        session = session.with_capture_sink(sink);
    }

    let (correspondences, camera_size) = match session.run()? {
        IntakeOutcome::Completed {
            correspondences,
            camera_image_size,
        } => (correspondences, camera_image_size),
        IntakeOutcome::Aborted { accepted } => {
            println!("calibration aborted after {accepted} accepted frames");
            return Ok(());
        }
    };

    let calib = calibrate_projector(
        &correspondences,
        camera_size,
        projector_size,
        TermCriteria::default(),
    )?;
    print_device("camera", &calib.camera);
    print_device("projector", &calib.projector);

    let report_path = PathBuf::from(format!("{output_name}.json"));
    calib.to_report(output_name.as_str()).write_json(&report_path)?;
    log::info!("wrote {}", report_path.display());
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(&args);
    if let Err(err) = run(&args) {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}
