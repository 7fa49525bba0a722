//! 命令行入口 - 分析视频或已抽取的帧目录

use engagement_lib::core::engagement::{AnalysisPipeline, EngagementError, EngagementModel};
use engagement_lib::core::video::SamplingPolicy;
use engagement_lib::core::AnalysisConfig;
use log::error;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "\
Usage: engagement (--frames <dir> | --video <path> [--output <dir>]) [options]

Options:
  --model <path>     ONNX model (default ./model/engagement-model.onnx)
  --config <file>    JSON5 config file
  --step <n>         keep every n-th decoded frame
  --interval <secs>  keep one frame every <secs> seconds (seeks)
  --resize <r>       downscale retained frames by r in (0, 1]
  --json             print the report as JSON
  --quiet            only print the summary";

enum Input {
    Frames(PathBuf),
    Video { path: PathBuf, output: Option<PathBuf> },
}

struct Options {
    input: Input,
    model: Option<PathBuf>,
    config: Option<PathBuf>,
    step: Option<u64>,
    interval: Option<f64>,
    resize: Option<f32>,
    json: bool,
    quiet: bool,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut frames = None;
    let mut video = None;
    let mut output = None;
    let mut model = None;
    let mut config = None;
    let mut step = None;
    let mut interval = None;
    let mut resize = None;
    let mut json = false;
    let mut quiet = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} needs a value", arg))
        };
        match arg.as_str() {
            "--frames" => frames = Some(PathBuf::from(value()?)),
            "--video" => video = Some(PathBuf::from(value()?)),
            "--output" => output = Some(PathBuf::from(value()?)),
            "--model" => model = Some(PathBuf::from(value()?)),
            "--config" => config = Some(PathBuf::from(value()?)),
            "--step" => step = Some(parse_number(arg, &value()?)?),
            "--interval" => interval = Some(parse_number(arg, &value()?)?),
            "--resize" => resize = Some(parse_number(arg, &value()?)?),
            "--json" => json = true,
            "--quiet" => quiet = true,
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    if step.is_some() && interval.is_some() {
        return Err("--step and --interval are mutually exclusive".to_string());
    }

    let input = match (frames, video) {
        (Some(dir), None) => {
            if output.is_some() {
                return Err("--output only applies to --video".to_string());
            }
            Input::Frames(dir)
        }
        (None, Some(path)) => Input::Video { path, output },
        (Some(_), Some(_)) => return Err("use either --frames or --video, not both".to_string()),
        (None, None) => return Err("one of --frames or --video is required".to_string()),
    };

    Ok(Options {
        input,
        model,
        config,
        step,
        interval,
        resize,
        json,
        quiet,
    })
}

fn parse_number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("{} expects a number, got {:?}", flag, raw))
}

fn build_config(options: &Options) -> Result<AnalysisConfig, EngagementError> {
    let mut config = match &options.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(model) = &options.model {
        config.model_path = model.clone();
    }
    if let Some(step) = options.step {
        config.extraction.sampling = SamplingPolicy::every_nth(step);
    }
    if let Some(seconds) = options.interval {
        config.extraction.sampling = SamplingPolicy::every_secs(seconds);
    }
    if let Some(resize) = options.resize {
        config.extraction.resize_factor = resize;
    }
    config.validate()?;
    Ok(config)
}

fn load_model(config: &AnalysisConfig) -> Result<Box<dyn EngagementModel + Send>, EngagementError> {
    #[cfg(feature = "onnx")]
    {
        let model = engagement_lib::core::engagement::OnnxEngagementModel::load(&config.model_path)?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    {
        Err(EngagementError::ModelLoad(format!(
            "cannot load {:?}: built without the onnx feature",
            config.model_path
        )))
    }
}

fn run(options: &Options, config: &AnalysisConfig) -> Result<(), EngagementError> {
    let model = load_model(config)?;
    let mut pipeline = AnalysisPipeline::from_config(model, config)?;

    let stream = !options.json && !options.quiet;
    let print_frame = |p: &engagement_lib::core::engagement::EngagementPrediction| {
        if stream {
            println!("Frame: {} - Engagement Status: {}", p.frame_id, p.label);
        }
    };

    let report = match &options.input {
        Input::Frames(dir) => pipeline.analyze_directory_with(dir, print_frame)?,
        Input::Video { path, output } => {
            let mut source = engagement_lib::core::video::open_video(path)?;
            pipeline.analyze_source_with(source.as_mut(), output.as_deref(), print_frame)?
        }
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }
    Ok(())
}

fn main() -> ExitCode {
    engagement_lib::init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("error: {}\n\n{}", message, USAGE);
            return ExitCode::from(2);
        }
    };

    let config = match build_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    match run(&options, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ analysis failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}
