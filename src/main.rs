//! CycleCare: PCOS risk scoring core.
//!
//! Command-line host. Reads one JSON request from stdin and writes one JSON
//! response to stdout; logs go to stderr (or a file) so stdout stays clean.
//!
//! ```text
//! cyclecare assess                       < answers.json
//! cyclecare predict hormone_ultrasound   < inputs.json
//! cyclecare predict symptom_vitals [--sentinel <value>] < inputs.json
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cyclecare::adapters::sanitize::RedactingMakeWriter;
use cyclecare::config::{LogMode, ServiceConfig};
use cyclecare::domain::{FlatRecord, MissingValuePolicy, Question, SymptomAnswer};
use cyclecare::{AssessmentService, CyclecareError, RawInputs, RiskAssessment, SchemaId};

const TIMESTAMP_KEY: &str = "Assessed At";

/// Questionnaire answers, either in positional order or keyed by question id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswersRequest {
    Positional(Vec<bool>),
    Named(BTreeMap<String, bool>),
}

#[derive(Debug, Serialize)]
struct Response<T: Serialize> {
    result: T,
    record: FlatRecord,
}

enum Command {
    Assess,
    Predict {
        kind: SchemaId,
        policy: MissingValuePolicy,
    },
}

fn usage() -> anyhow::Error {
    anyhow!(
        "Usage: cyclecare assess | \
         cyclecare predict <hormone_ultrasound|symptom_vitals> [--sentinel <value>]"
    )
}

fn parse_args() -> Result<Command> {
    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("assess") => match args.next() {
            None => Ok(Command::Assess),
            Some(_) => Err(usage()),
        },
        Some("predict") => {
            let kind = args.next().ok_or_else(usage)?;
            let kind = SchemaId::from_id(&kind)
                .ok_or_else(|| anyhow!("Unknown pipeline '{kind}'"))?;
            let mut policy = MissingValuePolicy::Reject;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--sentinel" => {
                        let v = args.next().ok_or_else(usage)?;
                        let v: f64 = v
                            .trim()
                            .parse()
                            .with_context(|| format!("--sentinel must be a number, got '{v}'"))?;
                        if !v.is_finite() {
                            bail!("--sentinel must be finite");
                        }
                        policy = MissingValuePolicy::Sentinel(v);
                    }
                    _ => return Err(usage()),
                }
            }
            Ok(Command::Predict { kind, policy })
        }
        _ => Err(usage()),
    }
}

fn init_logging(mode: &LogMode) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let (writer, guard) = match mode {
        LogMode::File(path) => {
            if let Some(parent) = path.parent() {
                // Best-effort: a missing directory surfaces as an open error below.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path:?}"))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(RedactingMakeWriter::new(writer)))
        .init();

    Ok(guard)
}

fn read_stdin<T: serde::de::DeserializeOwned>() -> Result<T> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read request from stdin")?;
    let request = serde_json::from_str(&input).map_err(CyclecareError::from)?;
    Ok(request)
}

fn named_answers(named: BTreeMap<String, bool>) -> Result<Vec<SymptomAnswer>, CyclecareError> {
    named
        .into_iter()
        .map(|(id, value)| {
            Question::from_id(&id)
                .map(|q| SymptomAnswer::new(q, value))
                .ok_or_else(|| CyclecareError::InvalidInput(format!("unknown question '{id}'")))
        })
        .collect()
}

fn assess(service: &AssessmentService) -> Result<(RiskAssessment, FlatRecord)> {
    let assessment = match read_stdin::<AnswersRequest>()? {
        AnswersRequest::Positional(answers) => service.assess(&answers)?,
        AnswersRequest::Named(named) => service.assess_answers(&named_answers(named)?)?,
    };
    tracing::info!("Assessment complete: {}", assessment.level);
    let record = assessment.to_record();
    Ok((assessment, record))
}

fn write_response<T: Serialize>(result: T, mut record: FlatRecord) -> Result<()> {
    record.push(TIMESTAMP_KEY, chrono::Utc::now().to_rfc3339());
    let body = serde_json::to_string_pretty(&Response { result, record })?;
    println!("{body}");
    Ok(())
}

fn main() -> Result<()> {
    let command = parse_args()?;
    let (config, warnings) = ServiceConfig::from_env_deferred();
    let _guard = init_logging(&config.log_mode)?;
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    match command {
        Command::Assess => {
            let service: AssessmentService = AssessmentService::from_parts(None, None);
            let (assessment, record) = assess(&service)?;
            write_response(assessment, record)
        }
        Command::Predict { kind, policy } => {
            let service = AssessmentService::from_config(&config)
                .context("Failed to load model artifacts")?;
            let raw: RawInputs = read_stdin()?;
            let evaluation = service.evaluate(kind, &raw, policy)?;
            tracing::info!("{} prediction complete", kind);
            let record = evaluation.to_record();
            write_response(evaluation.result, record)
        }
    }
}
