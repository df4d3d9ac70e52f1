use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

use crate::core::{
    Diagnostic, FederalResult, TaxYearRules, TaxpayerInput, compute_federal_tax,
    compute_federal_tax_traced, validate_input,
};

#[derive(Parser, Debug)]
#[command(
    name = "fedtax",
    about = "Federal income tax engine (integer-cent pipeline: income, deductions, AMT, surtaxes, credits)"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API.
    Serve {
        #[arg(default_value_t = 8080)]
        port: u16,
    },
    /// Compute one return from a JSON file and print the result.
    Calc {
        #[arg(long, help = "Path to a taxpayer input JSON file")]
        input: PathBuf,
        #[arg(long, default_value_t = false, help = "Include the per-step trace")]
        trace: bool,
    },
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Calc { input, trace } => run_calc(&input, trace),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalculateQuery {
    trace: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CalculateResponse {
    rules_year: u32,
    result: FederalResult,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    valid: bool,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    rules_year: u32,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    println!("Federal tax API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/health");

    axum::serve(listener, router()).await
}

fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/calculate", post(calculate_handler))
        .route("/api/validate", post(validate_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(
        StatusCode::OK,
        HealthResponse {
            status: "ok",
            rules_year: TaxYearRules::year_2024().year,
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn calculate_handler(
    Query(query): Query<CalculateQuery>,
    Json(input): Json<TaxpayerInput>,
) -> Response {
    let report = validate_input(&input);
    if !report.is_valid() {
        return json_response(
            StatusCode::BAD_REQUEST,
            ValidateResponse {
                valid: false,
                errors: report.errors,
                warnings: report.warnings,
            },
        );
    }

    let response = build_calculate_response(&input, report.warnings, query.trace.unwrap_or(false));
    json_response(StatusCode::OK, response)
}

async fn validate_handler(Json(input): Json<TaxpayerInput>) -> Response {
    let report = validate_input(&input);
    json_response(
        StatusCode::OK,
        ValidateResponse {
            valid: report.is_valid(),
            errors: report.errors,
            warnings: report.warnings,
        },
    )
}

fn build_calculate_response(
    input: &TaxpayerInput,
    validation_warnings: Vec<Diagnostic>,
    trace: bool,
) -> CalculateResponse {
    let calc = if trace {
        compute_federal_tax_traced(input)
    } else {
        compute_federal_tax(input)
    };
    let mut diagnostics = validation_warnings;
    diagnostics.extend(calc.diagnostics);
    CalculateResponse {
        rules_year: TaxYearRules::year_2024().year,
        result: calc.result,
        diagnostics,
    }
}

fn run_calc(path: &Path, trace: bool) -> Result<(), String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
    let rendered = calc_output(&raw, trace)?;
    println!("{rendered}");
    Ok(())
}

fn calc_output(raw: &str, trace: bool) -> Result<String, String> {
    let input = parse_input(raw)?;
    let report = validate_input(&input);
    if !report.is_valid() {
        let errors = serde_json::to_string_pretty(&report.errors)
            .map_err(|e| format!("Cannot render validation errors: {e}"))?;
        return Err(format!("Invalid return input:\n{errors}"));
    }

    let response = build_calculate_response(&input, report.warnings, trace);
    serde_json::to_string_pretty(&response).map_err(|e| format!("Cannot render result: {e}"))
}

fn parse_input(raw: &str) -> Result<TaxpayerInput, String> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid return JSON: {e}"))
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FilingStatus, dollars};

    const SAMPLE_RETURN: &str = r#"{
        "filingStatus": "married-jointly",
        "primary": { "age": 40 },
        "spouse": { "age": 41 },
        "dependents": [
            { "relationship": "child", "age": 5, "monthsLivedWithTaxpayer": 12, "hasSsn": true },
            { "relationship": "child", "age": 9, "monthsLivedWithTaxpayer": 12, "hasSsn": true }
        ],
        "income": { "wages": 8500000 },
        "payments": { "withholding": 600000 }
    }"#;

    #[test]
    fn parses_kebab_and_camel_case_inputs() {
        let input = parse_input(SAMPLE_RETURN).expect("valid payload");
        assert_eq!(input.filing_status, FilingStatus::MarriedJointly);
        assert_eq!(input.income.wages, dollars(85_000));
        assert_eq!(input.dependents.len(), 2);

        let aliased = r#"{ "filingStatus": "headOfHousehold", "primary": { "age": 35 } }"#;
        let input = parse_input(aliased).expect("aliased status");
        assert_eq!(input.filing_status, FilingStatus::HeadOfHousehold);
    }

    #[test]
    fn rejects_malformed_json_with_context() {
        let err = parse_input("{ not json").expect_err("must fail");
        assert!(err.contains("Invalid return JSON"));
    }

    #[test]
    fn calc_output_contains_totals() {
        let rendered = calc_output(SAMPLE_RETURN, false).expect("calculates");
        assert!(rendered.contains("\"totalTax\""));
        assert!(rendered.contains("\"refundOrOwe\""));
        assert!(!rendered.contains("\"trace\""));
    }

    #[test]
    fn calc_output_includes_trace_when_requested() {
        let rendered = calc_output(SAMPLE_RETURN, true).expect("calculates");
        assert!(rendered.contains("\"trace\""));
        assert!(rendered.contains("Form 1040 line 11"));
    }

    #[test]
    fn calc_output_rejects_invalid_returns() {
        let bad = r#"{
            "filingStatus": "single",
            "primary": { "age": 40 },
            "income": { "wages": -100 }
        }"#;
        let err = calc_output(bad, false).expect_err("must reject");
        assert!(err.contains("Invalid return input"));
        assert!(err.contains("income.wages"));
    }

    #[test]
    fn validation_warnings_flow_into_calculate_diagnostics() {
        let raw = r#"{ "filingStatus": "married-jointly", "primary": { "age": 40 } }"#;
        let input = parse_input(raw).expect("valid payload");
        let report = validate_input(&input);
        assert!(report.is_valid());

        let response = build_calculate_response(&input, report.warnings, false);
        assert!(
            response
                .diagnostics
                .iter()
                .any(|d| d.code == "JOINT_WITHOUT_SPOUSE")
        );
    }

    #[test]
    fn cli_parses_serve_and_calc() {
        let cli = Cli::try_parse_from(["fedtax", "serve", "9000"]).expect("serve");
        assert!(matches!(cli.command, Command::Serve { port: 9000 }));

        let cli = Cli::try_parse_from(["fedtax", "serve"]).expect("default port");
        assert!(matches!(cli.command, Command::Serve { port: 8080 }));

        let cli =
            Cli::try_parse_from(["fedtax", "calc", "--input", "return.json", "--trace"])
                .expect("calc");
        match cli.command {
            Command::Calc { input, trace } => {
                assert_eq!(input, PathBuf::from("return.json"));
                assert!(trace);
            }
            Command::Serve { .. } => panic!("expected calc"),
        }
    }
}
