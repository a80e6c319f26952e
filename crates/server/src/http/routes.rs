//! Route table and handlers

use crate::http::AppState;
use crate::http::models::{
    ConfigureRequest, JobResponse, MessageResponse, PrintRequest, PrinterStatusBody,
    ScaleRequest, ScaleStatusBody, StatusResponse, WeightResponse,
};
use crate::http::response::{handle_rejection, reject};
use crate::service::{PrinterStatus, ScaleOutcome};
use crate::usb::UsbBus;
use protocol::StatusCondition;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use tracing::{debug, info, warn};
use warp::hyper::body::Bytes;
use warp::reply::json;
use warp::{Filter, Rejection, Reply};

/// All routes, with rejections turned into JSON error replies
pub fn routes<B: UsbBus>(
    state: AppState<B>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    configure(state.clone())
        .or(print(state.clone()))
        .or(scale(state.clone()))
        .or(status(state))
        .or(error_report())
        .recover(handle_rejection)
}

/// Inject the shared state
fn with_state<B: UsbBus>(
    state: AppState<B>,
) -> impl Filter<Extract = (AppState<B>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::json()
}

fn configure<B: UsbBus>(
    state: AppState<B>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("configure")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handle_configure::<B>)
}

fn print<B: UsbBus>(
    state: AppState<B>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("print")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handle_print::<B>)
}

fn scale<B: UsbBus>(
    state: AppState<B>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("scale")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state))
        .and_then(handle_scale::<B>)
}

fn status<B: UsbBus>(
    state: AppState<B>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("status")
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_status::<B>)
}

fn error_report() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("error-report")
        .and(warp::post())
        .and(warp::body::bytes())
        .and_then(handle_error_report)
}

async fn handle_configure<B: UsbBus>(
    request: ConfigureRequest,
    state: AppState<B>,
) -> Result<impl Reply, Rejection> {
    let config = request.into_config().map_err(reject)?;

    let version = state
        .run_blocking(move |service, _| service.configure(config))
        .await
        .map_err(reject)?;

    debug!("Configuration is now version {}", version);
    Ok(json(&MessageResponse::new(
        "Configuration updated successfully",
    )))
}

async fn handle_print<B: UsbBus>(
    request: PrintRequest,
    state: AppState<B>,
) -> Result<impl Reply, Rejection> {
    let job = request.into_job().map_err(reject)?;

    let result = state
        .run_blocking(move |service, cancel| service.print(job, cancel))
        .await
        .map_err(reject)?;

    Ok(json(&JobResponse {
        job_id: result.job_id.to_string(),
    }))
}

async fn handle_scale<B: UsbBus>(
    request: ScaleRequest,
    state: AppState<B>,
) -> Result<impl Reply, Rejection> {
    let outcome = state
        .run_blocking(move |service, cancel| service.scale(&request.command, cancel))
        .await
        .map_err(reject)?;

    let reply = match outcome {
        ScaleOutcome::Weight(reading) => json(&WeightResponse {
            weight: reading.value,
        }),
        ScaleOutcome::Acknowledged(ack) => json(&MessageResponse::new(format!(
            "Scale {} successful",
            ack.command
        ))),
    };
    Ok(reply)
}

async fn handle_status<B: UsbBus>(state: AppState<B>) -> Result<impl Reply, Rejection> {
    let printer = match state
        .run_blocking(|service, cancel| Ok(service.printer_status(cancel)))
        .await
    {
        Ok(status) => status,
        Err(e) => PrinterStatus {
            printer_type: state.service().config().get().config.printer.paper.clone(),
            condition: StatusCondition::Unknown,
            error: Some(e.to_string()),
        },
    };

    Ok(json(&StatusResponse {
        printers: vec![PrinterStatusBody::from(printer)],
        scale: ScaleStatusBody::default(),
    }))
}

async fn handle_error_report(body: Bytes) -> Result<impl Reply, Rejection> {
    if body.is_empty() {
        warn!("Client error report without details");
    } else {
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(report) => warn!("Client error report: {}", report),
            Err(_) => warn!("Client error report: {}", String::from_utf8_lossy(&body)),
        }
    }

    info!("Error report recorded");
    Ok(json(&MessageResponse::new("Error reported successfully")))
}
