use chrono::Local;
use flexi_logger::{FileSpec, Logger, LoggerHandle};
use lincs_forest::param::{self, General};
use lincs_forest::run;
use log::{error, info};
use std::error::Error;
use std::process;

fn start_logger(general: &General) -> Result<LoggerHandle, Box<dyn Error>> {
    let logger = Logger::try_with_env_or_str(&general.log_level)?;
    let handle = if general.log_base.is_empty() {
        logger.start()?
    } else {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        logger
            .log_to_file(
                FileSpec::default()
                    .basename(&general.log_base)
                    .suffix(&general.log_suffix)
                    .discriminant(timestamp)
                    .suppress_timestamp(),
            )
            .start()?
    };
    Ok(handle)
}

fn main() {
    let param_file = std::env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());

    let param = match param::get(param_file.clone()) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("Cannot load parameters from {}: {}", param_file, e);
            process::exit(1);
        }
    };

    let _logger = match start_logger(&param.general) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot start logger: {}", e);
            process::exit(1);
        }
    };

    info!("lincs-forest {} with parameters from {}", env!("LINCS_FOREST_VERSION"), param_file);

    match run(&param) {
        Ok(report) => {
            info!(
                "{} sub-ensembles trained on {} samples in {:.2}s",
                report.n_subensembles, report.train_samples, report.execution_time
            );
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
