use clap::{Parser, Subcommand};
use config::Config;
use deploy::{DeployError, DeployReport, Deployer};
use distribution::CloudFrontStore;
use resolver::FunctionResolver;
use resolver::lambda::LambdaVersionSource;
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod deploy;
mod metrics_defs;
mod observability;

#[derive(Parser)]
#[command(version, about = "Points CDN behaviors at the latest published edge function versions")]
struct Cli {
    #[arg(long, default_value = "edgesync.yaml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Resolve functions and update the distribution
    Deploy {
        /// Resolve and merge without writing the distribution
        #[arg(long)]
        dry_run: bool,
    },
    /// Load and validate the config file
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config);
    let common = config
        .as_ref()
        .map(|config| config.common.clone())
        .unwrap_or_default();

    let _guard = match observability::init(&cli.log_level, &common) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("edgesync: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %cli.config.display(), error = %e, "Could not load config");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        CliCommand::Validate => {
            tracing::info!(
                path = %cli.config.display(),
                distribution_id = %config.deployment.distribution_id,
                functions = config.deployment.referenced_functions().len(),
                "Config is valid"
            );
            ExitCode::SUCCESS
        }
        CliCommand::Deploy { dry_run } => run_deploy(&config, dry_run),
    }
}

fn run_deploy(config: &Config, dry_run: bool) -> ExitCode {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Could not start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(deploy(config, dry_run)) {
        Ok(report) => {
            for function in report.functions.iter() {
                tracing::info!(function = %function.name, identity = %function.identity, "Deployed function version");
            }
            tracing::info!(
                distribution_id = %report.distribution_id,
                updated = report.updated,
                "Deployment finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Deployment failed");
            ExitCode::FAILURE
        }
    }
}

async fn deploy(config: &Config, dry_run: bool) -> Result<DeployReport, DeployError> {
    let sdk_config = config.aws.load().await;

    let deployer = Deployer::new(
        FunctionResolver::new(LambdaVersionSource::new(&sdk_config)),
        CloudFrontStore::new(&sdk_config),
    );

    deployer.run(&config.deployment, dry_run).await
}
