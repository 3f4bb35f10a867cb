use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, Text};
use weather_core::{
    Config, ErrorKind, Origin, ProviderConfig, ProviderId, WeatherError, WeatherReport,
    WeatherService,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log provider attempts and circuit transitions to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials, endpoint and priority for a provider.
    Configure {
        /// Provider short name, e.g. "weatherstack" or "openweathermap".
        provider: String,
    },

    /// Show current weather for a city.
    Show {
        /// City name.
        city: String,

        /// Print the observation as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List configured providers in the order they are tried.
    Providers,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let config_path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };
        tracing::debug!(path = %config_path.display(), "loading configuration");
        let mut config = Config::load_from(&config_path)?;

        match self.command {
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                configure(&mut config, id)?;
                config.save_to(&config_path)?;
                tracing::debug!(
                    provider = %id,
                    path = %config_path.display(),
                    "configuration saved"
                );
                println!("Saved configuration for {id}.");
            }
            Command::Show { city, json } => {
                let service = WeatherService::from_config(&config)?;
                match service.get_weather(&city).await {
                    Ok(report) => print_report(&report, json)?,
                    Err(err) => {
                        eprintln!("error: {err}");
                        if let Some(hint) = hint(&err) {
                            eprintln!("hint: {hint}");
                        }
                        return Ok(ExitCode::from(exit_code(&err)));
                    }
                }
            }
            Command::Providers => {
                let service = WeatherService::from_config(&config)?;
                if service.registry().is_empty() {
                    println!("No providers configured. Run `weather configure <provider>`.");
                }
                for (idx, provider) in service.registry().iter().enumerate() {
                    println!(
                        "{}. {} (priority {})",
                        idx + 1,
                        provider.name(),
                        provider.priority()
                    );
                }
            }
        }

        Ok(ExitCode::SUCCESS)
    }
}

fn configure(config: &mut Config, id: ProviderId) -> anyhow::Result<()> {
    let existing = config.provider_config(id).cloned();

    let api_key = Password::new(&format!("{id} API key:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let current_url = existing
        .as_ref()
        .and_then(|p| p.base_url.clone())
        .unwrap_or_else(|| id.default_base_url().to_string());
    let base_url = Text::new("Base URL:")
        .with_default(&current_url)
        .prompt()
        .context("Failed to read base URL")?;

    let current_priority = existing
        .as_ref()
        .and_then(|p| p.priority)
        .unwrap_or_else(|| id.default_priority());
    let priority = CustomType::<i32>::new("Priority (lower is tried first):")
        .with_default(current_priority)
        .prompt()
        .context("Failed to read priority")?;

    let provider = ProviderConfig {
        api_key: api_key.trim().to_string(),
        base_url: (base_url != id.default_base_url()).then_some(base_url),
        priority: (priority != id.default_priority()).then_some(priority),
        country_code: existing.and_then(|p| p.country_code),
    };
    config.upsert_provider(id, provider);

    config.validate()
}

fn print_report(report: &WeatherReport, json: bool) -> anyhow::Result<()> {
    if json {
        let out = serde_json::to_string_pretty(&report.observation)
            .context("Failed to serialize observation")?;
        println!("{out}");
        return Ok(());
    }

    let fetched = report.fetched_at.with_timezone(&Local).format("%H:%M:%S");
    let source = match &report.origin {
        Origin::Live { provider } => format!("{provider}, {fetched}"),
        Origin::Cached { age } => format!("cached {}s ago, {fetched}", age.as_secs()),
    };

    println!("{}", report.city);
    println!("  Temperature: {:.1} °C", report.observation.temperature_degrees);
    println!("  Wind speed:  {:.1}", report.observation.wind_speed);
    println!("  Source:      {source}");
    Ok(())
}

fn exit_code(err: &WeatherError) -> u8 {
    match err.kind() {
        None => 7,
        Some(ErrorKind::InvalidInput) => 2,
        Some(ErrorKind::Unauthorized | ErrorKind::RateLimited) => 3,
        Some(ErrorKind::UpstreamUnavailable) => 4,
        Some(ErrorKind::ProviderUnavailable) => 5,
        Some(ErrorKind::UnknownProviderFault) => 6,
    }
}

fn hint(err: &WeatherError) -> Option<&'static str> {
    match err {
        WeatherError::NoProvidersAvailable => Some("run `weather configure <provider>` first"),
        _ => match err.kind()? {
            ErrorKind::Unauthorized => {
                Some("check the API key with `weather configure <provider>`")
            }
            ErrorKind::ProviderUnavailable => {
                Some("the provider failed repeatedly; try again shortly")
            }
            _ => None,
        },
    }
}
