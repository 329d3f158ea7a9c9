use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use owm_core::{
    CityDirectory, CityRef, Config, Coordinates, HistoryQuery, SqliteCityDirectory,
    TemperatureScale, WeatherProvider, WeatherSnapshot, resolve_city,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "owm", version, about = "OpenWeatherMap client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API key (and optionally the city database) in the config file.
    Configure,

    /// Show current weather conditions.
    Current {
        #[command(flatten)]
        location: LocationArgs,

        /// Temperature scale for the headline temperature.
        #[arg(long, default_value = "celsius")]
        scale: TemperatureScale,

        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show past weather conditions between two dates.
    History {
        #[command(flatten)]
        location: LocationArgs,

        /// First date, RFC 3339 or YYYY-MM-DD (UTC).
        #[arg(long, value_parser = parse_date)]
        start: DateTime<Utc>,

        /// Last date; defaults to now.
        #[arg(long, value_parser = parse_date)]
        end: Option<DateTime<Utc>>,

        /// Days between samples.
        #[arg(long, default_value_t = 1.0)]
        interval: f64,

        /// Print the snapshots as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search the city database by name.
    City {
        name: String,

        #[arg(long)]
        country: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct LocationArgs {
    /// OpenWeatherMap city id, looked up in the configured city database.
    #[arg(long, conflicts_with = "city")]
    pub id: Option<i64>,

    /// City name, looked up in the configured city database.
    #[arg(long)]
    pub city: Option<String>,

    /// Country code narrowing down `--city`.
    #[arg(long, requires = "city")]
    pub country: Option<String>,

    /// Latitude, used when no city is given.
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude, used when no city is given.
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,
}

impl LocationArgs {
    fn resolve(&self, config: &Config) -> anyhow::Result<(Option<CityRef>, Option<Coordinates>)> {
        let coords = self.lat.zip(self.lon).map(|(lat, lon)| Coordinates::new(lon, lat));

        let city = match (&self.id, &self.city) {
            (Some(id), _) => {
                let directory = open_directory(config)
                    .with_context(|| format!("--id {id} needs the city database"))?;
                let city = directory
                    .city_by_id(*id)?
                    .with_context(|| format!("No city with id {id} in the city database"))?;
                Some(city)
            }
            (None, Some(name)) => {
                let directory = open_directory(config)?;
                Some(resolve_city(&directory, name, self.country.as_deref())?)
            }
            (None, None) => None,
        };

        Ok((city, coords))
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Current { location, scale, json } => {
                let config = Config::load()?;
                let (city, coords) = location.resolve(&config)?;
                let provider: Box<dyn WeatherProvider> = Box::new(config.gateway()?);

                let snapshot = provider.current_weather(city.as_ref(), coords).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                } else {
                    if let Some(city) = &city {
                        println!("Weather in {city}");
                    }
                    print!("{snapshot}");
                    if scale != TemperatureScale::Celsius {
                        println!("Temperature ({scale}): {:.2}", snapshot.temperature(scale));
                    }
                }
                Ok(())
            }
            Command::History { location, start, end, interval, json } => {
                let config = Config::load()?;
                let (city, coords) = location.resolve(&config)?;
                let provider: Box<dyn WeatherProvider> = Box::new(config.gateway()?);

                let mut query = HistoryQuery::new(start).every(interval);
                if let Some(end) = end {
                    query = query.until(end);
                }

                let history = provider.weather_history(&query, city.as_ref(), coords).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&history)?);
                } else {
                    print_history(&history);
                }
                Ok(())
            }
            Command::City { name, country } => {
                let config = Config::load()?;
                let directory = open_directory(&config)?;
                let cities = directory.cities_by_name(&name, country.as_deref())?;

                if cities.is_empty() {
                    println!("No city matches '{name}'");
                }
                for city in cities {
                    println!(
                        "{}\t{city}\t(lat {}, lon {})",
                        city.id, city.latitude, city.longitude
                    );
                }
                Ok(())
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Password::new("OpenWeatherMap API key:")
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    config.set_api_key(api_key.trim().to_string());

    let cities_db = inquire::Text::new("Path to the city database (leave empty to skip):")
        .with_default(
            &config
                .cities_db
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        )
        .prompt()
        .context("Failed to read city database path")?;
    config.cities_db = match cities_db.trim() {
        "" => None,
        path => Some(path.into()),
    };

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

fn open_directory(config: &Config) -> anyhow::Result<SqliteCityDirectory> {
    let path = config.cities_db()?;
    SqliteCityDirectory::open(path)
        .with_context(|| format!("Failed to open city database: {}", path.display()))
}

fn print_history(history: &[WeatherSnapshot]) {
    if history.is_empty() {
        println!("No weather data for that period");
        return;
    }

    for snapshot in history {
        println!("== {} ==", snapshot.timestamp().format("%Y-%m-%d %H:%M UTC"));
        println!("{snapshot}");
    }
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
        .ok_or_else(|| format!("'{s}' is neither RFC 3339 nor YYYY-MM-DD"))
}
