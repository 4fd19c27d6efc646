use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;

use skycast::app::HomeController;
use skycast::config::{AppConfig, Secrets};
use skycast::db::Store;
use skycast::monitoring::logger;
use skycast::notifications::{build_notifier, NotificationScheduler};
use skycast::platform::{
    last_known_or_default, Connectivity, ManualLocationProvider, StaticConnectivity, TcpProbe,
};
use skycast::settings::{Preferences, SettingsStore, TemperatureUnit, WindSpeedUnit};
use skycast::weather::{
    daily_aggregate, Coordinates, CurrentConditions, ForecastSeries, OpenWeatherClient, Resolved,
    WeatherResolver, WeatherState,
};

#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Offline-first weather client")]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    /// Skip the network and answer from the local cache.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct LocationArgs {
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
}

impl LocationArgs {
    fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Current conditions.
    Current(LocationArgs),
    /// 5-day forecast.
    Forecast {
        #[command(flatten)]
        location: LocationArgs,
        /// One entry per day.
        #[arg(long)]
        daily: bool,
    },
    #[command(subcommand)]
    Favorite(FavoriteCommand),
    #[command(subcommand)]
    Home(HomeCommand),
    #[command(subcommand)]
    Notify(NotifyCommand),
    /// Show or change preferences.
    Settings {
        #[arg(long)]
        temperature_unit: Option<TemperatureUnit>,
        #[arg(long)]
        wind_speed_unit: Option<WindSpeedUnit>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Follow the home location and fire notifications until interrupted.
    Watch(LocationArgs),
}

#[derive(Debug, Subcommand)]
enum FavoriteCommand {
    /// Fetch weather for a place and save it under NAME.
    Add {
        name: String,
        #[command(flatten)]
        location: LocationArgs,
    },
    Remove {
        name: String,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum HomeCommand {
    /// Pin the home location to a point.
    Set(LocationArgs),
    Clear,
}

#[derive(Debug, Subcommand)]
enum NotifyCommand {
    /// Schedule a notification at DATE (YYYY-MM-DD) TIME (HH:MM), local time.
    Add { date: String, time: String },
    List,
    Cancel {
        #[arg(long, conflicts_with = "time", required_unless_present = "time")]
        id: Option<i64>,
        #[arg(long)]
        time: Option<String>,
    },
}

/// Long-lived handles shared by every command.
struct Handles {
    config: AppConfig,
    store: Arc<Store>,
    resolver: WeatherResolver,
    settings: SettingsStore,
    location: Arc<ManualLocationProvider>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, mut secrets) = AppConfig::load_from(&cli.config)?;

    logger::init_logging(&config.monitoring)?;

    tracing::info!(offline = cli.offline, db = %config.database.path, "skycast starting");

    let api_key = match secrets.openweather_api_key.take() {
        Some(key) => key,
        None if cli.offline => SecretString::from(String::new()),
        None => anyhow::bail!("OPENWEATHER_API_KEY is not set (use --offline to read the cache)"),
    };

    let store = Arc::new(
        Store::new(&config.database.path)
            .await?
            .with_home_history_limit(config.database.home_history_limit),
    );
    let remote = Arc::new(OpenWeatherClient::new(&config.weather, api_key)?);
    let connectivity: Arc<dyn Connectivity> = if cli.offline {
        Arc::new(StaticConnectivity::new(false))
    } else {
        Arc::new(TcpProbe::from_base_url(
            remote.base_url(),
            Duration::from_millis(config.connectivity.probe_timeout_ms),
        )?)
    };

    let resolver = WeatherResolver::new(remote, store.clone(), connectivity);
    let ctx = Handles {
        settings: SettingsStore::new(store.clone()),
        location: Arc::new(ManualLocationProvider::new(None)),
        config,
        store,
        resolver,
    };

    match cli.command {
        Command::Current(location) => show_current(&ctx, &location).await,
        Command::Forecast { location, daily } => show_forecast(&ctx, &location, daily).await,
        Command::Favorite(command) => favorite(&ctx, command).await,
        Command::Home(command) => home(&ctx, command).await,
        Command::Notify(command) => notify(&ctx, command, secrets).await,
        Command::Settings {
            temperature_unit,
            wind_speed_unit,
            language,
        } => update_settings(&ctx, temperature_unit, wind_speed_unit, language).await,
        Command::Watch(location) => watch(ctx, &location, secrets).await,
    }
}

/// Explicit flags, then the saved selection, then the device fix or the default.
async fn resolve_location(ctx: &Handles, args: &LocationArgs, prefs: &Preferences) -> Coordinates {
    if let Some(coord) = args.coordinates() {
        return coord;
    }
    if let Some(coord) = prefs.last_coordinates {
        return coord;
    }
    last_known_or_default(ctx.location.as_ref(), ctx.config.location.default_coordinates()).await
}

async fn show_current(ctx: &Handles, args: &LocationArgs) -> Result<()> {
    let prefs = ctx.settings.load().await?;
    let coord = resolve_location(ctx, args, &prefs).await;

    match ctx.resolver.resolve_current(&prefs.weather_query(coord)).await {
        Resolved::Found { value, origin } => {
            println!("{} ({origin})", format_current(&value, &prefs));
            Ok(())
        }
        Resolved::NoData(reason) => anyhow::bail!("No weather for {coord}: {reason}"),
    }
}

async fn show_forecast(ctx: &Handles, args: &LocationArgs, daily: bool) -> Result<()> {
    let prefs = ctx.settings.load().await?;
    let coord = resolve_location(ctx, args, &prefs).await;

    match ctx.resolver.resolve_forecast(&prefs.weather_query(coord)).await {
        Resolved::Found { value, origin } => {
            let series = if daily { daily_aggregate(&value) } else { value };
            println!("{} ({origin})", series.city.name);
            print_forecast(&series, &prefs);
            Ok(())
        }
        Resolved::NoData(reason) => anyhow::bail!("No forecast for {coord}: {reason}"),
    }
}

async fn favorite(ctx: &Handles, command: FavoriteCommand) -> Result<()> {
    match command {
        FavoriteCommand::Add { name, location } => {
            let prefs = ctx.settings.load().await?;
            let coord = resolve_location(ctx, &location, &prefs).await;
            let place = ctx
                .resolver
                .bookmark(&name, &prefs.weather_query(coord))
                .await
                .with_context(|| format!("Could not save favorite place {name}"))?;
            println!("Saved {} at {}", place.city_name, place.coord());
        }
        FavoriteCommand::Remove { name } => {
            if ctx.resolver.delete_favorite_place(&name).await {
                println!("Removed {name}");
            } else {
                anyhow::bail!("No favorite place named {name}");
            }
        }
        FavoriteCommand::List => {
            let prefs = ctx.settings.load().await?;
            for place in ctx.resolver.favorite_places().await {
                println!(
                    "{:<20} {}  {}",
                    place.city_name,
                    place.coord(),
                    prefs.format_temperature(place.snapshot.main.temp)
                );
            }
        }
    }
    Ok(())
}

async fn home(ctx: &Handles, command: HomeCommand) -> Result<()> {
    match command {
        HomeCommand::Set(location) => {
            let coord = location
                .coordinates()
                .context("--lat and --lon are required")?;
            let controller =
                HomeController::new(ctx.resolver.clone(), ctx.config.location.default_coordinates());
            controller.select_location(coord).await;
            print_state(&controller, &ctx.settings.load().await?);
        }
        HomeCommand::Clear => {
            if !ctx.resolver.clear_home_snapshot().await {
                anyhow::bail!("Failed to clear home snapshot");
            }
            println!("Home snapshot cleared");
        }
    }
    Ok(())
}

async fn notify(ctx: &Handles, command: NotifyCommand, secrets: Secrets) -> Result<()> {
    let scheduler = NotificationScheduler::new(
        ctx.resolver.clone(),
        ctx.location.clone(),
        ctx.config.location.default_coordinates(),
        build_notifier(&ctx.config.notifications, &secrets),
    );

    match command {
        NotifyCommand::Add { date, time } => {
            let notification = scheduler.schedule(&date, &time).await?;
            println!(
                "Scheduled #{} for {} {} (delivered while `skycast watch` runs)",
                notification.id, notification.date, notification.time
            );
        }
        NotifyCommand::List => {
            for notification in scheduler.pending().await? {
                println!("#{:<4} {} {}", notification.id, notification.date, notification.time);
            }
        }
        NotifyCommand::Cancel { id, time } => {
            let removed = match (id, time) {
                (Some(id), _) => u64::from(scheduler.cancel(id).await?),
                (None, Some(time)) => scheduler.cancel_by_time(&time).await?,
                (None, None) => 0,
            };
            println!("Cancelled {removed} notification(s)");
        }
    }
    Ok(())
}

async fn update_settings(
    ctx: &Handles,
    temperature_unit: Option<TemperatureUnit>,
    wind_speed_unit: Option<WindSpeedUnit>,
    language: Option<String>,
) -> Result<()> {
    if let Some(unit) = temperature_unit {
        ctx.settings.set_temperature_unit(unit).await?;
    }
    if let Some(unit) = wind_speed_unit {
        ctx.settings.set_wind_speed_unit(unit).await?;
    }
    if let Some(language) = language {
        ctx.settings.set_language(&language).await?;
    }

    let prefs = ctx.settings.load().await?;
    println!("temperature unit: {}", prefs.temperature_unit);
    println!("wind speed unit:  {}", prefs.wind_speed_unit);
    println!("language:         {}", prefs.language);
    println!("location method:  {}", prefs.location_method);
    match prefs.last_coordinates {
        Some(coord) => println!("last location:    {coord}"),
        None => println!("last location:    (none)"),
    }
    Ok(())
}

async fn watch(ctx: Handles, args: &LocationArgs, secrets: Secrets) -> Result<()> {
    if let Some(coord) = args.coordinates() {
        ctx.location.push(Some(coord));
    }

    let scheduler = NotificationScheduler::new(
        ctx.resolver.clone(),
        ctx.location.clone(),
        ctx.config.location.default_coordinates(),
        build_notifier(&ctx.config.notifications, &secrets),
    );
    scheduler.restore().await?;

    let controller =
        HomeController::new(ctx.resolver.clone(), ctx.config.location.default_coordinates());
    let mut current = controller.current();
    controller.restore(ctx.location.clone()).await;

    loop {
        print_state(&controller, &ctx.settings.load().await?);
        tokio::select! {
            changed = current.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    ctx.store.pool().close().await;
    Ok(())
}

fn print_state(controller: &HomeController, prefs: &Preferences) {
    match &*controller.current().borrow() {
        WeatherState::Loading => println!("Loading..."),
        WeatherState::Success(current) => println!("{}", format_current(current, prefs)),
        WeatherState::Failure(reason) => println!("No weather: {reason}"),
    }
    if let WeatherState::Success(series) = &*controller.forecast().borrow() {
        print_forecast(series, prefs);
    }
}

fn format_current(current: &CurrentConditions, prefs: &Preferences) -> String {
    format!(
        "{}: {}, {}, feels like {}, wind {}, humidity {}%, clouds {}%",
        current.name,
        current.description().unwrap_or("-"),
        prefs.format_temperature(current.main.temp),
        prefs.format_temperature(current.main.feels_like),
        prefs.format_wind_speed(current.wind.speed),
        current.main.humidity,
        current.clouds.all,
    )
}

fn print_forecast(series: &ForecastSeries, prefs: &Preferences) {
    for entry in &series.list {
        println!(
            "  {}  {:>6}  {}",
            entry.dt_txt,
            prefs.format_temperature(entry.main.temp),
            entry.weather.first().map(|w| w.description.as_str()).unwrap_or("-"),
        );
    }
}
